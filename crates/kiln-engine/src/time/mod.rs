//! Frame timing.
//!
//! The render context ticks its `FrameClock` once per `render_frame`; the
//! resulting `FrameTime` feeds the frame uniforms and the frame report.

mod frame_clock;

pub use frame_clock::{FrameClock, FrameTime};
