//! Size, rectangle and color value types shared by targets and passes.
//!
//! Pixel space:
//! - physical pixels of the bound render target
//! - origin top-left, +X right, +Y down

mod color;
mod extent;
mod viewport;

pub use color::ColorRgba;
pub use extent::Extent;
pub use viewport::Viewport;
