//! Render passes, the pipeline that orders them, and per-frame reports.
//!
//! A pass names its target, mode and generator. Names are resolved against
//! the context every frame; ids from the last successful resolution are
//! cached on the pipeline and revalidated by generation first.

mod pass;
mod report;
mod sequence;

pub use pass::RenderPass;
pub use report::{FrameReport, PassOutcome};
pub use sequence::RenderPipeline;

pub(crate) use sequence::ResolvedIds;
