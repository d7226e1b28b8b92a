//! Named resource storage.
//!
//! Every category the context owns (programs, textures, targets, meshes) lives
//! in a [`Registry`]: a slot arena with a name index. Callers hold [`Id`]s,
//! which carry a generation so that an id outliving its resource resolves to
//! nothing instead of to whatever reused the slot.

mod id;
mod registry;

pub use id::Id;
pub use registry::Registry;
