use crate::resource::Id;
use crate::scene::Generator;
use crate::shader::Program;
use crate::target::{RenderTarget, Texture};

use super::RenderPass;

/// Ids a pass resolved to on its last successful frame.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResolvedIds {
    pub target: Id<RenderTarget>,
    pub program: Id<Program>,
    pub generator: Id<Box<dyn Generator>>,
    pub inputs: Vec<Id<Texture>>,
    /// Context mode epoch the program was resolved under.
    pub epoch: u64,
}

#[derive(Debug)]
pub(crate) struct PassSlot {
    pub pass: RenderPass,
    pub cache: Option<ResolvedIds>,
    /// Message of the last skip, to log a repeating failure once.
    pub last_error: Option<String>,
}

/// Ordered list of passes. Execution order is append order.
#[derive(Debug, Default)]
pub struct RenderPipeline {
    slots: Vec<PassSlot>,
}

impl RenderPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a copy of `pass`; returns its index.
    pub fn append(&mut self, pass: &RenderPass) -> usize {
        self.slots.push(PassSlot {
            pass: pass.clone(),
            cache: None,
            last_error: None,
        });
        self.slots.len() - 1
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn pass(&self, index: usize) -> Option<&RenderPass> {
        self.slots.get(index).map(|s| &s.pass)
    }

    pub fn passes(&self) -> impl Iterator<Item = &RenderPass> {
        self.slots.iter().map(|s| &s.pass)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    #[inline]
    pub(crate) fn slots_mut(&mut self) -> &mut [PassSlot] {
        &mut self.slots
    }

    #[cfg(test)]
    pub(crate) fn cached(&self, index: usize) -> Option<&ResolvedIds> {
        self.slots.get(index).and_then(|s| s.cache.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_copies_in_order() {
        let mut p = RenderPipeline::new();
        let mut pass = RenderPass::new("fbo", "normal", "scene");
        assert_eq!(p.append(&pass), 0);
        pass.target = "default".into();
        assert_eq!(p.append(&pass), 1);

        let targets: Vec<&str> = p.passes().map(|p| p.target.as_str()).collect();
        assert_eq!(targets, ["fbo", "default"]);
        assert!(p.cached(0).is_none());
    }
}
