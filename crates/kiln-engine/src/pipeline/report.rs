use crate::error::Error;
use crate::time::FrameTime;

/// What happened to one pass in a frame.
#[derive(Debug)]
pub enum PassOutcome {
    /// The pass ran and issued `draws` draw calls.
    Executed { draws: usize },
    /// The pass was skipped; the rest of the pipeline still ran.
    Skipped(Error),
}

impl PassOutcome {
    #[inline]
    pub fn is_executed(&self) -> bool {
        matches!(self, PassOutcome::Executed { .. })
    }

    #[inline]
    pub fn error(&self) -> Option<&Error> {
        match self {
            PassOutcome::Skipped(err) => Some(err),
            PassOutcome::Executed { .. } => None,
        }
    }
}

/// Result of one `render_frame` call: one outcome per pass, in append order.
#[derive(Debug)]
pub struct FrameReport {
    pub time: FrameTime,
    pub outcomes: Vec<PassOutcome>,
}

impl FrameReport {
    pub fn executed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_executed()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.executed()
    }

    /// `(pass index, error)` for every skipped pass.
    pub fn errors(&self) -> impl Iterator<Item = (usize, &Error)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, o)| o.error().map(|e| (i, e)))
    }

    pub fn total_draws(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o {
                PassOutcome::Executed { draws } => *draws,
                PassOutcome::Skipped(_) => 0,
            })
            .sum()
    }
}
