//! Pipeline orchestration.
//!
//! The engine owns the blackboard lifecycle and drives the stages in
//! dependency order through a small state machine. Only the orchestrator
//! decides how a stage failure looks to the caller.

mod engine;

pub use engine::{Engine, PipelineTrace};

use serde::Serialize;

/// Lifecycle of one query through the pipeline.
///
/// `Failed` is terminal and reachable from every non-terminal state; the
/// happy path advances strictly left to right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Received,
    Understanding,
    Analyzing,
    Consolidating,
    Responding,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    /// Legal transitions of the state machine.
    pub fn may_advance_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Received, Understanding)
            | (Understanding, Analyzing)
            | (Analyzing, Consolidating)
            | (Consolidating, Responding)
            | (Responding, Done) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        use PipelineState::*;
        let path = [Received, Understanding, Analyzing, Consolidating, Responding, Done];
        for pair in path.windows(2) {
            assert!(pair[0].may_advance_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_failed_reachable_from_every_non_terminal() {
        use PipelineState::*;
        for state in [Received, Understanding, Analyzing, Consolidating, Responding] {
            assert!(state.may_advance_to(Failed));
        }
        assert!(!Done.may_advance_to(Failed));
        assert!(!Failed.may_advance_to(Failed));
    }

    #[test]
    fn test_no_skipping_stages() {
        use PipelineState::*;
        assert!(!Received.may_advance_to(Analyzing));
        assert!(!Understanding.may_advance_to(Consolidating));
        assert!(!Failed.may_advance_to(Done));
    }
}
