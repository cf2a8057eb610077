use std::fmt;
use tracing::debug;

/// Where a query cycle is in its two-phase round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Init,
    Catalogued,
    AwaitingProposal,
    ExecutingTools,
    AwaitingFinal,
    Done,
    Failed,
}

impl CycleState {
    pub fn as_str(self) -> &'static str {
        match self {
            CycleState::Init => "init",
            CycleState::Catalogued => "catalogued",
            CycleState::AwaitingProposal => "awaiting_proposal",
            CycleState::ExecutingTools => "executing_tools",
            CycleState::AwaitingFinal => "awaiting_final",
            CycleState::Done => "done",
            CycleState::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CycleState::Done | CycleState::Failed)
    }

    /// Legal forward edges. `Failed` is reachable from any non-terminal state.
    pub fn can_advance_to(self, next: CycleState) -> bool {
        use CycleState::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Init, Catalogued)
            | (Catalogued, AwaitingProposal)
            | (AwaitingProposal, ExecutingTools)
            | (AwaitingProposal, Done)
            | (ExecutingTools, AwaitingFinal)
            | (AwaitingFinal, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the current state of one cycle and logs each transition.
#[derive(Debug)]
pub(crate) struct StateTracker {
    current: CycleState,
    history: Vec<CycleState>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self {
            current: CycleState::Init,
            history: vec![CycleState::Init],
        }
    }

    pub fn current(&self) -> CycleState {
        self.current
    }

    pub fn history(&self) -> &[CycleState] {
        &self.history
    }

    pub fn advance(&mut self, next: CycleState) {
        debug_assert!(
            self.current.can_advance_to(next),
            "illegal cycle transition {} -> {}",
            self.current,
            next
        );
        debug!(from = %self.current, to = %next, "Cycle state transition");
        self.current = next;
        self.history.push(next);
    }
}
