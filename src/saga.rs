//! Saga state tracking for mutations that span both stores.
//!
//! No transaction covers the catalog and the asset store together, so
//! every mutating coordinator call walks a fixed forward-compensation
//! state machine instead of ad-hoc nested error handling:
//!
//! ```text
//! Idle → AssetUploading → AssetUploaded → CatalogWriting → Committed
//!                                       ↘ CatalogFailed → Compensating →
//!                                           {CompensationDone | CompensationFailed}
//! ```
//!
//! Operations without a new image skip straight from `Idle` to
//! `CatalogWriting`. An upload failure ends the operation while still in
//! `AssetUploading` — nothing has been committed, so there is nothing to
//! compensate. `CatalogFailed` is terminal when no speculative upload
//! exists; otherwise compensation runs and both of its outcomes are
//! terminal. `CompensationFailed` never changes the error reported to the
//! caller — the orphaned object is surfaced to operators via a warning.

use tracing::debug;

/// Phase of one mutating operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaState {
    Idle,
    AssetUploading,
    AssetUploaded,
    CatalogWriting,
    Committed,
    CatalogFailed,
    Compensating,
    CompensationDone,
    CompensationFailed,
}

impl SagaState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition(self, next: SagaState) -> bool {
        use SagaState::*;
        matches!(
            (self, next),
            (Idle, AssetUploading)
                | (Idle, CatalogWriting)
                | (AssetUploading, AssetUploaded)
                | (AssetUploaded, CatalogWriting)
                | (CatalogWriting, Committed)
                | (CatalogWriting, CatalogFailed)
                | (CatalogFailed, Compensating)
                | (Compensating, CompensationDone)
                | (Compensating, CompensationFailed)
        )
    }

    pub fn is_terminal(self) -> bool {
        use SagaState::*;
        matches!(
            self,
            Committed | CatalogFailed | CompensationDone | CompensationFailed
        )
    }
}

/// Tracks one mutating operation through the state machine, logging each
/// transition.
pub struct Saga {
    op: &'static str,
    state: SagaState,
}

impl Saga {
    pub fn begin(op: &'static str) -> Self {
        debug!(op, "saga begin");
        Self {
            op,
            state: SagaState::Idle,
        }
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    /// Move to the next state. Illegal transitions are a programming
    /// error in the coordinator, not a runtime condition.
    pub fn advance(&mut self, next: SagaState) {
        debug_assert!(
            self.state.can_transition(next),
            "illegal saga transition {:?} -> {:?} in {}",
            self.state,
            next,
            self.op
        );
        debug!(op = self.op, from = ?self.state, to = ?next, "saga transition");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_with_upload() {
        let mut saga = Saga::begin("create");
        for next in [
            SagaState::AssetUploading,
            SagaState::AssetUploaded,
            SagaState::CatalogWriting,
            SagaState::Committed,
        ] {
            assert!(saga.state().can_transition(next));
            saga.advance(next);
        }
        assert!(saga.state().is_terminal());
    }

    #[test]
    fn compensation_path_terminates_either_way() {
        for outcome in [SagaState::CompensationDone, SagaState::CompensationFailed] {
            let mut saga = Saga::begin("create");
            saga.advance(SagaState::AssetUploading);
            saga.advance(SagaState::AssetUploaded);
            saga.advance(SagaState::CatalogWriting);
            saga.advance(SagaState::CatalogFailed);
            saga.advance(SagaState::Compensating);
            saga.advance(outcome);
            assert!(saga.state().is_terminal());
        }
    }

    #[test]
    fn operations_without_upload_skip_to_catalog_write() {
        assert!(SagaState::Idle.can_transition(SagaState::CatalogWriting));
    }

    #[test]
    fn committed_has_no_successors() {
        use SagaState::*;
        for next in [
            Idle,
            AssetUploading,
            AssetUploaded,
            CatalogWriting,
            Committed,
            CatalogFailed,
            Compensating,
            CompensationDone,
            CompensationFailed,
        ] {
            assert!(!Committed.can_transition(next));
        }
    }

    #[test]
    fn compensation_requires_catalog_failure() {
        assert!(!SagaState::CatalogWriting.can_transition(SagaState::Compensating));
        assert!(!SagaState::AssetUploaded.can_transition(SagaState::Compensating));
    }
}
