//! Errors surfaced by the workflow façade.

use thiserror::Error;

use procureflow_core::DomainError;
use procureflow_purchasing::PurchaseOrderId;

use crate::event_store::EventStoreError;

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The actor lacks the capability the stage requires.
    #[error("forbidden: missing capability '{0}'")]
    Authorization(String),

    /// Lines without a resolvable vendor at the vendor-gating stage.
    #[error("vendor assignment incomplete for: {}", .0.join(", "))]
    IncompleteAssignment(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),

    /// Out-of-order transition, raised only under the strict policy.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("purchase order {0} not found")]
    NotFound(PurchaseOrderId),

    /// Stale version: another writer got there first.
    #[error("concurrent modification: {0}")]
    Concurrency(String),

    /// Creating or finalizing a split child failed; nothing was committed.
    #[error("order split failed at child {order_id}: {reason}")]
    SplitFailed {
        order_id: PurchaseOrderId,
        reason: String,
    },

    /// The finalize hook refused an in-place confirmation; nothing was committed.
    #[error("finalizing order {order_id} failed: {reason}")]
    Finalize {
        order_id: PurchaseOrderId,
        reason: String,
    },

    /// The stored approval stage is not part of the configured chain.
    #[error(
        "order {order_id} is at approval stage {stage_index}, beyond the configured chain of {chain_len} stages"
    )]
    StageOutsideChain {
        order_id: PurchaseOrderId,
        stage_index: usize,
        chain_len: usize,
    },

    /// A stored payload no longer matches the event schema.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    #[error(transparent)]
    Store(EventStoreError),
}

impl WorkflowError {
    /// Map a domain error raised while working on `order_id`.
    pub fn from_domain(order_id: PurchaseOrderId, err: DomainError) -> Self {
        match err {
            DomainError::NotFound => WorkflowError::NotFound(order_id),
            other => other.into(),
        }
    }
}

impl From<DomainError> for WorkflowError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                WorkflowError::Validation(msg)
            }
            DomainError::InvariantViolation(msg) => WorkflowError::InvariantViolation(msg),
            DomainError::NotFound => WorkflowError::InvariantViolation("not found".to_string()),
            DomainError::Conflict(msg) => WorkflowError::Concurrency(msg),
            DomainError::Unauthorized(capability) => WorkflowError::Authorization(capability),
            DomainError::IncompleteAssignment(products) => {
                WorkflowError::IncompleteAssignment(products)
            }
            DomainError::InvalidTransition(msg) => WorkflowError::InvalidTransition(msg),
        }
    }
}

impl From<EventStoreError> for WorkflowError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => WorkflowError::Concurrency(msg),
            other => WorkflowError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_keep_their_kind() {
        let id = PurchaseOrderId::generate();

        assert!(matches!(
            WorkflowError::from_domain(id, DomainError::unauthorized("purchasing.approve.gm")),
            WorkflowError::Authorization(cap) if cap == "purchasing.approve.gm"
        ));
        assert!(matches!(
            WorkflowError::from_domain(id, DomainError::not_found()),
            WorkflowError::NotFound(missing) if missing == id
        ));
        assert!(matches!(
            WorkflowError::from(DomainError::conflict("stale")),
            WorkflowError::Concurrency(_)
        ));
    }

    #[test]
    fn incomplete_assignment_lists_products() {
        let err = WorkflowError::from(DomainError::incomplete_assignment(vec![
            "Paper".to_string(),
            "Toner".to_string(),
        ]));
        assert_eq!(err.to_string(), "vendor assignment incomplete for: Paper, Toner");
    }

    #[test]
    fn store_concurrency_maps_to_concurrency() {
        let err = WorkflowError::from(EventStoreError::Concurrency("expected 3, found 4".into()));
        assert!(matches!(err, WorkflowError::Concurrency(_)));
        let err = WorkflowError::from(EventStoreError::Unavailable("down".into()));
        assert!(matches!(err, WorkflowError::Store(_)));
    }
}
