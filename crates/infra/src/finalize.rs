//! Finalize hook: releases a confirmed order into execution.
//!
//! Called once per live order at confirmation, before the confirmation is
//! committed. When a later order in the same confirmation fails, the ones
//! already finalized are handed to `revoke` in reverse order.

use std::sync::{Arc, Mutex};

use thiserror::Error;

use procureflow_purchasing::{PurchaseOrder, PurchaseOrderId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct FinalizeError(pub String);

pub trait OrderFinalizer: Send + Sync {
    fn finalize(&self, order: &PurchaseOrder) -> Result<(), FinalizeError>;

    /// Undo a `finalize` whose confirmation was abandoned.
    fn revoke(&self, _order_id: PurchaseOrderId) {}
}

impl<F> OrderFinalizer for Arc<F>
where
    F: OrderFinalizer + ?Sized,
{
    fn finalize(&self, order: &PurchaseOrder) -> Result<(), FinalizeError> {
        (**self).finalize(order)
    }

    fn revoke(&self, order_id: PurchaseOrderId) {
        (**self).revoke(order_id)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopFinalizer;

impl OrderFinalizer for NoopFinalizer {
    fn finalize(&self, _order: &PurchaseOrder) -> Result<(), FinalizeError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct RecordingState {
    finalized: Vec<PurchaseOrderId>,
    revoked: Vec<PurchaseOrderId>,
    calls: usize,
}

/// Records finalize/revoke calls; optionally fails after `n` successes.
#[derive(Debug, Default)]
pub struct RecordingFinalizer {
    fail_after: Option<usize>,
    state: Mutex<RecordingState>,
}

impl RecordingFinalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_after(successes: usize) -> Self {
        Self {
            fail_after: Some(successes),
            state: Mutex::default(),
        }
    }

    /// Orders finalized and not revoked, in call order.
    pub fn finalized(&self) -> Vec<PurchaseOrderId> {
        self.state
            .lock()
            .map(|s| {
                s.finalized
                    .iter()
                    .filter(|id| !s.revoked.contains(id))
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn revoked(&self) -> Vec<PurchaseOrderId> {
        self.state
            .lock()
            .map(|s| s.revoked.clone())
            .unwrap_or_default()
    }
}

impl OrderFinalizer for RecordingFinalizer {
    fn finalize(&self, order: &PurchaseOrder) -> Result<(), FinalizeError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| FinalizeError("finalizer lock poisoned".to_string()))?;
        state.calls += 1;
        if self.fail_after.is_some_and(|n| state.calls > n) {
            return Err(FinalizeError(format!(
                "order {} rejected by finalizer",
                order.id_typed()
            )));
        }
        state.finalized.push(order.id_typed());
        Ok(())
    }

    fn revoke(&self, order_id: PurchaseOrderId) {
        if let Ok(mut state) = self.state.lock() {
            state.revoked.push(order_id);
        }
    }
}
