//! Audit/notify collaborators.
//!
//! `AuditLog::record` is fire-and-forget from the workflow's point of view: a
//! failed delivery is logged and never undoes or fails the transition.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use procureflow_events::EventBus;
use procureflow_purchasing::PurchaseOrderId;

/// One human-readable audit line attached to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub order_id: PurchaseOrderId,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(order_id: PurchaseOrderId, message: impl Into<String>) -> Self {
        Self {
            order_id,
            message: message.into(),
            recorded_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit delivery failed: {0}")]
    Delivery(String),
}

pub trait AuditLog: Send + Sync {
    fn record(&self, order_id: PurchaseOrderId, message: &str) -> Result<(), AuditError>;
}

impl<L> AuditLog for Arc<L>
where
    L: AuditLog + ?Sized,
{
    fn record(&self, order_id: PurchaseOrderId, message: &str) -> Result<(), AuditError> {
        (**self).record(order_id, message)
    }
}

/// Writes audit lines as structured `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditLog;

impl AuditLog for TracingAuditLog {
    fn record(&self, order_id: PurchaseOrderId, message: &str) -> Result<(), AuditError> {
        tracing::info!(target: "procureflow::audit", %order_id, message, "audit");
        Ok(())
    }
}

/// Keeps audit records in memory (tests/dev).
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    records: Mutex<Vec<AuditRecord>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn messages_for(&self, order_id: PurchaseOrderId) -> Vec<String> {
        self.records()
            .into_iter()
            .filter(|r| r.order_id == order_id)
            .map(|r| r.message)
            .collect()
    }
}

impl AuditLog for InMemoryAuditLog {
    fn record(&self, order_id: PurchaseOrderId, message: &str) -> Result<(), AuditError> {
        self.records
            .lock()
            .map_err(|_| AuditError::Delivery("audit log lock poisoned".to_string()))?
            .push(AuditRecord::new(order_id, message));
        Ok(())
    }
}

/// Publishes audit records on an `EventBus` for notification consumers.
#[derive(Debug)]
pub struct BusAuditLog<B> {
    bus: B,
}

impl<B> BusAuditLog<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }
}

impl<B> AuditLog for BusAuditLog<B>
where
    B: EventBus<AuditRecord>,
{
    fn record(&self, order_id: PurchaseOrderId, message: &str) -> Result<(), AuditError> {
        self.bus
            .publish(AuditRecord::new(order_id, message))
            .map_err(|e| AuditError::Delivery(format!("{e:?}")))
    }
}
