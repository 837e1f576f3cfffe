//! Loading and staging `PurchaseOrder` streams.

use serde_json::Value as JsonValue;

use procureflow_core::{Aggregate, AggregateRoot, ExpectedVersion};
use procureflow_purchasing::{
    ApprovalChain, ApprovalState, PurchaseOrder, PurchaseOrderEvent, PurchaseOrderId,
};

use crate::error::WorkflowError;
use crate::event_store::{EventStore, EventStoreError, StoredEvent};
use crate::unit_of_work::UnitOfWork;

pub const ORDER_AGGREGATE_TYPE: &str = "purchasing.order";

#[derive(Debug)]
pub struct OrderRepository<S> {
    store: S,
}

impl<S> OrderRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }
}

impl<S: EventStore> OrderRepository<S> {
    /// Rehydrate an order from its stream.
    pub fn load(&self, order_id: PurchaseOrderId) -> Result<PurchaseOrder, WorkflowError> {
        let history = self.store.load_stream(order_id.0)?;
        if history.is_empty() {
            return Err(WorkflowError::NotFound(order_id));
        }
        validate_loaded_stream(order_id, &history)?;

        let mut order = PurchaseOrder::empty(order_id);
        for stored in history {
            order.apply(&decode(stored.payload)?);
        }
        Ok(order)
    }

    /// Rehydrate an order and reject it when its approval stage is not
    /// defined by `chain` (e.g. the chain was shortened since it was approved).
    pub fn load_in_chain(
        &self,
        order_id: PurchaseOrderId,
        chain: &ApprovalChain,
    ) -> Result<PurchaseOrder, WorkflowError> {
        let order = self.load(order_id)?;
        match order.approval_state() {
            ApprovalState::StageApproved(stage_index) if stage_index >= chain.len() => {
                Err(WorkflowError::StageOutsideChain {
                    order_id,
                    stage_index,
                    chain_len: chain.len(),
                })
            }
            _ => Ok(order),
        }
    }

    pub fn begin(&self) -> UnitOfWork<'_, S> {
        UnitOfWork::begin(&self.store)
    }

    /// Stage events for an order loaded from the store.
    pub fn stage(
        &self,
        uow: &mut UnitOfWork<'_, S>,
        order: &PurchaseOrder,
        events: &[PurchaseOrderEvent],
    ) -> Result<(), WorkflowError> {
        uow.stage(
            order.id_typed().0,
            ORDER_AGGREGATE_TYPE,
            ExpectedVersion::Exact(order.version()),
            events,
        )?;
        Ok(())
    }

    /// Stage the first events of an order that must not exist yet.
    pub fn stage_new(
        &self,
        uow: &mut UnitOfWork<'_, S>,
        order_id: PurchaseOrderId,
        events: &[PurchaseOrderEvent],
    ) -> Result<(), WorkflowError> {
        uow.stage(order_id.0, ORDER_AGGREGATE_TYPE, ExpectedVersion::NoStream, events)?;
        Ok(())
    }
}

fn decode(payload: JsonValue) -> Result<PurchaseOrderEvent, WorkflowError> {
    serde_json::from_value(payload).map_err(|e| WorkflowError::Deserialize(e.to_string()))
}

fn validate_loaded_stream(
    order_id: PurchaseOrderId,
    stream: &[StoredEvent],
) -> Result<(), WorkflowError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != order_id.0 {
            return Err(WorkflowError::Store(EventStoreError::InvalidAppend(format!(
                "loaded stream for {order_id} contains aggregate {} at index {idx}",
                e.aggregate_id
            ))));
        }
        if e.aggregate_type != ORDER_AGGREGATE_TYPE {
            return Err(WorkflowError::Store(EventStoreError::AggregateTypeMismatch(
                format!("stream {order_id} holds '{}'", e.aggregate_type),
            )));
        }
        if e.sequence_number != last + 1 {
            return Err(WorkflowError::Store(EventStoreError::InvalidAppend(format!(
                "non-contiguous sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}
