//! Workflow façade invoked by the action/API layer.
//!
//! Every transition follows the same pipeline:
//!
//! ```text
//! load (rehydrate) → decide (ApprovalStateMachine) → stage (UnitOfWork)
//!   → finalize live orders → commit (one append_all) → audit
//! ```
//!
//! Nothing is written unless the whole transition commits. Audit delivery
//! happens after the commit and its failures are only logged.

use std::sync::Arc;

use chrono::Utc;

use procureflow_auth::CapabilityCheck;
use procureflow_core::{ActorId, Aggregate, BranchId};
use procureflow_purchasing::{
    ApprovalStateMachine, ConfirmPlan, CreatePurchaseOrder, DisplayToggles, ProductId,
    PurchaseOrder, PurchaseOrderCommand, PurchaseOrderEvent, PurchaseOrderId, SplitPlan,
    SupplierDirectory, VendorDomain, default_vendor_for, suggest_vendor_domain, validate_line,
    validate_quantity, validate_vendor,
};

use crate::audit::{AuditLog, TracingAuditLog};
use crate::config::{ConfigError, WorkflowConfig};
use crate::error::WorkflowError;
use crate::event_store::EventStore;
use crate::finalize::{NoopFinalizer, OrderFinalizer};
use crate::repository::OrderRepository;

/// A workflow transition requested by an actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Initiate,
    /// Approve the named stage (e.g. "gm").
    Approve(String),
    Confirm,
}

impl Transition {
    pub fn approve(stage: impl Into<String>) -> Self {
        Transition::Approve(stage.into())
    }

    pub fn name(&self) -> &str {
        match self {
            Transition::Initiate => "initiate",
            Transition::Approve(stage) => stage,
            Transition::Confirm => "confirm",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Committed. `children` holds orders created by a split.
    Applied {
        order: PurchaseOrder,
        children: Vec<PurchaseOrder>,
    },
    /// Not applicable in the order's current state (lenient policy).
    Skipped { order: PurchaseOrder },
}

impl TransitionOutcome {
    pub fn order(&self) -> &PurchaseOrder {
        match self {
            TransitionOutcome::Applied { order, .. } | TransitionOutcome::Skipped { order } => order,
        }
    }

    pub fn children(&self) -> &[PurchaseOrder] {
        match self {
            TransitionOutcome::Applied { children, .. } => children,
            TransitionOutcome::Skipped { .. } => &[],
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied { .. })
    }
}

/// Outcome of one order in a batch.
#[derive(Debug)]
pub struct BatchResult {
    pub order_id: PurchaseOrderId,
    pub result: Result<TransitionOutcome, WorkflowError>,
}

pub struct WorkflowCoordinator<S> {
    repository: OrderRepository<S>,
    machine: ApprovalStateMachine,
    authz: Arc<dyn CapabilityCheck>,
    suppliers: Arc<dyn SupplierDirectory>,
    audit: Arc<dyn AuditLog>,
    finalizer: Arc<dyn OrderFinalizer>,
    confirm_on_final_approval: bool,
}

impl<S: EventStore> WorkflowCoordinator<S> {
    /// Coordinator with `TracingAuditLog` and `NoopFinalizer`.
    pub fn new(
        store: S,
        machine: ApprovalStateMachine,
        authz: Arc<dyn CapabilityCheck>,
        suppliers: Arc<dyn SupplierDirectory>,
    ) -> Self {
        Self {
            repository: OrderRepository::new(store),
            machine,
            authz,
            suppliers,
            audit: Arc::new(TracingAuditLog),
            finalizer: Arc::new(NoopFinalizer),
            confirm_on_final_approval: false,
        }
    }

    pub fn from_config(
        config: &WorkflowConfig,
        store: S,
        authz: Arc<dyn CapabilityCheck>,
        suppliers: Arc<dyn SupplierDirectory>,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(store, config.state_machine()?, authz, suppliers)
            .with_confirm_on_final_approval(config.confirm_on_final_approval))
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_finalizer(mut self, finalizer: Arc<dyn OrderFinalizer>) -> Self {
        self.finalizer = finalizer;
        self
    }

    pub fn with_confirm_on_final_approval(mut self, enabled: bool) -> Self {
        self.confirm_on_final_approval = enabled;
        self
    }

    pub fn machine(&self) -> &ApprovalStateMachine {
        &self.machine
    }

    pub fn store(&self) -> &S {
        self.repository.store()
    }

    pub fn load(&self, order_id: PurchaseOrderId) -> Result<PurchaseOrder, WorkflowError> {
        self.repository.load_in_chain(order_id, self.machine.chain())
    }

    // ── Edits ───────────────────────────────────────────────────────────────

    /// Start a new draft request.
    pub fn create_order(
        &self,
        branch: BranchId,
        initiated_by: Option<ActorId>,
        display_toggles: DisplayToggles,
    ) -> Result<PurchaseOrder, WorkflowError> {
        let order_id = PurchaseOrderId::generate();
        let mut order = PurchaseOrder::empty(order_id);
        let events = order.handle(&PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
            order_id,
            branch,
            initiated_by,
            display_toggles,
            occurred_at: Utc::now(),
        }))?;

        let mut uow = self.repository.begin();
        self.repository.stage_new(&mut uow, order_id, &events)?;
        uow.commit()?;

        order.apply_all(&events);
        tracing::info!(%order_id, %branch, "purchase request created");
        Ok(order)
    }

    /// Apply an edit command after validating it at the mutation boundary.
    ///
    /// A line added without a vendor is pre-filled when exactly one supplier
    /// is known to sell the product.
    pub fn edit(&self, command: PurchaseOrderCommand) -> Result<PurchaseOrder, WorkflowError> {
        let order_id = command.order_id();
        let command = self.prepare_edit(command)?;

        let order = self.repository.load_in_chain(order_id, self.machine.chain())?;
        let events = order
            .handle(&command)
            .map_err(|e| WorkflowError::from_domain(order_id, e))?;
        if events.is_empty() {
            return Ok(order);
        }

        let mut uow = self.repository.begin();
        self.repository.stage(&mut uow, &order, &events)?;
        uow.commit()?;

        let mut updated = order;
        updated.apply_all(&events);
        tracing::debug!(%order_id, events = events.len(), "purchase request edited");
        Ok(updated)
    }

    /// Vendors a line for `product` may be assigned to.
    pub fn suggest_vendor_domain(&self, product: ProductId) -> VendorDomain {
        suggest_vendor_domain(&*self.suppliers, product)
    }

    fn prepare_edit(
        &self,
        mut command: PurchaseOrderCommand,
    ) -> Result<PurchaseOrderCommand, WorkflowError> {
        let suppliers = &*self.suppliers;
        match &mut command {
            PurchaseOrderCommand::CreatePurchaseOrder(_) => {
                return Err(WorkflowError::Validation(
                    "orders are created with create_order".to_string(),
                ));
            }
            PurchaseOrderCommand::AddLine(cmd) => {
                if cmd.vendor.is_none() {
                    cmd.vendor = default_vendor_for(suppliers, cmd.product.id);
                }
                validate_line(suppliers, cmd.quantity, cmd.vendor)?;
            }
            PurchaseOrderCommand::ChangeQuantity(cmd) => validate_quantity(cmd.quantity)?,
            PurchaseOrderCommand::AssignLineVendor(cmd) => {
                if let Some(vendor) = cmd.vendor {
                    validate_vendor(suppliers, vendor)?;
                }
            }
            PurchaseOrderCommand::RecordVendorAssignment(cmd) => {
                validate_line(suppliers, cmd.quantity, Some(cmd.vendor))?;
            }
            PurchaseOrderCommand::SetPrimaryVendor(cmd) => {
                if let Some(vendor) = cmd.vendor {
                    validate_vendor(suppliers, vendor)?;
                }
            }
            PurchaseOrderCommand::RemoveLine(_) | PurchaseOrderCommand::SetDisplayToggles(_) => {}
        }
        Ok(command)
    }

    // ── Transitions ─────────────────────────────────────────────────────────

    pub fn initiate(
        &self,
        order_id: PurchaseOrderId,
        actor: ActorId,
    ) -> Result<TransitionOutcome, WorkflowError> {
        self.apply(order_id, &Transition::Initiate, actor)
    }

    pub fn approve(
        &self,
        order_id: PurchaseOrderId,
        stage: &str,
        actor: ActorId,
    ) -> Result<TransitionOutcome, WorkflowError> {
        self.apply(order_id, &Transition::approve(stage), actor)
    }

    pub fn confirm(
        &self,
        order_id: PurchaseOrderId,
        actor: ActorId,
    ) -> Result<TransitionOutcome, WorkflowError> {
        self.apply(order_id, &Transition::Confirm, actor)
    }

    /// Apply `transition` to each order independently, in the given order.
    /// One order's failure does not affect the others.
    pub fn apply_batch(
        &self,
        order_ids: &[PurchaseOrderId],
        transition: &Transition,
        actor: ActorId,
    ) -> Vec<BatchResult> {
        order_ids
            .iter()
            .map(|&order_id| BatchResult {
                order_id,
                result: self.apply(order_id, transition, actor),
            })
            .collect()
    }

    pub fn apply(
        &self,
        order_id: PurchaseOrderId,
        transition: &Transition,
        actor: ActorId,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let result = self.run(order_id, transition, actor);
        match &result {
            Ok(TransitionOutcome::Applied { order, children }) => tracing::info!(
                %order_id,
                %actor,
                transition = transition.name(),
                state = self.machine.chain().state_label(&order.approval_state()),
                children = children.len(),
                "transition applied"
            ),
            Ok(TransitionOutcome::Skipped { order }) => tracing::debug!(
                %order_id,
                transition = transition.name(),
                state = self.machine.chain().state_label(&order.approval_state()),
                "transition skipped"
            ),
            Err(err) => tracing::warn!(
                %order_id,
                %actor,
                transition = transition.name(),
                error = %err,
                "transition rejected"
            ),
        }
        result
    }

    fn run(
        &self,
        order_id: PurchaseOrderId,
        transition: &Transition,
        actor: ActorId,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let order = self.repository.load_in_chain(order_id, self.machine.chain())?;
        let now = Utc::now();
        let domain = |e| WorkflowError::from_domain(order_id, e);

        match transition {
            Transition::Initiate => {
                let events = self.machine.initiate(&order, actor, now).map_err(domain)?;
                self.commit_events(order, events)
            }
            Transition::Approve(stage) => {
                let events = self
                    .machine
                    .approve_named(&order, stage, actor, &*self.authz, now)
                    .map_err(domain)?;
                if events.is_empty() || !self.confirms_on(stage) {
                    return self.commit_events(order, events);
                }

                let mut approved = order.clone();
                approved.apply_all(&events);
                let plan = self
                    .machine
                    .confirm(&approved, actor, now, PurchaseOrderId::generate)
                    .map_err(domain)?;
                self.commit_confirmation(order, events, plan)
            }
            Transition::Confirm => {
                let plan = self
                    .machine
                    .confirm(&order, actor, now, PurchaseOrderId::generate)
                    .map_err(domain)?;
                self.commit_confirmation(order, Vec::new(), plan)
            }
        }
    }

    fn confirms_on(&self, stage: &str) -> bool {
        let chain = self.machine.chain();
        self.confirm_on_final_approval
            && chain.stage_index(stage) == Some(chain.final_stage_index())
    }

    fn commit_events(
        &self,
        order: PurchaseOrder,
        events: Vec<PurchaseOrderEvent>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        if events.is_empty() {
            return Ok(TransitionOutcome::Skipped { order });
        }

        let mut uow = self.repository.begin();
        self.repository.stage(&mut uow, &order, &events)?;
        uow.commit()?;

        let mut updated = order;
        updated.apply_all(&events);
        self.audit(updated.id_typed(), &events);
        Ok(TransitionOutcome::Applied {
            order: updated,
            children: Vec::new(),
        })
    }

    /// Commit a confirmation: parent events (prefixed by `leading`) and every
    /// split child go into one unit of work. Live orders are finalized before
    /// the commit; any failure revokes what was finalized and writes nothing.
    fn commit_confirmation(
        &self,
        order: PurchaseOrder,
        leading: Vec<PurchaseOrderEvent>,
        plan: ConfirmPlan,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let (plan_events, child_plans) = match plan {
            ConfirmPlan::Skipped => return self.commit_events(order, leading),
            ConfirmPlan::InPlace(events) => (events, Vec::new()),
            ConfirmPlan::Split(SplitPlan {
                parent_events,
                children,
            }) => (parent_events, children),
        };

        let order_id = order.id_typed();
        let mut parent_events = leading;
        parent_events.extend(plan_events);

        let mut uow = self.repository.begin();
        self.repository.stage(&mut uow, &order, &parent_events)?;
        let mut parent = order;
        parent.apply_all(&parent_events);

        let mut children = Vec::with_capacity(child_plans.len());
        for child in &child_plans {
            self.repository
                .stage_new(&mut uow, child.order_id, &child.events)
                .map_err(|e| WorkflowError::SplitFailed {
                    order_id: child.order_id,
                    reason: e.to_string(),
                })?;
            let mut materialized = PurchaseOrder::empty(child.order_id);
            materialized.apply_all(&child.events);
            children.push(materialized);
        }

        let live: Vec<&PurchaseOrder> = if children.is_empty() {
            vec![&parent]
        } else {
            children.iter().collect()
        };
        let mut finalized = Vec::with_capacity(live.len());
        for target in live {
            if let Err(err) = self.finalizer.finalize(target) {
                self.revoke(&finalized);
                uow.rollback();
                let failed = target.id_typed();
                return Err(if failed == order_id {
                    WorkflowError::Finalize {
                        order_id,
                        reason: err.to_string(),
                    }
                } else {
                    WorkflowError::SplitFailed {
                        order_id: failed,
                        reason: err.to_string(),
                    }
                });
            }
            finalized.push(target.id_typed());
        }

        if let Err(err) = uow.commit() {
            self.revoke(&finalized);
            return Err(err.into());
        }

        self.audit(order_id, &parent_events);
        for (child, plan) in children.iter().zip(&child_plans) {
            self.audit(child.id_typed(), &plan.events);
        }

        Ok(TransitionOutcome::Applied {
            order: parent,
            children,
        })
    }

    fn revoke(&self, finalized: &[PurchaseOrderId]) {
        for order_id in finalized.iter().rev() {
            tracing::debug!(%order_id, "revoking finalized order");
            self.finalizer.revoke(*order_id);
        }
    }

    fn audit(&self, order_id: PurchaseOrderId, events: &[PurchaseOrderEvent]) {
        for message in events.iter().filter_map(|e| self.machine.describe(e)) {
            if let Err(err) = self.audit.record(order_id, &message) {
                tracing::warn!(%order_id, error = %err, "audit delivery failed");
            }
        }
    }
}
