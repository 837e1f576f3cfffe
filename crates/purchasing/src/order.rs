use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use procureflow_core::{
    ActorId, Aggregate, AggregateId, AggregateRoot, BranchId, DomainError, DomainResult,
};
use procureflow_events::Event;

use crate::approval::ApprovalState;
use crate::line::{LineItem, ProductId, ProductRef, VendorAssignment, VendorId, validate_quantity};

/// Purchase order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseOrderId(pub AggregateId);

impl PurchaseOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(AggregateId::new())
    }
}

impl core::fmt::Display for PurchaseOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Which monetary columns a document shows. Presentation only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayToggles {
    pub show_unit_price: bool,
    pub show_amounts: bool,
    pub show_taxes: bool,
}

/// Child order reference recorded on a split parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitChild {
    pub order_id: PurchaseOrderId,
    pub vendor: VendorId,
}

/// Aggregate root: PurchaseOrder (a purchase request moving through approval).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOrder {
    id: PurchaseOrderId,
    branch: Option<BranchId>,
    approval_state: ApprovalState,
    primary_vendor: Option<VendorId>,
    initiated_by: Option<ActorId>,
    lines: Vec<LineItem>,
    vendor_assignments: Vec<VendorAssignment>,
    display_toggles: DisplayToggles,
    split_from: Option<PurchaseOrderId>,
    split_into: Vec<SplitChild>,
    confirmed_by: Option<ActorId>,
    version: u64,
    created: bool,
}

impl PurchaseOrder {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PurchaseOrderId) -> Self {
        Self {
            id,
            branch: None,
            approval_state: ApprovalState::Draft,
            primary_vendor: None,
            initiated_by: None,
            lines: Vec::new(),
            vendor_assignments: Vec::new(),
            display_toggles: DisplayToggles::default(),
            split_from: None,
            split_into: Vec::new(),
            confirmed_by: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PurchaseOrderId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Owning branch. Always `Some` once the order is created.
    pub fn branch(&self) -> Option<BranchId> {
        self.branch
    }

    pub fn approval_state(&self) -> ApprovalState {
        self.approval_state
    }

    pub fn primary_vendor(&self) -> Option<VendorId> {
        self.primary_vendor
    }

    pub fn initiated_by(&self) -> Option<ActorId> {
        self.initiated_by
    }

    pub fn lines(&self) -> &[LineItem] {
        &self.lines
    }

    pub fn line(&self, line_no: u32) -> Option<&LineItem> {
        self.lines.iter().find(|l| l.line_no() == line_no)
    }

    pub fn vendor_assignments(&self) -> &[VendorAssignment] {
        &self.vendor_assignments
    }

    pub fn display_toggles(&self) -> DisplayToggles {
        self.display_toggles
    }

    /// Parent order this one was split from.
    pub fn split_from(&self) -> Option<PurchaseOrderId> {
        self.split_from
    }

    /// Child orders created when this order was split at confirmation.
    pub fn split_into(&self) -> &[SplitChild] {
        &self.split_into
    }

    pub fn confirmed_by(&self) -> Option<ActorId> {
        self.confirmed_by
    }

    pub fn is_confirmed(&self) -> bool {
        self.approval_state == ApprovalState::Confirmed
    }

    /// Build the creation event of a child order: administrative fields are
    /// copied from `self`, vendor and lines come from `overrides`.
    pub fn clone_with_overrides(
        &self,
        child_id: PurchaseOrderId,
        overrides: OrderOverrides,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<SplitOrderCreated> {
        let branch = self.branch.ok_or_else(DomainError::not_found)?;
        if child_id == self.id {
            return Err(DomainError::invariant("split child cannot reuse the parent id"));
        }
        if overrides.lines.is_empty() {
            return Err(DomainError::invariant("split child must carry at least one line"));
        }

        Ok(SplitOrderCreated {
            order_id: child_id,
            parent_id: self.id,
            branch,
            initiated_by: self.initiated_by,
            display_toggles: self.display_toggles,
            approval_state: self.approval_state,
            vendor: overrides.vendor,
            lines: overrides.lines,
            occurred_at,
        })
    }
}

/// Fields a split child takes from its vendor group rather than from the parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderOverrides {
    pub vendor: VendorId,
    pub lines: Vec<LineItem>,
}

impl AggregateRoot for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands (edits). Workflow transitions are decided by `ApprovalStateMachine`.
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePurchaseOrder {
    pub order_id: PurchaseOrderId,
    pub branch: BranchId,
    pub initiated_by: Option<ActorId>,
    pub display_toggles: DisplayToggles,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddLine (draft only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLine {
    pub order_id: PurchaseOrderId,
    pub product: ProductRef,
    pub quantity: i64,
    pub vendor: Option<VendorId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeQuantity (draft only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeQuantity {
    pub order_id: PurchaseOrderId,
    pub line_no: u32,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveLine (draft only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveLine {
    pub order_id: PurchaseOrderId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AssignLineVendor (`None` clears the assignment).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignLineVendor {
    pub order_id: PurchaseOrderId,
    pub line_no: u32,
    pub vendor: Option<VendorId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordVendorAssignment {
    pub order_id: PurchaseOrderId,
    pub product: ProductId,
    pub vendor: VendorId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPrimaryVendor {
    pub order_id: PurchaseOrderId,
    pub vendor: Option<VendorId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetDisplayToggles {
    pub order_id: PurchaseOrderId,
    pub display_toggles: DisplayToggles,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderCommand {
    CreatePurchaseOrder(CreatePurchaseOrder),
    AddLine(AddLine),
    ChangeQuantity(ChangeQuantity),
    RemoveLine(RemoveLine),
    AssignLineVendor(AssignLineVendor),
    RecordVendorAssignment(RecordVendorAssignment),
    SetPrimaryVendor(SetPrimaryVendor),
    SetDisplayToggles(SetDisplayToggles),
}

impl PurchaseOrderCommand {
    pub fn order_id(&self) -> PurchaseOrderId {
        match self {
            PurchaseOrderCommand::CreatePurchaseOrder(c) => c.order_id,
            PurchaseOrderCommand::AddLine(c) => c.order_id,
            PurchaseOrderCommand::ChangeQuantity(c) => c.order_id,
            PurchaseOrderCommand::RemoveLine(c) => c.order_id,
            PurchaseOrderCommand::AssignLineVendor(c) => c.order_id,
            PurchaseOrderCommand::RecordVendorAssignment(c) => c.order_id,
            PurchaseOrderCommand::SetPrimaryVendor(c) => c.order_id,
            PurchaseOrderCommand::SetDisplayToggles(c) => c.order_id,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderCreated {
    pub order_id: PurchaseOrderId,
    pub branch: BranchId,
    pub initiated_by: Option<ActorId>,
    pub display_toggles: DisplayToggles,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAdded {
    pub order_id: PurchaseOrderId,
    pub line_no: u32,
    pub product: ProductRef,
    pub quantity: i64,
    pub vendor: Option<VendorId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineQuantityChanged {
    pub order_id: PurchaseOrderId,
    pub line_no: u32,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRemoved {
    pub order_id: PurchaseOrderId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineVendorAssigned {
    pub order_id: PurchaseOrderId,
    pub line_no: u32,
    pub vendor: Option<VendorId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorAssignmentRecorded {
    pub order_id: PurchaseOrderId,
    pub assignment: VendorAssignment,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryVendorSet {
    pub order_id: PurchaseOrderId,
    pub vendor: Option<VendorId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayTogglesChanged {
    pub order_id: PurchaseOrderId,
    pub display_toggles: DisplayToggles,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestInitiated (draft → submitted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestInitiated {
    pub order_id: PurchaseOrderId,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StageApproved (an approval stage of the chain was granted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageApproved {
    pub order_id: PurchaseOrderId,
    pub stage_index: usize,
    pub stage_name: String,
    pub actor: ActorId,
    /// The single resolved vendor was copied onto the order by this approval.
    pub vendor_auto_copied: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SplitOrderCreated (a child order materialised from a split parent).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitOrderCreated {
    pub order_id: PurchaseOrderId,
    pub parent_id: PurchaseOrderId,
    pub branch: BranchId,
    pub initiated_by: Option<ActorId>,
    pub display_toggles: DisplayToggles,
    pub approval_state: ApprovalState,
    pub vendor: VendorId,
    pub lines: Vec<LineItem>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderSplit (provenance on the parent).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSplit {
    pub order_id: PurchaseOrderId,
    pub children: Vec<SplitChild>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderConfirmed (terminal).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderConfirmed {
    pub order_id: PurchaseOrderId,
    pub actor: ActorId,
    /// Vendor the order is committed to; `None` for a split parent.
    pub vendor: Option<VendorId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderEvent {
    PurchaseOrderCreated(PurchaseOrderCreated),
    LineAdded(LineAdded),
    LineQuantityChanged(LineQuantityChanged),
    LineRemoved(LineRemoved),
    LineVendorAssigned(LineVendorAssigned),
    VendorAssignmentRecorded(VendorAssignmentRecorded),
    PrimaryVendorSet(PrimaryVendorSet),
    DisplayTogglesChanged(DisplayTogglesChanged),
    RequestInitiated(RequestInitiated),
    StageApproved(StageApproved),
    SplitOrderCreated(SplitOrderCreated),
    OrderSplit(OrderSplit),
    OrderConfirmed(OrderConfirmed),
}

impl Event for PurchaseOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(_) => "purchasing.order.created",
            PurchaseOrderEvent::LineAdded(_) => "purchasing.order.line_added",
            PurchaseOrderEvent::LineQuantityChanged(_) => "purchasing.order.line_quantity_changed",
            PurchaseOrderEvent::LineRemoved(_) => "purchasing.order.line_removed",
            PurchaseOrderEvent::LineVendorAssigned(_) => "purchasing.order.line_vendor_assigned",
            PurchaseOrderEvent::VendorAssignmentRecorded(_) => {
                "purchasing.order.vendor_assignment_recorded"
            }
            PurchaseOrderEvent::PrimaryVendorSet(_) => "purchasing.order.primary_vendor_set",
            PurchaseOrderEvent::DisplayTogglesChanged(_) => "purchasing.order.display_toggles_changed",
            PurchaseOrderEvent::RequestInitiated(_) => "purchasing.order.initiated",
            PurchaseOrderEvent::StageApproved(_) => "purchasing.order.stage_approved",
            PurchaseOrderEvent::SplitOrderCreated(_) => "purchasing.order.split_child_created",
            PurchaseOrderEvent::OrderSplit(_) => "purchasing.order.split",
            PurchaseOrderEvent::OrderConfirmed(_) => "purchasing.order.confirmed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => e.occurred_at,
            PurchaseOrderEvent::LineAdded(e) => e.occurred_at,
            PurchaseOrderEvent::LineQuantityChanged(e) => e.occurred_at,
            PurchaseOrderEvent::LineRemoved(e) => e.occurred_at,
            PurchaseOrderEvent::LineVendorAssigned(e) => e.occurred_at,
            PurchaseOrderEvent::VendorAssignmentRecorded(e) => e.occurred_at,
            PurchaseOrderEvent::PrimaryVendorSet(e) => e.occurred_at,
            PurchaseOrderEvent::DisplayTogglesChanged(e) => e.occurred_at,
            PurchaseOrderEvent::RequestInitiated(e) => e.occurred_at,
            PurchaseOrderEvent::StageApproved(e) => e.occurred_at,
            PurchaseOrderEvent::SplitOrderCreated(e) => e.occurred_at,
            PurchaseOrderEvent::OrderSplit(e) => e.occurred_at,
            PurchaseOrderEvent::OrderConfirmed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PurchaseOrder {
    type Command = PurchaseOrderCommand;
    type Event = PurchaseOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => {
                self.id = e.order_id;
                self.branch = Some(e.branch);
                self.initiated_by = e.initiated_by;
                self.display_toggles = e.display_toggles;
                self.approval_state = ApprovalState::Draft;
                self.lines.clear();
                self.created = true;
            }
            PurchaseOrderEvent::LineAdded(e) => {
                if let Some(branch) = self.branch {
                    self.lines.push(LineItem::new(
                        e.line_no,
                        e.product.clone(),
                        e.quantity,
                        e.vendor,
                        branch,
                    ));
                }
            }
            PurchaseOrderEvent::LineQuantityChanged(e) => {
                if let Some(line) = self.lines.iter_mut().find(|l| l.line_no() == e.line_no) {
                    line.set_quantity(e.quantity);
                }
            }
            PurchaseOrderEvent::LineRemoved(e) => {
                self.lines.retain(|l| l.line_no() != e.line_no);
            }
            PurchaseOrderEvent::LineVendorAssigned(e) => {
                if let Some(line) = self.lines.iter_mut().find(|l| l.line_no() == e.line_no) {
                    line.set_vendor(e.vendor);
                }
            }
            PurchaseOrderEvent::VendorAssignmentRecorded(e) => {
                self.vendor_assignments.push(e.assignment.clone());
            }
            PurchaseOrderEvent::PrimaryVendorSet(e) => {
                self.primary_vendor = e.vendor;
            }
            PurchaseOrderEvent::DisplayTogglesChanged(e) => {
                self.display_toggles = e.display_toggles;
            }
            PurchaseOrderEvent::RequestInitiated(e) => {
                self.approval_state = ApprovalState::Submitted;
                if self.initiated_by.is_none() {
                    self.initiated_by = Some(e.actor);
                }
            }
            PurchaseOrderEvent::StageApproved(e) => {
                self.approval_state = ApprovalState::StageApproved(e.stage_index);
            }
            PurchaseOrderEvent::SplitOrderCreated(e) => {
                self.id = e.order_id;
                self.branch = Some(e.branch);
                self.initiated_by = e.initiated_by;
                self.display_toggles = e.display_toggles;
                self.approval_state = e.approval_state;
                self.primary_vendor = Some(e.vendor);
                self.lines = e.lines.clone();
                self.split_from = Some(e.parent_id);
                self.created = true;
            }
            PurchaseOrderEvent::OrderSplit(e) => {
                self.split_into = e.children.clone();
            }
            PurchaseOrderEvent::OrderConfirmed(e) => {
                self.approval_state = ApprovalState::Confirmed;
                self.confirmed_by = Some(e.actor);
                // A split parent commits to no vendor; its children do.
                self.primary_vendor = e.vendor;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if let PurchaseOrderCommand::CreatePurchaseOrder(cmd) = command {
            return self.handle_create(cmd);
        }

        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_order_id(command.order_id())?;

        match command {
            PurchaseOrderCommand::CreatePurchaseOrder(_) => Ok(vec![]),
            PurchaseOrderCommand::AddLine(cmd) => self.handle_add_line(cmd),
            PurchaseOrderCommand::ChangeQuantity(cmd) => self.handle_change_quantity(cmd),
            PurchaseOrderCommand::RemoveLine(cmd) => self.handle_remove_line(cmd),
            PurchaseOrderCommand::AssignLineVendor(cmd) => self.handle_assign_line_vendor(cmd),
            PurchaseOrderCommand::RecordVendorAssignment(cmd) => {
                self.handle_record_vendor_assignment(cmd)
            }
            PurchaseOrderCommand::SetPrimaryVendor(cmd) => self.handle_set_primary_vendor(cmd),
            PurchaseOrderCommand::SetDisplayToggles(cmd) => Ok(vec![
                PurchaseOrderEvent::DisplayTogglesChanged(DisplayTogglesChanged {
                    order_id: cmd.order_id,
                    display_toggles: cmd.display_toggles,
                    occurred_at: cmd.occurred_at,
                }),
            ]),
        }
    }
}

impl PurchaseOrder {
    fn ensure_order_id(&self, order_id: PurchaseOrderId) -> DomainResult<()> {
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_draft(&self) -> DomainResult<()> {
        if self.approval_state != ApprovalState::Draft {
            return Err(DomainError::invariant(
                "lines can only be changed while the request is a draft",
            ));
        }
        Ok(())
    }

    fn ensure_not_confirmed(&self) -> DomainResult<()> {
        if self.is_confirmed() {
            return Err(DomainError::invariant("confirmed orders cannot be modified"));
        }
        Ok(())
    }

    fn ensure_line(&self, line_no: u32) -> DomainResult<&LineItem> {
        self.line(line_no)
            .ok_or_else(|| DomainError::validation(format!("unknown line {line_no}")))
    }

    fn handle_create(&self, cmd: &CreatePurchaseOrder) -> DomainResult<Vec<PurchaseOrderEvent>> {
        if self.created {
            return Err(DomainError::conflict("purchase order already exists"));
        }

        Ok(vec![PurchaseOrderEvent::PurchaseOrderCreated(PurchaseOrderCreated {
            order_id: cmd.order_id,
            branch: cmd.branch,
            initiated_by: cmd.initiated_by,
            display_toggles: cmd.display_toggles,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_line(&self, cmd: &AddLine) -> DomainResult<Vec<PurchaseOrderEvent>> {
        self.ensure_draft()?;
        validate_quantity(cmd.quantity)?;

        // Removed lines leave gaps; numbering continues from the highest.
        let next_line_no = self.lines.iter().map(|l| l.line_no()).max().unwrap_or(0) + 1;
        Ok(vec![PurchaseOrderEvent::LineAdded(LineAdded {
            order_id: cmd.order_id,
            line_no: next_line_no,
            product: cmd.product.clone(),
            quantity: cmd.quantity,
            vendor: cmd.vendor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_quantity(&self, cmd: &ChangeQuantity) -> DomainResult<Vec<PurchaseOrderEvent>> {
        self.ensure_draft()?;
        self.ensure_line(cmd.line_no)?;
        validate_quantity(cmd.quantity)?;

        Ok(vec![PurchaseOrderEvent::LineQuantityChanged(LineQuantityChanged {
            order_id: cmd.order_id,
            line_no: cmd.line_no,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_line(&self, cmd: &RemoveLine) -> DomainResult<Vec<PurchaseOrderEvent>> {
        self.ensure_draft()?;
        self.ensure_line(cmd.line_no)?;

        Ok(vec![PurchaseOrderEvent::LineRemoved(LineRemoved {
            order_id: cmd.order_id,
            line_no: cmd.line_no,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_assign_line_vendor(
        &self,
        cmd: &AssignLineVendor,
    ) -> DomainResult<Vec<PurchaseOrderEvent>> {
        self.ensure_not_confirmed()?;
        let line = self.ensure_line(cmd.line_no)?;
        if line.assigned_vendor() == cmd.vendor {
            return Ok(vec![]);
        }

        Ok(vec![PurchaseOrderEvent::LineVendorAssigned(LineVendorAssigned {
            order_id: cmd.order_id,
            line_no: cmd.line_no,
            vendor: cmd.vendor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_vendor_assignment(
        &self,
        cmd: &RecordVendorAssignment,
    ) -> DomainResult<Vec<PurchaseOrderEvent>> {
        self.ensure_not_confirmed()?;
        validate_quantity(cmd.quantity)?;
        let branch = self.branch.ok_or_else(DomainError::not_found)?;

        Ok(vec![PurchaseOrderEvent::VendorAssignmentRecorded(
            VendorAssignmentRecorded {
                order_id: cmd.order_id,
                assignment: VendorAssignment {
                    branch,
                    product: cmd.product,
                    vendor: cmd.vendor,
                    quantity: cmd.quantity,
                },
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_set_primary_vendor(
        &self,
        cmd: &SetPrimaryVendor,
    ) -> DomainResult<Vec<PurchaseOrderEvent>> {
        self.ensure_not_confirmed()?;
        if self.primary_vendor == cmd.vendor {
            return Ok(vec![]);
        }

        Ok(vec![PurchaseOrderEvent::PrimaryVendorSet(PrimaryVendorSet {
            order_id: cmd.order_id,
            vendor: cmd.vendor,
            occurred_at: cmd.occurred_at,
        })])
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::line::test_support::{product, vendor};

    #[test]
    fn create_emits_created_event_in_draft() {
        let id = order_id();
        let branch = BranchId::new();
        let order = PurchaseOrder::empty(id);
        let events = order
            .handle(&PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
                order_id: id,
                branch,
                initiated_by: None,
                display_toggles: DisplayToggles {
                    show_unit_price: true,
                    ..DisplayToggles::default()
                },
                occurred_at: test_time(),
            }))
            .unwrap();

        let mut order = order;
        order.apply_all(&events);
        assert!(order.is_created());
        assert_eq!(order.branch(), Some(branch));
        assert_eq!(order.approval_state(), ApprovalState::Draft);
        assert!(order.display_toggles().show_unit_price);
        assert_eq!(order.version(), 1);
    }

    #[test]
    fn commands_on_missing_order_are_not_found() {
        let id = order_id();
        let order = PurchaseOrder::empty(id);
        let err = order
            .handle(&PurchaseOrderCommand::SetPrimaryVendor(SetPrimaryVendor {
                order_id: id,
                vendor: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn lines_mirror_order_branch() {
        let order = draft_order(&[(product("A"), None), (product("B"), None)]);
        let branch = order.branch().unwrap();
        assert!(order.lines().iter().all(|l| l.branch() == branch));
        assert_eq!(
            order.lines().iter().map(|l| l.line_no()).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[test]
    fn add_line_rejects_non_positive_quantity() {
        let order = draft_order(&[]);
        let err = order
            .handle(&PurchaseOrderCommand::AddLine(AddLine {
                order_id: order.id_typed(),
                product: product("A"),
                quantity: 0,
                vendor: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn line_numbers_continue_after_removal() {
        let mut order = draft_order(&[(product("A"), None), (product("B"), None)]);
        let id = order.id_typed();
        execute(
            &mut order,
            PurchaseOrderCommand::RemoveLine(RemoveLine {
                order_id: id,
                line_no: 2,
                occurred_at: test_time(),
            }),
        );
        execute(
            &mut order,
            PurchaseOrderCommand::AddLine(AddLine {
                order_id: id,
                product: product("C"),
                quantity: 4,
                vendor: None,
                occurred_at: test_time(),
            }),
        );

        let nos: Vec<u32> = order.lines().iter().map(|l| l.line_no()).collect();
        assert_eq!(nos, vec![1, 3]);
    }

    #[test]
    fn change_quantity_on_unknown_line_is_validation_error() {
        let order = draft_order(&[(product("A"), None)]);
        let err = order
            .handle(&PurchaseOrderCommand::ChangeQuantity(ChangeQuantity {
                order_id: order.id_typed(),
                line_no: 9,
                quantity: 2,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("unknown line")));
    }

    #[test]
    fn assigning_same_vendor_twice_is_a_no_op() {
        let v1 = vendor();
        let mut order = draft_order(&[(product("A"), None)]);
        let id = order.id_typed();
        let cmd = PurchaseOrderCommand::AssignLineVendor(AssignLineVendor {
            order_id: id,
            line_no: 1,
            vendor: Some(v1),
            occurred_at: test_time(),
        });

        execute(&mut order, cmd.clone());
        assert_eq!(order.lines()[0].assigned_vendor(), Some(v1));
        assert!(order.handle(&cmd).unwrap().is_empty());
    }

    #[test]
    fn lines_are_frozen_after_submission() {
        let mut order = draft_order(&[(product("A"), None)]);
        let id = order.id_typed();
        order.apply(&PurchaseOrderEvent::RequestInitiated(RequestInitiated {
            order_id: id,
            actor: ActorId::new(),
            occurred_at: test_time(),
        }));

        let err = order
            .handle(&PurchaseOrderCommand::RemoveLine(RemoveLine {
                order_id: id,
                line_no: 1,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        // Vendor edits stay open until confirmation.
        let v1 = vendor();
        execute(
            &mut order,
            PurchaseOrderCommand::AssignLineVendor(AssignLineVendor {
                order_id: id,
                line_no: 1,
                vendor: Some(v1),
                occurred_at: test_time(),
            }),
        );
        assert_eq!(order.lines()[0].assigned_vendor(), Some(v1));
    }

    #[test]
    fn initiate_records_initiator_only_if_unset() {
        let mut order = draft_order(&[]);
        let first = ActorId::new();
        let second = ActorId::new();
        order.apply(&PurchaseOrderEvent::RequestInitiated(RequestInitiated {
            order_id: order.id_typed(),
            actor: first,
            occurred_at: test_time(),
        }));
        order.apply(&PurchaseOrderEvent::RequestInitiated(RequestInitiated {
            order_id: order.id_typed(),
            actor: second,
            occurred_at: test_time(),
        }));
        assert_eq!(order.initiated_by(), Some(first));
    }

    #[test]
    fn clone_with_overrides_copies_administrative_fields() {
        let v1 = vendor();
        let a = product("A");
        let parent = draft_order(&[(a.clone(), Some(v1))]);
        let child_id = order_id();

        let created = parent
            .clone_with_overrides(
                child_id,
                OrderOverrides {
                    vendor: v1,
                    lines: parent.lines().to_vec(),
                },
                test_time(),
            )
            .unwrap();

        let mut child = PurchaseOrder::empty(child_id);
        child.apply(&PurchaseOrderEvent::SplitOrderCreated(created));
        assert_eq!(child.branch(), parent.branch());
        assert_eq!(child.split_from(), Some(parent.id_typed()));
        assert_eq!(child.primary_vendor(), Some(v1));
        assert_eq!(child.lines(), parent.lines());
    }

    #[test]
    fn clone_with_overrides_rejects_parent_id_and_empty_lines() {
        let v1 = vendor();
        let parent = draft_order(&[(product("A"), Some(v1))]);

        let same_id = parent.clone_with_overrides(
            parent.id_typed(),
            OrderOverrides {
                vendor: v1,
                lines: parent.lines().to_vec(),
            },
            test_time(),
        );
        assert!(matches!(same_id, Err(DomainError::InvariantViolation(_))));

        let empty = parent.clone_with_overrides(
            order_id(),
            OrderOverrides {
                vendor: v1,
                lines: vec![],
            },
            test_time(),
        );
        assert!(matches!(empty, Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn events_serialize_with_stable_type_names() {
        let event = PurchaseOrderEvent::OrderConfirmed(OrderConfirmed {
            order_id: order_id(),
            actor: ActorId::new(),
            vendor: None,
            occurred_at: test_time(),
        });
        assert_eq!(event.event_type(), "purchasing.order.confirmed");
        let json = serde_json::to_value(&event).unwrap();
        let back: PurchaseOrderEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
