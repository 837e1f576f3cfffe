//! Purchasing domain: multi-level approval of purchase requests.
//!
//! Pure, deterministic domain logic (no IO, no storage):
//! - `order`: the `PurchaseOrder` aggregate, its edit commands and events
//! - `line`: line items, auxiliary vendor assignments, mutation-time validation
//! - `vendor`: vendor resolution and grouping
//! - `approval`: the approval chain and `ApprovalStateMachine`
//! - `split`: per-vendor order splitting at confirmation

pub mod approval;
pub mod line;
pub mod order;
pub mod split;
pub mod vendor;

pub use approval::{
    ApprovalChain, ApprovalState, ApprovalStateMachine, CAP_APPROVE_GM, CAP_APPROVE_LEVEL1,
    CAP_APPROVE_LEVEL2, StageDefinition, TransitionPolicy,
};
pub use line::{
    LineItem, ProductId, ProductRef, SupplierDirectory, VendorAssignment, VendorDomain, VendorId,
    default_vendor_for, suggest_vendor_domain, validate_line, validate_quantity, validate_vendor,
};
pub use order::{
    AddLine, AssignLineVendor, ChangeQuantity, CreatePurchaseOrder, DisplayToggles,
    OrderOverrides, PurchaseOrder, PurchaseOrderCommand, PurchaseOrderEvent, PurchaseOrderId,
    RecordVendorAssignment, RemoveLine, SetDisplayToggles, SetPrimaryVendor, SplitChild,
};
pub use split::{ChildOrder, ConfirmPlan, OrderSplitter, SplitPlan};
pub use vendor::{VendorGroup, VendorGrouping, VendorResolution, VendorResolver, VendorSource};
