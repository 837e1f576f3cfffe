//! Approval chain and the state machine that walks an order through it.
//!
//! An order moves `draft → submitted → <stage 0> → … → <stage N-1> → confirmed`.
//! Each stage names the capability an approver needs; at most one stage is
//! vendor-gating and refuses to pass while any line lacks a vendor.
//!
//! Out-of-order requests are skipped (empty event list) unless the machine is
//! built with `TransitionPolicy::Strict`, in which case they fail with
//! `DomainError::InvalidTransition`.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use procureflow_auth::{CapabilityCheck, Permission, authorize};
use procureflow_core::{ActorId, DomainError, DomainResult};

use crate::order::{
    LineVendorAssigned, PrimaryVendorSet, PurchaseOrder, PurchaseOrderEvent, PurchaseOrderId,
    RequestInitiated, StageApproved,
};
use crate::split::{ConfirmPlan, OrderSplitter};
use crate::vendor::{VendorGrouping, VendorResolution, VendorResolver};

pub const CAP_APPROVE_GM: &str = "purchasing.approve.gm";
pub const CAP_APPROVE_LEVEL1: &str = "purchasing.approve.level1";
pub const CAP_APPROVE_LEVEL2: &str = "purchasing.approve.level2";

/// Position of an order in the approval chain.
///
/// Variant order is the forward order, so `a < b` means `b` is later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalState {
    Draft,
    Submitted,
    /// Stage `n` of the chain has approved.
    StageApproved(usize),
    Confirmed,
}

/// One approval stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    /// Short name used to address the stage (e.g. "gm").
    pub name: String,
    /// State label once this stage has approved (e.g. "gm_approved").
    pub state_label: String,
    pub capability: Permission,
    #[serde(default)]
    pub vendor_gating: bool,
    /// Audit message recorded when the stage approves.
    pub approval_message: String,
}

impl StageDefinition {
    pub fn new(
        name: impl Into<String>,
        state_label: impl Into<String>,
        capability: Permission,
        approval_message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            state_label: state_label.into(),
            capability,
            vendor_gating: false,
            approval_message: approval_message.into(),
        }
    }

    pub fn vendor_gating(mut self) -> Self {
        self.vendor_gating = true;
        self
    }
}

/// Ordered, validated list of approval stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalChain {
    stages: Vec<StageDefinition>,
}

impl ApprovalChain {
    /// Validate and build a chain: at least one stage, unique names and
    /// labels, at most one vendor-gating stage.
    pub fn new(stages: Vec<StageDefinition>) -> DomainResult<Self> {
        if stages.is_empty() {
            return Err(DomainError::validation("approval chain needs at least one stage"));
        }

        let mut names = HashSet::new();
        let mut labels = HashSet::new();
        for stage in &stages {
            if stage.name.trim().is_empty() {
                return Err(DomainError::validation("approval stage name cannot be empty"));
            }
            if !names.insert(stage.name.as_str()) {
                return Err(DomainError::validation(format!(
                    "duplicate approval stage '{}'",
                    stage.name
                )));
            }
            if matches!(stage.state_label.as_str(), "draft" | "submitted" | "confirmed")
                || !labels.insert(stage.state_label.as_str())
            {
                return Err(DomainError::validation(format!(
                    "state label '{}' is reserved or duplicated",
                    stage.state_label
                )));
            }
        }

        if stages.iter().filter(|s| s.vendor_gating).count() > 1 {
            return Err(DomainError::validation(
                "at most one approval stage may be vendor-gating",
            ));
        }

        Ok(Self { stages })
    }

    /// `submitted → gm → level1 → level2`, vendor-gated at the GM stage.
    pub fn standard() -> Self {
        Self {
            stages: vec![
                StageDefinition::new(
                    "gm",
                    "gm_approved",
                    Permission::from_static(CAP_APPROVE_GM),
                    "General Manager approved the order.",
                )
                .vendor_gating(),
                StageDefinition::new(
                    "level1",
                    "level1_approved",
                    Permission::from_static(CAP_APPROVE_LEVEL1),
                    "Level 1 approval granted.",
                ),
                StageDefinition::new(
                    "level2",
                    "level2_approved",
                    Permission::from_static(CAP_APPROVE_LEVEL2),
                    "Level 2 approval granted.",
                ),
            ],
        }
    }

    /// `submitted → level1 → level2`, no vendor-gating stage (vendors are
    /// still resolved at confirmation).
    pub fn two_level() -> Self {
        Self {
            stages: vec![
                StageDefinition::new(
                    "level1",
                    "waiting_l2",
                    Permission::from_static(CAP_APPROVE_LEVEL1),
                    "Approved by Level 1. Waiting Level 2 approval.",
                ),
                StageDefinition::new(
                    "level2",
                    "approved",
                    Permission::from_static(CAP_APPROVE_LEVEL2),
                    "Approved by Level 2. You can confirm the PO.",
                ),
            ],
        }
    }

    pub fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage(&self, index: usize) -> Option<&StageDefinition> {
        self.stages.get(index)
    }

    pub fn stage_index(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.name == name)
    }

    pub fn final_stage_index(&self) -> usize {
        self.stages.len().saturating_sub(1)
    }

    /// State an order must be in for stage `index` to approve.
    pub fn source_state(&self, index: usize) -> ApprovalState {
        match index {
            0 => ApprovalState::Submitted,
            n => ApprovalState::StageApproved(n - 1),
        }
    }

    /// State from which `confirm` is allowed.
    pub fn ready_to_confirm_state(&self) -> ApprovalState {
        ApprovalState::StageApproved(self.final_stage_index())
    }

    /// Human-facing label ("draft", "gm_approved", "confirmed", ...).
    pub fn state_label<'a>(&'a self, state: &ApprovalState) -> &'a str {
        match state {
            ApprovalState::Draft => "draft",
            ApprovalState::Submitted => "submitted",
            ApprovalState::StageApproved(i) => self
                .stages
                .get(*i)
                .map(|s| s.state_label.as_str())
                .unwrap_or("unknown"),
            ApprovalState::Confirmed => "confirmed",
        }
    }
}

impl Default for ApprovalChain {
    fn default() -> Self {
        Self::standard()
    }
}

/// How out-of-order transition requests are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionPolicy {
    /// Ignore them (tolerates double submission from the UI).
    #[default]
    Lenient,
    /// Reject them with `InvalidTransition`.
    Strict,
}

/// Decides workflow transitions for a single order. Pure: returns events (or a
/// confirmation plan) and never mutates the order.
#[derive(Debug, Clone, Default)]
pub struct ApprovalStateMachine {
    chain: ApprovalChain,
    policy: TransitionPolicy,
}

impl ApprovalStateMachine {
    pub fn new(chain: ApprovalChain, policy: TransitionPolicy) -> Self {
        Self { chain, policy }
    }

    pub fn chain(&self) -> &ApprovalChain {
        &self.chain
    }

    pub fn policy(&self) -> TransitionPolicy {
        self.policy
    }

    fn skip<T: Default>(&self, order: &PurchaseOrder, action: &str) -> DomainResult<T> {
        match self.policy {
            TransitionPolicy::Lenient => Ok(T::default()),
            TransitionPolicy::Strict => Err(DomainError::invalid_transition(format!(
                "cannot {action} an order in state '{}'",
                self.chain.state_label(&order.approval_state())
            ))),
        }
    }

    /// `draft → submitted`. Records `actor` as initiator when none is set.
    pub fn initiate(
        &self,
        order: &PurchaseOrder,
        actor: ActorId,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<Vec<PurchaseOrderEvent>> {
        if !order.is_created() {
            return Err(DomainError::not_found());
        }
        if order.approval_state() != ApprovalState::Draft {
            return self.skip(order, "initiate");
        }

        Ok(vec![PurchaseOrderEvent::RequestInitiated(RequestInitiated {
            order_id: order.id_typed(),
            actor,
            occurred_at,
        })])
    }

    /// Approve stage `stage_index` on behalf of `actor`.
    ///
    /// The capability check runs before the state check, so an unauthorized
    /// actor is rejected even when the request would otherwise be skipped.
    pub fn approve_stage<C>(
        &self,
        order: &PurchaseOrder,
        stage_index: usize,
        actor: ActorId,
        authz: &C,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<Vec<PurchaseOrderEvent>>
    where
        C: CapabilityCheck + ?Sized,
    {
        if !order.is_created() {
            return Err(DomainError::not_found());
        }
        let stage = self.chain.stage(stage_index).ok_or_else(|| {
            DomainError::validation(format!("unknown approval stage index {stage_index}"))
        })?;

        authorize(authz, actor, &stage.capability)
            .map_err(|_| DomainError::unauthorized(stage.capability.as_str()))?;

        if order.approval_state() != self.chain.source_state(stage_index) {
            return self.skip(order, &format!("approve stage '{}' of", stage.name));
        }

        let mut events = Vec::new();
        let mut vendor_auto_copied = false;

        if stage.vendor_gating {
            let resolution = VendorResolver::resolve_order(order);
            let single_vendor = match &resolution {
                VendorResolution::SingleVendor { vendor, .. } => Some(*vendor),
                _ => None,
            };
            let grouping = resolution.into_grouping()?;
            events.extend(normalization_events(order.id_typed(), &grouping, occurred_at));

            if let Some(vendor) = single_vendor {
                if order.primary_vendor() != Some(vendor) {
                    vendor_auto_copied = true;
                    events.push(PurchaseOrderEvent::PrimaryVendorSet(PrimaryVendorSet {
                        order_id: order.id_typed(),
                        vendor: Some(vendor),
                        occurred_at,
                    }));
                }
            }
        }

        events.push(PurchaseOrderEvent::StageApproved(StageApproved {
            order_id: order.id_typed(),
            stage_index,
            stage_name: stage.name.clone(),
            actor,
            vendor_auto_copied,
            occurred_at,
        }));
        Ok(events)
    }

    /// Approve by stage name (e.g. "gm").
    pub fn approve_named<C>(
        &self,
        order: &PurchaseOrder,
        stage_name: &str,
        actor: ActorId,
        authz: &C,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<Vec<PurchaseOrderEvent>>
    where
        C: CapabilityCheck + ?Sized,
    {
        let index = self.chain.stage_index(stage_name).ok_or_else(|| {
            DomainError::validation(format!("unknown approval stage '{stage_name}'"))
        })?;
        self.approve_stage(order, index, actor, authz, occurred_at)
    }

    /// Final confirmation. Resolves vendors and either confirms in place or
    /// plans a split with one child per vendor. Child ids come from `next_id`.
    pub fn confirm(
        &self,
        order: &PurchaseOrder,
        actor: ActorId,
        occurred_at: DateTime<Utc>,
        next_id: impl FnMut() -> PurchaseOrderId,
    ) -> DomainResult<ConfirmPlan> {
        if !order.is_created() {
            return Err(DomainError::not_found());
        }
        if order.approval_state() != self.chain.ready_to_confirm_state() {
            return self.skip(order, "confirm");
        }

        let resolution = VendorResolver::resolve_order(order);
        if let VendorResolution::SingleVendor { vendor, grouping } = &resolution {
            if grouping.is_empty() {
                return Ok(OrderSplitter::confirm_in_place(
                    order,
                    *vendor,
                    grouping,
                    actor,
                    occurred_at,
                ));
            }
        }
        OrderSplitter::plan(order, resolution.into_grouping()?, actor, occurred_at, next_id)
    }

    /// Audit message for an event, in the wording approvers see.
    pub fn describe(&self, event: &PurchaseOrderEvent) -> Option<String> {
        match event {
            PurchaseOrderEvent::RequestInitiated(e) => {
                Some(format!("Purchase request initiated by {}.", e.actor))
            }
            PurchaseOrderEvent::StageApproved(e) => {
                let base = self
                    .chain
                    .stage(e.stage_index)
                    .map(|s| s.approval_message.clone())
                    .unwrap_or_else(|| format!("Stage '{}' approved.", e.stage_name));
                if e.vendor_auto_copied {
                    Some(format!(
                        "{} (vendor auto-copied).",
                        base.trim_end_matches('.')
                    ))
                } else {
                    Some(base)
                }
            }
            PurchaseOrderEvent::SplitOrderCreated(e) => Some(format!(
                "Created from purchase request {} for vendor {}.",
                e.parent_id, e.vendor
            )),
            PurchaseOrderEvent::OrderSplit(e) => Some(format!(
                "Purchase request split into {} orders, one per vendor.",
                e.children.len()
            )),
            PurchaseOrderEvent::OrderConfirmed(e) => Some(match e.vendor {
                Some(vendor) => format!("Purchase order confirmed with vendor {vendor}."),
                None => "Purchase request confirmed; commitments moved to split orders."
                    .to_string(),
            }),
            _ => None,
        }
    }
}

/// `LineVendorAssigned` for every line whose vendor came from a fallback source.
pub(crate) fn normalization_events(
    order_id: PurchaseOrderId,
    grouping: &VendorGrouping,
    occurred_at: DateTime<Utc>,
) -> Vec<PurchaseOrderEvent> {
    grouping
        .normalized()
        .iter()
        .map(|(line_no, vendor)| {
            PurchaseOrderEvent::LineVendorAssigned(LineVendorAssigned {
                order_id,
                line_no: *line_no,
                vendor: Some(*vendor),
                occurred_at,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::line::test_support::{product, vendor};
    use crate::line::{ProductRef, VendorId};
    use crate::order::test_support::{draft_order, execute, test_time};
    use crate::order::{PurchaseOrderCommand, SetPrimaryVendor};
    use procureflow_core::Aggregate;

    /// Grants every actor every capability except those explicitly denied.
    #[derive(Default)]
    struct Grants {
        denied: HashMap<ActorId, Vec<&'static str>>,
    }

    impl CapabilityCheck for Grants {
        fn has_capability(&self, actor: ActorId, capability: &Permission) -> bool {
            !self
                .denied
                .get(&actor)
                .is_some_and(|caps| caps.iter().any(|c| *c == capability.as_str()))
        }
    }

    fn machine() -> ApprovalStateMachine {
        ApprovalStateMachine::default()
    }

    fn run(
        order: &mut PurchaseOrder,
        decide: impl FnOnce(&PurchaseOrder) -> DomainResult<Vec<PurchaseOrderEvent>>,
    ) {
        let events = decide(order).unwrap();
        order.apply_all(&events);
    }

    fn approved_through(
        lines: &[(ProductRef, Option<VendorId>)],
        stages: usize,
    ) -> PurchaseOrder {
        let sm = machine();
        let actor = ActorId::new();
        let mut order = draft_order(lines);
        run(&mut order, |o| sm.initiate(o, actor, test_time()));
        for stage in 0..stages {
            run(&mut order, |o| {
                sm.approve_stage(o, stage, actor, &Grants::default(), test_time())
            });
        }
        order
    }

    #[test]
    fn standard_chain_labels_match_workflow_states() {
        let chain = ApprovalChain::standard();
        let labels: Vec<&str> = [
            ApprovalState::Draft,
            ApprovalState::Submitted,
            ApprovalState::StageApproved(0),
            ApprovalState::StageApproved(1),
            ApprovalState::StageApproved(2),
            ApprovalState::Confirmed,
        ]
        .iter()
        .map(|s| chain.state_label(s))
        .collect();
        assert_eq!(
            labels,
            vec!["draft", "submitted", "gm_approved", "level1_approved", "level2_approved", "confirmed"]
        );
    }

    #[test]
    fn chain_validation_rejects_bad_definitions() {
        assert!(ApprovalChain::new(vec![]).is_err());

        let dup = vec![
            StageDefinition::new("a", "a_ok", Permission::from_static("x"), "A."),
            StageDefinition::new("a", "b_ok", Permission::from_static("y"), "B."),
        ];
        assert!(ApprovalChain::new(dup).is_err());

        let two_gates = vec![
            StageDefinition::new("a", "a_ok", Permission::from_static("x"), "A.").vendor_gating(),
            StageDefinition::new("b", "b_ok", Permission::from_static("y"), "B.").vendor_gating(),
        ];
        assert!(ApprovalChain::new(two_gates).is_err());

        let reserved = vec![StageDefinition::new(
            "a",
            "confirmed",
            Permission::from_static("x"),
            "A.",
        )];
        assert!(ApprovalChain::new(reserved).is_err());

        assert!(ApprovalChain::new(ApprovalChain::two_level().stages().to_vec()).is_ok());
    }

    #[test]
    fn initiate_is_idempotent() {
        let sm = machine();
        let actor = ActorId::new();
        let mut order = draft_order(&[(product("A"), None)]);

        run(&mut order, |o| sm.initiate(o, actor, test_time()));
        let after_first = order.clone();
        let second = sm.initiate(&order, actor, test_time()).unwrap();

        assert!(second.is_empty());
        assert_eq!(order, after_first);
        assert_eq!(order.approval_state(), ApprovalState::Submitted);
        assert_eq!(order.initiated_by(), Some(actor));
    }

    #[test]
    fn strict_policy_rejects_out_of_order_requests() {
        let sm = ApprovalStateMachine::new(ApprovalChain::standard(), TransitionPolicy::Strict);
        let order = draft_order(&[(product("A"), Some(vendor()))]);

        let err = sm
            .approve_stage(&order, 1, ActorId::new(), &Grants::default(), test_time())
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition(msg) if msg.contains("draft")));
    }

    #[test]
    fn gm_stage_requires_capability() {
        let sm = machine();
        let clerk = ActorId::new();
        let mut grants = Grants::default();
        grants.denied.insert(clerk, vec![CAP_APPROVE_GM]);
        let mut order = draft_order(&[(product("A"), Some(vendor()))]);
        run(&mut order, |o| sm.initiate(o, clerk, test_time()));

        for _ in 0..3 {
            let err = sm
                .approve_stage(&order, 0, clerk, &grants, test_time())
                .unwrap_err();
            assert_eq!(err, DomainError::Unauthorized(CAP_APPROVE_GM.to_string()));
        }
        assert_eq!(order.approval_state(), ApprovalState::Submitted);
    }

    #[test]
    fn gm_stage_fails_listing_products_without_vendor() {
        let sm = machine();
        let actor = ActorId::new();
        let mut order = draft_order(&[
            (product("Cement"), Some(vendor())),
            (product("Rebar"), None),
            (product("Sand"), None),
        ]);
        run(&mut order, |o| sm.initiate(o, actor, test_time()));

        let err = sm
            .approve_stage(&order, 0, actor, &Grants::default(), test_time())
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::IncompleteAssignment(vec!["Rebar".to_string(), "Sand".to_string()])
        );
    }

    #[test]
    fn gm_stage_copies_single_vendor_to_order() {
        let v1 = vendor();
        let order = approved_through(&[(product("A"), Some(v1)), (product("B"), Some(v1))], 1);

        assert_eq!(order.approval_state(), ApprovalState::StageApproved(0));
        assert_eq!(order.primary_vendor(), Some(v1));
    }

    #[test]
    fn gm_stage_leaves_vendor_unset_for_multi_vendor_orders() {
        let order = approved_through(
            &[(product("A"), Some(vendor())), (product("B"), Some(vendor()))],
            1,
        );

        assert_eq!(order.approval_state(), ApprovalState::StageApproved(0));
        assert_eq!(order.primary_vendor(), None);
    }

    #[test]
    fn order_level_vendor_satisfies_gating_and_normalizes_lines() {
        let sm = machine();
        let actor = ActorId::new();
        let v1 = vendor();
        let mut order = draft_order(&[(product("A"), None), (product("B"), None)]);
        let id = order.id_typed();
        execute(
            &mut order,
            PurchaseOrderCommand::SetPrimaryVendor(SetPrimaryVendor {
                order_id: id,
                vendor: Some(v1),
                occurred_at: test_time(),
            }),
        );
        run(&mut order, |o| sm.initiate(o, actor, test_time()));

        let events = sm
            .approve_stage(&order, 0, actor, &Grants::default(), test_time())
            .unwrap();
        order.apply_all(&events);

        assert!(order.lines().iter().all(|l| l.assigned_vendor() == Some(v1)));
        match events.last() {
            Some(PurchaseOrderEvent::StageApproved(e)) => assert!(!e.vendor_auto_copied),
            other => panic!("expected StageApproved, got {other:?}"),
        }
    }

    #[test]
    fn stages_must_follow_chain_order() {
        let sm = machine();
        let actor = ActorId::new();
        let mut order = draft_order(&[(product("A"), Some(vendor()))]);
        run(&mut order, |o| sm.initiate(o, actor, test_time()));

        let skipped = sm
            .approve_stage(&order, 2, actor, &Grants::default(), test_time())
            .unwrap();
        assert!(skipped.is_empty());

        let unknown = sm.approve_named(&order, "cfo", actor, &Grants::default(), test_time());
        assert!(matches!(unknown, Err(DomainError::Validation(_))));
    }

    #[test]
    fn confirm_before_final_stage_is_skipped() {
        let sm = machine();
        let order = approved_through(&[(product("A"), Some(vendor()))], 2);

        let plan = sm
            .confirm(&order, ActorId::new(), test_time(), PurchaseOrderId::generate)
            .unwrap();
        assert_eq!(plan, ConfirmPlan::Skipped);
    }

    #[test]
    fn confirm_twice_is_skipped_after_confirmation() {
        let sm = machine();
        let mut order = approved_through(&[(product("A"), Some(vendor()))], 3);
        match sm
            .confirm(&order, ActorId::new(), test_time(), PurchaseOrderId::generate)
            .unwrap()
        {
            ConfirmPlan::InPlace(events) => order.apply_all(&events),
            other => panic!("expected in-place confirmation, got {other:?}"),
        }
        assert!(order.is_confirmed());

        let again = sm
            .confirm(&order, ActorId::new(), test_time(), PurchaseOrderId::generate)
            .unwrap();
        assert_eq!(again, ConfirmPlan::Skipped);
    }

    #[test]
    fn two_level_chain_resolves_vendors_at_confirmation() {
        let sm = ApprovalStateMachine::new(ApprovalChain::two_level(), TransitionPolicy::Lenient);
        let actor = ActorId::new();
        let mut order = draft_order(&[(product("A"), None)]);
        run(&mut order, |o| sm.initiate(o, actor, test_time()));
        run(&mut order, |o| sm.approve_named(o, "level1", actor, &Grants::default(), test_time()));
        run(&mut order, |o| sm.approve_named(o, "level2", actor, &Grants::default(), test_time()));
        assert_eq!(sm.chain().state_label(&order.approval_state()), "approved");

        let err = sm
            .confirm(&order, actor, test_time(), PurchaseOrderId::generate)
            .unwrap_err();
        assert_eq!(err, DomainError::IncompleteAssignment(vec!["A".to_string()]));
    }

    #[test]
    fn describe_uses_stage_messages() {
        let sm = machine();
        let approved = |auto: bool| {
            PurchaseOrderEvent::StageApproved(StageApproved {
                order_id: PurchaseOrderId::generate(),
                stage_index: 0,
                stage_name: "gm".to_string(),
                actor: ActorId::new(),
                vendor_auto_copied: auto,
                occurred_at: test_time(),
            })
        };
        assert_eq!(
            sm.describe(&approved(false)).as_deref(),
            Some("General Manager approved the order.")
        );
        assert_eq!(
            sm.describe(&approved(true)).as_deref(),
            Some("General Manager approved the order (vendor auto-copied).")
        );
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Initiate,
            Approve(usize),
            Confirm,
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                Just(Op::Initiate),
                (0usize..4).prop_map(Op::Approve),
                Just(Op::Confirm),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: no sequence of operations moves an order backwards.
            #[test]
            fn state_only_moves_forward(ops in prop::collection::vec(op(), 0..20), vendors in 1usize..4) {
                let sm = machine();
                let actor = ActorId::new();
                let pool: Vec<VendorId> = (0..vendors).map(|_| vendor()).collect();
                let lines: Vec<(ProductRef, Option<VendorId>)> = (0..4)
                    .map(|i| (product(&format!("P{i}")), Some(pool[i % pool.len()])))
                    .collect();
                let mut order = draft_order(&lines);

                for op in ops {
                    let before = order.approval_state();
                    let events = match op {
                        Op::Initiate => sm.initiate(&order, actor, test_time()),
                        Op::Approve(stage) => sm
                            .approve_stage(&order, stage, actor, &Grants::default(), test_time())
                            .or_else(|e| match e {
                                DomainError::Validation(_) => Ok(vec![]),
                                other => Err(other),
                            }),
                        Op::Confirm => sm
                            .confirm(&order, actor, test_time(), PurchaseOrderId::generate)
                            .map(ConfirmPlan::into_parent_events),
                    }
                    .unwrap();
                    order.apply_all(&events);
                    prop_assert!(order.approval_state() >= before);
                }
            }

            /// Property: gating passes iff every line resolves to a vendor.
            #[test]
            fn gating_matches_resolution(assigned in prop::collection::vec(any::<bool>(), 1..8)) {
                let sm = machine();
                let actor = ActorId::new();
                let v1 = vendor();
                let lines: Vec<(ProductRef, Option<VendorId>)> = assigned
                    .iter()
                    .enumerate()
                    .map(|(i, has)| (product(&format!("P{i}")), has.then_some(v1)))
                    .collect();
                let mut order = draft_order(&lines);
                run(&mut order, |o| sm.initiate(o, actor, test_time()));

                let result = sm.approve_stage(&order, 0, actor, &Grants::default(), test_time());
                let missing: Vec<String> = assigned
                    .iter()
                    .enumerate()
                    .filter(|(_, has)| !**has)
                    .map(|(i, _)| format!("P{i}"))
                    .collect();

                if missing.is_empty() {
                    prop_assert!(result.is_ok());
                } else {
                    prop_assert_eq!(result.unwrap_err(), DomainError::IncompleteAssignment(missing));
                }
            }
        }
    }
}
