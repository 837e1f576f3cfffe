//! Order splitting at final confirmation.
//!
//! A confirmed order whose lines span several vendors becomes one child order
//! per vendor. The parent keeps its lines, is marked confirmed and records the
//! children as provenance; only the children carry live commitments.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use procureflow_core::{ActorId, DomainError, DomainResult};

use crate::approval::normalization_events;
use crate::line::VendorId;
use crate::order::{
    OrderConfirmed, OrderOverrides, OrderSplit, PurchaseOrder, PurchaseOrderEvent,
    PurchaseOrderId, SplitChild,
};
use crate::vendor::VendorGrouping;

/// A child order to materialise, with the events that create and confirm it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildOrder {
    pub order_id: PurchaseOrderId,
    pub vendor: VendorId,
    pub events: Vec<PurchaseOrderEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPlan {
    pub parent_events: Vec<PurchaseOrderEvent>,
    pub children: Vec<ChildOrder>,
}

/// What `confirm` decided.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfirmPlan {
    /// Not in a confirmable state (lenient policy).
    #[default]
    Skipped,
    /// Single vendor: confirm the order itself.
    InPlace(Vec<PurchaseOrderEvent>),
    /// Several vendors: create and confirm one child per vendor.
    Split(SplitPlan),
}

impl ConfirmPlan {
    pub fn is_skipped(&self) -> bool {
        matches!(self, ConfirmPlan::Skipped)
    }

    /// Events for the order `confirm` was called on.
    pub fn parent_events(&self) -> &[PurchaseOrderEvent] {
        match self {
            ConfirmPlan::Skipped => &[],
            ConfirmPlan::InPlace(events) => events,
            ConfirmPlan::Split(plan) => &plan.parent_events,
        }
    }

    pub fn into_parent_events(self) -> Vec<PurchaseOrderEvent> {
        match self {
            ConfirmPlan::Skipped => Vec::new(),
            ConfirmPlan::InPlace(events) => events,
            ConfirmPlan::Split(plan) => plan.parent_events,
        }
    }

    pub fn children(&self) -> &[ChildOrder] {
        match self {
            ConfirmPlan::Split(plan) => &plan.children,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OrderSplitter;

impl OrderSplitter {
    /// Plan confirmation for a resolved grouping.
    ///
    /// A grouping with a single vendor degenerates to in-place confirmation.
    /// Child ids are drawn from `next_id` in group order and must be fresh.
    pub fn plan(
        order: &PurchaseOrder,
        grouping: VendorGrouping,
        actor: ActorId,
        occurred_at: DateTime<Utc>,
        mut next_id: impl FnMut() -> PurchaseOrderId,
    ) -> DomainResult<ConfirmPlan> {
        if let Some(vendor) = grouping.single_vendor() {
            return Ok(Self::confirm_in_place(order, vendor, &grouping, actor, occurred_at));
        }
        if grouping.is_empty() {
            return Err(DomainError::invariant("cannot split an order without lines"));
        }

        let mut seen = HashSet::new();
        let mut children = Vec::with_capacity(grouping.len());
        for group in grouping.into_groups() {
            let child_id = next_id();
            if !seen.insert(child_id) {
                return Err(DomainError::invariant(format!(
                    "split child id {child_id} issued twice"
                )));
            }

            let vendor = group.vendor;
            let created = order.clone_with_overrides(
                child_id,
                OrderOverrides {
                    vendor,
                    lines: group.lines,
                },
                occurred_at,
            )?;

            children.push(ChildOrder {
                order_id: child_id,
                vendor,
                events: vec![
                    PurchaseOrderEvent::SplitOrderCreated(created),
                    PurchaseOrderEvent::OrderConfirmed(OrderConfirmed {
                        order_id: child_id,
                        actor,
                        vendor: Some(vendor),
                        occurred_at,
                    }),
                ],
            });
        }

        let parent_events = vec![
            PurchaseOrderEvent::OrderSplit(OrderSplit {
                order_id: order.id_typed(),
                children: children
                    .iter()
                    .map(|c| SplitChild {
                        order_id: c.order_id,
                        vendor: c.vendor,
                    })
                    .collect(),
                occurred_at,
            }),
            PurchaseOrderEvent::OrderConfirmed(OrderConfirmed {
                order_id: order.id_typed(),
                actor,
                vendor: None,
                occurred_at,
            }),
        ];

        Ok(ConfirmPlan::Split(SplitPlan {
            parent_events,
            children,
        }))
    }

    /// Confirm `order` itself with `vendor`, normalising fallback-resolved lines.
    pub fn confirm_in_place(
        order: &PurchaseOrder,
        vendor: VendorId,
        grouping: &VendorGrouping,
        actor: ActorId,
        occurred_at: DateTime<Utc>,
    ) -> ConfirmPlan {
        let mut events = normalization_events(order.id_typed(), grouping, occurred_at);
        events.push(PurchaseOrderEvent::OrderConfirmed(OrderConfirmed {
            order_id: order.id_typed(),
            actor,
            vendor: Some(vendor),
            occurred_at,
        }));
        ConfirmPlan::InPlace(events)
    }
}
