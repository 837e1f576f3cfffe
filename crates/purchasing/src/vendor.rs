//! Vendor resolution over an order's lines.
//!
//! Each line resolves its vendor from, in order:
//! 1. the vendor assigned on the line itself,
//! 2. the auxiliary vendor assignments for the line's product, when they name
//!    exactly one vendor,
//! 3. the order-level vendor.
//!
//! Lines are then grouped by vendor in first-seen order.

use serde::{Deserialize, Serialize};

use procureflow_core::DomainError;

use crate::line::{LineItem, ProductId, VendorAssignment, VendorId};
use crate::order::PurchaseOrder;

/// Where a line's resolved vendor came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VendorSource {
    Line,
    Assignment,
    Order,
}

/// Lines committed to one vendor. Every line carries `vendor` as its assigned vendor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorGroup {
    pub vendor: VendorId,
    pub lines: Vec<LineItem>,
}

/// Lines partitioned by vendor, groups in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VendorGrouping {
    groups: Vec<VendorGroup>,
    /// Lines whose vendor came from a fallback source (line_no, vendor).
    normalized: Vec<(u32, VendorId)>,
}

impl VendorGrouping {
    pub fn groups(&self) -> &[VendorGroup] {
        &self.groups
    }

    pub fn into_groups(self) -> Vec<VendorGroup> {
        self.groups
    }

    pub fn vendors(&self) -> Vec<VendorId> {
        self.groups.iter().map(|g| g.vendor).collect()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// The vendor when the grouping holds exactly one group.
    pub fn single_vendor(&self) -> Option<VendorId> {
        match self.groups.as_slice() {
            [only] => Some(only.vendor),
            _ => None,
        }
    }

    /// Lines that gained a vendor from an auxiliary assignment or the order.
    pub fn normalized(&self) -> &[(u32, VendorId)] {
        &self.normalized
    }

    fn push(&mut self, line: LineItem, vendor: VendorId) {
        match self.groups.iter_mut().find(|g| g.vendor == vendor) {
            Some(group) => group.lines.push(line),
            None => self.groups.push(VendorGroup {
                vendor,
                lines: vec![line],
            }),
        }
    }
}

/// Outcome of vendor resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VendorResolution {
    /// Every line resolves to the same vendor (or the order has no lines but a
    /// single vendor is known).
    SingleVendor {
        vendor: VendorId,
        grouping: VendorGrouping,
    },
    /// Lines span two or more vendors.
    MultiVendor(VendorGrouping),
    /// Some lines resolve, these products do not.
    Incomplete { unresolved_products: Vec<String> },
    /// No vendor is assignable anywhere; lists every product on the order.
    Unresolved { unresolved_products: Vec<String> },
}

impl VendorResolution {
    pub fn is_resolved(&self) -> bool {
        matches!(
            self,
            VendorResolution::SingleVendor { .. } | VendorResolution::MultiVendor(_)
        )
    }

    /// The grouping for resolved outcomes, `IncompleteAssignment` otherwise.
    pub fn into_grouping(self) -> Result<VendorGrouping, DomainError> {
        match self {
            VendorResolution::SingleVendor { grouping, .. } => Ok(grouping),
            VendorResolution::MultiVendor(grouping) => Ok(grouping),
            VendorResolution::Incomplete {
                unresolved_products,
            }
            | VendorResolution::Unresolved {
                unresolved_products,
            } => Err(DomainError::incomplete_assignment(unresolved_products)),
        }
    }
}

/// Pure vendor resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct VendorResolver;

impl VendorResolver {
    pub fn resolve_order(order: &PurchaseOrder) -> VendorResolution {
        Self::resolve(
            order.lines(),
            order.vendor_assignments(),
            order.primary_vendor(),
        )
    }

    pub fn resolve(
        lines: &[LineItem],
        assignments: &[VendorAssignment],
        order_vendor: Option<VendorId>,
    ) -> VendorResolution {
        if lines.is_empty() {
            return Self::resolve_without_lines(assignments, order_vendor);
        }

        let mut grouping = VendorGrouping::default();
        let mut unresolved: Vec<&LineItem> = Vec::new();

        for line in lines {
            match Self::resolve_line(line, assignments, order_vendor) {
                Some((vendor, VendorSource::Line)) => grouping.push(line.clone(), vendor),
                Some((vendor, _)) => {
                    grouping.normalized.push((line.line_no(), vendor));
                    grouping.push(line.with_vendor(vendor), vendor);
                }
                None => unresolved.push(line),
            }
        }

        if !unresolved.is_empty() {
            let unresolved_products = product_names(&unresolved);
            return if grouping.is_empty() {
                VendorResolution::Unresolved {
                    unresolved_products,
                }
            } else {
                VendorResolution::Incomplete {
                    unresolved_products,
                }
            };
        }

        match grouping.single_vendor() {
            Some(vendor) => VendorResolution::SingleVendor { vendor, grouping },
            None => VendorResolution::MultiVendor(grouping),
        }
    }

    /// Vendor for one line and where it came from, `None` when unresolvable.
    pub fn resolve_line(
        line: &LineItem,
        assignments: &[VendorAssignment],
        order_vendor: Option<VendorId>,
    ) -> Option<(VendorId, VendorSource)> {
        if let Some(vendor) = line.assigned_vendor() {
            return Some((vendor, VendorSource::Line));
        }
        if let Some(vendor) = sole_assigned_vendor(assignments, line.product().id) {
            return Some((vendor, VendorSource::Assignment));
        }
        order_vendor.map(|vendor| (vendor, VendorSource::Order))
    }

    fn resolve_without_lines(
        assignments: &[VendorAssignment],
        order_vendor: Option<VendorId>,
    ) -> VendorResolution {
        let vendor = order_vendor.or_else(|| {
            let distinct = distinct_vendors(assignments.iter());
            match distinct.as_slice() {
                [only] => Some(*only),
                _ => None,
            }
        });

        match vendor {
            Some(vendor) => VendorResolution::SingleVendor {
                vendor,
                grouping: VendorGrouping::default(),
            },
            None => VendorResolution::Unresolved {
                unresolved_products: Vec::new(),
            },
        }
    }
}

fn sole_assigned_vendor(assignments: &[VendorAssignment], product: ProductId) -> Option<VendorId> {
    let distinct = distinct_vendors(assignments.iter().filter(|a| a.product == product));
    match distinct.as_slice() {
        [only] => Some(*only),
        _ => None,
    }
}

fn distinct_vendors<'a>(assignments: impl Iterator<Item = &'a VendorAssignment>) -> Vec<VendorId> {
    let mut vendors = Vec::new();
    for a in assignments {
        if !vendors.contains(&a.vendor) {
            vendors.push(a.vendor);
        }
    }
    vendors
}

/// Distinct product names in line order.
fn product_names(lines: &[&LineItem]) -> Vec<String> {
    let mut seen: Vec<ProductId> = Vec::new();
    let mut names = Vec::new();
    for line in lines {
        let product = line.product();
        if !seen.contains(&product.id) {
            seen.push(product.id);
            names.push(product.name.clone());
        }
    }
    names
}
