//! Line items, auxiliary vendor assignments and their mutation-time validation.

use serde::{Deserialize, Serialize};

use procureflow_core::{AggregateId, BranchId, DomainError, DomainResult};

/// Product identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Vendor (supplier party) identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VendorId(pub AggregateId);

impl VendorId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for VendorId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Product reference as carried on a line: identity plus the display name used
/// in error messages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductRef {
    pub id: ProductId,
    pub name: String,
}

impl ProductRef {
    pub fn new(id: ProductId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Purchase order line item.
///
/// `branch` mirrors the owning order and cannot be set by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    line_no: u32,
    product: ProductRef,
    quantity: i64,
    assigned_vendor: Option<VendorId>,
    branch: BranchId,
}

impl LineItem {
    pub(crate) fn new(
        line_no: u32,
        product: ProductRef,
        quantity: i64,
        assigned_vendor: Option<VendorId>,
        branch: BranchId,
    ) -> Self {
        Self {
            line_no,
            product,
            quantity,
            assigned_vendor,
            branch,
        }
    }

    pub fn line_no(&self) -> u32 {
        self.line_no
    }

    pub fn product(&self) -> &ProductRef {
        &self.product
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn assigned_vendor(&self) -> Option<VendorId> {
        self.assigned_vendor
    }

    pub fn branch(&self) -> BranchId {
        self.branch
    }

    pub(crate) fn set_quantity(&mut self, quantity: i64) {
        self.quantity = quantity;
    }

    pub(crate) fn set_vendor(&mut self, vendor: Option<VendorId>) {
        self.assigned_vendor = vendor;
    }

    pub(crate) fn with_vendor(&self, vendor: VendorId) -> Self {
        let mut line = self.clone();
        line.assigned_vendor = Some(vendor);
        line
    }
}

/// Vendor + quantity recorded for a product independently of the lines.
///
/// Used as a fallback vendor source for lines that carry no vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorAssignment {
    pub branch: BranchId,
    pub product: ProductId,
    pub vendor: VendorId,
    pub quantity: i64,
}

/// Supplier master data, provided by the party/catalog owner.
pub trait SupplierDirectory: Send + Sync {
    /// Whether the party is flagged as a supplier.
    fn is_supplier(&self, vendor: VendorId) -> bool;

    /// Vendors known to sell the product, in preference order.
    fn known_sellers(&self, product: ProductId) -> Vec<VendorId>;
}

impl<D> SupplierDirectory for std::sync::Arc<D>
where
    D: SupplierDirectory + ?Sized,
{
    fn is_supplier(&self, vendor: VendorId) -> bool {
        (**self).is_supplier(vendor)
    }

    fn known_sellers(&self, product: ProductId) -> Vec<VendorId> {
        (**self).known_sellers(product)
    }
}

/// Vendors a line for a given product may be assigned to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VendorDomain {
    /// No seller information: any supplier-flagged party is acceptable.
    AnySupplier,
    /// Only these vendors (already filtered to suppliers).
    Restricted(Vec<VendorId>),
}

impl VendorDomain {
    pub fn allows<D>(&self, directory: &D, vendor: VendorId) -> bool
    where
        D: SupplierDirectory + ?Sized,
    {
        match self {
            VendorDomain::AnySupplier => directory.is_supplier(vendor),
            VendorDomain::Restricted(vendors) => vendors.contains(&vendor),
        }
    }
}

/// Allowed vendors for a product, evaluated when a line's product changes.
pub fn suggest_vendor_domain<D>(directory: &D, product: ProductId) -> VendorDomain
where
    D: SupplierDirectory + ?Sized,
{
    let mut vendors: Vec<VendorId> = Vec::new();
    for vendor in directory.known_sellers(product) {
        if directory.is_supplier(vendor) && !vendors.contains(&vendor) {
            vendors.push(vendor);
        }
    }

    if vendors.is_empty() {
        VendorDomain::AnySupplier
    } else {
        VendorDomain::Restricted(vendors)
    }
}

/// Vendor to pre-fill on a line: only when exactly one supplier sells the product.
pub fn default_vendor_for<D>(directory: &D, product: ProductId) -> Option<VendorId>
where
    D: SupplierDirectory + ?Sized,
{
    match suggest_vendor_domain(directory, product) {
        VendorDomain::Restricted(vendors) if vendors.len() == 1 => Some(vendors[0]),
        _ => None,
    }
}

pub fn validate_quantity(quantity: i64) -> DomainResult<()> {
    if quantity <= 0 {
        return Err(DomainError::validation("quantity must be positive"));
    }
    Ok(())
}

pub fn validate_vendor<D>(directory: &D, vendor: VendorId) -> DomainResult<()>
where
    D: SupplierDirectory + ?Sized,
{
    if !directory.is_supplier(vendor) {
        return Err(DomainError::validation(format!(
            "vendor {vendor} is not flagged as a supplier"
        )));
    }
    Ok(())
}

/// Line invariants checked at the mutation boundary (create/update).
pub fn validate_line<D>(directory: &D, quantity: i64, vendor: Option<VendorId>) -> DomainResult<()>
where
    D: SupplierDirectory + ?Sized,
{
    validate_quantity(quantity)?;
    if let Some(vendor) = vendor {
        validate_vendor(directory, vendor)?;
    }
    Ok(())
}
