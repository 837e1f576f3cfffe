//! In-memory supplier directory (tests/dev).

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use procureflow_purchasing::{ProductId, SupplierDirectory, VendorId};

#[derive(Debug, Default)]
struct DirectoryState {
    suppliers: HashSet<VendorId>,
    sellers: HashMap<ProductId, Vec<VendorId>>,
}

#[derive(Debug, Default)]
pub struct InMemorySupplierDirectory {
    state: RwLock<DirectoryState>,
}

impl InMemorySupplierDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_suppliers(vendors: impl IntoIterator<Item = VendorId>) -> Self {
        let directory = Self::new();
        for vendor in vendors {
            directory.register_supplier(vendor);
        }
        directory
    }

    pub fn register_supplier(&self, vendor: VendorId) {
        if let Ok(mut state) = self.state.write() {
            state.suppliers.insert(vendor);
        }
    }

    /// Record `vendor` as a seller of `product`; registers it as a supplier.
    pub fn add_seller(&self, product: ProductId, vendor: VendorId) {
        if let Ok(mut state) = self.state.write() {
            state.suppliers.insert(vendor);
            let sellers = state.sellers.entry(product).or_default();
            if !sellers.contains(&vendor) {
                sellers.push(vendor);
            }
        }
    }
}

impl SupplierDirectory for InMemorySupplierDirectory {
    fn is_supplier(&self, vendor: VendorId) -> bool {
        self.state
            .read()
            .map(|s| s.suppliers.contains(&vendor))
            .unwrap_or(false)
    }

    fn known_sellers(&self, product: ProductId) -> Vec<VendorId> {
        self.state
            .read()
            .map(|s| s.sellers.get(&product).cloned().unwrap_or_default())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use procureflow_core::AggregateId;
    use procureflow_purchasing::{VendorDomain, default_vendor_for, suggest_vendor_domain};

    use super::*;

    #[test]
    fn sellers_are_suppliers_and_drive_suggestions() {
        let directory = InMemorySupplierDirectory::new();
        let product = ProductId::new(AggregateId::new());
        let vendor = VendorId::new(AggregateId::new());

        directory.add_seller(product, vendor);
        directory.add_seller(product, vendor);

        assert!(directory.is_supplier(vendor));
        assert_eq!(directory.known_sellers(product), vec![vendor]);
        assert_eq!(default_vendor_for(&directory, product), Some(vendor));
        assert_eq!(
            suggest_vendor_domain(&directory, product),
            VendorDomain::Restricted(vec![vendor])
        );
    }

    #[test]
    fn unknown_party_is_not_a_supplier() {
        let directory = InMemorySupplierDirectory::with_suppliers([VendorId::new(AggregateId::new())]);
        assert!(!directory.is_supplier(VendorId::new(AggregateId::new())));
    }
}
