use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;

use procureflow_auth::RolePolicy;
use procureflow_core::{ActorId, AggregateId, BranchId};
use procureflow_infra::{InMemoryEventStore, InMemorySupplierDirectory, NoopFinalizer, WorkflowCoordinator};
use procureflow_purchasing::{
    AddLine, ApprovalStateMachine, DisplayToggles, ProductId, ProductRef, PurchaseOrder,
    PurchaseOrderCommand, PurchaseOrderId, VendorId, VendorResolver,
};

struct Fixture {
    coordinator: WorkflowCoordinator<InMemoryEventStore>,
    approver: ActorId,
    vendors: Vec<VendorId>,
}

fn fixture(vendor_count: usize) -> Fixture {
    let policy = Arc::new(RolePolicy::new());
    let approver = ActorId::new();
    policy.grant(approver, procureflow_auth::Permission::WILDCARD);

    let suppliers = Arc::new(InMemorySupplierDirectory::new());
    let vendors: Vec<VendorId> = (0..vendor_count)
        .map(|_| VendorId::new(AggregateId::new()))
        .collect();
    for vendor in &vendors {
        suppliers.register_supplier(*vendor);
    }

    let coordinator = WorkflowCoordinator::new(
        InMemoryEventStore::new(),
        ApprovalStateMachine::default(),
        policy,
        suppliers,
    )
    .with_finalizer(Arc::new(NoopFinalizer));

    Fixture {
        coordinator,
        approver,
        vendors,
    }
}

/// An order with `lines` lines spread round-robin over the fixture's vendors,
/// approved up to the final stage.
fn ready_order(f: &Fixture, lines: usize) -> PurchaseOrderId {
    let order_id = f
        .coordinator
        .create_order(BranchId::new(), None, DisplayToggles::default())
        .map(|o| o.id_typed())
        .unwrap();
    for i in 0..lines {
        f.coordinator
            .edit(PurchaseOrderCommand::AddLine(AddLine {
                order_id,
                product: ProductRef::new(ProductId::new(AggregateId::new()), format!("P{i}")),
                quantity: 1,
                vendor: Some(f.vendors[i % f.vendors.len()]),
                occurred_at: chrono::Utc::now(),
            }))
            .unwrap();
    }
    f.coordinator.initiate(order_id, f.approver).unwrap();
    for stage in ["gm", "level1", "level2"] {
        f.coordinator.approve(order_id, stage, f.approver).unwrap();
    }
    order_id
}

fn bench_confirm_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("confirm_split");

    for vendors in [1usize, 2, 8] {
        let f = fixture(vendors);
        group.throughput(Throughput::Elements(vendors as u64));
        group.bench_with_input(BenchmarkId::new("vendors", vendors), &vendors, |b, _| {
            b.iter_batched(
                || ready_order(&f, 16),
                |order_id| black_box(f.coordinator.confirm(order_id, f.approver).unwrap()),
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_vendor_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("vendor_resolution");

    for lines in [10usize, 100, 1000] {
        let f = fixture(4);
        let order_id = ready_order(&f, lines);
        let order: PurchaseOrder = f.coordinator.load(order_id).unwrap();
        group.throughput(Throughput::Elements(lines as u64));
        group.bench_with_input(BenchmarkId::new("lines", lines), &order, |b, order| {
            b.iter(|| black_box(VendorResolver::resolve_order(order)))
        });
    }

    group.finish();
}

fn bench_rehydration(c: &mut Criterion) {
    let f = fixture(2);
    let order_id = ready_order(&f, 50);
    c.bench_function("load_order_50_lines", |b| {
        b.iter(|| black_box(f.coordinator.load(order_id).unwrap()))
    });
}

criterion_group!(
    benches,
    bench_confirm_split,
    bench_vendor_resolution,
    bench_rehydration
);
criterion_main!(benches);
