//! Infrastructure and orchestration for the purchasing workflow.
//!
//! - `event_store`: append-only streams with atomic multi-stream commits
//! - `unit_of_work` / `repository`: transaction scope and order rehydration
//! - `audit`, `finalize`, `suppliers`: external collaborators and their
//!   in-process implementations
//! - `config`: chain shape and policy
//! - `coordinator`: the `WorkflowCoordinator` façade

pub mod audit;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod event_store;
pub mod finalize;
pub mod repository;
pub mod suppliers;
pub mod unit_of_work;


pub use audit::{AuditError, AuditLog, AuditRecord, BusAuditLog, InMemoryAuditLog, TracingAuditLog};
pub use config::{ChainConfig, ChainPreset, ConfigError, WorkflowConfig};
pub use coordinator::{BatchResult, Transition, TransitionOutcome, WorkflowCoordinator};
pub use error::WorkflowError;
pub use event_store::{
    EventStore, EventStoreError, InMemoryEventStore, PublishingEventStore, StoredEvent,
    StreamAppend, UncommittedEvent,
};
pub use finalize::{FinalizeError, NoopFinalizer, OrderFinalizer, RecordingFinalizer};
pub use repository::{ORDER_AGGREGATE_TYPE, OrderRepository};
pub use suppliers::InMemorySupplierDirectory;
pub use unit_of_work::UnitOfWork;
