//! `procureflow-core`: domain foundation building blocks.
//!
//! Identifiers, the domain error model and the aggregate contract shared by the
//! purchasing domain and the orchestration layer. No infrastructure concerns.

pub mod aggregate;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{ActorId, AggregateId, BranchId};
