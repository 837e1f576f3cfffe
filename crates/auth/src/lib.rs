//! `procureflow-auth`: capability checks for workflow stages.
//!
//! The workflow core only ever asks one question: "does this actor hold this
//! capability?". `CapabilityCheck` is that seam; `RolePolicy` is an in-memory
//! RBAC implementation for tests and embedded use.

pub mod authorize;
pub mod permissions;
pub mod roles;

pub use authorize::{AuthorizationExplanation, AuthzError, CapabilityCheck, RolePolicy, authorize};
pub use permissions::Permission;
pub use roles::Role;
