use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use thiserror::Error;

use procureflow_core::ActorId;

use crate::{Permission, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Authorization collaborator consumed by the workflow core.
///
/// Implementations answer synchronously; the core never caches answers.
pub trait CapabilityCheck: Send + Sync {
    fn has_capability(&self, actor: ActorId, capability: &Permission) -> bool;
}

impl<C> CapabilityCheck for Arc<C>
where
    C: CapabilityCheck + ?Sized,
{
    fn has_capability(&self, actor: ActorId, capability: &Permission) -> bool {
        (**self).has_capability(actor, capability)
    }
}

impl<C> CapabilityCheck for &C
where
    C: CapabilityCheck + ?Sized,
{
    fn has_capability(&self, actor: ActorId, capability: &Permission) -> bool {
        (**self).has_capability(actor, capability)
    }
}

/// Check `required` for `actor`, mapping a denial to `AuthzError::Forbidden`.
pub fn authorize<C>(checker: &C, actor: ActorId, required: &Permission) -> Result<(), AuthzError>
where
    C: CapabilityCheck + ?Sized,
{
    if checker.has_capability(actor, required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// Why an authorization decision came out the way it did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationExplanation {
    pub actor: ActorId,
    pub required_permission: String,
    pub granted: bool,
    pub roles: Vec<String>,
    /// Sorted effective permissions (role grants plus direct grants).
    pub effective_permissions: Vec<String>,
    pub reason: String,
}

#[derive(Debug, Default)]
struct PolicyState {
    role_permissions: HashMap<Role, HashSet<Permission>>,
    actor_roles: HashMap<ActorId, BTreeSet<Role>>,
    actor_permissions: HashMap<ActorId, HashSet<Permission>>,
}

/// In-memory RBAC: roles map to permissions, actors hold roles and/or direct
/// permissions. A poisoned lock denies everything.
#[derive(Debug, Default)]
pub struct RolePolicy {
    state: RwLock<PolicyState>,
}

impl RolePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define (or extend) the permissions a role grants.
    pub fn define_role<I, P>(&self, role: Role, permissions: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<Permission>,
    {
        if let Ok(mut state) = self.state.write() {
            state
                .role_permissions
                .entry(role)
                .or_default()
                .extend(permissions.into_iter().map(Into::into));
        }
    }

    pub fn assign_role(&self, actor: ActorId, role: Role) {
        if let Ok(mut state) = self.state.write() {
            state.actor_roles.entry(actor).or_default().insert(role);
        }
    }

    pub fn revoke_role(&self, actor: ActorId, role: &Role) {
        if let Ok(mut state) = self.state.write() {
            if let Some(roles) = state.actor_roles.get_mut(&actor) {
                roles.remove(role);
            }
        }
    }

    pub fn grant(&self, actor: ActorId, permission: impl Into<Permission>) {
        if let Ok(mut state) = self.state.write() {
            state
                .actor_permissions
                .entry(actor)
                .or_default()
                .insert(permission.into());
        }
    }

    fn effective_permissions(state: &PolicyState, actor: ActorId) -> HashSet<Permission> {
        let mut effective: HashSet<Permission> = state
            .actor_permissions
            .get(&actor)
            .cloned()
            .unwrap_or_default();
        if let Some(roles) = state.actor_roles.get(&actor) {
            for role in roles {
                if let Some(perms) = state.role_permissions.get(role) {
                    effective.extend(perms.iter().cloned());
                }
            }
        }
        effective
    }

    /// Explain the decision `has_capability` would make.
    pub fn explain(&self, actor: ActorId, required: &Permission) -> AuthorizationExplanation {
        let Ok(state) = self.state.read() else {
            return AuthorizationExplanation {
                actor,
                required_permission: required.to_string(),
                granted: false,
                roles: Vec::new(),
                effective_permissions: Vec::new(),
                reason: "policy unavailable (lock poisoned)".to_string(),
            };
        };

        let effective = Self::effective_permissions(&state, actor);
        let granted = effective.iter().any(|p| p.grants(required));

        let roles: Vec<String> = state
            .actor_roles
            .get(&actor)
            .map(|r| r.iter().map(|r| r.as_str().to_string()).collect())
            .unwrap_or_default();
        let mut effective_permissions: Vec<String> =
            effective.iter().map(|p| p.as_str().to_string()).collect();
        effective_permissions.sort();

        let reason = if !granted {
            format!("actor does not hold '{required}'")
        } else if effective.contains(required) {
            format!("actor holds '{required}'")
        } else {
            "actor holds wildcard permission '*'".to_string()
        };

        AuthorizationExplanation {
            actor,
            required_permission: required.to_string(),
            granted,
            roles,
            effective_permissions,
            reason,
        }
    }
}

impl CapabilityCheck for RolePolicy {
    fn has_capability(&self, actor: ActorId, capability: &Permission) -> bool {
        match self.state.read() {
            Ok(state) => Self::effective_permissions(&state, actor)
                .iter()
                .any(|p| p.grants(capability)),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const APPROVE_GM: Permission = Permission::from_static("purchasing.approve.gm");
    const APPROVE_L1: Permission = Permission::from_static("purchasing.approve.level1");

    #[test]
    fn role_grants_flow_to_actor() {
        let policy = RolePolicy::new();
        let gm = ActorId::new();
        policy.define_role(Role::new("general_manager"), [APPROVE_GM]);
        policy.assign_role(gm, Role::new("general_manager"));

        assert!(policy.has_capability(gm, &APPROVE_GM));
        assert!(!policy.has_capability(gm, &APPROVE_L1));
        assert_eq!(
            authorize(&policy, gm, &APPROVE_L1),
            Err(AuthzError::Forbidden("purchasing.approve.level1".to_string()))
        );
    }

    #[test]
    fn wildcard_satisfies_everything() {
        let policy = RolePolicy::new();
        let admin = ActorId::new();
        policy.grant(admin, Permission::WILDCARD);

        assert!(authorize(&policy, admin, &APPROVE_L1).is_ok());
        let explanation = policy.explain(admin, &APPROVE_GM);
        assert!(explanation.granted);
        assert!(explanation.reason.contains("wildcard"));
    }

    #[test]
    fn revoking_role_removes_capability() {
        let policy = RolePolicy::new();
        let actor = ActorId::new();
        let role = Role::new("approver_l1");
        policy.define_role(role.clone(), [APPROVE_L1]);
        policy.assign_role(actor, role.clone());
        assert!(policy.has_capability(actor, &APPROVE_L1));

        policy.revoke_role(actor, &role);
        assert!(!policy.has_capability(actor, &APPROVE_L1));

        let explanation = policy.explain(actor, &APPROVE_L1);
        assert!(!explanation.granted);
        assert!(explanation.roles.is_empty());
    }

    #[test]
    fn unknown_actor_is_denied() {
        let policy = RolePolicy::new();
        assert!(!policy.has_capability(ActorId::new(), &APPROVE_GM));
    }
}
