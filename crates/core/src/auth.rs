use serde::{Deserialize, Serialize};

use crate::errors::WorkflowError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrincipalId(pub String);

impl std::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    EndUser,
    Supplier,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EndUser => "end_user",
            Self::Supplier => "supplier",
            Self::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "end_user" => Some(Self::EndUser),
            "supplier" => Some(Self::Supplier),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Trusted identity handed in by the authentication collaborator. The core
/// never authenticates; it only authorizes against this.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub role: Role,
}

impl Principal {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self { id: PrincipalId(id.into()), role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Explicit role gates, called at the top of each operation instead of the
/// ambient router-level role decorators the original system used.
pub fn require_role(principal: &Principal, role: Role) -> Result<(), WorkflowError> {
    if principal.role == role {
        return Ok(());
    }
    Err(WorkflowError::forbidden(format!(
        "role `{}` required, principal `{}` has `{}`",
        role.as_str(),
        principal.id,
        principal.role.as_str()
    )))
}

pub fn require_admin(principal: &Principal) -> Result<(), WorkflowError> {
    require_role(principal, Role::Admin)
}

/// Owner-or-admin gate used for request reads.
pub fn require_owner_or_admin(
    principal: &Principal,
    owner: &PrincipalId,
) -> Result<(), WorkflowError> {
    if principal.is_admin() || principal.id == *owner {
        return Ok(());
    }
    Err(WorkflowError::forbidden(format!(
        "principal `{}` is neither the owner nor an admin",
        principal.id
    )))
}

/// Strict owner gate: admins have override authority on status transitions
/// but no implicit field-edit rights, so this deliberately excludes them.
pub fn require_owner(principal: &Principal, owner: &PrincipalId) -> Result<(), WorkflowError> {
    if principal.id == *owner {
        return Ok(());
    }
    Err(WorkflowError::forbidden(format!(
        "principal `{}` does not own this resource",
        principal.id
    )))
}
