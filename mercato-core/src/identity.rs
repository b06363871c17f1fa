use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::CoreResult;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    Seller,
    Admin,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "CUSTOMER" => Some(Role::Customer),
            "SELLER" => Some(Role::Seller),
            "ADMIN" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Who is calling, resolved once at the request boundary.
///
/// Roles are never re-queried while an operation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub roles: HashSet<Role>,
}

impl AuthContext {
    pub fn new(user_id: Uuid, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            user_id,
            roles: roles.into_iter().collect(),
        }
    }

    pub fn customer(user_id: Uuid) -> Self {
        Self::new(user_id, [Role::Customer])
    }

    pub fn seller(user_id: Uuid) -> Self {
        Self::new(user_id, [Role::Seller])
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

/// Turns a bearer credential into an [`AuthContext`]. Fails closed.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, token: &str) -> CoreResult<AuthContext>;
}
