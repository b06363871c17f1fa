use mercato_shared::Masked;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub display_name: String,
    pub default_address_id: Option<Uuid>,
}

/// A delivery address owned by a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    pub id: Uuid,
    pub user_id: Uuid,
    pub recipient: Masked<String>,
    pub phone: Masked<String>,
    pub line: Masked<String>,
    pub is_default: bool,
}

impl Address {
    pub fn belongs_to(&self, user_id: Uuid) -> bool {
        self.user_id == user_id
    }
}
