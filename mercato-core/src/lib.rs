pub mod account;
pub mod identity;
pub mod refund;

pub use account::{Address, User};
pub use identity::{AuthContext, IdentityResolver, Role};
pub use refund::{RefundContext, RefundError, RefundKind, RefundService, RefundTransaction};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Identity verification failed: {0}")]
    IdentityError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
