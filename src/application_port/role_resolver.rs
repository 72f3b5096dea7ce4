use crate::domain_model::{Role, UserId};
use crate::domain_port::BackendError;

#[derive(Debug, thiserror::Error)]
pub enum RoleLookupError {
    #[error("no profile for user {0}")]
    NotFound(UserId),
    #[error("profile lookup failed: {0}")]
    Service(#[from] BackendError),
    #[error("profile row is malformed: {0}")]
    Malformed(String),
}

#[async_trait::async_trait]
pub trait RoleResolver: Send + Sync {
    async fn resolve(&self, user_id: UserId) -> Result<Role, RoleLookupError>;
}
