use crate::domain_model::*;
use tokio::sync::broadcast;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("user already registered")]
    AlreadyRegistered,
    #[error("invalid login credentials")]
    InvalidCredentials,
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("malformed response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    /// Stored by the auth service next to the user, e.g. `{"role": "driver"}`.
    pub metadata: serde_json::Value,
}

/// Stream of auth changes. Dropping it unregisters the listener.
pub type AuthSubscription = broadcast::Receiver<AuthChange>;

#[async_trait::async_trait]
pub trait AuthBackend: Send + Sync {
    /// The session the backend currently holds, if any.
    async fn current_session(&self) -> Result<Option<Session>, BackendError>;

    /// Push channel fed on sign-in, sign-out and token refresh.
    fn subscribe(&self) -> Result<AuthSubscription, BackendError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, BackendError>;

    /// Creates the identity. Depending on the backend this may not open a
    /// session (e-mail confirmation pending).
    async fn sign_up(&self, request: SignUpRequest) -> Result<Identity, BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;
}
