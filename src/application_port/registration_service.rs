use crate::domain_model::*;
use crate::domain_port::BackendError;
use std::fmt;

/// Step of the registration sequence that came after identity creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStage {
    Profile,
    RoleRecord,
}

impl fmt::Display for RegistrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationStage::Profile => f.write_str("profile"),
            RegistrationStage::RoleRecord => f.write_str("role record"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("validation failed: {0}")]
    Validation(#[from] FormError),
    #[error("an account already exists for this e-mail")]
    AlreadyRegistered,
    #[error("registration failed: {0}")]
    Service(BackendError),
    /// The identity exists but its records do not; see `RegistrationService::resume`.
    #[error("user {user_id} was created but writing the {stage} failed: {source}")]
    Incomplete {
        user_id: UserId,
        stage: RegistrationStage,
        source: BackendError,
    },
}

impl From<BackendError> for RegistrationError {
    fn from(error: BackendError) -> Self {
        match error {
            BackendError::AlreadyRegistered => RegistrationError::AlreadyRegistered,
            other => RegistrationError::Service(other),
        }
    }
}

impl RegistrationError {
    /// Text shown to the person filling the form. Only a duplicate e-mail
    /// and a missing field get a friendlier wording.
    pub fn user_message(&self) -> String {
        match self {
            RegistrationError::AlreadyRegistered => {
                "An account already exists with this e-mail address.".to_owned()
            }
            RegistrationError::Validation(FormError::Missing(field)) => {
                format!("Please fill in the {field} field.")
            }
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub user_id: UserId,
    pub kind: AccountKind,
}

impl Registration {
    pub fn success_message(&self) -> String {
        let label = match self.kind {
            AccountKind::Client => "client",
            AccountKind::Restaurant => "restaurant",
            AccountKind::Driver => "delivery driver",
        };
        format!(
            "Registered as a {label}! Please confirm your e-mail address before signing in."
        )
    }
}

#[async_trait::async_trait]
pub trait RegistrationService: Send + Sync {
    /// Validates the form, creates the identity, then writes its profile and
    /// role record. Not atomic: later failures leave the identity in place and
    /// surface as [`RegistrationError::Incomplete`].
    async fn register(&self, form: &RegistrationForm) -> Result<Registration, RegistrationError>;

    /// Writes whichever of the profile and role record are still missing for
    /// an identity created by an earlier, incomplete registration.
    async fn resume(
        &self,
        user_id: UserId,
        form: &RegistrationForm,
    ) -> Result<Registration, RegistrationError>;
}
