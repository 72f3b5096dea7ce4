use crate::domain_model::{Identity, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Proof of authentication issued by the auth backend. Validity is the
/// backend's business; nothing here checks `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub user: Identity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// One push notification from the auth backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChange {
    pub event: AuthEvent,
    pub session: Option<Session>,
}

impl AuthChange {
    pub fn signed_in(session: Session) -> Self {
        Self {
            event: AuthEvent::SignedIn,
            session: Some(session),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            event: AuthEvent::SignedOut,
            session: None,
        }
    }
}

/// Read-only view of who is signed in and in what role.
///
/// `identity` is present iff `session` is; `role` is only ever present
/// alongside an identity, but may lag behind it while the profile lookup runs.
/// Fields are private so consumers cannot build an inconsistent snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    session: Option<Session>,
    identity: Option<Identity>,
    role: Option<Role>,
}

impl SessionSnapshot {
    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn from_session(session: Option<Session>) -> Self {
        let identity = session.as_ref().map(|s| s.user.clone());
        Self {
            session,
            identity,
            role: None,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn is_signed_in(&self) -> bool {
        self.session.is_some()
    }

    /// Attaches a role; ignored when nobody is signed in.
    pub(crate) fn with_role(mut self, role: Option<Role>) -> Self {
        self.role = if self.identity.is_some() { role } else { None };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_model::UserId;

    fn session() -> Session {
        Session {
            access_token: "access".into(),
            refresh_token: "refresh".into(),
            expires_at: None,
            user: Identity {
                id: UserId::new_random(),
                email: Some("ana@example.com".into()),
            },
        }
    }

    #[test]
    fn identity_follows_session() {
        let s = session();
        let snapshot = SessionSnapshot::from_session(Some(s.clone()));
        assert_eq!(snapshot.identity(), Some(&s.user));
        assert_eq!(snapshot.role(), None);

        let empty = SessionSnapshot::from_session(None);
        assert_eq!(empty, SessionSnapshot::signed_out());
    }

    #[test]
    fn role_is_dropped_without_identity() {
        let snapshot = SessionSnapshot::signed_out().with_role(Some(Role::Admin));
        assert_eq!(snapshot.role(), None);

        let snapshot = SessionSnapshot::from_session(Some(session())).with_role(Some(Role::Admin));
        assert_eq!(snapshot.role(), Some(Role::Admin));
    }
}
