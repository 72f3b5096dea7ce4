use crate::domain_model::*;
use crate::domain_port::*;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;

const EVENT_CAP: usize = 64;

/// Operations whose next call can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CurrentSession,
    Subscribe,
    SignIn,
    SignUp,
    SignOut,
    QueryOne(Table),
    Insert(Table),
}

struct Account {
    identity: Identity,
    password: String,
    metadata: serde_json::Value,
}

#[derive(Default)]
struct MemoryState {
    accounts: HashMap<String, Account>,
    session: Option<Session>,
    tables: HashMap<Table, Vec<Row>>,
    inserts: Vec<(Table, Row)>,
    lookup_delays: HashMap<String, Duration>,
    failures: HashMap<Operation, BackendError>,
    calls: HashMap<Operation, usize>,
}

/// In-process auth service and table store.
///
/// Sign-up leaves the new user signed out, as an e-mail confirmation flow
/// would. Each table keys its rows on one column (`user_id` for profiles,
/// `profile_id` otherwise) and rejects duplicates with a 409.
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    events: broadcast::Sender<AuthChange>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAP);
        Self {
            state: Mutex::new(MemoryState::default()),
            events,
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn enter(&self, op: Operation) -> Result<(), BackendError> {
        let mut state = self.state();
        *state.calls.entry(op).or_default() += 1;
        match state.failures.remove(&op) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn broadcast(&self, change: AuthChange) {
        // No receivers is fine.
        let _ = self.events.send(change);
    }

    pub fn add_account(&self, email: &str, password: &str) -> Identity {
        let identity = Identity {
            id: UserId::new_random(),
            email: Some(email.to_owned()),
        };
        self.state().accounts.insert(
            email.to_owned(),
            Account {
                identity: identity.clone(),
                password: password.to_owned(),
                metadata: serde_json::Value::Null,
            },
        );
        identity
    }

    /// Seeds a profile row without recording it as an insert.
    pub fn add_profile(&self, user_id: UserId, role: Role) {
        let record = ProfileRecord {
            user_id,
            role,
            phone: String::new(),
            first_name: None,
            last_name: None,
        };
        if let Ok(row) = to_row(&record) {
            self.state()
                .tables
                .entry(Table::Profiles)
                .or_default()
                .push(row);
        }
    }

    /// Delays every lookup filtered on this user by `delay`.
    pub fn set_lookup_delay(&self, user_id: UserId, delay: Duration) {
        self.state()
            .lookup_delays
            .insert(user_id.to_string(), delay);
    }

    /// Makes the next call of `op` fail with `error`.
    pub fn fail_next(&self, op: Operation, error: BackendError) {
        self.state().failures.insert(op, error);
    }

    pub fn calls(&self, op: Operation) -> usize {
        self.state().calls.get(&op).copied().unwrap_or(0)
    }

    /// Every successful insert, in order.
    pub fn inserts(&self) -> Vec<(Table, Row)> {
        self.state().inserts.clone()
    }

    pub fn rows(&self, table: Table) -> Vec<Row> {
        self.state().tables.get(&table).cloned().unwrap_or_default()
    }

    pub fn metadata(&self, email: &str) -> Option<serde_json::Value> {
        self.state()
            .accounts
            .get(email)
            .map(|account| account.metadata.clone())
    }

    /// Replaces the session's tokens and notifies subscribers, like a
    /// background token refresh.
    pub fn refresh_session(&self) -> Option<Session> {
        let refreshed = {
            let mut state = self.state();
            let session = state.session.as_mut()?;
            session.access_token = new_token();
            session.clone()
        };
        self.broadcast(AuthChange {
            event: AuthEvent::TokenRefreshed,
            session: Some(refreshed.clone()),
        });
        Some(refreshed)
    }

    /// Pushes a change as if it came from another client of the same account.
    pub fn emit(&self, change: AuthChange) {
        self.state().session = change.session.clone();
        self.broadcast(change);
    }

    fn new_session(identity: &Identity) -> Session {
        Session {
            access_token: new_token(),
            refresh_token: new_token(),
            expires_at: Some(chrono::Utc::now() + chrono::Duration::hours(1)),
            user: identity.clone(),
        }
    }
}

fn new_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn key_column(table: Table) -> &'static str {
    match table {
        Table::Profiles => "user_id",
        Table::Restaurants | Table::Drivers => "profile_id",
    }
}

fn matches(row: &Row, filters: &[Filter<'_>]) -> bool {
    filters.iter().all(|(column, expected)| match row.get(*column) {
        Some(serde_json::Value::String(s)) => s == expected,
        Some(other) => other.to_string() == *expected,
        None => false,
    })
}

#[async_trait::async_trait]
impl AuthBackend for MemoryBackend {
    async fn current_session(&self) -> Result<Option<Session>, BackendError> {
        self.enter(Operation::CurrentSession)?;
        Ok(self.state().session.clone())
    }

    fn subscribe(&self) -> Result<AuthSubscription, BackendError> {
        self.enter(Operation::Subscribe)?;
        Ok(self.events.subscribe())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        self.enter(Operation::SignIn)?;
        let session = {
            let mut state = self.state();
            let account = state
                .accounts
                .get(email)
                .filter(|account| account.password == password)
                .ok_or(BackendError::InvalidCredentials)?;
            let session = Self::new_session(&account.identity);
            state.session = Some(session.clone());
            session
        };
        tracing::debug!(user_id = %session.user.id, "memory backend: signed in");
        self.broadcast(AuthChange::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, request: SignUpRequest) -> Result<Identity, BackendError> {
        self.enter(Operation::SignUp)?;
        let mut state = self.state();
        if state.accounts.contains_key(&request.email) {
            return Err(BackendError::AlreadyRegistered);
        }
        let identity = Identity {
            id: UserId::new_random(),
            email: Some(request.email.clone()),
        };
        state.accounts.insert(
            request.email,
            Account {
                identity: identity.clone(),
                password: request.password,
                metadata: request.metadata,
            },
        );
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.enter(Operation::SignOut)?;
        self.state().session = None;
        self.broadcast(AuthChange::signed_out());
        Ok(())
    }
}

#[async_trait::async_trait]
impl TableStore for MemoryBackend {
    async fn query_one(
        &self,
        table: Table,
        filters: &[Filter<'_>],
    ) -> Result<Option<Row>, BackendError> {
        self.enter(Operation::QueryOne(table))?;

        let delay = {
            let state = self.state();
            filters
                .iter()
                .find_map(|(_, value)| state.lookup_delays.get(value).copied())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state();
        let mut found = state
            .tables
            .get(&table)
            .into_iter()
            .flatten()
            .filter(|row| matches(row, filters));
        match (found.next(), found.next()) {
            (None, _) => Ok(None),
            (Some(row), None) => Ok(Some(row.clone())),
            (Some(_), Some(_)) => Err(BackendError::Rejected {
                status: 406,
                message: format!("more than one {table} row matches"),
            }),
        }
    }

    async fn insert(&self, table: Table, row: Row) -> Result<(), BackendError> {
        self.enter(Operation::Insert(table))?;
        let mut state = self.state();

        let column = key_column(table);
        let key = row.get(column).cloned();
        let rows = state.tables.entry(table).or_default();
        if key.is_some() && rows.iter().any(|existing| existing.get(column) == key.as_ref()) {
            return Err(BackendError::Rejected {
                status: 409,
                message: format!("duplicate {column} in {table}"),
            });
        }
        rows.push(row.clone());
        state.inserts.push((table, row));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sign_in_broadcasts_and_sets_current_session() {
        let backend = MemoryBackend::new();
        let identity = backend.add_account("ana@example.com", "pw");
        let mut rx = backend.subscribe().unwrap();

        let session = backend.sign_in("ana@example.com", "pw").await.unwrap();
        assert_eq!(session.user, identity);

        let change = rx.recv().await.unwrap();
        assert_eq!(change.event, AuthEvent::SignedIn);
        assert_eq!(backend.current_session().await.unwrap(), Some(session));

        assert_eq!(
            backend.sign_in("ana@example.com", "nope").await,
            Err(BackendError::InvalidCredentials)
        );
    }

    #[tokio::test]
    async fn sign_up_rejects_known_email() {
        let backend = MemoryBackend::new();
        backend.add_account("ana@example.com", "pw");
        let result = backend
            .sign_up(SignUpRequest {
                email: "ana@example.com".into(),
                password: "pw".into(),
                metadata: serde_json::Value::Null,
            })
            .await;
        assert_eq!(result, Err(BackendError::AlreadyRegistered));
        assert_eq!(backend.current_session().await.unwrap(), None);
    }

    #[tokio::test]
    async fn query_one_distinguishes_none_one_and_many() {
        let backend = MemoryBackend::new();
        let user = UserId::new_random();
        let filter = [("user_id", user.to_string())];
        assert_eq!(backend.query_one(Table::Profiles, &filter).await, Ok(None));

        backend.add_profile(user, Role::Driver);
        let row = backend.query_one(Table::Profiles, &filter).await.unwrap().unwrap();
        assert_eq!(row["role"], "driver");

        backend.add_profile(user, Role::Client);
        assert!(matches!(
            backend.query_one(Table::Profiles, &filter).await,
            Err(BackendError::Rejected { status: 406, .. })
        ));
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_keys_and_injected_failures() {
        let backend = MemoryBackend::new();
        let user = UserId::new_random();
        let row = to_row(&serde_json::json!({ "profile_id": user })).unwrap();

        backend.insert(Table::Drivers, row.clone()).await.unwrap();
        assert!(backend.insert(Table::Drivers, row.clone()).await.is_err());

        backend.fail_next(
            Operation::Insert(Table::Restaurants),
            BackendError::Unavailable("down".into()),
        );
        assert!(backend.insert(Table::Restaurants, row.clone()).await.is_err());
        backend.insert(Table::Restaurants, row).await.unwrap();

        assert_eq!(backend.inserts().len(), 2);
        assert_eq!(backend.calls(Operation::Insert(Table::Drivers)), 2);
    }
}
