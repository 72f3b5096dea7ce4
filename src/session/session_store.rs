use crate::application_port::{RoleLookupError, RoleResolver};
use crate::domain_model::*;
use crate::domain_port::*;
use crate::session::Subscription;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

struct Shared {
    auth: Arc<dyn AuthBackend>,
    resolver: Arc<dyn RoleResolver>,
    /// Bumped on every session change. A role lookup may only land in the
    /// snapshot if the epoch it started under is still current.
    epoch: Mutex<u64>,
    snapshot: watch::Sender<SessionSnapshot>,
}

impl Shared {
    fn lock_epoch(&self) -> MutexGuard<'_, u64> {
        self.epoch.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replaces session and identity. The role survives only if the identity
    /// is unchanged (token refresh); otherwise it is cleared until the new
    /// lookup lands.
    fn apply_session(self: &Arc<Self>, session: Option<Session>) {
        let next_user = session.as_ref().map(|s| s.user.id);
        let epoch = {
            let mut epoch = self.lock_epoch();
            *epoch += 1;
            self.snapshot.send_if_modified(|current| {
                let kept_role = match (current.identity(), next_user) {
                    (Some(previous), Some(next)) if previous.id == next => current.role(),
                    _ => None,
                };
                let next = SessionSnapshot::from_session(session).with_role(kept_role);
                if *current == next {
                    return false;
                }
                *current = next;
                true
            });
            *epoch
        };

        if let Some(user_id) = next_user {
            self.spawn_role_lookup(epoch, user_id);
        }
    }

    fn clear(&self) {
        let mut epoch = self.lock_epoch();
        *epoch += 1;
        self.snapshot.send_if_modified(|current| {
            if current.is_signed_in() {
                *current = SessionSnapshot::signed_out();
                true
            } else {
                false
            }
        });
    }

    fn spawn_role_lookup(self: &Arc<Self>, epoch: u64, user_id: UserId) {
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = shared.resolver.resolve(user_id).await;
            shared.apply_role(epoch, user_id, outcome);
        });
    }

    fn apply_role(&self, epoch: u64, user_id: UserId, outcome: Result<Role, RoleLookupError>) {
        let current_epoch = self.lock_epoch();
        let current_user = self.snapshot.borrow().identity().map(|i| i.id);
        if *current_epoch != epoch || current_user != Some(user_id) {
            tracing::debug!(%user_id, epoch, current = *current_epoch, "discarding stale role lookup");
            return;
        }

        match outcome {
            Ok(role) => {
                tracing::debug!(%user_id, %role, "role resolved");
                self.snapshot.send_if_modified(|current| {
                    if current.role() == Some(role) {
                        return false;
                    }
                    *current = current.clone().with_role(Some(role));
                    true
                });
            }
            Err(e) => {
                tracing::warn!(%user_id, "role unknown: {e}");
            }
        }
    }
}

async fn listen(shared: Arc<Shared>, mut changes: AuthSubscription, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("session listener cancelled");
                break;
            }
            received = changes.recv() => match received {
                Ok(change) => {
                    tracing::debug!(event = ?change.event, "auth change");
                    shared.apply_session(change.session);
                }
                Err(RecvError::Lagged(skipped)) => {
                    // Each change carries the full session, so the next one
                    // brings the snapshot up to date.
                    tracing::warn!(skipped, "session listener lagged");
                }
                Err(RecvError::Closed) => {
                    tracing::info!("auth change channel closed");
                    break;
                }
            }
        }
    }
}

/// Single source of truth for who is signed in and in what role.
///
/// Consumers read [`SessionStore::snapshot`] or [`SessionStore::watch`];
/// the only writers are the auth-change listener and
/// [`SessionStore::sign_out`].
pub struct SessionStore {
    shared: Arc<Shared>,
    subscription: Subscription,
}

impl SessionStore {
    /// Subscribes to auth changes, then reads the current session once. A
    /// failed read leaves the store signed out; it is not retried.
    pub async fn start(
        auth: Arc<dyn AuthBackend>,
        resolver: Arc<dyn RoleResolver>,
    ) -> Result<Self, BackendError> {
        // Subscribe first so no change between the read and the listener
        // start is lost; queued changes are newer than the read.
        let changes = auth.subscribe()?;

        let (snapshot, _) = watch::channel(SessionSnapshot::signed_out());
        let shared = Arc::new(Shared {
            auth,
            resolver,
            epoch: Mutex::new(0),
            snapshot,
        });

        match shared.auth.current_session().await {
            Ok(session) => shared.apply_session(session),
            Err(e) => tracing::warn!("could not read current session, starting signed out: {e}"),
        }

        let cancel = CancellationToken::new();
        let listener = tokio::spawn(listen(shared.clone(), changes, cancel.clone()));
        tracing::info!("session store started");

        Ok(Self {
            shared,
            subscription: Subscription::new(cancel, listener),
        })
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.snapshot.borrow().clone()
    }

    /// Receiver that sees every snapshot change from now on.
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.snapshot.subscribe()
    }

    /// Ends the session. On success the snapshot is cleared right away,
    /// without waiting for the backend's signed-out notification. On failure
    /// the snapshot is left as it was.
    pub async fn sign_out(&self) -> Result<(), BackendError> {
        self.shared
            .auth
            .sign_out()
            .await
            .inspect_err(|e| tracing::warn!("sign-out failed: {e}"))?;
        self.shared.clear();
        tracing::info!("signed out");
        Ok(())
    }

    /// Stops listening to auth changes. Safe to call more than once.
    pub fn unsubscribe(&self) {
        if self.subscription.release() {
            tracing::info!("session store unsubscribed");
        }
    }

    /// Like [`SessionStore::unsubscribe`], but waits for the listener to exit.
    pub async fn shutdown(&self) {
        self.subscription.shutdown().await;
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application_impl::ProfileRoleResolver;
    use crate::infra_memory::{MemoryBackend, Operation};
    use std::time::Duration;

    async fn start(backend: &Arc<MemoryBackend>) -> SessionStore {
        let resolver = Arc::new(ProfileRoleResolver::new(backend.clone()));
        SessionStore::start(backend.clone(), resolver).await.unwrap()
    }

    /// Lets every spawned task run to completion; time is paused in these
    /// tests so this does not actually wait.
    async fn settle() {
        tokio::time::sleep(Duration::from_secs(5)).await;
    }

    fn user(backend: &MemoryBackend, email: &str, role: Option<Role>) -> Identity {
        let identity = backend.add_account(email, "pw");
        if let Some(role) = role {
            backend.add_profile(identity.id, role);
        }
        identity
    }

    #[tokio::test(start_paused = true)]
    async fn starts_signed_out_without_session() {
        let backend = Arc::new(MemoryBackend::new());
        let store = start(&backend).await;
        settle().await;

        assert_eq!(store.snapshot(), SessionSnapshot::signed_out());
        assert_eq!(backend.calls(Operation::CurrentSession), 1);
        assert_eq!(backend.calls(Operation::Subscribe), 1);
        assert_eq!(backend.calls(Operation::QueryOne(Table::Profiles)), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn existing_session_is_loaded_and_resolved() {
        let backend = Arc::new(MemoryBackend::new());
        let ana = user(&backend, "ana@example.com", Some(Role::Client));
        backend.sign_in("ana@example.com", "pw").await.unwrap();

        let store = start(&backend).await;
        assert_eq!(store.snapshot().identity(), Some(&ana));
        settle().await;

        assert_eq!(store.snapshot().role(), Some(Role::Client));
        assert_eq!(backend.calls(Operation::CurrentSession), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_initial_read_starts_signed_out_and_still_listens() {
        let backend = Arc::new(MemoryBackend::new());
        user(&backend, "ana@example.com", Some(Role::Driver));
        backend.sign_in("ana@example.com", "pw").await.unwrap();
        backend.fail_next(
            Operation::CurrentSession,
            BackendError::Unavailable("offline".into()),
        );

        let store = start(&backend).await;
        settle().await;
        assert_eq!(store.snapshot(), SessionSnapshot::signed_out());
        assert_eq!(backend.calls(Operation::CurrentSession), 1);

        backend.sign_in("ana@example.com", "pw").await.unwrap();
        settle().await;
        assert_eq!(store.snapshot().role(), Some(Role::Driver));
        assert_eq!(backend.calls(Operation::CurrentSession), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sign_in_notification_populates_identity_then_role() {
        let backend = Arc::new(MemoryBackend::new());
        let ana = user(&backend, "ana@example.com", Some(Role::Restaurant));
        backend.set_lookup_delay(ana.id, Duration::from_millis(200));
        let store = start(&backend).await;
        let mut rx = store.watch();

        backend.sign_in("ana@example.com", "pw").await.unwrap();
        let snapshot = rx.wait_for(|s| s.is_signed_in()).await.unwrap().clone();
        assert_eq!(snapshot.identity(), Some(&ana));
        assert_eq!(snapshot.role(), None);

        settle().await;
        assert_eq!(store.snapshot().role(), Some(Role::Restaurant));
    }

    #[tokio::test(start_paused = true)]
    async fn late_result_for_superseded_identity_is_discarded() {
        let backend = Arc::new(MemoryBackend::new());
        let a = user(&backend, "a@example.com", Some(Role::Restaurant));
        let b = user(&backend, "b@example.com", Some(Role::Driver));
        backend.set_lookup_delay(a.id, Duration::from_millis(500));
        backend.set_lookup_delay(b.id, Duration::from_millis(10));
        let store = start(&backend).await;

        backend.sign_in("a@example.com", "pw").await.unwrap();
        backend.sign_in("b@example.com", "pw").await.unwrap();
        settle().await;

        let snapshot = store.snapshot();
        assert_eq!(snapshot.identity(), Some(&b));
        assert_eq!(snapshot.role(), Some(Role::Driver));
        assert_eq!(backend.calls(Operation::QueryOne(Table::Profiles)), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn late_result_after_sign_out_is_discarded() {
        let backend = Arc::new(MemoryBackend::new());
        let a = user(&backend, "a@example.com", Some(Role::Admin));
        backend.set_lookup_delay(a.id, Duration::from_millis(500));
        let store = start(&backend).await;
        let mut rx = store.watch();

        backend.sign_in("a@example.com", "pw").await.unwrap();
        rx.wait_for(|s| s.is_signed_in()).await.unwrap();
        store.sign_out().await.unwrap();
        settle().await;

        assert_eq!(store.snapshot(), SessionSnapshot::signed_out());
    }

    #[tokio::test(start_paused = true)]
    async fn switching_identity_clears_previous_role() {
        let backend = Arc::new(MemoryBackend::new());
        user(&backend, "a@example.com", Some(Role::Restaurant));
        let b = user(&backend, "b@example.com", Some(Role::Driver));
        backend.set_lookup_delay(b.id, Duration::from_millis(300));
        let store = start(&backend).await;
        let mut rx = store.watch();

        backend.sign_in("a@example.com", "pw").await.unwrap();
        settle().await;
        assert_eq!(store.snapshot().role(), Some(Role::Restaurant));

        backend.sign_in("b@example.com", "pw").await.unwrap();
        let snapshot = rx
            .wait_for(|s| s.identity().map(|i| i.id) == Some(b.id))
            .await
            .unwrap()
            .clone();
        assert_eq!(snapshot.role(), None);

        settle().await;
        assert_eq!(store.snapshot().role(), Some(Role::Driver));
    }

    #[tokio::test(start_paused = true)]
    async fn token_refresh_keeps_role() {
        let backend = Arc::new(MemoryBackend::new());
        user(&backend, "a@example.com", Some(Role::Client));
        let store = start(&backend).await;
        let mut rx = store.watch();

        backend.sign_in("a@example.com", "pw").await.unwrap();
        settle().await;
        assert_eq!(store.snapshot().role(), Some(Role::Client));

        let refreshed = backend.refresh_session().unwrap();
        let snapshot = rx
            .wait_for(|s| s.session().map(|x| &x.access_token) == Some(&refreshed.access_token))
            .await
            .unwrap()
            .clone();
        assert_eq!(snapshot.role(), Some(Role::Client));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_profile_leaves_role_unknown() {
        let backend = Arc::new(MemoryBackend::new());
        let ghost = user(&backend, "ghost@example.com", None);
        let store = start(&backend).await;

        backend.sign_in("ghost@example.com", "pw").await.unwrap();
        settle().await;

        let snapshot = store.snapshot();
        assert_eq!(snapshot.identity(), Some(&ghost));
        assert_eq!(snapshot.role(), None);
        assert!(store.is_subscribed());
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_failure_leaves_role_unknown() {
        let backend = Arc::new(MemoryBackend::new());
        user(&backend, "a@example.com", Some(Role::Driver));
        backend.fail_next(
            Operation::QueryOne(Table::Profiles),
            BackendError::Unavailable("503".into()),
        );
        let store = start(&backend).await;

        backend.sign_in("a@example.com", "pw").await.unwrap();
        settle().await;
        assert!(store.snapshot().is_signed_in());
        assert_eq!(store.snapshot().role(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn sign_out_clears_without_waiting_for_echo() {
        let backend = Arc::new(MemoryBackend::new());
        user(&backend, "a@example.com", Some(Role::Client));
        let store = start(&backend).await;
        backend.sign_in("a@example.com", "pw").await.unwrap();
        settle().await;
        assert!(store.snapshot().is_signed_in());

        // No listener left to deliver the signed-out echo.
        store.shutdown().await;
        store.sign_out().await.unwrap();
        assert_eq!(store.snapshot(), SessionSnapshot::signed_out());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_sign_out_keeps_snapshot() {
        let backend = Arc::new(MemoryBackend::new());
        user(&backend, "a@example.com", Some(Role::Client));
        let store = start(&backend).await;
        backend.sign_in("a@example.com", "pw").await.unwrap();
        settle().await;
        let before = store.snapshot();

        backend.fail_next(Operation::SignOut, BackendError::Unavailable("offline".into()));
        let result = store.sign_out().await;
        assert_eq!(result, Err(BackendError::Unavailable("offline".into())));
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn role_never_outlives_identity() {
        let backend = Arc::new(MemoryBackend::new());
        let a = user(&backend, "a@example.com", Some(Role::Restaurant));
        user(&backend, "b@example.com", Some(Role::Driver));
        backend.set_lookup_delay(a.id, Duration::from_millis(50));
        let store = start(&backend).await;
        let mut rx = store.watch();

        let observer = tokio::spawn(async move {
            let mut seen = Vec::new();
            while rx.changed().await.is_ok() {
                seen.push(rx.borrow_and_update().clone());
            }
            seen
        });

        for _ in 0..3 {
            backend.sign_in("a@example.com", "pw").await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            backend.emit(AuthChange::signed_out());
            backend.sign_in("b@example.com", "pw").await.unwrap();
            settle().await;
            store.sign_out().await.unwrap();
            settle().await;
        }
        drop(store);

        let seen = observer.await.unwrap();
        assert!(!seen.is_empty());
        for snapshot in seen {
            assert_eq!(snapshot.identity().is_some(), snapshot.session().is_some());
            if snapshot.role().is_some() {
                assert!(snapshot.identity().is_some());
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unsubscribe_is_idempotent_and_stops_updates() {
        let backend = Arc::new(MemoryBackend::new());
        user(&backend, "a@example.com", Some(Role::Client));
        let store = start(&backend).await;

        store.unsubscribe();
        store.unsubscribe();
        store.shutdown().await;
        assert!(!store.is_subscribed());

        backend.sign_in("a@example.com", "pw").await.unwrap();
        settle().await;
        assert_eq!(store.snapshot(), SessionSnapshot::signed_out());
    }

    /// Auth backend whose change channel is already closed.
    struct ClosedChannel;

    #[async_trait::async_trait]
    impl AuthBackend for ClosedChannel {
        async fn current_session(&self) -> Result<Option<Session>, BackendError> {
            Ok(None)
        }

        fn subscribe(&self) -> Result<AuthSubscription, BackendError> {
            let (_, rx) = tokio::sync::broadcast::channel(1);
            Ok(rx)
        }

        async fn sign_in(&self, _: &str, _: &str) -> Result<Session, BackendError> {
            Err(BackendError::InvalidCredentials)
        }

        async fn sign_up(&self, _: SignUpRequest) -> Result<Identity, BackendError> {
            Err(BackendError::Unavailable("closed".into()))
        }

        async fn sign_out(&self) -> Result<(), BackendError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn closed_change_channel_ends_subscription() {
        let backend = Arc::new(MemoryBackend::new());
        let resolver = Arc::new(ProfileRoleResolver::new(backend));
        let store = SessionStore::start(Arc::new(ClosedChannel), resolver)
            .await
            .unwrap();
        settle().await;

        assert!(!store.is_subscribed());
        assert_eq!(store.snapshot(), SessionSnapshot::signed_out());
        store.unsubscribe();
        store.shutdown().await;
    }
}
