use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::infra_memory::MemoryBackend;
use crate::infra_supabase::*;
use crate::session::SessionStore;
use crate::settings::{BackendKind, Settings};
use std::sync::Arc;
use std::time::Duration;

/// Everything a front end needs, wired against one backend.
pub struct App {
    pub auth: Arc<dyn AuthBackend>,
    pub registration_service: Arc<dyn RegistrationService>,
    pub session_store: SessionStore,
}

impl App {
    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let (auth, table_store): (Arc<dyn AuthBackend>, Arc<dyn TableStore>) =
            match settings.backend.kind {
                BackendKind::Memory => {
                    tracing::warn!("using the in-memory backend, nothing is persisted");
                    let backend = Arc::new(MemoryBackend::new());
                    (backend.clone(), backend)
                }
                BackendKind::Supabase => {
                    let section = settings
                        .supabase
                        .as_ref()
                        .ok_or_else(|| anyhow::anyhow!("missing [supabase] settings"))?;
                    let config = SupabaseConfig::try_from(section)?;
                    let backend = Arc::new(SupabaseBackend::new(config).await?);
                    (backend.clone(), backend)
                }
            };
        Ok(Self::from_parts(auth, table_store).await?)
    }

    pub async fn from_parts(
        auth: Arc<dyn AuthBackend>,
        table_store: Arc<dyn TableStore>,
    ) -> Result<Self, BackendError> {
        let resolver: Arc<dyn RoleResolver> = Arc::new(ProfileRoleResolver::new(table_store.clone()));
        let registration_service: Arc<dyn RegistrationService> =
            Arc::new(RealRegistrationService::new(auth.clone(), table_store));
        let session_store = SessionStore::start(auth.clone(), resolver).await?;
        Ok(Self {
            auth,
            registration_service,
            session_store,
        })
    }

    /// Signs in and waits until the store has resolved the role, or until
    /// `wait` elapses. Returns whatever snapshot is current at that point.
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
        wait: Duration,
    ) -> Result<SessionSnapshot, BackendError> {
        let mut changes = self.session_store.watch();
        let session = self.auth.sign_in(email, password).await?;
        let user_id = session.user.id;

        let settled = changes.wait_for(|snapshot| {
            snapshot.identity().map(|i| i.id) == Some(user_id) && snapshot.role().is_some()
        });
        if tokio::time::timeout(wait, settled).await.is_err() {
            tracing::warn!(%user_id, "role not resolved within {wait:?}");
        }
        Ok(self.session_store.snapshot())
    }

    pub async fn shutdown(&self) {
        self.session_store.shutdown().await;
        tracing::info!("app shut down");
    }
}
