use crate::domain_model::*;
use crate::domain_port::*;
use crate::infra_supabase::wire::*;
use crate::settings;
use chrono::Utc;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::json;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;
use url::Url;

const EVENT_CAP: usize = 64;

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: Url,
    pub anon_key: String,
    pub email_redirect_to: Option<String>,
    pub session_file: Option<PathBuf>,
}

impl TryFrom<&settings::Supabase> for SupabaseConfig {
    type Error = anyhow::Error;

    fn try_from(value: &settings::Supabase) -> Result<Self, Self::Error> {
        if value.anon_key.is_empty() {
            return Err(anyhow::anyhow!("supabase.anon_key is empty"));
        }
        let mut url = Url::parse(&value.url)?;
        // Keep a trailing slash so `join` appends instead of replacing.
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(Self {
            url,
            anon_key: value.anon_key.clone(),
            email_redirect_to: value.email_redirect_to.clone(),
            session_file: value.session_file.clone(),
        })
    }
}

/// Client for a hosted auth + REST backend.
///
/// Like the vendor's browser SDK, the session lives client side: it is kept
/// in memory (optionally mirrored to `session_file`) and every change is
/// broadcast to subscribers.
pub struct SupabaseBackend {
    pub(crate) http: reqwest::Client,
    pub(crate) config: SupabaseConfig,
    session: Mutex<Option<Session>>,
    events: broadcast::Sender<AuthChange>,
}

impl SupabaseBackend {
    pub async fn new(config: SupabaseConfig) -> Result<Self, BackendError> {
        let mut headers = HeaderMap::new();
        let apikey = HeaderValue::from_str(&config.anon_key)
            .map_err(|e| BackendError::Rejected {
                status: 0,
                message: format!("anon key is not a valid header: {e}"),
            })?;
        headers.insert("apikey", apikey);
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(transport)?;

        let session = match &config.session_file {
            Some(path) => load_session(path).await,
            None => None,
        };
        let (events, _) = broadcast::channel(EVENT_CAP);

        Ok(Self {
            http,
            config,
            session: Mutex::new(session),
            events,
        })
    }

    fn session_slot(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.config
            .url
            .join(path)
            .map_err(|e| BackendError::Decode(format!("bad endpoint {path}: {e}")))
    }

    /// Access token of the current session, falling back to the anon key.
    pub(crate) fn bearer(&self) -> String {
        let token = self
            .session_slot()
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_else(|| self.config.anon_key.clone());
        format!("Bearer {token}")
    }

    async fn set_session(&self, session: Option<Session>, event: AuthEvent) {
        *self.session_slot() = session.clone();
        if let Some(path) = &self.config.session_file {
            if let Err(e) = save_session(path, session.as_ref()).await {
                tracing::warn!(path = %path.display(), "could not persist session: {e}");
            }
        }
        let _ = self.events.send(AuthChange { event, session });
    }

    async fn token_grant(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<Session, BackendError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);
        let response = self
            .http
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.config.anon_key))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let token: TokenBody = read_json(response).await?;
        Ok(token.into_session(Utc::now()))
    }

    /// Exchanges the refresh token for a new session and notifies subscribers.
    pub async fn refresh_session(&self) -> Result<Session, BackendError> {
        let refresh_token = self
            .session_slot()
            .as_ref()
            .map(|s| s.refresh_token.clone())
            .ok_or(BackendError::InvalidCredentials)?;
        let session = self
            .token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await?;
        self.set_session(Some(session.clone()), AuthEvent::TokenRefreshed)
            .await;
        Ok(session)
    }
}

async fn load_session(path: &PathBuf) -> Option<Session> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), "could not read session file: {e}");
            return None;
        }
    };
    serde_json::from_slice(&raw)
        .inspect_err(|e| tracing::warn!(path = %path.display(), "ignoring corrupt session file: {e}"))
        .ok()
}

async fn save_session(path: &PathBuf, session: Option<&Session>) -> std::io::Result<()> {
    match session {
        Some(session) => {
            let raw = serde_json::to_vec_pretty(session)?;
            tokio::fs::write(path, raw).await
        }
        None => match tokio::fs::remove_file(path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        },
    }
}

#[async_trait::async_trait]
impl AuthBackend for SupabaseBackend {
    async fn current_session(&self) -> Result<Option<Session>, BackendError> {
        let session = self.session_slot().clone();
        match session {
            Some(s) if s.expires_at.is_some_and(|at| at <= Utc::now()) => {
                tracing::debug!("stored session expired, refreshing");
                match self.refresh_session().await {
                    Ok(session) => Ok(Some(session)),
                    Err(e) => {
                        // A dead access token must not keep going out as bearer.
                        tracing::warn!("session refresh failed, signing out locally: {e}");
                        self.set_session(None, AuthEvent::SignedOut).await;
                        Err(e)
                    }
                }
            }
            other => Ok(other),
        }
    }

    fn subscribe(&self) -> Result<AuthSubscription, BackendError> {
        Ok(self.events.subscribe())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let session = self
            .token_grant("password", json!({ "email": email, "password": password }))
            .await?;
        tracing::info!(user_id = %session.user.id, "signed in");
        self.set_session(Some(session.clone()), AuthEvent::SignedIn)
            .await;
        Ok(session)
    }

    async fn sign_up(&self, request: SignUpRequest) -> Result<Identity, BackendError> {
        let mut url = self.endpoint("auth/v1/signup")?;
        if let Some(redirect) = &self.config.email_redirect_to {
            url.query_pairs_mut().append_pair("redirect_to", redirect);
        }
        let response = self
            .http
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.config.anon_key))
            .json(&json!({
                "email": request.email,
                "password": request.password,
                "data": request.metadata,
            }))
            .send()
            .await
            .map_err(transport)?;

        match read_json::<SignUpBody>(response).await? {
            SignUpBody::User(user) => Ok(user.into()),
            SignUpBody::Session(token) => {
                let session = token.into_session(Utc::now());
                let identity = session.user.clone();
                self.set_session(Some(session), AuthEvent::SignedIn).await;
                Ok(identity)
            }
        }
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let signed_in = self.session_slot().is_some();
        if signed_in {
            let response = self
                .http
                .post(self.endpoint("auth/v1/logout")?)
                .header(AUTHORIZATION, self.bearer())
                .send()
                .await
                .map_err(transport)?;
            match expect_success(response).await {
                Ok(()) => {}
                // The server no longer knows the token; local sign-out still applies.
                Err(BackendError::Rejected { status, .. }) if matches!(status, 401 | 403 | 404) => {
                    tracing::debug!(status, "logout rejected, clearing local session anyway");
                }
                Err(e) => return Err(e),
            }
        }
        self.set_session(None, AuthEvent::SignedOut).await;
        Ok(())
    }
}
