use crate::domain_model::{Identity, Session, UserId};
use crate::domain_port::BackendError;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct UserBody {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
}

impl From<UserBody> for Identity {
    fn from(user: UserBody) -> Self {
        Identity {
            id: user.id,
            email: user.email,
        }
    }
}

/// Body of `token?grant_type=...` and of an auto-confirmed sign-up.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenBody {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: UserBody,
}

impl TokenBody {
    pub fn into_session(self, now: DateTime<Utc>) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| self.expires_in.map(|secs| now + Duration::seconds(secs)));
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user.into(),
        }
    }
}

/// Sign-up answers with a session when e-mail confirmation is off and with
/// the bare user otherwise.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum SignUpBody {
    Session(TokenBody),
    User(UserBody),
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    msg: Option<String>,
    message: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
    error_code: Option<String>,
}

const ALREADY_REGISTERED: &str = "User already registered";

/// Maps a non-2xx answer from either the auth or the REST API.
pub(crate) fn map_error(status: u16, body: &str) -> BackendError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .msg
        .or(parsed.message)
        .or(parsed.error_description)
        .or_else(|| parsed.error.clone())
        .unwrap_or_else(|| body.trim().to_owned());

    let code = parsed.error_code.as_deref();
    if code == Some("user_already_exists") || message == ALREADY_REGISTERED {
        return BackendError::AlreadyRegistered;
    }
    if code == Some("invalid_credentials") || parsed.error.as_deref() == Some("invalid_grant") {
        return BackendError::InvalidCredentials;
    }
    if status >= 500 || status == 429 {
        return BackendError::Unavailable(format!("{status}: {message}"));
    }
    BackendError::Rejected { status, message }
}

pub(crate) fn transport(error: reqwest::Error) -> BackendError {
    BackendError::Unavailable(error.to_string())
}

pub(crate) async fn read_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, BackendError> {
    let status = response.status();
    let body = response.text().await.map_err(transport)?;
    if !status.is_success() {
        return Err(map_error(status.as_u16(), &body));
    }
    serde_json::from_str(&body).map_err(|e| BackendError::Decode(e.to_string()))
}

pub(crate) async fn expect_success(response: reqwest::Response) -> Result<(), BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.map_err(transport)?;
    Err(map_error(status.as_u16(), &body))
}
