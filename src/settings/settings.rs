use anyhow::{Result, anyhow};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub backend: Backend,
    pub supabase: Option<Supabase>,
    pub log: Log,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    Supabase,
}

#[derive(Debug, Deserialize)]
pub struct Backend {
    pub kind: BackendKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Supabase {
    pub url: String,
    pub anon_key: String,
    /// Where the confirmation e-mail sends a newly registered user.
    pub email_redirect_to: Option<String>,
    /// Session persisted between runs; in-process only when absent.
    pub session_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

const ENV_PREFIX: &str = "GAMSTAFI";

pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .add_source(File::with_name(path))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    if settings.backend.kind == BackendKind::Supabase && settings.supabase.is_none() {
        return Err(anyhow!(
            "backend kind is supabase but the [supabase] section is missing"
        ));
    }

    Ok(settings)
}
