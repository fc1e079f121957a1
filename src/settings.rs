//! Runtime settings from the environment (after `.env` is loaded by the binary).

use crate::error::ConfigError;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageKind {
    Postgres,
    Memory,
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub database_url: String,
    pub bind: SocketAddr,
    pub max_connections: u32,
    pub storage: StorageKind,
    pub enforce_references: bool,
    /// Schema file to load instead of the embedded one.
    pub schema_path: Option<PathBuf>,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build settings from any key lookup. `DATABASE_URL` wins over the discrete `DATABASE_*` parts.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url = match get("DATABASE_URL") {
            Some(url) => url,
            None => {
                let host = get("DATABASE_HOST").unwrap_or_else(|| "localhost".into());
                let port = get("DATABASE_PORT").unwrap_or_else(|| "5432".into());
                let name = get("DATABASE_NAME").unwrap_or_else(|| "demeter".into());
                let credentials = match (get("DATABASE_USER"), get("DATABASE_PASSWORD")) {
                    (Some(user), Some(password)) => format!(
                        "{}:{}@",
                        urlencoding::encode(&user),
                        urlencoding::encode(&password)
                    ),
                    (Some(user), None) => format!("{}@", urlencoding::encode(&user)),
                    _ => String::new(),
                };
                format!("postgres://{}{}:{}/{}", credentials, host, port, name)
            }
        };

        let bind = get("DEMETER_BIND")
            .unwrap_or_else(|| "0.0.0.0:3000".into())
            .parse()
            .map_err(|e| ConfigError::Validation(format!("DEMETER_BIND: {}", e)))?;

        let max_connections = match get("DEMETER_MAX_CONNECTIONS") {
            Some(v) => v
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| ConfigError::Validation("DEMETER_MAX_CONNECTIONS must be a positive integer".into()))?,
            None => 5,
        };

        let storage = match get("DEMETER_STORAGE").map(|s| s.to_lowercase()).as_deref() {
            None | Some("postgres") => StorageKind::Postgres,
            Some("memory") => StorageKind::Memory,
            Some(other) => {
                return Err(ConfigError::Validation(format!(
                    "DEMETER_STORAGE must be postgres or memory, got {}",
                    other
                )))
            }
        };

        let enforce_references = match get("DEMETER_ENFORCE_REFERENCES").map(|s| s.to_lowercase()).as_deref() {
            None | Some("true") | Some("1") => true,
            Some("false") | Some("0") => false,
            Some(other) => {
                return Err(ConfigError::Validation(format!(
                    "DEMETER_ENFORCE_REFERENCES must be true or false, got {}",
                    other
                )))
            }
        };

        Ok(Settings {
            database_url,
            bind,
            max_connections,
            storage,
            enforce_references,
            schema_path: get("DEMETER_SCHEMA_PATH").map(PathBuf::from),
        })
    }
}
