use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use directories::ProjectDirs;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnectOptions;

use crate::{NotesError, Result};

/// Name of the JSON document inside the data directory.
pub const NOTES_FILE_NAME: &str = "notes.json";

/// Application configuration settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Directory holding the file backend's document
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Coalescing window for file writes in milliseconds; 0 writes on every mutation
    #[serde(default)]
    pub flush_debounce_ms: u64,

    /// PostgreSQL settings; when present the relational backend is tried first
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
}

/// Connection settings for the relational backend.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Full connection URL; takes precedence over the individual fields
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_pg_host")]
    pub host: String,
    #[serde(default = "default_pg_port")]
    pub port: u16,
    #[serde(default = "default_pg_user")]
    pub user: String,
    #[serde(default = "default_pg_password")]
    pub password: String,
    #[serde(default = "default_pg_database")]
    pub database: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// How long to wait for a connection before falling back to file storage
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// When the file backend writes its document to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPolicy {
    /// Every mutation is durable before it returns
    Immediate,
    /// Mutations within the window are coalesced into one write
    Debounced(Duration),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            flush_debounce_ms: 0,
            database: None,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: default_pg_host(),
            port: default_pg_port(),
            user: default_pg_user(),
            password: default_pg_password(),
            database: default_pg_database(),
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Config {
    /// Loads configuration from an optional JSON file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                debug!("Reading configuration from {}", path.display());
                let raw = fs::read_to_string(path).map_err(|e| NotesError::ConfigError {
                    message: format!("cannot read {}: {}", path.display(), e),
                })?;
                serde_json::from_str(&raw).map_err(|e| NotesError::ConfigError {
                    message: format!("cannot parse {}: {}", path.display(), e),
                })?
            }
            None => Config::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        info!(
            "Configuration loaded: data_dir={}, backend={}",
            config.data_dir.display(),
            if config.database.is_some() { "postgres" } else { "file" }
        );
        Ok(config)
    }

    /// Applies `WEBNOTES_*` and `PG*`/`DATABASE_URL` variables.
    ///
    /// `DATABASE_URL` or `PGHOST` being set selects the relational backend.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("WEBNOTES_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }

        if let Some(ms) = lookup("WEBNOTES_FLUSH_DEBOUNCE_MS") {
            self.flush_debounce_ms = ms.parse().map_err(|_| NotesError::ConfigError {
                message: format!("WEBNOTES_FLUSH_DEBOUNCE_MS is not a number: {}", ms),
            })?;
        }

        let url = lookup("DATABASE_URL");
        let host = lookup("PGHOST");
        if url.is_none() && host.is_none() {
            return Ok(());
        }

        let db = self.database.get_or_insert_with(DatabaseConfig::default);
        if url.is_some() {
            db.url = url;
        }
        if let Some(host) = host {
            db.host = host;
        }
        if let Some(port) = lookup("PGPORT") {
            db.port = port.parse().map_err(|_| NotesError::ConfigError {
                message: format!("PGPORT is not a valid port: {}", port),
            })?;
        }
        if let Some(user) = lookup("PGUSER") {
            db.user = user;
        }
        if let Some(password) = lookup("PGPASSWORD") {
            db.password = password;
        }
        if let Some(database) = lookup("PGDATABASE") {
            db.database = database;
        }

        Ok(())
    }

    /// Path of the file backend's JSON document.
    pub fn notes_file(&self) -> PathBuf {
        self.data_dir.join(NOTES_FILE_NAME)
    }

    pub fn flush_policy(&self) -> FlushPolicy {
        match self.flush_debounce_ms {
            0 => FlushPolicy::Immediate,
            ms => FlushPolicy::Debounced(Duration::from_millis(ms)),
        }
    }

    /// A file-backed configuration rooted at `data_dir`, ignoring the environment.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Config::default()
        }
    }
}

impl DatabaseConfig {
    /// Builds sqlx connect options from the URL or the individual fields.
    pub fn connect_options(&self) -> Result<PgConnectOptions> {
        if let Some(url) = &self.url {
            return url.parse().map_err(|e: sqlx::Error| NotesError::ConfigError {
                message: format!("invalid DATABASE_URL: {}", e),
            });
        }

        Ok(PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn default_data_dir() -> PathBuf {
    ProjectDirs::from("", "", "webnotes")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("data"))
}

fn default_pg_host() -> String {
    "localhost".to_string()
}

fn default_pg_port() -> u16 {
    5432
}

fn default_pg_user() -> String {
    "postgres".to_string()
}

fn default_pg_password() -> String {
    "postgres".to_string()
}

fn default_pg_database() -> String {
    "webnotes".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    5
}
