//! Configuration for the ingestion service
//!
//! Values are resolved in three layers: built-in defaults, an optional TOML
//! file, then environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Environment variable naming an optional TOML config file
pub const CONFIG_FILE_ENV: &str = "CONTROL_TOWER_CONFIG";

/// Main service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Upload and chunking configuration
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            enable_cors: true,
        }
    }
}

/// Upload, chunking and worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Maximum accepted upload size in bytes
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
    /// Maximum records per chunk
    #[serde(default = "default_chunk_capacity")]
    pub chunk_capacity: usize,
    /// Maximum serialized bytes per chunk
    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: usize,
    /// Jobs processed concurrently
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    /// Pending job slots in the queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Keep the raw upload after the job reaches a terminal status
    #[serde(default)]
    pub retain_sources: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_upload_size: default_max_upload_size(),
            chunk_capacity: default_chunk_capacity(),
            max_chunk_bytes: default_max_chunk_bytes(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            queue_capacity: default_queue_capacity(),
            retain_sources: false,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Connection string: `sqlite::memory:`, `sqlite://<dir or file>` or a plain path
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Database name, used as the file stem when the URL names a directory
    #[serde(default = "default_database_name")]
    pub database_name: String,
    /// Read-only connections serving queries (file-backed databases only)
    #[serde(default = "default_read_connections")]
    pub read_connections: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            database_name: default_database_name(),
            read_connections: default_read_connections(),
        }
    }
}

impl StorageConfig {
    /// Resolve the database file, `None` for an in-memory database
    pub fn database_path(&self) -> Option<PathBuf> {
        let url = self.database_url.trim();
        if url == ":memory:" || url == "sqlite::memory:" || url == "sqlite://:memory:" {
            return None;
        }

        let location = url.strip_prefix("sqlite://").unwrap_or(url);
        let path = PathBuf::from(location);
        let is_file = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("db" | "sqlite" | "sqlite3")
        );

        if is_file {
            Some(path)
        } else {
            Some(path.join(format!("{}.db", self.database_name)))
        }
    }
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8001 }
fn default_true() -> bool { true }
fn default_max_upload_size() -> u64 { 100 * 1024 * 1024 } // 100MB
fn default_chunk_capacity() -> usize { 1000 }
fn default_max_chunk_bytes() -> usize { 8 * 1024 * 1024 } // 8MB
fn default_max_concurrent_jobs() -> usize { num_cpus::get().clamp(1, 4) }
fn default_queue_capacity() -> usize { 1000 }
fn default_database_url() -> String { "sqlite://./data".to_string() }
fn default_database_name() -> String { "control_tower".to_string() }
fn default_read_connections() -> usize { 4 }

impl AppConfig {
    /// Load configuration: defaults, then `path` (or `CONTROL_TOWER_CONFIG`), then environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from));

        let mut config = match file {
            Some(file) => {
                tracing::info!("Loading configuration from {}", file.display());
                let content = std::fs::read_to_string(&file).map_err(|e| {
                    Error::Config(format!("Failed to read {}: {}", file.display(), e))
                })?;
                Self::from_toml_str(&content)?
            }
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document; missing sections fall back to defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config file: {}", e)))
    }

    /// Apply overrides from an environment-style lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        override_parsed(&lookup, "PORT", &mut self.server.port)?;
        override_parsed(&lookup, "MAX_UPLOAD_SIZE", &mut self.ingest.max_upload_size)?;
        override_parsed(&lookup, "CHUNK_CAPACITY", &mut self.ingest.chunk_capacity)?;
        override_parsed(&lookup, "MAX_CHUNK_BYTES", &mut self.ingest.max_chunk_bytes)?;
        override_parsed(&lookup, "MAX_CONCURRENT_JOBS", &mut self.ingest.max_concurrent_jobs)?;
        override_parsed(&lookup, "RETAIN_SOURCES", &mut self.ingest.retain_sources)?;
        if let Some(url) = lookup("DATABASE_URL") {
            self.storage.database_url = url;
        }
        if let Some(name) = lookup("DATABASE_NAME") {
            self.storage.database_name = name;
        }
        override_parsed(&lookup, "READ_CONNECTIONS", &mut self.storage.read_connections)?;
        Ok(())
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.ingest.max_upload_size == 0 {
            return Err(Error::Config("max_upload_size must be greater than 0".into()));
        }
        if self.ingest.chunk_capacity == 0 {
            return Err(Error::Config("chunk_capacity must be greater than 0".into()));
        }
        if self.ingest.max_chunk_bytes == 0 {
            return Err(Error::Config("max_chunk_bytes must be greater than 0".into()));
        }
        if self.ingest.max_concurrent_jobs == 0 {
            return Err(Error::Config("max_concurrent_jobs must be greater than 0".into()));
        }
        if self.ingest.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be greater than 0".into()));
        }
        if self.storage.database_name.trim().is_empty() {
            return Err(Error::Config("database_name must not be empty".into()));
        }
        Ok(())
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: '{}' ({})", key, raw, e)))?;
    }
    Ok(())
}
