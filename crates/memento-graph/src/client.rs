//! PostgreSQL connection management for the knowledge graph store.

use std::time::Duration;

use serde::Deserialize;
use tokio_postgres::{Client, NoTls};

use memento_core::{MementoError, Result};

/// Bounded retry for the initial connect and for transparent reconnects.
const MAX_CONNECT_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Configuration for connecting to PostgreSQL.
#[derive(Debug, Clone, Deserialize)]
pub struct PgConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_dbname")]
    pub dbname: String,

    #[serde(default = "default_user")]
    pub user: String,

    /// Optional; trust/peer auth setups leave this empty.
    #[serde(default)]
    pub password: String,

    /// Reject any statement not classified as read-only.
    #[serde(default)]
    pub read_only: bool,

    /// Per-statement deadline in milliseconds; `None` disables it.
    #[serde(default = "default_timeout_ms")]
    pub statement_timeout_ms: Option<u64>,
}

impl Default for PgConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dbname: default_dbname(),
            user: default_user(),
            password: String::new(),
            read_only: false,
            statement_timeout_ms: default_timeout_ms(),
        }
    }
}

impl PgConfig {
    /// Fail fast on missing required parameters, before any network call.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.host.trim().is_empty() {
            missing.push("host");
        }
        if self.dbname.trim().is_empty() {
            missing.push("dbname");
        }
        if self.user.trim().is_empty() {
            missing.push("user");
        }
        if self.port == 0 {
            missing.push("port");
        }
        if !missing.is_empty() {
            return Err(MementoError::Config(format!(
                "Missing required parameters: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    /// Load from `<prefix>.toml` `[postgres]` section and `MEMENTO__`
    /// environment variables, falling back to defaults.
    ///
    /// Only a wholly absent section falls back; a section that is present
    /// but malformed is a configuration error, not a silent default.
    pub fn load(file_prefix: &str) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("MEMENTO")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| MementoError::Config(e.to_string()))?;

        match cfg.get::<PgConfig>("postgres") {
            Ok(c) => Ok(c),
            Err(config::ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(MementoError::Config(e.to_string())),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_dbname() -> String {
    "memento".to_string()
}

fn default_user() -> String {
    "postgres".to_string()
}

fn default_timeout_ms() -> Option<u64> {
    Some(10_000)
}

/// PostgreSQL-backed store for the knowledge graph.
///
/// Owns a single live connection. Every operation flows through the
/// executor ([`GraphStore::execute`]) and inherits its transaction and
/// recovery behavior: commit on success, rollback on failure, reconnect
/// with bounded retry when the connection is found dead.
///
/// Methods take `&mut self` because one connection cannot carry two
/// statements at once; concurrent callers put a mutex in front or use one
/// store per worker.
pub struct GraphStore {
    pub(crate) client: Client,
    pub(crate) config: PgConfig,
}

impl GraphStore {
    /// Connect to PostgreSQL with the given configuration.
    pub async fn connect(config: PgConfig) -> Result<Self> {
        config.validate()?;
        let client = establish(&config).await?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &PgConfig {
        &self.config
    }

    /// Re-establish the connection if the handle has gone dead. Runs
    /// before every statement, making executor calls self-healing with
    /// respect to dropped connections.
    pub(crate) async fn ensure_connected(&mut self) -> Result<()> {
        if self.client.is_closed() {
            tracing::warn!("connection lost, attempting to reconnect");
            self.client = establish(&self.config).await?;
        }
        Ok(())
    }
}

fn pg_params(config: &PgConfig) -> tokio_postgres::Config {
    let mut params = tokio_postgres::Config::new();
    params
        .host(&config.host)
        .port(config.port)
        .dbname(&config.dbname)
        .user(&config.user);
    if !config.password.is_empty() {
        params.password(&config.password);
    }
    params
}

/// Open a connection, retrying up to [`MAX_CONNECT_ATTEMPTS`] times with a
/// short delay between attempts.
async fn establish(config: &PgConfig) -> Result<Client> {
    let params = pg_params(config);
    let mut last_err = None;

    for attempt in 1..=MAX_CONNECT_ATTEMPTS {
        match params.connect(NoTls).await {
            Ok((client, connection)) => {
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        tracing::debug!(error = %e, "connection task ended");
                    }
                });
                tracing::info!(
                    host = %config.host,
                    dbname = %config.dbname,
                    "PostgreSQL connection established"
                );
                return Ok(client);
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "connection attempt failed");
                last_err = Some(e);
                if attempt < MAX_CONNECT_ATTEMPTS {
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }
    }

    let detail = last_err.map(|e| e.to_string()).unwrap_or_default();
    Err(MementoError::Connection(format!(
        "Failed to connect to PostgreSQL after {MAX_CONNECT_ATTEMPTS} attempts: {detail}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PgConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5432);
        assert_eq!(config.dbname, "memento");
        assert_eq!(config.user, "postgres");
        assert!(config.password.is_empty());
        assert!(!config.read_only);
        assert_eq!(config.statement_timeout_ms, Some(10_000));
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let config = PgConfig {
            host: String::new(),
            user: "  ".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, MementoError::Config(_)));
        let msg = err.to_string();
        assert!(msg.contains("host"));
        assert!(msg.contains("user"));
    }

    #[test]
    fn test_validate_rejects_zero_port() {
        let config = PgConfig {
            port: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_empty_password() {
        assert!(PgConfig::default().validate().is_ok());
    }

    fn scratch_config(name: &str, contents: Option<&str>) -> String {
        let dir = std::env::temp_dir().join(format!("memento-cfg-{}-{name}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        if let Some(contents) = contents {
            std::fs::write(dir.join("memento.toml"), contents).unwrap();
        }
        dir.join("memento").to_str().unwrap().to_string()
    }

    #[test]
    fn test_load_defaults_when_section_absent() {
        let prefix = scratch_config("absent", None);
        let config = PgConfig::load(&prefix).unwrap();
        assert_eq!(config.port, 5432);
        assert_eq!(config.dbname, "memento");
    }

    #[test]
    fn test_load_reads_file_section() {
        let prefix = scratch_config(
            "ok",
            Some("[postgres]\nport = 5433\ndbname = \"memento_test\"\n"),
        );
        let config = PgConfig::load(&prefix).unwrap();
        assert_eq!(config.port, 5433);
        assert_eq!(config.dbname, "memento_test");
        assert_eq!(config.user, "postgres");
    }

    #[test]
    fn test_load_rejects_malformed_section() {
        let prefix = scratch_config("bad", Some("[postgres]\nport = \"not-a-number\"\n"));
        let err = PgConfig::load(&prefix).unwrap_err();
        assert!(matches!(err, MementoError::Config(_)));
    }
}
