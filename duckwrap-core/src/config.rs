use std::fmt;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Settings for a [`DuckDbWrapper`](crate::engine::DuckDbWrapper).
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WrapperConfig {
    /// Backing database file. `None` keeps the database in memory.
    pub database_path: Option<String>,
    /// Open the connection on first use instead of requiring an explicit `open`.
    pub lazy_open: bool,
    /// Open the database file in read-only access mode.
    pub read_only: bool,
    /// Number of DuckDB worker threads; engine default when unset.
    pub threads: Option<i64>,
    /// Let DuckDB autoload known extensions when a query needs them.
    pub autoload_extensions: bool,
    /// Optional SQL script executed right after the connection is opened.
    pub init_sql: Option<String>,
    /// Comma-separated list of extensions installed and loaded for remote storage.
    pub storage_extensions: String,
    /// Name of the DuckDB secret holding the S3 credentials.
    pub s3_secret_name: String,
    /// Region override; the credential chain's region is used otherwise.
    pub s3_region: Option<String>,
    pub s3_access_key_id: Option<String>,
    pub s3_secret_access_key: Option<String>,
    pub s3_session_token: Option<String>,
    /// Log format: "compact" or "json".
    pub log_format: String,
}

impl Default for WrapperConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            lazy_open: false,
            read_only: false,
            threads: None,
            autoload_extensions: true,
            init_sql: None,
            storage_extensions: "httpfs,aws".to_string(),
            s3_secret_name: "duckwrap_s3".to_string(),
            s3_region: None,
            s3_access_key_id: None,
            s3_secret_access_key: None,
            s3_session_token: None,
            log_format: "compact".to_string(),
        }
    }
}

impl WrapperConfig {
    /// Configuration for a database backed by `path`.
    pub fn with_database_path(path: impl Into<String>) -> Self {
        Self {
            database_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Load defaults, then an optional `duckwrap.{toml,json,yaml}` file, then
    /// `DUCKWRAP_*` environment variables.
    pub fn load() -> anyhow::Result<Self> {
        let defaults_json = serde_json::to_string(&Self::default())
            .with_context(|| "failed to serialize defaults")?;
        let settings = config::Config::builder()
            .add_source(
                config::File::from_str(&defaults_json, config::FileFormat::Json).required(false),
            )
            .add_source(config::File::with_name("duckwrap").required(false))
            .add_source(config::Environment::with_prefix("DUCKWRAP"))
            .build()
            .with_context(|| "failed to load configuration")?;
        let cfg: WrapperConfig = settings
            .try_deserialize()
            .with_context(|| "failed to deserialize configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Extensions listed in `storage_extensions`, in order.
    pub fn storage_extensions(&self) -> Vec<String> {
        self.storage_extensions
            .split(',')
            .map(str::trim)
            .filter(|ext| !ext.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.s3_access_key_id.is_some() != self.s3_secret_access_key.is_some() {
            anyhow::bail!("s3_access_key_id and s3_secret_access_key must be set together");
        }
        if let Some(threads) = self.threads {
            if threads < 1 {
                anyhow::bail!("threads must be at least 1, got {threads}");
            }
        }
        if self.log_format != "compact" && self.log_format != "json" {
            anyhow::bail!("log_format must be \"compact\" or \"json\"");
        }
        Ok(())
    }
}

impl fmt::Debug for WrapperConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |value: &Option<String>| value.as_ref().map(|_| "<redacted>");
        f.debug_struct("WrapperConfig")
            .field("database_path", &self.database_path)
            .field("lazy_open", &self.lazy_open)
            .field("read_only", &self.read_only)
            .field("threads", &self.threads)
            .field("autoload_extensions", &self.autoload_extensions)
            .field("init_sql", &self.init_sql)
            .field("storage_extensions", &self.storage_extensions)
            .field("s3_secret_name", &self.s3_secret_name)
            .field("s3_region", &self.s3_region)
            .field("s3_access_key_id", &redact(&self.s3_access_key_id))
            .field("s3_secret_access_key", &redact(&self.s3_secret_access_key))
            .field("s3_session_token", &redact(&self.s3_session_token))
            .field("log_format", &self.log_format)
            .finish()
    }
}
