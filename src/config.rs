//! Configuration for the validator node server.
//!
//! Loaded once at startup from a YAML file (`--config`/`$CONFIG`, default
//! `validator-node-config.yml`) into a frozen, typed tree and injected into
//! the rest of the application via [`crate::app_context::AppContext`].
//! Private keys support the same `$VAR`/`${VAR}` environment-variable
//! indirection the teacher's config layer provides, plus a file-path form
//! (the original's `coerce: load_if_file`).

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::domain::{ChainId, NodeMode};

#[derive(Parser, Debug)]
#[command(name = "transfer-validator-node")]
#[command(about = "Federated cross-chain transfer validator node")]
struct CliArgs {
    /// Path to the YAML configuration file.
    #[arg(long, short, env = "CONFIG", default_value = "validator-node-config.yml")]
    config: PathBuf,
}

/// A transparent wrapper that resolves `$VAR`/`${VAR}` environment variable
/// references during deserialization, falling back to the literal value.
/// Carried over from the teacher's `LiteralOrEnv<T>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralOrEnv<T>(pub T);

impl<T> Deref for LiteralOrEnv<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> DerefMut for LiteralOrEnv<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<'de, T> Deserialize<'de> for LiteralOrEnv<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let value = if let Some(var_name) = parse_env_var_syntax(&s) {
            std::env::var(&var_name).map_err(|_| {
                serde::de::Error::custom(format!(
                    "environment variable '{var_name}' not found (referenced as '{s}')"
                ))
            })?
        } else {
            s
        };
        value
            .parse::<T>()
            .map_err(|e| serde::de::Error::custom(format!("failed to parse value: {e}")))
            .map(LiteralOrEnv)
    }
}

fn parse_env_var_syntax(s: &str) -> Option<String> {
    if let Some(inner) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        Some(inner.to_string())
    } else if let Some(name) = s.strip_prefix('$') {
        if !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_') {
            Some(name.to_string())
        } else {
            None
        }
    } else {
        None
    }
}

/// A validator private key given literally, via an environment variable
/// reference, or as a path to a file containing the key (the original's
/// `coerce: load_if_file`).
#[derive(Debug, Clone)]
pub enum PrivateKeySource {
    Literal(String),
    File(PathBuf),
}

impl FromStr for PrivateKeySource {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let path = Path::new(s);
        if path.is_file() {
            Ok(PrivateKeySource::File(path.to_path_buf()))
        } else {
            Ok(PrivateKeySource::Literal(s.to_string()))
        }
    }
}

impl PrivateKeySource {
    /// Resolves to the raw hex private key string.
    pub fn resolve(&self) -> Result<String, ConfigError> {
        match self {
            PrivateKeySource::Literal(s) => Ok(s.clone()),
            PrivateKeySource::File(path) => fs::read_to_string(path)
                .map(|s| s.trim().to_string())
                .map_err(|e| ConfigError::FileRead(path.clone(), e)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Human,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogFileConfig {
    pub enabled: bool,
    #[serde(default = "log_defaults::default_file_name")]
    pub name: String,
    #[serde(default = "log_defaults::default_max_bytes")]
    pub max_bytes: u64,
    #[serde(default = "log_defaults::default_backup_count")]
    pub backup_count: u32,
}

mod log_defaults {
    pub fn default_file_name() -> String {
        "validator-node.log".to_string()
    }
    pub fn default_max_bytes() -> u64 {
        10 * 1024 * 1024
    }
    pub fn default_backup_count() -> u32 {
        5
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "log_format_default")]
    pub format: LogFormat,
    #[serde(default)]
    pub console_enabled: bool,
    #[serde(default)]
    pub file: Option<LogFileConfig>,
}

fn log_format_default() -> LogFormat {
    LogFormat::Human
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationConfig {
    #[serde(default)]
    pub debug: bool,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub ssl_certificate: Option<String>,
    #[serde(default)]
    pub ssl_private_key: Option<String>,
    pub mode: NodeMode,
    pub primary_url: url::Url,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
    #[serde(default)]
    pub max_overflow: u32,
    #[serde(default)]
    pub echo: bool,
    /// Directory of `sqlx::migrate!` SQL files (replaces the original's
    /// `alembic_config` script path).
    #[serde(default = "database_defaults::default_migrations_path")]
    pub migrations_path: String,
    #[serde(default)]
    pub apply_migrations: bool,
}

mod database_defaults {
    pub fn default_migrations_path() -> String {
        "migrations".to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    pub interval: u64,
    pub number_threads: usize,
}

/// Retry policy for one [`crate::scheduler::TaskKind`].
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TaskConfig {
    pub retry_interval_in_seconds: u64,
    pub retry_interval_after_error_in_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TasksConfig {
    pub confirm_transfer: TaskConfig,
    pub submit_transfer_onchain: TaskConfig,
    pub submit_transfer_to_primary_node: TaskConfig,
    pub validate_transfer: TaskConfig,
}

/// Per-blockchain configuration, one entry per supported chain name.
///
/// `id` is the stable small-integer blockchain identifier used throughout
/// the data model (§3: "id (stable small integer)"; the original assigns
/// this from `pantos.common.blockchains.Blockchain`, an enum this system
/// has no access to, so it is an explicit config field here — an Open
/// Question resolution recorded in DESIGN.md). `chain_id` is the unrelated
/// EVM RPC/signing chain id used in the EIP-712 domain and JSON-RPC calls.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockchainConfig {
    pub id: i32,
    #[serde(default = "blockchain_defaults::default_active")]
    pub active: bool,
    pub private_key: LiteralOrEnv<PrivateKeySource>,
    #[serde(default)]
    pub private_key_password: String,
    pub providers: Vec<url::Url>,
    #[serde(default)]
    pub fallback_providers: Vec<url::Url>,
    #[serde(default)]
    pub provider_timeout: Option<u64>,
    pub average_block_time: u64,
    pub chain_id: u64,
    pub hub: String,
    pub forwarder: String,
    pub pan_token: String,
    pub from_block: i64,
    pub outgoing_transfers_number_blocks: u64,
    pub confirmations: u64,
    pub min_adaptable_fee_per_gas: u128,
    #[serde(default)]
    pub max_total_fee_per_gas: Option<u128>,
    pub adaptable_fee_increase_factor: f64,
    pub blocks_until_resubmission: u64,
}

mod blockchain_defaults {
    pub fn default_active() -> bool {
        true
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Supported protocol semver. Checked at startup (§4.7) against the
    /// running Hub/Forwarder ABI on every active chain.
    pub protocol: semver::Version,
    pub application: ApplicationConfig,
    pub database: DatabaseConfig,
    pub monitor: MonitorConfig,
    pub tasks: TasksConfig,
    pub blockchains: HashMap<String, BlockchainConfig>,
}

impl Config {
    pub fn active_chains(&self) -> impl Iterator<Item = (&String, &BlockchainConfig)> {
        self.blockchains.iter().filter(|(_, c)| c.active)
    }

    pub fn chain_by_id(&self, chain_id: ChainId) -> Option<(&String, &BlockchainConfig)> {
        self.blockchains.iter().find(|(_, c)| c.id == chain_id.0)
    }

    /// Loads configuration from CLI/env-provided path.
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        Self::load_from_path(&cli_args.config)
    }

    fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("failed to parse config file: {0}")]
    YamlParse(#[from] serde_yaml::Error),
}
