//! Zelana PXE Configuration
//!
//! Configuration for the private execution environment.
//!
//! Handles loading configuration from:
//! 1. ZL_PXE_CONFIG env var (explicit path)
//! 2. ./pxe.toml (current directory)
//! 3. ~/.zelana/pxe.toml (user home)
//!
//! Environment variables take precedence over TOML config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::{env, fs};

/// Global config instance for convenience access
pub static GLOBAL_CONFIG: OnceLock<PxeConfig> = OnceLock::new();

const CONFIG_FILE_NAME: &str = "pxe.toml";
const CONFIG_DIR_NAME: &str = ".zelana";

// ============================================================================
// Default Constants
// ============================================================================

const DEFAULT_NODE_URL: &str = "http://127.0.0.1:8080";
const DEFAULT_DB_PATH: &str = "./zelana-pxe-db";
const DEFAULT_PROOF_TIMEOUT_SECS: u64 = 300;
const DEFAULT_PROVER_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_L2_STARTING_BLOCK: u64 = 1;
const DEFAULT_SYNC_POLL_INTERVAL_MS: u64 = 100;

// ============================================================================
// Config Structs
// ============================================================================

/// Root configuration structure (matches TOML layout)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PxeConfig {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub prover: ProverConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Ledger node connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_node_url")]
    pub url: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_NODE_URL.into(),
        }
    }
}

fn default_node_url() -> String {
    DEFAULT_NODE_URL.into()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_DB_PATH.into(),
        }
    }
}

fn default_db_path() -> String {
    DEFAULT_DB_PATH.into()
}

/// Kernel prover configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProverConfig {
    #[serde(default)]
    pub mode: ProverMode,
    /// Proving coordinator URL (remote mode)
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_proof_timeout")]
    pub proof_timeout_secs: u64,
    #[serde(default = "default_prover_poll_interval")]
    pub poll_interval_ms: u64,
}

/// Which kernel prover produces real proofs
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProverMode {
    /// No proof, deterministic public inputs
    #[default]
    Test,
    /// HTTP proving coordinator
    Remote,
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            mode: ProverMode::Test,
            url: None,
            proof_timeout_secs: DEFAULT_PROOF_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_PROVER_POLL_INTERVAL_MS,
        }
    }
}

fn default_proof_timeout() -> u64 {
    DEFAULT_PROOF_TIMEOUT_SECS
}
fn default_prover_poll_interval() -> u64 {
    DEFAULT_PROVER_POLL_INTERVAL_MS
}

/// Note synchronization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_l2_starting_block")]
    pub l2_starting_block: u64,
    #[serde(default = "default_sync_poll_interval")]
    pub polling_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            l2_starting_block: DEFAULT_L2_STARTING_BLOCK,
            polling_interval_ms: DEFAULT_SYNC_POLL_INTERVAL_MS,
        }
    }
}

fn default_l2_starting_block() -> u64 {
    DEFAULT_L2_STARTING_BLOCK
}
fn default_sync_poll_interval() -> u64 {
    DEFAULT_SYNC_POLL_INTERVAL_MS
}

// ============================================================================
// Environment Variable Helpers
// ============================================================================

/// Set field from env var if present
fn env_string(key: &str, field: &mut String) {
    if let Ok(v) = env::var(key) {
        *field = v;
    }
}

/// Set Option<String> from env var if present
fn env_option_string(key: &str, field: &mut Option<String>) {
    if let Ok(v) = env::var(key) {
        *field = Some(v);
    }
}

/// Set field from env var if present and parseable
fn env_parse<T: std::str::FromStr>(key: &str, field: &mut T) {
    if let Ok(v) = env::var(key) {
        if let Ok(parsed) = v.parse() {
            *field = parsed;
        } else {
            log::warn!("Ignoring unparseable {}={}", key, v);
        }
    }
}

// ============================================================================
// Implementation
// ============================================================================

impl PxeConfig {
    /// Load configuration from config file with env var overrides
    pub fn load() -> Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                log::info!("Loading PXE config from: {}", path.display());
                let contents = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                toml::from_str(&contents)
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))?
            }
            None => {
                log::info!("No PXE config file found, using defaults and environment variables");
                Self::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.apply_env_overrides();
        Ok(config)
    }

    /// Find the config file path
    fn find_config_file() -> Option<PathBuf> {
        // 1. Check ZL_PXE_CONFIG env var
        if let Ok(path) = env::var("ZL_PXE_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
            log::warn!("ZL_PXE_CONFIG points at missing file: {}", path.display());
        }

        // 2. Check ./pxe.toml (current directory)
        let local_path = PathBuf::from(CONFIG_FILE_NAME);
        if local_path.exists() {
            return Some(local_path);
        }

        // 3. Check ~/.zelana/pxe.toml
        Self::default_config_path().filter(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        env_string("ZL_NODE_URL", &mut self.node.url);
        env_string("ZL_PXE_DB_PATH", &mut self.database.path);

        if let Ok(v) = env::var("ZL_PXE_PROVER") {
            self.prover.mode = match v.to_ascii_lowercase().as_str() {
                "remote" => ProverMode::Remote,
                _ => ProverMode::Test,
            };
        }
        env_option_string("ZL_PXE_PROVER_URL", &mut self.prover.url);
        env_parse(
            "ZL_PXE_PROOF_TIMEOUT_SECS",
            &mut self.prover.proof_timeout_secs,
        );

        env_parse("ZL_PXE_L2_START_BLOCK", &mut self.sync.l2_starting_block);
        env_parse(
            "ZL_PXE_SYNC_POLL_INTERVAL_MS",
            &mut self.sync.polling_interval_ms,
        );
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Generate a sample config file
    pub fn generate_sample() -> String {
        let mut sample = Self::default();
        sample.prover.url = Some("http://127.0.0.1:8090".into());
        toml::to_string_pretty(&sample).unwrap_or_default()
    }

    /// Get the global config instance, initializing it if necessary.
    ///
    /// Falls back to defaults if loading fails.
    pub fn global() -> &'static PxeConfig {
        GLOBAL_CONFIG.get_or_init(|| {
            Self::load().unwrap_or_else(|e| {
                log::warn!("Failed to load PXE config: {}, using defaults", e);
                Self::default()
            })
        })
    }

    /// Initialize the global config with a specific instance.
    ///
    /// Returns `Err(config)` if already initialized.
    pub fn set_global(config: PxeConfig) -> Result<(), PxeConfig> {
        GLOBAL_CONFIG.set(config)
    }
}

// ============================================================================
// Tests
// ============================================================================
