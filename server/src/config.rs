use std::{env, time::Duration};

use config::{Config, File};
use rescue_core::chain::RpcMode;
use rescue_executors::{
    lock::{
        DEFAULT_INGESTION_LOCK_TIMEOUT, DEFAULT_REGISTRY_IDLE_TTL, DEFAULT_RESCUE_LOCK_TIMEOUT,
        DEFAULT_SWEEP_INTERVAL,
    },
    rescue::{BudgetMode, DEFAULT_MAX_BLOCK_WINDOW},
};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct RescueConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub relayer: RelayerConfig,
    pub rescue: RescueSettings,
    pub rpc: RpcConfig,
    pub chains: Vec<ChainConfig>,
    pub explorer: ExplorerConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    pub redis: RedisConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".into(),
            log_format: LogFormat::Pretty,
        }
    }
}

/// The backend wallet that pays for rescues and receives gas payments.
#[derive(Clone, Deserialize)]
pub struct RelayerConfig {
    pub private_key: String,
}

impl std::fmt::Debug for RelayerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayerConfig")
            .field("private_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RescueSettings {
    /// Contract the compromised EOA delegates to.
    pub delegate_contract: String,
    pub budget_mode: BudgetMode,
    #[serde(default = "default_max_block_window")]
    pub max_block_window: u64,
    #[serde(default = "default_rescue_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
    /// Pins the priority fee instead of asking the chain, in wei.
    pub priority_fee_override: Option<u64>,
}

fn default_max_block_window() -> u64 {
    DEFAULT_MAX_BLOCK_WINDOW
}

fn default_rescue_lock_timeout_secs() -> u64 {
    DEFAULT_RESCUE_LOCK_TIMEOUT.as_secs()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    pub mode: RpcMode,
    /// Host and path appended to the network name, e.g. `g.alchemy.com/v2`.
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub rpc_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExplorerConfig {
    pub url: String,
    pub api_key: String,
    #[serde(default = "default_explorer_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_explorer_timeout_secs() -> u64 {
    explorer_core::client::DEFAULT_REQUEST_TIMEOUT.as_secs()
}

fn default_page_size() -> u32 {
    rescue_executors::ledger::DEFAULT_PAGE_SIZE
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub lock_timeout_secs: u64,
    pub registry_idle_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    /// When set, every chain is reconciled on this cadence in the background.
    pub reconcile_interval_secs: Option<u64>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_timeout_secs: DEFAULT_INGESTION_LOCK_TIMEOUT.as_secs(),
            registry_idle_ttl_secs: DEFAULT_REGISTRY_IDLE_TTL.as_secs(),
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL.as_secs(),
            reconcile_interval_secs: None,
        }
    }
}

impl LedgerConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn registry_idle_ttl(&self) -> Duration {
        Duration::from_secs(self.registry_idle_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn reconcile_interval(&self) -> Option<Duration> {
        self.reconcile_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub namespace: Option<String>,
}

pub fn get_config() -> RescueConfig {
    let base_path = env::current_dir().expect("Failed to determine the current directory");
    let configuration_directory = base_path.join("configuration");

    // Detect the running environment
    let environment: Environment = env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .expect("Failed to parse APP_ENVIRONMENT");

    let environment_filename = format!("server_{}.yaml", environment.as_str());

    let config = Config::builder()
        .add_source(File::from(configuration_directory.join("server_base.yaml")))
        .add_source(File::from(configuration_directory.join(environment_filename)).required(false))
        .add_source(config::Environment::with_prefix("app").separator("__"))
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Configuration error: {}", e);
            panic!("Failed to build configuration");
        });

    config.try_deserialize::<RescueConfig>().unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        eprintln!(
            "Make sure all required fields are set correctly in your configuration files or environment variables."
        );
        panic!("Failed to deserialize configuration");
    })
}

/// The possible runtime environment for our application.
pub enum Environment {
    Local,
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "development" => Ok(Self::Development),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local`, `development`, or `production`.",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    const BASE: &str = r#"
relayer:
  private_key: "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
rescue:
  delegate_contract: "0x000000000000000000000000000000000000dEaD"
  budget_mode: ledger
rpc:
  mode: remote
  base_url: g.alchemy.com/v2
  api_key: key
chains:
  - chain_id: 8453
  - chain_id: 31337
    rpc_url: http://127.0.0.1:8545
explorer:
  url: https://api.etherscan.io/v2/api
  api_key: explorer-key
redis:
  url: redis://127.0.0.1:6379/
"#;

    fn load(extra: &str) -> RescueConfig {
        Config::builder()
            .add_source(File::from_str(BASE, FileFormat::Yaml))
            .add_source(File::from_str(extra, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn fills_defaults_for_optional_sections() {
        let config = load("{}");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.log_format, LogFormat::Pretty);
        assert_eq!(config.rescue.budget_mode, BudgetMode::Ledger);
        assert_eq!(config.rescue.max_block_window, 10);
        assert_eq!(config.rescue.lock_timeout_secs, 300);
        assert_eq!(config.explorer.page_size, 1000);
        assert_eq!(config.ledger.lock_timeout(), Duration::from_secs(15));
        assert_eq!(config.ledger.reconcile_interval(), None);
        assert_eq!(config.chains[1].rpc_url.as_deref(), Some("http://127.0.0.1:8545"));
    }

    #[test]
    fn environment_file_overrides_base() {
        let config = load(
            r#"
server:
  port: 8080
  log_format: json
rescue:
  budget_mode: local
ledger:
  reconcile_interval_secs: 30
"#,
        );
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.log_format, LogFormat::Json);
        assert_eq!(config.rescue.budget_mode, BudgetMode::Local);
        assert_eq!(config.ledger.reconcile_interval(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn relayer_key_is_redacted_in_debug_output() {
        let config = load("{}");
        assert!(!format!("{:?}", config.relayer).contains("ac0974"));
    }

    #[test]
    fn rejects_unknown_environment() {
        assert!(Environment::try_from("staging".to_string()).is_err());
        assert!(Environment::try_from("Production".to_string()).is_ok());
    }
}
