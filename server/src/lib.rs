pub mod chains;
pub mod config;
pub mod http;
pub mod reconcile;

// Re-export commonly used types for integration tests and external usage
pub use chains::RescueChainService;
pub use config::{
    ChainConfig, ExplorerConfig, LedgerConfig, RedisConfig, RelayerConfig, RescueConfig,
    RescueSettings, RpcConfig, ServerConfig,
};
pub use http::server::{RescueServer, RescueServerState};
