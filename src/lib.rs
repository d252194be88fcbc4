pub mod agent;
pub mod config;
pub mod connector;
pub mod error;
pub mod fetch;
pub mod global;
pub mod logging;
pub mod mapping;
pub mod metrics;
pub mod tls_utils;

// Re-export commonly used types for convenience
pub use agent::{AgentOptions, HijackingAgent, HttpAgent, HttpsAgent, VerifyAgainst};
pub use config::AppConfig;
pub use error::{HijackError, HijackResult};
pub use global::install_global;
pub use mapping::{MappingConfig, ResolvedHost, resolve};
