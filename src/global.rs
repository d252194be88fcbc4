//! Process-wide default agents.
//!
//! Code that does not carry its own agent falls back to [`http_agent`] and
//! [`https_agent`]. They start out as passthrough agents built on first use.
//! [`install_global`] and [`install_defaults`] replace them, and the last
//! installation wins.

use crate::agent::{AgentOptions, HttpAgent, HttpsAgent};
use crate::mapping::MappingConfig;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

#[derive(Clone)]
struct DefaultAgents {
    http: Arc<HttpAgent>,
    https: Arc<HttpsAgent>,
    installed: bool,
}

impl DefaultAgents {
    fn passthrough(options: AgentOptions) -> Self {
        Self {
            http: Arc::new(HttpAgent::with_options(options.clone())),
            https: Arc::new(HttpsAgent::with_options(options)),
            installed: false,
        }
    }
}

/// Empty until first read or first installation
static DEFAULT_AGENTS: RwLock<Option<DefaultAgents>> = RwLock::new(None);

fn current() -> DefaultAgents {
    if let Some(agents) = DEFAULT_AGENTS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
    {
        return agents.clone();
    }

    DEFAULT_AGENTS
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .get_or_insert_with(|| DefaultAgents::passthrough(AgentOptions::default()))
        .clone()
}

fn replace(agents: DefaultAgents) {
    *DEFAULT_AGENTS.write().unwrap_or_else(PoisonError::into_inner) = Some(agents);
}

/// Replace both default agents with hijacking agents carrying `mapping`
pub fn install_global(mapping: impl Into<MappingConfig>) {
    install_global_with(mapping, AgentOptions::default());
}

/// Same as [`install_global`], with custom base-agent options for both agents
pub fn install_global_with(mapping: impl Into<MappingConfig>, options: AgentOptions) {
    let mapping = mapping.into();
    replace(DefaultAgents {
        http: Arc::new(HttpAgent::with_options(options.clone()).with_mapping(mapping.clone())),
        https: Arc::new(HttpsAgent::with_options(options).with_mapping(mapping.clone())),
        installed: true,
    });
    info!("Installed global hijacking agents: {:?}", mapping);
}

/// Replace both default agents with passthrough agents built from `options`.
///
/// Any previously installed mapping is dropped.
pub fn install_defaults(options: AgentOptions) {
    replace(DefaultAgents::passthrough(options));
    info!("Installed global passthrough agents");
}

/// Current default plaintext agent.
///
/// The returned handle keeps working after a later installation; only
/// callers that fetch the default again see the new agent.
pub fn http_agent() -> Arc<HttpAgent> {
    current().http
}

/// Current default encrypted agent
pub fn https_agent() -> Arc<HttpsAgent> {
    current().https
}

/// Whether a hijacking mapping has been installed globally
pub fn is_installed() -> bool {
    current().installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_install_skips_passthrough_defaults() {
        assert!(DEFAULT_AGENTS.read().unwrap().is_none());

        install_global([("alpha.test", "127.0.0.1")]);

        assert!(is_installed());
        assert!(http_agent().mapping().is_some());
        assert!(https_agent().mapping().is_some());
    }
}
