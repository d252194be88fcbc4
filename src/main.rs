use anyhow::{Context, Result};
use host_hijack::config::AppConfig;
use host_hijack::{fetch, global, logging};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize rustls crypto provider before any TLS operations
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|e| anyhow::anyhow!("Failed to install default crypto provider: {:?}", e))?;

    // Load config first (before logging init) to get logging config
    let config_path =
        std::env::var("HOST_HIJACK_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let config = AppConfig::load_or_default(&config_path);

    config
        .validate()
        .context("Configuration validation failed")?;

    let _guard =
        logging::init_logging(&config.logging).context("Failed to initialize logging system")?;

    let urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        anyhow::bail!("Usage: host-hijack <URL>...");
    }

    let options = config
        .agent_options()
        .context("Failed to build agent options")?;
    match config.mapping_config() {
        Some(mapping) => global::install_global_with(mapping, options),
        None => {
            info!("No mapping configured, requests pass through unchanged");
            global::install_defaults(options);
        }
    }

    let mut failures = 0;
    for url in &urls {
        match fetch::fetch(url).await {
            Ok(resp) => {
                println!("{} {}", url, resp.status());
                println!("{}", String::from_utf8_lossy(resp.body()));
            }
            Err(e) => {
                error!("Request to {} failed: {}", url, e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} requests failed", failures, urls.len());
    }
    Ok(())
}
