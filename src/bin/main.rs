//! Entry point, grounded on the teacher's `src/bin/main.rs`: read a
//! config file, build a server from it, run it. Generalized from the
//! teacher's hardcoded `"config.yaml"` to an optional first argument,
//! and from its ad-hoc `display_config` to structured `tracing` output
//! initialized via `tracing_subscriber`'s env filter.

use originserver::config::{load_from_path, log_config_summary};
use originserver::error::Result;
use originserver::server::ServerManager;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.yaml".to_string());

    let (servers, global_max_body) = load_from_path(&config_path)?;
    log_config_summary(&servers);

    let mut manager = ServerManager::bind(servers, global_max_body)?;
    manager.run()
}
