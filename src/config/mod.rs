pub mod display;
pub mod lexer;
pub mod parser;
pub mod tokens;
pub mod types;
pub mod validate;

pub use display::log_config_summary;
pub use parser::{ConfigError, ConfigParser, FromYaml, ParseResult};
pub use types::{CgiRule, Config, LocationRule, RedirectRule, ServerConfig};
pub use validate::validate_config;

use crate::error::{CleanError, Result};

/// Loads, parses and validates the configuration file at `path`. The
/// only place in the core that is allowed to exit non-zero before the
/// event loop starts (§7, "fatal (startup) errors"). Returns the
/// per-server blocks alongside the top-level `max_body`, the outermost
/// link of the four-level inheritance chain (§4.4) that a plain
/// `Vec<ServerConfig>` would otherwise drop on the floor.
pub fn load_from_path(path: &str) -> Result<(Vec<ServerConfig>, Option<usize>)> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| CleanError::from(format!("cannot read config file '{}': {}", path, e)))?;
    let config = Config::from_str(&raw).map_err(|e| CleanError::from(e.to_string()))?;
    let config = validate_config(config).map_err(|e| CleanError::from(e.to_string()))?;
    Ok((config.servers, config.max_body))
}
