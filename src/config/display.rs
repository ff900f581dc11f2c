use crate::config::types::ServerConfig;

/// Emits a one-time startup summary of the loaded configuration via
/// `tracing`, replacing the teacher's raw ANSI-art `println!` dashboard
/// (`config/display.rs`) with structured log lines consistent with the
/// rest of the server's logging.
pub fn log_config_summary(servers: &[ServerConfig]) {
    tracing::info!(server_count = servers.len(), "configuration loaded");
    for server in servers {
        tracing::info!(
            name = %server.server_name,
            host = %server.host,
            ports = ?server.ports,
            root = %server.root,
            locations = server.locations.len(),
            "server block"
        );
        for location in &server.locations {
            tracing::debug!(
                server = %server.server_name,
                path = %location.path,
                redirect = location.has_redirect(),
                cgi = location.has_cgi(),
                "location block"
            );
        }
    }
}
