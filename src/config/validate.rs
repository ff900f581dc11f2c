use std::collections::{HashMap, HashSet};

use crate::config::parser::ConfigError;
use crate::config::types::{Config, ServerConfig};

/// Runs every startup-fatal validation rule over a loaded `Config` and
/// returns it unchanged on success. Unlike the ad-hoc "drop conflicting
/// blocks and keep serving" policy this grew out of, every violation
/// here aborts configuration load (§3, §6): a server that cannot prove
/// its own configuration sane does not get to guess at runtime.
pub fn validate_config(config: Config) -> Result<Config, ConfigError> {
    check_unique_listen_addresses(&config.servers)?;

    for server in &config.servers {
        check_server(server)?;
    }

    Ok(config)
}

fn check_unique_listen_addresses(servers: &[ServerConfig]) -> Result<(), ConfigError> {
    let mut seen: HashMap<(String, u16), ()> = HashMap::new();
    for server in servers {
        for port in &server.ports {
            let key = (server.host.clone(), *port);
            if seen.insert(key, ()).is_some() {
                return Err(fatal(format!(
                    "duplicate listen address {}:{} (server '{}')",
                    server.host, port, server.server_name
                )));
            }
        }
    }

    // A wildcard bind on a port conflicts with any other bind on that
    // port: the OS cannot disambiguate which socket owns the traffic.
    let mut port_hosts: HashMap<u16, HashSet<String>> = HashMap::new();
    for server in servers {
        for port in &server.ports {
            port_hosts.entry(*port).or_default().insert(server.host.clone());
        }
    }
    for (port, hosts) in port_hosts {
        if hosts.len() > 1 && hosts.contains("0.0.0.0") {
            return Err(fatal(format!(
                "port {} mixes wildcard bind 0.0.0.0 with a specific address {:?}",
                port, hosts
            )));
        }
    }

    Ok(())
}

fn check_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.root.trim().is_empty() {
        return Err(fatal(format!("server '{}' has an empty root", server.server_name)));
    }
    if server.ports.is_empty() {
        return Err(fatal(format!("server '{}' declares no ports", server.server_name)));
    }

    check_error_pages(&server.error_pages, &server.server_name)?;

    for location in &server.locations {
        check_location(location, &server.server_name)?;
    }

    Ok(())
}

fn check_location(
    location: &crate::config::types::LocationRule,
    server_name: &str,
) -> Result<(), ConfigError> {
    if location.has_redirect() && location.has_cgi() {
        return Err(fatal(format!(
            "server '{}' location '{}': redirect and cgi are mutually exclusive",
            server_name, location.path
        )));
    }

    if let Some(redirect) = &location.redirect {
        if !matches!(redirect.status, 301 | 302 | 303 | 307 | 308) {
            return Err(fatal(format!(
                "server '{}' location '{}': redirect status {} is not one of 301/302/303/307/308",
                server_name, location.path, redirect.status
            )));
        }
    }

    if let Some(cgi) = &location.cgi {
        if cgi.root.trim().is_empty() {
            return Err(fatal(format!(
                "server '{}' location '{}': cgi requires a non-empty root",
                server_name, location.path
            )));
        }
        if cgi.extensions.is_empty() {
            return Err(fatal(format!(
                "server '{}' location '{}': cgi requires a non-empty extension set",
                server_name, location.path
            )));
        }
    }

    if let Some(pages) = &location.error_pages {
        check_error_pages(pages, server_name)?;
    }

    Ok(())
}

fn check_error_pages(pages: &HashMap<u16, String>, server_name: &str) -> Result<(), ConfigError> {
    for code in pages.keys() {
        if !(400..=599).contains(code) {
            return Err(fatal(format!(
                "server '{}': error page status {} is not a 4xx or 5xx code",
                server_name, code
            )));
        }
    }
    Ok(())
}

fn fatal(message: String) -> ConfigError {
    ConfigError { message, loc: None, context: vec![] }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{CgiRule, LocationRule, RedirectRule};

    fn server(host: &str, ports: Vec<u16>, name: &str) -> ServerConfig {
        ServerConfig { host: host.to_string(), ports, server_name: name.to_string(), ..Default::default() }
    }

    #[test]
    fn accepts_disjoint_servers() {
        let config = Config {
            servers: vec![server("127.0.0.1", vec![8001], "a"), server("127.0.0.1", vec![8002], "b")],
            ..Default::default()
        };
        assert!(validate_config(config).is_ok());
    }

    #[test]
    fn rejects_duplicate_listen_address() {
        let config = Config {
            servers: vec![server("127.0.0.1", vec![80], "a"), server("127.0.0.1", vec![80], "b")],
            ..Default::default()
        };
        assert!(validate_config(config).is_err());
    }

    #[test]
    fn rejects_wildcard_vs_specific_conflict() {
        let config = Config {
            servers: vec![server("0.0.0.0", vec![8080], "a"), server("127.0.0.1", vec![8080], "b")],
            ..Default::default()
        };
        assert!(validate_config(config).is_err());
    }

    #[test]
    fn rejects_empty_root() {
        let mut s = server("127.0.0.1", vec![8080], "a");
        s.root = String::new();
        let config = Config { servers: vec![s], ..Default::default() };
        assert!(validate_config(config).is_err());
    }

    #[test]
    fn rejects_redirect_and_cgi_on_same_location() {
        let mut s = server("127.0.0.1", vec![8080], "a");
        s.locations.push(LocationRule {
            redirect: Some(RedirectRule { status: 301, target: "/x".into() }),
            cgi: Some(CgiRule { root: "/cgi".into(), extensions: vec![".sh".into()] }),
            ..Default::default()
        });
        let config = Config { servers: vec![s], ..Default::default() };
        assert!(validate_config(config).is_err());
    }

    #[test]
    fn rejects_cgi_without_extensions() {
        let mut s = server("127.0.0.1", vec![8080], "a");
        s.locations.push(LocationRule {
            cgi: Some(CgiRule { root: "/cgi".into(), extensions: vec![] }),
            ..Default::default()
        });
        let config = Config { servers: vec![s], ..Default::default() };
        assert!(validate_config(config).is_err());
    }

    #[test]
    fn rejects_bad_redirect_status() {
        let mut s = server("127.0.0.1", vec![8080], "a");
        s.locations.push(LocationRule {
            redirect: Some(RedirectRule { status: 200, target: "/x".into() }),
            ..Default::default()
        });
        let config = Config { servers: vec![s], ..Default::default() };
        assert!(validate_config(config).is_err());
    }

    #[test]
    fn rejects_non_error_status_error_page() {
        let mut s = server("127.0.0.1", vec![8080], "a");
        s.error_pages.insert(200, "ok.html".into());
        let config = Config { servers: vec![s], ..Default::default() };
        assert!(validate_config(config).is_err());
    }
}
