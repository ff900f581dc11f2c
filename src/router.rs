//! Longest-prefix location matching and server-default inheritance (§4.5).
//!
//! The teacher's `src/router.rs` is a 28-line stub (`Router { routes:
//! HashMap<String, Arc<RouteConfig>> }` with no matching method at all);
//! the retrieval found no working implementation of the matching logic it
//! promises. This is fresh code, grounded on the *shape* of the teacher's
//! stub (`RoutingError::{NotFound, MethodNotAllowed}`) and on
//! `tests/router_tests.rs`'s `resolve`-style API, generalized to drop the
//! `host` parameter this server has no use for (no virtual hosting).

use std::collections::HashMap;

use crate::config::{CgiRule, LocationRule, RedirectRule, ServerConfig};

pub const DEFAULT_MAX_BODY_SIZE: usize = 1_048_576;

#[derive(Debug, Clone)]
pub struct ResolvedLocation {
    pub path: String,
    pub root: String,
    pub index: Vec<String>,
    pub methods: Vec<String>,
    pub autoindex: bool,
    pub error_pages: HashMap<u16, String>,
    pub max_body: usize,
    pub redirect: Option<RedirectRule>,
    pub cgi: Option<CgiRule>,
}

impl ResolvedLocation {
    pub fn is_method_allowed(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m.eq_ignore_ascii_case(method))
    }
}

/// Selects the location whose prefix matches `decoded_path` at a
/// path-segment boundary (prefix ends in `/`, equals the path exactly, or
/// is followed by `/` in the path); among matches, the longest prefix
/// wins. No match synthesizes an all-unset `/` location. The winning
/// location's unset fields are then filled in from `server`, and from
/// `global_max_body`/the built-in default for `max_body` specifically
/// (§4.4's four-level inheritance chain).
pub fn resolve(
    global_max_body: Option<usize>,
    server: &ServerConfig,
    decoded_path: &str,
) -> ResolvedLocation {
    let matched = server
        .locations
        .iter()
        .filter(|loc| prefix_matches(&loc.path, decoded_path))
        .max_by_key(|loc| loc.path.len());

    let default_location;
    let location: &LocationRule = match matched {
        Some(loc) => loc,
        None => {
            default_location = LocationRule::default();
            &default_location
        }
    };

    let max_body = location
        .max_body
        .or(server.max_body)
        .or(global_max_body)
        .unwrap_or(DEFAULT_MAX_BODY_SIZE);

    ResolvedLocation {
        path: location.path.clone(),
        root: location.root.clone().unwrap_or_else(|| server.root.clone()),
        index: location.index.clone().unwrap_or_else(|| server.index.clone()),
        methods: location.methods.clone().unwrap_or_else(|| server.methods.clone()),
        autoindex: location.autoindex.unwrap_or(server.autoindex),
        error_pages: location.error_pages.clone().unwrap_or_else(|| server.error_pages.clone()),
        max_body,
        redirect: location.redirect.clone(),
        cgi: location.cgi.clone(),
    }
}

fn prefix_matches(prefix: &str, path: &str) -> bool {
    if !path.starts_with(prefix) {
        return false;
    }
    prefix.ends_with('/') || prefix.len() == path.len() || path.as_bytes()[prefix.len()] == b'/'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocationRule;

    fn server_with(locations: Vec<LocationRule>) -> ServerConfig {
        ServerConfig { locations, ..Default::default() }
    }

    fn loc(path: &str) -> LocationRule {
        LocationRule { path: path.to_string(), ..Default::default() }
    }

    #[test]
    fn longest_prefix_wins() {
        let server = server_with(vec![loc("/"), loc("/api"), loc("/api/v1")]);
        let resolved = resolve(None, &server, "/api/v1/users");
        assert_eq!(resolved.path, "/api/v1");
    }

    #[test]
    fn no_match_falls_back_to_synthetic_root() {
        let server = server_with(vec![loc("/api")]);
        let resolved = resolve(None, &server, "/other");
        assert_eq!(resolved.path, "/");
        assert_eq!(resolved.root, server.root);
    }

    #[test]
    fn prefix_boundary_requires_segment_alignment() {
        let server = server_with(vec![loc("/api")]);
        // "/apiextra" shares the prefix "/api" but not at a segment boundary.
        let resolved = resolve(None, &server, "/apiextra");
        assert_eq!(resolved.path, "/");
    }

    #[test]
    fn tristate_autoindex_off_does_not_inherit_server_on() {
        let mut server = server_with(vec![]);
        server.autoindex = true;
        server.locations.push(LocationRule { autoindex: Some(false), ..loc("/no-index") });
        let resolved = resolve(None, &server, "/no-index/x");
        assert!(!resolved.autoindex);
    }

    #[test]
    fn max_body_inherits_through_the_full_chain() {
        let server = server_with(vec![loc("/a")]);
        let resolved = resolve(Some(2048), &server, "/a");
        assert_eq!(resolved.max_body, 2048);

        let mut server2 = server_with(vec![loc("/a")]);
        server2.max_body = Some(4096);
        let resolved2 = resolve(Some(2048), &server2, "/a");
        assert_eq!(resolved2.max_body, 4096);
    }

    #[test]
    fn max_body_falls_back_to_builtin_default_when_fully_unset() {
        let server = server_with(vec![]);
        let resolved = resolve(None, &server, "/");
        assert_eq!(resolved.max_body, DEFAULT_MAX_BODY_SIZE);
    }
}
