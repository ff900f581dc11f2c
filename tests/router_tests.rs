//! End-to-end router coverage driven through real configuration text
//! rather than hand-built `ServerConfig` values (that's what
//! `src/router.rs`'s own colocated unit tests already do). This checks
//! that a parsed-and-validated config resolves the way a deployed server
//! actually would.

use originserver::config::{validate_config, Config, FromYaml};
use originserver::router::resolve;

fn load(yaml: &str) -> originserver::config::ServerConfig {
    let config = Config::from_str(yaml).expect("config should parse");
    let config = validate_config(config).expect("config should validate");
    config.servers.into_iter().next().expect("one server")
}

#[test]
fn longest_matching_location_wins_through_real_config() {
    let server = load(
        r#"
servers:
  - server_name: a
    host: 127.0.0.1
    ports: [8080]
    root: ./www
    locations:
      - path: /
        root: ./www
      - path: /api
        root: ./api
      - path: /api/v1
        root: ./api/v1
"#,
    );

    let resolved = resolve(None, &server, "/api/v1/users");
    assert_eq!(resolved.path, "/api/v1");
    assert_eq!(resolved.root, "./api/v1");
}

#[test]
fn location_methods_override_falls_back_to_server_wide_methods() {
    let server = load(
        r#"
servers:
  - server_name: a
    host: 127.0.0.1
    ports: [8080]
    locations:
      - path: /readonly
        methods: [GET]
      - path: /
"#,
    );

    let readonly = resolve(None, &server, "/readonly/file.txt");
    assert!(readonly.is_method_allowed("GET"));
    assert!(!readonly.is_method_allowed("DELETE"));

    let root = resolve(None, &server, "/other");
    assert!(root.is_method_allowed("DELETE"));
}

#[test]
fn redirect_location_carries_its_rule_through_resolution() {
    let server = load(
        r#"
servers:
  - server_name: a
    host: 127.0.0.1
    ports: [8080]
    locations:
      - path: /old
        redirect:
          status: 301
          target: /new
"#,
    );

    let resolved = resolve(None, &server, "/old/page");
    let redirect = resolved.redirect.expect("redirect rule present");
    assert_eq!(redirect.status, 301);
    assert_eq!(redirect.target, "/new");
}

#[test]
fn max_body_inherits_from_server_when_location_leaves_it_unset() {
    let server = load(
        r#"
servers:
  - server_name: a
    host: 127.0.0.1
    ports: [8080]
    max_body: 4096
    locations:
      - path: /
"#,
    );

    let resolved = resolve(Some(1024), &server, "/anything");
    assert_eq!(resolved.max_body, 4096);
}
