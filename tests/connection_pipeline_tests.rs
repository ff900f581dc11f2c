//! End-to-end request-pipeline coverage driven straight through
//! `Connection::ingest`, without a real socket or event loop. `server.rs`
//! owns the mio plumbing around this; everything about request parsing,
//! validation order, routing, and handler dispatch is reachable here,
//! and synchronous handlers (static files, redirects, PUT/DELETE) settle
//! within a single `ingest` call since they never return `WouldBlock`.

use std::net::SocketAddr;
use std::sync::Arc;

use originserver::config::{LocationRule, RedirectRule, ServerConfig};
use originserver::connection::Connection;

fn peer() -> SocketAddr {
    "127.0.0.1:54321".parse().unwrap()
}

fn temp_root(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("originserver_conn_tests_{}_{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).ok();
    dir
}

fn response_text(conn: &Connection) -> String {
    String::from_utf8_lossy(&conn.write_buffer).into_owned()
}

fn status_line(conn: &Connection) -> String {
    response_text(conn).lines().next().unwrap_or_default().to_string()
}

#[test]
fn serves_a_static_file_with_200() {
    let root = temp_root("static_get");
    std::fs::write(root.join("hello.txt"), b"hello world").unwrap();

    let server = Arc::new(ServerConfig { root: root.to_str().unwrap().to_string(), ..Default::default() });
    let mut conn = Connection::new(peer(), server, None);

    conn.ingest(b"GET /hello.txt HTTP/1.1\r\nHost: x\r\n\r\n");

    assert!(conn.dispatched());
    assert!(conn.handler_finished());
    assert_eq!(status_line(&conn), "HTTP/1.1 200 OK");
    assert!(response_text(&conn).ends_with("hello world"));

    std::fs::remove_dir_all(&root).ok();
}

#[test]
fn missing_file_is_404() {
    let root = temp_root("missing");
    let server = Arc::new(ServerConfig { root: root.to_str().unwrap().to_string(), ..Default::default() });
    let mut conn = Connection::new(peer(), server, None);

    conn.ingest(b"GET /nope.txt HTTP/1.1\r\nHost: x\r\n\r\n");

    assert_eq!(status_line(&conn), "HTTP/1.1 404 Not Found");

    std::fs::remove_dir_all(&root).ok();
}

#[test]
fn path_traversal_is_blocked_before_any_filesystem_access() {
    let root = temp_root("traversal");
    let server = Arc::new(ServerConfig { root: root.to_str().unwrap().to_string(), ..Default::default() });
    let mut conn = Connection::new(peer(), server, None);

    conn.ingest(b"GET /../../etc/passwd HTTP/1.1\r\nHost: x\r\n\r\n");

    assert_eq!(status_line(&conn), "HTTP/1.1 403 Forbidden");

    std::fs::remove_dir_all(&root).ok();
}

#[test]
fn encoded_traversal_is_blocked_after_decoding() {
    let root = temp_root("traversal_encoded");
    let server = Arc::new(ServerConfig { root: root.to_str().unwrap().to_string(), ..Default::default() });
    let mut conn = Connection::new(peer(), server, None);

    conn.ingest(b"GET /%2e%2e/%2e%2e/etc/passwd HTTP/1.1\r\nHost: x\r\n\r\n");

    assert_eq!(status_line(&conn), "HTTP/1.1 403 Forbidden");

    std::fs::remove_dir_all(&root).ok();
}

#[test]
fn unknown_method_is_501() {
    let root = temp_root("unknown_method");
    let server = Arc::new(ServerConfig { root: root.to_str().unwrap().to_string(), ..Default::default() });
    let mut conn = Connection::new(peer(), server, None);

    conn.ingest(b"FOOBAR / HTTP/1.1\r\nHost: x\r\n\r\n");

    assert_eq!(status_line(&conn), "HTTP/1.1 501 Not Implemented");

    std::fs::remove_dir_all(&root).ok();
}

#[test]
fn method_not_in_the_configured_allow_list_is_405_with_allow_header() {
    let root = temp_root("method_not_allowed");
    let server = Arc::new(ServerConfig { root: root.to_str().unwrap().to_string(), ..Default::default() });
    let mut conn = Connection::new(peer(), server, None);

    // OPTIONS is a known HTTP method but not in ServerConfig::default()'s methods list.
    conn.ingest(b"OPTIONS / HTTP/1.1\r\nHost: x\r\n\r\n");

    assert_eq!(status_line(&conn), "HTTP/1.1 405 Method Not Allowed");
    assert!(response_text(&conn).contains("Allow:"));

    std::fs::remove_dir_all(&root).ok();
}

#[test]
fn content_length_over_max_body_is_413() {
    let root = temp_root("oversized_body");
    let server =
        Arc::new(ServerConfig { root: root.to_str().unwrap().to_string(), max_body: Some(5), ..Default::default() });
    let mut conn = Connection::new(peer(), server, None);

    conn.ingest(b"POST /upload HTTP/1.1\r\nHost: x\r\nContent-Length: 10\r\n\r\n");

    assert_eq!(status_line(&conn), "HTTP/1.1 413 Payload Too Large");

    std::fs::remove_dir_all(&root).ok();
}

#[test]
fn malformed_content_length_is_400() {
    let root = temp_root("bad_length");
    let server = Arc::new(ServerConfig { root: root.to_str().unwrap().to_string(), ..Default::default() });
    let mut conn = Connection::new(peer(), server, None);

    conn.ingest(b"POST /upload HTTP/1.1\r\nHost: x\r\nContent-Length: -4\r\n\r\n");

    assert_eq!(status_line(&conn), "HTTP/1.1 400 Bad Request");

    std::fs::remove_dir_all(&root).ok();
}

#[test]
fn request_body_can_arrive_split_across_multiple_ingest_calls() {
    let root = temp_root("split_body");
    let server = Arc::new(ServerConfig { root: root.to_str().unwrap().to_string(), ..Default::default() });
    let mut conn = Connection::new(peer(), server, None);

    conn.ingest(b"PUT /uploaded.txt HTTP/1.1\r\nHost: x\r\nContent-Length: 10\r\n\r\n");
    assert!(!conn.dispatched());

    conn.ingest(b"hello");
    assert!(!conn.dispatched());

    conn.ingest(b"world");
    assert!(conn.dispatched());
    assert_eq!(status_line(&conn), "HTTP/1.1 201 Created");
    assert_eq!(std::fs::read(root.join("uploaded.txt")).unwrap(), b"helloworld");

    std::fs::remove_dir_all(&root).ok();
}

#[test]
fn put_against_an_existing_file_is_200_not_201() {
    let root = temp_root("put_overwrite");
    std::fs::write(root.join("existing.txt"), b"old").unwrap();
    let server = Arc::new(ServerConfig { root: root.to_str().unwrap().to_string(), ..Default::default() });
    let mut conn = Connection::new(peer(), server, None);

    conn.ingest(b"PUT /existing.txt HTTP/1.1\r\nHost: x\r\nContent-Length: 3\r\n\r\nnew");

    assert_eq!(status_line(&conn), "HTTP/1.1 200 OK");
    assert_eq!(std::fs::read(root.join("existing.txt")).unwrap(), b"new");

    std::fs::remove_dir_all(&root).ok();
}

#[test]
fn delete_removes_an_existing_file() {
    let root = temp_root("delete_file");
    std::fs::write(root.join("gone.txt"), b"bye").unwrap();
    let server = Arc::new(ServerConfig { root: root.to_str().unwrap().to_string(), ..Default::default() });
    let mut conn = Connection::new(peer(), server, None);

    conn.ingest(b"DELETE /gone.txt HTTP/1.1\r\nHost: x\r\n\r\n");

    assert_eq!(status_line(&conn), "HTTP/1.1 204 No Content");
    assert!(!root.join("gone.txt").exists());

    std::fs::remove_dir_all(&root).ok();
}

#[test]
fn location_redirect_short_circuits_before_any_filesystem_lookup() {
    let root = temp_root("redirect");
    let server = Arc::new(ServerConfig {
        root: root.to_str().unwrap().to_string(),
        locations: vec![LocationRule {
            path: "/old".to_string(),
            redirect: Some(RedirectRule { status: 301, target: "/new".to_string() }),
            ..Default::default()
        }],
        ..Default::default()
    });
    let mut conn = Connection::new(peer(), server, None);

    conn.ingest(b"GET /old/page HTTP/1.1\r\nHost: x\r\n\r\n");

    assert_eq!(status_line(&conn), "HTTP/1.1 301 Moved Permanently");
    assert!(response_text(&conn).contains("Location: /new"));

    std::fs::remove_dir_all(&root).ok();
}

#[test]
fn autoindex_lists_directory_when_no_index_file_present() {
    let root = temp_root("autoindex");
    std::fs::write(root.join("a.txt"), b"a").unwrap();
    let server =
        Arc::new(ServerConfig { root: root.to_str().unwrap().to_string(), autoindex: true, ..Default::default() });
    let mut conn = Connection::new(peer(), server, None);

    conn.ingest(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");

    assert_eq!(status_line(&conn), "HTTP/1.1 200 OK");
    assert!(response_text(&conn).contains("a.txt"));

    std::fs::remove_dir_all(&root).ok();
}

#[test]
fn directory_without_index_or_autoindex_is_403() {
    let root = temp_root("no_autoindex");
    let server = Arc::new(ServerConfig { root: root.to_str().unwrap().to_string(), ..Default::default() });
    let mut conn = Connection::new(peer(), server, None);

    conn.ingest(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");

    assert_eq!(status_line(&conn), "HTTP/1.1 403 Forbidden");

    std::fs::remove_dir_all(&root).ok();
}

#[test]
fn a_second_ingest_after_dispatch_is_a_no_op() {
    let root = temp_root("post_dispatch_ingest");
    std::fs::write(root.join("a.txt"), b"a").unwrap();
    let server = Arc::new(ServerConfig { root: root.to_str().unwrap().to_string(), ..Default::default() });
    let mut conn = Connection::new(peer(), server, None);

    conn.ingest(b"GET /a.txt HTTP/1.1\r\nHost: x\r\n\r\n");
    let before = conn.write_buffer.clone();

    // A pipelined second request on the same socket is simply ignored —
    // this server closes after one request (no keep-alive).
    conn.ingest(b"GET /a.txt HTTP/1.1\r\nHost: x\r\n\r\n");
    assert_eq!(conn.write_buffer, before);

    std::fs::remove_dir_all(&root).ok();
}
