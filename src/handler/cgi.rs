//! CgiHandler (§4.10), the hardest subsystem. Grounded on the teacher's
//! CGI dispatch in `http/request.rs::setup_action` (socketpair
//! construction, `Command`/`envs`/`Stdio::from` plumbing) and `cgi.rs`
//! (`parse_cgi_headers`, `CgiParsingState`, `build_cgi_env`,
//! `check_time_out_cgi`/`force_cgi_timeout`), folded into one `Handler`
//! impl instead of the teacher's free functions threaded through
//! `HttpConnection` by hand.
//!
//! Pipe construction keeps the teacher's choice of `UnixStream::pair()`
//! socketpairs over raw `pipe(2)`, as recorded in SPEC_FULL.md §4.10.

use std::io::{ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use mio::net::UnixStream;

use crate::handler::{Handler, HandlerContext, Outcome};
use crate::message::Request;

pub const CGI_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, PartialEq, Eq)]
enum ParseState {
    ReadHeaders,
    StreamBody,
}

pub struct CgiHandler {
    out_stream: UnixStream,
    child: Child,
    parse_state: ParseState,
    header_buf: Vec<u8>,
    started: Instant,
    headers_written: bool,
}

#[derive(Debug)]
pub enum CgiStartError {
    ExtensionNotAllowed,
    SpawnFailed,
}

impl CgiHandler {
    /// Verifies the extension allowlist, builds both socketpairs, spawns
    /// the interpreter with the CGI/1.1 environment, synchronously hands
    /// it the request body (bounded bodies only, §4.10.5), and returns a
    /// handler ready to be driven by `resume` on stdout readability.
    pub fn spawn(
        interpreter: &str,
        script_path: &Path,
        allowed_extensions: &[String],
        request: &Request,
        peer_addr: SocketAddr,
        server_name: &str,
        server_port: u16,
    ) -> Result<Self, CgiStartError> {
        let ext_ok = allowed_extensions
            .iter()
            .any(|ext| script_path.to_string_lossy().ends_with(ext.as_str()));
        if !ext_ok {
            return Err(CgiStartError::ExtensionNotAllowed);
        }

        let (parent_out, child_out) =
            std::os::unix::net::UnixStream::pair().map_err(|_| CgiStartError::SpawnFailed)?;
        let (parent_in, child_in) =
            std::os::unix::net::UnixStream::pair().map_err(|_| CgiStartError::SpawnFailed)?;

        parent_out.set_nonblocking(true).ok();

        let script_dir = script_path.parent().unwrap_or_else(|| Path::new("."));
        let script_name = script_path.file_name().map(PathBuf::from).unwrap_or_default();

        // stdout and stderr are both the child's end of the same
        // socketpair, so the parent sees them merged on `parent_out`
        // (§4.10.2/§4.10 "stdout+stderr merged").
        let child_out_stderr = child_out.try_clone().map_err(|_| CgiStartError::SpawnFailed)?;

        let mut cmd = Command::new(interpreter);
        cmd.arg(&script_name)
            .current_dir(script_dir)
            .envs(build_cgi_env(request, peer_addr, server_name, server_port))
            .stdin(Stdio::from(child_in))
            .stdout(Stdio::from(child_out))
            .stderr(Stdio::from(child_out_stderr));

        let mut child = cmd.spawn().map_err(|_| CgiStartError::SpawnFailed)?;

        // Body write: bounded by max-body, done as one blocking hand-off
        // then the write end is dropped to signal EOF to the child, per
        // §4.10.5 ("write the entire request body ... and immediately
        // close it").
        let mut parent_in = parent_in;
        parent_in.set_nonblocking(false).ok();
        let _ = parent_in.write_all(&request.body);
        drop(parent_in);

        Ok(Self {
            out_stream: UnixStream::from_std(parent_out),
            child,
            parse_state: ParseState::ReadHeaders,
            header_buf: Vec::new(),
            started: Instant::now(),
            headers_written: false,
        })
    }
}

impl Handler for CgiHandler {
    fn start(&mut self, _ctx: &mut HandlerContext) -> Outcome {
        Outcome::WouldBlock
    }

    fn resume(&mut self, ctx: &mut HandlerContext) -> Outcome {
        let mut buf = [0u8; 4096];
        loop {
            match self.out_stream.read(&mut buf) {
                Ok(0) => return self.reap(ctx),
                Ok(n) => self.process_chunk(&buf[..n], ctx.write_buffer),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Outcome::WouldBlock,
                Err(_) => return self.reap(ctx),
            }
        }
    }

    fn monitor_fd(&self) -> Option<RawFd> {
        Some(self.out_stream.as_raw_fd())
    }

    fn check_timeout(&self) -> bool {
        self.started.elapsed() > CGI_TIMEOUT
    }

    fn cancel(&mut self) {
        self.kill();
    }
}

impl CgiHandler {
    fn process_chunk(&mut self, data: &[u8], write_buffer: &mut Vec<u8>) {
        match self.parse_state {
            ParseState::ReadHeaders => {
                self.header_buf.extend_from_slice(data);
                if let Some(pos) = find_subsequence(&self.header_buf, b"\r\n\r\n") {
                    let head = self.header_buf[..pos].to_vec();
                    let tail = self.header_buf[pos + 4..].to_vec();
                    let (status, headers) = parse_cgi_headers(&head);

                    let mut response = crate::message::Response::new(status);
                    for (name, value) in headers {
                        response.headers.append(&name, &value);
                    }
                    if !response.headers.contains("content-type") {
                        response.headers.set("Content-Type", "text/plain");
                    }
                    write_buffer.extend_from_slice(&response.head_bytes());
                    write_buffer.extend_from_slice(&tail);

                    self.parse_state = ParseState::StreamBody;
                    self.headers_written = true;
                }
            }
            ParseState::StreamBody => write_buffer.extend_from_slice(data),
        }
    }

    fn reap(&mut self, ctx: &mut HandlerContext) -> Outcome {
        let status = self.child.wait();
        let exited_ok = matches!(&status, Ok(s) if s.success());

        if !self.headers_written {
            let response = if exited_ok {
                // No parseable header block arrived at all: per §4.10.8 the
                // whole accumulated output becomes a 200 text/plain body.
                let mut response = crate::message::Response::new(200);
                response.set_body(self.header_buf.clone(), "text/plain");
                response
            } else {
                // Non-normal exit or non-zero status ⇒ 500, not a 200
                // echoing an empty body (§4.10.7, §7).
                crate::message::Response::new(500)
            };
            ctx.write_buffer.extend_from_slice(&response.to_bytes());
        }
        Outcome::Done
    }

    /// Kills the child on timeout or connection teardown; called by the
    /// event loop, not by `resume` (§4.10.9, §5 "Cancellation and timeouts").
    pub fn kill(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn parse_cgi_headers(bytes: &[u8]) -> (u16, Vec<(String, String)>) {
    let mut status = 200;
    let mut headers = Vec::new();
    for line in String::from_utf8_lossy(bytes).lines() {
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim().to_lowercase();
            let value = value.trim().to_string();
            if key == "status" {
                status = value.split_whitespace().next().and_then(|s| s.parse().ok()).unwrap_or(200);
            } else {
                headers.push((key, value));
            }
        }
    }
    (status, headers)
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Builds the CGI/1.1 environment (§4.10.4): fixed `PATH`, request
/// metadata, `QUERY_STRING`/`PATH_INFO` split at `?`, and `HTTP_*`
/// mirrors of every request header, grounded on the teacher's
/// `build_cgi_env` (`src/cgi.rs`).
pub fn build_cgi_env(
    request: &Request,
    peer_addr: SocketAddr,
    server_name: &str,
    server_port: u16,
) -> std::collections::HashMap<String, String> {
    let mut env = std::collections::HashMap::new();
    env.insert("PATH".to_string(), "/usr/bin:/bin".to_string());
    env.insert("GATEWAY_INTERFACE".to_string(), "CGI/1.1".to_string());
    env.insert("SERVER_PROTOCOL".to_string(), request.version.clone());
    env.insert("REQUEST_METHOD".to_string(), request.method.clone());
    env.insert("REQUEST_URI".to_string(), request.raw_target.clone());
    env.insert("SERVER_NAME".to_string(), server_name.to_string());
    env.insert("SERVER_PORT".to_string(), server_port.to_string());
    env.insert("SCRIPT_NAME".to_string(), request.decoded_path());
    env.insert("REMOTE_ADDR".to_string(), peer_addr.ip().to_string());

    let (path_info, query_string) = match &request.uri.query {
        Some(q) => (request.uri.path.clone(), q.clone()),
        None => (request.uri.path.clone(), String::new()),
    };
    env.insert("PATH_INFO".to_string(), path_info);
    env.insert("QUERY_STRING".to_string(), query_string);

    if let Some(ct) = request.headers.get("content-type") {
        env.insert("CONTENT_TYPE".to_string(), ct.to_string());
    }
    env.insert("CONTENT_LENGTH".to_string(), request.body.len().to_string());

    for (name, value) in request.headers.iter() {
        let key = format!("HTTP_{}", name.to_uppercase().replace('-', "_"));
        env.insert(key, value.to_string());
    }

    env
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cgi_headers_extracts_status_and_lowercases_names() {
        let (status, headers) = parse_cgi_headers(b"Status: 404 Not Found\r\nX-Foo: bar");
        assert_eq!(status, 404);
        assert_eq!(headers, vec![("x-foo".to_string(), "bar".to_string())]);
    }

    fn request_with_path(target: &str) -> Request {
        Request {
            method: "GET".into(),
            uri: crate::uri::Uri::parse(target).unwrap(),
            raw_target: target.to_string(),
            version: "HTTP/1.1".into(),
            headers: crate::message::HeaderMap::new(),
            cookies: Default::default(),
            body: Vec::new(),
        }
    }

    /// Busy-polls `resume` (there is no event loop in this test) until the
    /// handler reaches `Done` or a 2.5s budget runs out, returning the raw
    /// bytes queued for the client.
    fn drive_to_completion(handler: &mut CgiHandler, request: &Request) -> String {
        let server = crate::config::ServerConfig::default();
        let location = crate::router::resolve(None, &server, "/");
        let mut response = crate::message::Response::new(200);
        let mut write_buffer = Vec::new();
        let mut outcome = Outcome::WouldBlock;

        for _ in 0..500 {
            let mut ctx = HandlerContext {
                request,
                location: &location,
                server: &server,
                resolved_path: None,
                peer_addr: "127.0.0.1:0".parse().unwrap(),
                response: &mut response,
                write_buffer: &mut write_buffer,
            };
            outcome = handler.resume(&mut ctx);
            if outcome == Outcome::Done {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(outcome, Outcome::Done, "cgi handler did not finish in time");
        String::from_utf8_lossy(&write_buffer).into_owned()
    }

    #[test]
    fn stdout_and_stderr_are_merged_into_one_stream() {
        let dir = std::env::temp_dir().join(format!("cgi_handler_merge_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let script = dir.join("echo_both.sh");
        std::fs::write(&script, b"#!/bin/sh\necho out\necho err 1>&2\n").unwrap();

        let extensions = vec![".sh".to_string()];
        let request = request_with_path("/cgi/echo_both.sh");
        let mut handler = CgiHandler::spawn(
            "sh",
            &script,
            &extensions,
            &request,
            "127.0.0.1:1234".parse().unwrap(),
            "origin",
            8080,
        )
        .unwrap();

        let output = drive_to_completion(&mut handler, &request);
        assert!(output.contains("out"), "missing stdout in: {output}");
        assert!(output.contains("err"), "missing stderr in: {output}");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn non_zero_exit_with_no_output_is_500_not_200() {
        let dir = std::env::temp_dir().join(format!("cgi_handler_fail_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let script = dir.join("fail.sh");
        std::fs::write(&script, b"#!/bin/sh\nexit 3\n").unwrap();

        let extensions = vec![".sh".to_string()];
        let request = request_with_path("/cgi/fail.sh");
        let mut handler = CgiHandler::spawn(
            "sh",
            &script,
            &extensions,
            &request,
            "127.0.0.1:1234".parse().unwrap(),
            "origin",
            8080,
        )
        .unwrap();

        let output = drive_to_completion(&mut handler, &request);
        assert!(output.starts_with("HTTP/1.1 500"), "expected 500, got: {output}");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn env_includes_http_prefixed_headers() {
        let mut headers = crate::message::HeaderMap::new();
        headers.append("X-Custom", "value");
        let request = Request {
            method: "GET".into(),
            uri: crate::uri::Uri::parse("/a?b=1").unwrap(),
            raw_target: "/a?b=1".into(),
            version: "HTTP/1.1".into(),
            headers,
            cookies: Default::default(),
            body: Vec::new(),
        };
        let env = build_cgi_env(&request, "127.0.0.1:1234".parse().unwrap(), "origin", 8080);
        assert_eq!(env.get("HTTP_X_CUSTOM"), Some(&"value".to_string()));
        assert_eq!(env.get("QUERY_STRING"), Some(&"b=1".to_string()));
        assert_eq!(env.get("PATH_INFO"), Some(&"/a".to_string()));
    }
}
