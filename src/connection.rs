//! Per-socket connection state and the request pipeline that drives it
//! (component G, §3 "Connection", §4.6-§4.8). Grounded on the teacher's
//! `HttpConnection` (`src/http/http_connection.rs`): same read/write
//! buffer shape, same `last_activity`-style phase timestamps, same
//! `resolve_config`-then-`proces_request` sequencing — generalized from
//! the teacher's one-request-per-socket-loop-with-keep-alive model (its
//! `handle_post_write_update` pipelining branch) down to this server's
//! single-request-then-close model (§1 Non-goals, §9).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::config::ServerConfig;
use crate::handler::error_file::{custom_page_for, render as render_error};
use crate::handler::{
    AutoindexHandler, CgiHandler, FileHandler, Handler, HandlerContext, Outcome, RedirectHandler,
};
use crate::message::{find_head_end, Request, Response};
use crate::router::{resolve, ResolvedLocation};
use crate::uri::is_path_traversal;

const KNOWN_METHODS: &[&str] =
    &["GET", "HEAD", "POST", "PUT", "DELETE", "OPTIONS", "PATCH", "CONNECT", "TRACE"];

#[derive(Debug, PartialEq, Eq)]
enum Stage {
    ReadingHead,
    ReadingBody { target: Option<usize> },
    /// The request has been handed to a handler (or failed validation
    /// outright) — reading is done regardless of whether the handler
    /// itself has finished. `active_handler()` distinguishes "fully
    /// written" from "still streaming/CGI-pending" from here on.
    Dispatched,
}

/// One accepted socket's worth of state. Owns everything a handler needs
/// to borrow for the duration of one `start`/`resume` call, and nothing
/// that outlives the connection (§9 "cyclic ownership").
pub struct Connection {
    pub peer_addr: SocketAddr,
    server: Arc<ServerConfig>,
    global_max_body: Option<usize>,

    read_buffer: Vec<u8>,
    stage: Stage,
    request: Option<Request>,
    location: Option<ResolvedLocation>,
    error_pages: HashMap<u16, String>,

    pub response: Response,
    pub write_buffer: Vec<u8>,
    pub write_offset: usize,
    handler: Option<Box<dyn Handler>>,

    pub read_started: Instant,
    pub write_started: Option<Instant>,
    pub closed: bool,
}

impl Connection {
    pub fn new(peer_addr: SocketAddr, server: Arc<ServerConfig>, global_max_body: Option<usize>) -> Self {
        Self {
            peer_addr,
            server,
            global_max_body,
            read_buffer: Vec::new(),
            stage: Stage::ReadingHead,
            request: None,
            location: None,
            error_pages: HashMap::new(),
            response: Response::new(200),
            write_buffer: Vec::new(),
            write_offset: 0,
            handler: None,
            read_started: Instant::now(),
            write_started: None,
            closed: false,
        }
    }

    pub fn active_handler(&self) -> Option<&dyn Handler> {
        self.handler.as_deref()
    }

    pub fn take_handler(&mut self) -> Option<Box<dyn Handler>> {
        self.handler.take()
    }

    /// `true` once the request has been handed to a handler (including
    /// validation failures that never reach one) — the event loop stops
    /// feeding reads to the pipeline and switches to write-driving at
    /// that point, regardless of whether the handler itself has
    /// finished (`active_handler()` tracks that separately).
    pub fn dispatched(&self) -> bool {
        self.stage == Stage::Dispatched
    }

    /// `true` once the response is fully queued AND no handler is still
    /// active (CGI/file streaming done) — the point at which the event
    /// loop may close the socket once the write buffer drains.
    pub fn handler_finished(&self) -> bool {
        self.dispatched() && self.handler.is_none()
    }

    /// Appends freshly read bytes and advances the request pipeline as
    /// far as it will go: head parse, per-request validation (§4.6),
    /// location resolution and inheritance (§4.5), body buffering
    /// (§4.4), and handler dispatch (§4.7-§4.8). Idempotent — safe to
    /// call again as more bytes arrive.
    pub fn ingest(&mut self, data: &[u8]) {
        if self.dispatched() {
            return;
        }
        self.read_buffer.extend_from_slice(data);
        self.pump();
    }

    fn pump(&mut self) {
        if self.stage == Stage::ReadingHead {
            let Some(head_end) = find_head_end(&self.read_buffer) else { return };
            let head = self.read_buffer[..head_end].to_vec();
            let rest = self.read_buffer.split_off(head_end);
            self.read_buffer = rest;

            match Request::parse_head(&head) {
                Ok(req) => {
                    self.request = Some(req);
                    self.validate_head();
                }
                Err(_) => {
                    self.prepare_error_response(400);
                    return;
                }
            }
        }

        if let Stage::ReadingBody { target } = self.stage {
            match target {
                None => self.finish_body(None),
                Some(n) if self.read_buffer.len() >= n => self.finish_body(Some(n)),
                Some(_) => {}
            }
        }
    }

    /// Runs §4.6 validation steps 1-5 once the head is parsed: version,
    /// known method, location resolution + allow-list, and
    /// `Content-Length` well-formedness / size. Advances to
    /// `ReadingBody` on success.
    fn validate_head(&mut self) {
        let req = self.request.as_ref().unwrap();

        if req.version != "HTTP/1.1" && req.version != "HTTP/1.0" {
            self.prepare_error_response(505);
            return;
        }

        if !KNOWN_METHODS.contains(&req.method.as_str()) {
            self.prepare_error_response(501);
            return;
        }

        let decoded = req.decoded_path();
        let location = resolve(self.global_max_body, &self.server, &decoded);
        self.error_pages = location.error_pages.clone();

        if !location.is_method_allowed(&req.method) {
            let allow = location.methods.join(", ");
            self.location = Some(location);
            self.prepare_error_response(405);
            self.response.set_header("Allow", &allow);
            self.write_buffer = self.response.to_bytes();
            return;
        }

        let content_length = match req.content_length() {
            Ok(v) => v,
            Err(_) => {
                self.location = Some(location);
                self.prepare_error_response(400);
                return;
            }
        };

        if let Some(n) = content_length {
            if n > location.max_body {
                self.location = Some(location);
                self.prepare_error_response(413);
                return;
            }
        }

        self.location = Some(location);
        self.stage = Stage::ReadingBody { target: content_length };

        // Re-run immediately: the body may already be fully buffered.
        if let Stage::ReadingBody { target } = self.stage {
            match target {
                None => self.finish_body(None),
                Some(n) if self.read_buffer.len() >= n => self.finish_body(Some(n)),
                Some(_) => {}
            }
        }
    }

    fn finish_body(&mut self, target: Option<usize>) {
        let body = match target {
            Some(n) => {
                let body: Vec<u8> = self.read_buffer.drain(..n).collect();
                body
            }
            None => std::mem::take(&mut self.read_buffer),
        };
        if let Some(req) = self.request.as_mut() {
            req.body = body;
        }
        // Body check against max-body again (defends the case a
        // Content-Length-less request simply buffered too much before
        // headers completed — §4.6 step 6).
        let max_body = self.location.as_ref().map(|l| l.max_body).unwrap_or(usize::MAX);
        if self.request.as_ref().map(|r| r.body.len()).unwrap_or(0) > max_body {
            self.prepare_error_response(413);
            return;
        }
        self.dispatch();
    }

    /// §4.7 path resolution + §4.8 handler dispatch priority. Reading is
    /// over the moment this is called, win or lose — `self.stage` flips
    /// to `Dispatched` up front so the event loop switches to
    /// write-driving even if the handler it reaches immediately returns
    /// `WouldBlock` (CGI always does).
    fn dispatch(&mut self) {
        self.stage = Stage::Dispatched;
        let request = self.request.as_ref().unwrap();
        let decoded = request.decoded_path();

        if is_path_traversal(&decoded) {
            self.prepare_error_response(403);
            return;
        }

        let location = self.location.clone().unwrap();

        if let Some(redirect) = &location.redirect {
            self.run_handler(Box::new(RedirectHandler {
                status: redirect.status,
                target: redirect.target.clone(),
            }));
            return;
        }

        let relative = decoded.strip_prefix(&location.path).unwrap_or(decoded.as_str());
        let relative = relative.trim_start_matches('/');

        let root = location.cgi.as_ref().map(|c| c.root.as_str()).unwrap_or(location.root.as_str());
        let mut fs_path = PathBuf::from(root);
        if !relative.is_empty() {
            fs_path.push(relative);
        }

        if let Some(cgi) = &location.cgi {
            self.dispatch_cgi(&fs_path, &cgi.extensions.clone());
            return;
        }

        self.dispatch_static(&fs_path, &decoded, &location);
    }

    fn dispatch_cgi(&mut self, fs_path: &Path, extensions: &[String]) {
        match std::fs::metadata(fs_path) {
            Ok(m) if m.is_dir() => {
                self.prepare_error_response(403);
                return;
            }
            _ => {}
        }

        let interpreter = interpreter_for(fs_path);
        let request = self.request.as_ref().unwrap();
        let server_name = self.server.server_name.clone();
        let server_port = self.server.ports.first().copied().unwrap_or(0);

        match CgiHandler::spawn(
            interpreter,
            fs_path,
            extensions,
            request,
            self.peer_addr,
            &server_name,
            server_port,
        ) {
            Ok(handler) => self.run_handler(Box::new(handler)),
            Err(crate::handler::cgi::CgiStartError::ExtensionNotAllowed) => {
                self.prepare_error_response(403)
            }
            Err(crate::handler::cgi::CgiStartError::SpawnFailed) => self.prepare_error_response(500),
        }
    }

    fn dispatch_static(&mut self, fs_path: &Path, decoded: &str, location: &ResolvedLocation) {
        let method = self.request.as_ref().unwrap().method.clone();
        let ends_with_slash = decoded.ends_with('/');

        match std::fs::metadata(fs_path) {
            Ok(meta) if meta.is_dir() => {
                if matches!(method.as_str(), "POST" | "PUT") {
                    self.run_handler(Box::new(FileHandler::post_to_directory(fs_path.to_path_buf())));
                    return;
                }
                if method == "DELETE" {
                    self.run_handler(Box::new(FileHandler::delete(fs_path.to_path_buf())));
                    return;
                }

                match find_index_file(fs_path, &location.index) {
                    Some(index_path) => self.dispatch_file(&index_path, &method),
                    None => {
                        if location.autoindex {
                            let display_uri = decoded.to_string();
                            self.run_handler(Box::new(AutoindexHandler {
                                fs_dir: fs_path.to_path_buf(),
                                display_uri,
                            }));
                        } else {
                            self.prepare_error_response(403);
                        }
                    }
                }
            }
            Ok(_meta) => {
                if ends_with_slash {
                    self.prepare_error_response(404);
                    return;
                }
                self.dispatch_file(fs_path, &method);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if method == "PUT" {
                    self.run_handler(Box::new(FileHandler::put(fs_path.to_path_buf())));
                } else {
                    self.prepare_error_response(404);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                self.prepare_error_response(403);
            }
            Err(_) => {
                self.prepare_error_response(500);
            }
        }
    }

    fn dispatch_file(&mut self, path: &Path, method: &str) {
        match method {
            "GET" => self.run_handler(Box::new(FileHandler::get(path.to_path_buf(), false))),
            "HEAD" => self.run_handler(Box::new(FileHandler::get(path.to_path_buf(), true))),
            "PUT" => self.run_handler(Box::new(FileHandler::put(path.to_path_buf()))),
            "DELETE" => self.run_handler(Box::new(FileHandler::delete(path.to_path_buf()))),
            // POST against an existing, non-directory resource is not a
            // shape this document's POST-to-directory behavior (§4.9)
            // covers; there is no collection to create a member in.
            "POST" => self.prepare_error_response(404),
            _ => self.prepare_error_response(500),
        }
    }

    fn run_handler(&mut self, mut handler: Box<dyn Handler>) {
        let before_len = self.write_buffer.len();
        let location = self.location.clone().unwrap();
        let request = self.request.take().unwrap();
        let mut ctx = HandlerContext {
            request: &request,
            location: &location,
            server: &self.server,
            resolved_path: None,
            peer_addr: self.peer_addr,
            response: &mut self.response,
            write_buffer: &mut self.write_buffer,
        };
        let outcome = handler.start(&mut ctx);
        self.request = Some(request);
        self.settle(handler, outcome, before_len);
    }

    /// Drives a still-active handler on a readiness event (socket
    /// writable, or CGI monitor FD readable). Returns the outcome so the
    /// event loop can decide whether to keep watching the handler's
    /// monitor FD.
    pub fn resume_handler(&mut self) -> Option<Outcome> {
        let mut handler = self.handler.take()?;
        let before_len = self.write_buffer.len();
        let location = self.location.clone().unwrap();
        let request = self.request.take().unwrap();
        let mut ctx = HandlerContext {
            request: &request,
            location: &location,
            server: &self.server,
            resolved_path: None,
            peer_addr: self.peer_addr,
            response: &mut self.response,
            write_buffer: &mut self.write_buffer,
        };
        let outcome = handler.resume(&mut ctx);
        self.request = Some(request);
        self.settle(handler, outcome, before_len);
        Some(outcome)
    }

    fn settle(&mut self, handler: Box<dyn Handler>, outcome: Outcome, before_len: usize) {
        match outcome {
            Outcome::Done => {
                if self.write_buffer.len() == before_len {
                    let bytes = self.response.to_bytes();
                    self.write_buffer.extend_from_slice(&bytes);
                }
                self.handler = None;
            }
            Outcome::WouldBlock => {
                self.handler = Some(handler);
            }
            Outcome::Error => {
                self.handler = None;
                self.prepare_error_response(500);
            }
        }
    }

    /// §7 error preparation: consult the location's error-page map (or
    /// no map, if the failure predates location resolution), otherwise
    /// fall back to the inline default page. This is the one path that
    /// replaces an already-active handler wholesale (§9 "handler
    /// self-replacement") — used both for ordinary validation failures
    /// and for CGI timeout (§4.10.9).
    pub fn prepare_error_response(&mut self, status: u16) {
        self.handler = None;
        let custom = custom_page_for(&self.error_pages, status);
        self.response = render_error(status, custom.as_deref());
        self.write_buffer = self.response.to_bytes();
        self.write_offset = 0;
        self.stage = Stage::Dispatched;
    }

    /// §5 read timeout: if no response has been queued yet, synthesize
    /// 408 and fall into the normal write path; otherwise the
    /// connection is simply closed by the caller.
    pub fn read_timed_out(&mut self) {
        if !self.dispatched() {
            self.prepare_error_response(408);
        }
    }

    /// §6 access log: one line per completed response, emitted once the
    /// write buffer is fully drained and no handler remains active
    /// (`handler_finished`). Grounded on the teacher's access-log line in
    /// `http/http_connection.rs` (same `REMOTE - - "METHOD URI VERSION"
    /// STATUS BYTES` shape), routed through `tracing` instead of a raw
    /// `println!`.
    pub fn log_access(&self) {
        let (method, target, version) = match &self.request {
            Some(r) => (r.method.as_str(), r.raw_target.as_str(), r.version.as_str()),
            None => ("-", "-", "-"),
        };
        tracing::info!(
            target: "access",
            "{} - - \"{} {} {}\" {} {}",
            self.peer_addr.ip(),
            method,
            target,
            version,
            self.response.status_code,
            self.write_buffer.len(),
        );
    }

    pub fn monitor_fd(&self) -> Option<std::os::fd::RawFd> {
        self.handler.as_ref().and_then(|h| h.monitor_fd())
    }

    pub fn check_cgi_timeout(&self) -> bool {
        self.handler.as_ref().map(|h| h.check_timeout()).unwrap_or(false)
    }

    /// Cancels the active handler (killing a CGI child, for any other
    /// handler a no-op) and installs a 504, exactly the
    /// "self-replacement" transition §9 describes.
    pub fn force_cgi_timeout(&mut self) {
        if let Some(mut handler) = self.handler.take() {
            handler.cancel();
        }
        self.prepare_error_response(504);
    }
}

fn interpreter_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("py") => "python3",
        Some("sh") => "bash",
        _ => "python3",
    }
}

/// First configured index name that exists as a regular file inside
/// `dir`, in insertion order (§4.7).
fn find_index_file(dir: &Path, index_names: &[String]) -> Option<PathBuf> {
    for name in index_names {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}
