//! The event loop (component H, §5). Grounded on the teacher's
//! `src/main.rs` (the only surviving sketch of a `Poll`/`Events`
//! bind-and-serve loop anywhere in the retrieval pack — commented out,
//! never finished) and on `http/http_connection.rs`'s read/write-phase
//! reregistration logic, rebuilt around this server's own
//! `Connection`/`Handler` pipeline instead of the teacher's
//! `HttpConnection`/`ActiveAction`.
//!
//! Routing is by listening address only (§1 Non-goals: no virtual
//! hosting), and `validate_config` already rejects two servers sharing a
//! `(host, port)` pair, so each bound listener maps to exactly one
//! `ServerConfig`.

use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use signal_hook::consts::{SIGINT, SIGPIPE, SIGTERM};
use signal_hook_mio::v1_0::Signals as MioSignals;

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::error::Result;

pub const READ_TIMEOUT: Duration = Duration::from_secs(30);
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(30);

const LISTENER_TOKEN_BASE: usize = 0;
const SIGNAL_TOKEN: Token = Token(usize::MAX - 1);
const CONNECTION_TOKEN_BASE: usize = 1;
const MONITOR_TOKEN_OFFSET: usize = usize::MAX / 2;

/// Owns every bound listener, the connection table, and the poll
/// instance; `run` never returns except on a shutdown signal or a fatal
/// I/O error on the poll itself.
pub struct ServerManager {
    poll: Poll,
    listeners: HashMap<Token, TcpListener>,
    listener_servers: HashMap<Token, Arc<ServerConfig>>,
    connections: HashMap<Token, TcpStream>,
    state: HashMap<Token, Connection>,
    cgi_monitor_to_conn: HashMap<Token, Token>,
    next_token: usize,
    signals: MioSignals,
    global_max_body: Option<usize>,
    shutting_down: bool,
}

impl ServerManager {
    pub fn bind(servers: Vec<ServerConfig>, global_max_body: Option<usize>) -> Result<Self> {
        let poll = Poll::new()?;
        let mut listeners = HashMap::new();
        let mut listener_servers = HashMap::new();
        let mut next_token = LISTENER_TOKEN_BASE;

        for server in servers {
            let server = Arc::new(server);
            for &port in &server.ports {
                let addr: SocketAddr = format!("{}:{}", server.host, port).parse()?;
                let mut listener = TcpListener::bind(addr)?;
                let token = Token(next_token);
                next_token += 1;
                poll.registry().register(&mut listener, token, Interest::READABLE)?;
                tracing::info!(%addr, server = %server.server_name, "listening");
                listeners.insert(token, listener);
                listener_servers.insert(token, Arc::clone(&server));
            }
        }

        // SIGPIPE is registered here too (rather than left at its default
        // disposition) purely so the process survives a write to a
        // socket the peer already closed — EPIPE on the next syscall,
        // not process death. `drain_signals` below discards it (§5).
        let mut signals = MioSignals::new([SIGINT, SIGTERM, SIGPIPE])?;
        poll.registry().register(&mut signals, SIGNAL_TOKEN, Interest::READABLE)?;

        if next_token < CONNECTION_TOKEN_BASE {
            next_token = CONNECTION_TOKEN_BASE;
        }

        Ok(Self {
            poll,
            listeners,
            listener_servers,
            connections: HashMap::new(),
            state: HashMap::new(),
            cgi_monitor_to_conn: HashMap::new(),
            next_token,
            signals,
            global_max_body,
            shutting_down: false,
        })
    }

    /// Runs until a termination signal arrives. One iteration: block in
    /// `poll`, dispatch every readiness event, then sweep for read/write/
    /// CGI timeouts (§5).
    pub fn run(&mut self) -> Result<()> {
        let mut events = Events::with_capacity(1024);

        while !self.shutting_down {
            if let Err(e) = self.poll.poll(&mut events, Some(Duration::from_millis(500))) {
                if e.kind() == ErrorKind::Interrupted {
                    continue;
                }
                return Err(e.into());
            }

            for event in events.iter() {
                let token = event.token();
                if token == SIGNAL_TOKEN {
                    self.drain_signals();
                    continue;
                }
                if let Some(_listener) = self.listeners.get(&token) {
                    self.accept_all(token);
                    continue;
                }
                if let Some(&conn_token) = self.cgi_monitor_to_conn.get(&token) {
                    self.drive_cgi(conn_token);
                    continue;
                }
                if event.is_readable() {
                    self.handle_readable(token);
                }
                if event.is_writable() {
                    self.handle_writable(token);
                }
            }

            self.sweep_timeouts();
        }

        tracing::info!("shutting down");
        Ok(())
    }

    fn drain_signals(&mut self) {
        for signal in self.signals.pending() {
            if signal == SIGINT || signal == SIGTERM {
                tracing::info!(signal, "received termination signal");
                self.shutting_down = true;
            }
        }
    }

    fn accept_all(&mut self, listener_token: Token) {
        loop {
            let accepted = {
                let listener = self.listeners.get(&listener_token).unwrap();
                listener.accept()
            };
            match accepted {
                Ok((mut stream, peer_addr)) => {
                    let server = Arc::clone(&self.listener_servers[&listener_token]);
                    let token = self.allocate_token();

                    if let Err(e) =
                        self.poll.registry().register(&mut stream, token, Interest::READABLE)
                    {
                        tracing::warn!(error = %e, "failed to register accepted connection");
                        continue;
                    }

                    tracing::debug!(%peer_addr, "accepted connection");
                    self.connections.insert(token, stream);
                    self.state.insert(
                        token,
                        Connection::new(peer_addr, server, self.global_max_body),
                    );
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    break;
                }
            }
        }
    }

    /// Connection tokens are handed out monotonically starting just past
    /// the listener tokens; `MONITOR_TOKEN_OFFSET + token` is reserved
    /// for that connection's CGI monitor fd, so the two halves of the
    /// token space never collide.
    fn allocate_token(&mut self) -> Token {
        let candidate = self.next_token;
        self.next_token += 1;
        Token(candidate)
    }

    fn handle_readable(&mut self, token: Token) {
        let Some(stream) = self.connections.get_mut(&token) else { return };
        let mut buf = [0u8; 8192];
        loop {
            match stream.read(&mut buf) {
                Ok(0) => {
                    self.teardown(token);
                    return;
                }
                Ok(n) => {
                    let Some(conn) = self.state.get_mut(&token) else { return };
                    conn.ingest(&buf[..n]);
                    if conn.dispatched() {
                        self.begin_write(token);
                        return;
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(_) => {
                    self.teardown(token);
                    return;
                }
            }
        }
    }

    /// Transitions a connection from read-driven to write-driven once a
    /// response is fully queued: reregisters its socket for `WRITABLE`
    /// and, if the active handler exposes a monitor fd (CGI), registers
    /// that too so the handler keeps making progress alongside the
    /// socket drain.
    fn begin_write(&mut self, token: Token) {
        if let Some(conn) = self.state.get_mut(&token) {
            conn.write_started = Some(Instant::now());
            if let Some(fd) = conn.monitor_fd() {
                self.register_cgi_monitor(token, fd);
            }
        }
        if let Some(stream) = self.connections.get_mut(&token) {
            let _ = self.poll.registry().reregister(stream, token, Interest::WRITABLE);
        }
        self.handle_writable(token);
    }

    fn register_cgi_monitor(&mut self, conn_token: Token, fd: std::os::fd::RawFd) {
        let monitor_token = Token(MONITOR_TOKEN_OFFSET + conn_token.0);
        let mut source = mio::unix::SourceFd(&fd);
        let _ = self.poll.registry().register(&mut source, monitor_token, Interest::READABLE);
        self.cgi_monitor_to_conn.insert(monitor_token, conn_token);
    }

    fn deregister_cgi_monitor(&mut self, conn_token: Token, fd: std::os::fd::RawFd) {
        let monitor_token = Token(MONITOR_TOKEN_OFFSET + conn_token.0);
        let mut source = mio::unix::SourceFd(&fd);
        let _ = self.poll.registry().deregister(&mut source);
        self.cgi_monitor_to_conn.remove(&monitor_token);
    }

    /// A CGI monitor fd became readable: let its handler drain more
    /// output into the write buffer, then try flushing the socket again.
    fn drive_cgi(&mut self, conn_token: Token) {
        let previous_fd = self.state.get(&conn_token).and_then(|c| c.monitor_fd());

        let outcome = self.state.get_mut(&conn_token).and_then(|c| c.resume_handler());

        if let Some(fd) = previous_fd {
            let still_watching =
                self.state.get(&conn_token).and_then(|c| c.monitor_fd()) == Some(fd);
            if !still_watching {
                self.deregister_cgi_monitor(conn_token, fd);
            }
        }

        if outcome.is_some() {
            self.handle_writable(conn_token);
        }
    }

    fn handle_writable(&mut self, token: Token) {
        loop {
            let Some(conn) = self.state.get_mut(&token) else { return };
            if conn.write_offset >= conn.write_buffer.len() {
                if conn.handler_finished() {
                    conn.log_access();
                    self.teardown(token);
                }
                return;
            }

            let Some(stream) = self.connections.get_mut(&token) else { return };
            match stream.write(&conn.write_buffer[conn.write_offset..]) {
                Ok(0) => {
                    self.teardown(token);
                    return;
                }
                Ok(n) => {
                    conn.write_offset += n;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(_) => {
                    self.teardown(token);
                    return;
                }
            }
        }
    }

    /// §5 timeout sweep: read timeout synthesizes a response (408) and
    /// falls into the write path; write timeout and CGI timeout both
    /// close the connection outright (a write-timed-out peer cannot be
    /// trusted to receive a fresh error body either).
    fn sweep_timeouts(&mut self) {
        let now = Instant::now();
        let mut read_timed_out = Vec::new();
        let mut write_timed_out = Vec::new();
        let mut cgi_timed_out = Vec::new();

        for (&token, conn) in self.state.iter() {
            if !conn.dispatched() && now.duration_since(conn.read_started) > READ_TIMEOUT {
                read_timed_out.push(token);
                continue;
            }
            if let Some(started) = conn.write_started {
                if now.duration_since(started) > WRITE_TIMEOUT {
                    write_timed_out.push(token);
                    continue;
                }
            }
            if conn.check_cgi_timeout() {
                cgi_timed_out.push(token);
            }
        }

        for token in read_timed_out {
            if let Some(conn) = self.state.get_mut(&token) {
                conn.read_timed_out();
            }
            self.begin_write(token);
        }
        for token in cgi_timed_out {
            let fd = self.state.get(&token).and_then(|c| c.monitor_fd());
            if let Some(conn) = self.state.get_mut(&token) {
                conn.force_cgi_timeout();
            }
            if let Some(fd) = fd {
                self.deregister_cgi_monitor(token, fd);
            }
            self.begin_write(token);
        }
        for token in write_timed_out {
            self.teardown(token);
        }
    }

    fn teardown(&mut self, token: Token) {
        if let Some(fd) = self.state.get(&token).and_then(|c| c.monitor_fd()) {
            self.deregister_cgi_monitor(token, fd);
        }
        if let Some(mut handler) = self.state.get_mut(&token).and_then(|c| c.take_handler()) {
            handler.cancel();
        }
        if let Some(mut stream) = self.connections.remove(&token) {
            let _ = self.poll.registry().deregister(&mut stream);
            tracing::trace!(fd = stream.as_raw_fd(), "closing connection");
        }
        self.state.remove(&token);
    }
}
