//! Uniform handler contract (component F, §4.8) and the five
//! implementations. No single existing teacher signature is internally
//! consistent (`get_handler.rs` takes `(&HttpRequest, &mut HttpResponse,
//! &RouteConfig, &Arc<ServerConfig>)`, `delete_handler.rs` returns a fresh
//! `HttpResponse` instead of mutating one, CGI dispatch lives inline in
//! `setup_action` with no handler type at all) so this module is a fresh
//! design, grounded on what each of those pieces does rather than how
//! any one of them is shaped.

pub mod autoindex;
pub mod cgi;
pub mod error_file;
pub mod file;
pub mod redirect;

use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::path::PathBuf;

use crate::config::ServerConfig;
use crate::message::{Request, Response};
use crate::router::ResolvedLocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    WouldBlock,
    Error,
}

/// Everything a handler needs to do its work, borrowed from the owning
/// Connection for the duration of one `start`/`resume` call. `response`
/// and `write_buffer` are where a handler deposits its result: simple
/// handlers fill `response` and are immediately serialized by the caller;
/// streaming handlers (file, CGI) push pre-serialized bytes straight into
/// `write_buffer` and leave `response` at its default.
pub struct HandlerContext<'a> {
    pub request: &'a Request,
    pub location: &'a ResolvedLocation,
    pub server: &'a ServerConfig,
    pub resolved_path: Option<&'a PathBuf>,
    pub peer_addr: SocketAddr,
    pub response: &'a mut Response,
    pub write_buffer: &'a mut Vec<u8>,
}

/// Trait every handler implements. `monitor_fd` is non-`None` only for
/// CGI (the pipe it drains); `check_timeout` is non-false only for CGI
/// (wall-clock since `start`). Everything else uses the defaults.
pub trait Handler {
    fn start(&mut self, ctx: &mut HandlerContext) -> Outcome;

    fn resume(&mut self, _ctx: &mut HandlerContext) -> Outcome {
        Outcome::Done
    }

    fn monitor_fd(&self) -> Option<RawFd> {
        None
    }

    fn check_timeout(&self) -> bool {
        false
    }

    /// Called instead of letting a handler finish naturally: timeout or
    /// connection teardown. Only CGI overrides this, to reap its child;
    /// every other handler's default is a no-op.
    fn cancel(&mut self) {}
}

pub use autoindex::AutoindexHandler;
pub use cgi::CgiHandler;
pub use error_file::ErrorFileHandler;
pub use file::FileHandler;
pub use redirect::RedirectHandler;
