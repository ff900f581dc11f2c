//! ErrorFileHandler (§4.9, §7), grounded on the teacher's `handle_error`
//! (`src/http/response.rs`): probe the configured error-page path, fall
//! back to the default inline body if it cannot be opened. This server
//! has no persistent connections (§1 Non-goals, §9 "keep-alive
//! deliberately omitted"), so every error response closes, unlike the
//! teacher's 404/405-keep-the-connection-alive special case.

use std::path::{Path, PathBuf};

use crate::handler::{Handler, HandlerContext, Outcome};
use crate::message::response::default_error_body;
use crate::message::Response;
use crate::mime::mime_for_path;

pub struct ErrorFileHandler {
    pub status: u16,
    pub custom_page_path: Option<PathBuf>,
}

impl Handler for ErrorFileHandler {
    fn start(&mut self, ctx: &mut HandlerContext) -> Outcome {
        *ctx.response = render(self.status, self.custom_page_path.as_deref());
        Outcome::Done
    }
}

/// Builds the error response directly, without going through the
/// `Handler`/`HandlerContext` indirection — used by `Connection::prepare_error_response`
/// for failures that occur before a `Request` exists to borrow (e.g. an
/// unparseable request line), where no `HandlerContext` can be built.
pub fn render(status: u16, custom_page_path: Option<&Path>) -> Response {
    if let Some(path) = custom_page_path {
        if let Ok(content) = std::fs::read(path) {
            let mut res = Response::new(status);
            res.set_body(content, mime_for_path(path));
            res.set_header("Connection", "close");
            return res;
        }
    }

    let mut res = Response::new(status);
    res.set_body(default_error_body(status), "text/html; charset=utf-8");
    res.set_header("Connection", "close");
    res
}

/// Resolves a location's configured error-page path for `status`, if one
/// names it. Paths are used as specified — absolute or relative to the
/// process's current working directory (§6) — never joined with a
/// server or location root.
pub fn custom_page_for(
    error_pages: &std::collections::HashMap<u16, String>,
    status: u16,
) -> Option<PathBuf> {
    error_pages.get(&status).map(PathBuf::from)
}
