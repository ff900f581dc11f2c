//! Response model and wire serialization (component C), grounded on the
//! teacher's `HttpResponse` (`src/http/response.rs`): same `to_bytes`/
//! `set_header`/`set_body`/`redirect`/`status_text` shape, ported onto the
//! ordered `HeaderMap` and with the full status-text table §8 requires
//! instead of the teacher's single-code `match`.

use crate::message::headers::HeaderMap;

#[derive(Debug, Clone)]
pub struct Response {
    pub version: String,
    pub status_code: u16,
    pub status_text: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status_code: u16) -> Self {
        let mut headers = HeaderMap::new();
        headers.set("Content-Length", "0");
        Self {
            version: "HTTP/1.1".to_string(),
            status_code,
            status_text: status_text(status_code).to_string(),
            headers,
            body: Vec::new(),
        }
    }

    pub fn set_header(&mut self, name: &str, value: &str) -> &mut Self {
        self.headers.set(name, value);
        self
    }

    pub fn set_status(&mut self, status_code: u16) -> &mut Self {
        self.status_code = status_code;
        self.status_text = status_text(status_code).to_string();
        self
    }

    pub fn set_body(&mut self, body: Vec<u8>, content_type: &str) -> &mut Self {
        self.headers.set("Content-Length", &body.len().to_string());
        self.headers.set("Content-Type", content_type);
        self.body = body;
        self
    }

    pub fn redirect(status_code: u16, target: &str) -> Self {
        let mut res = Response::new(status_code);
        res.set_header("Location", target);
        res.set_header("Content-Length", "0");
        res.set_header("Connection", "close");
        res
    }

    /// Serializes start line, headers, a blank line, then the body. If no
    /// handler set `Connection`, `close` is appended — this server never
    /// keeps a connection alive past one response (§4.2, §1 Non-goals).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.head_bytes();
        out.extend_from_slice(&self.body);
        out
    }

    /// Just the start line and headers, no body — used by streaming
    /// handlers (file, CGI) that push the body separately.
    pub fn head_bytes(&self) -> Vec<u8> {
        let mut out = format!("{} {} {}\r\n", self.version, self.status_code, self.status_text)
            .into_bytes();
        for (name, value) in self.headers.iter() {
            out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }
        if !self.headers.contains("connection") {
            out.extend_from_slice(b"Connection: close\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out
    }
}

/// Full status-text table (§8): every code this server can emit.
pub fn status_text(code: u16) -> &'static str {
    match code {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        416 => "Range Not Satisfiable",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        _ => "Unknown",
    }
}

/// The default inline error body used when no custom error page is
/// configured, or the configured one cannot be opened (§4.9 ErrorFileHandler).
pub fn default_error_body(code: u16) -> Vec<u8> {
    format!(
        "<html><body><h1>{} {}</h1></body></html>",
        code,
        status_text(code)
    )
    .into_bytes()
}
