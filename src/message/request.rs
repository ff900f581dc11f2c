//! Request start-line and header parsing (component C / §4.3).
//!
//! Grounded on the teacher's `HttpRequest::parse_request_line` and
//! `extract_and_parse_header` (`src/http/request.rs`), generalized from the
//! teacher's three-method (`GET`/`POST`/`DELETE`) closed enum to the full
//! method set this server's handler dispatch needs, and from its
//! `HashMap<String, String>` header store to the ordered `HeaderMap`.

use std::fmt;

use crate::message::headers::HeaderMap;
use crate::uri::{percent_decode, Uri, UriError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    IncompleteHeadSection,
    MalformedRequestLine,
    InvalidUri,
    MalformedContentLength,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::IncompleteHeadSection => write!(f, "incomplete request head"),
            ParseError::MalformedRequestLine => write!(f, "malformed request line"),
            ParseError::InvalidUri => write!(f, "invalid request-target"),
            ParseError::MalformedContentLength => write!(f, "malformed content-length"),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<UriError> for ParseError {
    fn from(_: UriError) -> Self {
        ParseError::InvalidUri
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub uri: Uri,
    pub raw_target: String,
    pub version: String,
    pub headers: HeaderMap,
    pub cookies: std::collections::HashMap<String, String>,
    pub body: Vec<u8>,
}

/// Finds the end of the header section: the offset just past the first
/// `CRLF CRLF` (or, tolerating a lone `LF`, `LF LF`). Returns `None` if the
/// terminator has not arrived yet.
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    if let Some(pos) = find_subsequence(buf, b"\r\n\r\n") {
        return Some(pos + 4);
    }
    find_subsequence(buf, b"\n\n").map(|pos| pos + 2)
}

pub fn find_subsequence(buf: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || buf.len() < needle.len() {
        return None;
    }
    buf.windows(needle.len()).position(|w| w == needle)
}

fn split_lines(head: &[u8]) -> Vec<&[u8]> {
    // Tolerates a lone LF: splits on LF, then strips a trailing CR off each line.
    head.split(|&b| b == b'\n')
        .map(|line| {
            if let Some((&b'\r', rest)) = line.split_last().map(|(l, r)| (l, r)) {
                rest
            } else {
                line
            }
        })
        .collect()
}

impl Request {
    /// Parses the method/target/version and header lines out of the header
    /// section of `buf` (everything up to and including the blank-line
    /// terminator found by `find_head_end`). The body is left empty; the
    /// caller fills it in from whatever follows once buffered (§4.4).
    pub fn parse_head(head: &[u8]) -> Result<Request, ParseError> {
        let lines = split_lines(head);
        let mut iter = lines.into_iter();

        let request_line = iter.next().ok_or(ParseError::IncompleteHeadSection)?;
        let request_line =
            std::str::from_utf8(request_line).map_err(|_| ParseError::MalformedRequestLine)?;
        let mut parts = request_line.split_whitespace();
        let (method, target, version) = match (parts.next(), parts.next(), parts.next()) {
            (Some(m), Some(t), Some(v)) if parts.next().is_none() => (m, t, v),
            _ => return Err(ParseError::MalformedRequestLine),
        };

        let uri = Uri::parse(target)?;

        let mut headers = HeaderMap::new();
        for line in iter {
            if line.is_empty() {
                break;
            }
            let line = std::str::from_utf8(line).map_err(|_| ParseError::MalformedRequestLine)?;
            if let Some((name, value)) = HeaderMap::parse_line(line) {
                headers.append(&name, &value);
            }
            // lines without ':' are silently discarded (§4.2).
        }

        let cookies = parse_cookies(&headers);

        Ok(Request {
            method: method.to_string(),
            uri,
            raw_target: target.to_string(),
            version: version.to_string(),
            headers,
            cookies,
            body: Vec::new(),
        })
    }

    /// `Content-Length`, parsed and range-checked. `Ok(None)` means the
    /// header was absent. A non-numeric or negative value is a parse error
    /// (§4.4, §4.6).
    pub fn content_length(&self) -> Result<Option<usize>, ParseError> {
        match self.headers.get("content-length") {
            None => Ok(None),
            Some(raw) => {
                let raw = raw.trim();
                if raw.is_empty() || raw.starts_with('-') {
                    return Err(ParseError::MalformedContentLength);
                }
                raw.parse::<usize>()
                    .map(Some)
                    .map_err(|_| ParseError::MalformedContentLength)
            }
        }
    }

    pub fn decoded_path(&self) -> String {
        self.uri.decoded_path()
    }
}

/// Splits `Cookie` header values on `;`, each element on the first `=`,
/// trims both sides; duplicate names: last occurrence wins (§4.3).
fn parse_cookies(headers: &HeaderMap) -> std::collections::HashMap<String, String> {
    let mut map = std::collections::HashMap::new();
    for cookie_header in headers.get_all("cookie") {
        for pair in cookie_header.split(';') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            if let Some((name, value)) = pair.split_once('=') {
                map.insert(
                    name.trim().to_string(),
                    percent_decode(value.trim(), true),
                );
            }
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_get() {
        let head = b"GET /a/b?x=1 HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let end = find_head_end(head).unwrap();
        let req = Request::parse_head(&head[..end]).unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.uri.path, "/a/b");
        assert_eq!(req.version, "HTTP/1.1");
        assert_eq!(req.headers.get("host"), Some("example.com"));
    }

    #[test]
    fn tolerates_lone_lf() {
        let head = b"GET / HTTP/1.1\nHost: x\n\n";
        let end = find_head_end(head).unwrap();
        let req = Request::parse_head(&head[..end]).unwrap();
        assert_eq!(req.headers.get("host"), Some("x"));
    }

    #[test]
    fn malformed_request_line_with_two_tokens_is_rejected() {
        let head = b"GET /\r\n\r\n";
        let end = find_head_end(head).unwrap();
        assert!(matches!(
            Request::parse_head(&head[..end]),
            Err(ParseError::MalformedRequestLine)
        ));
    }

    #[test]
    fn header_line_without_colon_is_discarded() {
        let head = b"GET / HTTP/1.1\r\nnot-a-header\r\nHost: x\r\n\r\n";
        let end = find_head_end(head).unwrap();
        let req = Request::parse_head(&head[..end]).unwrap();
        assert_eq!(req.headers.get("host"), Some("x"));
    }

    #[test]
    fn duplicate_cookie_name_last_wins() {
        let head = b"GET / HTTP/1.1\r\nCookie: a=1; a=2\r\n\r\n";
        let end = find_head_end(head).unwrap();
        let req = Request::parse_head(&head[..end]).unwrap();
        assert_eq!(req.cookies.get("a"), Some(&"2".to_string()));
    }

    #[test]
    fn content_length_rejects_negative_and_non_numeric() {
        let head = b"POST / HTTP/1.1\r\nContent-Length: -1\r\n\r\n";
        let end = find_head_end(head).unwrap();
        let req = Request::parse_head(&head[..end]).unwrap();
        assert!(req.content_length().is_err());
    }

    #[test]
    fn head_end_not_found_yet() {
        assert_eq!(find_head_end(b"GET / HTTP/1.1\r\nHost: x\r\n"), None);
    }
}
