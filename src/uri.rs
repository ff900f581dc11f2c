//! Request-target parsing, percent-decoding, path-traversal detection and
//! normalization (component B). No direct teacher equivalent exists — the
//! teacher's request line handling (`src/http/request.rs::parse_request_line`)
//! only ever stores the raw target string — so this is fresh code, grounded
//! in the teacher's plain-`String` string-splitting idiom rather than in any
//! existing parser it already owns.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri {
    pub scheme: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: String,
    pub query: Option<String>,
    pub fragment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UriError {
    Empty,
    InvalidPort,
}

impl fmt::Display for UriError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UriError::Empty => write!(f, "empty request-target"),
            UriError::InvalidPort => write!(f, "port out of range"),
        }
    }
}

impl std::error::Error for UriError {}

impl Uri {
    /// Parses a request-target as it appears on the request line: either
    /// origin-form (`/path?query`) or absolute-form (`http://host:port/path`).
    /// Authority-form (`CONNECT`) and asterisk-form (`OPTIONS *`) are not
    /// produced by this server's handler set and are treated as invalid.
    pub fn parse(raw: &str) -> Result<Uri, UriError> {
        if raw.is_empty() {
            return Err(UriError::Empty);
        }

        let (scheme, host, port, rest) = if let Some(after_scheme) = raw.strip_prefix("http://") {
            split_authority(after_scheme)?
        } else if let Some(after_scheme) = raw.strip_prefix("https://") {
            let (h, p, r) = split_authority_parts(after_scheme)?;
            (Some("https".to_string()), h, p, r)
        } else {
            (None, None, None, raw)
        };

        let (path_and_query, fragment) = match rest.split_once('#') {
            Some((p, f)) => (p, Some(f.to_string())),
            None => (rest, None),
        };
        let (path, query) = match path_and_query.split_once('?') {
            Some((p, q)) => (p, Some(q.to_string())),
            None => (path_and_query, None),
        };

        let path = if path.is_empty() { "/".to_string() } else { path.to_string() };

        Ok(Uri { scheme, host, port, path, query, fragment })
    }

    /// Percent-decoded path, as used for routing, traversal checks, and
    /// filesystem resolution.
    pub fn decoded_path(&self) -> String {
        percent_decode(&self.path, false)
    }

    /// Percent-decoded query string, `+` treated as space per §4.1.
    pub fn decoded_query(&self) -> Option<String> {
        self.query.as_deref().map(|q| percent_decode(q, true))
    }
}

fn split_authority(after_scheme: &str) -> Result<(Option<String>, Option<String>, Option<u16>, &str), UriError> {
    let (host, port, rest) = split_authority_parts(after_scheme)?;
    Ok((Some("http".to_string()), host, port, rest))
}

fn split_authority_parts(after_scheme: &str) -> Result<(Option<String>, Option<u16>, &str), UriError> {
    let slash_idx = after_scheme.find('/').unwrap_or(after_scheme.len());
    let (authority, rest) = after_scheme.split_at(slash_idx);
    let rest = if rest.is_empty() { "/" } else { rest };

    if let Some((host, port_str)) = authority.rsplit_once(':') {
        let port = port_str.parse::<u16>().map_err(|_| UriError::InvalidPort)?;
        Ok((Some(host.to_string()), Some(port), rest))
    } else {
        Ok((Some(authority.to_string()), None, rest))
    }
}

/// `%HH` (any hex case) decodes to its byte; malformed escapes pass through
/// literally. `+` decodes to space only when `plus_is_space` is set (query
/// and cookie contexts, never the path, per §4.1).
pub fn percent_decode(input: &str, plus_is_space: bool) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() && is_hex(bytes[i + 1]) && is_hex(bytes[i + 2]) => {
                let hi = hex_val(bytes[i + 1]);
                let lo = hex_val(bytes[i + 2]);
                out.push(hi * 16 + lo);
                i += 3;
            }
            b'+' if plus_is_space => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn is_hex(b: u8) -> bool {
    b.is_ascii_digit() || (b'a'..=b'f').contains(&b.to_ascii_lowercase())
}

fn hex_val(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        b'A'..=b'F' => b - b'A' + 10,
        _ => 0,
    }
}

/// True iff the *decoded* path is, starts with, ends with, or contains a
/// `..` segment delimited by `/` (or the string boundary). The sole
/// security check callers need; 403 on true.
pub fn is_path_traversal(decoded_path: &str) -> bool {
    decoded_path == ".."
        || decoded_path.starts_with("../")
        || decoded_path.ends_with("/..")
        || decoded_path.contains("/../")
}

/// Decodes, splits on `/`, drops `.` segments, pops on `..` (clamped at
/// root), and rejoins; trailing slash is preserved; empty result becomes `/`.
pub fn normalize_path(raw_path: &str) -> String {
    let decoded = percent_decode(raw_path, false);
    let had_trailing_slash = decoded.len() > 1 && decoded.ends_with('/');

    let mut stack: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                stack.pop();
            }
            s => stack.push(s),
        }
    }

    let mut joined = String::from("/");
    joined.push_str(&stack.join("/"));
    if had_trailing_slash && joined != "/" {
        joined.push('/');
    }
    joined
}
