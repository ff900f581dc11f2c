//! Bounded-chunk file streaming and Range-request handling (component D,
//! §4.11, §4.12). Grounded on the teacher's `ActiveAction::FileDownload`
//! streaming step in `http/http_connection.rs::handle_write_phase` (open
//! once, push fixed-size chunks, track `remaining`, flip to `None` on
//! EOF) and on `handlers/get_handler.rs`'s open-and-stat sequence, folded
//! together into one owned streamer type instead of leaving the state
//! split across `ActiveAction` and the write-phase function.

use std::fs::File;
use std::io::{self, ErrorKind, Read};
use std::path::Path;

use crate::message::Response;
use crate::mime::mime_for_path;

pub const CHUNK_SIZE: usize = 8192;

#[derive(Debug)]
pub enum StreamStep {
    WroteChunk(usize),
    Done,
    WouldBlock,
}

/// Owns an open file and the byte range left to serve. `fill` is called
/// repeatedly by the connection's write phase; each call appends at most
/// one `CHUNK_SIZE` chunk to `out` and reports how it went.
#[derive(Debug)]
pub struct FileStreamer {
    file: File,
    remaining: u64,
}

impl FileStreamer {
    pub fn new(file: File, start: u64, len: u64) -> io::Result<Self> {
        use std::io::{Seek, SeekFrom};
        let mut file = file;
        file.seek(SeekFrom::Start(start))?;
        Ok(Self { file, remaining: len })
    }

    /// Pushes up to `CHUNK_SIZE` bytes into `out`. Returns `Done` once
    /// `remaining` reaches zero or the file reports EOF early.
    pub fn fill(&mut self, out: &mut Vec<u8>) -> StreamStep {
        if self.remaining == 0 {
            return StreamStep::Done;
        }
        let want = std::cmp::min(self.remaining, CHUNK_SIZE as u64) as usize;
        let mut buf = vec![0u8; want];
        match self.file.read(&mut buf) {
            Ok(0) => StreamStep::Done,
            Ok(n) => {
                out.extend_from_slice(&buf[..n]);
                self.remaining -= n as u64;
                StreamStep::WroteChunk(n)
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => StreamStep::WouldBlock,
            Err(_) => StreamStep::Done,
        }
    }

    pub fn is_done(&self) -> bool {
        self.remaining == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOutcome {
    Full,
    Partial { start: u64, end: u64 },
    Unsatisfiable,
}

/// Parses a `Range: bytes=...` header value against a known file size
/// (§4.11). Only the single-range, `bytes=` forms are accepted: `N-M`,
/// `N-`, `-N`. Anything else, or a missing header, is `Full`.
pub fn parse_range(header: Option<&str>, file_size: u64) -> RangeOutcome {
    let Some(value) = header else { return RangeOutcome::Full };
    let Some(spec) = value.strip_prefix("bytes=") else { return RangeOutcome::Full };
    if spec.matches('-').count() != 1 || spec.contains(',') {
        return RangeOutcome::Unsatisfiable;
    }

    let Some((start_str, end_str)) = spec.split_once('-') else {
        return RangeOutcome::Unsatisfiable;
    };

    if start_str.is_empty() {
        // suffix form: -N, last N bytes
        let Ok(n) = end_str.parse::<u64>() else { return RangeOutcome::Unsatisfiable };
        if n == 0 || file_size == 0 {
            return RangeOutcome::Unsatisfiable;
        }
        let n = n.min(file_size);
        return RangeOutcome::Partial { start: file_size - n, end: file_size - 1 };
    }

    let Ok(start) = start_str.parse::<u64>() else { return RangeOutcome::Unsatisfiable };
    if start >= file_size {
        return RangeOutcome::Unsatisfiable;
    }

    let end = if end_str.is_empty() {
        file_size - 1
    } else {
        match end_str.parse::<u64>() {
            Ok(e) if e >= start => e.min(file_size - 1),
            _ => return RangeOutcome::Unsatisfiable,
        }
    };

    RangeOutcome::Partial { start, end }
}

/// Builds the response headers for {full, partial, invalid-range}
/// outcomes and returns the `(start, len)` byte window the streamer
/// should serve. `include_body` is false for `HEAD`.
pub fn prepare_file_response(
    path: &Path,
    file_size: u64,
    range_header: Option<&str>,
    include_body: bool,
) -> (Response, u64, u64) {
    let mime = mime_for_path(path);
    match parse_range(range_header, file_size) {
        RangeOutcome::Full => {
            let mut res = Response::new(200);
            res.set_header("Content-Type", mime);
            res.set_header("Content-Length", &file_size.to_string());
            if !include_body {
                res.headers.set("Content-Length", &file_size.to_string());
            }
            (res, 0, file_size)
        }
        RangeOutcome::Partial { start, end } => {
            let len = end - start + 1;
            let mut res = Response::new(206);
            res.set_header("Content-Type", mime);
            res.set_header("Content-Length", &len.to_string());
            res.set_header("Content-Range", &format!("bytes {}-{}/{}", start, end, file_size));
            (res, start, len)
        }
        RangeOutcome::Unsatisfiable => {
            let mut res = Response::new(416);
            res.set_header("Content-Range", &format!("bytes */{}", file_size));
            res.set_header("Content-Length", "0");
            (res, 0, 0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_range_header_is_full() {
        assert_eq!(parse_range(None, 100), RangeOutcome::Full);
    }

    #[test]
    fn absolute_range_is_partial() {
        assert_eq!(parse_range(Some("bytes=0-9"), 100), RangeOutcome::Partial { start: 0, end: 9 });
    }

    #[test]
    fn open_ended_range_runs_to_file_end() {
        assert_eq!(parse_range(Some("bytes=90-"), 100), RangeOutcome::Partial { start: 90, end: 99 });
    }

    #[test]
    fn suffix_range_is_capped_at_file_size() {
        assert_eq!(parse_range(Some("bytes=-1000"), 100), RangeOutcome::Partial { start: 0, end: 99 });
    }

    #[test]
    fn multi_range_is_unsatisfiable() {
        assert_eq!(parse_range(Some("bytes=0-1,2-3"), 100), RangeOutcome::Unsatisfiable);
    }

    #[test]
    fn start_beyond_file_size_is_unsatisfiable() {
        assert_eq!(parse_range(Some("bytes=200-"), 100), RangeOutcome::Unsatisfiable);
    }

    #[test]
    fn partial_response_sets_content_range_header() {
        let (res, start, len) =
            prepare_file_response(Path::new("a.txt"), 100, Some("bytes=0-9"), true);
        assert_eq!(res.status_code, 206);
        assert_eq!(start, 0);
        assert_eq!(len, 10);
        assert_eq!(res.headers.get("content-range"), Some("bytes 0-9/100"));
    }
}
