//! FileHandler (§4.9): GET/HEAD/PUT/POST/DELETE against a resolved
//! filesystem path. Grounded on the teacher's `handlers::get_handler`
//! (open-and-stat, mime lookup, `ActiveAction::FileDownload` streaming)
//! and `handlers::delete_handler` (canonicalize-and-contains traversal
//! guard, `ErrorKind` to status-code mapping), generalized to a single
//! handler that dispatches internally by method instead of one free
//! function per verb, and wired to `FileStreamer`/`file_stream::parse_range`
//! for the streaming and 206 behavior those functions never had.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::file_stream::{prepare_file_response, FileStreamer, StreamStep};
use crate::handler::{Handler, HandlerContext, Outcome};
use crate::mime::extension_for_mime;

pub struct FileHandler {
    path: PathBuf,
    op: Op,
}

enum Op {
    Get { head_only: bool, streamer: Option<FileStreamer> },
    Put,
    PostToDirectory { dir: PathBuf },
    Delete,
}

impl FileHandler {
    pub fn get(path: PathBuf, head_only: bool) -> Self {
        Self { path, op: Op::Get { head_only, streamer: None } }
    }

    pub fn put(path: PathBuf) -> Self {
        Self { path, op: Op::Put }
    }

    pub fn post_to_directory(dir: PathBuf) -> Self {
        Self { path: dir.clone(), op: Op::PostToDirectory { dir } }
    }

    pub fn delete(path: PathBuf) -> Self {
        Self { path, op: Op::Delete }
    }
}

impl Handler for FileHandler {
    fn start(&mut self, ctx: &mut HandlerContext) -> Outcome {
        match &mut self.op {
            Op::Get { head_only, streamer } => start_get(&self.path, *head_only, streamer, ctx),
            Op::Put => start_put(&self.path, ctx),
            Op::PostToDirectory { dir } => start_post(dir, ctx),
            Op::Delete => start_delete(&self.path, ctx),
        }
    }

    fn resume(&mut self, ctx: &mut HandlerContext) -> Outcome {
        match &mut self.op {
            Op::Get { streamer: Some(streamer), .. } => drain_streamer(streamer, ctx.write_buffer),
            _ => Outcome::Done,
        }
    }
}

fn start_get(
    path: &Path,
    head_only: bool,
    streamer: &mut Option<FileStreamer>,
    ctx: &mut HandlerContext,
) -> Outcome {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => return error_outcome(ctx, e.kind()),
    };
    let Ok(metadata) = file.metadata() else {
        ctx.response.set_status(500);
        return Outcome::Done;
    };
    let file_size = metadata.len();

    let range_header = ctx.request.headers.get("range");
    let (response, start, len) = prepare_file_response(path, file_size, range_header, !head_only);
    *ctx.response = response;

    if head_only || ctx.response.status_code == 416 {
        return Outcome::Done;
    }

    ctx.write_buffer.extend_from_slice(&ctx.response.head_bytes());
    match FileStreamer::new(file, start, len) {
        Ok(mut s) => {
            let outcome = drain_streamer(&mut s, ctx.write_buffer);
            if !s.is_done() {
                *streamer = Some(s);
            }
            outcome
        }
        Err(_) => {
            ctx.response.set_status(500);
            Outcome::Done
        }
    }
}

fn drain_streamer(streamer: &mut FileStreamer, write_buffer: &mut Vec<u8>) -> Outcome {
    loop {
        match streamer.fill(write_buffer) {
            StreamStep::WroteChunk(_) => {
                if streamer.is_done() {
                    return Outcome::Done;
                }
            }
            StreamStep::Done => return Outcome::Done,
            StreamStep::WouldBlock => return Outcome::WouldBlock,
        }
    }
}

fn start_put(path: &Path, ctx: &mut HandlerContext) -> Outcome {
    let existed = path.exists();
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            ctx.response.set_status(404);
            return Outcome::Done;
        }
    }

    match fs::write(path, &ctx.request.body) {
        Ok(()) => {
            ctx.response.set_status(if existed { 200 } else { 201 });
            ctx.response.set_header("Content-Length", "0");
            Outcome::Done
        }
        Err(e) => error_outcome(ctx, e.kind()),
    }
}

fn start_post(dir: &Path, ctx: &mut HandlerContext) -> Outcome {
    let content_type = ctx.request.headers.get("content-type").unwrap_or("");
    let extension = if content_type.is_empty() { ".bin" } else { extension_for_mime(content_type) };

    let filename = format!(
        "upload_{}{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0),
        extension
    );
    let target = dir.join(&filename);

    match OpenOptions::new().write(true).create_new(true).open(&target) {
        Ok(mut f) => match f.write_all(&ctx.request.body) {
            Ok(()) => {
                ctx.response.set_status(201);
                ctx.response.set_header("Location", &format!("{}/{}", ctx.location.path, filename));
                ctx.response.set_header("Content-Length", "0");
                Outcome::Done
            }
            Err(e) => error_outcome(ctx, e.kind()),
        },
        Err(e) => error_outcome(ctx, e.kind()),
    }
}

fn start_delete(path: &Path, ctx: &mut HandlerContext) -> Outcome {
    if path.is_dir() {
        ctx.response.set_status(403);
        return Outcome::Done;
    }
    match fs::remove_file(path) {
        Ok(()) => {
            ctx.response.set_status(204);
            ctx.response.set_header("Content-Length", "0");
            Outcome::Done
        }
        Err(e) => error_outcome(ctx, e.kind()),
    }
}

fn error_outcome(ctx: &mut HandlerContext, kind: ErrorKind) -> Outcome {
    let status = match kind {
        ErrorKind::NotFound => 404,
        ErrorKind::PermissionDenied => 403,
        ErrorKind::AlreadyExists => 500,
        _ => 500,
    };
    ctx.response.set_status(status);
    Outcome::Done
}
