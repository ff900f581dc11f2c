//! AutoindexHandler (§4.9), grounded on the teacher's `generate_autoindex`
//! (`src/http/response.rs`), corrected to use the request URI as the
//! display/link base (the teacher's version already does this) and
//! extended to mark subdirectories with a trailing slash and exclude `.`.

use std::path::Path;

use crate::handler::{Handler, HandlerContext, Outcome};

pub struct AutoindexHandler {
    pub fs_dir: std::path::PathBuf,
    pub display_uri: String,
}

impl Handler for AutoindexHandler {
    fn start(&mut self, ctx: &mut HandlerContext) -> Outcome {
        let html = render(&self.fs_dir, &self.display_uri);
        ctx.response.set_status(200);
        ctx.response.set_body(html.into_bytes(), "text/html");
        Outcome::Done
    }
}

fn render(fs_dir: &Path, display_uri: &str) -> String {
    let base = display_uri.trim_end_matches('/');
    let mut html = format!("<html><body><h1>Index of {}</h1><ul>", display_uri);

    let mut entries: Vec<(String, bool)> = Vec::new();
    if let Ok(read_dir) = fs_dir.read_dir() {
        for entry in read_dir.flatten() {
            let Ok(name) = entry.file_name().into_string() else { continue };
            if name == "." {
                continue;
            }
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            entries.push((name, is_dir));
        }
    }
    entries.sort();

    for (name, is_dir) in entries {
        let suffix = if is_dir { "/" } else { "" };
        html.push_str(&format!(
            "<li><a href=\"{base}/{name}{suffix}\">{name}{suffix}</a></li>",
            base = base,
            name = name,
            suffix = suffix
        ));
    }

    html.push_str("</ul></body></html>");
    html
}

#[cfg(test)]
mod tests {
    use super::render;

    #[test]
    fn render_excludes_dot_and_marks_directories() {
        let dir = std::env::temp_dir().join(format!("autoindex_test_{}", std::process::id()));
        std::fs::create_dir_all(dir.join("sub")).unwrap();
        std::fs::write(dir.join("file.txt"), b"x").unwrap();

        let html = render(&dir, "/listing");
        assert!(html.contains("Index of /listing"));
        assert!(html.contains("href=\"/listing/sub/\""));
        assert!(html.contains("href=\"/listing/file.txt\""));

        std::fs::remove_dir_all(&dir).ok();
    }
}
