//! Output backends for exported files

use async_trait::async_trait;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use crate::error::{PrerenderError, Result};

/// Destination of exported files
///
/// Files are addressed by slash-separated paths relative to the output
/// root, e.g. `blog/index.html`.
#[async_trait]
pub trait OutputWriter: Send + Sync {
    /// Write a file, creating parent directories as needed
    async fn write(&self, file: &str, contents: &[u8]) -> Result<()>;

    /// Check if a file was already written
    fn contains(&self, file: &str) -> bool;
}

/// Writes exported files below a directory
#[derive(Debug, Clone)]
pub struct FsWriter {
    out: PathBuf,
}

impl FsWriter {
    pub fn new(out: impl Into<PathBuf>) -> Self {
        Self { out: out.into() }
    }

    pub fn out(&self) -> &Path {
        &self.out
    }

    /// Path of `file` below the output root
    ///
    /// Anything but plain names (`..`, a root, a drive prefix) is refused.
    fn path_for(&self, file: &str) -> Result<PathBuf> {
        let relative = Path::new(file.trim_start_matches('/'));

        if !relative
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
        {
            return Err(PrerenderError::UnsafePath(file.to_string()));
        }

        Ok(self.out.join(relative))
    }
}

#[async_trait]
impl OutputWriter for FsWriter {
    async fn write(&self, file: &str, contents: &[u8]) -> Result<()> {
        let path = self.path_for(file)?;
        let write_error = |source| PrerenderError::Write {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(write_error)?;
        }

        fs::write(&path, contents).await.map_err(write_error)?;
        Ok(())
    }

    fn contains(&self, file: &str) -> bool {
        self.path_for(file).is_ok_and(|path| path.is_file())
    }
}

/// Output file for a crawled path
///
/// HTML is written as `index.html` inside a directory named after the
/// path, anything else to the path itself. Each segment is percent-decoded
/// on its own; `None` when a segment decodes to `.`, `..` or something
/// containing a path separator.
///
/// # Examples
///
/// ```
/// use trellis_prerender::output::output_file;
///
/// assert_eq!(output_file("/", true).as_deref(), Some("index.html"));
/// assert_eq!(output_file("/blog/hello", true).as_deref(), Some("blog/hello/index.html"));
/// assert_eq!(output_file("/blog.json", false).as_deref(), Some("blog.json"));
/// assert_eq!(output_file("/x%2F..%2F..%2Fescaped", true), None);
/// ```
pub fn output_file(path: &str, is_html: bool) -> Option<String> {
    let mut segments = Vec::new();

    for segment in path.split('/').filter(|s| !s.is_empty()) {
        let decoded = percent_decode_str(segment).decode_utf8().ok()?;
        if decoded == "." || decoded == ".." || decoded.contains(['/', '\\', '\0']) {
            return None;
        }
        segments.push(decoded.into_owned());
    }

    if segments.is_empty() {
        return Some("index.html".to_string());
    }

    let file = segments.join("/");
    if is_html && segments.last().map(String::as_str) != Some("index.html") {
        Some(format!("{}/index.html", file))
    } else {
        Some(file)
    }
}

/// Characters `encodeURI` leaves alone besides ASCII alphanumerics
const URI: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b';')
    .remove(b',')
    .remove(b'/')
    .remove(b'?')
    .remove(b':')
    .remove(b'@')
    .remove(b'&')
    .remove(b'=')
    .remove(b'+')
    .remove(b'$')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'#');

/// `<meta>` refresh stub written in place of a redirecting page
pub fn redirect_stub(location: &str) -> String {
    format!(
        "<meta http-equiv=\"refresh\" content=\"0;url={}\">",
        utf8_percent_encode(location, URI)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_file_decodes() {
        assert_eq!(output_file("/caf%C3%A9", true).as_deref(), Some("café/index.html"));
        assert_eq!(output_file("/docs/index.html", true).as_deref(), Some("docs/index.html"));
        assert_eq!(output_file("/a%20b.json", false).as_deref(), Some("a b.json"));
    }

    #[test]
    fn test_output_file_rejects_traversal() {
        assert_eq!(output_file("/x%2F..%2F..%2Fescaped", true), None);
        assert_eq!(output_file("/blog/%2e%2e/secret", true), None);
        assert_eq!(output_file("/a%5Cb", false), None);
    }

    #[test]
    fn test_redirect_stub_encodes_location() {
        assert_eq!(
            redirect_stub("/search?q=a b\""),
            "<meta http-equiv=\"refresh\" content=\"0;url=/search?q=a%20b%22\">"
        );
    }

    #[tokio::test]
    async fn test_fs_writer_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FsWriter::new(dir.path());

        writer.write("blog/post/index.html", b"<h1>Post</h1>").await.unwrap();

        assert!(writer.contains("blog/post/index.html"));
        assert!(!writer.contains("blog/post"));
        assert!(!writer.contains("../outside.html"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("blog/post/index.html")).unwrap(),
            "<h1>Post</h1>"
        );
    }

    #[tokio::test]
    async fn test_fs_writer_refuses_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let writer = FsWriter::new(&out);

        let err = writer.write("x/../../escaped/index.html", b"nope").await.unwrap_err();
        assert!(matches!(err, PrerenderError::UnsafePath(_)));
        assert!(!dir.path().join("escaped").exists());
    }
}
