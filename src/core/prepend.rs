//! Inserting the hoisted header at the top of the output file.
//!
//! Files cannot grow at the front, so the output is streamed into a sibling
//! temporary file behind the header and then copied back over the original.
//! The output keeps its inode, so permissions, symlinks and hard links
//! survive. A failure before the copy-back leaves the original untouched.

use std::io::{self, SeekFrom};
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt};

use super::CoreError;

/// Name prefix of the temporary files created next to the output.
pub const TEMP_PREFIX: &str = ".distribute-";
const TEMP_SUFFIX: &str = ".tmp";
const CHUNK_SIZE: usize = 64 * 1024;

/// A writer that emits `header` (plus a blank line) exactly once, before the
/// first byte of body.
pub struct Prepender<W> {
    inner: W,
    header: String,
    prepended: bool,
}

impl<W: AsyncWrite + Unpin> Prepender<W> {
    pub fn new(inner: W, header: impl Into<String>) -> Self {
        Self {
            inner,
            header: header.into(),
            prepended: false,
        }
    }

    /// Bytes the header adds in front of the body.
    pub fn size_added(&self) -> u64 {
        self.header.len() as u64 + 2
    }

    pub async fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.write_header().await?;
        self.inner.write_all(chunk).await
    }

    /// Writes the header if no chunk did yet, flushes and returns the writer.
    pub async fn finish(mut self) -> io::Result<W> {
        self.write_header().await?;
        self.inner.flush().await?;
        Ok(self.inner)
    }

    async fn write_header(&mut self) -> io::Result<()> {
        if self.prepended {
            return Ok(());
        }
        self.prepended = true;

        self.inner.write_all(self.header.as_bytes()).await?;
        self.inner.write_all(b"\n\n").await
    }
}

/// Rewrites `output` with `header` as its first line.
///
/// Returns the number of bytes added.
pub async fn prepend_file(output: &Path, header: &str) -> Result<u64, CoreError> {
    let dir = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let temp_dir = dir.to_path_buf();
    let temp = tokio::task::spawn_blocking(move || {
        tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(TEMP_SUFFIX)
            .tempfile_in(temp_dir)
    })
    .await?
    .map_err(|e| CoreError::io(e, dir))?;
    // The temp path removes the file on drop, so every early return cleans up.
    let (temp_file, temp_path) = temp.into_parts();

    let mut source = tokio::fs::File::open(output)
        .await
        .map_err(|e| CoreError::io(e, output))?;
    let mut prepender = Prepender::new(tokio::fs::File::from_std(temp_file), header);
    let size_added = prepender.size_added();

    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let read = source
            .read(&mut buf)
            .await
            .map_err(|e| CoreError::io(e, output))?;
        if read == 0 {
            break;
        }
        prepender
            .write(&buf[..read])
            .await
            .map_err(|e| CoreError::io(e, &*temp_path))?;
    }
    drop(source);

    let mut temp_file = prepender
        .finish()
        .await
        .map_err(|e| CoreError::io(e, &*temp_path))?;
    temp_file
        .seek(SeekFrom::Start(0))
        .await
        .map_err(|e| CoreError::io(e, &*temp_path))?;

    let mut dest = OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(output)
        .await
        .map_err(|e| CoreError::io(e, output))?;
    tokio::io::copy(&mut temp_file, &mut dest)
        .await
        .map_err(|e| CoreError::io(e, output))?;
    dest.sync_all().await.map_err(|e| CoreError::io(e, output))?;
    drop(temp_file);
    drop(temp_path);

    tracing::debug!("Prepended {} bytes to {}", size_added, output.display());
    Ok(size_added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn test_header_is_written_once() {
        let mut prepender = Prepender::new(Vec::new(), "HEADER");
        prepender.write(b"some data\n").await.unwrap();
        prepender.write(b"many more").await.unwrap();
        let out = prepender.finish().await.unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "HEADER\n\nsome data\nmany more");
    }

    #[tokio::test]
    async fn test_empty_body_still_gets_header() {
        let prepender = Prepender::new(Vec::new(), "H");
        assert_eq!(prepender.finish().await.unwrap(), b"H\n\n");
    }

    #[tokio::test]
    async fn test_prepend_file_rewrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("dist.js");
        fs::write(&out, "some data\nsome more\nmany more").unwrap();

        let added = prepend_file(&out, "HEADER").await.unwrap();

        assert_eq!(added, 8);
        assert_eq!(
            fs::read_to_string(&out).unwrap(),
            "HEADER\n\nsome data\nsome more\nmany more"
        );
        // only the output remains, no temp file left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_missing_output_is_an_error_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("missing.js");

        assert!(matches!(
            prepend_file(&out, "HEADER").await,
            Err(CoreError::Io(..))
        ));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_permissions_survive() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("dist.js");
        fs::write(&out, "body();\n").unwrap();
        fs::set_permissions(&out, fs::Permissions::from_mode(0o644)).unwrap();

        prepend_file(&out, "HEADER").await.unwrap();

        let mode = fs::metadata(&out).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinked_output_stays_a_link() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("real.js");
        let link = dir.path().join("dist.js");
        fs::write(&target, "body();\n").unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        prepend_file(&link, "HEADER").await.unwrap();

        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(&target).unwrap(), "HEADER\n\nbody();\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hard_links_share_the_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("dist.js");
        let other = dir.path().join("copy.js");
        fs::write(&out, "body();\n").unwrap();
        fs::hard_link(&out, &other).unwrap();

        prepend_file(&out, "H").await.unwrap();

        assert_eq!(fs::read_to_string(&other).unwrap(), "H\n\nbody();\n");
    }
}
