//! A streaming, line-oriented transform.
//!
//! Bytes are split on `\n`; every complete line is handed to a
//! [`LineInspector`] and its replacement is emitted instead. At most one
//! partial line is ever buffered between chunks.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const CHUNK_SIZE: usize = 64 * 1024;

/// Per-line callback used by [`LineTransform`].
pub trait LineInspector {
    /// Returns the replacement text for `line` (terminator excluded).
    ///
    /// `line_bytes` are the raw bytes the line was decoded from. Returning an
    /// empty string for a non-empty line removes the line, terminator included.
    fn inspect_line(&mut self, line: &str, line_bytes: &[u8]) -> String;
}

impl<F> LineInspector for F
where
    F: FnMut(&str, &[u8]) -> String,
{
    fn inspect_line(&mut self, line: &str, line_bytes: &[u8]) -> String {
        self(line, line_bytes)
    }
}

/// Drives a [`LineInspector`] over one or more input streams.
pub struct LineTransform<I> {
    inspector: I,
    pending: Vec<u8>,
    at_stream_start: bool,
    current_size: u64,
}

impl<I: LineInspector> LineTransform<I> {
    pub fn new(inspector: I) -> Self {
        Self {
            inspector,
            pending: Vec::new(),
            at_stream_start: true,
            current_size: 0,
        }
    }

    /// Transforms one chunk, appending the emitted bytes to `out`.
    ///
    /// A trailing partial line is held back until the next chunk (or
    /// [`end_input`](Self::end_input)) completes it.
    pub fn transform(&mut self, chunk: &[u8], out: &mut Vec<u8>) {
        let mut chunk = chunk;

        if self.at_stream_start {
            let blank = chunk.iter().take_while(|b| **b == b'\n').count();
            chunk = &chunk[blank..];
            if chunk.is_empty() {
                return;
            }
            self.at_stream_start = false;
        }

        let mut line_start = 0;
        while let Some(offset) = chunk[line_start..].iter().position(|b| *b == b'\n') {
            let line_end = line_start + offset;
            if self.pending.is_empty() {
                self.emit_line(&chunk[line_start..line_end], out);
            } else {
                let mut line = std::mem::take(&mut self.pending);
                line.extend_from_slice(&chunk[line_start..line_end]);
                self.emit_line(&line, out);
                line.clear();
                self.pending = line;
            }
            line_start = line_end + 1;
        }

        self.pending.extend_from_slice(&chunk[line_start..]);
    }

    /// Flushes the buffered partial line of the current input, if any.
    ///
    /// The next call to [`transform`](Self::transform) starts a new input.
    pub fn end_input(&mut self, out: &mut Vec<u8>) {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.emit_line(&line, out);
        }
        self.at_stream_start = true;
    }

    /// Drops the buffered partial line without inspecting it.
    pub fn discard_input(&mut self) {
        self.pending.clear();
        self.at_stream_start = true;
    }

    /// Pipes `reader` through the transform into `writer`.
    ///
    /// Returns the number of bytes emitted for this input.
    pub async fn pipe<R, W>(&mut self, mut reader: R, writer: &mut W) -> io::Result<u64>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let size_before = self.current_size;
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut out = Vec::with_capacity(CHUNK_SIZE);

        loop {
            let read = match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(read) => read,
                Err(e) => {
                    self.discard_input();
                    return Err(e);
                }
            };
            out.clear();
            self.transform(&buf[..read], &mut out);
            writer.write_all(&out).await?;
        }

        out.clear();
        self.end_input(&mut out);
        writer.write_all(&out).await?;
        writer.flush().await?;

        Ok(self.current_size - size_before)
    }

    /// Bytes emitted since creation or the last [`reset_current_size`](Self::reset_current_size).
    pub fn current_size(&self) -> u64 {
        self.current_size
    }

    pub fn reset_current_size(&mut self) -> &mut Self {
        self.current_size = 0;
        self
    }

    pub fn inspector(&self) -> &I {
        &self.inspector
    }

    pub fn inspector_mut(&mut self) -> &mut I {
        &mut self.inspector
    }

    pub fn into_inner(self) -> I {
        self.inspector
    }

    fn emit_line(&mut self, raw: &[u8], out: &mut Vec<u8>) {
        let (body, terminator): (&[u8], &[u8]) = match raw.strip_suffix(b"\r") {
            Some(body) => (body, b"\r\n"),
            None => (raw, b"\n"),
        };

        let text = String::from_utf8_lossy(body);
        let replacement = self.inspector.inspect_line(&text, body);

        if replacement.is_empty() && !body.is_empty() {
            return;
        }

        let before = out.len();
        if replacement == text {
            // untouched lines keep their exact bytes, even if not UTF-8
            out.extend_from_slice(body);
        } else {
            out.extend_from_slice(replacement.as_bytes());
        }
        out.extend_from_slice(terminator);
        self.current_size += (out.len() - before) as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upper(line: &str, _: &[u8]) -> String {
        line.to_uppercase()
    }

    fn run<I: LineInspector>(transform: &mut LineTransform<I>, chunks: &[&[u8]]) -> String {
        let mut out = Vec::new();
        for chunk in chunks {
            transform.transform(chunk, &mut out);
        }
        transform.end_input(&mut out);
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_lines_split_across_chunks_are_joined() {
        let mut t = LineTransform::new(upper);
        let out = run(&mut t, &[b"ab", b"c\nd", b"ef\n"]);
        assert_eq!(out, "ABC\nDEF\n");
        assert_eq!(t.current_size(), 8);
    }

    #[test]
    fn test_unterminated_last_line_gets_newline() {
        let mut t = LineTransform::new(upper);
        assert_eq!(run(&mut t, &[b"one\ntwo"]), "ONE\nTWO\n");
    }

    #[test]
    fn test_leading_newlines_of_input_are_stripped() {
        let mut t = LineTransform::new(upper);
        assert_eq!(run(&mut t, &[b"\n\n", b"\nx\n\ny\n"]), "X\n\nY\n");
    }

    #[test]
    fn test_crlf_terminators_are_preserved() {
        let mut seen = Vec::new();
        let mut t = LineTransform::new(|line: &str, _: &[u8]| {
            seen.push(line.to_string());
            line.to_string()
        });
        let out = run(&mut t, &[b"a\r\nb\r\n"]);
        drop(t);
        assert_eq!(out, "a\r\nb\r\n");
        assert_eq!(seen, vec!["a", "b"]);
    }

    #[test]
    fn test_empty_replacement_removes_line() {
        let mut t = LineTransform::new(|line: &str, _: &[u8]| {
            if line.starts_with("drop") {
                String::new()
            } else {
                line.to_string()
            }
        });
        let out = run(&mut t, &[b"keep\ndrop me\n\nkeep too\n"]);
        assert_eq!(out, "keep\n\nkeep too\n");
        assert_eq!(t.current_size(), out.len() as u64);
    }

    #[test]
    fn test_non_utf8_lines_pass_through_untouched() {
        let mut t = LineTransform::new(|line: &str, _: &[u8]| line.to_string());
        let mut out = Vec::new();
        t.transform(&[0xff, 0xfe, b'\n'], &mut out);
        assert_eq!(out, vec![0xff, 0xfe, b'\n']);
    }

    #[test]
    fn test_reset_current_size() {
        let mut t = LineTransform::new(upper);
        run(&mut t, &[b"abc\n"]);
        assert_eq!(t.current_size(), 4);
        t.reset_current_size();
        assert_eq!(t.current_size(), 0);
    }

    #[tokio::test]
    async fn test_pipe_reports_bytes_per_input() {
        let mut t = LineTransform::new(upper);
        let mut sink = Vec::new();

        let first = t.pipe(&b"a\nb"[..], &mut sink).await.unwrap();
        let second = t.pipe(&b"\ncc\n"[..], &mut sink).await.unwrap();

        assert_eq!(first, 4);
        assert_eq!(second, 3);
        assert_eq!(String::from_utf8(sink).unwrap(), "A\nB\nCC\n");
        assert_eq!(t.current_size(), 7);
    }
}
