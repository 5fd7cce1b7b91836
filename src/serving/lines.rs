//! SSE line reassembly.
//!
//! Network chunks arrive at arbitrary boundaries: mid-line, mid-JSON and even
//! mid-UTF-8 sequence. [`LineBuffer`] keeps raw bytes until a `\n` is seen so
//! that every emitted line is complete.

/// Literal payload that marks the end of an SSE stream.
pub const DONE_MARKER: &str = "[DONE]";

/// Byte accumulator that yields complete lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every complete line it finishes.
    ///
    /// The trailing partial line stays buffered for the next chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let raw = self.buf.drain(..=pos).collect::<Vec<_>>();
            lines.push(decode_line(&raw[..raw.len() - 1]));
        }
        lines
    }

    /// Flush the unterminated remainder at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.buf);
        Some(decode_line(&raw))
    }

    /// Number of buffered bytes not yet emitted.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// Extract the payload of a `data:` line.
///
/// Blank lines, comments, other SSE fields and the `[DONE]` marker yield `None`.
pub fn sse_payload(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return None;
    }

    let data = line.strip_prefix("data:")?.trim();
    if data.is_empty() || data == DONE_MARKER {
        return None;
    }
    Some(data)
}
