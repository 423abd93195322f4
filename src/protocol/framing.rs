use once_cell::sync::Lazy;
use regex::Regex;

/// ANSI colour sequences as ESP32 log output emits them. The ESC byte may be
/// missing when a sequence was split across two serial chunks, so the leading
/// `\x1b` is optional.
static ANSI_SEQUENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b?\[[0-9]+(?:;[0-9]+)*m").expect("ANSI pattern is valid"));

/// Remove ANSI colour escape sequences from a line.
pub fn strip_ansi(text: &str) -> String {
    ANSI_SEQUENCE.replace_all(text, "").into_owned()
}

/// Reassembles newline-delimited text lines out of arbitrarily chunked serial
/// reads. The trailing partial line is carried over to the next `feed` call,
/// so the produced line sequence does not depend on where the transport
/// happened to split the byte stream.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one raw chunk and return every line completed by it, trimmed
    /// and with ANSI sequences removed. Lines that are empty after cleanup
    /// are dropped.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let trimmed = text.trim();
            if trimmed.is_empty() {
                continue;
            }
            let clean = strip_ansi(trimmed);
            let clean = clean.trim();
            if !clean.is_empty() {
                lines.push(clean.to_string());
            }
        }
        lines
    }
}
