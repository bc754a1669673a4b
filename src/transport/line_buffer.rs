// src/transport/line_buffer.rs
//! Splits a byte stream into newline terminated lines

use log::warn;

/// Unterminated data above this size is trimmed.
pub const MAX_PENDING: usize = 200_000;
/// How much of the newest unterminated data survives a trim.
pub const KEEP_PENDING: usize = 50_000;

#[derive(Debug, Clone)]
pub struct LineBuffer {
    pending: Vec<u8>,
    max: usize,
    keep: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_limits(MAX_PENDING, KEEP_PENDING)
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(max: usize, keep: usize) -> Self {
        Self {
            pending: Vec::new(),
            max,
            keep: keep.min(max),
        }
    }

    /// Append a chunk and return every complete, non-empty line (trimmed).
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(idx) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=idx).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }

        if self.pending.len() > self.max {
            warn!(
                "Discarding {} bytes of unterminated input",
                self.pending.len() - self.keep
            );
            let cut = self.pending.len() - self.keep;
            self.pending.drain(..cut);
        }

        lines
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
