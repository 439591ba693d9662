//! Line splitting.
//!
//! `\n`, `\r` and `\r\n` all terminate a line. A lone `\r` at the very end of
//! the input terminates the last line and does not open a new (empty) one,
//! while `\r\r` inside the input yields an empty line.

/// Where the next line terminator sits in `text`, and how many bytes it spans.
pub fn find_terminator(text: &str) -> Option<(usize, usize)> {
    let bytes = text.as_bytes();
    let pos = bytes.iter().position(|&b| b == b'\n' || b == b'\r')?;
    let width = if bytes[pos] == b'\r' && bytes.get(pos + 1) == Some(&b'\n') {
        2
    } else {
        1
    };
    Some((pos, width))
}

pub fn split_lines(text: &str) -> Vec<String> {
    let mut splitter = LineSplitter::new();
    let mut lines = splitter.push(text);
    lines.extend(splitter.finish());
    lines
}

/// Incremental splitter for text that arrives in chunks.
///
/// A `\r` that ends a chunk completes its line immediately; a `\n` opening
/// the next chunk is then swallowed so `\r\n` split across chunks still
/// counts as one terminator.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: String,
    skip_lf: bool,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &str) {
        let mut chunk = chunk;
        if self.skip_lf && !chunk.is_empty() {
            self.skip_lf = false;
            if let Some(rest) = chunk.strip_prefix('\n') {
                chunk = rest;
            }
        }
        self.pending.push_str(chunk);
    }

    /// Take the next complete line, if the buffered text holds one.
    pub fn next_line(&mut self) -> Option<String> {
        let (pos, width) = find_terminator(&self.pending)?;
        let line = self.pending[..pos].to_string();
        let consumed = pos + width;
        if width == 1 && self.pending.as_bytes()[pos] == b'\r' && consumed == self.pending.len() {
            self.skip_lf = true;
        }
        self.pending.drain(..consumed);
        Some(line)
    }

    /// Feed a chunk and collect every line it completes.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.feed(chunk);
        std::iter::from_fn(|| self.next_line()).collect()
    }

    /// Text of the unterminated final line.
    pub fn pending(&self) -> &str {
        &self.pending
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Whether a complete line is buffered and ready to be taken.
    pub fn has_line(&self) -> bool {
        find_terminator(&self.pending).is_some()
    }

    /// Take the unterminated final line, if any.
    pub fn finish(&mut self) -> Option<String> {
        self.skip_lf = false;
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.skip_lf = false;
    }
}
