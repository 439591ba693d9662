use std::io::{Cursor, Read};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::mode::OpenMode;
use crate::text::{LineSplitter, TextDecoder, TextEncoding};
use crate::{Error, Result};

#[derive(Debug, Default)]
struct TextVarState {
    lines: Vec<String>,
    locked: bool,
}

/// A runtime variable holding a character vector, bindable as the target
/// of a write-mode text connection.
///
/// While a connection writes to it the binding is locked: the connection
/// appends each line as it completes and nothing else may reassign it.
#[derive(Debug, Clone, Default)]
pub struct TextVariable {
    name: Option<String>,
    state: Arc<Mutex<TextVarState>>,
}

impl TextVariable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            state: Arc::default(),
        }
    }

    /// Target for `textConnection(NULL, "w")`.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn state(&self) -> MutexGuard<'_, TextVarState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn lines(&self) -> Vec<String> {
        self.state().lines.clone()
    }

    pub fn is_locked(&self) -> bool {
        self.state().locked
    }

    /// Replace the value, as an assignment from the runtime would.
    pub fn assign(&self, lines: Vec<String>) -> Result<()> {
        let mut state = self.state();
        if state.locked {
            return Err(Error::State("cannot change value of locked binding"));
        }
        state.lines = lines;
        Ok(())
    }

    pub fn ptr_eq(&self, other: &TextVariable) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    fn bind(&self, truncate: bool) -> Result<()> {
        let mut state = self.state();
        if state.locked {
            return Err(Error::State("text variable is already bound to an open connection"));
        }
        state.locked = true;
        if truncate {
            state.lines.clear();
        }
        Ok(())
    }

    fn unbind(&self) {
        self.state().locked = false;
    }

    fn append(&self, lines: Vec<String>) {
        if !lines.is_empty() {
            self.state().lines.extend(lines);
        }
    }
}

/// Reads a fixed sequence of lines, each followed by `\n`.
pub struct TextReadDelegate {
    data: Cursor<Vec<u8>>,
}

impl TextReadDelegate {
    pub fn new(lines: &[String]) -> Self {
        let mut data = Vec::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
        for line in lines {
            data.extend_from_slice(line.as_bytes());
            data.push(b'\n');
        }
        Self {
            data: Cursor::new(data),
        }
    }
}

impl super::TransportDelegate for TextReadDelegate {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.data.read(buf)?)
    }

    fn write(&mut self, _buf: &[u8]) -> Result<usize> {
        Err(Error::State("cannot write to this connection"))
    }

    fn can_write(&self) -> bool {
        false
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Appends completed lines to a [`TextVariable`]; the trailing incomplete
/// line is flushed on close.
pub struct TextWriteDelegate {
    target: TextVariable,
    decoder: TextDecoder,
    splitter: LineSplitter,
    bound: bool,
}

impl TextWriteDelegate {
    pub fn open(target: TextVariable, mode: OpenMode) -> Result<Self> {
        if mode.can_read() {
            return Err(Error::Unsupported("text connections open for writing cannot be read"));
        }
        target.bind(mode.truncates())?;
        Ok(Self {
            target,
            decoder: TextEncoding::utf8().decoder(),
            splitter: LineSplitter::new(),
            bound: true,
        })
    }

    fn release(&mut self) {
        if self.bound {
            self.bound = false;
            self.target.unbind();
        }
    }
}

impl super::TransportDelegate for TextWriteDelegate {
    fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Err(Error::State("cannot read from this connection"))
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let text = self.decoder.decode(buf, false);
        self.target.append(self.splitter.push(&text));
        Ok(buf.len())
    }

    fn can_read(&self) -> bool {
        false
    }

    fn close(&mut self) -> Result<()> {
        let tail = self.decoder.decode(&[], true);
        let mut lines = self.splitter.push(&tail);
        lines.extend(self.splitter.finish());
        self.target.append(lines);
        self.release();
        Ok(())
    }
}

impl Drop for TextWriteDelegate {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportDelegate;

    #[test]
    fn lines_append_as_they_complete() {
        let var = TextVariable::new("out");
        let mut text = TextWriteDelegate::open(var.clone(), OpenMode::Write).unwrap();
        text.write(b"one\ntw").unwrap();
        assert_eq!(var.lines(), vec!["one"]);
        text.write(b"o\nthree").unwrap();
        assert_eq!(var.lines(), vec!["one", "two"]);
        text.close().unwrap();
        assert_eq!(var.lines(), vec!["one", "two", "three"]);
    }

    #[test]
    fn binding_locked_while_open() {
        let var = TextVariable::new("locked");
        let text = TextWriteDelegate::open(var.clone(), OpenMode::Append).unwrap();
        assert!(var.is_locked());
        assert!(var.assign(vec!["x".into()]).is_err());
        assert!(TextWriteDelegate::open(var.clone(), OpenMode::Write).is_err());
        drop(text);
        assert!(!var.is_locked());
        var.assign(vec!["x".into()]).unwrap();
    }

    #[test]
    fn write_truncates_append_keeps() {
        let var = TextVariable::new("v");
        var.assign(vec!["old".into()]).unwrap();
        let mut text = TextWriteDelegate::open(var.clone(), OpenMode::Append).unwrap();
        text.write(b"new\n").unwrap();
        text.close().unwrap();
        assert_eq!(var.lines(), vec!["old", "new"]);

        let mut text = TextWriteDelegate::open(var.clone(), OpenMode::Write).unwrap();
        text.close().unwrap();
        assert!(var.lines().is_empty());
    }

    #[test]
    fn reader_serves_terminated_lines() {
        let mut text = TextReadDelegate::new(&["a".to_string(), "b".to_string()]);
        let mut buf = [0u8; 8];
        let n = text.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"a\nb\n");
    }
}
