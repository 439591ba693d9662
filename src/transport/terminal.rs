use std::io::Read;
use std::sync::Arc;

use crate::diversion::Diversions;
use crate::{Error, Result};

use super::TransportDelegate;

/// The three process streams installed at descriptors 0, 1 and 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdStream {
    Stdin,
    Stdout,
    Stderr,
}

impl StdStream {
    pub const ALL: [StdStream; 3] = [StdStream::Stdin, StdStream::Stdout, StdStream::Stderr];

    pub fn descriptor(self) -> usize {
        match self {
            StdStream::Stdin => 0,
            StdStream::Stdout => 1,
            StdStream::Stderr => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            StdStream::Stdin => "stdin",
            StdStream::Stdout => "stdout",
            StdStream::Stderr => "stderr",
        }
    }

    pub fn mode(self) -> &'static str {
        match self {
            StdStream::Stdin => "r",
            StdStream::Stdout | StdStream::Stderr => "w",
        }
    }
}

/// Standard stream connection. Output goes through the diversion stack so
/// `sink()` redirection applies to writes on descriptors 1 and 2.
pub struct TerminalDelegate {
    stream: StdStream,
    diversions: Arc<Diversions>,
}

impl TerminalDelegate {
    pub fn new(stream: StdStream, diversions: Arc<Diversions>) -> Self {
        Self { stream, diversions }
    }
}

impl TransportDelegate for TerminalDelegate {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.stream {
            StdStream::Stdin => Ok(std::io::stdin().lock().read(buf)?),
            _ => Err(Error::State("cannot read from this connection")),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        match self.stream {
            StdStream::Stdout => self.diversions.write_stdout(buf)?,
            StdStream::Stderr => self.diversions.write_stderr(buf)?,
            StdStream::Stdin => return Err(Error::State("cannot write to this connection")),
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<()> {
        self.diversions.flush_console()
    }

    fn can_read(&self) -> bool {
        self.stream == StdStream::Stdin
    }

    fn can_write(&self) -> bool {
        self.stream != StdStream::Stdin
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
