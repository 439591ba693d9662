use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;
use std::process::Command;

use log::debug;

use crate::mode::OpenMode;
use crate::select::set_nonblocking;
use crate::{Error, Result};

use super::TransportDelegate;

/// Create the named pipe at `path` with the external `program` unless
/// something already exists there. An "already exists" failure is success.
pub fn ensure_fifo(path: &Path, program: &str) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    let output = Command::new(program)
        .arg(path)
        .output()
        .map_err(|e| Error::Transport(format!("cannot run '{program}': {e}")))?;
    if output.status.success() {
        debug!("created fifo {}", path.display());
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.contains("File exists") || path.exists() {
        return Ok(());
    }
    Err(Error::Transport(format!(
        "cannot create fifo '{}': {}",
        path.display(),
        stderr.trim()
    )))
}

/// Named pipe on disk.
pub struct FifoDelegate {
    file: File,
}

impl FifoDelegate {
    pub fn open(path: &Path, mode: OpenMode, blocking: bool, program: &str) -> Result<Self> {
        ensure_fifo(path, program)?;
        let mut options = OpenOptions::new();
        options.read(mode.can_read());
        if mode.can_write() {
            options.write(true).append(mode.is_append());
        }
        if !blocking {
            options.custom_flags(libc::O_NONBLOCK);
        }
        let file = options.open(path)?;
        Ok(Self { file })
    }
}

impl TransportDelegate for FifoDelegate {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.file.read(buf)?)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        Ok(self.file.write(buf)?)
    }

    fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    fn channel(&self) -> Option<RawFd> {
        Some(self.file.as_raw_fd())
    }

    fn set_blocking(&mut self, blocking: bool) -> Result<()> {
        set_nonblocking(self.file.as_raw_fd(), !blocking)
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::FileTypeExt;

    #[test]
    fn creates_fifo_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chan");
        ensure_fifo(&path, "mkfifo").unwrap();
        assert!(std::fs::metadata(&path).unwrap().file_type().is_fifo());
        ensure_fifo(&path, "mkfifo").unwrap();
    }

    #[test]
    fn read_write_fifo_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rw");
        let mut fifo = FifoDelegate::open(&path, OpenMode::ReadWriteTrunc, true, "mkfifo").unwrap();
        fifo.write(b"via fifo\n").unwrap();
        let mut buf = [0u8; 32];
        let n = fifo.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"via fifo\n");
    }

    #[test]
    fn missing_program_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = ensure_fifo(&dir.path().join("x"), "/nonexistent/mkfifo");
        assert!(matches!(err, Err(Error::Transport(_))));
    }
}
