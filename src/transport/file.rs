use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;

use crate::connection::{seek_target, DualOffset};
use crate::mode::{OpenMode, RwMode, SeekMode};
use crate::Result;

use super::TransportDelegate;

/// Plain file. Read-write modes keep separate read and write cursors over
/// the one OS file offset.
pub struct FileDelegate {
    file: File,
    offsets: Option<DualOffset>,
}

impl FileDelegate {
    pub fn open(path: &Path, mode: OpenMode) -> Result<Self> {
        let mut options = OpenOptions::new();
        if mode.can_read() {
            options.read(true);
        }
        if mode.can_write() {
            if mode.is_append() {
                options.append(true).create(true);
            } else if mode.truncates() {
                options.write(true).create(true).truncate(true);
            } else {
                options.write(true);
            }
        }
        let file = options.open(path)?;
        let offsets = if mode.is_read_write() {
            let write = if mode.is_append() {
                file.metadata()?.len()
            } else {
                0
            };
            Some(DualOffset::new(0, write))
        } else {
            None
        };
        Ok(Self { file, offsets })
    }

    fn position(&mut self) -> Result<u64> {
        Ok(self.file.stream_position()?)
    }
}

impl TransportDelegate for FileDelegate {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if let Some(offsets) = self.offsets.as_mut() {
            offsets.before_read(&mut self.file)?;
            let n = self.file.read(buf)?;
            offsets.after_read(n);
            return Ok(n);
        }
        Ok(self.file.read(buf)?)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if let Some(offsets) = self.offsets.as_mut() {
            offsets.before_write(&mut self.file)?;
            let n = self.file.write(buf)?;
            offsets.after_write(&mut self.file)?;
            return Ok(n);
        }
        Ok(self.file.write(buf)?)
    }

    fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn seek(&mut self, offset: i64, mode: SeekMode, rw: RwMode) -> Result<u64> {
        if let Some(offsets) = self.offsets.as_mut() {
            return Ok(offsets.seek(&mut self.file, offset, mode, rw)?);
        }
        let previous = self.position()?;
        let file = &mut self.file;
        let target = seek_target(previous, || file.seek(SeekFrom::End(0)), offset, mode)?;
        self.file.seek(SeekFrom::Start(target))?;
        Ok(previous)
    }

    fn truncate(&mut self) -> Result<()> {
        let at = match self.offsets.as_ref() {
            Some(offsets) => offsets.write_offset(),
            None => self.position()?,
        };
        self.file.set_len(at)?;
        Ok(())
    }

    fn channel(&self) -> Option<RawFd> {
        Some(self.file.as_raw_fd())
    }

    fn close(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_mode_starts_write_cursor_at_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        std::fs::write(&path, b"abc").unwrap();

        let mut file = FileDelegate::open(&path, OpenMode::ReadAppend).unwrap();
        assert_eq!(file.seek(0, SeekMode::Enquire, RwMode::Write).unwrap(), 3);
        file.write(b"def").unwrap();

        let mut buf = [0u8; 6];
        let n = file.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"abcdef");
    }

    #[test]
    fn truncate_at_current_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.bin");
        let mut file = FileDelegate::open(&path, OpenMode::WriteBinary).unwrap();
        file.write(b"0123456789").unwrap();
        assert_eq!(file.seek(4, SeekMode::Start, RwMode::Last).unwrap(), 10);
        file.truncate().unwrap();
        file.close().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"0123");
    }

    #[test]
    fn missing_file_fails_for_read() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileDelegate::open(&dir.path().join("absent"), OpenMode::Read).is_err());
    }
}
