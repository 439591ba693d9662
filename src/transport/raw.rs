use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use crate::connection::seek_target;
use crate::mode::{OpenMode, RwMode, SeekMode};
use crate::Result;

use super::TransportDelegate;

/// Resizable in-memory byte buffer with a single cursor.
pub struct RawDelegate {
    buffer: Cursor<Vec<u8>>,
}

impl RawDelegate {
    pub fn open(initial: &[u8], mode: OpenMode) -> Self {
        let bytes = if mode.truncates() {
            Vec::new()
        } else {
            initial.to_vec()
        };
        let mut buffer = Cursor::new(bytes);
        if mode.is_append() {
            let end = buffer.get_ref().len() as u64;
            buffer.set_position(end);
        }
        Self { buffer }
    }
}

impl TransportDelegate for RawDelegate {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.buffer.read(buf)?)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        Ok(self.buffer.write(buf)?)
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn seek(&mut self, offset: i64, mode: SeekMode, _rw: RwMode) -> Result<u64> {
        let previous = self.buffer.position();
        let len = self.buffer.get_ref().len() as u64;
        let target = seek_target(previous, || Ok(len), offset, mode)?;
        self.buffer.seek(SeekFrom::Start(target))?;
        Ok(previous)
    }

    fn truncate(&mut self) -> Result<()> {
        let at = self.buffer.position() as usize;
        self.buffer.get_mut().truncate(at);
        Ok(())
    }

    fn raw_value(&self) -> Option<Vec<u8>> {
        Some(self.buffer.get_ref().clone())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_keeps_initial_bytes() {
        let mut raw = RawDelegate::open(b"abc", OpenMode::AppendBinary);
        raw.write(b"def").unwrap();
        assert_eq!(raw.raw_value().unwrap(), b"abcdef");
    }

    #[test]
    fn write_mode_discards_initial_bytes() {
        let mut raw = RawDelegate::open(b"abc", OpenMode::WriteBinary);
        raw.write(b"z").unwrap();
        assert_eq!(raw.raw_value().unwrap(), b"z");
    }

    #[test]
    fn seek_and_truncate() {
        let mut raw = RawDelegate::open(b"0123456789", OpenMode::ReadWriteBinary);
        assert_eq!(raw.seek(-3, SeekMode::End, RwMode::Last).unwrap(), 0);
        let mut buf = [0u8; 3];
        raw.read(&mut buf).unwrap();
        assert_eq!(&buf, b"789");
        raw.seek(5, SeekMode::Start, RwMode::Last).unwrap();
        raw.truncate().unwrap();
        assert_eq!(raw.raw_value().unwrap(), b"01234");
    }
}
