//! Seek bookkeeping.
//!
//! `DualOffset` multiplexes independent logical read and write positions onto
//! the single physical cursor of a file handle. The physical cursor moves only
//! when the operation kind changes.

use std::io::{self, Seek, SeekFrom};

use log::trace;

use crate::mode::{RwMode, SeekMode};

/// Apply `mode`/`offset` to `current`, returning the new absolute position.
pub fn seek_target(current: u64, end: impl FnOnce() -> io::Result<u64>, offset: i64, mode: SeekMode) -> io::Result<u64> {
    let base = match mode {
        SeekMode::Enquire => return Ok(current),
        SeekMode::Start => 0,
        SeekMode::Current => current,
        SeekMode::End => end()?,
    };
    let target = i64::try_from(base)
        .ok()
        .and_then(|base| base.checked_add(offset))
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek offset out of range"))?;
    u64::try_from(target).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, "seek before start of stream")
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DualOffset {
    read: u64,
    write: u64,
    /// Operation the physical cursor currently serves; `None` forces a reposition.
    last: Option<RwMode>,
}

impl DualOffset {
    pub fn new(read: u64, write: u64) -> Self {
        Self {
            read,
            write,
            last: None,
        }
    }

    pub fn read_offset(&self) -> u64 {
        self.read
    }

    pub fn write_offset(&self) -> u64 {
        self.write
    }

    /// `Last` resolves to the most recent operation, reading when there is none.
    pub fn resolve(&self, rw: RwMode) -> RwMode {
        match rw {
            RwMode::Last => self.last.unwrap_or(RwMode::Read),
            other => other,
        }
    }

    pub fn offset(&self, rw: RwMode) -> u64 {
        match self.resolve(rw) {
            RwMode::Write => self.write,
            _ => self.read,
        }
    }

    pub fn before_read<S: Seek>(&mut self, stream: &mut S) -> io::Result<()> {
        if self.last != Some(RwMode::Read) {
            trace!("repositioning to read offset {}", self.read);
            stream.seek(SeekFrom::Start(self.read))?;
            self.last = Some(RwMode::Read);
        }
        Ok(())
    }

    pub fn after_read(&mut self, consumed: usize) {
        self.read += consumed as u64;
    }

    pub fn before_write<S: Seek>(&mut self, stream: &mut S) -> io::Result<()> {
        if self.last != Some(RwMode::Write) {
            trace!("repositioning to write offset {}", self.write);
            stream.seek(SeekFrom::Start(self.write))?;
            self.last = Some(RwMode::Write);
        }
        Ok(())
    }

    pub fn after_write<S: Seek>(&mut self, stream: &mut S) -> io::Result<()> {
        self.write = stream.stream_position()?;
        Ok(())
    }

    /// Move one logical cursor, returning its previous position.
    pub fn seek<S: Seek>(
        &mut self,
        stream: &mut S,
        offset: i64,
        mode: SeekMode,
        rw: RwMode,
    ) -> io::Result<u64> {
        let which = self.resolve(rw);
        let previous = self.offset(which);
        if mode == SeekMode::Enquire {
            return Ok(previous);
        }
        let target = seek_target(previous, || stream.seek(SeekFrom::End(0)), offset, mode)?;
        match which {
            RwMode::Write => self.write = target,
            _ => self.read = target,
        }
        self.last = None;
        Ok(previous)
    }
}
