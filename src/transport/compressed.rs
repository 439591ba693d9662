use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use log::debug;

use crate::codec::{resolve_input, sniff_file, CompressWriter, Compression, DecompressReader};
use crate::connection::seek_target;
use crate::mode::{OpenMode, RwMode, SeekMode};
use crate::{Error, Result};

use super::TransportDelegate;

enum Stream {
    Reader(DecompressReader<BufReader<File>>),
    Writer(CompressWriter<BufWriter<File>>),
}

/// gzip/bzip2/xz/zstd file. Reading trusts the file's magic bytes over the
/// declared codec; writing always uses the declared codec.
///
/// Readers support forward seeks by skipping and backward seeks by
/// reopening; writers only report their position.
pub struct CompressedFileDelegate {
    path: PathBuf,
    compression: Compression,
    stream: Option<Stream>,
    /// Uncompressed bytes consumed or produced so far.
    position: u64,
}

impl CompressedFileDelegate {
    pub fn open(
        path: &Path,
        mode: OpenMode,
        declared: Compression,
        raw: bool,
        level: u32,
    ) -> Result<Self> {
        if mode.is_read_write() {
            return Err(Error::Unsupported(
                "compressed files cannot be opened for both reading and writing",
            ));
        }
        let (stream, compression) = if mode.can_read() {
            let compression = resolve_input(declared, sniff_file(path)?, raw);
            (open_reader(path, compression)?, compression)
        } else {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .append(mode.is_append())
                .truncate(!mode.is_append())
                .open(path)?;
            let writer = CompressWriter::new(BufWriter::new(file), declared, level)?;
            (Stream::Writer(writer), declared)
        };
        debug!("{} opened as {compression}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            compression,
            stream: Some(stream),
            position: 0,
        })
    }

    fn stream(&mut self) -> Result<&mut Stream> {
        self.stream
            .as_mut()
            .ok_or(Error::State("compressed stream already finished"))
    }

    fn skip(&mut self, count: u64) -> Result<()> {
        let Stream::Reader(reader) = self.stream()? else {
            return Err(Error::UnseekableConnection);
        };
        let skipped = io::copy(&mut reader.by_ref().take(count), &mut io::sink())?;
        self.position += skipped;
        Ok(())
    }
}

fn open_reader(path: &Path, compression: Compression) -> Result<Stream> {
    let file = BufReader::new(File::open(path)?);
    Ok(Stream::Reader(DecompressReader::new(file, compression)?))
}

impl TransportDelegate for CompressedFileDelegate {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = match self.stream()? {
            Stream::Reader(reader) => reader.read(buf)?,
            Stream::Writer(_) => return Err(Error::State("cannot read from this connection")),
        };
        self.position += n as u64;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let n = match self.stream()? {
            Stream::Writer(writer) => writer.write(buf)?,
            Stream::Reader(_) => return Err(Error::State("cannot write to this connection")),
        };
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> Result<()> {
        if let Stream::Writer(writer) = self.stream()? {
            writer.flush()?;
        }
        Ok(())
    }

    fn is_seekable(&self) -> bool {
        matches!(self.stream, Some(Stream::Reader(_)))
    }

    fn seek(&mut self, offset: i64, mode: SeekMode, _rw: RwMode) -> Result<u64> {
        let previous = self.position;
        if mode == SeekMode::Enquire {
            return Ok(previous);
        }
        if !self.is_seekable() {
            return Err(Error::UnseekableConnection);
        }
        if mode == SeekMode::End {
            return Err(Error::Unsupported("cannot seek from the end of a compressed file"));
        }
        let target = seek_target(previous, || Ok(0), offset, mode)?;
        if target < self.position {
            self.stream = Some(open_reader(&self.path, self.compression)?);
            self.position = 0;
        }
        self.skip(target - self.position)?;
        Ok(previous)
    }

    fn channel(&self) -> Option<RawFd> {
        match self.stream.as_ref()? {
            Stream::Writer(writer) => Some(writer.get_ref().get_ref().as_raw_fd()),
            Stream::Reader(_) => None,
        }
    }

    fn compression(&self) -> Compression {
        self.compression
    }

    fn close(&mut self) -> Result<()> {
        if let Some(Stream::Writer(writer)) = self.stream.take() {
            writer.finish()?;
        }
        Ok(())
    }
}
