use std::io::{self, Write};

use xz2::stream::{LzmaOptions, Stream};
use xz2::write::XzEncoder;

use super::{CodecError, Compression};

/// Unified compression writer.
///
/// Must be finished with [`CompressWriter::finish`] to emit trailers; a
/// dropped writer leaves a truncated stream behind (bzip2 writes nothing at
/// all until finished).
pub enum CompressWriter<W: Write> {
    None(W),
    Gzip(flate2::write::GzEncoder<W>),
    Bzip2 { inner: W, buffer: Vec<u8>, level: u32 },
    Xz(XzEncoder<W>),
    Lzma(XzEncoder<W>),
    Zstd(zstd::Encoder<'static, W>),
}

impl<W: Write> CompressWriter<W> {
    pub fn new(inner: W, compression: Compression, level: u32) -> Result<Self, CodecError> {
        let level = level.clamp(1, 9);
        let writer = match compression {
            Compression::None => CompressWriter::None(inner),
            Compression::Gzip => CompressWriter::Gzip(flate2::write::GzEncoder::new(
                inner,
                flate2::Compression::new(level),
            )),
            Compression::Bzip2 => CompressWriter::Bzip2 {
                inner,
                buffer: Vec::new(),
                level,
            },
            Compression::Xz => CompressWriter::Xz(XzEncoder::new(inner, level)),
            Compression::Lzma => {
                let options = LzmaOptions::new_preset(level)?;
                let stream = Stream::new_lzma_encoder(&options)?;
                CompressWriter::Lzma(XzEncoder::new_stream(inner, stream))
            }
            Compression::Zstd => CompressWriter::Zstd(
                zstd::Encoder::new(inner, level as i32)
                    .map_err(|e| CodecError::stream(compression, e))?,
            ),
        };
        Ok(writer)
    }

    pub fn compression(&self) -> Compression {
        match self {
            CompressWriter::None(_) => Compression::None,
            CompressWriter::Gzip(_) => Compression::Gzip,
            CompressWriter::Bzip2 { .. } => Compression::Bzip2,
            CompressWriter::Xz(_) => Compression::Xz,
            CompressWriter::Lzma(_) => Compression::Lzma,
            CompressWriter::Zstd(_) => Compression::Zstd,
        }
    }

    pub fn get_ref(&self) -> &W {
        match self {
            CompressWriter::None(w) => w,
            CompressWriter::Gzip(w) => w.get_ref(),
            CompressWriter::Bzip2 { inner, .. } => inner,
            CompressWriter::Xz(w) | CompressWriter::Lzma(w) => w.get_ref(),
            CompressWriter::Zstd(w) => w.get_ref(),
        }
    }

    pub fn get_mut(&mut self) -> &mut W {
        match self {
            CompressWriter::None(w) => w,
            CompressWriter::Gzip(w) => w.get_mut(),
            CompressWriter::Bzip2 { inner, .. } => inner,
            CompressWriter::Xz(w) | CompressWriter::Lzma(w) => w.get_mut(),
            CompressWriter::Zstd(w) => w.get_mut(),
        }
    }

    /// Write trailers and hand back the inner writer.
    pub fn finish(self) -> Result<W, CodecError> {
        let compression = self.compression();
        let wrap = |e| CodecError::stream(compression, e);
        let mut inner = match self {
            CompressWriter::None(w) => w,
            CompressWriter::Gzip(w) => w.finish().map_err(wrap)?,
            CompressWriter::Bzip2 {
                mut inner,
                buffer,
                level,
            } => {
                let mut encoder =
                    bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::new(level));
                encoder.write_all(&buffer).map_err(wrap)?;
                let packed = encoder.finish().map_err(wrap)?;
                inner.write_all(&packed).map_err(wrap)?;
                inner
            }
            CompressWriter::Xz(w) | CompressWriter::Lzma(w) => w.finish().map_err(wrap)?,
            CompressWriter::Zstd(w) => w.finish().map_err(wrap)?,
        };
        inner.flush().map_err(wrap)?;
        Ok(inner)
    }
}

impl<W: Write> Write for CompressWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            CompressWriter::None(w) => w.write(buf),
            CompressWriter::Gzip(w) => w.write(buf),
            CompressWriter::Bzip2 { buffer, .. } => {
                buffer.extend_from_slice(buf);
                Ok(buf.len())
            }
            CompressWriter::Xz(w) | CompressWriter::Lzma(w) => w.write(buf),
            CompressWriter::Zstd(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            CompressWriter::None(w) => w.flush(),
            CompressWriter::Gzip(w) => w.flush(),
            // Nothing is emitted before finish.
            CompressWriter::Bzip2 { .. } => Ok(()),
            CompressWriter::Xz(w) | CompressWriter::Lzma(w) => w.flush(),
            CompressWriter::Zstd(w) => w.flush(),
        }
    }
}
