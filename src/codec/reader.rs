use std::io::{self, BufReader, Cursor, Read};

use bzip2::read::MultiBzDecoder;
use flate2::read::MultiGzDecoder;
use xz2::read::XzDecoder;
use xz2::stream::Stream;

use super::{CodecError, Compression};

/// Unified decompression reader.
///
/// Enum dispatch over the supported formats; `Read` delegates to the inner
/// decoder. Multi-member gzip and bzip2 files and multi-stream xz files are
/// read through to the end, so appended members are not lost.
pub enum DecompressReader<R: Read> {
    None(R),
    Gzip(MultiGzDecoder<R>),
    /// Whole payload inflated on construction.
    Bzip2(Cursor<Vec<u8>>),
    Xz(XzDecoder<R>),
    Lzma(XzDecoder<R>),
    Zstd(zstd::Decoder<'static, BufReader<R>>),
}

impl<R: Read> DecompressReader<R> {
    pub fn new(mut source: R, compression: Compression) -> Result<Self, CodecError> {
        let reader = match compression {
            Compression::None => DecompressReader::None(source),
            Compression::Gzip => DecompressReader::Gzip(MultiGzDecoder::new(source)),
            Compression::Bzip2 => {
                let mut packed = Vec::new();
                source
                    .read_to_end(&mut packed)
                    .map_err(|e| CodecError::stream(compression, e))?;
                let mut plain = Vec::new();
                MultiBzDecoder::new(&packed[..])
                    .read_to_end(&mut plain)
                    .map_err(|e| CodecError::stream(compression, e))?;
                DecompressReader::Bzip2(Cursor::new(plain))
            }
            Compression::Xz => DecompressReader::Xz(XzDecoder::new_multi_decoder(source)),
            Compression::Lzma => {
                let stream = Stream::new_lzma_decoder(u64::MAX)?;
                DecompressReader::Lzma(XzDecoder::new_stream(source, stream))
            }
            Compression::Zstd => DecompressReader::Zstd(
                zstd::Decoder::new(source).map_err(|e| CodecError::stream(compression, e))?,
            ),
        };
        Ok(reader)
    }

    pub fn compression(&self) -> Compression {
        match self {
            DecompressReader::None(_) => Compression::None,
            DecompressReader::Gzip(_) => Compression::Gzip,
            DecompressReader::Bzip2(_) => Compression::Bzip2,
            DecompressReader::Xz(_) => Compression::Xz,
            DecompressReader::Lzma(_) => Compression::Lzma,
            DecompressReader::Zstd(_) => Compression::Zstd,
        }
    }
}

impl<R: Read> Read for DecompressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            DecompressReader::None(r) => r.read(buf),
            DecompressReader::Gzip(r) => r.read(buf),
            DecompressReader::Bzip2(r) => r.read(buf),
            DecompressReader::Xz(r) => r.read(buf),
            DecompressReader::Lzma(r) => r.read(buf),
            DecompressReader::Zstd(r) => r.read(buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::compress_bytes;

    #[test]
    fn concatenated_gzip_members_decode_fully() {
        let mut packed = compress_bytes(Compression::Gzip, b"first\n", 6).unwrap();
        packed.extend(compress_bytes(Compression::Gzip, b"second\n", 6).unwrap());

        let mut reader = DecompressReader::new(&packed[..], Compression::Gzip).unwrap();
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "first\nsecond\n");
    }

    #[test]
    fn corrupt_bzip2_fails_at_construction() {
        let err = DecompressReader::new(&b"BZh9 not really"[..], Compression::Bzip2);
        assert!(matches!(err, Err(CodecError::Stream { codec: Compression::Bzip2, .. })));
    }
}
