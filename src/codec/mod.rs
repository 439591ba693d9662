//! Compression layer for connections.
//!
//! Sniffs a compression format from leading bytes and builds matching
//! stream wrappers.
//!
//! # Key Components
//!
//! - `detect`: magic-number classification (`Compression`)
//! - `reader`: `DecompressReader`, a `Read` over any supported format
//! - `writer`: `CompressWriter`, a `Write` producing any supported format
//!
//! Input trusts the file content over the caller's claimed format unless raw
//! reading was requested; output always uses the requested format. Bzip2 is
//! handled whole-payload: the reader inflates the entire source up front and
//! the writer compresses its buffered payload on `finish`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use connections::codec::{compress_bytes, decompress_bytes, Compression};
//!
//! let packed = compress_bytes(Compression::Gzip, b"hello", 6)?;
//! let (found, plain) = decompress_bytes(&packed)?;
//! assert_eq!(found, Compression::Gzip);
//! ```

mod detect;
mod reader;
mod writer;

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

pub use detect::{Compression, SNIFF_LEN};
pub use reader::DecompressReader;
pub use writer::CompressWriter;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("unknown compression type '{0}'")]
    UnknownType(String),
    #[error("{codec} stream failed: {source}")]
    Stream {
        codec: Compression,
        #[source]
        source: io::Error,
    },
    #[error("lzma setup failed: {0}")]
    Lzma(#[from] xz2::stream::Error),
}

impl CodecError {
    pub(crate) fn stream(codec: Compression, source: io::Error) -> Self {
        CodecError::Stream { codec, source }
    }
}

/// Classify a file by its leading bytes. Missing or short files read as `None`.
pub fn sniff_file(path: &Path) -> io::Result<Compression> {
    let mut file = File::open(path)?;
    let mut header = [0u8; SNIFF_LEN];
    let mut filled = 0;
    while filled < header.len() {
        let n = file.read(&mut header[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(Compression::detect(&header[..filled]))
}

/// Format actually used when reading: the content wins unless `raw` is set.
pub fn resolve_input(claimed: Compression, sniffed: Compression, raw: bool) -> Compression {
    if raw {
        claimed
    } else {
        sniffed
    }
}

pub fn compress_bytes(
    compression: Compression,
    data: &[u8],
    level: u32,
) -> Result<Vec<u8>, CodecError> {
    let mut writer = CompressWriter::new(Vec::new(), compression, level)?;
    writer
        .write_all(data)
        .map_err(|e| CodecError::stream(compression, e))?;
    writer.finish()
}

/// Decompress an in-memory payload, sniffing its format.
pub fn decompress_bytes(data: &[u8]) -> Result<(Compression, Vec<u8>), CodecError> {
    let compression = Compression::detect(data);
    let mut reader = DecompressReader::new(data, compression)?;
    let mut out = Vec::new();
    reader
        .read_to_end(&mut out)
        .map_err(|e| CodecError::stream(compression, e))?;
    Ok((compression, out))
}
