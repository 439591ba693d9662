//! Transport delegates: the live binding between an opened connection and
//! its OS or in-process resource.
//!
//! Every transport implements [`TransportDelegate`]. A connection builds a
//! delegate through [`open_delegate`] once per open event, keyed on the
//! transport's [`TransportSpec`] and the resolved [`OpenMode`], and drops it
//! on close.

mod compressed;
mod fifo;
mod file;
mod native;
mod pipe;
mod raw;
mod socket;
mod terminal;
mod textbuf;
#[cfg(feature = "url")]
mod url;

use std::os::unix::io::RawFd;
use std::path::PathBuf;
use std::sync::Arc;

use log::debug;

use crate::codec::{sniff_file, Compression};
use crate::config::ConnectionsConfig;
use crate::diversion::Diversions;
use crate::mode::{OpenMode, RwMode, SeekMode};
use crate::{Error, Result};

pub use compressed::CompressedFileDelegate;
pub use fifo::{ensure_fifo, FifoDelegate};
pub use file::FileDelegate;
pub use native::{
    NativeCapabilitiesFn, NativeCloseFn, NativeDelegate, NativeEntryPoints, NativeHandle,
    NativeOpenFn, NativeReadFn, NativeSeekFn, NativeSpec, NativeWriteFn, NATIVE_CAN_READ,
    NATIVE_CAN_SEEK, NATIVE_CAN_WRITE,
};
pub use pipe::PipeDelegate;
pub use raw::RawDelegate;
pub use socket::{SocketDelegate, SocketSpec};
pub use terminal::{StdStream, TerminalDelegate};
pub use textbuf::{TextReadDelegate, TextVariable, TextWriteDelegate};
#[cfg(feature = "url")]
pub use self::url::UrlDelegate;

/// Raw I/O capability set of an opened transport.
///
/// Only `read`, `write` and `close` are mandatory; everything else defaults
/// to "not supported by this transport".
pub trait TransportDelegate: Send {
    /// Read up to `buf.len()` bytes; `Ok(0)` is end of stream. Non-blocking
    /// transports surface "no data yet" as an `io::ErrorKind::WouldBlock` error.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_seekable(&self) -> bool {
        false
    }

    /// Reposition and return the previous offset of the addressed cursor.
    fn seek(&mut self, _offset: i64, _mode: SeekMode, _rw: RwMode) -> Result<u64> {
        Err(Error::UnseekableConnection)
    }

    fn truncate(&mut self) -> Result<()> {
        Err(Error::Unsupported("can only truncate connections to files or raw vectors"))
    }

    /// OS-level channel backing the transport, when there is one.
    fn channel(&self) -> Option<RawFd> {
        None
    }

    /// Transport-imposed limits on top of the open mode.
    fn can_read(&self) -> bool {
        true
    }

    fn can_write(&self) -> bool {
        true
    }

    fn set_blocking(&mut self, _blocking: bool) -> Result<()> {
        Ok(())
    }

    /// Layer a compressor over the output side in place.
    fn set_compression(&mut self, _compression: Compression, _level: u32) -> Result<()> {
        Err(Error::Unsupported("compression cannot be added to this connection"))
    }

    /// Codec in effect, for transports that have one.
    fn compression(&self) -> Compression {
        Compression::None
    }

    /// Current contents of an in-memory byte buffer.
    fn raw_value(&self) -> Option<Vec<u8>> {
        None
    }

    fn close(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSpec {
    pub path: PathBuf,
    /// Codec the connection was created for; `None` for plain `file`.
    pub declared: Compression,
    /// Read bytes exactly as stored, without sniffing for compression.
    pub raw: bool,
}

#[derive(Clone)]
pub enum TextSpec {
    /// Read from a fixed sequence of lines.
    Read(Vec<String>),
    /// Append completed lines to a variable.
    Write(TextVariable),
}

/// Construction parameters of every transport kind.
#[derive(Clone)]
pub enum TransportSpec {
    File(FileSpec),
    Socket(SocketSpec),
    Pipe { command: String },
    Fifo { path: PathBuf },
    Raw { initial: Vec<u8> },
    Text(TextSpec),
    Native(NativeSpec),
    Url { address: String, compression: Compression },
    Terminal { stream: StdStream, diversions: Arc<Diversions> },
}

impl TransportSpec {
    /// Class tag reported for connections of this kind.
    pub fn class_name(&self) -> &str {
        match self {
            TransportSpec::File(spec) => match spec.declared {
                Compression::None => "file",
                Compression::Gzip => "gzfile",
                Compression::Bzip2 => "bzfile",
                Compression::Xz | Compression::Lzma => "xzfile",
                Compression::Zstd => "zstdfile",
            },
            TransportSpec::Socket(_) => "sockconn",
            TransportSpec::Pipe { .. } => "pipe",
            TransportSpec::Fifo { .. } => "fifo",
            TransportSpec::Raw { .. } => "rawConnection",
            TransportSpec::Text(_) => "textConnection",
            TransportSpec::Native(spec) => &spec.class_name,
            TransportSpec::Url { .. } => "url",
            TransportSpec::Terminal { .. } => "terminal",
        }
    }

    /// Mode used when a lazily created connection is opened on demand.
    pub fn default_mode(&self) -> &'static str {
        match self {
            TransportSpec::File(spec) if spec.declared.is_compressed() => "rb",
            TransportSpec::Socket(_) => "a+",
            TransportSpec::Raw { .. } => "rb",
            TransportSpec::Text(TextSpec::Write(_)) => "w",
            TransportSpec::Terminal { stream, .. } => stream.mode(),
            _ => "r",
        }
    }

    /// Whether connections of this kind can seek, before they are opened.
    pub fn seekable_hint(&self) -> bool {
        match self {
            TransportSpec::File(spec) => !spec.declared.is_compressed(),
            TransportSpec::Raw { .. } => true,
            _ => false,
        }
    }
}

/// Everything a delegate needs beyond its spec.
pub struct OpenContext<'a> {
    pub mode: OpenMode,
    pub blocking: bool,
    pub config: &'a ConnectionsConfig,
}

/// Build the delegate for `spec` opened in `ctx.mode`.
pub fn open_delegate(
    spec: &TransportSpec,
    ctx: &OpenContext<'_>,
) -> Result<Box<dyn TransportDelegate>> {
    debug!("opening {} transport in mode '{}'", spec.class_name(), ctx.mode);
    let level = ctx.config.compression_level;
    let delegate: Box<dyn TransportDelegate> = match spec {
        TransportSpec::File(file) => {
            let sniffed = if ctx.mode.can_read() && !file.raw && !ctx.mode.is_read_write() {
                match sniff_file(&file.path) {
                    Ok(found) => found,
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => Compression::None,
                    Err(err) => return Err(err.into()),
                }
            } else {
                Compression::None
            };
            let compressed = if ctx.mode.can_read() && !ctx.mode.is_read_write() {
                sniffed.is_compressed()
            } else {
                file.declared.is_compressed()
            };
            if compressed {
                Box::new(CompressedFileDelegate::open(
                    &file.path, ctx.mode, file.declared, file.raw, level,
                )?)
            } else {
                Box::new(FileDelegate::open(&file.path, ctx.mode)?)
            }
        }
        TransportSpec::Socket(socket) => {
            let mut delegate = SocketDelegate::open(socket, ctx.blocking, ctx.config)?;
            if socket.compression.is_compressed() {
                delegate.set_compression(socket.compression, level)?;
            }
            Box::new(delegate)
        }
        TransportSpec::Pipe { command } => Box::new(PipeDelegate::open(
            command,
            &ctx.config.shell,
            ctx.mode,
            ctx.blocking,
        )?),
        TransportSpec::Fifo { path } => Box::new(FifoDelegate::open(
            path,
            ctx.mode,
            ctx.blocking,
            &ctx.config.mkfifo_program,
        )?),
        TransportSpec::Raw { initial } => Box::new(RawDelegate::open(initial, ctx.mode)),
        TransportSpec::Text(TextSpec::Read(lines)) => {
            if ctx.mode.can_write() {
                return Err(Error::Unsupported("text connections bound to lines are read-only"));
            }
            Box::new(TextReadDelegate::new(lines))
        }
        TransportSpec::Text(TextSpec::Write(target)) => {
            Box::new(TextWriteDelegate::open(target.clone(), ctx.mode)?)
        }
        TransportSpec::Native(native) => Box::new(NativeDelegate::open(native, ctx.mode)?),
        #[cfg(feature = "url")]
        TransportSpec::Url {
            address,
            compression,
        } => Box::new(UrlDelegate::open(
            address,
            ctx.mode,
            *compression,
            &ctx.config.url_user_agent,
        )?),
        #[cfg(not(feature = "url"))]
        TransportSpec::Url { .. } => {
            return Err(Error::Unsupported("built without URL support"));
        }
        TransportSpec::Terminal {
            stream,
            diversions,
        } => Box::new(TerminalDelegate::new(*stream, Arc::clone(diversions))),
    };
    Ok(delegate)
}
