//! Base connection: lifecycle, lazy open and the shared read/write helpers.
//!
//! # Key Components
//!
//! - [`Connection`]: owns the transport spec, the delegate of the current
//!   open event, push-back and decoding state.
//! - [`ConnectionRef`]: the strong, shareable handle callers hold. The
//!   registry only keeps weak references to it.
//! - [`OpenScope`]: guard returned by [`Connection::force_open`]; a
//!   connection opened on demand is released again when the guard drops.
//!
//! # Usage
//!
//! ```rust,ignore
//! let con = session.file("data.txt", "")?;   // lazy, nothing opened yet
//! let lines = con.lock()?.read_lines(-1, true, false)?;  // opens, reads, closes
//! ```

mod io;
mod seek;

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use log::{debug, warn};

pub use seek::{seek_target, DualOffset};

use crate::codec::Compression;
use crate::config::{ConnectionsConfig, STANDARD_DESCRIPTORS};
use crate::mode::{OpenMode, RwMode, SeekMode};
use crate::registry::Registry;
use crate::text::{LineSplitter, PushBack, TextDecoder, TextEncoding};
use crate::transport::{open_delegate, OpenContext, TextSpec, TransportDelegate, TransportSpec};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Unopened,
    Open { temp: bool },
    Destroyed,
}

/// Construction parameters shared by every transport kind.
#[derive(Clone)]
pub struct ConnectionParams {
    pub description: String,
    pub spec: TransportSpec,
    /// Encoding label; empty means the configured default.
    pub encoding: String,
    pub blocking: bool,
}

impl ConnectionParams {
    pub fn new(description: impl Into<String>, spec: TransportSpec) -> Self {
        Self {
            description: description.into(),
            spec,
            encoding: String::new(),
            blocking: true,
        }
    }

    pub fn encoding(mut self, label: impl Into<String>) -> Self {
        self.encoding = label.into();
        self
    }

    pub fn blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }
}

pub struct Connection {
    descriptor: usize,
    description: String,
    spec: TransportSpec,
    /// Mode string reported by `summary`; the on-demand open mode until an
    /// explicit open replaces it.
    mode: String,
    state: ConnState,
    delegate: Option<Box<dyn TransportDelegate>>,
    open_mode: Option<OpenMode>,
    encoding: TextEncoding,
    decoder: TextDecoder,
    blocking: bool,
    pushback: PushBack,
    input: LineSplitter,
    bin_pending: Vec<u8>,
    incomplete: bool,
    /// Most recent transfer direction, to resolve `RwMode::Last`.
    last_op: Option<RwMode>,
    warnings: Vec<String>,
    config: Arc<ConnectionsConfig>,
    registry: Weak<Registry>,
}

impl Connection {
    pub(crate) fn new(
        descriptor: usize,
        params: ConnectionParams,
        config: Arc<ConnectionsConfig>,
        registry: Weak<Registry>,
    ) -> Result<Self> {
        let encoding = match params.spec {
            // In-process text is always UTF-8.
            TransportSpec::Text(_) => TextEncoding::utf8(),
            _ => TextEncoding::resolve(&params.encoding, &config.default_encoding)?,
        };
        Ok(Self {
            descriptor,
            description: params.description,
            mode: params.spec.default_mode().to_string(),
            spec: params.spec,
            state: ConnState::Unopened,
            delegate: None,
            open_mode: None,
            decoder: encoding.decoder(),
            encoding,
            blocking: params.blocking,
            pushback: PushBack::new(),
            input: LineSplitter::new(),
            bin_pending: Vec::new(),
            incomplete: false,
            last_op: None,
            warnings: Vec::new(),
            config,
            registry,
        })
    }

    fn is_standard(&self) -> bool {
        self.descriptor < STANDARD_DESCRIPTORS
    }

    fn check_valid(&self) -> Result<()> {
        if self.state == ConnState::Destroyed {
            return Err(Error::InvalidConnection);
        }
        Ok(())
    }

    /// Open with `mode` (empty: the default mode), unless already open.
    /// Returns whether this call opened the connection.
    fn ensure_open(&mut self, mode: Option<OpenMode>, temp: bool) -> Result<bool> {
        self.check_valid()?;
        if matches!(self.state, ConnState::Open { .. }) {
            return Ok(false);
        }
        let mode = match mode {
            Some(mode) if !mode.is_lazy() => mode,
            _ => OpenMode::parse(&self.mode)?,
        };
        let ctx = OpenContext {
            mode,
            blocking: self.blocking,
            config: &self.config,
        };
        let delegate = open_delegate(&self.spec, &ctx)?;
        debug!(
            "opened connection {} ({}) in mode '{}'{}",
            self.descriptor,
            self.description,
            mode,
            if temp { " for this call" } else { "" }
        );
        self.delegate = Some(delegate);
        self.open_mode = Some(mode);
        self.state = ConnState::Open { temp };
        self.reset_buffers();
        self.incomplete = false;
        self.last_op = None;
        Ok(true)
    }

    /// Open on demand for the duration of the returned scope.
    ///
    /// An already-open connection is left as is. A connection this call
    /// opened is released again when the scope ends.
    pub fn force_open(&mut self, mode: Option<OpenMode>) -> Result<OpenScope<'_>> {
        let temp = self.ensure_open(mode, true)?;
        Ok(OpenScope {
            con: self,
            temp,
            done: false,
        })
    }

    /// Explicitly open; the connection stays open until destroyed.
    pub fn open(&mut self, mode: &str) -> Result<()> {
        self.check_valid()?;
        if self.is_open() {
            return Err(Error::State("connection is already open"));
        }
        let parsed = OpenMode::parse(mode)?;
        if !parsed.is_lazy() {
            self.mode = mode.to_string();
        }
        self.ensure_open(Some(parsed), false)?;
        Ok(())
    }

    /// Release the delegate of an on-demand open. Explicitly opened
    /// connections stay open; the descriptor is never retired.
    pub fn close(&mut self) -> Result<()> {
        self.check_valid()?;
        if self.is_standard() {
            return Err(Error::State("cannot close standard connections"));
        }
        match self.state {
            ConnState::Open { temp: true } => self.release(),
            _ => Ok(()),
        }
    }

    /// Release the transport and retire the descriptor permanently.
    pub fn close_and_destroy(&mut self) -> Result<()> {
        self.check_valid()?;
        if self.is_standard() {
            return Err(Error::State("cannot close standard connections"));
        }
        let released = self.release();
        self.state = ConnState::Destroyed;
        if let Some(registry) = self.registry.upgrade() {
            registry.release(self.descriptor);
        }
        debug!("destroyed connection {} ({})", self.descriptor, self.description);
        released
    }

    fn release(&mut self) -> Result<()> {
        self.reset_buffers();
        self.pushback.clear();
        self.open_mode = None;
        if self.state != ConnState::Destroyed {
            self.state = ConnState::Unopened;
        }
        match self.delegate.take() {
            Some(mut delegate) => {
                debug!("closing connection {} ({})", self.descriptor, self.description);
                delegate.close()
            }
            None => Ok(()),
        }
    }

    fn reset_buffers(&mut self) {
        self.input.clear();
        self.bin_pending.clear();
        self.decoder = self.encoding.decoder();
    }

    fn delegate_mut(&mut self) -> Result<&mut Box<dyn TransportDelegate>> {
        self.delegate
            .as_mut()
            .ok_or(Error::State("connection is not open"))
    }

    fn require_open(&self) -> Result<()> {
        self.check_valid()?;
        if !self.is_open() {
            return Err(Error::State("connection is not open"));
        }
        Ok(())
    }

    /// Reposition the addressed cursor and return its previous offset.
    ///
    /// Moving a cursor discards push-back; moving the read cursor also
    /// discards input read ahead of it.
    pub fn seek(&mut self, offset: i64, mode: SeekMode, rw: RwMode) -> Result<u64> {
        self.require_open()?;
        if !self.is_seekable() {
            return Err(Error::UnseekableConnection);
        }
        let read_cursor = self.addresses_read_cursor(rw);
        let buffered = if mode == SeekMode::Enquire && read_cursor {
            (self.bin_pending.len() + self.encoding.encode(self.input.pending()).len()) as u64
        } else {
            0
        };
        if mode != SeekMode::Enquire {
            self.pushback.clear();
            // Read-ahead belongs to the read cursor; moving the write cursor keeps it.
            if read_cursor {
                self.reset_buffers();
            }
            // The delegate forgets its last operation on a seek too.
            self.last_op = None;
        }
        let previous = self.delegate_mut()?.seek(offset, mode, rw)?;
        Ok(previous.saturating_sub(buffered))
    }

    fn addresses_read_cursor(&self, rw: RwMode) -> bool {
        match rw {
            RwMode::Read => true,
            RwMode::Write => false,
            RwMode::Last => {
                !self.open_mode.is_some_and(|m| m.is_read_write())
                    || self.last_op != Some(RwMode::Write)
            }
        }
    }

    /// Cut the stream at the current write position.
    pub fn truncate(&mut self) -> Result<()> {
        self.require_open()?;
        if !self.can_write() {
            return Err(Error::State("can only truncate a connection open for writing"));
        }
        self.reset_buffers();
        self.delegate_mut()?.truncate()
    }

    pub fn flush(&mut self) -> Result<()> {
        self.check_valid()?;
        match self.delegate.as_mut() {
            Some(delegate) => delegate.flush(),
            None => Ok(()),
        }
    }

    /// Push text back to be read before any further transport data.
    pub fn push_back<S: AsRef<str>>(&mut self, lines: &[S], add_newline: bool) -> Result<()> {
        self.check_valid()?;
        if !self.is_open() || !self.can_read() {
            return Err(Error::State("can only push back on open readable connections"));
        }
        self.pushback.push(lines, add_newline);
        Ok(())
    }

    pub fn push_back_length(&self) -> usize {
        self.pushback.len()
    }

    pub fn push_back_clear(&mut self) {
        self.pushback.clear();
    }

    /// Layer a different codec over a file or socket connection.
    ///
    /// The descriptor and the open/closed state survive. An open file is
    /// reopened in the same mode, appending instead of truncating so bytes
    /// already written are kept. An open socket becomes write-only.
    pub fn set_compression_type(&mut self, compression: Compression) -> Result<()> {
        self.check_valid()?;
        let level = self.config.compression_level;
        let read_write = self.open_mode.is_some_and(|m| m.is_read_write());
        match &mut self.spec {
            TransportSpec::File(_) if read_write => Err(Error::Unsupported(
                "compression cannot be changed on a read-write file connection",
            )),
            TransportSpec::File(file) => {
                file.declared = compression;
                if let Some(mode) = self.open_mode {
                    let temp = matches!(self.state, ConnState::Open { temp: true });
                    self.release()?;
                    let reopen = match mode {
                        OpenMode::Write => OpenMode::Append,
                        OpenMode::WriteBinary => OpenMode::AppendBinary,
                        other => other,
                    };
                    self.ensure_open(Some(reopen), temp)?;
                }
                Ok(())
            }
            TransportSpec::Socket(socket) => {
                socket.compression = compression;
                if let Some(delegate) = self.delegate.as_mut() {
                    delegate.set_compression(compression, level)?;
                }
                Ok(())
            }
            _ => Err(Error::Unsupported(
                "compression can only be set on file and socket connections",
            )),
        }
    }

    pub fn set_blocking(&mut self, blocking: bool) -> Result<()> {
        self.check_valid()?;
        if let Some(delegate) = self.delegate.as_mut() {
            delegate.set_blocking(blocking)?;
        }
        self.blocking = blocking;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, ConnState::Open { .. })
    }

    /// Whether the connection has been destroyed.
    pub fn is_closed(&self) -> bool {
        self.state == ConnState::Destroyed
    }

    pub fn is_seekable(&self) -> bool {
        match self.delegate.as_ref() {
            Some(delegate) => delegate.is_seekable(),
            None => self.spec.seekable_hint(),
        }
    }

    fn effective_mode(&self) -> OpenMode {
        self.open_mode
            .or_else(|| OpenMode::parse(&self.mode).ok())
            .unwrap_or(OpenMode::Read)
    }

    pub fn can_read(&self) -> bool {
        self.effective_mode().can_read() && self.delegate.as_ref().map_or(true, |d| d.can_read())
    }

    pub fn can_write(&self) -> bool {
        self.effective_mode().can_write() && self.delegate.as_ref().map_or(true, |d| d.can_write())
    }

    pub fn is_text(&self) -> bool {
        self.effective_mode().is_text()
    }

    pub fn descriptor(&self) -> usize {
        self.descriptor
    }

    pub fn encoding(&self) -> &'static str {
        self.encoding.name()
    }

    pub fn class(&self) -> &str {
        self.spec.class_name()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    /// Whether the last read stopped mid-line or short of the requested data.
    pub fn is_incomplete(&self) -> bool {
        self.incomplete
    }

    pub fn compression(&self) -> Compression {
        match (self.delegate.as_ref(), &self.spec) {
            (Some(delegate), _) => delegate.compression(),
            (None, TransportSpec::File(file)) => file.declared,
            (None, TransportSpec::Socket(socket)) => socket.compression,
            (None, TransportSpec::Url { compression, .. }) => *compression,
            _ => Compression::None,
        }
    }

    pub(crate) fn channel(&self) -> Option<std::os::unix::io::RawFd> {
        self.delegate.as_ref().and_then(|d| d.channel())
    }

    pub(crate) fn has_buffered_input(&self) -> bool {
        !self.pushback.is_empty() || !self.bin_pending.is_empty() || self.input.has_line()
    }

    /// Bytes written so far to an output raw connection.
    pub fn raw_value(&self) -> Result<Vec<u8>> {
        self.check_valid()?;
        match (&self.spec, self.delegate.as_ref()) {
            (TransportSpec::Raw { .. }, Some(delegate)) if self.can_write() => delegate
                .raw_value()
                .ok_or(Error::State("'con' is not an output rawConnection")),
            _ => Err(Error::State("'con' is not an output rawConnection")),
        }
    }

    /// Completed lines of an output text connection. The trailing
    /// unterminated line appears once the connection is closed.
    pub fn text_value(&self) -> Result<Vec<String>> {
        self.check_valid()?;
        match &self.spec {
            TransportSpec::Text(TextSpec::Write(target)) => Ok(target.lines()),
            _ => Err(Error::State("'con' is not an output textConnection")),
        }
    }

    pub fn summary(&self) -> ConnectionSummary {
        ConnectionSummary {
            description: self.description.clone(),
            class: self.class().to_string(),
            mode: self.mode.clone(),
            text: self.is_text(),
            opened: self.is_open(),
            can_read: self.can_read(),
            can_write: self.can_write(),
        }
    }

    /// Drain warnings raised by reads since the last call.
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    fn warn(&mut self, message: String) {
        warn!("connection {}: {message}", self.descriptor);
        self.warnings.push(message);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(mut delegate) = self.delegate.take() {
            if let Err(err) = delegate.close() {
                warn!("failed to close connection {} on drop: {err}", self.descriptor);
            }
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("descriptor", &self.descriptor)
            .field("description", &self.description)
            .field("class", &self.class())
            .field("mode", &self.mode)
            .field("state", &self.state)
            .finish()
    }
}

/// Guard for an on-demand open. Dereferences to the connection.
pub struct OpenScope<'a> {
    con: &'a mut Connection,
    temp: bool,
    done: bool,
}

impl OpenScope<'_> {
    /// Whether ending this scope will close the connection.
    pub fn is_temporary(&self) -> bool {
        self.temp
    }

    /// End the scope, reporting any failure to close.
    pub fn finish(mut self) -> Result<()> {
        self.done = true;
        if self.temp {
            self.con.release()
        } else {
            Ok(())
        }
    }
}

impl Deref for OpenScope<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.con
    }
}

impl DerefMut for OpenScope<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.con
    }
}

impl Drop for OpenScope<'_> {
    fn drop(&mut self) {
        if self.temp && !self.done {
            if let Err(err) = self.con.release() {
                warn!("failed to close connection {}: {err}", self.con.descriptor);
            }
        }
    }
}

/// `summary.connection` fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSummary {
    pub description: String,
    pub class: String,
    pub mode: String,
    pub text: bool,
    pub opened: bool,
    pub can_read: bool,
    pub can_write: bool,
}

impl fmt::Display for ConnectionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let yes_no = |b: bool| if b { "yes" } else { "no" };
        write!(
            f,
            "{:<24} {:<14} {:<5} {:<7} {:<7} {:<4} {}",
            self.description,
            self.class,
            self.mode,
            if self.text { "text" } else { "binary" },
            if self.opened { "opened" } else { "closed" },
            yes_no(self.can_read),
            yes_no(self.can_write),
        )
    }
}

/// Shared handle to a connection.
#[derive(Clone)]
pub struct ConnectionRef(Arc<Mutex<Connection>>);

impl ConnectionRef {
    pub(crate) fn new(con: Connection) -> Self {
        Self(Arc::new(Mutex::new(con)))
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.0
            .lock()
            .map_err(|_| Error::State("connection lock poisoned"))
    }

    pub fn descriptor(&self) -> Result<usize> {
        Ok(self.lock()?.descriptor())
    }

    pub fn ptr_eq(&self, other: &ConnectionRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn downgrade(&self) -> Weak<Mutex<Connection>> {
        Arc::downgrade(&self.0)
    }

    pub(crate) fn from_arc(inner: Arc<Mutex<Connection>>) -> Self {
        Self(inner)
    }
}

impl fmt::Debug for ConnectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_lock() {
            Ok(con) => con.fmt(f),
            Err(_) => f.write_str("ConnectionRef(<locked>)"),
        }
    }
}
