//! Per-runtime connection state.
//!
//! A [`Session`] owns the descriptor table, the output diversion stack and
//! the three standard stream connections. Every constructor here follows
//! the same contract: an empty mode creates the connection lazily, any
//! other mode opens it immediately and destroys it again if that fails.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::codec::Compression;
use crate::config::ConnectionsConfig;
use crate::connection::{ConnectionParams, ConnectionRef, ConnectionSummary};
use crate::diversion::{Diversions, OnPop};
use crate::registry::Registry;
use crate::transport::{
    FileSpec, NativeSpec, SocketSpec, StdStream, TextSpec, TextVariable, TransportSpec,
};
use crate::Result;

pub struct Session {
    config: Arc<ConnectionsConfig>,
    registry: Arc<Registry>,
    diversions: Arc<Diversions>,
    standard: Vec<ConnectionRef>,
}

impl Session {
    pub fn new(config: ConnectionsConfig) -> Result<Self> {
        let diversions = Arc::new(Diversions::new(config.max_sink_depth));
        Self::build(config, diversions)
    }

    /// Session whose console output goes to `out` and `err`.
    pub fn with_console(
        config: ConnectionsConfig,
        out: Box<dyn Write + Send>,
        err: Box<dyn Write + Send>,
    ) -> Result<Self> {
        let diversions = Arc::new(Diversions::with_console(config.max_sink_depth, out, err));
        Self::build(config, diversions)
    }

    fn build(config: ConnectionsConfig, diversions: Arc<Diversions>) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let registry = Registry::new(Arc::clone(&config));
        let streams = StdStream::ALL
            .iter()
            .map(|&stream| {
                ConnectionParams::new(
                    stream.name(),
                    TransportSpec::Terminal {
                        stream,
                        diversions: Arc::clone(&diversions),
                    },
                )
            })
            .collect();
        let standard = registry.install_standard(streams)?;
        for (con, stream) in standard.iter().zip(StdStream::ALL) {
            con.lock()?.open(stream.mode())?;
        }
        debug!(
            "session started: {} descriptors, sink depth {}",
            config.max_connections, config.max_sink_depth
        );
        Ok(Self {
            config,
            registry,
            diversions,
            standard,
        })
    }

    pub fn config(&self) -> &ConnectionsConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn diversions(&self) -> &Arc<Diversions> {
        &self.diversions
    }

    pub fn stdin(&self) -> ConnectionRef {
        self.standard[0].clone()
    }

    pub fn stdout(&self) -> ConnectionRef {
        self.standard[1].clone()
    }

    pub fn stderr(&self) -> ConnectionRef {
        self.standard[2].clone()
    }

    /// Allocate a connection and open it unless `mode` is empty.
    pub fn create(&self, params: ConnectionParams, mode: &str) -> Result<ConnectionRef> {
        let con = self.registry.allocate(params)?;
        if !mode.is_empty() {
            let mut guard = con.lock()?;
            if let Err(err) = guard.open(mode) {
                if let Err(close_err) = guard.close_and_destroy() {
                    warn!("failed to clean up connection after open error: {close_err}");
                }
                return Err(err);
            }
        }
        Ok(con)
    }

    pub fn file(&self, path: impl AsRef<Path>, mode: &str) -> Result<ConnectionRef> {
        self.file_with(path, mode, "", false)
    }

    /// `file()` with an explicit encoding; `raw` reads bytes as stored
    /// without looking for a compression header.
    pub fn file_with(
        &self,
        path: impl AsRef<Path>,
        mode: &str,
        encoding: &str,
        raw: bool,
    ) -> Result<ConnectionRef> {
        let path = path.as_ref();
        let spec = TransportSpec::File(FileSpec {
            path: path.to_path_buf(),
            declared: Compression::None,
            raw,
        });
        let params = ConnectionParams::new(path.display().to_string(), spec).encoding(encoding);
        self.create(params, mode)
    }

    /// `gzfile`, `bzfile`, `xzfile` and `zstdfile`.
    pub fn compressed_file(
        &self,
        path: impl AsRef<Path>,
        mode: &str,
        compression: Compression,
    ) -> Result<ConnectionRef> {
        let path = path.as_ref();
        let spec = TransportSpec::File(FileSpec {
            path: path.to_path_buf(),
            declared: compression,
            raw: false,
        });
        self.create(ConnectionParams::new(path.display().to_string(), spec), mode)
    }

    pub fn gzfile(&self, path: impl AsRef<Path>, mode: &str) -> Result<ConnectionRef> {
        self.compressed_file(path, mode, Compression::Gzip)
    }

    pub fn socket(&self, spec: SocketSpec, mode: &str, blocking: bool) -> Result<ConnectionRef> {
        let params = ConnectionParams::new(spec.description(), TransportSpec::Socket(spec))
            .blocking(blocking);
        self.create(params, mode)
    }

    pub fn pipe(&self, command: &str, mode: &str) -> Result<ConnectionRef> {
        let spec = TransportSpec::Pipe {
            command: command.to_string(),
        };
        self.create(ConnectionParams::new(command, spec), mode)
    }

    pub fn fifo(&self, path: impl AsRef<Path>, mode: &str, blocking: bool) -> Result<ConnectionRef> {
        let path = path.as_ref();
        let spec = TransportSpec::Fifo {
            path: path.to_path_buf(),
        };
        let params = ConnectionParams::new(path.display().to_string(), spec).blocking(blocking);
        self.create(params, mode)
    }

    pub fn raw(&self, description: &str, initial: &[u8], mode: &str) -> Result<ConnectionRef> {
        let spec = TransportSpec::Raw {
            initial: initial.to_vec(),
        };
        self.create(ConnectionParams::new(description, spec), mode)
    }

    /// Text connection reading `lines`; always opened immediately.
    pub fn text_reader(&self, description: &str, lines: Vec<String>) -> Result<ConnectionRef> {
        let spec = TransportSpec::Text(TextSpec::Read(lines));
        self.create(ConnectionParams::new(description, spec), "r")
    }

    /// Text connection appending to `target`; `mode` is `"w"` or `"a"`.
    pub fn text_writer(&self, target: TextVariable, mode: &str) -> Result<ConnectionRef> {
        let description = target.name().unwrap_or("NULL").to_string();
        let spec = TransportSpec::Text(TextSpec::Write(target));
        let mode = if mode.is_empty() { "w" } else { mode };
        self.create(ConnectionParams::new(description, spec), mode)
    }

    pub fn native(&self, description: &str, spec: NativeSpec, mode: &str) -> Result<ConnectionRef> {
        self.create(
            ConnectionParams::new(description, TransportSpec::Native(spec)),
            mode,
        )
    }

    /// Read-only URL connection; `Compression::Gzip` un-gzips a gzip body.
    pub fn url(&self, address: &str, mode: &str, compression: Compression) -> Result<ConnectionRef> {
        let spec = TransportSpec::Url {
            address: address.to_string(),
            compression,
        };
        self.create(ConnectionParams::new(address, spec), mode)
    }

    pub fn get_connection(&self, descriptor: usize) -> Result<ConnectionRef> {
        self.registry.get(descriptor)
    }

    /// Descriptors of every live connection, standard streams included.
    pub fn get_all_connections(&self) -> Vec<usize> {
        self.registry.list()
    }

    /// Summaries of live connections. Without `all`, only open user
    /// connections are listed.
    pub fn show_connections(&self, all: bool) -> Result<Vec<(usize, ConnectionSummary)>> {
        let mut shown = Vec::new();
        for con in self.registry.live() {
            let guard = con.lock()?;
            let user = guard.descriptor() >= crate::config::STANDARD_DESCRIPTORS;
            if all || (user && guard.is_open()) {
                shown.push((guard.descriptor(), guard.summary()));
            }
        }
        Ok(shown)
    }

    pub fn close_and_destroy(&self, con: &ConnectionRef) -> Result<()> {
        con.lock()?.close_and_destroy()
    }

    /// Divert console output to `con`.
    pub fn sink(&self, con: ConnectionRef, on_pop: OnPop, split: bool) -> Result<()> {
        self.diversions.push_stdout(con, on_pop, split)
    }

    pub fn sink_pop(&self) -> Result<()> {
        self.diversions.pop_stdout()
    }

    /// Route messages to `con`, or back to the console with `None`.
    pub fn sink_messages(&self, con: Option<ConnectionRef>) -> Result<()> {
        self.diversions.set_stderr(con)
    }

    /// Depth of the stdout diversion stack.
    pub fn sink_number(&self) -> usize {
        self.diversions.depth()
    }

    /// Emit the warnings `con` collected on the message stream.
    pub fn emit_warnings(&self, con: &ConnectionRef) -> Result<()> {
        let warnings = con.lock()?.take_warnings();
        for message in warnings {
            self.diversions.warn(&message)?;
        }
        Ok(())
    }

    /// Wait for any of `sockets` to become ready; see [`crate::select::select`].
    pub fn select(
        &self,
        sockets: &[ConnectionRef],
        write: &[bool],
        timeout: Option<Duration>,
    ) -> Result<Vec<bool>> {
        crate::select::select(sockets, write, timeout)
    }

    /// Drain the diversion stack and destroy every user connection.
    pub fn teardown(&self) -> usize {
        self.diversions.drain();
        let destroyed = self.registry.teardown();
        if let Err(err) = self.diversions.flush_console() {
            warn!("failed to flush console at teardown: {err}");
        }
        destroyed
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}
