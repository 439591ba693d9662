use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream, ToSocketAddrs};
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

use log::{debug, warn};

use crate::codec::{CompressWriter, Compression};
use crate::config::ConnectionsConfig;
use crate::select::wait_writable;
use crate::{Error, Result};

use super::TransportDelegate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketSpec {
    pub host: String,
    pub port: u16,
    /// Listen on `port` and accept exactly one peer.
    pub server: bool,
    /// Read timeout for blocking sockets; `None` uses the session default.
    pub timeout: Option<Duration>,
    /// Compressor layered over the output side once connected.
    pub compression: Compression,
}

impl SocketSpec {
    pub fn client(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            server: false,
            timeout: None,
            compression: Compression::None,
        }
    }

    pub fn server(port: u16) -> Self {
        Self {
            host: "localhost".to_string(),
            port,
            server: true,
            timeout: None,
            compression: Compression::None,
        }
    }

    pub fn description(&self) -> String {
        if self.server {
            format!("<-{}:{}", self.host, self.port)
        } else {
            format!("->{}:{}", self.host, self.port)
        }
    }
}

enum Channel {
    Plain(TcpStream),
    /// Write-only once compressed.
    Compressed(CompressWriter<TcpStream>),
}

/// TCP socket, client or single-accept server.
pub struct SocketDelegate {
    channel: Option<Channel>,
    blocking: bool,
}

impl SocketDelegate {
    pub fn open(spec: &SocketSpec, blocking: bool, config: &ConnectionsConfig) -> Result<Self> {
        let timeout = spec.timeout.or_else(|| config.socket_timeout());
        let stream = if spec.server {
            let listener = TcpListener::bind(("0.0.0.0", spec.port))?;
            debug!("listening on port {}", spec.port);
            let (stream, peer) = listener.accept()?;
            debug!("accepted {peer} on port {}; listener closed", spec.port);
            stream
        } else {
            connect(&spec.host, spec.port, timeout)?
        };
        if blocking {
            stream.set_read_timeout(timeout)?;
        } else {
            stream.set_nonblocking(true)?;
        }
        Ok(Self {
            channel: Some(Channel::Plain(stream)),
            blocking,
        })
    }

    fn channel_mut(&mut self) -> Result<&mut Channel> {
        self.channel
            .as_mut()
            .ok_or(Error::State("socket already closed"))
    }

    fn stream(&self) -> Option<&TcpStream> {
        match self.channel.as_ref()? {
            Channel::Plain(stream) => Some(stream),
            Channel::Compressed(writer) => Some(writer.get_ref()),
        }
    }
}

fn connect(host: &str, port: u16, timeout: Option<Duration>) -> Result<TcpStream> {
    let mut last_err = None;
    for addr in (host, port).to_socket_addrs()? {
        let attempt = match timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }
    Err(match last_err {
        Some(err) => Error::Transport(format!("cannot open socket to {host}:{port}: {err}")),
        None => Error::Transport(format!("no addresses resolved for {host}")),
    })
}

impl TransportDelegate for SocketDelegate {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let blocking = self.blocking;
        match self.channel_mut()? {
            Channel::Plain(stream) => match stream.read(buf) {
                Ok(n) => Ok(n),
                Err(err)
                    if blocking
                        && matches!(
                            err.kind(),
                            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                        ) =>
                {
                    Err(Error::Transport("socket read timed out".to_string()))
                }
                Err(err) => Err(err.into()),
            },
            Channel::Compressed(_) => Err(Error::State("cannot read from a compressed socket")),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        loop {
            let attempt = match self.channel_mut()? {
                Channel::Plain(stream) => stream.write(buf),
                Channel::Compressed(writer) => writer.write(buf),
            };
            match attempt {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    if let Some(fd) = self.channel() {
                        wait_writable(fd, None)?;
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        match self.channel_mut()? {
            Channel::Plain(stream) => stream.flush()?,
            Channel::Compressed(writer) => writer.flush()?,
        }
        Ok(())
    }

    fn channel(&self) -> Option<RawFd> {
        self.stream().map(|stream| stream.as_raw_fd())
    }

    fn can_read(&self) -> bool {
        matches!(self.channel, Some(Channel::Plain(_)))
    }

    fn set_blocking(&mut self, blocking: bool) -> Result<()> {
        if let Some(stream) = self.stream() {
            stream.set_nonblocking(!blocking)?;
        }
        self.blocking = blocking;
        Ok(())
    }

    fn set_compression(&mut self, compression: Compression, level: u32) -> Result<()> {
        if !self.blocking && compression == Compression::Gzip {
            return Err(Error::Unsupported("gzip compression requires a blocking socket"));
        }
        match self.channel.take() {
            Some(Channel::Plain(stream)) => {
                let writer = CompressWriter::new(stream, compression, level)?;
                self.channel = Some(Channel::Compressed(writer));
                Ok(())
            }
            other => {
                self.channel = other;
                Err(Error::Unsupported("socket is already compressed"))
            }
        }
    }

    fn compression(&self) -> Compression {
        match self.channel.as_ref() {
            Some(Channel::Compressed(writer)) => writer.compression(),
            _ => Compression::None,
        }
    }

    fn close(&mut self) -> Result<()> {
        let stream = match self.channel.take() {
            Some(Channel::Plain(stream)) => stream,
            Some(Channel::Compressed(writer)) => writer.finish()?,
            None => return Ok(()),
        };
        if let Err(err) = stream.shutdown(Shutdown::Both) {
            if err.kind() != io::ErrorKind::NotConnected {
                warn!("socket shutdown failed: {err}");
            }
        }
        Ok(())
    }
}
