//! Session configuration.
//!
//! Defines the limits and defaults a [`Session`](crate::Session) applies to
//! the connections it creates.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Descriptors 0, 1 and 2 are the standard streams.
pub const STANDARD_DESCRIPTORS: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionsConfig {
    /// Size of the descriptor table, standard streams included.
    /// Default: 128
    pub max_connections: usize,

    /// Maximum depth of the stdout diversion stack.
    /// Default: 20
    pub max_sink_depth: usize,

    /// Encoding used when a connection does not name one.
    /// Default: "UTF-8"
    pub default_encoding: String,

    /// Chunk size for transport reads.
    /// Default: 64 KiB
    pub buffer_size: usize,

    /// Blocking socket read timeout in seconds. Zero disables the timeout.
    /// Default: 60
    pub socket_timeout_secs: u64,

    /// Program invoked to create missing FIFOs.
    /// Default: "mkfifo"
    pub mkfifo_program: String,

    /// Shell used to run pipe commands.
    /// Default: "/bin/sh"
    pub shell: String,

    /// Compression level for gzip/bzip2/xz/zstd writers (1-9).
    /// Default: 6
    pub compression_level: u32,

    /// User agent sent by URL connections.
    pub url_user_agent: String,
}

impl Default for ConnectionsConfig {
    fn default() -> Self {
        Self {
            max_connections: 128,
            max_sink_depth: 20,
            default_encoding: "UTF-8".to_string(),
            buffer_size: 64 * 1024,
            socket_timeout_secs: 60,
            mkfifo_program: "mkfifo".to_string(),
            shell: "/bin/sh".to_string(),
            compression_level: 6,
            url_user_agent: concat!("connections/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ConnectionsConfig {
    /// Load overrides from a JSON file; absent fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read(path.as_ref())?;
        let config: Self = serde_json::from_slice(&raw)
            .map_err(|e| Error::Transport(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_connections <= STANDARD_DESCRIPTORS {
            return Err(Error::Unsupported(
                "max_connections must leave room beyond the standard streams",
            ));
        }
        if self.buffer_size == 0 {
            return Err(Error::Unsupported("buffer_size must be non-zero"));
        }
        if !(1..=9).contains(&self.compression_level) {
            return Err(Error::Unsupported("compression_level must be within 1..=9"));
        }
        Ok(())
    }

    pub fn socket_timeout(&self) -> Option<Duration> {
        match self.socket_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = ConnectionsConfig::default();
        assert_eq!(config.max_connections, 128);
        assert_eq!(config.max_sink_depth, 20);
        assert_eq!(config.default_encoding, "UTF-8");
        assert_eq!(config.socket_timeout(), Some(Duration::from_secs(60)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_partial_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_connections": 16, "socket_timeout_secs": 0}}"#).unwrap();

        let config = ConnectionsConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.max_connections, 16);
        assert_eq!(config.socket_timeout(), None);
        assert_eq!(config.max_sink_depth, 20);
    }

    #[test]
    fn test_config_rejects_tiny_table() {
        let config = ConnectionsConfig {
            max_connections: 3,
            ..ConnectionsConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
