//! Unified connections for a scripting runtime.
//!
//! Files, compressed archives, sockets, pipes, FIFOs, in-memory buffers,
//! native callback streams and URLs all sit behind one [`Connection`] type.
//! A connection can exist unopened and is opened on demand; a bounded
//! [`Registry`] hands out small integer descriptors; console output is
//! routed through a [`Diversions`] stack.
//!
//! # Usage
//!
//! ```rust,ignore
//! let session = Session::new(ConnectionsConfig::default())?;
//! let out = session.gzfile("log.gz", "w")?;
//! out.lock()?.write_lines(&["first", "second"], "\n")?;
//! session.close_and_destroy(&out)?;
//!
//! let back = session.file("log.gz", "")?;
//! assert_eq!(back.lock()?.read_lines(-1, true, false)?, vec!["first", "second"]);
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod diversion;
pub mod error;
pub mod mode;
pub mod registry;
pub mod select;
pub mod session;
pub mod text;
pub mod transport;

pub use codec::{CodecError, Compression};
pub use config::ConnectionsConfig;
pub use connection::{Connection, ConnectionParams, ConnectionRef, ConnectionSummary, OpenScope};
pub use diversion::{Diversions, OnPop};
pub use error::{Error, ErrorKind, Result};
pub use mode::{OpenMode, RwMode, SeekMode};
pub use registry::Registry;
pub use session::Session;
pub use transport::{SocketSpec, StdStream, TextVariable, TransportSpec};
