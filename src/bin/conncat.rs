use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use connections::{
    Compression, ConnectionRef, ConnectionsConfig, OnPop, Session, SocketSpec,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Kind {
    File,
    Gzfile,
    Bzfile,
    Xzfile,
    Zstdfile,
    Url,
    Pipe,
    Socket,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Codec {
    None,
    Gzip,
    Bzip2,
    Xz,
    Zstd,
}

impl From<Codec> for Compression {
    fn from(value: Codec) -> Self {
        match value {
            Codec::None => Compression::None,
            Codec::Gzip => Compression::Gzip,
            Codec::Bzip2 => Compression::Bzip2,
            Codec::Xz => Compression::Xz,
            Codec::Zstd => Compression::Zstd,
        }
    }
}

#[derive(Parser)]
#[command(name = "conncat")]
#[command(about = "Copy any connection to stdout, or to a diverted sink")]
struct Cli {
    /// Path, URL, shell command, or host:port depending on --kind
    description: String,

    /// Transport used to open the description
    #[arg(long, value_enum, default_value = "file")]
    kind: Kind,

    /// Open mode
    #[arg(long, default_value = "r")]
    mode: String,

    /// Encoding of the input
    #[arg(long, default_value = "")]
    encoding: String,

    /// Divert output to this file instead of the console
    #[arg(long)]
    sink: Option<PathBuf>,

    /// Codec for the --sink file
    #[arg(long, value_enum, default_value = "none")]
    compress: Codec,

    /// Stop after this many lines
    #[arg(long)]
    lines: Option<usize>,

    /// Copy bytes instead of lines
    #[arg(long)]
    binary: bool,

    /// JSON file with session configuration overrides
    #[arg(long)]
    config: Option<PathBuf>,
}

const BATCH: usize = 1024;

fn open_input(session: &Session, cli: &Cli) -> Result<ConnectionRef> {
    let desc = cli.description.as_str();
    let con = match cli.kind {
        Kind::File => session.file_with(desc, "", &cli.encoding, false)?,
        Kind::Gzfile => session.compressed_file(desc, "", Compression::Gzip)?,
        Kind::Bzfile => session.compressed_file(desc, "", Compression::Bzip2)?,
        Kind::Xzfile => session.compressed_file(desc, "", Compression::Xz)?,
        Kind::Zstdfile => session.compressed_file(desc, "", Compression::Zstd)?,
        Kind::Url => session.url(desc, "", Compression::None)?,
        Kind::Pipe => session.pipe(desc, "")?,
        Kind::Socket => {
            let (host, port) = desc
                .rsplit_once(':')
                .ok_or_else(|| anyhow!("socket description must be host:port, got {desc}"))?;
            let port = port
                .parse()
                .with_context(|| format!("invalid port in {desc}"))?;
            session.socket(SocketSpec::client(host, port), "", true)?
        }
    };
    let mode = if cli.binary && !cli.mode.contains('b') {
        format!("{}b", cli.mode)
    } else {
        cli.mode.clone()
    };
    con.lock()?
        .open(&mode)
        .with_context(|| format!("failed to open {desc}"))?;
    Ok(con)
}

fn copy_lines(session: &Session, input: &ConnectionRef, limit: Option<usize>) -> Result<usize> {
    let stdout = session.stdout();
    let mut copied = 0;
    loop {
        let want = match limit {
            Some(limit) if copied >= limit => break,
            Some(limit) => (limit - copied).min(BATCH),
            None => BATCH,
        };
        let lines = input.lock()?.read_lines(want as i64, true, false)?;
        if lines.is_empty() {
            break;
        }
        copied += lines.len();
        stdout.lock()?.write_lines(&lines, "\n")?;
        session.emit_warnings(input)?;
    }
    Ok(copied)
}

fn copy_bytes(session: &Session, input: &ConnectionRef) -> Result<usize> {
    let stdout = session.stdout();
    let mut copied = 0;
    loop {
        let chunk = input.lock()?.read_bin(64 * 1024)?;
        if chunk.is_empty() {
            break;
        }
        copied += chunk.len();
        stdout.lock()?.write_bin(&chunk)?;
    }
    Ok(copied)
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = match cli.config.as_ref() {
        Some(path) => ConnectionsConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ConnectionsConfig::default(),
    };
    let session = Session::new(config).context("failed to start session")?;

    if let Some(path) = cli.sink.as_ref() {
        let target = session
            .compressed_file(path, if cli.binary { "wb" } else { "w" }, cli.compress.into())
            .with_context(|| format!("failed to open sink {}", path.display()))?;
        session.sink(target, OnPop::Destroy, false)?;
    }

    let input = open_input(&session, &cli)?;
    let copied = if cli.binary {
        copy_bytes(&session, &input)?
    } else {
        copy_lines(&session, &input, cli.lines)?
    };
    log::info!("copied {copied} {}", if cli.binary { "bytes" } else { "lines" });

    session.close_and_destroy(&input)?;
    if cli.sink.is_some() {
        session.sink_pop()?;
    }
    Ok(())
}
