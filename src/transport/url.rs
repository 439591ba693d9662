use std::io::{Cursor, Read};
use std::time::Duration;

use log::debug;
use url::Url;

use crate::codec::{decompress_bytes, Compression};
use crate::mode::OpenMode;
use crate::{Error, Result};

use super::TransportDelegate;

/// Read-only connection over `file://`, `http://` or `https://`.
///
/// The whole resource is fetched at open and served from memory.
pub struct UrlDelegate {
    body: Cursor<Vec<u8>>,
}

impl UrlDelegate {
    pub fn open(
        address: &str,
        mode: OpenMode,
        compression: Compression,
        user_agent: &str,
    ) -> Result<Self> {
        if mode.can_write() && !mode.is_lazy() {
            return Err(Error::Unsupported("url connections can only be opened for reading"));
        }
        let url = Url::parse(address)
            .map_err(|e| Error::Transport(format!("cannot open URL '{address}': {e}")))?;
        let fetched = match url.scheme() {
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| Error::Transport(format!("cannot open URL '{address}'")))?;
                std::fs::read(path)?
            }
            "http" | "https" => fetch(&url, user_agent)?,
            other => {
                return Err(Error::Transport(format!("URL scheme unsupported: '{other}'")));
            }
        };
        debug!("fetched {} bytes from {address}", fetched.len());
        let body = if compression == Compression::Gzip {
            match decompress_bytes(&fetched)? {
                (Compression::Gzip, inflated) => inflated,
                _ => fetched,
            }
        } else {
            fetched
        };
        Ok(Self {
            body: Cursor::new(body),
        })
    }
}

fn fetch(url: &Url, user_agent: &str) -> Result<Vec<u8>> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(60))
        .user_agent(user_agent)
        .build()
        .map_err(|e| Error::Transport(format!("cannot build HTTP client: {e}")))?;
    let response = client
        .get(url.clone())
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(|e| Error::Transport(format!("cannot open URL '{url}': {e}")))?;
    let bytes = response
        .bytes()
        .map_err(|e| Error::Transport(format!("cannot read URL '{url}': {e}")))?;
    Ok(bytes.to_vec())
}

impl TransportDelegate for UrlDelegate {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.body.read(buf)?)
    }

    fn write(&mut self, _buf: &[u8]) -> Result<usize> {
        Err(Error::State("cannot write to this connection"))
    }

    fn can_write(&self) -> bool {
        false
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_scheme_reads_local_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"local body\n").unwrap();
        let url = Url::from_file_path(tmp.path()).unwrap();
        let mut con = UrlDelegate::open(url.as_str(), OpenMode::Read, Compression::None, "t").unwrap();
        let mut buf = [0u8; 32];
        let n = con.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"local body\n");
    }

    #[test]
    fn gzip_body_is_inflated() {
        let packed = crate::codec::compress_bytes(Compression::Gzip, b"zipped\n", 6).unwrap();
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&packed).unwrap();
        let url = Url::from_file_path(tmp.path()).unwrap();
        let mut con = UrlDelegate::open(url.as_str(), OpenMode::Read, Compression::Gzip, "t").unwrap();
        let mut buf = [0u8; 32];
        let n = con.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"zipped\n");
    }

    #[test]
    fn write_modes_rejected() {
        assert!(UrlDelegate::open("file:///tmp/x", OpenMode::Write, Compression::None, "t").is_err());
    }
}
