//! Text and binary I/O layered over the transport delegate.

use std::io;

use crate::mode::RwMode;
use crate::text::{until_nul, PushBackLine};
use crate::transport::TransportSpec;
use crate::{Error, Result};

use super::Connection;

enum Fill {
    Data,
    Eof,
    Blocked,
}

enum TransportLine {
    Line(String),
    /// Unterminated text before end of stream.
    Partial(String),
    Eof,
    Blocked,
}

impl Connection {
    /// Run `f` with the connection open, opening it on demand for this
    /// call only when needed.
    fn with_open<T>(&mut self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut scope = self.force_open(None)?;
        let out = f(&mut *scope);
        let closed = scope.finish();
        let out = out?;
        closed?;
        Ok(out)
    }

    fn check_readable(&self) -> Result<()> {
        if !self.can_read() {
            return Err(Error::State("cannot read from this connection"));
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        if !self.can_write() {
            return Err(Error::State("cannot write to this connection"));
        }
        Ok(())
    }

    fn check_binary(&self) -> Result<()> {
        if matches!(self.spec, TransportSpec::Text(_)) {
            return Err(Error::Unsupported("binary operations are not allowed on text connections"));
        }
        Ok(())
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        if !self.bin_pending.is_empty() {
            let n = buf.len().min(self.bin_pending.len());
            buf[..n].copy_from_slice(&self.bin_pending[..n]);
            self.bin_pending.drain(..n);
            return Ok(Some(n));
        }
        self.last_op = Some(RwMode::Read);
        match self.delegate_mut()?.read(buf) {
            Ok(n) => Ok(Some(n)),
            Err(err) if err.would_block() => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn fill(&mut self) -> Result<Fill> {
        let mut chunk = vec![0u8; self.config.buffer_size.max(1)];
        match self.read_chunk(&mut chunk)? {
            None => Ok(Fill::Blocked),
            Some(0) => {
                let tail = self.decoder.decode(&[], true);
                self.input.feed(&tail);
                self.decoder = self.encoding.decoder();
                Ok(Fill::Eof)
            }
            Some(n) => {
                let text = self.decoder.decode(&chunk[..n], false);
                self.input.feed(&text);
                Ok(Fill::Data)
            }
        }
    }

    fn next_transport_line(&mut self) -> Result<TransportLine> {
        loop {
            if let Some(line) = self.input.next_line() {
                return Ok(TransportLine::Line(line));
            }
            match self.fill()? {
                Fill::Data => continue,
                Fill::Blocked => return Ok(TransportLine::Blocked),
                Fill::Eof => {
                    if let Some(line) = self.input.next_line() {
                        return Ok(TransportLine::Line(line));
                    }
                    return Ok(match self.input.finish() {
                        Some(partial) => TransportLine::Partial(partial),
                        None => TransportLine::Eof,
                    });
                }
            }
        }
    }

    /// Read up to `n` lines, all remaining lines when `n < 0`.
    ///
    /// Push-back is drained first. An unterminated final line is returned
    /// as a line of its own and, with `warn_incomplete`, recorded as a
    /// warning. A non-blocking transport with no data ends the read early
    /// and marks the connection incomplete; the unfinished text is kept for
    /// the next call.
    pub fn read_lines(&mut self, n: i64, warn_incomplete: bool, skip_nul: bool) -> Result<Vec<String>> {
        self.with_open(|con| con.read_lines_open(n, warn_incomplete, skip_nul))
    }

    fn read_lines_open(&mut self, n: i64, warn_incomplete: bool, skip_nul: bool) -> Result<Vec<String>> {
        self.check_readable()?;
        self.incomplete = false;
        let mut lines = Vec::new();
        while n < 0 || (lines.len() as i64) < n {
            let prefix = match self.pushback.next_line() {
                PushBackLine::Complete(line) => {
                    lines.push(self.clean_line(line, lines.len() + 1, skip_nul));
                    continue;
                }
                PushBackLine::Partial(prefix) => prefix,
                PushBackLine::Empty => String::new(),
            };
            match self.next_transport_line()? {
                TransportLine::Line(line) => {
                    lines.push(self.clean_line(prefix + &line, lines.len() + 1, skip_nul));
                }
                TransportLine::Partial(line) => {
                    let line = self.clean_line(prefix + &line, lines.len() + 1, skip_nul);
                    self.incomplete_final_line(warn_incomplete);
                    lines.push(line);
                    break;
                }
                TransportLine::Eof => {
                    if !prefix.is_empty() {
                        let line = self.clean_line(prefix, lines.len() + 1, skip_nul);
                        self.incomplete_final_line(warn_incomplete);
                        lines.push(line);
                    }
                    break;
                }
                TransportLine::Blocked => {
                    if !prefix.is_empty() {
                        self.pushback.push(&[prefix], false);
                    }
                    self.incomplete = true;
                    break;
                }
            }
        }
        Ok(lines)
    }

    fn incomplete_final_line(&mut self, warn: bool) {
        self.incomplete = true;
        if warn {
            let message = format!("incomplete final line found on '{}'", self.description);
            self.warn(message);
        }
    }

    fn clean_line(&mut self, line: String, number: usize, skip_nul: bool) -> String {
        if !line.contains('\0') {
            return line;
        }
        if skip_nul {
            return line.replace('\0', "");
        }
        let message = format!("line {number} appears to contain an embedded nul");
        self.warn(message);
        match line.find('\0') {
            Some(pos) => line[..pos].to_string(),
            None => line,
        }
    }

    /// Read up to `n` bytes, stopping early at end of stream or when a
    /// non-blocking transport has nothing more.
    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut out = vec![0u8; n];
        let mut filled = 0;
        while filled < n {
            match self.read_chunk(&mut out[filled..])? {
                Some(0) => break,
                Some(read) => filled += read,
                None => {
                    self.incomplete = true;
                    break;
                }
            }
        }
        out.truncate(filled);
        Ok(out)
    }

    fn unread_bytes(&mut self, bytes: &[u8]) {
        let mut pending = bytes.to_vec();
        pending.extend_from_slice(&self.bin_pending);
        self.bin_pending = pending;
    }

    /// Read up to `n` raw bytes.
    pub fn read_bin(&mut self, n: usize) -> Result<Vec<u8>> {
        self.check_binary()?;
        self.with_open(|con| {
            con.check_readable()?;
            con.incomplete = false;
            con.read_bytes(n)
        })
    }

    /// Read up to `n` NUL-terminated strings.
    pub fn read_bin_strings(&mut self, n: usize) -> Result<Vec<String>> {
        self.check_binary()?;
        self.with_open(|con| {
            con.check_readable()?;
            con.incomplete = false;
            let mut strings = Vec::with_capacity(n);
            let mut current = Vec::new();
            let mut chunk = [0u8; 256];
            while strings.len() < n {
                let read = match con.read_chunk(&mut chunk)? {
                    Some(0) => break,
                    Some(read) => read,
                    None => {
                        con.incomplete = true;
                        break;
                    }
                };
                let mut start = 0;
                while start < read && strings.len() < n {
                    match chunk[start..read].iter().position(|&b| b == 0) {
                        Some(pos) => {
                            current.extend_from_slice(&chunk[start..start + pos]);
                            strings.push(con.decode_bytes(&std::mem::take(&mut current)));
                            start += pos + 1;
                        }
                        None => {
                            current.extend_from_slice(&chunk[start..read]);
                            start = read;
                        }
                    }
                }
                if start < read {
                    con.unread_bytes(&chunk[start..read]);
                }
            }
            if !current.is_empty() {
                if con.incomplete {
                    con.unread_bytes(&current);
                } else {
                    strings.push(con.decode_bytes(&current));
                }
            }
            Ok(strings)
        })
    }

    /// Read one string per entry of `nchars`, each cut at the first NUL.
    /// Counts are characters, or bytes with `use_bytes`. Reading stops at
    /// end of stream.
    pub fn read_char(&mut self, nchars: &[usize], use_bytes: bool) -> Result<Vec<String>> {
        self.with_open(|con| {
            con.check_readable()?;
            con.incomplete = false;
            let mut out = Vec::with_capacity(nchars.len());
            for &count in nchars {
                let bytes = if use_bytes || !con.encoding.is_utf8() {
                    con.read_bytes(count)?
                } else {
                    con.read_utf8_chars(count)?
                };
                if bytes.is_empty() && count > 0 {
                    break;
                }
                out.push(con.decode_bytes(until_nul(&bytes)));
            }
            Ok(out)
        })
    }

    fn read_utf8_chars(&mut self, count: usize) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for _ in 0..count {
            let lead = self.read_bytes(1)?;
            let Some(&first) = lead.first() else {
                break;
            };
            out.push(first);
            let width = match first {
                0xF0..=0xF7 => 4,
                0xE0..=0xEF => 3,
                0xC0..=0xDF => 2,
                _ => 1,
            };
            if width > 1 {
                out.extend(self.read_bytes(width - 1)?);
            }
        }
        Ok(out)
    }

    fn decode_bytes(&self, bytes: &[u8]) -> String {
        let mut decoder = self.encoding.decoder();
        decoder.decode(bytes, true)
    }

    fn write_all(&mut self, mut bytes: &[u8]) -> Result<()> {
        self.last_op = Some(RwMode::Write);
        let delegate = self.delegate_mut()?;
        while !bytes.is_empty() {
            let n = delegate.write(bytes)?;
            if n == 0 {
                return Err(io::Error::from(io::ErrorKind::WriteZero).into());
            }
            bytes = &bytes[n..];
        }
        Ok(())
    }

    fn write_text(&mut self, text: &str) -> Result<()> {
        let bytes = self.encoding.encode(text);
        self.write_all(&bytes)
    }

    /// Write each line followed by `sep`.
    pub fn write_lines<S: AsRef<str>>(&mut self, lines: &[S], sep: &str) -> Result<()> {
        self.with_open(|con| {
            con.check_writable()?;
            let mut text = String::new();
            for line in lines {
                text.push_str(line.as_ref());
                text.push_str(sep);
            }
            con.write_text(&text)
        })
    }

    pub fn write_string(&mut self, text: &str) -> Result<()> {
        self.with_open(|con| {
            con.check_writable()?;
            con.write_text(text)
        })
    }

    /// Write fixed-width strings.
    ///
    /// Each string is cut or NUL-padded to its entry in `nchars` (its own
    /// length when `nchars` is `None`); `eos`, when given, follows each
    /// string together with a terminating NUL.
    pub fn write_char<S: AsRef<str>>(
        &mut self,
        strings: &[S],
        nchars: Option<&[usize]>,
        eos: Option<&str>,
    ) -> Result<()> {
        self.check_valid()?;
        if let Some(counts) = nchars {
            if counts.len() < strings.len() {
                return Err(Error::State("'nchars' is too short"));
            }
        }
        self.with_open(|con| {
            con.check_writable()?;
            let mut out = Vec::new();
            let mut padded = false;
            for (i, s) in strings.iter().enumerate() {
                let s = s.as_ref();
                let available = s.chars().count();
                let wanted = nchars.map_or(available, |counts| counts[i]);
                let kept: String = s.chars().take(wanted).collect();
                out.extend(con.encoding.encode(&kept));
                if wanted > available {
                    padded = true;
                    out.resize(out.len() + wanted - available, 0);
                }
                if let Some(eos) = eos {
                    out.extend(con.encoding.encode(eos));
                    out.push(0);
                }
            }
            if padded {
                con.warn("more characters requested than are in the string - will zero-pad".into());
            }
            con.write_all(&out)
        })
    }

    pub fn write_bin(&mut self, bytes: &[u8]) -> Result<()> {
        self.check_binary()?;
        self.with_open(|con| {
            con.check_writable()?;
            con.write_all(bytes)
        })
    }

    /// Write each string followed by a NUL terminator.
    pub fn write_bin_strings<S: AsRef<str>>(&mut self, strings: &[S]) -> Result<()> {
        self.check_binary()?;
        self.with_open(|con| {
            con.check_writable()?;
            let mut out = Vec::new();
            for s in strings {
                out.extend(con.encoding.encode(s.as_ref()));
                out.push(0);
            }
            con.write_all(&out)
        })
    }
}
