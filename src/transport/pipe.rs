use std::io::{Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use log::debug;

use crate::mode::OpenMode;
use crate::select::set_nonblocking;
use crate::{Error, Result};

use super::TransportDelegate;

/// Shell subprocess: read modes bind its stdout, write modes its stdin.
pub struct PipeDelegate {
    command: String,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
}

impl PipeDelegate {
    pub fn open(command: &str, shell: &str, mode: OpenMode, blocking: bool) -> Result<Self> {
        let mut cmd = Command::new(shell);
        cmd.arg("-c").arg(command);
        cmd.stdin(if mode.can_write() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        if mode.can_read() {
            cmd.stdout(Stdio::piped());
        }
        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Transport(format!("cannot open pipe() cmd '{command}': {e}")))?;
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        if !blocking {
            if let Some(out) = stdout.as_ref() {
                set_nonblocking(out.as_raw_fd(), true)?;
            }
        }
        debug!("spawned pipe '{command}' as pid {}", child.id());
        Ok(Self {
            command: command.to_string(),
            child,
            stdin,
            stdout,
        })
    }
}

impl TransportDelegate for PipeDelegate {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let out = self
            .stdout
            .as_mut()
            .ok_or(Error::State("cannot read from this connection"))?;
        Ok(out.read(buf)?)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let input = self
            .stdin
            .as_mut()
            .ok_or(Error::State("cannot write to this connection"))?;
        Ok(input.write(buf)?)
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(input) = self.stdin.as_mut() {
            input.flush()?;
        }
        Ok(())
    }

    fn channel(&self) -> Option<RawFd> {
        match (&self.stdout, &self.stdin) {
            (Some(out), _) => Some(out.as_raw_fd()),
            (None, Some(input)) => Some(input.as_raw_fd()),
            (None, None) => None,
        }
    }

    fn can_read(&self) -> bool {
        self.stdout.is_some()
    }

    fn can_write(&self) -> bool {
        self.stdin.is_some()
    }

    fn set_blocking(&mut self, blocking: bool) -> Result<()> {
        if let Some(out) = self.stdout.as_ref() {
            set_nonblocking(out.as_raw_fd(), !blocking)?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // Closing stdin delivers EOF so the child can finish.
        drop(self.stdin.take());
        drop(self.stdout.take());
        let status = self.child.wait()?;
        debug!("pipe '{}' exited with {status}", self.command);
        Ok(())
    }
}
