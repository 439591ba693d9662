//! Readiness polling over connection channels.
//!
//! Thin wrappers around `poll(2)` and `fcntl(2)`. Sockets are the only
//! connections `select` accepts; pipes and FIFOs use [`set_nonblocking`]
//! directly for their blocking flag.

use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

use libc::{c_int, fcntl, poll, pollfd, F_GETFL, F_SETFL, O_NONBLOCK, POLLERR, POLLHUP, POLLIN, POLLOUT};
use log::trace;

use crate::connection::ConnectionRef;
use crate::{Error, Result};

/// Toggle `O_NONBLOCK` on a descriptor.
pub fn set_nonblocking(fd: RawFd, nonblocking: bool) -> Result<()> {
    let flags = unsafe { fcntl(fd, F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error().into());
    }
    let updated = if nonblocking {
        flags | O_NONBLOCK
    } else {
        flags & !O_NONBLOCK
    };
    if updated != flags {
        let rc = unsafe { fcntl(fd, F_SETFL, updated) };
        if rc < 0 {
            return Err(io::Error::last_os_error().into());
        }
    }
    Ok(())
}

fn timeout_ms(timeout: Option<Duration>) -> c_int {
    match timeout {
        None => -1,
        Some(t) => t.as_millis().min(c_int::MAX as u128) as c_int,
    }
}

/// Poll until any entry is ready or the timeout elapses. `EINTR` restarts
/// the wait with the full timeout.
fn poll_fds(fds: &mut [pollfd], timeout: Option<Duration>) -> Result<usize> {
    loop {
        let rc = unsafe { poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms(timeout)) };
        if rc >= 0 {
            return Ok(rc as usize);
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err.into());
        }
    }
}

/// Block until `fd` accepts writes.
pub fn wait_writable(fd: RawFd, timeout: Option<Duration>) -> Result<()> {
    let mut fds = [pollfd {
        fd,
        events: POLLOUT,
        revents: 0,
    }];
    if poll_fds(&mut fds, timeout)? == 0 {
        return Err(Error::Transport("timed out waiting for socket to accept writes".into()));
    }
    Ok(())
}

/// Wait for any of `sockets` to become ready: writable where `write[i]` is
/// set, readable otherwise. A socket with data already buffered on the
/// connection counts as readable without polling.
///
/// `write` is recycled when shorter than `sockets`. `None` waits
/// indefinitely.
pub fn select(
    sockets: &[ConnectionRef],
    write: &[bool],
    timeout: Option<Duration>,
) -> Result<Vec<bool>> {
    if sockets.is_empty() {
        return Ok(Vec::new());
    }
    if write.is_empty() {
        return Err(Error::State("'write' must be non-empty"));
    }

    let mut ready = vec![false; sockets.len()];
    let mut fds = Vec::with_capacity(sockets.len());
    let mut buffered = false;
    for (i, socket) in sockets.iter().enumerate() {
        let con = socket.lock()?;
        if con.class() != "sockconn" {
            return Err(Error::State("not a socket connection"));
        }
        let fd = con
            .channel()
            .ok_or(Error::State("socket is not open"))?;
        let wants_write = write[i % write.len()];
        if !wants_write && con.has_buffered_input() {
            ready[i] = true;
            buffered = true;
        }
        fds.push(pollfd {
            fd,
            events: if wants_write { POLLOUT } else { POLLIN },
            revents: 0,
        });
    }

    let wait = if buffered { Some(Duration::ZERO) } else { timeout };
    let n = poll_fds(&mut fds, wait)?;
    trace!("select: {n} of {} sockets ready", fds.len());
    for (slot, fd) in ready.iter_mut().zip(&fds) {
        if fd.revents & (fd.events | POLLERR | POLLHUP) != 0 {
            *slot = true;
        }
    }
    Ok(ready)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::io::AsRawFd;
    use std::os::unix::net::UnixStream;

    #[test]
    fn nonblocking_flag_round_trips() {
        let (a, _b) = UnixStream::pair().unwrap();
        let fd = a.as_raw_fd();
        set_nonblocking(fd, true).unwrap();
        assert_ne!(unsafe { fcntl(fd, F_GETFL) } & O_NONBLOCK, 0);
        set_nonblocking(fd, false).unwrap();
        assert_eq!(unsafe { fcntl(fd, F_GETFL) } & O_NONBLOCK, 0);
    }

    #[test]
    fn fresh_stream_is_writable() {
        let (a, _b) = UnixStream::pair().unwrap();
        wait_writable(a.as_raw_fd(), Some(Duration::from_millis(100))).unwrap();
    }

    #[test]
    fn infinite_timeout_maps_to_minus_one() {
        assert_eq!(timeout_ms(None), -1);
        assert_eq!(timeout_ms(Some(Duration::from_millis(250))), 250);
    }
}
