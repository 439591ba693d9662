//! Output diversion: where console prints and warnings end up.
//!
//! # Key Components
//!
//! - **stdout stack**: bounded stack of sink connections. The top entry
//!   receives console output; a `split` entry also forwards to the entry
//!   beneath it, down to the real console.
//! - **stderr slot**: a single replaceable sink for messages.
//!
//! Both default to the process console. The stack lives on the session and
//! is drained when the session ends.

use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard};

use log::{debug, warn};

use crate::connection::ConnectionRef;
use crate::{Error, Result};

/// What happens to a diverted connection when its entry is popped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnPop {
    Keep,
    Destroy,
}

struct Sink {
    con: ConnectionRef,
    on_pop: OnPop,
    split: bool,
}

struct DiversionState {
    stack: Vec<Sink>,
    max_depth: usize,
    err_sink: Option<ConnectionRef>,
}

type Console = Mutex<Box<dyn Write + Send>>;

pub struct Diversions {
    state: Mutex<DiversionState>,
    console_out: Console,
    console_err: Console,
}

enum Target {
    Console,
    Connection(ConnectionRef),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Diversions {
    pub fn new(max_depth: usize) -> Self {
        Self::with_console(max_depth, Box::new(io::stdout()), Box::new(io::stderr()))
    }

    /// Stack whose console writes go to the given writers instead of the
    /// process streams.
    pub fn with_console(
        max_depth: usize,
        out: Box<dyn Write + Send>,
        err: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            state: Mutex::new(DiversionState {
                stack: Vec::new(),
                max_depth,
                err_sink: None,
            }),
            console_out: Mutex::new(out),
            console_err: Mutex::new(err),
        }
    }

    /// Make `con` the destination of console output. An unopened
    /// connection is opened for writing for as long as it stays diverted.
    pub fn push_stdout(&self, con: ConnectionRef, on_pop: OnPop, split: bool) -> Result<()> {
        if self.depth() >= lock(&self.state).max_depth {
            return Err(Error::State("sink stack is full"));
        }
        prepare_sink(&con)?;
        debug!("diverting stdout to connection {}", con.descriptor()?);
        let mut state = lock(&self.state);
        if state.stack.len() >= state.max_depth {
            return Err(Error::State("sink stack is full"));
        }
        state.stack.push(Sink { con, on_pop, split });
        Ok(())
    }

    /// Remove the most recent diversion.
    pub fn pop_stdout(&self) -> Result<()> {
        let sink = lock(&self.state)
            .stack
            .pop()
            .ok_or(Error::State("no sink to remove"))?;
        finish_sink(sink)
    }

    /// Route messages to `con`, or back to the console with `None`.
    pub fn set_stderr(&self, con: Option<ConnectionRef>) -> Result<()> {
        if let Some(con) = con.as_ref() {
            prepare_sink(con)?;
        }
        lock(&self.state).err_sink = con;
        Ok(())
    }

    /// Number of active stdout diversions.
    pub fn depth(&self) -> usize {
        lock(&self.state).stack.len()
    }

    /// Descriptor currently receiving messages.
    pub fn stderr_descriptor(&self) -> Result<usize> {
        let sink = lock(&self.state).err_sink.clone();
        match sink {
            Some(con) => con.descriptor(),
            None => Ok(2),
        }
    }

    pub fn print(&self, text: &str) -> Result<()> {
        self.write_stdout(text.as_bytes())
    }

    /// Emit a runtime warning on the message stream.
    pub fn warn(&self, message: &str) -> Result<()> {
        self.write_stderr(format!("Warning message:\n{message}\n").as_bytes())
    }

    pub fn write_stdout(&self, bytes: &[u8]) -> Result<()> {
        for target in self.stdout_targets() {
            match target {
                Target::Console => {
                    lock(&self.console_out).write_all(bytes)?;
                }
                Target::Connection(con) => write_to(&con, bytes)?,
            }
        }
        Ok(())
    }

    pub fn write_stderr(&self, bytes: &[u8]) -> Result<()> {
        let sink = lock(&self.state).err_sink.clone();
        match sink {
            Some(con) => write_to(&con, bytes),
            None => {
                lock(&self.console_err).write_all(bytes)?;
                Ok(())
            }
        }
    }

    pub fn flush_console(&self) -> Result<()> {
        lock(&self.console_out).flush()?;
        lock(&self.console_err).flush()?;
        Ok(())
    }

    /// Pop every diversion and reset the message slot. Failures closing
    /// sinks are logged and skipped.
    pub fn drain(&self) {
        let (sinks, err_sink) = {
            let mut state = lock(&self.state);
            (std::mem::take(&mut state.stack), state.err_sink.take())
        };
        drop(err_sink);
        for sink in sinks.into_iter().rev() {
            if let Err(err) = finish_sink(sink) {
                warn!("failed to close diverted connection: {err}");
            }
        }
    }

    fn stdout_targets(&self) -> Vec<Target> {
        let state = lock(&self.state);
        let mut targets = Vec::new();
        for sink in state.stack.iter().rev() {
            targets.push(Target::Connection(sink.con.clone()));
            if !sink.split {
                return targets;
            }
        }
        targets.push(Target::Console);
        targets
    }
}

fn prepare_sink(con: &ConnectionRef) -> Result<()> {
    let mut guard = con.lock()?;
    if guard.class() == "terminal" {
        return Err(Error::Unsupported("cannot divert output to a standard stream"));
    }
    if !guard.is_open() {
        guard.open("wt")?;
    }
    if !guard.can_write() {
        return Err(Error::State("cannot write to this connection"));
    }
    Ok(())
}

fn finish_sink(sink: Sink) -> Result<()> {
    let mut con = sink.con.lock()?;
    con.flush()?;
    match sink.on_pop {
        OnPop::Keep => Ok(()),
        OnPop::Destroy => con.close_and_destroy(),
    }
}

fn write_to(con: &ConnectionRef, bytes: &[u8]) -> Result<()> {
    let mut con = con.lock()?;
    if con.is_text() {
        con.write_string(&String::from_utf8_lossy(bytes))
    } else {
        con.write_bin(bytes)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Arc;

    /// Cloneable in-memory console.
    #[derive(Clone, Default)]
    pub struct SharedBuf(pub Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        pub fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn captured(depth: usize) -> (Diversions, SharedBuf, SharedBuf) {
        let out = SharedBuf::default();
        let err = SharedBuf::default();
        let d = Diversions::with_console(depth, Box::new(out.clone()), Box::new(err.clone()));
        (d, out, err)
    }

    #[test]
    fn console_is_default() {
        let (d, out, err) = captured(4);
        d.print("hello\n").unwrap();
        d.warn("careful").unwrap();
        assert_eq!(out.contents(), "hello\n");
        assert_eq!(err.contents(), "Warning message:\ncareful\n");
        assert_eq!(d.depth(), 0);
        assert_eq!(d.stderr_descriptor().unwrap(), 2);
    }

    #[test]
    fn pop_on_empty_stack_fails() {
        let (d, _, _) = captured(4);
        assert!(matches!(d.pop_stdout(), Err(Error::State(_))));
    }
}
