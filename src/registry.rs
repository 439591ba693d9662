//! Descriptor table.
//!
//! Slots hold weak references; whoever opened a connection holds the
//! strong [`ConnectionRef`]. A slot is free when it is empty or its
//! connection has been dropped. Slots 0-2 belong to the standard streams.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use log::{debug, info, warn};

use crate::config::{ConnectionsConfig, STANDARD_DESCRIPTORS};
use crate::connection::{Connection, ConnectionParams, ConnectionRef};
use crate::{Error, Result};

/// Called once when the table is full, before allocation gives up. The
/// embedding runtime uses it to collect unreachable connection handles.
pub type ReclaimHook = Box<dyn Fn() + Send + Sync>;

type Slot = Option<Weak<Mutex<Connection>>>;

pub struct Registry {
    slots: Mutex<Vec<Slot>>,
    reclaim: Mutex<Option<ReclaimHook>>,
    config: Arc<ConnectionsConfig>,
}

fn is_free(slot: &Slot) -> bool {
    slot.as_ref().map_or(true, |weak| weak.strong_count() == 0)
}

impl Registry {
    pub fn new(config: Arc<ConnectionsConfig>) -> Arc<Self> {
        let capacity = config.max_connections.max(STANDARD_DESCRIPTORS);
        Arc::new(Self {
            slots: Mutex::new(vec![None; capacity]),
            reclaim: Mutex::new(None),
            config,
        })
    }

    fn slots(&self) -> Result<MutexGuard<'_, Vec<Slot>>> {
        self.slots
            .lock()
            .map_err(|_| Error::State("connection table lock poisoned"))
    }

    pub fn capacity(&self) -> usize {
        self.slots().map(|slots| slots.len()).unwrap_or(0)
    }

    pub fn set_reclaim_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        if let Ok(mut slot) = self.reclaim.lock() {
            *slot = Some(Box::new(hook));
        }
    }

    fn run_reclaim(&self) {
        if let Ok(hook) = self.reclaim.lock() {
            if let Some(hook) = hook.as_ref() {
                debug!("connection table full; running reclaim pass");
                hook();
            }
        }
    }

    fn try_insert(
        self: &Arc<Self>,
        params: &ConnectionParams,
    ) -> Result<Option<ConnectionRef>> {
        let mut slots = self.slots()?;
        let Some(descriptor) = (STANDARD_DESCRIPTORS..slots.len()).find(|&i| is_free(&slots[i]))
        else {
            return Ok(None);
        };
        let con = Connection::new(
            descriptor,
            params.clone(),
            Arc::clone(&self.config),
            Arc::downgrade(self),
        )?;
        let con = ConnectionRef::new(con);
        slots[descriptor] = Some(con.downgrade());
        debug!("allocated descriptor {descriptor} for {}", params.description);
        Ok(Some(con))
    }

    /// Create a connection in the lowest free slot at or above 3.
    ///
    /// A full table runs the reclaim hook and is scanned once more before
    /// failing with [`Error::AllConnectionsInUse`].
    pub fn allocate(self: &Arc<Self>, params: ConnectionParams) -> Result<ConnectionRef> {
        if let Some(con) = self.try_insert(&params)? {
            return Ok(con);
        }
        self.run_reclaim();
        self.try_insert(&params)?
            .ok_or(Error::AllConnectionsInUse)
    }

    /// Install the standard stream connections at descriptors 0-2.
    pub(crate) fn install_standard(
        self: &Arc<Self>,
        streams: Vec<ConnectionParams>,
    ) -> Result<Vec<ConnectionRef>> {
        let mut slots = self.slots()?;
        let mut installed = Vec::with_capacity(streams.len());
        for (descriptor, params) in streams.into_iter().enumerate().take(STANDARD_DESCRIPTORS) {
            let con = Connection::new(
                descriptor,
                params,
                Arc::clone(&self.config),
                Arc::downgrade(self),
            )?;
            let con = ConnectionRef::new(con);
            slots[descriptor] = Some(con.downgrade());
            installed.push(con);
        }
        Ok(installed)
    }

    /// Free a slot. Standard stream slots are never freed.
    pub fn release(&self, descriptor: usize) {
        if descriptor < STANDARD_DESCRIPTORS {
            return;
        }
        if let Ok(mut slots) = self.slots() {
            if let Some(slot) = slots.get_mut(descriptor) {
                *slot = None;
            }
        }
    }

    /// The live connection at `descriptor`.
    pub fn get(&self, descriptor: usize) -> Result<ConnectionRef> {
        let slots = self.slots()?;
        slots
            .get(descriptor)
            .and_then(|slot| slot.as_ref())
            .and_then(Weak::upgrade)
            .map(ConnectionRef::from_arc)
            .ok_or(Error::InvalidConnection)
    }

    /// Descriptors whose connections are still alive, ascending.
    pub fn list(&self) -> Vec<usize> {
        match self.slots() {
            Ok(slots) => slots
                .iter()
                .enumerate()
                .filter(|(_, slot)| !is_free(slot))
                .map(|(i, _)| i)
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn live(&self) -> Vec<ConnectionRef> {
        match self.slots() {
            Ok(slots) => slots
                .iter()
                .filter_map(|slot| slot.as_ref().and_then(Weak::upgrade))
                .map(ConnectionRef::from_arc)
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Destroy every live connection above the standard streams. Each
    /// close is attempted independently; failures are logged and dropped.
    pub fn teardown(&self) -> usize {
        let live = self.live();
        let mut destroyed = 0;
        for con in live {
            let mut guard = match con.lock() {
                Ok(guard) => guard,
                Err(err) => {
                    warn!("teardown skipped a connection: {err}");
                    continue;
                }
            };
            if guard.descriptor() < STANDARD_DESCRIPTORS || guard.is_closed() {
                continue;
            }
            if let Err(err) = guard.close_and_destroy() {
                warn!("failed to close connection {} during teardown: {err}", guard.descriptor());
            }
            destroyed += 1;
        }
        info!("connection teardown destroyed {destroyed} connections");
        destroyed
    }
}
