//! Host-owned table of live connections.
//!
//! The registry assigns each connection its identity when it is registered;
//! identities start at 1 and are never reused within one registry. Entries are
//! shared as `Arc<Mutex<Connection>>` so a slow handshake or drain on one
//! connection does not need the registry itself to stay locked.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::connection::{Connection, ConnectionConfig};
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::lifecycle::DrainPolicy;
use crate::models::{ConnectParams, ConnectionId, HostRef};
use crate::native::Connector;
use crate::utils::{lock_recovering, safe_lock, safe_lock_arc};

pub type SharedConnection<C> = Arc<Mutex<Connection<C>>>;

pub struct Registry<C: Connector> {
    next_id: u64,
    connections: HashMap<ConnectionId, SharedConnection<C>>,
}

impl<C: Connector> Default for Registry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> Registry<C> {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            connections: HashMap::new(),
        }
    }

    /// Construct a disconnected connection and assign its identity.
    pub fn register(
        &mut self,
        params: ConnectParams,
        connector: C,
        config: ConnectionConfig,
        connect_callback: Option<HostRef>,
    ) -> ConnectionId {
        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        let conn = Connection::new(id, params, connector, config, connect_callback);
        self.connections.insert(id, Arc::new(Mutex::new(conn)));
        debug!(conn_id = %id, "registered connection");
        id
    }

    /// Look up a live connection. Unknown or removed ids are `Shutdown`.
    pub fn get(&self, id: ConnectionId) -> Result<SharedConnection<C>> {
        self.connections.get(&id).cloned().ok_or(Error::Shutdown)
    }

    pub fn remove(&mut self, id: ConnectionId) -> Result<SharedConnection<C>> {
        self.connections.remove(&id).ok_or(Error::Shutdown)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Connect `id`. A failed handshake removes the entry and releases its
    /// connect callback.
    pub fn connect<D: Dispatcher + ?Sized>(
        &mut self,
        id: ConnectionId,
        dispatcher: &mut D,
    ) -> Result<()> {
        let shared = self.get(id)?;
        let mut conn = safe_lock_arc(&shared, "registry connect")?;
        match conn.connect() {
            Ok(()) => Ok(()),
            Err(err) => {
                if matches!(err, Error::Connect { .. }) {
                    conn.release_connect_callback(dispatcher);
                    drop(conn);
                    self.connections.remove(&id);
                }
                Err(err)
            }
        }
    }

    /// Remove `id` and drain it, dispatching callbacks of finished jobs.
    pub fn disconnect<D: Dispatcher + ?Sized>(
        &mut self,
        id: ConnectionId,
        dispatcher: &mut D,
    ) -> Result<usize> {
        let shared = self.remove(id)?;
        let mut conn = safe_lock_arc(&shared, "registry disconnect")?;
        conn.disconnect(dispatcher, DrainPolicy::Dispatch)
    }

    /// Process-wide shutdown: drain every connection without running callbacks.
    ///
    /// Returns the total number of jobs discarded.
    pub fn shutdown_all<D: Dispatcher + ?Sized>(&mut self, dispatcher: &mut D) -> usize {
        let mut entries: Vec<_> = self.connections.drain().collect();
        entries.sort_by_key(|(id, _)| *id);

        let mut drained = 0;
        for (id, shared) in entries {
            let mut conn = lock_recovering(&shared);
            match conn.disconnect(dispatcher, DrainPolicy::Discard) {
                Ok(count) => drained += count,
                Err(err) => debug!(conn_id = %id, %err, "skipped during shutdown"),
            }
        }
        drained
    }
}

/// Connect `id` without holding the registry lock during the handshake.
///
/// Same contract as `Registry::connect`: a failed handshake releases the
/// connect callback through `dispatcher` and removes the entry.
pub fn connect_shared<C: Connector, D: Dispatcher + ?Sized>(
    registry: &Mutex<Registry<C>>,
    id: ConnectionId,
    dispatcher: &mut D,
) -> Result<()> {
    let shared = safe_lock(registry, "connect registry")?.get(id)?;

    let outcome = safe_lock_arc(&shared, "connect conn")?.connect();
    if let Err(err @ Error::Connect { .. }) = &outcome {
        debug!(conn_id = %id, %err, "discarding connection after failed connect");
        safe_lock_arc(&shared, "connect discard")?.release_connect_callback(dispatcher);
        safe_lock(registry, "connect registry remove")?.connections.remove(&id);
    }
    outcome
}
