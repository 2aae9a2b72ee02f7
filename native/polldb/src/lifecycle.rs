//! Shutdown controller.
//!
//! A connection moves `Active → Draining → Released`:
//!
//! - **Active → Draining**: new queries are refused with `Shutdown`, the worker's
//!   queue is closed and its thread joined. The worker finishes the running job
//!   and every job queued before the request.
//! - **Draining → Released**: the completion channel is drained until empty, each
//!   job dispatched or discarded per `DrainPolicy`, every host reference released,
//!   then the native session is closed.
//!
//! There is no mid-statement cancellation. A statement that never returns keeps
//! `disconnect` waiting on the join; bounding it is left to the host.

use tracing::{info, warn};

use crate::connection::Connection;
use crate::dispatch::{dispatch_connected, dispatch_jobs, Dispatcher};
use crate::error::{Error, Result};
use crate::models::ConnectionState;
use crate::native::{Connector, NativeClient};
use crate::utils::lock_recovering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    Active,
    Draining,
    Released,
}

/// What happens to finished jobs while draining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainPolicy {
    /// Single-connection disconnect: callbacks run as during a poll.
    Dispatch,
    /// Process-wide shutdown: callbacks are skipped so a runtime that is itself
    /// tearing down is never re-entered. References are still released.
    Discard,
}

impl<C: Connector> Connection<C> {
    pub fn phase(&self) -> ShutdownPhase {
        match self.state {
            ConnectionState::Disconnected
            | ConnectionState::Connecting
            | ConnectionState::Connected => ShutdownPhase::Active,
            ConnectionState::ShuttingDown => ShutdownPhase::Draining,
            ConnectionState::Released => ShutdownPhase::Released,
        }
    }

    /// Stop the worker, drain every outstanding job and close the session.
    ///
    /// Blocks until the worker has finished the jobs queued before this call.
    /// Returns the number of jobs drained. Any later call fails with `Shutdown`.
    pub fn disconnect<D: Dispatcher + ?Sized>(
        &mut self,
        dispatcher: &mut D,
        policy: DrainPolicy,
    ) -> Result<usize> {
        if self.phase() != ShutdownPhase::Active {
            return Err(Error::Shutdown);
        }

        info!(conn_id = %self.id, ?policy, "disconnecting");
        self.state = ConnectionState::ShuttingDown;
        self.halt_worker();

        // A handshake nobody polled for still owes its notification.
        if std::mem::take(&mut self.pending_callback) && policy == DrainPolicy::Dispatch {
            if let Some(callback) = self.connect_callback {
                dispatch_connected(self.id, callback, dispatcher);
            }
        }

        let mut drained = 0;
        loop {
            let jobs = self.completions.drain_all();
            if jobs.is_empty() {
                break;
            }
            drained += dispatch_jobs(self.id, jobs, policy, dispatcher);
        }

        self.release_handle();
        self.release_connect_callback(dispatcher);
        self.state = ConnectionState::Released;
        info!(conn_id = %self.id, drained, "released");
        Ok(drained)
    }

    /// Give the connect callback back to the host. Used on release and when a
    /// failed connect discards the connection.
    pub fn release_connect_callback<D: Dispatcher + ?Sized>(&mut self, dispatcher: &mut D) {
        if let Some(callback) = self.connect_callback.take() {
            dispatcher.release(callback);
        }
    }

    fn halt_worker(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            if !worker.halt() {
                warn!(conn_id = %self.id, "draining after worker panic");
            }
        }
    }

    fn release_handle(&mut self) {
        if let Some(client) = self.client.take() {
            lock_recovering(&client).close();
        }
        self.session = None;
    }
}

impl<C: Connector> Drop for Connection<C> {
    fn drop(&mut self) {
        if self.phase() != ShutdownPhase::Active {
            return;
        }
        // Never disconnected: stop the worker and drop its output without a dispatcher.
        self.halt_worker();
        let leftover = self.completions.drain_all().len();
        if leftover > 0 || self.connect_callback.is_some() {
            warn!(
                conn_id = %self.id,
                leftover,
                "connection dropped without disconnect; host references not released"
            );
        }
        self.release_handle();
        self.state = ConnectionState::Released;
    }
}
