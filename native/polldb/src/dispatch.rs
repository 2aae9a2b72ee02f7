//! Consumer-side callback dispatch.
//!
//! The host injects a `Dispatcher`; the engine hands it callback tokens and
//! results and never looks inside a token. A dispatcher error is reported
//! through `report_error` and never stops the remaining jobs from being
//! dispatched.

use thiserror::Error;
use tracing::debug;

use crate::lifecycle::DrainPolicy;
use crate::models::{ConnectionId, HostRef, QueryJob};

/// Error raised by the host while running a callback.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct DispatchError(pub String);

impl DispatchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Host-side callback invocation.
pub trait Dispatcher {
    /// The connection finished its handshake.
    fn on_connected(&mut self, conn: ConnectionId, callback: HostRef)
        -> Result<(), DispatchError>;

    /// A query finished. `job.callback()` is always `Some` here.
    fn on_query_complete(
        &mut self,
        conn: ConnectionId,
        callback: HostRef,
        job: &QueryJob,
    ) -> Result<(), DispatchError>;

    /// Non-fatal error channel of the host.
    fn report_error(&mut self, message: &str);

    /// The engine no longer holds `token`. Called exactly once per token.
    fn release(&mut self, token: HostRef);
}

/// Dispatch (or discard) drained jobs in completion order, releasing every host
/// reference they held. Returns the number of jobs consumed.
pub fn dispatch_jobs<D: Dispatcher + ?Sized>(
    conn: ConnectionId,
    jobs: Vec<QueryJob>,
    policy: DrainPolicy,
    dispatcher: &mut D,
) -> usize {
    let count = jobs.len();

    for job in jobs {
        if policy == DrainPolicy::Dispatch {
            if let Some(callback) = job.callback() {
                if let Err(err) = dispatcher.on_query_complete(conn, callback, &job) {
                    report(dispatcher, &err);
                }
            }
        }

        for token in job.into_host_refs() {
            dispatcher.release(token);
        }
    }

    if count > 0 {
        debug!(conn_id = %conn, count, ?policy, "dispatched completed queries");
    }
    count
}

/// Invoke the connect callback, reporting (not propagating) a host error.
pub fn dispatch_connected<D: Dispatcher + ?Sized>(
    conn: ConnectionId,
    callback: HostRef,
    dispatcher: &mut D,
) {
    if let Err(err) = dispatcher.on_connected(conn, callback) {
        report(dispatcher, &err);
    }
}

// The host's error printer does not append a newline itself.
fn report<D: Dispatcher + ?Sized>(dispatcher: &mut D, err: &DispatchError) {
    dispatcher.report_error(&format!("{err}\n"));
}
