//! Per-connection worker loop.
//!
//! One named OS thread per connection pulls jobs from an unbounded FIFO queue and
//! runs them one at a time against the native client. A job is pushed onto the
//! completion channel only after all of its results are built, and the next job
//! is not started before that.
//!
//! Dropping the sender is the stop signal: the thread keeps draining whatever was
//! queued before it, then exits, so `halt` doubles as "finish outstanding work".

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, warn};

use crate::completion::CompletionChannel;
use crate::constants::MAX_RETRIES;
use crate::error::{Error, Result};
use crate::models::{ConnectionId, QueryJob, QueryResult};
use crate::native::{NativeClient, NativeError, ResultSet};
use crate::retry::RetryPolicy;
use crate::utils::lock_recovering;

pub struct Worker {
    conn_id: ConnectionId,
    sender: Option<UnboundedSender<QueryJob>>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    /// Start the worker thread for `conn_id`.
    pub fn spawn<N: NativeClient>(
        conn_id: ConnectionId,
        client: Arc<Mutex<N>>,
        completions: Arc<CompletionChannel>,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let (sender, receiver) = unbounded_channel();
        let thread = std::thread::Builder::new()
            .name(format!("polldb-worker-{conn_id}"))
            .spawn(move || run(conn_id, receiver, &client, &completions, &retry))
            .map_err(|e| Error::Worker(e.to_string()))?;

        Ok(Self {
            conn_id,
            sender: Some(sender),
            thread: Some(thread),
        })
    }

    /// Queue a job. Fails with `Shutdown` once the worker has been halted.
    pub fn post(&self, job: QueryJob) -> Result<()> {
        let sender = self.sender.as_ref().ok_or(Error::Shutdown)?;
        sender.send(job).map_err(|_| Error::Shutdown)
    }

    pub fn is_accepting(&self) -> bool {
        self.sender.is_some()
    }

    /// Stop accepting jobs and wait for the thread to finish everything already queued.
    ///
    /// Returns `false` if the thread panicked. Calling it again is a no-op.
    pub fn halt(&mut self) -> bool {
        self.sender = None;
        match self.thread.take() {
            Some(thread) => match thread.join() {
                Ok(()) => true,
                Err(_) => {
                    error!(conn_id = %self.conn_id, "worker thread panicked");
                    false
                }
            },
            None => true,
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.halt();
    }
}

fn run<N: NativeClient>(
    conn_id: ConnectionId,
    mut receiver: UnboundedReceiver<QueryJob>,
    client: &Mutex<N>,
    completions: &CompletionChannel,
    retry: &RetryPolicy,
) {
    debug!(%conn_id, "worker started");
    while let Some(mut job) = receiver.blocking_recv() {
        debug!(%conn_id, sql_len = job.sql().len(), "query started");
        {
            let mut native = lock_recovering(client);
            execute_job(&mut *native, &mut job, retry);
        }
        debug!(%conn_id, results = job.results().len(), "query finished");
        completions.push(job);
    }
    debug!(%conn_id, "worker stopped");
}

/// Run one job against `native`, retrying at most once, and attach its results.
///
/// On success every result set becomes a `QueryResult` with error code 0. On a
/// final failure a single result carries the code and message and no rows.
pub fn execute_job<N: NativeClient + ?Sized>(
    native: &mut N,
    job: &mut QueryJob,
    retry: &RetryPolicy,
) {
    let mut failure: Option<NativeError> = None;

    for attempt in 0..=MAX_RETRIES {
        match native.execute(job.sql()) {
            Ok(sets) => {
                attach_result_sets(job, sets);
                return;
            }
            Err(err) => {
                if attempt < MAX_RETRIES && retry.should_retry(err.code) {
                    warn!(attempt, code = err.code, error = %err.message, "retrying query");
                    continue;
                }
                failure = Some(err);
                break;
            }
        }
    }

    if let Some(err) = failure {
        debug!(code = err.code, error = %err.message, "query failed");
        job.push_result(QueryResult::new(None, err.code, err.message, 0, 0));
    }
}

fn attach_result_sets(job: &mut QueryJob, sets: Vec<ResultSet>) {
    if sets.is_empty() {
        job.push_result(QueryResult::new(None, 0, String::new(), 0, 0));
        return;
    }

    for set in sets {
        job.push_result(QueryResult::new(
            set.rows,
            0,
            String::new(),
            set.affected_rows,
            set.last_insert_id,
        ));
    }
}
