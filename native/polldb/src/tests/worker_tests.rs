//! Worker tests
//!
//! Retry handling and result attachment run against the scripted client
//! directly; queue order and halting go through a real worker thread.

// Allow unwrap() in tests for cleaner test code
#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::test_utils::{wait_until, ScriptedClient, ScriptedConnector};
use crate::completion::CompletionChannel;
use crate::constants::codes;
use crate::error::Error;
use crate::models::{ConnectParams, ConnectionId, HostRef, QueryJob, Value};
use crate::native::{Connector, NativeError};
use crate::retry::RetryPolicy;
use crate::worker::{execute_job, Worker};

fn scripted_client(connector: &ScriptedConnector) -> ScriptedClient {
    connector
        .connect(&ConnectParams::local(":memory:"), &[])
        .unwrap()
}

fn run(connector: &ScriptedConnector, sql: &str, retry: &RetryPolicy) -> QueryJob {
    let mut client = scripted_client(connector);
    let mut job = QueryJob::new(sql, Some(HostRef(1)), None, true);
    execute_job(&mut client, &mut job, retry);
    job
}

#[test]
fn test_retry_once_after_connection_loss() {
    let connector = ScriptedConnector::new();
    connector
        .script
        .lock()
        .unwrap()
        .failures
        .push_back(NativeError::new(codes::CR_SERVER_LOST, "Lost connection"));

    let job = run(&connector, "SELECT x", &RetryPolicy::default());

    assert_eq!(job.results().len(), 1, "a retried job carries one result");
    let result = &job.results()[0];
    assert_eq!(result.error_code(), 0);
    assert!(result.error().is_empty());
    let rows = result.rows().unwrap();
    assert_eq!(rows.rows[0][1], Value::Integer(2), "rows come from the second attempt");
    assert_eq!(connector.script.lock().unwrap().executed.len(), 2);
}

#[test]
fn test_terminal_error_is_not_retried() {
    let connector = ScriptedConnector::new();
    connector
        .script
        .lock()
        .unwrap()
        .failures
        .push_back(NativeError::new(codes::CR_CONN_HOST_ERROR, "Can't connect"));

    let job = run(&connector, "SELECT x", &RetryPolicy::default());

    assert_eq!(job.results().len(), 1);
    assert_eq!(job.results()[0].error_code(), codes::CR_CONN_HOST_ERROR);
    assert_eq!(job.results()[0].error(), "Can't connect");
    assert!(job.results()[0].rows().is_none());
    assert_eq!(connector.script.lock().unwrap().executed.len(), 1);
}

#[test]
fn test_at_most_one_retry() {
    let connector = ScriptedConnector::new();
    {
        let mut script = connector.script.lock().unwrap();
        script
            .failures
            .push_back(NativeError::new(codes::CR_SERVER_GONE_ERROR, "gone"));
        script
            .failures
            .push_back(NativeError::new(codes::CR_SERVER_GONE_ERROR, "gone again"));
    }

    let job = run(&connector, "SELECT x", &RetryPolicy::default());

    assert_eq!(job.results().len(), 1);
    assert_eq!(job.results()[0].error_code(), codes::CR_SERVER_GONE_ERROR);
    assert_eq!(job.results()[0].error(), "gone again");
    assert_eq!(connector.script.lock().unwrap().executed.len(), 2);
}

#[test]
fn test_never_policy_does_not_retry() {
    let connector = ScriptedConnector::new();
    connector
        .script
        .lock()
        .unwrap()
        .failures
        .push_back(NativeError::new(codes::CR_SERVER_LOST, "Lost connection"));

    let job = run(&connector, "SELECT x", &RetryPolicy::never());

    assert_eq!(job.results()[0].error_code(), codes::CR_SERVER_LOST);
    assert_eq!(connector.script.lock().unwrap().executed.len(), 1);
}

#[test]
fn test_multiple_result_sets_in_order() {
    let connector = ScriptedConnector::new();
    let job = run(
        &connector,
        "SELECT 1; SELECT 2; SELECT 3",
        &RetryPolicy::default(),
    );

    assert_eq!(job.results().len(), 3);
    for (i, result) in job.results().iter().enumerate() {
        assert_eq!(result.error_code(), 0);
        let rows = result.rows().unwrap();
        assert_eq!(rows.rows[0][0], Value::Text(format!("SELECT {}", i + 1)));
    }
}

#[test]
fn test_statement_without_rows() {
    let connector = ScriptedConnector::new();
    let job = run(&connector, "UPDATE t SET a = 1", &RetryPolicy::default());

    assert_eq!(job.results().len(), 1);
    let result = &job.results()[0];
    assert!(result.is_success());
    assert!(result.rows().is_none());
    assert_eq!(result.affected_rows(), 1);
    assert_eq!(result.last_insert_id(), 1);
}

#[test]
fn test_empty_sql_yields_one_empty_result() {
    let connector = ScriptedConnector::new();
    let job = run(&connector, "  ", &RetryPolicy::default());

    assert_eq!(job.results().len(), 1);
    assert!(job.results()[0].is_success());
    assert!(job.results()[0].rows().is_none());
    assert_eq!(job.results()[0].affected_rows(), 0);
}

fn spawn_worker(connector: &ScriptedConnector) -> (Worker, Arc<CompletionChannel>) {
    let client = Arc::new(Mutex::new(scripted_client(connector)));
    let completions = Arc::new(CompletionChannel::new());
    let worker = Worker::spawn(
        ConnectionId(7),
        client,
        Arc::clone(&completions),
        RetryPolicy::default(),
    )
    .unwrap();
    (worker, completions)
}

#[test]
fn test_worker_completes_jobs_in_fifo_order() {
    let connector = ScriptedConnector::with_delay(Duration::from_millis(2));
    let (worker, completions) = spawn_worker(&connector);

    for i in 0..20 {
        worker
            .post(QueryJob::new(format!("SELECT {i}"), Some(HostRef(i)), None, true))
            .unwrap();
    }

    assert!(wait_until(Duration::from_secs(10), || completions.len() == 20));

    let order: Vec<u64> = completions
        .drain_all()
        .iter()
        .map(|job| job.callback().unwrap().0)
        .collect();
    assert_eq!(order, (0..20).collect::<Vec<_>>());

    let executed = connector.script.lock().unwrap().executed.clone();
    let expected: Vec<String> = (0..20).map(|i| format!("SELECT {i}")).collect();
    assert_eq!(executed, expected);
}

#[test]
fn test_halt_finishes_queued_jobs() {
    let connector = ScriptedConnector::with_delay(Duration::from_millis(10));
    let (mut worker, completions) = spawn_worker(&connector);

    for i in 0..5 {
        worker
            .post(QueryJob::new(format!("SELECT {i}"), None, None, false))
            .unwrap();
    }

    assert!(worker.halt());
    assert_eq!(completions.len(), 5, "halt waits for every queued job");
    assert!(!worker.is_accepting());
}

#[test]
fn test_post_after_halt_is_refused() {
    let connector = ScriptedConnector::new();
    let (mut worker, completions) = spawn_worker(&connector);

    assert!(worker.halt());
    let result = worker.post(QueryJob::new("SELECT 1", None, None, false));

    assert_eq!(result, Err(Error::Shutdown));
    assert!(completions.is_empty());
    assert!(worker.halt(), "halting twice is a no-op");
}
