//! Registry tests

// Allow unwrap() in tests for cleaner test code
#![allow(clippy::unwrap_used)]

use std::sync::Mutex;
use std::time::Duration;

use super::test_utils::{RecordingDispatcher, ScriptedConnector};
use crate::connection::ConnectionConfig;
use crate::constants::codes;
use crate::error::Error;
use crate::models::{ConnectParams, ConnectionId, HostRef};
use crate::native::NativeError;
use crate::registry::{connect_shared, Registry};

fn register(
    registry: &mut Registry<ScriptedConnector>,
    connector: ScriptedConnector,
    callback: Option<HostRef>,
) -> ConnectionId {
    registry.register(
        ConnectParams::local(":memory:"),
        connector,
        ConnectionConfig::default(),
        callback,
    )
}

#[test]
fn test_ids_start_at_one_and_increase() {
    let mut registry = Registry::new();

    let ids: Vec<_> = (0..3)
        .map(|_| register(&mut registry, ScriptedConnector::new(), None))
        .collect();

    assert_eq!(ids, vec![ConnectionId(1), ConnectionId(2), ConnectionId(3)]);
    assert_eq!(registry.len(), 3);
}

#[test]
fn test_ids_are_not_reused() {
    let mut registry = Registry::new();
    let mut dispatcher = RecordingDispatcher::new();

    let first = register(&mut registry, ScriptedConnector::new(), None);
    registry.connect(first, &mut dispatcher).unwrap();
    registry.disconnect(first, &mut dispatcher).unwrap();
    let second = register(&mut registry, ScriptedConnector::new(), None);

    assert_eq!(second, ConnectionId(2));
    assert!(!registry.contains(first));
}

#[test]
fn test_unknown_id_is_shutdown() {
    let mut registry: Registry<ScriptedConnector> = Registry::new();
    let mut dispatcher = RecordingDispatcher::new();

    assert!(matches!(registry.get(ConnectionId(42)), Err(Error::Shutdown)));
    assert!(matches!(
        registry.connect(ConnectionId(42), &mut dispatcher),
        Err(Error::Shutdown)
    ));
    assert!(matches!(
        registry.disconnect(ConnectionId(42), &mut dispatcher),
        Err(Error::Shutdown)
    ));
}

#[test]
fn test_failed_connect_removes_entry_and_releases_callback() {
    let mut registry = Registry::new();
    let mut dispatcher = RecordingDispatcher::new();
    let connector = ScriptedConnector::refusing(NativeError::new(
        codes::CR_CONN_HOST_ERROR,
        "Can't connect to server",
    ));
    let id = register(&mut registry, connector, Some(HostRef(9)));

    let err = registry.connect(id, &mut dispatcher).unwrap_err();

    assert!(matches!(err, Error::Connect { .. }));
    assert_eq!(err.to_string(), "Can't connect to server");
    assert!(!registry.contains(id));
    assert_eq!(dispatcher.released, vec![HostRef(9)]);
    assert!(dispatcher.connected.is_empty());
}

#[test]
fn test_disconnect_removes_and_dispatches() {
    let mut registry = Registry::new();
    let mut dispatcher = RecordingDispatcher::new();
    let id = register(&mut registry, ScriptedConnector::new(), Some(HostRef(9)));
    registry.connect(id, &mut dispatcher).unwrap();

    {
        let shared = registry.get(id).unwrap();
        let conn = shared.lock().unwrap();
        conn.queue_query("SELECT 1", Some(HostRef(1)), None, true)
            .unwrap();
    }
    let drained = registry.disconnect(id, &mut dispatcher).unwrap();

    assert_eq!(drained, 1);
    assert!(registry.is_empty());
    assert_eq!(dispatcher.connected, vec![(id, HostRef(9))]);
    assert_eq!(dispatcher.completed_callbacks(), vec![HostRef(1)]);
    assert_eq!(dispatcher.released, vec![HostRef(1), HostRef(9)]);
}

#[test]
fn test_shutdown_all_discards_callbacks() {
    let mut registry = Registry::new();
    let mut dispatcher = RecordingDispatcher::new();

    let mut ids = Vec::new();
    for n in 0..3u64 {
        let id = register(
            &mut registry,
            ScriptedConnector::with_delay(Duration::from_millis(2)),
            Some(HostRef(100 + n)),
        );
        registry.connect(id, &mut dispatcher).unwrap();
        ids.push(id);
    }
    // Registered but never connected
    register(&mut registry, ScriptedConnector::new(), Some(HostRef(200)));

    for (n, id) in ids.iter().enumerate() {
        let shared = registry.get(*id).unwrap();
        let conn = shared.lock().unwrap();
        let n = n as u64;
        conn.queue_query("SELECT 1", Some(HostRef(n)), Some(HostRef(10 + n)), true)
            .unwrap();
    }

    let drained = registry.shutdown_all(&mut dispatcher);

    assert_eq!(drained, 3);
    assert!(registry.is_empty());
    assert!(dispatcher.completed.is_empty());
    assert!(dispatcher.connected.is_empty());
    assert_eq!(dispatcher.released.len(), 10);
    for token in [0, 1, 2, 10, 11, 12, 100, 101, 102, 200] {
        assert!(dispatcher.released.contains(&HostRef(token)));
    }
}

#[test]
fn test_connect_shared_failure_reports_release() {
    let registry = Mutex::new(Registry::new());
    let mut dispatcher = RecordingDispatcher::new();
    let id = register(
        &mut registry.lock().unwrap(),
        ScriptedConnector::refusing(NativeError::new(codes::CR_UNKNOWN_HOST, "Unknown host")),
        Some(HostRef(9)),
    );

    let err = connect_shared(&registry, id, &mut dispatcher).unwrap_err();

    assert_eq!(err, Error::connect("Unknown host"));
    assert_eq!(dispatcher.released, vec![HostRef(9)]);
    assert!(!registry.lock().unwrap().contains(id));
    assert!(matches!(
        connect_shared(&registry, id, &mut dispatcher),
        Err(Error::Shutdown)
    ));
    assert_eq!(dispatcher.released.len(), 1, "released exactly once");
}

#[test]
fn test_connect_shared_success_keeps_entry() {
    let registry = Mutex::new(Registry::new());
    let mut dispatcher = RecordingDispatcher::new();
    let id = register(
        &mut registry.lock().unwrap(),
        ScriptedConnector::new(),
        Some(HostRef(9)),
    );

    connect_shared(&registry, id, &mut dispatcher).unwrap();

    assert!(dispatcher.released.is_empty());
    let shared = registry.lock().unwrap().get(id).unwrap();
    assert_eq!(shared.lock().unwrap().is_connected(), Ok(true));
    assert_eq!(
        connect_shared(&registry, id, &mut dispatcher),
        Err(Error::AlreadyConnected)
    );
    assert!(dispatcher.released.is_empty());

    registry
        .lock()
        .unwrap()
        .disconnect(id, &mut dispatcher)
        .unwrap();
    assert_eq!(dispatcher.released, vec![HostRef(9)]);
}
