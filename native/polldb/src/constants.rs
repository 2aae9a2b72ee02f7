/// Global constants, error codes and atom declarations for PollDb
///
/// This module holds the shared Tokio runtime, the NIF-side connection registry,
/// the native error codes the retry policy reasons about, and atom definitions.
use once_cell::sync::Lazy;
use rustler::atoms;
use std::sync::Mutex;
use tokio::runtime::Runtime;

use crate::libsql_client::LibsqlConnector;
use crate::registry::Registry;

/// Global Tokio runtime for libsql's async API
///
/// Native calls run through `TOKIO_RUNTIME.block_on()` from plain OS threads (a
/// connection's worker, or the host thread during connect). Nothing in this crate
/// calls `block_on` from inside the runtime.
///
/// IMPORTANT: This panics if Tokio runtime creation fails, which only happens when
/// the system has no threads or memory left.
pub static TOKIO_RUNTIME: Lazy<Runtime> = Lazy::new(|| {
    Runtime::new()
        .expect("Failed to initialize Tokio runtime - check system resources and thread limits")
});

/// Registry backing the NIF exports. Rust hosts own their own `Registry` instead.
pub static NIF_REGISTRY: Lazy<Mutex<Registry<LibsqlConnector>>> =
    Lazy::new(|| Mutex::new(Registry::new()));

/// Default timeout for the connect handshake (in seconds)
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Number of times a failed statement is re-sent before its error is reported.
pub const MAX_RETRIES: u32 = 1;

/// Native error codes.
///
/// The client-side codes follow the MySQL client numbering so hosts that already
/// switch on them keep working; the SQLite primary result codes come straight from
/// libsql.
pub mod codes {
    /// Generic SQL error (SQLITE_ERROR)
    pub const SQLITE_ERROR: u32 = 1;
    /// Database file is locked by another connection (SQLITE_BUSY)
    pub const SQLITE_BUSY: u32 = 5;
    /// Table is locked within this connection (SQLITE_LOCKED)
    pub const SQLITE_LOCKED: u32 = 6;
    /// Server is shutting down
    pub const ER_SERVER_SHUTDOWN: u32 = 1053;
    /// Cannot connect through the local socket / handshake failed
    pub const CR_CONNECTION_ERROR: u32 = 2002;
    /// Cannot connect to the host
    pub const CR_CONN_HOST_ERROR: u32 = 2003;
    /// Host lookup failed
    pub const CR_UNKNOWN_HOST: u32 = 2005;
    /// Server has gone away
    pub const CR_SERVER_GONE_ERROR: u32 = 2006;
    /// Lost connection during a query
    pub const CR_SERVER_LOST: u32 = 2013;
    /// Character set could not be initialized
    pub const CR_CANT_READ_CHARSET: u32 = 2019;
    /// Option is unknown or cannot be applied now
    pub const CR_INVALID_CONN_OPTION: u32 = 2046;
}

// Atom declarations for PollDb - used as return values, event tags and option keys
atoms! {
    ok,
    error,
    connected,
    query,
    released,
    host,
    user,
    password,
    database,
    port,
    socket,
    flags,
    plugin_dir,
    retry_codes
}
