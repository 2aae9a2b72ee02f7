/// Data structures shared by the engine and the NIF layer
///
/// This module defines connection parameters, host reference tokens, row values,
/// and the query job / result model that flows from the worker to the host.
use std::fmt;

/// Identity of a connection inside its `Registry`. Assigned at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle to a host-side object (a callback function or per-call data).
///
/// The engine never interprets the token. It only hands it back to the
/// `Dispatcher`, either to invoke it or to release it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostRef(pub u64);

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Constructed, no native handle yet
    Disconnected,
    /// Handshake in progress
    Connecting,
    /// Handshake succeeded, worker running
    Connected,
    /// Disconnect requested; no new work is accepted
    ShuttingDown,
    /// Worker stopped and native handle closed (terminal)
    Released,
}

/// Parameters used to open the native session.
///
/// For the libsql backend an empty `host` selects a local database at `database`
/// (`:memory:` included); otherwise `host` names a remote server and `password`
/// is sent as its auth token.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectParams {
    pub host: String,
    pub user: String,
    pub password: String,
    pub database: String,
    /// 0 selects the backend default
    pub port: u16,
    pub socket: Option<String>,
    pub client_flags: u64,
}

impl ConnectParams {
    /// Parameters for a local database file.
    pub fn local(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Self::default()
        }
    }

    /// Parameters for a remote server authenticated by `token`.
    pub fn remote(host: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            password: token.into(),
            ..Self::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn with_socket(mut self, socket: impl Into<String>) -> Self {
        self.socket = Some(socket.into());
        self
    }

    pub fn is_local(&self) -> bool {
        self.host.is_empty()
    }
}

// Keep credentials out of logs
impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("port", &self.port)
            .field("socket", &self.socket)
            .field("client_flags", &self.client_flags)
            .finish()
    }
}

/// Server metadata captured once the handshake succeeds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionInfo {
    pub server_info: String,
    pub host_info: String,
    /// major * 10000 + minor * 100 + patch
    pub server_version: u64,
}

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    /// Host view of the value.
    ///
    /// With `use_numbers` numeric values stay numeric; without it every number is
    /// delivered as its decimal text, the way string-typed hosts expect rows.
    pub fn coerce(&self, use_numbers: bool) -> Value {
        match self {
            Value::Integer(v) if !use_numbers => Value::Text(v.to_string()),
            Value::Real(v) if !use_numbers => Value::Text(v.to_string()),
            other => other.clone(),
        }
    }
}

/// Rows produced by one result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows with every value passed through `Value::coerce`.
    pub fn coerced_rows(&self, use_numbers: bool) -> Vec<Vec<Value>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(|v| v.coerce(use_numbers)).collect())
            .collect()
    }
}

/// Immutable outcome of one result set of one statement execution.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    rows: Option<RowSet>,
    error_code: u32,
    error: String,
    affected_rows: u64,
    last_insert_id: i64,
}

impl QueryResult {
    pub fn new(
        rows: Option<RowSet>,
        error_code: u32,
        error: String,
        affected_rows: u64,
        last_insert_id: i64,
    ) -> Self {
        Self {
            rows,
            error_code,
            error,
            affected_rows,
            last_insert_id,
        }
    }

    /// Row set, or `None` when the statement produced no rows.
    pub fn rows(&self) -> Option<&RowSet> {
        self.rows.as_ref()
    }

    /// Native error code, 0 on success.
    pub fn error_code(&self) -> u32 {
        self.error_code
    }

    /// Native error text, empty on success.
    pub fn error(&self) -> &str {
        &self.error
    }

    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    pub fn last_insert_id(&self) -> i64 {
        self.last_insert_id
    }

    pub fn is_success(&self) -> bool {
        self.error_code == 0
    }
}

/// One queued unit of work.
///
/// Owned by exactly one container at a time: the worker queue, the worker, the
/// completion channel, then the dispatcher. Only the worker appends results.
#[derive(Debug)]
pub struct QueryJob {
    sql: String,
    callback: Option<HostRef>,
    aux: Option<HostRef>,
    use_numbers: bool,
    results: Vec<QueryResult>,
}

impl QueryJob {
    pub fn new(
        sql: impl Into<String>,
        callback: Option<HostRef>,
        aux: Option<HostRef>,
        use_numbers: bool,
    ) -> Self {
        Self {
            sql: sql.into(),
            callback,
            aux,
            use_numbers,
            results: Vec::new(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn callback(&self) -> Option<HostRef> {
        self.callback
    }

    pub fn aux(&self) -> Option<HostRef> {
        self.aux
    }

    pub fn use_numbers(&self) -> bool {
        self.use_numbers
    }

    /// Results in result-set order.
    pub fn results(&self) -> &[QueryResult] {
        &self.results
    }

    pub(crate) fn push_result(&mut self, result: QueryResult) {
        self.results.push(result);
    }

    /// Consumes the job, yielding the host references it held.
    pub fn into_host_refs(self) -> impl Iterator<Item = HostRef> {
        self.callback.into_iter().chain(self.aux)
    }
}
