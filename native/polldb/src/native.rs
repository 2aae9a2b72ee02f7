/// Seam between the engine and a database client library
///
/// The engine only needs a handful of primitives from the client: open a session
/// with options, run a (possibly multi-statement) SQL text and materialize every
/// result set, tweak options, and report session metadata. `Connector` opens
/// sessions, `NativeClient` is the session itself.
use std::fmt;
use std::str::FromStr;

use crate::escape::EscapeStyle;
use crate::models::{ConnectParams, RowSet, SessionInfo};

/// Error reported by the native client: numeric code plus diagnostic text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError {
    pub code: u32,
    pub message: String,
}

impl NativeError {
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for NativeError {}

/// One result set materialized by the native client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    /// `None` when the statement produced no rows (DDL, DML without RETURNING)
    pub rows: Option<RowSet>,
    pub affected_rows: u64,
    pub last_insert_id: i64,
}

/// Client options that can be set before or after connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientOption {
    /// Re-establish the session transparently when it drops ("0" / "1")
    Reconnect,
    /// Directory the client loads plugins from
    PluginDir,
    /// Handshake timeout in seconds
    ConnectTimeout,
    /// How long to wait on a locked database, in milliseconds
    BusyTimeout,
    /// Key for encryption at rest (local databases, before connect only)
    EncryptionKey,
    /// SQL run right after the session is opened
    InitCommand,
}

impl ClientOption {
    pub fn name(self) -> &'static str {
        match self {
            ClientOption::Reconnect => "reconnect",
            ClientOption::PluginDir => "plugin_dir",
            ClientOption::ConnectTimeout => "connect_timeout",
            ClientOption::BusyTimeout => "busy_timeout",
            ClientOption::EncryptionKey => "encryption_key",
            ClientOption::InitCommand => "init_command",
        }
    }
}

impl FromStr for ClientOption {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_ascii_lowercase().as_str() {
            "reconnect" => Ok(ClientOption::Reconnect),
            "plugin_dir" => Ok(ClientOption::PluginDir),
            "connect_timeout" => Ok(ClientOption::ConnectTimeout),
            "busy_timeout" => Ok(ClientOption::BusyTimeout),
            "encryption_key" => Ok(ClientOption::EncryptionKey),
            "init_command" => Ok(ClientOption::InitCommand),
            other => Err(format!("Unknown option: {other}")),
        }
    }
}

/// Opens native sessions.
pub trait Connector: Send + Sync + 'static {
    type Client: NativeClient;

    /// Open a session and apply `options` in order before the handshake completes.
    fn connect(
        &self,
        params: &ConnectParams,
        options: &[(ClientOption, String)],
    ) -> Result<Self::Client, NativeError>;
}

/// An open native session. Not safe for concurrent use: callers serialize access.
pub trait NativeClient: Send + 'static {
    /// Run `sql` and return every result set it produced, in order.
    fn execute(&mut self, sql: &str) -> Result<Vec<ResultSet>, NativeError>;

    fn set_option(&mut self, option: ClientOption, value: &str) -> Result<(), NativeError>;

    fn set_character_set(&mut self, charset: &str) -> Result<(), NativeError>;

    fn session_info(&self) -> SessionInfo;

    /// Escaping rules of this client's SQL dialect.
    fn escape_style(&self) -> EscapeStyle;

    /// Close the session. Later calls report an error instead of touching a dead handle.
    fn close(&mut self);
}
