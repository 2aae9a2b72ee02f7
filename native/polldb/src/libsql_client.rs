/// Native client backed by libsql (local files, in-memory databases, remote servers)
///
/// libsql's API is async; every call here runs through `TOKIO_RUNTIME.block_on()`
/// from a plain OS thread, either the host thread while connecting or the
/// connection's worker thread while executing.
use bytes::Bytes;
use libsql::{Builder, Cipher, EncryptionConfig};
use std::time::Duration;
use tracing::{debug, warn};

use crate::constants::codes::*;
use crate::constants::{DEFAULT_CONNECT_TIMEOUT_SECS, TOKIO_RUNTIME};
use crate::escape::EscapeStyle;
use crate::models::{ConnectParams, SessionInfo};
use crate::native::{ClientOption, Connector, NativeClient, NativeError, ResultSet};
use crate::utils::{collect_rows, split_statements};

/// Minimum length of an encryption key
const MIN_ENCRYPTION_KEY_LEN: usize = 32;

/// Opens libsql sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibsqlConnector;

impl Connector for LibsqlConnector {
    type Client = LibsqlClient;

    fn connect(
        &self,
        params: &ConnectParams,
        options: &[(ClientOption, String)],
    ) -> Result<LibsqlClient, NativeError> {
        let mut settings = Settings::default();
        for (option, value) in options {
            settings.apply(*option, value)?;
        }

        let session = open_session(params, &settings)?;
        let info = TOKIO_RUNTIME.block_on(describe_session(params, &session))?;
        debug!(server = %info.server_info, host = %info.host_info, "libsql session open");

        Ok(LibsqlClient {
            params: params.clone(),
            settings,
            session: Some(session),
            info,
        })
    }
}

/// Option values in effect for one client.
#[derive(Debug, Clone)]
struct Settings {
    reconnect: bool,
    plugin_dir: Option<String>,
    connect_timeout: Duration,
    busy_timeout: Option<Duration>,
    encryption_key: Option<String>,
    init_command: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            reconnect: false,
            plugin_dir: None,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            busy_timeout: None,
            encryption_key: None,
            init_command: None,
        }
    }
}

impl Settings {
    fn apply(&mut self, option: ClientOption, value: &str) -> Result<(), NativeError> {
        match option {
            ClientOption::Reconnect => self.reconnect = parse_flag(option, value)?,
            ClientOption::PluginDir => self.plugin_dir = Some(value.to_string()),
            ClientOption::ConnectTimeout => {
                self.connect_timeout = Duration::from_secs(parse_number(option, value)?);
            }
            ClientOption::BusyTimeout => {
                self.busy_timeout = Some(Duration::from_millis(parse_number(option, value)?));
            }
            ClientOption::EncryptionKey => {
                if value.len() < MIN_ENCRYPTION_KEY_LEN {
                    return Err(invalid_option(
                        option,
                        format!("must be at least {MIN_ENCRYPTION_KEY_LEN} characters"),
                    ));
                }
                self.encryption_key = Some(value.to_string());
            }
            ClientOption::InitCommand => self.init_command = Some(value.to_string()),
        }
        Ok(())
    }
}

fn invalid_option(option: ClientOption, reason: impl std::fmt::Display) -> NativeError {
    NativeError::new(
        CR_INVALID_CONN_OPTION,
        format!("Invalid value for option {}: {reason}", option.name()),
    )
}

fn parse_flag(option: ClientOption, value: &str) -> Result<bool, NativeError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => Err(invalid_option(option, format!("expected a boolean, got {other:?}"))),
    }
}

fn parse_number(option: ClientOption, value: &str) -> Result<u64, NativeError> {
    value
        .trim()
        .parse()
        .map_err(|e| invalid_option(option, format!("{e}")))
}

struct Session {
    // Kept alive for the lifetime of `conn`
    _db: libsql::Database,
    conn: libsql::Connection,
    remote: bool,
}

/// URL of a remote server: `host` as given when it carries a scheme, otherwise
/// `http://host[:port]`.
pub fn remote_url(params: &ConnectParams) -> String {
    if params.host.contains("://") {
        params.host.clone()
    } else if params.port == 0 {
        format!("http://{}", params.host)
    } else {
        format!("http://{}:{}", params.host, params.port)
    }
}

fn local_path(params: &ConnectParams) -> String {
    if params.database.is_empty() {
        ":memory:".to_string()
    } else {
        params.database.clone()
    }
}

fn open_session(params: &ConnectParams, settings: &Settings) -> Result<Session, NativeError> {
    let timeout = settings.connect_timeout;

    // Wrap the entire connection process with a timeout using the global runtime.
    TOKIO_RUNTIME.block_on(async {
        match tokio::time::timeout(timeout, handshake(params, settings)).await {
            Ok(result) => result,
            Err(_) => Err(NativeError::new(
                CR_CONNECTION_ERROR,
                format!("Connection timeout after {} seconds", timeout.as_secs()),
            )),
        }
    })
}

async fn handshake(params: &ConnectParams, settings: &Settings) -> Result<Session, NativeError> {
    let remote = !params.is_local();
    let db = if remote {
        Builder::new_remote(remote_url(params), params.password.clone())
            .build()
            .await
    } else {
        let mut builder = Builder::new_local(local_path(params));

        if let Some(key) = &settings.encryption_key {
            let config = EncryptionConfig {
                cipher: Cipher::Aes256Cbc,
                encryption_key: Bytes::from(key.clone()),
            };
            builder = builder.encryption_config(config);
        }

        builder.build().await
    }
    .map_err(|e| NativeError::new(connect_code(remote), format!("Failed to build DB: {e}")))?;

    let conn = db
        .connect()
        .map_err(|e| NativeError::new(connect_code(remote), format!("Failed to connect: {e}")))?;

    // Ping remote connections to verify they're accessible
    if remote {
        conn.query("SELECT 1", ())
            .await
            .map_err(|e| NativeError::new(CR_CONN_HOST_ERROR, format!("Failed ping: {e}")))?;
    }

    if let Some(busy) = settings.busy_timeout {
        conn.busy_timeout(busy)
            .map_err(|e| invalid_option(ClientOption::BusyTimeout, e))?;
    }

    if let Some(command) = &settings.init_command {
        conn.execute_batch(command)
            .await
            .map_err(|e| invalid_option(ClientOption::InitCommand, e))?;
    }

    Ok(Session {
        _db: db,
        conn,
        remote,
    })
}

fn connect_code(remote: bool) -> u32 {
    if remote {
        CR_CONN_HOST_ERROR
    } else {
        CR_CONNECTION_ERROR
    }
}

async fn describe_session(
    params: &ConnectParams,
    session: &Session,
) -> Result<SessionInfo, NativeError> {
    let mut rows = session
        .conn
        .query("SELECT sqlite_version()", ())
        .await
        .map_err(|e| map_error(&e))?;

    let version: String = match rows.next().await.map_err(|e| map_error(&e))? {
        Some(row) => row.get(0).map_err(|e| map_error(&e))?,
        None => String::new(),
    };

    let host_info = if session.remote {
        format!("{} via HTTP", remote_url(params))
    } else {
        format!("{} via file", local_path(params))
    };

    Ok(SessionInfo {
        server_info: format!("SQLite {version} (libsql)"),
        host_info,
        server_version: parse_version(&version),
    })
}

/// `"3.45.1"` → `34501`
pub fn parse_version(version: &str) -> u64 {
    let mut parts = version
        .split('.')
        .map(|part| part.trim().parse::<u64>().unwrap_or(0));
    let major = parts.next().unwrap_or(0);
    let minor = parts.next().unwrap_or(0);
    let patch = parts.next().unwrap_or(0);
    major * 10_000 + minor * 100 + patch
}

/// Map a libsql error onto a native error code.
///
/// SQLite failures keep their primary result code. Only `ConnectionFailed`, the
/// variant libsql raises when the session itself is gone, becomes
/// `CR_SERVER_LOST` and so is eligible for retry; everything else, server-side
/// SQL errors of remote sessions included, is reported as `SQLITE_ERROR`.
pub fn map_error(err: &libsql::Error) -> NativeError {
    match err {
        libsql::Error::SqliteFailure(code, message) => {
            NativeError::new((*code as u32) & 0xff, message.clone())
        }
        libsql::Error::ConnectionFailed(message) => {
            NativeError::new(CR_SERVER_LOST, message.clone())
        }
        other => NativeError::new(SQLITE_ERROR, other.to_string()),
    }
}

/// Run one statement and snapshot its counters before the next one starts.
async fn run_statement(
    conn: &libsql::Connection,
    sql: &str,
) -> Result<ResultSet, libsql::Error> {
    let stmt = conn.prepare(sql).await?;

    if stmt.column_count() == 0 {
        let changes = stmt.execute(()).await?;
        return Ok(ResultSet {
            rows: None,
            affected_rows: changes as u64,
            last_insert_id: conn.last_insert_rowid(),
        });
    }

    let rows = collect_rows(stmt.query(()).await?).await?;
    Ok(ResultSet {
        affected_rows: rows.as_ref().map_or(0, |set| set.len() as u64),
        rows,
        last_insert_id: conn.last_insert_rowid(),
    })
}

/// A libsql session.
pub struct LibsqlClient {
    params: ConnectParams,
    settings: Settings,
    session: Option<Session>,
    info: SessionInfo,
}

impl LibsqlClient {
    fn session(&self) -> Result<&Session, NativeError> {
        self.session
            .as_ref()
            .ok_or_else(|| NativeError::new(CR_SERVER_GONE_ERROR, "Connection is closed"))
    }

    /// Reopen the session after a lost connection, when reconnect is enabled.
    fn try_reconnect(&mut self) {
        if !self.settings.reconnect || self.session.is_none() {
            return;
        }
        match open_session(&self.params, &self.settings) {
            Ok(session) => {
                debug!("libsql session re-established");
                self.session = Some(session);
            }
            Err(err) => warn!(code = err.code, error = %err.message, "reconnect failed"),
        }
    }
}

impl NativeClient for LibsqlClient {
    fn execute(&mut self, sql: &str) -> Result<Vec<ResultSet>, NativeError> {
        let session = self.session()?;
        let statements = split_statements(sql);

        let outcome = TOKIO_RUNTIME.block_on(async {
            let mut sets = Vec::with_capacity(statements.len());
            for statement in statements {
                let set = run_statement(&session.conn, statement)
                    .await
                    .map_err(|e| map_error(&e))?;
                sets.push(set);
            }
            Ok::<_, NativeError>(sets)
        });

        if let Err(err) = &outcome {
            if err.code == CR_SERVER_LOST {
                self.try_reconnect();
            }
        }
        outcome
    }

    fn set_option(&mut self, option: ClientOption, value: &str) -> Result<(), NativeError> {
        match option {
            ClientOption::EncryptionKey => Err(invalid_option(
                option,
                "encryption must be configured before connecting",
            )),
            ClientOption::BusyTimeout => {
                self.settings.apply(option, value)?;
                if let Some(busy) = self.settings.busy_timeout {
                    self.session()?
                        .conn
                        .busy_timeout(busy)
                        .map_err(|e| invalid_option(option, e))?;
                }
                Ok(())
            }
            // Recorded; takes effect on the next (re)connect
            _ => self.settings.apply(option, value),
        }
    }

    fn set_character_set(&mut self, charset: &str) -> Result<(), NativeError> {
        self.session()?;
        match charset.to_ascii_lowercase().as_str() {
            "utf8" | "utf8mb4" | "utf-8" => Ok(()),
            _ => Err(NativeError::new(
                CR_CANT_READ_CHARSET,
                format!("Can't initialize character set {charset}"),
            )),
        }
    }

    fn session_info(&self) -> SessionInfo {
        self.info.clone()
    }

    fn escape_style(&self) -> EscapeStyle {
        EscapeStyle::QuoteDoubling
    }

    fn close(&mut self) {
        self.session = None;
    }
}
