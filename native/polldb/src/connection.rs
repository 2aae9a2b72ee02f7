/// Connection lifecycle and host-facing operations
///
/// A `Connection` owns the native session, its worker and its completion channel.
/// Everything here runs on the host thread; only the worker thread ever executes
/// queries against the session.
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::completion::CompletionChannel;
use crate::dispatch::{dispatch_connected, dispatch_jobs, Dispatcher};
use crate::error::{Error, Result};
use crate::escape::{escape, EscapeStyle};
use crate::lifecycle::DrainPolicy;
use crate::models::{ConnectParams, ConnectionId, ConnectionState, HostRef, QueryJob, SessionInfo};
use crate::native::{ClientOption, Connector, NativeClient};
use crate::retry::RetryPolicy;
use crate::utils::safe_lock_arc;
use crate::worker::Worker;

/// Engine-side settings of a connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfig {
    /// Directory handed to the client as its plugin directory, if any
    pub plugin_dir: Option<PathBuf>,
    pub retry: RetryPolicy,
}

impl ConnectionConfig {
    /// Options every handshake starts with, ahead of user-supplied ones.
    pub fn mandatory_options(&self) -> Vec<(ClientOption, String)> {
        let mut options = vec![(ClientOption::Reconnect, "1".to_string())];
        if let Some(dir) = &self.plugin_dir {
            options.push((ClientOption::PluginDir, dir.display().to_string()));
        }
        options
    }
}

pub struct Connection<C: Connector> {
    pub(crate) id: ConnectionId,
    pub(crate) params: ConnectParams,
    pub(crate) connector: C,
    pub(crate) config: ConnectionConfig,
    pub(crate) connect_callback: Option<HostRef>,
    pub(crate) state: ConnectionState,
    pub(crate) pending_callback: bool,
    pub(crate) pending_options: Vec<(ClientOption, String)>,
    pub(crate) client: Option<Arc<Mutex<C::Client>>>,
    pub(crate) session: Option<SessionInfo>,
    pub(crate) escape_style: EscapeStyle,
    pub(crate) worker: Option<Worker>,
    pub(crate) completions: Arc<CompletionChannel>,
}

impl<C: Connector> Connection<C> {
    pub fn new(
        id: ConnectionId,
        params: ConnectParams,
        connector: C,
        config: ConnectionConfig,
        connect_callback: Option<HostRef>,
    ) -> Self {
        Self {
            id,
            params,
            connector,
            config,
            connect_callback,
            state: ConnectionState::Disconnected,
            pending_callback: false,
            pending_options: Vec::new(),
            client: None,
            session: None,
            escape_style: EscapeStyle::default(),
            worker: None,
            completions: Arc::new(CompletionChannel::new()),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn params(&self) -> &ConnectParams {
        &self.params
    }

    /// `Ok(false)` until connected. Fails with `Shutdown` once disconnect has begun.
    pub fn is_connected(&self) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.state == ConnectionState::Connected)
    }

    /// Whether a connect notification is waiting for the next poll.
    pub fn has_pending_callback(&self) -> bool {
        self.pending_callback
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        match self.state {
            ConnectionState::ShuttingDown | ConnectionState::Released => Err(Error::Shutdown),
            _ => Ok(()),
        }
    }

    pub(crate) fn ensure_connected(&self) -> Result<()> {
        self.ensure_open()?;
        if self.state == ConnectionState::Connected {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    /// Open the native session and start the worker.
    ///
    /// Mandatory options go first, then options set before connecting. On failure
    /// the connection is released and must be discarded.
    pub fn connect(&mut self) -> Result<()> {
        match self.state {
            ConnectionState::Disconnected => {}
            ConnectionState::ShuttingDown | ConnectionState::Released => {
                return Err(Error::Shutdown)
            }
            ConnectionState::Connecting | ConnectionState::Connected => {
                return Err(Error::AlreadyConnected)
            }
        }

        self.state = ConnectionState::Connecting;
        let mut options = self.config.mandatory_options();
        options.append(&mut self.pending_options);

        let native = match self.connector.connect(&self.params, &options) {
            Ok(native) => native,
            Err(err) => {
                debug!(conn_id = %self.id, code = err.code, "connect failed");
                self.state = ConnectionState::Released;
                return Err(Error::connect(err.message));
            }
        };

        let session = native.session_info();
        self.escape_style = native.escape_style();
        let client = Arc::new(Mutex::new(native));

        let worker = match Worker::spawn(
            self.id,
            Arc::clone(&client),
            Arc::clone(&self.completions),
            self.config.retry.clone(),
        ) {
            Ok(worker) => worker,
            Err(err) => {
                if let Ok(mut native) = client.lock() {
                    native.close();
                }
                self.state = ConnectionState::Released;
                return Err(Error::connect(err.to_string()));
            }
        };

        info!(conn_id = %self.id, server = %session.server_info, "connected");
        self.client = Some(client);
        self.session = Some(session);
        self.worker = Some(worker);
        self.state = ConnectionState::Connected;
        self.pending_callback = true;
        Ok(())
    }

    /// Queue `sql` for execution. Never reports execution errors: those reach the
    /// callback inside the results.
    pub fn queue_query(
        &self,
        sql: impl Into<String>,
        callback: Option<HostRef>,
        aux: Option<HostRef>,
        use_numbers: bool,
    ) -> Result<()> {
        self.ensure_connected()?;
        let worker = self.worker.as_ref().ok_or(Error::NotConnected)?;
        worker.post(QueryJob::new(sql, callback, aux, use_numbers))
    }

    /// Set a client option. Recorded until connect, forwarded to the session after.
    ///
    /// After connecting this waits for a statement the worker is running.
    pub fn set_option(&mut self, option: ClientOption, value: impl Into<String>) -> Result<()> {
        self.ensure_open()?;
        let value = value.into();
        match &self.client {
            None => {
                self.pending_options.push((option, value));
                Ok(())
            }
            Some(client) => safe_lock_arc(client, "set_option client")?
                .set_option(option, &value)
                .map_err(|e| Error::option(e.message)),
        }
    }

    pub fn set_character_set(&mut self, charset: &str) -> Result<()> {
        self.ensure_connected()?;
        let client = self.client.as_ref().ok_or(Error::NotConnected)?;
        safe_lock_arc(client, "set_character_set client")?
            .set_character_set(charset)
            .map_err(|e| Error::option(e.message))
    }

    /// Escape `text` for use inside a quoted SQL literal of this session's dialect.
    pub fn escape(&self, text: &str) -> Result<String> {
        self.ensure_connected()?;
        Ok(escape(text, self.escape_style))
    }

    fn session(&self) -> Result<&SessionInfo> {
        self.ensure_connected()?;
        self.session.as_ref().ok_or(Error::NotConnected)
    }

    pub fn server_info(&self) -> Result<String> {
        Ok(self.session()?.server_info.clone())
    }

    pub fn host_info(&self) -> Result<String> {
        Ok(self.session()?.host_info.clone())
    }

    pub fn server_version(&self) -> Result<u64> {
        Ok(self.session()?.server_version)
    }

    /// Deliver what is ready: the connect notification first, then every finished
    /// job in completion order. Never waits for work.
    pub fn poll<D: Dispatcher + ?Sized>(&mut self, dispatcher: &mut D) -> Result<usize> {
        self.ensure_open()?;

        if std::mem::take(&mut self.pending_callback) {
            if let Some(callback) = self.connect_callback {
                dispatch_connected(self.id, callback, dispatcher);
            }
        }

        let jobs = self.completions.drain_all();
        Ok(dispatch_jobs(self.id, jobs, DrainPolicy::Dispatch, dispatcher))
    }
}
