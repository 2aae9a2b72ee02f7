/// NIF exports for Elixir hosts
///
/// Elixir passes callbacks and per-call data as integer tokens from its own
/// table. `poll` and `disconnect` return event lists instead of calling back
/// into the VM, so no Erlang term ever crosses to the worker thread:
///
/// - `{:connected, conn_id, callback}`
/// - `{:query, conn_id, callback, aux | nil, [result_map]}`
/// - `{:released, token}` once the engine no longer holds a token
use std::collections::HashMap;

use rustler::types::atom::nil;
use rustler::{Atom, Binary, Encoder, Env, NifResult, OwnedBinary, Term};
use tracing::warn;

use crate::constants::*;
use crate::decode::{decode_client_option, decode_connect_opts};
use crate::dispatch::{DispatchError, Dispatcher};
use crate::error::Error;
use crate::libsql_client::LibsqlConnector;
use crate::lifecycle::DrainPolicy;
use crate::models::{ConnectionId, HostRef, QueryJob, QueryResult, Value};
use crate::registry::{connect_shared, SharedConnection};
use crate::utils::{safe_lock, safe_lock_arc, try_lock_now};

/// Collects dispatcher calls as Elixir terms.
struct NifDispatcher<'a> {
    env: Env<'a>,
    events: Vec<Term<'a>>,
}

impl<'a> NifDispatcher<'a> {
    fn new(env: Env<'a>) -> Self {
        Self {
            env,
            events: Vec::new(),
        }
    }
}

impl Dispatcher for NifDispatcher<'_> {
    fn on_connected(&mut self, conn: ConnectionId, callback: HostRef) -> Result<(), DispatchError> {
        let event = (connected(), conn.0, callback.0).encode(self.env);
        self.events.push(event);
        Ok(())
    }

    fn on_query_complete(
        &mut self,
        conn: ConnectionId,
        callback: HostRef,
        job: &QueryJob,
    ) -> Result<(), DispatchError> {
        let env = self.env;
        let results = job
            .results()
            .iter()
            .map(|result| encode_result(env, result, job.use_numbers()))
            .collect::<Result<Vec<Term>, _>>()?;

        let aux = job.aux().map(|token| token.0);
        let event = (query(), conn.0, callback.0, aux, results).encode(env);
        self.events.push(event);
        Ok(())
    }

    fn report_error(&mut self, message: &str) {
        warn!("{}", message.trim_end());
    }

    fn release(&mut self, token: HostRef) {
        let event = (released(), token.0).encode(self.env);
        self.events.push(event);
    }
}

fn encode_value<'a>(env: Env<'a>, value: &Value) -> Result<Term<'a>, DispatchError> {
    Ok(match value {
        Value::Null => nil().encode(env),
        Value::Integer(v) => v.encode(env),
        Value::Real(v) => v.encode(env),
        Value::Text(v) => v.encode(env),
        Value::Blob(v) => {
            let mut owned = OwnedBinary::new(v.len()).ok_or_else(|| {
                DispatchError::new(format!("Failed to allocate binary of {} bytes", v.len()))
            })?;
            owned.as_mut_slice().copy_from_slice(v);
            Binary::from_owned(owned, env).encode(env)
        }
    })
}

/// Result map with keys `error_code`, `error`, `affected_rows`, `last_insert_id`,
/// `columns` and `rows` (`nil` when the statement produced no rows).
fn encode_result<'a>(
    env: Env<'a>,
    result: &QueryResult,
    use_numbers: bool,
) -> Result<Term<'a>, DispatchError> {
    let mut result_map: HashMap<String, Term<'a>> = HashMap::with_capacity(6);
    result_map.insert("error_code".to_string(), result.error_code().encode(env));
    result_map.insert("error".to_string(), result.error().encode(env));
    result_map.insert("affected_rows".to_string(), result.affected_rows().encode(env));
    result_map.insert("last_insert_id".to_string(), result.last_insert_id().encode(env));

    match result.rows() {
        Some(set) => {
            let mut rows: Vec<Term<'a>> = Vec::with_capacity(set.len());
            for row in set.coerced_rows(use_numbers) {
                let values = row
                    .iter()
                    .map(|value| encode_value(env, value))
                    .collect::<Result<Vec<Term>, _>>()?;
                rows.push(values.encode(env));
            }
            result_map.insert("columns".to_string(), set.columns.encode(env));
            result_map.insert("rows".to_string(), rows.encode(env));
        }
        None => {
            result_map.insert("columns".to_string(), nil().encode(env));
            result_map.insert("rows".to_string(), nil().encode(env));
        }
    }

    Ok(result_map.encode(env))
}

fn lookup(conn_id: u64) -> NifResult<SharedConnection<LibsqlConnector>> {
    let registry = safe_lock(&NIF_REGISTRY, "lookup registry")?;
    Ok(registry.get(ConnectionId(conn_id))?)
}

/// Register a new, not yet connected database and return its id.
///
/// `opts` is a keyword list: `host`, `user`, `password`, `database`, `port`,
/// `socket`, `flags`, `plugin_dir`, `retry_codes`. `callback` is the token
/// reported in the `:connected` event.
#[rustler::nif]
pub fn new_connection(opts: Term, callback: Option<u64>) -> NifResult<u64> {
    let (params, config) = decode_connect_opts(opts)?;
    let mut registry = safe_lock(&NIF_REGISTRY, "new_connection registry")?;
    let id = registry.register(params, LibsqlConnector, config, callback.map(HostRef));
    Ok(id.0)
}

/// Perform the handshake and start the worker.
///
/// Returns `:ok`, or `{:error, message, events}` when the handshake fails. The
/// connection is then discarded (later calls with this id fail with a shutdown
/// error) and `events` carries the `{:released, callback}` of its connect
/// callback.
#[rustler::nif(schedule = "DirtyIo")]
pub fn connect<'a>(env: Env<'a>, conn_id: u64) -> NifResult<Term<'a>> {
    let mut dispatcher = NifDispatcher::new(env);
    match connect_shared(&NIF_REGISTRY, ConnectionId(conn_id), &mut dispatcher) {
        Ok(()) => Ok(ok().encode(env)),
        Err(err @ Error::Connect { .. }) => {
            Ok((error(), err.to_string(), dispatcher.events).encode(env))
        }
        Err(err) => Err(err.into()),
    }
}

/// Queue a query. Returns immediately; results arrive through `poll/1`.
#[rustler::nif]
pub fn queue_query(
    conn_id: u64,
    sql: String,
    callback: Option<u64>,
    aux: Option<u64>,
    use_numbers: bool,
) -> NifResult<Atom> {
    let shared = lookup(conn_id)?;
    let conn = safe_lock_arc(&shared, "queue_query conn")?;
    conn.queue_query(sql, callback.map(HostRef), aux.map(HostRef), use_numbers)?;
    Ok(ok())
}

#[rustler::nif]
pub fn escape(conn_id: u64, text: String) -> NifResult<String> {
    let shared = lookup(conn_id)?;
    let conn = safe_lock_arc(&shared, "escape conn")?;
    Ok(conn.escape(&text)?)
}

#[rustler::nif(schedule = "DirtyIo")]
pub fn set_option(conn_id: u64, name: String, value: String) -> NifResult<Atom> {
    let option = decode_client_option(&name)?;
    let shared = lookup(conn_id)?;
    let mut conn = safe_lock_arc(&shared, "set_option conn")?;
    conn.set_option(option, value)?;
    Ok(ok())
}

#[rustler::nif(schedule = "DirtyIo")]
pub fn set_character_set(conn_id: u64, name: String) -> NifResult<Atom> {
    let shared = lookup(conn_id)?;
    let mut conn = safe_lock_arc(&shared, "set_character_set conn")?;
    conn.set_character_set(&name)?;
    Ok(ok())
}

#[rustler::nif]
pub fn server_info(conn_id: u64) -> NifResult<String> {
    let shared = lookup(conn_id)?;
    let conn = safe_lock_arc(&shared, "server_info conn")?;
    Ok(conn.server_info()?)
}

#[rustler::nif]
pub fn host_info(conn_id: u64) -> NifResult<String> {
    let shared = lookup(conn_id)?;
    let conn = safe_lock_arc(&shared, "host_info conn")?;
    Ok(conn.host_info()?)
}

#[rustler::nif]
pub fn server_version(conn_id: u64) -> NifResult<u64> {
    let shared = lookup(conn_id)?;
    let conn = safe_lock_arc(&shared, "server_version conn")?;
    Ok(conn.server_version()?)
}

#[rustler::nif]
pub fn is_connected(conn_id: u64) -> NifResult<bool> {
    let shared = lookup(conn_id)?;
    let conn = safe_lock_arc(&shared, "is_connected conn")?;
    Ok(conn.is_connected()?)
}

/// Collect the connect notification and every finished query. Never waits.
///
/// Runs on a normal scheduler. While a DirtyIo call holds the registry or the
/// connection (handshake, drain) nothing is collected; the events stay queued
/// for the next poll.
#[rustler::nif]
pub fn poll<'a>(env: Env<'a>, conn_id: u64) -> NifResult<Vec<Term<'a>>> {
    let Some(registry) = try_lock_now(&NIF_REGISTRY, "poll registry")? else {
        return Ok(Vec::new());
    };
    let shared = registry.get(ConnectionId(conn_id))?;
    drop(registry);

    let mut dispatcher = NifDispatcher::new(env);
    if let Some(mut conn) = try_lock_now(&shared, "poll conn")? {
        conn.poll(&mut dispatcher)?;
    }
    Ok(dispatcher.events)
}

/// Stop the connection, wait for queued queries, and return their events.
#[rustler::nif(schedule = "DirtyIo")]
pub fn disconnect<'a>(env: Env<'a>, conn_id: u64) -> NifResult<Vec<Term<'a>>> {
    let shared = safe_lock(&NIF_REGISTRY, "disconnect registry")?.remove(ConnectionId(conn_id))?;
    let mut dispatcher = NifDispatcher::new(env);
    safe_lock_arc(&shared, "disconnect conn")?.disconnect(&mut dispatcher, DrainPolicy::Dispatch)?;
    Ok(dispatcher.events)
}

/// Process-wide shutdown: drain every connection without delivering results.
///
/// Returns `{drained_count, released_events}`.
#[rustler::nif(schedule = "DirtyIo")]
pub fn shutdown_all<'a>(env: Env<'a>) -> NifResult<(usize, Vec<Term<'a>>)> {
    let mut dispatcher = NifDispatcher::new(env);
    let drained = safe_lock(&NIF_REGISTRY, "shutdown_all registry")?.shutdown_all(&mut dispatcher);
    Ok((drained, dispatcher.events))
}
