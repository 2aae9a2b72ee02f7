/// Decoding of Elixir terms into engine configuration
///
/// This module turns the keyword lists and option names passed across the NIF
/// boundary into `ConnectParams`, `ConnectionConfig` and `ClientOption` values.
use std::path::PathBuf;

use rustler::{Atom, Term};

use crate::connection::ConnectionConfig;
use crate::constants::*;
use crate::models::ConnectParams;
use crate::native::ClientOption;
use crate::retry::RetryPolicy;

fn bad_value(key: &str) -> rustler::Error {
    rustler::Error::Term(Box::new(format!("invalid value for {key}")))
}

/// Decode a keyword list such as `[host: "", database: "app.db", port: 0]`.
///
/// Unknown keys are rejected so typos surface at construction time.
pub fn decode_connect_opts(opts: Term) -> Result<(ConnectParams, ConnectionConfig), rustler::Error> {
    let list: Vec<Term> = opts
        .decode()
        .map_err(|e| rustler::Error::Term(Box::new(format!("decode failed: {e:?}"))))?;

    let mut params = ConnectParams::default();
    let mut config = ConnectionConfig::default();

    for pair in list {
        let (key, value): (Atom, Term) = pair.decode().map_err(|e| {
            rustler::Error::Term(Box::new(format!("expected keyword tuple: {e:?}")))
        })?;

        if key == host() {
            params.host = value.decode().map_err(|_| bad_value("host"))?;
        } else if key == user() {
            params.user = value.decode().map_err(|_| bad_value("user"))?;
        } else if key == password() {
            params.password = value.decode().map_err(|_| bad_value("password"))?;
        } else if key == database() {
            params.database = value.decode().map_err(|_| bad_value("database"))?;
        } else if key == port() {
            params.port = value.decode().map_err(|_| bad_value("port"))?;
        } else if key == socket() {
            params.socket = value.decode().map_err(|_| bad_value("socket"))?;
        } else if key == flags() {
            params.client_flags = value.decode().map_err(|_| bad_value("flags"))?;
        } else if key == plugin_dir() {
            let dir: String = value.decode().map_err(|_| bad_value("plugin_dir"))?;
            config.plugin_dir = Some(PathBuf::from(dir));
        } else if key == retry_codes() {
            let codes: Vec<u32> = value.decode().map_err(|_| bad_value("retry_codes"))?;
            config.retry = RetryPolicy::with_codes(codes);
        } else {
            return Err(rustler::Error::Term(Box::new(format!(
                "unknown connection option: {key:?}"
            ))));
        }
    }

    Ok((params, config))
}

/// Decode a client option name (`"busy_timeout"`, `"init_command"`, ...).
pub fn decode_client_option(name: &str) -> Result<ClientOption, rustler::Error> {
    name.parse()
        .map_err(|e: String| rustler::Error::Term(Box::new(e)))
}
