//! `PollDb`: queued SQL execution for cooperative, single-threaded hosts
//!
//! This is the root module for the `PollDb` NIF (Native Implemented Function) library.
//! Each connection owns one worker thread that runs queries strictly in order; finished
//! jobs wait on a completion channel until the host polls for them.
pub mod completion;
pub mod connection;
pub mod constants;
pub mod decode;
pub mod dispatch;
pub mod error;
pub mod escape;
pub mod libsql_client;
pub mod lifecycle;
pub mod models;
pub mod native;
pub mod nif;
pub mod registry;
pub mod retry;
pub mod utils;
pub mod worker;

// Re-export key types and functions for internal use
pub use completion::CompletionChannel;
pub use connection::Connection;
pub use dispatch::{DispatchError, Dispatcher};
pub use error::{Error, Result};
pub use escape::{escape, unescape, EscapeStyle};
pub use lifecycle::{DrainPolicy, ShutdownPhase};
pub use models::*;
pub use native::{ClientOption, Connector, NativeClient, NativeError, ResultSet};
pub use registry::Registry;
pub use retry::RetryPolicy;

// Register all NIF functions with Erlang/Elixir
// Note: The rustler::init! macro automatically discovers all #[rustler::nif] functions
rustler::init!("Elixir.PollDb.Native");

#[cfg(test)]
mod tests;
