//! jpoet Plugin - Out-of-process native functions
//!
//! Plugins are executables named `jsonnet-plugin-<name>` that expose native
//! functions to the evaluator. The host spawns the executable, checks a
//! handshake line, and then exchanges line-delimited JSON-RPC messages with
//! it over stdin/stdout. Inside the evaluator a plugin appears as the native
//! function `invoke:<name>(funcName, args)`.

mod client;
pub mod handshake;
mod invoker;
pub mod logging;
mod server;
pub mod wire;

pub use client::Client;
pub use invoker::{invoke_function, FunctionInvoker, Invoker, NamedInvoker};
pub use server::{serve, Server};
