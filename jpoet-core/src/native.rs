//! Native function bindings

use crate::NativeError;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Signature of a native function implementation. Arguments and results use
/// the JSON value model shared with the evaluator.
pub type NativeFn = dyn Fn(&[Value]) -> Result<Value, NativeError> + Send + Sync;

/// A function implemented by the host (or a plugin) and reachable from
/// evaluated code through `std.native(name)`.
#[derive(Clone)]
pub struct NativeFunction {
    name: String,
    params: Vec<String>,
    func: Arc<NativeFn>,
}

impl NativeFunction {
    pub fn new<F>(name: impl Into<String>, params: &[&str], func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, NativeError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            params: params.iter().map(|p| p.to_string()).collect(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, NativeError> {
        (self.func)(args)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}
