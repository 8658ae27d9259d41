//! Native function sources handed to the evaluation builder

use jpoet_core::{Error, NativeFunction, Result};
use jpoet_plugin::{Client, FunctionInvoker, Invoker, NamedInvoker};
use std::sync::Arc;

/// A native function source that must be closed after evaluation
pub trait CloserFunction {
    fn function(&self) -> NativeFunction;
    fn close(&self) -> Result<()>;
}

impl CloserFunction for Client {
    fn function(&self) -> NativeFunction {
        Client::function(self)
    }

    fn close(&self) -> Result<()> {
        Client::close(self).map_err(Error::from)
    }
}

/// A plugin served in-process, exposed as `invoke:<name>` like a spawned one
#[derive(Clone)]
pub struct Plugin {
    invoker: NamedInvoker,
}

impl Plugin {
    pub fn new(name: impl Into<String>, invoker: impl Invoker + 'static) -> Self {
        Self { invoker: NamedInvoker::new(name, Arc::new(invoker)) }
    }

    /// A plugin dispatching to the given functions by name
    pub fn from_functions(name: impl Into<String>, functions: Vec<NativeFunction>) -> Self {
        Self::new(name, FunctionInvoker::new(functions))
    }

    pub fn name(&self) -> &str {
        self.invoker.name()
    }

    pub fn native_function(&self) -> NativeFunction {
        self.invoker.function()
    }
}
