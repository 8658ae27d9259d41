//! Function dispatch by name
//!
//! An `Invoker` sits behind every plugin: the RPC client in the host, and a
//! `FunctionInvoker` over registered native functions in the plugin process
//! or in-process.

use jpoet_core::{NativeError, NativeFunction};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Calls a function by name with JSON arguments
pub trait Invoker: Send + Sync {
    fn invoke(&self, func_name: &str, args: Vec<Value>) -> Result<Value, NativeError>;
}

/// Registry of native functions keyed by name
pub struct FunctionInvoker {
    function_names: String,
    functions: HashMap<String, NativeFunction>,
}

impl FunctionInvoker {
    pub fn new(functions: Vec<NativeFunction>) -> Self {
        let mut names: Vec<String> = functions.iter().map(|f| f.name().to_string()).collect();
        names.sort();
        Self {
            function_names: names.join(", "),
            functions: functions.into_iter().map(|f| (f.name().to_string(), f)).collect(),
        }
    }

    /// Sorted, comma-separated names of the registered functions
    pub fn function_names(&self) -> &str {
        &self.function_names
    }
}

impl Invoker for FunctionInvoker {
    fn invoke(&self, func_name: &str, args: Vec<Value>) -> Result<Value, NativeError> {
        let function = self.functions.get(func_name).ok_or_else(|| {
            NativeError::new(format!(
                "no such function: {}, available functions: {}",
                func_name, self.function_names
            ))
        })?;
        function.call(&args)
    }
}

/// The `invoke:<name>` native function forwarding to `invoker`.
///
/// Takes `(funcName, args)`; anything other than a string and an array is
/// rejected before the invoker is reached.
pub fn invoke_function(name: &str, invoker: Arc<dyn Invoker>) -> NativeFunction {
    NativeFunction::new(format!("invoke:{}", name), &["funcName", "args"], move |input: &[Value]| {
        let [func_name, args] = input else {
            return Err(NativeError::new("funcName and args must be provided"));
        };
        let func_name = func_name
            .as_str()
            .ok_or_else(|| NativeError::new("funcName must be a string"))?;
        let args = args
            .as_array()
            .ok_or_else(|| NativeError::new("args must be an array"))?;
        invoker.invoke(func_name, args.clone())
    })
}

/// An invoker exposed under a plugin name without a child process
#[derive(Clone)]
pub struct NamedInvoker {
    name: String,
    invoker: Arc<dyn Invoker>,
}

impl NamedInvoker {
    pub fn new(name: impl Into<String>, invoker: Arc<dyn Invoker>) -> Self {
        Self { name: name.into(), invoker }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn function(&self) -> NativeFunction {
        invoke_function(&self.name, self.invoker.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> FunctionInvoker {
        FunctionInvoker::new(vec![
            NativeFunction::new("sub", &["a", "b"], |args: &[Value]| {
                Ok(json!(args[0].as_f64().unwrap_or(0.0) - args[1].as_f64().unwrap_or(0.0)))
            }),
            NativeFunction::new("add", &["a", "b"], |args: &[Value]| {
                Ok(json!(args[0].as_f64().unwrap_or(0.0) + args[1].as_f64().unwrap_or(0.0)))
            }),
            NativeFunction::new("fail", &[], |_: &[Value]| Err(NativeError::new("exact failure text"))),
        ])
    }

    #[test]
    fn test_dispatch_by_name() {
        assert_eq!(registry().invoke("add", vec![json!(1), json!(2)]).unwrap(), json!(3.0));
    }

    #[test]
    fn test_unknown_function_lists_sorted_names() {
        let err = registry().invoke("mul", vec![]).unwrap_err();
        assert_eq!(err.message, "no such function: mul, available functions: add, fail, sub");
    }

    #[test]
    fn test_function_error_is_verbatim() {
        let err = registry().invoke("fail", vec![]).unwrap_err();
        assert_eq!(err.message, "exact failure text");
    }

    #[test]
    fn test_invoke_function_validates_input() {
        let function = NamedInvoker::new("math", Arc::new(registry())).function();
        assert_eq!(function.name(), "invoke:math");
        assert_eq!(function.params(), &["funcName".to_string(), "args".to_string()]);
        assert_eq!(
            function.call(&[json!("add")]).unwrap_err().message,
            "funcName and args must be provided"
        );
        assert_eq!(
            function.call(&[json!(1), json!([])]).unwrap_err().message,
            "funcName must be a string"
        );
        assert_eq!(
            function.call(&[json!("add"), json!({})]).unwrap_err().message,
            "args must be an array"
        );
        assert_eq!(function.call(&[json!("add"), json!([2, 3])]).unwrap(), json!(5.0));
    }
}
