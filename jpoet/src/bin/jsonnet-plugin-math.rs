//! Arithmetic plugin
//!
//! Exposes `add`, `sub`, `mul`, `div` and `sum`. Reached from jsonnet as
//! `std.native('invoke:math')('add', [1, 2])`.

use jpoet::{NativeError, NativeFunction};
use serde_json::{json, Value};

fn number(args: &[Value], index: usize, function: &str) -> Result<f64, NativeError> {
    match args.get(index) {
        Some(value) => value
            .as_f64()
            .ok_or_else(|| NativeError::new(format!("{}: argument {} must be a number, got {}", function, index, value))),
        None => Err(NativeError::new(format!("{}: expected {} arguments, got {}", function, index + 1, args.len()))),
    }
}

fn binary(name: &'static str, op: fn(f64, f64) -> Result<f64, NativeError>) -> NativeFunction {
    NativeFunction::new(name, &["a", "b"], move |args: &[Value]| {
        let a = number(args, 0, name)?;
        let b = number(args, 1, name)?;
        Ok(json!(op(a, b)?))
    })
}

fn main() {
    jpoet::serve(vec![
        binary("add", |a, b| Ok(a + b)),
        binary("sub", |a, b| Ok(a - b)),
        binary("mul", |a, b| Ok(a * b)),
        binary("div", |a, b| {
            if b == 0.0 {
                return Err(NativeError::new("div: division by zero"));
            }
            Ok(a / b)
        }),
        NativeFunction::new("sum", &[], |args: &[Value]| {
            let mut total = 0.0;
            for index in 0..args.len() {
                total += number(args, index, "sum")?;
            }
            Ok(json!(total))
        }),
    ]);
}
