//! The `std` object
//!
//! Builtins are implemented natively. `std.native` is the bridge to host and
//! plugin functions.

use crate::ast::Visibility;
use crate::eval::Interpreter;
use crate::format;
use crate::render;
use crate::value::{FieldDef, FuncVal, Layer, ObjVal, Val};
use jpoet_core::EvalError;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Builtin names and their parameter names
const BUILTINS: &[(&str, &[&str])] = &[
    ("native", &["name"]),
    ("trace", &["str", "rest"]),
    ("id", &["x"]),
    // Types
    ("length", &["x"]),
    ("type", &["x"]),
    ("isString", &["v"]),
    ("isNumber", &["v"]),
    ("isBoolean", &["v"]),
    ("isObject", &["v"]),
    ("isArray", &["v"]),
    ("isFunction", &["v"]),
    // Math
    ("abs", &["n"]),
    ("sign", &["n"]),
    ("max", &["a", "b"]),
    ("min", &["a", "b"]),
    ("floor", &["x"]),
    ("ceil", &["x"]),
    ("round", &["x"]),
    ("pow", &["x", "n"]),
    ("sqrt", &["x"]),
    ("exp", &["x"]),
    ("log", &["x"]),
    // Strings
    ("toString", &["a"]),
    ("format", &["str", "vals"]),
    ("codepoint", &["str"]),
    ("char", &["n"]),
    ("substr", &["str", "from", "len"]),
    ("startsWith", &["a", "b"]),
    ("endsWith", &["a", "b"]),
    ("split", &["str", "c"]),
    ("strReplace", &["str", "from", "to"]),
    ("trim", &["str"]),
    ("asciiUpper", &["str"]),
    ("asciiLower", &["str"]),
    ("stringChars", &["str"]),
    ("parseInt", &["str"]),
    ("parseJson", &["str"]),
    ("escapeStringJson", &["str"]),
    ("manifestJson", &["value"]),
    ("manifestJsonEx", &["value", "indent"]),
    ("lines", &["arr"]),
    // Arrays
    ("join", &["sep", "arr"]),
    ("map", &["func", "arr"]),
    ("filter", &["func", "arr"]),
    ("flatMap", &["func", "arr"]),
    ("foldl", &["func", "arr", "init"]),
    ("foldr", &["func", "arr", "init"]),
    ("range", &["from", "to"]),
    ("makeArray", &["sz", "func"]),
    ("repeat", &["what", "count"]),
    ("reverse", &["arr"]),
    ("flattenArrays", &["arrs"]),
    ("member", &["arr", "x"]),
    ("count", &["arr", "x"]),
    ("sort", &["arr", "keyF"]),
    ("uniq", &["arr", "keyF"]),
    ("set", &["arr", "keyF"]),
    // Objects
    ("objectFields", &["o"]),
    ("objectFieldsAll", &["o"]),
    ("objectHas", &["o", "f"]),
    ("objectHasAll", &["o", "f"]),
    ("objectValues", &["o"]),
    ("get", &["o", "f", "default", "inc_hidden"]),
    ("mapWithKey", &["func", "obj"]),
    ("mergePatch", &["target", "patch"]),
    // Debugging
    ("assertEqual", &["a", "b"]),
];

pub fn std_layer() -> Layer {
    let mut layer = Layer::default();
    for (name, _) in BUILTINS {
        layer.fields.insert(
            name.to_string(),
            FieldDef::value(Visibility::Hidden, Val::Func(Rc::new(FuncVal::Builtin(*name)))),
        );
    }
    layer
}

pub fn params(name: &str) -> &'static [&'static str] {
    BUILTINS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, params)| *params)
        .unwrap_or(&[])
}

/// Leading parameters that must be supplied; the rest default to null
pub fn required(name: &str) -> usize {
    match name {
        "sort" | "uniq" | "set" => 1,
        "get" => 2,
        _ => params(name).len(),
    }
}

fn type_error(func: &str, expected: &str, got: &Val) -> EvalError {
    EvalError::runtime(format!(
        "std.{} expected {}, got {}",
        func,
        expected,
        got.type_name()
    ))
}

pub fn call(interp: &Interpreter<'_>, name: &str, args: Vec<Val>) -> Result<Val, EvalError> {
    let arg = |i: usize| args.get(i).cloned().unwrap_or(Val::Null);
    match name {
        // Unknown native names evaluate to null
        "native" => match arg(0) {
            Val::Str(name) => Ok(interp
                .native(&name)
                .map(|f| Val::Func(Rc::new(FuncVal::Native(f.clone()))))
                .unwrap_or(Val::Null)),
            other => Err(type_error("native", "string", &other)),
        },

        "trace" => {
            let message = interp.to_string(&arg(0))?;
            tracing::info!(message = %message, "std.trace");
            Ok(arg(1))
        }

        "id" => Ok(arg(0)),

        // ========== Types ==========
        "length" => Ok(Val::Num(match arg(0) {
            Val::Str(s) => s.chars().count() as f64,
            Val::Arr(items) => items.len() as f64,
            Val::Obj(obj) => obj.visible_names().len() as f64,
            Val::Func(f) => f.arity() as f64,
            other => return Err(type_error("length", "array, string, object or function", &other)),
        })),

        "type" => Ok(Val::str(arg(0).type_name())),
        "isString" => Ok(Val::Bool(matches!(arg(0), Val::Str(_)))),
        "isNumber" => Ok(Val::Bool(matches!(arg(0), Val::Num(_)))),
        "isBoolean" => Ok(Val::Bool(matches!(arg(0), Val::Bool(_)))),
        "isObject" => Ok(Val::Bool(matches!(arg(0), Val::Obj(_)))),
        "isArray" => Ok(Val::Bool(matches!(arg(0), Val::Arr(_)))),
        "isFunction" => Ok(Val::Bool(matches!(arg(0), Val::Func(_)))),

        // ========== Math ==========
        "abs" => math1(name, arg(0), f64::abs),
        "sign" => math1(name, arg(0), |n| if n > 0.0 { 1.0 } else if n < 0.0 { -1.0 } else { 0.0 }),
        "floor" => math1(name, arg(0), f64::floor),
        "ceil" => math1(name, arg(0), f64::ceil),
        "round" => math1(name, arg(0), f64::round),
        "sqrt" => math1(name, arg(0), f64::sqrt),
        "exp" => math1(name, arg(0), f64::exp),
        "log" => math1(name, arg(0), f64::ln),
        "max" => math2(name, arg(0), arg(1), f64::max),
        "min" => math2(name, arg(0), arg(1), f64::min),
        "pow" => math2(name, arg(0), arg(1), f64::powf),

        // ========== Strings ==========
        "toString" => Ok(Val::Str(Rc::from(interp.to_string(&arg(0))?))),

        "format" => {
            let template = string_arg(name, arg(0))?;
            Ok(Val::Str(Rc::from(format::format(interp, &template, &arg(1))?)))
        }

        "codepoint" => {
            let s = string_arg(name, arg(0))?;
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Val::Num(c as u32 as f64)),
                _ => Err(EvalError::runtime("std.codepoint expected a single character string")),
            }
        }

        "char" => {
            let n = number_arg(name, arg(0))?;
            char::from_u32(n as u32)
                .map(|c| Val::str(&c.to_string()))
                .ok_or_else(|| EvalError::runtime(format!("std.char: invalid codepoint {}", n)))
        }

        "substr" => {
            let s = string_arg(name, arg(0))?;
            let from = index_arg(name, arg(1))?;
            let len = index_arg(name, arg(2))?;
            Ok(Val::str(&s.chars().skip(from).take(len).collect::<String>()))
        }

        "startsWith" => Ok(Val::Bool(string_arg(name, arg(0))?.starts_with(&*string_arg(name, arg(1))?))),
        "endsWith" => Ok(Val::Bool(string_arg(name, arg(0))?.ends_with(&*string_arg(name, arg(1))?))),

        "split" => {
            let s = string_arg(name, arg(0))?;
            let sep = string_arg(name, arg(1))?;
            if sep.is_empty() {
                return Err(EvalError::runtime("std.split separator must not be empty"));
            }
            Ok(Val::arr(s.split(&*sep).map(Val::str).collect()))
        }

        "strReplace" => {
            let s = string_arg(name, arg(0))?;
            let from = string_arg(name, arg(1))?;
            let to = string_arg(name, arg(2))?;
            if from.is_empty() {
                return Err(EvalError::runtime("std.strReplace 'from' string must not be empty"));
            }
            Ok(Val::str(&s.replace(&*from, &to)))
        }

        "trim" => Ok(Val::str(string_arg(name, arg(0))?.trim())),
        "asciiUpper" => Ok(Val::str(&string_arg(name, arg(0))?.to_ascii_uppercase())),
        "asciiLower" => Ok(Val::str(&string_arg(name, arg(0))?.to_ascii_lowercase())),

        "stringChars" => Ok(Val::arr(
            string_arg(name, arg(0))?.chars().map(|c| Val::str(&c.to_string())).collect(),
        )),

        "parseInt" => {
            let s = string_arg(name, arg(0))?;
            s.parse::<i64>()
                .map(|n| Val::Num(n as f64))
                .map_err(|_| EvalError::runtime(format!("std.parseInt: {:?} is not an integer", &*s)))
        }

        "parseJson" => {
            let text = string_arg(name, arg(0))?;
            serde_json::from_str::<serde_json::Value>(&text)
                .map(|value| Val::from_json(&value))
                .map_err(|e| EvalError::runtime(format!("failed to parse JSON: {}", e)))
        }

        "escapeStringJson" => Ok(Val::Str(Rc::from(render::quote(&string_arg(name, arg(0))?)?))),

        "manifestJson" => Ok(Val::Str(Rc::from(render::manifest_indented(interp, &arg(0), "    ")?))),

        "manifestJsonEx" => {
            let indent = string_arg(name, arg(1))?;
            Ok(Val::Str(Rc::from(render::manifest_indented(interp, &arg(0), &indent)?)))
        }

        "lines" => {
            let mut text = String::new();
            for item in array_arg(name, arg(0))?.iter() {
                match item {
                    Val::Str(s) => {
                        text.push_str(s);
                        text.push('\n');
                    }
                    Val::Null => {}
                    other => return Err(type_error(name, "array of strings", other)),
                }
            }
            Ok(Val::str(&text))
        }

        // ========== Arrays ==========
        "join" => join(arg(0), arg(1)),

        "map" => {
            let func = arg(0);
            items_of(name, arg(1))?
                .into_iter()
                .map(|item| interp.call(&func, vec![item], Vec::new()))
                .collect::<Result<Vec<_>, _>>()
                .map(Val::arr)
        }

        "filter" => {
            let func = arg(0);
            let mut kept = Vec::new();
            for item in items_of(name, arg(1))? {
                if predicate(interp, name, &func, item.clone())? {
                    kept.push(item);
                }
            }
            Ok(Val::arr(kept))
        }

        "flatMap" => {
            let func = arg(0);
            let mut out = Vec::new();
            for item in items_of(name, arg(1))? {
                match interp.call(&func, vec![item], Vec::new())? {
                    Val::Arr(items) => out.extend(items.iter().cloned()),
                    Val::Null => {}
                    other => return Err(type_error(name, "function returning arrays", &other)),
                }
            }
            Ok(Val::arr(out))
        }

        "foldl" => {
            let func = arg(0);
            let mut acc = arg(2);
            for item in items_of(name, arg(1))? {
                acc = interp.call(&func, vec![acc, item], Vec::new())?;
            }
            Ok(acc)
        }

        "foldr" => {
            let func = arg(0);
            let mut acc = arg(2);
            for item in items_of(name, arg(1))?.into_iter().rev() {
                acc = interp.call(&func, vec![item, acc], Vec::new())?;
            }
            Ok(acc)
        }

        "range" => {
            let from = integer_arg(name, arg(0))?;
            let to = integer_arg(name, arg(1))?;
            Ok(Val::arr((from..=to).map(|n| Val::Num(n as f64)).collect()))
        }

        "makeArray" => {
            let size = index_arg(name, arg(0))?;
            let func = arg(1);
            (0..size)
                .map(|i| interp.call(&func, vec![Val::Num(i as f64)], Vec::new()))
                .collect::<Result<Vec<_>, _>>()
                .map(Val::arr)
        }

        "repeat" => {
            let count = index_arg(name, arg(1))?;
            match arg(0) {
                Val::Str(s) => Ok(Val::str(&s.repeat(count))),
                Val::Arr(items) => Ok(Val::arr(
                    std::iter::repeat(items.iter().cloned()).take(count).flatten().collect(),
                )),
                other => Err(type_error(name, "string or array", &other)),
            }
        }

        "reverse" => {
            let mut items = array_arg(name, arg(0))?.as_ref().clone();
            items.reverse();
            Ok(Val::arr(items))
        }

        "flattenArrays" => {
            let mut out = Vec::new();
            for item in array_arg(name, arg(0))?.iter() {
                match item {
                    Val::Arr(inner) => out.extend(inner.iter().cloned()),
                    Val::Null => {}
                    other => return Err(type_error(name, "array of arrays", other)),
                }
            }
            Ok(Val::arr(out))
        }

        "member" => match arg(0) {
            Val::Str(s) => Ok(Val::Bool(s.contains(&*string_arg(name, arg(1))?))),
            Val::Arr(items) => {
                let needle = arg(1);
                for item in items.iter() {
                    if interp.equals(item, &needle)? {
                        return Ok(Val::Bool(true));
                    }
                }
                Ok(Val::Bool(false))
            }
            other => Err(type_error(name, "array or string", &other)),
        },

        "count" => {
            let needle = arg(1);
            let mut total = 0;
            for item in array_arg(name, arg(0))?.iter() {
                if interp.equals(item, &needle)? {
                    total += 1;
                }
            }
            Ok(Val::Num(total as f64))
        }

        "sort" => sort(interp, name, arg(0), arg(1)).map(|sorted| Val::arr(sorted.into_iter().map(|(_, v)| v).collect())),

        "uniq" => {
            let keyed = keyed(interp, name, arg(0), arg(1))?;
            uniq(interp, keyed).map(Val::arr)
        }

        "set" => {
            let sorted = sort(interp, name, arg(0), arg(1))?;
            uniq(interp, sorted).map(Val::arr)
        }

        // ========== Objects ==========
        "objectFields" => Ok(Val::arr(object_arg(name, arg(0))?.visible_names().iter().map(|k| Val::str(k)).collect())),

        "objectFieldsAll" => Ok(Val::arr(object_arg(name, arg(0))?.field_names().iter().map(|k| Val::str(k)).collect())),

        "objectHas" => {
            let obj = object_arg(name, arg(0))?;
            Ok(Val::Bool(obj.is_visible(&string_arg(name, arg(1))?)))
        }

        "objectHasAll" => {
            let obj = object_arg(name, arg(0))?;
            Ok(Val::Bool(obj.has_field(&string_arg(name, arg(1))?)))
        }

        "objectValues" => {
            let obj = object_arg(name, arg(0))?;
            obj.visible_names()
                .iter()
                .map(|field| interp.field(&obj, field))
                .collect::<Result<Vec<_>, _>>()
                .map(Val::arr)
        }

        "get" => {
            let obj = object_arg(name, arg(0))?;
            let field = string_arg(name, arg(1))?;
            let include_hidden = !matches!(arg(3), Val::Bool(false));
            let present = if include_hidden { obj.has_field(&field) } else { obj.is_visible(&field) };
            if present {
                interp.field(&obj, &field)
            } else {
                Ok(arg(2))
            }
        }

        "mapWithKey" => {
            let func = arg(0);
            let obj = object_arg(name, arg(1))?;
            let mut fields = BTreeMap::new();
            for field in obj.visible_names() {
                let value = interp.field(&obj, &field)?;
                let mapped = interp.call(&func, vec![Val::str(&field), value], Vec::new())?;
                fields.insert(field, mapped);
            }
            Ok(interp.value_object(fields))
        }

        "mergePatch" => merge_patch(interp, arg(0), arg(1), 0),

        // ========== Debugging ==========
        "assertEqual" => {
            let (a, b) = (arg(0), arg(1));
            if interp.equals(&a, &b)? {
                Ok(Val::Bool(true))
            } else {
                Err(EvalError::runtime(format!(
                    "Assertion failed. {} != {}",
                    interp.to_string(&a)?,
                    interp.to_string(&b)?
                )))
            }
        }

        other => Err(EvalError::runtime(format!("unknown builtin std.{}", other))),
    }
}

// ========== Argument helpers ==========

fn string_arg(func: &str, value: Val) -> Result<Rc<str>, EvalError> {
    match value {
        Val::Str(s) => Ok(s),
        other => Err(type_error(func, "string", &other)),
    }
}

fn number_arg(func: &str, value: Val) -> Result<f64, EvalError> {
    match value {
        Val::Num(n) => Ok(n),
        other => Err(type_error(func, "number", &other)),
    }
}

fn integer_arg(func: &str, value: Val) -> Result<i64, EvalError> {
    let n = number_arg(func, value)?;
    if n.fract() != 0.0 {
        return Err(EvalError::runtime(format!("std.{} expected integer, got {}", func, n)));
    }
    Ok(n as i64)
}

fn index_arg(func: &str, value: Val) -> Result<usize, EvalError> {
    let n = integer_arg(func, value)?;
    usize::try_from(n).map_err(|_| EvalError::runtime(format!("std.{} expected non-negative integer, got {}", func, n)))
}

fn array_arg(func: &str, value: Val) -> Result<Rc<Vec<Val>>, EvalError> {
    match value {
        Val::Arr(items) => Ok(items),
        other => Err(type_error(func, "array", &other)),
    }
}

fn object_arg(func: &str, value: Val) -> Result<Rc<ObjVal>, EvalError> {
    match value {
        Val::Obj(obj) => Ok(obj),
        other => Err(type_error(func, "object", &other)),
    }
}

/// Arrays, or strings as arrays of one-character strings
fn items_of(func: &str, value: Val) -> Result<Vec<Val>, EvalError> {
    match value {
        Val::Arr(items) => Ok(items.as_ref().clone()),
        Val::Str(s) => Ok(s.chars().map(|c| Val::str(&c.to_string())).collect()),
        other => Err(type_error(func, "array", &other)),
    }
}

fn math1(func: &str, value: Val, op: fn(f64) -> f64) -> Result<Val, EvalError> {
    let result = op(number_arg(func, value)?);
    if !result.is_finite() {
        return Err(EvalError::runtime(format!("std.{}: result is not a finite number", func)));
    }
    Ok(Val::Num(result))
}

fn math2(func: &str, a: Val, b: Val, op: fn(f64, f64) -> f64) -> Result<Val, EvalError> {
    let result = op(number_arg(func, a)?, number_arg(func, b)?);
    if !result.is_finite() {
        return Err(EvalError::runtime(format!("std.{}: result is not a finite number", func)));
    }
    Ok(Val::Num(result))
}

fn predicate(interp: &Interpreter<'_>, func: &str, predicate: &Val, item: Val) -> Result<bool, EvalError> {
    match interp.call(predicate, vec![item], Vec::new())? {
        Val::Bool(b) => Ok(b),
        other => Err(type_error(func, "boolean from predicate", &other)),
    }
}

// ========== Ordering ==========

/// Items paired with their sort key; a null `key_f` keys items by themselves
fn keyed(interp: &Interpreter<'_>, func: &str, arr: Val, key_f: Val) -> Result<Vec<(Val, Val)>, EvalError> {
    let items = array_arg(func, arr)?;
    items
        .iter()
        .map(|item| match &key_f {
            Val::Null => Ok((item.clone(), item.clone())),
            key_f => Ok((interp.call(key_f, vec![item.clone()], Vec::new())?, item.clone())),
        })
        .collect()
}

fn sort(interp: &Interpreter<'_>, func: &str, arr: Val, key_f: Val) -> Result<Vec<(Val, Val)>, EvalError> {
    let mut keyed = keyed(interp, func, arr, key_f)?;
    let mut failure = None;
    keyed.sort_by(|(a, _), (b, _)| match interp.compare(a, b) {
        Ok(ordering) => ordering,
        Err(err) => {
            failure.get_or_insert(err);
            Ordering::Equal
        }
    });
    match failure {
        Some(err) => Err(err),
        None => Ok(keyed),
    }
}

/// Drops consecutive items whose keys are equal
fn uniq(interp: &Interpreter<'_>, keyed: Vec<(Val, Val)>) -> Result<Vec<Val>, EvalError> {
    let mut out: Vec<Val> = Vec::new();
    let mut last: Option<Val> = None;
    for (key, item) in keyed {
        if let Some(previous) = &last {
            if interp.equals(previous, &key)? {
                continue;
            }
        }
        last = Some(key);
        out.push(item);
    }
    Ok(out)
}

// ========== Composition ==========

fn join(sep: Val, arr: Val) -> Result<Val, EvalError> {
    let items = array_arg("join", arr)?;
    match sep {
        Val::Str(sep) => {
            let mut parts = Vec::new();
            for item in items.iter() {
                match item {
                    Val::Str(s) => parts.push(s.to_string()),
                    Val::Null => {}
                    other => return Err(type_error("join", "array of strings", other)),
                }
            }
            Ok(Val::Str(Rc::from(parts.join(&*sep))))
        }
        Val::Arr(sep) => {
            let mut out = Vec::new();
            let mut first = true;
            for item in items.iter() {
                match item {
                    Val::Arr(inner) => {
                        if !first {
                            out.extend(sep.iter().cloned());
                        }
                        out.extend(inner.iter().cloned());
                        first = false;
                    }
                    Val::Null => {}
                    other => return Err(type_error("join", "array of arrays", other)),
                }
            }
            Ok(Val::arr(out))
        }
        other => Err(type_error("join", "string or array separator", &other)),
    }
}

/// RFC 7386 merge: null patch fields delete, objects merge recursively
fn merge_patch(interp: &Interpreter<'_>, target: Val, patch: Val, depth: usize) -> Result<Val, EvalError> {
    interp.descend(depth)?;
    let patch = match patch {
        Val::Obj(patch) => patch,
        other => return Ok(other),
    };
    let mut fields = BTreeMap::new();
    if let Val::Obj(target) = &target {
        for name in target.visible_names() {
            if !patch.is_visible(&name) {
                let value = interp.field(target, &name)?;
                fields.insert(name, value);
            }
        }
    }
    for name in patch.visible_names() {
        let value = interp.field(&patch, &name)?;
        if matches!(value, Val::Null) {
            continue;
        }
        let current = match &target {
            Val::Obj(target) if target.is_visible(&name) => interp.field(target, &name)?,
            _ => Val::Null,
        };
        fields.insert(name, merge_patch(interp, current, value, depth + 1)?);
    }
    Ok(interp.value_object(fields))
}
