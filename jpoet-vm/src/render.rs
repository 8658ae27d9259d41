//! JSON manifestation
//!
//! Renders values the way the reference evaluator does: three-space indent,
//! sorted keys, empty containers as `{ }` and `[ ]`.

use crate::eval::Interpreter;
use crate::value::Val;
use jpoet_core::EvalError;

const INDENT: &str = "   ";

/// Multi-line manifestation used for evaluation output
pub fn manifest(interp: &Interpreter<'_>, value: &Val) -> Result<String, EvalError> {
    manifest_indented(interp, value, INDENT)
}

/// Multi-line manifestation with a caller-chosen indent unit
pub fn manifest_indented(interp: &Interpreter<'_>, value: &Val, indent: &str) -> Result<String, EvalError> {
    let mut writer = Writer { interp, out: String::new(), unit: Some(indent) };
    writer.value(value, "", 0)?;
    Ok(writer.out)
}

/// Single-line manifestation used by `std.toString` and string concatenation.
/// Strings are returned verbatim.
pub fn to_string(interp: &Interpreter<'_>, value: &Val) -> Result<String, EvalError> {
    match value {
        Val::Str(s) => Ok(s.to_string()),
        other => {
            let mut writer = Writer { interp, out: String::new(), unit: None };
            writer.value(other, "", 0)?;
            Ok(writer.out)
        }
    }
}

/// JSON string literal
pub fn quote(s: &str) -> Result<String, EvalError> {
    serde_json::to_string(s).map_err(|e| EvalError::runtime(format!("couldn't quote string: {}", e)))
}

pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else if n != 0.0 && (n.abs() >= 1e21 || n.abs() < 1e-6) {
        format!("{:e}", n)
    } else {
        format!("{}", n)
    }
}

/// `unit` is the indent per level, or `None` for single-line output
struct Writer<'w, 'a> {
    interp: &'w Interpreter<'a>,
    out: String,
    unit: Option<&'w str>,
}

impl Writer<'_, '_> {
    fn value(&mut self, value: &Val, indent: &str, depth: usize) -> Result<(), EvalError> {
        self.interp.descend(depth)?;
        match value {
            Val::Null => self.out.push_str("null"),
            Val::Bool(b) => self.out.push_str(if *b { "true" } else { "false" }),
            Val::Num(n) => self.out.push_str(&format_number(*n)),
            Val::Str(s) => self.out.push_str(&quote(s)?),
            Val::Func(_) => return Err(EvalError::runtime("couldn't manifest function as JSON")),
            Val::Arr(items) if items.is_empty() => self.out.push_str("[ ]"),
            Val::Arr(items) => {
                let inner = self.open('[', indent);
                for (i, item) in items.iter().enumerate() {
                    self.separator(i, &inner);
                    self.value(item, &inner, depth + 1)?;
                }
                self.close(']', indent);
            }
            Val::Obj(obj) => {
                self.interp.check_asserts(obj)?;
                let names = obj.visible_names();
                if names.is_empty() {
                    self.out.push_str("{ }");
                    return Ok(());
                }
                let inner = self.open('{', indent);
                for (i, name) in names.iter().enumerate() {
                    let field = self.interp.field(obj, name)?;
                    self.separator(i, &inner);
                    self.out.push_str(&quote(name)?);
                    self.out.push_str(": ");
                    self.value(&field, &inner, depth + 1)?;
                }
                self.close('}', indent);
            }
        }
        Ok(())
    }

    /// Writes the opening bracket and returns the indent of the contents
    fn open(&mut self, bracket: char, indent: &str) -> String {
        self.out.push(bracket);
        match self.unit {
            Some(unit) => format!("{}{}", indent, unit),
            None => String::new(),
        }
    }

    fn separator(&mut self, index: usize, inner: &str) {
        match self.unit {
            Some(_) => {
                self.out.push_str(if index == 0 { "\n" } else { ",\n" });
                self.out.push_str(inner);
            }
            None if index > 0 => self.out.push_str(", "),
            None => {}
        }
    }

    fn close(&mut self, bracket: char, indent: &str) {
        if self.unit.is_some() {
            self.out.push('\n');
            self.out.push_str(indent);
        }
        self.out.push(bracket);
    }
}
