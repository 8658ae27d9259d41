//! printf-style formatting for `std.format` and `str % values`
//!
//! Codes follow `%[(name)][flags][width][.precision][length]type` with the
//! types `d i u o x X e E f F g G c s %`.

use crate::eval::Interpreter;
use crate::value::{ObjVal, Val};
use jpoet_core::EvalError;
use std::iter::Peekable;
use std::rc::Rc;
use std::str::Chars;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Count {
    Fixed(usize),
    /// `*`, taken from the next value
    Next,
}

#[derive(Debug, Default)]
struct Code {
    name: Option<String>,
    alternate: bool,
    zero: bool,
    left: bool,
    plus: bool,
    space: bool,
    width: Option<Count>,
    precision: Option<Count>,
    conversion: char,
}

/// Format `template` with an array of values, an object of named values,
/// or a single value.
pub fn format(interp: &Interpreter<'_>, template: &str, values: &Val) -> Result<String, EvalError> {
    let (positional, named): (Vec<Val>, Option<&Rc<ObjVal>>) = match values {
        Val::Arr(items) => (items.as_ref().clone(), None),
        Val::Obj(obj) => (Vec::new(), Some(obj)),
        other => (vec![other.clone()], None),
    };
    let mut values = Values { items: &positional, next: 0 };
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let code = parse_code(&mut chars)?;
        if code.conversion == '%' {
            out.push('%');
            continue;
        }
        let width = values.count(code.width)?;
        let precision = values.count(code.precision)?;
        let value = match (&code.name, named) {
            (Some(name), Some(obj)) => interp.field(obj, name)?,
            (Some(_), None) => {
                return Err(EvalError::runtime("format with named codes requires an object of values"));
            }
            (None, Some(_)) => {
                return Err(EvalError::runtime("format with an object of values requires named codes"));
            }
            (None, None) => values.take()?,
        };
        out.push_str(&convert(interp, &code, width, precision, &value)?);
    }
    if named.is_none() && values.next < positional.len() {
        return Err(EvalError::runtime(format!(
            "too many values to format: {}, expected {}",
            positional.len(),
            values.next
        )));
    }
    Ok(out)
}

struct Values<'v> {
    items: &'v [Val],
    next: usize,
}

impl Values<'_> {
    fn take(&mut self) -> Result<Val, EvalError> {
        let value = self.items.get(self.next).cloned().ok_or_else(|| {
            EvalError::runtime(format!("not enough values to format: got {}", self.items.len()))
        })?;
        self.next += 1;
        Ok(value)
    }

    fn count(&mut self, count: Option<Count>) -> Result<Option<usize>, EvalError> {
        match count {
            None => Ok(None),
            Some(Count::Fixed(n)) => Ok(Some(n)),
            Some(Count::Next) => match self.take()? {
                Val::Num(n) if n >= 0.0 && n.fract() == 0.0 => Ok(Some(n as usize)),
                other => Err(EvalError::runtime(format!(
                    "format width or precision must be a non-negative integer, got {}",
                    other.type_name()
                ))),
            },
        }
    }
}

// ========== Parsing ==========

fn parse_code(chars: &mut Peekable<Chars<'_>>) -> Result<Code, EvalError> {
    let mut code = Code::default();
    if chars.peek() == Some(&'(') {
        chars.next();
        let mut name = String::new();
        loop {
            match chars.next() {
                Some(')') => break,
                Some(c) => name.push(c),
                None => return Err(EvalError::runtime("truncated format code")),
            }
        }
        code.name = Some(name);
    }
    while let Some(&c) = chars.peek() {
        match c {
            '#' => code.alternate = true,
            '0' => code.zero = true,
            '-' => code.left = true,
            '+' => code.plus = true,
            ' ' => code.space = true,
            _ => break,
        }
        chars.next();
    }
    code.width = parse_count(chars);
    if chars.peek() == Some(&'.') {
        chars.next();
        code.precision = Some(parse_count(chars).unwrap_or(Count::Fixed(0)));
    }
    while matches!(chars.peek(), Some('h' | 'l' | 'L')) {
        chars.next();
    }
    code.conversion = chars.next().ok_or_else(|| EvalError::runtime("truncated format code"))?;
    Ok(code)
}

fn parse_count(chars: &mut Peekable<Chars<'_>>) -> Option<Count> {
    if chars.peek() == Some(&'*') {
        chars.next();
        return Some(Count::Next);
    }
    let mut digits = String::new();
    while let Some(&c) = chars.peek() {
        if !c.is_ascii_digit() {
            break;
        }
        digits.push(c);
        chars.next();
    }
    digits.parse().ok().map(Count::Fixed)
}

// ========== Conversions ==========

fn convert(
    interp: &Interpreter<'_>,
    code: &Code,
    width: Option<usize>,
    precision: Option<usize>,
    value: &Val,
) -> Result<String, EvalError> {
    let text = match code.conversion {
        'd' | 'i' | 'u' => {
            let n = number(code, value)?.trunc();
            let mut digits = format!("{:.0}", n.abs());
            if let Some(precision) = precision {
                digits = zero_extend(digits, precision);
            }
            numeric(code, width, n < 0.0, "", &digits)
        }
        'o' => {
            let n = number(code, value)?.trunc();
            let digits = zero_extend(format!("{:o}", n.abs() as u64), precision.unwrap_or(0));
            let prefix = if code.alternate && !digits.starts_with('0') { "0" } else { "" };
            numeric(code, width, n < 0.0, prefix, &digits)
        }
        'x' | 'X' => {
            let n = number(code, value)?.trunc();
            let mut digits = zero_extend(format!("{:x}", n.abs() as u64), precision.unwrap_or(0));
            let mut prefix = if code.alternate { "0x".to_string() } else { String::new() };
            if code.conversion == 'X' {
                digits = digits.to_uppercase();
                prefix = prefix.to_uppercase();
            }
            numeric(code, width, n < 0.0, &prefix, &digits)
        }
        'e' | 'E' => {
            let n = number(code, value)?;
            let digits = exponent(n.abs(), precision.unwrap_or(6), code.conversion == 'E', code.alternate);
            numeric(code, width, n < 0.0, "", &digits)
        }
        'f' | 'F' => {
            let n = number(code, value)?;
            let precision = precision.unwrap_or(6);
            let mut digits = format!("{:.*}", precision, n.abs());
            if code.alternate && precision == 0 {
                digits.push('.');
            }
            numeric(code, width, n < 0.0, "", &digits)
        }
        'g' | 'G' => {
            let n = number(code, value)?;
            let digits = general(n.abs(), precision.unwrap_or(6), code.conversion == 'G', code.alternate);
            numeric(code, width, n < 0.0, "", &digits)
        }
        'c' => {
            let text = match value {
                Val::Num(n) => char::from_u32(*n as u32)
                    .map(String::from)
                    .ok_or_else(|| EvalError::runtime(format!("%c expected a codepoint, got {}", n)))?,
                Val::Str(s) if s.chars().count() == 1 => s.to_string(),
                other => {
                    return Err(EvalError::runtime(format!(
                        "%c expected number or single character string, got {}",
                        other.type_name()
                    )));
                }
            };
            pad(text, width, code.left)
        }
        's' => {
            let mut text = interp.to_string(value)?;
            if let Some(precision) = precision {
                text = text.chars().take(precision).collect();
            }
            pad(text, width, code.left)
        }
        other => return Err(EvalError::runtime(format!("unrecognized conversion type: {}", other))),
    };
    Ok(text)
}

fn number(code: &Code, value: &Val) -> Result<f64, EvalError> {
    match value {
        Val::Num(n) => Ok(*n),
        other => Err(EvalError::runtime(format!(
            "format %{} expected number, got {}",
            code.conversion,
            other.type_name()
        ))),
    }
}

fn zero_extend(digits: String, min: usize) -> String {
    if digits.len() >= min {
        return digits;
    }
    format!("{}{}", "0".repeat(min - digits.len()), digits)
}

/// Sign, prefix and digits, padded to `width`; zero padding goes after the sign
fn numeric(code: &Code, width: Option<usize>, negative: bool, prefix: &str, digits: &str) -> String {
    let sign = if negative {
        "-"
    } else if code.plus {
        "+"
    } else if code.space {
        " "
    } else {
        ""
    };
    let head = format!("{}{}", sign, prefix);
    let len = head.chars().count() + digits.chars().count();
    match width {
        Some(width) if width > len && code.zero && !code.left => {
            format!("{}{}{}", head, "0".repeat(width - len), digits)
        }
        _ => pad(format!("{}{}", head, digits), width, code.left),
    }
}

fn pad(text: String, width: Option<usize>, left: bool) -> String {
    let len = text.chars().count();
    match width {
        Some(width) if width > len && left => format!("{}{}", text, " ".repeat(width - len)),
        Some(width) if width > len => format!("{}{}", " ".repeat(width - len), text),
        _ => text,
    }
}

/// `1.500000e+02` style, with at least two exponent digits
fn exponent(n: f64, precision: usize, upper: bool, alternate: bool) -> String {
    let text = format!("{:.*e}", precision, n);
    let (mantissa, exp) = text.split_once('e').unwrap_or((text.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let mut mantissa = mantissa.to_string();
    if alternate && precision == 0 {
        mantissa.push('.');
    }
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{}{}{}{:02}", mantissa, if upper { 'E' } else { 'e' }, sign, exp.abs())
}

/// Fixed or exponent notation, whichever is shorter for the precision
fn general(n: f64, precision: usize, upper: bool, alternate: bool) -> String {
    let precision = precision.max(1);
    let exp = if n == 0.0 {
        0
    } else {
        let text = format!("{:.*e}", precision - 1, n);
        text.split_once('e').and_then(|(_, exp)| exp.parse::<i32>().ok()).unwrap_or(0)
    };
    let text = if exp < -4 || exp >= precision as i32 {
        exponent(n, precision - 1, upper, alternate)
    } else {
        format!("{:.*}", (precision as i32 - 1 - exp).max(0) as usize, n)
    };
    if alternate {
        text
    } else {
        strip_trailing_zeros(&text)
    }
}

fn strip_trailing_zeros(text: &str) -> String {
    let (mantissa, exp) = match text.find(['e', 'E']) {
        Some(idx) => text.split_at(idx),
        None => (text, ""),
    };
    let mantissa = if mantissa.contains('.') {
        mantissa.trim_end_matches('0').trim_end_matches('.')
    } else {
        mantissa
    };
    format!("{}{}", mantissa, exp)
}
