//! Runtime values and the JavaScript conversion rules.

use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::Rc;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use super::ast::Function;
use super::interpreter::Scope;

/// Nesting beyond this renders as empty text, which also breaks cycles.
const MAX_DISPLAY_DEPTH: usize = 16;

/// Open containers `JSON.stringify` will descend through.
const MAX_JSON_DEPTH: usize = 10_000;

static NUMERIC_LITERAL: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").ok());

pub type ArrayRef = Rc<RefCell<Vec<Value>>>;
pub type ObjectRef = Rc<RefCell<IndexMap<String, Value>>>;

/// Why a value could not be converted to JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonError {
    /// A container holds itself.
    Circular,
    /// Nesting ran past [`MAX_JSON_DEPTH`].
    TooDeep,
}

/// Which group of builtins a native function belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeKind {
    Global,
    ArrayMethod,
    StringMethod,
    NumberMethod,
}

pub struct NativeFunction {
    pub kind: NativeKind,
    pub name: &'static str,
    /// `this` for methods; `Undefined` for globals.
    pub receiver: Value,
}

pub struct Closure {
    pub function: Rc<Function>,
    pub scope: Rc<Scope>,
}

#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Array(ArrayRef),
    Object(ObjectRef),
    Function(Rc<Closure>),
    Native(Rc<NativeFunction>),
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_display())
    }
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Self::Str(Rc::from(s.into()))
    }

    #[cfg(test)]
    pub fn array(items: Vec<Self>) -> Self {
        Self::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(entries: IndexMap<String, Self>) -> Self {
        Self::Object(Rc::new(RefCell::new(entries)))
    }

    pub fn native(kind: NativeKind, name: &'static str, receiver: Self) -> Self {
        Self::Native(Rc::new(NativeFunction {
            kind,
            name,
            receiver,
        }))
    }

    /// An `Error`-like object with `name` and `message`.
    pub fn error(name: &str, message: impl Into<String>) -> Self {
        let mut entries = IndexMap::new();
        entries.insert("name".to_string(), Self::string(name));
        entries.insert("message".to_string(), Self::string(message));
        Self::object(entries)
    }

    pub const fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    pub const fn is_callable(&self) -> bool {
        matches!(self, Self::Function(_) | Self::Native(_))
    }

    pub fn truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub const fn type_of(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null | Self::Array(_) | Self::Object(_) => "object",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Str(_) => "string",
            Self::Function(_) | Self::Native(_) => "function",
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Self::Undefined => f64::NAN,
            Self::Null => 0.0,
            Self::Bool(b) => f64::from(u8::from(*b)),
            Self::Number(n) => *n,
            Self::Str(s) => string_to_number(s),
            Self::Array(_) | Self::Object(_) => string_to_number(&self.to_display()),
            Self::Function(_) | Self::Native(_) => f64::NAN,
        }
    }

    /// The `String(value)` conversion.
    pub fn to_display(&self) -> String {
        let mut out = String::new();
        self.write_display(&mut out, 0);
        out
    }

    fn write_display(&self, out: &mut String, depth: usize) {
        if depth > MAX_DISPLAY_DEPTH {
            return;
        }
        match self {
            Self::Undefined => out.push_str("undefined"),
            Self::Null => out.push_str("null"),
            Self::Bool(b) => {
                let _ = write!(out, "{b}");
            }
            Self::Number(n) => out.push_str(&format_number(*n)),
            Self::Str(s) => out.push_str(s),
            Self::Array(items) => {
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    if !item.is_nullish() {
                        item.write_display(out, depth + 1);
                    }
                }
            }
            Self::Object(entries) => {
                let entries = entries.borrow();
                match (entries.get("name"), entries.get("message")) {
                    (Some(Self::Str(name)), Some(message)) if name.ends_with("Error") => {
                        out.push_str(name);
                        let message = message.to_display();
                        if !message.is_empty() {
                            let _ = write!(out, ": {message}");
                        }
                    }
                    _ => out.push_str("[object Object]"),
                }
            }
            Self::Function(closure) => {
                let name = closure.function.name.as_deref().unwrap_or("anonymous");
                let _ = write!(out, "[Function: {name}]");
            }
            Self::Native(native) => {
                let _ = write!(out, "function {}() {{ [native code] }}", native.name);
            }
        }
    }

    /// Converts objects to their string form; primitives pass through.
    pub fn to_primitive(&self) -> Self {
        match self {
            Self::Array(_) | Self::Object(_) | Self::Function(_) | Self::Native(_) => {
                Self::string(self.to_display())
            }
            other => other.clone(),
        }
    }

    /// `===`
    pub fn strict_equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            #[allow(clippy::float_cmp)]
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => Rc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Native(a), Self::Native(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `==`
    pub fn loose_equals(&self, other: &Self) -> bool {
        match (self, other) {
            (a, b) if std::mem::discriminant(a) == std::mem::discriminant(b) => a.strict_equals(b),
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Self::Number(a), Self::Str(_)) => *a == other.to_number(),
            (Self::Str(_), Self::Number(b)) => self.to_number() == *b,
            (Self::Bool(_), _) => Self::Number(self.to_number()).loose_equals(other),
            (_, Self::Bool(_)) => self.loose_equals(&Self::Number(other.to_number())),
            (Self::Array(_) | Self::Object(_), _) => self.to_primitive().loose_equals(other),
            (_, Self::Array(_) | Self::Object(_)) => self.loose_equals(&other.to_primitive()),
            _ => false,
        }
    }

    /// `SameValueZero`, used by `includes`.
    pub fn same_value_zero(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) if a.is_nan() && b.is_nan() => true,
            _ => self.strict_equals(other),
        }
    }

    /// Converts to a `serde_json` value, or `None` where `JSON.stringify` skips.
    ///
    /// # Errors
    ///
    /// Fails on a container that contains itself, or on nesting deeper than
    /// the evaluator would allow.
    pub fn to_json(&self) -> Result<Option<serde_json::Value>, JsonError> {
        self.to_json_within(&mut Vec::new())
    }

    fn to_json_within(
        &self,
        open: &mut Vec<*const ()>,
    ) -> Result<Option<serde_json::Value>, JsonError> {
        let json = match self {
            Self::Undefined | Self::Function(_) | Self::Native(_) => return Ok(None),
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => json_number(*n),
            Self::Str(s) => serde_json::Value::String(s.to_string()),
            Self::Array(items) => {
                enter(open, Rc::as_ptr(items).cast())?;
                let mut out = Vec::new();
                for item in items.borrow().iter() {
                    out.push(item.to_json_within(open)?.unwrap_or(serde_json::Value::Null));
                }
                open.pop();
                serde_json::Value::Array(out)
            }
            Self::Object(entries) => {
                enter(open, Rc::as_ptr(entries).cast())?;
                let mut out = serde_json::Map::new();
                for (key, value) in entries.borrow().iter() {
                    if let Some(value) = value.to_json_within(open)? {
                        out.insert(key.clone(), value);
                    }
                }
                open.pop();
                serde_json::Value::Object(out)
            }
        };
        Ok(Some(json))
    }
}

fn enter(open: &mut Vec<*const ()>, container: *const ()) -> Result<(), JsonError> {
    if open.contains(&container) {
        return Err(JsonError::Circular);
    }
    if open.len() >= MAX_JSON_DEPTH {
        return Err(JsonError::TooDeep);
    }
    open.push(container);
    Ok(())
}

fn json_number(n: f64) -> serde_json::Value {
    if !n.is_finite() {
        return serde_json::Value::Null;
    }
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        return serde_json::Value::from(n as i64);
    }
    serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
}

/// The `Number(string)` conversion.
pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).map_or(f64::NAN, |n| n as f64);
    }
    if NUMERIC_LITERAL
        .as_ref()
        .is_some_and(|re| re.is_match(trimmed))
    {
        trimmed.parse().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

/// Formats a number the way JavaScript prints it.
///
/// # Examples
///
/// `2.0` prints as `2`, `0.1 + 0.2` as `0.30000000000000004` and `1e21` as `1e+21`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let sign = if n < 0.0 { "-" } else { "" };

    // Shortest round-trip digits and the decimal point position
    let scientific = format!("{:e}", n.abs());
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific.as_str(), "0"));
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    let point = exponent.parse::<i64>().unwrap_or(0) + 1;
    let len = i64::try_from(digits.len()).unwrap_or(i64::MAX);

    let body = if (len..=21).contains(&point) {
        format!("{digits}{}", "0".repeat(usize::try_from(point - len).unwrap_or(0)))
    } else if (1..=21).contains(&point) {
        let (whole, fraction) = digits.split_at(usize::try_from(point).unwrap_or(0));
        format!("{whole}.{fraction}")
    } else if (-5..=0).contains(&point) {
        format!("0.{}{digits}", "0".repeat(usize::try_from(-point).unwrap_or(0)))
    } else {
        let (first, rest) = digits.split_at(1);
        let exponent = point - 1;
        let exponent_sign = if exponent < 0 { "-" } else { "+" };
        let fraction = if rest.is_empty() { String::new() } else { format!(".{rest}") };
        format!("{first}{fraction}e{exponent_sign}{}", exponent.abs())
    };
    format!("{sign}{body}")
}
