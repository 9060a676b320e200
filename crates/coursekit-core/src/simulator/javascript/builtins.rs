//! Global objects and the methods of arrays, strings and numbers.

#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

use std::cmp::Ordering;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use super::interpreter::{Abrupt, Eval, Interpreter, MAX_ARRAY_LENGTH, MAX_STRING_LENGTH};
use super::value::{format_number, ArrayRef, JsonError, NativeKind, Value};
use crate::simulator::{OutputEvent, OutputKind};

static FLOAT_PREFIX: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[+-]?(Infinity|(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?)").ok());

const CONSOLE_METHODS: &[&str] = &[
    "console.log",
    "console.info",
    "console.warn",
    "console.error",
    "console.debug",
];

const MATH_FUNCTIONS: &[&str] = &[
    "Math.abs",
    "Math.floor",
    "Math.ceil",
    "Math.round",
    "Math.trunc",
    "Math.sign",
    "Math.sqrt",
    "Math.cbrt",
    "Math.pow",
    "Math.min",
    "Math.max",
    "Math.random",
    "Math.log",
    "Math.log2",
    "Math.log10",
    "Math.exp",
    "Math.sin",
    "Math.cos",
    "Math.tan",
    "Math.hypot",
];

const JSON_FUNCTIONS: &[&str] = &["JSON.stringify", "JSON.parse"];

const GLOBAL_FUNCTIONS: &[&str] = &[
    "Object",
    "Array",
    "Number",
    "String",
    "Boolean",
    "parseInt",
    "parseFloat",
    "isNaN",
    "isFinite",
    "Error",
    "TypeError",
    "RangeError",
    "ReferenceError",
    "SyntaxError",
];

/// `(global, member, native name)`
const STATIC_MEMBERS: &[(&str, &str, &str)] = &[
    ("Object", "keys", "Object.keys"),
    ("Object", "values", "Object.values"),
    ("Object", "entries", "Object.entries"),
    ("Object", "assign", "Object.assign"),
    ("Array", "isArray", "Array.isArray"),
    ("Array", "from", "Array.from"),
    ("Array", "of", "Array.of"),
    ("Number", "isInteger", "Number.isInteger"),
    ("Number", "isFinite", "Number.isFinite"),
    ("Number", "isNaN", "Number.isNaN"),
    ("Number", "parseFloat", "parseFloat"),
    ("Number", "parseInt", "parseInt"),
];

const ARRAY_METHODS: &[&str] = &[
    "push",
    "pop",
    "shift",
    "unshift",
    "slice",
    "splice",
    "concat",
    "join",
    "reverse",
    "indexOf",
    "lastIndexOf",
    "includes",
    "fill",
    "find",
    "findIndex",
    "filter",
    "map",
    "forEach",
    "reduce",
    "some",
    "every",
    "sort",
    "toString",
];

const STRING_METHODS: &[&str] = &[
    "toUpperCase",
    "toLowerCase",
    "trim",
    "trimStart",
    "trimEnd",
    "includes",
    "indexOf",
    "lastIndexOf",
    "startsWith",
    "endsWith",
    "slice",
    "substring",
    "charAt",
    "charCodeAt",
    "split",
    "repeat",
    "replace",
    "replaceAll",
    "padStart",
    "padEnd",
    "concat",
    "toString",
];

const NUMBER_METHODS: &[&str] = &["toFixed", "toString"];

fn find(list: &[&'static str], key: &str) -> Option<&'static str> {
    list.iter().copied().find(|name| *name == key)
}

pub(super) fn array_method(key: &str) -> Option<&'static str> {
    find(ARRAY_METHODS, key)
}

pub(super) fn string_method(key: &str) -> Option<&'static str> {
    find(STRING_METHODS, key)
}

pub(super) fn number_method(key: &str) -> Option<&'static str> {
    find(NUMBER_METHODS, key)
}

/// Static function such as `Object.keys` on a global constructor.
pub(super) fn static_member(global: &str, key: &str) -> Option<&'static str> {
    STATIC_MEMBERS
        .iter()
        .find(|(owner, member, _)| *owner == global && *member == key)
        .map(|(_, _, name)| *name)
}

/// `value instanceof <global>`
pub(super) fn is_instance(value: &Value, global: &str) -> bool {
    match (value, global) {
        (Value::Array(_), "Array" | "Object") => true,
        (Value::Function(_) | Value::Native(_), "Object") => true,
        (Value::Object(entries), global) => {
            if global == "Object" {
                return true;
            }
            match entries.borrow().get("name") {
                Some(Value::Str(name)) if global.ends_with("Error") => {
                    name.ends_with("Error") && (global == "Error" || **name == *global)
                }
                _ => false,
            }
        }
        _ => false,
    }
}

pub(super) fn install_globals(interpreter: &mut Interpreter) {
    let console = namespace(interpreter, CONSOLE_METHODS, &[]);
    interpreter.define_global("console", console);
    let math = namespace(
        interpreter,
        MATH_FUNCTIONS,
        &[("PI", std::f64::consts::PI), ("E", std::f64::consts::E)],
    );
    interpreter.define_global("Math", math);
    let json = namespace(interpreter, JSON_FUNCTIONS, &[]);
    interpreter.define_global("JSON", json);
    for name in GLOBAL_FUNCTIONS {
        interpreter.define_global(name, Value::native(NativeKind::Global, *name, Value::Undefined));
    }
    interpreter.define_global("NaN", Value::Number(f64::NAN));
    interpreter.define_global("Infinity", Value::Number(f64::INFINITY));
}

fn namespace(
    interpreter: &mut Interpreter,
    functions: &[&'static str],
    constants: &[(&str, f64)],
) -> Value {
    let mut entries = IndexMap::new();
    for name in functions {
        let member = name.split_once('.').map_or(*name, |(_, member)| member);
        entries.insert(
            member.to_string(),
            Value::native(NativeKind::Global, *name, Value::Undefined),
        );
    }
    for (name, value) in constants {
        entries.insert((*name).to_string(), Value::Number(*value));
    }
    interpreter.new_object(entries)
}

// ============================================================================
// Dispatch
// ============================================================================

pub(super) fn call_native(
    interpreter: &mut Interpreter,
    kind: NativeKind,
    name: &'static str,
    receiver: Value,
    args: Vec<Value>,
) -> Eval {
    match (kind, &receiver) {
        (NativeKind::ArrayMethod, Value::Array(items)) => {
            let items = ArrayRef::clone(items);
            array_call(interpreter, &items, &receiver, name, args)
        }
        (NativeKind::StringMethod, Value::Str(s)) => {
            let s = s.to_string();
            string_call(interpreter, &s, name, &args)
        }
        (NativeKind::NumberMethod, _) => number_call(interpreter, receiver.to_number(), name, &args),
        (NativeKind::Global, _) => global_call(interpreter, name, args),
        _ => Ok(Value::Undefined),
    }
}

/// `new <global>(...)`; `None` when the global is not a constructor.
pub(super) fn construct_native(
    interpreter: &mut Interpreter,
    name: &'static str,
    args: Vec<Value>,
) -> Option<Eval> {
    match name {
        "Object" | "Array" | "Number" | "String" | "Boolean" => {
            Some(global_call(interpreter, name, args))
        }
        name if name.ends_with("Error") => Some(Ok(new_error(interpreter, name, &args))),
        _ => None,
    }
}

fn new_error(interpreter: &mut Interpreter, name: &str, args: &[Value]) -> Value {
    let message = match arg(args, 0) {
        Value::Undefined => String::new(),
        other => other.to_display(),
    };
    let mut entries = IndexMap::new();
    entries.insert("name".to_string(), Value::string(name));
    entries.insert("message".to_string(), Value::string(message));
    interpreter.new_object(entries)
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Undefined)
}

fn callback(interpreter: &Interpreter, args: &[Value]) -> Result<Value, Abrupt> {
    let function = arg(args, 0);
    if function.is_callable() {
        Ok(function)
    } else {
        Err(interpreter.type_error(format!("{} is not a function", function.to_display())))
    }
}

/// Resolves a possibly negative index against `len`.
fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    if matches!(value, Value::Undefined) {
        return default;
    }
    let n = value.to_number();
    if n.is_nan() {
        return 0;
    }
    let n = n.trunc();
    let len_f = len as f64;
    if n < 0.0 {
        (len_f + n).max(0.0) as usize
    } else {
        n.min(len_f) as usize
    }
}

fn index_value(index: usize) -> Value {
    Value::Number(index as f64)
}

// ============================================================================
// Globals
// ============================================================================

#[allow(clippy::too_many_lines)]
fn global_call(interpreter: &mut Interpreter, name: &'static str, args: Vec<Value>) -> Eval {
    if let Some(method) = name.strip_prefix("console.") {
        let kind = match method {
            "info" => OutputKind::Info,
            "warn" => OutputKind::Warning,
            "error" => OutputKind::Error,
            _ => OutputKind::Log,
        };
        let text = args
            .iter()
            .map(Value::to_display)
            .collect::<Vec<_>>()
            .join(" ");
        interpreter.events.push(OutputEvent::new(kind, text));
        return Ok(Value::Undefined);
    }
    if let Some(function) = name.strip_prefix("Math.") {
        return Ok(Value::Number(math_call(interpreter, function, &args)));
    }
    match name {
        "JSON.stringify" => {
            let json = match arg(&args, 0).to_json() {
                Ok(Some(json)) => json,
                Ok(None) => return Ok(Value::Undefined),
                Err(JsonError::Circular) => {
                    return Err(interpreter.type_error("Converting circular structure to JSON"));
                }
                Err(JsonError::TooDeep) => {
                    return Err(interpreter.range_error("Maximum call stack size exceeded"));
                }
            };
            let pretty = match arg(&args, 2) {
                Value::Number(n) => n >= 1.0,
                Value::Str(s) => !s.is_empty(),
                _ => false,
            };
            let text = if pretty {
                serde_json::to_string_pretty(&json)
            } else {
                serde_json::to_string(&json)
            };
            match text {
                Ok(text) => interpreter.new_string(text),
                Err(e) => Err(interpreter.type_error(e.to_string())),
            }
        }
        "JSON.parse" => {
            let text = arg(&args, 0).to_display();
            match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(json) => from_json(interpreter, &json),
                Err(e) => Err(interpreter.throw(
                    "SyntaxError",
                    format!("Unexpected token in JSON at line {} column {}", e.line(), e.column()),
                )),
            }
        }
        "Object" => match arg(&args, 0) {
            value @ (Value::Object(_) | Value::Array(_)) => Ok(value),
            _ => Ok(interpreter.new_object(IndexMap::new())),
        },
        "Object.keys" | "Object.values" | "Object.entries" => {
            let pairs: Vec<(String, Value)> = match arg(&args, 0) {
                Value::Object(entries) => entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                Value::Array(items) => items
                    .borrow()
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (i.to_string(), v.clone()))
                    .collect(),
                Value::Str(s) => s
                    .chars()
                    .enumerate()
                    .map(|(i, c)| (i.to_string(), Value::string(c.to_string())))
                    .collect(),
                other if other.is_nullish() => {
                    return Err(interpreter.type_error("Cannot convert undefined or null to object"))
                }
                _ => Vec::new(),
            };
            let mut items = Vec::with_capacity(pairs.len());
            for (key, value) in pairs {
                items.push(match name {
                    "Object.keys" => Value::string(key),
                    "Object.values" => value,
                    _ => interpreter.new_array(vec![Value::string(key), value])?,
                });
            }
            interpreter.new_array(items)
        }
        "Object.assign" => {
            let target = arg(&args, 0);
            if let Value::Object(entries) = &target {
                for source in args.iter().skip(1) {
                    if let Value::Object(source) = source {
                        let copied: Vec<(String, Value)> = source
                            .borrow()
                            .iter()
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect();
                        entries.borrow_mut().extend(copied);
                    }
                }
            }
            Ok(target)
        }
        "Array" | "Array.of" => {
            if let (true, [Value::Number(n)]) = (name == "Array", args.as_slice()) {
                if *n < 0.0 || n.fract() != 0.0 || *n > MAX_ARRAY_LENGTH as f64 {
                    return Err(interpreter.range_error("Invalid array length"));
                }
                return interpreter.new_array(vec![Value::Undefined; *n as usize]);
            }
            interpreter.new_array(args)
        }
        "Array.isArray" => Ok(Value::Bool(matches!(arg(&args, 0), Value::Array(_)))),
        "Array.from" => {
            let items = match arg(&args, 0) {
                Value::Object(entries) => {
                    let length = entries.borrow().get("length").map_or(0.0, Value::to_number);
                    if !(0.0..=MAX_ARRAY_LENGTH as f64).contains(&length) {
                        return Err(interpreter.range_error("Invalid array length"));
                    }
                    vec![Value::Undefined; length as usize]
                }
                other if other.is_nullish() => {
                    return Err(interpreter.type_error(format!("{} is not iterable", other.to_display())))
                }
                other => interpreter.iterate(&other)?,
            };
            let mapper = arg(&args, 1);
            if !mapper.is_callable() {
                return interpreter.new_array(items);
            }
            let mut mapped = Vec::with_capacity(items.len());
            for (index, item) in items.into_iter().enumerate() {
                mapped.push(interpreter.call(&mapper, Value::Undefined, vec![item, index_value(index)])?);
            }
            interpreter.new_array(mapped)
        }
        "Number" => Ok(Value::Number(args.first().map_or(0.0, Value::to_number))),
        "Number.isInteger" => Ok(Value::Bool(
            matches!(arg(&args, 0), Value::Number(n) if n.is_finite() && n.fract() == 0.0),
        )),
        "Number.isFinite" => Ok(Value::Bool(matches!(arg(&args, 0), Value::Number(n) if n.is_finite()))),
        "Number.isNaN" => Ok(Value::Bool(matches!(arg(&args, 0), Value::Number(n) if n.is_nan()))),
        "String" => Ok(Value::string(args.first().map_or_else(String::new, Value::to_display))),
        "Boolean" => Ok(Value::Bool(arg(&args, 0).truthy())),
        "parseInt" => {
            let radix = arg(&args, 1).to_number();
            let radix = (radix.is_finite() && radix.trunc() != 0.0).then(|| radix.trunc() as u32);
            Ok(Value::Number(parse_int(&arg(&args, 0).to_display(), radix)))
        }
        "parseFloat" => Ok(Value::Number(parse_float(&arg(&args, 0).to_display()))),
        "isNaN" => Ok(Value::Bool(arg(&args, 0).to_number().is_nan())),
        "isFinite" => Ok(Value::Bool(arg(&args, 0).to_number().is_finite())),
        name if name.ends_with("Error") => Ok(new_error(interpreter, name, &args)),
        _ => Err(interpreter.type_error(format!("{name} is not a function"))),
    }
}

fn math_call(interpreter: &mut Interpreter, function: &str, args: &[Value]) -> f64 {
    let x = arg(args, 0).to_number();
    let numbers = || args.iter().map(Value::to_number);
    match function {
        "abs" => x.abs(),
        "floor" => x.floor(),
        "ceil" => x.ceil(),
        "round" => (x + 0.5).floor(),
        "trunc" => x.trunc(),
        "sign" => {
            if x.is_nan() || x == 0.0 {
                x
            } else {
                x.signum()
            }
        }
        "sqrt" => x.sqrt(),
        "cbrt" => x.cbrt(),
        "pow" => x.powf(arg(args, 1).to_number()),
        "min" => numbers().fold(f64::INFINITY, |acc, n| if n.is_nan() || acc.is_nan() { f64::NAN } else { acc.min(n) }),
        "max" => numbers().fold(f64::NEG_INFINITY, |acc, n| if n.is_nan() || acc.is_nan() { f64::NAN } else { acc.max(n) }),
        "random" => interpreter.next_random(),
        "log" => x.ln(),
        "log2" => x.log2(),
        "log10" => x.log10(),
        "exp" => x.exp(),
        "sin" => x.sin(),
        "cos" => x.cos(),
        "tan" => x.tan(),
        "hypot" => numbers().map(|n| n * n).sum::<f64>().sqrt(),
        _ => f64::NAN,
    }
}

fn parse_int(text: &str, radix: Option<u32>) -> f64 {
    let text = text.trim_start();
    let (negative, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let has_hex_prefix = text.starts_with("0x") || text.starts_with("0X");
    let (radix, text) = match radix {
        None if has_hex_prefix => (16, &text[2..]),
        Some(16) if has_hex_prefix => (16, &text[2..]),
        None => (10, text),
        Some(radix) => (radix, text),
    };
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let mut value: Option<f64> = None;
    for c in text.chars() {
        let Some(digit) = c.to_digit(radix) else {
            break;
        };
        value = Some(value.unwrap_or(0.0) * f64::from(radix) + f64::from(digit));
    }
    value.map_or(f64::NAN, |v| if negative { -v } else { v })
}

fn parse_float(text: &str) -> f64 {
    let text = text.trim_start();
    let Some(found) = FLOAT_PREFIX.as_ref().and_then(|re| re.find(text)) else {
        return f64::NAN;
    };
    let literal = found.as_str();
    match literal.trim_start_matches(['+', '-']) {
        "Infinity" if literal.starts_with('-') => f64::NEG_INFINITY,
        "Infinity" => f64::INFINITY,
        _ => literal.parse().unwrap_or(f64::NAN),
    }
}

fn from_json(interpreter: &mut Interpreter, json: &serde_json::Value) -> Eval {
    Ok(match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::string(s.as_str()),
        serde_json::Value::Array(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(from_json(interpreter, item)?);
            }
            interpreter.new_array(values)?
        }
        serde_json::Value::Object(map) => {
            let mut entries = IndexMap::new();
            for (key, value) in map {
                entries.insert(key.clone(), from_json(interpreter, value)?);
            }
            interpreter.new_object(entries)
        }
    })
}

// ============================================================================
// Array methods
// ============================================================================

#[allow(clippy::too_many_lines)]
fn array_call(
    interpreter: &mut Interpreter,
    items: &ArrayRef,
    this: &Value,
    name: &str,
    args: Vec<Value>,
) -> Eval {
    let len = items.borrow().len();
    match name {
        "push" | "unshift" => {
            if len + args.len() > MAX_ARRAY_LENGTH {
                return Err(interpreter.range_error("Invalid array length"));
            }
            let mut items = items.borrow_mut();
            if name == "push" {
                items.extend(args);
            } else {
                items.splice(0..0, args);
            }
            Ok(index_value(items.len()))
        }
        "pop" => Ok(items.borrow_mut().pop().unwrap_or(Value::Undefined)),
        "shift" => {
            let mut items = items.borrow_mut();
            Ok(if items.is_empty() {
                Value::Undefined
            } else {
                items.remove(0)
            })
        }
        "slice" => {
            let start = relative_index(&arg(&args, 0), len, 0);
            let end = relative_index(&arg(&args, 1), len, len);
            let slice = items.borrow().get(start..end.max(start)).map(<[Value]>::to_vec);
            interpreter.new_array(slice.unwrap_or_default())
        }
        "splice" => {
            let start = relative_index(&arg(&args, 0), len, 0);
            let count = match args.get(1) {
                None => len - start,
                Some(value) => {
                    let n = value.to_number();
                    let n = if n.is_nan() || n < 0.0 { 0 } else { n as usize };
                    n.min(len - start)
                }
            };
            let inserted: Vec<Value> = args.into_iter().skip(2).collect();
            let removed: Vec<Value> = items
                .borrow_mut()
                .splice(start..start + count, inserted)
                .collect();
            interpreter.new_array(removed)
        }
        "concat" => {
            let mut result = items.borrow().clone();
            for value in args {
                match value {
                    Value::Array(other) => result.extend(other.borrow().iter().cloned()),
                    other => result.push(other),
                }
            }
            interpreter.new_array(result)
        }
        "join" | "toString" => {
            let separator = match arg(&args, 0) {
                Value::Undefined => ",".to_string(),
                other if name == "join" => other.to_display(),
                _ => ",".to_string(),
            };
            let joined = items
                .borrow()
                .iter()
                .map(|item| if item.is_nullish() { String::new() } else { item.to_display() })
                .collect::<Vec<_>>()
                .join(&separator);
            interpreter.new_string(joined)
        }
        "reverse" => {
            items.borrow_mut().reverse();
            Ok(this.clone())
        }
        "indexOf" | "lastIndexOf" | "includes" => {
            let needle = arg(&args, 0);
            let items = items.borrow();
            let found = match name {
                "indexOf" => items.iter().position(|item| item.strict_equals(&needle)),
                "lastIndexOf" => items.iter().rposition(|item| item.strict_equals(&needle)),
                _ => return Ok(Value::Bool(items.iter().any(|item| item.same_value_zero(&needle)))),
            };
            Ok(found.map_or(Value::Number(-1.0), index_value))
        }
        "fill" => {
            let value = arg(&args, 0);
            let start = relative_index(&arg(&args, 1), len, 0);
            let end = relative_index(&arg(&args, 2), len, len);
            for item in items.borrow_mut().iter_mut().take(end).skip(start) {
                *item = value.clone();
            }
            Ok(this.clone())
        }
        "find" | "findIndex" | "filter" | "map" | "forEach" | "some" | "every" => {
            let function = callback(interpreter, &args)?;
            let mut collected = Vec::new();
            let mut index = 0;
            loop {
                let Some(item) = items.borrow().get(index).cloned() else {
                    break;
                };
                let result = interpreter.call(
                    &function,
                    Value::Undefined,
                    vec![item.clone(), index_value(index), this.clone()],
                )?;
                match name {
                    "find" if result.truthy() => return Ok(item),
                    "findIndex" if result.truthy() => return Ok(index_value(index)),
                    "some" if result.truthy() => return Ok(Value::Bool(true)),
                    "every" if !result.truthy() => return Ok(Value::Bool(false)),
                    "filter" if result.truthy() => collected.push(item),
                    "map" => collected.push(result),
                    _ => {}
                }
                index += 1;
            }
            match name {
                "find" | "forEach" => Ok(Value::Undefined),
                "findIndex" => Ok(Value::Number(-1.0)),
                "some" => Ok(Value::Bool(false)),
                "every" => Ok(Value::Bool(true)),
                _ => interpreter.new_array(collected),
            }
        }
        "reduce" => {
            let function = callback(interpreter, &args)?;
            let mut index = 0;
            let mut accumulator = if args.len() > 1 {
                arg(&args, 1)
            } else {
                let first = items.borrow().first().cloned();
                let Some(first) = first else {
                    return Err(interpreter.type_error("Reduce of empty array with no initial value"));
                };
                index = 1;
                first
            };
            loop {
                let Some(item) = items.borrow().get(index).cloned() else {
                    break;
                };
                accumulator = interpreter.call(
                    &function,
                    Value::Undefined,
                    vec![accumulator, item, index_value(index), this.clone()],
                )?;
                index += 1;
            }
            Ok(accumulator)
        }
        "sort" => {
            let comparator = arg(&args, 0);
            let comparator = comparator.is_callable().then_some(comparator);
            let snapshot = items.borrow().clone();
            let sorted = merge_sort(interpreter, snapshot, comparator.as_ref())?;
            *items.borrow_mut() = sorted;
            Ok(this.clone())
        }
        _ => Ok(Value::Undefined),
    }
}

/// Stable sort with a comparator that may throw.
fn merge_sort(
    interpreter: &mut Interpreter,
    mut items: Vec<Value>,
    comparator: Option<&Value>,
) -> Eval<Vec<Value>> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = merge_sort(interpreter, items, comparator)?;
    let right = merge_sort(interpreter, right, comparator)?;
    let mut merged = Vec::with_capacity(left.len() + right.len());
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        if sort_order(interpreter, &right[j], &left[i], comparator)? == Ordering::Less {
            merged.push(right[j].clone());
            j += 1;
        } else {
            merged.push(left[i].clone());
            i += 1;
        }
    }
    merged.extend_from_slice(&left[i..]);
    merged.extend_from_slice(&right[j..]);
    Ok(merged)
}

fn sort_order(
    interpreter: &mut Interpreter,
    a: &Value,
    b: &Value,
    comparator: Option<&Value>,
) -> Eval<Ordering> {
    match (a, b) {
        (Value::Undefined, Value::Undefined) => return Ok(Ordering::Equal),
        (Value::Undefined, _) => return Ok(Ordering::Greater),
        (_, Value::Undefined) => return Ok(Ordering::Less),
        _ => {}
    }
    let Some(comparator) = comparator else {
        return Ok(a.to_display().cmp(&b.to_display()));
    };
    let result = interpreter
        .call(comparator, Value::Undefined, vec![a.clone(), b.clone()])?
        .to_number();
    Ok(result.partial_cmp(&0.0).unwrap_or(Ordering::Equal))
}

// ============================================================================
// String methods
// ============================================================================

/// Character offset of the byte offset `byte` in `s`.
fn char_position(s: &str, byte: usize) -> Value {
    Value::Number(s[..byte].chars().count() as f64)
}

#[allow(clippy::too_many_lines)]
fn string_call(interpreter: &mut Interpreter, s: &str, name: &str, args: &[Value]) -> Eval {
    let text = |index: usize| arg(args, index).to_display();
    match name {
        "toUpperCase" => Ok(Value::string(s.to_uppercase())),
        "toLowerCase" => Ok(Value::string(s.to_lowercase())),
        "trim" => Ok(Value::string(s.trim())),
        "trimStart" => Ok(Value::string(s.trim_start())),
        "trimEnd" => Ok(Value::string(s.trim_end())),
        "includes" => Ok(Value::Bool(s.contains(text(0).as_str()))),
        "startsWith" => Ok(Value::Bool(s.starts_with(text(0).as_str()))),
        "endsWith" => Ok(Value::Bool(s.ends_with(text(0).as_str()))),
        "indexOf" => Ok(s
            .find(text(0).as_str())
            .map_or(Value::Number(-1.0), |byte| char_position(s, byte))),
        "lastIndexOf" => Ok(s
            .rfind(text(0).as_str())
            .map_or(Value::Number(-1.0), |byte| char_position(s, byte))),
        "slice" | "substring" => {
            let chars: Vec<char> = s.chars().collect();
            let len = chars.len();
            let (start, end) = if name == "slice" {
                (
                    relative_index(&arg(args, 0), len, 0),
                    relative_index(&arg(args, 1), len, len),
                )
            } else {
                let clamp = |value: Value, default: usize| {
                    if matches!(value, Value::Undefined) {
                        return default;
                    }
                    let n = value.to_number();
                    if n.is_nan() || n < 0.0 {
                        0
                    } else {
                        n.min(len as f64) as usize
                    }
                };
                let (a, b) = (clamp(arg(args, 0), 0), clamp(arg(args, 1), len));
                (a.min(b), a.max(b))
            };
            Ok(Value::string(
                chars.get(start..end.max(start)).map_or_else(String::new, |c| c.iter().collect()),
            ))
        }
        "charAt" | "charCodeAt" => {
            let n = arg(args, 0).to_number();
            let found = if n.is_nan() {
                s.chars().next()
            } else if n < 0.0 {
                None
            } else {
                s.chars().nth(n as usize)
            };
            Ok(match (name, found) {
                ("charAt", Some(c)) => Value::string(c.to_string()),
                ("charAt", None) => Value::string(""),
                (_, Some(c)) => Value::Number(f64::from(u32::from(c))),
                (_, None) => Value::Number(f64::NAN),
            })
        }
        "split" => {
            let parts: Vec<Value> = match arg(args, 0) {
                Value::Undefined => vec![Value::string(s)],
                separator => {
                    let separator = separator.to_display();
                    if separator.is_empty() {
                        s.chars().map(|c| Value::string(c.to_string())).collect()
                    } else {
                        s.split(separator.as_str()).map(Value::string).collect()
                    }
                }
            };
            let parts = match arg(args, 1) {
                Value::Undefined => parts,
                limit => {
                    let limit = limit.to_number().max(0.0) as usize;
                    parts.into_iter().take(limit).collect()
                }
            };
            interpreter.new_array(parts)
        }
        "repeat" => {
            let count = arg(args, 0).to_number();
            let count = if count.is_nan() { 0.0 } else { count.trunc() };
            if count < 0.0 || count.is_infinite() {
                return Err(interpreter.range_error(format!("Invalid count value: {}", format_number(count))));
            }
            let count = count as usize;
            if s.len().saturating_mul(count) > MAX_STRING_LENGTH {
                return Err(interpreter.range_error("Invalid string length"));
            }
            Ok(Value::string(s.repeat(count)))
        }
        "replace" | "replaceAll" => {
            let pattern = text(0);
            let replacement = arg(args, 1);
            let mut out = String::new();
            let mut rest = s;
            let mut position = 0;
            while let Some(byte) = rest.find(pattern.as_str()) {
                out.push_str(&rest[..byte]);
                let replaced = if replacement.is_callable() {
                    interpreter
                        .call(
                            &replacement,
                            Value::Undefined,
                            vec![Value::string(pattern.as_str()), index_value(position + byte)],
                        )?
                        .to_display()
                } else {
                    replacement.to_display()
                };
                out.push_str(&replaced);
                let advance = byte + pattern.len();
                position += advance;
                rest = &rest[advance..];
                if name == "replace" || pattern.is_empty() {
                    break;
                }
            }
            out.push_str(rest);
            interpreter.new_string(out)
        }
        "padStart" | "padEnd" => {
            let target = arg(args, 0).to_number();
            let fill = match arg(args, 1) {
                Value::Undefined => " ".to_string(),
                other => other.to_display(),
            };
            let current = s.chars().count();
            let target = if target.is_nan() || target <= current as f64 {
                return Ok(Value::string(s));
            } else if target > MAX_STRING_LENGTH as f64 {
                return Err(interpreter.range_error("Invalid string length"));
            } else {
                target as usize
            };
            if fill.is_empty() {
                return Ok(Value::string(s));
            }
            let padding: String = fill.chars().cycle().take(target - current).collect();
            Ok(Value::string(if name == "padStart" {
                format!("{padding}{s}")
            } else {
                format!("{s}{padding}")
            }))
        }
        "concat" => {
            let mut out = s.to_string();
            for value in args {
                out.push_str(&value.to_display());
            }
            interpreter.new_string(out)
        }
        "toString" => Ok(Value::string(s)),
        _ => Ok(Value::Undefined),
    }
}

// ============================================================================
// Number methods
// ============================================================================

fn number_call(interpreter: &mut Interpreter, n: f64, name: &str, args: &[Value]) -> Eval {
    match name {
        "toFixed" => {
            let digits = match arg(args, 0) {
                Value::Undefined => 0.0,
                other => other.to_number().trunc(),
            };
            if !(0.0..=100.0).contains(&digits) {
                return Err(interpreter.range_error("toFixed() digits argument must be between 0 and 100"));
            }
            if !n.is_finite() || n.abs() >= 1e21 {
                return Ok(Value::string(format_number(n)));
            }
            let digits = digits as usize;
            Ok(Value::string(to_fixed(n, digits)))
        }
        "toString" => {
            let radix = match arg(args, 0) {
                Value::Undefined => 10.0,
                other => other.to_number().trunc(),
            };
            if !(2.0..=36.0).contains(&radix) {
                return Err(interpreter.range_error("toString() radix must be between 2 and 36"));
            }
            let radix = radix as u32;
            if radix == 10 || !n.is_finite() {
                return Ok(Value::string(format_number(n)));
            }
            Ok(Value::string(integer_to_radix(n.trunc(), radix)))
        }
        _ => Ok(Value::Undefined),
    }
}

/// `toFixed` rounding: exact halves round away from zero.
fn to_fixed(n: f64, digits: usize) -> String {
    let sign = if n < 0.0 { "-" } else { "" };
    let magnitude = n.abs();
    let scale = 10f64.powi(digits as i32);
    let scaled = magnitude * scale;
    let rounded = if (scaled.fract() - 0.5).abs() < f64::EPSILON && scaled < 9.0e15 {
        (scaled.floor() + 1.0) / scale
    } else {
        magnitude
    };
    let body = format!("{rounded:.digits$}");
    if body.bytes().all(|b| b == b'0' || b == b'.') {
        body
    } else {
        format!("{sign}{body}")
    }
}

fn integer_to_radix(n: f64, radix: u32) -> String {
    let negative = n < 0.0;
    let mut value = n.abs();
    let mut digits = Vec::new();
    let radix_f = f64::from(radix);
    while value >= 1.0 {
        let digit = (value % radix_f) as u32;
        digits.push(std::char::from_digit(digit, radix).unwrap_or('0'));
        value = (value / radix_f).floor();
    }
    if digits.is_empty() {
        digits.push('0');
    }
    if negative {
        digits.push('-');
    }
    digits.iter().rev().collect()
}
