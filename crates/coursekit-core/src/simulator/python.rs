//! Python strategy: line-by-line pattern matching.
//!
//! There is no parser here. Each logical line is classified as a `print`
//! call, an assignment, a function definition or a bare expression, and
//! expressions are evaluated by a handful of literal rules. Unsupported
//! syntax is tolerated: it falls through to the literal rule and is echoed.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use super::OutputEvent;

/// Message for a submission that produced no output.
pub const SUCCESS_MESSAGE: &str = "Code executed successfully";

/// Info message for a `def` line.
pub const FUNCTION_DEFINED_MESSAGE: &str = "Function defined";

static PRINT_CALL: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^print\((.*)\)").ok());
static IDENTIFIER: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok());
static NUMBER: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^\d+\.?\d*$").ok());
static PLACEHOLDER: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\{(\w+)\}").ok());

fn matches(pattern: &Lazy<Option<Regex>>, text: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(text))
}

/// A value bound in the variable table.
#[derive(Debug, Clone, PartialEq)]
pub enum PyValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for PyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(n) if n.is_finite() && n.fract() == 0.0 => write!(f, "{n:.1}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
        }
    }
}

/// Simulates `source` and returns its output events.
///
/// The variable table starts empty for every call.
pub fn run(source: &str) -> Vec<OutputEvent> {
    let mut simulator = PatternSimulator::default();
    for line in logical_lines(source) {
        simulator.execute_line(line);
    }
    if simulator.events.is_empty() {
        simulator.events.push(OutputEvent::success(SUCCESS_MESSAGE));
    }
    simulator.events
}

/// Rejects code that is clearly not Python.
pub fn validate(source: &str) -> Result<(), String> {
    if split_outside_quotes(source, '{').len() > 1 || split_outside_quotes(source, '}').len() > 1 {
        return Err("Python does not use curly braces".to_string());
    }
    Ok(())
}

/// Trimmed lines worth executing: no blanks, comments or `def` bodies.
fn logical_lines(source: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut def_indent: Option<usize> = None;
    for raw in source.lines() {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let indent = raw.len() - raw.trim_start().len();
        if let Some(level) = def_indent {
            if indent > level {
                continue;
            }
            def_indent = None;
        }
        if trimmed.starts_with("def ") {
            def_indent = Some(indent);
        }
        lines.push(trimmed);
    }
    lines
}

#[derive(Default)]
struct PatternSimulator {
    variables: HashMap<String, PyValue>,
    events: Vec<OutputEvent>,
}

impl PatternSimulator {
    fn execute_line(&mut self, line: &str) {
        if let Some(arguments) = PRINT_CALL
            .as_ref()
            .and_then(|re| re.captures(line))
            .and_then(|caps| caps.get(1))
        {
            let text = split_outside_quotes(arguments.as_str(), ',')
                .into_iter()
                .map(str::trim)
                .filter(|argument| !argument.is_empty())
                .map(|argument| self.evaluate(argument).to_string())
                .collect::<Vec<_>>()
                .join(" ");
            self.events.push(OutputEvent::log(text));
            return;
        }

        // Any other single-`=` line is silent; only `name = expr` binds.
        if is_assignment_line(line) {
            if let Some((name, expression)) = line.split_once('=') {
                let name = name.trim();
                if matches(&IDENTIFIER, name) {
                    let value = self.evaluate(expression);
                    self.variables.insert(name.to_string(), value);
                }
            }
            return;
        }

        if line.starts_with("def ") {
            self.events.push(OutputEvent::info(FUNCTION_DEFINED_MESSAGE));
            return;
        }

        let value = self.evaluate(line);
        self.events.push(OutputEvent::log(value.to_string()));
    }

    fn evaluate(&self, expression: &str) -> PyValue {
        let expression = expression.trim();

        if let Some(inner) = quoted(expression) {
            return PyValue::Str(inner.to_string());
        }

        if let Some(inner) = expression.strip_prefix('f').and_then(quoted) {
            return PyValue::Str(self.interpolate(inner));
        }

        if matches(&NUMBER, expression) {
            if !expression.contains('.') {
                if let Ok(n) = expression.parse::<i64>() {
                    return PyValue::Int(n);
                }
            }
            if let Ok(n) = expression.parse::<f64>() {
                return PyValue::Float(n);
            }
        }

        match expression {
            "True" => return PyValue::Bool(true),
            "False" => return PyValue::Bool(false),
            _ => {}
        }

        if let Some(value) = self.variables.get(expression) {
            return value.clone();
        }

        let parts = split_outside_quotes(expression, '+');
        if parts.len() > 1 {
            let joined: String = parts
                .into_iter()
                .map(|part| self.evaluate(part).to_string())
                .collect();
            return PyValue::Str(joined);
        }

        PyValue::Str(expression.to_string())
    }

    /// Substitutes `{name}` from the variable table; unknown names stay verbatim.
    fn interpolate(&self, template: &str) -> String {
        let Some(re) = PLACEHOLDER.as_ref() else {
            return template.to_string();
        };
        re.replace_all(template, |caps: &regex::Captures<'_>| {
            caps.get(1)
                .and_then(|name| self.variables.get(name.as_str()))
                .map_or_else(|| caps[0].to_string(), ToString::to_string)
        })
        .into_owned()
    }
}

/// A line with an `=` outside quotes that is not `==`.
///
/// `def` headers with default arguments are not assignments.
fn is_assignment_line(line: &str) -> bool {
    !line.starts_with("def ")
        && !line.contains("==")
        && split_outside_quotes(line, '=').len() > 1
}

/// Contents of a single complete string token such as `"hi"` or `'hi'`.
fn quoted(expression: &str) -> Option<&str> {
    let quote = expression.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let inner = expression
        .strip_prefix(quote)?
        .strip_suffix(quote)?;
    if expression.len() < 2 || inner.contains(quote) {
        return None;
    }
    Some(inner)
}

/// Splits on `separator` where it appears outside quotes and brackets.
fn split_outside_quotes(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    let mut start = 0;
    for (index, c) in text.char_indices() {
        match (quote, c) {
            (Some(open), c) if c == open => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, c) if c == separator && depth == 0 => {
                parts.push(&text[start..index]);
                start = index + c.len_utf8();
            }
            (None, '(' | '[') => depth += 1,
            (None, ')' | ']') => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}
