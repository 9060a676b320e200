//! JavaScript strategy: a sandboxed micro-interpreter.
//!
//! Source is tokenized, parsed into a syntax tree and evaluated by a
//! tree-walking interpreter. Nothing reaches the host: the only side effect
//! a program has is appending [`OutputEvent`]s through `console`.

mod ast;
mod builtins;
mod interpreter;
mod lexer;
mod parser;
mod value;

use std::fmt;

use interpreter::{Abrupt, Interpreter};
use value::Value;

use super::{OutputEvent, SimulatorLimits};

/// Stack reserved for the evaluator thread.
const EVALUATOR_STACK_SIZE: usize = 256 * 1024 * 1024;

/// Message for a program that ran cleanly without printing anything.
pub const NO_OUTPUT_MESSAGE: &str = "Code executed successfully (no output)";

/// A failure raised by user code. It never leaves the simulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptError {
    /// Error class, such as `TypeError`.
    pub name: String,
    /// Human-readable message.
    pub message: String,
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JavaScript Error: {}", self.message)
    }
}

impl ScriptError {
    fn from_thrown(value: &Value) -> Self {
        if let Value::Object(entries) = value {
            let entries = entries.borrow();
            if let (Some(Value::Str(name)), Some(message)) =
                (entries.get("name"), entries.get("message"))
            {
                return Self {
                    name: name.to_string(),
                    message: message.to_display(),
                };
            }
        }
        Self {
            name: "Error".to_string(),
            message: value.to_display(),
        }
    }
}

/// Checks that `source` parses, without running it.
pub fn check_syntax(source: &str) -> Result<(), ScriptError> {
    parser::parse_program(source).map(|_| ()).map_err(|e| ScriptError {
        name: "SyntaxError".to_string(),
        message: e.to_string(),
    })
}

/// Runs `source` and returns everything it printed.
///
/// Evaluation happens on a dedicated thread with a large stack so deeply
/// recursive programs hit the call-depth limit before the host stack.
pub fn run(source: &str, limits: SimulatorLimits) -> Vec<OutputEvent> {
    std::thread::scope(|scope| {
        let spawned = std::thread::Builder::new()
            .name("js-evaluator".to_string())
            .stack_size(EVALUATOR_STACK_SIZE)
            .spawn_scoped(scope, || evaluate(source, limits));
        match spawned {
            Ok(handle) => handle.join().unwrap_or_else(|_| {
                tracing::error!("JavaScript evaluator thread panicked");
                vec![OutputEvent::error(
                    "JavaScript Error: the interpreter stopped unexpectedly",
                )]
            }),
            Err(e) => {
                tracing::warn!(error = %e, "Could not spawn evaluator thread, running inline");
                evaluate(source, limits)
            }
        }
    })
}

fn evaluate(source: &str, limits: SimulatorLimits) -> Vec<OutputEvent> {
    let program = match parser::parse_program(source) {
        Ok(program) => program,
        Err(e) => {
            let error = ScriptError {
                name: "SyntaxError".to_string(),
                message: e.to_string(),
            };
            return vec![OutputEvent::error(error.to_string())];
        }
    };

    let mut interpreter = Interpreter::new(limits);
    let result = interpreter.run_program(&program);
    let mut events = std::mem::take(&mut interpreter.events);
    match result {
        Ok(completion) => {
            if events.is_empty() {
                if matches!(completion, Value::Undefined) {
                    events.push(OutputEvent::success(NO_OUTPUT_MESSAGE));
                } else {
                    events.push(OutputEvent::log(completion.to_display()));
                }
            }
        }
        Err(Abrupt::Throw(thrown)) => {
            let error = ScriptError::from_thrown(&thrown);
            tracing::debug!(name = %error.name, message = %error.message, "Script threw");
            events.push(OutputEvent::error(error.to_string()));
        }
        Err(Abrupt::Abort(reason)) => {
            let error = ScriptError {
                name: "RangeError".to_string(),
                message: reason,
            };
            events.push(OutputEvent::error(error.to_string()));
        }
    }
    events
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::simulator::OutputKind;

    fn limits() -> SimulatorLimits {
        SimulatorLimits {
            step_budget: 100_000,
            max_call_depth: 64,
        }
    }

    fn output(source: &str) -> Vec<String> {
        run(source, limits())
            .into_iter()
            .map(|event| event.content)
            .collect()
    }

    fn last(source: &str) -> OutputEvent {
        let mut events = run(source, limits());
        events.pop().unwrap()
    }

    // ------------------------------------------------------------------------
    // Output capture
    // ------------------------------------------------------------------------

    #[test]
    fn test_console_log_arithmetic() {
        let events = run("console.log(1+1)", limits());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, OutputKind::Log);
        assert_eq!(events[0].content, "2");
    }

    #[test]
    fn test_console_levels_map_to_kinds() {
        let events = run(
            "console.info('i'); console.warn('w'); console.error('e'); console.log('a', 1, true)",
            limits(),
        );
        let kinds: Vec<OutputKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![OutputKind::Info, OutputKind::Warning, OutputKind::Error, OutputKind::Log]
        );
        assert_eq!(events[3].content, "a 1 true");
    }

    #[test]
    fn test_completion_value_logged_without_output() {
        assert_eq!(output("const x = 20; x * 2"), vec!["40"]);
        assert_eq!(output("return [1, 2, 3].length"), vec!["3"]);
    }

    #[test]
    fn test_no_output_success_event() {
        let event = last("let x = 1;");
        assert_eq!(event.kind, OutputKind::Success);
        assert_eq!(event.content, NO_OUTPUT_MESSAGE);
    }

    #[test]
    fn test_output_kept_before_runtime_error() {
        let events = run("console.log('before'); missing(); console.log('after')", limits());
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].content, "before");
        assert_eq!(events[1].kind, OutputKind::Error);
        assert_eq!(events[1].content, "JavaScript Error: missing is not defined");
    }

    // ------------------------------------------------------------------------
    // Language features
    // ------------------------------------------------------------------------

    #[test]
    fn test_number_formatting() {
        assert_eq!(
            output("console.log(7 / 2, 10 / 5, 0.1 + 0.2, 1 / 0, 0 / 0)"),
            vec!["3.5 2 0.30000000000000004 Infinity NaN"]
        );
    }

    #[test]
    fn test_closures_and_arrows() {
        let source = r"
            function counter() {
                let count = 0;
                return () => ++count;
            }
            const next = counter();
            next();
            next();
            console.log(next());
        ";
        assert_eq!(output(source), vec!["3"]);
    }

    #[test]
    fn test_let_in_for_loop_is_per_iteration() {
        let source = r"
            const fns = [];
            for (let i = 0; i < 3; i++) { fns.push(() => i); }
            console.log(fns.map(f => f()).join(','));
        ";
        assert_eq!(output(source), vec!["0,1,2"]);
    }

    #[test]
    fn test_var_is_function_scoped_and_hoisted() {
        let source = r"
            console.log(typeof later);
            if (true) { var later = 'set'; }
            console.log(later);
            console.log(square(4));
            function square(n) { return n * n; }
        ";
        assert_eq!(output(source), vec!["undefined", "set", "16"]);
    }

    #[test]
    fn test_const_reassignment_is_type_error() {
        assert_eq!(
            last("const x = 1; x = 2;").content,
            "JavaScript Error: Assignment to constant variable."
        );
    }

    #[test]
    fn test_control_flow() {
        let source = r"
            let total = 0;
            for (const n of [1, 2, 3, 4, 5, 6]) {
                if (n === 5) break;
                if (n % 2 === 0) continue;
                total += n;
            }
            let k = 0;
            do { k++; } while (k < 3);
            let w = 10;
            while (w > 1) { w = Math.floor(w / 2); }
            console.log(total, k, w);
        ";
        assert_eq!(output(source), vec!["4 3 1"]);
    }

    #[test]
    fn test_switch_fallthrough() {
        let source = r"
            function describe(day) {
                switch (day) {
                    case 'sat':
                    case 'sun':
                        return 'weekend';
                    case 'mon':
                        return 'start';
                    default:
                        return 'weekday';
                }
            }
            console.log(describe('sun'), describe('mon'), describe('wed'));
        ";
        assert_eq!(output(source), vec!["weekend start weekday"]);
    }

    #[test]
    fn test_try_catch_finally() {
        let source = r"
            try {
                throw new Error('Invalid input');
            } catch (error) {
                console.log('Caught:', error.message);
            } finally {
                console.log('done');
            }
            try { null.x; } catch (e) { console.log(e instanceof TypeError); }
        ";
        assert_eq!(output(source), vec!["Caught: Invalid input", "done", "true"]);
    }

    #[test]
    fn test_uncaught_custom_error_message() {
        assert_eq!(
            last("throw new RangeError('too big')").content,
            "JavaScript Error: too big"
        );
        assert_eq!(last("throw 'plain'").content, "JavaScript Error: plain");
    }

    #[test]
    fn test_destructuring_swap() {
        let source = r"
            const arr = [3, 1, 2];
            [arr[0], arr[1]] = [arr[1], arr[0]];
            const { a, b } = { a: 'x', b: 'y' };
            console.log(arr.join(' '), a + b);
        ";
        assert_eq!(output(source), vec!["1 3 2 xy"]);
    }

    #[test]
    fn test_template_literals() {
        let source = "const name = 'Ada'; const n = 3; console.log(`Hi ${name}, ${n * 2} items`)";
        assert_eq!(output(source), vec!["Hi Ada, 6 items"]);
    }

    #[test]
    fn test_array_methods() {
        let source = r"
            const nums = [5, 3, 8, 1];
            console.log(nums.map(n => n * 2).join(','));
            console.log(nums.filter(n => n > 2).length);
            console.log(nums.reduce((a, b) => a + b, 0));
            console.log(nums.find(n => n > 4), nums.some(n => n > 7), nums.every(n => n > 0));
            console.log(nums.includes(8), nums.indexOf(3), nums.slice(1, 3).join('|'));
            console.log([...nums].sort((a, b) => a - b).join(','), nums.join(','));
            nums.push(9);
            console.log(nums.pop(), nums.shift(), nums.length);
        ";
        assert_eq!(
            output(source),
            vec!["10,6,16,2", "3", "17", "5 true true", "true 1 3|8", "1,3,5,8 5,3,8,1", "9 5 3"]
        );
    }

    #[test]
    fn test_string_methods() {
        let source = r"
            const s = '  Hello World  ';
            const t = s.trim();
            console.log(t.toUpperCase(), t.toLowerCase(), t.length);
            console.log(t.includes('World'), t.indexOf('o'), t.charAt(1));
            console.log(t.split(' ').join('-'), t.slice(-5), 'ab'.repeat(3));
            console.log(t.startsWith('Hell'), t.endsWith('x'));
        ";
        assert_eq!(
            output(source),
            vec![
                "HELLO WORLD hello world 11",
                "true 4 e",
                "Hello-World World ababab",
                "true false"
            ]
        );
    }

    #[test]
    fn test_number_methods_and_globals() {
        let source = r"
            console.log((3.14159).toFixed(2), (255).toString(16), (42).toString());
            console.log(parseInt('42px'), parseFloat('3.5kg'), Number('7'), String(12) + 1);
            console.log(Boolean(''), isNaN('abc'), Math.max(1, 9, 4), Math.round(2.5));
        ";
        assert_eq!(
            output(source),
            vec!["3.14 ff 42", "42 3.5 7 121", "false true 9 3"]
        );
    }

    #[test]
    fn test_objects_and_json() {
        let source = r"
            const user = { name: 'Ada', age: 36, skills: ['js', 'rust'] };
            user.age += 1;
            console.log(Object.keys(user).join(','), user['age']);
            console.log(JSON.stringify(user));
            console.log(String(user), [1, [2, 3]].toString());
        ";
        assert_eq!(
            output(source),
            vec![
                "name,age,skills 37",
                r#"{"name":"Ada","age":37,"skills":["js","rust"]}"#,
                "[object Object] 1,2,3"
            ]
        );
    }

    #[test]
    fn test_stringify_circular_throws_type_error() {
        let source = r"
            const node = { name: 'loop' };
            node.self = node;
            try { JSON.stringify(node); } catch (e) { console.log(e.name + ': ' + e.message); }
            const leaf = [1];
            console.log(JSON.stringify([leaf, leaf]));
        ";
        assert_eq!(
            output(source),
            vec!["TypeError: Converting circular structure to JSON", "[[1],[1]]"]
        );
    }

    #[test]
    fn test_large_numbers_print_like_javascript() {
        assert_eq!(
            output("console.log(123456789012345680000, 1e21, 0.000001, 1e-7)"),
            vec!["123456789012345680000 1e+21 0.000001 1e-7"]
        );
    }

    #[test]
    fn test_equality_semantics() {
        assert_eq!(
            output("console.log(1 == '1', 1 === '1', null == undefined, NaN === NaN, '2' > '10', 2 > 10)"),
            vec!["true false true false true false"]
        );
    }

    #[test]
    fn test_typeof() {
        assert_eq!(
            output("console.log(typeof 1, typeof 'a', typeof {}, typeof [], typeof null, typeof (() => 1), typeof nope)"),
            vec!["number string object object object function undefined"]
        );
    }

    // ------------------------------------------------------------------------
    // Errors and limits
    // ------------------------------------------------------------------------

    #[test]
    fn test_syntax_error_reported_as_event() {
        let events = run("let = ;", limits());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, OutputKind::Error);
        assert!(events[0].content.starts_with("JavaScript Error: "));
    }

    #[test]
    fn test_not_a_function() {
        assert_eq!(
            last("const greet = 5; greet()").content,
            "JavaScript Error: greet is not a function"
        );
    }

    #[test]
    fn test_reading_property_of_undefined() {
        assert_eq!(
            last("let user; user.name").content,
            "JavaScript Error: Cannot read properties of undefined (reading 'name')"
        );
    }

    #[test]
    fn test_infinite_loop_stops_at_budget() {
        let events = run(
            "let i = 0; while (true) { i++; }",
            SimulatorLimits {
                step_budget: 1_000,
                max_call_depth: 64,
            },
        );
        let error = events.last().unwrap();
        assert_eq!(error.kind, OutputKind::Error);
        assert!(error.content.contains("1000 steps"));
    }

    #[test]
    fn test_budget_cannot_be_caught() {
        let events = run(
            "try { while (true) {} } catch (e) { console.log('caught'); }",
            SimulatorLimits {
                step_budget: 500,
                max_call_depth: 64,
            },
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, OutputKind::Error);
    }

    #[test]
    fn test_runaway_recursion_is_range_error() {
        assert_eq!(
            last("function f(n) { return f(n + 1); } f(0)").content,
            "JavaScript Error: Maximum call stack size exceeded"
        );
    }

    #[test]
    fn test_recursion_within_depth_limit() {
        let source = "function fact(n) { return n <= 1 ? 1 : n * fact(n - 1); } console.log(fact(10))";
        assert_eq!(output(source), vec!["3628800"]);
    }

    #[test]
    fn test_check_syntax() {
        assert!(check_syntax("let x = 1;").is_ok());
        let error = check_syntax("let x = ;").unwrap_err();
        assert_eq!(error.name, "SyntaxError");
        assert!(error.to_string().contains("line 1"));
    }

    #[test]
    fn test_unsupported_keyword() {
        let error = check_syntax("class Foo {}").unwrap_err();
        assert!(error.message.contains("'class' is not supported"));
    }

    #[test]
    fn test_math_random_is_in_unit_interval() {
        assert_eq!(
            output("let ok = true; for (let i = 0; i < 50; i++) { const r = Math.random(); if (r < 0 || r >= 1) ok = false; } console.log(ok)"),
            vec!["true"]
        );
    }
}
