//! Tree-walking evaluator with a step budget and a call-depth limit.

#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::ast::{
    BinaryOp, DeclKind, Expr, Function, FunctionBody, LogicalOp, PropKey, Property, Stmt, Target,
    TemplatePiece, UnaryOp,
};
use super::builtins;
use super::value::{format_number, ArrayRef, Closure, NativeKind, ObjectRef, Value};
use crate::simulator::{OutputEvent, SimulatorLimits};

/// Longest string a program may build, in bytes.
pub const MAX_STRING_LENGTH: usize = 1 << 22;

/// Longest array a program may build.
pub const MAX_ARRAY_LENGTH: usize = 1 << 20;

/// Why evaluation stopped early.
pub enum Abrupt {
    /// A JavaScript exception; `try` can catch it.
    Throw(Value),
    /// A resource limit; nothing catches it.
    Abort(String),
}

pub type Eval<T = Value> = Result<T, Abrupt>;

/// Statement completion.
enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

struct Binding {
    value: Value,
    mutable: bool,
}

/// A lexical environment.
pub struct Scope {
    vars: RefCell<HashMap<String, Binding>>,
    parent: Option<Rc<Scope>>,
    is_function: bool,
}

impl Scope {
    fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(binding) = self.vars.borrow().get(name) {
            return Some(binding.value.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.lookup(name))
    }

    fn declare(&self, name: &str, value: Value, mutable: bool) {
        self.vars
            .borrow_mut()
            .insert(name.to_string(), Binding { value, mutable });
    }

    fn has_own(&self, name: &str) -> bool {
        self.vars.borrow().contains_key(name)
    }

    /// `Ok(false)` when no scope declares `name`; `Err(())` for a constant.
    fn assign(&self, name: &str, value: Value) -> Result<bool, ()> {
        if let Some(binding) = self.vars.borrow_mut().get_mut(name) {
            if !binding.mutable {
                return Err(());
            }
            binding.value = value;
            return Ok(true);
        }
        self.parent
            .as_ref()
            .map_or(Ok(false), |parent| parent.assign(name, value))
    }
}

/// Nearest enclosing function scope, which holds `var` bindings.
fn function_scope(scope: &Rc<Scope>) -> Rc<Scope> {
    let mut current = Rc::clone(scope);
    while !current.is_function {
        match &current.parent {
            Some(parent) => current = Rc::clone(parent),
            None => break,
        }
    }
    current
}

/// Heap cells that may take part in reference cycles.
enum Cell {
    Scope(Weak<Scope>),
    Array(Weak<RefCell<Vec<Value>>>),
    Object(Weak<RefCell<IndexMap<String, Value>>>),
}

/// Resolved assignment location.
enum Place {
    Var(String),
    Prop(Value, String),
}

pub struct Interpreter {
    pub(super) events: Vec<OutputEvent>,
    limits: SimulatorLimits,
    steps: u64,
    depth: u32,
    global: Rc<Scope>,
    cells: Vec<Cell>,
    rng: u64,
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        // Closures capture their scope and scopes hold closures, so clear
        // every live cell to let the reference counts reach zero.
        for cell in self.cells.drain(..) {
            match cell {
                Cell::Scope(weak) => {
                    if let Some(scope) = weak.upgrade() {
                        scope.vars.borrow_mut().clear();
                    }
                }
                Cell::Array(weak) => {
                    if let Some(items) = weak.upgrade() {
                        items.borrow_mut().clear();
                    }
                }
                Cell::Object(weak) => {
                    if let Some(entries) = weak.upgrade() {
                        entries.borrow_mut().clear();
                    }
                }
            }
        }
    }
}

impl Interpreter {
    pub fn new(limits: SimulatorLimits) -> Self {
        let global = Rc::new(Scope {
            vars: RefCell::new(HashMap::new()),
            parent: None,
            is_function: true,
        });
        let mut interpreter = Self {
            events: Vec::new(),
            limits,
            steps: 0,
            depth: 0,
            cells: vec![Cell::Scope(Rc::downgrade(&global))],
            global,
            rng: 0x2545_F491_4F6C_DD1D,
        };
        builtins::install_globals(&mut interpreter);
        interpreter
    }

    /// Runs a program and returns its completion value.
    ///
    /// A top-level `return` ends the program with its value; otherwise the
    /// value of the last top-level expression statement is the result.
    pub fn run_program(&mut self, program: &[Stmt]) -> Eval<Value> {
        let global = Rc::clone(&self.global);
        self.hoist_vars(program, &global);
        self.hoist_functions(program, &global);
        let mut completion = Value::Undefined;
        for stmt in program {
            if let Stmt::Expr(expr) = stmt {
                self.tick()?;
                completion = self.eval(expr, &global)?;
                continue;
            }
            if let Flow::Return(value) = self.exec(stmt, &global)? {
                return Ok(value);
            }
        }
        Ok(completion)
    }

    // ========================================================================
    // Resources
    // ========================================================================

    fn tick(&mut self) -> Eval<()> {
        self.steps += 1;
        if self.steps > self.limits.step_budget {
            return Err(Abrupt::Abort(format!(
                "Execution stopped after {} steps (possible infinite loop)",
                self.limits.step_budget
            )));
        }
        Ok(())
    }

    pub(super) fn next_random(&mut self) -> f64 {
        // xorshift64*
        self.rng ^= self.rng >> 12;
        self.rng ^= self.rng << 25;
        self.rng ^= self.rng >> 27;
        let bits = self.rng.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 11;
        bits as f64 / (1u64 << 53) as f64
    }

    pub(super) fn define_global(&mut self, name: &str, value: Value) {
        self.global.declare(name, value, true);
    }

    fn child_scope(&mut self, parent: &Rc<Scope>, is_function: bool) -> Rc<Scope> {
        let scope = Rc::new(Scope {
            vars: RefCell::new(HashMap::new()),
            parent: Some(Rc::clone(parent)),
            is_function,
        });
        self.cells.push(Cell::Scope(Rc::downgrade(&scope)));
        scope
    }

    pub(super) fn new_array(&mut self, items: Vec<Value>) -> Eval<Value> {
        if items.len() > MAX_ARRAY_LENGTH {
            return Err(self.range_error("Invalid array length"));
        }
        let items: ArrayRef = Rc::new(RefCell::new(items));
        self.cells.push(Cell::Array(Rc::downgrade(&items)));
        Ok(Value::Array(items))
    }

    pub(super) fn new_object(&mut self, entries: IndexMap<String, Value>) -> Value {
        let entries: ObjectRef = Rc::new(RefCell::new(entries));
        self.cells.push(Cell::Object(Rc::downgrade(&entries)));
        Value::Object(entries)
    }

    pub(super) fn new_string(&self, s: String) -> Eval<Value> {
        if s.len() > MAX_STRING_LENGTH {
            return Err(self.range_error("Invalid string length"));
        }
        Ok(Value::string(s))
    }

    // ========================================================================
    // Errors
    // ========================================================================

    pub(super) fn throw(&self, name: &str, message: impl Into<String>) -> Abrupt {
        Abrupt::Throw(Value::error(name, message))
    }

    pub(super) fn type_error(&self, message: impl Into<String>) -> Abrupt {
        self.throw("TypeError", message)
    }

    pub(super) fn range_error(&self, message: impl Into<String>) -> Abrupt {
        self.throw("RangeError", message)
    }

    // ========================================================================
    // Hoisting
    // ========================================================================

    fn hoist_functions(&mut self, body: &[Stmt], scope: &Rc<Scope>) {
        for stmt in body {
            if let Stmt::Function(function) = stmt {
                if let Some(name) = &function.name {
                    let closure = Value::Function(Rc::new(Closure {
                        function: Rc::clone(function),
                        scope: Rc::clone(scope),
                    }));
                    scope.declare(name, closure, true);
                }
            }
        }
    }

    /// Declares every `var` in `body` (outside nested functions) as undefined.
    fn hoist_vars(&mut self, body: &[Stmt], scope: &Rc<Scope>) {
        let mut names = Vec::new();
        for stmt in body {
            collect_var_names(stmt, &mut names);
        }
        for name in names {
            if !scope.has_own(&name) {
                scope.declare(&name, Value::Undefined, true);
            }
        }
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn exec_block(&mut self, body: &[Stmt], scope: &Rc<Scope>) -> Eval<Flow> {
        self.hoist_functions(body, scope);
        for stmt in body {
            let flow = self.exec(stmt, scope)?;
            if !matches!(flow, Flow::Normal) {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    #[allow(clippy::too_many_lines)]
    fn exec(&mut self, stmt: &Stmt, scope: &Rc<Scope>) -> Eval<Flow> {
        self.tick()?;
        match stmt {
            Stmt::Expr(expr) => {
                self.eval(expr, scope)?;
                Ok(Flow::Normal)
            }
            Stmt::Declare { kind, decls } => {
                for (target, init) in decls {
                    match init {
                        Some(init) => {
                            let value = self.eval(init, scope)?;
                            self.bind(target, value, scope, Some(*kind))?;
                        }
                        None if *kind == DeclKind::Var => {}
                        None => self.bind(target, Value::Undefined, scope, Some(*kind))?,
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Function(_) | Stmt::Empty => Ok(Flow::Normal),
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
            Stmt::If {
                test,
                then,
                otherwise,
            } => {
                if self.eval(test, scope)?.truthy() {
                    self.exec(then, scope)
                } else if let Some(otherwise) = otherwise {
                    self.exec(otherwise, scope)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::Block(body) => {
                let block = self.child_scope(scope, false);
                self.exec_block(body, &block)
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => self.exec_for(init.as_deref(), test.as_ref(), update.as_ref(), body, scope),
            Stmt::ForEach {
                kind,
                target,
                iterable,
                of,
                body,
            } => {
                let source = self.eval(iterable, scope)?;
                let items = if *of {
                    self.iterate(&source)?
                } else {
                    self.enumerate_keys(&source)
                };
                for item in items {
                    self.tick()?;
                    let iteration = self.child_scope(scope, false);
                    self.bind(target, item, &iteration, *kind)?;
                    match self.exec(body, &iteration)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::While { test, body } => {
                while self.eval(test, scope)?.truthy() {
                    self.tick()?;
                    match self.exec(body, scope)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::DoWhile { body, test } => {
                loop {
                    self.tick()?;
                    match self.exec(body, scope)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    if !self.eval(test, scope)?.truthy() {
                        break;
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
            Stmt::Switch {
                discriminant,
                cases,
            } => {
                let value = self.eval(discriminant, scope)?;
                let block = self.child_scope(scope, false);
                let mut start = None;
                for (index, case) in cases.iter().enumerate() {
                    if let Some(test) = &case.test {
                        if self.eval(test, &block)?.strict_equals(&value) {
                            start = Some(index);
                            break;
                        }
                    }
                }
                let start = start.or_else(|| cases.iter().position(|case| case.test.is_none()));
                if let Some(start) = start {
                    for case in &cases[start..] {
                        match self.exec_block(&case.body, &block)? {
                            Flow::Normal => {}
                            Flow::Break => break,
                            flow => return Ok(flow),
                        }
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Throw(expr) => {
                let value = self.eval(expr, scope)?;
                Err(Abrupt::Throw(value))
            }
            Stmt::Try {
                block,
                param,
                handler,
                finalizer,
            } => {
                let inner = self.child_scope(scope, false);
                let mut outcome = self.exec_block(block, &inner);
                if let Some(handler) = handler {
                    if let Err(Abrupt::Throw(error)) = outcome {
                        let catch_scope = self.child_scope(scope, false);
                        if let Some(param) = param {
                            self.bind(param, error, &catch_scope, Some(DeclKind::Let))?;
                        }
                        outcome = self.exec_block(handler, &catch_scope);
                    }
                }
                if matches!(outcome, Err(Abrupt::Abort(_))) {
                    return outcome;
                }
                if let Some(finalizer) = finalizer {
                    let finally_scope = self.child_scope(scope, false);
                    let flow = self.exec_block(finalizer, &finally_scope)?;
                    if !matches!(flow, Flow::Normal) {
                        return Ok(flow);
                    }
                }
                outcome
            }
        }
    }

    fn exec_for(
        &mut self,
        init: Option<&Stmt>,
        test: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stmt,
        scope: &Rc<Scope>,
    ) -> Eval<Flow> {
        let loop_scope = self.child_scope(scope, false);
        let per_iteration = matches!(
            init,
            Some(Stmt::Declare {
                kind: DeclKind::Let | DeclKind::Const,
                ..
            })
        );
        if let Some(init) = init {
            self.exec(init, &loop_scope)?;
        }
        loop {
            if let Some(test) = test {
                if !self.eval(test, &loop_scope)?.truthy() {
                    break;
                }
            }
            self.tick()?;
            // `let` bindings get a fresh copy per iteration so closures
            // created in the body observe that iteration's value.
            let iteration = if per_iteration {
                let iteration = self.child_scope(&loop_scope, false);
                for (name, binding) in loop_scope.vars.borrow().iter() {
                    iteration.declare(name, binding.value.clone(), binding.mutable);
                }
                iteration
            } else {
                Rc::clone(&loop_scope)
            };
            let flow = self.exec(body, &iteration)?;
            if per_iteration {
                let copied: Vec<(String, Value)> = iteration
                    .vars
                    .borrow()
                    .iter()
                    .map(|(name, binding)| (name.clone(), binding.value.clone()))
                    .collect();
                for (name, value) in copied {
                    if let Some(binding) = loop_scope.vars.borrow_mut().get_mut(&name) {
                        binding.value = value;
                    }
                }
            }
            match flow {
                Flow::Break => break,
                Flow::Return(value) => return Ok(Flow::Return(value)),
                Flow::Normal | Flow::Continue => {}
            }
            if let Some(update) = update {
                self.eval(update, &loop_scope)?;
            }
        }
        Ok(Flow::Normal)
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    #[allow(clippy::too_many_lines)]
    fn eval(&mut self, expr: &Expr, scope: &Rc<Scope>) -> Eval {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::string(s.as_str())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Undefined => Ok(Value::Undefined),
            Expr::Template(pieces) => {
                let mut out = String::new();
                for piece in pieces {
                    match piece {
                        TemplatePiece::Text(text) => out.push_str(text),
                        TemplatePiece::Expr(expr) => {
                            out.push_str(&self.eval(expr, scope)?.to_display());
                        }
                    }
                }
                self.new_string(out)
            }
            Expr::This => Ok(scope.lookup("this").unwrap_or(Value::Undefined)),
            Expr::Ident(name) => scope
                .lookup(name)
                .ok_or_else(|| self.throw("ReferenceError", format!("{name} is not defined"))),
            Expr::Array(items) => {
                let items = self.eval_list(items, scope)?;
                self.new_array(items)
            }
            Expr::Object(properties) => self.eval_object(properties, scope),
            Expr::Function(function) => Ok(Value::Function(Rc::new(Closure {
                function: Rc::clone(function),
                scope: Rc::clone(scope),
            }))),
            Expr::Spread(inner) => self.eval(inner, scope),
            Expr::Unary(op, operand) => {
                if let (UnaryOp::TypeOf, Expr::Ident(name)) = (op, operand.as_ref()) {
                    let value = scope.lookup(name).unwrap_or(Value::Undefined);
                    return Ok(Value::string(value.type_of()));
                }
                let value = self.eval(operand, scope)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!value.truthy()),
                    UnaryOp::Neg => Value::Number(-value.to_number()),
                    UnaryOp::Plus => Value::Number(value.to_number()),
                    UnaryOp::TypeOf => Value::string(value.type_of()),
                })
            }
            Expr::Update {
                increment,
                prefix,
                target,
            } => {
                let place = self.resolve(target, scope)?;
                let old = self.read_place(&place, scope)?.to_number();
                let new = if *increment { old + 1.0 } else { old - 1.0 };
                self.write_place(place, Value::Number(new), scope)?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                self.binary(*op, &left, &right)
            }
            Expr::Logical(op, left, right) => {
                let left = self.eval(left, scope)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.truthy(),
                    LogicalOp::Or => left.truthy(),
                    LogicalOp::Nullish => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval(right, scope)
                }
            }
            Expr::Assign { op, target, value } => match op {
                None => {
                    if matches!(target.as_ref(), Target::Ident(_) | Target::Member { .. } | Target::Index { .. }) {
                        let place = self.resolve(target, scope)?;
                        let value = self.eval(value, scope)?;
                        self.write_place(place, value.clone(), scope)?;
                        Ok(value)
                    } else {
                        let value = self.eval(value, scope)?;
                        self.bind(target, value.clone(), scope, None)?;
                        Ok(value)
                    }
                }
                Some(op) => {
                    let place = self.resolve(target, scope)?;
                    let current = self.read_place(&place, scope)?;
                    let rhs = self.eval(value, scope)?;
                    let result = self.binary(*op, &current, &rhs)?;
                    self.write_place(place, result.clone(), scope)?;
                    Ok(result)
                }
            },
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => {
                if self.eval(test, scope)?.truthy() {
                    self.eval(then, scope)
                } else {
                    self.eval(otherwise, scope)
                }
            }
            Expr::Call { callee, args } => {
                let (function, this) = match callee.as_ref() {
                    Expr::Member {
                        object,
                        property,
                        optional,
                    } => {
                        let target = self.eval(object, scope)?;
                        if *optional && target.is_nullish() {
                            return Ok(Value::Undefined);
                        }
                        (self.get_property(&target, property)?, target)
                    }
                    Expr::Index { object, index } => {
                        let target = self.eval(object, scope)?;
                        let key = self.eval(index, scope)?;
                        (self.get_index(&target, &key)?, target)
                    }
                    other => (self.eval(other, scope)?, Value::Undefined),
                };
                let args = self.eval_list(args, scope)?;
                if !function.is_callable() {
                    return Err(self.type_error(format!("{} is not a function", describe(callee))));
                }
                self.call(&function, this, args)
            }
            Expr::New { callee, args } => {
                let constructor = self.eval(callee, scope)?;
                let args = self.eval_list(args, scope)?;
                self.construct(&constructor, args, callee)
            }
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let target = self.eval(object, scope)?;
                if *optional && target.is_nullish() {
                    return Ok(Value::Undefined);
                }
                self.get_property(&target, property)
            }
            Expr::Index { object, index } => {
                let target = self.eval(object, scope)?;
                let key = self.eval(index, scope)?;
                self.get_index(&target, &key)
            }
        }
    }

    /// Evaluates array items or call arguments, expanding spreads.
    fn eval_list(&mut self, items: &[Expr], scope: &Rc<Scope>) -> Eval<Vec<Value>> {
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            if let Expr::Spread(inner) = item {
                let source = self.eval(inner, scope)?;
                values.extend(self.iterate(&source)?);
                if values.len() > MAX_ARRAY_LENGTH {
                    return Err(self.range_error("Invalid array length"));
                }
            } else {
                values.push(self.eval(item, scope)?);
            }
        }
        Ok(values)
    }

    fn eval_object(&mut self, properties: &[Property], scope: &Rc<Scope>) -> Eval {
        let mut entries = IndexMap::new();
        for property in properties {
            match property {
                Property::KeyValue(key, value) => {
                    let key = match key {
                        PropKey::Static(name) => name.clone(),
                        PropKey::Computed(expr) => property_key(&self.eval(expr, scope)?),
                    };
                    let value = self.eval(value, scope)?;
                    entries.insert(key, value);
                }
                Property::Spread(expr) => match self.eval(expr, scope)? {
                    Value::Object(source) => {
                        for (key, value) in source.borrow().iter() {
                            entries.insert(key.clone(), value.clone());
                        }
                    }
                    Value::Array(source) => {
                        for (index, value) in source.borrow().iter().enumerate() {
                            entries.insert(index.to_string(), value.clone());
                        }
                    }
                    _ => {}
                },
            }
        }
        Ok(self.new_object(entries))
    }

    pub(super) fn iterate(&self, source: &Value) -> Eval<Vec<Value>> {
        match source {
            Value::Array(items) => Ok(items.borrow().clone()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::string(c.to_string())).collect()),
            other => Err(self.type_error(format!("{} is not iterable", other.to_display()))),
        }
    }

    fn enumerate_keys(&self, source: &Value) -> Vec<Value> {
        match source {
            Value::Object(entries) => entries
                .borrow()
                .keys()
                .map(|key| Value::string(key.as_str()))
                .collect(),
            Value::Array(items) => (0..items.borrow().len())
                .map(|index| Value::string(index.to_string()))
                .collect(),
            Value::Str(s) => (0..s.chars().count())
                .map(|index| Value::string(index.to_string()))
                .collect(),
            _ => Vec::new(),
        }
    }

    // ========================================================================
    // Operators
    // ========================================================================

    pub(super) fn binary(&mut self, op: BinaryOp, left: &Value, right: &Value) -> Eval {
        let numeric = |f: fn(f64, f64) -> f64| Value::Number(f(left.to_number(), right.to_number()));
        Ok(match op {
            BinaryOp::Add => {
                let (left, right) = (left.to_primitive(), right.to_primitive());
                if matches!(left, Value::Str(_)) || matches!(right, Value::Str(_)) {
                    let mut out = left.to_display();
                    out.push_str(&right.to_display());
                    return self.new_string(out);
                }
                Value::Number(left.to_number() + right.to_number())
            }
            BinaryOp::Sub => numeric(|a, b| a - b),
            BinaryOp::Mul => numeric(|a, b| a * b),
            BinaryOp::Div => numeric(|a, b| a / b),
            BinaryOp::Rem => numeric(|a, b| a % b),
            BinaryOp::Pow => numeric(f64::powf),
            BinaryOp::Eq => Value::Bool(left.loose_equals(right)),
            BinaryOp::NotEq => Value::Bool(!left.loose_equals(right)),
            BinaryOp::StrictEq => Value::Bool(left.strict_equals(right)),
            BinaryOp::StrictNotEq => Value::Bool(!left.strict_equals(right)),
            BinaryOp::Lt => Value::Bool(compare(left, right) == Some(Ordering::Less)),
            BinaryOp::LtEq => Value::Bool(matches!(
                compare(left, right),
                Some(Ordering::Less | Ordering::Equal)
            )),
            BinaryOp::Gt => Value::Bool(compare(left, right) == Some(Ordering::Greater)),
            BinaryOp::GtEq => Value::Bool(matches!(
                compare(left, right),
                Some(Ordering::Greater | Ordering::Equal)
            )),
            BinaryOp::In => {
                let key = property_key(left);
                match right {
                    Value::Object(entries) => Value::Bool(entries.borrow().contains_key(&key)),
                    Value::Array(items) => Value::Bool(
                        key == "length"
                            || array_index(&key).is_some_and(|i| i < items.borrow().len()),
                    ),
                    other => {
                        return Err(self.type_error(format!(
                            "Cannot use 'in' operator to search for '{key}' in {}",
                            other.to_display()
                        )))
                    }
                }
            }
            BinaryOp::InstanceOf => match right {
                Value::Native(native) if native.kind == NativeKind::Global => {
                    Value::Bool(builtins::is_instance(left, native.name))
                }
                Value::Function(_) => Value::Bool(false),
                _ => return Err(self.type_error("Right-hand side of 'instanceof' is not callable")),
            },
        })
    }

    // ========================================================================
    // Properties and assignment
    // ========================================================================

    pub(super) fn get_property(&mut self, target: &Value, key: &str) -> Eval {
        match target {
            Value::Undefined | Value::Null => Err(self.type_error(format!(
                "Cannot read properties of {} (reading '{key}')",
                target.to_display()
            ))),
            Value::Array(items) => {
                if key == "length" {
                    return Ok(Value::Number(items.borrow().len() as f64));
                }
                if let Some(index) = array_index(key) {
                    return Ok(items.borrow().get(index).cloned().unwrap_or(Value::Undefined));
                }
                Ok(builtins::array_method(key).map_or(Value::Undefined, |name| {
                    Value::native(NativeKind::ArrayMethod, name, target.clone())
                }))
            }
            Value::Str(s) => {
                if key == "length" {
                    return Ok(Value::Number(s.chars().count() as f64));
                }
                if let Some(index) = array_index(key) {
                    return Ok(s
                        .chars()
                        .nth(index)
                        .map_or(Value::Undefined, |c| Value::string(c.to_string())));
                }
                Ok(builtins::string_method(key).map_or(Value::Undefined, |name| {
                    Value::native(NativeKind::StringMethod, name, target.clone())
                }))
            }
            Value::Number(_) => Ok(builtins::number_method(key).map_or(Value::Undefined, |name| {
                Value::native(NativeKind::NumberMethod, name, target.clone())
            })),
            Value::Object(entries) => Ok(entries.borrow().get(key).cloned().unwrap_or(Value::Undefined)),
            Value::Function(closure) => Ok(match key {
                "name" => Value::string(closure.function.name.clone().unwrap_or_default()),
                "length" => Value::Number(closure.function.params.len() as f64),
                _ => Value::Undefined,
            }),
            Value::Native(native) => Ok(match (native.kind, key) {
                (_, "name") => Value::string(native.name),
                (NativeKind::Global, key) => builtins::static_member(native.name, key)
                    .map_or(Value::Undefined, |name| {
                        Value::native(NativeKind::Global, name, Value::Undefined)
                    }),
                _ => Value::Undefined,
            }),
            Value::Bool(_) => Ok(Value::Undefined),
        }
    }

    fn get_index(&mut self, target: &Value, key: &Value) -> Eval {
        if let (Value::Array(items), Value::Number(n)) = (target, key) {
            if n.fract() == 0.0 && *n >= 0.0 {
                let index = *n as usize;
                return Ok(items.borrow().get(index).cloned().unwrap_or(Value::Undefined));
            }
        }
        self.get_property(target, &property_key(key))
    }

    fn set_property(&mut self, target: &Value, key: &str, value: Value) -> Eval<()> {
        match target {
            Value::Undefined | Value::Null => Err(self.type_error(format!(
                "Cannot set properties of {} (setting '{key}')",
                target.to_display()
            ))),
            Value::Array(items) => {
                if key == "length" {
                    let length = value.to_number();
                    if length < 0.0 || length.fract() != 0.0 || length > MAX_ARRAY_LENGTH as f64 {
                        return Err(self.range_error("Invalid array length"));
                    }
                    items.borrow_mut().resize(length as usize, Value::Undefined);
                } else if let Some(index) = array_index(key) {
                    if index >= MAX_ARRAY_LENGTH {
                        return Err(self.range_error("Invalid array length"));
                    }
                    let mut items = items.borrow_mut();
                    if index >= items.len() {
                        items.resize(index + 1, Value::Undefined);
                    }
                    items[index] = value;
                }
                Ok(())
            }
            Value::Object(entries) => {
                entries.borrow_mut().insert(key.to_string(), value);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn resolve(&mut self, target: &Target, scope: &Rc<Scope>) -> Eval<Place> {
        match target {
            Target::Ident(name) => Ok(Place::Var(name.clone())),
            Target::Member { object, property } => {
                let object = self.eval(object, scope)?;
                Ok(Place::Prop(object, property.clone()))
            }
            Target::Index { object, index } => {
                let object = self.eval(object, scope)?;
                let key = self.eval(index, scope)?;
                Ok(Place::Prop(object, property_key(&key)))
            }
            Target::Array(_) | Target::Object(_) => {
                Err(self.throw("SyntaxError", "Invalid left-hand side in assignment"))
            }
        }
    }

    fn read_place(&mut self, place: &Place, scope: &Rc<Scope>) -> Eval {
        match place {
            Place::Var(name) => scope
                .lookup(name)
                .ok_or_else(|| self.throw("ReferenceError", format!("{name} is not defined"))),
            Place::Prop(object, key) => self.get_property(object, key),
        }
    }

    fn write_place(&mut self, place: Place, value: Value, scope: &Rc<Scope>) -> Eval<()> {
        match place {
            Place::Var(name) => match scope.assign(&name, value.clone()) {
                Ok(true) => Ok(()),
                // Sloppy mode: assigning an undeclared name creates a global.
                Ok(false) => {
                    self.global.declare(&name, value, true);
                    Ok(())
                }
                Err(()) => Err(self.type_error("Assignment to constant variable.")),
            },
            Place::Prop(object, key) => self.set_property(&object, &key, value),
        }
    }

    /// Stores `value` into `target`, declaring when `kind` is given.
    fn bind(
        &mut self,
        target: &Target,
        value: Value,
        scope: &Rc<Scope>,
        kind: Option<DeclKind>,
    ) -> Eval<()> {
        match target {
            Target::Ident(name) => match kind {
                Some(DeclKind::Var) => {
                    function_scope(scope).declare(name, value, true);
                    Ok(())
                }
                Some(DeclKind::Let) => {
                    scope.declare(name, value, true);
                    Ok(())
                }
                Some(DeclKind::Const) => {
                    scope.declare(name, value, false);
                    Ok(())
                }
                None => self.write_place(Place::Var(name.clone()), value, scope),
            },
            Target::Member { .. } | Target::Index { .. } => {
                let place = self.resolve(target, scope)?;
                self.write_place(place, value, scope)
            }
            Target::Array(items) => {
                if value.is_nullish() {
                    return Err(self.type_error(format!("{} is not iterable", value.to_display())));
                }
                let values = self.iterate(&value)?;
                for (index, item) in items.iter().enumerate() {
                    if let Some(item) = item {
                        let element = values.get(index).cloned().unwrap_or(Value::Undefined);
                        self.bind(item, element, scope, kind)?;
                    }
                }
                Ok(())
            }
            Target::Object(fields) => {
                if value.is_nullish() {
                    return Err(self.type_error(format!(
                        "Cannot destructure '{}' as it is {}.",
                        value.to_display(),
                        value.to_display()
                    )));
                }
                for (key, item) in fields {
                    let field = self.get_property(&value, key)?;
                    self.bind(item, field, scope, kind)?;
                }
                Ok(())
            }
        }
    }

    // ========================================================================
    // Calls
    // ========================================================================

    pub(super) fn call(&mut self, function: &Value, this: Value, args: Vec<Value>) -> Eval {
        match function {
            Value::Function(closure) => self.call_closure(closure, this, args),
            Value::Native(native) => {
                self.tick()?;
                let receiver = native.receiver.clone();
                builtins::call_native(self, native.kind, native.name, receiver, args)
            }
            other => Err(self.type_error(format!("{} is not a function", other.to_display()))),
        }
    }

    fn call_closure(&mut self, closure: &Rc<Closure>, this: Value, args: Vec<Value>) -> Eval {
        if self.depth >= self.limits.max_call_depth {
            return Err(self.range_error("Maximum call stack size exceeded"));
        }
        self.tick()?;
        self.depth += 1;
        let result = self.invoke(&closure.function, &closure.scope, this, args);
        self.depth -= 1;
        result
    }

    fn invoke(
        &mut self,
        function: &Rc<Function>,
        captured: &Rc<Scope>,
        this: Value,
        args: Vec<Value>,
    ) -> Eval {
        let scope = self.child_scope(captured, true);
        if !function.is_arrow {
            scope.declare("this", this, false);
        }
        let mut args = args.into_iter();
        for param in &function.params {
            let mut value = args.next().unwrap_or(Value::Undefined);
            if matches!(value, Value::Undefined) {
                if let Some(default) = &param.default {
                    value = self.eval(default, &scope)?;
                }
            }
            self.bind(&param.target, value, &scope, Some(DeclKind::Let))?;
        }
        if let Some(rest) = &function.rest {
            let rest_values = self.new_array(args.collect())?;
            scope.declare(rest, rest_values, true);
        }
        match &function.body {
            FunctionBody::Expr(expr) => self.eval(expr, &scope),
            FunctionBody::Block(body) => {
                self.hoist_vars(body, &scope);
                match self.exec_block(body, &scope)? {
                    Flow::Return(value) => Ok(value),
                    _ => Ok(Value::Undefined),
                }
            }
        }
    }

    fn construct(&mut self, constructor: &Value, args: Vec<Value>, callee: &Expr) -> Eval {
        match constructor {
            Value::Native(native) if native.kind == NativeKind::Global => {
                builtins::construct_native(self, native.name, args)
                    .unwrap_or_else(|| Err(self.type_error(format!("{} is not a constructor", describe(callee)))))
            }
            Value::Function(closure) if !closure.function.is_arrow => {
                let this = self.new_object(IndexMap::new());
                let result = self.call_closure(closure, this.clone(), args)?;
                Ok(match result {
                    Value::Object(_) | Value::Array(_) => result,
                    _ => this,
                })
            }
            _ => Err(self.type_error(format!("{} is not a constructor", describe(callee)))),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn collect_var_names(stmt: &Stmt, names: &mut Vec<String>) {
    match stmt {
        Stmt::Declare {
            kind: DeclKind::Var,
            decls,
        } => {
            for (target, _) in decls {
                collect_target_names(target, names);
            }
        }
        Stmt::If {
            then, otherwise, ..
        } => {
            collect_var_names(then, names);
            if let Some(otherwise) = otherwise {
                collect_var_names(otherwise, names);
            }
        }
        Stmt::Block(body) => body.iter().for_each(|s| collect_var_names(s, names)),
        Stmt::For { init, body, .. } => {
            if let Some(init) = init {
                collect_var_names(init, names);
            }
            collect_var_names(body, names);
        }
        Stmt::ForEach {
            kind, target, body, ..
        } => {
            if *kind == Some(DeclKind::Var) {
                collect_target_names(target, names);
            }
            collect_var_names(body, names);
        }
        Stmt::While { body, .. } | Stmt::DoWhile { body, .. } => collect_var_names(body, names),
        Stmt::Switch { cases, .. } => cases
            .iter()
            .flat_map(|case| case.body.iter())
            .for_each(|s| collect_var_names(s, names)),
        Stmt::Try {
            block,
            handler,
            finalizer,
            ..
        } => {
            block
                .iter()
                .chain(handler.iter().flatten())
                .chain(finalizer.iter().flatten())
                .for_each(|s| collect_var_names(s, names));
        }
        _ => {}
    }
}

fn collect_target_names(target: &Target, names: &mut Vec<String>) {
    match target {
        Target::Ident(name) => names.push(name.clone()),
        Target::Array(items) => items
            .iter()
            .flatten()
            .for_each(|item| collect_target_names(item, names)),
        Target::Object(fields) => fields
            .iter()
            .for_each(|(_, item)| collect_target_names(item, names)),
        Target::Member { .. } | Target::Index { .. } => {}
    }
}

/// Relational comparison; `None` when either side is NaN.
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    let (left, right) = (left.to_primitive(), right.to_primitive());
    if let (Value::Str(a), Value::Str(b)) = (&left, &right) {
        return Some(a.cmp(b));
    }
    left.to_number().partial_cmp(&right.to_number())
}

/// Canonical array index for a property key such as `"3"`.
pub(super) fn array_index(key: &str) -> Option<usize> {
    key.parse::<usize>()
        .ok()
        .filter(|index| index.to_string() == key)
}

pub(super) fn property_key(value: &Value) -> String {
    match value {
        Value::Number(n) => format_number(*n),
        other => other.to_display(),
    }
}

/// Source-like description of a callee for error messages.
fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => name.clone(),
        Expr::This => "this".to_string(),
        Expr::Member {
            object, property, ..
        } => format!("{}.{property}", describe(object)),
        Expr::Index { object, .. } => format!("{}[...]", describe(object)),
        Expr::Call { callee, .. } => format!("{}(...)", describe(callee)),
        _ => "expression".to_string(),
    }
}
