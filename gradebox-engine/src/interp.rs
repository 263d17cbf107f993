//! Tree-walking interpreter for a checked [`Program`].

use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::{BinOp, CmpOp, Const, Expr, Stmt, StmtKind, Target, UnaryOp};
use crate::builtins::{math_attribute, Builtin};
use crate::error::{EngineError, EngineResult};
use crate::parser::Program;
use crate::policy::{MAX_CALL_DEPTH, MAX_EVAL_DEPTH, MAX_TRANSCRIPT_BYTES};
use crate::value::{check_len, BoundMethod, Function, Module, Num, Value};
use crate::CapturedAnswers;

enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// The host-owned buffer behind the submit capability.
struct Submission {
    name: String,
    arity: usize,
    answers: CapturedAnswers,
    called: bool,
}

pub(crate) struct Interpreter {
    globals: HashMap<String, Value>,
    frames: Vec<HashMap<String, Value>>,
    /// Open `eval` and `exec_block` activations, across all calls.
    depth: usize,
    submission: Submission,
    transcript: String,
    transcript_full: bool,
}

impl Interpreter {
    /// A fresh environment whose only injected global is the submit
    /// capability, bound to `function_name`.
    pub fn new(function_name: &str, arity: usize) -> Self {
        let mut globals = HashMap::new();
        globals.insert(function_name.to_owned(), Value::Builtin(Builtin::Submit));
        Self {
            globals,
            frames: Vec::new(),
            depth: 0,
            submission: Submission { name: function_name.to_owned(), arity, answers: CapturedAnswers::default(), called: false },
            transcript: String::new(),
            transcript_full: false,
        }
    }

    pub fn run(&mut self, program: &Program) -> EngineResult<()> {
        self.exec_block(&program.body)?;
        Ok(())
    }

    pub fn into_parts(self) -> (CapturedAnswers, String) {
        (self.submission.answers, self.transcript)
    }

    // ── Names ────────────────────────────────────────────────────────────────

    fn load(&self, name: &str) -> EngineResult<Value> {
        if let Some(value) = self.frames.last().and_then(|frame| frame.get(name)) {
            return Ok(value.clone());
        }
        if let Some(value) = self.globals.get(name) {
            return Ok(value.clone());
        }
        Builtin::global(name)
            .map(Value::Builtin)
            .ok_or_else(|| EngineError::runtime(format!("name '{name}' is not defined")))
    }

    fn store(&mut self, name: &str, value: Value) {
        match self.frames.last_mut() {
            Some(frame) => frame.insert(name.to_owned(), value),
            None => self.globals.insert(name.to_owned(), value),
        };
    }

    // ── Statements ───────────────────────────────────────────────────────────

    fn descend(&mut self) -> EngineResult<()> {
        if self.depth >= MAX_EVAL_DEPTH {
            return Err(EngineError::runtime("maximum recursion depth exceeded"));
        }
        self.depth += 1;
        Ok(())
    }

    fn exec_block(&mut self, body: &[Stmt]) -> EngineResult<Flow> {
        self.descend()?;
        let flow = self.exec_statements(body);
        self.depth -= 1;
        flow
    }

    fn exec_statements(&mut self, body: &[Stmt]) -> EngineResult<Flow> {
        for stmt in body {
            let flow = self.exec(stmt).map_err(|e| e.at_line(stmt.line))?;
            if !matches!(flow, Flow::Normal) {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt) -> EngineResult<Flow> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr)?;
            }
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value)?;
                for target in targets {
                    self.assign(target, value.clone())?;
                }
            }
            StmtKind::AugAssign { target, op, value } => self.aug_assign(target, *op, value)?,
            StmtKind::If { branches, orelse } => {
                for (cond, body) in branches {
                    if self.eval(cond)?.truthy() {
                        return self.exec_block(body);
                    }
                }
                return self.exec_block(orelse);
            }
            StmtKind::While { cond, body } => {
                while self.eval(cond)?.truthy() {
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Normal | Flow::Continue => {}
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
            }
            StmtKind::For { target, iter, body } => return self.exec_for(target, iter, body),
            StmtKind::Def(def) => {
                let defaults = def.defaults.iter().map(|e| self.eval(e)).collect::<EngineResult<Vec<_>>>()?;
                let function = Value::Function(Rc::new(Function { def: Rc::clone(def), defaults }));
                self.store(&def.name, function);
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Import { module, alias } => {
                let module = import(module)?;
                self.store(alias, Value::Module(module));
            }
            StmtKind::ImportFrom { module, names } => {
                let module = import(module)?;
                for (name, alias) in names {
                    let value = module_attribute(module, name).ok_or_else(|| {
                        EngineError::runtime(format!("cannot import name '{name}' from 'math'"))
                    })?;
                    self.store(alias, value);
                }
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass => {}
        }
        Ok(Flow::Normal)
    }

    fn exec_for(&mut self, target: &Target, iter: &Expr, body: &[Stmt]) -> EngineResult<Flow> {
        let iterable = self.eval(iter)?;
        let mut index = 0usize;
        loop {
            // Lists are walked live so appends during the loop are visited.
            let item = match &iterable {
                Value::List(items) => items.borrow().get(index).cloned(),
                Value::Range(range) => (index < range.len()).then(|| Value::Int(range.get(index))),
                _ => break,
            };
            let Some(item) = item else { return Ok(Flow::Normal) };
            index += 1;
            self.assign(target, item)?;
            match self.exec_block(body)? {
                Flow::Break => return Ok(Flow::Normal),
                Flow::Normal | Flow::Continue => {}
                ret @ Flow::Return(_) => return Ok(ret),
            }
        }
        let size = dict_size(&iterable);
        for item in iterable.iterate()? {
            check_dict_size(&iterable, size)?;
            self.assign(target, item)?;
            match self.exec_block(body)? {
                Flow::Break => return Ok(Flow::Normal),
                Flow::Normal | Flow::Continue => {}
                ret @ Flow::Return(_) => return Ok(ret),
            }
        }
        check_dict_size(&iterable, size)?;
        Ok(Flow::Normal)
    }

    fn assign(&mut self, target: &Target, value: Value) -> EngineResult<()> {
        match target {
            Target::Name(name) => self.store(name, value),
            Target::Subscript { value: container, index } => {
                let container = self.eval(container)?;
                let index = self.eval(index)?;
                set_item(&container, &index, value)?;
            }
            Target::Unpack(targets) => {
                let items = value.iterate()?;
                if items.len() < targets.len() {
                    return Err(EngineError::runtime(format!(
                        "not enough values to unpack (expected {}, got {})",
                        targets.len(),
                        items.len()
                    )));
                }
                if items.len() > targets.len() {
                    return Err(EngineError::runtime(format!(
                        "too many values to unpack (expected {})",
                        targets.len()
                    )));
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item)?;
                }
            }
        }
        Ok(())
    }

    fn aug_assign(&mut self, target: &Target, op: BinOp, value: &Expr) -> EngineResult<()> {
        match target {
            Target::Name(name) => {
                let current = self.load(name)?;
                let rhs = self.eval(value)?;
                let updated = in_place(op, current, rhs)?;
                self.store(name, updated);
            }
            Target::Subscript { value: container, index } => {
                let container = self.eval(container)?;
                let index = self.eval(index)?;
                let current = get_item(&container, &index)?;
                let rhs = self.eval(value)?;
                set_item(&container, &index, in_place(op, current, rhs)?)?;
            }
            Target::Unpack(_) => return Err(EngineError::runtime("illegal expression for augmented assignment")),
        }
        Ok(())
    }

    // ── Expressions ──────────────────────────────────────────────────────────

    pub(crate) fn eval(&mut self, expr: &Expr) -> EngineResult<Value> {
        self.descend()?;
        let value = self.eval_expr(expr);
        self.depth -= 1;
        value
    }

    fn eval_expr(&mut self, expr: &Expr) -> EngineResult<Value> {
        match expr {
            Expr::Const(c) => Ok(match c {
                Const::None => Value::None,
                Const::Bool(b) => Value::Bool(*b),
                Const::Int(i) => Value::Int(*i),
                Const::Float(f) => Value::Float(*f),
                Const::Str(s) => Value::Str(Rc::clone(s)),
            }),
            Expr::Name(name) => self.load(name),
            Expr::List(items) => Ok(Value::list(self.eval_all(items)?)),
            Expr::Tuple(items) => Ok(Value::tuple(self.eval_all(items)?)),
            Expr::Dict(entries) => {
                let mut map = IndexMap::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = self.eval(key)?.to_key()?;
                    let value = self.eval(value)?;
                    map.insert(key, value);
                }
                Ok(Value::dict(map))
            }
            Expr::Unary { op, operand } => unary(*op, &self.eval(operand)?),
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, &left, &right)
            }
            Expr::And(left, right) => {
                let left = self.eval(left)?;
                if left.truthy() {
                    self.eval(right)
                } else {
                    Ok(left)
                }
            }
            Expr::Or(left, right) => {
                let left = self.eval(left)?;
                if left.truthy() {
                    Ok(left)
                } else {
                    self.eval(right)
                }
            }
            Expr::Compare { left, rest } => {
                let mut left = self.eval(left)?;
                for (op, right) in rest {
                    let right = self.eval(right)?;
                    if !compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::IfExp { cond, then, orelse } => {
                if self.eval(cond)?.truthy() {
                    self.eval(then)
                } else {
                    self.eval(orelse)
                }
            }
            Expr::Call { func, args, kwargs } => {
                let func = self.eval(func)?;
                let args = self.eval_all(args)?;
                let kwargs = kwargs
                    .iter()
                    .map(|(name, e)| -> EngineResult<(String, Value)> { Ok((name.clone(), self.eval(e)?)) })
                    .collect::<EngineResult<Vec<_>>>()?;
                self.call(&func, args, kwargs)
            }
            Expr::Attribute { value, attr } => {
                let value = self.eval(value)?;
                attribute(value, attr)
            }
            Expr::Subscript { value, index } => {
                let value = self.eval(value)?;
                let index = self.eval(index)?;
                get_item(&value, &index)
            }
            Expr::Slice { value, lower, upper, step } => {
                let value = self.eval(value)?;
                let mut bound = |e: &Option<Box<Expr>>| -> EngineResult<Option<i64>> {
                    match e {
                        None => Ok(None),
                        Some(e) => match self.eval(e)? {
                            Value::None => Ok(None),
                            v => v.as_index().map(Some),
                        },
                    }
                };
                let (lower, upper, step) = (bound(lower)?, bound(upper)?, bound(step)?);
                slice(&value, lower, upper, step)
            }
            Expr::ListComp { elt, target, iter, cond } => {
                let iterable = self.eval(iter)?;
                let size = dict_size(&iterable);
                let mut out = Vec::new();
                for item in iterable.iterate()? {
                    check_dict_size(&iterable, size)?;
                    self.assign(target, item)?;
                    if let Some(cond) = cond {
                        if !self.eval(cond)?.truthy() {
                            continue;
                        }
                    }
                    out.push(self.eval(elt)?);
                }
                check_dict_size(&iterable, size)?;
                Ok(Value::list(out))
            }
        }
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> EngineResult<Vec<Value>> {
        exprs.iter().map(|e| self.eval(e)).collect()
    }

    // ── Calls ────────────────────────────────────────────────────────────────

    pub(crate) fn call(&mut self, func: &Value, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> EngineResult<Value> {
        match func {
            Value::Function(function) => self.call_function(function, args, kwargs),
            Value::Builtin(builtin) => self.call_builtin(*builtin, args, kwargs),
            Value::Method(method) => self.call_method(&method.receiver, &method.name, args, kwargs),
            other => Err(EngineError::runtime(format!("'{}' object is not callable", other.type_name()))),
        }
    }

    fn call_function(
        &mut self,
        function: &Function,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> EngineResult<Value> {
        let def = &function.def;
        let name = &def.name;
        if args.len() > def.params.len() {
            return Err(EngineError::runtime(format!(
                "{name}() takes {} positional arguments but {} were given",
                def.params.len(),
                args.len()
            )));
        }
        if self.frames.len() >= MAX_CALL_DEPTH {
            return Err(EngineError::runtime("maximum recursion depth exceeded"));
        }

        let mut bound: Vec<Option<Value>> = args.into_iter().map(Some).collect();
        bound.resize(def.params.len(), None);
        for (key, value) in kwargs {
            let Some(slot) = def.params.iter().position(|p| *p == key) else {
                return Err(EngineError::runtime(format!("{name}() got an unexpected keyword argument '{key}'")));
            };
            if bound[slot].is_some() {
                return Err(EngineError::runtime(format!("{name}() got multiple values for argument '{key}'")));
            }
            bound[slot] = Some(value);
        }
        let first_default = def.params.len() - function.defaults.len();
        let mut frame = HashMap::with_capacity(def.params.len());
        for (i, (param, value)) in def.params.iter().zip(bound).enumerate() {
            let value = match value {
                Some(v) => v,
                None if i >= first_default => function.defaults[i - first_default].clone(),
                None => {
                    return Err(EngineError::runtime(format!(
                        "{name}() missing required argument: '{param}'"
                    )))
                }
            };
            frame.insert(param.clone(), value);
        }

        self.frames.push(frame);
        let result = self.exec_block(&def.body);
        self.frames.pop();
        match result? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::None),
        }
    }

    /// Records the single permitted submission.
    pub(crate) fn submit(&mut self, args: &[Value], kwargs: &[(String, Value)]) -> EngineResult<Value> {
        let arity = self.submission.arity;
        let name = &self.submission.name;
        if !kwargs.is_empty() {
            return Err(EngineError::Contract(format!("{name}() takes no keyword arguments")));
        }
        if args.len() != arity {
            return Err(EngineError::Contract(format!(
                "{name}() takes exactly {arity} arguments ({} given)",
                args.len()
            )));
        }
        if self.submission.called {
            return Err(EngineError::Contract(format!("{name}() may only be called once")));
        }
        let mut answers = Vec::with_capacity(arity);
        for (i, arg) in args.iter().enumerate() {
            let answer = arg
                .to_answer()
                .map_err(|reason| EngineError::Contract(format!("{name}() argument {} {reason}", i + 1)))?;
            answers.push(answer);
        }
        self.submission.called = true;
        self.submission.answers = CapturedAnswers::new(answers);
        Ok(Value::None)
    }

    /// Appends to the print transcript, dropping output past the cap.
    pub(crate) fn print(&mut self, text: &str) {
        if self.transcript_full {
            return;
        }
        let room = MAX_TRANSCRIPT_BYTES - self.transcript.len();
        if text.len() <= room {
            self.transcript.push_str(text);
            return;
        }
        let mut cut = room;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        self.transcript.push_str(&text[..cut]);
        self.transcript_full = true;
    }
}

fn dict_size(iterable: &Value) -> Option<usize> {
    match iterable {
        Value::Dict(map) => Some(map.borrow().len()),
        _ => None,
    }
}

/// Iterating a dict walks a snapshot of its keys; growing or shrinking the
/// dict meanwhile is an error rather than a silently stale walk.
fn check_dict_size(iterable: &Value, size: Option<usize>) -> EngineResult<()> {
    match (iterable, size) {
        (Value::Dict(map), Some(size)) if map.borrow().len() != size => {
            Err(EngineError::runtime("dictionary changed size during iteration"))
        }
        _ => Ok(()),
    }
}

fn import(module: &str) -> EngineResult<Module> {
    match module {
        "math" => Ok(Module::Math),
        other => Err(EngineError::runtime(format!("No module named '{other}'"))),
    }
}

fn module_attribute(module: Module, name: &str) -> Option<Value> {
    match module {
        Module::Math => math_attribute(name),
    }
}

fn attribute(value: Value, attr: &str) -> EngineResult<Value> {
    if let Value::Module(module) = value {
        return module_attribute(module, attr)
            .ok_or_else(|| EngineError::runtime(format!("module 'math' has no attribute '{attr}'")));
    }
    if Builtin::has_method(&value, attr) {
        return Ok(Value::Method(Rc::new(BoundMethod { receiver: value, name: attr.to_owned() })));
    }
    Err(EngineError::runtime(format!("'{}' object has no attribute '{attr}'", value.type_name())))
}

// ── Operators ────────────────────────────────────────────────────────────────

fn overflow() -> EngineError {
    EngineError::runtime("integer overflow")
}

fn unary(op: UnaryOp, operand: &Value) -> EngineResult<Value> {
    match (op, operand.as_num()) {
        (UnaryOp::Not, _) => Ok(Value::Bool(!operand.truthy())),
        (UnaryOp::Neg, Some(Num::Int(i))) => i.checked_neg().map(Value::Int).ok_or_else(overflow),
        (UnaryOp::Neg, Some(Num::Float(f))) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Some(Num::Int(i))) => Ok(Value::Int(i)),
        (UnaryOp::Pos, Some(Num::Float(f))) => Ok(Value::Float(f)),
        (_, None) => Err(EngineError::runtime(format!(
            "bad operand type for unary {}: '{}'",
            if op == UnaryOp::Neg { "-" } else { "+" },
            operand.type_name()
        ))),
    }
}

/// `x op= y`: lists extend in place, everything else rebinds.
fn in_place(op: BinOp, current: Value, rhs: Value) -> EngineResult<Value> {
    if let (BinOp::Add, Value::List(items)) = (op, &current) {
        let extra = rhs.iterate()?;
        check_len(items.borrow().len() + extra.len())?;
        items.borrow_mut().extend(extra);
        return Ok(current);
    }
    binary(op, &current, &rhs)
}

pub(crate) fn binary(op: BinOp, left: &Value, right: &Value) -> EngineResult<Value> {
    if let (Some(a), Some(b)) = (left.as_num(), right.as_num()) {
        return arithmetic(op, a, b);
    }
    match (op, left, right) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => {
            check_len(a.len() + b.len())?;
            Ok(Value::Str(format!("{a}{b}").into()))
        }
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            let extra = b.borrow().clone();
            check_len(items.len() + extra.len())?;
            items.extend(extra);
            Ok(Value::list(items))
        }
        (BinOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
            check_len(a.len() + b.len())?;
            Ok(Value::tuple(a.iter().chain(b.iter()).cloned().collect()))
        }
        (BinOp::Mul, seq, count) | (BinOp::Mul, count, seq)
            if matches!(seq, Value::Str(_) | Value::List(_) | Value::Tuple(_))
                && matches!(count, Value::Int(_) | Value::Bool(_)) =>
        {
            repeat(seq, count.as_index()?)
        }
        (BinOp::Mod, Value::Str(_), _) => Err(EngineError::runtime("string formatting with '%' is not supported")),
        _ => Err(EngineError::runtime(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op.symbol(),
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn repeat(seq: &Value, count: i64) -> EngineResult<Value> {
    let times = usize::try_from(count.max(0)).unwrap_or(usize::MAX);
    let unit = seq.len()?;
    check_len(unit.saturating_mul(times))?;
    Ok(match seq {
        Value::Str(s) => {
            check_len(s.len().saturating_mul(times))?;
            Value::Str(s.repeat(times).into())
        }
        Value::List(items) => {
            let items = items.borrow();
            Value::list(items.iter().cycle().take(items.len() * times).cloned().collect())
        }
        Value::Tuple(items) => Value::tuple(items.iter().cycle().take(items.len() * times).cloned().collect()),
        other => other.clone(),
    })
}

fn arithmetic(op: BinOp, a: Num, b: Num) -> EngineResult<Value> {
    if let (Num::Int(x), Num::Int(y)) = (a, b) {
        return int_arithmetic(op, x, y);
    }
    let (x, y) = (a.as_f64(), b.as_f64());
    let value = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => {
            if y == 0.0 {
                return Err(EngineError::runtime("float division by zero"));
            }
            x / y
        }
        BinOp::FloorDiv => {
            if y == 0.0 {
                return Err(EngineError::runtime("float floor division by zero"));
            }
            (x / y).floor()
        }
        BinOp::Mod => {
            if y == 0.0 {
                return Err(EngineError::runtime("float modulo"));
            }
            let r = x % y;
            if r != 0.0 && (r < 0.0) != (y < 0.0) {
                r + y
            } else {
                r
            }
        }
        BinOp::Pow => {
            if x == 0.0 && y < 0.0 {
                return Err(EngineError::runtime("0.0 cannot be raised to a negative power"));
            }
            x.powf(y)
        }
    };
    Ok(Value::Float(value))
}

fn int_arithmetic(op: BinOp, x: i64, y: i64) -> EngineResult<Value> {
    let value = match op {
        BinOp::Add => x.checked_add(y),
        BinOp::Sub => x.checked_sub(y),
        BinOp::Mul => x.checked_mul(y),
        BinOp::Div => {
            if y == 0 {
                return Err(EngineError::runtime("division by zero"));
            }
            return arithmetic(op, Num::Float(Num::Int(x).as_f64()), Num::Float(Num::Int(y).as_f64()));
        }
        BinOp::FloorDiv => {
            if y == 0 {
                return Err(EngineError::runtime("integer division or modulo by zero"));
            }
            x.checked_div(y).map(|q| if x % y != 0 && ((x < 0) != (y < 0)) { q - 1 } else { q })
        }
        BinOp::Mod => {
            if y == 0 {
                return Err(EngineError::runtime("integer division or modulo by zero"));
            }
            let r = x.wrapping_rem(y);
            Some(if r != 0 && ((r < 0) != (y < 0)) { r + y } else { r })
        }
        BinOp::Pow => {
            if y < 0 {
                return arithmetic(op, Num::Float(Num::Int(x).as_f64()), Num::Float(Num::Int(y).as_f64()));
            }
            u32::try_from(y).ok().and_then(|e| x.checked_pow(e))
        }
    };
    value.map(Value::Int).ok_or_else(overflow)
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> EngineResult<bool> {
    use std::cmp::Ordering::{Equal, Greater, Less};
    let ordered = |symbol: &str, accept: &[std::cmp::Ordering]| -> EngineResult<bool> {
        Ok(left.py_cmp(right, symbol)?.is_some_and(|o| accept.contains(&o)))
    };
    match op {
        CmpOp::Eq => left.py_eq(right),
        CmpOp::NotEq => left.py_eq(right).map(|eq| !eq),
        CmpOp::Lt => ordered("<", &[Less]),
        CmpOp::LtE => ordered("<=", &[Less, Equal]),
        CmpOp::Gt => ordered(">", &[Greater]),
        CmpOp::GtE => ordered(">=", &[Greater, Equal]),
        CmpOp::In => contains(right, left),
        CmpOp::NotIn => contains(right, left).map(|found| !found),
        CmpOp::Is => Ok(left.is(right)),
        CmpOp::IsNot => Ok(!left.is(right)),
    }
}

pub(crate) fn contains(container: &Value, item: &Value) -> EngineResult<bool> {
    match container {
        Value::Str(haystack) => match item {
            Value::Str(needle) => Ok(haystack.contains(&**needle)),
            other => Err(EngineError::runtime(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::Dict(map) => Ok(map.borrow().contains_key(&item.to_key()?)),
        Value::Range(range) => Ok(match item.as_num() {
            Some(Num::Int(n)) => range.contains(n),
            _ => false,
        }),
        Value::List(_) | Value::Tuple(_) => {
            for candidate in container.iterate()? {
                if candidate.py_eq(item)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        other => Err(EngineError::runtime(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

// ── Indexing ─────────────────────────────────────────────────────────────────

/// Resolves a possibly negative index against `len`.
fn position(index: i64, len: usize, kind: &str) -> EngineResult<usize> {
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let resolved = if index < 0 { index + len_i } else { index };
    if (0..len_i).contains(&resolved) {
        usize::try_from(resolved).map_err(|_| EngineError::runtime(format!("{kind} index out of range")))
    } else {
        Err(EngineError::runtime(format!("{kind} index out of range")))
    }
}

fn index_of(index: &Value, kind: &str) -> EngineResult<i64> {
    match index {
        Value::Int(_) | Value::Bool(_) => index.as_index(),
        other => Err(EngineError::runtime(format!(
            "{kind} indices must be integers or slices, not {}",
            other.type_name()
        ))),
    }
}

pub(crate) fn get_item(container: &Value, index: &Value) -> EngineResult<Value> {
    match container {
        Value::List(items) => {
            let items = items.borrow();
            let at = position(index_of(index, "list")?, items.len(), "list")?;
            Ok(items[at].clone())
        }
        Value::Tuple(items) => {
            let at = position(index_of(index, "tuple")?, items.len(), "tuple")?;
            Ok(items[at].clone())
        }
        Value::Str(s) => {
            let count = s.chars().count();
            let at = position(index_of(index, "string")?, count, "string")?;
            Ok(s.chars().nth(at).map_or(Value::None, |c| Value::str(c.encode_utf8(&mut [0; 4]))))
        }
        Value::Range(range) => {
            let at = position(index_of(index, "range object")?, range.len(), "range object")?;
            Ok(Value::Int(range.get(at)))
        }
        Value::Dict(map) => {
            let key = index.to_key()?;
            let found = map.borrow().get(&key).cloned();
            found.ok_or_else(|| EngineError::runtime(format!("KeyError: {}", index.repr().unwrap_or_default())))
        }
        other => Err(EngineError::runtime(format!("'{}' object is not subscriptable", other.type_name()))),
    }
}

pub(crate) fn set_item(container: &Value, index: &Value, value: Value) -> EngineResult<()> {
    match container {
        Value::List(items) => {
            let mut items = items.borrow_mut();
            let at = position(index_of(index, "list")?, items.len(), "list assignment")?;
            items[at] = value;
            Ok(())
        }
        Value::Dict(map) => {
            let key = index.to_key()?;
            map.borrow_mut().insert(key, value);
            Ok(())
        }
        other => Err(EngineError::runtime(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

/// Python slice semantics: clamped bounds, negative steps walk backwards.
fn slice_positions(len: usize, lower: Option<i64>, upper: Option<i64>, step: Option<i64>) -> EngineResult<Vec<usize>> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(EngineError::runtime("slice step cannot be zero"));
    }
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let clamp = |bound: i64, low: i64, high: i64| {
        let b = if bound < 0 { bound + len } else { bound };
        b.clamp(low, high)
    };
    let mut out = Vec::new();
    if step > 0 {
        let start = lower.map_or(0, |b| clamp(b, 0, len));
        let stop = upper.map_or(len, |b| clamp(b, 0, len));
        check_len(span_count(start, stop, i128::from(step)))?;
        let mut i = start;
        while i < stop {
            out.push(usize::try_from(i).unwrap_or(0));
            i = i.saturating_add(step);
        }
    } else {
        let start = lower.map_or(len - 1, |b| clamp(b, -1, len - 1));
        let stop = upper.map_or(-1, |b| clamp(b, -1, len - 1));
        check_len(span_count(stop, start, -i128::from(step)))?;
        let mut i = start;
        while i > stop {
            out.push(usize::try_from(i).unwrap_or(0));
            i = i.saturating_add(step);
        }
    }
    Ok(out)
}

/// Number of steps of `step` from `from` strictly below `to`. `step` is
/// widened so the magnitude of `i64::MIN` fits.
fn span_count(from: i64, to: i64, step: i128) -> usize {
    if to <= from {
        return 0;
    }
    let span = i128::from(to) - i128::from(from);
    usize::try_from((span + step - 1) / step).unwrap_or(usize::MAX)
}

fn slice(value: &Value, lower: Option<i64>, upper: Option<i64>, step: Option<i64>) -> EngineResult<Value> {
    match value {
        Value::List(items) => {
            let items = items.borrow();
            let picked = slice_positions(items.len(), lower, upper, step)?;
            Ok(Value::list(picked.into_iter().map(|i| items[i].clone()).collect()))
        }
        Value::Tuple(items) => {
            let picked = slice_positions(items.len(), lower, upper, step)?;
            Ok(Value::tuple(picked.into_iter().map(|i| items[i].clone()).collect()))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let picked = slice_positions(chars.len(), lower, upper, step)?;
            Ok(Value::Str(picked.into_iter().map(|i| chars[i]).collect::<String>().into()))
        }
        Value::Range(range) => {
            let picked = slice_positions(range.len(), lower, upper, step)?;
            Ok(Value::list(picked.into_iter().map(|i| Value::Int(range.get(i))).collect()))
        }
        other => Err(EngineError::runtime(format!("'{}' object is not subscriptable", other.type_name()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_division_and_modulo_round_towards_negative_infinity() {
        let int = |v: EngineResult<Value>| match v {
            Ok(Value::Int(i)) => i,
            other => panic!("expected int, got {other:?}"),
        };
        assert_eq!(int(int_arithmetic(BinOp::FloorDiv, -7, 2)), -4);
        assert_eq!(int(int_arithmetic(BinOp::Mod, -7, 2)), 1);
        assert_eq!(int(int_arithmetic(BinOp::Mod, 7, -2)), -1);
        assert_eq!(int(int_arithmetic(BinOp::Pow, 2, 10)), 1024);
    }

    #[test]
    fn overflow_is_an_error_not_a_wrap() {
        assert!(int_arithmetic(BinOp::Add, i64::MAX, 1).is_err());
        assert!(int_arithmetic(BinOp::Pow, 10, 40).is_err());
        assert!(int_arithmetic(BinOp::FloorDiv, i64::MIN, -1).is_err());
    }

    #[test]
    fn slices_follow_python_bounds() {
        assert_eq!(slice_positions(5, Some(1), Some(-1), None).ok(), Some(vec![1, 2, 3]));
        assert_eq!(slice_positions(5, None, None, Some(-2)).ok(), Some(vec![4, 2, 0]));
        assert_eq!(slice_positions(3, Some(10), None, None).ok(), Some(vec![]));
        assert!(slice_positions(3, None, None, Some(0)).is_err());
    }

    #[test]
    fn extreme_slice_steps_do_not_overflow() {
        assert_eq!(slice_positions(3, None, None, Some(i64::MIN)).ok(), Some(vec![2]));
        assert_eq!(slice_positions(3, None, None, Some(i64::MAX)).ok(), Some(vec![0]));
        assert_eq!(slice_positions(3, Some(i64::MIN), Some(i64::MAX), Some(-1)).ok(), Some(vec![]));
        assert_eq!(span_count(-1, 2, -i128::from(i64::MIN)), 1);
    }

    #[test]
    fn negative_indices_resolve_from_the_end() {
        assert_eq!(position(-1, 3, "list").ok(), Some(2));
        assert!(position(3, 3, "list").is_err());
        assert!(position(-4, 3, "list").is_err());
    }
}
