//! Runtime values and the operations every part of the interpreter shares:
//! truthiness, equality, ordering, printing, hashing and answer conversion.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt::Write as _;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::rc::Rc;

use gradebox_core::Answer;
use indexmap::IndexMap;

use crate::ast::FunctionDef;
use crate::builtins::Builtin;
use crate::error::{EngineError, EngineResult};
use crate::policy::{MAX_SEQUENCE_LEN, MAX_VALUE_DEPTH};

pub(crate) type ListRef = Rc<ListCell>;
pub(crate) type DictRef = Rc<DictCell>;

#[derive(Debug, Clone)]
pub(crate) enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(ListRef),
    Tuple(Rc<TupleItems>),
    Dict(DictRef),
    Range(Range),
    Function(Rc<Function>),
    Builtin(Builtin),
    Method(Rc<BoundMethod>),
    Module(Module),
}

// ── Container payloads ───────────────────────────────────────────────────────
//
// Scripts can nest containers far deeper than the native stack allows the
// compiler's recursive drop glue to go (`x = [x]` in a loop). Each payload
// hands its children to `release`, which frees the whole graph iteratively.

/// Shared, mutable payload of a `list`.
#[derive(Debug, Default)]
pub(crate) struct ListCell(RefCell<Vec<Value>>);

impl ListCell {
    pub fn new(items: Vec<Value>) -> Self {
        Self(RefCell::new(items))
    }
}

impl Deref for ListCell {
    type Target = RefCell<Vec<Value>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Drop for ListCell {
    fn drop(&mut self) {
        release(std::mem::take(self.0.get_mut()));
    }
}

/// Shared, mutable payload of a `dict`.
#[derive(Debug, Default)]
pub(crate) struct DictCell(RefCell<IndexMap<Key, Value>>);

impl DictCell {
    pub fn new(map: IndexMap<Key, Value>) -> Self {
        Self(RefCell::new(map))
    }
}

impl Deref for DictCell {
    type Target = RefCell<IndexMap<Key, Value>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Drop for DictCell {
    fn drop(&mut self) {
        release(std::mem::take(self.0.get_mut()).into_values().collect());
    }
}

/// Immutable payload of a `tuple`.
#[derive(Debug, Default)]
pub(crate) struct TupleItems(Vec<Value>);

impl Deref for TupleItems {
    type Target = [Value];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Drop for TupleItems {
    fn drop(&mut self) {
        release(std::mem::take(&mut self.0));
    }
}

/// Drops `pending` and everything reachable only through it, without
/// recursing. Shared children just lose a reference.
fn release(mut pending: Vec<Value>) {
    while let Some(value) = pending.pop() {
        match value {
            Value::List(list) => {
                if let Ok(mut cell) = Rc::try_unwrap(list) {
                    pending.append(cell.0.get_mut());
                }
            }
            Value::Dict(dict) => {
                if let Ok(mut cell) = Rc::try_unwrap(dict) {
                    pending.extend(std::mem::take(cell.0.get_mut()).into_values());
                }
            }
            Value::Tuple(items) => {
                if let Ok(mut items) = Rc::try_unwrap(items) {
                    pending.append(&mut items.0);
                }
            }
            Value::Function(function) => {
                if let Ok(function) = Rc::try_unwrap(function) {
                    pending.extend(function.defaults);
                }
            }
            Value::Method(method) => {
                if let Ok(method) = Rc::try_unwrap(method) {
                    pending.push(method.receiver);
                }
            }
            _ => {}
        }
    }
}

/// A user-defined function with its defaults evaluated at `def` time.
#[derive(Debug)]
pub(crate) struct Function {
    pub def: Rc<FunctionDef>,
    pub defaults: Vec<Value>,
}

#[derive(Debug)]
pub(crate) struct BoundMethod {
    pub receiver: Value,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Module {
    Math,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Range {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl Range {
    pub fn new(start: i64, stop: i64, step: i64) -> EngineResult<Self> {
        if step == 0 {
            return Err(EngineError::runtime("range() arg 3 must not be zero"));
        }
        Ok(Self { start, stop, step })
    }

    pub fn len(&self) -> usize {
        let (start, stop, step) = (i128::from(self.start), i128::from(self.stop), i128::from(self.step));
        let span = if step > 0 { stop - start } else { start - stop };
        if span <= 0 {
            return 0;
        }
        let n = (span + step.abs() - 1) / step.abs();
        usize::try_from(n).unwrap_or(usize::MAX)
    }

    /// Element `index`, which must be below [`Range::len`].
    pub fn get(&self, index: usize) -> i64 {
        let offset = i128::from(self.step) * i128::try_from(index).unwrap_or(i128::MAX);
        i64::try_from(i128::from(self.start) + offset).unwrap_or(self.stop)
    }

    pub fn contains(&self, n: i64) -> bool {
        let in_bounds = if self.step > 0 { self.start <= n && n < self.stop } else { self.stop < n && n <= self.start };
        in_bounds && (i128::from(n) - i128::from(self.start)) % i128::from(self.step) == 0
    }
}

/// Dictionary key. Equality and hashing follow numeric value, so `1`,
/// `1.0` and `True` address the same entry.
#[derive(Debug, Clone)]
pub(crate) enum Key {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Tuple(Rc<[Key]>),
}

#[derive(PartialEq, Hash)]
enum Canonical<'a> {
    None,
    Int(i64),
    Float(u64),
    Str(&'a str),
    Tuple(&'a [Key]),
}

impl Key {
    #[allow(clippy::cast_possible_truncation)]
    fn canonical(&self) -> Canonical<'_> {
        match self {
            Self::None => Canonical::None,
            Self::Bool(b) => Canonical::Int(i64::from(*b)),
            Self::Int(i) => Canonical::Int(*i),
            Self::Float(f) if f.fract() == 0.0 && (I64_LOWER..I64_UPPER).contains(f) => Canonical::Int(*f as i64),
            Self::Float(f) => Canonical::Float(f.to_bits()),
            Self::Str(s) => Canonical::Str(s),
            Self::Tuple(items) => Canonical::Tuple(items),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::None => Value::None,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::Int(*i),
            Self::Float(f) => Value::Float(*f),
            Self::Str(s) => Value::Str(Rc::clone(s)),
            Self::Tuple(items) => Value::tuple(items.iter().map(Key::to_value).collect()),
        }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}

/// Either numeric representation, with `bool` already widened to `int`.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Num {
    Int(i64),
    Float(f64),
}

/// `-2^63` and `2^63`: every integral float in `[I64_LOWER, I64_UPPER)`
/// converts to `i64` exactly.
const I64_LOWER: f64 = -9_223_372_036_854_775_808.0;
const I64_UPPER: f64 = 9_223_372_036_854_775_808.0;

impl Num {
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }

    /// Exact numeric ordering. Integers are never rounded to floats, so
    /// `2**53 + 1` and `2.0**53` compare unequal. `None` when a NaN is involved.
    pub fn compare(self, other: Num) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(x), Self::Int(y)) => Some(x.cmp(&y)),
            (Self::Float(x), Self::Float(y)) => x.partial_cmp(&y),
            (Self::Int(x), Self::Float(y)) => int_float_cmp(x, y),
            (Self::Float(x), Self::Int(y)) => int_float_cmp(y, x).map(Ordering::reverse),
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn int_float_cmp(i: i64, f: f64) -> Option<Ordering> {
    if f.is_nan() {
        return None;
    }
    if f >= I64_UPPER {
        return Some(Ordering::Less);
    }
    if f < I64_LOWER {
        return Some(Ordering::Greater);
    }
    let whole = f.trunc();
    Some(i.cmp(&(whole as i64)).then(if f > whole {
        Ordering::Less
    } else if f < whole {
        Ordering::Greater
    } else {
        Ordering::Equal
    }))
}

/// Fails once a sequence would exceed [`MAX_SEQUENCE_LEN`].
pub(crate) fn check_len(len: usize) -> EngineResult<()> {
    if len > MAX_SEQUENCE_LEN {
        return Err(EngineError::runtime(format!("sequence too large ({len} elements, limit {MAX_SEQUENCE_LEN})")));
    }
    Ok(())
}

fn too_deep() -> EngineError {
    EngineError::runtime("maximum value nesting depth exceeded")
}

impl Value {
    pub fn str(s: &str) -> Self {
        Self::Str(Rc::from(s))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Self::List(Rc::new(ListCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Self::Tuple(Rc::new(TupleItems(items)))
    }

    pub fn dict(map: IndexMap<Key, Value>) -> Self {
        Self::Dict(Rc::new(DictCell::new(map)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Dict(_) => "dict",
            Self::Range(_) => "range",
            Self::Function(_) => "function",
            Self::Builtin(_) | Self::Method(_) => "builtin_function_or_method",
            Self::Module(_) => "module",
        }
    }

    pub fn as_num(&self) -> Option<Num> {
        match self {
            Self::Bool(b) => Some(Num::Int(i64::from(*b))),
            Self::Int(i) => Some(Num::Int(*i)),
            Self::Float(f) => Some(Num::Float(*f)),
            _ => None,
        }
    }

    /// Integer view for indices and counts; floats are rejected.
    pub fn as_index(&self) -> EngineResult<i64> {
        match self {
            Self::Bool(b) => Ok(i64::from(*b)),
            Self::Int(i) => Ok(*i),
            other => Err(EngineError::runtime(format!(
                "'{}' object cannot be interpreted as an integer",
                other.type_name()
            ))),
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.borrow().is_empty(),
            Self::Tuple(items) => !items.is_empty(),
            Self::Dict(map) => !map.borrow().is_empty(),
            Self::Range(r) => r.len() > 0,
            Self::Function(_) | Self::Builtin(_) | Self::Method(_) | Self::Module(_) => true,
        }
    }

    pub fn to_key(&self) -> EngineResult<Key> {
        self.key_at(0)
    }

    fn key_at(&self, depth: usize) -> EngineResult<Key> {
        if depth > MAX_VALUE_DEPTH {
            return Err(too_deep());
        }
        match self {
            Self::None => Ok(Key::None),
            Self::Bool(b) => Ok(Key::Bool(*b)),
            Self::Int(i) => Ok(Key::Int(*i)),
            Self::Float(f) => Ok(Key::Float(*f)),
            Self::Str(s) => Ok(Key::Str(Rc::clone(s))),
            Self::Tuple(items) => {
                Ok(Key::Tuple(items.iter().map(|v| v.key_at(depth + 1)).collect::<EngineResult<Rc<[Key]>>>()?))
            }
            other => Err(EngineError::runtime(format!("unhashable type: '{}'", other.type_name()))),
        }
    }

    /// Snapshot of the values iteration would produce.
    pub fn iterate(&self) -> EngineResult<Vec<Value>> {
        match self {
            Self::Str(s) => Ok(s.chars().map(|c| Value::str(c.encode_utf8(&mut [0; 4]))).collect()),
            Self::List(items) => Ok(items.borrow().clone()),
            Self::Tuple(items) => Ok(items.to_vec()),
            Self::Dict(map) => Ok(map.borrow().keys().map(Key::to_value).collect()),
            Self::Range(r) => {
                check_len(r.len())?;
                Ok((0..r.len()).map(|i| Value::Int(r.get(i))).collect())
            }
            other => Err(EngineError::runtime(format!("'{}' object is not iterable", other.type_name()))),
        }
    }

    pub fn len(&self) -> EngineResult<usize> {
        match self {
            Self::Str(s) => Ok(s.chars().count()),
            Self::List(items) => Ok(items.borrow().len()),
            Self::Tuple(items) => Ok(items.len()),
            Self::Dict(map) => Ok(map.borrow().len()),
            Self::Range(r) => Ok(r.len()),
            other => Err(EngineError::runtime(format!("object of type '{}' has no len()", other.type_name()))),
        }
    }

    // ── Equality and ordering ────────────────────────────────────────────────

    /// `==` as the language defines it: numeric across `bool`/`int`/`float`,
    /// structural for containers.
    pub fn py_eq(&self, other: &Value) -> EngineResult<bool> {
        self.eq_at(other, 0)
    }

    fn eq_at(&self, other: &Value, depth: usize) -> EngineResult<bool> {
        if depth > MAX_VALUE_DEPTH {
            return Err(too_deep());
        }
        if let (Some(a), Some(b)) = (self.as_num(), other.as_num()) {
            return Ok(a.compare(b) == Some(Ordering::Equal));
        }
        let seq_eq = |a: &[Value], b: &[Value]| -> EngineResult<bool> {
            if a.len() != b.len() {
                return Ok(false);
            }
            for (x, y) in a.iter().zip(b) {
                if !x.eq_at(y, depth + 1)? {
                    return Ok(false);
                }
            }
            Ok(true)
        };
        match (self, other) {
            (Self::None, Self::None) => Ok(true),
            (Self::Str(a), Self::Str(b)) => Ok(a == b),
            (Self::List(a), Self::List(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let (a, b) = (a.borrow().clone(), b.borrow().clone());
                seq_eq(&a[..], &b[..])
            }
            (Self::Tuple(a), Self::Tuple(b)) => seq_eq(&a[..], &b[..]),
            (Self::Dict(a), Self::Dict(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let (a, b) = (a.borrow().clone(), b.borrow().clone());
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (key, value) in &a {
                    match b.get(key) {
                        Some(other) if value.eq_at(other, depth + 1)? => {}
                        _ => return Ok(false),
                    }
                }
                Ok(true)
            }
            (Self::Range(a), Self::Range(b)) => {
                let (la, lb) = (a.len(), b.len());
                Ok(la == lb && (la == 0 || (a.start == b.start && (la == 1 || a.step == b.step))))
            }
            (Self::Function(a), Self::Function(b)) => Ok(Rc::ptr_eq(a, b)),
            (Self::Builtin(a), Self::Builtin(b)) => Ok(a == b),
            (Self::Module(a), Self::Module(b)) => Ok(a == b),
            _ => Ok(false),
        }
    }

    /// Ordering for `<`-style operators. `None` means unordered (NaN).
    pub fn py_cmp(&self, other: &Value, op: &str) -> EngineResult<Option<Ordering>> {
        self.cmp_at(other, op, 0)
    }

    fn cmp_at(&self, other: &Value, op: &str, depth: usize) -> EngineResult<Option<Ordering>> {
        if depth > MAX_VALUE_DEPTH {
            return Err(too_deep());
        }
        if let (Some(a), Some(b)) = (self.as_num(), other.as_num()) {
            return Ok(a.compare(b));
        }
        let seq_cmp = |a: &[Value], b: &[Value]| -> EngineResult<Option<Ordering>> {
            for (x, y) in a.iter().zip(b) {
                if !x.eq_at(y, depth + 1)? {
                    return x.cmp_at(y, op, depth + 1);
                }
            }
            Ok(Some(a.len().cmp(&b.len())))
        };
        match (self, other) {
            (Self::Str(a), Self::Str(b)) => Ok(Some(a.cmp(b))),
            (Self::List(a), Self::List(b)) => {
                let (a, b) = (a.borrow().clone(), b.borrow().clone());
                seq_cmp(&a[..], &b[..])
            }
            (Self::Tuple(a), Self::Tuple(b)) => seq_cmp(&a[..], &b[..]),
            _ => Err(EngineError::runtime(format!(
                "'{op}' not supported between instances of '{}' and '{}'",
                self.type_name(),
                other.type_name()
            ))),
        }
    }

    /// `is`: identity for containers, value for immutable scalars.
    pub fn is(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b),
            (Self::Dict(a), Self::Dict(b)) => Rc::ptr_eq(a, b),
            (Self::Tuple(a), Self::Tuple(b)) => Rc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Builtin(a), Self::Builtin(b)) => a == b,
            (Self::Module(a), Self::Module(b)) => a == b,
            _ => false,
        }
    }

    // ── Text ─────────────────────────────────────────────────────────────────

    /// `str(value)`.
    pub fn to_text(&self) -> EngineResult<String> {
        match self {
            Self::Str(s) => Ok(s.to_string()),
            other => other.repr(),
        }
    }

    /// `repr(value)`.
    pub fn repr(&self) -> EngineResult<String> {
        let mut out = String::new();
        self.write_repr(&mut out, 0)?;
        Ok(out)
    }

    fn write_repr(&self, out: &mut String, depth: usize) -> EngineResult<()> {
        if depth > MAX_VALUE_DEPTH {
            return Err(too_deep());
        }
        let write_seq = |out: &mut String, items: &[Value], open: char, close: char| -> EngineResult<()> {
            out.push(open);
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                item.write_repr(out, depth + 1)?;
            }
            if open == '(' && items.len() == 1 {
                out.push(',');
            }
            out.push(close);
            Ok(())
        };
        match self {
            Self::None => out.push_str("None"),
            Self::Bool(true) => out.push_str("True"),
            Self::Bool(false) => out.push_str("False"),
            Self::Int(i) => {
                let _ = write!(out, "{i}");
            }
            Self::Float(f) => out.push_str(&format_float(*f)),
            Self::Str(s) => out.push_str(&quote(s)),
            Self::List(items) => {
                let items = items.borrow().clone();
                write_seq(out, &items[..], '[', ']')?;
            }
            Self::Tuple(items) => write_seq(out, &items[..], '(', ')')?,
            Self::Dict(map) => {
                let map = map.borrow().clone();
                out.push('{');
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    key.to_value().write_repr(out, depth + 1)?;
                    out.push_str(": ");
                    value.write_repr(out, depth + 1)?;
                }
                out.push('}');
            }
            Self::Range(r) => {
                let _ = if r.step == 1 {
                    write!(out, "range({}, {})", r.start, r.stop)
                } else {
                    write!(out, "range({}, {}, {})", r.start, r.stop, r.step)
                };
            }
            Self::Function(f) => {
                let _ = write!(out, "<function {}>", f.def.name);
            }
            Self::Builtin(b) => {
                let _ = write!(out, "<built-in function {}>", b.name());
            }
            Self::Method(m) => {
                let _ = write!(out, "<built-in method {} of {} object>", m.name, m.receiver.type_name());
            }
            Self::Module(Module::Math) => out.push_str("<module 'math'>"),
        }
        Ok(())
    }

    // ── Submission ───────────────────────────────────────────────────────────

    /// Converts to a JSON answer. The error is the human-readable reason the
    /// value cannot be submitted.
    pub fn to_answer(&self) -> Result<Answer, String> {
        self.answer_at(0)
    }

    fn answer_at(&self, depth: usize) -> Result<Answer, String> {
        if depth > MAX_VALUE_DEPTH {
            return Err("value is nested too deeply".to_owned());
        }
        let seq = |items: &[Value]| -> Result<Answer, String> {
            items.iter().map(|v| v.answer_at(depth + 1)).collect::<Result<Vec<_>, _>>().map(Answer::Array)
        };
        match self {
            Self::None => Ok(Answer::Null),
            Self::Bool(b) => Ok(Answer::Bool(*b)),
            Self::Int(i) => Ok(Answer::from(*i)),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(Answer::Number)
                .ok_or_else(|| format!("float value {} is not JSON compliant", format_float(*f))),
            Self::Str(s) => Ok(Answer::String(s.to_string())),
            Self::List(items) => {
                let items = items.borrow().clone();
                seq(&items[..])
            }
            Self::Tuple(items) => seq(&items[..]),
            Self::Dict(map) => {
                let map = map.borrow().clone();
                let mut object = serde_json::Map::new();
                for (key, value) in &map {
                    let Key::Str(name) = key else {
                        return Err(format!("dict keys must be str, not {}", key.to_value().type_name()));
                    };
                    object.insert(name.to_string(), value.answer_at(depth + 1)?);
                }
                Ok(Answer::Object(object))
            }
            other => Err(format!("object of type {} is not JSON serializable", other.type_name())),
        }
    }
}

/// Shortest round-trip float text, in the exponent style learners expect
/// from `print`.
pub(crate) fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_owned();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_owned();
    }
    let magnitude = f.abs();
    if magnitude == 0.0 || (1e-4..1e16).contains(&magnitude) {
        let text = f.to_string();
        return if text.contains('.') { text } else { format!("{text}.0") };
    }
    let text = format!("{f:e}");
    let (mantissa, exponent) = text.split_once('e').unwrap_or((text.as_str(), "0"));
    let (sign, digits) = exponent.strip_prefix('-').map_or(("+", exponent), |d| ("-", d));
    format!("{mantissa}e{sign}{digits:0>2}")
}

fn quote(s: &str) -> String {
    let delimiter = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(delimiter);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == delimiter => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(delimiter);
    out
}
