//! Builtin functions, container methods and the `math` module.

use std::cmp::Ordering;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::BinOp;
use crate::error::{EngineError, EngineResult};
use crate::interp::{binary, Interpreter};
use crate::value::{check_len, DictRef, Key, ListRef, Num, Range, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    Abs,
    All,
    Any,
    Bool,
    Dict,
    Enumerate,
    Float,
    Int,
    Len,
    List,
    Max,
    Min,
    Print,
    Range,
    Reversed,
    Round,
    Sorted,
    Str,
    Sum,
    Tuple,
    Zip,
    /// The submit capability. Only reachable through the injected global.
    Submit,
    MathSqrt,
    MathFloor,
    MathCeil,
    MathFabs,
    MathPow,
}

const GLOBALS: &[(&str, Builtin)] = &[
    ("abs", Builtin::Abs),
    ("all", Builtin::All),
    ("any", Builtin::Any),
    ("bool", Builtin::Bool),
    ("dict", Builtin::Dict),
    ("enumerate", Builtin::Enumerate),
    ("float", Builtin::Float),
    ("int", Builtin::Int),
    ("len", Builtin::Len),
    ("list", Builtin::List),
    ("max", Builtin::Max),
    ("min", Builtin::Min),
    ("print", Builtin::Print),
    ("range", Builtin::Range),
    ("reversed", Builtin::Reversed),
    ("round", Builtin::Round),
    ("sorted", Builtin::Sorted),
    ("str", Builtin::Str),
    ("sum", Builtin::Sum),
    ("tuple", Builtin::Tuple),
    ("zip", Builtin::Zip),
];

const LIST_METHODS: &[&str] =
    &["append", "extend", "pop", "index", "count", "insert", "remove", "reverse", "sort", "copy", "clear"];
const STR_METHODS: &[&str] = &[
    "upper", "lower", "strip", "lstrip", "rstrip", "split", "join", "replace", "startswith", "endswith", "count",
    "find", "isdigit", "isalpha", "capitalize", "title",
];
const DICT_METHODS: &[&str] = &["get", "keys", "values", "items", "pop", "update", "copy", "clear", "setdefault"];

impl Builtin {
    /// Builtins visible as bare names.
    pub fn global(name: &str) -> Option<Self> {
        GLOBALS.iter().find(|(n, _)| *n == name).map(|(_, b)| *b)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Submit => "submit_answers",
            Self::MathSqrt => "sqrt",
            Self::MathFloor => "floor",
            Self::MathCeil => "ceil",
            Self::MathFabs => "fabs",
            Self::MathPow => "pow",
            other => GLOBALS.iter().find(|(_, b)| *b == other).map_or("builtin", |(n, _)| n),
        }
    }

    pub fn has_method(receiver: &Value, name: &str) -> bool {
        match receiver {
            Value::List(_) => LIST_METHODS.contains(&name),
            Value::Str(_) => STR_METHODS.contains(&name),
            Value::Dict(_) => DICT_METHODS.contains(&name),
            _ => false,
        }
    }
}

/// Members of the `math` module.
pub(crate) fn math_attribute(name: &str) -> Option<Value> {
    Some(match name {
        "pi" => Value::Float(std::f64::consts::PI),
        "e" => Value::Float(std::f64::consts::E),
        "sqrt" => Value::Builtin(Builtin::MathSqrt),
        "floor" => Value::Builtin(Builtin::MathFloor),
        "ceil" => Value::Builtin(Builtin::MathCeil),
        "fabs" => Value::Builtin(Builtin::MathFabs),
        "pow" => Value::Builtin(Builtin::MathPow),
        _ => return None,
    })
}

// ── Argument helpers ─────────────────────────────────────────────────────────

fn runtime(message: impl Into<String>) -> EngineError {
    EngineError::runtime(message)
}

fn expect_args(name: &str, args: &[Value], min: usize, max: usize) -> EngineResult<()> {
    let given = args.len();
    if (min..=max).contains(&given) {
        return Ok(());
    }
    let expected = if min == max {
        format!("exactly {min}")
    } else if given < min {
        format!("at least {min}")
    } else {
        format!("at most {max}")
    };
    let plural = if min == max && min == 1 { "" } else { "s" };
    Err(runtime(format!("{name}() takes {expected} argument{plural} ({given} given)")))
}

/// Keyword arguments not yet consumed by a builtin.
struct Kwargs<'a> {
    function: &'a str,
    entries: Vec<(String, Value)>,
}

impl<'a> Kwargs<'a> {
    fn new(function: &'a str, entries: Vec<(String, Value)>) -> Self {
        Self { function, entries }
    }

    fn take(&mut self, key: &str) -> Option<Value> {
        let at = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(at).1)
    }

    fn finish(self) -> EngineResult<()> {
        match self.entries.first() {
            Some((key, _)) => Err(runtime(format!("'{key}' is an invalid keyword argument for {}()", self.function))),
            None => Ok(()),
        }
    }
}

fn number(name: &str, value: &Value) -> EngineResult<Num> {
    value
        .as_num()
        .ok_or_else(|| runtime(format!("{name}() argument must be a number, not '{}'", value.type_name())))
}

fn text<'v>(name: &str, value: &'v Value) -> EngineResult<&'v str> {
    match value {
        Value::Str(s) => Ok(&**s),
        other => Err(runtime(format!("{name}() argument must be str, not {}", other.type_name()))),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn float_to_int(f: f64) -> EngineResult<i64> {
    if f.is_nan() {
        return Err(runtime("cannot convert float NaN to integer"));
    }
    if f.is_infinite() {
        return Err(runtime("cannot convert float infinity to integer"));
    }
    let truncated = f.trunc();
    if !(-9.223_372_036_854_776e18..9.223_372_036_854_776e18).contains(&truncated) {
        return Err(runtime("integer overflow"));
    }
    Ok(truncated as i64)
}

fn less(a: &Value, b: &Value) -> EngineResult<bool> {
    Ok(a.py_cmp(b, "<")? == Some(Ordering::Less))
}

/// Stable merge sort over indices. `before(a, b)` reports whether element
/// `a` must come strictly before `b`; comparison errors abort the sort.
fn merge_sort(order: &[usize], before: &dyn Fn(usize, usize) -> EngineResult<bool>) -> EngineResult<Vec<usize>> {
    if order.len() <= 1 {
        return Ok(order.to_vec());
    }
    let (left, right) = order.split_at(order.len() / 2);
    let (left, right) = (merge_sort(left, before)?, merge_sort(right, before)?);
    let mut merged = Vec::with_capacity(order.len());
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        if before(right[j], left[i])? {
            merged.push(right[j]);
            j += 1;
        } else {
            merged.push(left[i]);
            i += 1;
        }
    }
    merged.extend_from_slice(&left[i..]);
    merged.extend_from_slice(&right[j..]);
    Ok(merged)
}

fn round_int(x: i64, ndigits: i64) -> EngineResult<i64> {
    if ndigits >= 0 {
        return Ok(x);
    }
    let Some(unit) = u32::try_from(ndigits.unsigned_abs()).ok().and_then(|p| 10i64.checked_pow(p)) else {
        return Ok(0);
    };
    let rem = x.rem_euclid(unit);
    let base = x.checked_sub(rem).ok_or_else(|| runtime("integer overflow"))?;
    let halfway = rem.checked_mul(2).ok_or_else(|| runtime("integer overflow"))?;
    let round_up = halfway > unit || (halfway == unit && (base / unit) % 2 != 0);
    if round_up {
        base.checked_add(unit).ok_or_else(|| runtime("integer overflow"))
    } else {
        Ok(base)
    }
}

fn pairs_into(map: &mut IndexMap<Key, Value>, source: &Value) -> EngineResult<()> {
    if let Value::Dict(other) = source {
        let entries = other.borrow().clone();
        map.extend(entries);
        return Ok(());
    }
    for (i, item) in source.iterate()?.into_iter().enumerate() {
        let pair = item.iterate()?;
        let [key, value] = <[Value; 2]>::try_from(pair).map_err(|pair| {
            runtime(format!("dictionary update sequence element #{i} has length {}; 2 is required", pair.len()))
        })?;
        map.insert(key.to_key()?, value);
    }
    Ok(())
}

fn key_error(key: &Value) -> EngineError {
    runtime(format!("KeyError: {}", key.repr().unwrap_or_default()))
}

impl Interpreter {
    fn sorted(&mut self, items: Vec<Value>, key: Option<&Value>, reverse: bool) -> EngineResult<Vec<Value>> {
        let keys = match key {
            Some(f) if !matches!(f, Value::None) => {
                items.iter().map(|v| self.call(f, vec![v.clone()], Vec::new())).collect::<EngineResult<Vec<_>>>()?
            }
            _ => items.clone(),
        };
        let before = |a: usize, b: usize| if reverse { less(&keys[b], &keys[a]) } else { less(&keys[a], &keys[b]) };
        let indices: Vec<usize> = (0..items.len()).collect();
        let order = merge_sort(&indices, &before)?;
        Ok(order.into_iter().map(|i| items[i].clone()).collect())
    }

    fn extreme(&mut self, name: &str, args: Vec<Value>, mut kwargs: Kwargs<'_>, want: Ordering) -> EngineResult<Value> {
        expect_args(name, &args, 1, usize::MAX)?;
        let key = kwargs.take("key").filter(|k| !matches!(k, Value::None));
        let default = kwargs.take("default");
        kwargs.finish()?;
        let candidates = if args.len() == 1 { args[0].iterate()? } else { args };
        let mut best: Option<(Value, Value)> = None;
        for candidate in candidates {
            let rank = match &key {
                Some(f) => self.call(f, vec![candidate.clone()], Vec::new())?,
                None => candidate.clone(),
            };
            let replace = match &best {
                None => true,
                Some((_, best_rank)) => rank.py_cmp(best_rank, if want == Ordering::Greater { ">" } else { "<" })? == Some(want),
            };
            if replace {
                best = Some((candidate, rank));
            }
        }
        match (best, default) {
            (Some((value, _)), _) => Ok(value),
            (None, Some(default)) => Ok(default),
            (None, None) => Err(runtime(format!("{name}() arg is an empty sequence"))),
        }
    }

    pub(crate) fn call_builtin(
        &mut self,
        builtin: Builtin,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> EngineResult<Value> {
        let name = builtin.name();
        let mut kwargs = Kwargs::new(name, kwargs);
        match builtin {
            Builtin::Submit => self.submit(&args, &kwargs.entries),
            Builtin::Print => {
                let sep = kwargs.take("sep").filter(|v| !matches!(v, Value::None));
                let end = kwargs.take("end").filter(|v| !matches!(v, Value::None));
                kwargs.finish()?;
                let sep = sep.as_ref().map_or(Ok(" "), |v| text(name, v))?.to_owned();
                let end = end.as_ref().map_or(Ok("\n"), |v| text(name, v))?.to_owned();
                let mut line = String::new();
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        line.push_str(&sep);
                    }
                    line.push_str(&arg.to_text()?);
                }
                line.push_str(&end);
                self.print(&line);
                Ok(Value::None)
            }
            Builtin::Max => self.extreme(name, args, kwargs, Ordering::Greater),
            Builtin::Min => self.extreme(name, args, kwargs, Ordering::Less),
            Builtin::Sorted => {
                expect_args(name, &args, 1, 1)?;
                let key = kwargs.take("key");
                let reverse = kwargs.take("reverse").is_some_and(|v| v.truthy());
                kwargs.finish()?;
                let items = args[0].iterate()?;
                Ok(Value::list(self.sorted(items, key.as_ref(), reverse)?))
            }
            Builtin::Dict => {
                expect_args(name, &args, 0, 1)?;
                let mut map = IndexMap::new();
                if let Some(source) = args.first() {
                    pairs_into(&mut map, source)?;
                }
                for (key, value) in kwargs.entries {
                    map.insert(Key::Str(key.into()), value);
                }
                Ok(Value::dict(map))
            }
            Builtin::Enumerate => {
                expect_args(name, &args, 1, 2)?;
                let start = match kwargs.take("start").or_else(|| args.get(1).cloned()) {
                    Some(v) => v.as_index()?,
                    None => 0,
                };
                kwargs.finish()?;
                let items = args[0].iterate()?;
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    let n = i64::try_from(i).ok().and_then(|i| start.checked_add(i)).ok_or_else(|| runtime("integer overflow"))?;
                    out.push(Value::tuple(vec![Value::Int(n), item]));
                }
                Ok(Value::list(out))
            }
            Builtin::Sum => {
                expect_args(name, &args, 1, 2)?;
                let start = kwargs.take("start").or_else(|| args.get(1).cloned()).unwrap_or(Value::Int(0));
                kwargs.finish()?;
                if matches!(start, Value::Str(_)) {
                    return Err(runtime("sum() can't sum strings [use ''.join(seq) instead]"));
                }
                let mut total = start;
                for item in args[0].iterate()? {
                    total = binary(BinOp::Add, &total, &item)?;
                }
                Ok(total)
            }
            Builtin::Round => {
                expect_args(name, &args, 1, 2)?;
                let ndigits = kwargs.take("ndigits").or_else(|| args.get(1).cloned()).filter(|v| !matches!(v, Value::None));
                kwargs.finish()?;
                let x = number(name, &args[0])?;
                match (x, ndigits) {
                    (Num::Int(i), None) => Ok(Value::Int(i)),
                    (Num::Float(f), None) => Ok(Value::Int(float_to_int(f.round_ties_even())?)),
                    (Num::Int(i), Some(n)) => Ok(Value::Int(round_int(i, n.as_index()?)?)),
                    (Num::Float(f), Some(n)) => {
                        let n = i32::try_from(n.as_index()?.clamp(-308, 308)).unwrap_or(0);
                        let factor = 10f64.powi(n);
                        let scaled = f * factor;
                        if !scaled.is_finite() || !factor.is_finite() || factor == 0.0 {
                            return Ok(Value::Float(f));
                        }
                        Ok(Value::Float(scaled.round_ties_even() / factor))
                    }
                }
            }
            other => {
                kwargs.finish()?;
                self.call_simple(other, &args)
            }
        }
    }

    /// Builtins that take positional arguments only.
    fn call_simple(&mut self, builtin: Builtin, args: &[Value]) -> EngineResult<Value> {
        let name = builtin.name();
        match builtin {
            Builtin::Abs => {
                expect_args(name, args, 1, 1)?;
                match args[0].as_num() {
                    Some(Num::Int(i)) => i.checked_abs().map(Value::Int).ok_or_else(|| runtime("integer overflow")),
                    Some(Num::Float(f)) => Ok(Value::Float(f.abs())),
                    None => Err(runtime(format!("bad operand type for abs(): '{}'", args[0].type_name()))),
                }
            }
            Builtin::All | Builtin::Any => {
                expect_args(name, args, 1, 1)?;
                let items = args[0].iterate()?;
                Ok(Value::Bool(if builtin == Builtin::All {
                    items.iter().all(Value::truthy)
                } else {
                    items.iter().any(Value::truthy)
                }))
            }
            Builtin::Bool => {
                expect_args(name, args, 0, 1)?;
                Ok(Value::Bool(args.first().is_some_and(Value::truthy)))
            }
            Builtin::Float => {
                expect_args(name, args, 0, 1)?;
                match args.first() {
                    None => Ok(Value::Float(0.0)),
                    Some(Value::Str(s)) => s
                        .trim()
                        .parse::<f64>()
                        .map(Value::Float)
                        .map_err(|_| runtime(format!("could not convert string to float: {}", quote_repr(s)))),
                    Some(v) => Ok(Value::Float(number(name, v)?.as_f64())),
                }
            }
            Builtin::Int => {
                expect_args(name, args, 0, 1)?;
                match args.first() {
                    None => Ok(Value::Int(0)),
                    Some(Value::Str(s)) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
                        runtime(format!("invalid literal for int() with base 10: {}", quote_repr(s)))
                    }),
                    Some(v) => match number(name, v)? {
                        Num::Int(i) => Ok(Value::Int(i)),
                        Num::Float(f) => Ok(Value::Int(float_to_int(f)?)),
                    },
                }
            }
            Builtin::Len => {
                expect_args(name, args, 1, 1)?;
                let len = args[0].len()?;
                Ok(Value::Int(i64::try_from(len).map_err(|_| runtime("integer overflow"))?))
            }
            Builtin::List | Builtin::Tuple => {
                expect_args(name, args, 0, 1)?;
                let items = match args.first() {
                    Some(v) => v.iterate()?,
                    None => Vec::new(),
                };
                Ok(if builtin == Builtin::List { Value::list(items) } else { Value::tuple(items) })
            }
            Builtin::Range => {
                expect_args(name, args, 1, 3)?;
                let ints = args.iter().map(Value::as_index).collect::<EngineResult<Vec<_>>>()?;
                let range = match ints.as_slice() {
                    [stop] => Range::new(0, *stop, 1)?,
                    [start, stop] => Range::new(*start, *stop, 1)?,
                    [start, stop, step] => Range::new(*start, *stop, *step)?,
                    _ => return Err(runtime("range expected at most 3 arguments")),
                };
                Ok(Value::Range(range))
            }
            Builtin::Reversed => {
                expect_args(name, args, 1, 1)?;
                let mut items = args[0].iterate()?;
                items.reverse();
                Ok(Value::list(items))
            }
            Builtin::Str => {
                expect_args(name, args, 0, 1)?;
                Ok(Value::str(&args.first().map_or(Ok(String::new()), Value::to_text)?))
            }
            Builtin::Zip => {
                let columns = args.iter().map(Value::iterate).collect::<EngineResult<Vec<_>>>()?;
                let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
                Ok(Value::list((0..rows).map(|r| Value::tuple(columns.iter().map(|c| c[r].clone()).collect())).collect()))
            }
            Builtin::MathSqrt => {
                expect_args(name, args, 1, 1)?;
                let x = number(name, &args[0])?.as_f64();
                if x < 0.0 {
                    return Err(runtime("math domain error"));
                }
                Ok(Value::Float(x.sqrt()))
            }
            Builtin::MathFloor | Builtin::MathCeil => {
                expect_args(name, args, 1, 1)?;
                match number(name, &args[0])? {
                    Num::Int(i) => Ok(Value::Int(i)),
                    Num::Float(f) => {
                        let rounded = if builtin == Builtin::MathFloor { f.floor() } else { f.ceil() };
                        Ok(Value::Int(float_to_int(rounded)?))
                    }
                }
            }
            Builtin::MathFabs => {
                expect_args(name, args, 1, 1)?;
                Ok(Value::Float(number(name, &args[0])?.as_f64().abs()))
            }
            Builtin::MathPow => {
                expect_args(name, args, 2, 2)?;
                let (x, y) = (number(name, &args[0])?.as_f64(), number(name, &args[1])?.as_f64());
                if x == 0.0 && y < 0.0 {
                    return Err(runtime("math domain error"));
                }
                Ok(Value::Float(x.powf(y)))
            }
            Builtin::Submit
            | Builtin::Print
            | Builtin::Max
            | Builtin::Min
            | Builtin::Sorted
            | Builtin::Dict
            | Builtin::Enumerate
            | Builtin::Sum
            | Builtin::Round => Err(runtime(format!("{name}() cannot be called here"))),
        }
    }

    // ── Methods ──────────────────────────────────────────────────────────────

    pub(crate) fn call_method(
        &mut self,
        receiver: &Value,
        method: &str,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> EngineResult<Value> {
        let qualified = format!("{}.{method}", receiver.type_name());
        let mut kwargs = Kwargs::new(&qualified, kwargs);
        match receiver {
            Value::List(items) if method == "sort" => {
                expect_args(&qualified, &args, 0, 0)?;
                let key = kwargs.take("key");
                let reverse = kwargs.take("reverse").is_some_and(|v| v.truthy());
                kwargs.finish()?;
                let snapshot = items.borrow().clone();
                let sorted = self.sorted(snapshot, key.as_ref(), reverse)?;
                *items.borrow_mut() = sorted;
                Ok(Value::None)
            }
            Value::List(items) => {
                kwargs.finish()?;
                list_method(items, method, &qualified, &args)
            }
            Value::Str(s) => {
                kwargs.finish()?;
                str_method(s, method, &qualified, &args)
            }
            Value::Dict(map) => {
                kwargs.finish()?;
                dict_method(map, method, &qualified, &args)
            }
            other => Err(runtime(format!("'{}' object has no attribute '{method}'", other.type_name()))),
        }
    }
}

fn quote_repr(s: &str) -> String {
    Value::str(s).repr().unwrap_or_default()
}

fn list_method(items: &ListRef, method: &str, name: &str, args: &[Value]) -> EngineResult<Value> {
    match method {
        "append" => {
            expect_args(name, args, 1, 1)?;
            check_len(items.borrow().len() + 1)?;
            items.borrow_mut().push(args[0].clone());
            Ok(Value::None)
        }
        "extend" => {
            expect_args(name, args, 1, 1)?;
            let extra = args[0].iterate()?;
            check_len(items.borrow().len() + extra.len())?;
            items.borrow_mut().extend(extra);
            Ok(Value::None)
        }
        "insert" => {
            expect_args(name, args, 2, 2)?;
            let mut items = items.borrow_mut();
            check_len(items.len() + 1)?;
            let len = i64::try_from(items.len()).unwrap_or(i64::MAX);
            let raw = args[0].as_index()?;
            let at = if raw < 0 { (raw + len).max(0) } else { raw.min(len) };
            items.insert(usize::try_from(at).unwrap_or(0), args[1].clone());
            Ok(Value::None)
        }
        "pop" => {
            expect_args(name, args, 0, 1)?;
            let mut items = items.borrow_mut();
            if items.is_empty() {
                return Err(runtime("pop from empty list"));
            }
            let len = i64::try_from(items.len()).unwrap_or(i64::MAX);
            let raw = args.first().map_or(Ok(-1), Value::as_index)?;
            let at = if raw < 0 { raw + len } else { raw };
            if !(0..len).contains(&at) {
                return Err(runtime("pop index out of range"));
            }
            Ok(items.remove(usize::try_from(at).unwrap_or(0)))
        }
        "index" | "count" | "remove" => {
            expect_args(name, args, 1, 1)?;
            let snapshot = items.borrow().clone();
            let mut hits = Vec::new();
            for (i, item) in snapshot.iter().enumerate() {
                if item.py_eq(&args[0])? {
                    hits.push(i);
                }
            }
            match (method, hits.first()) {
                ("count", _) => Ok(Value::Int(i64::try_from(hits.len()).unwrap_or(i64::MAX))),
                ("index", Some(&i)) => Ok(Value::Int(i64::try_from(i).unwrap_or(i64::MAX))),
                ("remove", Some(&i)) => {
                    items.borrow_mut().remove(i);
                    Ok(Value::None)
                }
                ("index", None) => Err(runtime(format!("{} is not in list", args[0].repr()?))),
                _ => Err(runtime("list.remove(x): x not in list")),
            }
        }
        "reverse" => {
            expect_args(name, args, 0, 0)?;
            items.borrow_mut().reverse();
            Ok(Value::None)
        }
        "copy" => {
            expect_args(name, args, 0, 0)?;
            Ok(Value::list(items.borrow().clone()))
        }
        "clear" => {
            expect_args(name, args, 0, 0)?;
            items.borrow_mut().clear();
            Ok(Value::None)
        }
        _ => Err(runtime(format!("'list' object has no attribute '{method}'"))),
    }
}

fn split_whitespace(s: &str, maxsplit: i64) -> Vec<Value> {
    let mut parts = Vec::new();
    let mut rest = s.trim_start();
    while !rest.is_empty() {
        if usize::try_from(maxsplit).is_ok_and(|m| parts.len() == m) {
            parts.push(Value::str(rest));
            break;
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        parts.push(Value::str(&rest[..end]));
        rest = rest[end..].trim_start();
    }
    parts
}

fn str_method(s: &Rc<str>, method: &str, name: &str, args: &[Value]) -> EngineResult<Value> {
    let arg_text = |i: usize| text(name, &args[i]);
    match method {
        "upper" | "lower" | "capitalize" | "title" | "isdigit" | "isalpha" => {
            expect_args(name, args, 0, 0)?;
            Ok(match method {
                "upper" => Value::str(&s.to_uppercase()),
                "lower" => Value::str(&s.to_lowercase()),
                "isdigit" => Value::Bool(!s.is_empty() && s.chars().all(char::is_numeric)),
                "isalpha" => Value::Bool(!s.is_empty() && s.chars().all(char::is_alphabetic)),
                "capitalize" => {
                    let mut chars = s.chars();
                    let head = chars.next().map(|c| c.to_uppercase().collect::<String>()).unwrap_or_default();
                    Value::str(&(head + &chars.as_str().to_lowercase()))
                }
                _ => {
                    let mut out = String::with_capacity(s.len());
                    let mut in_word = false;
                    for c in s.chars() {
                        if in_word {
                            out.extend(c.to_lowercase());
                        } else {
                            out.extend(c.to_uppercase());
                        }
                        in_word = c.is_alphabetic();
                    }
                    Value::str(&out)
                }
            })
        }
        "strip" | "lstrip" | "rstrip" => {
            expect_args(name, args, 0, 1)?;
            let chars: Option<Vec<char>> = match args.first() {
                None | Some(Value::None) => None,
                Some(v) => Some(text(name, v)?.chars().collect()),
            };
            let matcher = |c: char| chars.as_ref().map_or(c.is_whitespace(), |set| set.contains(&c));
            let out = match method {
                "strip" => s.trim_matches(matcher),
                "lstrip" => s.trim_start_matches(matcher),
                _ => s.trim_end_matches(matcher),
            };
            Ok(Value::str(out))
        }
        "split" => {
            expect_args(name, args, 0, 2)?;
            let maxsplit = args.get(1).map_or(Ok(-1), Value::as_index)?;
            match args.first() {
                None | Some(Value::None) => Ok(Value::list(split_whitespace(s, maxsplit))),
                Some(sep) => {
                    let sep = text(name, sep)?;
                    if sep.is_empty() {
                        return Err(runtime("empty separator"));
                    }
                    let parts: Vec<Value> = match usize::try_from(maxsplit) {
                        Ok(m) => s.splitn(m.saturating_add(1), sep).map(Value::str).collect(),
                        Err(_) => s.split(sep).map(Value::str).collect(),
                    };
                    Ok(Value::list(parts))
                }
            }
        }
        "join" => {
            expect_args(name, args, 1, 1)?;
            let items = args[0].iterate()?;
            let mut pieces = Vec::with_capacity(items.len());
            let mut total = 0usize;
            for (i, item) in items.iter().enumerate() {
                let Value::Str(piece) = item else {
                    return Err(runtime(format!(
                        "sequence item {i}: expected str instance, {} found",
                        item.type_name()
                    )));
                };
                total = total.saturating_add(piece.len() + s.len());
                check_len(total)?;
                pieces.push(&**piece);
            }
            Ok(Value::str(&pieces.join(&**s)))
        }
        "replace" => {
            expect_args(name, args, 2, 3)?;
            let (old, new) = (arg_text(0)?, arg_text(1)?);
            let limit = args.get(2).map_or(Ok(-1), Value::as_index)?;
            let hits = s.matches(old).count();
            let hits = usize::try_from(limit).map_or(hits, |l| hits.min(l));
            check_len(s.len().saturating_add(hits.saturating_mul(new.len())))?;
            Ok(Value::str(&s.replacen(old, new, hits)))
        }
        "startswith" | "endswith" => {
            expect_args(name, args, 1, 1)?;
            let candidates = match &args[0] {
                Value::Tuple(items) => items.to_vec(),
                other => vec![other.clone()],
            };
            for candidate in &candidates {
                let affix = text(name, candidate)?;
                let hit = if method == "startswith" { s.starts_with(affix) } else { s.ends_with(affix) };
                if hit {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        "count" => {
            expect_args(name, args, 1, 1)?;
            let sub = arg_text(0)?;
            let n = if sub.is_empty() { s.chars().count() + 1 } else { s.matches(sub).count() };
            Ok(Value::Int(i64::try_from(n).unwrap_or(i64::MAX)))
        }
        "find" => {
            expect_args(name, args, 1, 1)?;
            let found = s.find(arg_text(0)?).map_or(-1, |byte| i64::try_from(s[..byte].chars().count()).unwrap_or(-1));
            Ok(Value::Int(found))
        }
        _ => Err(runtime(format!("'str' object has no attribute '{method}'"))),
    }
}

fn dict_method(map: &DictRef, method: &str, name: &str, args: &[Value]) -> EngineResult<Value> {
    match method {
        "get" => {
            expect_args(name, args, 1, 2)?;
            let found = map.borrow().get(&args[0].to_key()?).cloned();
            Ok(found.or_else(|| args.get(1).cloned()).unwrap_or(Value::None))
        }
        "keys" => {
            expect_args(name, args, 0, 0)?;
            Ok(Value::list(map.borrow().keys().map(Key::to_value).collect()))
        }
        "values" => {
            expect_args(name, args, 0, 0)?;
            Ok(Value::list(map.borrow().values().cloned().collect()))
        }
        "items" => {
            expect_args(name, args, 0, 0)?;
            let entries = map.borrow();
            Ok(Value::list(entries.iter().map(|(k, v)| Value::tuple(vec![k.to_value(), v.clone()])).collect()))
        }
        "pop" => {
            expect_args(name, args, 1, 2)?;
            let removed = map.borrow_mut().shift_remove(&args[0].to_key()?);
            removed.or_else(|| args.get(1).cloned()).ok_or_else(|| key_error(&args[0]))
        }
        "setdefault" => {
            expect_args(name, args, 1, 2)?;
            let key = args[0].to_key()?;
            let default = args.get(1).cloned().unwrap_or(Value::None);
            Ok(map.borrow_mut().entry(key).or_insert(default).clone())
        }
        "update" => {
            expect_args(name, args, 1, 1)?;
            let mut incoming = IndexMap::new();
            pairs_into(&mut incoming, &args[0])?;
            map.borrow_mut().extend(incoming);
            Ok(Value::None)
        }
        "copy" => {
            expect_args(name, args, 0, 0)?;
            Ok(Value::dict(map.borrow().clone()))
        }
        "clear" => {
            expect_args(name, args, 0, 0)?;
            map.borrow_mut().clear();
            Ok(Value::None)
        }
        _ => Err(runtime(format!("'dict' object has no attribute '{method}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_sort_is_stable() {
        let keys = [2, 1, 2, 1];
        let before = |a: usize, b: usize| Ok(keys[a] < keys[b]);
        assert_eq!(merge_sort(&[0, 1, 2, 3], &before).ok(), Some(vec![1, 3, 0, 2]));
    }

    #[test]
    fn merge_sort_propagates_comparison_errors() {
        let before = |_: usize, _: usize| Err(runtime("incomparable"));
        assert!(merge_sort(&[0, 1], &before).is_err());
        assert!(merge_sort(&[0], &before).is_ok());
    }

    #[test]
    fn integer_rounding_uses_bankers_rule() {
        assert_eq!(round_int(25, -1).ok(), Some(20));
        assert_eq!(round_int(35, -1).ok(), Some(40));
        assert_eq!(round_int(-25, -1).ok(), Some(-20));
        assert_eq!(round_int(1234, 2).ok(), Some(1234));
    }

    #[test]
    fn whitespace_split_honours_maxsplit() {
        let parts = split_whitespace("  a b  c ", 1);
        let texts: Vec<String> = parts.iter().filter_map(|v| v.to_text().ok()).collect();
        assert_eq!(texts, vec!["a", "b  c "]);
    }

    #[test]
    fn only_documented_names_are_global() {
        for forbidden in ["open", "eval", "exec", "getattr", "__import__", "compile", "input", "globals"] {
            assert!(Builtin::global(forbidden).is_none(), "{forbidden} must not be a builtin");
        }
        assert!(Builtin::global("submit_answers").is_none(), "the capability is injected, not builtin");
        assert_eq!(Builtin::global("len").map(Builtin::name), Some("len"));
    }
}
