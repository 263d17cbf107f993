//! Recursive-descent parser. Applies the restricted-subset policy as it goes,
//! so a program that parses has already passed every compile-time check.

use std::rc::Rc;

use crate::ast::{BinOp, CmpOp, Const, Expr, FunctionDef, Stmt, StmtKind, Target, UnaryOp};
use crate::error::{EngineError, EngineResult};
use crate::lexer::{tokenize, Tok, Token};
use crate::policy;

/// A checked program, ready to run.
#[derive(Debug, Clone)]
pub struct Program {
    pub(crate) body: Vec<Stmt>,
}

/// Tokenises, parses and policy-checks `source`.
pub(crate) fn parse(source: &str) -> EngineResult<Program> {
    if source.len() > policy::MAX_SOURCE_BYTES {
        return Err(EngineError::compile(
            1,
            format!("source is too large ({} bytes, limit {})", source.len(), policy::MAX_SOURCE_BYTES),
        ));
    }
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0, depth: 0, links: 0, loops: 0, functions: 0 };
    let mut body = Vec::new();
    while !parser.at(&Tok::Eof) {
        if parser.eat(&Tok::Newline) {
            continue;
        }
        parser.statement(&mut body)?;
    }
    Ok(Program { body })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    /// Operator links of the chains currently open on the parse stack.
    links: usize,
    /// Enclosing loops in the current function body.
    loops: usize,
    functions: usize,
}

impl Parser {
    // ── Token helpers ────────────────────────────────────────────────────────

    fn peek(&self) -> &Tok {
        self.tokens.get(self.pos).map_or(&Tok::Eof, |t| &t.tok)
    }

    fn peek_second(&self) -> &Tok {
        self.tokens.get(self.pos + 1).map_or(&Tok::Eof, |t| &t.tok)
    }

    fn line(&self) -> usize {
        self.tokens.get(self.pos).or_else(|| self.tokens.last()).map_or(1, |t| t.line)
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn at(&self, tok: &Tok) -> bool {
        self.peek() == tok
    }

    fn at_op(&self, op: &str) -> bool {
        matches!(self.peek(), Tok::Op(o) if *o == op)
    }

    fn at_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Tok::Name(n) if n == kw)
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.at(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.at_op(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.at_keyword(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error<T>(&self, message: impl Into<String>) -> EngineResult<T> {
        Err(EngineError::compile(self.line(), message))
    }

    fn syntax_error<T>(&self) -> EngineResult<T> {
        let near = match self.peek() {
            Tok::Name(n) => format!("'{n}'"),
            Tok::Int(i) => i.to_string(),
            Tok::Float(f) => f.to_string(),
            Tok::Str(_) => "string literal".to_owned(),
            Tok::Op(o) => format!("'{o}'"),
            Tok::Newline => "end of line".to_owned(),
            Tok::Indent => "indent".to_owned(),
            Tok::Dedent => "dedent".to_owned(),
            Tok::Eof => "end of input".to_owned(),
        };
        self.error(format!("invalid syntax near {near}"))
    }

    fn expect_op(&mut self, op: &str) -> EngineResult<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            self.error(format!("invalid syntax: expected '{op}'"))
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> EngineResult<()> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            self.error(format!("invalid syntax: expected '{kw}'"))
        }
    }

    /// Consumes an identifier that is neither reserved nor policy-forbidden.
    fn identifier(&mut self) -> EngineResult<String> {
        match self.peek().clone() {
            Tok::Name(name) if !policy::is_keyword(&name) => {
                policy::check_name(&name).or_else(|m| self.error(m))?;
                self.pos += 1;
                Ok(name)
            }
            _ => self.syntax_error(),
        }
    }

    fn enter(&mut self) -> EngineResult<()> {
        self.depth += 1;
        if self.depth > policy::MAX_NESTING {
            return self.error("code is nested too deeply");
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Records one more link in a left-associative chain. Each link deepens
    /// the tree the interpreter will walk recursively.
    fn link(&mut self) -> EngineResult<()> {
        self.links += 1;
        if self.depth + self.links > policy::MAX_EXPR_DEPTH {
            return self.error("expression is too long or too deeply nested");
        }
        Ok(())
    }

    // ── Statements ───────────────────────────────────────────────────────────

    /// Parses one statement line into `out`. A line of `;`-separated small
    /// statements contributes several.
    fn statement(&mut self, out: &mut Vec<Stmt>) -> EngineResult<()> {
        let line = self.line();
        let kind = match self.peek().clone() {
            Tok::Name(w) if policy::UNSUPPORTED_KEYWORDS.contains(&w.as_str()) => {
                return self.error(format!("'{w}' statements are not supported"));
            }
            Tok::Name(w) if w == "if" => self.if_statement()?,
            Tok::Name(w) if w == "while" => {
                self.advance();
                let cond = self.expr()?;
                let body = self.loop_body()?;
                StmtKind::While { cond, body }
            }
            Tok::Name(w) if w == "for" => {
                self.advance();
                let target = self.target_list()?;
                self.expect_keyword("in")?;
                let iter = self.expr_list()?;
                let body = self.loop_body()?;
                StmtKind::For { target, iter, body }
            }
            Tok::Name(w) if w == "def" => self.def_statement()?,
            Tok::Indent => return self.error("unexpected indent"),
            _ => return self.simple_statement(out),
        };
        out.push(Stmt { line, kind });
        Ok(())
    }

    fn if_statement(&mut self) -> EngineResult<StmtKind> {
        self.advance();
        let mut branches = vec![(self.expr()?, self.block()?)];
        let mut orelse = Vec::new();
        loop {
            if self.eat_keyword("elif") {
                branches.push((self.expr()?, self.block()?));
            } else if self.eat_keyword("else") {
                orelse = self.block()?;
                break;
            } else {
                break;
            }
        }
        Ok(StmtKind::If { branches, orelse })
    }

    fn def_statement(&mut self) -> EngineResult<StmtKind> {
        self.advance();
        let name = self.identifier()?;
        self.expect_op("(")?;
        let mut params = Vec::new();
        let mut defaults = Vec::new();
        while !self.at_op(")") {
            if self.at_op("*") || self.at_op("**") {
                return self.error("variadic parameters are not supported");
            }
            let param = self.identifier()?;
            if params.contains(&param) {
                return self.error(format!("duplicate argument '{param}' in function definition"));
            }
            params.push(param);
            if self.eat_op("=") {
                defaults.push(self.expr()?);
            } else if !defaults.is_empty() {
                return self.error("non-default argument follows default argument");
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(")")?;
        if self.at_op("-") {
            return self.error("return annotations are not supported");
        }
        let enclosing_loops = std::mem::take(&mut self.loops);
        self.functions += 1;
        let body = self.block();
        self.functions -= 1;
        self.loops = enclosing_loops;
        let body = body?;
        Ok(StmtKind::Def(Rc::new(FunctionDef { name, params, defaults, body })))
    }

    fn loop_body(&mut self) -> EngineResult<Vec<Stmt>> {
        self.loops += 1;
        let body = self.block();
        self.loops -= 1;
        body
    }

    /// `:` followed by either an indented suite or statements on the same line.
    fn block(&mut self) -> EngineResult<Vec<Stmt>> {
        self.expect_op(":")?;
        self.enter()?;
        let mut body = Vec::new();
        if self.eat(&Tok::Newline) {
            if !self.eat(&Tok::Indent) {
                return self.error("expected an indented block");
            }
            while !self.eat(&Tok::Dedent) {
                if self.at(&Tok::Eof) {
                    break;
                }
                if self.eat(&Tok::Newline) {
                    continue;
                }
                self.statement(&mut body)?;
            }
        } else {
            self.simple_statement(&mut body)?;
        }
        self.leave();
        Ok(body)
    }

    /// One line of `;`-separated small statements.
    fn simple_statement(&mut self, out: &mut Vec<Stmt>) -> EngineResult<()> {
        out.push(self.small_statement()?);
        while self.eat_op(";") {
            if self.at(&Tok::Newline) || self.at(&Tok::Eof) {
                break;
            }
            out.push(self.small_statement()?);
        }
        if !self.eat(&Tok::Newline) && !self.at(&Tok::Eof) && !self.at(&Tok::Dedent) {
            return self.syntax_error();
        }
        Ok(())
    }

    fn small_statement(&mut self) -> EngineResult<Stmt> {
        let line = self.line();
        if let Tok::Name(word) = self.peek() {
            if policy::UNSUPPORTED_KEYWORDS.contains(&word.as_str()) {
                return self.error(format!("'{word}' statements are not supported"));
            }
        }
        let kind = if self.eat_keyword("pass") {
            StmtKind::Pass
        } else if self.at_keyword("break") || self.at_keyword("continue") {
            if self.loops == 0 {
                return self.error(format!("'{}' outside loop", if self.at_keyword("break") { "break" } else { "continue" }));
            }
            if self.eat_keyword("break") {
                StmtKind::Break
            } else {
                self.advance();
                StmtKind::Continue
            }
        } else if self.at_keyword("return") {
            if self.functions == 0 {
                return self.error("'return' outside function");
            }
            self.advance();
            if self.at(&Tok::Newline) || self.at(&Tok::Eof) || self.at_op(";") || self.at(&Tok::Dedent) {
                StmtKind::Return(None)
            } else {
                StmtKind::Return(Some(self.expr_list()?))
            }
        } else if self.at_keyword("import") {
            self.import_statement()?
        } else if self.at_keyword("from") {
            self.from_import_statement()?
        } else {
            self.assignment_or_expr()?
        };
        Ok(Stmt { line, kind })
    }

    fn module_name(&mut self) -> EngineResult<String> {
        if self.at_op(".") {
            return self.error("relative imports are not supported");
        }
        let Tok::Name(first) = self.advance() else { return self.syntax_error() };
        let mut module = first;
        while self.eat_op(".") {
            let Tok::Name(part) = self.advance() else { return self.syntax_error() };
            module.push('.');
            module.push_str(&part);
        }
        policy::check_import(&module).or_else(|m| self.error(m))?;
        Ok(module)
    }

    fn import_statement(&mut self) -> EngineResult<StmtKind> {
        self.advance();
        let module = self.module_name()?;
        let alias = if self.eat_keyword("as") { self.identifier()? } else { module.clone() };
        if self.at_op(",") {
            return self.error("import one module per statement");
        }
        Ok(StmtKind::Import { module, alias })
    }

    fn from_import_statement(&mut self) -> EngineResult<StmtKind> {
        self.advance();
        let module = self.module_name()?;
        self.expect_keyword("import")?;
        if self.at_op("*") {
            return self.error("wildcard imports are not supported");
        }
        let parenthesised = self.eat_op("(");
        let mut names = Vec::new();
        loop {
            let name = self.identifier()?;
            let alias = if self.eat_keyword("as") { self.identifier()? } else { name.clone() };
            names.push((name, alias));
            if !self.eat_op(",") || (parenthesised && self.at_op(")")) {
                break;
            }
        }
        if parenthesised {
            self.expect_op(")")?;
        }
        Ok(StmtKind::ImportFrom { module, names })
    }

    fn assignment_or_expr(&mut self) -> EngineResult<StmtKind> {
        let first = self.expr_list()?;

        let aug = match self.peek() {
            Tok::Op("+=") => Some(BinOp::Add),
            Tok::Op("-=") => Some(BinOp::Sub),
            Tok::Op("*=") => Some(BinOp::Mul),
            Tok::Op("/=") => Some(BinOp::Div),
            Tok::Op("//=") => Some(BinOp::FloorDiv),
            Tok::Op("%=") => Some(BinOp::Mod),
            Tok::Op("**=") => Some(BinOp::Pow),
            _ => None,
        };
        if let Some(op) = aug {
            self.advance();
            let target = self.to_target(first)?;
            if matches!(target, Target::Unpack(_)) {
                return self.error("illegal expression for augmented assignment");
            }
            let value = self.expr_list()?;
            return Ok(StmtKind::AugAssign { target, op, value });
        }

        if !self.at_op("=") {
            return Ok(StmtKind::Expr(first));
        }
        let mut exprs = vec![first];
        while self.eat_op("=") {
            exprs.push(self.expr_list()?);
        }
        let value = exprs.pop().unwrap_or(Expr::Const(Const::None));
        let targets = exprs.into_iter().map(|e| self.to_target(e)).collect::<EngineResult<Vec<_>>>()?;
        Ok(StmtKind::Assign { targets, value })
    }

    fn to_target(&self, expr: Expr) -> EngineResult<Target> {
        match expr {
            Expr::Name(name) => Ok(Target::Name(name)),
            Expr::Subscript { value, index } => Ok(Target::Subscript { value, index }),
            Expr::Tuple(items) | Expr::List(items) => {
                let targets = items.into_iter().map(|e| self.to_target(e)).collect::<EngineResult<Vec<_>>>()?;
                Ok(Target::Unpack(targets))
            }
            Expr::Attribute { .. } => self.error("attribute assignment is not supported"),
            Expr::Slice { .. } => self.error("slice assignment is not supported"),
            _ => self.error("cannot assign to expression"),
        }
    }

    /// Targets of a `for` loop or comprehension: names, optionally unpacked.
    fn target_list(&mut self) -> EngineResult<Target> {
        let first = self.arith()?;
        if !self.at_op(",") {
            return self.to_target(first);
        }
        let mut items = vec![self.to_target(first)?];
        while self.eat_op(",") {
            if self.at_keyword("in") {
                break;
            }
            let item = self.arith()?;
            items.push(self.to_target(item)?);
        }
        Ok(Target::Unpack(items))
    }

    // ── Expressions ──────────────────────────────────────────────────────────

    /// `a, b, c` forms a tuple; a single expression stays itself.
    fn expr_list(&mut self) -> EngineResult<Expr> {
        let first = self.expr()?;
        if !self.at_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.starts_expression() {
                items.push(self.expr()?);
            } else {
                break;
            }
        }
        Ok(Expr::Tuple(items))
    }

    fn starts_expression(&self) -> bool {
        match self.peek() {
            Tok::Int(_) | Tok::Float(_) | Tok::Str(_) => true,
            Tok::Name(n) => !policy::is_keyword(n) || matches!(n.as_str(), "True" | "False" | "None" | "not"),
            Tok::Op(o) => matches!(*o, "(" | "[" | "{" | "-" | "+"),
            _ => false,
        }
    }

    fn expr(&mut self) -> EngineResult<Expr> {
        self.enter()?;
        let result = self.conditional();
        self.leave();
        result
    }

    fn conditional(&mut self) -> EngineResult<Expr> {
        if self.at_keyword("lambda") {
            return self.error("'lambda' expressions are not supported");
        }
        let then = self.or_expr()?;
        if !self.eat_keyword("if") {
            return Ok(then);
        }
        let cond = self.or_expr()?;
        self.expect_keyword("else")?;
        let orelse = self.expr()?;
        Ok(Expr::IfExp { cond: Box::new(cond), then: Box::new(then), orelse: Box::new(orelse) })
    }

    fn or_expr(&mut self) -> EngineResult<Expr> {
        let mark = self.links;
        let mut left = self.and_expr()?;
        while self.eat_keyword("or") {
            self.link()?;
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        self.links = mark;
        Ok(left)
    }

    fn and_expr(&mut self) -> EngineResult<Expr> {
        let mark = self.links;
        let mut left = self.not_expr()?;
        while self.eat_keyword("and") {
            self.link()?;
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        self.links = mark;
        Ok(left)
    }

    fn not_expr(&mut self) -> EngineResult<Expr> {
        if self.eat_keyword("not") {
            self.enter()?;
            let operand = self.not_expr();
            self.leave();
            return Ok(Expr::Unary { op: UnaryOp::Not, operand: Box::new(operand?) });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> EngineResult<Expr> {
        let left = self.arith()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek().clone() {
                Tok::Op("==") => CmpOp::Eq,
                Tok::Op("!=") => CmpOp::NotEq,
                Tok::Op("<") => CmpOp::Lt,
                Tok::Op("<=") => CmpOp::LtE,
                Tok::Op(">") => CmpOp::Gt,
                Tok::Op(">=") => CmpOp::GtE,
                Tok::Name(n) if n == "in" => CmpOp::In,
                Tok::Name(n) if n == "is" => {
                    if matches!(self.peek_second(), Tok::Name(m) if m == "not") {
                        self.advance();
                        CmpOp::IsNot
                    } else {
                        CmpOp::Is
                    }
                }
                Tok::Name(n) if n == "not" && matches!(self.peek_second(), Tok::Name(m) if m == "in") => {
                    self.advance();
                    CmpOp::NotIn
                }
                _ => break,
            };
            self.advance();
            rest.push((op, self.arith()?));
        }
        if rest.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare { left: Box::new(left), rest })
        }
    }

    /// Additive level: `+` and `-`.
    fn arith(&mut self) -> EngineResult<Expr> {
        let mark = self.links;
        let mut left = self.term()?;
        loop {
            let op = if self.eat_op("+") {
                BinOp::Add
            } else if self.eat_op("-") {
                BinOp::Sub
            } else {
                break;
            };
            self.link()?;
            let right = self.term()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
        self.links = mark;
        Ok(left)
    }

    fn term(&mut self) -> EngineResult<Expr> {
        let mark = self.links;
        let mut left = self.unary()?;
        loop {
            let op = if self.eat_op("*") {
                BinOp::Mul
            } else if self.eat_op("/") {
                BinOp::Div
            } else if self.eat_op("//") {
                BinOp::FloorDiv
            } else if self.eat_op("%") {
                BinOp::Mod
            } else {
                break;
            };
            self.link()?;
            let right = self.unary()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
        self.links = mark;
        Ok(left)
    }

    fn unary(&mut self) -> EngineResult<Expr> {
        let op = if self.eat_op("-") {
            UnaryOp::Neg
        } else if self.eat_op("+") {
            UnaryOp::Pos
        } else {
            return self.power();
        };
        self.enter()?;
        let operand = self.unary();
        self.leave();
        Ok(Expr::Unary { op, operand: Box::new(operand?) })
    }

    /// `**` binds tighter than unary minus on its left and is right-associative.
    fn power(&mut self) -> EngineResult<Expr> {
        let base = self.postfix()?;
        if !self.eat_op("**") {
            return Ok(base);
        }
        self.enter()?;
        let exponent = self.unary();
        self.leave();
        Ok(Expr::Binary { op: BinOp::Pow, left: Box::new(base), right: Box::new(exponent?) })
    }

    fn postfix(&mut self) -> EngineResult<Expr> {
        let mark = self.links;
        let mut expr = self.atom()?;
        loop {
            if self.at_op("(") || self.at_op("[") || self.at_op(".") {
                self.link()?;
            }
            if self.eat_op("(") {
                let (args, kwargs) = self.call_arguments()?;
                expr = Expr::Call { func: Box::new(expr), args, kwargs };
            } else if self.eat_op("[") {
                expr = self.subscript(expr)?;
            } else if self.eat_op(".") {
                let Tok::Name(attr) = self.advance() else { return self.syntax_error() };
                policy::check_attribute(&attr).or_else(|m| self.error(m))?;
                expr = Expr::Attribute { value: Box::new(expr), attr };
            } else {
                self.links = mark;
                return Ok(expr);
            }
        }
    }

    fn call_arguments(&mut self) -> EngineResult<(Vec<Expr>, Vec<(String, Expr)>)> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        while !self.at_op(")") {
            if self.at_op("*") || self.at_op("**") {
                return self.error("argument unpacking is not supported");
            }
            let is_keyword_arg = matches!(self.peek(), Tok::Name(n) if !policy::is_keyword(n))
                && matches!(self.peek_second(), Tok::Op("="));
            if is_keyword_arg {
                let name = self.identifier()?;
                self.advance();
                if kwargs.iter().any(|(k, _)| *k == name) {
                    return self.error(format!("keyword argument repeated: {name}"));
                }
                kwargs.push((name, self.expr()?));
            } else {
                if !kwargs.is_empty() {
                    return self.error("positional argument follows keyword argument");
                }
                let arg = self.expr()?;
                if self.at_keyword("for") {
                    return self.error("generator expressions are not supported");
                }
                args.push(arg);
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(")")?;
        Ok((args, kwargs))
    }

    fn subscript(&mut self, value: Expr) -> EngineResult<Expr> {
        let value = Box::new(value);
        let lower = if self.at_op(":") { None } else { Some(Box::new(self.expr_list()?)) };
        if !self.eat_op(":") {
            self.expect_op("]")?;
            let index = lower.ok_or_else(|| EngineError::compile(self.line(), "invalid syntax"))?;
            return Ok(Expr::Subscript { value, index });
        }
        let upper = if self.at_op(":") || self.at_op("]") { None } else { Some(Box::new(self.expr()?)) };
        let step = if self.eat_op(":") && !self.at_op("]") { Some(Box::new(self.expr()?)) } else { None };
        self.expect_op("]")?;
        Ok(Expr::Slice { value, lower, upper, step })
    }

    fn atom(&mut self) -> EngineResult<Expr> {
        match self.peek().clone() {
            Tok::Int(i) => {
                self.advance();
                Ok(Expr::Const(Const::Int(i)))
            }
            Tok::Float(f) => {
                self.advance();
                Ok(Expr::Const(Const::Float(f)))
            }
            Tok::Str(s) => {
                self.advance();
                let mut joined = s;
                while let Tok::Str(next) = self.peek() {
                    joined.push_str(next);
                    self.advance();
                }
                Ok(Expr::Const(Const::Str(joined.into())))
            }
            Tok::Name(n) if n == "True" => {
                self.advance();
                Ok(Expr::Const(Const::Bool(true)))
            }
            Tok::Name(n) if n == "False" => {
                self.advance();
                Ok(Expr::Const(Const::Bool(false)))
            }
            Tok::Name(n) if n == "None" => {
                self.advance();
                Ok(Expr::Const(Const::None))
            }
            Tok::Name(n) if n == "lambda" => self.error("'lambda' expressions are not supported"),
            Tok::Name(n) if n == "yield" || n == "await" => self.error(format!("'{n}' is not supported")),
            Tok::Name(_) => Ok(Expr::Name(self.identifier()?)),
            Tok::Op("(") => {
                self.advance();
                self.parenthesised()
            }
            Tok::Op("[") => {
                self.advance();
                self.list_display()
            }
            Tok::Op("{") => {
                self.advance();
                self.dict_display()
            }
            _ => self.syntax_error(),
        }
    }

    fn parenthesised(&mut self) -> EngineResult<Expr> {
        if self.eat_op(")") {
            return Ok(Expr::Tuple(Vec::new()));
        }
        let first = self.expr()?;
        if self.at_keyword("for") {
            return self.error("generator expressions are not supported");
        }
        if self.eat_op(")") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.at_op(")") {
                break;
            }
            items.push(self.expr()?);
        }
        self.expect_op(")")?;
        Ok(Expr::Tuple(items))
    }

    fn list_display(&mut self) -> EngineResult<Expr> {
        if self.eat_op("]") {
            return Ok(Expr::List(Vec::new()));
        }
        let first = self.expr()?;
        if self.eat_keyword("for") {
            let target = self.target_list()?;
            self.expect_keyword("in")?;
            let iter = self.or_expr()?;
            let cond = if self.eat_keyword("if") { Some(Box::new(self.or_expr()?)) } else { None };
            if self.at_keyword("for") {
                return self.error("nested comprehensions are not supported");
            }
            self.expect_op("]")?;
            return Ok(Expr::ListComp {
                elt: Box::new(first),
                target: Box::new(target),
                iter: Box::new(iter),
                cond,
            });
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.at_op("]") {
                break;
            }
            items.push(self.expr()?);
        }
        self.expect_op("]")?;
        Ok(Expr::List(items))
    }

    fn dict_display(&mut self) -> EngineResult<Expr> {
        let mut entries = Vec::new();
        while !self.at_op("}") {
            let key = self.expr()?;
            if !self.eat_op(":") {
                return self.error("set literals are not supported");
            }
            let value = self.expr()?;
            if self.at_keyword("for") {
                return self.error("dict comprehensions are not supported");
            }
            entries.push((key, value));
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op("}")?;
        Ok(Expr::Dict(entries))
    }
}
