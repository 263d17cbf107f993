//! Tokeniser with Python-style indentation tracking.
//!
//! Emits `Newline` at the end of each logical line and `Indent` / `Dedent`
//! around blocks. Newlines inside brackets and after a `\` are joined.

use crate::error::{EngineError, EngineResult};

/// Operators and punctuation, longest first so greedy matching works.
const OPERATORS: &[&str] = &[
    "**=", "//=", "**", "//", "==", "!=", "<=", ">=", "+=", "-=", "*=", "/=", "%=", "+", "-", "*", "/", "%",
    "<", ">", "=", "(", ")", "[", "]", "{", "}", ",", ":", ".", ";",
];

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tok {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    Op(&'static str),
    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub tok: Tok,
    pub line: usize,
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    indents: Vec<usize>,
    brackets: usize,
    tokens: Vec<Token>,
}

/// Splits `source` into tokens.
pub(crate) fn tokenize(source: &str) -> EngineResult<Vec<Token>> {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
        indents: vec![0],
        brackets: 0,
        tokens: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn push(&mut self, tok: Tok) {
        self.tokens.push(Token { tok, line: self.line });
    }

    fn error<T>(&self, message: impl Into<String>) -> EngineResult<T> {
        Err(EngineError::compile(self.line, message))
    }

    fn run(&mut self) -> EngineResult<()> {
        let mut at_line_start = true;
        loop {
            if at_line_start && self.brackets == 0 {
                if !self.indentation()? {
                    continue;
                }
                at_line_start = false;
            }
            let Some(c) = self.peek() else { break };
            match c {
                '\n' => {
                    self.pos += 1;
                    if self.brackets == 0 {
                        self.end_logical_line();
                        at_line_start = true;
                    }
                    self.line += 1;
                }
                ' ' | '\t' | '\r' | '\x0c' => self.pos += 1,
                '#' => self.skip_comment(),
                '\\' => {
                    if self.peek_at(1) == Some('\n') {
                        self.pos += 2;
                        self.line += 1;
                    } else if self.peek_at(1) == Some('\r') && self.peek_at(2) == Some('\n') {
                        self.pos += 3;
                        self.line += 1;
                    } else {
                        return self.error("unexpected character after line continuation character");
                    }
                }
                '"' | '\'' => self.string()?,
                c if c.is_ascii_digit() => self.number()?,
                '.' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => self.number()?,
                c if c.is_alphabetic() || c == '_' => self.name()?,
                _ => self.operator()?,
            }
        }

        if self.brackets > 0 {
            return self.error("unexpected end of input inside brackets");
        }
        self.end_logical_line();
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(Tok::Dedent);
        }
        self.push(Tok::Eof);
        Ok(())
    }

    fn end_logical_line(&mut self) {
        if self.tokens.last().is_some_and(|t| !matches!(t.tok, Tok::Newline | Tok::Indent | Tok::Dedent)) {
            self.push(Tok::Newline);
        }
    }

    fn skip_comment(&mut self) {
        while self.peek().is_some_and(|c| c != '\n') {
            self.pos += 1;
        }
    }

    /// Measures leading whitespace and emits `Indent`/`Dedent`. Returns
    /// `false` for blank and comment-only lines, which are consumed whole.
    fn indentation(&mut self) -> EngineResult<bool> {
        let mut width = 0usize;
        while let Some(c) = self.peek() {
            match c {
                ' ' => width += 1,
                '\t' => width = (width / 8 + 1) * 8,
                '\x0c' | '\r' => {}
                _ => break,
            }
            self.pos += 1;
        }

        match self.peek() {
            None => return Ok(true),
            Some('#') => {
                self.skip_comment();
                if self.peek() == Some('\n') {
                    self.pos += 1;
                    self.line += 1;
                }
                return Ok(false);
            }
            Some('\n') => {
                self.pos += 1;
                self.line += 1;
                return Ok(false);
            }
            Some(_) => {}
        }

        let current = self.indents.last().copied().unwrap_or(0);
        if width > current {
            if self.tokens.is_empty() {
                return self.error("unexpected indent");
            }
            self.indents.push(width);
            self.push(Tok::Indent);
        } else if width < current {
            while self.indents.last().is_some_and(|&level| level > width) {
                self.indents.pop();
                self.push(Tok::Dedent);
            }
            if self.indents.last().copied().unwrap_or(0) != width {
                return self.error("unindent does not match any outer indentation level");
            }
        }
        Ok(true)
    }

    fn name(&mut self) -> EngineResult<()> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        if matches!(self.peek(), Some('"' | '\''))
            && word.len() <= 2
            && word.chars().all(|c| "rRbBfFuU".contains(c))
        {
            return self.error(format!("string prefix '{word}' is not supported"));
        }
        self.push(Tok::Name(word));
        Ok(())
    }

    fn number(&mut self) -> EngineResult<()> {
        let start = self.pos;
        let mut is_float = false;
        let digits = |lexer: &mut Self| {
            while lexer.peek().is_some_and(|c| c.is_ascii_digit() || c == '_') {
                lexer.pos += 1;
            }
        };

        digits(self);
        if self.peek() == Some('.') {
            is_float = true;
            self.pos += 1;
            digits(self);
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = usize::from(matches!(self.peek_at(1), Some('+' | '-')));
            if self.peek_at(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.pos += 1 + sign;
                digits(self);
            }
        }
        if self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            return self.error("invalid number literal");
        }

        let text: String = self.chars[start..self.pos].iter().filter(|&&c| c != '_').collect();
        if is_float {
            match text.parse::<f64>() {
                Ok(v) => self.push(Tok::Float(v)),
                Err(_) => return self.error(format!("invalid float literal '{text}'")),
            }
        } else {
            match text.parse::<i64>() {
                Ok(v) => self.push(Tok::Int(v)),
                Err(_) => return self.error(format!("integer literal '{text}' is too large")),
            }
        }
        Ok(())
    }

    fn string(&mut self) -> EngineResult<()> {
        let quote = self.peek().unwrap_or('"');
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        let start_line = self.line;
        self.pos += if triple { 3 } else { 1 };

        let mut out = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(EngineError::compile(start_line, "unterminated string literal"));
            };
            if c == quote {
                if !triple {
                    self.pos += 1;
                    break;
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.pos += 3;
                    break;
                }
            }
            match c {
                '\n' if !triple => {
                    return Err(EngineError::compile(start_line, "unterminated string literal"));
                }
                '\n' => {
                    self.line += 1;
                    out.push('\n');
                    self.pos += 1;
                }
                '\\' => {
                    self.pos += 1;
                    let Some(escaped) = self.peek() else { continue };
                    self.pos += 1;
                    match escaped {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '0' => out.push('\0'),
                        '\\' => out.push('\\'),
                        '\'' => out.push('\''),
                        '"' => out.push('"'),
                        '\n' => self.line += 1,
                        other => {
                            out.push('\\');
                            out.push(other);
                        }
                    }
                }
                other => {
                    out.push(other);
                    self.pos += 1;
                }
            }
        }
        self.push(Tok::Str(out));
        Ok(())
    }

    fn operator(&mut self) -> EngineResult<()> {
        for op in OPERATORS {
            let len = op.chars().count();
            let matches = op.chars().enumerate().all(|(i, c)| self.peek_at(i) == Some(c));
            if matches {
                self.pos += len;
                match *op {
                    "(" | "[" | "{" => self.brackets += 1,
                    ")" | "]" | "}" => {
                        if self.brackets == 0 {
                            return self.error(format!("unmatched '{op}'"));
                        }
                        self.brackets -= 1;
                    }
                    _ => {}
                }
                self.push(Tok::Op(*op));
                return Ok(());
            }
        }
        let c = self.peek().unwrap_or('?');
        self.error(format!("invalid character {c:?}"))
    }
}
