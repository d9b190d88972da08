//! Code Execution Boundary
//!
//! Frozen modules carry precompiled code that only the host runtime knows
//! how to run. The loader hands the payload and a target module to a
//! [`CodeExecutor`] and never looks inside the bytes itself.
//!
//! [`LiteralScriptExecutor`] is the executor the runtime installs by default.
//! It understands a small assignment-only script format, one binding per
//! line:
//!
//! ```text
//! # comment
//! version = 3
//! name = "bootstrap"
//! enabled = True
//! paths = ["a", "b", [1, 2]]
//! ```

use crate::error::RaisedError;
use crate::object::{ModuleHandle, Value};

/// Runs frozen payloads into module namespaces
pub trait CodeExecutor: Send + Sync {
    /// Execute `code` with `module`'s namespace as globals
    fn exec(&self, name: &str, code: &[u8], module: &ModuleHandle) -> Result<(), RaisedError>;
}

/// Executor for assignment-only literal scripts
#[derive(Debug, Default, Clone, Copy)]
pub struct LiteralScriptExecutor;

impl LiteralScriptExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Parse a whole script into its bindings, in order
    pub fn parse(name: &str, code: &[u8]) -> Result<Vec<(String, Value)>, RaisedError> {
        let source = std::str::from_utf8(code).map_err(|e| {
            RaisedError::new(
                "SyntaxError",
                format!("{}: source is not valid UTF-8 ({})", name, e),
            )
        })?;

        let mut bindings = Vec::new();
        for (idx, line) in source.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fail = |msg: &str| syntax_error(name, idx + 1, msg);

            let eq = line.find('=').ok_or_else(|| fail("expected assignment"))?;
            let target = line[..eq].trim();
            if !is_identifier(target) {
                return Err(fail("invalid assignment target"));
            }

            let mut parser = LiteralParser::new(line[eq + 1..].trim());
            let value = parser.literal().map_err(|msg| fail(&msg))?;
            parser.skip_whitespace();
            if !parser.at_end() {
                return Err(fail("unexpected trailing characters"));
            }
            bindings.push((target.to_string(), value));
        }
        Ok(bindings)
    }
}

impl CodeExecutor for LiteralScriptExecutor {
    fn exec(&self, name: &str, code: &[u8], module: &ModuleHandle) -> Result<(), RaisedError> {
        // Parse everything first so a bad line leaves the namespace untouched
        let bindings = Self::parse(name, code)?;
        for (target, value) in bindings {
            module.set(target, value);
        }
        Ok(())
    }
}

fn syntax_error(name: &str, line: usize, msg: &str) -> RaisedError {
    let message = format!("{}, line {}: {}", name, line, msg);
    RaisedError::new("SyntaxError", message)
}

fn is_number_char(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, '.' | '_' | 'e' | 'E')
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_alphanumeric())
}

struct LiteralParser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> LiteralParser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn literal(&mut self) -> Result<Value, String> {
        self.skip_whitespace();
        match self.peek() {
            None => Err("expected a value".to_string()),
            Some('"') | Some('\'') => self.string(),
            Some('[') => self.list(),
            Some(c) if c == '-' || c.is_ascii_digit() => self.number(),
            Some(_) => self.word(),
        }
    }

    fn string(&mut self) -> Result<Value, String> {
        let quote = self.bump().ok_or("expected a string")?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err("unterminated string literal".to_string()),
                Some(c) if c == quote => return Ok(Value::Str(out)),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('\\') => out.push('\\'),
                    Some('"') => out.push('"'),
                    Some('\'') => out.push('\''),
                    Some(other) => return Err(format!("unknown escape '\\{}'", other)),
                    None => return Err("unterminated string literal".to_string()),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn list(&mut self) -> Result<Value, String> {
        self.bump();
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some(']') {
                self.bump();
                return Ok(Value::List(items));
            }
            items.push(self.literal()?);
            self.skip_whitespace();
            match self.bump() {
                Some(',') => continue,
                Some(']') => return Ok(Value::List(items)),
                _ => return Err("expected ',' or ']' in list".to_string()),
            }
        }
    }

    fn number(&mut self) -> Result<Value, String> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.bump();
        }
        while self.peek().map_or(false, is_number_char) {
            self.bump();
        }
        let digits = &self.src[start..self.pos];
        let text: String = digits.chars().filter(|c| *c != '_').collect();
        if text.contains(['.', 'e', 'E']) {
            text.parse::<f64>()
                .map(Value::Float)
                .map_err(|_| format!("invalid float literal '{}'", text))
        } else {
            text.parse::<i64>()
                .map(Value::Int)
                .map_err(|_| format!("invalid int literal '{}'", text))
        }
    }

    fn word(&mut self) -> Result<Value, String> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c == '_' || c.is_alphanumeric()) {
            self.bump();
        }
        match &self.src[start..self.pos] {
            "None" => Ok(Value::None),
            "True" => Ok(Value::Bool(true)),
            "False" => Ok(Value::Bool(false)),
            "" => {
                let found = self.peek().unwrap_or(' ');
                Err(format!("unexpected character '{}'", found))
            }
            other => Err(format!("name '{}' is not a literal", other)),
        }
    }
}
