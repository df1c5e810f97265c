//! Artifact Validator
//!
//! Static syntax checks for synthesized Python source. Nothing here executes
//! the artifact.

use async_trait::async_trait;
use rustpython_parser::{parse, Mode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use tokio::time::Duration;

use super::ForgeError;
use crate::utils::process::run_with_input;

/// Where and why a source failed to check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub message: String,
    /// 1-based; may point one past the last line for end-of-file errors
    pub line: usize,
    /// 1-based character column
    pub column: usize,
    /// The offending line, without its newline
    pub text: String,
}

impl Diagnostic {
    fn at(message: impl Into<String>, line: usize, column: usize, source: &str) -> Self {
        let text = source
            .lines()
            .nth(line.saturating_sub(1))
            .unwrap_or_default()
            .to_string();
        Self { message: message.into(), line, column, text }
    }

    /// Compiler-style report with a caret under the offending column, fed back
    /// to the model so it can correct itself.
    pub fn render_feedback(&self) -> String {
        let prefix = format!("Line {}: ", self.line);
        let pad = " ".repeat(prefix.len() + self.column.saturating_sub(1));
        format!("Syntax Error: {}\n{}{}\n{}^", self.message, prefix, self.text, pad)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (line {}, column {})", self.message, self.line, self.column)
    }
}

#[async_trait]
pub trait SyntaxChecker: Send + Sync {
    /// `Err(ForgeError::StructuralValidationFailed)` when the source is
    /// malformed; other errors mean the check itself could not run.
    async fn check(&self, source: &str) -> Result<(), ForgeError>;
}

/// Pure-Rust structural checker: string literals, comments, bracket
/// matching and block indentation. Not a parser; statement grammar is left
/// to [`GrammarChecker`].
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralChecker;

#[derive(Debug, Clone, Copy)]
struct OpenString {
    quote: char,
    triple: bool,
    line: usize,
    column: usize,
}

impl StructuralChecker {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, source: &str) -> Result<(), Diagnostic> {
        let mut brackets: Vec<(char, usize, usize)> = Vec::new();
        let mut open_string: Option<OpenString> = None;
        let mut indents: Vec<usize> = vec![0];
        // Line of a block header (`...:`) still waiting for its body
        let mut pending_block: Option<usize> = None;
        let mut continued = false;
        let mut logical_start = 1;
        let mut last_significant: Option<char> = None;
        let mut line_count = 0;

        for (idx, line) in source.lines().enumerate() {
            let lineno = idx + 1;
            line_count = lineno;
            let chars: Vec<char> = line.chars().collect();

            let starts_logical = open_string.is_none() && brackets.is_empty() && !continued;
            if starts_logical {
                let (width, offset) = indentation(&chars);
                let rest = &chars[offset..];
                if rest.is_empty() || rest[0] == '#' {
                    continue;
                }
                logical_start = lineno;
                let top = *indents.last().unwrap_or(&0);

                if let Some(header) = pending_block.take() {
                    if width <= top {
                        return Err(Diagnostic::at(
                            format!("expected an indented block after line {}", header),
                            lineno,
                            offset + 1,
                            source,
                        ));
                    }
                    indents.push(width);
                } else if width > top {
                    return Err(Diagnostic::at("unexpected indent", lineno, offset + 1, source));
                } else if width < top {
                    while indents.last().is_some_and(|&level| level > width) {
                        indents.pop();
                    }
                    if indents.last() != Some(&width) {
                        return Err(Diagnostic::at(
                            "unindent does not match any outer indentation level",
                            lineno,
                            offset + 1,
                            source,
                        ));
                    }
                }
            }

            continued = false;
            let mut escaped_eol = false;
            let mut i = 0;
            while i < chars.len() {
                let c = chars[i];

                if let Some(open) = open_string {
                    if c == '\\' {
                        if i + 1 == chars.len() {
                            escaped_eol = true;
                        }
                        i += 2;
                        continue;
                    }
                    if c == open.quote {
                        if !open.triple {
                            open_string = None;
                            last_significant = Some(c);
                        } else if chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c) {
                            open_string = None;
                            last_significant = Some(c);
                            i += 3;
                            continue;
                        }
                    }
                    i += 1;
                    continue;
                }

                match c {
                    '#' => break,
                    '\'' | '"' => {
                        let triple = chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c);
                        open_string = Some(OpenString { quote: c, triple, line: lineno, column: i + 1 });
                        last_significant = Some(c);
                        i += if triple { 3 } else { 1 };
                        continue;
                    }
                    '(' | '[' | '{' => brackets.push((c, lineno, i + 1)),
                    ')' | ']' | '}' => match brackets.pop() {
                        None => {
                            return Err(Diagnostic::at(format!("unmatched '{}'", c), lineno, i + 1, source));
                        }
                        Some((open, open_line, _)) if closer_for(open) != c => {
                            let mut message = format!(
                                "closing parenthesis '{}' does not match opening parenthesis '{}'",
                                c, open
                            );
                            if open_line != lineno {
                                message.push_str(&format!(" on line {}", open_line));
                            }
                            return Err(Diagnostic::at(message, lineno, i + 1, source));
                        }
                        Some(_) => {}
                    },
                    '\\' if i + 1 == chars.len() => {
                        continued = true;
                        i += 1;
                        continue;
                    }
                    _ => {}
                }
                if !c.is_whitespace() {
                    last_significant = Some(c);
                }
                i += 1;
            }

            if let Some(open) = open_string {
                if !open.triple && !escaped_eol {
                    return Err(Diagnostic::at(
                        format!("unterminated string literal (detected at line {})", lineno),
                        open.line,
                        open.column,
                        source,
                    ));
                }
            }

            let logical_ends = open_string.is_none() && brackets.is_empty() && !continued;
            if logical_ends {
                if last_significant == Some(':') {
                    pending_block = Some(logical_start);
                }
                last_significant = None;
            }
        }

        if let Some(open) = open_string {
            let message = if open.triple {
                format!("unterminated triple-quoted string literal (detected at line {})", line_count)
            } else {
                format!("unterminated string literal (detected at line {})", line_count)
            };
            return Err(Diagnostic::at(message, open.line, open.column, source));
        }
        if let Some(&(open, line, column)) = brackets.last() {
            return Err(Diagnostic::at(format!("'{}' was never closed", open), line, column, source));
        }
        if continued {
            return Err(Diagnostic::at("unexpected EOF while parsing", line_count, 1, source));
        }
        if let Some(header) = pending_block {
            return Err(Diagnostic::at(
                format!("expected an indented block after line {}", header),
                line_count + 1,
                1,
                source,
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl SyntaxChecker for StructuralChecker {
    async fn check(&self, source: &str) -> Result<(), ForgeError> {
        self.analyze(source).map_err(ForgeError::StructuralValidationFailed)
    }
}

/// Visual width of leading whitespace (tabs advance to the next multiple of
/// eight) and the index of the first non-blank character.
fn indentation(chars: &[char]) -> (usize, usize) {
    let mut width = 0;
    for (i, c) in chars.iter().enumerate() {
        match c {
            ' ' => width += 1,
            '\t' => width = (width / 8 + 1) * 8,
            '\x0c' => width = 0,
            _ => return (width, i),
        }
    }
    (width, chars.len())
}

fn closer_for(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

/// Full grammar check. Runs the structural pass first for its sharper
/// messages (unclosed brackets, bad indentation), then parses the source as
/// a Python module.
#[derive(Debug, Default, Clone, Copy)]
pub struct GrammarChecker;

impl GrammarChecker {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, source: &str) -> Result<(), Diagnostic> {
        StructuralChecker.analyze(source)?;
        match parse(source, Mode::Module, "<artifact>") {
            Ok(_) => Ok(()),
            Err(err) => {
                let (line, column) = line_column(source, u32::from(err.offset) as usize);
                Err(Diagnostic::at(err.error.to_string(), line, column, source))
            }
        }
    }
}

#[async_trait]
impl SyntaxChecker for GrammarChecker {
    async fn check(&self, source: &str) -> Result<(), ForgeError> {
        self.analyze(source).map_err(ForgeError::StructuralValidationFailed)
    }
}

/// 1-based line and character column of a byte offset
fn line_column(source: &str, offset: usize) -> (usize, usize) {
    let mut end = offset.min(source.len());
    while !source.is_char_boundary(end) {
        end -= 1;
    }
    let before = &source[..end];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    (line, before[line_start..].chars().count() + 1)
}

const AST_PROBE: &str = r#"
import ast, json, sys
source = sys.stdin.read()
try:
    ast.parse(source)
except SyntaxError as e:
    print(json.dumps({
        "message": e.msg,
        "line": e.lineno or 0,
        "column": e.offset or 0,
        "text": (e.text or "").rstrip("\n"),
    }))
    sys.exit(1)
"#;

/// Delegates the check to a real interpreter's parser (`ast.parse`)
#[derive(Debug, Clone)]
pub struct InterpreterChecker {
    python: String,
    timeout: Duration,
}

impl InterpreterChecker {
    pub fn new(python: impl Into<String>) -> Self {
        Self { python: python.into(), timeout: Duration::from_secs(15) }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl SyntaxChecker for InterpreterChecker {
    async fn check(&self, source: &str) -> Result<(), ForgeError> {
        let output = run_with_input(&self.python, &["-c", AST_PROBE], Some(source.as_bytes()), self.timeout).await?;
        if output.status.success() {
            return Ok(());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match stdout.lines().rev().find(|l| !l.trim().is_empty()).map(serde_json::from_str::<Diagnostic>) {
            Some(Ok(diagnostic)) => Err(ForgeError::StructuralValidationFailed(diagnostic)),
            _ => Err(ForgeError::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("syntax probe failed: {}", String::from_utf8_lossy(&output.stderr).trim()),
            ))),
        }
    }
}
