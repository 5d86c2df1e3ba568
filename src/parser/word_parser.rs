//! Word Parsing Utilities
//!
//! Pure functions that decode a raw word lexeme (quotes and escapes still in
//! place) into a `WordNode` of literal runs and variable references. Every
//! variable reference gets its own span, computed from the word's origin.

use crate::ast::types::{IndexNode, Span, VariableRefNode, WordNode, WordPart};
use crate::parser::lexer::is_valid_name;
use crate::parser::types::SyntaxError;

/// Character cursor that keeps line/column in step with the source
struct Cursor {
    chars: Vec<char>,
    i: usize,
    line: usize,
    column: usize,
    offset: usize,
}

impl Cursor {
    fn new(raw: &str, origin: Span) -> Self {
        Self {
            chars: raw.chars().collect(),
            i: 0,
            line: origin.line,
            column: origin.column,
            offset: origin.offset,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.i).copied()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.i + n).copied()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.i += 1;
        self.offset += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn here(&self) -> Span {
        Span::new(self.line, self.column, self.offset, 0)
    }

    fn span_from(&self, start: Span) -> Span {
        Span {
            length: (self.offset - start.offset).max(1),
            ..start
        }
    }
}

/// Accumulates parts, merging adjacent literal text
#[derive(Default)]
struct PartsBuilder {
    parts: Vec<WordPart>,
    literal: String,
}

impl PartsBuilder {
    fn push(&mut self, c: char) {
        self.literal.push(c);
    }

    fn push_var(&mut self, var: VariableRefNode) {
        self.flush();
        self.parts.push(WordPart::Variable(var));
    }

    fn flush(&mut self) {
        if !self.literal.is_empty() {
            self.parts.push(WordPart::Literal(std::mem::take(&mut self.literal)));
        }
    }

    fn finish(mut self) -> Vec<WordPart> {
        self.flush();
        if self.parts.is_empty() {
            self.parts.push(WordPart::Literal(String::new()));
        }
        self.parts
    }
}

/// Decode a raw word located at `span`
pub fn parse_word(raw: &str, span: Span) -> Result<WordNode, SyntaxError> {
    let mut cur = Cursor::new(raw, span);
    let mut out = PartsBuilder::default();

    while let Some(c) = cur.peek() {
        match c {
            '\\' => {
                cur.next();
                out.push(cur.next().unwrap_or('\\'));
            }
            '\'' => {
                cur.next();
                while let Some(ch) = cur.next() {
                    if ch == '\'' {
                        break;
                    }
                    out.push(ch);
                }
            }
            '"' => {
                cur.next();
                parse_double_quoted(&mut cur, &mut out)?;
            }
            '$' => match parse_dollar(&mut cur)? {
                Some(var) => out.push_var(var),
                None => out.push('$'),
            },
            _ => {
                cur.next();
                out.push(c);
            }
        }
    }

    Ok(WordNode {
        parts: out.finish(),
        span,
    })
}

/// Body of a double-quoted section; the opening quote is already consumed
fn parse_double_quoted(cur: &mut Cursor, out: &mut PartsBuilder) -> Result<(), SyntaxError> {
    while let Some(c) = cur.peek() {
        match c {
            '"' => {
                cur.next();
                return Ok(());
            }
            '\\' => {
                cur.next();
                match cur.next() {
                    Some(escaped @ ('"' | '\\' | '$')) => out.push(escaped),
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(other) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => out.push('\\'),
                }
            }
            '$' => match parse_dollar(cur)? {
                Some(var) => out.push_var(var),
                None => out.push('$'),
            },
            _ => {
                cur.next();
                out.push(c);
            }
        }
    }
    Ok(())
}

/// Parse a reference at `$`. Returns None (consuming only `$`) when no
/// reference follows.
fn parse_dollar(cur: &mut Cursor) -> Result<Option<VariableRefNode>, SyntaxError> {
    let start = cur.here();
    match cur.peek_at(1) {
        Some('{') => {
            cur.next();
            cur.next();
            let mut inner = String::new();
            loop {
                match cur.next() {
                    Some('}') => break,
                    Some(ch) => inner.push(ch),
                    None => {
                        return Err(SyntaxError::new(
                            "Unterminated `${`",
                            cur.span_from(start),
                        ))
                    }
                }
            }
            let span = cur.span_from(start);
            let (name, index) = match inner.find('[') {
                Some(open) if inner.ends_with(']') => {
                    let index = parse_index(&inner[open + 1..inner.len() - 1], span)?;
                    (inner[..open].to_string(), Some(index))
                }
                _ => (inner, None),
            };
            if !is_valid_name(&name) && !is_special_name(&name) {
                return Err(SyntaxError::new(
                    format!("Bad substitution `${{{}}}`", name),
                    span,
                ));
            }
            Ok(Some(VariableRefNode {
                name,
                index,
                bare: false,
                span,
            }))
        }
        Some(c) if c == '?' || c == '#' || c.is_ascii_digit() => {
            cur.next();
            cur.next();
            Ok(Some(VariableRefNode {
                name: c.to_string(),
                index: None,
                bare: false,
                span: cur.span_from(start),
            }))
        }
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            cur.next();
            let mut name = String::new();
            while let Some(ch) = cur.peek().filter(|ch| ch.is_ascii_alphanumeric() || *ch == '_') {
                name.push(ch);
                cur.next();
            }
            let index = parse_trailing_index(cur, start)?;
            Ok(Some(VariableRefNode {
                name,
                index,
                bare: false,
                span: cur.span_from(start),
            }))
        }
        _ => {
            cur.next();
            Ok(None)
        }
    }
}

/// `[index]` directly after a name; left untouched when unclosed
fn parse_trailing_index(cur: &mut Cursor, start: Span) -> Result<Option<IndexNode>, SyntaxError> {
    if cur.peek() != Some('[') {
        return Ok(None);
    }
    let close = cur.chars[cur.i..].iter().position(|c| *c == ']' || *c == '\n');
    match close {
        Some(n) if cur.chars[cur.i + n] == ']' => {
            cur.next();
            let text: String = (0..n - 1).filter_map(|_| cur.next()).collect();
            cur.next();
            parse_index(&text, cur.span_from(start)).map(Some)
        }
        _ => Ok(None),
    }
}

fn parse_index(text: &str, span: Span) -> Result<IndexNode, SyntaxError> {
    let text = text.trim();
    if let Ok(n) = text.parse::<i64>() {
        return Ok(IndexNode::Number(n));
    }
    let name = text.strip_prefix('$').unwrap_or(text);
    if is_valid_name(name) {
        return Ok(IndexNode::Variable(name.to_string()));
    }
    Err(SyntaxError::new(format!("Invalid array index `{}`", text), span))
}

/// `?`, `#` and positional digits
pub fn is_special_name(name: &str) -> bool {
    matches!(name, "?" | "#") || (name.len() == 1 && name.chars().all(|c| c.is_ascii_digit()))
}

/// Decode a `VarRef` token from expression mode
pub fn parse_variable_ref(raw: &str, span: Span) -> Result<VariableRefNode, SyntaxError> {
    let word = parse_word(raw, span)?;
    match word.parts.as_slice() {
        [WordPart::Variable(var)] => Ok(var.clone()),
        _ => Err(SyntaxError::new(
            format!("Invalid variable reference `{}`", raw),
            span,
        )),
    }
}
