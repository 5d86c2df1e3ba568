//! Lexer for Ox Scripts
//!
//! The lexer tokenizes input into a stream of positioned tokens that the
//! parser consumes. It runs in three modes:
//! - Command mode: words, operators, reserved words and comments
//! - Expression mode: the right-hand side of `name=` assignments
//! - Subshell capture: the raw body between `(` and its matching `)`
//!
//! Inside `case ... esac` a small state stack decides whether `)` closes a
//! pattern list and whether `;;` ends an arm.
//!
//! Lexing is total and side-effect free. Line and column tracking continues
//! through quoted strings, multi-line array literals and captured subshell
//! bodies so that every token can be reported precisely.

use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;
use regex_lite::Regex;

use crate::ast::types::Span;

/// Token types for the Ox lexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    // End of input
    Eof,

    // Separators
    Newline,
    Semicolon,
    DSemi, // ;;

    // Operators
    Pipe,   // |
    AndAnd, // &&
    OrOr,   // ||
    Bang,   // !

    // Redirections
    Less,      // <
    Great,     // >
    DGreat,    // >>
    ErrGreat,  // 2>
    ErrDGreat, // 2>>

    // Subshells
    LParen,       // (
    RParen,       // )
    Shebang,      // #!interpreter args
    SubshellBody, // raw captured text

    // Reserved words
    If,
    Then,
    Elif,
    Else,
    Fi,
    While,
    Until,
    For,
    In,
    Do,
    Done,
    Case,
    Esac,
    Function,
    LBrace, // {
    RBrace, // }

    // Words
    Word,
    Int,
    Float,
    FuncParens, // () after a function name

    // Assignments
    TypeName,   // int / float / string / array before an assignment
    AssignName, // name of `name=`
    Assign,     // =

    // Expression mode
    Ident,
    Str,
    VarRef,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    ExprLParen,
    ExprRParen,
    LBracket,
    RBracket,
    Comma,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eof => "end of input",
            Self::Newline => "newline",
            Self::Semicolon => ";",
            Self::DSemi => ";;",
            Self::Pipe => "|",
            Self::AndAnd => "&&",
            Self::OrOr => "||",
            Self::Bang => "!",
            Self::Less => "<",
            Self::Great => ">",
            Self::DGreat => ">>",
            Self::ErrGreat => "2>",
            Self::ErrDGreat => "2>>",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::Shebang => "#!",
            Self::SubshellBody => "subshell body",
            Self::If => "if",
            Self::Then => "then",
            Self::Elif => "elif",
            Self::Else => "else",
            Self::Fi => "fi",
            Self::While => "while",
            Self::Until => "until",
            Self::For => "for",
            Self::In => "in",
            Self::Do => "do",
            Self::Done => "done",
            Self::Case => "case",
            Self::Esac => "esac",
            Self::Function => "function",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::FuncParens => "()",
            Self::Word => "word",
            Self::Int => "integer",
            Self::Float => "float",
            Self::TypeName => "type",
            Self::AssignName => "name",
            Self::Assign => "=",
            Self::Ident => "identifier",
            Self::Str => "string",
            Self::VarRef => "variable",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::EqEq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::ExprLParen => "(",
            Self::ExprRParen => ")",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::Comma => ",",
        }
    }

    /// Closing or continuation keywords that need an open block
    pub fn is_block_keyword(&self) -> bool {
        matches!(
            self,
            Self::Then
                | Self::Elif
                | Self::Else
                | Self::Fi
                | Self::Do
                | Self::Done
                | Self::Esac
                | Self::DSemi
                | Self::RBrace
        )
    }

    /// Tokens produced only in expression mode
    pub fn is_expression(&self) -> bool {
        matches!(
            self,
            Self::Int
                | Self::Float
                | Self::Ident
                | Self::Str
                | Self::VarRef
                | Self::Plus
                | Self::Minus
                | Self::Star
                | Self::Slash
                | Self::Percent
                | Self::EqEq
                | Self::NotEq
                | Self::Lt
                | Self::Gt
                | Self::Le
                | Self::Ge
                | Self::ExprLParen
                | Self::ExprRParen
                | Self::LBracket
                | Self::RBracket
                | Self::Comma
        )
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token with position information
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    /// Raw lexeme (quotes included for words and strings)
    pub value: String,
    /// Character offset of the first character
    pub start: usize,
    /// Character offset one past the last character
    pub end: usize,
    pub line: usize,
    pub column: usize,
    /// Word contained a quoted section
    pub quoted: bool,
}

impl Token {
    pub fn new(
        token_type: TokenType,
        value: impl Into<String>,
        start: usize,
        end: usize,
        line: usize,
        column: usize,
    ) -> Self {
        Self {
            token_type,
            value: value.into(),
            start,
            end,
            line,
            column,
            quoted: false,
        }
    }

    pub fn length(&self) -> usize {
        self.end - self.start
    }

    pub fn span(&self) -> Span {
        Span::new(self.line, self.column, self.start, self.length())
    }

    /// How the token reads in an error message
    pub fn describe(&self) -> String {
        match self.token_type {
            TokenType::Eof => "end of input".to_string(),
            TokenType::Newline => "newline".to_string(),
            TokenType::SubshellBody => "subshell body".to_string(),
            _ => format!("`{}`", self.value),
        }
    }
}

/// Lexer error with a source span
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexerError {
    pub message: String,
    pub span: Span,
    /// Input ended inside a quote, `${`, `[` or `(`
    pub incomplete: bool,
}

impl LexerError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            incomplete: false,
        }
    }

    pub fn unterminated(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            incomplete: true,
        }
    }
}

impl fmt::Display for LexerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{} - {}", self.span.line, self.span.column, self.message)
    }
}

impl std::error::Error for LexerError {}

lazy_static! {
    /// Reserved words, recognized only in command position
    static ref RESERVED_WORDS: HashMap<&'static str, TokenType> = {
        let mut m = HashMap::new();
        m.insert("if", TokenType::If);
        m.insert("then", TokenType::Then);
        m.insert("elif", TokenType::Elif);
        m.insert("else", TokenType::Else);
        m.insert("fi", TokenType::Fi);
        m.insert("while", TokenType::While);
        m.insert("until", TokenType::Until);
        m.insert("for", TokenType::For);
        m.insert("do", TokenType::Do);
        m.insert("done", TokenType::Done);
        m.insert("case", TokenType::Case);
        m.insert("esac", TokenType::Esac);
        m.insert("function", TokenType::Function);
        m.insert("{", TokenType::LBrace);
        m.insert("}", TokenType::RBrace);
        m
    };

    static ref INT_RE: Regex = Regex::new(r"^-?[0-9]+$").unwrap();
    static ref FLOAT_RE: Regex =
        Regex::new(r"^-?(?:[0-9]*\.[0-9]+(?:[eE][-+]?[0-9]+)?|[0-9]+[eE][-+]?[0-9]+)$").unwrap();
}

/// Type keywords that may introduce a typed assignment
const TYPE_KEYWORDS: &[&str] = &["int", "float", "string", "array"];

/// Classify a numeric lexeme as Int or Float
pub fn classify_number(s: &str) -> Option<TokenType> {
    if INT_RE.is_match(s) {
        Some(TokenType::Int)
    } else if FLOAT_RE.is_match(s) {
        Some(TokenType::Float)
    } else {
        None
    }
}

/// Check if a string is a valid variable name
pub fn is_valid_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_blank(c: char) -> bool {
    c == ' ' || c == '\t' || c == '\r'
}

/// Check if a character is a word boundary (ends a word token)
fn is_word_boundary(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n' | ';' | '&' | '|' | '(' | ')' | '<' | '>')
}

/// Characters that end an expression at bracket depth zero
fn is_expression_terminator(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n' | ';' | '&' | '|' | ')')
}

/// Characters that start an operator inside an expression
fn is_operator_start(c: char) -> bool {
    matches!(c, '+' | '-' | '*' | '/' | '%' | '<' | '>' | '=' | '!')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ForState {
    None,
    ExpectName,
    ExpectIn,
}

/// Where the lexer is inside a `case` command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaseState {
    Subject,
    ExpectIn,
    /// Reading `pat | pat )`
    Patterns,
    /// Commands of an arm, up to `;;` or `esac`
    Body,
}

/// Position snapshot used to build token spans
#[derive(Debug, Clone, Copy)]
struct Mark {
    pos: usize,
    line: usize,
    column: usize,
}

/// Lexer class
pub struct Lexer {
    input: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    /// Offset of `input[0]` within the whole source
    base: usize,
    tokens: Vec<Token>,
    command_start: bool,
    for_state: ForState,
    /// Open `case` commands, innermost last
    case_states: Vec<CaseState>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self::with_origin(input, 1, 1, 0)
    }

    /// Lexer for text embedded in a larger source, e.g. a subshell body.
    pub fn with_origin(input: &str, line: usize, column: usize, offset: usize) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
            line,
            column,
            base: offset,
            tokens: Vec::new(),
            command_start: true,
            for_state: ForState::None,
            case_states: Vec::new(),
        }
    }

    /// Tokenize the entire input
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexerError> {
        loop {
            self.skip_blanks();
            let Some(c) = self.current() else { break };

            match c {
                '#' => self.skip_comment(),
                '\n' => {
                    let mark = self.mark();
                    self.advance();
                    self.push(TokenType::Newline, "\n", mark);
                    self.command_start = true;
                    self.for_state = ForState::None;
                }
                ';' if self.peek(1) == Some(';') && self.case_state() == Some(CaseState::Body) => {
                    let mark = self.mark();
                    self.advance();
                    self.advance();
                    self.push(TokenType::DSemi, ";;", mark);
                    self.set_case_state(CaseState::Patterns);
                    self.command_start = true;
                    self.for_state = ForState::None;
                }
                ';' => {
                    let mark = self.mark();
                    self.advance();
                    self.push(TokenType::Semicolon, ";", mark);
                    self.command_start = true;
                    self.for_state = ForState::None;
                }
                '|' => {
                    let mark = self.mark();
                    self.advance();
                    if self.current() == Some('|') {
                        self.advance();
                        self.push(TokenType::OrOr, "||", mark);
                    } else {
                        self.push(TokenType::Pipe, "|", mark);
                    }
                    self.command_start = true;
                }
                '&' => {
                    let mark = self.mark();
                    self.advance();
                    if self.current() == Some('&') {
                        self.advance();
                        self.push(TokenType::AndAnd, "&&", mark);
                        self.command_start = true;
                    } else {
                        return Err(LexerError::new(
                            "Background execution with `&` is not supported",
                            self.span_from(mark),
                        ));
                    }
                }
                // Optional opening paren of a pattern list
                '(' if self.case_state() == Some(CaseState::Patterns) => {
                    self.advance();
                }
                ')' if self.case_state() == Some(CaseState::Patterns) => {
                    let mark = self.mark();
                    self.advance();
                    self.push(TokenType::RParen, ")", mark);
                    self.set_case_state(CaseState::Body);
                    self.command_start = true;
                }
                '(' => {
                    self.read_subshell()?;
                    self.command_start = false;
                }
                ')' => {
                    let mark = self.mark();
                    self.advance();
                    return Err(LexerError::new("Unmatched `)`", self.span_from(mark)));
                }
                '<' => {
                    let mark = self.mark();
                    self.advance();
                    self.push(TokenType::Less, "<", mark);
                    self.command_start = false;
                }
                '>' => {
                    let mark = self.mark();
                    self.advance();
                    if self.current() == Some('>') {
                        self.advance();
                        self.push(TokenType::DGreat, ">>", mark);
                    } else {
                        self.push(TokenType::Great, ">", mark);
                    }
                    self.command_start = false;
                }
                '2' if self.peek(1) == Some('>') => {
                    let mark = self.mark();
                    self.advance();
                    self.advance();
                    if self.current() == Some('>') {
                        self.advance();
                        self.push(TokenType::ErrDGreat, "2>>", mark);
                    } else {
                        self.push(TokenType::ErrGreat, "2>", mark);
                    }
                    self.command_start = false;
                }
                '!' if self.command_start
                    && self.peek(1).map_or(true, |n| is_blank(n) || n == '\n') =>
                {
                    let mark = self.mark();
                    self.advance();
                    self.push(TokenType::Bang, "!", mark);
                }
                _ => self.read_word()?,
            }
        }

        // Add EOF token
        let mark = self.mark();
        self.push(TokenType::Eof, "", mark);
        Ok(self.tokens)
    }

    // =========================================================================
    // CURSOR
    // =========================================================================

    fn current(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.input.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.current()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn mark(&self) -> Mark {
        Mark {
            pos: self.pos,
            line: self.line,
            column: self.column,
        }
    }

    fn span_from(&self, mark: Mark) -> Span {
        Span::new(
            mark.line,
            mark.column,
            self.base + mark.pos,
            (self.pos - mark.pos).max(1),
        )
    }

    fn push(&mut self, token_type: TokenType, value: impl Into<String>, mark: Mark) -> &mut Token {
        let token = Token::new(
            token_type,
            value,
            self.base + mark.pos,
            self.base + self.pos,
            mark.line,
            mark.column,
        );
        self.tokens.push(token);
        let last = self.tokens.len() - 1;
        &mut self.tokens[last]
    }

    /// Skip blanks and backslash-newline continuations
    fn skip_blanks(&mut self) {
        while let Some(c) = self.current() {
            if is_blank(c) {
                self.advance();
            } else if c == '\\' && self.peek(1) == Some('\n') {
                self.advance();
                self.advance();
            } else {
                break;
            }
        }
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.current() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
    }

    // =========================================================================
    // WORDS
    // =========================================================================

    fn case_state(&self) -> Option<CaseState> {
        self.case_states.last().copied()
    }

    fn set_case_state(&mut self, state: CaseState) {
        if let Some(top) = self.case_states.last_mut() {
            *top = state;
        }
    }

    fn read_word(&mut self) -> Result<(), LexerError> {
        if matches!(
            self.case_state(),
            Some(CaseState::Subject | CaseState::ExpectIn | CaseState::Patterns)
        ) {
            return self.read_case_word();
        }

        if self.command_start && self.for_state == ForState::None {
            if let Some(name_len) = self.assignment_at(self.pos) {
                return self.read_assignment(name_len);
            }
        }

        let mark = self.mark();
        let (raw, quoted) = self.read_raw_word()?;
        let plain = !quoted && !raw.contains('$') && !raw.contains('\\');

        match self.for_state {
            ForState::ExpectName => {
                self.for_state = ForState::ExpectIn;
                self.push(TokenType::Word, raw, mark).quoted = quoted;
                return Ok(());
            }
            ForState::ExpectIn if plain && raw == "in" => {
                self.for_state = ForState::None;
                self.push(TokenType::In, raw, mark);
                return Ok(());
            }
            _ => {}
        }

        if self.command_start && plain {
            if let Some(&keyword) = RESERVED_WORDS.get(raw.as_str()) {
                self.push(keyword, raw, mark);
                self.command_start = !matches!(
                    keyword,
                    TokenType::Fi
                        | TokenType::Done
                        | TokenType::For
                        | TokenType::Case
                        | TokenType::Esac
                        | TokenType::Function
                        | TokenType::RBrace
                );
                match keyword {
                    TokenType::For => self.for_state = ForState::ExpectName,
                    TokenType::Case => self.case_states.push(CaseState::Subject),
                    TokenType::Esac if self.case_state() == Some(CaseState::Body) => {
                        self.case_states.pop();
                    }
                    _ => {}
                }
                return Ok(());
            }

            if TYPE_KEYWORDS.contains(&raw.as_str()) {
                let mut ahead = self.pos;
                while self.input.get(ahead).is_some_and(|c| is_blank(*c)) {
                    ahead += 1;
                }
                if ahead > self.pos && self.assignment_at(ahead).is_some() {
                    self.push(TokenType::TypeName, raw, mark);
                    return Ok(());
                }
            }
        }

        let names_function = plain
            && is_valid_name(&raw)
            && (self.command_start || self.last_type() == Some(TokenType::Function));
        let after_function_keyword = self.last_type() == Some(TokenType::Function);

        let token_type = if quoted {
            TokenType::Word
        } else {
            classify_number(&raw).unwrap_or(TokenType::Word)
        };
        self.push(token_type, raw, mark).quoted = quoted;
        self.command_start = false;

        if names_function && self.read_function_parens() {
            self.command_start = true;
        } else if after_function_keyword {
            // `function name {`
            self.command_start = true;
        }
        Ok(())
    }

    fn last_type(&self) -> Option<TokenType> {
        self.tokens.last().map(|t| t.token_type)
    }

    /// Consume `()` (blanks allowed inside) following a function name
    fn read_function_parens(&mut self) -> bool {
        let mut ahead = self.pos;
        while self.input.get(ahead).is_some_and(|c| is_blank(*c)) {
            ahead += 1;
        }
        if self.input.get(ahead) != Some(&'(') {
            return false;
        }
        let mut close = ahead + 1;
        while self.input.get(close).is_some_and(|c| is_blank(*c)) {
            close += 1;
        }
        if self.input.get(close) != Some(&')') {
            return false;
        }

        while self.pos < ahead {
            self.advance();
        }
        let mark = self.mark();
        while self.pos <= close {
            self.advance();
        }
        self.push(TokenType::FuncParens, "()", mark);
        true
    }

    /// Words inside `case` before an arm body: the subject, `in`, patterns
    fn read_case_word(&mut self) -> Result<(), LexerError> {
        let mark = self.mark();
        let (raw, quoted) = self.read_raw_word()?;
        let plain = !quoted && !raw.contains('$') && !raw.contains('\\');
        self.command_start = false;

        match self.case_state() {
            Some(CaseState::Subject) => self.set_case_state(CaseState::ExpectIn),
            Some(CaseState::ExpectIn) => {
                if plain && raw == "in" {
                    self.push(TokenType::In, raw, mark);
                    self.set_case_state(CaseState::Patterns);
                    return Ok(());
                }
                // Missing `in`; the parser reports it
                self.case_states.pop();
            }
            Some(CaseState::Patterns) if plain && raw == "esac" => {
                self.push(TokenType::Esac, raw, mark);
                self.case_states.pop();
                return Ok(());
            }
            _ => {}
        }
        self.push(TokenType::Word, raw, mark).quoted = quoted;
        Ok(())
    }

    /// Length of `name` when `name=` starts at `at`
    fn assignment_at(&self, at: usize) -> Option<usize> {
        let first = *self.input.get(at)?;
        if !is_name_start(first) {
            return None;
        }
        let mut len = 1;
        while self.input.get(at + len).is_some_and(|c| is_name_char(*c)) {
            len += 1;
        }
        (self.input.get(at + len) == Some(&'=')).then_some(len)
    }

    /// Read a raw word honoring quotes, escapes and `${...}`
    fn read_raw_word(&mut self) -> Result<(String, bool), LexerError> {
        let mut raw = String::new();
        let mut quoted = false;

        while let Some(c) = self.current() {
            if is_word_boundary(c) {
                break;
            }
            match c {
                '\\' => {
                    self.advance();
                    match self.current() {
                        Some('\n') => {
                            self.advance();
                        }
                        Some(next) => {
                            raw.push('\\');
                            raw.push(next);
                            self.advance();
                        }
                        None => raw.push('\\'),
                    }
                }
                '\'' | '"' => {
                    quoted = true;
                    self.read_quoted(c, &mut raw)?;
                }
                '$' if self.peek(1) == Some('{') => {
                    let mark = self.mark();
                    loop {
                        match self.advance() {
                            Some('}') => {
                                raw.push('}');
                                break;
                            }
                            Some(ch) => raw.push(ch),
                            None => {
                                return Err(LexerError::unterminated(
                                    "Unterminated `${`",
                                    self.span_from(mark),
                                ))
                            }
                        }
                    }
                }
                _ => {
                    raw.push(c);
                    self.advance();
                }
            }
        }

        Ok((raw, quoted))
    }

    /// Copy a quoted section, quotes included, into `out`
    fn read_quoted(&mut self, quote: char, out: &mut String) -> Result<(), LexerError> {
        let mark = self.mark();
        self.advance();
        out.push(quote);
        loop {
            match self.current() {
                None => {
                    let which = if quote == '"' { "double" } else { "single" };
                    return Err(LexerError::unterminated(
                        format!("Unterminated {} quote", which),
                        Span::new(mark.line, mark.column, self.base + mark.pos, 1),
                    ));
                }
                Some('\\') if quote == '"' => {
                    out.push('\\');
                    self.advance();
                    if let Some(next) = self.advance() {
                        out.push(next);
                    }
                }
                Some(c) => {
                    out.push(c);
                    self.advance();
                    if c == quote {
                        return Ok(());
                    }
                }
            }
        }
    }

    // =========================================================================
    // ASSIGNMENTS & EXPRESSION MODE
    // =========================================================================

    fn read_assignment(&mut self, name_len: usize) -> Result<(), LexerError> {
        let mark = self.mark();
        let name: String = self.input[self.pos..self.pos + name_len].iter().collect();
        for _ in 0..name_len {
            self.advance();
        }
        self.push(TokenType::AssignName, name, mark);

        let mark = self.mark();
        self.advance();
        self.push(TokenType::Assign, "=", mark);
        self.command_start = false;

        if self.value_is_expression() {
            self.read_expression()
        } else {
            let mark = self.mark();
            let (raw, quoted) = self.read_raw_word()?;
            self.push(TokenType::Word, raw, mark).quoted = quoted;
            Ok(())
        }
    }

    /// Decide whether the text after `=` is an expression or plain word text.
    ///
    /// Literals, quoted strings, arrays and `name op ...` forms are expressions.
    /// Anything else (`$HOME/bin`, `/usr/bin`, `file.txt`) is a word with
    /// variable interpolation.
    fn value_is_expression(&self) -> bool {
        let Some(c) = self.current() else { return false };
        match c {
            '[' | '(' | '"' | '\'' => true,
            '0'..='9' => true,
            '.' => self.peek(1).is_some_and(|n| n.is_ascii_digit()),
            '-' => self
                .peek(1)
                .is_some_and(|n| n.is_ascii_digit() || n == '(' || n == '$' || is_name_start(n)),
            c if is_name_start(c) => {
                let mut ahead = self.pos;
                while self.input.get(ahead).is_some_and(|c| is_name_char(*c)) {
                    ahead += 1;
                }
                match self.input.get(ahead) {
                    None => true,
                    Some(&next) => is_expression_terminator(next) || is_operator_start(next),
                }
            }
            _ => false,
        }
    }

    fn read_expression(&mut self) -> Result<(), LexerError> {
        // Open brackets with their positions, for unterminated-array reports
        let mut open: Vec<(char, Mark)> = Vec::new();

        loop {
            if !open.is_empty() {
                while self.current().is_some_and(|c| is_blank(c) || c == '\n') {
                    self.advance();
                }
            }

            let Some(c) = self.current() else {
                if let Some((bracket, mark)) = open.last() {
                    let what = if *bracket == '[' { "array literal" } else { "parenthesis" };
                    return Err(LexerError::unterminated(
                        format!("Unterminated {}", what),
                        Span::new(mark.line, mark.column, self.base + mark.pos, 1),
                    ));
                }
                break;
            };

            if open.is_empty() && is_expression_terminator(c) {
                break;
            }

            let mark = self.mark();
            match c {
                '0'..='9' | '.' => self.read_number(mark)?,
                '"' | '\'' => {
                    let mut raw = String::new();
                    self.read_quoted(c, &mut raw)?;
                    self.push(TokenType::Str, raw, mark).quoted = true;
                }
                '$' => {
                    let raw = self.read_var_ref(mark)?;
                    self.push(TokenType::VarRef, raw, mark);
                }
                c if is_name_start(c) => {
                    let mut name = String::new();
                    while let Some(ch) = self.current().filter(|ch| is_name_char(*ch)) {
                        name.push(ch);
                        self.advance();
                    }
                    self.push(TokenType::Ident, name, mark);
                }
                '[' | '(' => {
                    self.advance();
                    open.push((c, mark));
                    let token_type = if c == '[' { TokenType::LBracket } else { TokenType::ExprLParen };
                    self.push(token_type, c.to_string(), mark);
                }
                ']' | ')' => {
                    self.advance();
                    let expected = if c == ']' { '[' } else { '(' };
                    match open.pop() {
                        Some((bracket, _)) if bracket == expected => {}
                        _ => {
                            return Err(LexerError::new(
                                format!("Unmatched `{}`", c),
                                self.span_from(mark),
                            ))
                        }
                    }
                    let token_type = if c == ']' { TokenType::RBracket } else { TokenType::ExprRParen };
                    self.push(token_type, c.to_string(), mark);
                }
                ',' => {
                    self.advance();
                    self.push(TokenType::Comma, ",", mark);
                }
                _ => self.read_operator(c, mark)?,
            }
        }

        Ok(())
    }

    fn read_number(&mut self, mark: Mark) -> Result<(), LexerError> {
        let mut raw = String::new();
        while let Some(c) = self.current() {
            let exponent_sign = (c == '-' || c == '+') && raw.ends_with(['e', 'E']);
            if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || exponent_sign {
                raw.push(c);
                self.advance();
            } else {
                break;
            }
        }
        match classify_number(&raw) {
            Some(token_type) => {
                self.push(token_type, raw, mark);
                Ok(())
            }
            None => Err(LexerError::new(
                format!("Malformed number `{}`", raw),
                self.span_from(mark),
            )),
        }
    }

    /// `$name`, `${name}`, `$?`, `$#`, `$1` with an optional `[index]`
    fn read_var_ref(&mut self, mark: Mark) -> Result<String, LexerError> {
        let mut raw = String::from("$");
        self.advance();

        match self.current() {
            Some('{') => {
                loop {
                    match self.advance() {
                        Some('}') => {
                            raw.push('}');
                            break;
                        }
                        Some(ch) => raw.push(ch),
                        None => {
                            return Err(LexerError::unterminated(
                                "Unterminated `${`",
                                self.span_from(mark),
                            ))
                        }
                    }
                }
                return Ok(raw);
            }
            Some(c @ ('?' | '#')) | Some(c @ '0'..='9') => {
                raw.push(c);
                self.advance();
                return Ok(raw);
            }
            Some(c) if is_name_start(c) => {
                while let Some(ch) = self.current().filter(|ch| is_name_char(*ch)) {
                    raw.push(ch);
                    self.advance();
                }
            }
            _ => {
                return Err(LexerError::new(
                    "Expected a variable name after `$`",
                    self.span_from(mark),
                ))
            }
        }

        if self.current() == Some('[') {
            let bracket = self.mark();
            loop {
                match self.advance() {
                    Some(']') => {
                        raw.push(']');
                        break;
                    }
                    Some('\n') | None => {
                        return Err(LexerError::unterminated(
                            "Unterminated index `[`",
                            Span::new(bracket.line, bracket.column, self.base + bracket.pos, 1),
                        ))
                    }
                    Some(ch) => raw.push(ch),
                }
            }
        }
        Ok(raw)
    }

    fn read_operator(&mut self, c: char, mark: Mark) -> Result<(), LexerError> {
        let next = self.peek(1);
        let (token_type, text) = match (c, next) {
            ('=', Some('=')) => (TokenType::EqEq, "=="),
            ('!', Some('=')) => (TokenType::NotEq, "!="),
            ('<', Some('=')) => (TokenType::Le, "<="),
            ('>', Some('=')) => (TokenType::Ge, ">="),
            ('<', _) => (TokenType::Lt, "<"),
            ('>', _) => (TokenType::Gt, ">"),
            ('+', _) => (TokenType::Plus, "+"),
            ('-', _) => (TokenType::Minus, "-"),
            ('*', _) => (TokenType::Star, "*"),
            ('/', _) => (TokenType::Slash, "/"),
            ('%', _) => (TokenType::Percent, "%"),
            _ => {
                self.advance();
                return Err(LexerError::new(
                    format!("Unexpected character `{}` in expression", c),
                    self.span_from(mark),
                ));
            }
        };
        for _ in 0..text.len() {
            self.advance();
        }
        self.push(token_type, text, mark);
        Ok(())
    }

    // =========================================================================
    // SUBSHELL CAPTURE
    // =========================================================================

    /// Capture `( body )` as LParen, optional Shebang, SubshellBody, RParen
    fn read_subshell(&mut self) -> Result<(), LexerError> {
        let open = self.mark();
        self.advance();
        self.push(TokenType::LParen, "(", open);

        let body_mark = self.mark();
        let mut body = String::new();
        let mut depth = 1usize;
        let mut line_start = true;

        let unterminated = |lexer: &Self| {
            LexerError::unterminated(
                "Unterminated subshell: missing `)`",
                Span::new(open.line, open.column, lexer.base + open.pos, 1),
            )
        };

        loop {
            let Some(c) = self.current() else {
                return Err(unterminated(self));
            };
            match c {
                '(' => {
                    depth += 1;
                    body.push(c);
                    self.advance();
                }
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    body.push(c);
                    self.advance();
                }
                '\\' => {
                    body.push(c);
                    self.advance();
                    if let Some(next) = self.advance() {
                        body.push(next);
                    }
                }
                '\'' | '"' => {
                    if self.read_quoted(c, &mut body).is_err() {
                        return Err(unterminated(self));
                    }
                }
                '#' if line_start || body.ends_with(is_blank) => {
                    while let Some(ch) = self.current().filter(|ch| *ch != '\n') {
                        body.push(ch);
                        self.advance();
                    }
                }
                _ => {
                    body.push(c);
                    self.advance();
                }
            }
            line_start = body.ends_with('\n');
        }

        // Shebang on the first non-blank line
        let leading: usize = body
            .chars()
            .take_while(|c| is_blank(*c) || *c == '\n')
            .count();
        let rest: String = body.chars().skip(leading).collect();
        if rest.starts_with("#!") {
            let (mut line, mut column) = (body_mark.line, body_mark.column);
            for c in body.chars().take(leading) {
                if c == '\n' {
                    line += 1;
                    column = 1;
                } else {
                    column += 1;
                }
            }
            let shebang_line: String = rest.chars().take_while(|c| *c != '\n').collect();
            let length = shebang_line.chars().count();
            let start = self.base + body_mark.pos + leading;
            self.tokens.push(Token::new(
                TokenType::Shebang,
                shebang_line[2..].trim(),
                start,
                start + length,
                line,
                column,
            ));
        }

        self.push(TokenType::SubshellBody, body, body_mark);

        let close = self.mark();
        self.advance();
        self.push(TokenType::RParen, ")", close);
        Ok(())
    }
}

/// Tokenize a complete source text
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexerError> {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types(source: &str) -> Vec<TokenType> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.token_type)
            .collect()
    }

    #[test]
    fn test_simple_command() {
        let tokens = tokenize("echo hello world").unwrap();
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[0].value, "echo");
        assert_eq!(tokens[2].value, "world");
        assert_eq!(tokens[2].column, 12);
        assert_eq!(tokens[3].token_type, TokenType::Eof);
    }

    #[test]
    fn test_reserved_words_only_in_command_position() {
        assert_eq!(
            types("echo done"),
            vec![TokenType::Word, TokenType::Word, TokenType::Eof]
        );
        assert_eq!(
            types("if true; then echo foo; fi; done"),
            vec![
                TokenType::If,
                TokenType::Word,
                TokenType::Semicolon,
                TokenType::Then,
                TokenType::Word,
                TokenType::Word,
                TokenType::Semicolon,
                TokenType::Fi,
                TokenType::Semicolon,
                TokenType::Done,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_done_position() {
        // The prefix `if true; then echo foo; fi; ` is 28 characters long,
        // so the 1-based column of `done` is 29. Counting only up to `fi`
        // and forgetting the `; ` separator gives 26, which is wrong.
        let tokens = tokenize("if true; then echo foo; fi; done").unwrap();
        let done = tokens.iter().find(|t| t.token_type == TokenType::Done).unwrap();
        assert_eq!(done.line, 1);
        assert_eq!(done.column, 29);
        assert_eq!(done.length(), 4);
    }

    #[test]
    fn test_for_loop_keywords() {
        assert_eq!(
            types("for x in a b; do echo $x; done"),
            vec![
                TokenType::For,
                TokenType::Word,
                TokenType::In,
                TokenType::Word,
                TokenType::Word,
                TokenType::Semicolon,
                TokenType::Do,
                TokenType::Word,
                TokenType::Word,
                TokenType::Semicolon,
                TokenType::Done,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_typed_assignment() {
        let tokens = tokenize("int i=2147483647").unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| t.token_type).collect();
        assert_eq!(
            kinds,
            vec![
                TokenType::TypeName,
                TokenType::AssignName,
                TokenType::Assign,
                TokenType::Int,
                TokenType::Eof
            ]
        );
        assert_eq!(tokens[1].value, "i");
        assert_eq!(tokens[3].value, "2147483647");
    }

    #[test]
    fn test_type_keyword_as_command() {
        assert_eq!(
            types("int foo"),
            vec![TokenType::Word, TokenType::Word, TokenType::Eof]
        );
    }

    #[test]
    fn test_expression_operators() {
        assert_eq!(
            types("i=i+1"),
            vec![
                TokenType::AssignName,
                TokenType::Assign,
                TokenType::Ident,
                TokenType::Plus,
                TokenType::Int,
                TokenType::Eof
            ]
        );
    }

    #[test]
    fn test_word_valued_assignment() {
        let tokens = tokenize("p=$HOME/bin").unwrap();
        assert_eq!(tokens[2].token_type, TokenType::Word);
        assert_eq!(tokens[2].value, "$HOME/bin");
    }

    #[test]
    fn test_multiline_array_tracks_lines() {
        let tokens = tokenize("a=[1,\n  \"foo\",\n  3.5]\necho $a").unwrap();
        let float = tokens.iter().find(|t| t.token_type == TokenType::Float).unwrap();
        assert_eq!((float.line, float.column), (3, 3));
        let echo = tokens.iter().find(|t| t.value == "echo").unwrap();
        assert_eq!((echo.line, echo.column), (4, 1));
    }

    #[test]
    fn test_unterminated_array_is_incomplete() {
        let err = tokenize("a=[1, 2").unwrap_err();
        assert!(err.incomplete);
        assert_eq!((err.span.line, err.span.column), (1, 3));
    }

    #[test]
    fn test_unterminated_quote() {
        let err = tokenize("echo \"abc").unwrap_err();
        assert!(err.incomplete);
        assert_eq!(err.span.column, 6);
        assert!(err.message.contains("double quote"));
    }

    #[test]
    fn test_subshell_with_shebang() {
        let source = "(\n#!/usr/bin/env python3\nprint(\"hi (there)\")\n) a b";
        let tokens = tokenize(source).unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| t.token_type).collect();
        assert_eq!(
            kinds,
            vec![
                TokenType::LParen,
                TokenType::Shebang,
                TokenType::SubshellBody,
                TokenType::RParen,
                TokenType::Word,
                TokenType::Word,
                TokenType::Eof
            ]
        );
        assert_eq!(tokens[1].value, "/usr/bin/env python3");
        assert_eq!((tokens[1].line, tokens[1].column), (2, 1));
        assert!(tokens[2].value.contains("print(\"hi (there)\")"));
        assert_eq!((tokens[3].line, tokens[3].column), (4, 1));
    }

    #[test]
    fn test_subshell_comment_with_apostrophe() {
        let tokens = tokenize("(\n#!/bin/sh\n# don't stop\necho hi\n)").unwrap();
        assert_eq!(tokens[3].token_type, TokenType::RParen);
    }

    #[test]
    fn test_unterminated_subshell() {
        let err = tokenize("(echo hi").unwrap_err();
        assert!(err.incomplete);
        assert_eq!(err.span.column, 1);
    }

    #[test]
    fn test_redirections_and_operators() {
        assert_eq!(
            types("cmd < in > out 2>> err && a || b | c"),
            vec![
                TokenType::Word,
                TokenType::Less,
                TokenType::Word,
                TokenType::Great,
                TokenType::Word,
                TokenType::ErrDGreat,
                TokenType::Word,
                TokenType::AndAnd,
                TokenType::Word,
                TokenType::OrOr,
                TokenType::Word,
                TokenType::Pipe,
                TokenType::Word,
                TokenType::Eof
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            types("echo a # trailing\n# whole line"),
            vec![
                TokenType::Word,
                TokenType::Word,
                TokenType::Newline,
                TokenType::Eof
            ]
        );
    }

    #[test]
    fn test_numbers_in_command_mode() {
        let tokens = tokenize("echo 42 3.5 1e3 4x").unwrap();
        assert_eq!(tokens[1].token_type, TokenType::Int);
        assert_eq!(tokens[2].token_type, TokenType::Float);
        assert_eq!(tokens[3].token_type, TokenType::Float);
        assert_eq!(tokens[4].token_type, TokenType::Word);
    }

    #[test]
    fn test_nested_origin_offsets() {
        let tokens = Lexer::with_origin("echo x", 3, 5, 20).tokenize().unwrap();
        assert_eq!((tokens[1].line, tokens[1].column), (3, 10));
        assert_eq!(tokens[1].start, 25);
    }

    #[test]
    fn test_case_patterns_and_arms() {
        assert_eq!(
            types("case $x in a|b) echo ab;; *) echo other;; esac"),
            vec![
                TokenType::Case,
                TokenType::Word,
                TokenType::In,
                TokenType::Word,
                TokenType::Pipe,
                TokenType::Word,
                TokenType::RParen,
                TokenType::Word,
                TokenType::Word,
                TokenType::DSemi,
                TokenType::Word,
                TokenType::RParen,
                TokenType::Word,
                TokenType::Word,
                TokenType::DSemi,
                TokenType::Esac,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_case_keywords_as_patterns() {
        let tokens = tokenize("case in in\n(in) echo x\nesac").unwrap();
        assert_eq!(tokens[1].token_type, TokenType::Word);
        assert_eq!(tokens[2].token_type, TokenType::In);
        assert_eq!(tokens[4].token_type, TokenType::Word);
        assert_eq!(tokens[5].token_type, TokenType::RParen);
        assert_eq!(tokens[tokens.len() - 2].token_type, TokenType::Esac);
    }

    #[test]
    fn test_double_semicolon_outside_case() {
        assert_eq!(
            types("echo a;; echo b"),
            vec![
                TokenType::Word,
                TokenType::Word,
                TokenType::Semicolon,
                TokenType::Semicolon,
                TokenType::Word,
                TokenType::Word,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_function_definitions() {
        assert_eq!(
            types("greet() { echo hi; }"),
            vec![
                TokenType::Word,
                TokenType::FuncParens,
                TokenType::LBrace,
                TokenType::Word,
                TokenType::Word,
                TokenType::Semicolon,
                TokenType::RBrace,
                TokenType::Eof,
            ]
        );
        assert_eq!(
            types("function greet\n{\necho }\n}")[..3],
            [TokenType::Function, TokenType::Word, TokenType::Newline]
        );
        assert_eq!(types("echo { }")[1..3], [TokenType::Word, TokenType::Word]);
    }
}
