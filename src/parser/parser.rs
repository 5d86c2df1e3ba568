//! Recursive Descent Parser for Ox Scripts
//!
//! This parser consumes tokens from the lexer and produces an AST.
//!
//! Grammar (simplified):
//!   script     ::= statement (sep statement)*
//!   statement  ::= pipeline (('&&' | '||') pipeline)*
//!   pipeline   ::= ['!'] command ('|' command)*
//!   command    ::= if | loop | case | function | subshell | assignment | simple
//!   assignment ::= [type] NAME '=' expr
//!   simple     ::= word+ redirection*
//!
//! The parser keeps an explicit stack of open blocks so that a closing
//! keyword with nothing to close is reported on exactly that keyword. After
//! an error it skips to the next separator at block depth zero and carries
//! on, so a single `parse` reports every error in the input.

use tracing::trace;

use crate::ast::types::{
    AssignmentNode, CommandNode, ExprNode, LiteralNode, LiteralValue, PipelineNode,
    RedirectionNode, RedirectionOperator, ScriptNode, SimpleCommandNode, Span, StatementNode,
    StatementOperator, WordNode, DeclaredType,
};
use crate::parser::lexer::{Lexer, Token, TokenType};
use crate::parser::types::{
    is_redirection_token, ParseException, SyntaxError, MAX_INPUT_SIZE, MAX_PARSER_DEPTH,
};
use crate::parser::word_parser::parse_word;

/// Kind of construct waiting for its closing keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockKind {
    If,
    Loop,
    Case,
    Function,
}

impl BlockKind {
    fn closer(&self) -> &'static str {
        match self {
            BlockKind::If => "fi",
            BlockKind::Loop => "done",
            BlockKind::Case => "esac",
            BlockKind::Function => "}",
        }
    }

    fn context(&self) -> &'static str {
        match self {
            BlockKind::If => "if",
            BlockKind::Loop => "loop",
            BlockKind::Case => "case",
            BlockKind::Function => "function",
        }
    }

    fn owning(keyword: TokenType) -> Option<BlockKind> {
        match keyword {
            TokenType::Then | TokenType::Elif | TokenType::Else | TokenType::Fi => Some(BlockKind::If),
            TokenType::Do | TokenType::Done => Some(BlockKind::Loop),
            TokenType::Esac | TokenType::DSemi => Some(BlockKind::Case),
            TokenType::RBrace => Some(BlockKind::Function),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct OpenBlock {
    pub kind: BlockKind,
    pub keyword: Token,
}

/// Parser class
pub struct Parser {
    pub(crate) tokens: Vec<Token>,
    pub(crate) pos: usize,
    /// Open compound constructs, innermost last
    pub(crate) blocks: Vec<OpenBlock>,
    /// Further errors found inside nested subshell bodies
    pub(crate) extra_errors: Vec<SyntaxError>,
    /// Subshell nesting level
    pub(crate) depth: usize,
}

impl Parser {
    /// Create a parser over a token stream; a missing trailing `Eof` is added
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().map(|t| t.token_type) != Some(TokenType::Eof) {
            let (end, line, column) = tokens
                .last()
                .map_or((0, 1, 1), |t| (t.end, t.line, t.column + t.length()));
            tokens.push(Token::new(TokenType::Eof, "", end, end, line, column));
        }
        Parser {
            tokens,
            pos: 0,
            blocks: Vec::new(),
            extra_errors: Vec::new(),
            depth: 0,
        }
    }

    /// Parse every statement, collecting all errors
    pub fn parse_script(&mut self) -> Result<ScriptNode, ParseException> {
        let mut statements = Vec::new();
        let mut errors = Vec::new();

        while let Some(result) = self.next_statement() {
            match result {
                Ok(statement) => statements.push(statement),
                Err(error) => errors.push(error),
            }
            errors.append(&mut self.extra_errors);
        }

        if errors.is_empty() {
            Ok(ScriptNode { statements })
        } else {
            Err(ParseException::new(errors))
        }
    }

    /// Parse the next top-level statement.
    ///
    /// Returns `None` at end of input. After an error the parser has already
    /// recovered, so calling again continues with the following statement.
    pub fn next_statement(&mut self) -> Option<Result<StatementNode, SyntaxError>> {
        self.skip_separators();
        if self.check(&[TokenType::Eof]) {
            return None;
        }

        let result = match self.parse_statement() {
            Ok(statement) if self.at_separator() => Ok(statement),
            Ok(_) => Err(self.unexpected()),
            Err(error) => Err(error),
        };

        if let Err(error) = &result {
            trace!(line = error.span.line, column = error.span.column, "recovering from syntax error");
            self.recover();
        }
        Some(result)
    }

    // ===========================================================================
    // HELPER METHODS
    // ===========================================================================

    pub(crate) fn current(&self) -> &Token {
        let idx = self.pos.min(self.tokens.len().saturating_sub(1));
        &self.tokens[idx]
    }

    pub(crate) fn peek(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len().saturating_sub(1));
        &self.tokens[idx]
    }

    pub(crate) fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn check(&self, types: &[TokenType]) -> bool {
        types.contains(&self.current().token_type)
    }

    pub(crate) fn expect(&mut self, token_type: TokenType) -> Result<Token, SyntaxError> {
        if self.check(&[token_type]) {
            return Ok(self.advance());
        }
        if self.check(&[TokenType::Eof]) && !self.blocks.is_empty() {
            return Err(self.unclosed_block());
        }
        let token = self.current();
        Err(SyntaxError::new(
            format!("Expected `{}` but found {}", token_type, token.describe()),
            token.span(),
        ))
    }

    pub(crate) fn skip_newlines(&mut self) {
        while self.check(&[TokenType::Newline]) {
            self.advance();
        }
    }

    pub(crate) fn skip_separators(&mut self) {
        while self.check(&[TokenType::Newline, TokenType::Semicolon]) {
            self.advance();
        }
    }

    pub(crate) fn at_separator(&self) -> bool {
        self.check(&[TokenType::Newline, TokenType::Semicolon, TokenType::Eof])
    }

    /// Error for the current token appearing where it cannot
    pub(crate) fn unexpected(&self) -> SyntaxError {
        let token = self.current();
        if token.token_type == TokenType::Eof {
            return SyntaxError::incomplete("Unexpected end of input", token.span());
        }
        SyntaxError::new(format!("Unexpected {}", token.describe()), token.span())
    }

    /// Error for input ending while a block is still open
    pub(crate) fn unclosed_block(&self) -> SyntaxError {
        match self.blocks.last() {
            Some(open) => SyntaxError::incomplete(
                format!(
                    "Unexpected end of input: `{}` is missing `{}`",
                    open.keyword.value,
                    open.kind.closer()
                ),
                open.keyword.span(),
            ),
            None => SyntaxError::incomplete("Unexpected end of input", self.current().span()),
        }
    }

    /// Consume a block keyword that nothing here expects and describe it
    pub(crate) fn misplaced_keyword(&mut self, expected: &[TokenType]) -> SyntaxError {
        let token = self.advance();
        let owner = BlockKind::owning(token.token_type);
        let innermost = self.blocks.last().map(|b| b.kind);

        match owner {
            Some(kind) if innermost == Some(kind) && !expected.is_empty() => {
                let wanted: Vec<String> = expected.iter().map(|t| format!("`{}`", t)).collect();
                SyntaxError::new(
                    format!("Unexpected `{}`, expected {}", token.value, wanted.join(" or ")),
                    token.span(),
                )
            }
            Some(kind) => SyntaxError::new(
                format!("Found `{}` outside of {} context", token.value, kind.context()),
                token.span(),
            ),
            None => SyntaxError::new(format!("Unexpected `{}`", token.value), token.span()),
        }
    }

    /// Skip to the next separator at block depth zero
    fn recover(&mut self) {
        let mut depth = self.blocks.len();
        loop {
            match self.current().token_type {
                TokenType::Eof => break,
                TokenType::Newline | TokenType::Semicolon if depth == 0 => break,
                TokenType::If
                | TokenType::While
                | TokenType::Until
                | TokenType::For
                | TokenType::Case
                | TokenType::LBrace => depth += 1,
                TokenType::Fi | TokenType::Done | TokenType::Esac | TokenType::RBrace => {
                    depth = depth.saturating_sub(1)
                }
                _ => {}
            }
            self.advance();
        }
        self.blocks.clear();
    }

    pub(crate) fn enter_block(&mut self, kind: BlockKind, keyword: Token) -> Result<(), SyntaxError> {
        if self.blocks.len() + self.depth >= MAX_PARSER_DEPTH {
            return Err(SyntaxError::new("Maximum nesting depth exceeded", keyword.span()));
        }
        self.blocks.push(OpenBlock { kind, keyword });
        Ok(())
    }

    pub(crate) fn leave_block(&mut self) {
        self.blocks.pop();
    }

    // ===========================================================================
    // STATEMENTS
    // ===========================================================================

    /// Statements up to (not including) one of `terminators`
    pub(crate) fn parse_list(&mut self, terminators: &[TokenType]) -> Result<Vec<StatementNode>, SyntaxError> {
        let mut list = Vec::new();
        loop {
            self.skip_separators();
            if self.check(terminators) {
                return Ok(list);
            }
            if self.check(&[TokenType::Eof]) {
                return Err(self.unclosed_block());
            }
            if self.current().token_type.is_block_keyword() {
                return Err(self.misplaced_keyword(terminators));
            }
            list.push(self.parse_statement()?);
            if !self.at_separator() && !self.check(terminators) {
                return Err(self.unexpected());
            }
        }
    }

    pub(crate) fn parse_statement(&mut self) -> Result<StatementNode, SyntaxError> {
        let first = self.parse_pipeline()?;
        let mut span = first.span;
        let mut pipelines = vec![first];
        let mut operators = Vec::new();

        while self.check(&[TokenType::AndAnd, TokenType::OrOr]) {
            let op = self.advance();
            operators.push(if op.token_type == TokenType::AndAnd {
                StatementOperator::And
            } else {
                StatementOperator::Or
            });
            self.skip_newlines();
            if self.check(&[TokenType::Eof]) {
                return Err(SyntaxError::incomplete(
                    format!("Expected a command after `{}`", op.value),
                    op.span(),
                ));
            }
            let next = self.parse_pipeline()?;
            span = span.to(next.span);
            pipelines.push(next);
        }

        Ok(StatementNode {
            pipelines,
            operators,
            span,
        })
    }

    fn parse_pipeline(&mut self) -> Result<PipelineNode, SyntaxError> {
        let bang = self.check(&[TokenType::Bang]).then(|| self.advance());

        let first = self.parse_command()?;
        let mut span = bang.as_ref().map_or(first.span(), |b| b.span().to(first.span()));
        let mut commands = vec![first];

        while self.check(&[TokenType::Pipe]) {
            let pipe = self.advance();
            self.skip_newlines();
            if self.check(&[TokenType::Eof]) {
                return Err(SyntaxError::incomplete("Expected a command after `|`", pipe.span()));
            }
            let next = self.parse_command()?;
            span = span.to(next.span());
            commands.push(next);
        }

        Ok(PipelineNode {
            commands,
            negated: bang.is_some(),
            span,
        })
    }

    fn parse_command(&mut self) -> Result<CommandNode, SyntaxError> {
        let token_type = self.current().token_type;
        match token_type {
            TokenType::If => self.parse_if(),
            TokenType::While | TokenType::Until => self.parse_while(),
            TokenType::For => self.parse_for(),
            TokenType::Case => self.parse_case(),
            TokenType::Function => self.parse_function(),
            TokenType::Word if self.peek(1).token_type == TokenType::FuncParens => self.parse_function(),
            TokenType::LParen => self.parse_subshell(),
            TokenType::TypeName | TokenType::AssignName => self.parse_assignment(),
            TokenType::Word | TokenType::Int | TokenType::Float => self.parse_simple_command(),
            t if t.is_block_keyword() => Err(self.misplaced_keyword(&[])),
            t if is_redirection_token(t) => {
                let token = self.current();
                Err(SyntaxError::new(
                    format!("Missing command before `{}`", token.value),
                    token.span(),
                ))
            }
            _ => Err(self.unexpected()),
        }
    }

    // ===========================================================================
    // SIMPLE COMMANDS & WORDS
    // ===========================================================================

    fn parse_simple_command(&mut self) -> Result<CommandNode, SyntaxError> {
        let start = self.current().span();
        let (words, redirections, end) = self.parse_words_and_redirections()?;
        Ok(CommandNode::Simple(SimpleCommandNode {
            words,
            redirections,
            span: start.to(end),
        }))
    }

    /// Trailing words and redirections of a command; also returns the last span
    pub(crate) fn parse_words_and_redirections(
        &mut self,
    ) -> Result<(Vec<WordNode>, Vec<RedirectionNode>, Span), SyntaxError> {
        let mut words = Vec::new();
        let mut redirections = Vec::new();
        let mut end = self.current().span();

        loop {
            let token_type = self.current().token_type;
            if matches!(token_type, TokenType::Word | TokenType::Int | TokenType::Float) {
                let word = self.parse_word_token()?;
                end = word.span;
                words.push(word);
            } else if is_redirection_token(token_type) {
                let redirection = self.parse_redirection()?;
                end = redirection.span;
                redirections.push(redirection);
            } else {
                break;
            }
        }

        Ok((words, redirections, end))
    }

    pub(crate) fn parse_word_token(&mut self) -> Result<WordNode, SyntaxError> {
        let token = self.advance();
        parse_word(&token.value, token.span())
    }

    fn parse_redirection(&mut self) -> Result<RedirectionNode, SyntaxError> {
        let op = self.advance();
        let operator = match op.token_type {
            TokenType::Less => RedirectionOperator::Input,
            TokenType::Great => RedirectionOperator::Output,
            TokenType::DGreat => RedirectionOperator::Append,
            TokenType::ErrGreat => RedirectionOperator::ErrOutput,
            _ => RedirectionOperator::ErrAppend,
        };
        if !self.check(&[TokenType::Word, TokenType::Int, TokenType::Float]) {
            return Err(SyntaxError::new(
                format!("Expected a file name after `{}`", op.value),
                self.current().span(),
            ));
        }
        let target = self.parse_word_token()?;
        Ok(RedirectionNode {
            operator,
            span: op.span().to(target.span),
            target,
        })
    }

    // ===========================================================================
    // ASSIGNMENTS
    // ===========================================================================

    fn parse_assignment(&mut self) -> Result<CommandNode, SyntaxError> {
        let type_token = self.check(&[TokenType::TypeName]).then(|| self.advance());
        let declared = type_token
            .as_ref()
            .and_then(|t| DeclaredType::from_keyword(&t.value));

        let name = self.expect(TokenType::AssignName)?;
        let assign = self.expect(TokenType::Assign)?;

        let value = if self.check(&[TokenType::Word]) {
            let word = self.parse_word_token()?;
            match word.as_literal() {
                Some(text) => ExprNode::Literal(LiteralNode {
                    value: LiteralValue::Str(text),
                    span: word.span,
                }),
                None => ExprNode::Interpolated(word),
            }
        } else if self.current().token_type.is_expression() {
            let expr = self.parse_expression()?;
            if self.current().token_type.is_expression() {
                return Err(self.unexpected());
            }
            literalize_bare_identifier(expr)
        } else {
            ExprNode::Literal(LiteralNode {
                value: LiteralValue::Str(String::new()),
                span: Span { length: 1, ..assign.span() },
            })
        };

        if let Some(declared) = declared {
            check_declared_type(declared, &name.value, &value)?;
        }

        let start = type_token.as_ref().map_or(name.span(), |t| t.span());
        Ok(CommandNode::Assignment(AssignmentNode {
            name: name.value.clone(),
            declared,
            span: start.to(value.span()),
            name_span: name.span(),
            value,
        }))
    }
}

/// A lone bare identifier on an assignment right-hand side is text
fn literalize_bare_identifier(expr: ExprNode) -> ExprNode {
    match expr {
        ExprNode::Variable(var) if var.bare && var.index.is_none() => ExprNode::Literal(LiteralNode {
            value: LiteralValue::Str(var.name),
            span: var.span,
        }),
        other => other,
    }
}

/// Reject values that can never satisfy the declared type
pub fn check_declared_type(declared: DeclaredType, name: &str, value: &ExprNode) -> Result<(), SyntaxError> {
    let found = match (declared, value) {
        (DeclaredType::Int, ExprNode::Literal(LiteralNode { value: LiteralValue::Float { .. }, .. })) => {
            Some("float literal")
        }
        (DeclaredType::Int, ExprNode::Literal(LiteralNode { value: LiteralValue::Str(s), .. }))
            if s.trim().parse::<i32>().is_err() =>
        {
            Some("string literal")
        }
        (DeclaredType::Float, ExprNode::Literal(LiteralNode { value: LiteralValue::Str(s), .. }))
            if !s.trim().parse::<f64>().is_ok_and(f64::is_finite) =>
        {
            Some("string literal")
        }
        (DeclaredType::Int | DeclaredType::Float | DeclaredType::Str, ExprNode::Array(_)) => {
            Some("array literal")
        }
        (DeclaredType::Array, ExprNode::Literal(_)) => Some("scalar literal"),
        _ => None,
    };

    match found {
        Some(what) => Err(SyntaxError::type_mismatch(
            format!(
                "Type mismatch: cannot assign {} to `{}` variable `{}`",
                what, declared, name
            ),
            value.span(),
        )),
        None => Ok(()),
    }
}

/// Parse a source text
pub fn parse(source: &str) -> Result<ScriptNode, ParseException> {
    if source.len() > MAX_INPUT_SIZE {
        return Err(ParseException::new(vec![SyntaxError::new(
            format!(
                "Input too large: {} bytes exceeds limit of {}",
                source.len(),
                MAX_INPUT_SIZE
            ),
            Span::new(1, 1, 0, 1),
        )]));
    }
    let tokens = Lexer::new(source)
        .tokenize()
        .map_err(|e| ParseException::new(vec![e.into()]))?;
    parse_tokens(tokens)
}

/// Parse from pre-tokenized input
pub fn parse_tokens(tokens: Vec<Token>) -> Result<ScriptNode, ParseException> {
    Parser::new(tokens).parse_script()
}
