//! Compound Command Parser
//!
//! Parsing for if/while/until/for/case blocks, function definitions and
//! parenthesized subshells.
//! Subshell bodies are captured raw by the lexer and parsed here, either as
//! a nested Ox script or, behind a `#!` line, as opaque foreign text.

use tracing::debug;

use crate::ast::types::{
    CaseArm, CaseNode, CommandNode, ConditionalNode, ForeignBody, FunctionDefNode, IfClause,
    LoopKind, LoopNode, ScriptNode, SubshellBody, SubshellNode, WordNode, WordPart,
};
use crate::parser::lexer::{is_valid_name, Lexer, Token, TokenType};
use crate::parser::parser::{BlockKind, Parser};
use crate::parser::types::{SyntaxError, MAX_PARSER_DEPTH};
use crate::parser::word_parser::parse_word;

impl Parser {
    pub(crate) fn parse_if(&mut self) -> Result<CommandNode, SyntaxError> {
        let if_token = self.advance();
        self.enter_block(BlockKind::If, if_token.clone())?;

        let mut clauses = Vec::new();
        let condition = self.parse_list(&[TokenType::Then])?;
        self.expect(TokenType::Then)?;
        let body = self.parse_list(&[TokenType::Elif, TokenType::Else, TokenType::Fi])?;
        clauses.push(IfClause { condition, body });

        while self.check(&[TokenType::Elif]) {
            self.advance();
            let condition = self.parse_list(&[TokenType::Then])?;
            self.expect(TokenType::Then)?;
            let body = self.parse_list(&[TokenType::Elif, TokenType::Else, TokenType::Fi])?;
            clauses.push(IfClause { condition, body });
        }

        let else_body = if self.check(&[TokenType::Else]) {
            self.advance();
            Some(self.parse_list(&[TokenType::Fi])?)
        } else {
            None
        };

        let fi = self.expect(TokenType::Fi)?;
        self.leave_block();

        Ok(CommandNode::Conditional(ConditionalNode {
            clauses,
            else_body,
            span: if_token.span().to(fi.span()),
        }))
    }

    /// while/until loops
    pub(crate) fn parse_while(&mut self) -> Result<CommandNode, SyntaxError> {
        let keyword = self.advance();
        self.enter_block(BlockKind::Loop, keyword.clone())?;

        let condition = self.parse_list(&[TokenType::Do])?;
        self.expect(TokenType::Do)?;
        let body = self.parse_list(&[TokenType::Done])?;
        let done = self.expect(TokenType::Done)?;
        self.leave_block();

        let kind = if keyword.token_type == TokenType::Until {
            LoopKind::Until { condition }
        } else {
            LoopKind::While { condition }
        };
        Ok(CommandNode::Loop(LoopNode {
            kind,
            body,
            span: keyword.span().to(done.span()),
        }))
    }

    pub(crate) fn parse_for(&mut self) -> Result<CommandNode, SyntaxError> {
        let keyword = self.advance();
        self.enter_block(BlockKind::Loop, keyword.clone())?;

        let name = self.current().clone();
        if name.token_type != TokenType::Word || !is_valid_name(&name.value) {
            if name.token_type == TokenType::Eof {
                return Err(self.unclosed_block());
            }
            return Err(SyntaxError::new(
                format!("Invalid loop variable {}", name.describe()),
                name.span(),
            ));
        }
        self.advance();

        self.expect(TokenType::In)?;
        let mut words = Vec::new();
        while self.check(&[TokenType::Word, TokenType::Int, TokenType::Float]) {
            words.push(self.parse_word_token()?);
        }
        if !self.at_separator() {
            let found = self.current();
            return Err(SyntaxError::new(
                format!("Expected `;` or newline before `do` but found {}", found.describe()),
                found.span(),
            ));
        }
        self.skip_separators();

        self.expect(TokenType::Do)?;
        let body = self.parse_list(&[TokenType::Done])?;
        let done = self.expect(TokenType::Done)?;
        self.leave_block();

        Ok(CommandNode::Loop(LoopNode {
            kind: LoopKind::For {
                variable: name.value,
                words,
            },
            body,
            span: keyword.span().to(done.span()),
        }))
    }

    /// case WORD in [(]PATTERN [| PATTERN]...) LIST ;; ... esac
    pub(crate) fn parse_case(&mut self) -> Result<CommandNode, SyntaxError> {
        let keyword = self.advance();
        self.enter_block(BlockKind::Case, keyword.clone())?;

        let subject = match self.current().token_type {
            TokenType::Word | TokenType::Int | TokenType::Float => self.parse_word_token()?,
            TokenType::Eof => return Err(self.unclosed_block()),
            _ => {
                let found = self.current();
                return Err(SyntaxError::new(
                    format!("Expected a word after `case` but found {}", found.describe()),
                    found.span(),
                ));
            }
        };
        self.skip_newlines();
        self.expect(TokenType::In)?;

        let mut arms = Vec::new();
        loop {
            self.skip_separators();
            if self.check(&[TokenType::Esac]) {
                break;
            }
            if self.check(&[TokenType::Eof]) {
                return Err(self.unclosed_block());
            }

            let mut patterns = vec![self.parse_case_pattern()?];
            while self.check(&[TokenType::Pipe]) {
                self.advance();
                patterns.push(self.parse_case_pattern()?);
            }
            self.expect(TokenType::RParen)?;

            let body = self.parse_list(&[TokenType::DSemi, TokenType::Esac])?;
            arms.push(CaseArm { patterns, body });
            if self.check(&[TokenType::DSemi]) {
                self.advance();
            } else {
                break;
            }
        }

        let esac = self.expect(TokenType::Esac)?;
        self.leave_block();

        Ok(CommandNode::Case(CaseNode {
            subject,
            arms,
            span: keyword.span().to(esac.span()),
        }))
    }

    fn parse_case_pattern(&mut self) -> Result<WordNode, SyntaxError> {
        match self.current().token_type {
            TokenType::Word | TokenType::Int | TokenType::Float => self.parse_word_token(),
            TokenType::Eof => Err(self.unclosed_block()),
            _ => {
                let found = self.current();
                Err(SyntaxError::new(
                    format!("Expected a pattern but found {}", found.describe()),
                    found.span(),
                ))
            }
        }
    }

    /// NAME () { LIST } or function NAME [()] { LIST }
    pub(crate) fn parse_function(&mut self) -> Result<CommandNode, SyntaxError> {
        let start = self.current().span();
        if self.check(&[TokenType::Function]) {
            self.advance();
        }

        let name = self.current().clone();
        if name.token_type != TokenType::Word || !is_valid_name(&name.value) {
            return Err(SyntaxError::new(
                format!("Invalid function name {}", name.describe()),
                name.span(),
            ));
        }
        self.advance();
        if self.check(&[TokenType::FuncParens]) {
            self.advance();
        }
        self.skip_newlines();

        let open = self.current().clone();
        if open.token_type != TokenType::LBrace {
            if open.token_type == TokenType::Eof {
                return Err(SyntaxError::incomplete(
                    format!("Unexpected end of input: function `{}` has no body", name.value),
                    name.span(),
                ));
            }
            return Err(SyntaxError::new(
                format!("Expected `{{` to open the body of `{}` but found {}", name.value, open.describe()),
                open.span(),
            ));
        }
        self.advance();
        self.enter_block(BlockKind::Function, open)?;
        let body = self.parse_list(&[TokenType::RBrace])?;
        let close = self.expect(TokenType::RBrace)?;
        self.leave_block();
        debug!(name = %name.value, statements = body.len(), "function definition");

        Ok(CommandNode::FunctionDef(FunctionDefNode {
            name: name.value,
            body,
            span: start.to(close.span()),
        }))
    }

    /// ( [#!interpreter] body ) args... redirections...
    pub(crate) fn parse_subshell(&mut self) -> Result<CommandNode, SyntaxError> {
        let open = self.advance();
        let shebang = self.check(&[TokenType::Shebang]).then(|| self.advance());
        let body_token = self.expect(TokenType::SubshellBody)?;
        let close = self.expect(TokenType::RParen)?;

        let body = match shebang {
            Some(line) if !is_ox_shebang(&line.value) => SubshellBody::Foreign(foreign_body(&line, &body_token)?),
            _ => SubshellBody::Ox(self.parse_nested(&body_token)?),
        };

        let (args, redirections, end) = self.parse_words_and_redirections()?;
        let last = if args.is_empty() && redirections.is_empty() {
            close.span()
        } else {
            end
        };

        Ok(CommandNode::Subshell(SubshellNode {
            body,
            args,
            redirections,
            span: open.span().to(last),
        }))
    }

    /// Parse a captured body as Ox script, keeping absolute positions
    fn parse_nested(&mut self, body: &Token) -> Result<ScriptNode, SyntaxError> {
        if self.depth + self.blocks.len() >= MAX_PARSER_DEPTH {
            return Err(SyntaxError::new("Maximum nesting depth exceeded", body.span()));
        }

        let tokens = Lexer::with_origin(&body.value, body.line, body.column, body.start)
            .tokenize()
            .map_err(|e| SyntaxError {
                incomplete: false,
                ..SyntaxError::from(e)
            })?;

        let mut nested = Parser::new(tokens);
        nested.depth = self.depth + self.blocks.len() + 1;
        match nested.parse_script() {
            Ok(script) => Ok(script),
            Err(exception) => {
                let mut errors = exception.errors.into_iter().map(|e| SyntaxError {
                    incomplete: false,
                    ..e
                });
                let first = errors.next();
                self.extra_errors.extend(errors);
                Err(first.unwrap_or_else(|| SyntaxError::new("Invalid subshell body", body.span())))
            }
        }
    }
}

/// A shebang naming this shell runs the body as Ox
fn is_ox_shebang(line: &str) -> bool {
    let program = line.split_whitespace().next().unwrap_or("");
    program == "ox" || program.ends_with("/ox")
}

fn foreign_body(shebang: &Token, body: &Token) -> Result<ForeignBody, SyntaxError> {
    let mut fields = shebang.value.split_whitespace();
    let Some(program) = fields.next() else {
        return Err(SyntaxError::new("Missing interpreter after `#!`", shebang.span()));
    };

    let interpreter = if program.contains('$') {
        parse_word(program, shebang.span())?
    } else {
        WordNode {
            parts: vec![WordPart::Literal(program.to_string())],
            span: shebang.span(),
        }
    };
    debug!(interpreter = program, "foreign subshell body");

    Ok(ForeignBody {
        interpreter,
        interpreter_args: fields.map(str::to_string).collect(),
        text: body.value.trim_start_matches(['\n', ' ', '\t', '\r']).to_string(),
        shebang_span: shebang.span(),
    })
}
