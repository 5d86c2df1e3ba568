//! Expression Parser
//!
//! Precedence-climbing parser for assignment right-hand sides:
//!
//!   expr  ::= sum (cmpop sum)?
//!   sum   ::= term (('+' | '-') term)*
//!   term  ::= unary (('*' | '/' | '%') unary)*
//!   unary ::= '-' unary | atom
//!   atom  ::= INT | FLOAT | STRING | IDENT | VARREF | '(' expr ')' | array
//!   array ::= '[' (expr (',' expr)* ','?)? ']'

use crate::ast::types::{
    ArrayLiteralNode, BinaryOperator, ExprNode, LiteralNode, LiteralValue, Span, UnaryOperator,
    VariableRefNode,
};
use crate::parser::lexer::TokenType;
use crate::parser::parser::Parser;
use crate::parser::types::SyntaxError;
use crate::parser::word_parser::{parse_variable_ref, parse_word};

fn comparison_operator(t: TokenType) -> Option<BinaryOperator> {
    match t {
        TokenType::EqEq => Some(BinaryOperator::Eq),
        TokenType::NotEq => Some(BinaryOperator::Ne),
        TokenType::Lt => Some(BinaryOperator::Lt),
        TokenType::Gt => Some(BinaryOperator::Gt),
        TokenType::Le => Some(BinaryOperator::Le),
        TokenType::Ge => Some(BinaryOperator::Ge),
        _ => None,
    }
}

fn int_literal(text: &str, span: Span) -> Result<ExprNode, SyntaxError> {
    match text.parse::<i32>() {
        Ok(n) => Ok(ExprNode::Literal(LiteralNode {
            value: LiteralValue::Int(n),
            span,
        })),
        Err(_) => Err(SyntaxError::type_mismatch(
            format!("Integer literal `{}` does not fit in int", text),
            span,
        )),
    }
}

impl Parser {
    pub(crate) fn parse_expression(&mut self) -> Result<ExprNode, SyntaxError> {
        let left = self.parse_sum()?;
        match comparison_operator(self.current().token_type) {
            Some(op) => {
                self.advance();
                let right = self.parse_sum()?;
                Ok(binary(op, left, right))
            }
            None => Ok(left),
        }
    }

    fn parse_sum(&mut self) -> Result<ExprNode, SyntaxError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.current().token_type {
                TokenType::Plus => BinaryOperator::Add,
                TokenType::Minus => BinaryOperator::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_term()?;
            left = binary(op, left, right);
        }
    }

    fn parse_term(&mut self) -> Result<ExprNode, SyntaxError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current().token_type {
                TokenType::Star => BinaryOperator::Mul,
                TokenType::Slash => BinaryOperator::Div,
                TokenType::Percent => BinaryOperator::Rem,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
    }

    fn parse_unary(&mut self) -> Result<ExprNode, SyntaxError> {
        if !self.check(&[TokenType::Minus]) {
            return self.parse_atom();
        }
        let minus = self.advance();

        // Fold `-<int>` so that the int32 minimum is representable
        let next = self.current();
        if next.token_type == TokenType::Int && next.start == minus.end {
            let number = self.advance();
            let span = minus.span().to(number.span());
            return int_literal(&format!("-{}", number.value), span);
        }

        let operand = self.parse_unary()?;
        Ok(ExprNode::Unary {
            op: UnaryOperator::Neg,
            span: minus.span().to(operand.span()),
            operand: Box::new(operand),
        })
    }

    fn parse_atom(&mut self) -> Result<ExprNode, SyntaxError> {
        let token = self.current().clone();
        let span = token.span();
        match token.token_type {
            TokenType::Int => {
                self.advance();
                int_literal(&token.value, span)
            }
            TokenType::Float => {
                self.advance();
                let value = token.value.parse::<f64>().map_err(|_| {
                    SyntaxError::new(format!("Malformed number `{}`", token.value), span)
                })?;
                if !value.is_finite() {
                    return Err(SyntaxError::type_mismatch(
                        format!("float literal `{}` is out of range", token.value),
                        span,
                    ));
                }
                Ok(ExprNode::Literal(LiteralNode {
                    value: LiteralValue::Float {
                        value,
                        text: token.value.clone(),
                    },
                    span,
                }))
            }
            TokenType::Str => {
                self.advance();
                let word = parse_word(&token.value, span)?;
                Ok(match word.as_literal() {
                    Some(text) => ExprNode::Literal(LiteralNode {
                        value: LiteralValue::Str(text),
                        span,
                    }),
                    None => ExprNode::Interpolated(word),
                })
            }
            TokenType::Ident => {
                self.advance();
                Ok(ExprNode::Variable(VariableRefNode {
                    name: token.value,
                    index: None,
                    bare: true,
                    span,
                }))
            }
            TokenType::VarRef => {
                self.advance();
                Ok(ExprNode::Variable(parse_variable_ref(&token.value, span)?))
            }
            TokenType::ExprLParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(TokenType::ExprRParen)?;
                Ok(inner)
            }
            TokenType::LBracket => self.parse_array(),
            _ => {
                let found = self.current();
                Err(SyntaxError::new(
                    format!("Expected a value but found {}", found.describe()),
                    found.span(),
                ))
            }
        }
    }

    fn parse_array(&mut self) -> Result<ExprNode, SyntaxError> {
        let open = self.advance();
        let mut elements = Vec::new();

        while !self.check(&[TokenType::RBracket]) {
            elements.push(self.parse_expression()?);
            if self.check(&[TokenType::Comma]) {
                self.advance();
            } else if !self.check(&[TokenType::RBracket]) {
                let found = self.current();
                return Err(SyntaxError::new(
                    format!("Expected `,` or `]` but found {}", found.describe()),
                    found.span(),
                ));
            }
        }

        let close = self.advance();
        Ok(ExprNode::Array(ArrayLiteralNode {
            elements,
            span: open.span().to(close.span()),
        }))
    }
}

fn binary(op: BinaryOperator, left: ExprNode, right: ExprNode) -> ExprNode {
    ExprNode::Binary {
        op,
        span: left.span().to(right.span()),
        left: Box::new(left),
        right: Box::new(right),
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::types::{BinaryOperator, CommandNode, ExprNode, LiteralValue};
    use crate::parser::parser::parse;

    fn value(source: &str) -> ExprNode {
        let script = parse(source).unwrap();
        match &script.statements[0].pipelines[0].commands[0] {
            CommandNode::Assignment(a) => a.value.clone(),
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        match value("x=1+2*3") {
            ExprNode::Binary { op: BinaryOperator::Add, right, .. } => {
                assert!(matches!(*right, ExprNode::Binary { op: BinaryOperator::Mul, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parenthesized() {
        match value("x=(1+2)*3") {
            ExprNode::Binary { op: BinaryOperator::Mul, left, .. } => {
                assert!(matches!(*left, ExprNode::Binary { op: BinaryOperator::Add, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_comparison() {
        assert!(matches!(value("x=a<=3"), ExprNode::Binary { op: BinaryOperator::Le, .. }));
    }

    #[test]
    fn test_array_literal_spans_lines() {
        match value("a=[1,\n \"foo\",\n 3.5,\n]") {
            ExprNode::Array(array) => {
                assert_eq!(array.elements.len(), 3);
                assert_eq!(array.span.line, 1);
                match &array.elements[2] {
                    ExprNode::Literal(lit) => {
                        assert!(matches!(&lit.value, LiteralValue::Float { value, text } if *value == 3.5 && text == "3.5"));
                        assert_eq!(lit.span.line, 3);
                    }
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_negative_literals() {
        match value("x=-5") {
            ExprNode::Literal(lit) => assert_eq!(lit.value, LiteralValue::Int(-5)),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(value("x=-(2)"), ExprNode::Unary { .. }));
    }

    #[test]
    fn test_missing_operand() {
        let err = parse("x=1+").unwrap_err();
        assert!(err.errors[0].message.starts_with("Expected a value"));
    }
}
