//! Expression Evaluation
//!
//! Evaluates assignment right-hand sides. Operators are polymorphic over
//! int and float (see `Value::binary`); every failure is tagged with the
//! span of the operator node that raised it.

use crate::ast::types::{ExprNode, UnaryOperator};
use crate::interpreter::errors::ExecError;
use crate::interpreter::execution_engine::Interpreter;
use crate::interpreter::value::Value;

impl Interpreter {
    pub fn evaluate(&self, expr: &ExprNode) -> Result<Value, ExecError> {
        match expr {
            ExprNode::Literal(node) => Ok(Value::from_literal(&node.value)),
            ExprNode::Variable(var) => self.lookup_variable(var),
            ExprNode::Array(node) => node
                .elements
                .iter()
                .map(|element| self.evaluate(element))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            ExprNode::Interpolated(word) => self.expand_word_value(word),
            ExprNode::Unary { op, operand, span } => {
                let value = self.evaluate(operand)?;
                match op {
                    UnaryOperator::Neg => value.negate().map_err(|err| ExecError::from_value(err, *span)),
                }
            }
            ExprNode::Binary { op, left, right, span } => {
                let lhs = self.evaluate(left)?;
                let rhs = self.evaluate(right)?;
                Value::binary(*op, &lhs, &rhs).map_err(|err| ExecError::from_value(err, *span))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::CommandNode;
    use crate::interpreter::execution_engine::test_support::interpreter;
    use crate::parser::parse;

    /// Evaluate the right-hand side of `x=<source>`
    fn eval(interp: &Interpreter, source: &str) -> Result<Value, ExecError> {
        let script = parse(&format!("x={}", source)).unwrap();
        match &script.statements[0].pipelines[0].commands[0] {
            CommandNode::Assignment(node) => interp.evaluate(&node.value),
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence_and_promotion() {
        let interp = interpreter();
        assert_eq!(eval(&interp, "1+2*3").unwrap(), Value::Int(7));
        assert_eq!(eval(&interp, "(1+2)*3").unwrap(), Value::Int(9));
        assert_eq!(eval(&interp, "7/2").unwrap(), Value::Int(3));
        assert_eq!(eval(&interp, "7/2.0").unwrap(), Value::float(3.5));
        assert_eq!(eval(&interp, "-3+1").unwrap(), Value::Int(-2));
    }

    #[test]
    fn test_comparisons_yield_ints() {
        let interp = interpreter();
        assert_eq!(eval(&interp, "2<3").unwrap(), Value::Int(1));
        assert_eq!(eval(&interp, "2==2.0").unwrap(), Value::Int(1));
        assert_eq!(eval(&interp, "2!=2").unwrap(), Value::Int(0));
    }

    #[test]
    fn test_errors_carry_operator_span() {
        let mut interp = interpreter();
        interp.env.assign("s", Value::Str("text".into())).unwrap();
        let err = eval(&interp, "s+1").unwrap_err();
        assert!(matches!(err, ExecError::TypeMismatch { .. }));
        assert_eq!(err.span().map(|s| s.column), Some(3));

        let err = eval(&interp, "1/0").unwrap_err();
        assert!(err.to_string().contains("division by zero"));
    }

    #[test]
    fn test_array_elements_evaluate() {
        let interp = interpreter();
        assert_eq!(
            eval(&interp, "[1+1, \"a\"]").unwrap(),
            Value::Array(vec![Value::Int(2), Value::Str("a".into())])
        );
    }
}
