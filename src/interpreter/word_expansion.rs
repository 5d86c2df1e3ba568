//! Word Expansion
//!
//! Turns words into text and variable references into values:
//! - literal runs are copied as-is
//! - `$name`, `${name}` and `$name[i]` are looked up through the scope chain
//! - `$?` is the last exit status
//! - arrays interpolate as their elements joined by single spaces
//!
//! There is no word splitting and no globbing; one word stays one argument.

use crate::ast::types::{IndexNode, VariableRefNode, WordNode, WordPart};
use crate::interpreter::errors::ExecError;
use crate::interpreter::execution_engine::Interpreter;
use crate::interpreter::value::Value;

impl Interpreter {
    /// Resolve a variable reference, failing when it is unbound everywhere.
    pub fn lookup_variable(&self, var: &VariableRefNode) -> Result<Value, ExecError> {
        let value = self.variable_value(&var.name).ok_or_else(|| ExecError::UnboundVariable {
            name: var.name.clone(),
            span: var.span,
        })?;

        let Some(index) = &var.index else {
            return Ok(value);
        };
        let position = match index {
            IndexNode::Number(n) => *n,
            IndexNode::Variable(name) => match self.variable_value(name) {
                Some(Value::Int(n)) => i64::from(n),
                Some(other) => {
                    return Err(ExecError::TypeMismatch {
                        message: format!("array index `{}` must be an int, found {}", name, other.type_name()),
                        span: var.span,
                    })
                }
                None => {
                    return Err(ExecError::UnboundVariable {
                        name: name.clone(),
                        span: var.span,
                    })
                }
            },
        };
        value.index(position).map_err(|err| ExecError::from_value(err, var.span))
    }

    fn variable_value(&self, name: &str) -> Option<Value> {
        match name {
            "?" => Some(Value::Int(self.last_exit)),
            _ => self.env.get(name).cloned(),
        }
    }

    /// Expand a word to text.
    pub fn expand_word(&self, word: &WordNode) -> Result<String, ExecError> {
        let mut text = String::new();
        for part in &word.parts {
            match part {
                WordPart::Literal(s) => text.push_str(s),
                WordPart::Variable(var) => text.push_str(&self.lookup_variable(var)?.to_string()),
            }
        }
        Ok(text)
    }

    /// Expand a word, keeping the natural type of a lone `$name`.
    pub fn expand_word_value(&self, word: &WordNode) -> Result<Value, ExecError> {
        match word.as_single_variable() {
            Some(var) => self.lookup_variable(var),
            None => self.expand_word(word).map(Value::Str),
        }
    }

    pub fn expand_words(&self, words: &[WordNode]) -> Result<Vec<String>, ExecError> {
        words.iter().map(|word| self.expand_word(word)).collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::types::Span;
    use crate::interpreter::execution_engine::test_support::interpreter;
    use crate::interpreter::value::Value;
    use crate::parser::word_parser::parse_word;

    fn word(raw: &str) -> crate::ast::types::WordNode {
        parse_word(raw, Span::new(1, 1, 0, raw.chars().count())).unwrap()
    }

    #[test]
    fn test_expands_mixed_word() {
        let mut interp = interpreter();
        interp.env.assign("dir", Value::Str("/opt".into())).unwrap();
        assert_eq!(interp.expand_word(&word("$dir/bin")).unwrap(), "/opt/bin");
        assert_eq!(interp.expand_word(&word("${dir}x")).unwrap(), "/optx");
    }

    #[test]
    fn test_indexing() {
        let mut interp = interpreter();
        let items = Value::Array(vec![Value::Int(1), Value::Str("foo".into()), Value::float(3.5)]);
        interp.env.assign("a", items).unwrap();
        interp.env.assign("i", Value::Int(1)).unwrap();
        assert_eq!(interp.expand_word(&word("$a[0]")).unwrap(), "1");
        assert_eq!(interp.expand_word(&word("$a[i]")).unwrap(), "foo");
        assert_eq!(interp.expand_word(&word("$a[-1]")).unwrap(), "3.5");
        assert!(interp.expand_word(&word("$a[7]")).is_err());
    }

    #[test]
    fn test_single_variable_keeps_type() {
        let mut interp = interpreter();
        interp.env.assign("n", Value::Int(7)).unwrap();
        assert_eq!(interp.expand_word_value(&word("$n")).unwrap(), Value::Int(7));
        assert_eq!(interp.expand_word_value(&word("n=$n")).unwrap(), Value::Str("n=7".into()));
    }

    #[test]
    fn test_last_status() {
        let mut interp = interpreter();
        interp.last_exit = 4;
        assert_eq!(interp.expand_word(&word("$?")).unwrap(), "4");
    }
}
