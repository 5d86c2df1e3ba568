//! Control Flow Execution
//!
//! Handles control flow constructs:
//! - if/elif/else
//! - while and until loops
//! - for-in loops
//! - case, matching glob patterns against a word
//! - break/continue signals, which unwind as `ExecError` variants
//!
//! Each construct runs in its own child scope, so weak bindings first
//! created inside it are dropped when it finishes.

use tracing::trace;

use crate::ast::types::{CaseNode, ConditionalNode, LoopKind, LoopNode, StatementNode, WordNode};
use crate::interpreter::errors::ExecError;
use crate::interpreter::execution_engine::Interpreter;
use crate::interpreter::pattern::glob_matches;
use crate::interpreter::value::Value;

/// What a loop does after one run of its body
enum LoopAction {
    Next,
    Stop,
}

impl Interpreter {
    pub(crate) fn execute_if(&mut self, node: &ConditionalNode) -> Result<i32, ExecError> {
        self.in_block_scope(|this| this.run_if(node))
    }

    fn run_if(&mut self, node: &ConditionalNode) -> Result<i32, ExecError> {
        for clause in &node.clauses {
            if self.execute_list(&clause.condition)? == 0 {
                return self.execute_list(&clause.body);
            }
        }
        match &node.else_body {
            Some(body) => self.execute_list(body),
            None => Ok(0),
        }
    }

    pub(crate) fn execute_loop(&mut self, node: &LoopNode) -> Result<i32, ExecError> {
        self.loop_depth += 1;
        let result = self.in_block_scope(|this| match &node.kind {
            LoopKind::While { condition } => this.run_conditional_loop(condition, &node.body, true),
            LoopKind::Until { condition } => this.run_conditional_loop(condition, &node.body, false),
            LoopKind::For { variable, words } => this.run_for_loop(variable, words, &node.body),
        });
        self.loop_depth -= 1;
        result
    }

    /// Run the first arm with a matching pattern; 1 when none matches
    pub(crate) fn execute_case(&mut self, node: &CaseNode) -> Result<i32, ExecError> {
        let subject = self.expand_word(&node.subject)?;
        for (index, arm) in node.arms.iter().enumerate() {
            for pattern in &arm.patterns {
                let pattern = self.expand_word(pattern)?;
                if glob_matches(&pattern, &subject) {
                    trace!(arm = index, %pattern, "case matched");
                    return self.in_block_scope(|this| this.execute_list(&arm.body));
                }
            }
        }
        Ok(1)
    }

    /// Run `f` inside a child scope that is popped on every exit path
    fn in_block_scope<F>(&mut self, f: F) -> Result<i32, ExecError>
    where
        F: FnOnce(&mut Self) -> Result<i32, ExecError>,
    {
        self.env.push_scope();
        let result = f(self);
        self.env.pop_scope();
        result
    }

    fn run_conditional_loop(
        &mut self,
        condition: &[StatementNode],
        body: &[StatementNode],
        run_while_true: bool,
    ) -> Result<i32, ExecError> {
        let mut status = 0;
        loop {
            let holds = self.execute_list(condition)? == 0;
            if holds != run_while_true {
                break;
            }
            let (action, body_status) = self.run_body(body)?;
            status = body_status;
            if let LoopAction::Stop = action {
                break;
            }
        }
        Ok(status)
    }

    fn run_for_loop(&mut self, variable: &str, words: &[WordNode], body: &[StatementNode]) -> Result<i32, ExecError> {
        let mut items = Vec::new();
        for word in words {
            match self.expand_word_value(word)? {
                Value::Array(elements) if word.as_single_variable().is_some() => items.extend(elements),
                Value::Array(elements) => items.push(Value::Array(elements)),
                value => items.push(value),
            }
        }

        let mut status = 0;
        for item in items {
            self.env
                .assign(variable, item)
                .map_err(|err| ExecError::from_value(err, words[0].span))?;
            let (action, body_status) = self.run_body(body)?;
            status = body_status;
            if let LoopAction::Stop = action {
                break;
            }
        }
        Ok(status)
    }

    /// Run a loop body, consuming one level of break/continue
    fn run_body(&mut self, body: &[StatementNode]) -> Result<(LoopAction, i32), ExecError> {
        match self.execute_list(body) {
            Ok(status) => Ok((LoopAction::Next, status)),
            Err(ExecError::Break { levels }) if levels > 1 => Err(ExecError::Break { levels: levels - 1 }),
            Err(ExecError::Break { .. }) => Ok((LoopAction::Stop, 0)),
            Err(ExecError::Continue { levels }) if levels > 1 => Err(ExecError::Continue { levels: levels - 1 }),
            Err(ExecError::Continue { .. }) => Ok((LoopAction::Next, 0)),
            Err(err) => Err(err),
        }
    }
}
