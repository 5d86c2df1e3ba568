//! Abstract Syntax Tree (AST) Types for Ox
//!
//! This module defines the syntax tree produced by the parser. Every node
//! carries a `Span` so that parse-time and run-time failures can both be
//! reported against the exact source text that produced them.

use std::fmt;

// =============================================================================
// BASE TYPES
// =============================================================================

/// Region of source text.
///
/// `line` and `column` are 1-based, `offset` is the 0-based character index of
/// the first character and `length` counts characters. A span may run past the
/// end of its first line; the diagnostic renderer clamps it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Span {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
    pub length: usize,
}

impl Span {
    pub fn new(line: usize, column: usize, offset: usize, length: usize) -> Self {
        Self { line, column, offset, length }
    }

    /// Span starting at `self` and ending where `end` ends.
    pub fn to(self, end: Span) -> Span {
        let stop = (end.offset + end.length).max(self.offset + self.length);
        Span {
            line: self.line,
            column: self.column,
            offset: self.offset,
            length: stop - self.offset,
        }
    }

    /// Offset one past the last character.
    pub fn end(&self) -> usize {
        self.offset + self.length
    }
}

// =============================================================================
// SCRIPT & STATEMENTS
// =============================================================================

/// Root node: a complete script
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptNode {
    pub statements: Vec<StatementNode>,
}

/// A statement is a list of pipelines connected by && or ||
#[derive(Debug, Clone, PartialEq)]
pub struct StatementNode {
    pub pipelines: Vec<PipelineNode>,
    /// Operators between pipelines, `pipelines.len() - 1` of them
    pub operators: Vec<StatementOperator>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementOperator {
    And, // &&
    Or,  // ||
}

// =============================================================================
// PIPELINES & COMMANDS
// =============================================================================

/// A pipeline: cmd1 | cmd2 | cmd3
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineNode {
    pub commands: Vec<CommandNode>,
    /// Negate exit status with !
    pub negated: bool,
    pub span: Span,
}

/// Union of all command types
#[derive(Debug, Clone, PartialEq)]
pub enum CommandNode {
    Simple(SimpleCommandNode),
    Assignment(AssignmentNode),
    Conditional(ConditionalNode),
    Loop(LoopNode),
    Case(CaseNode),
    FunctionDef(FunctionDefNode),
    Subshell(SubshellNode),
}

impl CommandNode {
    pub fn span(&self) -> Span {
        match self {
            CommandNode::Simple(node) => node.span,
            CommandNode::Assignment(node) => node.span,
            CommandNode::Conditional(node) => node.span,
            CommandNode::Loop(node) => node.span,
            CommandNode::Case(node) => node.span,
            CommandNode::FunctionDef(node) => node.span,
            CommandNode::Subshell(node) => node.span,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            CommandNode::Simple(_) => "command",
            CommandNode::Assignment(_) => "assignment",
            CommandNode::Conditional(_) => "if",
            CommandNode::Loop(_) => "loop",
            CommandNode::Case(_) => "case",
            CommandNode::FunctionDef(_) => "function definition",
            CommandNode::Subshell(_) => "subshell",
        }
    }
}

/// Simple command: name args... with optional redirections
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleCommandNode {
    pub words: Vec<WordNode>,
    pub redirections: Vec<RedirectionNode>,
    pub span: Span,
}

// =============================================================================
// WORDS
// =============================================================================

/// A word in command text, made of literal runs and variable references.
#[derive(Debug, Clone, PartialEq)]
pub struct WordNode {
    pub parts: Vec<WordPart>,
    pub span: Span,
}

impl WordNode {
    /// The word's text when it contains no variable references.
    pub fn as_literal(&self) -> Option<String> {
        let mut text = String::new();
        for part in &self.parts {
            match part {
                WordPart::Literal(s) => text.push_str(s),
                WordPart::Variable(_) => return None,
            }
        }
        Some(text)
    }

    /// The variable reference when the word is exactly one `$name`.
    pub fn as_single_variable(&self) -> Option<&VariableRefNode> {
        match self.parts.as_slice() {
            [WordPart::Variable(var)] => Some(var),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WordPart {
    Literal(String),
    Variable(VariableRefNode),
}

/// `$name`, `${name}`, `$name[index]` or a bare identifier inside an expression
#[derive(Debug, Clone, PartialEq)]
pub struct VariableRefNode {
    pub name: String,
    pub index: Option<IndexNode>,
    /// Written without `$` (only possible inside expressions)
    pub bare: bool,
    pub span: Span,
}

/// Array subscript
#[derive(Debug, Clone, PartialEq)]
pub enum IndexNode {
    Number(i64),
    Variable(String),
}

// =============================================================================
// ASSIGNMENTS & EXPRESSIONS
// =============================================================================

/// Declared type of a typed variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclaredType {
    Int,
    Float,
    Str,
    Array,
}

impl DeclaredType {
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "int" => Some(DeclaredType::Int),
            "float" => Some(DeclaredType::Float),
            "string" => Some(DeclaredType::Str),
            "array" => Some(DeclaredType::Array),
            _ => None,
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            DeclaredType::Int => "int",
            DeclaredType::Float => "float",
            DeclaredType::Str => "string",
            DeclaredType::Array => "array",
        }
    }
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// `name=value` (weak) or `<type> name=value` (typed)
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentNode {
    pub name: String,
    pub declared: Option<DeclaredType>,
    pub value: ExprNode,
    pub name_span: Span,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprNode {
    Literal(LiteralNode),
    Variable(VariableRefNode),
    Array(ArrayLiteralNode),
    /// Text with embedded references, e.g. `"hello $name"` or `$HOME/bin`
    Interpolated(WordNode),
    Unary {
        op: UnaryOperator,
        operand: Box<ExprNode>,
        span: Span,
    },
    Binary {
        op: BinaryOperator,
        left: Box<ExprNode>,
        right: Box<ExprNode>,
        span: Span,
    },
}

impl ExprNode {
    pub fn span(&self) -> Span {
        match self {
            ExprNode::Literal(node) => node.span,
            ExprNode::Variable(node) => node.span,
            ExprNode::Array(node) => node.span,
            ExprNode::Interpolated(node) => node.span,
            ExprNode::Unary { span, .. } => *span,
            ExprNode::Binary { span, .. } => *span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiteralNode {
    pub value: LiteralValue,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Int(i32),
    /// The source spelling is kept for display
    Float { value: f64, text: String },
    Str(String),
}

/// `[1, "foo", 3.5]`
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayLiteralNode {
    pub elements: Vec<ExprNode>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl BinaryOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Rem => "%",
            BinaryOperator::Eq => "==",
            BinaryOperator::Ne => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::Gt => ">",
            BinaryOperator::Le => "<=",
            BinaryOperator::Ge => ">=",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::Ne
                | BinaryOperator::Lt
                | BinaryOperator::Gt
                | BinaryOperator::Le
                | BinaryOperator::Ge
        )
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

// =============================================================================
// CONTROL FLOW
// =============================================================================

/// if statement
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalNode {
    pub clauses: Vec<IfClause>,
    pub else_body: Option<Vec<StatementNode>>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfClause {
    pub condition: Vec<StatementNode>,
    pub body: Vec<StatementNode>,
}

/// while / until / for loops
#[derive(Debug, Clone, PartialEq)]
pub struct LoopNode {
    pub kind: LoopKind,
    pub body: Vec<StatementNode>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoopKind {
    While { condition: Vec<StatementNode> },
    Until { condition: Vec<StatementNode> },
    For { variable: String, words: Vec<WordNode> },
}

/// case word in pattern | pattern) list ;; ... esac
#[derive(Debug, Clone, PartialEq)]
pub struct CaseNode {
    pub subject: WordNode,
    pub arms: Vec<CaseArm>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseArm {
    /// Glob patterns; the arm runs when any of them matches
    pub patterns: Vec<WordNode>,
    pub body: Vec<StatementNode>,
}

// =============================================================================
// FUNCTIONS
// =============================================================================

/// `name() { list; }` or `function name { list; }`
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDefNode {
    pub name: String,
    pub body: Vec<StatementNode>,
    pub span: Span,
}

// =============================================================================
// SUBSHELLS
// =============================================================================

/// Subshell: ( ... ) args...
#[derive(Debug, Clone, PartialEq)]
pub struct SubshellNode {
    pub body: SubshellBody,
    /// Trailing words after `)`, passed as arguments
    pub args: Vec<WordNode>,
    pub redirections: Vec<RedirectionNode>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubshellBody {
    /// No shebang: parsed as nested Ox script
    Ox(ScriptNode),
    /// `#!interpreter` body handed to an external program
    Foreign(ForeignBody),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignBody {
    /// Interpreter name or path; may reference variables and is resolved at run time
    pub interpreter: WordNode,
    /// Extra words on the shebang line
    pub interpreter_args: Vec<String>,
    /// Body text delivered to the interpreter, shebang line included
    pub text: String,
    pub shebang_span: Span,
}

// =============================================================================
// REDIRECTIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct RedirectionNode {
    pub operator: RedirectionOperator,
    pub target: WordNode,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectionOperator {
    Input,     // <
    Output,    // >
    Append,    // >>
    ErrOutput, // 2>
    ErrAppend, // 2>>
}

impl RedirectionOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            RedirectionOperator::Input => "<",
            RedirectionOperator::Output => ">",
            RedirectionOperator::Append => ">>",
            RedirectionOperator::ErrOutput => "2>",
            RedirectionOperator::ErrAppend => "2>>",
        }
    }
}
