//! Prompt Template Parser
//!
//! Builds the context-group tree. An unmatched `\)` stays in place as
//! literal text; an unclosed `\(` is kept as literal text and its contents
//! are spliced into the enclosing level.

use crate::prompt::lexer::{tokenize_prompt, PromptToken};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptNode {
    Text(String),
    Escape(char),
    Variable(String),
    Group(Vec<PromptNode>),
}

pub fn parse_prompt(template: &str) -> Vec<PromptNode> {
    parse_prompt_tokens(tokenize_prompt(template))
}

pub fn parse_prompt_tokens(tokens: Vec<PromptToken>) -> Vec<PromptNode> {
    // Open groups, innermost last; the bottom frame is the template itself
    let mut frames: Vec<Vec<PromptNode>> = vec![Vec::new()];

    for token in tokens {
        match token {
            PromptToken::GroupOpen => frames.push(Vec::new()),
            PromptToken::GroupClose if frames.len() > 1 => {
                let group = frames.pop().unwrap_or_default();
                push(&mut frames, PromptNode::Group(group));
            }
            PromptToken::GroupClose => push(&mut frames, PromptNode::Text("\\)".to_string())),
            PromptToken::Text(text) => push(&mut frames, PromptNode::Text(text)),
            PromptToken::Escape(c) => push(&mut frames, PromptNode::Escape(c)),
            PromptToken::EnvRef(name) => push(&mut frames, PromptNode::Variable(name)),
        }
    }

    while frames.len() > 1 {
        let unclosed = frames.pop().unwrap_or_default();
        push(&mut frames, PromptNode::Text("\\(".to_string()));
        for node in unclosed {
            push(&mut frames, node);
        }
    }
    frames.pop().unwrap_or_default()
}

/// Append to the innermost frame, merging adjacent text
fn push(frames: &mut [Vec<PromptNode>], node: PromptNode) {
    let Some(frame) = frames.last_mut() else {
        return;
    };
    if let (Some(PromptNode::Text(prev)), PromptNode::Text(text)) = (frame.last_mut(), &node) {
        prev.push_str(text);
        return;
    }
    frame.push(node);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_groups() {
        assert_eq!(
            parse_prompt("\\(on \\B\\([\\G]\\)\\)"),
            vec![PromptNode::Group(vec![
                PromptNode::Text("on ".into()),
                PromptNode::Escape('B'),
                PromptNode::Group(vec![
                    PromptNode::Text("[".into()),
                    PromptNode::Escape('G'),
                    PromptNode::Text("]".into()),
                ]),
            ])]
        );
    }

    #[test]
    fn test_unmatched_close_is_literal() {
        assert_eq!(parse_prompt("a\\)b"), vec![PromptNode::Text("a\\)b".into())]);
    }

    #[test]
    fn test_unclosed_open_is_literal() {
        assert_eq!(
            parse_prompt("x\\(y\\?"),
            vec![PromptNode::Text("x\\(y".into()), PromptNode::Escape('?')]
        );
    }
}
