//! Prompt Template Lexer
//!
//! Splits a prompt template into text runs, backslash escapes, context
//! group delimiters `\(` `\)` and `${NAME}` lookups. Prompt templates have
//! their own token set; none of the script grammar applies here.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptToken {
    Text(String),
    /// `\c` for any character other than `(` and `)`
    Escape(char),
    /// `${NAME}`
    EnvRef(String),
    GroupOpen,
    GroupClose,
}

pub fn tokenize_prompt(template: &str) -> Vec<PromptToken> {
    let chars: Vec<char> = template.chars().collect();
    let mut tokens = Vec::new();
    let mut text = String::new();
    let mut i = 0;

    let flush = |text: &mut String, tokens: &mut Vec<PromptToken>| {
        if !text.is_empty() {
            tokens.push(PromptToken::Text(std::mem::take(text)));
        }
    };

    while i < chars.len() {
        match chars[i] {
            '\\' => match chars.get(i + 1) {
                Some(&c) => {
                    flush(&mut text, &mut tokens);
                    tokens.push(match c {
                        '(' => PromptToken::GroupOpen,
                        ')' => PromptToken::GroupClose,
                        other => PromptToken::Escape(other),
                    });
                    i += 2;
                }
                // Trailing backslash
                None => {
                    text.push('\\');
                    i += 1;
                }
            },
            '$' if chars.get(i + 1) == Some(&'{') => {
                let close = chars[i + 2..].iter().position(|c| *c == '}');
                match close {
                    Some(n) => {
                        flush(&mut text, &mut tokens);
                        tokens.push(PromptToken::EnvRef(chars[i + 2..i + 2 + n].iter().collect()));
                        i += n + 3;
                    }
                    None => {
                        text.push('$');
                        i += 1;
                    }
                }
            }
            c => {
                text.push(c);
                i += 1;
            }
        }
    }
    flush(&mut text, &mut tokens);
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_groups_and_escapes() {
        assert_eq!(
            tokenize_prompt("\\(on \\B\\)"),
            vec![
                PromptToken::GroupOpen,
                PromptToken::Text("on ".into()),
                PromptToken::Escape('B'),
                PromptToken::GroupClose,
            ]
        );
    }

    #[test]
    fn test_env_refs() {
        assert_eq!(
            tokenize_prompt("${USER}@x"),
            vec![PromptToken::EnvRef("USER".into()), PromptToken::Text("@x".into())]
        );
        assert_eq!(tokenize_prompt("${open"), vec![PromptToken::Text("${open".into())]);
    }

    #[test]
    fn test_trailing_backslash_is_text() {
        assert_eq!(tokenize_prompt("a\\"), vec![PromptToken::Text("a\\".into())]);
    }
}
