//! Glob Patterns
//!
//! `case` arms match their subject against shell globs: `*` for any run of
//! characters, `?` for one character, `[...]` for a set (negated by a leading
//! `!` or `^`) and `\x` for a literal `x`. A glob is translated to an
//! anchored regex; an unclosed `[` is a literal bracket.

use regex_lite::Regex;
use tracing::warn;

/// Translate a glob into an unanchored regex body
pub fn glob_to_regex(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut regex = String::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            '\\' if i + 1 < chars.len() => {
                i += 1;
                regex.push_str(&regex_lite::escape(&chars[i].to_string()));
            }
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    regex.push_str(&convert_class(&chars[i + 1..end]));
                    i = end;
                }
                None => regex.push_str(r"\["),
            },
            c => regex.push_str(&regex_lite::escape(&c.to_string())),
        }
        i += 1;
    }
    regex
}

/// Index of the `]` closing the class opened at `start`
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start + 1;
    if matches!(chars.get(i), Some('!' | '^')) {
        i += 1;
    }
    // `]` right after the opening bracket is a member
    if chars.get(i) == Some(&']') {
        i += 1;
    }
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            ']' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

fn convert_class(body: &[char]) -> String {
    let (negated, members) = match body.first() {
        Some('!' | '^') => (true, &body[1..]),
        _ => (false, body),
    };

    let mut class = String::from(if negated { "[^" } else { "[" });
    let mut i = 0;
    while i < members.len() {
        match members[i] {
            '\\' if i + 1 < members.len() => {
                i += 1;
                class.push('\\');
                class.push(members[i]);
            }
            // Range separator between two members
            '-' if i > 0 && i + 1 < members.len() => class.push('-'),
            c @ ('\\' | ']' | '[' | '^' | '-' | '&' | '~') => {
                class.push('\\');
                class.push(c);
            }
            c => class.push(c),
        }
        i += 1;
    }
    class.push(']');
    class
}

/// Whole-text glob match; a pattern that fails to compile matches nothing
pub fn glob_matches(pattern: &str, text: &str) -> bool {
    let anchored = format!("^(?s:{})$", glob_to_regex(pattern));
    match Regex::new(&anchored) {
        Ok(re) => re.is_match(text),
        Err(err) => {
            warn!(pattern, error = %err, "invalid glob pattern");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcards() {
        assert!(glob_matches("*", ""));
        assert!(glob_matches("*.txt", "notes.txt"));
        assert!(!glob_matches("*.txt", "notes.txt.bak"));
        assert!(glob_matches("a?c", "abc"));
        assert!(!glob_matches("a?c", "ac"));
        assert!(glob_matches("*", "multi\nline"));
    }

    #[test]
    fn test_regex_characters_are_literal() {
        assert!(glob_matches("1.5", "1.5"));
        assert!(!glob_matches("1.5", "105"));
        assert!(glob_matches("(x)+", "(x)+"));
        assert!(glob_matches(r"\*", "*"));
        assert!(!glob_matches(r"\*", "a"));
    }

    #[test]
    fn test_classes() {
        assert!(glob_matches("[abc]x", "bx"));
        assert!(!glob_matches("[abc]x", "dx"));
        assert!(glob_matches("[a-c]", "b"));
        assert!(glob_matches("[!a-c]", "z"));
        assert!(!glob_matches("[^a-c]", "a"));
        assert!(glob_matches("[]]", "]"));
        assert!(glob_matches("[a-]", "-"));
    }

    #[test]
    fn test_unclosed_bracket_is_literal() {
        assert!(glob_matches("[abc", "[abc"));
        assert!(!glob_matches("[abc", "a"));
    }
}
