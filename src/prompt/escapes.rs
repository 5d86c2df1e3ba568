//! Prompt Escape Table
//!
//! Value escapes render live state and decide whether a context group is
//! shown. Format escapes are plain characters and never make a group
//! visible. Add a row here and a renderer in `expand` for a new escape.

use std::collections::HashMap;

use lazy_static::lazy_static;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeClass {
    Value,
    Format,
}

lazy_static! {
    pub static ref PROMPT_ESCAPES: HashMap<char, (EscapeClass, &'static str)> = {
        let mut m = HashMap::new();
        m.insert('S', (EscapeClass::Value, "success glyph when the last status was 0"));
        m.insert('F', (EscapeClass::Value, "failure glyph when the last status was not 0"));
        m.insert('?', (EscapeClass::Value, "last exit status"));
        m.insert('G', (EscapeClass::Value, "git status signs"));
        m.insert('B', (EscapeClass::Value, "git branch with its glyph"));
        m.insert('u', (EscapeClass::Value, "user name"));
        m.insert('h', (EscapeClass::Value, "host name up to the first dot"));
        m.insert('w', (EscapeClass::Value, "working directory, home as ~"));
        m.insert('W', (EscapeClass::Value, "basename of the working directory"));
        m.insert('t', (EscapeClass::Value, "time, 24-hour HH:MM:SS"));
        m.insert('T', (EscapeClass::Value, "time, 12-hour HH:MM:SS"));
        m.insert('d', (EscapeClass::Value, "date as \"Tue May 26\""));
        m.insert('$', (EscapeClass::Value, "# for root, $ otherwise"));
        m.insert('n', (EscapeClass::Format, "newline"));
        m.insert('\\', (EscapeClass::Format, "backslash"));
        m.insert('e', (EscapeClass::Format, "escape character"));
        m.insert('a', (EscapeClass::Format, "bell"));
        m
    };
}

pub fn escape_class(c: char) -> Option<EscapeClass> {
    PROMPT_ESCAPES.get(&c).map(|(class, _)| *class)
}

/// Literal character for a format escape
pub fn format_char(c: char) -> Option<char> {
    match c {
        'n' => Some('\n'),
        '\\' => Some('\\'),
        'e' => Some('\x1b'),
        'a' => Some('\x07'),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_format_escape_has_a_char() {
        for (c, (class, _)) in PROMPT_ESCAPES.iter() {
            assert_eq!(*class == EscapeClass::Format, format_char(*c).is_some(), "escape \\{}", c);
        }
        assert_eq!(escape_class('z'), None);
    }
}
