//! Diagnostic Reports
//!
//! Formats a message and a source span as a caret-annotated report:
//!
//! ```text
//! 1;29 - Found `done` outside of loop context
//!
//! if true; then echo foo; fi; done
//!                             ^~~^
//! ```
//!
//! Rendering is deterministic. The same message, span and source always give
//! byte-identical output.

use crate::ast::types::Span;

/// A message attached to one region of source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub span: Span,
    /// The first source line covered by `span`, verbatim
    pub source_line: String,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>, span: Span, source: &str) -> Self {
        Self {
            message: message.into(),
            span,
            source_line: source_line(source, span.line).unwrap_or_default(),
        }
    }

    /// Header, blank line, source line and marker line
    pub fn render(&self) -> String {
        format!(
            "{};{} - {}\n\n{}\n{}\n",
            self.span.line,
            self.span.column,
            self.message,
            self.source_line,
            marker_line(&self.source_line, self.span.column, self.span.length)
        )
    }

    /// Report as it follows output the program has already printed;
    /// `line_open` when that output stopped mid-line
    pub fn render_after(&self, line_open: bool) -> String {
        let mut out = String::new();
        if line_open {
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.render());
        out
    }
}

/// Format `message` at `span` of `source`
pub fn report(message: &str, span: Span, source: &str) -> String {
    Diagnostic::new(message, span, source).render()
}

/// Extract a 1-based line from source text
pub fn source_line(source: &str, line: usize) -> Option<String> {
    source
        .split('\n')
        .nth(line.checked_sub(1)?)
        .map(|s| s.trim_end_matches('\r').to_string())
}

/// Padding up to `column` followed by the caret run.
///
/// Tabs in the padded prefix are kept so markers stay aligned. A span running
/// past the end of the line is clamped to the line.
pub fn marker_line(line: &str, column: usize, length: usize) -> String {
    let line_len = line.chars().count();
    let column = column.max(1);
    let available = (line_len + 1).saturating_sub(column).max(1);
    let length = length.clamp(1, available);

    let mut out: String = line
        .chars()
        .chain(std::iter::repeat(' '))
        .take(column - 1)
        .map(|c| if c == '\t' { '\t' } else { ' ' })
        .collect();
    out.push_str(&carets(length));
    out
}

/// `^`, `^^`, `^~^`, `^~~^`, ...
pub fn carets(length: usize) -> String {
    match length {
        0 | 1 => "^".to_string(),
        n => format!("^{}^", "~".repeat(n - 2)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_carets() {
        assert_eq!(carets(1), "^");
        assert_eq!(carets(2), "^^");
        assert_eq!(carets(4), "^~~^");
    }

    #[test]
    fn test_render_done_outside_loop() {
        let source = "if true; then echo foo; fi; done";
        let diag = Diagnostic::new(
            "Found `done` outside of loop context",
            Span::new(1, 29, 28, 4),
            source,
        );
        let expected = format!(
            "\n1;29 - Found `done` outside of loop context\n\n{}\n{}^~~^\n",
            source,
            " ".repeat(28)
        );
        assert_eq!(diag.render_after(false), expected);
    }

    #[test]
    fn test_render_is_deterministic() {
        let source = "a\nb = c\n";
        let first = report("bad", Span::new(2, 3, 4, 1), source);
        let second = report("bad", Span::new(2, 3, 4, 1), source);
        assert_eq!(first, second);
        assert_eq!(first, "2;3 - bad\n\nb = c\n  ^\n");
    }

    #[test]
    fn test_multiline_span_clamps_to_line_end() {
        let source = "echo (\nmore\n";
        let out = report("unterminated", Span::new(1, 6, 5, 20), source);
        assert!(out.ends_with("echo (\n     ^\n"));

        let out = report("x", Span::new(1, 1, 0, 20), "abc\ndef");
        assert!(out.ends_with("abc\n^~^\n"));
    }

    #[test]
    fn test_tabs_keep_alignment() {
        assert_eq!(marker_line("\tfi", 2, 2), "\t^^");
    }

    #[test]
    fn test_render_after_unterminated_output() {
        let diag = Diagnostic::new("m", Span::new(1, 1, 0, 1), "x");
        assert!(diag.render_after(true).starts_with("\n\n1;1 - m"));
        assert!(diag.render_after(false).starts_with("\n1;1 - m"));
    }

    #[test]
    fn test_source_line_out_of_range() {
        assert_eq!(source_line("one\ntwo", 2).as_deref(), Some("two"));
        assert_eq!(source_line("one", 0), None);
        assert_eq!(source_line("one", 5), None);
    }
}
