//! Compiler diagnostics: construction, formatting, and rendering.
//!
//! Parse and lowering errors are accumulated rather than raised — see
//! §7 of the spec. This module only describes and renders them; it does
//! not decide whether the driver should stop (that's the caller's job).

use crate::span::Span;

/// The fixed diagnostic kinds named by the external diagnostic surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiagKind {
    ParseError,
    MissingSemicolon,
    MissingDelimiter,
    ExpressionExpected,
    InvalidTopLevel,
    UndefinedReference,
    UnsupportedConstruct,
    UsageError,
    IoError,
}

impl DiagKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagKind::ParseError => "parse error",
            DiagKind::MissingSemicolon => "missing semicolon",
            DiagKind::MissingDelimiter => "missing delimiter",
            DiagKind::ExpressionExpected => "expression expected",
            DiagKind::InvalidTopLevel => "invalid top-level item",
            DiagKind::UndefinedReference => "undefined reference",
            DiagKind::UnsupportedConstruct => "unsupported construct",
            DiagKind::UsageError => "usage error",
            DiagKind::IoError => "I/O error",
        }
    }
}

/// A compiler diagnostic (error or warning) anchored to a source span.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagKind,
    pub message: String,
    pub span: Span,
    pub notes: Vec<String>,
    pub help: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl Diagnostic {
    pub fn error(kind: DiagKind, message: String, span: Span) -> Self {
        Self {
            severity: Severity::Error,
            kind,
            message,
            span,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn warning(kind: DiagKind, message: String, span: Span) -> Self {
        Self {
            severity: Severity::Warning,
            kind,
            message,
            span,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn with_note(mut self, note: String) -> Self {
        self.notes.push(note);
        self
    }

    pub fn with_help(mut self, help: String) -> Self {
        self.help = Some(help);
        self
    }

    /// 1-based (line, column) of the span's start offset within `source`.
    pub fn line_col(&self, source: &str) -> (usize, usize) {
        line_col_at(source, self.span.start as usize)
    }

    /// The `<path>:<line>:<col>: <kind>: <message>` line from §6.
    pub fn plain(&self, path: &str, source: &str) -> String {
        let (line, col) = self.line_col(source);
        format!("{path}:{line}:{col}: {}: {}", self.kind.as_str(), self.message)
    }

    /// Render the diagnostic to stderr using ariadne.
    pub fn render(&self, filename: &str, source: &str) {
        use ariadne::{Color, Label, Report, ReportKind, Source};

        let kind = match self.severity {
            Severity::Error => ReportKind::Error,
            Severity::Warning => ReportKind::Warning,
        };

        let color = match self.severity {
            Severity::Error => Color::Red,
            Severity::Warning => Color::Yellow,
        };

        let message = format!("{}: {}", self.kind.as_str(), self.message);

        let mut report = Report::build(kind, filename, self.span.start as usize)
            .with_message(&message)
            .with_label(
                Label::new((filename, self.span.start as usize..self.span.end as usize))
                    .with_message(&message)
                    .with_color(color),
            );

        for note in &self.notes {
            report = report.with_note(note);
        }

        if let Some(help) = &self.help {
            report = report.with_help(help);
        }

        report
            .finish()
            .eprint((filename, Source::from(source)))
            .unwrap();
    }
}

fn line_col_at(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let mut line = 1usize;
    let mut col = 1usize;
    for ch in source[..offset].chars() {
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

/// Render a list of diagnostics.
pub fn render_diagnostics(diagnostics: &[Diagnostic], filename: &str, source: &str) {
    for diag in diagnostics {
        diag.render(filename, source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let span = Span::new(0, 10, 15);
        let d = Diagnostic::error(DiagKind::ParseError, "type mismatch".to_string(), span);
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.message, "type mismatch");
        assert_eq!(d.span.start, 10);
        assert_eq!(d.span.end, 15);
        assert!(d.notes.is_empty());
        assert!(d.help.is_none());
    }

    #[test]
    fn test_warning_construction() {
        let span = Span::dummy();
        let d = Diagnostic::warning(DiagKind::UnsupportedConstruct, "unused variable".to_string(), span);
        assert_eq!(d.severity, Severity::Warning);
        assert_eq!(d.message, "unused variable");
    }

    #[test]
    fn test_with_note() {
        let d = Diagnostic::error(DiagKind::ParseError, "error".to_string(), Span::dummy())
            .with_note("expected i64".to_string())
            .with_note("found bool".to_string());
        assert_eq!(d.notes.len(), 2);
        assert_eq!(d.notes[0], "expected i64");
        assert_eq!(d.notes[1], "found bool");
    }

    #[test]
    fn test_with_help() {
        let d = Diagnostic::error(DiagKind::ParseError, "error".to_string(), Span::dummy())
            .with_help("try adding a semicolon".to_string());
        assert_eq!(d.help.as_deref(), Some("try adding a semicolon"));
    }

    #[test]
    fn test_chained_builders() {
        let d = Diagnostic::warning(DiagKind::UnsupportedConstruct, "hint".to_string(), Span::new(0, 0, 5))
            .with_note("note 1".to_string())
            .with_help("help text".to_string())
            .with_note("note 2".to_string());
        assert_eq!(d.severity, Severity::Warning);
        assert_eq!(d.notes.len(), 2);
        assert!(d.help.is_some());
    }

    #[test]
    fn test_line_col_first_line() {
        let source = "let x = 1;\nlet y = 2;\n";
        let d = Diagnostic::error(DiagKind::ParseError, "e".to_string(), Span::new(0, 4, 5));
        assert_eq!(d.line_col(source), (1, 5));
    }

    #[test]
    fn test_line_col_second_line() {
        let source = "let x = 1;\nlet y = 2;\n";
        // offset 15 is inside "let y = 2;" on line 2 ("let y " is 6 chars after the \n at 10)
        let d = Diagnostic::error(DiagKind::ParseError, "e".to_string(), Span::new(0, 15, 16));
        assert_eq!(d.line_col(source), (2, 5));
    }

    #[test]
    fn test_plain_format() {
        let source = "let bar = 1\n";
        let d = Diagnostic::error(
            DiagKind::MissingSemicolon,
            "expected ';' before this token".to_string(),
            Span::new(0, 0, 0),
        );
        assert_eq!(
            d.plain("foo.ac", source),
            "foo.ac:1:1: missing semicolon: expected ';' before this token"
        );
    }

    #[test]
    fn test_render_does_not_panic() {
        let source = "let x: i64 = 1\nlet y: i64 = x\n";
        let d = Diagnostic::error(DiagKind::ParseError, "type mismatch".to_string(), Span::new(0, 18, 22))
            .with_note("expected i64, found bool".to_string());
        d.render("test.ac", source);
    }

    #[test]
    fn test_render_diagnostics_multiple() {
        let source = "let x = 1\nlet y = 2\n";
        let diagnostics = vec![
            Diagnostic::warning(DiagKind::UnsupportedConstruct, "unused x".to_string(), Span::new(0, 4, 5)),
            Diagnostic::warning(DiagKind::UnsupportedConstruct, "unused y".to_string(), Span::new(0, 14, 15)),
        ];
        render_diagnostics(&diagnostics, "test.ac", source);
    }
}
