pub mod ansi;
pub mod json;
pub mod registry;

use crate::ast::Span;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Label {
    pub span: Span,
    pub message: String,
    pub is_primary: bool,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Option<&'static str>,
    pub message: String,
    pub labels: Vec<Label>,
    pub notes: Vec<String>,
    pub suggestion: Option<String>,
    pub source: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            code: None,
            message: message.into(),
            labels: Vec::new(),
            notes: Vec::new(),
            suggestion: None,
            source: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic { severity: Severity::Warning, ..Diagnostic::error(message) }
    }

    /// `error[GL-R001]`, or just the severity when there is no code.
    pub fn heading(&self) -> String {
        match self.code {
            Some(code) => format!("{}[{code}]", self.severity.as_str()),
            None => self.severity.as_str().to_string(),
        }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach the primary location. Unknown spans (prelude code, synthesized
    /// nodes) are dropped rather than pointing at byte 0.
    pub fn with_span(mut self, span: Span, label: impl Into<String>) -> Self {
        if !span.is_unknown() {
            self.labels.push(Label { span, message: label.into(), is_primary: true });
        }
        self
    }

    pub fn with_secondary_span(mut self, span: Span, label: impl Into<String>) -> Self {
        if !span.is_unknown() {
            self.labels.push(Label { span, message: label.into(), is_primary: false });
        }
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

// ---- From impls for the error types ----

impl From<&crate::lexer::LexError> for Diagnostic {
    fn from(e: &crate::lexer::LexError) -> Self {
        let span = Span {
            start: e.position,
            end: e.position + e.snippet.len().max(1),
        };
        let mut d = Diagnostic::error(format!("unexpected token '{}'", e.snippet))
            .with_code(e.code)
            .with_span(span, "here");
        if !e.suggestion.is_empty() {
            d = d.with_suggestion(e.suggestion.clone());
        }
        d
    }
}

impl From<&crate::parser::ParseError> for Diagnostic {
    fn from(e: &crate::parser::ParseError) -> Self {
        Diagnostic::error(&e.message).with_code(e.code).with_span(e.span, "here")
    }
}

impl From<&crate::compiler::CompileError> for Diagnostic {
    fn from(e: &crate::compiler::CompileError) -> Self {
        Diagnostic::error(&e.message).with_code(e.code).with_span(e.span, "here")
    }
}

impl From<&crate::vm::VmError> for Diagnostic {
    fn from(e: &crate::vm::VmError) -> Self {
        Diagnostic::error(e.kind.to_string())
            .with_code(e.kind.code())
            .with_note(format!("at bytecode address {}", e.pc))
    }
}

impl From<&crate::vm::LoadError> for Diagnostic {
    fn from(e: &crate::vm::LoadError) -> Self {
        Diagnostic::error(e.to_string()).with_code("GL-V007")
    }
}

impl From<&crate::syscall::RegistryError> for Diagnostic {
    fn from(e: &crate::syscall::RegistryError) -> Self {
        Diagnostic::error(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;

    #[test]
    fn diagnostic_error_builder() {
        let d = Diagnostic::error("something went wrong");
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.message, "something went wrong");
        assert!(d.code.is_none());
        assert!(d.labels.is_empty());
        assert!(d.notes.is_empty());
        assert!(d.suggestion.is_none());
    }

    #[test]
    fn diagnostic_with_span() {
        let d = Diagnostic::error("bad token").with_span(Span { start: 5, end: 8 }, "here");
        assert_eq!(d.labels.len(), 1);
        assert_eq!(d.labels[0].span, Span { start: 5, end: 8 });
        assert!(d.labels[0].is_primary);
    }

    #[test]
    fn unknown_span_is_not_labelled() {
        let d = Diagnostic::error("in prelude").with_span(Span::UNKNOWN, "here");
        assert!(d.labels.is_empty());
    }

    #[test]
    fn from_lex_error() {
        let e = crate::lexer::lex("var x = 1 @ 2;").unwrap_err();
        let d = Diagnostic::from(&e);
        assert_eq!(d.code, Some("GL-L001"));
        assert!(d.message.contains('@'));
        assert_eq!(d.labels[0].span, Span { start: 10, end: 11 });
        assert!(d.suggestion.is_some());
    }

    #[test]
    fn from_parse_error() {
        let e = crate::parser::ParseError {
            code: "GL-P001",
            position: 2,
            span: Span { start: 10, end: 15 },
            message: "expected identifier".to_string(),
        };
        let d = Diagnostic::from(&e);
        assert_eq!(d.code, Some("GL-P001"));
        assert_eq!(d.labels[0].span, Span { start: 10, end: 15 });
    }

    #[test]
    fn from_compile_error() {
        let e = crate::compiler::CompileError::new("GL-R001", Span { start: 3, end: 6 }, "undefined symbol 'foo'");
        let d = Diagnostic::from(&e);
        assert_eq!(d.code, Some("GL-R001"));
        assert!(d.message.contains("foo"));
    }

    #[test]
    fn from_vm_error() {
        let e = crate::vm::VmError { kind: crate::vm::VmErrorKind::DivideByZero, pc: 12 };
        let d = Diagnostic::from(&e);
        assert_eq!(d.code, Some("GL-V005"));
        assert_eq!(d.message, "division by zero");
        assert!(d.notes[0].contains("12"));
    }

    #[test]
    fn every_emitted_code_is_registered() {
        for kind in [
            crate::vm::VmErrorKind::StackOverflow,
            crate::vm::VmErrorKind::StackUnderflow,
            crate::vm::VmErrorKind::UnknownOpcode,
            crate::vm::VmErrorKind::OutOfBounds,
            crate::vm::VmErrorKind::DivideByZero,
            crate::vm::VmErrorKind::Internal,
        ] {
            assert!(registry::lookup(kind.code()).is_some(), "{} not registered", kind.code());
        }
    }
}
