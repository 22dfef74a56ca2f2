//! One-line JSON rendering of diagnostics for editors and scripts.

use serde::Serialize;

use crate::ast::source_map::{Position, SourceMap};
use super::{Diagnostic, Label};

#[derive(Serialize)]
struct JsonDiagnostic<'a> {
    severity: &'static str,
    /// Always present; `null` for uncoded diagnostics.
    code: Option<&'static str>,
    heading: String,
    message: &'a str,
    labels: Vec<JsonLabel<'a>>,
    notes: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    suggestion: Option<&'a str>,
}

#[derive(Serialize)]
struct JsonLabel<'a> {
    start: usize,
    end: usize,
    message: &'a str,
    primary: bool,
    #[serde(flatten)]
    range: Option<LineRange>,
}

#[derive(Serialize)]
struct LineRange {
    line: usize,
    col: usize,
    end_line: usize,
    end_col: usize,
}

fn label<'a>(l: &'a Label, map: Option<&SourceMap>) -> JsonLabel<'a> {
    let range = map.map(|map| {
        let Position { line, col } = map.position(l.span.start);
        let end = map.position(l.span.end.max(l.span.start));
        LineRange { line, col, end_line: end.line, end_col: end.col }
    });
    JsonLabel { start: l.span.start, end: l.span.end, message: &l.message, primary: l.is_primary, range }
}

pub fn render(d: &Diagnostic) -> String {
    let map = d.source.as_deref().map(SourceMap::new);
    let out = JsonDiagnostic {
        severity: d.severity.as_str(),
        code: d.code,
        heading: d.heading(),
        message: &d.message,
        labels: d.labels.iter().map(|l| label(l, map.as_ref())).collect(),
        notes: &d.notes,
        suggestion: d.suggestion.as_deref(),
    };
    serde_json::to_string(&out).unwrap_or_else(|e| {
        serde_json::json!({ "severity": "error", "code": null, "message": e.to_string() }).to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;

    fn parse_json(s: &str) -> serde_json::Value {
        serde_json::from_str(s).expect("valid JSON")
    }

    #[test]
    fn render_basic_error() {
        let v = parse_json(&render(&Diagnostic::error("array size must be const")));
        assert_eq!(v["severity"], "error");
        assert_eq!(v["message"], "array size must be const");
        assert!(v["labels"].as_array().unwrap().is_empty());
        assert!(v["code"].is_null());
        assert_eq!(v["heading"], "error");
    }

    #[test]
    fn render_with_code_span_and_source() {
        let d = Diagnostic::error("undefined symbol 'foo'")
            .with_code("GL-R001")
            .with_span(Span { start: 18, end: 23 }, "here")
            .with_source("fn main() {\n  x = foo();\n}".to_string());
        let v = parse_json(&render(&d));
        assert_eq!(v["code"], "GL-R001");
        let label = &v["labels"][0];
        assert_eq!(label["start"], 18);
        assert_eq!(label["end"], 23);
        assert_eq!(label["primary"], true);
        assert_eq!(label["line"], 2);
        assert_eq!(label["col"], 7);
        assert_eq!(label["end_line"], 2);
        assert_eq!(label["end_col"], 12);
        assert_eq!(v["heading"], "error[GL-R001]");
    }

    #[test]
    fn render_notes_and_suggestion() {
        let d = Diagnostic::error("bad")
            .with_note("at bytecode address 12")
            .with_note("in function 'f'")
            .with_suggestion("check the divisor");
        let v = parse_json(&render(&d));
        assert_eq!(v["notes"].as_array().unwrap().len(), 2);
        assert_eq!(v["notes"][0], "at bytecode address 12");
        assert_eq!(v["suggestion"], "check the divisor");
    }

    #[test]
    fn label_without_source_has_no_line_col() {
        let d = Diagnostic::error("bad").with_span(Span { start: 5, end: 8 }, "here");
        let v = parse_json(&render(&d));
        assert!(v["labels"][0].get("line").is_none());
        assert!(v["labels"][0].get("end_col").is_none());
        assert!(v.get("suggestion").is_none());
    }

    #[test]
    fn render_warning_severity() {
        let v = parse_json(&render(&Diagnostic::warning("unused")));
        assert_eq!(v["severity"], "warning");
    }

    #[test]
    fn label_spanning_lines() {
        let src = "fn main() {\n  return 1;\n}";
        let d = Diagnostic::error("bad")
            .with_code("GL-T001")
            .with_span(Span { start: 10, end: src.len() }, "")
            .with_source(src);
        let v = parse_json(&render(&d));
        let label = &v["labels"][0];
        assert_eq!((label["line"].as_u64(), label["col"].as_u64()), (Some(1), Some(11)));
        assert_eq!((label["end_line"].as_u64(), label["end_col"].as_u64()), (Some(3), Some(2)));
    }
}
