use crate::ast::source_map::{Excerpt, SourceMap};
use super::{Diagnostic, Severity};

pub struct AnsiRenderer {
    pub use_color: bool,
}

impl AnsiRenderer {
    fn bold(&self, s: &str) -> String {
        if self.use_color { format!("\x1b[1m{s}\x1b[0m") } else { s.to_string() }
    }

    fn bold_red(&self, s: &str) -> String {
        if self.use_color { format!("\x1b[1;31m{s}\x1b[0m") } else { s.to_string() }
    }

    fn cyan(&self, s: &str) -> String {
        if self.use_color { format!("\x1b[36m{s}\x1b[0m") } else { s.to_string() }
    }

    fn dim(&self, s: &str) -> String {
        if self.use_color { format!("\x1b[2m{s}\x1b[0m") } else { s.to_string() }
    }

    pub fn render(&self, d: &Diagnostic) -> String {
        let mut out = String::new();

        let heading = d.heading();
        let severity_label = match d.severity {
            Severity::Error => self.bold_red(&heading),
            Severity::Warning => self.bold(&self.cyan(&heading)),
        };
        out.push_str(&format!("{}: {}\n", severity_label, self.bold(&d.message)));

        // Render primary label with source snippet
        let primary = d.labels.iter().find(|l| l.is_primary);
        if let (Some(label), Some(source)) = (primary, &d.source) {
            let map = SourceMap::new(source);
            let Excerpt { at, text, width } = map.excerpt(label.span);

            out.push_str(&format!("  {} {}:{}\n", self.cyan("-->"), at.line, at.col));

            let gutter = at.line.to_string().len();
            let pipe = self.cyan("|");
            let pad = " ".repeat(gutter);

            out.push_str(&format!("{pad} {pipe}\n"));
            let line_num = self.cyan(&format!("{:>gutter$}", at.line));
            out.push_str(&format!("{line_num} {pipe} {text}\n"));

            let carets = self.bold_red(&"^".repeat(width));
            let indent = " ".repeat(at.col - 1);
            if label.message.is_empty() {
                out.push_str(&format!("{pad} {pipe} {indent}{carets}\n"));
            } else {
                out.push_str(&format!("{pad} {pipe} {indent}{carets} {}\n",
                    self.bold_red(&label.message)));
            }

            // Empty gutter line after
            out.push_str(&format!("{pad} {pipe}\n"));
        }

        // Secondary labels (no source snippet, just mention span)
        for label in d.labels.iter().filter(|l| !l.is_primary) {
            if !label.message.is_empty() {
                out.push_str(&format!("  {} {}\n", self.dim("="), label.message));
            }
        }

        // Notes
        for note in &d.notes {
            out.push_str(&format!("  {} note: {}\n", self.dim("="), note));
        }

        // Suggestion
        if let Some(suggestion) = &d.suggestion {
            out.push_str(&format!("  {} suggestion: {}\n", self.dim("="), suggestion));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;

    const SRC: &str = "fn main() { return y; }";

    fn make_diag(source: &str, start: usize, end: usize) -> Diagnostic {
        Diagnostic::error("undefined symbol 'y'")
            .with_code("GL-R001")
            .with_span(Span { start, end }, "here")
            .with_source(source.to_string())
            .with_note("in function 'main'")
            .with_suggestion("declare it with 'var y;'")
    }

    fn plain(d: &Diagnostic) -> String {
        AnsiRenderer { use_color: false }.render(d)
    }

    #[test]
    fn render_contains_code_and_message() {
        let out = plain(&make_diag(SRC, 19, 20));
        assert!(out.starts_with("error[GL-R001]: undefined symbol 'y'"), "got:\n{out}");
    }

    #[test]
    fn render_contains_location_and_source_line() {
        let out = plain(&make_diag(SRC, 19, 20));
        assert!(out.contains("--> 1:20"), "missing location in:\n{out}");
        assert!(out.contains(SRC), "missing source line in:\n{out}");
    }

    #[test]
    fn render_contains_note_and_suggestion() {
        let out = plain(&make_diag(SRC, 19, 20));
        assert!(out.contains("note: in function 'main'"), "missing note in:\n{out}");
        assert!(out.contains("suggestion: declare it"), "missing suggestion in:\n{out}");
    }

    #[test]
    fn render_no_source_still_works() {
        let out = plain(&Diagnostic::error("something bad"));
        assert!(out.contains("error: something bad"));
        assert!(!out.contains("-->"));
    }

    #[test]
    fn render_warning() {
        let out = plain(&Diagnostic::warning("'main' takes parameters"));
        assert!(out.starts_with("warning: "));
    }

    #[test]
    fn color_only_when_asked() {
        let d = make_diag(SRC, 19, 20);
        assert!(AnsiRenderer { use_color: true }.render(&d).contains("\x1b["));
        assert!(!plain(&d).contains("\x1b["));
    }

    #[test]
    fn render_multiline_source_correct_line() {
        let source = "var a;\nfn main() {\n  return a / 0;\n}";
        let start = source.find("a / 0").unwrap();
        let d = Diagnostic::error("division by zero")
            .with_span(Span { start, end: start + 5 }, "")
            .with_source(source.to_string());
        let out = plain(&d);
        assert!(out.contains("3:10"), "expected line 3 in:\n{out}");
        assert!(out.contains("  return a / 0;"), "expected third line in:\n{out}");
        assert!(out.contains("^^^^^"), "expected 5 carets in:\n{out}");
    }

    #[test]
    fn carets_stop_at_end_of_line() {
        let source = "fn main() {\n  return 1;\n}";
        let d = Diagnostic::error("bad").with_span(Span { start: 10, end: source.len() }, "").with_source(source);
        let out = plain(&d);
        assert!(out.contains("          ^\n"), "got:\n{out}");
    }
}
