use crate::error::SynthError;
use crate::frontend::FrontendError;
use crate::span::Span;

/// A synthesis diagnostic (error or warning) tied to a description file.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
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
    pub fn error(message: String, span: Span) -> Self {
        Self {
            severity: Severity::Error,
            message,
            span,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn warning(message: String, span: Span) -> Self {
        Self {
            severity: Severity::Warning,
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

    /// Describe a synthesis failure. Parse errors point at the YAML
    /// location; everything else spans the whole description.
    pub fn from_error(err: &SynthError) -> Self {
        let span = match err {
            SynthError::Config(e) => e.location().map(|l| Span::at(l.index())),
            _ => None,
        }
        .unwrap_or_else(Span::dummy);
        let diag = Diagnostic::error(err.to_string(), span);

        match err {
            SynthError::UnsupportedDimensions { max, .. } => diag.with_help(format!(
                "map at most {} loop dimensions onto the device; the rest run sequentially",
                max
            )),
            SynthError::UnsupportedOperator { .. } => diag.with_help(
                "supported operators: add (+, +=, iadd), multiply (*, *=, mul, imul)".to_string(),
            ),
            SynthError::InvalidWorkGroupSize { size } => {
                let hint = size.checked_next_power_of_two().unwrap_or(1).max(1);
                diag.with_help(format!("use a power of two such as {}", hint))
            }
            SynthError::ReservedName { .. } => diag.with_note(
                "the kernel uses `j`, `stride0`, `local_id*`, `local_size*`, `group_id*` \
                 and `local_sums_*` for itself"
                    .to_string(),
            ),
            SynthError::MissingOutput { var } => diag.with_note(format!(
                "no entry of `args` names '{}', so its partial results have nowhere to go",
                var
            )),
            SynthError::Frontend { source, text } => {
                let diag = diag.with_note(format!("generated kernel:\n{}", text.trim_end()));
                match source {
                    FrontendError::UndefinedName { name } => diag.with_help(format!(
                        "bind '{}' to a kernel parameter in `param_subst` or add it to `params`",
                        name
                    )),
                    _ => diag,
                }
            }
            _ => diag,
        }
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

        let len = source.len();
        let range = if self.span.is_dummy() {
            0..len
        } else {
            let r = self.span.range();
            let start = r.start.min(len.saturating_sub(1));
            start..r.end.min(len).max(start)
        };

        let mut report = Report::build(kind, filename, range.start)
            .with_message(&self.message)
            .with_label(
                Label::new((filename, range))
                    .with_message(&self.message)
                    .with_color(color),
            );

        for note in &self.notes {
            report = report.with_note(note);
        }

        if let Some(help) = &self.help {
            report = report.with_help(help);
        }

        if let Err(e) = report.finish().eprint((filename, Source::from(source))) {
            eprintln!("error: {} ({})", self.message, e);
        }
    }
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
    use crate::config::DescriptionFile;

    #[test]
    fn test_error_construction() {
        let span = Span::new(10, 15);
        let d = Diagnostic::error("bad size".to_string(), span);
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.message, "bad size");
        assert_eq!(d.span.start, 10);
        assert_eq!(d.span.end, 15);
        assert!(d.notes.is_empty());
        assert!(d.help.is_none());
    }

    #[test]
    fn test_chained_builders() {
        let d = Diagnostic::warning("hint".to_string(), Span::new(0, 5))
            .with_note("note 1".to_string())
            .with_help("help text".to_string())
            .with_note("note 2".to_string());
        assert_eq!(d.severity, Severity::Warning);
        assert_eq!(d.notes.len(), 2);
        assert!(d.help.is_some());
    }

    #[test]
    fn test_from_yaml_error_has_location() {
        let src = "main:\n  name: [oops\n";
        let err = DescriptionFile::parse(src).unwrap_err();
        let d = Diagnostic::from_error(&err);
        assert!(!d.span.is_dummy());
        assert!((d.span.start as usize) <= src.len());
    }

    #[test]
    fn test_from_error_help() {
        let d = Diagnostic::from_error(&SynthError::InvalidWorkGroupSize { size: 48 });
        assert_eq!(d.help.as_deref(), Some("use a power of two such as 64"));
        assert!(d.span.is_dummy());

        let d = Diagnostic::from_error(&SynthError::Frontend {
            source: FrontendError::UndefinedName { name: "m".into() },
            text: "def k():\n    x = m\n".into(),
        });
        assert_eq!(d.notes, vec!["generated kernel:\ndef k():\n    x = m".to_string()]);
        assert!(d.help.unwrap().contains("param_subst"));

        let d = Diagnostic::from_error(&SynthError::ReservedName {
            name: "j".into(),
            role: "index variable",
        });
        assert!(d.notes[0].contains("`stride0`"));
    }

    #[test]
    fn test_render_does_not_panic() {
        let source = "main:\n  work_group_size: 48\n";
        let d = Diagnostic::from_error(&SynthError::InvalidWorkGroupSize { size: 48 });
        d.render("reduce.yaml", source);
        // Out-of-range spans are clamped.
        Diagnostic::error("past the end".to_string(), Span::new(100, 120))
            .render("reduce.yaml", source);
    }

    #[test]
    fn test_render_diagnostics_multiple() {
        let source = "reductions: []\nmain: ~\n";
        let diagnostics = vec![
            Diagnostic::warning("empty reductions".to_string(), Span::new(0, 10)),
            Diagnostic::warning("no main kernel".to_string(), Span::new(15, 19)),
        ];
        render_diagnostics(&diagnostics, "reduce.yaml", source);
    }
}
