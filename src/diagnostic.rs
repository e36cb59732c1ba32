//! Structured diagnostics.
//!
//! Every error in the pipeline lands here as a `Diagnostic` rather than a
//! bare counter, so host tools can inspect locations and messages. Rendering
//! produces the classic `path:line:column: message` form with a source
//! excerpt and a caret.

use crate::source_manager::{SourceManager, SourceSpan};

/// Diagnostic severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Error,
    Warning,
    Note,
}

/// Individual diagnostic with context.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
    pub location: SourceSpan,
    pub code: Option<String>,
    pub hints: Vec<String>,
    pub related: Vec<SourceSpan>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, location: SourceSpan) -> Self {
        Diagnostic {
            level: DiagnosticLevel::Error,
            message: message.into(),
            location,
            code: None,
            hints: Vec::new(),
            related: Vec::new(),
        }
    }

    pub fn with_code(mut self, code: &str) -> Self {
        self.code = Some(code.to_string());
        self
    }
}

/// The top-level driver stops attempting further declarations past this
/// many accumulated errors.
pub const MAX_ERRORS: usize = 255;

/// Collects diagnostics for one translation unit.
#[derive(Default)]
pub struct DiagnosticEngine {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn report_error(&mut self, message: impl Into<String>, location: SourceSpan) {
        self.report(Diagnostic::error(message, location));
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Error)
            .count()
    }

    pub fn at_error_limit(&self) -> bool {
        self.error_count() >= MAX_ERRORS
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

/// Renders diagnostics against the source manager.
#[derive(Debug, Clone, Copy)]
pub struct DiagnosticRenderer {
    pub show_source: bool,
}

impl Default for DiagnosticRenderer {
    fn default() -> Self {
        DiagnosticRenderer { show_source: true }
    }
}

impl DiagnosticRenderer {
    /// Format one diagnostic as `path:line:column: level: message` plus an
    /// excerpt of the offending line and a caret under the column.
    pub fn format(&self, diag: &Diagnostic, sources: &SourceManager) -> String {
        let level = match diag.level {
            DiagnosticLevel::Error => "error",
            DiagnosticLevel::Warning => "warning",
            DiagnosticLevel::Note => "note",
        };

        let mut out = String::new();
        if let Some(file) = sources.get(diag.location.source_id()) {
            let (line, col) = file.lookup_line_col(diag.location.start_offset());
            out.push_str(&format!(
                "{}:{}:{}: {}: {}",
                file.path.display(),
                line,
                col,
                level,
                diag.message
            ));
            if self.show_source {
                let excerpt = file.line_text(diag.location.start_offset());
                out.push_str(&format!("\n{}\n", excerpt));
                for _ in 1..col {
                    out.push(' ');
                }
                out.push('^');
            }
        } else {
            out.push_str(&format!("{}: {}", level, diag.message));
        }
        out
    }

    pub fn print_all(&self, engine: &DiagnosticEngine, sources: &SourceManager) {
        for diag in engine.diagnostics() {
            eprintln!("{}", self.format(diag, sources));
        }
    }
}
