//! Per-translation-unit pipeline.
//!
//! A `Translator` owns everything one compilation touches: source
//! buffers, the diagnostic list, the type table, the AST arena, and the
//! scope table. Independent units run in independent translators with no
//! shared mutable state, so unit-level parallelism needs no locking.

use crate::ast::Ast;
use crate::diagnostic::DiagnosticEngine;
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::pp::Preprocessor;
use crate::scope::{ObjectRef, ScopeRef, ScopeTable};
use crate::source_manager::{SourceId, SourceManager};
use crate::types::TypeTable;

/// What a finished run hands to reflection consumers: the file-scope
/// objects in declaration order, plus the type graph and per-function
/// body ASTs reachable from them through the translator.
pub struct TranslationUnit {
    pub globals: Vec<ObjectRef>,
    pub global_scope: ScopeRef,
}

pub struct Translator {
    pub sources: SourceManager,
    pub diagnostics: DiagnosticEngine,
    pub types: TypeTable,
    pub ast: Ast,
    pub scopes: ScopeTable,
    predefined: Vec<(String, String)>,
}

impl Default for Translator {
    fn default() -> Self {
        Self::new()
    }
}

impl Translator {
    pub fn new() -> Self {
        Translator {
            sources: SourceManager::new(),
            diagnostics: DiagnosticEngine::new(),
            types: TypeTable::new(),
            ast: Ast::new(),
            scopes: ScopeTable::new(),
            predefined: Vec::new(),
        }
    }

    /// Predefine an object-like macro (`-D NAME[=VALUE]`).
    pub fn define_macro(&mut self, name: &str, replacement: &str) {
        self.predefined.push((name.to_string(), replacement.to_string()));
    }

    /// Register a buffer so `#include "path"` can splice it.
    pub fn add_include_buffer(&mut self, path: &str, text: &str) -> SourceId {
        self.sources.add_buffer(path, text)
    }

    /// Run the whole pipeline over one source buffer. `None` means a lex
    /// error abandoned the file; for every other failure mode the
    /// diagnostics list carries the errors, and a run with any error
    /// produces a type graph the caller must not trust.
    pub fn parse_source(&mut self, path: &str, text: &str) -> Option<TranslationUnit> {
        let source_id = self.sources.add_buffer(path, text);

        let mut pp = Preprocessor::new(&mut self.sources, &mut self.diagnostics);
        for (name, replacement) in &self.predefined {
            pp.define_object_macro(name, replacement);
        }
        let pp_tokens = pp.process(source_id);

        let tokens = match Lexer::new(&pp_tokens).tokenize_all() {
            Ok(tokens) => tokens,
            Err(err) => {
                self.diagnostics.report_error(err.to_string(), err.location());
                return None;
            }
        };

        let globals = Parser::new(
            tokens,
            &mut self.types,
            &mut self.ast,
            &mut self.scopes,
            &mut self.diagnostics,
        )
        .parse_translation_unit();

        Some(TranslationUnit {
            globals,
            global_scope: ScopeRef::GLOBAL,
        })
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors()
    }
}
