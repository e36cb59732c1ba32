//! A self-contained C-declaration front end that builds reflection
//! metadata: a deduplicated type graph, folded enum and array-bound
//! constants, and function signatures with bodies kept as index-based
//! ASTs.

/// Contains the expression and statement AST arena.
pub mod ast;
/// Constant-expression folding.
pub mod const_eval;
/// Contains the diagnostic engine and renderer.
pub mod diagnostic;
pub mod intern;
/// Token classification over the preprocessed stream.
pub mod lexer;
pub mod parser;
/// Contains the macro preprocessor and its raw lexer.
pub mod pp;
/// Nested symbol tables for objects and tags.
pub mod scope;
pub mod source_manager;
/// Per-translation-unit pipeline.
pub mod translator;
/// The structural type table.
pub mod types;

pub use diagnostic::{Diagnostic, DiagnosticEngine, DiagnosticRenderer};
pub use translator::{TranslationUnit, Translator};
