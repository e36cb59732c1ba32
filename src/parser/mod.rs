//! Recursive-descent parser.
//!
//! The parser walks the classified token stream once, building the AST
//! and populating the type table and scope table as it goes. Errors are
//! reported to the diagnostic engine; the construct being parsed then
//! yields `None` and the parser resynchronizes at the next statement or
//! declaration boundary so later top-level declarations still get a
//! chance. The driver stops a run once the accumulated error count hits
//! the engine's limit.

mod declarator;
mod declspec;
mod expressions;
mod statements;
#[cfg(test)]
mod tests_parser;

pub use declspec::StorageClass;

use crate::ast::{Ast, NodeKind, NodeRef};
use crate::const_eval::{ConstEval, Value};
use crate::diagnostic::DiagnosticEngine;
use crate::lexer::{Token, TokenKind};
use crate::scope::{Object, ObjectKind, ScopeTable};
use crate::source_manager::SourceSpan;
use crate::types::{self, TypeKind, TypeRef, TypeTable};

pub struct Parser<'ctx> {
    tokens: Vec<Token>,
    position: usize,
    pub(crate) types: &'ctx mut TypeTable,
    pub(crate) ast: &'ctx mut Ast,
    pub(crate) scopes: &'ctx mut ScopeTable,
    pub(crate) diag: &'ctx mut DiagnosticEngine,
}

impl<'ctx> Parser<'ctx> {
    /// The token vector must end with an end-of-file token, which the
    /// lexer guarantees.
    pub fn new(
        tokens: Vec<Token>,
        types: &'ctx mut TypeTable,
        ast: &'ctx mut Ast,
        scopes: &'ctx mut ScopeTable,
        diag: &'ctx mut DiagnosticEngine,
    ) -> Self {
        debug_assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::EndOfFile));
        Parser {
            tokens,
            position: 0,
            types,
            ast,
            scopes,
            diag,
        }
    }

    // --- Token cursor ---

    pub(crate) fn peek(&self) -> &Token {
        let i = self.position.min(self.tokens.len() - 1);
        &self.tokens[i]
    }

    pub(crate) fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    pub(crate) fn peek_ahead(&self, n: usize) -> TokenKind {
        let i = (self.position + n).min(self.tokens.len() - 1);
        self.tokens[i].kind
    }

    pub(crate) fn span(&self) -> SourceSpan {
        self.peek().span
    }

    pub(crate) fn bump(&mut self) -> Token {
        let token = *self.peek();
        if self.position + 1 < self.tokens.len() {
            self.position += 1;
        }
        token
    }

    /// Consume the current token if it matches.
    pub(crate) fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek_kind() == kind {
            self.bump();
            return true;
        }
        false
    }

    /// Consume a required token, reporting a mismatch.
    pub(crate) fn expect(&mut self, kind: TokenKind) -> Option<Token> {
        if self.peek_kind() == kind {
            return Some(self.bump());
        }
        let found = self.peek_kind();
        self.error(
            format!("expected {:?}, found {:?}", kind, found),
            self.span(),
        );
        None
    }

    pub(crate) fn error(&mut self, message: impl Into<String>, span: SourceSpan) {
        self.diag.report_error(message, span);
    }

    /// Skip ahead to just past the next `;` or `}`, the statement and
    /// declaration boundary used for recovery.
    pub(crate) fn resync(&mut self) {
        loop {
            match self.peek_kind() {
                TokenKind::EndOfFile => return,
                TokenKind::Semicolon | TokenKind::RightBrace => {
                    self.bump();
                    return;
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    /// Whether the current token starts a type name: declaration
    /// specifier keyword, or an identifier bound to a typedef.
    pub(crate) fn at_type_name(&self) -> bool {
        match self.peek_kind() {
            TokenKind::Identifier(name) => self.scopes.is_typedef_name(name),
            kind => kind.is_declaration_specifier_start(),
        }
    }

    /// Fold a finished constant expression, checking `is_constexpr`
    /// first; `None` means the tree is not a constant.
    pub(crate) fn fold_const(&self, node: NodeRef) -> Option<Value> {
        let ce = ConstEval::new(self.ast, self.scopes, self.types);
        if !ce.is_constexpr(node) {
            return None;
        }
        ce.eval(node)
    }

    // --- Top level ---

    /// Parse the whole stream; returns the objects declared at file
    /// scope, in order.
    pub fn parse_translation_unit(&mut self) -> Vec<crate::scope::ObjectRef> {
        while self.peek_kind() != TokenKind::EndOfFile {
            if self.diag.at_error_limit() {
                self.error("too many errors, stopping".to_string(), self.span());
                break;
            }
            if self.parse_external_declaration().is_none() {
                self.resync();
            }
        }
        self.scopes.objects_in(crate::scope::ScopeRef::GLOBAL).collect()
    }

    fn parse_external_declaration(&mut self) -> Option<()> {
        let spec = self.parse_declaration_specifiers()?;

        // `struct s;` / `enum e { ... };` — specifier with no declarator.
        if self.eat(TokenKind::Semicolon) {
            return Some(());
        }

        let first = self.parse_declarator(spec.ty)?;

        // A function declarator followed by `{` is a definition.
        if matches!(self.types.get(first.ty), TypeKind::Function(_))
            && self.peek_kind() == TokenKind::LeftBrace
        {
            return self.parse_function_definition(&spec, first);
        }

        let mut declarator = first;
        loop {
            self.finish_declarator(&spec, &declarator)?;
            if !self.eat(TokenKind::Comma) {
                break;
            }
            declarator = self.parse_declarator(spec.ty)?;
        }
        self.expect(TokenKind::Semicolon)?;
        Some(())
    }

    /// Register one parsed declarator as an object, merging with a
    /// previous compatible declaration of the same name.
    fn finish_declarator(
        &mut self,
        spec: &declspec::DeclSpec,
        declarator: &declarator::NamedDeclarator,
    ) -> Option<()> {
        let Some(name) = declarator.name else {
            self.error("declaration declares nothing".to_string(), declarator.span);
            return None;
        };

        let kind = match spec.storage {
            Some(StorageClass::Typedef) => ObjectKind::Typedef,
            _ => match self.types.get(declarator.ty) {
                TypeKind::Function(_) => ObjectKind::Function { body: None },
                _ => ObjectKind::Variable,
            },
        };

        self.merge_redeclaration(name, declarator.ty, declarator.span, kind)?;

        // An initializer is parsed for its syntax; reflection consumers
        // read types and constants, not initial values.
        if self.eat(TokenKind::Assign) {
            self.parse_assignment()?;
        }
        Some(())
    }

    /// Declare `name`, or merge with an existing same-scope declaration
    /// when the types are compatible (composite replaces the stored
    /// type). Incompatible redeclaration is reported.
    fn merge_redeclaration(
        &mut self,
        name: crate::intern::StringId,
        ty: TypeRef,
        span: SourceSpan,
        kind: ObjectKind,
    ) -> Option<crate::scope::ObjectRef> {
        if let Some(existing) = self.scopes.lookup_local(name) {
            let old_ty = self.scopes.object(existing).ty;
            if !types::compatible(self.types, old_ty, ty) {
                self.error(
                    format!("redeclaration of '{}' with incompatible type", name.as_str()),
                    span,
                );
                return None;
            }
            if let Some(merged) = types::composite(self.types, old_ty, ty) {
                self.scopes.object_mut(existing).ty = merged;
            }
            return Some(existing);
        }
        Some(self.scopes.declare(Object {
            name,
            ty,
            span,
            kind,
        }))
    }

    fn parse_function_definition(
        &mut self,
        spec: &declspec::DeclSpec,
        declarator: declarator::NamedDeclarator,
    ) -> Option<()> {
        let Some(name) = declarator.name else {
            self.error("function definition requires a name".to_string(), declarator.span);
            return None;
        };
        if spec.storage == Some(StorageClass::Typedef) {
            self.error("function definition cannot be a typedef".to_string(), declarator.span);
            return None;
        }

        let object = self.merge_redeclaration(
            name,
            declarator.ty,
            declarator.span,
            ObjectKind::Function { body: None },
        )?;

        // Parameters live in the body's scope.
        let scope = self.scopes.push();
        let params: Vec<_> = match self.types.get(declarator.ty) {
            TypeKind::Function(f) => f.params.iter().cloned().collect(),
            _ => Vec::new(),
        };
        for param in params {
            if let Some(param_name) = param.name {
                self.scopes.declare(Object {
                    name: param_name,
                    ty: param.ty,
                    span: declarator.span,
                    kind: ObjectKind::Variable,
                });
            }
        }

        let body = self.parse_block_in_current_scope(scope);
        self.scopes.pop();
        let body = body?;

        if let ObjectKind::Function { body: slot } = &mut self.scopes.object_mut(object).kind {
            *slot = Some(body);
        }
        Some(())
    }

    /// Local declaration inside a block: same shape as a top-level
    /// declaration, but the resulting objects are collected for the
    /// enclosing block's Declaration node.
    pub(crate) fn parse_local_declaration(&mut self) -> Option<NodeRef> {
        let start = self.span();
        let spec = self.parse_declaration_specifiers()?;
        let mut declared = thin_vec::ThinVec::new();

        if self.eat(TokenKind::Semicolon) {
            return Some(self.ast.push(NodeKind::Declaration(declared), start, None));
        }

        loop {
            let d = self.parse_declarator(spec.ty)?;
            let Some(name) = d.name else {
                self.error("declaration declares nothing".to_string(), d.span);
                return None;
            };
            let kind = match spec.storage {
                Some(StorageClass::Typedef) => ObjectKind::Typedef,
                _ => match self.types.get(d.ty) {
                    TypeKind::Function(_) => ObjectKind::Function { body: None },
                    _ => ObjectKind::Variable,
                },
            };
            let obj = self.merge_redeclaration(name, d.ty, d.span, kind)?;
            declared.push(obj);
            if self.eat(TokenKind::Assign) {
                self.parse_assignment()?;
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Semicolon)?;
        Some(self.ast.push(NodeKind::Declaration(declared), start, None))
    }
}
