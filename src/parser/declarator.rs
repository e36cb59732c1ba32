//! Declarators.
//!
//! A declarator is parsed into a syntactic chain first and then applied
//! to the specifier's base type from the outside in, which gives the
//! usual C inside-out reading: in
//! `const volatile int (*(*)(unsigned long, short))[0xff]` the base type
//! ends up innermost and the outermost chain link binds last.

use thin_vec::ThinVec;

use crate::ast::NodeRef;
use crate::const_eval::Value;
use crate::intern::StringId;
use crate::lexer::TokenKind;
use crate::source_manager::SourceSpan;
use crate::types::{ArrayBound, ParamType, TypeKind, TypeQualifiers, TypeRef};

use super::Parser;

pub(crate) struct NamedDeclarator {
    /// `None` for an abstract declarator.
    pub name: Option<StringId>,
    pub ty: TypeRef,
    pub span: SourceSpan,
}

enum Chain {
    Base(Option<StringId>),
    Pointer(TypeQualifiers, Box<Chain>),
    Array(Box<Chain>, ArraySuffix),
    Function {
        inner: Box<Chain>,
        params: ThinVec<ParamType>,
        is_variadic: bool,
        has_prototype: bool,
    },
}

struct ArraySuffix {
    qualifiers: TypeQualifiers,
    is_static: bool,
    bound: ArrayBoundSyntax,
}

enum ArrayBoundSyntax {
    Open,
    Fixed { expr: NodeRef, length: u64 },
    Variable,
}

impl Parser<'_> {
    /// Parse a (named or abstract) declarator against the base type from
    /// the declaration specifiers.
    pub(crate) fn parse_declarator(&mut self, base: TypeRef) -> Option<NamedDeclarator> {
        let span = self.span();
        let chain = self.parse_chain()?;
        let (name, ty) = self.apply_chain(chain, base);
        Some(NamedDeclarator { name, ty, span })
    }

    fn parse_chain(&mut self) -> Option<Chain> {
        if self.eat(TokenKind::Star) {
            let qualifiers = self.parse_qualifier_run();
            let inner = self.parse_chain()?;
            return Some(Chain::Pointer(qualifiers, Box::new(inner)));
        }
        self.parse_direct_chain()
    }

    fn parse_qualifier_run(&mut self) -> TypeQualifiers {
        let mut qualifiers = TypeQualifiers::empty();
        loop {
            match self.peek_kind() {
                TokenKind::Const => qualifiers |= TypeQualifiers::CONST,
                TokenKind::Volatile => qualifiers |= TypeQualifiers::VOLATILE,
                TokenKind::Restrict => qualifiers |= TypeQualifiers::RESTRICT,
                _ => return qualifiers,
            }
            self.bump();
        }
    }

    fn parse_direct_chain(&mut self) -> Option<Chain> {
        let mut chain = match self.peek_kind() {
            TokenKind::Identifier(name) => {
                self.bump();
                Chain::Base(Some(name))
            }
            // `(` opens a parenthesized sub-declarator unless a type
            // name (or nothing) sits immediately inside, which makes it
            // a parameter list on an abstract declarator.
            TokenKind::LeftParen if !self.paren_starts_parameter_list() => {
                self.bump();
                let inner = self.parse_chain()?;
                self.expect(TokenKind::RightParen)?;
                inner
            }
            _ => Chain::Base(None),
        };

        loop {
            match self.peek_kind() {
                TokenKind::LeftBracket => {
                    self.bump();
                    let suffix = self.parse_array_suffix()?;
                    chain = Chain::Array(Box::new(chain), suffix);
                }
                TokenKind::LeftParen => {
                    self.bump();
                    let (params, is_variadic, has_prototype) = self.parse_parameter_list()?;
                    chain = Chain::Function {
                        inner: Box::new(chain),
                        params,
                        is_variadic,
                        has_prototype,
                    };
                }
                _ => return Some(chain),
            }
        }
    }

    fn paren_starts_parameter_list(&self) -> bool {
        match self.peek_ahead(1) {
            TokenKind::RightParen => true,
            TokenKind::Identifier(name) => self.scopes.is_typedef_name(name),
            kind => kind.is_declaration_specifier_start(),
        }
    }

    fn parse_array_suffix(&mut self) -> Option<ArraySuffix> {
        let mut qualifiers = self.parse_qualifier_run();
        let mut is_static = false;
        if self.eat(TokenKind::Static) {
            is_static = true;
            qualifiers |= self.parse_qualifier_run();
        }

        if self.eat(TokenKind::RightBracket) {
            return Some(ArraySuffix {
                qualifiers,
                is_static,
                bound: ArrayBoundSyntax::Open,
            });
        }

        let bound_span = self.span();
        let expr = self.parse_assignment()?;
        self.expect(TokenKind::RightBracket)?;

        let bound = match self.fold_const(expr) {
            Some(Value::Int(length)) => {
                if length < 0 {
                    self.error("array bound cannot be negative".to_string(), bound_span);
                    return None;
                }
                ArrayBoundSyntax::Fixed {
                    expr,
                    length: length as u64,
                }
            }
            Some(Value::Float(_)) => {
                self.error("array bound must be an integer".to_string(), bound_span);
                return None;
            }
            // Not foldable: variable-length array.
            None => ArrayBoundSyntax::Variable,
        };
        Some(ArraySuffix {
            qualifiers,
            is_static,
            bound,
        })
    }

    /// Parse `...)` bodies after a consumed `(`. Yields the parameter
    /// list, the variadic flag, and whether a prototype was given
    /// (`()` leaves the function type incomplete).
    fn parse_parameter_list(&mut self) -> Option<(ThinVec<ParamType>, bool, bool)> {
        let mut params = ThinVec::new();

        if self.eat(TokenKind::RightParen) {
            return Some((params, false, false));
        }

        // `(void)` declares exactly zero parameters.
        if self.peek_kind() == TokenKind::Void && self.peek_ahead(1) == TokenKind::RightParen {
            self.bump();
            self.bump();
            return Some((params, false, true));
        }

        let mut is_variadic = false;
        loop {
            if self.eat(TokenKind::Ellipsis) {
                is_variadic = true;
                break;
            }
            let spec = self.parse_declaration_specifiers()?;
            if spec.storage.is_some() {
                self.error("storage class not allowed on a parameter".to_string(), spec.span);
            }
            let d = self.parse_declarator(spec.ty)?;
            let ty = self.adjust_parameter_type(d.ty);
            params.push(ParamType { name: d.name, ty });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RightParen)?;
        Some((params, is_variadic, true))
    }

    /// Parameter type adjustment: a function decays to a pointer to it,
    /// an array decays to a pointer to its element with the array's
    /// qualifiers carried onto the pointer.
    fn adjust_parameter_type(&mut self, ty: TypeRef) -> TypeRef {
        let qualifiers = self.types.qualifiers_of(ty);
        match self.types.get(self.types.unqualified(ty)) {
            TypeKind::Function(_) => self.types.pointer_to(ty),
            TypeKind::Array(a) => {
                let element = a.element;
                let pointer = self.types.pointer_to(element);
                self.types.qualified(pointer, qualifiers)
            }
            _ => ty,
        }
    }

    fn apply_chain(&mut self, chain: Chain, base: TypeRef) -> (Option<StringId>, TypeRef) {
        match chain {
            Chain::Base(name) => (name, base),
            Chain::Pointer(qualifiers, inner) => {
                let pointer = self.types.pointer_to(base);
                let ty = self.types.qualified(pointer, qualifiers);
                self.apply_chain(*inner, ty)
            }
            Chain::Array(inner, suffix) => {
                let ty = match suffix.bound {
                    ArrayBoundSyntax::Open => {
                        self.types.array_of(base, ArrayBound::Unbounded, None, None)
                    }
                    ArrayBoundSyntax::Fixed { expr, length } => {
                        let bound = if suffix.is_static {
                            ArrayBound::ConstantStatic
                        } else {
                            ArrayBound::Constant
                        };
                        self.types.array_of(base, bound, Some(expr), Some(length))
                    }
                    ArrayBoundSyntax::Variable => {
                        let bound = if suffix.is_static {
                            ArrayBound::VariableLengthStatic
                        } else {
                            ArrayBound::VariableLength
                        };
                        self.types.array_of(base, bound, None, None)
                    }
                };
                // Qualifiers written inside `[]` ride on the array type
                // until parameter adjustment moves them to the pointer.
                let ty = self.types.qualified(ty, suffix.qualifiers);
                self.apply_chain(*inner, ty)
            }
            Chain::Function {
                inner,
                params,
                is_variadic,
                has_prototype,
            } => {
                let function = self.types.new_function(base);
                for param in params {
                    self.types.add_param(function, param);
                }
                if is_variadic {
                    self.types.set_variadic(function);
                }
                if has_prototype {
                    self.types.finalize(function);
                }
                self.apply_chain(*inner, function)
            }
        }
    }

    /// Parse a type name (specifiers plus abstract declarator), used for
    /// casts and `sizeof`.
    pub(crate) fn parse_type_name(&mut self) -> Option<TypeRef> {
        let spec = self.parse_declaration_specifiers()?;
        if spec.storage.is_some() {
            self.error("storage class not allowed in a type name".to_string(), spec.span);
        }
        let d = self.parse_declarator(spec.ty)?;
        if let Some(name) = d.name {
            self.error(
                format!("unexpected name '{}' in type name", name.as_str()),
                d.span,
            );
        }
        Some(d.ty)
    }
}
