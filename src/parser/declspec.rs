//! Declaration specifiers.
//!
//! Basic-type keywords accumulate in a tally (`long long`, `unsigned
//! short int`, ...) and resolve to one concrete type only once the whole
//! specifier run has been consumed; a combination outside the legal set
//! is a reported error. Struct/union/enum specifiers and typedef names
//! are direct types and may not mix with the tally.

use crate::ast::NodeKind;
use crate::const_eval::Value;
use crate::intern::StringId;
use crate::lexer::TokenKind;
use crate::scope::{Object, ObjectKind};
use crate::source_manager::SourceSpan;
use crate::types::{
    next_enum_value, ArrayBound, EnumItem, StructField, TypeKind, TypeQualifiers, TypeRef,
};

use super::Parser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    Typedef,
    Extern,
    Static,
}

#[derive(Debug, Clone, Copy)]
pub struct DeclSpec {
    pub storage: Option<StorageClass>,
    pub ty: TypeRef,
    pub span: SourceSpan,
}

#[derive(Default)]
struct SpecifierTally {
    void: u8,
    bool_: u8,
    char_: u8,
    short: u8,
    int: u8,
    long: u8,
    float: u8,
    double: u8,
    signed: u8,
    unsigned: u8,
    seen: bool,
}

impl SpecifierTally {
    fn add(&mut self, kind: TokenKind) {
        self.seen = true;
        match kind {
            TokenKind::Void => self.void += 1,
            TokenKind::Bool => self.bool_ += 1,
            TokenKind::Char => self.char_ += 1,
            TokenKind::Short => self.short += 1,
            TokenKind::Int => self.int += 1,
            TokenKind::Long => self.long += 1,
            TokenKind::Float => self.float += 1,
            TokenKind::Double => self.double += 1,
            TokenKind::Signed => self.signed += 1,
            TokenKind::Unsigned => self.unsigned += 1,
            _ => unreachable!("not a basic type specifier"),
        }
    }

    /// Map the tally to a basic type, or `None` for an illegal
    /// combination.
    fn resolve(&self) -> Option<TypeRef> {
        let t = self;
        if t.signed + t.unsigned > 1 || t.long > 2 {
            return None;
        }
        let unsigned = t.unsigned == 1;
        let counts = (t.void, t.bool_, t.char_, t.short, t.int, t.long, t.float, t.double);
        let ty = match counts {
            (1, 0, 0, 0, 0, 0, 0, 0) if t.signed + t.unsigned == 0 => TypeRef::VOID,
            (0, 1, 0, 0, 0, 0, 0, 0) if t.signed + t.unsigned == 0 => TypeRef::BOOL,
            (0, 0, 1, 0, 0, 0, 0, 0) => {
                if unsigned {
                    TypeRef::UCHAR
                } else {
                    TypeRef::CHAR
                }
            }
            (0, 0, 0, 1, 0 | 1, 0, 0, 0) => {
                if unsigned {
                    TypeRef::USHORT
                } else {
                    TypeRef::SHORT
                }
            }
            (0, 0, 0, 0, 0 | 1, 0, 0, 0) if t.seen => {
                if unsigned {
                    TypeRef::UINT
                } else {
                    TypeRef::INT
                }
            }
            (0, 0, 0, 0, 0 | 1, 1, 0, 0) => {
                if unsigned {
                    TypeRef::ULONG
                } else {
                    TypeRef::LONG
                }
            }
            (0, 0, 0, 0, 0 | 1, 2, 0, 0) => {
                if unsigned {
                    TypeRef::ULONG_LONG
                } else {
                    TypeRef::LONG_LONG
                }
            }
            (0, 0, 0, 0, 0, 0, 1, 0) if t.signed + t.unsigned == 0 => TypeRef::FLOAT,
            (0, 0, 0, 0, 0, 0, 0, 1) if t.signed + t.unsigned == 0 => TypeRef::DOUBLE,
            (0, 0, 0, 0, 0, 1, 0, 1) if t.signed + t.unsigned == 0 => TypeRef::LONG_DOUBLE,
            _ => return None,
        };
        Some(ty)
    }
}

impl Parser<'_> {
    /// Parse a run of declaration specifiers into a storage class and a
    /// (possibly qualified) type.
    pub(crate) fn parse_declaration_specifiers(&mut self) -> Option<DeclSpec> {
        let start = self.span();
        let mut storage: Option<StorageClass> = None;
        let mut qualifiers = TypeQualifiers::empty();
        let mut tally = SpecifierTally::default();
        let mut direct: Option<TypeRef> = None;

        loop {
            let kind = self.peek_kind();
            match kind {
                TokenKind::Typedef | TokenKind::Extern | TokenKind::Static => {
                    let class = match kind {
                        TokenKind::Typedef => StorageClass::Typedef,
                        TokenKind::Extern => StorageClass::Extern,
                        _ => StorageClass::Static,
                    };
                    if storage.is_some() {
                        self.error("multiple storage class specifiers".to_string(), self.span());
                    }
                    storage = Some(class);
                    self.bump();
                }
                TokenKind::Const => {
                    qualifiers |= TypeQualifiers::CONST;
                    self.bump();
                }
                TokenKind::Volatile => {
                    qualifiers |= TypeQualifiers::VOLATILE;
                    self.bump();
                }
                TokenKind::Restrict => {
                    qualifiers |= TypeQualifiers::RESTRICT;
                    self.bump();
                }
                TokenKind::Void
                | TokenKind::Bool
                | TokenKind::Char
                | TokenKind::Short
                | TokenKind::Int
                | TokenKind::Long
                | TokenKind::Float
                | TokenKind::Double
                | TokenKind::Signed
                | TokenKind::Unsigned => {
                    tally.add(kind);
                    self.bump();
                }
                TokenKind::Struct | TokenKind::Union => {
                    let is_union = kind == TokenKind::Union;
                    direct = Some(self.parse_record_specifier(is_union)?);
                }
                TokenKind::Enum => {
                    direct = Some(self.parse_enum_specifier()?);
                }
                TokenKind::Identifier(name)
                    if direct.is_none() && !tally.seen && self.scopes.is_typedef_name(name) =>
                {
                    let obj = self.scopes.lookup(name)?;
                    direct = Some(self.scopes.object(obj).ty);
                    self.bump();
                }
                _ => break,
            }
        }

        let base = match (direct, tally.seen) {
            (Some(ty), false) => ty,
            (Some(_), true) => {
                self.error(
                    "basic type specifiers cannot combine with a struct/enum/typedef type"
                        .to_string(),
                    start,
                );
                return None;
            }
            (None, _) => match tally.resolve() {
                Some(ty) => ty,
                None => {
                    self.error("invalid type specifier combination".to_string(), start);
                    return None;
                }
            },
        };

        Some(DeclSpec {
            storage,
            ty: self.types.qualified(base, qualifiers),
            span: start,
        })
    }

    // --- struct / union ---

    fn parse_record_specifier(&mut self, is_union: bool) -> Option<TypeRef> {
        let keyword_span = self.span();
        self.bump(); // struct / union

        let tag = match self.peek_kind() {
            TokenKind::Identifier(name) => {
                self.bump();
                Some(name)
            }
            _ => None,
        };

        if self.peek_kind() != TokenKind::LeftBrace {
            let Some(tag) = tag else {
                self.error("expected tag name or member list".to_string(), keyword_span);
                return None;
            };
            // Reference or forward declaration.
            if let Some(existing) = self.scopes.lookup_tag(tag) {
                return Some(existing);
            }
            let ty = self.types.new_struct(Some(tag), is_union);
            self.scopes.declare_tag(tag, ty);
            return Some(ty);
        }

        let ty = match tag {
            Some(tag) => match self.scopes.lookup_tag_local(tag) {
                Some(existing) => {
                    if self.types.is_complete(existing) {
                        self.error(format!("redefinition of tag '{}'", tag.as_str()), keyword_span);
                        return None;
                    }
                    existing
                }
                None => {
                    let ty = self.types.new_struct(Some(tag), is_union);
                    self.scopes.declare_tag(tag, ty);
                    ty
                }
            },
            None => self.types.new_struct(None, is_union),
        };

        self.bump(); // {
        self.parse_record_members(ty)?;
        self.expect(TokenKind::RightBrace)?;
        self.types.finalize(ty);
        Some(ty)
    }

    fn parse_record_members(&mut self, record: TypeRef) -> Option<()> {
        // Span of a previously seen unbounded-array member; any member
        // after it makes the earlier one an error.
        let mut open_array: Option<SourceSpan> = None;

        while !matches!(self.peek_kind(), TokenKind::RightBrace | TokenKind::EndOfFile) {
            let spec = self.parse_declaration_specifiers()?;
            if spec.storage.is_some() {
                self.error("storage class not allowed on a member".to_string(), spec.span);
            }

            loop {
                let d = self.parse_declarator(spec.ty)?;
                let mut bit_width = None;

                if self.eat(TokenKind::Colon) {
                    bit_width = self.parse_bitfield_width(d.ty)?;
                }

                if bit_width.is_none() && d.name.is_none() {
                    self.error("member declares nothing".to_string(), d.span);
                    return None;
                }

                if let Some(span) = open_array.take() {
                    self.error(
                        "unbounded array member must be the last member".to_string(),
                        span,
                    );
                }
                if let TypeKind::Array(a) = self.types.get(d.ty) {
                    if a.bound == ArrayBound::Unbounded {
                        open_array = Some(d.span);
                    }
                }

                // An anonymous bitfield pads without a name.
                let name = d.name.unwrap_or_else(|| StringId::new(""));
                self.types.add_field(
                    record,
                    StructField {
                        name,
                        ty: d.ty,
                        align_override: None,
                        bit_width,
                    },
                );

                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::Semicolon)?;
        }
        Some(())
    }

    /// Parse and fold `: width`. An over-wide width (more bits than the
    /// storage unit has) is a reported error, not an assertion; the
    /// member is dropped from layout by yielding no width.
    fn parse_bitfield_width(&mut self, storage_ty: TypeRef) -> Option<Option<u32>> {
        let width_span = self.span();
        let expr = self.parse_conditional()?;
        let Some(Value::Int(width)) = self.fold_const(expr) else {
            self.error("bitfield width must be a constant expression".to_string(), width_span);
            return None;
        };
        if width < 0 {
            self.error("bitfield width cannot be negative".to_string(), width_span);
            return None;
        }
        let storage_bits = self.types.size_of(storage_ty).map(|s| s * 8);
        match storage_bits {
            Some(bits) if (width as u64) > bits => {
                self.error(
                    format!("bitfield width {} exceeds the {}-bit storage unit", width, bits),
                    width_span,
                );
                None
            }
            None => {
                self.error("bitfield requires an integer storage type".to_string(), width_span);
                None
            }
            _ => Some(Some(width as u32)),
        }
    }

    // --- enum ---

    fn parse_enum_specifier(&mut self) -> Option<TypeRef> {
        let keyword_span = self.span();
        self.bump(); // enum

        let tag = match self.peek_kind() {
            TokenKind::Identifier(name) => {
                self.bump();
                Some(name)
            }
            _ => None,
        };

        if self.peek_kind() != TokenKind::LeftBrace {
            let Some(tag) = tag else {
                self.error("expected tag name or enumerator list".to_string(), keyword_span);
                return None;
            };
            if let Some(existing) = self.scopes.lookup_tag(tag) {
                return Some(existing);
            }
            let ty = self.types.new_enum(Some(tag), TypeRef::INT);
            self.scopes.declare_tag(tag, ty);
            return Some(ty);
        }

        let ty = match tag {
            Some(tag) => match self.scopes.lookup_tag_local(tag) {
                Some(existing) => {
                    if self.types.is_complete(existing) {
                        self.error(format!("redefinition of tag '{}'", tag.as_str()), keyword_span);
                        return None;
                    }
                    existing
                }
                None => {
                    let t = self.types.new_enum(Some(tag), TypeRef::INT);
                    self.scopes.declare_tag(tag, t);
                    t
                }
            },
            None => self.types.new_enum(None, TypeRef::INT),
        };

        self.bump(); // {
        while let TokenKind::Identifier(name) = self.peek_kind() {
            let item_span = self.span();
            self.bump();

            let mut value_expr = None;
            let value = if self.eat(TokenKind::Assign) {
                let expr = self.parse_conditional()?;
                value_expr = Some(expr);
                match self.fold_const(expr) {
                    Some(Value::Int(v)) => v,
                    _ => {
                        self.error(
                            "enumerator value must be an integer constant expression".to_string(),
                            item_span,
                        );
                        0
                    }
                }
            } else {
                match self.types.get(ty) {
                    TypeKind::Enum(e) => next_enum_value(&e.items),
                    _ => 0,
                }
            };

            self.types.add_enum_item(
                ty,
                EnumItem {
                    name,
                    value_expr,
                    value,
                },
            );
            self.scopes.declare(Object {
                name,
                ty,
                span: item_span,
                kind: ObjectKind::EnumConstant { value_expr, value },
            });

            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RightBrace)?;
        self.types.finalize(ty);
        Some(ty)
    }
}
