//! Structural type system.
//!
//! Types live in a per-context `TypeTable` arena and are referenced by
//! `TypeRef` indices. Basic types occupy fixed slots created with the
//! table. Composite types are built incomplete, mutated while their body
//! is parsed, and finalized exactly once; the three-way relations
//! (`same`, `compatible`, `composite`) are pattern-matched free functions
//! over the closed `TypeKind` enum.

use std::fmt;

use thin_vec::ThinVec;

use crate::ast::NodeRef;
use crate::intern::StringId;

bitflags::bitflags! {
    /// Type qualifiers, one byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TypeQualifiers: u8 {
        const CONST    = 0b0001;
        const VOLATILE = 0b0010;
        const RESTRICT = 0b0100;
    }
}

/// Index into a `TypeTable`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[repr(transparent)]
pub struct TypeRef(u32);

impl TypeRef {
    // Fixed slots for the basic types, in table creation order.
    pub const VOID: TypeRef = TypeRef(0);
    pub const BOOL: TypeRef = TypeRef(1);
    pub const CHAR: TypeRef = TypeRef(2);
    pub const UCHAR: TypeRef = TypeRef(3);
    pub const SHORT: TypeRef = TypeRef(4);
    pub const USHORT: TypeRef = TypeRef(5);
    pub const INT: TypeRef = TypeRef(6);
    pub const UINT: TypeRef = TypeRef(7);
    pub const LONG: TypeRef = TypeRef(8);
    pub const ULONG: TypeRef = TypeRef(9);
    pub const LONG_LONG: TypeRef = TypeRef(10);
    pub const ULONG_LONG: TypeRef = TypeRef(11);
    pub const FLOAT: TypeRef = TypeRef(12);
    pub const DOUBLE: TypeRef = TypeRef(13);
    pub const LONG_DOUBLE: TypeRef = TypeRef(14);
    pub const VARIADIC: TypeRef = TypeRef(15);
    pub const ELLIPSIS: TypeRef = TypeRef(16);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T#{}", self.0)
    }
}

/// Array boundary classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayBound {
    Unbounded,
    Constant,
    ConstantStatic,
    VariableLength,
    VariableLengthStatic,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArrayType {
    pub element: TypeRef,
    pub bound: ArrayBound,
    /// Constant-expression AST for a constant bound.
    pub length_expr: Option<NodeRef>,
    /// Folded length for a constant bound.
    pub length: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParamType {
    pub name: Option<StringId>,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub return_type: TypeRef,
    pub params: ThinVec<ParamType>,
    pub is_variadic: bool,
    pub complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructField {
    pub name: StringId,
    pub ty: TypeRef,
    pub align_override: Option<u32>,
    pub bit_width: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructType {
    pub tag: Option<StringId>,
    pub is_union: bool,
    pub fields: ThinVec<StructField>,
    pub complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumItem {
    pub name: StringId,
    pub value_expr: Option<NodeRef>,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumType {
    pub tag: Option<StringId>,
    pub underlying: TypeRef,
    pub items: ThinVec<EnumItem>,
    pub complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedType {
    pub base: TypeRef,
    pub qualifiers: TypeQualifiers,
}

/// Closed set of type node variants.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Void,
    Bool,
    Char,
    UnsignedChar,
    Short,
    UnsignedShort,
    Int,
    UnsignedInt,
    Long,
    UnsignedLong,
    LongLong,
    UnsignedLongLong,
    Float,
    Double,
    LongDouble,
    Pointer(TypeRef),
    Array(ArrayType),
    Function(FunctionType),
    Struct(StructType),
    Enum(EnumType),
    Qualified(QualifiedType),
    /// Sentinel for a variadic parameter slot.
    Variadic,
    /// Sentinel for the `...` marker itself.
    Ellipsis,
}

impl TypeKind {
    pub fn is_basic(&self) -> bool {
        matches!(
            self,
            TypeKind::Void
                | TypeKind::Bool
                | TypeKind::Char
                | TypeKind::UnsignedChar
                | TypeKind::Short
                | TypeKind::UnsignedShort
                | TypeKind::Int
                | TypeKind::UnsignedInt
                | TypeKind::Long
                | TypeKind::UnsignedLong
                | TypeKind::LongLong
                | TypeKind::UnsignedLongLong
                | TypeKind::Float
                | TypeKind::Double
                | TypeKind::LongDouble
        )
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            TypeKind::Bool
                | TypeKind::Char
                | TypeKind::UnsignedChar
                | TypeKind::Short
                | TypeKind::UnsignedShort
                | TypeKind::Int
                | TypeKind::UnsignedInt
                | TypeKind::Long
                | TypeKind::UnsignedLong
                | TypeKind::LongLong
                | TypeKind::UnsignedLongLong
        )
    }

    pub fn is_floating(&self) -> bool {
        matches!(self, TypeKind::Float | TypeKind::Double | TypeKind::LongDouble)
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            TypeKind::Char
                | TypeKind::Short
                | TypeKind::Int
                | TypeKind::Long
                | TypeKind::LongLong
        )
    }

    pub fn integer_rank(&self) -> i32 {
        match self {
            TypeKind::Bool => 1,
            TypeKind::Char | TypeKind::UnsignedChar => 2,
            TypeKind::Short | TypeKind::UnsignedShort => 3,
            TypeKind::Int | TypeKind::UnsignedInt => 4,
            TypeKind::Long | TypeKind::UnsignedLong => 5,
            TypeKind::LongLong | TypeKind::UnsignedLongLong => 6,
            _ => 0,
        }
    }
}

/// Per-context type arena.
///
/// Immutable kinds (basics, pointers, qualified wrappers, completed
/// arrays) are deduplicated structurally through `dedup`. Aggregates and
/// functions are allocated fresh, since their bodies mutate until
/// finalization.
pub struct TypeTable {
    types: Vec<TypeKind>,
    dedup: hashbrown::HashMap<TypeKind, TypeRef>,
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTable {
    pub fn new() -> Self {
        let mut table = TypeTable {
            types: Vec::with_capacity(32),
            dedup: hashbrown::HashMap::new(),
        };
        // Order must match the TypeRef constants.
        for kind in [
            TypeKind::Void,
            TypeKind::Bool,
            TypeKind::Char,
            TypeKind::UnsignedChar,
            TypeKind::Short,
            TypeKind::UnsignedShort,
            TypeKind::Int,
            TypeKind::UnsignedInt,
            TypeKind::Long,
            TypeKind::UnsignedLong,
            TypeKind::LongLong,
            TypeKind::UnsignedLongLong,
            TypeKind::Float,
            TypeKind::Double,
            TypeKind::LongDouble,
            TypeKind::Variadic,
            TypeKind::Ellipsis,
        ] {
            let r = TypeRef(table.types.len() as u32);
            table.dedup.insert(kind.clone(), r);
            table.types.push(kind);
        }
        table
    }

    pub fn get(&self, r: TypeRef) -> &TypeKind {
        &self.types[r.index()]
    }

    fn get_mut(&mut self, r: TypeRef) -> &mut TypeKind {
        &mut self.types[r.index()]
    }

    fn alloc(&mut self, kind: TypeKind) -> TypeRef {
        let r = TypeRef(self.types.len() as u32);
        self.types.push(kind);
        r
    }

    /// Intern a structurally immutable kind.
    fn intern(&mut self, kind: TypeKind) -> TypeRef {
        if let Some(&r) = self.dedup.get(&kind) {
            return r;
        }
        let r = self.alloc(kind.clone());
        self.dedup.insert(kind, r);
        r
    }

    pub fn pointer_to(&mut self, pointee: TypeRef) -> TypeRef {
        self.intern(TypeKind::Pointer(pointee))
    }

    pub fn qualified(&mut self, base: TypeRef, qualifiers: TypeQualifiers) -> TypeRef {
        if qualifiers.is_empty() {
            return base;
        }
        // Collapse nested qualification into one record.
        if let TypeKind::Qualified(q) = self.get(base) {
            let merged = QualifiedType {
                base: q.base,
                qualifiers: q.qualifiers | qualifiers,
            };
            return self.intern(TypeKind::Qualified(merged));
        }
        self.intern(TypeKind::Qualified(QualifiedType { base, qualifiers }))
    }

    pub fn array_of(
        &mut self,
        element: TypeRef,
        bound: ArrayBound,
        length_expr: Option<NodeRef>,
        length: Option<u64>,
    ) -> TypeRef {
        self.intern(TypeKind::Array(ArrayType {
            element,
            bound,
            length_expr,
            length,
        }))
    }

    /// Allocate an incomplete function type; parameters are added while
    /// the parameter list is parsed.
    pub fn new_function(&mut self, return_type: TypeRef) -> TypeRef {
        self.alloc(TypeKind::Function(FunctionType {
            return_type,
            params: ThinVec::new(),
            is_variadic: false,
            complete: false,
        }))
    }

    pub fn add_param(&mut self, function: TypeRef, param: ParamType) {
        if let TypeKind::Function(f) = self.get_mut(function) {
            debug_assert!(!f.complete, "parameter added after finalize");
            f.params.push(param);
        }
    }

    pub fn set_variadic(&mut self, function: TypeRef) {
        if let TypeKind::Function(f) = self.get_mut(function) {
            debug_assert!(!f.complete, "variadic flag set after finalize");
            f.is_variadic = true;
        }
    }

    pub fn new_struct(&mut self, tag: Option<StringId>, is_union: bool) -> TypeRef {
        self.alloc(TypeKind::Struct(StructType {
            tag,
            is_union,
            fields: ThinVec::new(),
            complete: false,
        }))
    }

    pub fn add_field(&mut self, record: TypeRef, field: StructField) {
        if let TypeKind::Struct(s) = self.get_mut(record) {
            debug_assert!(!s.complete, "field added after finalize");
            s.fields.push(field);
        }
    }

    pub fn new_enum(&mut self, tag: Option<StringId>, underlying: TypeRef) -> TypeRef {
        self.alloc(TypeKind::Enum(EnumType {
            tag,
            underlying,
            items: ThinVec::new(),
            complete: false,
        }))
    }

    pub fn add_enum_item(&mut self, enum_ref: TypeRef, item: EnumItem) {
        if let TypeKind::Enum(e) = self.get_mut(enum_ref) {
            debug_assert!(!e.complete, "enumerator added after finalize");
            e.items.push(item);
        }
    }

    /// Move a composite type from incomplete to complete. Must be called
    /// exactly once per aggregate; further mutation is disallowed.
    pub fn finalize(&mut self, r: TypeRef) {
        match self.get_mut(r) {
            TypeKind::Function(f) => {
                debug_assert!(!f.complete, "type finalized twice");
                f.complete = true;
            }
            TypeKind::Struct(s) => {
                debug_assert!(!s.complete, "type finalized twice");
                s.complete = true;
            }
            TypeKind::Enum(e) => {
                debug_assert!(!e.complete, "type finalized twice");
                e.complete = true;
            }
            _ => {}
        }
    }

    pub fn is_complete(&self, r: TypeRef) -> bool {
        match self.get(r) {
            TypeKind::Function(f) => f.complete,
            TypeKind::Struct(s) => s.complete,
            TypeKind::Enum(e) => e.complete,
            TypeKind::Void => false,
            TypeKind::Array(a) => a.bound != ArrayBound::Unbounded,
            TypeKind::Qualified(q) => self.is_complete(q.base),
            _ => true,
        }
    }

    /// Strip qualification wrappers.
    pub fn unqualified(&self, r: TypeRef) -> TypeRef {
        match self.get(r) {
            TypeKind::Qualified(q) => q.base,
            _ => r,
        }
    }

    pub fn qualifiers_of(&self, r: TypeRef) -> TypeQualifiers {
        match self.get(r) {
            TypeKind::Qualified(q) => q.qualifiers,
            _ => TypeQualifiers::empty(),
        }
    }

    pub fn is_pointer(&self, r: TypeRef) -> bool {
        matches!(self.get(self.unqualified(r)), TypeKind::Pointer(_))
    }

    pub fn pointee(&self, r: TypeRef) -> Option<TypeRef> {
        match self.get(self.unqualified(r)) {
            TypeKind::Pointer(p) => Some(*p),
            _ => None,
        }
    }

    pub fn is_integer(&self, r: TypeRef) -> bool {
        let unqual = self.unqualified(r);
        self.get(unqual).is_integer() || matches!(self.get(unqual), TypeKind::Enum(_))
    }

    pub fn is_arithmetic(&self, r: TypeRef) -> bool {
        let k = self.get(self.unqualified(r));
        k.is_integer() || k.is_floating() || matches!(k, TypeKind::Enum(_))
    }

    /// Render a type outside-in as readable English, for dumps and logs:
    /// `pointer to function(unsigned long, short) returning pointer to
    /// array[255] of const volatile int`.
    pub fn describe(&self, r: TypeRef) -> String {
        match self.get(r) {
            TypeKind::Void => "void".to_string(),
            TypeKind::Bool => "_Bool".to_string(),
            TypeKind::Char => "char".to_string(),
            TypeKind::UnsignedChar => "unsigned char".to_string(),
            TypeKind::Short => "short".to_string(),
            TypeKind::UnsignedShort => "unsigned short".to_string(),
            TypeKind::Int => "int".to_string(),
            TypeKind::UnsignedInt => "unsigned int".to_string(),
            TypeKind::Long => "long".to_string(),
            TypeKind::UnsignedLong => "unsigned long".to_string(),
            TypeKind::LongLong => "long long".to_string(),
            TypeKind::UnsignedLongLong => "unsigned long long".to_string(),
            TypeKind::Float => "float".to_string(),
            TypeKind::Double => "double".to_string(),
            TypeKind::LongDouble => "long double".to_string(),
            TypeKind::Variadic => "...".to_string(),
            TypeKind::Ellipsis => "...".to_string(),
            TypeKind::Pointer(p) => format!("pointer to {}", self.describe(*p)),
            TypeKind::Qualified(q) => {
                let mut prefix = String::new();
                if q.qualifiers.contains(TypeQualifiers::CONST) {
                    prefix.push_str("const ");
                }
                if q.qualifiers.contains(TypeQualifiers::VOLATILE) {
                    prefix.push_str("volatile ");
                }
                if q.qualifiers.contains(TypeQualifiers::RESTRICT) {
                    prefix.push_str("restrict ");
                }
                format!("{}{}", prefix, self.describe(q.base))
            }
            TypeKind::Array(a) => match a.length {
                Some(n) => format!("array[{}] of {}", n, self.describe(a.element)),
                None => format!("array[] of {}", self.describe(a.element)),
            },
            TypeKind::Function(f) => {
                let params: Vec<String> =
                    f.params.iter().map(|p| self.describe(p.ty)).collect();
                let mut list = params.join(", ");
                if f.is_variadic {
                    if !list.is_empty() {
                        list.push_str(", ");
                    }
                    list.push_str("...");
                }
                format!(
                    "function({}) returning {}",
                    list,
                    self.describe(f.return_type)
                )
            }
            TypeKind::Struct(s) => {
                let keyword = if s.is_union { "union" } else { "struct" };
                match s.tag {
                    Some(tag) => format!("{} {}", keyword, tag.as_str()),
                    None => format!("{} <anonymous>", keyword),
                }
            }
            TypeKind::Enum(e) => match e.tag {
                Some(tag) => format!("enum {}", tag.as_str()),
                None => "enum <anonymous>".to_string(),
            },
        }
    }
}

/// The next auto-numbered enumerator value: previous + 1 (0 for the
/// first), skipping any value already used explicitly in the same enum.
pub fn next_enum_value(items: &[EnumItem]) -> i64 {
    let mut candidate = match items.last() {
        Some(item) => item.value.wrapping_add(1),
        None => 0,
    };
    while items.iter().any(|item| item.value == candidate) {
        candidate = candidate.wrapping_add(1);
    }
    candidate
}

// ---------------------------------------------------------------------------
// Three-way type relations.

/// Structural identity.
pub fn same(table: &TypeTable, a: TypeRef, b: TypeRef) -> bool {
    if a == b {
        return true;
    }
    match (table.get(a), table.get(b)) {
        (TypeKind::Pointer(pa), TypeKind::Pointer(pb)) => same(table, *pa, *pb),
        (TypeKind::Array(aa), TypeKind::Array(ab)) => {
            aa.bound == ab.bound && aa.length == ab.length && same(table, aa.element, ab.element)
        }
        (TypeKind::Function(fa), TypeKind::Function(fb)) => {
            fa.is_variadic == fb.is_variadic
                && fa.params.len() == fb.params.len()
                && same(table, fa.return_type, fb.return_type)
                && fa
                    .params
                    .iter()
                    .zip(fb.params.iter())
                    .all(|(pa, pb)| same(table, pa.ty, pb.ty))
        }
        (TypeKind::Struct(sa), TypeKind::Struct(sb)) => {
            sa.is_union == sb.is_union
                && sa.tag == sb.tag
                && sa.complete == sb.complete
                && sa.fields.len() == sb.fields.len()
                && sa.fields.iter().zip(sb.fields.iter()).all(|(fa, fb)| {
                    fa.name == fb.name
                        && fa.bit_width == fb.bit_width
                        && same(table, fa.ty, fb.ty)
                })
        }
        (TypeKind::Enum(ea), TypeKind::Enum(eb)) => {
            ea.tag == eb.tag
                && same(table, ea.underlying, eb.underlying)
                && ea.items.len() == eb.items.len()
                && ea
                    .items
                    .iter()
                    .zip(eb.items.iter())
                    .all(|(ia, ib)| ia.name == ib.name && ia.value == ib.value)
        }
        (TypeKind::Qualified(qa), TypeKind::Qualified(qb)) => {
            qa.qualifiers == qb.qualifiers && same(table, qa.base, qb.base)
        }
        // Basic types: variant identity covers rank and signedness.
        (ka, kb) => ka == kb && ka.is_basic(),
    }
}

/// Relaxed equality used for redeclaration checking.
pub fn compatible(table: &TypeTable, a: TypeRef, b: TypeRef) -> bool {
    if same(table, a, b) {
        return true;
    }
    match (table.get(a), table.get(b)) {
        // An enum is compatible with its underlying integer type, in
        // either position.
        (TypeKind::Enum(e), other) if other.is_integer() => same(table, e.underlying, b),
        (other, TypeKind::Enum(e)) if other.is_integer() => same(table, a, e.underlying),
        (TypeKind::Pointer(pa), TypeKind::Pointer(pb)) => compatible(table, *pa, *pb),
        // Bounded arrays are compatible regardless of length.
        (TypeKind::Array(aa), TypeKind::Array(ab)) => compatible(table, aa.element, ab.element),
        (TypeKind::Function(fa), TypeKind::Function(fb)) => {
            compatible(table, fa.return_type, fb.return_type)
                && (!fa.complete
                    || !fb.complete
                    || (fa.is_variadic == fb.is_variadic
                        && fa.params.len() == fb.params.len()
                        && fa
                            .params
                            .iter()
                            .zip(fb.params.iter())
                            .all(|(pa, pb)| compatible(table, pa.ty, pb.ty))))
        }
        (TypeKind::Struct(sa), TypeKind::Struct(sb)) => {
            // A forward declaration is compatible with its definition.
            sa.is_union == sb.is_union && sa.tag == sb.tag && (!sa.complete || !sb.complete)
        }
        (TypeKind::Enum(ea), TypeKind::Enum(eb)) => {
            ea.tag == eb.tag && (!ea.complete || !eb.complete)
        }
        // A qualification record that ended up empty adds nothing.
        (TypeKind::Qualified(qa), _) if qa.qualifiers.is_empty() => compatible(table, qa.base, b),
        (_, TypeKind::Qualified(qb)) if qb.qualifiers.is_empty() => compatible(table, a, qb.base),
        (TypeKind::Qualified(qa), TypeKind::Qualified(qb)) => {
            qa.qualifiers == qb.qualifiers && compatible(table, qa.base, qb.base)
        }
        _ => false,
    }
}

/// Merge two compatible types into the most informative common type.
/// Yields `None` when the types are not compatible.
pub fn composite(table: &mut TypeTable, a: TypeRef, b: TypeRef) -> Option<TypeRef> {
    if !compatible(table, a, b) {
        return None;
    }
    if same(table, a, b) {
        return Some(a);
    }
    match (table.get(a).clone(), table.get(b).clone()) {
        // The enum is more specific than its underlying integer.
        (TypeKind::Enum(_), other) if other.is_integer() => Some(a),
        (other, TypeKind::Enum(_)) if other.is_integer() => Some(b),
        (TypeKind::Pointer(pa), TypeKind::Pointer(pb)) => {
            let inner = composite(table, pa, pb)?;
            Some(table.pointer_to(inner))
        }
        (TypeKind::Array(aa), TypeKind::Array(ab)) => {
            let element = composite(table, aa.element, ab.element)?;
            // A known bound wins over an unknown one.
            let (bound, length_expr, length) = if aa.bound == ArrayBound::Unbounded {
                (ab.bound, ab.length_expr, ab.length)
            } else {
                (aa.bound, aa.length_expr, aa.length)
            };
            Some(table.array_of(element, bound, length_expr, length))
        }
        (TypeKind::Function(fa), TypeKind::Function(fb)) => {
            let return_type = composite(table, fa.return_type, fb.return_type)?;
            let (from, other) = if fb.complete { (fb, fa) } else { (fa, fb) };
            let result = table.new_function(return_type);
            for (i, param) in from.params.iter().enumerate() {
                let ty = match other.params.get(i) {
                    Some(p) if other.complete => composite(table, param.ty, p.ty)?,
                    _ => param.ty,
                };
                table.add_param(
                    result,
                    ParamType {
                        name: param.name,
                        ty,
                    },
                );
            }
            if from.is_variadic {
                table.set_variadic(result);
            }
            if from.complete {
                table.finalize(result);
            }
            Some(result)
        }
        (TypeKind::Struct(sa), TypeKind::Struct(_)) => {
            // Compatibility guarantees at most one side is complete.
            Some(if sa.complete { a } else { b })
        }
        (TypeKind::Enum(ea), TypeKind::Enum(_)) => Some(if ea.complete { a } else { b }),
        (TypeKind::Qualified(qa), _) if qa.qualifiers.is_empty() => composite(table, qa.base, b),
        (_, TypeKind::Qualified(qb)) if qb.qualifiers.is_empty() => composite(table, a, qb.base),
        (TypeKind::Qualified(qa), TypeKind::Qualified(qb)) => {
            let base = composite(table, qa.base, qb.base)?;
            Some(table.qualified(base, qa.qualifiers))
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Layout (LP64 data model).

impl TypeTable {
    /// Alignment in bytes; `None` for incomplete or sizeless types.
    pub fn align_of(&self, r: TypeRef) -> Option<u64> {
        match self.get(r) {
            TypeKind::Void | TypeKind::Variadic | TypeKind::Ellipsis | TypeKind::Function(_) => {
                None
            }
            TypeKind::Bool | TypeKind::Char | TypeKind::UnsignedChar => Some(1),
            TypeKind::Short | TypeKind::UnsignedShort => Some(2),
            TypeKind::Int | TypeKind::UnsignedInt | TypeKind::Float => Some(4),
            TypeKind::Long
            | TypeKind::UnsignedLong
            | TypeKind::LongLong
            | TypeKind::UnsignedLongLong
            | TypeKind::Double
            | TypeKind::Pointer(_) => Some(8),
            TypeKind::LongDouble => Some(16),
            TypeKind::Array(a) => self.align_of(a.element),
            TypeKind::Enum(e) => {
                if !e.complete {
                    return None;
                }
                self.align_of(e.underlying)
            }
            TypeKind::Struct(s) => {
                if !s.complete {
                    return None;
                }
                let mut align = 1;
                for field in &s.fields {
                    let field_align = match field.align_override {
                        Some(a) => a as u64,
                        None => self.align_of(field.ty)?,
                    };
                    align = align.max(field_align);
                }
                Some(align)
            }
            TypeKind::Qualified(q) => self.align_of(q.base),
        }
    }

    /// Size in bytes; `None` for incomplete or sizeless types.
    pub fn size_of(&self, r: TypeRef) -> Option<u64> {
        match self.get(r) {
            TypeKind::Void | TypeKind::Variadic | TypeKind::Ellipsis | TypeKind::Function(_) => {
                None
            }
            TypeKind::Bool | TypeKind::Char | TypeKind::UnsignedChar => Some(1),
            TypeKind::Short | TypeKind::UnsignedShort => Some(2),
            TypeKind::Int | TypeKind::UnsignedInt | TypeKind::Float => Some(4),
            TypeKind::Long
            | TypeKind::UnsignedLong
            | TypeKind::LongLong
            | TypeKind::UnsignedLongLong
            | TypeKind::Double
            | TypeKind::Pointer(_) => Some(8),
            TypeKind::LongDouble => Some(16),
            TypeKind::Array(a) => {
                let length = a.length?;
                Some(self.size_of(a.element)? * length)
            }
            TypeKind::Enum(e) => {
                if !e.complete {
                    return None;
                }
                self.size_of(e.underlying)
            }
            TypeKind::Struct(s) => {
                if !s.complete {
                    return None;
                }
                if s.is_union {
                    let mut size = 0;
                    for field in &s.fields {
                        size = size.max(self.size_of(field.ty)?);
                    }
                    let align = self.align_of(r)?;
                    return Some(size.div_ceil(align) * align);
                }
                self.struct_layout_size(s)
            }
            TypeKind::Qualified(q) => self.size_of(q.base),
        }
    }

    /// Sequential struct layout with bitfield packing: consecutive
    /// bitfields share storage units of their declared base size, and a
    /// non-bitfield field forces whole-byte (and field-aligned)
    /// placement.
    fn struct_layout_size(&self, s: &StructType) -> Option<u64> {
        let mut bit_offset: u64 = 0;
        let mut max_align: u64 = 1;

        for field in &s.fields {
            let field_align = match field.align_override {
                Some(a) => a as u64,
                None => self.align_of(field.ty)?,
            };
            max_align = max_align.max(field_align);

            match field.bit_width {
                Some(width) => {
                    let unit_bits = self.size_of(field.ty)? * 8;
                    let width = width as u64;
                    // A zero width or a crossing run starts a new unit.
                    let used_in_unit = bit_offset % unit_bits;
                    if width == 0 || used_in_unit + width > unit_bits {
                        bit_offset = bit_offset.div_ceil(unit_bits) * unit_bits;
                    }
                    if width > 0 {
                        bit_offset += width;
                    }
                }
                None => {
                    // Force whole-byte alignment after a bitfield run.
                    let align_bits = field_align * 8;
                    bit_offset = bit_offset.div_ceil(align_bits) * align_bits;
                    bit_offset += self.size_of(field.ty)? * 8;
                }
            }
        }

        let size_bytes = bit_offset.div_ceil(8);
        Some(size_bytes.div_ceil(max_align) * max_align)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic_refs() -> Vec<TypeRef> {
        vec![
            TypeRef::VOID,
            TypeRef::BOOL,
            TypeRef::CHAR,
            TypeRef::UCHAR,
            TypeRef::SHORT,
            TypeRef::USHORT,
            TypeRef::INT,
            TypeRef::UINT,
            TypeRef::LONG,
            TypeRef::ULONG,
            TypeRef::LONG_LONG,
            TypeRef::ULONG_LONG,
            TypeRef::FLOAT,
            TypeRef::DOUBLE,
            TypeRef::LONG_DOUBLE,
        ]
    }

    #[test]
    fn same_implies_compatible_implies_composite_identity() {
        let mut table = TypeTable::new();
        for a in basic_refs() {
            for b in basic_refs() {
                if same(&table, a, b) {
                    assert!(compatible(&table, a, b), "{a:?} vs {b:?}");
                    assert_eq!(composite(&mut table, a, b), Some(a), "{a:?} vs {b:?}");
                }
            }
        }
    }

    #[test]
    fn distinct_basics_are_not_same() {
        let table = TypeTable::new();
        assert!(!same(&table, TypeRef::INT, TypeRef::UINT));
        assert!(!same(&table, TypeRef::INT, TypeRef::LONG));
        assert!(!same(&table, TypeRef::FLOAT, TypeRef::DOUBLE));
    }

    #[test]
    fn pointer_interning_dedupes() {
        let mut table = TypeTable::new();
        let a = table.pointer_to(TypeRef::INT);
        let b = table.pointer_to(TypeRef::INT);
        assert_eq!(a, b);
        let c = table.pointer_to(TypeRef::CHAR);
        assert_ne!(a, c);
    }

    #[test]
    fn enum_compatible_with_underlying_integer_both_ways() {
        let mut table = TypeTable::new();
        let e = table.new_enum(Some(StringId::new("color")), TypeRef::INT);
        table.add_enum_item(
            e,
            EnumItem {
                name: StringId::new("red"),
                value_expr: None,
                value: 0,
            },
        );
        table.finalize(e);

        assert!(compatible(&table, e, TypeRef::INT));
        assert!(compatible(&table, TypeRef::INT, e));
        // Not with a different integer type.
        assert!(!compatible(&table, e, TypeRef::LONG));
        // The enum is the more informative composite in both orders.
        assert_eq!(composite(&mut table, e, TypeRef::INT), Some(e));
        assert_eq!(composite(&mut table, TypeRef::INT, e), Some(e));
    }

    #[test]
    fn distinct_enums_compare_against_each_other() {
        // Two complete enums with different items must not be `same`,
        // even when each is internally consistent.
        let mut table = TypeTable::new();
        let a = table.new_enum(Some(StringId::new("e")), TypeRef::INT);
        table.add_enum_item(
            a,
            EnumItem {
                name: StringId::new("x"),
                value_expr: None,
                value: 0,
            },
        );
        table.finalize(a);
        let b = table.new_enum(Some(StringId::new("e")), TypeRef::INT);
        table.add_enum_item(
            b,
            EnumItem {
                name: StringId::new("y"),
                value_expr: None,
                value: 1,
            },
        );
        table.finalize(b);

        assert!(!same(&table, a, b));
    }

    #[test]
    fn arrays_compatible_regardless_of_length() {
        let mut table = TypeTable::new();
        let a3 = table.array_of(TypeRef::INT, ArrayBound::Constant, None, Some(3));
        let a5 = table.array_of(TypeRef::INT, ArrayBound::Constant, None, Some(5));
        let unbounded = table.array_of(TypeRef::INT, ArrayBound::Unbounded, None, None);

        assert!(!same(&table, a3, a5));
        assert!(compatible(&table, a3, a5));
        assert!(compatible(&table, a3, unbounded));
        // Merging the incomplete array with the bounded one completes it.
        assert_eq!(composite(&mut table, unbounded, a3), Some(a3));
        assert_eq!(composite(&mut table, a3, unbounded), Some(a3));
    }

    #[test]
    fn function_forward_declaration_merges_with_definition() {
        let mut table = TypeTable::new();
        // int f(); -- no prototype
        let fwd = table.new_function(TypeRef::INT);
        // int f(int x);
        let def = table.new_function(TypeRef::INT);
        table.add_param(
            def,
            ParamType {
                name: Some(StringId::new("x")),
                ty: TypeRef::INT,
            },
        );
        table.finalize(def);

        assert!(compatible(&table, fwd, def));
        let merged = composite(&mut table, fwd, def).unwrap();
        match table.get(merged) {
            TypeKind::Function(f) => {
                assert!(f.complete);
                assert_eq!(f.params.len(), 1);
            }
            other => panic!("expected function, got {other:?}"),
        }
    }

    #[test]
    fn struct_forward_declaration_merges_with_definition() {
        let mut table = TypeTable::new();
        let fwd = table.new_struct(Some(StringId::new("vec2")), false);
        let def = table.new_struct(Some(StringId::new("vec2")), false);
        table.add_field(
            def,
            StructField {
                name: StringId::new("x"),
                ty: TypeRef::FLOAT,
                align_override: None,
                bit_width: None,
            },
        );
        table.finalize(def);

        assert!(!same(&table, fwd, def));
        assert!(compatible(&table, fwd, def));
        assert_eq!(composite(&mut table, fwd, def), Some(def));
    }

    #[test]
    fn enum_auto_numbering_skips_used_values() {
        let items = vec![
            EnumItem {
                name: StringId::new("a"),
                value_expr: None,
                value: 1,
            },
            EnumItem {
                name: StringId::new("b"),
                value_expr: None,
                value: 2,
            },
            EnumItem {
                name: StringId::new("c"),
                value_expr: None,
                value: 3,
            },
        ];
        assert_eq!(next_enum_value(&items), 4);

        let out_of_order = vec![
            EnumItem {
                name: StringId::new("a"),
                value_expr: None,
                value: 0,
            },
            EnumItem {
                name: StringId::new("b"),
                value_expr: None,
                value: 5,
            },
            EnumItem {
                name: StringId::new("c"),
                value_expr: None,
                value: 1,
            },
        ];
        // 2 is free; 5 is taken by an earlier explicit value and the
        // scan starts from previous + 1 = 2.
        assert_eq!(next_enum_value(&out_of_order), 2);

        let collision = vec![
            EnumItem {
                name: StringId::new("a"),
                value_expr: None,
                value: 2,
            },
            EnumItem {
                name: StringId::new("b"),
                value_expr: None,
                value: 1,
            },
        ];
        // previous + 1 = 2 is already used, so the next free value wins.
        assert_eq!(next_enum_value(&collision), 3);
    }

    #[test]
    fn basic_sizes_lp64() {
        let table = TypeTable::new();
        assert_eq!(table.size_of(TypeRef::CHAR), Some(1));
        assert_eq!(table.size_of(TypeRef::SHORT), Some(2));
        assert_eq!(table.size_of(TypeRef::INT), Some(4));
        assert_eq!(table.size_of(TypeRef::LONG), Some(8));
        assert_eq!(table.size_of(TypeRef::LONG_LONG), Some(8));
        assert_eq!(table.size_of(TypeRef::FLOAT), Some(4));
        assert_eq!(table.size_of(TypeRef::DOUBLE), Some(8));
        assert_eq!(table.size_of(TypeRef::LONG_DOUBLE), Some(16));
        assert_eq!(table.size_of(TypeRef::VOID), None);
    }

    #[test]
    fn pointer_size() {
        let mut table = TypeTable::new();
        let p = table.pointer_to(TypeRef::CHAR);
        assert_eq!(table.size_of(p), Some(8));
        assert_eq!(table.align_of(p), Some(8));
    }

    #[test]
    fn bitfield_struct_layout_matches_host_packing() {
        // struct { int f1:16; int f2:16; int f3:16; int x; } is 12 bytes:
        // f1+f2 fill the first int unit, f3 opens a second, x starts a
        // third.
        let mut table = TypeTable::new();
        let s = table.new_struct(None, false);
        for name in ["f1", "f2", "f3"] {
            table.add_field(
                s,
                StructField {
                    name: StringId::new(name),
                    ty: TypeRef::INT,
                    align_override: None,
                    bit_width: Some(16),
                },
            );
        }
        table.add_field(
            s,
            StructField {
                name: StringId::new("x"),
                ty: TypeRef::INT,
                align_override: None,
                bit_width: None,
            },
        );
        table.finalize(s);

        assert_eq!(table.size_of(s), Some(12));
        assert_eq!(table.align_of(s), Some(4));
    }

    #[test]
    fn struct_tail_padding() {
        // struct { long a; char b; } pads to 16.
        let mut table = TypeTable::new();
        let s = table.new_struct(None, false);
        table.add_field(
            s,
            StructField {
                name: StringId::new("a"),
                ty: TypeRef::LONG,
                align_override: None,
                bit_width: None,
            },
        );
        table.add_field(
            s,
            StructField {
                name: StringId::new("b"),
                ty: TypeRef::CHAR,
                align_override: None,
                bit_width: None,
            },
        );
        table.finalize(s);
        assert_eq!(table.size_of(s), Some(16));
    }

    #[test]
    fn incomplete_types_have_no_size() {
        let mut table = TypeTable::new();
        let s = table.new_struct(Some(StringId::new("opaque")), false);
        assert_eq!(table.size_of(s), None);
        assert!(!table.is_complete(s));
        table.finalize(s);
        assert!(table.is_complete(s));
    }
}
