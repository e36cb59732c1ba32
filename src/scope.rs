//! Nested symbol tables.
//!
//! Scopes and objects are arena-stored and addressed by index; a scope
//! keeps a parent index instead of a pointer, so popped scopes stay valid
//! for back-references from Block nodes. Ordinary identifiers (variables,
//! typedefs, functions, enum constants) and tags (`struct`/`union`/`enum`
//! names) live in separate namespaces, as in C.

use std::fmt;

use crate::ast::NodeRef;
use crate::intern::StringId;
use crate::source_manager::SourceSpan;
use crate::types::TypeRef;

/// Index into the scope arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[repr(transparent)]
pub struct ScopeRef(u32);

impl ScopeRef {
    pub const GLOBAL: ScopeRef = ScopeRef(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ScopeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S#{}", self.0)
    }
}

/// Index into the object arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[repr(transparent)]
pub struct ObjectRef(u32);

impl ObjectRef {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "O#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ObjectKind {
    Variable,
    Typedef,
    Function { body: Option<NodeRef> },
    EnumConstant { value_expr: Option<NodeRef>, value: i64 },
}

#[derive(Debug, Clone)]
pub struct Object {
    pub name: StringId,
    pub ty: TypeRef,
    pub span: SourceSpan,
    pub kind: ObjectKind,
}

struct Scope {
    parent: Option<ScopeRef>,
    objects: hashbrown::HashMap<StringId, ObjectRef>,
    tags: hashbrown::HashMap<StringId, TypeRef>,
    /// Declaration order, for consumers that iterate a scope.
    order: Vec<ObjectRef>,
}

impl Scope {
    fn new(parent: Option<ScopeRef>) -> Self {
        Scope {
            parent,
            objects: hashbrown::HashMap::new(),
            tags: hashbrown::HashMap::new(),
            order: Vec::new(),
        }
    }
}

/// Scope and object storage for one translation unit. The global scope
/// exists from creation and is never popped.
pub struct ScopeTable {
    scopes: Vec<Scope>,
    objects: Vec<Object>,
    current: ScopeRef,
}

impl Default for ScopeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeTable {
    pub fn new() -> Self {
        ScopeTable {
            scopes: vec![Scope::new(None)],
            objects: Vec::new(),
            current: ScopeRef::GLOBAL,
        }
    }

    pub fn current(&self) -> ScopeRef {
        self.current
    }

    /// Enter a new scope nested in the current one.
    pub fn push(&mut self) -> ScopeRef {
        let r = ScopeRef(self.scopes.len() as u32);
        self.scopes.push(Scope::new(Some(self.current)));
        self.current = r;
        r
    }

    /// Leave the current scope. Its storage stays in the arena so Block
    /// nodes can keep referencing it.
    pub fn pop(&mut self) {
        if let Some(parent) = self.scopes[self.current.index()].parent {
            self.current = parent;
        }
    }

    pub fn object(&self, r: ObjectRef) -> &Object {
        &self.objects[r.index()]
    }

    pub fn object_mut(&mut self, r: ObjectRef) -> &mut Object {
        &mut self.objects[r.index()]
    }

    /// Declare an object in the current scope, shadowing any outer
    /// binding of the same name.
    pub fn declare(&mut self, object: Object) -> ObjectRef {
        let r = ObjectRef(self.objects.len() as u32);
        let name = object.name;
        self.objects.push(object);
        let scope = &mut self.scopes[self.current.index()];
        scope.objects.insert(name, r);
        scope.order.push(r);
        r
    }

    /// Replace the binding for `name` in the current scope, used when a
    /// redeclaration merges with an earlier compatible declaration.
    pub fn rebind(&mut self, name: StringId, r: ObjectRef) {
        let scope = &mut self.scopes[self.current.index()];
        scope.objects.insert(name, r);
    }

    /// Look `name` up in the current scope only.
    pub fn lookup_local(&self, name: StringId) -> Option<ObjectRef> {
        self.scopes[self.current.index()].objects.get(&name).copied()
    }

    /// Look `name` up, walking outward to the global scope.
    pub fn lookup(&self, name: StringId) -> Option<ObjectRef> {
        let mut scope = Some(self.current);
        while let Some(r) = scope {
            let s = &self.scopes[r.index()];
            if let Some(&obj) = s.objects.get(&name) {
                return Some(obj);
            }
            scope = s.parent;
        }
        None
    }

    /// Whether `name` currently resolves to a typedef; drives the
    /// parser's type-name disambiguation.
    pub fn is_typedef_name(&self, name: StringId) -> bool {
        self.lookup(name)
            .map(|r| matches!(self.object(r).kind, ObjectKind::Typedef))
            .unwrap_or(false)
    }

    pub fn declare_tag(&mut self, name: StringId, ty: TypeRef) {
        self.scopes[self.current.index()].tags.insert(name, ty);
    }

    pub fn lookup_tag_local(&self, name: StringId) -> Option<TypeRef> {
        self.scopes[self.current.index()].tags.get(&name).copied()
    }

    pub fn lookup_tag(&self, name: StringId) -> Option<TypeRef> {
        let mut scope = Some(self.current);
        while let Some(r) = scope {
            let s = &self.scopes[r.index()];
            if let Some(&ty) = s.tags.get(&name) {
                return Some(ty);
            }
            scope = s.parent;
        }
        None
    }

    /// Objects declared in `scope`, in declaration order.
    pub fn objects_in(&self, scope: ScopeRef) -> impl Iterator<Item = ObjectRef> + '_ {
        self.scopes[scope.index()].order.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeRef;

    fn var(name: &str, ty: TypeRef) -> Object {
        Object {
            name: StringId::new(name),
            ty,
            span: SourceSpan::empty(),
            kind: ObjectKind::Variable,
        }
    }

    #[test]
    fn lookup_walks_outward() {
        let mut table = ScopeTable::new();
        let outer = table.declare(var("x", TypeRef::INT));
        table.push();
        assert_eq!(table.lookup(StringId::new("x")), Some(outer));
        assert_eq!(table.lookup_local(StringId::new("x")), None);
    }

    #[test]
    fn inner_binding_shadows_outer() {
        let mut table = ScopeTable::new();
        let outer = table.declare(var("x", TypeRef::INT));
        table.push();
        let inner = table.declare(var("x", TypeRef::CHAR));
        assert_eq!(table.lookup(StringId::new("x")), Some(inner));
        table.pop();
        assert_eq!(table.lookup(StringId::new("x")), Some(outer));
    }

    #[test]
    fn typedef_name_detection() {
        let mut table = ScopeTable::new();
        table.declare(Object {
            name: StringId::new("size_tt"),
            ty: TypeRef::ULONG,
            span: SourceSpan::empty(),
            kind: ObjectKind::Typedef,
        });
        assert!(table.is_typedef_name(StringId::new("size_tt")));
        assert!(!table.is_typedef_name(StringId::new("x")));
    }

    #[test]
    fn tags_are_a_separate_namespace() {
        let mut table = ScopeTable::new();
        table.declare(var("s", TypeRef::INT));
        table.declare_tag(StringId::new("s"), TypeRef::CHAR);
        assert!(table.lookup(StringId::new("s")).is_some());
        assert_eq!(table.lookup_tag(StringId::new("s")), Some(TypeRef::CHAR));
    }

    #[test]
    fn popped_scope_objects_stay_readable() {
        let mut table = ScopeTable::new();
        table.push();
        let inner_scope = table.current();
        let obj = table.declare(var("local", TypeRef::INT));
        table.pop();
        let collected: Vec<_> = table.objects_in(inner_scope).collect();
        assert_eq!(collected, vec![obj]);
        assert_eq!(table.object(obj).name, StringId::new("local"));
    }
}
