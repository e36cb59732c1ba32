//! Expression and statement AST.
//!
//! Nodes live in a flat `Ast` arena and reference each other through
//! `NodeRef` indices, so the whole tree is released as one unit with its
//! translation context. Every node records the source span it came from
//! and, once resolution has run over it, its type.

use std::fmt;

use thin_vec::ThinVec;

use crate::intern::StringId;
use crate::scope::{ObjectRef, ScopeRef};
use crate::source_manager::SourceSpan;
use crate::types::TypeRef;

/// Index into an `Ast`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[repr(transparent)]
pub struct NodeRef(u32);

impl NodeRef {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstantValue {
    Int(i64),
    Float(f64),
    Str(StringId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    Deref,
    AddrOf,
    BitNot,
    LogicNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    LShift,
    RShift,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    LogicAnd,
    LogicOr,
    Assign,
    Comma,
}

impl BinaryOp {
    /// Operators with a store side effect; a tree containing one is not
    /// a constant expression.
    pub fn has_side_effect(self) -> bool {
        self == BinaryOp::Assign
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Constant(ConstantValue),
    ObjectRef(ObjectRef),
    Unary(UnaryOp, NodeRef),
    Binary(BinaryOp, NodeRef, NodeRef),
    Conditional(NodeRef, NodeRef, NodeRef),
    Member {
        object: NodeRef,
        field: StringId,
        is_arrow: bool,
    },
    FunCall {
        callee: NodeRef,
        args: ThinVec<NodeRef>,
    },
    /// `sizeof(type-name)`; `sizeof expr` is resolved to this at parse
    /// time once the operand's type is known.
    SizeOf(TypeRef),

    // Statements.
    Block {
        children: ThinVec<NodeRef>,
        scope: ScopeRef,
    },
    Declaration(ThinVec<ObjectRef>),
    ExpressionStatement(Option<NodeRef>),
    If {
        condition: NodeRef,
        then_branch: NodeRef,
        else_branch: Option<NodeRef>,
    },
    While {
        condition: NodeRef,
        body: NodeRef,
    },
    Return(Option<NodeRef>),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub span: SourceSpan,
    /// Resolved type, where resolution applies (expressions).
    pub ty: Option<TypeRef>,
}

/// Flat AST storage for one translation unit.
#[derive(Default)]
pub struct Ast {
    nodes: Vec<Node>,
}

impl Ast {
    pub fn new() -> Self {
        Ast { nodes: Vec::new() }
    }

    pub fn push(&mut self, kind: NodeKind, span: SourceSpan, ty: Option<TypeRef>) -> NodeRef {
        let index = self.nodes.len() as u32;
        self.nodes.push(Node { kind, span, ty });
        NodeRef(index)
    }

    pub fn get(&self, r: NodeRef) -> &Node {
        &self.nodes[r.index()]
    }

    pub fn get_mut(&mut self, r: NodeRef) -> &mut Node {
        &mut self.nodes[r.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
