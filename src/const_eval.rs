//! Constant-expression evaluation.
//!
//! Pure walk over a finished AST. `is_constexpr` and `eval` make the same
//! structural traversal; callers check the former before invoking the
//! latter. Evaluating a non-constant tree is a caller logic error, so
//! `eval` returns `None` rather than panicking when it meets one anyway.

use crate::ast::{Ast, BinaryOp, ConstantValue, NodeKind, NodeRef, UnaryOp};
use crate::scope::{ObjectKind, ScopeTable};
use crate::types::TypeTable;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
}

impl Value {
    pub fn as_int(self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(v),
            Value::Float(_) => None,
        }
    }

    fn as_float(self) -> f64 {
        match self {
            Value::Int(v) => v as f64,
            Value::Float(v) => v,
        }
    }

    fn is_truthy(self) -> bool {
        match self {
            Value::Int(v) => v != 0,
            Value::Float(v) => v != 0.0,
        }
    }
}

pub struct ConstEval<'a> {
    ast: &'a Ast,
    scopes: &'a ScopeTable,
    types: &'a TypeTable,
}

impl<'a> ConstEval<'a> {
    pub fn new(ast: &'a Ast, scopes: &'a ScopeTable, types: &'a TypeTable) -> Self {
        ConstEval { ast, scopes, types }
    }

    /// Whether the subtree can be folded at parse time: no stores, no
    /// calls, no memory access; object references only to enum constants.
    pub fn is_constexpr(&self, node: NodeRef) -> bool {
        match &self.ast.get(node).kind {
            NodeKind::Constant(ConstantValue::Int(_) | ConstantValue::Float(_)) => true,
            NodeKind::Constant(ConstantValue::Str(_)) => false,
            NodeKind::ObjectRef(obj) => {
                matches!(self.scopes.object(*obj).kind, ObjectKind::EnumConstant { .. })
            }
            NodeKind::Unary(op, operand) => {
                !matches!(op, UnaryOp::Deref | UnaryOp::AddrOf) && self.is_constexpr(*operand)
            }
            NodeKind::Binary(op, lhs, rhs) => {
                !op.has_side_effect() && self.is_constexpr(*lhs) && self.is_constexpr(*rhs)
            }
            NodeKind::Conditional(c, t, e) => {
                self.is_constexpr(*c) && self.is_constexpr(*t) && self.is_constexpr(*e)
            }
            NodeKind::SizeOf(ty) => self.types.size_of(*ty).is_some(),
            _ => false,
        }
    }

    /// Fold the subtree to a value. Expects `is_constexpr` to have been
    /// checked.
    pub fn eval(&self, node: NodeRef) -> Option<Value> {
        match &self.ast.get(node).kind {
            NodeKind::Constant(ConstantValue::Int(v)) => Some(Value::Int(*v)),
            NodeKind::Constant(ConstantValue::Float(v)) => Some(Value::Float(*v)),
            NodeKind::Constant(ConstantValue::Str(_)) => None,
            NodeKind::ObjectRef(obj) => match self.scopes.object(*obj).kind {
                ObjectKind::EnumConstant { value, .. } => Some(Value::Int(value)),
                _ => None,
            },
            NodeKind::Unary(op, operand) => self.eval_unary(*op, *operand),
            NodeKind::Binary(op, lhs, rhs) => self.eval_binary(*op, *lhs, *rhs),
            NodeKind::Conditional(c, t, e) => {
                if self.eval(*c)?.is_truthy() {
                    self.eval(*t)
                } else {
                    self.eval(*e)
                }
            }
            NodeKind::SizeOf(ty) => self.types.size_of(*ty).map(|s| Value::Int(s as i64)),
            _ => None,
        }
    }

    fn eval_unary(&self, op: UnaryOp, operand: NodeRef) -> Option<Value> {
        let value = self.eval(operand)?;
        match (op, value) {
            (UnaryOp::Plus, v) => Some(v),
            (UnaryOp::Minus, Value::Int(v)) => Some(Value::Int(v.wrapping_neg())),
            (UnaryOp::Minus, Value::Float(v)) => Some(Value::Float(-v)),
            (UnaryOp::BitNot, Value::Int(v)) => Some(Value::Int(!v)),
            (UnaryOp::LogicNot, v) => Some(Value::Int(!v.is_truthy() as i64)),
            _ => None,
        }
    }

    fn eval_binary(&self, op: BinaryOp, lhs: NodeRef, rhs: NodeRef) -> Option<Value> {
        // Short-circuit forms decide from the left operand alone.
        match op {
            BinaryOp::LogicAnd => {
                let l = self.eval(lhs)?;
                if !l.is_truthy() {
                    return Some(Value::Int(0));
                }
                return Some(Value::Int(self.eval(rhs)?.is_truthy() as i64));
            }
            BinaryOp::LogicOr => {
                let l = self.eval(lhs)?;
                if l.is_truthy() {
                    return Some(Value::Int(1));
                }
                return Some(Value::Int(self.eval(rhs)?.is_truthy() as i64));
            }
            // Assignment and comma yield their right-hand operand.
            BinaryOp::Assign | BinaryOp::Comma => return self.eval(rhs),
            _ => {}
        }

        let l = self.eval(lhs)?;
        let r = self.eval(rhs)?;

        if let (Value::Int(a), Value::Int(b)) = (l, r) {
            return self.eval_int_binary(op, a, b);
        }

        // Mixed or floating operands promote to double.
        let (a, b) = (l.as_float(), r.as_float());
        match op {
            BinaryOp::Add => Some(Value::Float(a + b)),
            BinaryOp::Sub => Some(Value::Float(a - b)),
            BinaryOp::Mul => Some(Value::Float(a * b)),
            BinaryOp::Div => Some(Value::Float(a / b)),
            BinaryOp::Equal => Some(Value::Int((a == b) as i64)),
            BinaryOp::NotEqual => Some(Value::Int((a != b) as i64)),
            BinaryOp::Less => Some(Value::Int((a < b) as i64)),
            BinaryOp::LessEqual => Some(Value::Int((a <= b) as i64)),
            BinaryOp::Greater => Some(Value::Int((a > b) as i64)),
            BinaryOp::GreaterEqual => Some(Value::Int((a >= b) as i64)),
            // Bit and modulo operators require integer operands.
            _ => None,
        }
    }

    fn eval_int_binary(&self, op: BinaryOp, a: i64, b: i64) -> Option<Value> {
        let v = match op {
            BinaryOp::Add => a.wrapping_add(b),
            BinaryOp::Sub => a.wrapping_sub(b),
            BinaryOp::Mul => a.wrapping_mul(b),
            BinaryOp::Div => a.checked_div(b)?,
            BinaryOp::Mod => a.checked_rem(b)?,
            BinaryOp::BitAnd => a & b,
            BinaryOp::BitOr => a | b,
            BinaryOp::BitXor => a ^ b,
            BinaryOp::LShift => a.checked_shl(u32::try_from(b).ok()?)?,
            BinaryOp::RShift => a.checked_shr(u32::try_from(b).ok()?)?,
            BinaryOp::Equal => (a == b) as i64,
            BinaryOp::NotEqual => (a != b) as i64,
            BinaryOp::Less => (a < b) as i64,
            BinaryOp::LessEqual => (a <= b) as i64,
            BinaryOp::Greater => (a > b) as i64,
            BinaryOp::GreaterEqual => (a >= b) as i64,
            _ => return None,
        };
        Some(Value::Int(v))
    }
}
