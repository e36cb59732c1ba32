//! Expression parsing.
//!
//! Standard precedence ladder. Several C constructs have no AST node of
//! their own and are desugared while parsing:
//! - pointer +/- integer becomes `ptr + (n * sizeof(pointee))`, pointer
//!   difference becomes `(a - b) / sizeof(pointee)`;
//! - `a[i]` becomes `*(a + i)`;
//! - `++`/`--` become an add/sub-by-one assignment, with a compensating
//!   add/sub for the postfix forms;
//! - compound assignment takes the address of the left side once and
//!   dereferences it twice, so the left side is evaluated a single time;
//! - a cast re-types its operand node rather than wrapping it.

use crate::ast::{BinaryOp, ConstantValue, NodeKind, NodeRef, UnaryOp};
use crate::lexer::literal::{FloatSuffix, IntegerSuffix};
use crate::lexer::TokenKind;
use crate::source_manager::SourceSpan;
use crate::types::{TypeKind, TypeRef};

use super::Parser;

impl Parser<'_> {
    pub(crate) fn expr_ty(&self, node: NodeRef) -> Option<TypeRef> {
        self.ast.get(node).ty
    }

    fn push_expr(&mut self, kind: NodeKind, span: SourceSpan, ty: Option<TypeRef>) -> NodeRef {
        self.ast.push(kind, span, ty)
    }

    /// Pointee for pointer arithmetic; arrays decay to their element.
    fn decayed_pointee(&self, ty: TypeRef) -> Option<TypeRef> {
        match self.types.get(self.types.unqualified(ty)) {
            TypeKind::Pointer(p) => Some(*p),
            TypeKind::Array(a) => Some(a.element),
            _ => None,
        }
    }

    // --- Usual arithmetic conversions ---

    fn usual_arithmetic_type(&self, a: TypeRef, b: TypeRef) -> TypeRef {
        let a = self.arith_operand(a);
        let b = self.arith_operand(b);
        for float in [TypeRef::LONG_DOUBLE, TypeRef::DOUBLE, TypeRef::FLOAT] {
            if a == float || b == float {
                return float;
            }
        }
        let (a, b) = (self.promoted_integer(a), self.promoted_integer(b));
        let (ka, kb) = (self.types.get(a), self.types.get(b));
        let (ra, rb) = (ka.integer_rank(), kb.integer_rank());
        if ra != rb {
            return if ra > rb { a } else { b };
        }
        // Equal rank: unsigned wins.
        if !ka.is_signed() {
            a
        } else {
            b
        }
    }

    /// Strip qualification and replace an enum by its underlying type.
    fn arith_operand(&self, ty: TypeRef) -> TypeRef {
        let unqual = self.types.unqualified(ty);
        match self.types.get(unqual) {
            TypeKind::Enum(e) => e.underlying,
            _ => unqual,
        }
    }

    fn promoted_integer(&self, ty: TypeRef) -> TypeRef {
        if self.types.get(ty).integer_rank() < TypeKind::Int.integer_rank() {
            TypeRef::INT
        } else {
            ty
        }
    }

    // --- Precedence ladder ---

    pub(crate) fn parse_expression(&mut self) -> Option<NodeRef> {
        let mut lhs = self.parse_assignment()?;
        while self.peek_kind() == TokenKind::Comma {
            let span = self.span();
            self.bump();
            let rhs = self.parse_assignment()?;
            let ty = self.expr_ty(rhs);
            lhs = self.push_expr(NodeKind::Binary(BinaryOp::Comma, lhs, rhs), span, ty);
        }
        Some(lhs)
    }

    pub(crate) fn parse_assignment(&mut self) -> Option<NodeRef> {
        let lhs = self.parse_conditional()?;
        let span = self.span();

        let compound_op = match self.peek_kind() {
            TokenKind::Assign => {
                self.bump();
                let rhs = self.parse_assignment()?;
                let ty = self.expr_ty(lhs);
                return Some(self.push_expr(NodeKind::Binary(BinaryOp::Assign, lhs, rhs), span, ty));
            }
            TokenKind::PlusAssign => BinaryOp::Add,
            TokenKind::MinusAssign => BinaryOp::Sub,
            TokenKind::StarAssign => BinaryOp::Mul,
            TokenKind::DivAssign => BinaryOp::Div,
            TokenKind::ModAssign => BinaryOp::Mod,
            TokenKind::AndAssign => BinaryOp::BitAnd,
            TokenKind::OrAssign => BinaryOp::BitOr,
            TokenKind::XorAssign => BinaryOp::BitXor,
            TokenKind::LeftShiftAssign => BinaryOp::LShift,
            TokenKind::RightShiftAssign => BinaryOp::RShift,
            _ => return Some(lhs),
        };
        self.bump();
        let rhs = self.parse_assignment()?;
        self.desugar_compound_assignment(compound_op, lhs, rhs, span)
    }

    /// `a op= b` → `*(&a) = *(&a) op b`, sharing one address-of node so
    /// the left side is evaluated once and dereferenced twice.
    fn desugar_compound_assignment(
        &mut self,
        op: BinaryOp,
        lhs: NodeRef,
        rhs: NodeRef,
        span: SourceSpan,
    ) -> Option<NodeRef> {
        let lhs_ty = self.expr_ty(lhs);
        let addr_ty = lhs_ty.map(|t| self.types.pointer_to(t));
        let addr = self.push_expr(NodeKind::Unary(UnaryOp::AddrOf, lhs), span, addr_ty);
        let read = self.push_expr(NodeKind::Unary(UnaryOp::Deref, addr), span, lhs_ty);
        let write = self.push_expr(NodeKind::Unary(UnaryOp::Deref, addr), span, lhs_ty);
        let value = match op {
            BinaryOp::Add | BinaryOp::Sub => self.make_additive(op, read, rhs, span)?,
            _ => {
                let ty = self.binary_result_type(op, read, rhs);
                self.push_expr(NodeKind::Binary(op, read, rhs), span, ty)
            }
        };
        Some(self.push_expr(NodeKind::Binary(BinaryOp::Assign, write, value), span, lhs_ty))
    }

    pub(crate) fn parse_conditional(&mut self) -> Option<NodeRef> {
        let condition = self.parse_logical_or()?;
        if !self.eat(TokenKind::Question) {
            return Some(condition);
        }
        let span = self.span();
        let then_branch = self.parse_expression()?;
        self.expect(TokenKind::Colon)?;
        let else_branch = self.parse_conditional()?;
        let ty = self.expr_ty(then_branch);
        Some(self.push_expr(
            NodeKind::Conditional(condition, then_branch, else_branch),
            span,
            ty,
        ))
    }

    fn parse_binary_level(
        &mut self,
        ops: &[(TokenKind, BinaryOp)],
        next: fn(&mut Self) -> Option<NodeRef>,
    ) -> Option<NodeRef> {
        let mut lhs = next(self)?;
        'outer: loop {
            let kind = self.peek_kind();
            for &(token, op) in ops {
                if kind == token {
                    let span = self.span();
                    self.bump();
                    let rhs = next(self)?;
                    let ty = self.binary_result_type(op, lhs, rhs);
                    lhs = self.push_expr(NodeKind::Binary(op, lhs, rhs), span, ty);
                    continue 'outer;
                }
            }
            return Some(lhs);
        }
    }

    fn binary_result_type(&self, op: BinaryOp, lhs: NodeRef, rhs: NodeRef) -> Option<TypeRef> {
        use BinaryOp::*;
        match op {
            Equal | NotEqual | Less | LessEqual | Greater | GreaterEqual | LogicAnd | LogicOr => {
                Some(TypeRef::INT)
            }
            LShift | RShift => self.expr_ty(lhs).map(|t| self.promoted_integer(self.arith_operand(t))),
            _ => match (self.expr_ty(lhs), self.expr_ty(rhs)) {
                (Some(a), Some(b)) => Some(self.usual_arithmetic_type(a, b)),
                _ => None,
            },
        }
    }

    fn parse_logical_or(&mut self) -> Option<NodeRef> {
        self.parse_binary_level(&[(TokenKind::LogicOr, BinaryOp::LogicOr)], Self::parse_logical_and)
    }

    fn parse_logical_and(&mut self) -> Option<NodeRef> {
        self.parse_binary_level(&[(TokenKind::LogicAnd, BinaryOp::LogicAnd)], Self::parse_bit_or)
    }

    fn parse_bit_or(&mut self) -> Option<NodeRef> {
        self.parse_binary_level(&[(TokenKind::Or, BinaryOp::BitOr)], Self::parse_bit_xor)
    }

    fn parse_bit_xor(&mut self) -> Option<NodeRef> {
        self.parse_binary_level(&[(TokenKind::Xor, BinaryOp::BitXor)], Self::parse_bit_and)
    }

    fn parse_bit_and(&mut self) -> Option<NodeRef> {
        self.parse_binary_level(&[(TokenKind::And, BinaryOp::BitAnd)], Self::parse_equality)
    }

    fn parse_equality(&mut self) -> Option<NodeRef> {
        self.parse_binary_level(
            &[
                (TokenKind::Equal, BinaryOp::Equal),
                (TokenKind::NotEqual, BinaryOp::NotEqual),
            ],
            Self::parse_relational,
        )
    }

    fn parse_relational(&mut self) -> Option<NodeRef> {
        self.parse_binary_level(
            &[
                (TokenKind::Less, BinaryOp::Less),
                (TokenKind::LessEqual, BinaryOp::LessEqual),
                (TokenKind::Greater, BinaryOp::Greater),
                (TokenKind::GreaterEqual, BinaryOp::GreaterEqual),
            ],
            Self::parse_shift,
        )
    }

    fn parse_shift(&mut self) -> Option<NodeRef> {
        self.parse_binary_level(
            &[
                (TokenKind::LeftShift, BinaryOp::LShift),
                (TokenKind::RightShift, BinaryOp::RShift),
            ],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> Option<NodeRef> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Some(lhs),
            };
            let span = self.span();
            self.bump();
            let rhs = self.parse_multiplicative()?;
            lhs = self.make_additive(op, lhs, rhs, span)?;
        }
    }

    /// Build `lhs +/- rhs` with pointer-arithmetic desugaring.
    pub(crate) fn make_additive(
        &mut self,
        op: BinaryOp,
        lhs: NodeRef,
        rhs: NodeRef,
        span: SourceSpan,
    ) -> Option<NodeRef> {
        let lhs_pointee = self.expr_ty(lhs).and_then(|t| self.decayed_pointee(t));
        let rhs_pointee = self.expr_ty(rhs).and_then(|t| self.decayed_pointee(t));

        match (lhs_pointee, rhs_pointee) {
            (None, None) => {
                let ty = self.binary_result_type(op, lhs, rhs);
                Some(self.push_expr(NodeKind::Binary(op, lhs, rhs), span, ty))
            }
            (Some(pointee), None) => self.make_pointer_offset(op, lhs, rhs, pointee, span),
            (None, Some(pointee)) => {
                if op == BinaryOp::Sub {
                    self.error("cannot subtract a pointer from an integer".to_string(), span);
                    return None;
                }
                self.make_pointer_offset(op, rhs, lhs, pointee, span)
            }
            (Some(pa), Some(pb)) => {
                if op != BinaryOp::Sub {
                    self.error("cannot add two pointers".to_string(), span);
                    return None;
                }
                let (size_a, size_b) = (self.types.size_of(pa), self.types.size_of(pb));
                let Some(size) = size_a else {
                    self.error(
                        "pointer difference on a pointer to an incomplete type".to_string(),
                        span,
                    );
                    return None;
                };
                if size_b != Some(size) {
                    self.error(
                        "pointer difference between incompatible element sizes".to_string(),
                        span,
                    );
                    return None;
                }
                let diff = self.push_expr(
                    NodeKind::Binary(BinaryOp::Sub, lhs, rhs),
                    span,
                    Some(TypeRef::LONG),
                );
                let unit = self.push_expr(NodeKind::SizeOf(pa), span, Some(TypeRef::ULONG));
                Some(self.push_expr(
                    NodeKind::Binary(BinaryOp::Div, diff, unit),
                    span,
                    Some(TypeRef::LONG),
                ))
            }
        }
    }

    /// `ptr +/- n` → `ptr +/- (n * sizeof(pointee))`.
    fn make_pointer_offset(
        &mut self,
        op: BinaryOp,
        pointer: NodeRef,
        amount: NodeRef,
        pointee: TypeRef,
        span: SourceSpan,
    ) -> Option<NodeRef> {
        if self.types.size_of(pointee).is_none() {
            self.error("arithmetic on a pointer to an incomplete type".to_string(), span);
            return None;
        }
        let unit = self.push_expr(NodeKind::SizeOf(pointee), span, Some(TypeRef::ULONG));
        let scaled_ty = self.expr_ty(amount);
        let scaled = self.push_expr(NodeKind::Binary(BinaryOp::Mul, amount, unit), span, scaled_ty);
        let ty = self.expr_ty(pointer);
        Some(self.push_expr(NodeKind::Binary(op, pointer, scaled), span, ty))
    }

    fn parse_multiplicative(&mut self) -> Option<NodeRef> {
        self.parse_binary_level(
            &[
                (TokenKind::Star, BinaryOp::Mul),
                (TokenKind::Slash, BinaryOp::Div),
                (TokenKind::Percent, BinaryOp::Mod),
            ],
            Self::parse_cast,
        )
    }

    fn parse_cast(&mut self) -> Option<NodeRef> {
        if self.peek_kind() == TokenKind::LeftParen && self.type_name_follows_paren() {
            self.bump();
            let ty = self.parse_type_name()?;
            self.expect(TokenKind::RightParen)?;
            let operand = self.parse_cast()?;
            // A cast re-types the operand in place.
            self.ast.get_mut(operand).ty = Some(ty);
            return Some(operand);
        }
        self.parse_unary()
    }

    fn type_name_follows_paren(&self) -> bool {
        match self.peek_ahead(1) {
            TokenKind::Identifier(name) => self.scopes.is_typedef_name(name),
            kind => kind.is_type_specifier() || kind.is_type_qualifier(),
        }
    }

    fn parse_unary(&mut self) -> Option<NodeRef> {
        let span = self.span();
        match self.peek_kind() {
            TokenKind::Increment => {
                self.bump();
                let operand = self.parse_unary()?;
                self.make_increment(operand, BinaryOp::Add, false, span)
            }
            TokenKind::Decrement => {
                self.bump();
                let operand = self.parse_unary()?;
                self.make_increment(operand, BinaryOp::Sub, false, span)
            }
            TokenKind::Plus => {
                self.bump();
                let operand = self.parse_cast()?;
                let ty = self.expr_ty(operand);
                Some(self.push_expr(NodeKind::Unary(UnaryOp::Plus, operand), span, ty))
            }
            TokenKind::Minus => {
                self.bump();
                let operand = self.parse_cast()?;
                let ty = self.expr_ty(operand);
                Some(self.push_expr(NodeKind::Unary(UnaryOp::Minus, operand), span, ty))
            }
            TokenKind::Tilde => {
                self.bump();
                let operand = self.parse_cast()?;
                let ty = self.expr_ty(operand);
                Some(self.push_expr(NodeKind::Unary(UnaryOp::BitNot, operand), span, ty))
            }
            TokenKind::Not => {
                self.bump();
                let operand = self.parse_cast()?;
                Some(self.push_expr(
                    NodeKind::Unary(UnaryOp::LogicNot, operand),
                    span,
                    Some(TypeRef::INT),
                ))
            }
            TokenKind::Star => {
                self.bump();
                let operand = self.parse_cast()?;
                let pointee = self.expr_ty(operand).and_then(|t| self.decayed_pointee(t));
                if pointee.is_none() {
                    self.error("cannot dereference a non-pointer".to_string(), span);
                }
                Some(self.push_expr(NodeKind::Unary(UnaryOp::Deref, operand), span, pointee))
            }
            TokenKind::And => {
                self.bump();
                let operand = self.parse_cast()?;
                let ty = self.expr_ty(operand).map(|t| self.types.pointer_to(t));
                Some(self.push_expr(NodeKind::Unary(UnaryOp::AddrOf, operand), span, ty))
            }
            TokenKind::Sizeof => {
                self.bump();
                self.parse_sizeof(span)
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_sizeof(&mut self, span: SourceSpan) -> Option<NodeRef> {
        let ty = if self.peek_kind() == TokenKind::LeftParen && self.type_name_follows_paren() {
            self.bump();
            let ty = self.parse_type_name()?;
            self.expect(TokenKind::RightParen)?;
            ty
        } else {
            let operand = self.parse_unary()?;
            match self.expr_ty(operand) {
                Some(ty) => ty,
                None => {
                    self.error("cannot take the size of this expression".to_string(), span);
                    return None;
                }
            }
        };
        if self.types.size_of(ty).is_none() {
            self.error("cannot take the size of an incomplete type".to_string(), span);
            return None;
        }
        Some(self.push_expr(NodeKind::SizeOf(ty), span, Some(TypeRef::ULONG)))
    }

    /// Pre/post increment and decrement, desugared to an add/sub-by-one
    /// assignment; the postfix forms get a compensating add/sub so the
    /// expression value is the one before the write.
    fn make_increment(
        &mut self,
        operand: NodeRef,
        op: BinaryOp,
        postfix: bool,
        span: SourceSpan,
    ) -> Option<NodeRef> {
        let one = self.push_expr(
            NodeKind::Constant(ConstantValue::Int(1)),
            span,
            Some(TypeRef::INT),
        );
        let ty = self.expr_ty(operand);
        let bumped = self.make_additive(op, operand, one, span)?;
        let assign = self.push_expr(NodeKind::Binary(BinaryOp::Assign, operand, bumped), span, ty);
        if !postfix {
            return Some(assign);
        }
        let compensate = match op {
            BinaryOp::Add => BinaryOp::Sub,
            _ => BinaryOp::Add,
        };
        self.make_additive(compensate, assign, one, span)
    }

    fn parse_postfix(&mut self) -> Option<NodeRef> {
        let mut expr = self.parse_primary()?;
        loop {
            let span = self.span();
            match self.peek_kind() {
                TokenKind::LeftParen => {
                    self.bump();
                    expr = self.parse_call(expr, span)?;
                }
                TokenKind::LeftBracket => {
                    self.bump();
                    let index = self.parse_expression()?;
                    self.expect(TokenKind::RightBracket)?;
                    // a[i] is *(a + i).
                    let sum = self.make_additive(BinaryOp::Add, expr, index, span)?;
                    let pointee = self.expr_ty(sum).and_then(|t| self.decayed_pointee(t));
                    expr = self.push_expr(NodeKind::Unary(UnaryOp::Deref, sum), span, pointee);
                }
                TokenKind::Dot => {
                    self.bump();
                    expr = self.parse_member(expr, false, span)?;
                }
                TokenKind::Arrow => {
                    self.bump();
                    expr = self.parse_member(expr, true, span)?;
                }
                TokenKind::Increment => {
                    self.bump();
                    expr = self.make_increment(expr, BinaryOp::Add, true, span)?;
                }
                TokenKind::Decrement => {
                    self.bump();
                    expr = self.make_increment(expr, BinaryOp::Sub, true, span)?;
                }
                _ => return Some(expr),
            }
        }
    }

    fn parse_call(&mut self, callee: NodeRef, span: SourceSpan) -> Option<NodeRef> {
        let mut args = thin_vec::ThinVec::new();
        if !self.eat(TokenKind::RightParen) {
            loop {
                args.push(self.parse_assignment()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RightParen)?;
        }

        // Callee may be a function or a pointer to one.
        let callee_ty = self.expr_ty(callee).map(|t| {
            let unqual = self.types.unqualified(t);
            match self.types.get(unqual) {
                TypeKind::Pointer(p) => self.types.unqualified(*p),
                _ => unqual,
            }
        });
        let mut return_ty = None;
        let mut problem = None;
        match callee_ty.map(|t| self.types.get(t)) {
            Some(TypeKind::Function(f)) => {
                return_ty = Some(f.return_type);
                if f.complete {
                    let expected = f.params.len();
                    if args.len() < expected {
                        problem = Some("too few arguments in call");
                    } else if args.len() > expected && !f.is_variadic {
                        problem = Some("too many arguments in call");
                    }
                }
            }
            _ => problem = Some("called object is not a function"),
        }
        if let Some(message) = problem {
            self.error(message.to_string(), span);
        }

        Some(self.push_expr(NodeKind::FunCall { callee, args }, span, return_ty))
    }

    fn parse_member(&mut self, object: NodeRef, is_arrow: bool, span: SourceSpan) -> Option<NodeRef> {
        let TokenKind::Identifier(field) = self.peek_kind() else {
            self.error("expected a member name".to_string(), self.span());
            return None;
        };
        self.bump();

        let record_ty = self.expr_ty(object).map(|t| self.types.unqualified(t));
        let record_ty = if is_arrow {
            record_ty
                .and_then(|t| self.decayed_pointee(t))
                .map(|t| self.types.unqualified(t))
        } else {
            record_ty
        };

        let mut field_ty = None;
        let mut problem = None;
        match record_ty.map(|t| self.types.get(t)) {
            Some(TypeKind::Struct(s)) if s.complete => {
                match s.fields.iter().find(|f| f.name == field) {
                    Some(f) => field_ty = Some(f.ty),
                    None => problem = Some(format!("no member named '{}'", field.as_str())),
                }
            }
            Some(TypeKind::Struct(_)) => {
                problem = Some("member access into an incomplete type".to_string());
            }
            _ => problem = Some("member access requires a struct or union".to_string()),
        }
        if let Some(message) = problem {
            self.error(message, span);
        }

        Some(self.push_expr(
            NodeKind::Member {
                object,
                field,
                is_arrow,
            },
            span,
            field_ty,
        ))
    }

    fn parse_primary(&mut self) -> Option<NodeRef> {
        let span = self.span();
        match self.peek_kind() {
            TokenKind::IntegerConstant(value, suffix) => {
                self.bump();
                let ty = match suffix {
                    None => TypeRef::INT,
                    Some(IntegerSuffix::L) => TypeRef::LONG,
                    Some(IntegerSuffix::LL) => TypeRef::LONG_LONG,
                    Some(IntegerSuffix::U) => TypeRef::UINT,
                    Some(IntegerSuffix::UL) => TypeRef::ULONG,
                    Some(IntegerSuffix::ULL) => TypeRef::ULONG_LONG,
                };
                Some(self.push_expr(NodeKind::Constant(ConstantValue::Int(value)), span, Some(ty)))
            }
            TokenKind::FloatConstant(value, suffix) => {
                self.bump();
                let ty = match suffix {
                    None => TypeRef::DOUBLE,
                    Some(FloatSuffix::F) => TypeRef::FLOAT,
                    Some(FloatSuffix::L) => TypeRef::LONG_DOUBLE,
                };
                Some(self.push_expr(
                    NodeKind::Constant(ConstantValue::Float(value)),
                    span,
                    Some(ty),
                ))
            }
            TokenKind::CharacterConstant(value) => {
                self.bump();
                Some(self.push_expr(
                    NodeKind::Constant(ConstantValue::Int(value as i64)),
                    span,
                    Some(TypeRef::INT),
                ))
            }
            TokenKind::StringLiteral(contents) => {
                self.bump();
                let ty = self.types.pointer_to(TypeRef::CHAR);
                Some(self.push_expr(
                    NodeKind::Constant(ConstantValue::Str(contents)),
                    span,
                    Some(ty),
                ))
            }
            TokenKind::Identifier(name) => {
                self.bump();
                let Some(object) = self.scopes.lookup(name) else {
                    self.error(format!("use of undeclared identifier '{}'", name.as_str()), span);
                    return None;
                };
                let ty = self.scopes.object(object).ty;
                Some(self.push_expr(NodeKind::ObjectRef(object), span, Some(ty)))
            }
            TokenKind::LeftParen => {
                self.bump();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RightParen)?;
                Some(expr)
            }
            other => {
                self.error(format!("expected an expression, found {:?}", other), span);
                None
            }
        }
    }
}
