//! Statement parsing for function bodies.

use thin_vec::ThinVec;

use crate::ast::{NodeKind, NodeRef};
use crate::lexer::TokenKind;
use crate::scope::ScopeRef;

use super::Parser;

impl Parser<'_> {
    /// `{ ... }` with its own scope.
    pub(crate) fn parse_block(&mut self) -> Option<NodeRef> {
        let scope = self.scopes.push();
        let block = self.parse_block_in_current_scope(scope);
        self.scopes.pop();
        block
    }

    /// `{ ... }` in a scope the caller already pushed (a function body,
    /// where the parameters live in the same scope as the locals).
    pub(crate) fn parse_block_in_current_scope(&mut self, scope: ScopeRef) -> Option<NodeRef> {
        let start = self.span();
        self.expect(TokenKind::LeftBrace)?;

        let mut children = ThinVec::new();
        while !matches!(self.peek_kind(), TokenKind::RightBrace | TokenKind::EndOfFile) {
            if self.diag.at_error_limit() {
                break;
            }
            match self.parse_statement() {
                Some(stmt) => children.push(stmt),
                None => self.resync_statement(),
            }
        }
        self.expect(TokenKind::RightBrace)?;
        Some(self.ast.push(NodeKind::Block { children, scope }, start, None))
    }

    /// Recovery inside a block: skip to just past the next `;`, or stop
    /// in front of the closing `}` so the block can still terminate.
    fn resync_statement(&mut self) {
        loop {
            match self.peek_kind() {
                TokenKind::EndOfFile | TokenKind::RightBrace => return,
                TokenKind::Semicolon => {
                    self.bump();
                    return;
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    pub(crate) fn parse_statement(&mut self) -> Option<NodeRef> {
        let start = self.span();
        match self.peek_kind() {
            TokenKind::LeftBrace => self.parse_block(),
            TokenKind::Semicolon => {
                self.bump();
                Some(self.ast.push(NodeKind::ExpressionStatement(None), start, None))
            }
            TokenKind::Return => {
                self.bump();
                let value = if self.peek_kind() != TokenKind::Semicolon {
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                self.expect(TokenKind::Semicolon)?;
                Some(self.ast.push(NodeKind::Return(value), start, None))
            }
            TokenKind::If => {
                self.bump();
                self.expect(TokenKind::LeftParen)?;
                let condition = self.parse_expression()?;
                self.expect(TokenKind::RightParen)?;
                let then_branch = self.parse_statement()?;
                let else_branch = if self.eat(TokenKind::Else) {
                    Some(self.parse_statement()?)
                } else {
                    None
                };
                Some(self.ast.push(
                    NodeKind::If {
                        condition,
                        then_branch,
                        else_branch,
                    },
                    start,
                    None,
                ))
            }
            TokenKind::While => {
                self.bump();
                self.expect(TokenKind::LeftParen)?;
                let condition = self.parse_expression()?;
                self.expect(TokenKind::RightParen)?;
                let body = self.parse_statement()?;
                Some(self.ast.push(NodeKind::While { condition, body }, start, None))
            }
            _ if self.at_type_name() => self.parse_local_declaration(),
            _ => {
                let expr = self.parse_expression()?;
                self.expect(TokenKind::Semicolon)?;
                Some(self.ast.push(NodeKind::ExpressionStatement(Some(expr)), start, None))
            }
        }
    }
}
