//! The parser (§4.2): tokens in, flat `Ast` out. Expressions are
//! parsed with an iterative Pratt/precedence-climbing engine driven by
//! an explicit frame stack rather than recursion, so a deeply nested
//! expression cannot overflow the native call stack.

use crate::ast::{Ast, AstNode, BinOp, NodeTag, UnOp, AST_EMPTY, NO_TOKEN};
use crate::diagnostic::{DiagKind, Diagnostic};
use crate::span::{Span, Spanned};
use crate::token::TokenKind;

pub fn parse(tokens: Vec<Spanned<TokenKind>>) -> Ast {
    let mut parser = Parser::new(tokens);
    parser.parse_module();
    parser.ast
}

struct Parser {
    tokens: Vec<Spanned<TokenKind>>,
    pos: usize,
    ast: Ast,
}

/// A pending infix operator and its binding powers.
struct ParseFrame {
    /// `min_bp` in effect when this frame's operator was consumed —
    /// restored once the frame is popped, so the outer loop re-checks
    /// the next pending operator against the level it actually belongs to.
    min_bp: u8,
    lhs: u32,
    op: BinOp,
    op_token: u32,
}

impl Parser {
    fn new(tokens: Vec<Spanned<TokenKind>>) -> Self {
        let ast = Ast::new(tokens.clone());
        Self { tokens, pos: 0, ast }
    }

    // --- token stream helpers -------------------------------------------------

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].node
    }

    fn peek_span(&self) -> Span {
        self.tokens[self.pos.min(self.tokens.len() - 1)].span
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    fn advance(&mut self) -> u32 {
        let idx = self.pos as u32;
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        idx
    }

    fn eat(&mut self, kind: &TokenKind) -> Option<u32> {
        if std::mem::discriminant(self.peek()) == std::mem::discriminant(kind) {
            Some(self.advance())
        } else {
            None
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Option<u32> {
        if let Some(idx) = self.eat(&kind) {
            return Some(idx);
        }
        self.ast.diagnostics.push(Diagnostic::error(
            DiagKind::MissingDelimiter,
            format!("expected {}, found {}", kind.description(), self.peek().description()),
            self.peek_span(),
        ));
        None
    }

    /// Expects a `;`. If missing, the statement is still taken as
    /// complete (§4.2.7 "missing-semicolon synthesis + continue"): a
    /// diagnostic is recorded but the token stream is not consumed.
    fn expect_semicolon(&mut self) {
        if self.eat(&TokenKind::Semicolon).is_none() {
            self.ast.diagnostics.push(Diagnostic::error(
                DiagKind::MissingSemicolon,
                format!("expected ';', found {}", self.peek().description()),
                self.peek_span(),
            ));
        }
    }

    fn expect_ident(&mut self) -> Option<u32> {
        if self.peek().is_ident() {
            Some(self.advance())
        } else {
            self.ast.diagnostics.push(Diagnostic::error(
                DiagKind::ParseError,
                format!("expected an identifier, found {}", self.peek().description()),
                self.peek_span(),
            ));
            None
        }
    }

    /// Skip forward to the next synchronizing token (`;`, the expected
    /// closer, or `EOF`) after a missing-delimiter error, so later
    /// top-level items still get parsed.
    fn synchronize(&mut self, closer: &TokenKind) {
        loop {
            if self.at_eof() {
                return;
            }
            if std::mem::discriminant(self.peek()) == std::mem::discriminant(closer) {
                self.advance();
                return;
            }
            if matches!(self.peek(), TokenKind::Semicolon) {
                self.advance();
                return;
            }
            self.advance();
        }
    }

    // --- generic bracketed list -------------------------------------------------

    /// Parses `open item (delim item)* close`, buffering item indices
    /// in a scratch vector and flushing them to `extra[]` in one shot
    /// so the range stays contiguous even with nested lists.
    fn parse_list(
        &mut self,
        open: TokenKind,
        close: TokenKind,
        delim: TokenKind,
        mut item: impl FnMut(&mut Self) -> Option<u32>,
    ) -> (u32, u32) {
        let mut scratch = Vec::new();
        if self.expect(open).is_none() {
            return self.flush(scratch);
        }
        if self.eat(&close).is_some() {
            return self.flush(scratch);
        }
        loop {
            if let Some(idx) = item(self) {
                scratch.push(idx);
            }
            if self.eat(&delim).is_some() {
                continue;
            }
            break;
        }
        if self.expect(close.clone()).is_none() {
            self.synchronize(&close);
        }
        self.flush(scratch)
    }

    fn flush(&mut self, scratch: Vec<u32>) -> (u32, u32) {
        let start = self.ast.push_extra(&scratch);
        (start, start + scratch.len() as u32)
    }

    // --- top level -------------------------------------------------

    fn parse_module(&mut self) {
        let mut decls = Vec::new();
        while !self.at_eof() {
            match self.peek() {
                TokenKind::Fn => {
                    if let Some(idx) = self.parse_named_fn() {
                        decls.push(idx);
                    }
                }
                _ => {
                    self.ast.diagnostics.push(Diagnostic::error(
                        DiagKind::InvalidTopLevel,
                        format!("expected a function declaration, found {}", self.peek().description()),
                        self.peek_span(),
                    ));
                    self.advance();
                }
            }
        }
        let (start, end) = self.flush(decls);
        let root = self.ast.push_node(AstNode {
            tag: NodeTag::Module,
            main_token: NO_TOKEN,
            lhs: start,
            rhs: end,
        });
        self.ast.root = root;
    }

    /// `fn NAME(params) [: ret_type] block`
    fn parse_named_fn(&mut self) -> Option<u32> {
        let fn_tok = self.expect(TokenKind::Fn)?;
        let name_tok = self.expect_ident()?;

        let (param_start, param_end) = self.parse_list(
            TokenKind::LParen,
            TokenKind::RParen,
            TokenKind::Comma,
            |p| p.parse_fn_param(),
        );

        let return_type_token = if self.eat(&TokenKind::Colon).is_some() {
            self.expect_ident().unwrap_or(NO_TOKEN)
        } else {
            NO_TOKEN
        };

        let extra_start = self.ast.push_extra(&[param_start, param_end, return_type_token]);
        let proto = self.ast.push_node(AstNode {
            tag: NodeTag::FnProto,
            main_token: fn_tok,
            lhs: extra_start,
            rhs: 0,
        });

        let body = self.parse_block()?;

        Some(self.ast.push_node(AstNode {
            tag: NodeTag::NamedFn,
            main_token: name_tok,
            lhs: proto,
            rhs: body,
        }))
    }

    /// `NAME : TYPE`
    fn parse_fn_param(&mut self) -> Option<u32> {
        let name_tok = self.expect_ident()?;
        self.expect(TokenKind::Colon)?;
        let type_tok = self.expect_ident()?;
        Some(self.ast.push_node(AstNode {
            tag: NodeTag::FnParam,
            main_token: name_tok,
            lhs: type_tok,
            rhs: 0,
        }))
    }

    // --- statements -------------------------------------------------

    /// `{ stmt* }`
    fn parse_block(&mut self) -> Option<u32> {
        let brace_tok = self.expect(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while !matches!(self.peek(), TokenKind::RBrace) && !self.at_eof() {
            if let Some(idx) = self.parse_stmt() {
                stmts.push(idx);
            }
        }
        if self.expect(TokenKind::RBrace).is_none() {
            self.synchronize(&TokenKind::RBrace);
        }
        let (start, end) = self.flush(stmts);
        Some(self.ast.push_node(AstNode {
            tag: NodeTag::Block,
            main_token: brace_tok,
            lhs: start,
            rhs: end,
        }))
    }

    fn parse_stmt(&mut self) -> Option<u32> {
        match self.peek() {
            TokenKind::Let => self.parse_let_stmt(),
            TokenKind::Return => self.parse_return_stmt(),
            _ => self.parse_expr_stmt(),
        }
    }

    /// `let NAME [: TYPE] = expr ;`
    fn parse_let_stmt(&mut self) -> Option<u32> {
        self.advance(); // `let`
        let name_tok = self.expect_ident()?;
        let type_tok = if self.eat(&TokenKind::Colon).is_some() {
            self.expect_ident().unwrap_or(NO_TOKEN)
        } else {
            NO_TOKEN
        };
        self.expect(TokenKind::Eq)?;
        let init = self.parse_expr_bp(0)?;
        self.expect_semicolon();
        Some(self.ast.push_node(AstNode {
            tag: NodeTag::Let,
            main_token: name_tok,
            lhs: init,
            rhs: type_tok,
        }))
    }

    /// `return [expr] ;`
    fn parse_return_stmt(&mut self) -> Option<u32> {
        let ret_tok = self.advance();
        // A return value is parsed iff the next token isn't `;` (explicit
        // terminator) or `}` (the block's own closing brace, §4.2.3 makes
        // the trailing statement semicolon optional).
        let value = if matches!(self.peek(), TokenKind::Semicolon | TokenKind::RBrace) {
            AST_EMPTY
        } else {
            self.parse_expr_bp(0).unwrap_or(AST_EMPTY)
        };
        self.expect_semicolon();
        Some(self.ast.push_node(AstNode {
            tag: NodeTag::Return,
            main_token: ret_tok,
            lhs: value,
            rhs: 0,
        }))
    }

    fn parse_expr_stmt(&mut self) -> Option<u32> {
        let expr = self.parse_expr_bp(0)?;
        self.expect_semicolon();
        Some(expr)
    }

    // --- expressions: iterative Pratt engine -------------------------------------------------

    fn parse_expr_bp(&mut self, min_bp: u8) -> Option<u32> {
        let mut lhs = self.parse_prefix()?;
        let mut frames: Vec<ParseFrame> = Vec::new();
        let mut cur_min_bp = min_bp;

        loop {
            // `(` is modeled as a postfix/infix operator (§4.2.2): it
            // applies to whatever `lhs` already is, not just a bare
            // identifier, so `(f)(1)` and `g()()` both parse as calls.
            if matches!(self.peek(), TokenKind::LParen) && CALL_LBP >= cur_min_bp {
                lhs = self.parse_call(lhs);
                continue;
            }

            let op_info = BinOp::from_token(self.peek()).map(|op| {
                let (lbp, rbp) = infix_bp(&op);
                (op, lbp, rbp)
            });

            match op_info {
                Some((op, lbp, rbp)) if lbp >= cur_min_bp => {
                    let op_token = self.advance();
                    frames.push(ParseFrame { min_bp: cur_min_bp, lhs, op, op_token });
                    lhs = match self.parse_prefix() {
                        Some(idx) => idx,
                        None => break,
                    };
                    cur_min_bp = rbp;
                }
                _ => match frames.pop() {
                    Some(frame) => {
                        lhs = self.ast.push_node(AstNode {
                            tag: NodeTag::Binary,
                            main_token: frame.op_token,
                            lhs: frame.lhs,
                            rhs: lhs,
                        });
                        cur_min_bp = frame.min_bp;
                    }
                    None => break,
                },
            }
        }

        Some(lhs)
    }

    fn parse_prefix(&mut self) -> Option<u32> {
        match self.peek().clone() {
            TokenKind::Minus | TokenKind::Plus | TokenKind::Bang => {
                let op_tok = self.advance();
                let op = UnOp::from_token(&self.tokens[op_tok as usize].node)
                    .expect("matched prefix token without a UnOp mapping");
                let (_, rbp) = prefix_bp(op);
                let operand = self.parse_expr_bp(rbp)?;
                Some(self.ast.push_node(AstNode { tag: NodeTag::Unary, main_token: op_tok, lhs: operand, rhs: 0 }))
            }
            TokenKind::Number(_) => {
                let tok = self.advance();
                Some(self.ast.push_node(AstNode { tag: NodeTag::Int, main_token: tok, lhs: 0, rhs: 0 }))
            }
            TokenKind::True | TokenKind::False => {
                let tok = self.advance();
                Some(self.ast.push_node(AstNode { tag: NodeTag::Bool, main_token: tok, lhs: 0, rhs: 0 }))
            }
            TokenKind::Ident(_) => {
                let tok = self.advance();
                Some(self.ast.push_node(AstNode { tag: NodeTag::Ref, main_token: tok, lhs: 0, rhs: 0 }))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr_bp(0)?;
                if self.expect(TokenKind::RParen).is_none() {
                    self.synchronize(&TokenKind::RParen);
                }
                Some(inner)
            }
            _ => {
                self.ast.diagnostics.push(Diagnostic::error(
                    DiagKind::ExpressionExpected,
                    format!("expected an expression, found {}", self.peek().description()),
                    self.peek_span(),
                ));
                // An unrecoverable expression slot still consumes its
                // offending token (§4.2.7): leaving `self.pos` unmoved
                // would let a caller like `parse_block`'s statement loop
                // spin forever on the same token.
                self.advance();
                None
            }
        }
    }

    /// `lhs (args)` — the call operator, entered once `(` has been
    /// recognized as binding at the current precedence level.
    fn parse_call(&mut self, callee: u32) -> u32 {
        let paren_tok = self.pos as u32;
        let (arg_start, arg_end) =
            self.parse_list(TokenKind::LParen, TokenKind::RParen, TokenKind::Comma, |p| p.parse_expr_bp(0));
        let data_offset = self.ast.push_extra(&[callee, arg_start, arg_end]);
        self.ast.push_node(AstNode { tag: NodeTag::Call, main_token: paren_tok, lhs: data_offset, rhs: 0 })
    }
}

/// Binding powers for infix operators (§4.2.3): higher binds tighter.
/// Left-associative, so `rbp = lbp + 1`.
fn infix_bp(op: &BinOp) -> (u8, u8) {
    match op {
        BinOp::Or => (1, 2),
        BinOp::And => (3, 4),
        BinOp::Eq | BinOp::NEq => (5, 6),
        BinOp::Lt | BinOp::LtEq | BinOp::Gt | BinOp::GtEq => (7, 8),
        BinOp::Add | BinOp::Sub => (9, 10),
        BinOp::Mul | BinOp::Div => (11, 12),
    }
}

/// Binding power for a prefix operator: the left side is unused (there
/// is no left operand), the right side is the `min_bp` the operand is
/// parsed with. Looser than `CALL_LBP` so `-f()`/`!f()` bind the call
/// before negating/inverting its result.
fn prefix_bp(op: UnOp) -> (u8, u8) {
    match op {
        UnOp::Neg | UnOp::Pos | UnOp::Not => (0, 13),
    }
}

/// Binding power of `(` used as a call operator: tighter than every
/// other operator, so a call always applies to the nearest preceding
/// expression regardless of surrounding context (§4.2.2).
const CALL_LBP: u8 = 99;
