//! AST→MIR lowering (§4.3): name resolution against a lexical scope
//! stack, introducing `Load`/`Store` for locals, flattening nested
//! blocks into one instruction stream per function, and resolving
//! calls against the module's other declarations by name.

use crate::ast::{Ast, AstNode, BinOp, NodeTag, UnOp, AST_EMPTY, NO_TOKEN};
use crate::diagnostic::{DiagKind, Diagnostic};
use crate::mir::{ref_to_index, Mir, MirInst, MirInstData, MirInstTag, Ref, REF_VOID};
use crate::span::Span;
use crate::types::Type;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ScopeItemKind {
    /// A function argument — its `Ref` is the value directly, no `Load`.
    Arg,
    /// A local `let` binding — its `Ref` points at the `Alloc`; reading
    /// it requires a `Load`.
    Var,
}

/// A lexical scope: a borrowed chain up to the function's root scope,
/// mirroring block nesting one-to-one.
struct Scope<'p> {
    parent: Option<&'p Scope<'p>>,
    names: Vec<String>,
    kinds: Vec<ScopeItemKind>,
    refs: Vec<Ref>,
}

impl<'p> Scope<'p> {
    fn root() -> Self {
        Self { parent: None, names: Vec::new(), kinds: Vec::new(), refs: Vec::new() }
    }

    fn child(parent: &'p Scope<'p>) -> Self {
        Self { parent: Some(parent), names: Vec::new(), kinds: Vec::new(), refs: Vec::new() }
    }

    fn declare(&mut self, name: String, kind: ScopeItemKind, r: Ref) {
        self.names.push(name);
        self.kinds.push(kind);
        self.refs.push(r);
    }

    fn lookup(&self, name: &str) -> Option<(ScopeItemKind, Ref)> {
        for i in (0..self.names.len()).rev() {
            if self.names[i] == name {
                return Some((self.kinds[i], self.refs[i]));
            }
        }
        self.parent.and_then(|p| p.lookup(name))
    }
}

/// Scan the module's declarations for a function named `name` (§4.3,
/// `find_named_fn`'s linear-search contract — name matching, not a
/// precomputed index).
pub fn find_named_fn(ast: &Ast, module_fns: &[(String, u32)], name: &str) -> Option<u32> {
    module_fns.iter().find(|(n, _)| n == name).map(|(_, idx)| *idx)
}

struct Lowerer<'a> {
    ast: &'a Ast,
    module_fns: &'a [(String, u32)],
    mir: Mir,
    diagnostics: Vec<Diagnostic>,
}

/// Lowers one `NAMED_FN` node to a flat `Mir`. `module_fns` is the
/// module's full `(name, ast_index)` list, used to resolve calls to
/// sibling functions (including itself, for recursion).
pub fn lower_ast_fn(ast: &Ast, fn_idx: u32, module_fns: &[(String, u32)]) -> (Mir, Vec<Diagnostic>) {
    let mut lowerer = Lowerer { ast, module_fns, mir: Mir::new(), diagnostics: Vec::new() };
    lowerer.lower_fn(fn_idx);
    lowerer.mir.assert_fully_lowered();
    (lowerer.mir, lowerer.diagnostics)
}

impl<'a> Lowerer<'a> {
    /// Lowers the function: the root `Block` is reserved first so it
    /// lands at instruction index 0 (§3 "a MIR function's root
    /// instruction is Block at index 0"), then parameters are pre-bound
    /// as `Arg` instructions before the body is lowered.
    fn lower_fn(&mut self, fn_idx: u32) {
        let named_fn = self.ast.node(fn_idx);
        let proto = self.ast.node(named_fn.lhs);
        let param_nodes = self.ast.fn_proto_params(proto).to_vec();

        let block_ref = self.mir.reserve();

        let mut scope = Scope::root();
        for (arg_index, param_idx) in param_nodes.iter().enumerate() {
            let param = self.ast.node(*param_idx);
            let name = self.ast.token_text(param.main_token).unwrap_or("").to_string();
            let ty = self.resolve_type_token(param.lhs);
            let arg_ref = self.mir.push(MirInst {
                tag: MirInstTag::Arg,
                data: MirInstData::TyPl(ty, arg_index as u32),
            });
            scope.declare(name, ScopeItemKind::Arg, arg_ref);
        }

        let body = *self.ast.node(named_fn.rhs);
        let stmt_refs = self.lower_block_stmts(&body, &scope);
        self.fill_block(block_ref, &stmt_refs);
    }

    fn resolve_type_token(&self, token_idx: u32) -> Type {
        if token_idx == NO_TOKEN {
            return Type::Void;
        }
        self.ast
            .token_text(token_idx)
            .and_then(Type::from_name)
            .unwrap_or(Type::Unknown)
    }

    /// Lowers a `Block` node's statements into the current instruction
    /// stream, collecting each statement's own resulting instruction
    /// ref (not every instruction lowering it emits along the way —
    /// e.g. a `let` contributes only its `Store`, not the `Alloc`/
    /// initializer instructions nested inside it). This list is what
    /// the owning `Block` instruction's `extra[]` payload records.
    fn lower_block_stmts(&mut self, block: &AstNode, parent: &Scope) -> Vec<Ref> {
        debug_assert_eq!(block.tag, NodeTag::Block);
        let mut scope = Scope::child(parent);
        self.ast
            .block_stmts(block)
            .to_vec()
            .iter()
            .map(|&stmt_idx| self.lower_stmt(stmt_idx, &mut scope))
            .collect()
    }

    /// Lowers a nested block expression using reserve-then-backfill:
    /// the `Block` instruction's index is reserved before its body is
    /// lowered, so the block can be referenced before its contents
    /// exist, then filled in with the body's statement-ref list.
    fn lower_nested_block(&mut self, block_idx: u32, parent: &Scope) -> Ref {
        let block = *self.ast.node(block_idx);
        let reserved = self.mir.reserve();
        let stmt_refs = self.lower_block_stmts(&block, parent);
        self.fill_block(reserved, &stmt_refs);
        reserved
    }

    /// Writes `stmt_refs` into `extra[]` as a `Block` payload (§4.3.3)
    /// and backfills the previously reserved instruction slot.
    fn fill_block(&mut self, block_ref: Ref, stmt_refs: &[Ref]) {
        let indices: Vec<u32> = stmt_refs.iter().map(|&r| ref_to_index(r)).collect();
        let offset = self.mir.push_block_list(&indices);
        self.mir.fill(block_ref, MirInstTag::Block, MirInstData::Block(offset));
    }

    /// Lowers one statement, returning the `Ref` of the instruction
    /// that represents it at the owning block's top level.
    fn lower_stmt(&mut self, stmt_idx: u32, scope: &mut Scope) -> Ref {
        let node = *self.ast.node(stmt_idx);
        match node.tag {
            NodeTag::Let => {
                let value_ref = self.lower_expr(node.lhs, scope);
                let ty = self.resolve_type_token(node.rhs);
                let alloc_ref = self.mir.push(MirInst { tag: MirInstTag::Alloc, data: MirInstData::Ty(ty) });
                let store_ref = self.mir.push(MirInst { tag: MirInstTag::Store, data: MirInstData::BinOp(alloc_ref, value_ref) });
                let name = self.ast.token_text(node.main_token).unwrap_or("").to_string();
                scope.declare(name, ScopeItemKind::Var, alloc_ref);
                store_ref
            }
            NodeTag::Return => {
                let value_ref = if node.lhs == AST_EMPTY {
                    REF_VOID
                } else {
                    self.lower_expr(node.lhs, scope)
                };
                self.mir.push(MirInst { tag: MirInstTag::Ret, data: MirInstData::UnOp(value_ref) })
            }
            NodeTag::Block => self.lower_nested_block(stmt_idx, scope),
            _ => {
                // An expression used as a statement (e.g. a bare call);
                // its value is discarded, but it's still the ref that
                // represents this statement in the block's list.
                self.lower_expr(stmt_idx, scope)
            }
        }
    }

    fn lower_expr(&mut self, expr_idx: u32, scope: &Scope) -> Ref {
        let node = *self.ast.node(expr_idx);
        match node.tag {
            NodeTag::Int => {
                let text = self.ast.token_text(node.main_token).unwrap_or("0");
                let value: i64 = text.parse().unwrap_or(0);
                let offset = self.mir.push_immediate(value);
                self.mir.push(MirInst { tag: MirInstTag::Constant, data: MirInstData::TyPl(Type::I64, offset) })
            }
            NodeTag::Bool => {
                let is_true = matches!(self.ast.tokens[node.main_token as usize].node, crate::token::TokenKind::True);
                let offset = self.mir.push_immediate(if is_true { 1 } else { 0 });
                self.mir.push(MirInst { tag: MirInstTag::Constant, data: MirInstData::TyPl(Type::Bool, offset) })
            }
            NodeTag::Ref => {
                let name = self.ast.token_text(node.main_token).unwrap_or("");
                match scope.lookup(name) {
                    Some((ScopeItemKind::Arg, r)) => r,
                    Some((ScopeItemKind::Var, alloc_ref)) => {
                        self.mir.push(MirInst { tag: MirInstTag::Load, data: MirInstData::UnOp(alloc_ref) })
                    }
                    None => self.undefined_reference(name, self.ast.tokens[node.main_token as usize].span),
                }
            }
            NodeTag::Binary => {
                let lhs = self.lower_expr(node.lhs, scope);
                let rhs = self.lower_expr(node.rhs, scope);
                let op = BinOp::from_token(&self.ast.tokens[node.main_token as usize].node).expect("binary node without a binary operator token");
                let tag = bin_op_tag(op);
                self.mir.push(MirInst { tag, data: MirInstData::BinOp(lhs, rhs) })
            }
            NodeTag::Unary => {
                let op = UnOp::from_token(&self.ast.tokens[node.main_token as usize].node)
                    .expect("unary node without a unary operator token");
                let operand = self.lower_expr(node.lhs, scope);
                match op {
                    // Numeric negation is modeled as `0 - operand` rather
                    // than a dedicated instruction.
                    UnOp::Neg => {
                        let zero_offset = self.mir.push_immediate(0);
                        let zero =
                            self.mir.push(MirInst { tag: MirInstTag::Constant, data: MirInstData::TyPl(Type::I64, zero_offset) });
                        self.mir.push(MirInst { tag: MirInstTag::Sub, data: MirInstData::BinOp(zero, operand) })
                    }
                    // Unary `+` is a no-op; it contributes no instruction.
                    UnOp::Pos => operand,
                    // Logical not is modeled as `operand == 0`.
                    UnOp::Not => {
                        let zero_offset = self.mir.push_immediate(0);
                        let zero =
                            self.mir.push(MirInst { tag: MirInstTag::Constant, data: MirInstData::TyPl(Type::Bool, zero_offset) });
                        self.mir.push(MirInst { tag: MirInstTag::Eq, data: MirInstData::BinOp(operand, zero) })
                    }
                }
            }
            NodeTag::Call => {
                let call_data = self.ast.call_data(&node);
                let callee_node = *self.ast.node(call_data.callee);
                let arg_nodes = self.ast.extra_slice(call_data.arg_start, call_data.arg_end).to_vec();
                let mut arg_refs = Vec::with_capacity(arg_nodes.len());
                for arg_idx in arg_nodes {
                    arg_refs.push(self.lower_expr(arg_idx, scope));
                }
                // Only a bare name resolves to a declaration (§4.3, name-based
                // call resolution); calling the result of another expression
                // (e.g. `g()()`) has no declaration to resolve against.
                if callee_node.tag != NodeTag::Ref {
                    return self.unsupported_construct(self.ast.tokens[node.main_token as usize].span);
                }
                let callee_name = self.ast.token_text(callee_node.main_token).unwrap_or("").to_string();
                match find_named_fn(self.ast, self.module_fns, &callee_name) {
                    Some(_) => {
                        let fn_ptr_ref = self.mir.push(MirInst {
                            tag: MirInstTag::FnPtr,
                            data: MirInstData::FnPtr(callee_name),
                        });
                        let arg_start = self.mir.push_call_args(&arg_refs);
                        self.mir.push(MirInst {
                            tag: MirInstTag::Call,
                            data: MirInstData::Call(fn_ptr_ref, arg_start),
                        })
                    }
                    None => self.undefined_reference(&callee_name, self.ast.tokens[callee_node.main_token as usize].span),
                }
            }
            _ => self.unsupported_construct(self.ast.tokens[node.main_token.min(self.ast.tokens.len() as u32 - 1) as usize].span),
        }
    }

    /// §7: an undefined reference is reported but lowering keeps going,
    /// substituting a placeholder `Unknown`-typed constant so the rest
    /// of the function still lowers.
    fn undefined_reference(&mut self, name: &str, span: Span) -> Ref {
        self.diagnostics.push(Diagnostic::error(
            DiagKind::UndefinedReference,
            format!("undefined reference to '{name}'"),
            span,
        ));
        let offset = self.mir.push_immediate(0);
        self.mir.push(MirInst { tag: MirInstTag::Constant, data: MirInstData::TyPl(Type::Unknown, offset) })
    }

    fn unsupported_construct(&mut self, span: Span) -> Ref {
        self.diagnostics.push(Diagnostic::error(
            DiagKind::UnsupportedConstruct,
            "this construct is not supported in expression position".to_string(),
            span,
        ));
        let offset = self.mir.push_immediate(0);
        self.mir.push(MirInst { tag: MirInstTag::Constant, data: MirInstData::TyPl(Type::Unknown, offset) })
    }
}

fn bin_op_tag(op: BinOp) -> MirInstTag {
    match op {
        BinOp::Add => MirInstTag::Add,
        BinOp::Sub => MirInstTag::Sub,
        BinOp::Mul => MirInstTag::Mul,
        BinOp::Div => MirInstTag::Div,
        BinOp::Eq => MirInstTag::Eq,
        BinOp::NEq => MirInstTag::NEq,
        BinOp::Lt => MirInstTag::Lt,
        BinOp::LtEq => MirInstTag::LtEq,
        BinOp::Gt => MirInstTag::Gt,
        BinOp::GtEq => MirInstTag::GtEq,
        // Eager (non-short-circuit) evaluation of both operands;
        // short-circuit control flow is a codegen concern, out of scope.
        BinOp::And => MirInstTag::And,
        BinOp::Or => MirInstTag::Or,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Ast;
    use crate::lexer::Lexer;
    use crate::parser::parse;

    fn lower_single_fn(src: &str) -> (Mir, Vec<Diagnostic>) {
        let tokens = Lexer::new(src).tokenize();
        let ast = parse(tokens);
        let module = ast.node(ast.root);
        let decls = ast.module_decls(module);
        let module_fns: Vec<(String, u32)> = decls
            .iter()
            .map(|&idx| (ast.token_text(ast.node(idx).main_token).unwrap().to_string(), idx))
            .collect();
        lower_ast_fn(&ast, decls[0], &module_fns)
    }

    #[test]
    fn test_add_uses_args_directly_no_load() {
        let (mir, diags) = lower_single_fn("fn add(a: i64, b: i64): i64 { return a + b; }");
        assert!(diags.is_empty());
        // Block, Arg, Arg, Add, Ret — no Alloc/Load for function parameters.
        assert!(!mir.instructions.iter().any(|i| i.tag == MirInstTag::Load));
        assert!(!mir.instructions.iter().any(|i| i.tag == MirInstTag::Alloc));
        assert!(mir.instructions.iter().any(|i| i.tag == MirInstTag::Add));
        assert_eq!(mir.instructions.last().unwrap().tag, MirInstTag::Ret);
    }

    #[test]
    fn test_identity_returns_arg_directly() {
        let (mir, diags) = lower_single_fn("fn id(x: i64): i64 { return x; }");
        assert!(diags.is_empty());
        // Instruction 0 is the function's root Block (§3); the
        // parameter and the `return` follow it.
        assert_eq!(mir.instructions[0].tag, MirInstTag::Block);
        assert_eq!(mir.instructions[1].tag, MirInstTag::Arg);
        assert_eq!(mir.instructions[2].tag, MirInstTag::Ret);
    }

    #[test]
    fn test_let_binding_emits_alloc_store_load() {
        let (mir, diags) = lower_single_fn("fn f(): i64 { let x = 1; return x; }");
        assert!(diags.is_empty());
        let tags: Vec<_> = mir.instructions.iter().map(|i| i.tag).collect();
        assert!(tags.contains(&MirInstTag::Alloc));
        assert!(tags.contains(&MirInstTag::Store));
        assert!(tags.contains(&MirInstTag::Load));
    }

    #[test]
    fn test_call_emits_fn_ptr_and_call() {
        let src = "fn helper(): i64 { return 1; } fn main(): i64 { return helper(); }";
        let tokens = Lexer::new(src).tokenize();
        let ast = parse(tokens);
        let module = ast.node(ast.root);
        let decls = ast.module_decls(module);
        let module_fns: Vec<(String, u32)> = decls
            .iter()
            .map(|&idx| (ast.token_text(ast.node(idx).main_token).unwrap().to_string(), idx))
            .collect();
        let main_idx = decls[1];
        let (mir, diags) = lower_ast_fn(&ast, main_idx, &module_fns);
        assert!(diags.is_empty());
        assert!(mir.instructions.iter().any(|i| i.tag == MirInstTag::FnPtr));
        assert!(mir.instructions.iter().any(|i| i.tag == MirInstTag::Call));
    }

    #[test]
    fn test_undefined_reference_is_reported() {
        let (_, diags) = lower_single_fn("fn f(): i64 { return y; }");
        assert!(diags.iter().any(|d| d.kind == DiagKind::UndefinedReference));
    }

    #[test]
    fn test_undefined_call_is_reported() {
        let (_, diags) = lower_single_fn("fn f(): i64 { return nope(); }");
        assert!(diags.iter().any(|d| d.kind == DiagKind::UndefinedReference));
    }

    #[test]
    fn test_nested_block_reserve_backfill() {
        let (mir, diags) = lower_single_fn("fn f(): i64 { { let x = 1; } return 2; }");
        assert!(diags.is_empty());
        // Two Block instructions: the function's root block (index 0)
        // and the nested `{ let x = 1; }` block.
        let blocks: Vec<_> = mir.instructions.iter().filter(|i| i.tag == MirInstTag::Block).collect();
        assert_eq!(blocks.len(), 2);
        for block_inst in &blocks {
            match &block_inst.data {
                MirInstData::Block(offset) => assert!(!mir.block_list(*offset).is_empty()),
                _ => panic!("expected Block data"),
            }
        }
        mir.assert_fully_lowered();
    }

    #[test]
    fn test_no_reserved_survives() {
        let (mir, _) = lower_single_fn("fn f(): i64 { { let x = 1; } return x; }");
        mir.assert_fully_lowered();
    }

    #[test]
    fn test_root_instruction_is_block() {
        let (mir, diags) = lower_single_fn("fn main(): i64 { return 42; }");
        assert!(diags.is_empty());
        assert_eq!(mir.instructions[0].tag, MirInstTag::Block);
    }

    #[test]
    fn test_root_block_lists_only_statement_refs() {
        // `{ let x = 1; return x; }`: Alloc/Constant/Load are nested
        // inside their owning statements, not separate block-level
        // statements, so the block's list is exactly [store_id, ret_id].
        let (mir, diags) = lower_single_fn("fn f(): i64 { let x = 1; return x; }");
        assert!(diags.is_empty());
        let store_idx = mir.instructions.iter().position(|i| i.tag == MirInstTag::Store).unwrap() as u32;
        let ret_idx = mir.instructions.iter().position(|i| i.tag == MirInstTag::Ret).unwrap() as u32;
        let root = &mir.instructions[0];
        match &root.data {
            MirInstData::Block(offset) => assert_eq!(mir.block_list(*offset), &[store_idx, ret_idx]),
            _ => panic!("expected root Block data"),
        }
    }

    #[test]
    fn test_call_produces_fn_ptr_then_const_then_call_payload() {
        let src = "fn g(n: i64): i64 { return n; } fn main(): i64 { return g(1); }";
        let tokens = Lexer::new(src).tokenize();
        let ast = parse(tokens);
        let module = ast.node(ast.root);
        let decls = ast.module_decls(module);
        let module_fns: Vec<(String, u32)> = decls
            .iter()
            .map(|&idx| (ast.token_text(ast.node(idx).main_token).unwrap().to_string(), idx))
            .collect();
        let (mir, diags) = lower_ast_fn(&ast, decls[1], &module_fns);
        assert!(diags.is_empty());
        let fn_ptr_idx = mir.instructions.iter().position(|i| i.tag == MirInstTag::FnPtr).unwrap();
        let const_idx = mir.instructions.iter().position(|i| i.tag == MirInstTag::Constant).unwrap();
        let call_idx = mir.instructions.iter().position(|i| i.tag == MirInstTag::Call).unwrap();
        assert!(fn_ptr_idx < const_idx);
        assert!(const_idx < call_idx);
        match &mir.instructions[call_idx].data {
            MirInstData::Call(_, arg_offset) => {
                assert_eq!(mir.call_args(*arg_offset), &[crate::mir::index_to_ref(const_idx as u32)]);
            }
            _ => panic!("expected Call data"),
        }
    }

    #[test]
    fn test_and_or_produce_distinct_tags() {
        let (mir, diags) = lower_single_fn("fn f(a: bool, b: bool): bool { return a && b; }");
        assert!(diags.is_empty());
        assert!(mir.instructions.iter().any(|i| i.tag == MirInstTag::And));

        let (mir, diags) = lower_single_fn("fn g(a: bool, b: bool): bool { return a || b; }");
        assert!(diags.is_empty());
        assert!(mir.instructions.iter().any(|i| i.tag == MirInstTag::Or));
    }

    #[test]
    fn test_double_bang_nests_two_eq_comparisons() {
        // `!!x` -> Eq(Eq(x, false), false): not(not(x)).
        let (mir, diags) = lower_single_fn("fn f(x: bool): bool { return !!x; }");
        assert!(diags.is_empty());
        let eq_count = mir.instructions.iter().filter(|i| i.tag == MirInstTag::Eq).count();
        assert_eq!(eq_count, 2);
    }

    #[test]
    fn test_unary_plus_is_identity() {
        let (mir, diags) = lower_single_fn("fn f(x: i64): i64 { return +x; }");
        assert!(diags.is_empty());
        // No instruction is emitted for unary `+`; the Ret operand is
        // the parameter's own Arg ref directly.
        assert!(!mir.instructions.iter().any(|i| i.tag == MirInstTag::Sub));
        assert!(mir.instructions.iter().any(|i| i.tag == MirInstTag::Arg));
    }

    #[test]
    fn test_calling_a_call_result_is_unsupported() {
        let src = "fn g(): i64 { return 1; } fn f(): i64 { return g()(); }";
        let tokens = Lexer::new(src).tokenize();
        let ast = parse(tokens);
        let module = ast.node(ast.root);
        let decls = ast.module_decls(module);
        let module_fns: Vec<(String, u32)> = decls
            .iter()
            .map(|&idx| (ast.token_text(ast.node(idx).main_token).unwrap().to_string(), idx))
            .collect();
        let (_, diags) = lower_ast_fn(&ast, decls[1], &module_fns);
        assert!(diags.iter().any(|d| d.kind == DiagKind::UnsupportedConstruct));
    }

    #[test]
    fn test_call_on_parenthesized_callee() {
        let src = "fn helper(): i64 { return 1; } fn main(): i64 { return (helper)(); }";
        let tokens = Lexer::new(src).tokenize();
        let ast = parse(tokens);
        let module = ast.node(ast.root);
        let decls = ast.module_decls(module);
        let module_fns: Vec<(String, u32)> = decls
            .iter()
            .map(|&idx| (ast.token_text(ast.node(idx).main_token).unwrap().to_string(), idx))
            .collect();
        let (mir, diags) = lower_ast_fn(&ast, decls[1], &module_fns);
        assert!(diags.is_empty());
        assert!(mir.instructions.iter().any(|i| i.tag == MirInstTag::Call));
    }
}
