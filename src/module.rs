//! Module/Decl bookkeeping (§3 "Module and Decl"): the unit handed to
//! the external codegen backend. Pure bookkeeping over the AST and MIR
//! this crate already produces — no new parsing or lowering semantics.

use std::cell::RefCell;

use crate::ast::Ast;
use crate::diagnostic::Diagnostic;
use crate::lower::lower_ast_fn;
use crate::mir::Mir;

/// One compiled top-level function: its name, its AST index, and its
/// (possibly not-yet-computed) `Mir`.
pub struct Decl {
    pub name: String,
    pub ast_index: u32,
    mir: RefCell<Option<Mir>>,
}

impl Decl {
    fn new(name: String, ast_index: u32) -> Self {
        Self { name, ast_index, mir: RefCell::new(None) }
    }

    /// Lowers this declaration to MIR the first time it's asked for,
    /// caching the result for subsequent calls. Diagnostics are only
    /// returned from the lowering call that actually ran.
    pub fn mir(&self, ast: &Ast, module_fns: &[(String, u32)]) -> (Mir, Vec<Diagnostic>) {
        if let Some(cached) = self.mir.borrow().as_ref() {
            return (cached.clone(), Vec::new());
        }
        let (mir, diagnostics) = lower_ast_fn(ast, self.ast_index, module_fns);
        *self.mir.borrow_mut() = Some(mir.clone());
        (mir, diagnostics)
    }
}

/// The named collection of `Decl`s handed to the codegen collaborator.
pub struct Module {
    pub name: String,
    pub decls: Vec<Decl>,
}

impl Module {
    /// Walks the AST's `MODULE` node's declaration list, building one
    /// `Decl` per `NAMED_FN`.
    pub fn from_ast(ast: &Ast, name: String) -> Self {
        let module_node = ast.node(ast.root);
        let decls = ast
            .module_decls(module_node)
            .iter()
            .map(|&fn_idx| {
                let named_fn = ast.node(fn_idx);
                let fn_name = ast.token_text(named_fn.main_token).unwrap_or("").to_string();
                Decl::new(fn_name, fn_idx)
            })
            .collect();
        Self { name, decls }
    }

    pub fn find_decl(&self, name: &str) -> Option<&Decl> {
        self.decls.iter().find(|d| d.name == name)
    }

    /// The `(name, ast_index)` list every `Decl`'s lowering pass needs
    /// to resolve calls against its siblings.
    pub fn fn_table(&self) -> Vec<(String, u32)> {
        self.decls.iter().map(|d| (d.name.clone(), d.ast_index)).collect()
    }
}

/// The narrow interface the external codegen backend implements.
/// Neither method is implemented in this crate (§1, §6) — providing a
/// real implementation is out of scope here.
pub trait CodegenBackend {
    fn emit_llvm_ir(&self, module: &Module) -> std::io::Result<String>;
    fn emit_object(&self, module: &Module) -> std::io::Result<Vec<u8>>;
}
