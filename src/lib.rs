//! Front-end and mid-end for a small statically-typed imperative
//! language: lexer, Pratt parser, flat AST, and AST-to-MIR lowering.
//!
//! The pipeline is strictly forward: bytes → tokens → AST → MIR →
//! (`Module` → external codegen). See [`compile_module`] for the
//! library-level entry point the driver binary wraps.

pub mod ast;
pub mod diagnostic;
pub mod lexer;
pub mod lower;
pub mod mir;
pub mod module;
pub mod parser;
pub mod span;
pub mod token;
pub mod types;

use ast::Ast;
use diagnostic::Diagnostic;
use mir::Mir;
use module::Module;

/// Lexes and parses `source` into an `Ast`. Never fails outright — a
/// malformed program still produces an `Ast` plus diagnostics (§7);
/// callers decide whether to proceed to lowering.
pub fn parse_source(source: &str) -> Ast {
    log::debug!("lexing {} bytes", source.len());
    let tokens = lexer::Lexer::new(source).tokenize();
    log::debug!("lexed {} tokens", tokens.len());
    log::debug!("parsing token stream");
    let ast = parser::parse(tokens);
    log::debug!("parsed, {} diagnostics", ast.diagnostics.len());
    ast
}

/// Builds a `Module` from a parsed `Ast` and lowers every declaration
/// to MIR, accumulating diagnostics across all of them before the
/// caller decides pass/fail (§4.4: one function's undefined reference
/// must not hide a sibling function's error).
pub fn compile_module(ast: &Ast, module_name: String) -> (Module, Vec<(String, Mir)>, Vec<Diagnostic>) {
    let module = Module::from_ast(ast, module_name);
    let fn_table = module.fn_table();
    let mut mirs = Vec::with_capacity(module.decls.len());
    let mut diagnostics = Vec::new();

    for decl in &module.decls {
        log::debug!("lowering '{}'", decl.name);
        let (mir, decl_diags) = decl.mir(ast, &fn_table);
        log::debug!("lowered '{}': {} instructions, {} diagnostics", decl.name, mir.instructions.len(), decl_diags.len());
        diagnostics.extend(decl_diags);
        mirs.push((decl.name.clone(), mir));
    }

    (module, mirs, diagnostics)
}
