//! Front end: source text to verified LIR (spec §4).
//!
//! `compile` runs the full pipeline — lex, parse, HIR build, LIR lowering,
//! per-function bytecode verification — and is the single entry point the
//! rest of the workspace (`noct-vm`, `noct-codegen`, `noct-cli`) calls.

pub mod ast;
pub mod hir;
pub mod lexer;
pub mod lower;
pub mod parser;
pub mod token;

use noct_core::lir::LirModule;
use thiserror::Error;

pub use ast::Program;
pub use hir::HirModule;
pub use lexer::Lexer;
pub use lower::LowerError;
pub use parser::Parser;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{0}")]
    Lex(#[from] lexer::LexError),
    #[error("{0}")]
    Parse(#[from] parser::ParseError),
    #[error("{0}")]
    Hir(#[from] hir::HirError),
    #[error("{0}")]
    Lower(#[from] lower::LowerError),
    #[error("bytecode verification failed for function '{function}'")]
    Verify { function: String },
}

impl CompileError {
    /// Best-effort source line for diagnostics; `0` when the error has no
    /// single originating line (e.g. a post-lowering verification failure).
    pub fn line(&self) -> u32 {
        match self {
            CompileError::Lex(e) => e.line(),
            CompileError::Parse(e) => e.line(),
            CompileError::Hir(e) => e.line(),
            CompileError::Lower(_) | CompileError::Verify { .. } => 0,
        }
    }
}

/// Runs the full front end over `source`, named `source_name` for
/// diagnostics and the resulting module header, producing a verified
/// [`LirModule`] ready for the interpreter or a code-generation back end.
pub fn compile(source_name: &str, source: &str) -> Result<LirModule, CompileError> {
    let tokens = Lexer::new(source).tokenize()?;
    let program = Parser::new(tokens).parse_program()?;
    let hir = hir::build(source_name, &program)?;
    let lir = lower::lower_module(&hir)?;
    for func in &lir.functions {
        func.verify().map_err(|_| CompileError::Verify { function: func.name.clone() })?;
    }
    Ok(lir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_a_small_program_to_verified_bytecode() {
        let src = "func main(){ var x = 1; var y = 2; return x + y; }";
        let module = compile("test.noct", src).unwrap();
        assert_eq!(module.functions.len(), 1);
        assert!(module.functions[0].verify().is_ok());
    }

    #[test]
    fn hoists_lambda_into_its_own_function() {
        let src = "func main(){ var f = lambda(a)=>{ return a + 1; }; return f(2); }";
        let module = compile("test.noct", src).unwrap();
        assert!(module.functions.iter().any(|f| f.name == "$lambda0"));
    }

    #[test]
    fn rejects_break_outside_loop() {
        let src = "func main(){ break; }";
        let err = compile("test.noct", src).unwrap_err();
        assert!(matches!(err, CompileError::Hir(_)));
    }

    #[test]
    fn syntax_error_is_reported_with_line() {
        let src = "func main(){ 1 + ; }";
        let err = compile("test.noct", src).unwrap_err();
        assert!(matches!(err, CompileError::Parse(_)));
    }
}
