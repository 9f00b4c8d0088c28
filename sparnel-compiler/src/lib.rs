//! Front end of the Sparnel language: lexer, recursive-descent parser and
//! the bytecode compiler.
//!
//! Source text flows through [`Lexer`] into tokens, through [`Parser`] into
//! a typed AST, and through [`Compiler`] into a
//! [`Program`](sparnel_asm::Program) — a register-machine instruction
//! stream plus its local symbol table.

#![warn(missing_docs)]

pub mod ast;
mod compiler;
mod error;
mod lexer;
mod parser;

pub use compiler::Compiler;
pub use error::CompileError;
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::Parser;

use sparnel_asm::Program;

/// Compile a source unit into a program.
pub fn compile_source(source: &str) -> Result<Program, CompileError> {
    let ast = parse_source(source)?;
    Compiler::new().compile(&ast)
}

/// Compile a bare expression by wrapping it into a synthesized
/// `return <expr>;` unit.
pub fn compile_expression(source: &str) -> Result<Program, CompileError> {
    let tokens = Lexer::new(source).tokenize()?;
    let expr = Parser::new(tokens).parse_expression()?;
    let span = expr.span;
    let ast = vec![ast::Stmt {
        kind: ast::StmtKind::Return(Some(expr)),
        span,
    }];
    Compiler::new().compile(&ast)
}

/// Parse a source unit into its AST.
pub fn parse_source(source: &str) -> Result<Vec<ast::Stmt>, CompileError> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(tokens).parse_program()
}
