//! AST to register-bytecode compiler for muali.
//!
//! The compiler consumes the parser's AST (see [`ast`]), performs
//! per-function scope tracking and scratch register allocation, selects
//! type-specialized opcodes where declarations prove operand types, and
//! emits bytecode through [`muali_asm::Encoder`]. The result is a
//! [`muali_asm::Program`] ready to construct an interpreter from.
//!
//! Compilation is synchronous and all failures are [`CompileError`]s; no
//! bytecode is produced for a function that fails to compile.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

pub mod ast;
mod compile;
pub mod error;
mod expr;
mod opt;
mod scope;

pub use ast::Node;
pub use compile::{compile_func, compile_program};
pub use error::CompileError;
pub use opt::optimize;
