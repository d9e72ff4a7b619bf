//! The lib crate for a Lox bytecode compiler and interpreter.
//!
//! Source text flows through three phases: the [`scanner`] produces a lazy
//! token stream, the [`compiler`] turns it into a bytecode [`vm::Chunk`],
//! and the [`vm`] executes the chunk against an operand stack and a table
//! of globals.
#![warn(missing_debug_implementations, missing_docs, rust_2018_idioms)]

/// vm is the bits about running code.
pub mod vm;

/// scanner scans!
pub mod scanner;

/// Takes tokens from the scanner and emits bytecode.
pub mod compiler;

use std::io;

/// End-to-end hook-up of the whole interpreter.
/// State is not preserved between calls.
pub fn interpret(source: &str) -> Result<(), vm::LoxError> {
    interpret_with_output(source, io::stdout())
}

/// Like [`interpret`], but program output goes to `out` instead of stdout.
/// Compile and runtime diagnostics still go to stderr.
pub fn interpret_with_output<W: io::Write>(source: &str, out: W) -> Result<(), vm::LoxError> {
    let tokens = scanner::Scanner::new(source);
    match compiler::compile(tokens) {
        None => Err(vm::LoxError::CompileError),
        Some((chunk, heap)) => vm::Vm::with_output(chunk, heap, out).interpret(),
    }
}
