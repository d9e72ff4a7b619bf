use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;

use lox::vm::LoxError;

/// Bytecode interpreter for the Lox language.
#[derive(Debug, Parser)]
#[command(name = "lox")]
struct Cli {
    /// Script to run; omit for an interactive session.
    script: Option<PathBuf>,
}

// Exit codes per sysexits: usage, bad input, internal failure, I/O.
const EX_USAGE: i32 = 64;
const EX_DATAERR: i32 = 65;
const EX_SOFTWARE: i32 = 70;
const EX_IOERR: i32 = 74;

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit()
        }
        Err(_) => {
            eprintln!("Usage: lox [script]");
            process::exit(EX_USAGE);
        }
    };
    match cli.script {
        Some(path) => process::exit(run_file(&path)),
        None => run_prompt(),
    }
}

fn run_file(path: &Path) -> i32 {
    let source = match std::fs::read_to_string(path)
        .with_context(|| format!("could not read {}", path.display()))
    {
        Ok(source) => source,
        Err(err) => {
            eprintln!("{:#}", err);
            return EX_IOERR;
        }
    };
    match lox::interpret(&source) {
        Ok(()) => 0,
        Err(LoxError::CompileError) => EX_DATAERR,
        Err(LoxError::RuntimeError { .. }) => EX_SOFTWARE,
        Err(err) => {
            // Sink or bytecode faults; already unusual enough to show.
            eprintln!("{}", err);
            EX_SOFTWARE
        }
    }
}

fn run_prompt() {
    let stdin = io::stdin();
    let mut input = String::new();
    loop {
        input.clear();
        print!("> ");
        if let Err(err) = io::stdout().flush() {
            eprintln!("Failed to flush prompt: {}", err);
        }
        match stdin.lock().read_line(&mut input) {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                eprintln!("Failed to read line: {}", err);
                continue;
            }
        }
        let line = input.trim();
        if line.eq_ignore_ascii_case("exit") {
            break;
        }
        // Errors were already reported to stderr by the failing phase;
        // the session keeps going either way.
        let _ = lox::interpret(line);
    }
}
