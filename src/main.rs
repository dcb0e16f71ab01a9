// File: src/main.rs
//
// CLI driver: `run <path>` executes a file, bare invocation (or `repl`)
// enters the interactive shell. Exit codes: 0 OK, 65 compile error, 70
// runtime error.

mod chunk;
mod compiler;
mod errors;
mod gc;
mod natives;
mod object;
mod repl;
mod scanner;
mod table;
mod value;
mod vm;

use clap::{Parser as ClapParser, Subcommand};
use std::fs;
use std::path::PathBuf;
use vm::{InterpretResult, Vm};

const EXIT_OK: i32 = 0;
const EXIT_COMPILE_ERROR: i32 = 65;
const EXIT_RUNTIME_ERROR: i32 = 70;

#[derive(ClapParser)]
#[command(
    name = "loxide",
    about = "Loxide: a tree-less, single-pass bytecode interpreter",
    version = env!("CARGO_PKG_VERSION"),
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a script file
    Run {
        /// Path to the source file
        file: PathBuf,
    },
    /// Launch the interactive REPL
    Repl,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run { file }) => run_file(&file),
        Some(Commands::Repl) | None => run_repl(),
    }
}

fn run_file(path: &PathBuf) {
    let source = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Could not read file '{}': {e}", path.display());
            std::process::exit(EXIT_RUNTIME_ERROR);
        }
    };

    let mut vm = Vm::new();
    let result = vm.interpret(&source);
    let called_exit = vm.should_exit;
    let errors = std::mem::take(&mut vm.last_errors);
    drop(vm);

    if called_exit {
        std::process::exit(EXIT_OK);
    }

    match result {
        InterpretResult::Ok => std::process::exit(EXIT_OK),
        InterpretResult::CompileError => {
            eprint!("{}", errors::render_compile_errors(&errors));
            std::process::exit(EXIT_COMPILE_ERROR);
        }
        InterpretResult::RuntimeError => {
            eprint!("{}", errors::render_runtime_fault(&errors[0]));
            std::process::exit(EXIT_RUNTIME_ERROR);
        }
    }
}

fn run_repl() {
    match repl::Repl::new() {
        Ok(mut repl) => {
            if let Err(e) = repl.run() {
                eprintln!("REPL error: {e}");
                std::process::exit(EXIT_RUNTIME_ERROR);
            }
        }
        Err(e) => {
            eprintln!("Failed to start REPL: {e}");
            std::process::exit(EXIT_RUNTIME_ERROR);
        }
    }
}
