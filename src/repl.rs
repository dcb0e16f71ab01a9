// File: src/repl.rs
//
// Interactive REPL: a `rustyline`-backed shell (banner, colored prompt,
// special `:`-commands) driving one persistent `Vm` across lines, since
// sequential `interpret` calls need to share globals and the intern table.
// The VM is only rebuilt on an explicit `:reset`.

use crate::vm::{InterpretResult, Vm};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

pub struct Repl {
    vm: Vm,
    editor: DefaultEditor,
}

impl Repl {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let editor = DefaultEditor::new()?;
        Ok(Repl { vm: Vm::new(), editor })
    }

    fn show_banner(&self) {
        println!("{}", "╔══════════════════════════════════════════════════════╗".bright_cyan());
        println!("{}", "║        Loxide REPL — tree-less bytecode VM          ║".bright_cyan());
        println!("{}", "╚══════════════════════════════════════════════════════╝".bright_cyan());
        println!();
        println!(
            "  {} Use {}{}{}{}",
            "Welcome!".bright_green(),
            ":".bright_blue(),
            "help".bright_yellow(),
            " for commands or ".bright_blue(),
            ":quit".bright_yellow()
        );
        println!();
    }

    pub fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.show_banner();

        loop {
            let prompt = "loxide> ".bright_green().to_string();
            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let _ = self.editor.add_history_entry(line.as_str());
                    let trimmed = line.trim();

                    if trimmed.is_empty() {
                        continue;
                    }
                    if trimmed.starts_with(':') {
                        if self.handle_command(trimmed) {
                            continue;
                        } else {
                            break;
                        }
                    }

                    self.eval_line(&line);
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "^C (Ctrl+C to interrupt, :quit to exit)".bright_yellow());
                }
                Err(ReadlineError::Eof) => {
                    println!("{}", "\nGoodbye!".bright_cyan());
                    break;
                }
                Err(err) => {
                    eprintln!("{} {}", "Error:".bright_red(), err);
                    break;
                }
            }

            if self.vm.should_exit {
                break;
            }
        }

        Ok(())
    }

    /// Returns `true` to keep looping, `false` to quit.
    fn handle_command(&mut self, cmd: &str) -> bool {
        match cmd {
            ":help" | ":h" => {
                self.show_help();
                true
            }
            ":quit" | ":q" | ":exit" => {
                println!("{}", "Goodbye!".bright_cyan());
                false
            }
            ":clear" | ":c" => {
                print!("\x1B[2J\x1B[1;1H");
                self.show_banner();
                true
            }
            ":reset" | ":r" => {
                self.vm = Vm::new();
                println!("{}", "Environment reset".bright_green());
                true
            }
            _ => {
                println!(
                    "{} Unknown command: {}. Type {}{}{}",
                    "Error:".bright_red(),
                    cmd.bright_yellow(),
                    ":".bright_blue(),
                    "help".bright_yellow(),
                    " for available commands.".bright_blue()
                );
                true
            }
        }
    }

    fn show_help(&self) {
        println!();
        println!("{}", "REPL Commands:".bright_cyan().bold());
        println!("  {}{}  Display this help message", ":help".bright_yellow(), " or :h   ".dimmed());
        println!("  {}{}  Exit the REPL", ":quit".bright_yellow(), " or :q   ".dimmed());
        println!("  {}{}  Clear the screen", ":clear".bright_yellow(), " or :c  ".dimmed());
        println!("  {}{}  Reset the VM (fresh globals and heap)", ":reset".bright_yellow(), " or :r ".dimmed());
        println!();
        println!("{}", "Navigation:".bright_cyan().bold());
        println!("  {}  Navigate command history", "↑/↓ arrows".bright_blue());
        println!("  {}  Interrupt current input", "Ctrl+C    ".bright_blue());
        println!("  {}  Exit REPL", "Ctrl+D    ".bright_blue());
        println!();
    }

    fn eval_line(&mut self, line: &str) {
        match self.vm.interpret(line) {
            InterpretResult::Ok => {}
            InterpretResult::CompileError => {
                eprint!("{}", crate::errors::render_compile_errors(&self.vm.last_errors));
            }
            InterpretResult::RuntimeError => {
                eprint!("{}", crate::errors::render_runtime_fault(&self.vm.last_errors[0]));
            }
        }
    }
}

impl Default for Repl {
    fn default() -> Self {
        Self::new().expect("Failed to create REPL")
    }
}
