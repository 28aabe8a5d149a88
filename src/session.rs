//! The `Lox` session: scan → parse → resolve → interpret, for whole files
//! and for REPL lines.
//!
//! A session owns one interpreter for its whole life, so globals defined on
//! one REPL line are visible on the next. It also owns the expression‑id
//! counter: every parse continues numbering where the previous one stopped,
//! keeping resolver annotations from different lines apart.

use std::io::{BufRead, Write};

use log::{error, info};

use crate::error::{LoxError, Result};
use crate::interpreter::Interpreter;
use crate::parser::Parser;
use crate::resolver::Resolver;
use crate::scanner::Scanner;
use crate::stmt::Stmt;
use crate::value::Value;

/// Line that ends an interactive session.
pub const EXIT_COMMAND: &str = "exit";

pub struct Lox {
    interpreter: Interpreter,
    next_id: usize,
}

impl Default for Lox {
    fn default() -> Self {
        Self::new()
    }
}

impl Lox {
    /// A session printing to stdout.
    pub fn new() -> Self {
        Self::from_interpreter(Interpreter::new())
    }

    /// A session whose `print` output goes to `output`.
    pub fn with_output(output: Box<dyn Write>) -> Self {
        Self::from_interpreter(Interpreter::with_output(output))
    }

    fn from_interpreter(interpreter: Interpreter) -> Self {
        info!("Lox session created");

        Self {
            interpreter,
            next_id: 0,
        }
    }

    pub fn set_repl_mode(&mut self, repl_mode: bool) {
        self.interpreter.set_repl_mode(repl_mode);
    }

    /// Value of the most recent top‑level expression statement.
    pub fn last_value(&self) -> &Value {
        self.interpreter.last_value()
    }

    /// Run a whole program. The first scan or parse error halts the run;
    /// nothing executes unless the whole program resolves.
    pub fn run(&mut self, source: &str) -> Result<()> {
        let (tokens, scan_errors) = Scanner::new(source).scan_tokens();

        if let Some(first) = scan_errors.into_iter().next() {
            return Err(first);
        }

        let mut parser = Parser::with_id_base(&tokens, self.next_id);
        let parsed = parser.parse();
        self.next_id = parser.id_watermark();

        self.resolve_and_interpret(&parsed?)
    }

    /// Run one interactive line. Every scan and syntax error on the line is
    /// reported, scan errors first; if there were any, nothing runs.
    pub fn run_line(&mut self, source: &str) -> std::result::Result<(), Vec<LoxError>> {
        let (tokens, mut errors) = Scanner::new(source).scan_tokens();

        let mut parser = Parser::with_id_base(&tokens, self.next_id);
        let (statements, parse_errors) = parser.parse_recovering();
        self.next_id = parser.id_watermark();

        errors.extend(parse_errors);

        if !errors.is_empty() {
            return Err(errors);
        }

        self.resolve_and_interpret(&statements).map_err(|e| vec![e])
    }

    /// Read‑eval‑print over `input` until end of input or `exit`. Errors are
    /// reported to `errors` and the session carries on.
    pub fn repl<R: BufRead, W: Write>(&mut self, input: R, mut errors: W) -> Result<()> {
        info!("Starting REPL");

        self.set_repl_mode(true);

        let mut lines = input.lines();

        loop {
            write!(errors, "> ")?;
            errors.flush()?;

            let Some(line) = lines.next() else {
                writeln!(errors)?;
                break;
            };
            let line: String = line?;

            if line.trim() == EXIT_COMMAND {
                break;
            }

            if let Err(failures) = self.run_line(&line) {
                for failure in failures {
                    error!("REPL line failed: {}", failure);
                    writeln!(errors, "{}", failure)?;
                }
            }
        }

        info!("Exiting REPL");

        Ok(())
    }

    fn resolve_and_interpret(&mut self, statements: &[Stmt]) -> Result<()> {
        let locals = Resolver::new().resolve(statements)?;
        self.interpreter.add_locals(locals);

        self.interpreter.interpret(statements)
    }
}
