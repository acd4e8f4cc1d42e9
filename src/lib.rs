pub mod ast;
pub mod diagnostic;
pub mod parser;
pub mod resolver;
pub mod tokenizer;
pub mod tree_walk_interpreter;

use std::{cell::RefCell, io::Write, rc::Rc};

use ast::{ExprIds, Program};
use diagnostic::Diagnostics;
use resolver::Resolver;
use tree_walk_interpreter::{ExecutionError, Interpreter};

#[derive(Debug, thiserror::Error)]
pub enum LoxError {
    #[error("{0}")]
    Static(Diagnostics),
    #[error(transparent)]
    Runtime(#[from] ExecutionError),
}

impl LoxError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoxError::Static(_) => 65,
            LoxError::Runtime(ExecutionError::Runtime { .. }) => 70,
            LoxError::Runtime(ExecutionError::Io(_)) => 74,
        }
    }
}

/// One interpreter session. Globals and expression ids persist across calls
/// to [`Lox::run`], which is what the REPL relies on.
#[derive(Debug, Default)]
pub struct Lox {
    interpreter: Interpreter,
    ids: ExprIds,
}

impl Lox {
    pub fn new(stdout: Rc<RefCell<dyn Write>>) -> Self {
        Self {
            interpreter: Interpreter::new(stdout),
            ids: ExprIds::default(),
        }
    }

    /// Scans and parses `source`, failing if either stage reported an error.
    pub fn parse(&mut self, source: &str) -> Result<Program, Diagnostics> {
        let mut diagnostics = Diagnostics::default();
        let tokens = tokenizer::tokens(source, &mut diagnostics);
        tracing::debug!(tokens = tokens.len(), "scanned");

        let program = parser::program(&tokens, &mut self.ids, &mut diagnostics);
        tracing::debug!(statements = program.0.len(), "parsed");

        if diagnostics.has_errors() {
            return Err(diagnostics);
        }
        Ok(program)
    }

    pub fn run(&mut self, source: &str) -> Result<(), LoxError> {
        let program = self.parse(source).map_err(LoxError::Static)?;

        let mut diagnostics = Diagnostics::default();
        let locals = Resolver::new(&mut diagnostics).resolve(&program);
        tracing::debug!(locals = locals.len(), "resolved");
        if diagnostics.has_errors() {
            return Err(LoxError::Static(diagnostics));
        }

        self.interpreter.resolve(locals);
        self.interpreter.interpret(&program)?;
        Ok(())
    }
}
