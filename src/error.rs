//! Centralised error hierarchy for the **glox interpreter**.
//!
//! All passes (scanner, parser, resolver, runtime) convert their failure modes
//! into one of the variants defined here. This gives a uniform `Result<T>`
//! alias throughout the crate and lets the CLI wrap everything in `anyhow`.
//!
//! The module **does not** print diagnostics itself.

use std::io;
use thiserror::Error;

use log::info;

use crate::token::{Token, TokenType};

/// Canonical error type used throughout the interpreter.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoxError {
    /// Lexical (scanner) error with source line information.
    #[error("[line {line}] Error: {message}")]
    Lex {
        /// Human‑readable description.
        message: String,

        /// 1‑based line where the error occurred.
        line: usize,
    },

    /// Syntactic (parser) error.
    #[error("[line {line}] Error{location}: {message}")]
    Parse {
        message: String,
        line: usize,
        /// ` at 'lexeme'` or ` at end`.
        location: String,
    },

    /// Static resolution failure (scoping rules, misuse of `this`/`super`, …).
    #[error("[line {line}] Error{location}: {message}")]
    Resolve {
        message: String,
        line: usize,
        location: String,
    },

    /// Runtime evaluation error.
    #[error("{source}\n[line {line}]")]
    Runtime { source: RuntimeError, line: usize },

    /// Wrapper around `std::io::Error` (transparent). Enables `?` on I/O ops.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// UTF‑8 decoding failure when ingesting external text.
    #[error(transparent)]
    Utf8(#[from] std::str::Utf8Error),
}

/// The ways evaluation of a well-formed program can fail.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("Operand must be a number.")]
    OperandNotNumber,

    #[error("Operands must be numbers.")]
    OperandsNotNumbers,

    #[error("Operands must be two numbers or two strings.")]
    OperandsNotNumbersOrStrings,

    #[error("Undefined variable '{0}'.")]
    UndefinedVariable(String),

    #[error("Undefined property '{0}'.")]
    UndefinedProperty(String),

    #[error("Can only call functions and classes.")]
    NotCallable,

    #[error("Expected {expected} arguments but got {got}.")]
    ArityMismatch { expected: usize, got: usize },

    #[error("Only instances have properties.")]
    NotAnInstance,

    #[error("Only instances have fields.")]
    FieldOnNonInstance,

    #[error("Superclass must be a class.")]
    SuperclassNotClass,

    /// The resolver and the runtime disagree about the environment chain.
    #[error("No enclosing scope at distance {distance} for '{name}'.")]
    ScopeMismatch { distance: usize, name: String },

    #[error("Can't return from top-level code.")]
    TopLevelReturn,

    #[error("Native function '{name}' failed: {message}")]
    Native { name: String, message: String },
}

/// Renders where in the source a token‑anchored error occurred.
fn location(token: &Token) -> String {
    if token.token_type == TokenType::EOF {
        " at end".to_string()
    } else {
        format!(" at '{}'", token.lexeme)
    }
}

impl LoxError {
    /// Helper constructor for the **scanner**.
    pub fn lex<S: Into<String>>(line: usize, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Lex error: line={}, msg={}", line, message);

        LoxError::Lex { message, line }
    }

    /// Helper constructor for the **parser**, anchored on the offending token.
    pub fn parse<S: Into<String>>(token: &Token, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Parse error: line={}, msg={}", token.line, message);

        LoxError::Parse {
            message,
            line: token.line,
            location: location(token),
        }
    }

    /// Helper constructor for the **resolver**.
    pub fn resolve<S: Into<String>>(token: &Token, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Resolve error: line={}, msg={}", token.line, message);

        LoxError::Resolve {
            message,
            line: token.line,
            location: location(token),
        }
    }

    /// Helper constructor for the **interpreter**.
    pub fn runtime(line: usize, source: RuntimeError) -> Self {
        info!("Creating Runtime error: line={}, err={}", line, source);

        LoxError::Runtime { source, line }
    }

    /// The dynamic failure kind, if this is a runtime error.
    pub fn runtime_kind(&self) -> Option<&RuntimeError> {
        match self {
            LoxError::Runtime { source, .. } => Some(source),
            _ => None,
        }
    }

    /// True for errors raised before any statement runs (scan, parse, resolve).
    pub fn is_static(&self) -> bool {
        matches!(
            self,
            LoxError::Lex { .. } | LoxError::Parse { .. } | LoxError::Resolve { .. }
        )
    }
}

/// Crate‑wide `Result` alias.
pub type Result<T> = std::result::Result<T, LoxError>;
