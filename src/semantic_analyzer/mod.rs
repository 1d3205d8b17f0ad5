pub mod analyzer;
pub mod namespace;
pub mod types;
#[cfg(test)]
mod tests_semantic;

use std::fmt;

use thiserror::Error;

use crate::ast::ast_def::{BinOp, Pos};
use types::TypeDesc;

pub use analyzer::{analyze_program, prepare_global_scope, AnalyzeSemantics};

/// What went wrong. The rendered message never includes the position;
/// `SemanticError` appends it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SemanticErrorKind {
    #[error("identifier {0} is not declared")]
    IdentNotFound(String),
    #[error("identifier {0} is already declared")]
    AlreadyDeclared(String),
    #[error("unknown type {0}")]
    UnknownType(String),
    #[error("operator {op} is not applicable to {left} and {right}")]
    IncompatibleOperands { op: BinOp, left: TypeDesc, right: TypeDesc },
    #[error("cannot convert {from} to {to}")]
    CannotConvert { from: TypeDesc, to: TypeDesc },
    #[error("{0} is not a function")]
    NotCallable(String),
    #[error("{0} is not an array")]
    NotAnArray(String),
    #[error("function {name} expects {expected} arguments, got {actual}")]
    ArityMismatch { name: String, expected: usize, actual: usize },
    #[error("invalid arguments of {name}: {details}; expected ({expected}), got ({actual})")]
    ArgumentTypeMismatch { name: String, details: String, expected: String, actual: String },
    #[error("return outside of a function")]
    ReturnOutsideFunction,
    #[error("nested function declaration is not allowed")]
    NestedFunction,
    #[error("when without an else branch")]
    MissingElseBranch,
}

/// A semantic error with the offending node's source position, when known.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticError {
    pub kind: SemanticErrorKind,
    pub pos: Option<Pos>,
}

impl SemanticError {
    pub fn new(kind: SemanticErrorKind, pos: Option<Pos>) -> Self {
        Self { kind, pos }
    }
}

impl fmt::Display for SemanticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(pos) = self.pos {
            write!(f, " ({})", pos)?;
        }
        Ok(())
    }
}

impl std::error::Error for SemanticError {}

pub type SemResult<T> = std::result::Result<T, SemanticError>;
