pub mod code_builder;
pub mod generator;
#[cfg(test)]
mod tests_msil;

use thiserror::Error;

pub use generator::generate_program;

/// Internal-error conditions: code generation ran over a tree that semantic
/// analysis never decorated, or a label escaped the finalization pass. These
/// are programming errors and always propagate.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GenError {
    #[error("code generation reached an expression without a resolved type")]
    UnresolvedType,
    #[error("code generation reached an identifier without a resolved declaration")]
    UnresolvedIdent,
    #[error("branch target used before label resolution")]
    UnresolvedLabel,
}

pub type GenResult<T> = std::result::Result<T, GenError>;
