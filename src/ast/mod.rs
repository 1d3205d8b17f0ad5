pub mod ast_def;
#[cfg(test)]
mod tests_ast;

use std::fmt;

use lalrpop_util::lalrpop_mod;

lalrpop_mod! {
    #[allow(clippy::all)]
    pub grammar, "/ast/grammar.rs"
}

use ast_def::{LineIndex, Pos, StmtListNode};

/// Syntax error reported by the parsing front end.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub pos: Option<Pos>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(pos) = self.pos {
            write!(f, " ({})", pos)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

impl ParseError {
    fn from_lalrpop(
        err: lalrpop_util::ParseError<usize, lalrpop_util::lexer::Token<'_>, &str>,
        lines: &LineIndex,
    ) -> Self {
        use lalrpop_util::ParseError::*;
        match err {
            InvalidToken { location } => Self {
                message: "invalid token".to_string(),
                pos: Some(lines.pos(location)),
            },
            UnrecognizedEof { location, .. } => Self {
                message: "unexpected end of input".to_string(),
                pos: Some(lines.pos(location)),
            },
            UnrecognizedToken { token: (start, token, _), .. } => Self {
                message: format!("unexpected token {}", token),
                pos: Some(lines.pos(start)),
            },
            ExtraToken { token: (start, token, _) } => Self {
                message: format!("extra token {}", token),
                pos: Some(lines.pos(start)),
            },
            User { error } => Self { message: error.to_string(), pos: None },
        }
    }
}

/// Parses a whole program into its root statement list.
pub fn parse(src: &str) -> Result<StmtListNode, ParseError> {
    let lines = LineIndex::new(src);
    grammar::ProgramParser::new()
        .parse(&lines, src)
        .map_err(|err| ParseError::from_lalrpop(err, &lines))
}
