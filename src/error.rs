use thiserror::Error;

/// The input at `position` does not satisfy the attempted rule.
///
/// This is ordinary control flow: a sequence gives up on its remaining
/// children, a choice moves on to its next alternative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[error("no match at offset {position}")]
pub struct NoMatch {
    pub position: usize,
}

impl NoMatch {
    pub fn at(position: usize) -> Self {
        Self { position }
    }
}

/// A rule that cannot be built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarError {
    #[error("literal must not be empty")]
    EmptyLiteral,
    #[error("sequence needs at least one element")]
    EmptySequence,
    #[error("choice needs at least one alternative")]
    EmptyChoice,
    #[error("repetition bounds are inverted: min {min} > max {max}")]
    InvertedBounds { min: usize, max: usize },
    #[error("repetition allows no occurrences")]
    ZeroRepetitions,
}

/// Errors from the pattern notation front end.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("unexpected end of pattern, expected {expected}")]
    UnexpectedEnd { expected: &'static str },
    #[error("unclosed {what} opened at offset {position}")]
    Unclosed { what: &'static str, position: usize },
    #[error("quantifier at offset {position} has nothing to repeat")]
    DanglingQuantifier { position: usize },
    #[error("invalid repetition count at offset {position}")]
    InvalidCount { position: usize },
    #[error("unexpected '{found}' at offset {position}")]
    Unexpected { found: char, position: usize },
    #[error(transparent)]
    Grammar(#[from] GrammarError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Grammar(#[from] GrammarError),
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error(transparent)]
    NoMatch(#[from] NoMatch),
    #[error("input left unconsumed from offset {position}")]
    Incomplete { position: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown strategy '{0}', expected 'interpreted' or 'compiled'")]
pub struct UnknownStrategy(pub String);
