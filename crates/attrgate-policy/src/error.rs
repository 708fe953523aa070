//! Policy parse errors.

use thiserror::Error;

/// What went wrong while parsing a policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("policy is empty")]
    Empty,

    #[error("unknown character {0:?}")]
    UnknownCharacter(char),

    #[error("unexpected token `{0}`")]
    UnexpectedToken(String),

    #[error("unexpected end of policy")]
    UnexpectedEnd,

    #[error("unbalanced parenthesis")]
    UnbalancedParenthesis,

    /// A comparator was applied to something other than `date`.
    #[error("comparisons are only supported on `date`, found `{0}`")]
    UnsupportedComparisonField(String),

    #[error("expected an integer literal after comparator")]
    ExpectedInteger,

    #[error("integer literal `{0}` is out of range")]
    IntegerOverflow(String),

    #[error("threshold {k} of {n} is out of range")]
    ThresholdOutOfRange { k: u64, n: usize },

    #[error("policy nests deeper than {0} levels")]
    TooDeep(usize),
}

/// A policy was rejected at parse time.
///
/// `position` is the byte offset of the offending token in the input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("policy parse error at byte {position}: {kind}")]
pub struct PolicyParseError {
    pub position: usize,
    pub kind: ParseErrorKind,
}

impl PolicyParseError {
    pub(crate) fn new(position: usize, kind: ParseErrorKind) -> Self {
        Self { position, kind }
    }
}

/// Result type for policy parsing.
pub type Result<T> = std::result::Result<T, PolicyParseError>;
