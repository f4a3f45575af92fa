use thiserror::Error;

/// Structural failures of the form and feature engine.
///
/// "Not enough history" is deliberately absent: that case is an `Option::None`
/// from the calculator and the assembler, never an error.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("malformed match record {id}: {reason}")]
    MalformedRecord { id: String, reason: String },

    #[error("lookback must be a positive match count, got {0}")]
    InvalidLookback(usize),

    #[error("feature contract mismatch: {0}")]
    ContractMismatch(String),

    #[error("classifier returned invalid probabilities: {0}")]
    InvalidProbabilities(String),

    #[error("cannot fit on an empty training set")]
    EmptyTrainingSet,
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
