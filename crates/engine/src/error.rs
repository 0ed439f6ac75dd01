use std::fmt;

#[derive(Debug)]
pub enum EngineError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (threshold out of range, negative weight, etc.).
    ConfigValidation(String),
    /// Malformed CSV input.
    CsvParse(String),
    /// Malformed cache document or unknown cache id.
    CacheParse(String),
    /// Host requested cancellation; no partial results are committed.
    Cancelled,
    /// An internal invariant was violated (splitter overflow, finalized
    /// record reappearing). Implementation bug, never an input problem.
    Internal(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::CsvParse(msg) => write!(f, "CSV parse error: {msg}"),
            Self::CacheParse(msg) => write!(f, "cache parse error: {msg}"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Internal(msg) => write!(f, "internal invariant violation: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}
