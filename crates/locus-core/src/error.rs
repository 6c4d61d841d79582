use thiserror::Error;

/// Canonical result for core and planner.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Schema error: {0}")]
    Schema(String),

    /// The input tree has a shape the planner cannot derive
    /// (unknown column, mismatched join-key arity, empty union, ...).
    #[error("Planning error: {0}")]
    Plan(String),

    /// The catalog or location registry cannot satisfy a request. The query
    /// is unschedulable; callers must not retry with the same inputs.
    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Hashing error: {0}")]
    Hash(String),

    #[error("Internal invariant failed: {0}")]
    Invariant(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Hash(e.to_string())
    }
}
