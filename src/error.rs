use crate::ibg::OracleFailure;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Oracle(#[from] OracleFailure),

    #[error("Graph inconsistency: {0}")]
    GraphInconsistency(String),

    #[error("Wait interrupted by cancellation")]
    Interrupted,

    #[error("Construction of statement {statement} was aborted")]
    ConstructionAborted { statement: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    pub fn error_code(&self) -> i32 {
        match self {
            Error::Io(_) => -1,
            Error::Oracle(_) => -2,
            Error::GraphInconsistency(_) => -3,
            Error::Interrupted => -4,
            Error::ConstructionAborted { .. } => -5,
            Error::Config(_) => -6,
            Error::Serialization(_) => -7,
        }
    }

    /// Whether this error only affects the statement whose graph raised it.
    pub fn is_statement_local(&self) -> bool {
        matches!(
            self,
            Error::Oracle(_) | Error::ConstructionAborted { .. } | Error::Interrupted
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
