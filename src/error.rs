use std::process::ExitCode;

use crate::namepool::NamePoolError;
use crate::protocol::ParseError;
use crate::respawn::StateError;

/// Errors that cause witness to exit with a specific code.
#[derive(Debug, thiserror::Error)]
pub enum ExitError {
    #[error("config error: {0}")]
    Config(String),

    #[error("name pool: {0}")]
    NamePool(#[from] NamePoolError),

    #[error("state: {0}")]
    State(#[from] StateError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("{message}")]
    WithCode { code: u8, message: String },

    #[error("{0}")]
    Other(String),
}

impl ExitError {
    pub const fn new(code: u8, message: String) -> Self {
        Self::WithCode { code, message }
    }

    /// Numeric process exit status for this error.
    pub const fn code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::NamePool(_) => 3,
            Self::State(_) => 4,
            Self::Parse(_) => 5,
            Self::WithCode { code, .. } => *code,
            Self::Other(_) => 1,
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }
}
