use std::fmt;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WarningKind {
    LiteralOutOfRange,
    DummyConstant,
    DummyVariable,
}

impl Warning {
    pub fn new(kind: WarningKind, message: String) -> Self {
        Self { kind, message }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Structural error: {0}")]
    Structural(String),

    #[error("Guardedness error: {0}")]
    Guardedness(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Input error: {0}")]
    Input(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Input(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Input(e.to_string())
    }
}
