use std::fmt;

use thiserror::Error;

use crate::engine::EngineFault;

/// High-level error type shared across cadprop components.
///
/// Categories follow the failure taxonomy of the write workflow: connection
/// acquisition, input validation, document structure, faults raised by the
/// late-bound automation interface, and plain I/O or serialization problems.
#[derive(Debug, Error)]
pub enum CadpropError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("structure error: {0}")]
    Structure(String),
    #[error("engine fault: {0}")]
    Engine(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for CadpropError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<EngineFault> for CadpropError {
    fn from(fault: EngineFault) -> Self {
        Self::Engine(fault.to_string())
    }
}

impl CadpropError {
    pub fn context<T: fmt::Display>(self, ctx: T) -> Self {
        match self {
            CadpropError::Connection(msg) => CadpropError::Connection(format!("{ctx}: {msg}")),
            CadpropError::Validation(msg) => CadpropError::Validation(format!("{ctx}: {msg}")),
            CadpropError::Structure(msg) => CadpropError::Structure(format!("{ctx}: {msg}")),
            CadpropError::Engine(msg) => CadpropError::Engine(format!("{ctx}: {msg}")),
            CadpropError::Serialization(msg) => {
                CadpropError::Serialization(format!("{ctx}: {msg}"))
            }
            CadpropError::Io(err) => {
                CadpropError::Io(std::io::Error::new(err.kind(), format!("{ctx}: {err}")))
            }
        }
    }
}
