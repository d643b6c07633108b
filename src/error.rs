//! Error types for veth-kube

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid state: resource {0} is not in use")]
    InvalidState(String),

    #[error("resource busy: {0} is currently in use")]
    ResourceBusy(String),

    #[error("pool is closed")]
    PoolClosed,

    #[error("acquire timed out after {0:?}")]
    AcquireTimeout(Duration),

    #[error("network error: {0}")]
    Network(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error means the caller gave up waiting
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::AcquireTimeout(_))
    }
}
