use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StressError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Cannot open output {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid signing key: {0}")]
    InvalidKey(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("RPC error (status {status}, code {code}): {message}")]
    Rpc {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Funding failed: {0}")]
    Funding(String),

    #[error("Timed out waiting for funding ({funded}/{total} funded after {waited:?})")]
    FundingTimeout {
        funded: usize,
        total: usize,
        waited: Duration,
    },
}

impl StressError {
    pub(crate) fn rpc(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        StressError::Rpc {
            status,
            code: code.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StressError>;
