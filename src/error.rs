use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Failures raised while monitoring a single target.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("timed out after {timeout:?} fetching certificate from {endpoint}")]
    Timeout { endpoint: String, timeout: Duration },

    #[error("connection to {endpoint} failed: {cause}")]
    ConnectionError { endpoint: String, cause: String },

    #[error("malformed certificate: {0}")]
    MalformedCertificate(String),

    #[error("notification dispatch failed: {0}")]
    DispatchError(String),

    #[error("cancelled before {endpoint} completed")]
    Cancelled { endpoint: String },
}

impl MonitorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MonitorError::Timeout { .. } => ErrorKind::Timeout,
            MonitorError::ConnectionError { .. } => ErrorKind::ConnectionError,
            MonitorError::MalformedCertificate(_) => ErrorKind::MalformedCertificate,
            MonitorError::DispatchError(_) => ErrorKind::DispatchError,
            MonitorError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    pub fn connection(endpoint: impl Into<String>, cause: impl fmt::Display) -> Self {
        MonitorError::ConnectionError {
            endpoint: endpoint.into(),
            cause: cause.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Timeout,
    ConnectionError,
    MalformedCertificate,
    DispatchError,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Timeout => "Timeout",
            ErrorKind::ConnectionError => "ConnectionError",
            ErrorKind::MalformedCertificate => "MalformedCertificate",
            ErrorKind::DispatchError => "DispatchError",
            ErrorKind::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

/// Startup configuration problems. These abort the process before any target runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },

    #[error("missing required setting: {0}")]
    Missing(String),
}
