use std::fmt;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 443;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Target {
            host: host.into(),
            port,
            timeout,
        }
    }

    #[cfg(test)]
    pub fn with_defaults(host: impl Into<String>) -> Self {
        Target::new(host, DEFAULT_PORT, DEFAULT_TIMEOUT)
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Two targets are the same endpoint when host and port match; timeout is not part of identity.
    pub fn same_endpoint(&self, other: &Target) -> bool {
        self.host == other.host && self.port == other.port
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
