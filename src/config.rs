use log::{info, warn};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::expiry::ThresholdConfig;
use crate::runner::DEFAULT_CONCURRENCY;
use crate::target::{Target, DEFAULT_PORT, DEFAULT_TIMEOUT};

pub const DEFAULT_FROM_EMAIL: &str = "from_email@example.com";

#[derive(Debug, Deserialize)]
struct RawConfig {
    certs: Option<Vec<RawCert>>,
    days_remaining_threshold: Option<i64>,
    sendgrid_api_key: Option<String>,
    notification_contact: Option<String>,
    from_email: Option<String>,
    concurrency: Option<usize>,
    interval_secs: Option<u64>,
    default_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawCert {
    url: String,
    port: Option<u16>,
    timeout_secs: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub targets: Vec<Target>,
    pub threshold: ThresholdConfig,
    pub sendgrid_api_key: String,
    pub notification_contact: String,
    pub from_email: String,
    pub concurrency: usize,
    pub interval: Option<Duration>,
}

/// Settings that may be supplied through the environment (or `.env`) instead of the file.
#[derive(Debug, Default)]
pub struct EnvOverrides {
    pub sendgrid_api_key: Option<String>,
    pub notification_contact: Option<String>,
    pub days_remaining_threshold: Option<String>,
    pub from_email: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        EnvOverrides {
            sendgrid_api_key: env::var("SENDGRID_API_KEY").ok(),
            notification_contact: env::var("NOTIFICATION_CONTACT").ok(),
            days_remaining_threshold: env::var("DAYS_REMAINING_THRESHOLD").ok(),
            from_email: env::var("FROM_EMAIL").ok(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let config = parse_config(&content, &EnvOverrides::from_env()).map_err(|e| match e {
        ConfigError::Parse { source, .. } => ConfigError::Parse {
            path: path.display().to_string(),
            source,
        },
        other => other,
    })?;
    info!("⚙️ Loaded {} target(s) from {}", config.targets.len(), path.display());
    Ok(config)
}

pub fn parse_config(content: &str, overrides: &EnvOverrides) -> Result<AppConfig, ConfigError> {
    let raw: RawConfig = serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
        path: "<inline>".to_string(),
        source,
    })?;

    let default_timeout = match raw.default_timeout_secs {
        Some(0) => return Err(invalid("default_timeout_secs", "must be greater than zero")),
        Some(secs) => Duration::from_secs(secs),
        None => DEFAULT_TIMEOUT,
    };

    let certs = raw.certs.unwrap_or_default();
    if certs.is_empty() {
        return Err(ConfigError::Missing("certs".to_string()));
    }
    let mut targets: Vec<Target> = Vec::with_capacity(certs.len());
    for cert in certs {
        let target = to_target(cert, default_timeout)?;
        if targets.iter().any(|t| t.same_endpoint(&target)) {
            warn!("⚠️ Duplicate target {} ignored", target);
            continue;
        }
        targets.push(target);
    }

    let threshold = match non_empty(overrides.days_remaining_threshold.clone()) {
        Some(value) => value
            .trim()
            .parse::<i64>()
            .map_err(|e| invalid("DAYS_REMAINING_THRESHOLD", &e.to_string()))?,
        None => raw
            .days_remaining_threshold
            .ok_or_else(|| ConfigError::Missing("days_remaining_threshold".to_string()))?,
    };
    let threshold = u32::try_from(threshold)
        .map_err(|_| invalid("days_remaining_threshold", "must be a non-negative number of days"))?;

    let sendgrid_api_key = non_empty(overrides.sendgrid_api_key.clone())
        .or_else(|| non_empty(raw.sendgrid_api_key))
        .ok_or_else(|| ConfigError::Missing("sendgrid_api_key".to_string()))?;
    let notification_contact = non_empty(overrides.notification_contact.clone())
        .or_else(|| non_empty(raw.notification_contact))
        .ok_or_else(|| ConfigError::Missing("notification_contact".to_string()))?;
    let from_email = non_empty(overrides.from_email.clone())
        .or_else(|| non_empty(raw.from_email))
        .unwrap_or_else(|| DEFAULT_FROM_EMAIL.to_string());

    let concurrency = match raw.concurrency {
        Some(0) => return Err(invalid("concurrency", "must be at least 1")),
        Some(n) => n,
        None => DEFAULT_CONCURRENCY,
    };

    let interval = match raw.interval_secs {
        Some(0) => return Err(invalid("interval_secs", "must be greater than zero")),
        other => other.map(Duration::from_secs),
    };

    Ok(AppConfig {
        targets,
        threshold: ThresholdConfig {
            days_remaining_threshold: threshold,
        },
        sendgrid_api_key,
        notification_contact,
        from_email,
        concurrency,
        interval,
    })
}

fn to_target(cert: RawCert, default_timeout: Duration) -> Result<Target, ConfigError> {
    let (host, url_port) = split_host_port(&cert.url)?;
    if host.is_empty() {
        return Err(invalid("certs.url", &format!("no host in {:?}", cert.url)));
    }
    let port = match (url_port, cert.port) {
        (Some(in_url), Some(explicit)) if in_url != explicit => {
            return Err(invalid(
                "certs.port",
                &format!("{} names port {} but port is {}", cert.url, in_url, explicit),
            ));
        }
        (Some(port), _) | (None, Some(port)) => port,
        (None, None) => DEFAULT_PORT,
    };
    if port == 0 {
        return Err(invalid("certs.port", &format!("port 0 for {}", host)));
    }
    let timeout = match cert.timeout_secs {
        Some(0) => return Err(invalid("certs.timeout_secs", &format!("zero timeout for {}", host))),
        Some(secs) => Duration::from_secs(secs),
        None => default_timeout,
    };
    Ok(Target::new(host, port, timeout))
}

/// Accepts bare hosts as well as `https://host:port/path` style entries and splits off
/// the port when one is given. Bare IPv6 addresses must be bracketed to carry a port.
fn split_host_port(url: &str) -> Result<(String, Option<u16>), ConfigError> {
    let url = url.trim();
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let authority = without_scheme.split(['/', '?', '#']).next().unwrap_or("");

    let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
        let (host, rest) = bracketed
            .split_once(']')
            .ok_or_else(|| invalid("certs.url", &format!("unclosed '[' in {:?}", url)))?;
        match rest {
            "" => (host, None),
            _ => match rest.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None => return Err(invalid("certs.url", &format!("unexpected {:?} in {:?}", rest, url))),
            },
        }
    } else {
        match authority.split_once(':') {
            Some((host, port)) if !port.contains(':') => (host, Some(port)),
            _ => (authority, None),
        }
    };

    let port = port
        .map(|p| {
            p.parse::<u16>()
                .map_err(|_| invalid("certs.url", &format!("bad port {:?} in {:?}", p, url)))
        })
        .transpose()?;
    Ok((host.to_string(), port))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
