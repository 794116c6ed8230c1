//! Process configuration from `QUERY_DELIVERY_*` environment variables.
//!
//! Unset variables fall back to defaults. A variable that is set but cannot
//! be parsed is an error rather than a silent fallback.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::callback::{DEFAULT_CALLBACK_PATH, DEFAULT_CALLBACK_TIMEOUT, is_valid_callback_path};
use crate::codec::ContentType;
use crate::keys::{DEFAULT_NAMESPACE, KeyCacheConfig};
use crate::poll::{PollConfig, ResultClient};
use crate::signature::{DEFAULT_MAX_BODY_BYTES, VerifierConfig};
use crate::transport::{StaticToken, Transport};

/// Prefix shared by every variable read here.
pub const ENV_PREFIX: &str = "QUERY_DELIVERY_";

pub const DEFAULT_ENDPOINT: &str = "https://api.zvelo.com";
pub const DEFAULT_API_VERSION: &str = "v1";
pub const DEFAULT_LISTEN_ADDR: &str = "[::1]:8080";

/// Where the service publishes its callback signing keys.
pub const DEFAULT_TRUSTED_KEY_PREFIX: &str = "https://auth.zvelo.com/keys/";

/// Upper bound for `TIMEOUT_SECS` and `CALLBACK_TIMEOUT_SECS` (one year).
pub const MAX_TIMEOUT_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is not valid: {value:?} ({reason})")]
    Invalid {
        name: String,
        value: String,
        reason: String,
    },
}

/// Everything the binary needs to run.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub endpoint: String,
    pub api_version: String,
    pub poll: PollConfig,
    pub verify_signatures: bool,
    pub listen_addr: SocketAddr,
    pub callback_path: String,
    pub namespace: String,
    /// `None` when no data directory could be determined; keys then stay in
    /// memory only.
    pub data_dir: Option<PathBuf>,
    pub max_body_bytes: usize,
    /// Limit on receiving and handling one callback.
    pub callback_timeout: Duration,
    /// Signature key IDs must start with one of these.
    pub trusted_key_prefixes: Vec<String>,
    pub accept: ContentType,
    /// Static bearer credential for polling.
    pub token: Option<String>,
}

impl Config {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through `lookup`, which is given full variable
    /// names (including `HOME` and `XDG_DATA_HOME` for the data directory).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |suffix: &str| -> Option<(String, String)> {
            let name = format!("{ENV_PREFIX}{suffix}");
            lookup(&name)
                .filter(|value| !value.trim().is_empty())
                .map(|value| (name, value))
        };

        let defaults = PollConfig::new();
        let interval = match var("POLL_INTERVAL_MS") {
            Some((name, value)) => Duration::from_millis(parse_number(&name, &value)?),
            None => defaults.interval,
        };
        let timeout = match var("TIMEOUT_SECS") {
            Some((name, value)) => parse_secs(&name, &value)?,
            None => defaults.timeout,
        };
        if interval.is_zero() {
            return Err(invalid(
                &format!("{ENV_PREFIX}POLL_INTERVAL_MS"),
                "0",
                "must be positive",
            ));
        }

        let verify_signatures = match var("VERIFY_SIGNATURES") {
            Some((name, value)) => parse_bool(&name, &value)?,
            None => true,
        };

        let listen_addr = match var("LISTEN_ADDR") {
            Some((name, value)) => value
                .parse()
                .map_err(|e: std::net::AddrParseError| invalid(&name, &value, &e.to_string()))?,
            None => DEFAULT_LISTEN_ADDR
                .parse()
                .map_err(|e: std::net::AddrParseError| {
                    invalid("default listen address", DEFAULT_LISTEN_ADDR, &e.to_string())
                })?,
        };

        let callback_path = match var("CALLBACK_PATH") {
            Some((name, value)) if !is_valid_callback_path(&value) => {
                return Err(invalid(
                    &name,
                    &value,
                    "must start with '/' and be a literal path other than /health",
                ));
            }
            Some((_, value)) => value,
            None => DEFAULT_CALLBACK_PATH.to_string(),
        };

        let callback_timeout = match var("CALLBACK_TIMEOUT_SECS") {
            Some((name, value)) => {
                let timeout = parse_secs(&name, &value)?;
                if timeout.is_zero() {
                    return Err(invalid(&name, &value, "must be positive"));
                }
                timeout
            }
            None => DEFAULT_CALLBACK_TIMEOUT,
        };

        let trusted_key_prefixes = match var("TRUSTED_KEY_PREFIXES") {
            Some((name, value)) => parse_prefixes(&name, &value)?,
            None => vec![DEFAULT_TRUSTED_KEY_PREFIX.to_string()],
        };

        let max_body_bytes = match var("MAX_BODY_BYTES") {
            Some((name, value)) => parse_number::<usize>(&name, &value)?,
            None => DEFAULT_MAX_BODY_BYTES,
        };

        let accept = match var("ACCEPT") {
            Some((name, value)) => match value.to_ascii_lowercase().as_str() {
                "json" => ContentType::Json,
                "binary" => ContentType::Binary,
                _ => return Err(invalid(&name, &value, "expected json or binary")),
            },
            None => ContentType::Binary,
        };

        let data_dir = match var("DATA_DIR") {
            Some((_, value)) => Some(PathBuf::from(value)),
            None => default_data_dir(&lookup),
        };

        Ok(Config {
            endpoint: var("ENDPOINT").map_or_else(|| DEFAULT_ENDPOINT.to_string(), |(_, v)| v),
            api_version: var("API_VERSION")
                .map_or_else(|| DEFAULT_API_VERSION.to_string(), |(_, v)| v),
            poll: PollConfig::new().with_interval(interval).with_timeout(timeout),
            verify_signatures,
            listen_addr,
            callback_path,
            namespace: var("APP_NAMESPACE")
                .map_or_else(|| DEFAULT_NAMESPACE.to_string(), |(_, v)| v),
            data_dir,
            max_body_bytes,
            callback_timeout,
            trusted_key_prefixes,
            accept,
            token: var("TOKEN").map(|(_, v)| v),
        })
    }

    pub fn key_cache_config(&self) -> KeyCacheConfig {
        let config = KeyCacheConfig::new().with_namespace(self.namespace.clone());
        match &self.data_dir {
            Some(dir) => config.with_data_dir(dir.clone()),
            None => config,
        }
    }

    pub fn verifier_config(&self) -> VerifierConfig {
        self.trusted_key_prefixes.iter().fold(
            VerifierConfig::new()
                .with_skip_verification(!self.verify_signatures)
                .with_max_body_bytes(self.max_body_bytes),
            |config, prefix| config.with_trusted_key_prefix(prefix.clone()),
        )
    }

    pub fn poll_config(&self) -> PollConfig {
        self.poll
    }

    /// A result client authenticating with the configured static token.
    ///
    /// Without a token every fetch fails with a token error.
    pub fn result_client(&self, transport: Arc<dyn Transport>) -> ResultClient {
        let token = StaticToken::new(self.token.clone().unwrap_or_default());
        ResultClient::new(transport, Arc::new(token), &self.endpoint, &self.api_version)
            .with_accept(self.accept)
    }
}

/// `$XDG_DATA_HOME`, else `$HOME/.local/share`.
fn default_data_dir(lookup: &impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    if let Some(xdg) = lookup("XDG_DATA_HOME").filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(xdg));
    }
    lookup("HOME")
        .filter(|v| !v.is_empty())
        .map(|home| PathBuf::from(home).join(".local").join("share"))
}

fn parse_number<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| invalid(name, value, &e.to_string()))
}

fn parse_secs(name: &str, value: &str) -> Result<Duration, ConfigError> {
    let secs: u64 = parse_number(name, value)?;
    if secs > MAX_TIMEOUT_SECS {
        return Err(invalid(
            name,
            value,
            &format!("must be at most {MAX_TIMEOUT_SECS} seconds"),
        ));
    }
    Ok(Duration::from_secs(secs))
}

/// Comma-separated absolute URL prefixes.
fn parse_prefixes(name: &str, value: &str) -> Result<Vec<String>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|prefix| !prefix.is_empty())
        .map(|prefix| match prefix.split_once("://") {
            Some((scheme, host)) if !scheme.is_empty() && !host.is_empty() => {
                Ok(prefix.to_string())
            }
            _ => Err(invalid(name, value, "expected comma-separated URL prefixes")),
        })
        .collect()
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(name, value, "expected a boolean")),
    }
}

fn invalid(name: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
