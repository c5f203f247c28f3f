//! Parsing and semantic checks for individual settings.
//!
//! Each function turns one raw string into a typed value or a
//! `ConfigError` naming the key it came from.

use std::net::SocketAddr;

use url::Url;

use crate::config::loader::ConfigError;
use crate::config::schema::{LogFormat, QueueLocation};

/// Path every pinger endpoint is pointed at.
pub const PING_PATH: &str = "/ping";

/// Split a comma-separated address list into ping endpoints.
///
/// Each address has its path replaced with `/ping`. One bad address fails
/// the whole list.
pub fn parse_endpoints(raw: &str) -> Result<Vec<Url>, ConfigError> {
    if raw.trim().is_empty() {
        return Err(ConfigError::NoEndpoints);
    }

    raw.split(',')
        .map(|part| {
            let addr = part.trim();
            let mut url = Url::parse(addr).map_err(|source| ConfigError::Endpoint {
                addr: addr.to_string(),
                source,
            })?;
            if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
                return Err(ConfigError::UnsupportedScheme {
                    addr: addr.to_string(),
                    scheme: url.scheme().to_string(),
                });
            }
            url.set_path(PING_PATH);
            Ok(url)
        })
        .collect()
}

pub fn parse_port(key: &'static str, raw: &str) -> Result<u16, ConfigError> {
    match raw.parse::<u16>() {
        Ok(0) => Err(ConfigError::invalid(key, "port must be non-zero")),
        Ok(port) => Ok(port),
        Err(e) => Err(ConfigError::invalid(key, e)),
    }
}

pub fn parse_queue_location(key: &'static str, raw: &str) -> Result<QueueLocation, ConfigError> {
    if raw.eq_ignore_ascii_case("memory") {
        return Ok(QueueLocation::Memory);
    }
    let url = Url::parse(raw).map_err(|e| ConfigError::invalid(key, e))?;
    match url.scheme() {
        "http" | "https" => Ok(QueueLocation::Remote(url)),
        other => Err(ConfigError::invalid(
            key,
            format!("unsupported queue scheme `{}`", other),
        )),
    }
}

pub fn parse_socket_addr(key: &'static str, raw: &str) -> Result<SocketAddr, ConfigError> {
    raw.parse().map_err(|e| ConfigError::invalid(key, e))
}

pub fn parse_log_format(key: &'static str, raw: &str) -> Result<LogFormat, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "json" => Ok(LogFormat::Json),
        "pretty" | "text" => Ok(LogFormat::Pretty),
        other => Err(ConfigError::invalid(
            key,
            format!("unknown log format `{}`", other),
        )),
    }
}
