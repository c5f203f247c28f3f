//! Configuration loading from environment-style key/value input.

use std::collections::HashMap;

use crate::config::schema::{
    ClientConfig, ConsumerConfig, DemoConfig, DrainerSettings, ObservabilityConfig,
    PingerSettings, QueueServiceConfig, ResponderSettings, ServerConfig, DEFAULT_DEMO_PORT,
    DEFAULT_QUEUE_BIND, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SERVER_ADDR,
};
use crate::config::validation::{
    parse_endpoints, parse_log_format, parse_port, parse_queue_location, parse_socket_addr,
};

pub const HTTP_PORT: &str = "HTTP_PORT";
pub const QUEUE_URL: &str = "QUEUE_URL";
pub const SERVER_ADDR: &str = "SERVER_ADDR";
pub const QUEUE_BIND: &str = "QUEUE_BIND";
pub const METRICS_ADDR: &str = "METRICS_ADDR";
pub const LOG_FORMAT: &str = "LOG_FORMAT";

/// Error type for configuration loading. Always fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("at least one server address is required")]
    NoEndpoints,

    #[error("invalid server address `{addr}`: {source}")]
    Endpoint {
        addr: String,
        #[source]
        source: url::ParseError,
    },

    #[error("server address `{addr}` has unsupported scheme `{scheme}`")]
    UnsupportedScheme { addr: String, scheme: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: &'static str, reason: impl ToString) -> Self {
        ConfigError::Invalid {
            key,
            reason: reason.to_string(),
        }
    }
}

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// A key/value source for settings.
///
/// Blank values count as unset.
pub struct ConfigSource {
    lookup: Lookup,
}

impl ConfigSource {
    /// Read from the process environment.
    pub fn from_env() -> Self {
        Self {
            lookup: Box::new(|key| std::env::var(key).ok()),
        }
    }

    /// Read from a fixed set of pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: HashMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            lookup: Box::new(move |key| map.get(key).cloned()),
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn require(&self, key: &'static str) -> Result<String, ConfigError> {
        self.get(key).ok_or(ConfigError::Missing(key))
    }

    fn observability(&self) -> Result<ObservabilityConfig, ConfigError> {
        let log_format = match self.get(LOG_FORMAT) {
            Some(raw) => parse_log_format(LOG_FORMAT, &raw)?,
            None => Default::default(),
        };
        let metrics_address = self
            .get(METRICS_ADDR)
            .map(|raw| parse_socket_addr(METRICS_ADDR, &raw))
            .transpose()?;
        Ok(ObservabilityConfig {
            log_format,
            metrics_address,
        })
    }

    pub fn client(&self) -> Result<ClientConfig, ConfigError> {
        let raw = self
            .get(SERVER_ADDR)
            .unwrap_or_else(|| DEFAULT_SERVER_ADDR.to_string());
        Ok(ClientConfig {
            endpoints: parse_endpoints(&raw)?,
            pinger: PingerSettings::default(),
            observability: self.observability()?,
        })
    }

    pub fn server(&self) -> Result<ServerConfig, ConfigError> {
        let port = parse_port(HTTP_PORT, &self.require(HTTP_PORT)?)?;
        let queue = parse_queue_location(QUEUE_URL, &self.require(QUEUE_URL)?)?;
        Ok(ServerConfig {
            port,
            queue,
            responder: ResponderSettings::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            observability: self.observability()?,
        })
    }

    pub fn consumer(&self) -> Result<ConsumerConfig, ConfigError> {
        let queue = parse_queue_location(QUEUE_URL, &self.require(QUEUE_URL)?)?;
        Ok(ConsumerConfig {
            queue,
            drainer: DrainerSettings::default(),
            observability: self.observability()?,
        })
    }

    pub fn queue_service(&self) -> Result<QueueServiceConfig, ConfigError> {
        let raw = self
            .get(QUEUE_BIND)
            .unwrap_or_else(|| DEFAULT_QUEUE_BIND.to_string());
        Ok(QueueServiceConfig {
            bind_address: parse_socket_addr(QUEUE_BIND, &raw)?,
            observability: self.observability()?,
        })
    }

    pub fn demo(&self) -> Result<DemoConfig, ConfigError> {
        let port = match self.get(HTTP_PORT) {
            Some(raw) => parse_port(HTTP_PORT, &raw)?,
            None => DEFAULT_DEMO_PORT,
        };
        Ok(DemoConfig {
            port,
            pinger: PingerSettings::default(),
            responder: ResponderSettings::default(),
            drainer: DrainerSettings::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            observability: self.observability()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{LogFormat, QueueLocation};

    #[test]
    fn server_requires_port_and_queue() {
        let err = ConfigSource::from_pairs([(QUEUE_URL, "memory")])
            .server()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing(HTTP_PORT)));

        let err = ConfigSource::from_pairs([(HTTP_PORT, "8080"), (QUEUE_URL, "  ")])
            .server()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing(QUEUE_URL)));

        let cfg = ConfigSource::from_pairs([(HTTP_PORT, "8080"), (QUEUE_URL, "memory")])
            .server()
            .unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.queue, QueueLocation::Memory);
        assert_eq!(cfg.bind_address().port(), 8080);
    }

    #[test]
    fn client_defaults_to_localhost() {
        let cfg = ConfigSource::from_pairs(Vec::<(String, String)>::new())
            .client()
            .unwrap();
        assert_eq!(cfg.endpoints.len(), 1);
        assert_eq!(cfg.endpoints[0].as_str(), "http://localhost:8080/ping");
    }

    #[test]
    fn client_rejects_bad_address() {
        let err = ConfigSource::from_pairs([(SERVER_ADDR, "http://a:1,http://[bad")])
            .client()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Endpoint { .. }));
    }

    #[test]
    fn observability_settings() {
        let cfg = ConfigSource::from_pairs([
            (QUEUE_URL, "http://queue:9324"),
            (LOG_FORMAT, "pretty"),
            (METRICS_ADDR, "127.0.0.1:9000"),
        ])
        .consumer()
        .unwrap();
        assert_eq!(cfg.observability.log_format, LogFormat::Pretty);
        assert_eq!(
            cfg.observability.metrics_address,
            Some("127.0.0.1:9000".parse().unwrap())
        );

        let err = ConfigSource::from_pairs([(QUEUE_URL, "memory"), (METRICS_ADDR, "nope")])
            .consumer()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: METRICS_ADDR, .. }));
    }

    #[test]
    fn demo_and_queue_service_defaults() {
        let src = ConfigSource::from_pairs(Vec::<(String, String)>::new());
        assert_eq!(src.demo().unwrap().port, 8080);
        assert_eq!(
            src.queue_service().unwrap().bind_address,
            "0.0.0.0:9324".parse().unwrap()
        );
    }
}
