//! Ping loops.

use std::sync::Arc;

use axum::http::HeaderMap;
use reqwest::StatusCode;
use tokio::task::JoinSet;
use tracing::Instrument;
use url::Url;

use crate::config::{ClientConfig, ConfigError, PingerSettings};
use crate::lifecycle::ShutdownSignal;
use crate::observability::context::{write_headers, ContextError};
use crate::observability::{metrics, EventLog, Fields, Level, NoopLog, TextMapTracer, Tracer};
use crate::random::{RandomSource, SeededRandom};

#[derive(Debug, thiserror::Error)]
pub enum PingError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

struct Inner {
    client: reqwest::Client,
    tracer: Arc<dyn Tracer>,
    random: Arc<dyn RandomSource>,
    log: Arc<dyn EventLog>,
    settings: PingerSettings,
}

/// Polls every configured endpoint on its own jittered loop.
pub struct Pinger {
    endpoints: Vec<Url>,
    inner: Inner,
}

impl Pinger {
    /// A pinger with a no-op log, a random tracer and an entropy-seeded
    /// random source.
    pub fn new(endpoints: Vec<Url>, client: reqwest::Client) -> Result<Self, ConfigError> {
        if endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }
        Ok(Self {
            endpoints,
            inner: Inner {
                client,
                tracer: Arc::new(TextMapTracer::new()),
                random: Arc::new(SeededRandom::from_entropy()),
                log: Arc::new(NoopLog),
                settings: PingerSettings::default(),
            },
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, PingError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self::new(config.endpoints.clone(), client)?.with_settings(config.pinger))
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.inner.tracer = tracer;
        self
    }

    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.inner.random = random;
        self
    }

    pub fn with_log(mut self, log: Arc<dyn EventLog>) -> Self {
        self.inner.log = log;
        self
    }

    pub fn with_settings(mut self, settings: PingerSettings) -> Self {
        self.inner.settings = settings;
        self
    }

    pub fn endpoints(&self) -> &[Url] {
        &self.endpoints
    }

    /// Send a single ping to `endpoint`.
    pub async fn ping(&self, endpoint: &Url) -> Result<StatusCode, PingError> {
        self.inner.ping(endpoint).await
    }

    /// Run one loop per endpoint until `shutdown` fires.
    pub async fn run(self, shutdown: ShutdownSignal) {
        tracing::info!(endpoints = self.endpoints.len(), "Pinger starting");

        let inner = Arc::new(self.inner);
        let mut tasks = JoinSet::new();
        for endpoint in self.endpoints {
            let inner = inner.clone();
            let shutdown = shutdown.clone();
            tasks.spawn(async move { inner.ping_loop(endpoint, shutdown).await });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Ping loop panicked");
            }
        }
        tracing::info!("Pinger stopped");
    }
}

impl Inner {
    async fn ping_loop(&self, endpoint: Url, mut shutdown: ShutdownSignal) {
        loop {
            let wait = self.settings.interval.sample(self.random.as_ref());
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(wait) => {}
            }
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                _ = self.ping(&endpoint) => {}
            }
        }
        tracing::debug!(endpoint = %endpoint, "Ping loop exiting");
    }

    async fn ping(&self, endpoint: &Url) -> Result<StatusCode, PingError> {
        let span = self.tracer.start_span("pinging", None);
        let ctx = span.context();
        let fields = Fields::new()
            .with("dd.trace_id", ctx.trace_id)
            .with("dd.span_id", ctx.span_id)
            .with("endpoint", endpoint);

        let carrier = match self.tracer.inject(&ctx) {
            Ok(carrier) => carrier,
            Err(e) => {
                let message = format!("cannot inject span context: {}", e);
                self.log.record(Level::Error, &message, &fields);
                metrics::record_ping(endpoint.as_str(), "error");
                span.finish();
                return Err(e.into());
            }
        };
        let mut headers = HeaderMap::new();
        write_headers(&carrier, &mut headers);

        let result = self
            .client
            .get(endpoint.clone())
            .headers(headers)
            .timeout(self.settings.request_timeout)
            .send()
            .instrument(span.tracing_span())
            .await;
        span.finish();

        match result {
            Ok(res) => {
                let status = res.status();
                metrics::record_ping(endpoint.as_str(), status.as_str());
                if !status.is_success() {
                    self.log.record(
                        Level::Warn,
                        "unexpected status",
                        &fields.with("status_code", status.as_u16()),
                    );
                }
                Ok(status)
            }
            Err(e) => {
                metrics::record_ping(endpoint.as_str(), "error");
                self.log.record(Level::Error, &e.to_string(), &fields);
                Err(e.into())
            }
        }
    }
}
