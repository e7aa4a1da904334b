//! Webhook sink
//!
//! POSTs each event as JSON to an HTTP endpoint. Retryable failures (429,
//! 500, 502, 503, 504 and transport errors) are retried up to three attempts
//! with exponential backoff and jitter; any other non-2xx status fails the
//! event immediately.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use super::ser::render_headers;
use super::tls::{build_client, TlsConfig};
use super::{EventSerializer, SerializerConfig, Sink};
use crate::error::SinkError;
use crate::event::Event;

/// Total attempts per event.
const MAX_ATTEMPTS: u32 = 3;
/// First backoff delay; doubles per retry.
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
/// Jitter applied to each backoff delay.
const JITTER_FACTOR: f64 = 0.2;

const RETRYABLE: [StatusCode; 5] = [
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebhookConfig {
    pub endpoint: String,
    /// Static or templated header values; template failures fall back to the
    /// raw string.
    pub headers: BTreeMap<String, String>,
    pub tls: TlsConfig,
    #[serde(flatten)]
    pub serializer: SerializerConfig,
}

pub struct WebhookSink {
    client: Client,
    endpoint: String,
    headers: BTreeMap<String, String>,
    serializer: EventSerializer,
}

impl WebhookSink {
    pub fn new(config: WebhookConfig) -> Result<Self, SinkError> {
        if config.endpoint.is_empty() {
            return Err(SinkError::Init(
                "webhook sink requires an endpoint".to_string(),
            ));
        }
        Ok(Self {
            client: build_client(&config.tls)?,
            endpoint: config.endpoint,
            headers: config.headers,
            serializer: EventSerializer::new(config.serializer),
        })
    }

    async fn post_once(&self, body: &[u8], event: &Event) -> Result<(), SinkError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_vec());

        for (name, value) in render_headers(&self.headers, event) {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SinkError::Connection(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SinkError::Http(status.as_u16()))
        }
    }
}

fn is_retryable(err: &SinkError) -> bool {
    match err {
        SinkError::Connection(_) => true,
        SinkError::Http(status) => RETRYABLE
            .iter()
            .any(|candidate| candidate.as_u16() == *status),
        _ => false,
    }
}

fn jittered(delay: Duration) -> Duration {
    let factor = 1.0 + rand::thread_rng().gen_range(-JITTER_FACTOR..JITTER_FACTOR);
    delay.mul_f64(factor)
}

#[async_trait]
impl Sink for WebhookSink {
    async fn send(&self, event: &Event) -> Result<(), SinkError> {
        let body = self.serializer.serialize(event)?;

        let mut delay = INITIAL_BACKOFF;
        let mut attempt = 1;
        loop {
            match self.post_once(&body, event).await {
                Ok(()) => {
                    debug!(endpoint = %self.endpoint, attempt, "webhook delivered");
                    return Ok(());
                }
                Err(err) if is_retryable(&err) && attempt < MAX_ATTEMPTS => {
                    warn!(
                        endpoint = %self.endpoint,
                        attempt,
                        error = %err,
                        "webhook attempt failed, retrying"
                    );
                    tokio::time::sleep(jittered(delay)).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
