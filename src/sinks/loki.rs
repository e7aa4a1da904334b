//! Loki sink
//!
//! Pushes each event as one stream value: the stream labels come from the
//! config, the value timestamp is the current time in nanoseconds, and the
//! log line is the serialised event.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::ser::render_headers;
use super::tls::{build_client, TlsConfig};
use super::{EventSerializer, SerializerConfig, Sink};
use crate::error::SinkError;
use crate::event::Event;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LokiConfig {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    /// Labels attached to the pushed stream.
    pub stream_labels: BTreeMap<String, String>,
    pub tls: TlsConfig,
    #[serde(flatten)]
    pub serializer: SerializerConfig,
}

pub struct LokiSink {
    client: Client,
    url: String,
    headers: BTreeMap<String, String>,
    stream_labels: BTreeMap<String, String>,
    serializer: EventSerializer,
}

impl LokiSink {
    pub fn new(config: LokiConfig) -> Result<Self, SinkError> {
        if config.url.is_empty() {
            return Err(SinkError::Init("loki sink requires a url".to_string()));
        }
        Ok(Self {
            client: build_client(&config.tls)?,
            url: config.url,
            headers: config.headers,
            stream_labels: config.stream_labels,
            serializer: EventSerializer::new(config.serializer),
        })
    }
}

#[async_trait]
impl Sink for LokiSink {
    async fn send(&self, event: &Event) -> Result<(), SinkError> {
        let line = String::from_utf8(self.serializer.serialize(event)?)
            .map_err(|e| SinkError::Serialization(e.to_string()))?;
        let timestamp_ns = Utc::now().timestamp_nanos_opt().unwrap_or(0).to_string();

        let body = json!({
            "streams": [{
                "stream": self.stream_labels,
                "values": [[timestamp_ns, line]],
            }]
        });

        let mut request = self.client.post(&self.url).json(&body);
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

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use parking_lot::Mutex;
    use std::net::SocketAddr;
    use std::sync::Arc;

    #[derive(Default)]
    struct Received {
        bodies: Mutex<Vec<serde_json::Value>>,
    }

    async fn push(
        State(state): State<Arc<Received>>,
        Json(body): Json<serde_json::Value>,
    ) -> StatusCode {
        state.bodies.lock().push(body);
        StatusCode::NO_CONTENT
    }

    async fn start_server() -> (SocketAddr, Arc<Received>) {
        let state = Arc::new(Received::default());
        let app = Router::new()
            .route("/loki/api/v1/push", post(push))
            .with_state(Arc::clone(&state));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, state)
    }

    #[tokio::test]
    async fn test_push_payload_shape() {
        let (addr, state) = start_server().await;
        let sink = LokiSink::new(LokiConfig {
            url: format!("http://{addr}/loki/api/v1/push"),
            stream_labels: BTreeMap::from([("job".to_string(), "kubesee".to_string())]),
            ..Default::default()
        })
        .unwrap();

        let event = Event {
            reason: "Unhealthy".to_string(),
            ..Default::default()
        };
        sink.send(&event).await.unwrap();

        let bodies = state.bodies.lock();
        let body = &bodies[0];
        assert_eq!(body["streams"][0]["stream"]["job"], "kubesee");

        let values = body["streams"][0]["values"].as_array().unwrap();
        assert_eq!(values.len(), 1);
        let pair = values[0].as_array().unwrap();
        // Nanosecond timestamp as a decimal string.
        assert!(pair[0].as_str().unwrap().parse::<i64>().unwrap() > 0);
        let line: serde_json::Value = serde_json::from_str(pair[1].as_str().unwrap()).unwrap();
        assert_eq!(line["reason"], "Unhealthy");
    }

    #[tokio::test]
    async fn test_missing_url_rejected() {
        assert!(matches!(
            LokiSink::new(LokiConfig::default()),
            Err(SinkError::Init(_))
        ));
    }
}
