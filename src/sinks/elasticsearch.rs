//! Elasticsearch sink
//!
//! Indexes each event as a `_doc`. The index name is either static or
//! derived from `indexFormat` and the event's timestamp; `useEventID` makes
//! the document id the event UID (PUT instead of POST). OpenSearch shares
//! this implementation.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::index::format_index;
use super::ser::render_headers;
use super::tls::{build_client, TlsConfig};
use super::{EventSerializer, SerializerConfig, Sink};
use crate::error::SinkError;
use crate::event::Event;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElasticsearchConfig {
    pub hosts: Vec<String>,
    pub index: String,
    pub index_format: Option<String>,
    /// Legacy mapping type segment, kept for old clusters.
    #[serde(rename = "type")]
    pub type_: Option<String>,
    #[serde(rename = "useEventID")]
    pub use_event_id: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub api_key: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub tls: TlsConfig,
    #[serde(flatten)]
    pub serializer: SerializerConfig,
}

#[derive(Debug, Clone)]
enum Auth {
    None,
    Basic { username: String, password: String },
    ApiKey(String),
}

#[derive(Debug)]
pub struct ElasticsearchSink {
    client: Client,
    hosts: Vec<String>,
    next_host: AtomicUsize,
    index: String,
    index_format: Option<String>,
    type_: Option<String>,
    use_event_id: bool,
    auth: Auth,
    headers: BTreeMap<String, String>,
    serializer: EventSerializer,
}

impl ElasticsearchSink {
    pub fn new(config: ElasticsearchConfig) -> Result<Self, SinkError> {
        if config.hosts.is_empty() {
            return Err(SinkError::Init(
                "elasticsearch sink requires at least one host".to_string(),
            ));
        }
        if config.index.is_empty() && config.index_format.is_none() {
            return Err(SinkError::Init(
                "elasticsearch sink requires index or indexFormat".to_string(),
            ));
        }

        let auth = if let Some(key) = config.api_key {
            Auth::ApiKey(key)
        } else if let Some(username) = config.username {
            Auth::Basic {
                username,
                password: config.password.unwrap_or_default(),
            }
        } else {
            Auth::None
        };

        Ok(Self {
            client: build_client(&config.tls)?,
            hosts: config
                .hosts
                .into_iter()
                .map(|h| h.trim_end_matches('/').to_string())
                .collect(),
            next_host: AtomicUsize::new(0),
            index: config.index,
            index_format: config.index_format,
            type_: config.type_,
            use_event_id: config.use_event_id,
            auth,
            headers: config.headers,
            serializer: EventSerializer::new(config.serializer),
        })
    }

    /// `/{index}[/{type}]/_doc[/{uid}]`
    fn document_path(&self, event: &Event) -> String {
        let index = match &self.index_format {
            Some(format) => format_index(format, document_time(event)),
            None => self.index.clone(),
        };

        let mut path = format!("/{index}");
        if let Some(type_) = &self.type_ {
            path.push('/');
            path.push_str(type_);
        }
        path.push_str("/_doc");
        if self.use_event_id {
            path.push('/');
            path.push_str(&event.uid);
        }
        path
    }

    fn pick_host(&self) -> &str {
        let n = self.next_host.fetch_add(1, Ordering::Relaxed);
        &self.hosts[n % self.hosts.len()]
    }
}

/// The timestamp an index name is derived from.
fn document_time(event: &Event) -> DateTime<Utc> {
    event
        .timestamp()
        .or(event.last_timestamp)
        .or(event.creation_timestamp)
        .unwrap_or_else(Utc::now)
}

#[async_trait]
impl Sink for ElasticsearchSink {
    async fn send(&self, event: &Event) -> Result<(), SinkError> {
        let body = self.serializer.serialize(event)?;
        let url = format!("{}{}", self.pick_host(), self.document_path(event));

        let mut request = if self.use_event_id {
            self.client.put(&url)
        } else {
            self.client.post(&url)
        };
        request = request
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);

        request = match &self.auth {
            Auth::None => request,
            Auth::Basic { username, password } => request.basic_auth(username, Some(password)),
            Auth::ApiKey(key) => {
                // Accept both `id:key` pairs and pre-encoded values.
                let value = if key.contains(':') {
                    BASE64.encode(key.as_bytes())
                } else {
                    key.clone()
                };
                request.header(reqwest::header::AUTHORIZATION, format!("ApiKey {value}"))
            }
        };

        for (name, value) in render_headers(&self.headers, event) {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SinkError::Connection(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(url = %url, "event indexed");
            Ok(())
        } else {
            Err(SinkError::Http(status.as_u16()))
        }
    }
}
