//! Kafka sink
//!
//! Produces each event to a topic, keyed by the event UID so that updates
//! for the same event hash to the same partition. Compression, SASL and TLS
//! are passed through to the producer configuration.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use serde::Deserialize;
use tracing::warn;

use super::tls::TlsConfig;
use super::{EventSerializer, SerializerConfig, Sink};
use crate::error::SinkError;
use crate::event::Event;

const DEFAULT_BROKER_PORT: u16 = 9092;
const SEND_TIMEOUT: Duration = Duration::from_secs(30);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SaslConfig {
    pub enabled: bool,
    pub username: String,
    pub password: String,
    /// `plain`, `sha256` or `sha512`.
    pub mechanism: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    pub client_id: Option<String>,
    /// `snappy`, `gzip`, `lz4`, `zstd` or `none`.
    pub compression_codec: Option<String>,
    pub sasl: SaslConfig,
    pub tls: TlsConfig,
    #[serde(flatten)]
    pub serializer: SerializerConfig,
}

pub struct KafkaSink {
    producer: FutureProducer,
    topic: String,
    serializer: EventSerializer,
}

impl std::fmt::Debug for KafkaSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaSink")
            .field("topic", &self.topic)
            .field("serializer", &self.serializer)
            .finish_non_exhaustive()
    }
}

/// `host` becomes `host:9092`; explicit ports are kept.
fn normalize_brokers(brokers: &[String]) -> Vec<String> {
    brokers
        .iter()
        .map(|broker| {
            if broker.contains(':') {
                broker.clone()
            } else {
                format!("{broker}:{DEFAULT_BROKER_PORT}")
            }
        })
        .collect()
}

fn codec_name(codec: &str) -> Result<&'static str, SinkError> {
    match codec {
        "snappy" => Ok("snappy"),
        "gzip" => Ok("gzip"),
        "lz4" => Ok("lz4"),
        "zstd" => Ok("zstd"),
        "" | "none" => Ok("none"),
        other => Err(SinkError::Init(format!(
            "unknown compression codec '{other}'"
        ))),
    }
}

fn sasl_mechanism(mechanism: &str) -> Result<&'static str, SinkError> {
    match mechanism {
        "" | "plain" => Ok("PLAIN"),
        "sha256" => Ok("SCRAM-SHA-256"),
        "sha512" => Ok("SCRAM-SHA-512"),
        other => Err(SinkError::Init(format!("unknown SASL mechanism '{other}'"))),
    }
}

fn uses_tls(tls: &TlsConfig) -> bool {
    tls.insecure_skip_verify
        || tls.ca_file.is_some()
        || tls.cert_file.is_some()
        || tls.key_file.is_some()
}

impl KafkaSink {
    pub fn new(config: KafkaConfig) -> Result<Self, SinkError> {
        if config.brokers.is_empty() {
            return Err(SinkError::Init(
                "kafka sink requires at least one broker".to_string(),
            ));
        }
        if config.topic.is_empty() {
            return Err(SinkError::Init("kafka sink requires a topic".to_string()));
        }

        let mut client = ClientConfig::new();
        client.set(
            "bootstrap.servers",
            normalize_brokers(&config.brokers).join(","),
        );
        // Hash partitioning on the event-UID key.
        client.set("partitioner", "murmur2");
        client.set(
            "compression.codec",
            codec_name(config.compression_codec.as_deref().unwrap_or("none"))?,
        );
        if let Some(client_id) = &config.client_id {
            client.set("client.id", client_id);
        }

        let tls = uses_tls(&config.tls);
        let protocol = match (config.sasl.enabled, tls) {
            (true, true) => "sasl_ssl",
            (true, false) => "sasl_plaintext",
            (false, true) => "ssl",
            (false, false) => "plaintext",
        };
        client.set("security.protocol", protocol);

        if config.sasl.enabled {
            client.set("sasl.mechanisms", sasl_mechanism(&config.sasl.mechanism)?);
            client.set("sasl.username", &config.sasl.username);
            client.set("sasl.password", &config.sasl.password);
        }
        if let Some(ca_file) = &config.tls.ca_file {
            client.set("ssl.ca.location", ca_file);
        }
        if let Some(cert_file) = &config.tls.cert_file {
            client.set("ssl.certificate.location", cert_file);
        }
        if let Some(key_file) = &config.tls.key_file {
            client.set("ssl.key.location", key_file);
        }
        if config.tls.insecure_skip_verify {
            client.set("enable.ssl.certificate.verification", "false");
        }

        let producer: FutureProducer = client
            .create()
            .map_err(|e| SinkError::Init(format!("cannot create producer: {e}")))?;

        Ok(Self {
            producer,
            topic: config.topic,
            serializer: EventSerializer::new(config.serializer),
        })
    }
}

#[async_trait]
impl Sink for KafkaSink {
    async fn send(&self, event: &Event) -> Result<(), SinkError> {
        let payload = self.serializer.serialize(event)?;
        let record = FutureRecord::to(&self.topic)
            .key(&event.uid)
            .payload(&payload);

        match self.producer.send(record, Timeout::After(SEND_TIMEOUT)).await {
            Ok(_) => Ok(()),
            Err((e, _)) => Err(SinkError::Send(e.to_string())),
        }
    }

    async fn close(&self) {
        if let Err(e) = self.producer.flush(Timeout::After(FLUSH_TIMEOUT)) {
            warn!(topic = %self.topic, error = %e, "kafka flush on close failed");
        }
    }
}
