//! TLS options shared by the HTTP-based sinks

use std::time::Duration;

use serde::Deserialize;

use crate::error::SinkError;

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Default connection timeout in seconds
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// TLS client options for webhook, Elasticsearch/OpenSearch and Loki sinks.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TlsConfig {
    pub insecure_skip_verify: bool,
    pub ca_file: Option<String>,
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
}

/// Build an HTTP client honouring the TLS options.
pub(crate) fn build_client(tls: &TlsConfig) -> Result<reqwest::Client, SinkError> {
    let mut builder = reqwest::Client::builder()
        .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
        .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS));

    if tls.insecure_skip_verify {
        builder = builder.danger_accept_invalid_certs(true);
    }

    if let Some(ca_file) = &tls.ca_file {
        let pem = std::fs::read(ca_file)
            .map_err(|e| SinkError::Init(format!("cannot read caFile {ca_file}: {e}")))?;
        let cert = reqwest::Certificate::from_pem(&pem)
            .map_err(|e| SinkError::Init(format!("invalid caFile {ca_file}: {e}")))?;
        builder = builder.add_root_certificate(cert);
    }

    match (&tls.cert_file, &tls.key_file) {
        (Some(cert_file), Some(key_file)) => {
            let mut pem = std::fs::read(cert_file)
                .map_err(|e| SinkError::Init(format!("cannot read certFile {cert_file}: {e}")))?;
            let key = std::fs::read(key_file)
                .map_err(|e| SinkError::Init(format!("cannot read keyFile {key_file}: {e}")))?;
            pem.extend_from_slice(&key);
            let identity = reqwest::Identity::from_pem(&pem)
                .map_err(|e| SinkError::Init(format!("invalid client certificate: {e}")))?;
            builder = builder.identity(identity);
        }
        (None, None) => {}
        _ => {
            return Err(SinkError::Init(
                "certFile and keyFile must be set together".to_string(),
            ))
        }
    }

    builder
        .build()
        .map_err(|e| SinkError::Init(format!("cannot build HTTP client: {e}")))
}
