//! Configuration for kubesee
//!
//! The YAML file named by `KUBESEE_CONFIG` is expanded against the process
//! environment, parsed into [`Config`], defaulted and validated. All
//! configuration errors are fatal at startup; after load the config is
//! read-only.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ExporterError, Result};
use crate::route::Route;

/// Sink-type keys a receiver may carry, in factory order.
pub const SINK_KEYS: &[&str] = &[
    "stdout",
    "file",
    "webhook",
    "pipe",
    "syslog",
    "loki",
    "elasticsearch",
    "opensearch",
    "kafka",
    "inMemory",
];

const DEFAULT_MAX_EVENT_AGE_SECONDS: u64 = 5;
const DEFAULT_CACHE_SIZE: usize = 1024;
const DEFAULT_KUBE_QPS: f32 = 5.0;
const DEFAULT_KUBE_BURST: i32 = 10;
const DEFAULT_METRICS_PREFIX: &str = "kubesee_";
const DEFAULT_MAX_QUEUE_SIZE: usize = 1000;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Leader election settings. Parsed and validated; election itself is not
/// enforced by the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LeaderElectionConfig {
    pub enabled: bool,
    #[serde(rename = "leaderElectionID")]
    pub leader_election_id: String,
}

/// A named destination: `name` plus exactly one sink-type key whose value is
/// the free-form config handed to that sink's constructor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Receiver {
    pub name: String,
    /// Per-receiver worker cap. Above 1, per-receiver FIFO delivery becomes
    /// best-effort.
    #[serde(rename = "maxConcurrency", skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
    #[serde(flatten)]
    pub sink: BTreeMap<String, serde_yaml::Value>,
}

impl Receiver {
    /// The single `(sink_type, sink_config)` pair this receiver names.
    pub fn sink_entry(&self) -> Result<(&str, &serde_yaml::Value)> {
        if self.name.is_empty() {
            return Err(ExporterError::Config(
                "receiver is missing a name".to_string(),
            ));
        }
        let mut entries = self.sink.iter();
        let Some((key, value)) = entries.next() else {
            return Err(ExporterError::Config(format!(
                "receiver '{}' has no sink configured",
                self.name
            )));
        };
        if let Some((extra, _)) = entries.next() {
            return Err(ExporterError::Config(format!(
                "receiver '{}' has multiple sinks configured ('{}' and '{}')",
                self.name, key, extra
            )));
        }
        if !SINK_KEYS.contains(&key.as_str()) {
            return Err(ExporterError::Config(format!(
                "receiver '{}' has unknown sink type '{}'",
                self.name, key
            )));
        }
        Ok((key.as_str(), value))
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub log_level: String,
    pub log_format: LogFormat,
    pub max_event_age_seconds: u64,
    /// Deprecated alias for `maxEventAgeSeconds`.
    pub throttle_period: u64,
    pub cluster_name: String,
    /// Namespace to watch; absent means all namespaces.
    pub namespace: Option<String>,
    #[serde(rename = "kubeQPS")]
    pub kube_qps: f32,
    pub kube_burst: i32,
    pub metrics_name_prefix: String,
    pub omit_lookup: bool,
    pub cache_size: usize,
    pub max_queue_size: usize,
    pub leader_election: LeaderElectionConfig,
    pub route: Route,
    pub receivers: Vec<Receiver>,
}

impl Config {
    /// Read, env-expand, parse, default and validate a YAML config file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ExporterError::Config(format!("cannot read {}: {}", path.as_ref().display(), e))
        })?;
        Self::from_yaml(&raw)
    }

    /// Parse a YAML string, with env expansion applied first.
    pub fn from_yaml(raw: &str) -> Result<Config> {
        let expanded = expand_env(raw, |name| std::env::var(name).ok());
        let mut config: Config = serde_yaml::from_str(&expanded)
            .map_err(|e| ExporterError::Config(format!("invalid YAML: {e}")))?;
        config.apply_defaults();
        config.validate()?;
        Ok(config)
    }

    fn apply_defaults(&mut self) {
        if self.cache_size == 0 {
            self.cache_size = DEFAULT_CACHE_SIZE;
        }
        if self.kube_qps == 0.0 {
            self.kube_qps = DEFAULT_KUBE_QPS;
        }
        if self.kube_burst == 0 {
            self.kube_burst = DEFAULT_KUBE_BURST;
        }
        if self.metrics_name_prefix.is_empty() {
            self.metrics_name_prefix = DEFAULT_METRICS_PREFIX.to_string();
        }
        if self.max_queue_size == 0 {
            self.max_queue_size = DEFAULT_MAX_QUEUE_SIZE;
        }
        if self.max_event_age_seconds == 0 && self.throttle_period == 0 {
            self.max_event_age_seconds = DEFAULT_MAX_EVENT_AGE_SECONDS;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.max_event_age_seconds != 0 && self.throttle_period != 0 {
            return Err(ExporterError::Config(
                "set only one of maxEventAgeSeconds and throttlePeriod (deprecated)".to_string(),
            ));
        }
        for receiver in &self.receivers {
            receiver.sink_entry()?;
        }
        Ok(())
    }

    /// The age cutoff for incoming events, honouring the deprecated alias.
    pub fn max_event_age(&self) -> Duration {
        let seconds = if self.max_event_age_seconds != 0 {
            self.max_event_age_seconds
        } else {
            self.throttle_period
        };
        Duration::from_secs(seconds)
    }
}

/// Expand environment references in the raw config text before parsing:
/// `$$` becomes a literal `$`; `${NAME}` and `$NAME` become the variable's
/// value or the empty string.
pub fn expand_env<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let re = Regex::new(r"\$\$|\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .expect("static pattern");
    re.replace_all(input, |caps: &regex::Captures<'_>| {
        if &caps[0] == "$$" {
            "$".to_string()
        } else {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            lookup(name).unwrap_or_default()
        }
    })
    .into_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "TOKEN" => Some("s3cret".to_string()),
            "NS" => Some("prod".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_expand_env_forms() {
        assert_eq!(expand_env("a ${TOKEN} b", lookup), "a s3cret b");
        assert_eq!(expand_env("ns: $NS", lookup), "ns: prod");
        assert_eq!(expand_env("missing: [${NOPE}]", lookup), "missing: []");
        assert_eq!(expand_env("cost: $$5", lookup), "cost: $5");
        assert_eq!(expand_env("$$${TOKEN}", lookup), "$s3cret");
    }

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_yaml("clusterName: test").unwrap();
        assert_eq!(config.cache_size, 1024);
        assert_eq!(config.kube_qps, 5.0);
        assert_eq!(config.kube_burst, 10);
        assert_eq!(config.metrics_name_prefix, "kubesee_");
        assert_eq!(config.max_queue_size, 1000);
        assert_eq!(config.max_event_age(), Duration::from_secs(5));
        assert_eq!(config.namespace, None);
    }

    #[test]
    fn test_explicit_age_not_overridden() {
        let config = Config::from_yaml("maxEventAgeSeconds: 60").unwrap();
        assert_eq!(config.max_event_age(), Duration::from_secs(60));
    }

    #[test]
    fn test_throttle_period_alias() {
        let config = Config::from_yaml("throttlePeriod: 30").unwrap();
        assert_eq!(config.max_event_age(), Duration::from_secs(30));
    }

    #[test]
    fn test_both_age_knobs_is_an_error() {
        let err = Config::from_yaml("maxEventAgeSeconds: 60\nthrottlePeriod: 30").unwrap_err();
        assert!(err.to_string().contains("maxEventAgeSeconds"));
    }

    #[test]
    fn test_receiver_validation() {
        let ok = r#"
receivers:
  - name: dump
    stdout: {}
"#;
        assert!(Config::from_yaml(ok).is_ok());

        let missing_name = r#"
receivers:
  - stdout: {}
"#;
        assert!(Config::from_yaml(missing_name)
            .unwrap_err()
            .to_string()
            .contains("missing a name"));

        let no_sink = r#"
receivers:
  - name: empty
"#;
        assert!(Config::from_yaml(no_sink)
            .unwrap_err()
            .to_string()
            .contains("no sink"));

        let two_sinks = r#"
receivers:
  - name: both
    stdout: {}
    file:
      path: /tmp/events.json
"#;
        assert!(Config::from_yaml(two_sinks)
            .unwrap_err()
            .to_string()
            .contains("multiple sinks"));

        let unknown = r#"
receivers:
  - name: odd
    carrierpigeon: {}
"#;
        assert!(Config::from_yaml(unknown)
            .unwrap_err()
            .to_string()
            .contains("unknown sink type"));
    }

    #[test]
    fn test_full_config_parses() {
        let yaml = r#"
logLevel: debug
logFormat: json
maxEventAgeSeconds: 10
clusterName: prod-eu
namespace: payments
omitLookup: true
leaderElection:
  enabled: true
  leaderElectionID: kubesee
route:
  drop:
    - type: Normal
  routes:
    - match:
        - reason: Failed.*
          receiver: alerts
receivers:
  - name: alerts
    webhook:
      endpoint: http://alerts.local/hook
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.cluster_name, "prod-eu");
        assert_eq!(config.namespace.as_deref(), Some("payments"));
        assert!(config.omit_lookup);
        assert!(config.leader_election.enabled);
        assert_eq!(config.route.drop.len(), 1);
        assert_eq!(config.receivers.len(), 1);
        let (kind, _) = config.receivers[0].sink_entry().unwrap();
        assert_eq!(kind, "webhook");
    }

    #[test]
    fn test_max_concurrency_is_not_a_sink_key() {
        let yaml = r#"
receivers:
  - name: dump
    maxConcurrency: 4
    stdout: {}
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.receivers[0].max_concurrency, Some(4));
        let (kind, _) = config.receivers[0].sink_entry().unwrap();
        assert_eq!(kind, "stdout");
    }
}
