//! Sink config surface: every receiver kind deserializes from the YAML keys
//! documented for it, through the same path the factory uses.

use kubesee::config::Config;

fn receiver_config(yaml: &str) -> serde_yaml::Value {
    let config = Config::from_yaml(yaml).unwrap();
    let (_, value) = config.receivers[0].sink_entry().unwrap();
    value.clone()
}

#[test]
fn webhook_keys() {
    let value = receiver_config(
        r#"
receivers:
  - name: w
    webhook:
      endpoint: https://alerts.example.com/hook
      deDot: true
      headers:
        Authorization: Bearer tok
      tls:
        insecureSkipVerify: true
      layout:
        reason: "{{ .Reason }}"
"#,
    );
    let config: kubesee::sinks::webhook::WebhookConfig = serde_yaml::from_value(value).unwrap();
    assert_eq!(config.endpoint, "https://alerts.example.com/hook");
    assert!(config.serializer.de_dot);
    assert!(config.tls.insecure_skip_verify);
    assert_eq!(config.headers["Authorization"], "Bearer tok");
    assert!(config.serializer.layout.is_some());
}

#[test]
fn elasticsearch_keys() {
    let value = receiver_config(
        r#"
receivers:
  - name: es
    elasticsearch:
      hosts:
        - https://es-1:9200
        - https://es-2:9200
      indexFormat: "kube-events-{2006-01-02}"
      useEventID: true
      type: kube-event
      username: elastic
      password: pass
      deDot: true
"#,
    );
    let config: kubesee::sinks::elasticsearch::ElasticsearchConfig =
        serde_yaml::from_value(value).unwrap();
    assert_eq!(config.hosts.len(), 2);
    assert_eq!(config.index_format.as_deref(), Some("kube-events-{2006-01-02}"));
    assert!(config.use_event_id);
    assert_eq!(config.type_.as_deref(), Some("kube-event"));
    assert_eq!(config.username.as_deref(), Some("elastic"));
    assert!(config.serializer.de_dot);
}

#[test]
fn opensearch_shares_the_surface() {
    let value = receiver_config(
        r#"
receivers:
  - name: os
    opensearch:
      hosts:
        - https://os:9200
      index: events
      apiKey: already-encoded
"#,
    );
    let config: kubesee::sinks::opensearch::OpenSearchConfig =
        serde_yaml::from_value(value).unwrap();
    assert_eq!(config.index, "events");
    assert_eq!(config.api_key.as_deref(), Some("already-encoded"));
}

#[cfg(feature = "kafka")]
#[test]
fn kafka_keys() {
    let value = receiver_config(
        r#"
receivers:
  - name: k
    kafka:
      brokers:
        - kafka-1
        - kafka-2:9093
      topic: kube-events
      clientId: kubesee
      compressionCodec: snappy
      sasl:
        enabled: true
        username: svc
        password: secret
        mechanism: sha512
      tls:
        caFile: /etc/ssl/ca.pem
"#,
    );
    let config: kubesee::sinks::kafka::KafkaConfig = serde_yaml::from_value(value).unwrap();
    assert_eq!(config.brokers, vec!["kafka-1", "kafka-2:9093"]);
    assert_eq!(config.topic, "kube-events");
    assert_eq!(config.client_id.as_deref(), Some("kubesee"));
    assert_eq!(config.compression_codec.as_deref(), Some("snappy"));
    assert!(config.sasl.enabled);
    assert_eq!(config.sasl.mechanism, "sha512");
    assert_eq!(config.tls.ca_file.as_deref(), Some("/etc/ssl/ca.pem"));
}

#[test]
fn loki_keys() {
    let value = receiver_config(
        r#"
receivers:
  - name: l
    loki:
      url: http://loki:3100/loki/api/v1/push
      streamLabels:
        job: kubesee
        cluster: prod
"#,
    );
    let config: kubesee::sinks::loki::LokiConfig = serde_yaml::from_value(value).unwrap();
    assert_eq!(config.url, "http://loki:3100/loki/api/v1/push");
    assert_eq!(config.stream_labels["job"], "kubesee");
    assert_eq!(config.stream_labels["cluster"], "prod");
}

#[test]
fn syslog_keys() {
    let value = receiver_config(
        r#"
receivers:
  - name: s
    syslog:
      network: udp
      addr: syslog.example.com:514
      tag: kubesee
"#,
    );
    let config: kubesee::sinks::syslog::SyslogConfig = serde_yaml::from_value(value).unwrap();
    assert_eq!(config.network, kubesee::sinks::syslog::Network::Udp);
    assert_eq!(config.addr, "syslog.example.com:514");
    assert_eq!(config.tag, "kubesee");
}

#[test]
fn file_keys() {
    let value = receiver_config(
        r#"
receivers:
  - name: f
    file:
      path: /var/log/kubesee/events.json
      maxsize: 100
      maxbackups: 5
      maxage: 7
"#,
    );
    let config: kubesee::sinks::file::FileConfig = serde_yaml::from_value(value).unwrap();
    assert_eq!(config.path, "/var/log/kubesee/events.json");
    assert_eq!(config.maxsize, 100);
    assert_eq!(config.maxbackups, 5);
    assert_eq!(config.maxage, 7);
}

#[test]
fn stdout_pipe_and_in_memory_keys() {
    let value = receiver_config(
        r#"
receivers:
  - name: out
    stdout:
      deDot: true
"#,
    );
    let config: kubesee::sinks::stdout::StdoutConfig = serde_yaml::from_value(value).unwrap();
    assert!(config.serializer.de_dot);

    let value = receiver_config(
        r#"
receivers:
  - name: p
    pipe:
      path: /tmp/events.pipe
"#,
    );
    let config: kubesee::sinks::pipe::PipeConfig = serde_yaml::from_value(value).unwrap();
    assert_eq!(config.path, "/tmp/events.pipe");

    let value = receiver_config(
        r#"
receivers:
  - name: m
    inMemory: {}
"#,
    );
    let config: kubesee::sinks::in_memory::InMemoryConfig =
        serde_yaml::from_value(value).unwrap();
    assert!(!config.serializer.de_dot);
}
