//! Event model for kubesee
//!
//! [`Event`] is the in-memory representation of a Kubernetes Event resource
//! plus a snapshot of the object it is about. It is constructed once from the
//! watch message and never mutated afterwards; the engine stamps the cluster
//! name by producing a new copy.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Event as CoreEvent;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::template::Context;

/// The object a Kubernetes event refers to, with metadata optionally
/// overlaid by the watcher's lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectReference {
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub uid: String,
    pub api_version: String,
    pub resource_version: String,
    pub field_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,
    /// Owner references copied verbatim from the looked-up object.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<serde_json::Value>,
    /// Set when the lookup finds the object gone.
    pub deleted: bool,
}

/// The component that reported the event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSource {
    pub component: String,
    pub host: String,
}

/// A Kubernetes Event lifted into the exporter's representation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Event {
    pub name: String,
    pub namespace: String,
    pub uid: String,
    pub resource_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_time: Option<DateTime<Utc>>,
    pub reason: String,
    pub message: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<i32>,
    pub reporting_controller: String,
    pub reporting_instance: String,
    /// Stamped by the engine from config, never taken from the API.
    pub cluster_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,
    pub involved_object: ObjectReference,
    pub source: EventSource,
}

impl Event {
    /// Return a copy with the cluster name stamped.
    pub fn with_cluster_name(&self, cluster_name: &str) -> Event {
        let mut event = self.clone();
        event.cluster_name = cluster_name.to_string();
        event
    }

    /// The timestamp used for age filtering: `lastTimestamp`, falling back
    /// to `eventTime`.
    pub fn age_timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_timestamp.or(self.event_time)
    }

    /// The timestamp exposed to templates via `GetTimestampMs` and
    /// `GetTimestampISO8601`: `firstTimestamp`, falling back to `eventTime`.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.first_timestamp.or(self.event_time)
    }

    /// Event count, defaulting to 1 when the API omitted it.
    pub fn count_or_default(&self) -> i32 {
        self.count.unwrap_or(1)
    }

    /// Build the template rendering context: the event under PascalCase keys
    /// plus the two callable timestamp entries. Timestamps render at
    /// millisecond precision, or as the empty string when absent.
    pub fn template_context(&self) -> Context {
        let obj = &self.involved_object;
        let root = json!({
            "Name": &self.name,
            "Namespace": &self.namespace,
            "UID": &self.uid,
            "ResourceVersion": &self.resource_version,
            "CreationTimestamp": format_timestamp(self.creation_timestamp),
            "FirstTimestamp": format_timestamp(self.first_timestamp),
            "LastTimestamp": format_timestamp(self.last_timestamp),
            "EventTime": format_timestamp(self.event_time),
            "Labels": &self.labels,
            "Annotations": &self.annotations,
            "Message": &self.message,
            "Reason": &self.reason,
            "Type": &self.type_,
            "Count": self.count.unwrap_or(0),
            "Action": &self.action,
            "ReportingController": &self.reporting_controller,
            "ReportingInstance": &self.reporting_instance,
            "ClusterName": &self.cluster_name,
            "InvolvedObject": {
                "Kind": &obj.kind,
                "Namespace": &obj.namespace,
                "Name": &obj.name,
                "UID": &obj.uid,
                "APIVersion": &obj.api_version,
                "ResourceVersion": &obj.resource_version,
                "FieldPath": &obj.field_path,
                "Labels": &obj.labels,
                "Annotations": &obj.annotations,
                "OwnerReferences": &obj.owner_references,
                "Deleted": obj.deleted,
            },
            "Source": {
                "Component": &self.source.component,
                "Host": &self.source.host,
            },
        });

        let timestamp_ms = self.timestamp().map(|t| t.timestamp_millis()).unwrap_or(0);
        let timestamp_iso = self
            .timestamp()
            .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
            .unwrap_or_default();

        Context::new(root)
            .with_callable("GetTimestampMs", move || json!(timestamp_ms))
            .with_callable("GetTimestampISO8601", move || json!(timestamp_iso))
    }

    /// Return a copy with `.` replaced by `_` in all label and annotation
    /// keys, on the event and on its involved object. Idempotent.
    pub fn dedot(&self) -> Event {
        let mut event = self.clone();
        event.labels = event.labels.map(dedot_map);
        event.annotations = event.annotations.map(dedot_map);
        event.involved_object.labels = event.involved_object.labels.map(dedot_map);
        event.involved_object.annotations = event.involved_object.annotations.map(dedot_map);
        event
    }
}

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

fn format_timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_default()
}

fn dedot_map(map: HashMap<String, String>) -> HashMap<String, String> {
    map.into_iter()
        .map(|(k, v)| (k.replace('.', "_"), v))
        .collect()
}

impl From<CoreEvent> for Event {
    fn from(ev: CoreEvent) -> Self {
        let meta = ev.metadata;
        let involved = ev.involved_object;

        Event {
            name: meta.name.unwrap_or_default(),
            namespace: meta.namespace.unwrap_or_default(),
            uid: meta.uid.unwrap_or_default(),
            resource_version: meta.resource_version.unwrap_or_default(),
            creation_timestamp: meta.creation_timestamp.map(|t| t.0),
            first_timestamp: ev.first_timestamp.map(|t| t.0),
            last_timestamp: ev.last_timestamp.map(|t| t.0),
            event_time: ev.event_time.map(|t| t.0),
            reason: ev.reason.unwrap_or_default(),
            message: ev.message.unwrap_or_default(),
            type_: ev.type_.unwrap_or_default(),
            action: ev.action.unwrap_or_default(),
            count: ev.count,
            reporting_controller: ev.reporting_component.unwrap_or_default(),
            reporting_instance: ev.reporting_instance.unwrap_or_default(),
            cluster_name: String::new(),
            labels: meta.labels.map(|m| m.into_iter().collect()),
            annotations: meta.annotations.map(|m| m.into_iter().collect()),
            involved_object: ObjectReference {
                kind: involved.kind.unwrap_or_default(),
                namespace: involved.namespace.unwrap_or_default(),
                name: involved.name.unwrap_or_default(),
                uid: involved.uid.unwrap_or_default(),
                api_version: involved.api_version.unwrap_or_default(),
                resource_version: involved.resource_version.unwrap_or_default(),
                field_path: involved.field_path.unwrap_or_default(),
                labels: None,
                annotations: None,
                owner_references: Vec::new(),
                deleted: false,
            },
            source: ev
                .source
                .map(|s| EventSource {
                    component: s.component.unwrap_or_default(),
                    host: s.host.unwrap_or_default(),
                })
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn labels(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_cluster_name_stamp_leaves_original() {
        let event = Event {
            name: "pod-failed.1".to_string(),
            ..Default::default()
        };
        let stamped = event.with_cluster_name("prod-eu");

        assert_eq!(stamped.cluster_name, "prod-eu");
        assert_eq!(event.cluster_name, "");
    }

    #[test]
    fn test_age_timestamp_prefers_last_timestamp() {
        let last = Utc.with_ymd_and_hms(2024, 3, 15, 9, 30, 45).unwrap();
        let evt_time = Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap();

        let event = Event {
            last_timestamp: Some(last),
            event_time: Some(evt_time),
            ..Default::default()
        };
        assert_eq!(event.age_timestamp(), Some(last));

        let event = Event {
            event_time: Some(evt_time),
            ..Default::default()
        };
        assert_eq!(event.age_timestamp(), Some(evt_time));

        assert_eq!(Event::default().age_timestamp(), None);
    }

    #[test]
    fn test_count_defaults_to_one() {
        assert_eq!(Event::default().count_or_default(), 1);
        let event = Event {
            count: Some(7),
            ..Default::default()
        };
        assert_eq!(event.count_or_default(), 7);
    }

    #[test]
    fn test_dedot_rewrites_all_maps() {
        let event = Event {
            labels: labels(&[("app.kubernetes.io/name", "web")]),
            annotations: labels(&[("checksum/config", "abc")]),
            involved_object: ObjectReference {
                labels: labels(&[("app.kubernetes.io/part-of", "shop")]),
                ..Default::default()
            },
            ..Default::default()
        };

        let dedotted = event.dedot();
        assert!(dedotted
            .labels
            .as_ref()
            .unwrap()
            .contains_key("app_kubernetes_io/name"));
        assert!(dedotted
            .annotations
            .as_ref()
            .unwrap()
            .contains_key("checksum/config"));
        assert!(dedotted
            .involved_object
            .labels
            .as_ref()
            .unwrap()
            .contains_key("app_kubernetes_io/part-of"));
    }

    #[test]
    fn test_dedot_idempotent() {
        let event = Event {
            labels: labels(&[("a.b.c", "1"), ("plain", "2")]),
            ..Default::default()
        };
        let once = event.dedot();
        let twice = once.dedot();
        assert_eq!(once.labels, twice.labels);
    }

    #[test]
    fn test_template_context_pascal_case_and_timestamps() {
        let first = Utc.with_ymd_and_hms(2024, 3, 15, 9, 30, 45).unwrap()
            + chrono::Duration::milliseconds(123);
        let event = Event {
            message: "Pod created".to_string(),
            first_timestamp: Some(first),
            involved_object: ObjectReference {
                kind: "Pod".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };

        let ctx = event.template_context();
        assert_eq!(
            crate::template::render("{{ .Message }}/{{ .InvolvedObject.Kind }}", &ctx).unwrap(),
            "Pod created/Pod"
        );
        assert_eq!(
            crate::template::render("{{ .FirstTimestamp }}", &ctx).unwrap(),
            "2024-03-15T09:30:45.123Z"
        );
        // Absent timestamps render as the empty string.
        assert_eq!(crate::template::render("{{ .LastTimestamp }}", &ctx).unwrap(), "");
        assert_eq!(
            crate::template::render("{{ .GetTimestampMs }}", &ctx).unwrap(),
            first.timestamp_millis().to_string()
        );
        assert_eq!(
            crate::template::render("{{ .GetTimestampISO8601 }}", &ctx).unwrap(),
            "2024-03-15T09:30:45.123Z"
        );
    }

    #[test]
    fn test_json_uses_camel_case() {
        let event = Event {
            reporting_controller: "kubelet".to_string(),
            type_: "Warning".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["reportingController"], "kubelet");
        assert_eq!(json["type"], "Warning");
        assert!(json.get("firstTimestamp").is_none());
    }
}
