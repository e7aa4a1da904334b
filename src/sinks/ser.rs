//! Shared event serialisation for sinks
//!
//! Every sink serialises through the same policy: optional deDot of label
//! and annotation keys, then either a rendered layout or the event verbatim,
//! JSON-encoded. Header values may also be templated; a failing header
//! template is the one place template errors are tolerated.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::SinkError;
use crate::event::Event;
use crate::template::{render, render_layout};

/// Serialisation options shared by all sinks, flattened into each sink's
/// own config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SerializerConfig {
    /// Replace `.` with `_` in label/annotation keys.
    pub de_dot: bool,
    /// Nested map whose string leaves are templates; rendered per event.
    pub layout: Option<Value>,
}

/// Applies the shared serialisation policy for one sink.
#[derive(Debug, Clone, Default)]
pub struct EventSerializer {
    de_dot: bool,
    layout: Option<Value>,
}

impl EventSerializer {
    pub fn new(config: SerializerConfig) -> Self {
        Self {
            de_dot: config.de_dot,
            layout: config.layout,
        }
    }

    /// Serialise one event to its JSON wire form.
    pub fn serialize(&self, event: &Event) -> Result<Vec<u8>, SinkError> {
        let dedotted;
        let event = if self.de_dot {
            dedotted = event.dedot();
            &dedotted
        } else {
            event
        };

        match &self.layout {
            Some(layout) => {
                let rendered = render_layout(layout, &event.template_context())
                    .map_err(|e| SinkError::Template(e.to_string()))?;
                Ok(serde_json::to_vec(&rendered)?)
            }
            None => Ok(serde_json::to_vec(event)?),
        }
    }
}

/// Render header values against an event. A template failure is not fatal:
/// the raw template string is used and a debug message logged.
pub(crate) fn render_headers(
    headers: &BTreeMap<String, String>,
    event: &Event,
) -> Vec<(String, String)> {
    if headers.is_empty() {
        return Vec::new();
    }
    let ctx = event.template_context();
    headers
        .iter()
        .map(|(name, value)| {
            let rendered = if value.contains("{{") {
                match render(value, &ctx) {
                    Ok(rendered) => rendered,
                    Err(e) => {
                        debug!(header = %name, error = %e, "header template failed, using raw value");
                        value.clone()
                    }
                }
            } else {
                value.clone()
            };
            (name.clone(), rendered)
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::event::ObjectReference;
    use serde_json::json;
    use std::collections::HashMap;

    fn event() -> Event {
        Event {
            message: "Pod created".to_string(),
            reason: "Created".to_string(),
            involved_object: ObjectReference {
                kind: "Pod".to_string(),
                labels: Some(HashMap::from([(
                    "app.kubernetes.io/name".to_string(),
                    "web".to_string(),
                )])),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_verbatim_serialisation() {
        let ser = EventSerializer::new(SerializerConfig::default());
        let bytes = ser.serialize(&event()).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["message"], "Pod created");
        assert_eq!(value["involvedObject"]["kind"], "Pod");
    }

    #[test]
    fn test_dedot_applies_before_encoding() {
        let ser = EventSerializer::new(SerializerConfig {
            de_dot: true,
            layout: None,
        });
        let bytes = ser.serialize(&event()).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(value["involvedObject"]["labels"]
            .get("app_kubernetes_io/name")
            .is_some());
    }

    #[test]
    fn test_layout_serialisation() {
        let ser = EventSerializer::new(SerializerConfig {
            de_dot: false,
            layout: Some(json!({
                "msg": "{{ .Message }}",
                "kind": "{{ .InvolvedObject.Kind }}",
            })),
        });
        let bytes = ser.serialize(&event()).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, json!({"msg": "Pod created", "kind": "Pod"}));
    }

    #[test]
    fn test_layout_error_is_fatal_for_the_event() {
        let ser = EventSerializer::new(SerializerConfig {
            de_dot: false,
            layout: Some(json!({"bad": "{{ bogus }}"})),
        });
        assert!(matches!(
            ser.serialize(&event()),
            Err(SinkError::Template(_))
        ));
    }

    #[test]
    fn test_header_template_failure_keeps_raw_value() {
        let headers = BTreeMap::from([
            ("X-Reason".to_string(), "{{ .Reason }}".to_string()),
            ("X-Bad".to_string(), "{{ bogus }}".to_string()),
            ("X-Static".to_string(), "fixed".to_string()),
        ]);
        let rendered = render_headers(&headers, &event());
        let map: BTreeMap<_, _> = rendered.into_iter().collect();
        assert_eq!(map["X-Reason"], "Created");
        assert_eq!(map["X-Bad"], "{{ bogus }}");
        assert_eq!(map["X-Static"], "fixed");
    }
}
