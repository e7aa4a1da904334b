//! Template corpus: behaviour pinned for the layouts and header values that
//! appear in real exporter configurations, rendered against a realistic
//! event context.

use std::collections::HashMap;

use chrono::TimeZone;
use kubesee::event::{Event, EventSource, ObjectReference};
use kubesee::template::render;

fn sample_event() -> Event {
    let first = chrono::Utc.with_ymd_and_hms(2024, 3, 15, 9, 30, 45).unwrap()
        + chrono::Duration::milliseconds(250);
    Event {
        name: "web-1.17b3a9c1".to_string(),
        namespace: "payments".to_string(),
        uid: "d3adb33f-0000-4242-8888-123456789abc".to_string(),
        reason: "BackOff".to_string(),
        message: "Back-off restarting failed container".to_string(),
        type_: "Warning".to_string(),
        count: Some(14),
        cluster_name: "prod-eu".to_string(),
        first_timestamp: Some(first),
        labels: Some(HashMap::from([(
            "app".to_string(),
            "checkout".to_string(),
        )])),
        involved_object: ObjectReference {
            kind: "Pod".to_string(),
            namespace: "payments".to_string(),
            name: "web-1".to_string(),
            api_version: "v1".to_string(),
            labels: Some(HashMap::from([
                ("app".to_string(), "checkout".to_string()),
                ("tier".to_string(), "frontend".to_string()),
            ])),
            ..Default::default()
        },
        source: EventSource {
            component: "kubelet".to_string(),
            host: "node-7".to_string(),
        },
        ..Default::default()
    }
}

#[test]
fn corpus_renders_as_expected() {
    let ctx = sample_event().template_context();

    let cases: &[(&str, &str)] = &[
        // Bare field traversal.
        ("{{ .Reason }}", "BackOff"),
        ("{{ .Namespace }}/{{ .Name }}", "payments/web-1.17b3a9c1"),
        ("{{ .InvolvedObject.Kind }}", "Pod"),
        ("{{ .InvolvedObject.Labels.tier }}", "frontend"),
        ("{{ .Source.Component }}@{{ .Source.Host }}", "kubelet@node-7"),
        ("{{ .Count }}", "14"),
        ("{{ .ClusterName }}", "prod-eu"),
        // Missing keys render empty, not errors.
        ("[{{ .NoSuchField }}]", "[]"),
        ("[{{ .InvolvedObject.FieldPath }}]", "[]"),
        // Timestamps at millisecond precision; absent ones are empty.
        ("{{ .FirstTimestamp }}", "2024-03-15T09:30:45.250Z"),
        ("{{ .LastTimestamp }}", ""),
        ("{{ .GetTimestampISO8601 }}", "2024-03-15T09:30:45.250Z"),
        ("{{ .GetTimestampMs }}", "1710495045250"),
        // String helpers.
        ("{{ .Reason | upper }}", "BACKOFF"),
        ("{{ .Reason | lower }}", "backoff"),
        (r#"{{ .Reason | quote }}"#, "\"BackOff\""),
        (r#"{{ .Count | squote }}"#, "'14'"),
        (r#"{{ .Message | replace "container" "pod" }}"#, "Back-off restarting failed pod"),
        (r#"{{ trim "  x  " }}"#, "x"),
        // Predicates stringify like Go booleans.
        (r#"{{ hasPrefix "Back" .Reason }}"#, "true"),
        (r#"{{ hasSuffix "Off" .Reason }}"#, "true"),
        (r#"{{ contains "restarting" .Message }}"#, "true"),
        (r#"{{ contains "restarting" .Reason }}"#, "false"),
        (r#"{{ empty .LastTimestamp }}"#, "true"),
        (r#"{{ empty .Reason }}"#, "false"),
        // default / coalesce pick the fallback only for empty values.
        (r#"{{ .Action | default "none" }}"#, "none"),
        (r#"{{ .Reason | default "none" }}"#, "BackOff"),
        (r#"{{ coalesce .Action .ReportingController .Reason }}"#, "BackOff"),
        // Collection access.
        (r#"{{ index .Labels "app" }}"#, "checkout"),
        (r#"{{ index .Labels "missing" }}"#, ""),
        (r#"{{ index .InvolvedObject.Labels "tier" }}"#, "frontend"),
        // Literals pass through.
        (r#"{{ "static" }}-{{ 7 }}"#, "static-7"),
        // Mixed text and multiple expressions.
        (
            "event={{ .Reason }} object={{ .InvolvedObject.Kind }}/{{ .InvolvedObject.Name }}",
            "event=BackOff object=Pod/web-1",
        ),
    ];

    for (template, expected) in cases {
        let rendered = render(template, &ctx)
            .unwrap_or_else(|e| panic!("template {template:?} failed: {e}"));
        assert_eq!(&rendered, expected, "template {template:?}");
    }
}

#[test]
fn corpus_to_json_round_trips() {
    let ctx = sample_event().template_context();

    let labels = render("{{ .Labels | toJson }}", &ctx).unwrap();
    let value: serde_json::Value = serde_json::from_str(&labels).unwrap();
    assert_eq!(value["app"], "checkout");

    let pretty = render("{{ .InvolvedObject | toPrettyJson }}", &ctx).unwrap();
    assert!(pretty.contains('\n'));
    let value: serde_json::Value = serde_json::from_str(&pretty).unwrap();
    assert_eq!(value["Kind"], "Pod");
    assert_eq!(value["Name"], "web-1");
}

#[test]
fn corpus_error_cases() {
    let ctx = sample_event().template_context();

    // Unknown functions and malformed expressions are errors the caller
    // decides how to handle.
    assert!(render("{{ b64enc .Message }}", &ctx).is_err());
    assert!(render("{{ .Message | nope }}", &ctx).is_err());
    assert!(render("{{ unclosed", &ctx).is_err());
    assert!(render(r#"{{ upper .Reason .Message }}"#, &ctx).is_err());
}

#[test]
fn corpus_now_is_iso8601() {
    let ctx = sample_event().template_context();
    let rendered = render("{{ now }}", &ctx).unwrap();
    // e.g. 2026-08-02T10:15:30.123Z
    assert!(rendered.ends_with('Z'), "{rendered}");
    assert!(chrono::DateTime::parse_from_rfc3339(&rendered).is_ok(), "{rendered}");
}
