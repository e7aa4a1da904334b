//! Rule matching
//!
//! A [`Rule`] is the filter record that appears in `drop` and `match` lists
//! of the route tree. Patterns are regexes tested for containment; they are
//! compiled once at config load and an invalid pattern simply never matches,
//! so evaluation is total.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::event::Event;

/// A filter rule as it appears in the configuration.
///
/// A nil or empty pattern matches anything. `labels` and `annotations`
/// require every listed key to exist on the event's involved object with a
/// matching value. `minCount` is a lower bound on the event count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Rule {
    pub api_version: Option<String>,
    pub kind: Option<String>,
    pub namespace: Option<String>,
    pub reason: Option<String>,
    pub message: Option<String>,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub component: Option<String>,
    pub host: Option<String>,
    pub labels: Option<BTreeMap<String, String>>,
    pub annotations: Option<BTreeMap<String, String>>,
    pub min_count: Option<i32>,
    pub receiver: Option<String>,
}

impl Rule {
    /// Compile all patterns. Never fails: malformed regexes are logged and
    /// recorded as never-matching.
    pub fn compile(&self) -> CompiledRule {
        CompiledRule {
            api_version: Pattern::compile(self.api_version.as_deref()),
            kind: Pattern::compile(self.kind.as_deref()),
            namespace: Pattern::compile(self.namespace.as_deref()),
            reason: Pattern::compile(self.reason.as_deref()),
            message: Pattern::compile(self.message.as_deref()),
            type_: Pattern::compile(self.type_.as_deref()),
            component: Pattern::compile(self.component.as_deref()),
            host: Pattern::compile(self.host.as_deref()),
            labels: compile_map(self.labels.as_ref()),
            annotations: compile_map(self.annotations.as_ref()),
            min_count: self.min_count.unwrap_or(0),
            receiver: self
                .receiver
                .as_deref()
                .filter(|r| !r.is_empty())
                .map(str::to_string),
        }
    }
}

fn compile_map(map: Option<&BTreeMap<String, String>>) -> Vec<(String, Pattern)> {
    map.map(|m| {
        m.iter()
            .map(|(k, v)| (k.clone(), Pattern::compile(Some(v))))
            .collect()
    })
    .unwrap_or_default()
}

/// A single compiled pattern.
#[derive(Debug, Clone)]
enum Pattern {
    /// Absent or empty pattern - matches any value.
    Any,
    Regex(Regex),
    /// Failed to compile - matches nothing.
    Invalid,
}

impl Pattern {
    fn compile(pattern: Option<&str>) -> Pattern {
        match pattern {
            None | Some("") => Pattern::Any,
            Some(p) => match Regex::new(p) {
                Ok(re) => Pattern::Regex(re),
                Err(e) => {
                    warn!(pattern = %p, error = %e, "invalid rule pattern, it will never match");
                    Pattern::Invalid
                }
            },
        }
    }

    /// Unanchored containment test. A nil event value is matched as `""`.
    fn matches(&self, value: &str) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::Regex(re) => re.is_match(value),
            Pattern::Invalid => false,
        }
    }
}

/// A [`Rule`] with its patterns compiled, ready for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    api_version: Pattern,
    kind: Pattern,
    namespace: Pattern,
    reason: Pattern,
    message: Pattern,
    type_: Pattern,
    component: Pattern,
    host: Pattern,
    labels: Vec<(String, Pattern)>,
    annotations: Vec<(String, Pattern)>,
    min_count: i32,
    receiver: Option<String>,
}

impl CompiledRule {
    /// The receiver this rule emits to, if any. A rule without one still
    /// participates in a route's all-matched conjunction.
    pub fn receiver(&self) -> Option<&str> {
        self.receiver.as_deref()
    }

    /// Evaluate this rule against one event. Every attribute is tested
    /// independently and the conjunction returned.
    pub fn matches(&self, event: &Event) -> bool {
        let obj = &event.involved_object;

        self.api_version.matches(&obj.api_version)
            && self.kind.matches(&obj.kind)
            && self.namespace.matches(&event.namespace)
            && self.reason.matches(&event.reason)
            && self.message.matches(&event.message)
            && self.type_.matches(&event.type_)
            && self.component.matches(&event.source.component)
            && self.host.matches(&event.source.host)
            && match_map(&self.labels, obj.labels.as_ref())
            && match_map(&self.annotations, obj.annotations.as_ref())
            && (self.min_count <= 0 || event.count_or_default() >= self.min_count)
    }
}

/// Every rule key must exist in the event map with a matching value. An
/// empty rule map is vacuously true.
fn match_map(
    patterns: &[(String, Pattern)],
    values: Option<&std::collections::HashMap<String, String>>,
) -> bool {
    if patterns.is_empty() {
        return true;
    }
    let Some(values) = values else {
        return false;
    };
    patterns.iter().all(|(key, pattern)| {
        values
            .get(key)
            .is_some_and(|value| pattern.matches(value))
    })
}
