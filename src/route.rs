//! Route tree evaluation
//!
//! A [`Route`] is one node of the filtering tree: `drop` rules abort the
//! subtree, `match` rules gate descent and optionally emit to a receiver,
//! `routes` are the ordered children. Evaluation is deterministic for a
//! single event and never fails.

use serde::{Deserialize, Serialize};

use crate::event::Event;
use crate::rules::{CompiledRule, Rule};

/// A route node as it appears in the configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Route {
    pub drop: Vec<Rule>,
    #[serde(rename = "match")]
    pub match_: Vec<Rule>,
    pub routes: Vec<Route>,
}

impl Route {
    /// Compile the whole tree. Pattern compilation happens exactly once per
    /// rule, here.
    pub fn compile(&self) -> CompiledRoute {
        CompiledRoute {
            drop: self.drop.iter().map(Rule::compile).collect(),
            match_: self.match_.iter().map(Rule::compile).collect(),
            routes: self.routes.iter().map(Route::compile).collect(),
        }
    }
}

/// A [`Route`] tree with every rule compiled.
#[derive(Debug, Clone, Default)]
pub struct CompiledRoute {
    drop: Vec<CompiledRule>,
    match_: Vec<CompiledRule>,
    routes: Vec<CompiledRoute>,
}

impl CompiledRoute {
    /// Walk this subtree for one event, calling `emit(receiver, event)` for
    /// every match rule that names a receiver.
    ///
    /// Ordering is load-bearing:
    /// 1. drop rules in list order, first match aborts the subtree;
    /// 2. match rules in list order, each matching rule with a receiver
    ///    emits; a rule without a receiver is a pure gate;
    /// 3. children are entered only if every match rule matched (an empty
    ///    match list counts as all-matched).
    pub fn process<F>(&self, event: &Event, emit: &mut F)
    where
        F: FnMut(&str, &Event),
    {
        for rule in &self.drop {
            if rule.matches(event) {
                return;
            }
        }

        let mut all_matched = true;
        for rule in &self.match_ {
            if rule.matches(event) {
                if let Some(receiver) = rule.receiver() {
                    emit(receiver, event);
                }
            } else {
                all_matched = false;
            }
        }

        if all_matched {
            for child in &self.routes {
                child.process(event, emit);
            }
        }
    }
}
