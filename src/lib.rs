//! kubesee - Kubernetes event exporter
//!
//! Watches the cluster's Event resources, filters and routes them through a
//! declarative rule tree, and delivers them to asynchronous sinks.
//!
//! # Pipeline
//!
//! ```text
//! kube API ──► Watcher ──► Route tree ──► Registry queues ──► Sinks
//! ```
//!
//! The watcher age-filters and enriches incoming events; the route tree
//! decides per event which receivers it reaches; each receiver owns a
//! bounded FIFO queue and a sink instance managed by the registry.

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod lookup;
pub mod metrics;
pub mod metrics_server;
pub mod registry;
pub mod route;
pub mod rules;
pub mod sinks;
pub mod template;
pub mod watcher;

pub use config::{Config, Receiver};
pub use engine::Engine;
pub use error::{ExporterError, Result, SinkError};
pub use event::{Event, EventSource, ObjectReference};
pub use registry::{Registry, RegistryHandle};
pub use route::{CompiledRoute, Route};
pub use rules::{CompiledRule, Rule};
pub use sinks::Sink;
pub use watcher::Watcher;
