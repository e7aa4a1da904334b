//! Event watcher
//!
//! Consumes the raw Kubernetes watch stream for Event resources and turns
//! `ADDED` messages into [`Event`]s on a channel. `MODIFIED` and `DELETED`
//! are deliberately ignored: every event update surfaces as a new object,
//! and suppressing the others avoids duplicates.
//!
//! Incoming events are age-filtered and, unless lookup is disabled, enriched
//! with the involved object's metadata before they are handed on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::Event as CoreEvent;
use kube::api::{Api, ListParams, WatchEvent, WatchParams};
use kube::Client;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::event::Event;
use crate::lookup::{apply_metadata, LookupOutcome, ObjectLookup};
use crate::metrics;

/// Pause before re-establishing a failed watch.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Watcher counters, shared with the handle.
#[derive(Debug, Default)]
pub struct WatcherMetrics {
    pub received: AtomicU64,
    pub dropped_old: AtomicU64,
    pub enriched: AtomicU64,
    pub lookup_failed: AtomicU64,
}

/// Settings the watcher needs, lifted out of the full config.
#[derive(Clone)]
pub struct WatcherSettings {
    pub namespace: Option<String>,
    pub max_event_age: Duration,
    pub omit_lookup: bool,
    pub cache_size: usize,
}

impl WatcherSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            namespace: config.namespace.clone(),
            max_event_age: config.max_event_age(),
            omit_lookup: config.omit_lookup,
            cache_size: config.cache_size,
        }
    }
}

/// A running watch consumer. Dropping the handle does not stop it; call
/// [`Watcher::stop`].
pub struct Watcher {
    task: JoinHandle<()>,
    metrics: Arc<WatcherMetrics>,
}

impl Watcher {
    /// Start the single background consumer. Events flow into `sender`.
    pub fn start(client: Client, settings: WatcherSettings, sender: mpsc::Sender<Event>) -> Watcher {
        let metrics = Arc::new(WatcherMetrics::default());
        let consumer = Consumer {
            api: match &settings.namespace {
                Some(namespace) => Api::namespaced(client.clone(), namespace),
                None => Api::all(client.clone()),
            },
            lookup: ObjectLookup::new(client, settings.cache_size),
            settings,
            sender,
            metrics: Arc::clone(&metrics),
        };

        let task = tokio::spawn(async move {
            consumer.run().await;
        });

        Watcher { task, metrics }
    }

    /// Cancel the consumer; any in-flight message is dropped.
    pub fn stop(self) {
        self.task.abort();
        info!(
            received = self.metrics.received.load(Ordering::Relaxed),
            dropped_old = self.metrics.dropped_old.load(Ordering::Relaxed),
            enriched = self.metrics.enriched.load(Ordering::Relaxed),
            lookup_failed = self.metrics.lookup_failed.load(Ordering::Relaxed),
            "watcher stopped"
        );
    }

    pub fn metrics(&self) -> &WatcherMetrics {
        &self.metrics
    }
}

enum Disposition {
    /// Reconnect the watch from this resource version.
    Resume(String),
    /// The server no longer has our history; list again.
    Relist,
    /// The downstream channel is gone.
    Stop,
}

struct Consumer {
    api: Api<CoreEvent>,
    lookup: ObjectLookup,
    settings: WatcherSettings,
    sender: mpsc::Sender<Event>,
    metrics: Arc<WatcherMetrics>,
}

impl Consumer {
    async fn run(&self) {
        info!(
            namespace = ?self.settings.namespace,
            max_age_secs = self.settings.max_event_age.as_secs(),
            "watcher starting"
        );

        'relist: loop {
            // Start from the current list head so only new events arrive.
            let mut resource_version = match self.latest_resource_version().await {
                Ok(rv) => rv,
                Err(e) => {
                    warn!(error = %e, "cannot list events, retrying");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    continue;
                }
            };

            loop {
                match self.watch_once(resource_version).await {
                    Disposition::Resume(rv) => resource_version = rv,
                    Disposition::Relist => {
                        tokio::time::sleep(RECONNECT_DELAY).await;
                        continue 'relist;
                    }
                    Disposition::Stop => return,
                }
            }
        }
    }

    async fn latest_resource_version(&self) -> kube::Result<String> {
        let list = self.api.list(&ListParams::default().limit(1)).await?;
        Ok(list.metadata.resource_version.unwrap_or_else(|| "0".to_string()))
    }

    /// Consume one watch stream until it ends. The returned disposition says
    /// where to pick up: resume from a resource version, re-list (history
    /// gone), or stop entirely (downstream closed).
    async fn watch_once(&self, mut resource_version: String) -> Disposition {
        let params = WatchParams::default();
        let stream = match self.api.watch(&params, &resource_version).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "watch failed to start");
                tokio::time::sleep(RECONNECT_DELAY).await;
                return Disposition::Resume(resource_version);
            }
        };
        let mut stream = stream.boxed();

        loop {
            let message = match stream.try_next().await {
                Ok(Some(message)) => message,
                Ok(None) => {
                    debug!("watch stream ended");
                    return Disposition::Resume(resource_version);
                }
                Err(e) => {
                    warn!(error = %e, "watch stream error");
                    metrics::try_record_watch_error();
                    return Disposition::Resume(resource_version);
                }
            };

            match message {
                WatchEvent::Added(core_event) => {
                    if let Some(rv) = &core_event.metadata.resource_version {
                        resource_version = rv.clone();
                    }
                    if !self.process(core_event).await {
                        return Disposition::Stop;
                    }
                }
                WatchEvent::Modified(object) | WatchEvent::Deleted(object) => {
                    // Not propagated; only tracked for the resume position.
                    if let Some(rv) = object.metadata.resource_version {
                        resource_version = rv;
                    }
                }
                WatchEvent::Bookmark(bookmark) => {
                    resource_version = bookmark.metadata.resource_version;
                }
                WatchEvent::Error(status) if status.code == 410 => {
                    // History expired under us; take a fresh list head.
                    warn!("watch history expired, relisting");
                    return Disposition::Relist;
                }
                WatchEvent::Error(status) => {
                    warn!(code = status.code, reason = %status.reason, "watch error status");
                    return Disposition::Resume(resource_version);
                }
            }
        }
    }

    /// Age-filter, enrich and forward one event. Returns false when the
    /// channel is closed.
    async fn process(&self, core_event: CoreEvent) -> bool {
        self.metrics.received.fetch_add(1, Ordering::Relaxed);
        metrics::try_record_received();
        let mut event = Event::from(core_event);

        if is_too_old(&event, self.settings.max_event_age, chrono::Utc::now()) {
            self.metrics.dropped_old.fetch_add(1, Ordering::Relaxed);
            metrics::try_record_discarded(metrics::REASON_STALE);
            debug!(event = %event.name, "dropping stale event");
            return true;
        }

        if !self.settings.omit_lookup {
            match self.lookup.lookup(&event.involved_object).await {
                LookupOutcome::Found(metadata) => {
                    apply_metadata(&mut event.involved_object, metadata);
                    self.metrics.enriched.fetch_add(1, Ordering::Relaxed);
                }
                LookupOutcome::NotFound => {
                    event.involved_object.deleted = true;
                }
                LookupOutcome::Failed => {
                    self.metrics.lookup_failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        if self.sender.send(event).await.is_err() {
            debug!("event channel closed, stopping consumer");
            return false;
        }
        true
    }
}

/// An event is stale when its reference timestamp (`lastTimestamp`, falling
/// back to `eventTime`) is older than the cutoff. Events without either
/// timestamp are kept.
fn is_too_old(event: &Event, max_age: Duration, now: chrono::DateTime<chrono::Utc>) -> bool {
    match event.age_timestamp() {
        Some(timestamp) => (now - timestamp)
            .to_std()
            .map(|age| age > max_age)
            .unwrap_or(false),
        None => false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn now() -> chrono::DateTime<chrono::Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_recent_event_kept() {
        let event = Event {
            last_timestamp: Some(now() - chrono::Duration::seconds(3)),
            ..Default::default()
        };
        assert!(!is_too_old(&event, Duration::from_secs(5), now()));
    }

    #[test]
    fn test_stale_event_dropped() {
        let event = Event {
            last_timestamp: Some(now() - chrono::Duration::seconds(10)),
            ..Default::default()
        };
        assert!(is_too_old(&event, Duration::from_secs(5), now()));
    }

    #[test]
    fn test_event_time_only_is_filtered_by_it() {
        let event = Event {
            event_time: Some(now() - chrono::Duration::seconds(10)),
            ..Default::default()
        };
        assert!(is_too_old(&event, Duration::from_secs(5), now()));

        let fresh = Event {
            event_time: Some(now() - chrono::Duration::seconds(1)),
            ..Default::default()
        };
        assert!(!is_too_old(&fresh, Duration::from_secs(5), now()));
    }

    #[test]
    fn test_timestampless_event_kept() {
        assert!(!is_too_old(&Event::default(), Duration::from_secs(5), now()));
    }

    #[test]
    fn test_future_timestamp_kept() {
        let event = Event {
            last_timestamp: Some(now() + chrono::Duration::seconds(30)),
            ..Default::default()
        };
        assert!(!is_too_old(&event, Duration::from_secs(5), now()));
    }
}
