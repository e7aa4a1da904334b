//! Engine supervisor
//!
//! Binds the watcher, the route tree and the registry: events from the
//! watcher are stamped with the cluster name, evaluated against the route
//! tree, and emitted into per-receiver queues. Startup is registry first,
//! watcher second; shutdown runs in reverse with a bounded drain.

use std::time::Duration;

use kube::Client;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::event::Event;
use crate::registry::{Registry, RegistryHandle};
use crate::route::CompiledRoute;
use crate::sinks;
use crate::watcher::{Watcher, WatcherSettings};

/// Default bound on the shutdown drain.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Capacity of the watcher-to-engine channel.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Stamp the cluster name, evaluate the route tree, and hand each emission
/// to the registry. One call per incoming event.
pub fn dispatch_event(
    route: &CompiledRoute,
    cluster_name: &str,
    registry: &RegistryHandle,
    event: Event,
) {
    let event = event.with_cluster_name(cluster_name);
    route.process(&event, &mut |receiver, event| {
        registry.send(receiver, event.clone());
    });
}

/// A running exporter engine.
pub struct Engine {
    registry: RegistryHandle,
    watcher: Watcher,
    dispatch: JoinHandle<()>,
    drain_timeout: Duration,
}

impl Engine {
    /// Seed the registry from the configured receivers, then start the
    /// dispatch loop and the watcher. A sink that fails to start fails its
    /// receiver only; the rest of the engine comes up.
    pub async fn start(config: Config, client: Client, drain_timeout: Duration) -> Result<Engine> {
        let mut registry = Registry::new(config.max_queue_size);
        for receiver in &config.receivers {
            match sinks::build(receiver).await {
                Ok(sink) => {
                    registry.register(&receiver.name, sink, receiver.max_concurrency.unwrap_or(1));
                }
                Err(e) => {
                    error!(
                        receiver = %receiver.name,
                        error = %e,
                        "receiver failed to start and will not run"
                    );
                }
            }
        }
        let registry = registry.spawn();

        let route = config.route.compile();
        let cluster_name = config.cluster_name.clone();
        let (sender, mut events) = mpsc::channel::<Event>(EVENT_CHANNEL_CAPACITY);

        let dispatch = {
            let registry = registry.clone();
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    dispatch_event(&route, &cluster_name, &registry, event);
                }
            })
        };

        let watcher = Watcher::start(client, WatcherSettings::from_config(&config), sender);

        info!(
            receivers = registry.receiver_names().len(),
            drain_timeout_ms = drain_timeout.as_millis() as u64,
            "engine started"
        );

        Ok(Engine {
            registry,
            watcher,
            dispatch,
            drain_timeout,
        })
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    /// Ordered shutdown: stop the watcher, let the dispatch loop finish what
    /// it already holds, drain every queue best-effort, release the sinks.
    pub async fn shutdown(self) -> Result<()> {
        info!("engine shutting down");
        self.watcher.stop();

        // Stopping the watcher drops the event sender, which ends the
        // dispatch loop after in-flight messages run to completion.
        let _ = self.dispatch.await;

        if let Err(e) = self.registry.drain_all(self.drain_timeout).await {
            warn!(error = %e, "drain did not complete, closing anyway");
        }
        self.registry.close_all().await?;

        info!("engine shutdown complete");
        Ok(())
    }
}
