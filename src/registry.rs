//! Receiver registry
//!
//! Holds one sink, one bounded FIFO queue and the pending drain waiters per
//! receiver. The registry itself is a serialised actor: a single task owns
//! all state and every mutation arrives as a command message. Sink calls run
//! in worker tasks off that loop and report back asynchronously, so `send`
//! never blocks the producer.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{ExporterError, Result};
use crate::event::Event;
use crate::metrics;
use crate::sinks::Sink;

/// Delivery counters, shared with the handle for logging and tests.
#[derive(Debug, Default)]
pub struct RegistryMetrics {
    /// Events accepted into some queue
    pub received: AtomicU64,
    /// Worker completions with a sink success
    pub delivered: AtomicU64,
    /// Worker completions with a sink error
    pub failed: AtomicU64,
    /// Events rejected because a queue was full
    pub dropped_full: AtomicU64,
    /// Events addressed to a receiver that does not exist
    pub dropped_unknown: AtomicU64,
}

enum Command {
    Send {
        name: String,
        event: Event,
    },
    /// A worker finished (success or failure); the queue advances.
    Dispatched {
        name: String,
    },
    Drain {
        name: String,
        reply: oneshot::Sender<()>,
    },
    Close {
        name: String,
        reply: oneshot::Sender<()>,
    },
    CloseAll {
        reply: oneshot::Sender<()>,
    },
}

struct ReceiverState {
    sink: Arc<dyn Sink>,
    /// Events accepted but not yet handed to a worker.
    queue: VecDeque<Event>,
    /// Workers currently running a `sink.send`.
    in_flight: usize,
    max_concurrency: usize,
    waiters: Vec<oneshot::Sender<()>>,
}

impl ReceiverState {
    /// Queue occupancy for the bound and for drain: pending plus in-flight.
    fn len(&self) -> usize {
        self.queue.len() + self.in_flight
    }
}

/// Registry under construction: receivers are registered, then [`spawn`]
/// starts the actor.
///
/// [`spawn`]: Registry::spawn
pub struct Registry {
    max_queue_size: usize,
    order: Vec<String>,
    receivers: HashMap<String, ReceiverState>,
}

impl Registry {
    pub fn new(max_queue_size: usize) -> Self {
        Self {
            max_queue_size,
            order: Vec::new(),
            receivers: HashMap::new(),
        }
    }

    /// Register a receiver's sink. Registration order is the drain and close
    /// order.
    pub fn register(&mut self, name: impl Into<String>, sink: Arc<dyn Sink>, max_concurrency: usize) {
        let name = name.into();
        info!(receiver = %name, "registered receiver");
        self.order.push(name.clone());
        self.receivers.insert(
            name,
            ReceiverState {
                sink,
                queue: VecDeque::new(),
                in_flight: 0,
                max_concurrency: max_concurrency.max(1),
                waiters: Vec::new(),
            },
        );
    }

    /// Start the actor task and return the cloneable handle.
    pub fn spawn(self) -> RegistryHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let metrics = Arc::new(RegistryMetrics::default());

        let actor = Actor {
            max_queue_size: self.max_queue_size,
            order: self.order.clone(),
            receivers: self.receivers,
            // Weak: the actor must not keep its own mailbox open once every
            // handle and worker is gone.
            tx: tx.downgrade(),
            metrics: Arc::clone(&metrics),
        };
        tokio::spawn(actor.run(rx));

        RegistryHandle {
            tx,
            order: Arc::new(self.order),
            metrics,
        }
    }
}

/// Cloneable handle to the registry actor.
#[derive(Clone)]
pub struct RegistryHandle {
    tx: mpsc::UnboundedSender<Command>,
    order: Arc<Vec<String>>,
    metrics: Arc<RegistryMetrics>,
}

impl RegistryHandle {
    /// Fire-and-forget enqueue. Unknown receivers and full queues drop the
    /// event with a log line; the producer is never blocked.
    pub fn send(&self, name: &str, event: Event) {
        let command = Command::Send {
            name: name.to_string(),
            event,
        };
        if self.tx.send(command).is_err() {
            warn!(receiver = %name, "registry is gone, dropping event");
        }
    }

    /// Wait until the receiver's queue is empty, bounded by `timeout`.
    pub async fn drain(&self, name: &str, timeout: Duration) -> Result<()> {
        let (reply, done) = oneshot::channel();
        self.tx
            .send(Command::Drain {
                name: name.to_string(),
                reply,
            })
            .map_err(|_| ExporterError::RegistryClosed)?;

        match tokio::time::timeout(timeout, done).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(ExporterError::RegistryClosed),
            Err(_) => Err(ExporterError::DrainTimeout(name.to_string())),
        }
    }

    /// Drain every receiver in registration order against one shared
    /// deadline; the first error stops the walk.
    pub async fn drain_all(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        for name in self.order.iter() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ExporterError::DrainTimeout(name.clone()));
            }
            self.drain(name, remaining).await?;
        }
        Ok(())
    }

    /// Close one receiver: its sink is released, its queue and pending
    /// drainers are discharged.
    pub async fn close(&self, name: &str) -> Result<()> {
        let (reply, done) = oneshot::channel();
        self.tx
            .send(Command::Close {
                name: name.to_string(),
                reply,
            })
            .map_err(|_| ExporterError::RegistryClosed)?;
        done.await.map_err(|_| ExporterError::RegistryClosed)
    }

    /// Close every receiver in registration order.
    pub async fn close_all(&self) -> Result<()> {
        let (reply, done) = oneshot::channel();
        self.tx
            .send(Command::CloseAll { reply })
            .map_err(|_| ExporterError::RegistryClosed)?;
        done.await.map_err(|_| ExporterError::RegistryClosed)
    }

    /// Receiver names in registration order.
    pub fn receiver_names(&self) -> &[String] {
        &self.order
    }

    pub fn metrics(&self) -> &RegistryMetrics {
        &self.metrics
    }
}

struct Actor {
    max_queue_size: usize,
    order: Vec<String>,
    receivers: HashMap<String, ReceiverState>,
    tx: mpsc::WeakUnboundedSender<Command>,
    metrics: Arc<RegistryMetrics>,
}

impl Actor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Send { name, event } => self.handle_send(name, event),
                Command::Dispatched { name } => self.handle_dispatched(&name),
                Command::Drain { name, reply } => self.handle_drain(&name, reply),
                Command::Close { name, reply } => {
                    self.close_receiver(&name).await;
                    let _ = reply.send(());
                }
                Command::CloseAll { reply } => {
                    for name in self.order.clone() {
                        self.close_receiver(&name).await;
                    }
                    let _ = reply.send(());
                }
            }
        }

        info!(
            received = self.metrics.received.load(Ordering::Relaxed),
            delivered = self.metrics.delivered.load(Ordering::Relaxed),
            failed = self.metrics.failed.load(Ordering::Relaxed),
            dropped_full = self.metrics.dropped_full.load(Ordering::Relaxed),
            dropped_unknown = self.metrics.dropped_unknown.load(Ordering::Relaxed),
            "registry stopped"
        );
    }

    fn handle_send(&mut self, name: String, event: Event) {
        let Some(state) = self.receivers.get_mut(&name) else {
            self.metrics.dropped_unknown.fetch_add(1, Ordering::Relaxed);
            metrics::try_record_discarded(metrics::REASON_UNKNOWN_RECEIVER);
            warn!(receiver = %name, "unknown receiver, dropping event");
            return;
        };

        if state.len() >= self.max_queue_size {
            self.metrics.dropped_full.fetch_add(1, Ordering::Relaxed);
            metrics::try_record_discarded(metrics::REASON_QUEUE_FULL);
            warn!(
                receiver = %name,
                capacity = self.max_queue_size,
                "queue full, dropping event"
            );
            return;
        }

        state.queue.push_back(event);
        self.metrics.received.fetch_add(1, Ordering::Relaxed);
        self.dispatch(&name);
    }

    /// Hand queued events to workers up to the receiver's concurrency cap.
    fn dispatch(&mut self, name: &str) {
        let Some(state) = self.receivers.get_mut(name) else {
            return;
        };

        while state.in_flight < state.max_concurrency {
            let Some(tx) = self.tx.upgrade() else {
                break;
            };
            let Some(event) = state.queue.pop_front() else {
                break;
            };
            state.in_flight += 1;

            let sink = Arc::clone(&state.sink);
            let name = name.to_string();
            let metrics = Arc::clone(&self.metrics);
            tokio::spawn(async move {
                // A panicking sink must not stall the queue.
                let outcome = std::panic::AssertUnwindSafe(sink.send(&event))
                    .catch_unwind()
                    .await;
                match outcome {
                    Ok(Ok(())) => {
                        metrics.delivered.fetch_add(1, Ordering::Relaxed);
                        crate::metrics::try_record_sent(&name);
                    }
                    Ok(Err(e)) => {
                        metrics.failed.fetch_add(1, Ordering::Relaxed);
                        crate::metrics::try_record_discarded(crate::metrics::REASON_SINK_ERROR);
                        error!(receiver = %name, error = %e, "sink delivery failed");
                    }
                    Err(_) => {
                        metrics.failed.fetch_add(1, Ordering::Relaxed);
                        crate::metrics::try_record_discarded(crate::metrics::REASON_SINK_ERROR);
                        error!(receiver = %name, "sink panicked during delivery");
                    }
                }
                let _ = tx.send(Command::Dispatched { name });
            });
        }
    }

    fn handle_dispatched(&mut self, name: &str) {
        {
            let Some(state) = self.receivers.get_mut(name) else {
                return;
            };
            state.in_flight -= 1;
        }
        self.dispatch(name);

        if let Some(state) = self.receivers.get_mut(name) {
            if state.len() == 0 {
                for waiter in state.waiters.drain(..) {
                    let _ = waiter.send(());
                }
            }
        }
    }

    fn handle_drain(&mut self, name: &str, reply: oneshot::Sender<()>) {
        match self.receivers.get_mut(name) {
            // No receiver means nothing to wait for.
            None => {
                let _ = reply.send(());
            }
            Some(state) if state.len() == 0 => {
                let _ = reply.send(());
            }
            Some(state) => state.waiters.push(reply),
        }
    }

    async fn close_receiver(&mut self, name: &str) {
        let Some(mut state) = self.receivers.remove(name) else {
            return;
        };
        debug!(receiver = %name, pending = state.len(), "closing receiver");
        state.sink.close().await;
        for waiter in state.waiters.drain(..) {
            let _ = waiter.send(());
        }
    }
}
