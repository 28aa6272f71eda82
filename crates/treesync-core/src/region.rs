//! Async region driver
//!
//! Runs one [`Reconciler`] as a single tokio task consuming one mpsc queue,
//! so events are handled one at a time in arrival order. Fetches and the
//! debounce timer run as separate tasks and post their results back into
//! the same queue.

use crate::error::RegionError;
use crate::reconciler::{Effect, Event, Reconciler, Snapshot};
use crate::timer::{DebounceTimer, FetchTicket};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use treesync_fetch::{ItemFetcher, TransportError};
use treesync_model::{SelectionKey, SharedConfig};
use treesync_tree::DocumentStore;

/// Queue depth of the driver task
const QUEUE_CAPACITY: usize = 64;

enum Command<S> {
    Event(Event),
    Snapshot(oneshot::Sender<Snapshot>),
    Shutdown(oneshot::Sender<Reconciler<S>>),
}

/// Handle to a running region
#[derive(Debug)]
pub struct RegionHandle<S> {
    sender: mpsc::Sender<Command<S>>,
}

impl<S> Clone for RegionHandle<S> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<S> std::fmt::Debug for Command<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Event(event) => f.debug_tuple("Event").field(event).finish(),
            Self::Snapshot(_) => f.write_str("Snapshot"),
            Self::Shutdown(_) => f.write_str("Shutdown"),
        }
    }
}

impl<S> RegionHandle<S> {
    async fn send(&self, command: Command<S>) -> Result<(), RegionError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| RegionError::Closed)
    }

    /// Change the selection key
    ///
    /// # Errors
    /// `RegionError::Closed` if the region task has stopped
    pub async fn select(&self, key: Option<SelectionKey>) -> Result<(), RegionError> {
        self.send(Command::Event(Event::SelectionKeyChanged(key)))
            .await
    }

    /// Re-run the current selection
    ///
    /// # Errors
    /// `RegionError::Closed` if the region task has stopped
    pub async fn retrigger(&self) -> Result<(), RegionError> {
        self.send(Command::Event(Event::Retrigger)).await
    }

    /// Replace the shared config
    ///
    /// # Errors
    /// `RegionError::Closed` if the region task has stopped
    pub async fn set_config(&self, shared: SharedConfig) -> Result<(), RegionError> {
        self.send(Command::Event(Event::ConfigChanged(shared)))
            .await
    }

    /// Replace the shared config from an operator edit, parsed leniently
    ///
    /// # Errors
    /// `RegionError::Closed` if the region task has stopped
    pub async fn set_config_json(&self, value: &serde_json::Value) -> Result<(), RegionError> {
        self.set_config(SharedConfig::from_json_lenient(value)).await
    }

    /// Current snapshot, taken after every event queued before this call
    ///
    /// # Errors
    /// `RegionError::Closed` if the region task has stopped
    pub async fn snapshot(&self) -> Result<Snapshot, RegionError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx)).await?;
        rx.await.map_err(|_| RegionError::Closed)
    }

    /// Stop the region and take the reconciler back
    ///
    /// Outstanding fetches are left to finish; their results are dropped.
    ///
    /// # Errors
    /// `RegionError::Closed` if the region task had already stopped
    pub async fn shutdown(self) -> Result<Reconciler<S>, RegionError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Shutdown(tx)).await?;
        rx.await.map_err(|_| RegionError::Closed)
    }
}

/// Spawn the driver task for `reconciler`, fetching through `fetcher`.
///
/// The fetcher is re-tuned to the reconciler's `oversubscribe_factor`.
pub fn spawn_region<S>(
    reconciler: Reconciler<S>,
    fetcher: ItemFetcher,
) -> (RegionHandle<S>, JoinHandle<()>)
where
    S: DocumentStore + Send + 'static,
{
    let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
    let config = reconciler.config();
    let fetcher = fetcher.with_oversubscribe(config.oversubscribe_factor);
    let driver = Driver {
        fetch_timeout: config.fetch_timeout(),
        reconciler,
        fetcher,
        timer: DebounceTimer::new(),
        loopback: sender.downgrade(),
    };
    let task = tokio::spawn(driver.run(receiver));
    (RegionHandle { sender }, task)
}

struct Driver<S> {
    reconciler: Reconciler<S>,
    fetcher: ItemFetcher,
    timer: DebounceTimer,
    fetch_timeout: Option<Duration>,
    loopback: mpsc::WeakSender<Command<S>>,
}

impl<S> Driver<S>
where
    S: DocumentStore + Send + 'static,
{
    async fn run(mut self, mut receiver: mpsc::Receiver<Command<S>>) {
        tracing::debug!(region = %self.reconciler.region(), "region task started");
        while let Some(command) = receiver.recv().await {
            match command {
                Command::Event(event) => {
                    if let Event::DebounceElapsed { ticket } = &event {
                        self.timer.fired(*ticket);
                    }
                    let effects = self.reconciler.dispatch(event);
                    self.apply(effects);
                }
                Command::Snapshot(reply) => {
                    let _ = reply.send(self.reconciler.snapshot());
                }
                Command::Shutdown(reply) => {
                    self.timer.cancel_any();
                    tracing::debug!(region = %self.reconciler.region(), "region task shutting down");
                    let _ = reply.send(self.reconciler);
                    return;
                }
            }
        }
        tracing::debug!(region = %self.reconciler.region(), "all handles dropped, region task exiting");
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::StartFetch {
                    ticket,
                    key,
                    limit_hint,
                } => self.start_fetch(ticket, key, limit_hint),
                Effect::ArmDebounce { ticket, delay } => {
                    let loopback = self.loopback.clone();
                    self.timer.arm(ticket, delay, async move {
                        post(&loopback, Event::DebounceElapsed { ticket }).await;
                    });
                }
                Effect::CancelDebounce { ticket } => {
                    self.timer.cancel(ticket);
                }
            }
        }
    }

    fn start_fetch(&self, ticket: FetchTicket, key: SelectionKey, limit_hint: usize) {
        let fetcher = self.fetcher.clone();
        let loopback = self.loopback.clone();
        let deadline = self.fetch_timeout;

        tokio::spawn(async move {
            let fetch = fetcher.fetch(&key, limit_hint);
            let result = match deadline {
                Some(after) => tokio::time::timeout(after, fetch).await.unwrap_or_else(|_| {
                    Err(TransportError::Timeout {
                        after_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
                    })
                }),
                None => fetch.await,
            };
            post(&loopback, Event::ItemListResolved { ticket, key, result }).await;
        });
    }
}

/// Deliver `event` to the driver if it is still running
async fn post<S>(loopback: &mpsc::WeakSender<Command<S>>, event: Event) {
    let Some(sender) = loopback.upgrade() else {
        return;
    };
    if sender.send(Command::Event(event)).await.is_err() {
        tracing::trace!("region task gone, dropping event");
    }
}
