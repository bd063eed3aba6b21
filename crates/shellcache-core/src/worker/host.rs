//! Lifecycle event delivery.
//!
//! `WorkerHost` plays the part of the runtime that owns the workers: it keeps
//! a waiting slot and an active slot, routes fetch events to the active
//! worker, and promotes a waiting worker on activation or forced takeover.
//! `WorkerHost::spawn` wraps it in an event loop where each event carries a
//! completion signal.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{ActivationReport, FetchOutcome, InstallReport, MessageOutcome, ShellWorker};
use crate::net::Request;

/// Buffer size for the event channel.
/// Fetch events are handed off to their own tasks, so the queue drains fast.
const CHANNEL_BUFFER_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

struct Slot {
    worker: Arc<ShellWorker>,
    state: WorkerState,
}

#[derive(Default)]
struct Registration {
    installing: Option<Slot>,
    waiting: Option<Slot>,
    active: Option<Slot>,
    /// Workers that failed to install, were replaced while waiting, or were
    /// retired from the active slot.
    redundant: usize,
    clients_claimed: bool,
}

/// Snapshot of the host's slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostStatus {
    pub installing: Option<WorkerState>,
    pub waiting: Option<WorkerState>,
    pub active: Option<WorkerState>,
    pub redundant: usize,
    pub clients_claimed: bool,
}

pub enum Event {
    Install(Arc<ShellWorker>),
    Activate,
    Fetch(Request),
    Message(String),
}

#[derive(Debug)]
pub enum EventOutcome {
    Installed(InstallReport),
    /// `None` when there was no waiting worker to activate.
    Activated(Option<ActivationReport>),
    Fetched(FetchOutcome),
    Message(MessageOutcome),
}

#[derive(Default)]
pub struct WorkerHost {
    registration: RwLock<Registration>,
}

impl WorkerHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a worker and park it in the waiting slot. A failed install
    /// makes the worker redundant and leaves the waiting and active slots
    /// untouched.
    pub async fn install(&self, worker: Arc<ShellWorker>) -> Result<InstallReport> {
        self.registration.write().await.installing = Some(Slot {
            worker: worker.clone(),
            state: WorkerState::Installing,
        });
        debug!("Installing worker");

        let result = worker.install().await;

        let mut registration = self.registration.write().await;
        // A newer install may have taken the slot meanwhile
        if registration
            .installing
            .as_ref()
            .is_some_and(|slot| Arc::ptr_eq(&slot.worker, &worker))
        {
            registration.installing = None;
        }
        match result {
            Ok(report) => {
                let previous = registration.waiting.replace(Slot {
                    worker,
                    state: WorkerState::Installed,
                });
                if previous.is_some() {
                    registration.redundant += 1;
                    debug!(state = ?WorkerState::Redundant, "Replaced previously waiting worker");
                }
                Ok(report)
            }
            Err(e) => {
                registration.redundant += 1;
                warn!(state = ?WorkerState::Redundant, error = %e, "Worker install failed");
                Err(e)
            }
        }
    }

    /// Activate the waiting worker, if any. The previous active worker keeps
    /// serving until activation completes.
    pub async fn activate_waiting(&self) -> Option<ActivationReport> {
        let worker = {
            let mut registration = self.registration.write().await;
            let slot = registration.waiting.as_mut()?;
            slot.state = WorkerState::Activating;
            slot.worker.clone()
        };

        let report = worker.activate().await;

        let mut registration = self.registration.write().await;
        // A newer install may have replaced the waiting worker meanwhile
        if registration
            .waiting
            .as_ref()
            .is_some_and(|slot| Arc::ptr_eq(&slot.worker, &worker))
        {
            registration.waiting = None;
        }
        let previous = registration.active.replace(Slot {
            worker,
            state: WorkerState::Activated,
        });
        if previous.is_some() {
            registration.redundant += 1;
            debug!(state = ?WorkerState::Redundant, "Previous active worker retired");
        }
        if report.clients_claimed {
            registration.clients_claimed = true;
        }
        Some(report)
    }

    /// Install, then activate straight away when the worker asked to skip
    /// waiting or nothing is active yet.
    pub async fn register(&self, worker: Arc<ShellWorker>) -> Result<WorkerState> {
        self.install(worker.clone()).await?;

        let has_active = self.registration.read().await.active.is_some();
        if worker.skip_waiting_requested() || !has_active {
            self.activate_waiting().await;
            Ok(WorkerState::Activated)
        } else {
            info!("New worker installed, waiting for the active worker to be released");
            Ok(WorkerState::Installed)
        }
    }

    /// Route a request to the active worker.
    pub async fn fetch(&self, request: &Request) -> Result<FetchOutcome> {
        let active = self
            .registration
            .read()
            .await
            .active
            .as_ref()
            .map(|slot| slot.worker.clone());
        match active {
            Some(worker) => worker.handle_fetch(request).await,
            None => Ok(FetchOutcome::Passthrough),
        }
    }

    /// Deliver a message to the waiting worker if there is one, otherwise to
    /// the active one. `skipWaiting` on a waiting worker promotes it.
    pub async fn post_message(&self, data: &str) -> Result<MessageOutcome> {
        let (worker, is_waiting) = {
            let registration = self.registration.read().await;
            match (&registration.waiting, &registration.active) {
                (Some(slot), _) => (slot.worker.clone(), true),
                (None, Some(slot)) => (slot.worker.clone(), false),
                (None, None) => return Err(anyhow!("No worker registered to receive messages")),
            }
        };

        let outcome = worker.handle_message(data).await?;
        if outcome == MessageOutcome::SkipWaiting && is_waiting {
            self.activate_waiting().await;
            info!("Waiting worker took over; clients must reload to use it");
        }
        Ok(outcome)
    }

    pub async fn status(&self) -> HostStatus {
        let registration = self.registration.read().await;
        HostStatus {
            installing: registration.installing.as_ref().map(|s| s.state),
            waiting: registration.waiting.as_ref().map(|s| s.state),
            active: registration.active.as_ref().map(|s| s.state),
            redundant: registration.redundant,
            clients_claimed: registration.clients_claimed,
        }
    }

    pub async fn dispatch(&self, event: Event) -> Result<EventOutcome> {
        match event {
            Event::Install(worker) => self.install(worker).await.map(EventOutcome::Installed),
            Event::Activate => Ok(EventOutcome::Activated(self.activate_waiting().await)),
            Event::Fetch(request) => self.fetch(&request).await.map(EventOutcome::Fetched),
            Event::Message(data) => self.post_message(&data).await.map(EventOutcome::Message),
        }
    }

    /// Run an event loop over this host. Lifecycle and message events are
    /// handled one at a time in arrival order; fetch events run on their own
    /// tasks and interleave freely. The loop ends once every handle is
    /// dropped.
    pub fn spawn(self: Arc<Self>) -> (HostHandle, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Envelope>(CHANNEL_BUFFER_SIZE);
        let join = tokio::spawn(async move {
            while let Some(Envelope { event, done }) = rx.recv().await {
                match event {
                    Event::Fetch(request) => {
                        let host = self.clone();
                        tokio::spawn(async move {
                            let result = host.fetch(&request).await.map(EventOutcome::Fetched);
                            let _ = done.send(result);
                        });
                    }
                    other => {
                        let result = self.dispatch(other).await;
                        let _ = done.send(result);
                    }
                }
            }
            debug!("Worker host event loop stopped");
        });
        (HostHandle { tx }, join)
    }
}

struct Envelope {
    event: Event,
    done: oneshot::Sender<Result<EventOutcome>>,
}

/// Sends events to a spawned [`WorkerHost`].
#[derive(Clone)]
pub struct HostHandle {
    tx: mpsc::Sender<Envelope>,
}

impl HostHandle {
    /// Queue an event. The returned receiver resolves when the handler
    /// finishes.
    pub async fn send(&self, event: Event) -> Result<oneshot::Receiver<Result<EventOutcome>>> {
        let (done, rx) = oneshot::channel();
        self.tx
            .send(Envelope { event, done })
            .await
            .map_err(|_| anyhow!("Worker host is not running"))?;
        Ok(rx)
    }

    /// Queue an event and wait for its handler to finish.
    pub async fn dispatch(&self, event: Event) -> Result<EventOutcome> {
        self.send(event)
            .await?
            .await
            .context("Worker host dropped the event")?
    }
}
