use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::store::{StateChange, VehicleFilter, VehicleState, VehicleStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    BackpressureExceeded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Update(StateChange),
    Closed(CloseReason),
}

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("broadcaster is not running")]
    Closed,
}

enum Command {
    Subscribe {
        filter: VehicleFilter,
        reply: oneshot::Sender<Registration>,
    },
    Unsubscribe(Uuid),
}

struct Registration {
    id: Uuid,
    snapshot: Vec<VehicleState>,
    updates: mpsc::Receiver<StateChange>,
    notice: oneshot::Receiver<CloseReason>,
}

/// Handle to the dispatcher task that fans state changes out to
/// subscribers.
#[derive(Clone)]
pub struct Broadcaster {
    commands: mpsc::UnboundedSender<Command>,
    active: Arc<AtomicUsize>,
}

impl Broadcaster {
    /// Spawn the dispatcher. It consumes `changes` (fed by the store) and
    /// runs until that channel closes.
    pub fn spawn(
        store: Arc<VehicleStore>,
        changes: mpsc::UnboundedReceiver<StateChange>,
        max_queue_depth: usize,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let active = Arc::new(AtomicUsize::new(0));

        let dispatcher = Dispatcher {
            store: Arc::downgrade(&store),
            subscribers: HashMap::new(),
            max_queue_depth: max_queue_depth.max(1),
            active: active.clone(),
        };
        tokio::spawn(dispatcher.run(changes, commands_rx));

        Self {
            commands: commands_tx,
            active,
        }
    }

    /// Register a subscriber. The returned subscription carries the current
    /// snapshot for `filter`; every later change is delivered as an update.
    pub async fn subscribe(&self, filter: VehicleFilter) -> Result<Subscription, BroadcastError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Subscribe {
                filter: filter.clone(),
                reply: reply_tx,
            })
            .map_err(|_| BroadcastError::Closed)?;
        let registration = reply_rx.await.map_err(|_| BroadcastError::Closed)?;

        Ok(Subscription {
            id: registration.id,
            filter,
            snapshot: registration.snapshot,
            updates: registration.updates,
            notice: Some(registration.notice),
            commands: self.commands.clone(),
        })
    }

    pub fn active_subscribers(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

pub struct Subscription {
    id: Uuid,
    filter: VehicleFilter,
    snapshot: Vec<VehicleState>,
    updates: mpsc::Receiver<StateChange>,
    notice: Option<oneshot::Receiver<CloseReason>>,
    commands: mpsc::UnboundedSender<Command>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn filter(&self) -> &VehicleFilter {
        &self.filter
    }

    /// The states current at registration. Empty once taken.
    pub fn take_snapshot(&mut self) -> Vec<VehicleState> {
        std::mem::take(&mut self.snapshot)
    }

    /// Next update, then a close notice if the subscriber was dropped for
    /// falling behind, then `None`.
    pub async fn next(&mut self) -> Option<Delivery> {
        if let Some(change) = self.updates.recv().await {
            return Some(Delivery::Update(change));
        }
        let notice = self.notice.take()?;
        notice.await.ok().map(Delivery::Closed)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Unsubscribe(self.id));
    }
}

struct Subscriber {
    filter: VehicleFilter,
    queue: mpsc::Sender<StateChange>,
    notice: oneshot::Sender<CloseReason>,
}

struct Dispatcher {
    // Weak so the store, which owns the sending half of `changes`, can be
    // dropped and end this task.
    store: Weak<VehicleStore>,
    subscribers: HashMap<Uuid, Subscriber>,
    max_queue_depth: usize,
    active: Arc<AtomicUsize>,
}

impl Dispatcher {
    async fn run(
        mut self,
        mut changes: mpsc::UnboundedReceiver<StateChange>,
        mut commands: mpsc::UnboundedReceiver<Command>,
    ) {
        loop {
            tokio::select! {
                biased;
                Some(command) = commands.recv() => self.handle(command),
                change = changes.recv() => match change {
                    Some(change) => self.publish(change),
                    None => break,
                },
            }
        }
        log::info!("Broadcaster stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Subscribe { filter, reply } => {
                // Snapshot and registration happen in one step of this task,
                // which is also the only consumer of `changes`: a change is
                // either visible in the snapshot or published after this.
                let snapshot = self
                    .store
                    .upgrade()
                    .map(|store| store.snapshot(&filter))
                    .unwrap_or_default();
                let (queue_tx, queue_rx) = mpsc::channel(self.max_queue_depth);
                let (notice_tx, notice_rx) = oneshot::channel();
                let id = Uuid::new_v4();

                let registration = Registration {
                    id,
                    snapshot,
                    updates: queue_rx,
                    notice: notice_rx,
                };
                if reply.send(registration).is_err() {
                    return;
                }

                log::debug!("Subscriber {} registered ({})", id, filter);
                self.subscribers.insert(
                    id,
                    Subscriber {
                        filter,
                        queue: queue_tx,
                        notice: notice_tx,
                    },
                );
                self.active.store(self.subscribers.len(), Ordering::SeqCst);
            }
            Command::Unsubscribe(id) => {
                if self.subscribers.remove(&id).is_some() {
                    log::debug!("Subscriber {} disconnected", id);
                    self.active.store(self.subscribers.len(), Ordering::SeqCst);
                }
            }
        }
    }

    fn publish(&mut self, change: StateChange) {
        let mut dropped = Vec::new();

        for (id, subscriber) in &self.subscribers {
            if !subscriber.filter.matches(&change.state) {
                continue;
            }
            match subscriber.queue.try_send(change.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => dropped.push((*id, true)),
                Err(TrySendError::Closed(_)) => dropped.push((*id, false)),
            }
        }

        if dropped.is_empty() {
            return;
        }
        for (id, overflowed) in dropped {
            let Some(subscriber) = self.subscribers.remove(&id) else {
                continue;
            };
            self.active.store(self.subscribers.len(), Ordering::SeqCst);
            if overflowed {
                log::info!(
                    "Subscriber {} exceeded queue depth {}, dropping",
                    id,
                    self.max_queue_depth
                );
                let _ = subscriber.notice.send(CloseReason::BackpressureExceeded);
            }
        }
    }
}
