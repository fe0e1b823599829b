use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender, TrySendError};
use time::Date;

use crate::expiry::{Clock, Freshness};
use crate::model::Item;
use crate::storage::{ItemRepository, StoreResult};

/// An item in `warning` or `expired` state, with the numbers it was classified from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub item: Item,
    pub freshness: Freshness,
}

/// Items needing attention as of `today`, in insertion order.
pub fn pending_reminders(repo: &dyn ItemRepository, today: Date) -> StoreResult<Vec<Reminder>> {
    let reminders = repo
        .list_all()?
        .into_iter()
        .filter_map(|item| {
            let freshness = Freshness::assess(item.expiry_date, today);
            freshness
                .status
                .needs_attention()
                .then_some(Reminder { item, freshness })
        })
        .collect();
    Ok(reminders)
}

#[derive(Debug, Clone)]
pub enum ReminderEvent {
    Due {
        checked_on: Date,
        reminders: Vec<Reminder>,
    },
    Failed {
        message: String,
    },
}

/// Re-evaluates reminders on a fixed interval.
///
/// A tick and [`ReminderScheduler::check_now`] run the same computation against
/// the clock's current day, so a timer-driven refresh and a manual one agree.
#[derive(Clone)]
pub struct ReminderScheduler {
    repo: Arc<dyn ItemRepository>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl ReminderScheduler {
    pub fn new(repo: Arc<dyn ItemRepository>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            repo,
            clock,
            interval,
        }
    }

    pub fn check_now(&self) -> StoreResult<Vec<Reminder>> {
        pending_reminders(&*self.repo, self.clock.today())
    }

    /// Checks once immediately, then once per interval until the handle is stopped or dropped.
    /// At most one batch waits in [`ReminderHandle::events`]; ticks are dropped while it is unread.
    pub fn start(&self) -> Result<ReminderHandle> {
        let (stop_tx, stop_rx) = unbounded::<()>();
        let (events_tx, events_rx) = bounded(1);
        let scheduler = self.clone();
        let worker = thread::Builder::new()
            .name("larder-reminders".into())
            .spawn(move || scheduler.run(stop_rx, events_tx))
            .context("spawning reminder worker")?;
        tracing::info!(interval_secs = self.interval.as_secs(), "reminder polling started");
        Ok(ReminderHandle {
            stop_tx: Some(stop_tx),
            events: events_rx,
            worker: Some(worker),
        })
    }

    fn run(self, stop_rx: Receiver<()>, events_tx: Sender<ReminderEvent>) {
        loop {
            if let Some(event) = self.tick() {
                match events_tx.try_send(event) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        tracing::debug!("previous reminder batch not yet consumed, skipping");
                    }
                    Err(TrySendError::Disconnected(_)) => break,
                }
            }
            let stopped = select! {
                recv(stop_rx) -> _ => true,
                default(self.interval) => false,
            };
            if stopped {
                break;
            }
        }
        tracing::info!("reminder polling stopped");
    }

    fn tick(&self) -> Option<ReminderEvent> {
        let today = self.clock.today();
        match pending_reminders(&*self.repo, today) {
            Ok(reminders) if reminders.is_empty() => None,
            Ok(reminders) => {
                tracing::debug!(count = reminders.len(), %today, "reminders due");
                Some(ReminderEvent::Due {
                    checked_on: today,
                    reminders,
                })
            }
            Err(err) => {
                tracing::warn!(error = %err, "reminder check failed");
                Some(ReminderEvent::Failed {
                    message: err.to_string(),
                })
            }
        }
    }
}

/// Owns the polling worker. Stopping (or dropping) cancels future ticks and joins the thread.
pub struct ReminderHandle {
    stop_tx: Option<Sender<()>>,
    events: Receiver<ReminderEvent>,
    worker: Option<JoinHandle<()>>,
}

impl ReminderHandle {
    pub fn events(&self) -> &Receiver<ReminderEvent> {
        &self.events
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        drop(self.stop_tx.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("reminder worker panicked");
            }
        }
    }
}

impl Drop for ReminderHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
