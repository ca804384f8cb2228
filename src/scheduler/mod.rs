//! Notification scheduler
//!
//! Single-threaded periodic tick over `NotificationSpec` rows. One-shot
//! state machine: an active spec whose fire time falls inside the
//! `(now - grace, now]` window gets at most one delivery per 24 h window,
//! then deactivates. The delivery log row is written before any push
//! attempt so notification history records attempts even when the owner
//! has no subscriptions.

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::store::Database;
use crate::types::{NotificationSpec, PushSubscription};

/// Payload handed to the push transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub url: String,
    pub tag: String,
}

/// Outcome of one delivery attempt. Transient failures leave the spec
/// active for the next tick; permanent failures kill the subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Delivered,
    TransientFailure,
    PermanentFailure,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn send(&self, subscription: &PushSubscription, message: &PushMessage) -> PushOutcome;
}

/// Injected time source so ticks are testable
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Counts from one scheduler tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub examined: usize,
    pub delivered: usize,
    pub skipped: usize,
    pub retained: usize,
}

/// A spec delivered inside the window is suppressed, whoever ticks.
fn in_dedup_window(spec: &NotificationSpec, now: DateTime<Utc>, window: Duration) -> bool {
    matches!(spec.last_sent_at, Some(last) if now - last < window)
}

pub struct Scheduler<T: PushTransport, C: Clock> {
    db: Arc<Database>,
    transport: T,
    clock: C,
    config: SchedulerConfig,
}

impl<T: PushTransport, C: Clock> Scheduler<T, C> {
    pub fn new(db: Arc<Database>, transport: T, clock: C, config: SchedulerConfig) -> Self {
        Self {
            db,
            transport,
            clock,
            config,
        }
    }

    /// Run one tick: find due specs, deliver, deactivate. Errors from the
    /// transport are absorbed; only storage errors propagate.
    pub async fn tick(&self, owner_id: Option<i64>) -> Result<TickReport> {
        let started = Instant::now();
        let now = self.clock.now();
        let grace_cutoff = now - Duration::seconds(self.config.grace_secs as i64);
        let dedup_window = Duration::hours(self.config.dedup_window_hours as i64);

        let due = self.db.due_specs(now, grace_cutoff, owner_id).await?;
        let mut report = TickReport {
            examined: due.len(),
            ..TickReport::default()
        };

        for spec in due {
            if in_dedup_window(&spec, now, dedup_window) {
                report.skipped += 1;
                continue;
            }

            match self.fire(&spec, now).await? {
                true => {
                    self.db.mark_spec_delivered(spec.id, now).await?;
                    report.delivered += 1;
                }
                false => report.retained += 1,
            }
        }

        let elapsed = started.elapsed();
        if elapsed.as_secs() > self.config.tick_budget_secs {
            warn!(
                elapsed_secs = elapsed.as_secs(),
                budget_secs = self.config.tick_budget_secs,
                "scheduler tick exceeded its soft budget"
            );
        }
        info!(
            examined = report.examined,
            delivered = report.delivered,
            skipped = report.skipped,
            retained = report.retained,
            "scheduler tick finished"
        );
        Ok(report)
    }

    /// Deliver one spec. Returns true when the spec counts as delivered:
    /// any push succeeded, the owner has no subscriptions, or every
    /// remaining failure was permanent (retrying would never succeed).
    async fn fire(&self, spec: &NotificationSpec, now: DateTime<Utc>) -> Result<bool> {
        let entry = match self.db.get_entry(spec.entry_id).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(spec_id = spec.id, error = %e, "reminder points at a missing entry");
                return Ok(true);
            }
        };

        let message = PushMessage {
            title: format!("{} reminder", entry.symbol),
            body: spec
                .message
                .clone()
                .unwrap_or_else(|| format!("Time to review {}", entry.name)),
            url: format!("/entries/{}", entry.id),
            tag: Uuid::new_v4().to_string(),
        };

        // history first: the attempt is visible even with zero subscriptions
        self.db
            .insert_delivery(entry.owner_id, &message.title, &message.body, &message.url, now)
            .await?;

        let subscriptions = self.db.active_subscriptions(entry.owner_id).await?;
        let mut any_success = false;
        let mut any_transient = false;

        for subscription in &subscriptions {
            match self.transport.send(subscription, &message).await {
                PushOutcome::Delivered => any_success = true,
                PushOutcome::TransientFailure => {
                    any_transient = true;
                    warn!(
                        spec_id = spec.id,
                        subscription_id = subscription.id,
                        "push delivery failed transiently"
                    );
                }
                PushOutcome::PermanentFailure => {
                    warn!(
                        spec_id = spec.id,
                        subscription_id = subscription.id,
                        "push endpoint gone, deactivating subscription"
                    );
                    self.db.deactivate_subscription(subscription.id).await?;
                }
            }
        }

        Ok(any_success || !any_transient)
    }

    /// Drive ticks forever at the configured interval. Tick errors are
    /// logged and the loop continues.
    pub async fn run(&self, owner_id: Option<i64>) -> Result<()> {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(
            self.config.tick_interval_secs,
        ));
        loop {
            interval.tick().await;
            if let Err(e) = self.tick(owner_id).await {
                warn!(error = %e, "scheduler tick failed");
            }
        }
    }
}
