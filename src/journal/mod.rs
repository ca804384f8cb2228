//! Journal service: the write path around the event log
//!
//! Every ledger mutation runs under a per-entry writer lock: append or
//! delete the event, replay the log, persist the projection, release. Two
//! writers on the same entry serialize; writers on different entries run in
//! parallel. Projection reads never take the lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::error::{JournalError, Result};
use crate::ledger::{self, split::rewrites_for, TrailRecord};
use crate::money::round_display;
use crate::store::Database;
use crate::types::{
    EntrySummary, FollowUpNote, JournalEntry, NewEntry, NewNote, NewReminder, NewSplit,
    NewTransaction,
};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

type EntryLocks = parking_lot::Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>;

pub struct JournalService {
    db: Arc<Database>,
    locks: EntryLocks,
    lock_timeout: Duration,
}

impl JournalService {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            locks: parking_lot::Mutex::new(HashMap::new()),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    fn entry_lock(&self, entry_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        locks.entry(entry_id).or_default().clone()
    }

    async fn acquire(&self, entry_id: i64) -> Result<tokio::sync::OwnedMutexGuard<()>> {
        let lock = self.entry_lock(entry_id);
        tokio::time::timeout(self.lock_timeout, lock.lock_owned())
            .await
            .map_err(|_| JournalError::ConcurrentModification(entry_id))
    }

    /// Replay the entry's event log and persist the projection. Must be
    /// called with the entry lock held.
    async fn recompute_projection(&self, entry_id: i64) -> Result<EntrySummary> {
        let events = self.db.list_events(entry_id).await?;
        let summary = ledger::replay(&events).summary;
        self.db.write_summary(entry_id, &summary).await?;
        Ok(summary)
    }

    // ---- inbound operations ----

    pub async fn create_entry(&self, new: &NewEntry) -> Result<i64> {
        let id = self.db.create_entry(new).await?;
        info!(entry_id = id, symbol = %new.symbol, "journal entry created");
        Ok(id)
    }

    pub async fn get_entry(&self, entry_id: i64) -> Result<JournalEntry> {
        self.db.get_entry(entry_id).await
    }

    pub async fn list_entries(&self, owner_id: Option<i64>) -> Result<Vec<JournalEntry>> {
        self.db.list_entries(owner_id).await
    }

    /// Edit the narrative fields. Ledger state never moves through here.
    pub async fn update_narrative(
        &self,
        entry_id: i64,
        reason: Option<String>,
        memo: Option<String>,
        tags: &[String],
    ) -> Result<()> {
        self.db.update_narrative(entry_id, reason, memo, tags).await
    }

    pub async fn delete_entry(&self, entry_id: i64) -> Result<()> {
        let _guard = self.acquire(entry_id).await?;
        self.db.delete_entry(entry_id).await?;
        info!(entry_id, "journal entry deleted");
        Ok(())
    }

    pub async fn append_transaction(&self, entry_id: i64, new: &NewTransaction) -> Result<i64> {
        new.validate()?;
        let _guard = self.acquire(entry_id).await?;
        let tx_id = self.db.insert_transaction(entry_id, new).await?;
        self.recompute_projection(entry_id).await?;
        info!(
            entry_id,
            tx_id,
            side = %new.side,
            "transaction appended"
        );
        Ok(tx_id)
    }

    pub async fn delete_transaction(&self, tx_id: i64) -> Result<()> {
        let entry_id = self.db.get_transaction(tx_id).await?.entry_id;
        let _guard = self.acquire(entry_id).await?;
        self.db.delete_transaction(tx_id).await?;
        self.recompute_projection(entry_id).await?;
        info!(entry_id, tx_id, "transaction deleted");
        Ok(())
    }

    pub async fn append_split(&self, entry_id: i64, new: &NewSplit) -> Result<i64> {
        new.validate()?;
        let _guard = self.acquire(entry_id).await?;
        let split_id = self.db.insert_split(entry_id, new).await?;
        info!(entry_id, split_id, ratio = %new.ratio, "split recorded");
        Ok(split_id)
    }

    /// Apply a recorded split: rewrite prior transactions into post-split
    /// units and mark the split applied. Re-applying is a no-op.
    pub async fn apply_split(&self, split_id: i64) -> Result<()> {
        let split = self.db.get_split(split_id).await?;
        if split.applied {
            warn!(split_id, "split already applied, skipping");
            return Ok(());
        }

        let _guard = self.acquire(split.entry_id).await?;
        // re-read under the lock; another writer may have applied it
        let split = self.db.get_split(split_id).await?;
        if split.applied {
            return Ok(());
        }

        let transactions = self.db.list_transactions(split.entry_id).await?;
        let rewrites = rewrites_for(&split, &transactions);
        self.db.apply_split_rewrite(split_id, &rewrites).await?;
        self.recompute_projection(split.entry_id).await?;
        info!(
            entry_id = split.entry_id,
            split_id,
            ratio = %split.ratio,
            rewritten = rewrites.len(),
            "split applied"
        );
        Ok(())
    }

    /// Delete a split record. Only unapplied splits qualify; an applied
    /// split's rewrite is permanent.
    pub async fn delete_split(&self, split_id: i64) -> Result<()> {
        let split = self.db.get_split(split_id).await?;
        let _guard = self.acquire(split.entry_id).await?;
        let entry_id = self.db.delete_split(split_id).await?;
        self.recompute_projection(entry_id).await?;
        info!(entry_id, split_id, "split deleted");
        Ok(())
    }

    pub async fn add_note(&self, entry_id: i64, new: &NewNote) -> Result<i64> {
        self.db.insert_note(entry_id, new).await
    }

    pub async fn list_notes(&self, entry_id: i64) -> Result<Vec<FollowUpNote>> {
        self.db.list_notes(entry_id).await
    }

    pub async fn schedule_reminder(&self, entry_id: i64, new: &NewReminder) -> Result<i64> {
        self.db.insert_spec(entry_id, new).await
    }

    pub async fn cancel_reminder(&self, spec_id: i64) -> Result<()> {
        self.db.cancel_spec(spec_id).await
    }

    /// Read the persisted projection; lock-free.
    pub async fn get_summary(&self, entry_id: i64) -> Result<EntrySummary> {
        self.db.read_summary(entry_id).await
    }

    /// Replay the event log for historical display without persisting.
    pub async fn get_trail(&self, entry_id: i64) -> Result<Vec<TrailRecord>> {
        self.db.get_entry(entry_id).await?;
        let events = self.db.list_events(entry_id).await?;
        Ok(ledger::replay(&events).trail)
    }

    // ---- administrative rebuild ----

    /// Rebuild one entry's projection from its event log. A stored summary
    /// that disagrees beyond display rounding is logged as a projection
    /// inconsistency and overwritten; the caller never sees the error.
    pub async fn recalculate_entry(&self, entry_id: i64) -> Result<()> {
        let _guard = self.acquire(entry_id).await?;
        let stored = self.db.read_summary(entry_id).await?;
        let rebuilt = self.recompute_projection(entry_id).await?;

        if let Some(detail) = summaries_diverge(&stored, &rebuilt) {
            let inconsistency = JournalError::ProjectionInconsistency { entry_id, detail };
            error!(entry_id, %inconsistency, "projection rebuilt from event log");
        }
        Ok(())
    }

    /// Rebuild projections for every entry, optionally one owner's only.
    pub async fn recalculate(&self, owner_id: Option<i64>) -> Result<usize> {
        let ids = self.db.entry_ids(owner_id).await?;
        let count = ids.len();
        for entry_id in ids {
            self.recalculate_entry(entry_id).await?;
        }
        info!(count, "projection rebuild finished");
        Ok(count)
    }
}

/// Compare a stored projection against a freshly replayed one. Quantities
/// and counters must match exactly; monetary fields tolerate sub-display
/// dust from repeating averages.
fn summaries_diverge(stored: &EntrySummary, rebuilt: &EntrySummary) -> Option<String> {
    if stored.current_quantity != rebuilt.current_quantity {
        return Some(format!(
            "current_quantity stored {} != replayed {}",
            stored.current_quantity, rebuilt.current_quantity
        ));
    }
    if stored.transaction_count != rebuilt.transaction_count {
        return Some(format!(
            "transaction_count stored {} != replayed {}",
            stored.transaction_count, rebuilt.transaction_count
        ));
    }

    let monetary = [
        ("average_price", stored.average_price, rebuilt.average_price),
        ("total_cost", stored.total_cost, rebuilt.total_cost),
        (
            "realized_profit",
            stored.realized_profit,
            rebuilt.realized_profit,
        ),
        (
            "total_buy_amount",
            stored.total_buy_amount,
            rebuilt.total_buy_amount,
        ),
        (
            "total_sell_amount",
            stored.total_sell_amount,
            rebuilt.total_sell_amount,
        ),
    ];
    for (field, stored_value, rebuilt_value) in monetary {
        if round_display(stored_value) != round_display(rebuilt_value) {
            return Some(format!(
                "{} stored {} != replayed {}",
                field, stored_value, rebuilt_value
            ));
        }
    }
    None
}
