//! SQLite persistence for entries, the event log, projections, and
//! scheduler state
//!
//! Decimals are stored as TEXT: sqlite has no exact decimal affinity and the
//! money path must never round-trip through floating point. All ordering
//! queries use the canonical `(event_date, created_at)` key.

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use crate::error::{JournalError, Result};
use crate::ledger::split::SplitRewrite;
use crate::types::{
    DeliveryLog, EntrySummary, FollowUpNote, Importance, JournalEntry, LedgerEvent, NewEntry,
    NewNote, NewReminder, NewSplit, NewTransaction, NoteKind, NotificationSpec, PushSubscription,
    StockSplit, Transaction, TxSide,
};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER NOT NULL,
    symbol TEXT NOT NULL,
    name TEXT NOT NULL,
    sector TEXT,
    reason TEXT,
    memo TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    current_quantity TEXT NOT NULL DEFAULT '0',
    average_price TEXT NOT NULL DEFAULT '0',
    total_cost TEXT NOT NULL DEFAULT '0',
    realized_profit TEXT NOT NULL DEFAULT '0',
    total_bought_quantity TEXT NOT NULL DEFAULT '0',
    total_sold_quantity TEXT NOT NULL DEFAULT '0',
    total_buy_amount TEXT NOT NULL DEFAULT '0',
    total_sell_amount TEXT NOT NULL DEFAULT '0',
    transaction_count INTEGER NOT NULL DEFAULT 0,
    first_purchase_date TEXT,
    last_transaction_date TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_entries_owner ON entries(owner_id);

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entry_id INTEGER NOT NULL REFERENCES entries(id) ON DELETE CASCADE,
    side TEXT NOT NULL,
    trade_date TEXT NOT NULL,
    price TEXT NOT NULL,
    quantity TEXT NOT NULL,
    memo TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_transactions_entry
    ON transactions(entry_id, trade_date, created_at);

CREATE TABLE IF NOT EXISTS splits (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entry_id INTEGER NOT NULL REFERENCES entries(id) ON DELETE CASCADE,
    effective_date TEXT NOT NULL,
    ratio TEXT NOT NULL,
    memo TEXT,
    applied INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_splits_entry
    ON splits(entry_id, effective_date, created_at);

CREATE TABLE IF NOT EXISTS notes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entry_id INTEGER NOT NULL REFERENCES entries(id) ON DELETE CASCADE,
    note_date TEXT NOT NULL,
    content TEXT NOT NULL,
    kind TEXT NOT NULL,
    importance TEXT NOT NULL,
    reference_price TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_notes_entry ON notes(entry_id, note_date);

CREATE TABLE IF NOT EXISTS notification_specs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entry_id INTEGER NOT NULL REFERENCES entries(id) ON DELETE CASCADE,
    fire_at TEXT NOT NULL,
    message TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    last_sent_at TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_specs_due ON notification_specs(active, fire_at);

CREATE TABLE IF NOT EXISTS push_subscriptions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER NOT NULL,
    endpoint TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_subscriptions_owner ON push_subscriptions(owner_id, active);

CREATE TABLE IF NOT EXISTS delivery_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER NOT NULL,
    title TEXT NOT NULL,
    body TEXT NOT NULL,
    url TEXT NOT NULL,
    read INTEGER NOT NULL DEFAULT 0,
    delivered_at TEXT NOT NULL,
    read_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_delivery_owner ON delivery_log(owner_id, delivered_at);
"#;

/// Per-entry facts the analytics aggregator reads: projection fields plus
/// tag membership, sector, and the date of the last sell.
#[derive(Debug, Clone)]
pub struct EntryFacts {
    pub entry_id: i64,
    pub owner_id: i64,
    pub symbol: String,
    pub sector: Option<String>,
    pub tags: Vec<String>,
    pub summary: EntrySummary,
    pub last_sell_date: Option<NaiveDate>,
}

/// Database wrapper over a sqlite pool
pub struct Database {
    pool: SqlitePool,
}

fn parse_decimal(column: &'static str, value: &str) -> Result<Decimal> {
    Decimal::from_str(value).map_err(|_| JournalError::DecimalColumn {
        column,
        value: value.to_string(),
    })
}

fn parse_tags(raw: &str) -> Result<Vec<String>> {
    serde_json::from_str(raw)
        .map_err(|e| JournalError::validation(format!("malformed tags column: {}", e)))
}

fn decimal_col(row: &SqliteRow, column: &'static str) -> Result<Decimal> {
    let raw: String = row.try_get(column)?;
    parse_decimal(column, &raw)
}

fn optional_decimal_col(row: &SqliteRow, column: &'static str) -> Result<Option<Decimal>> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|v| parse_decimal(column, &v)).transpose()
}

fn summary_from_row(row: &SqliteRow) -> Result<EntrySummary> {
    Ok(EntrySummary {
        current_quantity: decimal_col(row, "current_quantity")?,
        average_price: decimal_col(row, "average_price")?,
        total_cost: decimal_col(row, "total_cost")?,
        realized_profit: decimal_col(row, "realized_profit")?,
        total_bought_quantity: decimal_col(row, "total_bought_quantity")?,
        total_sold_quantity: decimal_col(row, "total_sold_quantity")?,
        total_buy_amount: decimal_col(row, "total_buy_amount")?,
        total_sell_amount: decimal_col(row, "total_sell_amount")?,
        transaction_count: row.try_get::<i64, _>("transaction_count")? as u32,
        first_purchase_date: row.try_get("first_purchase_date")?,
        last_transaction_date: row.try_get("last_transaction_date")?,
    })
}

fn entry_from_row(row: &SqliteRow) -> Result<JournalEntry> {
    let tags: String = row.try_get("tags")?;
    Ok(JournalEntry {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        symbol: row.try_get("symbol")?,
        name: row.try_get("name")?,
        sector: row.try_get("sector")?,
        reason: row.try_get("reason")?,
        memo: row.try_get("memo")?,
        tags: parse_tags(&tags)?,
        summary: summary_from_row(row)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn transaction_from_row(row: &SqliteRow) -> Result<Transaction> {
    let side: String = row.try_get("side")?;
    let side = TxSide::parse(&side)
        .ok_or_else(|| JournalError::validation(format!("unknown transaction side: {}", side)))?;
    Ok(Transaction {
        id: row.try_get("id")?,
        entry_id: row.try_get("entry_id")?,
        side,
        trade_date: row.try_get("trade_date")?,
        price: decimal_col(row, "price")?,
        quantity: decimal_col(row, "quantity")?,
        memo: row.try_get("memo")?,
        created_at: row.try_get("created_at")?,
    })
}

fn split_from_row(row: &SqliteRow) -> Result<StockSplit> {
    Ok(StockSplit {
        id: row.try_get("id")?,
        entry_id: row.try_get("entry_id")?,
        effective_date: row.try_get("effective_date")?,
        ratio: decimal_col(row, "ratio")?,
        memo: row.try_get("memo")?,
        applied: row.try_get("applied")?,
        created_at: row.try_get("created_at")?,
    })
}

fn note_from_row(row: &SqliteRow) -> Result<FollowUpNote> {
    let kind: String = row.try_get("kind")?;
    let importance: String = row.try_get("importance")?;
    Ok(FollowUpNote {
        id: row.try_get("id")?,
        entry_id: row.try_get("entry_id")?,
        note_date: row.try_get("note_date")?,
        content: row.try_get("content")?,
        kind: NoteKind::parse(&kind)
            .ok_or_else(|| JournalError::validation(format!("unknown note kind: {}", kind)))?,
        importance: Importance::parse(&importance).ok_or_else(|| {
            JournalError::validation(format!("unknown note importance: {}", importance))
        })?,
        reference_price: optional_decimal_col(row, "reference_price")?,
        created_at: row.try_get("created_at")?,
    })
}

fn spec_from_row(row: &SqliteRow) -> Result<NotificationSpec> {
    Ok(NotificationSpec {
        id: row.try_get("id")?,
        entry_id: row.try_get("entry_id")?,
        fire_at: row.try_get("fire_at")?,
        message: row.try_get("message")?,
        active: row.try_get("active")?,
        last_sent_at: row.try_get("last_sent_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn subscription_from_row(row: &SqliteRow) -> Result<PushSubscription> {
    Ok(PushSubscription {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        endpoint: row.try_get("endpoint")?,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
    })
}

impl Database {
    /// Open (or create) the database file and initialize the schema.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// In-memory database for tests. Pinned to a single connection so the
    /// memory store is shared across all calls.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .in_memory(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    // ---- entries ----

    pub async fn create_entry(&self, new: &NewEntry) -> Result<i64> {
        new.validate()?;
        let now = Utc::now();
        let tags = serde_json::to_string(&new.tags)
            .map_err(|e| JournalError::validation(format!("unserializable tags: {}", e)))?;
        let result = sqlx::query(
            "INSERT INTO entries (owner_id, symbol, name, sector, reason, memo, tags, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(new.owner_id)
        .bind(&new.symbol)
        .bind(&new.name)
        .bind(&new.sector)
        .bind(&new.reason)
        .bind(&new.memo)
        .bind(tags)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_entry(&self, entry_id: i64) -> Result<JournalEntry> {
        let row = sqlx::query("SELECT * FROM entries WHERE id = ?")
            .bind(entry_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| JournalError::not_found("entry", entry_id))?;
        entry_from_row(&row)
    }

    pub async fn list_entries(&self, owner_id: Option<i64>) -> Result<Vec<JournalEntry>> {
        let rows = match owner_id {
            Some(owner) => {
                sqlx::query("SELECT * FROM entries WHERE owner_id = ? ORDER BY id")
                    .bind(owner)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM entries ORDER BY id")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(entry_from_row).collect()
    }

    /// Update the narrative fields only; owner and ledger state are untouchable.
    pub async fn update_narrative(
        &self,
        entry_id: i64,
        reason: Option<String>,
        memo: Option<String>,
        tags: &[String],
    ) -> Result<()> {
        let serialized = serde_json::to_string(tags)
            .map_err(|e| JournalError::validation(format!("unserializable tags: {}", e)))?;
        let result = sqlx::query(
            "UPDATE entries SET reason = ?, memo = ?, tags = ?, updated_at = ? WHERE id = ?",
        )
        .bind(reason)
        .bind(memo)
        .bind(serialized)
        .bind(Utc::now())
        .bind(entry_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(JournalError::not_found("entry", entry_id));
        }
        Ok(())
    }

    /// Delete an entry; events, splits, notes and specs cascade.
    pub async fn delete_entry(&self, entry_id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM entries WHERE id = ?")
            .bind(entry_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(JournalError::not_found("entry", entry_id));
        }
        Ok(())
    }

    // ---- event log ----

    pub async fn insert_transaction(&self, entry_id: i64, new: &NewTransaction) -> Result<i64> {
        new.validate()?;
        // FK is deferred-unfriendly for a clean NotFound; check the parent first
        self.get_entry(entry_id).await?;
        let result = sqlx::query(
            "INSERT INTO transactions (entry_id, side, trade_date, price, quantity, memo, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry_id)
        .bind(match new.side {
            TxSide::Buy => "buy",
            TxSide::Sell => "sell",
        })
        .bind(new.trade_date)
        .bind(new.price.to_string())
        .bind(new.quantity.to_string())
        .bind(&new.memo)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_transaction(&self, tx_id: i64) -> Result<Transaction> {
        let row = sqlx::query("SELECT * FROM transactions WHERE id = ?")
            .bind(tx_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| JournalError::not_found("transaction", tx_id))?;
        transaction_from_row(&row)
    }

    pub async fn delete_transaction(&self, tx_id: i64) -> Result<i64> {
        let tx = self.get_transaction(tx_id).await?;
        sqlx::query("DELETE FROM transactions WHERE id = ?")
            .bind(tx_id)
            .execute(&self.pool)
            .await?;
        Ok(tx.entry_id)
    }

    pub async fn list_transactions(&self, entry_id: i64) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(
            "SELECT * FROM transactions WHERE entry_id = ? ORDER BY trade_date, created_at, id",
        )
        .bind(entry_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(transaction_from_row).collect()
    }

    pub async fn insert_split(&self, entry_id: i64, new: &NewSplit) -> Result<i64> {
        new.validate()?;
        self.get_entry(entry_id).await?;
        let result = sqlx::query(
            "INSERT INTO splits (entry_id, effective_date, ratio, memo, applied, created_at)
             VALUES (?, ?, ?, ?, 0, ?)",
        )
        .bind(entry_id)
        .bind(new.effective_date)
        .bind(new.ratio.to_string())
        .bind(&new.memo)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_split(&self, split_id: i64) -> Result<StockSplit> {
        let row = sqlx::query("SELECT * FROM splits WHERE id = ?")
            .bind(split_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| JournalError::not_found("split", split_id))?;
        split_from_row(&row)
    }

    /// Remove an unapplied split record. Applied splits are baked into the
    /// transaction rows and cannot be removed.
    pub async fn delete_split(&self, split_id: i64) -> Result<i64> {
        let split = self.get_split(split_id).await?;
        if split.applied {
            return Err(JournalError::validation(
                "applied splits cannot be deleted; their rewrite is permanent",
            ));
        }
        sqlx::query("DELETE FROM splits WHERE id = ?")
            .bind(split_id)
            .execute(&self.pool)
            .await?;
        Ok(split.entry_id)
    }

    /// Atomically rewrite prior transactions and mark the split applied.
    pub async fn apply_split_rewrite(
        &self,
        split_id: i64,
        rewrites: &[SplitRewrite],
    ) -> Result<()> {
        let mut db_tx = self.pool.begin().await?;
        for rewrite in rewrites {
            sqlx::query("UPDATE transactions SET quantity = ?, price = ? WHERE id = ?")
                .bind(rewrite.quantity.to_string())
                .bind(rewrite.price.to_string())
                .bind(rewrite.transaction_id)
                .execute(&mut *db_tx)
                .await?;
        }
        sqlx::query("UPDATE splits SET applied = 1 WHERE id = ?")
            .bind(split_id)
            .execute(&mut *db_tx)
            .await?;
        db_tx.commit().await?;
        Ok(())
    }

    /// Canonical-ordered fused stream of transactions and splits.
    pub async fn list_events(&self, entry_id: i64) -> Result<Vec<LedgerEvent>> {
        let transactions = self.list_transactions(entry_id).await?;
        let rows = sqlx::query(
            "SELECT * FROM splits WHERE entry_id = ? ORDER BY effective_date, created_at, id",
        )
        .bind(entry_id)
        .fetch_all(&self.pool)
        .await?;
        let splits: Vec<StockSplit> = rows
            .iter()
            .map(split_from_row)
            .collect::<Result<Vec<_>>>()?;

        let mut events: Vec<LedgerEvent> = transactions
            .into_iter()
            .map(LedgerEvent::Transaction)
            .chain(splits.into_iter().map(LedgerEvent::Split))
            .collect();
        crate::types::sort_canonical(&mut events);
        Ok(events)
    }

    // ---- projection ----

    pub async fn write_summary(&self, entry_id: i64, summary: &EntrySummary) -> Result<()> {
        let result = sqlx::query(
            "UPDATE entries SET
                current_quantity = ?, average_price = ?, total_cost = ?,
                realized_profit = ?, total_bought_quantity = ?, total_sold_quantity = ?,
                total_buy_amount = ?, total_sell_amount = ?, transaction_count = ?,
                first_purchase_date = ?, last_transaction_date = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(summary.current_quantity.to_string())
        .bind(summary.average_price.to_string())
        .bind(summary.total_cost.to_string())
        .bind(summary.realized_profit.to_string())
        .bind(summary.total_bought_quantity.to_string())
        .bind(summary.total_sold_quantity.to_string())
        .bind(summary.total_buy_amount.to_string())
        .bind(summary.total_sell_amount.to_string())
        .bind(summary.transaction_count as i64)
        .bind(summary.first_purchase_date)
        .bind(summary.last_transaction_date)
        .bind(Utc::now())
        .bind(entry_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(JournalError::not_found("entry", entry_id));
        }
        Ok(())
    }

    pub async fn read_summary(&self, entry_id: i64) -> Result<EntrySummary> {
        Ok(self.get_entry(entry_id).await?.summary)
    }

    // ---- notes ----

    pub async fn insert_note(&self, entry_id: i64, new: &NewNote) -> Result<i64> {
        new.validate()?;
        self.get_entry(entry_id).await?;
        let result = sqlx::query(
            "INSERT INTO notes (entry_id, note_date, content, kind, importance, reference_price, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry_id)
        .bind(new.note_date)
        .bind(&new.content)
        .bind(new.kind.as_str())
        .bind(new.importance.as_str())
        .bind(new.reference_price.map(|p| p.to_string()))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn list_notes(&self, entry_id: i64) -> Result<Vec<FollowUpNote>> {
        let rows = sqlx::query("SELECT * FROM notes WHERE entry_id = ? ORDER BY note_date, id")
            .bind(entry_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(note_from_row).collect()
    }

    // ---- scheduler state ----

    pub async fn insert_spec(&self, entry_id: i64, new: &NewReminder) -> Result<i64> {
        self.get_entry(entry_id).await?;
        let result = sqlx::query(
            "INSERT INTO notification_specs (entry_id, fire_at, message, active, created_at)
             VALUES (?, ?, ?, 1, ?)",
        )
        .bind(entry_id)
        .bind(new.fire_at)
        .bind(&new.message)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_spec(&self, spec_id: i64) -> Result<NotificationSpec> {
        let row = sqlx::query("SELECT * FROM notification_specs WHERE id = ?")
            .bind(spec_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| JournalError::not_found("notification spec", spec_id))?;
        spec_from_row(&row)
    }

    pub async fn cancel_spec(&self, spec_id: i64) -> Result<()> {
        let result = sqlx::query("UPDATE notification_specs SET active = 0 WHERE id = ?")
            .bind(spec_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(JournalError::not_found("notification spec", spec_id));
        }
        Ok(())
    }

    /// Active specs inside the firing window, oldest first. Specs older than
    /// the grace cutoff are left alone so a recovering scheduler cannot flood.
    pub async fn due_specs(
        &self,
        now: DateTime<Utc>,
        grace_cutoff: DateTime<Utc>,
        owner_id: Option<i64>,
    ) -> Result<Vec<NotificationSpec>> {
        let base = "SELECT s.* FROM notification_specs s
             JOIN entries e ON e.id = s.entry_id
             WHERE s.active = 1 AND s.fire_at <= ? AND s.fire_at > ?";
        let rows = match owner_id {
            Some(owner) => {
                let sql = format!("{} AND e.owner_id = ? ORDER BY s.fire_at, s.id", base);
                sqlx::query(&sql)
                    .bind(now)
                    .bind(grace_cutoff)
                    .bind(owner)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!("{} ORDER BY s.fire_at, s.id", base);
                sqlx::query(&sql)
                    .bind(now)
                    .bind(grace_cutoff)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(spec_from_row).collect()
    }

    /// One-shot delivery: stamp the send time and deactivate.
    pub async fn mark_spec_delivered(&self, spec_id: i64, now: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE notification_specs SET last_sent_at = ?, active = 0 WHERE id = ?")
            .bind(now)
            .bind(spec_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_subscription(&self, owner_id: i64, endpoint: &str) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO push_subscriptions (owner_id, endpoint, active, created_at)
             VALUES (?, ?, 1, ?)",
        )
        .bind(owner_id)
        .bind(endpoint)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn active_subscriptions(&self, owner_id: i64) -> Result<Vec<PushSubscription>> {
        let rows = sqlx::query(
            "SELECT * FROM push_subscriptions WHERE owner_id = ? AND active = 1 ORDER BY id",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(subscription_from_row).collect()
    }

    pub async fn deactivate_subscription(&self, subscription_id: i64) -> Result<()> {
        sqlx::query("UPDATE push_subscriptions SET active = 0 WHERE id = ?")
            .bind(subscription_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_delivery(
        &self,
        owner_id: i64,
        title: &str,
        body: &str,
        url: &str,
        delivered_at: DateTime<Utc>,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO delivery_log (owner_id, title, body, url, read, delivered_at)
             VALUES (?, ?, ?, ?, 0, ?)",
        )
        .bind(owner_id)
        .bind(title)
        .bind(body)
        .bind(url)
        .bind(delivered_at)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn list_deliveries(&self, owner_id: i64) -> Result<Vec<DeliveryLog>> {
        let rows = sqlx::query(
            "SELECT * FROM delivery_log WHERE owner_id = ? ORDER BY delivered_at DESC, id DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(DeliveryLog {
                    id: row.try_get("id")?,
                    owner_id: row.try_get("owner_id")?,
                    title: row.try_get("title")?,
                    body: row.try_get("body")?,
                    url: row.try_get("url")?,
                    read: row.try_get("read")?,
                    delivered_at: row.try_get("delivered_at")?,
                    read_at: row.try_get("read_at")?,
                })
            })
            .collect()
    }

    // ---- analytics feed ----

    /// Load the per-entry rows analytics derives from: projection fields,
    /// sector, tags, and the most recent sell date.
    pub async fn load_analytics_rows(&self, owner_id: Option<i64>) -> Result<Vec<EntryFacts>> {
        let base = "SELECT e.*,
                (SELECT MAX(t.trade_date) FROM transactions t
                  WHERE t.entry_id = e.id AND t.side = 'sell') AS last_sell_date
             FROM entries e";
        let rows = match owner_id {
            Some(owner) => {
                let sql = format!("{} WHERE e.owner_id = ? ORDER BY e.id", base);
                sqlx::query(&sql).bind(owner).fetch_all(&self.pool).await?
            }
            None => {
                let sql = format!("{} ORDER BY e.id", base);
                sqlx::query(&sql).fetch_all(&self.pool).await?
            }
        };
        rows.iter()
            .map(|row| {
                let tags: String = row.try_get("tags")?;
                Ok(EntryFacts {
                    entry_id: row.try_get("id")?,
                    owner_id: row.try_get("owner_id")?,
                    symbol: row.try_get("symbol")?,
                    sector: row.try_get("sector")?,
                    tags: parse_tags(&tags)?,
                    summary: summary_from_row(row)?,
                    last_sell_date: row.try_get("last_sell_date")?,
                })
            })
            .collect()
    }

    /// All entry ids, optionally restricted to one owner. Used by the
    /// administrative projection rebuild.
    pub async fn entry_ids(&self, owner_id: Option<i64>) -> Result<Vec<i64>> {
        let rows = match owner_id {
            Some(owner) => {
                sqlx::query("SELECT id FROM entries WHERE owner_id = ? ORDER BY id")
                    .bind(owner)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT id FROM entries ORDER BY id")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter()
            .map(|row| Ok(row.try_get::<i64, _>("id")?))
            .collect()
    }
}
