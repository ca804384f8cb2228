//! Core domain types for the journal
//!
//! A `JournalEntry` is the aggregate root: one per (owner, instrument)
//! relationship. Its event log (transactions + stock splits) is the source
//! of truth; `EntrySummary` is the denormalized projection derived from it.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{JournalError, Result};

/// Transaction side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxSide {
    Buy,
    Sell,
}

impl std::fmt::Display for TxSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxSide::Buy => write!(f, "BUY"),
            TxSide::Sell => write!(f, "SELL"),
        }
    }
}

impl TxSide {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "buy" => Some(TxSide::Buy),
            "sell" => Some(TxSide::Sell),
            _ => None,
        }
    }
}

/// A single purchase or sale in an entry's event log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub entry_id: i64,
    pub side: TxSide,
    pub trade_date: NaiveDate,
    pub price: Decimal,
    pub quantity: Decimal,
    pub memo: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A corporate-action split record.
///
/// `applied = false` means the record exists but has not rewritten any
/// transactions yet; once applied the flag is permanent and the rescale is
/// baked into the transaction rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockSplit {
    pub id: i64,
    pub entry_id: i64,
    pub effective_date: NaiveDate,
    pub ratio: Decimal,
    pub memo: Option<String>,
    pub applied: bool,
    pub created_at: DateTime<Utc>,
}

/// Fused event stream element, ordered by `(event_date, created_at)`.
#[derive(Debug, Clone)]
pub enum LedgerEvent {
    Transaction(Transaction),
    Split(StockSplit),
}

impl LedgerEvent {
    pub fn event_date(&self) -> NaiveDate {
        match self {
            LedgerEvent::Transaction(tx) => tx.trade_date,
            LedgerEvent::Split(sp) => sp.effective_date,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::Transaction(tx) => tx.created_at,
            LedgerEvent::Split(sp) => sp.created_at,
        }
    }
}

/// Sort a fused stream into canonical replay order. The creation-timestamp
/// tiebreak keeps same-date events stable under re-import and restore.
pub fn sort_canonical(events: &mut [LedgerEvent]) {
    events.sort_by_key(|e| (e.event_date(), e.created_at()));
}

/// Denormalized per-entry summary, always equal to replaying the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySummary {
    /// Signed open quantity: positive long, negative short, zero flat
    pub current_quantity: Decimal,
    /// Weighted-average cost per share of the open position; zero when flat
    pub average_price: Decimal,
    /// Cost basis of the absolute open position; zero when flat
    pub total_cost: Decimal,
    /// Cumulative realized P&L under average-cost accounting
    pub realized_profit: Decimal,
    pub total_bought_quantity: Decimal,
    pub total_sold_quantity: Decimal,
    pub total_buy_amount: Decimal,
    pub total_sell_amount: Decimal,
    pub transaction_count: u32,
    pub first_purchase_date: Option<NaiveDate>,
    pub last_transaction_date: Option<NaiveDate>,
}

impl Default for EntrySummary {
    fn default() -> Self {
        Self {
            current_quantity: Decimal::ZERO,
            average_price: Decimal::ZERO,
            total_cost: Decimal::ZERO,
            realized_profit: Decimal::ZERO,
            total_bought_quantity: Decimal::ZERO,
            total_sold_quantity: Decimal::ZERO,
            total_buy_amount: Decimal::ZERO,
            total_sell_amount: Decimal::ZERO,
            transaction_count: 0,
            first_purchase_date: None,
            last_transaction_date: None,
        }
    }
}

impl EntrySummary {
    pub fn is_flat(&self) -> bool {
        self.current_quantity.is_zero()
    }

    /// True once the entry has bought at least once and is no longer long.
    /// Used by analytics to classify closed (sold-out) entries.
    pub fn is_closed(&self) -> bool {
        self.first_purchase_date.is_some() && self.current_quantity <= Decimal::ZERO
    }
}

/// The aggregate root: one journal entry per tracked instrument
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: i64,
    pub owner_id: i64,
    pub symbol: String,
    pub name: String,
    pub sector: Option<String>,
    pub reason: Option<String>,
    pub memo: Option<String>,
    pub tags: Vec<String>,
    pub summary: EntrySummary,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Follow-up note category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteKind {
    Analysis,
    News,
    Earnings,
    Insight,
    Risk,
    Other,
}

impl NoteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteKind::Analysis => "analysis",
            NoteKind::News => "news",
            NoteKind::Earnings => "earnings",
            NoteKind::Insight => "insight",
            NoteKind::Risk => "risk",
            NoteKind::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "analysis" => Some(NoteKind::Analysis),
            "news" => Some(NoteKind::News),
            "earnings" => Some(NoteKind::Earnings),
            "insight" => Some(NoteKind::Insight),
            "risk" => Some(NoteKind::Risk),
            "other" => Some(NoteKind::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    High,
    Medium,
    Low,
}

impl Importance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Importance::High => "high",
            Importance::Medium => "medium",
            Importance::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Importance::High),
            "medium" => Some(Importance::Medium),
            "low" => Some(Importance::Low),
            _ => None,
        }
    }
}

/// Qualitative observation attached to an entry; never enters the ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowUpNote {
    pub id: i64,
    pub entry_id: i64,
    pub note_date: NaiveDate,
    pub content: String,
    pub kind: NoteKind,
    pub importance: Importance,
    pub reference_price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

/// Declarative one-shot reminder for an entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSpec {
    pub id: i64,
    pub entry_id: i64,
    pub fire_at: DateTime<Utc>,
    pub message: Option<String>,
    pub active: bool,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A push delivery destination owned by a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushSubscription {
    pub id: i64,
    pub owner_id: i64,
    pub endpoint: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Append-only record of one delivery attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryLog {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
    pub body: String,
    pub url: String,
    pub read: bool,
    pub delivered_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

/// Input for appending a transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    pub side: TxSide,
    pub trade_date: NaiveDate,
    pub price: Decimal,
    pub quantity: Decimal,
    pub memo: Option<String>,
}

impl NewTransaction {
    pub fn validate(&self) -> Result<()> {
        if self.price <= Decimal::ZERO {
            return Err(JournalError::validation(format!(
                "transaction price must be positive, got {}",
                self.price
            )));
        }
        if self.quantity <= Decimal::ZERO {
            return Err(JournalError::validation(format!(
                "transaction quantity must be positive, got {}",
                self.quantity
            )));
        }
        Ok(())
    }
}

/// Input for recording a split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSplit {
    pub effective_date: NaiveDate,
    pub ratio: Decimal,
    pub memo: Option<String>,
}

impl NewSplit {
    pub fn validate(&self) -> Result<()> {
        if self.ratio <= Decimal::ZERO {
            return Err(JournalError::validation(format!(
                "split ratio must be positive, got {}",
                self.ratio
            )));
        }
        Ok(())
    }
}

/// Input for a follow-up note
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNote {
    pub note_date: NaiveDate,
    pub content: String,
    pub kind: NoteKind,
    pub importance: Importance,
    pub reference_price: Option<Decimal>,
}

impl NewNote {
    pub fn validate(&self) -> Result<()> {
        if self.content.trim().is_empty() {
            return Err(JournalError::validation("note content must not be empty"));
        }
        if let Some(price) = self.reference_price {
            if price <= Decimal::ZERO {
                return Err(JournalError::validation(format!(
                    "note reference price must be positive, got {}",
                    price
                )));
            }
        }
        Ok(())
    }
}

/// Input for scheduling a reminder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReminder {
    pub fire_at: DateTime<Utc>,
    pub message: Option<String>,
}

/// Input for creating an entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEntry {
    pub owner_id: i64,
    pub symbol: String,
    pub name: String,
    pub sector: Option<String>,
    pub reason: Option<String>,
    pub memo: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewEntry {
    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(JournalError::validation("entry symbol must not be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(JournalError::validation("entry name must not be empty"));
        }
        Ok(())
    }
}
