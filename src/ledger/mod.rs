//! Ledger replayer
//!
//! Pure weighted-average cost accounting over an entry's canonical event
//! stream. No I/O: given the same events, the replay is bit-identical.
//!
//! - buys extend a long, or cover an open short (residual flips to long)
//! - sells reduce a long, or open/extend a short (residual flips to short)
//! - applied splits are historical metadata: their rescale is already baked
//!   into the transaction rows by the split adjuster, so replay only emits a
//!   trail marker at the split point and never rescales state again

pub mod split;


use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::money::safe_div;
use crate::types::{EntrySummary, LedgerEvent, StockSplit, Transaction, TxSide};

/// One state-after record in the replay trail.
///
/// Exactly one of `transaction` / `split` is set. `realized_profit` is the
/// delta realized by that transaction alone; split markers carry no delta.
#[derive(Debug, Clone)]
pub struct TrailRecord {
    pub transaction: Option<Transaction>,
    pub split: Option<StockSplit>,
    pub holding_quantity: Decimal,
    pub average_price: Decimal,
    pub realized_profit: Option<Decimal>,
}

/// Replay output: the summary plus the per-event trail
#[derive(Debug, Clone)]
pub struct Replay {
    pub summary: EntrySummary,
    pub trail: Vec<TrailRecord>,
}

/// Mutable walk state. `cost` always describes the absolute open position,
/// long or short; `quantity` carries the sign.
#[derive(Debug, Clone, Default)]
pub struct LedgerState {
    quantity: Decimal,
    cost: Decimal,
    realized: Decimal,
    total_bought_quantity: Decimal,
    total_sold_quantity: Decimal,
    total_buy_amount: Decimal,
    total_sell_amount: Decimal,
    transaction_count: u32,
    first_purchase_date: Option<NaiveDate>,
    last_transaction_date: Option<NaiveDate>,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild walk state from a previously computed summary, so a suffix of
    /// events can be replayed without revisiting the prefix.
    pub fn resume(summary: &EntrySummary) -> Self {
        Self {
            quantity: summary.current_quantity,
            cost: summary.total_cost,
            realized: summary.realized_profit,
            total_bought_quantity: summary.total_bought_quantity,
            total_sold_quantity: summary.total_sold_quantity,
            total_buy_amount: summary.total_buy_amount,
            total_sell_amount: summary.total_sell_amount,
            transaction_count: summary.transaction_count,
            first_purchase_date: summary.first_purchase_date,
            last_transaction_date: summary.last_transaction_date,
        }
    }

    pub fn average_price(&self) -> Decimal {
        safe_div(self.cost, self.quantity.abs())
    }

    /// Apply one transaction; returns the realized P&L delta of this trade.
    pub fn apply_transaction(&mut self, tx: &Transaction) -> Decimal {
        let delta = match tx.side {
            TxSide::Buy => self.apply_buy(tx.price, tx.quantity),
            TxSide::Sell => self.apply_sell(tx.price, tx.quantity),
        };

        self.transaction_count += 1;
        if tx.side == TxSide::Buy && self.first_purchase_date.is_none() {
            self.first_purchase_date = Some(tx.trade_date);
        }
        self.touch_date(tx.trade_date);
        delta
    }

    fn apply_buy(&mut self, price: Decimal, quantity: Decimal) -> Decimal {
        let mut delta = Decimal::ZERO;

        if self.quantity >= Decimal::ZERO {
            // opening or extending a long
            self.cost += price * quantity;
            self.quantity += quantity;
        } else {
            // covering a short, possibly flipping long with the residual
            let short_qty = self.quantity.abs();
            let avg_short = safe_div(self.cost, short_qty);
            let covered = quantity.min(short_qty);

            delta = (avg_short - price) * covered;
            self.realized += delta;
            self.cost -= avg_short * covered;
            self.quantity += covered;

            let residual = quantity - covered;
            if residual > Decimal::ZERO {
                self.cost += price * residual;
                self.quantity += residual;
            }
        }

        self.total_bought_quantity += quantity;
        self.total_buy_amount += price * quantity;
        self.normalize_flat();
        delta
    }

    fn apply_sell(&mut self, price: Decimal, quantity: Decimal) -> Decimal {
        let mut delta = Decimal::ZERO;

        if self.quantity > Decimal::ZERO {
            // reducing a long, possibly flipping short with the residual
            let avg_long = safe_div(self.cost, self.quantity);
            let closed = quantity.min(self.quantity);

            delta = (price - avg_long) * closed;
            self.realized += delta;
            self.cost -= avg_long * closed;
            self.quantity -= closed;

            let residual = quantity - closed;
            if residual > Decimal::ZERO {
                self.cost += price * residual;
                self.quantity -= residual;
            }
        } else {
            // opening or extending a short; proceeds become the short's cost
            self.cost += price * quantity;
            self.quantity -= quantity;
        }

        self.total_sold_quantity += quantity;
        self.total_sell_amount += price * quantity;
        self.normalize_flat();
        delta
    }

    /// An applied split only advances the last-event date; its rescale
    /// already lives in the rewritten transaction rows.
    fn apply_split_marker(&mut self, sp: &StockSplit) {
        self.touch_date(sp.effective_date);
    }

    fn touch_date(&mut self, date: NaiveDate) {
        match self.last_transaction_date {
            Some(last) if last >= date => {}
            _ => self.last_transaction_date = Some(date),
        }
    }

    /// A position that lands exactly on zero must read as flat: zero cost,
    /// zero average. Closing arithmetic can leave dust from the average
    /// division; this clears it.
    fn normalize_flat(&mut self) {
        if self.quantity.is_zero() {
            self.cost = Decimal::ZERO;
        }
    }

    pub fn summary(&self) -> EntrySummary {
        EntrySummary {
            current_quantity: self.quantity,
            average_price: self.average_price(),
            total_cost: self.cost,
            realized_profit: self.realized,
            total_bought_quantity: self.total_bought_quantity,
            total_sold_quantity: self.total_sold_quantity,
            total_buy_amount: self.total_buy_amount,
            total_sell_amount: self.total_sell_amount,
            transaction_count: self.transaction_count,
            first_purchase_date: self.first_purchase_date,
            last_transaction_date: self.last_transaction_date,
        }
    }
}

/// Replay a canonical-ordered event stream from a flat start.
pub fn replay(events: &[LedgerEvent]) -> Replay {
    replay_from(LedgerState::new(), events)
}

/// Replay a canonical-ordered event suffix from an existing state.
pub fn replay_from(mut state: LedgerState, events: &[LedgerEvent]) -> Replay {
    let mut trail = Vec::with_capacity(events.len());

    for event in events {
        match event {
            LedgerEvent::Transaction(tx) => {
                let delta = state.apply_transaction(tx);
                trail.push(TrailRecord {
                    transaction: Some(tx.clone()),
                    split: None,
                    holding_quantity: state.quantity,
                    average_price: state.average_price(),
                    realized_profit: Some(delta),
                });
            }
            LedgerEvent::Split(sp) => {
                // unapplied splits are pending records, invisible to replay
                if !sp.applied {
                    continue;
                }
                state.apply_split_marker(sp);
                trail.push(TrailRecord {
                    transaction: None,
                    split: Some(sp.clone()),
                    holding_quantity: state.quantity,
                    average_price: state.average_price(),
                    realized_profit: None,
                });
            }
        }
    }

    Replay {
        summary: state.summary(),
        trail,
    }
}
