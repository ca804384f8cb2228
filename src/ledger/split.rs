//! Split adjuster
//!
//! Applying a split rewrites the entry's historical transactions in place:
//! quantities multiply by the ratio, prices divide by it. Total cost basis
//! is preserved, and direct sums of post-rewrite quantities equal the
//! current share count. Once applied, the split never touches replay state
//! again; deleting an applied split is unsupported.

use rust_decimal::Decimal;

use crate::money::{apply_ratio, unapply_ratio};
use crate::types::{StockSplit, Transaction};

/// The rewrite of one transaction row produced by a split application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitRewrite {
    pub transaction_id: i64,
    pub quantity: Decimal,
    pub price: Decimal,
}

/// Compute the rewrites a split produces over an entry's transactions.
///
/// Only trades dated strictly before the effective date rescale; same-day
/// and later trades are already expressed in post-split units.
pub fn rewrites_for(split: &StockSplit, transactions: &[Transaction]) -> Vec<SplitRewrite> {
    transactions
        .iter()
        .filter(|tx| tx.trade_date < split.effective_date)
        .map(|tx| SplitRewrite {
            transaction_id: tx.id,
            quantity: apply_ratio(tx.quantity, split.ratio),
            price: unapply_ratio(tx.price, split.ratio),
        })
        .collect()
}
