//! Portfolio analytics
//!
//! Pure read-side derivations over the per-entry projection rows. Monetary
//! figures stay `Decimal`; statistics (rates, volatility, correlations)
//! convert to `f64` at the derivation boundary and nowhere earlier.


use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::store::EntryFacts;

/// Fleet-wide investment totals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestmentSummary {
    /// Entries with at least one recorded buy
    pub invested_entry_count: usize,
    pub total_buy_amount: Decimal,
    pub total_sell_amount: Decimal,
    pub realized_profit: Decimal,
    /// Cost basis currently at work in open long positions
    pub active_investment: Decimal,
    pub active_count: usize,
    pub closed_count: usize,
    /// Fraction of closed entries with positive realized P&L
    pub win_rate: f64,
}

/// Days-held distribution over closed entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldingPeriodReport {
    pub within_week: usize,
    pub within_month: usize,
    pub within_quarter: usize,
    pub within_half_year: usize,
    pub within_year: usize,
    pub over_year: usize,
}

impl HoldingPeriodReport {
    fn record(&mut self, days: i64) {
        match days {
            d if d <= 7 => self.within_week += 1,
            d if d <= 30 => self.within_month += 1,
            d if d <= 90 => self.within_quarter += 1,
            d if d <= 180 => self.within_half_year += 1,
            d if d <= 365 => self.within_year += 1,
            _ => self.over_year += 1,
        }
    }
}

/// Per-tag aggregates plus related tags by co-occurrence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagStats {
    pub tag: String,
    pub member_count: usize,
    pub realized_profit: Decimal,
    /// realized profit over capital deployed, as a statistic
    pub profit_rate: f64,
    pub avg_holding_days: f64,
    /// Other tags sharing entries with this one, most shared first
    pub related: Vec<(String, usize)>,
}

/// Per-sector aggregates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorStats {
    pub sector: String,
    pub entry_count: usize,
    /// Share of the fleet's active cost basis, in percent
    pub allocation_pct: f64,
    /// Mean return rate over closed positions, in percent
    pub avg_return_pct: f64,
    /// Fraction of closed positions with positive realized P&L
    pub success_rate: f64,
    /// Sample stdev of closed return rates; needs at least 2 samples
    pub volatility: Option<f64>,
}

/// Sector report: stats plus a Pearson matrix over sectors with enough
/// closed samples
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorReport {
    pub sectors: Vec<SectorStats>,
    /// Sector names included in the correlation matrix (≥3 closed samples)
    pub correlated_sectors: Vec<String>,
    /// Row-major Pearson coefficients, aligned with `correlated_sectors`
    pub correlation: Vec<Vec<f64>>,
}

/// Everything the stats surface exposes in one document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioReport {
    pub investment: InvestmentSummary,
    pub holding_periods: HoldingPeriodReport,
    pub tags: Vec<TagStats>,
    pub sectors: SectorReport,
}

pub fn portfolio_report(rows: &[EntryFacts]) -> PortfolioReport {
    PortfolioReport {
        investment: investment_summary(rows),
        holding_periods: holding_periods(rows),
        tags: tag_analysis(rows),
        sectors: sector_analysis(rows),
    }
}

fn has_bought(facts: &EntryFacts) -> bool {
    facts.summary.first_purchase_date.is_some()
}

fn is_closed(facts: &EntryFacts) -> bool {
    facts.summary.is_closed()
}

/// Return rate of a closed entry: realized profit over capital deployed.
fn return_rate(facts: &EntryFacts) -> Option<f64> {
    if facts.summary.total_buy_amount.is_zero() {
        return None;
    }
    let rate = facts.summary.realized_profit / facts.summary.total_buy_amount;
    rate.to_f64()
}

fn holding_days(facts: &EntryFacts) -> Option<i64> {
    let first = facts.summary.first_purchase_date?;
    let last: NaiveDate = facts.last_sell_date?;
    Some((last - first).num_days())
}

pub fn investment_summary(rows: &[EntryFacts]) -> InvestmentSummary {
    let invested: Vec<&EntryFacts> = rows.iter().filter(|f| has_bought(f)).collect();

    let total_buy_amount = invested.iter().map(|f| f.summary.total_buy_amount).sum();
    let total_sell_amount = invested.iter().map(|f| f.summary.total_sell_amount).sum();
    let realized_profit = invested.iter().map(|f| f.summary.realized_profit).sum();

    let active: Vec<&&EntryFacts> = invested
        .iter()
        .filter(|f| f.summary.current_quantity > Decimal::ZERO)
        .collect();
    let active_investment = active.iter().map(|f| f.summary.total_cost).sum();

    let closed: Vec<&&EntryFacts> = invested.iter().filter(|f| is_closed(f)).collect();
    let wins = closed
        .iter()
        .filter(|f| f.summary.realized_profit > Decimal::ZERO)
        .count();
    let win_rate = if closed.is_empty() {
        0.0
    } else {
        wins as f64 / closed.len() as f64
    };

    InvestmentSummary {
        invested_entry_count: invested.len(),
        total_buy_amount,
        total_sell_amount,
        realized_profit,
        active_investment,
        active_count: active.len(),
        closed_count: closed.len(),
        win_rate,
    }
}

pub fn holding_periods(rows: &[EntryFacts]) -> HoldingPeriodReport {
    let mut report = HoldingPeriodReport::default();
    for facts in rows.iter().filter(|f| is_closed(f)) {
        if let Some(days) = holding_days(facts) {
            report.record(days);
        }
    }
    report
}

pub fn tag_analysis(rows: &[EntryFacts]) -> Vec<TagStats> {
    // tag -> member entry indexes
    let mut members: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (idx, facts) in rows.iter().enumerate() {
        for tag in &facts.tags {
            members.entry(tag.as_str()).or_default().push(idx);
        }
    }

    members
        .iter()
        .map(|(tag, indexes)| {
            let facts: Vec<&EntryFacts> = indexes.iter().map(|&i| &rows[i]).collect();

            let realized_profit: Decimal =
                facts.iter().map(|f| f.summary.realized_profit).sum();
            let deployed: Decimal = facts.iter().map(|f| f.summary.total_buy_amount).sum();
            let profit_rate = if deployed.is_zero() {
                0.0
            } else {
                (realized_profit / deployed).to_f64().unwrap_or(0.0)
            };

            let holding: Vec<i64> = facts.iter().filter_map(|f| holding_days(f)).collect();
            let avg_holding_days = if holding.is_empty() {
                0.0
            } else {
                holding.iter().sum::<i64>() as f64 / holding.len() as f64
            };

            // co-occurrence over the tag/entry bipartite graph
            let mut shared: HashMap<&str, usize> = HashMap::new();
            for &idx in indexes {
                for other in &rows[idx].tags {
                    if other.as_str() != *tag {
                        *shared.entry(other.as_str()).or_default() += 1;
                    }
                }
            }
            let mut related: Vec<(String, usize)> = shared
                .into_iter()
                .map(|(t, n)| (t.to_string(), n))
                .collect();
            related.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

            TagStats {
                tag: tag.to_string(),
                member_count: indexes.len(),
                realized_profit,
                profit_rate,
                avg_holding_days,
                related,
            }
        })
        .collect()
}

/// Minimum closed samples a sector needs to enter the correlation matrix.
const CORRELATION_MIN_SAMPLES: usize = 3;
/// Minimum closed samples for a volatility figure.
const VOLATILITY_MIN_SAMPLES: usize = 2;

pub fn sector_analysis(rows: &[EntryFacts]) -> SectorReport {
    let mut by_sector: BTreeMap<&str, Vec<&EntryFacts>> = BTreeMap::new();
    for facts in rows {
        let sector = facts.sector.as_deref().unwrap_or("unclassified");
        by_sector.entry(sector).or_default().push(facts);
    }

    let fleet_active: Decimal = rows
        .iter()
        .filter(|f| f.summary.current_quantity > Decimal::ZERO)
        .map(|f| f.summary.total_cost)
        .sum();

    let mut sectors = Vec::with_capacity(by_sector.len());
    // closed-entry return series per sector, ordered by last sell date
    let mut series: BTreeMap<&str, Vec<f64>> = BTreeMap::new();

    for (sector, facts) in &by_sector {
        let active_cost: Decimal = facts
            .iter()
            .filter(|f| f.summary.current_quantity > Decimal::ZERO)
            .map(|f| f.summary.total_cost)
            .sum();
        let allocation_pct = if fleet_active.is_zero() {
            0.0
        } else {
            (active_cost / fleet_active).to_f64().unwrap_or(0.0) * 100.0
        };

        let mut closed: Vec<&&EntryFacts> = facts.iter().filter(|f| is_closed(f)).collect();
        closed.sort_by_key(|f| f.last_sell_date);
        let returns: Vec<f64> = closed.iter().filter_map(|f| return_rate(f)).collect();

        let avg_return_pct = mean(&returns).unwrap_or(0.0) * 100.0;
        let success_rate = if closed.is_empty() {
            0.0
        } else {
            closed
                .iter()
                .filter(|f| f.summary.realized_profit > Decimal::ZERO)
                .count() as f64
                / closed.len() as f64
        };
        let volatility = if returns.len() >= VOLATILITY_MIN_SAMPLES {
            sample_stdev(&returns)
        } else {
            None
        };

        if returns.len() >= CORRELATION_MIN_SAMPLES {
            series.insert(*sector, returns.clone());
        }

        sectors.push(SectorStats {
            sector: sector.to_string(),
            entry_count: facts.len(),
            allocation_pct,
            avg_return_pct,
            success_rate,
            volatility,
        });
    }

    let correlated_sectors: Vec<String> = series.keys().map(|s| s.to_string()).collect();
    let values: Vec<&Vec<f64>> = series.values().collect();
    let n = values.len();
    let mut correlation = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..n {
            correlation[i][j] = if i == j {
                1.0
            } else {
                // series lengths differ; correlate over the shared prefix
                let len = values[i].len().min(values[j].len());
                pearson(&values[i][..len], &values[j][..len]).unwrap_or(0.0)
            };
        }
    }

    SectorReport {
        sectors,
        correlated_sectors,
        correlation,
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn sample_stdev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let variance =
        values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.len() < 2 {
        return None;
    }
    let mean_a = mean(a)?;
    let mean_b = mean(b)?;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    if var_a == 0.0 || var_b == 0.0 {
        return None;
    }
    Some(cov / (var_a.sqrt() * var_b.sqrt()))
}
