//! Decimal arithmetic helpers for the money path
//!
//! All monetary values are `rust_decimal::Decimal`. Replay math runs at full
//! precision; rounding happens only at the display/serialization boundary.

use rust_decimal::{Decimal, RoundingStrategy};

/// Scale used when rendering prices and amounts.
pub const DISPLAY_SCALE: u32 = 2;

/// Minimum scale carried by per-share averages. Averages feed back into
/// subsequent cost calculations, so they must never be quantized to cents.
pub const AVERAGE_SCALE: u32 = 5;

/// Division with a flat-position guard: a zero divisor yields zero instead
/// of an error. The replayer relies on this when the open quantity is zero.
pub fn safe_div(numerator: Decimal, divisor: Decimal) -> Decimal {
    if divisor.is_zero() {
        Decimal::ZERO
    } else {
        numerator / divisor
    }
}

/// Half-even rounding to 2 decimals, for display and JSON output only.
pub fn round_display(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DISPLAY_SCALE, RoundingStrategy::MidpointNearestEven)
}

/// Half-even rounding to the average-price scale.
pub fn round_average(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(AVERAGE_SCALE, RoundingStrategy::MidpointNearestEven)
}

/// Rescale a quantity by a split ratio.
pub fn apply_ratio(quantity: Decimal, ratio: Decimal) -> Decimal {
    quantity * ratio
}

/// Rescale a price by a split ratio (inverse direction), guarded like
/// [`safe_div`]. Ratios are validated positive before they reach here.
pub fn unapply_ratio(price: Decimal, ratio: Decimal) -> Decimal {
    safe_div(price, ratio)
}
