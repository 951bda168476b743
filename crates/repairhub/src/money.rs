use rust_decimal::{Decimal, RoundingStrategy};

/// Round a monetary value to 2 decimal places, half away from zero.
///
/// Fiscal rounding: 350.005 becomes 350.01, not 350.00. Every stored
/// monetary value in the system goes through this exactly once at the point
/// it is computed; totals are never implicitly recomputed afterwards.
pub fn round_fiscal(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
