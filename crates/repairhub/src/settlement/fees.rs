//! Platform fee configuration seam.

use rust_decimal::Decimal;

/// Source of the current platform fee rate. The rate is read once per
/// settlement and snapshotted into the financial record, so later rate
/// changes never alter historic records.
pub trait FeeSchedule: Send + Sync {
    fn platform_rate(&self) -> Decimal;
}

/// Fixed-rate schedule, typically fed from [`crate::config::GatewayConfig`].
#[derive(Debug, Clone, Copy)]
pub struct StaticFeeSchedule {
    rate: Decimal,
}

impl StaticFeeSchedule {
    pub fn new(rate: Decimal) -> Self {
        Self { rate }
    }
}

impl FeeSchedule for StaticFeeSchedule {
    fn platform_rate(&self) -> Decimal {
        self.rate
    }
}
