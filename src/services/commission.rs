//! Vendor/platform revenue split.
//!
//! `vendor_amount` is rounded to the currency precision and the platform fee is the
//! remainder, so the two always add back up to the payment amount.

use rust_decimal::{Decimal, RoundingStrategy};
use tracing::warn;

use crate::models::payment;

/// Resolved split of one payment's amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionSplit {
    pub vendor_amount: Decimal,
    pub platform_fee: Decimal,
}

impl CommissionSplit {
    pub fn total(&self) -> Decimal {
        self.vendor_amount + self.platform_fee
    }
}

#[derive(Debug, Clone)]
pub struct CommissionCalculator {
    default_rate: Decimal,
    precision: u32,
}

impl CommissionCalculator {
    pub fn new(default_rate: Decimal, precision: u32) -> Self {
        Self {
            default_rate,
            precision,
        }
    }

    pub fn default_rate(&self) -> Decimal {
        self.default_rate
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }

    /// The vendor's own rate when it is a valid fraction, otherwise the platform default.
    pub fn effective_rate(&self, vendor_rate: Option<Decimal>) -> Decimal {
        match vendor_rate {
            Some(rate) if rate >= Decimal::ZERO && rate < Decimal::ONE => rate,
            Some(rate) => {
                warn!(%rate, default = %self.default_rate, "Ignoring out-of-range vendor commission rate");
                self.default_rate
            }
            None => self.default_rate,
        }
    }

    pub fn round(&self, amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(self.precision, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Split for an amount that has no resolved values yet.
    pub fn split_amount(
        &self,
        amount: Decimal,
        is_split_payment: bool,
        vendor_rate: Option<Decimal>,
    ) -> CommissionSplit {
        if !is_split_payment {
            return CommissionSplit {
                vendor_amount: amount,
                platform_fee: Decimal::ZERO,
            };
        }
        let rate = self.effective_rate(vendor_rate);
        let vendor_amount = self.round(amount * (Decimal::ONE - rate));
        CommissionSplit {
            vendor_amount,
            platform_fee: amount - vendor_amount,
        }
    }

    /// Vendor share of `payment`. Returns the stored value when already resolved.
    pub fn calculate_vendor_amount(
        &self,
        payment: &payment::Model,
        vendor_rate: Option<Decimal>,
    ) -> Decimal {
        if let Some(existing) = payment.vendor_amount {
            return existing;
        }
        self.split_amount(payment.amount, payment.is_split_payment, vendor_rate)
            .vendor_amount
    }

    /// Platform share of `payment` given its vendor share. Returns the stored value when
    /// already resolved.
    pub fn calculate_platform_fee(&self, payment: &payment::Model, vendor_amount: Decimal) -> Decimal {
        if let Some(existing) = payment.platform_fee {
            return existing;
        }
        if payment.is_split_payment {
            payment.amount - vendor_amount
        } else {
            Decimal::ZERO
        }
    }

    pub fn resolve(&self, payment: &payment::Model, vendor_rate: Option<Decimal>) -> CommissionSplit {
        let vendor_amount = self.calculate_vendor_amount(payment, vendor_rate);
        let platform_fee = self.calculate_platform_fee(payment, vendor_amount);
        CommissionSplit {
            vendor_amount,
            platform_fee,
        }
    }
}
