//! Payback period: how many weekly payments cover the invoiced amount.

use crate::config::ZeroPaymentPolicy;
use crate::error::{NormalizeError, Result};
use crate::types::columns;
use crate::utils::{f64_values, filter_rows, set_f64_column};
use polars::prelude::*;
use tracing::{debug, warn};

/// Counts from one payback computation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaybackOutcome {
    pub computed: usize,
    /// Rows left without a payback period (missing inputs or zero payment).
    pub undefined: usize,
    /// Rows whose weekly payment was exactly zero.
    pub zero_payments: usize,
    /// Rows removed under [`ZeroPaymentPolicy::DropRow`].
    pub dropped: usize,
}

/// Adds `Payback_Period = Invoiced Amount / Weekly Payment` (in weeks).
///
/// Depreciation and interest are ignored. An absent input gives an absent
/// result; a zero payment is resolved by the configured [`ZeroPaymentPolicy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PaybackCalculator {
    zero_payment: ZeroPaymentPolicy,
}

impl PaybackCalculator {
    pub fn new(zero_payment: ZeroPaymentPolicy) -> Self {
        Self { zero_payment }
    }

    pub fn apply(&self, df: DataFrame) -> Result<(DataFrame, PaybackOutcome)> {
        let mut df = df;
        let invoiced = f64_values(&df, columns::INVOICED_AMOUNT)?;
        let weekly = f64_values(&df, columns::WEEKLY_PAYMENT)?;

        let mut outcome = PaybackOutcome::default();
        let mut payback = Vec::with_capacity(df.height());
        let mut keep = Vec::with_capacity(df.height());

        for (row, (amount, payment)) in invoiced.into_iter().zip(weekly).enumerate() {
            if payment == Some(0.0) {
                outcome.zero_payments += 1;
                match self.zero_payment {
                    ZeroPaymentPolicy::Fail => return Err(NormalizeError::DivisionByZero { row }),
                    ZeroPaymentPolicy::DropRow => {
                        outcome.dropped += 1;
                        keep.push(false);
                    }
                    ZeroPaymentPolicy::Null => {
                        outcome.undefined += 1;
                        keep.push(true);
                    }
                }
                payback.push(None);
                continue;
            }

            keep.push(true);
            match (amount, payment) {
                (Some(amount), Some(payment)) => {
                    outcome.computed += 1;
                    payback.push(Some(amount / payment));
                }
                _ => {
                    outcome.undefined += 1;
                    payback.push(None);
                }
            }
        }

        set_f64_column(&mut df, columns::PAYBACK_PERIOD, payback)?;

        if outcome.dropped > 0 {
            df = filter_rows(&df, keep)?;
            warn!("Dropped {} rows with a zero weekly payment", outcome.dropped);
        } else if outcome.zero_payments > 0 {
            warn!(
                "{} rows have a zero weekly payment; payback period left empty",
                outcome.zero_payments
            );
        }

        debug!(
            "Payback period: {} computed, {} undefined",
            outcome.computed, outcome.undefined
        );

        Ok((df, outcome))
    }
}
