use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::swap_form::SwapFormState;

/// Advisory price/execution estimate for a prospective swap.
///
/// A quote is bound to the form state and address it was fetched for and is
/// never mutated; a newer fetch supersedes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub id: String,
    pub to_amount: String,
    pub execution_time_seconds: u64,
    pub price_impact_percent: f64,
    pub bridge_fee: Option<String>,
    pub expires_at: DateTime<Utc>,
    /// Form state the quote was requested for
    pub form: SwapFormState,
    /// Session address the quote was requested for
    pub address: String,
}

impl Quote {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Valid only for the same form and address, strictly before expiry
    pub fn is_valid_for(&self, form: &SwapFormState, address: &str, now: DateTime<Utc>) -> bool {
        !self.is_expired_at(now) && self.form == *form && self.address == address
    }

    pub fn time_to_expiry(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }
}
