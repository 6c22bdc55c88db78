use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// User-editable swap form
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SwapFormState {
    pub from_chain: String,
    pub to_chain: String,
    pub from_token: String,
    pub to_token: String,
    /// Amount as typed by the user; only a positive decimal yields a quote
    pub amount: String,
}

impl SwapFormState {
    pub fn new(from_chain: &str, to_chain: &str, from_token: &str, to_token: &str, amount: &str) -> Self {
        Self {
            from_chain: from_chain.to_string(),
            to_chain: to_chain.to_string(),
            from_token: from_token.to_string(),
            to_token: to_token.to_string(),
            amount: amount.to_string(),
        }
    }

    /// Parsed amount if it is a strictly positive decimal
    pub fn positive_amount(&self) -> Option<Decimal> {
        let trimmed = self.amount.trim();
        if trimmed.is_empty() {
            return None;
        }
        Decimal::from_str(trimmed)
            .ok()
            .filter(|amount| amount.is_sign_positive() && !amount.is_zero())
    }

    pub fn has_positive_amount(&self) -> bool {
        self.positive_amount().is_some()
    }

    /// Whether a price tick for `token` affects this form
    pub fn references_token(&self, token: &str) -> bool {
        self.from_token.eq_ignore_ascii_case(token) || self.to_token.eq_ignore_ascii_case(token)
    }

    pub fn with_amount(mut self, amount: &str) -> Self {
        self.amount = amount.to_string();
        self
    }

    /// Swap the from/to sides, keeping the amount
    pub fn flipped(&self) -> Self {
        Self {
            from_chain: self.to_chain.clone(),
            to_chain: self.from_chain.clone(),
            from_token: self.to_token.clone(),
            to_token: self.from_token.clone(),
            amount: self.amount.clone(),
        }
    }
}

impl Default for SwapFormState {
    fn default() -> Self {
        Self::new("ethereum", "solana", "ETH", "SOL", "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_positive_amount() {
        let form = SwapFormState::default();
        assert_eq!(form.positive_amount(), None);

        assert_eq!(form.clone().with_amount("1.0").positive_amount(), Some(dec!(1.0)));
        assert_eq!(form.clone().with_amount(" 0.25 ").positive_amount(), Some(dec!(0.25)));
        assert_eq!(form.clone().with_amount("0").positive_amount(), None);
        assert_eq!(form.clone().with_amount("0.000").positive_amount(), None);
        assert_eq!(form.clone().with_amount("-3").positive_amount(), None);
        assert_eq!(form.clone().with_amount("abc").positive_amount(), None);
        assert_eq!(form.with_amount("1.2.3").positive_amount(), None);
    }

    #[test]
    fn test_references_token() {
        let form = SwapFormState::default();
        assert!(form.references_token("ETH"));
        assert!(form.references_token("sol"));
        assert!(!form.references_token("USDC"));
    }

    #[test]
    fn test_flipped() {
        let form = SwapFormState::default().with_amount("2");
        let flipped = form.flipped();
        assert_eq!(flipped.from_chain, "solana");
        assert_eq!(flipped.to_token, "ETH");
        assert_eq!(flipped.amount, "2");
    }
}
