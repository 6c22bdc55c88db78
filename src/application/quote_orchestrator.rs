//! Quote Orchestrator
//!
//! Keeps at most one advisory quote for the current swap form and session
//! address. Every trigger (form edit, address change, refresh) bumps a
//! generation token; a fetch applies its result only if the generation it
//! captured at start is still current, so stale responses never land.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{ErrorKind, Quote, SwapFormState};
use crate::ports::{ApiError, QuotePayload, SwapApiPort, SwapRequest, DEFAULT_SLIPPAGE_PCT};

/// Validity window used when the backend does not send one
pub const DEFAULT_QUOTE_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Error, Clone, PartialEq)]
pub enum QuoteError {
    #[error("Quote unavailable: {0}")]
    Unavailable(#[from] ApiError),
}

impl QuoteError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::QuoteUnavailable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotePhase {
    Idle,
    Fetching,
    Valid,
    Invalid,
}

/// What a `refresh` did
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// Fetched quote is now current
    Applied(Quote),
    /// Nothing to fetch: no positive amount or no session address
    Skipped,
    /// A newer trigger superseded this fetch; its result was dropped
    Discarded,
}

#[derive(Debug, Clone)]
pub struct QuoteSettings {
    /// Slippage tolerance in percent
    pub slippage_pct: f64,
    pub fallback_ttl: Duration,
}

impl Default for QuoteSettings {
    fn default() -> Self {
        Self {
            slippage_pct: DEFAULT_SLIPPAGE_PCT,
            fallback_ttl: DEFAULT_QUOTE_TTL,
        }
    }
}

/// Immutable view handed to consumers
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteView {
    pub phase: QuotePhase,
    pub quote: Option<Quote>,
    pub generation: u64,
}

struct QuoteState {
    form: SwapFormState,
    address: Option<String>,
    generation: u64,
    phase: QuotePhase,
    quote: Option<Quote>,
}

impl QuoteState {
    /// New trigger: cancel in-flight fetches and drop the current quote
    fn bump(&mut self) -> u64 {
        self.generation += 1;
        self.quote = None;
        self.phase = QuotePhase::Idle;
        self.generation
    }

    fn valid_quote(&self, now: DateTime<Utc>) -> Option<&Quote> {
        let address = self.address.as_deref()?;
        self.quote
            .as_ref()
            .filter(|q| q.is_valid_for(&self.form, address, now))
    }
}

pub struct QuoteOrchestrator {
    api: Arc<dyn SwapApiPort>,
    settings: QuoteSettings,
    state: RwLock<QuoteState>,
}

impl QuoteOrchestrator {
    pub fn new(api: Arc<dyn SwapApiPort>, settings: QuoteSettings) -> Self {
        Self {
            api,
            settings,
            state: RwLock::new(QuoteState {
                form: SwapFormState::default(),
                address: None,
                generation: 0,
                phase: QuotePhase::Idle,
                quote: None,
            }),
        }
    }

    pub fn settings(&self) -> &QuoteSettings {
        &self.settings
    }

    pub async fn form(&self) -> SwapFormState {
        self.state.read().await.form.clone()
    }

    pub async fn address(&self) -> Option<String> {
        self.state.read().await.address.clone()
    }

    pub async fn generation(&self) -> u64 {
        self.state.read().await.generation
    }

    /// Replace the form. Returns whether anything changed.
    pub async fn set_form(&self, form: SwapFormState) -> bool {
        let mut state = self.state.write().await;
        if state.form == form {
            return false;
        }
        state.form = form;
        state.bump();
        true
    }

    /// Track the session address. Returns whether anything changed.
    pub async fn set_address(&self, address: Option<String>) -> bool {
        let mut state = self.state.write().await;
        if state.address == address {
            return false;
        }
        state.address = address;
        state.bump();
        true
    }

    /// Set the form and fetch a quote for it
    pub async fn update(&self, form: SwapFormState) -> Result<RefreshOutcome, QuoteError> {
        self.set_form(form).await;
        self.refresh().await
    }

    /// Fetch a quote for the current form and address.
    ///
    /// Only the most recently started fetch can apply its result. A fetch is
    /// never started without a positive amount and a session address.
    pub async fn refresh(&self) -> Result<RefreshOutcome, QuoteError> {
        let (generation, request) = {
            let mut state = self.state.write().await;
            let generation = state.bump();
            let Some(address) = state.address.clone() else {
                return Ok(RefreshOutcome::Skipped);
            };
            if !state.form.has_positive_amount() {
                return Ok(RefreshOutcome::Skipped);
            }
            state.phase = QuotePhase::Fetching;
            let request = SwapRequest::from_form(&state.form, self.settings.slippage_pct, &address);
            (generation, request)
        };

        debug!(generation, amount = %request.amount, "Fetching quote");
        let result = self.api.quote(&request).await;

        let mut state = self.state.write().await;
        if state.generation != generation {
            debug!(
                generation,
                current = state.generation,
                "Discarding stale quote result"
            );
            return Ok(RefreshOutcome::Discarded);
        }

        match result {
            Ok(payload) => {
                let quote = self.build_quote(payload, &state.form, request.user_address, Utc::now());
                info!(id = %quote.id, to_amount = %quote.to_amount, "Quote updated");
                state.quote = Some(quote.clone());
                state.phase = QuotePhase::Valid;
                Ok(RefreshOutcome::Applied(quote))
            }
            Err(e) => {
                warn!(error = %e, "Quote fetch failed");
                state.quote = None;
                state.phase = QuotePhase::Invalid;
                Err(QuoteError::Unavailable(e))
            }
        }
    }

    fn build_quote(
        &self,
        payload: QuotePayload,
        form: &SwapFormState,
        address: String,
        now: DateTime<Utc>,
    ) -> Quote {
        let expires_at = match payload.expires_in {
            Some(secs) => i64::try_from(secs)
                .ok()
                .and_then(chrono::Duration::try_seconds)
                .and_then(|ttl| now.checked_add_signed(ttl))
                .unwrap_or_else(|| {
                    warn!(expires_in = secs, "Quote expiry out of range; using fallback TTL");
                    self.fallback_expiry(now)
                }),
            None => self.fallback_expiry(now),
        };

        Quote {
            id: payload.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            to_amount: payload.to_amount,
            execution_time_seconds: payload.execution_time,
            price_impact_percent: payload.price_impact,
            bridge_fee: payload.bridge_fees,
            expires_at,
            form: form.clone(),
            address,
        }
    }

    fn fallback_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.settings.fallback_ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(now)
    }

    /// A price tick for a token the form references drops the quote and
    /// cancels any in-flight fetch. Returns whether the quote was affected.
    pub async fn on_price_update(&self, token: &str) -> bool {
        let mut state = self.state.write().await;
        if !state.form.references_token(token) {
            return false;
        }
        debug!(token, "Price moved; invalidating quote");
        state.bump();
        true
    }

    /// Drop the quote and cancel in-flight fetches
    pub async fn invalidate(&self) {
        self.state.write().await.bump();
    }

    /// Current quote if still valid at `now`
    pub async fn quote_at(&self, now: DateTime<Utc>) -> Option<Quote> {
        self.state.read().await.valid_quote(now).cloned()
    }

    pub async fn current_quote(&self) -> Option<Quote> {
        self.quote_at(Utc::now()).await
    }

    /// Phase and quote as seen at `now`; an expired quote reads as invalid
    pub async fn view_at(&self, now: DateTime<Utc>) -> QuoteView {
        let state = self.state.read().await;
        let quote = state.valid_quote(now).cloned();
        let phase = match (state.phase, &quote) {
            (QuotePhase::Valid, None) => QuotePhase::Invalid,
            (phase, _) => phase,
        };
        QuoteView {
            phase,
            quote,
            generation: state.generation,
        }
    }

    /// Remove the quote for submission. The quote is cleared whether or not
    /// it was still valid, so it can never be submitted twice.
    pub async fn take_for_execution(&self, now: DateTime<Utc>) -> Option<Quote> {
        let mut state = self.state.write().await;
        let quote = state.valid_quote(now).cloned();
        state.bump();
        quote
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::mocks::{quote_payload, MockSwapApi};
    use crate::ports::swap_api::MockSwapApiPort;
    use approx::assert_relative_eq;

    const ADDRESS: &str = "demo_address_123";

    fn form(amount: &str) -> SwapFormState {
        SwapFormState::default().with_amount(amount)
    }

    async fn orchestrator(api: impl SwapApiPort + 'static) -> QuoteOrchestrator {
        let quotes = QuoteOrchestrator::new(Arc::new(api), QuoteSettings::default());
        quotes.set_address(Some(ADDRESS.to_string())).await;
        quotes
    }

    #[tokio::test]
    async fn test_fetch_builds_quote() {
        let mut api = MockSwapApiPort::new();
        api.expect_quote()
            .withf(|req| req.amount == "1.0" && req.slippage == 0.5 && req.user_address == ADDRESS)
            .times(1)
            .returning(|_| Ok(quote_payload("19.85", 12, 0.3)));

        let quotes = orchestrator(api).await;
        let before = Utc::now();
        let outcome = quotes.update(form("1.0")).await.unwrap();

        let RefreshOutcome::Applied(quote) = outcome else {
            panic!("expected applied quote");
        };
        assert_eq!(quote.to_amount, "19.85");
        assert_eq!(quote.execution_time_seconds, 12);
        assert_relative_eq!(quote.price_impact_percent, 0.3);
        assert!(quote.expires_at >= before + chrono::Duration::seconds(30));
        assert_eq!(quotes.current_quote().await, Some(quote));
    }

    #[tokio::test]
    async fn test_server_ttl_and_id() {
        let mut payload = quote_payload("2", 5, 0.1);
        payload.id = Some("srv-1".into());
        payload.expires_in = Some(5);
        let quotes = orchestrator(MockSwapApi::new().with_quote(payload)).await;

        let RefreshOutcome::Applied(quote) = quotes.update(form("1")).await.unwrap() else {
            panic!("expected applied quote");
        };
        assert_eq!(quote.id, "srv-1");
        assert!(quote.time_to_expiry(Utc::now()) <= chrono::Duration::seconds(5));
    }

    #[tokio::test]
    async fn test_no_fetch_without_positive_amount() {
        let api = MockSwapApi::new().with_quote(quote_payload("1", 1, 0.0));
        let quotes = orchestrator(api.clone()).await;

        for amount in ["", "0", "-1", "abc"] {
            assert_eq!(quotes.update(form(amount)).await.unwrap(), RefreshOutcome::Skipped);
        }
        assert!(api.quote_requests().is_empty());
        assert_eq!(quotes.view_at(Utc::now()).await.phase, QuotePhase::Idle);
    }

    #[tokio::test]
    async fn test_no_fetch_without_address() {
        let api = MockSwapApi::new().with_quote(quote_payload("1", 1, 0.0));
        let quotes = QuoteOrchestrator::new(Arc::new(api.clone()), QuoteSettings::default());
        assert_eq!(quotes.update(form("1")).await.unwrap(), RefreshOutcome::Skipped);
        assert!(api.quote_requests().is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_invalid() {
        let api = MockSwapApi::new().with_quote_error(ApiError::Network("timeout".into()));
        let quotes = orchestrator(api).await;

        let err = quotes.update(form("1")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::QuoteUnavailable);
        let view = quotes.view_at(Utc::now()).await;
        assert_eq!(view.phase, QuotePhase::Invalid);
        assert!(view.quote.is_none());
    }

    #[tokio::test]
    async fn test_out_of_range_expiry_uses_fallback_ttl() {
        for expires_in in [10_000_000_000_000_000, u64::MAX] {
            let mut payload = quote_payload("19.85", 12, 0.3);
            payload.expires_in = Some(expires_in);
            let quotes = orchestrator(MockSwapApi::new().with_quote(payload)).await;

            let before = Utc::now();
            let RefreshOutcome::Applied(quote) = quotes.update(form("1")).await.unwrap() else {
                panic!("expected applied quote");
            };
            let after = Utc::now();

            assert!(quote.expires_at >= before + chrono::Duration::seconds(30));
            assert!(quote.expires_at <= after + chrono::Duration::seconds(30));
            assert!(!quote.is_expired_at(after));
        }
    }

    #[tokio::test]
    async fn test_stale_result_discarded() {
        let api = MockSwapApi::new().gated();
        let quotes = Arc::new(orchestrator(api.clone()).await);

        let first = tokio::spawn({
            let quotes = Arc::clone(&quotes);
            async move { quotes.update(form("1")).await }
        });
        while api.quote_requests().len() < 1 {
            tokio::task::yield_now().await;
        }
        let second = tokio::spawn({
            let quotes = Arc::clone(&quotes);
            async move { quotes.update(form("2")).await }
        });
        while api.quote_requests().len() < 2 {
            tokio::task::yield_now().await;
        }

        // Newer fetch completes first, older one afterwards
        api.resolve_quote(1, Ok(quote_payload("40", 1, 0.1)));
        let applied = second.await.unwrap().unwrap();
        api.resolve_quote(0, Ok(quote_payload("20", 1, 0.1)));
        let stale = first.await.unwrap().unwrap();

        assert!(matches!(applied, RefreshOutcome::Applied(ref q) if q.to_amount == "40"));
        assert_eq!(stale, RefreshOutcome::Discarded);
        assert_eq!(quotes.current_quote().await.unwrap().to_amount, "40");
    }

    #[tokio::test]
    async fn test_form_change_invalidates_quote() {
        let quotes = orchestrator(MockSwapApi::new().with_quote(quote_payload("1", 1, 0.0))).await;
        quotes.update(form("1")).await.unwrap();
        assert!(quotes.current_quote().await.is_some());

        assert!(quotes.set_form(form("1").flipped()).await);
        assert!(quotes.current_quote().await.is_none());
        assert!(!quotes.set_form(form("1").flipped()).await);
    }

    #[tokio::test]
    async fn test_expired_quote_reads_invalid() {
        let quotes = orchestrator(MockSwapApi::new().with_quote(quote_payload("1", 1, 0.0))).await;
        let RefreshOutcome::Applied(quote) = quotes.update(form("1")).await.unwrap() else {
            panic!("expected applied quote");
        };

        let just_before = quote.expires_at - chrono::Duration::milliseconds(1);
        assert!(quotes.quote_at(just_before).await.is_some());
        assert!(quotes.quote_at(quote.expires_at).await.is_none());
        assert_eq!(quotes.view_at(quote.expires_at).await.phase, QuotePhase::Invalid);
    }

    #[tokio::test]
    async fn test_price_update_for_referenced_token() {
        let quotes = orchestrator(MockSwapApi::new().with_quote(quote_payload("1", 1, 0.0))).await;
        quotes.update(form("1")).await.unwrap();

        assert!(!quotes.on_price_update("BTC").await);
        assert!(quotes.current_quote().await.is_some());

        assert!(quotes.on_price_update("sol").await);
        let view = quotes.view_at(Utc::now()).await;
        assert_eq!(view.phase, QuotePhase::Idle);
        assert!(view.quote.is_none());
    }

    #[tokio::test]
    async fn test_take_for_execution_is_single_use() {
        let quotes = orchestrator(MockSwapApi::new().with_quote(quote_payload("1", 1, 0.0))).await;
        quotes.update(form("1")).await.unwrap();

        assert!(quotes.take_for_execution(Utc::now()).await.is_some());
        assert!(quotes.take_for_execution(Utc::now()).await.is_none());
    }
}
