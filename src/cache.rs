//! Shared bearer-token cache with double-checked, single-flight refresh.
//!
//! [`TokenCache::get_valid_token`] serves the cached token behind a shared read lock as long as
//! it stays outside the safety margin. Otherwise callers queue on one refresh guard; the first
//! one through calls the [`Authenticator`], and everyone behind it re-checks the cache before
//! deciding whether a call is still needed. A failed refresh leaves the cached token untouched,
//! so the next caller simply tries again.

mod metrics;

pub use metrics::RefreshMetrics;

// crates.io
use rand::Rng;
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, TokenStatus},
	config::RetryPolicy,
	oauth::Authenticator,
	obs,
};

/// Process-wide token holder shared by every caller of one client.
pub struct TokenCache {
	authenticator: Arc<dyn Authenticator>,
	current: RwLock<Option<AccessToken>>,
	refresh_guard: Mutex<()>,
	safety_margin: Duration,
	retry: RetryPolicy,
	metrics: RefreshMetrics,
}
impl TokenCache {
	/// Creates an empty cache refreshing through `authenticator`.
	pub fn new(authenticator: Arc<dyn Authenticator>, safety_margin: Duration) -> Self {
		Self {
			authenticator,
			current: RwLock::new(None),
			refresh_guard: Mutex::new(()),
			safety_margin: if safety_margin.is_negative() { Duration::ZERO } else { safety_margin },
			retry: RetryPolicy::NONE,
			metrics: RefreshMetrics::default(),
		}
	}

	/// Enables retries for network failures during acquisition.
	pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;

		self
	}

	/// Returns a token that stays valid for longer than the safety margin.
	///
	/// A token acquired by this very call is returned even if the endpoint granted a lifetime
	/// shorter than the margin; the next access will refresh again.
	pub fn get_valid_token(&self) -> Result<AccessToken> {
		if let Some(token) = self.usable(OffsetDateTime::now_utc()) {
			self.metrics.record_cache_hit();

			return Ok(token);
		}

		let _refresh = self.refresh_guard.lock();
		let now = OffsetDateTime::now_utc();

		// Another thread may have refreshed while this one waited on the guard.
		if let Some(token) = self.usable(now) {
			self.metrics.record_cache_hit();

			return Ok(token);
		}

		let status = TokenStatus::of(self.current.read().as_ref(), now, self.safety_margin);

		self.refresh(status, false)
	}

	/// Replaces a token the server rejected, bypassing the fast path.
	///
	/// If another thread already swapped `rejected` for a different usable token, that token is
	/// returned without contacting the token endpoint.
	pub fn force_refresh(&self, rejected: &AccessToken) -> Result<AccessToken> {
		let _refresh = self.refresh_guard.lock();
		let now = OffsetDateTime::now_utc();

		if let Some(token) = self.usable(now).filter(|token| token != rejected) {
			return Ok(token);
		}

		let status = TokenStatus::of(self.current.read().as_ref(), now, self.safety_margin);

		self.refresh(status, true)
	}

	/// Returns the cached token, if any, regardless of its status.
	pub fn current(&self) -> Option<AccessToken> {
		self.current.read().clone()
	}

	/// Reports the status of the cached token right now.
	pub fn status(&self) -> TokenStatus {
		TokenStatus::of(self.current.read().as_ref(), OffsetDateTime::now_utc(), self.safety_margin)
	}

	/// Drops the cached token so the next access re-authenticates.
	pub fn clear(&self) {
		let _refresh = self.refresh_guard.lock();

		*self.current.write() = None;
	}

	/// Returns the configured safety margin.
	pub fn safety_margin(&self) -> Duration {
		self.safety_margin
	}

	/// Returns the refresh counters.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.metrics
	}

	fn usable(&self, now: OffsetDateTime) -> Option<AccessToken> {
		self.current
			.read()
			.as_ref()
			.filter(|token| token.is_usable_at(now, self.safety_margin))
			.cloned()
	}

	// Must be called with `refresh_guard` held.
	fn refresh(&self, status: TokenStatus, forced: bool) -> Result<AccessToken> {
		self.metrics.record_attempt();
		obs::token_refresh_started(status, forced);

		let mut attempt = 0;

		loop {
			match self.authenticator.acquire() {
				Ok(token) => {
					*self.current.write() = Some(token.clone());

					self.metrics.record_success();
					obs::token_refreshed(&token);

					return Ok(token);
				},
				Err(err) if err.is_network() && attempt < self.retry.max_retries => {
					attempt += 1;

					let delay = jittered(self.retry.delay_for(attempt));

					obs::token_refresh_retry(attempt, delay, &err);
					std::thread::sleep(delay);
				},
				Err(err) => {
					self.metrics.record_failure();
					obs::token_refresh_failed(&err);

					return Err(err);
				},
			}
		}
	}
}
impl Debug for TokenCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenCache")
			.field("status", &self.status())
			.field("safety_margin", &self.safety_margin)
			.field("retry", &self.retry)
			.finish()
	}
}

/// Adds up to 25% random jitter to `base`.
fn jittered(base: std::time::Duration) -> std::time::Duration {
	let spread = u64::try_from(base.as_millis() / 4).unwrap_or(u64::MAX);

	if spread == 0 {
		return base;
	}

	base.saturating_add(std::time::Duration::from_millis(rand::rng().random_range(0..=spread)))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::{Script, ScriptedAuthenticator};

	fn cache(auth: &Arc<ScriptedAuthenticator>, margin_secs: i64) -> TokenCache {
		TokenCache::new(auth.clone(), Duration::seconds(margin_secs))
	}

	#[test]
	fn token_inside_margin_triggers_refresh() {
		let auth = Arc::new(ScriptedAuthenticator::issuing("T2", 300));
		let cache = cache(&auth, 60);

		*cache.current.write() = Some(AccessToken::issued_now("T1", Duration::seconds(30)));

		assert_eq!(cache.status(), TokenStatus::ExpiringSoon);

		let token = cache.get_valid_token().expect("Refresh should succeed.");

		assert_eq!(token.value.expose(), "T2");
		assert_eq!(auth.calls(), 1);
		assert_eq!(cache.status(), TokenStatus::Valid);
	}

	#[test]
	fn failed_proactive_refresh_keeps_cached_token() {
		let auth = Arc::new(ScriptedAuthenticator::new([Script::Reject]));
		let cache = cache(&auth, 60);
		let stale = AccessToken::issued_now("T1", Duration::seconds(30));

		*cache.current.write() = Some(stale.clone());

		let err = cache.get_valid_token().expect_err("Rejected refresh should propagate.");

		assert!(matches!(err, Error::Authentication { status: Some(401), .. }));
		assert_eq!(cache.current(), Some(stale));
		assert_eq!(cache.metrics().failures(), 1);
	}

	#[test]
	fn network_failures_retry_up_to_policy() {
		let auth = Arc::new(ScriptedAuthenticator::new([Script::Unreachable]));
		let cache = cache(&auth, 60)
			.with_retry(RetryPolicy::new(2, std::time::Duration::from_millis(1)));
		let err = cache.get_valid_token().expect_err("Unreachable endpoint should propagate.");

		assert!(err.is_network());
		assert_eq!(auth.calls(), 3);
		assert_eq!(cache.status(), TokenStatus::Absent);
	}

	#[test]
	fn retry_recovers_after_transient_failure() {
		let auth = Arc::new(ScriptedAuthenticator::new([
			Script::Unreachable,
			Script::Issue("T1", Duration::seconds(300)),
		]));
		let cache = cache(&auth, 60)
			.with_retry(RetryPolicy::new(1, std::time::Duration::from_millis(1)));
		let token = cache.get_valid_token().expect("Second attempt should succeed.");

		assert_eq!(token.value.expose(), "T1");
		assert_eq!(auth.calls(), 2);
		assert_eq!(cache.metrics().attempts(), 1);
		assert_eq!(cache.metrics().successes(), 1);
	}

	#[test]
	fn authentication_failures_are_not_retried() {
		let auth = Arc::new(ScriptedAuthenticator::new([Script::Reject]));
		let cache = cache(&auth, 60)
			.with_retry(RetryPolicy::new(3, std::time::Duration::from_millis(1)));

		cache.get_valid_token().expect_err("Rejected credentials should propagate.");

		assert_eq!(auth.calls(), 1);
	}

	#[test]
	fn force_refresh_skips_call_when_token_already_replaced() {
		let auth = Arc::new(ScriptedAuthenticator::new([
			Script::Issue("T1", Duration::seconds(300)),
			Script::Issue("T2", Duration::seconds(300)),
		]));
		let cache = cache(&auth, 60);
		let first = cache.get_valid_token().expect("Initial acquisition should succeed.");
		let second = cache.force_refresh(&first).expect("Forced refresh should succeed.");

		assert_eq!(second.value.expose(), "T2");
		assert_eq!(auth.calls(), 2);

		let third = cache.force_refresh(&first).expect("Stale rejection should reuse T2.");

		assert_eq!(third.value.expose(), "T2");
		assert_eq!(auth.calls(), 2);
	}

	#[test]
	fn clear_forgets_token() {
		let auth = Arc::new(ScriptedAuthenticator::issuing("T1", 300));
		let cache = cache(&auth, 60);

		cache.get_valid_token().expect("Initial acquisition should succeed.");
		cache.clear();

		assert_eq!(cache.status(), TokenStatus::Absent);

		cache.get_valid_token().expect("Re-acquisition should succeed.");

		assert_eq!(auth.calls(), 2);
	}

	#[test]
	fn margin_beyond_calendar_range_refreshes_every_call() {
		let auth = Arc::new(ScriptedAuthenticator::issuing("T1", 300));
		let cache = cache(&auth, 1_000_000_000_000);

		cache.get_valid_token().expect("First acquisition should succeed.");
		cache.get_valid_token().expect("Second acquisition should succeed.");

		assert_eq!(cache.status(), TokenStatus::ExpiringSoon);
		assert_eq!(auth.calls(), 2);
	}

	#[test]
	fn jitter_stays_within_a_quarter() {
		let base = std::time::Duration::from_millis(400);

		for _ in 0..32 {
			let delay = jittered(base);

			assert!(delay >= base && delay <= std::time::Duration::from_millis(500));
		}
	}
}
