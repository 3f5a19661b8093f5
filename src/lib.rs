//! Thread-safe PAM secrets client: OAuth 2.0 client-credentials with a single shared,
//! self-refreshing token cache and one pooled HTTP client for every outbound call.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod secrets;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use crate::{
		auth::AccessToken,
		client::PamClient,
		config::{ClientConfig, Credentials},
		oauth::Authenticator,
	};

	/// Client identifier shared by the fixtures below.
	pub const TEST_CLIENT_ID: &str = "a";
	/// Client secret shared by the fixtures below.
	pub const TEST_CLIENT_SECRET: &str = "b";

	/// Builds a config that points every endpoint at `base_url` and accepts plain HTTP so
	/// `httpmock` servers can stand in for the PAM API.
	pub fn test_config(base_url: &str) -> ClientConfig {
		let base = Url::parse(base_url).expect("Test base URL should parse.");
		let credentials = Credentials::new(TEST_CLIENT_ID, TEST_CLIENT_SECRET, base);

		ClientConfig::new(credentials).allow_insecure_http(true)
	}

	/// Outcome scripted for a single [`ScriptedAuthenticator::acquire`] call.
	#[derive(Clone, Debug)]
	pub enum Script {
		/// Issue a token with the given value and lifetime.
		Issue(&'static str, Duration),
		/// Fail with an authentication error.
		Reject,
		/// Fail with a network error.
		Unreachable,
	}

	/// [`Authenticator`] double that counts calls and replays a script.
	///
	/// Once the script is exhausted the last entry repeats. An optional delay simulates a slow
	/// token endpoint so contention tests can pile threads up behind the refresh guard.
	#[derive(Debug)]
	pub struct ScriptedAuthenticator {
		script: Mutex<Vec<Script>>,
		calls: AtomicUsize,
		delay: std::time::Duration,
	}
	impl ScriptedAuthenticator {
		/// Creates a double that replays `script` in order.
		pub fn new(script: impl IntoIterator<Item = Script>) -> Self {
			Self {
				script: Mutex::new(script.into_iter().collect()),
				calls: AtomicUsize::new(0),
				delay: std::time::Duration::ZERO,
			}
		}

		/// Creates a double that always issues `value` with the given lifetime in seconds.
		pub fn issuing(value: &'static str, lifetime_secs: i64) -> Self {
			Self::new([Script::Issue(value, Duration::seconds(lifetime_secs))])
		}

		/// Sleeps for `delay` inside every call.
		pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
			self.delay = delay;

			self
		}

		/// Returns the number of `acquire` calls observed so far.
		pub fn calls(&self) -> usize {
			self.calls.load(Ordering::SeqCst)
		}
	}
	impl Authenticator for ScriptedAuthenticator {
		fn acquire(&self) -> Result<AccessToken> {
			let call = self.calls.fetch_add(1, Ordering::SeqCst);

			if !self.delay.is_zero() {
				std::thread::sleep(self.delay);
			}

			let step = {
				let script = self.script.lock();

				script.get(call).or_else(|| script.last()).cloned()
			};

			match step.expect("Scripted authenticator needs at least one step.") {
				Script::Issue(value, lifetime) =>
					Ok(AccessToken::issued_now(value, lifetime)),
				Script::Reject => Err(Error::Authentication {
					status: Some(401),
					message: "invalid_client".into(),
				}),
				Script::Unreachable => Err(TransportError::network(std::io::Error::new(
					std::io::ErrorKind::ConnectionRefused,
					"connection refused",
				))
				.into()),
			}
		}
	}

	/// Builds a [`PamClient`] wired to `base_url` whose token exchange is served by `auth`.
	pub fn build_scripted_client(
		base_url: &str,
		auth: Arc<ScriptedAuthenticator>,
	) -> PamClient {
		PamClient::with_authenticator(test_config(base_url), auth)
			.expect("Scripted test client should build.")
	}
}

mod _prelude {
	pub use std::{
		collections::BTreeMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	pub use reqwest::blocking::Client as ReqwestClient;
	pub use reqwest::Error as ReqwestError;
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result, TransportError};
}

pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _, tracing_subscriber as _};
