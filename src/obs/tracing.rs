// self
use crate::{
	_prelude::*,
	auth::{AccessToken, TokenStatus},
	obs::CallKind,
};

/// A span builder used by client calls.
#[derive(Clone, Debug)]
pub struct CallSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl CallSpan {
	/// Creates a new span tagged with the provided call kind + stage.
	pub fn new(kind: CallKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("pam_client.call", call = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Enters the span for the duration of the returned guard.
	pub fn entered(self) -> CallSpanGuard {
		#[cfg(feature = "tracing")]
		{
			CallSpanGuard { guard: self.span.entered() }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = self;

			CallSpanGuard {}
		}
	}
}

/// RAII guard returned by [`CallSpan::entered`].
pub struct CallSpanGuard {
	#[cfg(feature = "tracing")]
	#[allow(dead_code)]
	guard: tracing::span::EnteredSpan,
}
impl Debug for CallSpanGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("CallSpanGuard(..)")
	}
}

pub(crate) fn call_failed(kind: CallKind, err: &Error) {
	#[cfg(feature = "tracing")]
	tracing::debug!(call = kind.as_str(), error = %err, "call failed");
	#[cfg(not(feature = "tracing"))]
	let _ = (kind, err);
}

pub(crate) fn token_refresh_started(status: TokenStatus, forced: bool) {
	#[cfg(feature = "tracing")]
	tracing::debug!(status = status.as_str(), forced, "refreshing access token");
	#[cfg(not(feature = "tracing"))]
	let _ = (status, forced);
}

pub(crate) fn token_refreshed(token: &AccessToken) {
	#[cfg(feature = "tracing")]
	tracing::info!(expires_at = %token.expires_at, "access token refreshed");
	#[cfg(not(feature = "tracing"))]
	let _ = token;
}

pub(crate) fn token_refresh_failed(err: &Error) {
	#[cfg(feature = "tracing")]
	tracing::warn!(error = %err, "access token refresh failed");
	#[cfg(not(feature = "tracing"))]
	let _ = err;
}

pub(crate) fn token_refresh_retry(attempt: u32, delay: std::time::Duration, err: &Error) {
	#[cfg(feature = "tracing")]
	tracing::warn!(
		attempt,
		delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
		error = %err,
		"retrying token acquisition"
	);
	#[cfg(not(feature = "tracing"))]
	let _ = (attempt, delay, err);
}

pub(crate) fn token_rejected(kind: CallKind, status: u16) {
	#[cfg(feature = "tracing")]
	tracing::warn!(call = kind.as_str(), status, "bearer token rejected; forcing one refresh");
	#[cfg(not(feature = "tracing"))]
	let _ = (kind, status);
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn call_span_enters_without_subscriber() {
		let _guard = CallSpan::new(CallKind::TokenAcquire, "test").entered();
		// Compile-time smoke test ensures the guard exists with or without tracing.
	}
}
