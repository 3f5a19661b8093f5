//! Optional observability helpers for client calls.
//!
//! # Feature Flags
//!
//! - Enable `tracing` (on by default) to emit structured spans named `pam_client.call` with the
//!   `call` (operation) and `stage` (call site) fields, plus token lifecycle events.
//! - Enable `metrics` to increment the `pam_client_call_total` counter for every
//!   attempt/success/failure, labeled by `call` + `outcome`.

mod tracing;

pub use tracing::*;

// self
use crate::_prelude::*;

/// Outbound operations observed by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallKind {
	/// OAuth client-credentials exchange.
	TokenAcquire,
	/// Session sign-in with a bearer token.
	SignIn,
	/// Single secret lookup.
	SecretFetch,
	/// Folder listing or folder secret retrieval.
	FolderFetch,
}
impl CallKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CallKind::TokenAcquire => "token_acquire",
			CallKind::SignIn => "sign_in",
			CallKind::SecretFetch => "secret_fetch",
			CallKind::FolderFetch => "folder_fetch",
		}
	}
}
impl Display for CallKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallOutcome {
	/// Entry to a client operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl CallOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CallOutcome::Attempt => "attempt",
			CallOutcome::Success => "success",
			CallOutcome::Failure => "failure",
		}
	}
}
impl Display for CallOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Runs `call` inside a [`CallSpan`] and records attempt/success/failure around it.
pub(crate) fn observe<T>(
	kind: CallKind,
	stage: &'static str,
	call: impl FnOnce() -> Result<T>,
) -> Result<T> {
	let _span = CallSpan::new(kind, stage).entered();

	record_call_outcome(kind, CallOutcome::Attempt);

	let result = call();

	match &result {
		Ok(_) => record_call_outcome(kind, CallOutcome::Success),
		Err(err) => {
			record_call_outcome(kind, CallOutcome::Failure);
			call_failed(kind, err);
		},
	}

	result
}

fn record_call_outcome(kind: CallKind, outcome: CallOutcome) {
	#[cfg(feature = "metrics")]
	metrics::counter!("pam_client_call_total", "call" => kind.as_str(), "outcome" => outcome.as_str())
		.increment(1);
	#[cfg(not(feature = "metrics"))]
	let _ = (kind, outcome);
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn observe_passes_results_through() {
		let ok = observe(CallKind::SecretFetch, "test", || Ok(7));

		assert_eq!(ok.ok(), Some(7));

		let err = observe::<()>(CallKind::FolderFetch, "test", || {
			Err(Error::NotFound { resource: "Folder `x`".into() })
		});

		assert!(matches!(err, Err(Error::NotFound { .. })));
	}
}
