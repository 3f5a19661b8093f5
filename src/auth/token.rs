//! Bearer token model and lifecycle helpers.

// self
use crate::{_prelude::*, auth::SecretString};

/// Logical status of the cached bearer token relative to an instant and a safety margin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
	/// No token has been acquired yet (or the cache was cleared).
	Absent,
	/// Token stays usable for longer than the safety margin.
	Valid,
	/// Token has not expired yet but falls inside the safety margin; the next access refreshes.
	ExpiringSoon,
	/// Token exceeded its expiry instant.
	Expired,
}
impl TokenStatus {
	/// Computes the status of an optional token, mapping `None` to [`TokenStatus::Absent`].
	pub fn of(token: Option<&AccessToken>, instant: OffsetDateTime, margin: Duration) -> Self {
		token.map_or(Self::Absent, |token| token.status_at(instant, margin))
	}

	/// Returns `true` when a token in this state may be handed to callers.
	pub const fn is_usable(self) -> bool {
		matches!(self, Self::Valid)
	}

	/// Returns a stable label suitable for span or log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Absent => "absent",
			Self::Valid => "valid",
			Self::ExpiringSoon => "expiring_soon",
			Self::Expired => "expired",
		}
	}
}
impl Display for TokenStatus {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Bearer token issued by the OAuth token endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
	/// Opaque bearer value; callers must avoid logging it.
	pub value: SecretString,
	/// Instant the token was received.
	pub issued_at: OffsetDateTime,
	/// Absolute expiry instant derived from `expires_in`.
	pub expires_at: OffsetDateTime,
}
impl AccessToken {
	/// Creates a token with explicit issue and expiry instants.
	pub fn new(
		value: impl Into<SecretString>,
		issued_at: OffsetDateTime,
		expires_at: OffsetDateTime,
	) -> Self {
		Self { value: value.into(), issued_at, expires_at }
	}

	/// Creates a token issued now that expires after `lifetime`.
	pub fn issued_now(value: impl Into<SecretString>, lifetime: Duration) -> Self {
		let issued_at = OffsetDateTime::now_utc();

		Self::new(value, issued_at, issued_at + lifetime)
	}

	/// Like [`AccessToken::issued_now`], but returns `None` when the expiry instant is not
	/// representable.
	pub fn try_issued_now(value: impl Into<SecretString>, lifetime: Duration) -> Option<Self> {
		let issued_at = OffsetDateTime::now_utc();

		issued_at.checked_add(lifetime).map(|expires_at| Self::new(value, issued_at, expires_at))
	}

	/// Computes the lifecycle status at `instant` using `margin` as the refresh band.
	pub fn status_at(&self, instant: OffsetDateTime, margin: Duration) -> TokenStatus {
		if instant >= self.expires_at {
			return TokenStatus::Expired;
		}
		// A margin reaching past the representable range covers every instant.
		match self.expires_at.checked_sub(margin) {
			Some(refresh_at) if instant < refresh_at => TokenStatus::Valid,
			_ => TokenStatus::ExpiringSoon,
		}
	}

	/// Returns `true` if the token stays valid for longer than `margin` after `instant`.
	pub fn is_usable_at(&self, instant: OffsetDateTime, margin: Duration) -> bool {
		self.status_at(instant, margin).is_usable()
	}

	/// Time left before the hard expiry, clamped at zero.
	pub fn remaining_at(&self, instant: OffsetDateTime) -> Duration {
		let remaining = self.expires_at - instant;

		if remaining.is_negative() { Duration::ZERO } else { remaining }
	}

	/// Returns the `Authorization` header value for this token.
	pub fn bearer(&self) -> String {
		format!("Bearer {}", self.value.expose())
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessToken")
			.field("value", &"<redacted>")
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}
