//! Shared connection pool and transport primitives.
//!
//! [`ConnectionPool`] owns the single reqwest client every outbound request goes through,
//! including the OAuth token exchange. The client is built on first use and released by
//! [`ConnectionPool::close`]. [`ResponseMetadata`] and [`ResponseMetadataSlot`] let the token
//! exchange keep the HTTP status around after `oauth2` has consumed the response, so
//! authentication failures can report it.

// crates.io
use oauth2::{HttpClientError, HttpRequest, HttpResponse, SyncHttpClient};
use reqwest::redirect::Policy;
// self
use crate::{_prelude::*, error::ConfigError};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Captures metadata from the most recent HTTP response for downstream error mapping.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code returned by the endpoint, if available.
	pub status: Option<u16>,
}

/// Thread-safe slot for sharing [`ResponseMetadata`] between transport and error layers.
///
/// A fresh slot is created for each token request and read immediately after `oauth2`
/// resolves.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores new metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, if any, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

enum PoolState {
	Idle,
	Ready(ReqwestClient),
	Closed,
}

/// Lazily built, shared HTTP client.
///
/// Cloning the inner reqwest client is cheap (it is reference counted), so callers borrow a
/// clone per request while connections stay pooled in one place.
pub struct ConnectionPool {
	timeout: std::time::Duration,
	state: RwLock<PoolState>,
}
impl ConnectionPool {
	/// Creates an idle pool whose client will apply `timeout` to every request.
	pub fn new(timeout: std::time::Duration) -> Self {
		Self { timeout, state: RwLock::new(PoolState::Idle) }
	}

	/// Creates a pool around an existing client.
	///
	/// The caller is responsible for configuring timeouts and disabling redirects on `client`.
	pub fn with_client(client: ReqwestClient) -> Self {
		Self { timeout: Default::default(), state: RwLock::new(PoolState::Ready(client)) }
	}

	/// Returns the shared client, building it on first use.
	pub fn client(&self) -> Result<ReqwestClient> {
		if let PoolState::Ready(client) = &*self.state.read() {
			return Ok(client.clone());
		}

		let mut state = self.state.write();

		match &*state {
			PoolState::Ready(client) => Ok(client.clone()),
			PoolState::Closed => Err(ConfigError::ClientClosed.into()),
			PoolState::Idle => {
				let client = self.build()?;

				*state = PoolState::Ready(client.clone());

				Ok(client)
			},
		}
	}

	/// Returns `true` while the pool has not been closed.
	pub fn is_open(&self) -> bool {
		!matches!(&*self.state.read(), PoolState::Closed)
	}

	/// Returns `true` once the underlying client has been built.
	pub fn is_initialized(&self) -> bool {
		matches!(&*self.state.read(), PoolState::Ready(_))
	}

	/// Releases the shared client. Subsequent calls fail with [`ConfigError::ClientClosed`].
	///
	/// Returns `false` if the pool was already closed.
	pub fn close(&self) -> bool {
		let previous = std::mem::replace(&mut *self.state.write(), PoolState::Closed);

		!matches!(previous, PoolState::Closed)
	}

	/// Builds an `oauth2` transport handle that records outcomes in `slot`.
	pub(crate) fn instrumented(&self, slot: ResponseMetadataSlot) -> Result<InstrumentedHandle> {
		Ok(InstrumentedHandle { client: self.client()?, slot })
	}

	fn build(&self) -> Result<ReqwestClient, ConfigError> {
		ReqwestClient::builder()
			.timeout(self.timeout)
			.connect_timeout(self.timeout)
			.redirect(Policy::none())
			.user_agent(USER_AGENT)
			.build()
			.map_err(ConfigError::http_client_build)
	}
}
impl Debug for ConnectionPool {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = match &*self.state.read() {
			PoolState::Idle => "idle",
			PoolState::Ready(_) => "ready",
			PoolState::Closed => "closed",
		};

		f.debug_struct("ConnectionPool")
			.field("timeout", &self.timeout)
			.field("state", &state)
			.finish()
	}
}

/// Blocking [`SyncHttpClient`] adapter over the pooled client that captures response metadata.
pub(crate) struct InstrumentedHandle {
	client: ReqwestClient,
	slot: ResponseMetadataSlot,
}
impl SyncHttpClient for InstrumentedHandle {
	type Error = HttpClientError<ReqwestError>;

	fn call(&self, request: HttpRequest) -> Result<HttpResponse, Self::Error> {
		self.slot.take();

		let response = self.client.execute(request.try_into().map_err(Box::new)?).map_err(Box::new)?;
		let status = response.status();
		let headers = response.headers().to_owned();

		self.slot.store(ResponseMetadata { status: Some(status.as_u16()) });

		let mut response_new = HttpResponse::new(response.bytes().map_err(Box::new)?.to_vec());

		*response_new.status_mut() = status;
		*response_new.headers_mut() = headers;

		Ok(response_new)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn pool_builds_lazily_and_reuses_client() {
		let pool = ConnectionPool::new(std::time::Duration::from_secs(1));

		assert!(!pool.is_initialized());

		pool.client().expect("Pool should build its client on first use.");

		assert!(pool.is_initialized());

		pool.client().expect("Pool should hand out the cached client.");

		assert!(pool.is_open());
	}

	#[test]
	fn closed_pool_refuses_to_rebuild() {
		let pool = ConnectionPool::new(std::time::Duration::from_secs(1));

		pool.client().expect("Pool should build its client on first use.");

		assert!(pool.close());
		assert!(!pool.close());
		assert!(!pool.is_open());

		let err = pool.client().expect_err("Closed pool should not hand out clients.");

		assert!(matches!(err, Error::Config(ConfigError::ClientClosed)));
	}

	#[test]
	fn metadata_slot_take_consumes_value() {
		let slot = ResponseMetadataSlot::default();

		slot.store(ResponseMetadata { status: Some(401) });

		assert_eq!(slot.take().and_then(|meta| meta.status), Some(401));
		assert!(slot.take().is_none());
	}
}
