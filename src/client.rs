//! Consumer-facing client facade.

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, SecretString},
	cache::TokenCache,
	config::ClientConfig,
	http::ConnectionPool,
	oauth::{Authenticator, OAuth2Authenticator},
	secrets::{Folder, SecretClient, SecretValue},
};

/// Owns the shared token cache and connection pool for one set of credentials.
///
/// Build one instance at startup and hand clones (or references) to worker threads; every
/// clone shares the same cache and pool, so callers never re-authenticate on their own. The
/// HTTP client is created on first use and released by [`PamClient::close`].
#[derive(Clone)]
pub struct PamClient {
	config: Arc<ClientConfig>,
	pool: Arc<ConnectionPool>,
	cache: Arc<TokenCache>,
	secrets: SecretClient,
}
impl PamClient {
	/// Creates a client that authenticates with the OAuth 2.0 client-credentials grant.
	pub fn new(config: ClientConfig) -> Result<Self> {
		config.validate()?;

		let pool = Arc::new(ConnectionPool::new(config.timeout));
		let authenticator = Arc::new(OAuth2Authenticator::new(&config, pool.clone())?);

		Ok(Self::assemble(config, pool, authenticator))
	}

	/// Creates a client that obtains tokens from a caller-provided [`Authenticator`].
	pub fn with_authenticator(
		config: ClientConfig,
		authenticator: Arc<dyn Authenticator>,
	) -> Result<Self> {
		config.validate()?;

		let pool = Arc::new(ConnectionPool::new(config.timeout));

		Ok(Self::assemble(config, pool, authenticator))
	}

	/// Loads the configuration from `BT_*` environment variables and builds a client.
	pub fn from_env() -> Result<Self> {
		Self::new(ClientConfig::from_env()?)
	}

	fn assemble(
		config: ClientConfig,
		pool: Arc<ConnectionPool>,
		authenticator: Arc<dyn Authenticator>,
	) -> Self {
		let cache = Arc::new(
			TokenCache::new(authenticator, config.token_safety_margin)
				.with_retry(config.token_retry),
		);
		let secrets = SecretClient::new(&config.credentials, cache.clone(), pool.clone());

		Self { config: Arc::new(config), pool, cache, secrets }
	}

	/// Ensures a valid token is cached and returns it.
	pub fn authenticate(&self) -> Result<AccessToken> {
		self.ensure_open()?;
		self.cache.get_valid_token()
	}

	/// Fetches a single secret by identifier.
	pub fn get_secret(&self, identifier: &str) -> Result<SecretValue> {
		self.secrets.get_secret(identifier)
	}

	/// Lists the folders visible to the client.
	pub fn list_folders(&self) -> Result<Vec<Folder>> {
		self.secrets.list_folders()
	}

	/// Returns every secret in the named folder, keyed by title.
	pub fn get_folder_secrets(&self, folder_name: &str) -> Result<BTreeMap<String, SecretString>> {
		self.secrets.get_folder_secrets(folder_name)
	}

	/// Releases the shared connection pool and forgets the cached token.
	///
	/// Every clone observes the closure; later calls fail with
	/// [`ConfigError::ClientClosed`](crate::error::ConfigError::ClientClosed).
	pub fn close(&self) {
		if self.pool.close() {
			self.cache.clear();
		}
	}

	/// Returns `true` until [`PamClient::close`] is called.
	pub fn is_open(&self) -> bool {
		self.pool.is_open()
	}

	/// Returns the shared token cache.
	pub fn token_cache(&self) -> &TokenCache {
		&self.cache
	}

	/// Returns the configuration the client was built from.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	fn ensure_open(&self) -> Result<()> {
		if self.pool.is_open() {
			Ok(())
		} else {
			Err(crate::error::ConfigError::ClientClosed.into())
		}
	}
}
impl Debug for PamClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PamClient")
			.field("base_url", &self.config.credentials.base_url.as_str())
			.field("client_id", &self.config.credentials.client_id)
			.field("pool", &self.pool)
			.field("cache", &self.cache)
			.finish()
	}
}
