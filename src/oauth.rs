//! OAuth 2.0 client-credentials authenticator.
//!
//! [`Authenticator`] is the seam between the token cache and the token endpoint. The default
//! [`OAuth2Authenticator`] drives the exchange through the `oauth2` crate over the shared
//! [`ConnectionPool`], and maps every failure into the client taxonomy: rejected or malformed
//! responses become [`Error::Authentication`], transport failures become [`Error::Network`].
//! It never retries; retry policy belongs to the caller.

pub use oauth2;

// crates.io
use oauth2::{
	AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet, HttpClientError,
	RequestTokenError, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError},
};
// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	config::{ClientAuthMethod, ClientConfig},
	error::{self, ConfigError},
	http::{ConnectionPool, ResponseMetadata, ResponseMetadataSlot},
	obs::{self, CallKind},
};

type ConfiguredBasicClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;
type FacadeTokenResponse = oauth2::basic::BasicTokenResponse;

const TOKEN_ENDPOINT: &str = "the token endpoint";

/// Performs the token-acquisition call.
///
/// Implementations must be callable from any thread; the token cache guarantees that at most
/// one call is in flight at a time.
pub trait Authenticator
where
	Self: Send + Sync,
{
	/// Acquires a fresh bearer token.
	fn acquire(&self) -> Result<AccessToken>;
}

/// Default [`Authenticator`] performing the `client_credentials` grant.
pub struct OAuth2Authenticator {
	oauth_client: ConfiguredBasicClient,
	pool: Arc<ConnectionPool>,
}
impl OAuth2Authenticator {
	/// Lifetime assumed when the token endpoint omits `expires_in`.
	pub const DEFAULT_LIFETIME: Duration = Duration::hours(1);

	/// Builds an authenticator for `config` that sends requests through `pool`.
	pub fn new(config: &ClientConfig, pool: Arc<ConnectionPool>) -> Result<Self> {
		let credentials = &config.credentials;
		let token_url = TokenUrl::from_url(credentials.token_endpoint()?);
		let mut oauth_client = BasicClient::new(ClientId::new(credentials.client_id.clone()))
			.set_client_secret(ClientSecret::new(credentials.client_secret.expose().to_owned()))
			.set_token_uri(token_url);

		if matches!(config.client_auth_method, ClientAuthMethod::ClientSecretPost) {
			oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
		}

		Ok(Self { oauth_client, pool })
	}
}
impl Authenticator for OAuth2Authenticator {
	fn acquire(&self) -> Result<AccessToken> {
		obs::observe(CallKind::TokenAcquire, "acquire", || {
			let meta = ResponseMetadataSlot::default();
			let instrumented = self.pool.instrumented(meta.clone())?;
			let response = self
				.oauth_client
				.exchange_client_credentials()
				.request(&instrumented)
				.map_err(|err| map_request_error(meta.take(), err))?;

			map_token_response(meta.take(), response)
		})
	}
}
impl Debug for OAuth2Authenticator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuth2Authenticator")
			.field("token_url", &self.oauth_client.token_uri().as_str())
			.field("client_id", &self.oauth_client.client_id().as_str())
			.finish()
	}
}

fn map_token_response(
	meta: Option<ResponseMetadata>,
	response: FacadeTokenResponse,
) -> Result<AccessToken> {
	let lifetime = match response.expires_in() {
		Some(expires_in) => {
			let secs = i64::try_from(expires_in.as_secs())
				.map_err(|_| malformed(meta.as_ref(), "expires_in exceeds the supported range"))?;

			if secs <= 0 {
				return Err(malformed(meta.as_ref(), "expires_in must be positive"));
			}

			Duration::seconds(secs)
		},
		None => OAuth2Authenticator::DEFAULT_LIFETIME,
	};
	let value = response.access_token().secret();

	if value.is_empty() {
		return Err(malformed(meta.as_ref(), "access_token is empty"));
	}

	AccessToken::try_issued_now(value.as_str(), lifetime)
		.ok_or_else(|| malformed(meta.as_ref(), "expires_in exceeds the supported range"))
}

fn map_request_error(
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<ReqwestError>>,
) -> Error {
	let meta_ref = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) => map_server_response_error(response, meta_ref),
		RequestTokenError::Request(error) => map_transport_error(error),
		RequestTokenError::Parse(error, _body) => Error::Authentication {
			status: meta_status(meta_ref),
			message: format!("token response is malformed at `{}`: {}", error.path(), error.inner()),
		},
		RequestTokenError::Other(message) =>
			Error::Authentication { status: meta_status(meta_ref), message },
	}
}

fn map_server_response_error(response: BasicErrorResponse, meta: Option<&ResponseMetadata>) -> Error {
	let code = response.error().as_ref();
	let message = match response.error_description() {
		Some(description) => format!("{code}: {description}"),
		None => code.to_owned(),
	};

	Error::Authentication { status: meta_status(meta), message }
}

fn map_transport_error(err: HttpClientError<ReqwestError>) -> Error {
	match err {
		HttpClientError::Reqwest(inner) => error::map_reqwest_error(TOKEN_ENDPOINT, *inner),
		HttpClientError::Http(inner) => ConfigError::from(inner).into(),
		HttpClientError::Io(inner) => TransportError::Io(inner).into(),
		HttpClientError::Other(message) => TransportError::network(std::io::Error::other(message)).into(),
		_ => TransportError::network(std::io::Error::other("unknown HTTP client failure")).into(),
	}
}

fn malformed(meta: Option<&ResponseMetadata>, message: &str) -> Error {
	Error::Authentication { status: meta_status(meta), message: message.to_owned() }
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}
