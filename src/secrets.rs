//! Authenticated secret retrieval.
//!
//! Every request borrows a token from the [`TokenCache`] and the shared client from the
//! [`ConnectionPool`]. When a resource endpoint answers 401/403 the token is force-refreshed
//! once and the request replayed once; a second rejection surfaces as
//! [`Error::Authorization`]. Secret values are never cached locally.

pub mod model;

pub use model::*;

// crates.io
use reqwest::{
	StatusCode,
	blocking::{RequestBuilder, Response},
	header::{ACCEPT, AUTHORIZATION, COOKIE, HeaderMap, HeaderValue, SET_COOKIE},
};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, SecretString},
	cache::TokenCache,
	config::{self, Credentials},
	error,
	http::ConnectionPool,
	obs::{self, CallKind},
};

const RESOURCE_ENDPOINT: &str = "the secrets API";
const SIGN_IN_ENDPOINT: &str = "the sign-in endpoint";
const SESSION_COOKIE: &str = "ASP.NET_SessionId";

enum Attempt {
	Done(Response),
	Rejected { status: u16, body: String },
}

/// Issues authenticated requests against the secrets API.
#[derive(Clone)]
pub struct SecretClient {
	cache: Arc<TokenCache>,
	pool: Arc<ConnectionPool>,
	base_url: Url,
	sign_in_url: Option<Url>,
}
impl SecretClient {
	/// Creates a client that shares `cache` and `pool` with its siblings.
	pub fn new(credentials: &Credentials, cache: Arc<TokenCache>, pool: Arc<ConnectionPool>) -> Self {
		Self {
			cache,
			pool,
			base_url: credentials.base_url.clone(),
			sign_in_url: credentials.sign_in_url.clone(),
		}
	}

	/// Fetches a single secret by identifier.
	pub fn get_secret(&self, identifier: &str) -> Result<SecretValue> {
		obs::observe(CallKind::SecretFetch, "get_secret", || {
			let url = config::join_path(&self.base_url, ["Secrets", identifier])?;

			self.get_json(CallKind::SecretFetch, &url)
		})
	}

	/// Lists the folders visible to the client.
	pub fn list_folders(&self) -> Result<Vec<Folder>> {
		obs::observe(CallKind::FolderFetch, "list_folders", || self.fetch_folders())
	}

	/// Returns every secret in the folder named `folder_name`, keyed by title.
	pub fn get_folder_secrets(&self, folder_name: &str) -> Result<BTreeMap<String, SecretString>> {
		obs::observe(CallKind::FolderFetch, "get_folder_secrets", || {
			let folder = self
				.fetch_folders()?
				.into_iter()
				.find(|folder| folder.name == folder_name)
				.ok_or_else(|| Error::NotFound { resource: format!("Folder `{folder_name}`") })?;
			let url = config::join_path(&self.base_url, ["Folders", folder.id.as_str(), "secrets"])?;
			let secrets: Vec<SecretValue> = self.get_json(CallKind::FolderFetch, &url)?;

			Ok(secrets.into_iter().map(|secret| (secret.title, secret.password)).collect())
		})
	}

	fn fetch_folders(&self) -> Result<Vec<Folder>> {
		let url = config::join_path(&self.base_url, ["Folders"])?;

		self.get_json(CallKind::FolderFetch, &url)
	}

	fn get_json<T>(&self, kind: CallKind, url: &Url) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let response =
			self.send_authorized(kind, |client, headers| client.get(url.clone()).headers(headers))?;

		decode(response)
	}

	fn send_authorized<F>(&self, kind: CallKind, build: F) -> Result<Response>
	where
		F: Fn(&ReqwestClient, HeaderMap) -> RequestBuilder,
	{
		let client = self.pool.client()?;
		let token = self.cache.get_valid_token()?;

		match self.attempt(&client, &token, &build)? {
			Attempt::Done(response) => return Ok(response),
			Attempt::Rejected { status, .. } => obs::token_rejected(kind, status),
		}

		let token = self.cache.force_refresh(&token)?;

		match self.attempt(&client, &token, &build)? {
			Attempt::Done(response) => Ok(response),
			Attempt::Rejected { status, body } =>
				Err(Error::Authorization { status: Some(status), message: non_empty(body, status) }),
		}
	}

	fn attempt<F>(&self, client: &ReqwestClient, token: &AccessToken, build: &F) -> Result<Attempt>
	where
		F: Fn(&ReqwestClient, HeaderMap) -> RequestBuilder,
	{
		let mut headers = auth_headers(token)?;

		if let Some(sign_in_url) = &self.sign_in_url {
			match self.sign_in(client, sign_in_url, headers.clone())? {
				Ok(cookie) => {
					headers.insert(COOKIE, cookie);
				},
				Err(rejected) => return Ok(rejected),
			}
		}

		let response = build(client, headers)
			.send()
			.map_err(|err| error::map_reqwest_error(RESOURCE_ENDPOINT, err))?;
		let status = response.status();

		if is_rejection(status) {
			return Ok(Attempt::Rejected { status: status.as_u16(), body: read_body(response) });
		}
		if !status.is_success() {
			return Err(Error::Api { status: status.as_u16(), body: read_body(response) });
		}

		Ok(Attempt::Done(response))
	}

	/// Opens a server-side session; `Err` carries a token rejection for the caller to retry.
	fn sign_in(
		&self,
		client: &ReqwestClient,
		url: &Url,
		headers: HeaderMap,
	) -> Result<Result<HeaderValue, Attempt>> {
		obs::observe(CallKind::SignIn, "sign_in", || {
			let response = client
				.post(url.clone())
				.headers(headers)
				.send()
				.map_err(|err| error::map_reqwest_error(SIGN_IN_ENDPOINT, err))?;
			let status = response.status();

			if is_rejection(status) {
				return Ok(Err(Attempt::Rejected {
					status: status.as_u16(),
					body: read_body(response),
				}));
			}
			if !status.is_success() {
				return Err(Error::Authentication {
					status: Some(status.as_u16()),
					message: non_empty(read_body(response), status.as_u16()),
				});
			}

			let cookie = session_cookie(response.headers()).ok_or_else(|| Error::Authentication {
				status: Some(status.as_u16()),
				message: format!("sign-in response did not include the {SESSION_COOKIE} cookie"),
			})?;

			Ok(Ok(cookie))
		})
	}
}
impl Debug for SecretClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SecretClient")
			.field("base_url", &self.base_url.as_str())
			.field("sign_in", &self.sign_in_url.is_some())
			.finish()
	}
}

fn auth_headers(token: &AccessToken) -> Result<HeaderMap> {
	let mut bearer = HeaderValue::from_str(&token.bearer()).map_err(|_| Error::Authentication {
		status: None,
		message: "access token contains characters that are not allowed in a header".into(),
	})?;

	bearer.set_sensitive(true);

	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, bearer);
	headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

	Ok(headers)
}

/// Extracts `ASP.NET_SessionId=<value>` from the `Set-Cookie` headers as a `Cookie` value.
fn session_cookie(headers: &HeaderMap) -> Option<HeaderValue> {
	headers.get_all(SET_COOKIE).iter().find_map(|raw| {
		let pair = raw.to_str().ok()?.split(';').next()?.trim();
		let (name, value) = pair.split_once('=')?;

		if name.trim() != SESSION_COOKIE || value.is_empty() {
			return None;
		}

		let mut cookie = HeaderValue::from_str(&format!("{SESSION_COOKIE}={value}")).ok()?;

		cookie.set_sensitive(true);

		Some(cookie)
	})
}

fn decode<T>(response: Response) -> Result<T>
where
	T: DeserializeOwned,
{
	let status = response.status().as_u16();
	let bytes = response.bytes().map_err(|err| error::map_reqwest_error(RESOURCE_ENDPOINT, err))?;
	let deserializer = &mut serde_json::Deserializer::from_slice(&bytes);

	serde_path_to_error::deserialize(deserializer).map_err(|err| Error::Api {
		status,
		body: format!("response body is malformed at `{}`: {}", err.path(), err.inner()),
	})
}

fn is_rejection(status: StatusCode) -> bool {
	matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
}

fn read_body(response: Response) -> String {
	response.text().unwrap_or_default()
}

fn non_empty(body: String, status: u16) -> String {
	if body.trim().is_empty() { format!("request rejected with status {status}") } else { body }
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn session_cookie_is_extracted_from_set_cookie() {
		let mut headers = HeaderMap::new();

		headers.append(SET_COOKIE, HeaderValue::from_static("other=1; Path=/"));
		headers.append(
			SET_COOKIE,
			HeaderValue::from_static("ASP.NET_SessionId=abc123; path=/; secure; HttpOnly"),
		);

		let cookie = session_cookie(&headers).expect("Session cookie should be found.");

		assert_eq!(cookie.to_str().expect("Cookie should be ASCII."), "ASP.NET_SessionId=abc123");
		assert!(cookie.is_sensitive());
	}

	#[test]
	fn missing_session_cookie_yields_none() {
		let mut headers = HeaderMap::new();

		headers.append(SET_COOKIE, HeaderValue::from_static("ASP.NET_SessionId=; Path=/"));

		assert!(session_cookie(&headers).is_none());
	}

	#[test]
	fn bearer_header_is_sensitive() {
		let token = AccessToken::issued_now("T1", Duration::seconds(300));
		let headers = auth_headers(&token).expect("Header should build.");
		let bearer = headers.get(AUTHORIZATION).expect("Authorization header should be set.");

		assert_eq!(bearer.to_str().expect("Header should be ASCII."), "Bearer T1");
		assert!(bearer.is_sensitive());
	}

	#[test]
	fn rejections_are_401_and_403_only() {
		assert!(is_rejection(StatusCode::UNAUTHORIZED));
		assert!(is_rejection(StatusCode::FORBIDDEN));
		assert!(!is_rejection(StatusCode::NOT_FOUND));
	}
}
