//! Credential store and client configuration.
//!
//! [`ClientConfig`] can be assembled programmatically, read from `BT_*` environment variables,
//! or parsed from a JSON document. Every source funnels through [`ClientConfig::validate`] so
//! endpoint rules (HTTPS only unless explicitly relaxed) hold regardless of origin.

// std
use std::{path::Path, time::Duration as StdDuration};
// self
use crate::{_prelude::*, auth::SecretString, error::ConfigError};

/// Environment variable holding the OAuth client identifier.
pub const ENV_CLIENT_ID: &str = "BT_CLIENT_ID";
/// Environment variable holding the OAuth client secret.
pub const ENV_CLIENT_SECRET: &str = "BT_CLIENT_SECRET";
/// Environment variable holding the API base URL.
pub const ENV_BASE_URL: &str = "BT_BASE_URL";
/// Environment variable overriding the token endpoint.
pub const ENV_TOKEN_URL: &str = "BT_TOKEN_URL";
/// Environment variable enabling session sign-in.
pub const ENV_SIGN_IN_URL: &str = "BT_SIGN_IN_URL";
/// Environment variable overriding the per-request timeout.
pub const ENV_TIMEOUT_SECONDS: &str = "BT_TIMEOUT_SECONDS";
/// Environment variable overriding the token safety margin.
pub const ENV_TOKEN_SAFETY_MARGIN_SECONDS: &str = "BT_TOKEN_SAFETY_MARGIN_SECONDS";
/// Environment variable enabling token acquisition retries on network failures.
pub const ENV_TOKEN_RETRIES: &str = "BT_TOKEN_RETRIES";

const DEFAULT_TOKEN_PATH: &str = "Auth/connect/token";

/// How the client authenticates itself at the token endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
	#[default]
	/// Form POST body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
}

/// Immutable OAuth client credentials and endpoint locations.
#[derive(Clone, Debug)]
pub struct Credentials {
	/// OAuth 2.0 client identifier.
	pub client_id: String,
	/// OAuth 2.0 client secret.
	pub client_secret: SecretString,
	/// Base URL of the secrets API (e.g. `https://pam.example.com/api/public/v3`).
	pub base_url: Url,
	/// Explicit token endpoint; defaults to `{base_url}/Auth/connect/token`.
	pub token_url: Option<Url>,
	/// Optional session sign-in endpoint.
	pub sign_in_url: Option<Url>,
}
impl Credentials {
	/// Creates credentials for the provided client and API base URL.
	pub fn new(
		client_id: impl Into<String>,
		client_secret: impl Into<SecretString>,
		base_url: Url,
	) -> Self {
		Self {
			client_id: client_id.into(),
			client_secret: client_secret.into(),
			base_url,
			token_url: None,
			sign_in_url: None,
		}
	}

	/// Overrides the token endpoint.
	pub fn with_token_url(mut self, url: Url) -> Self {
		self.token_url = Some(url);

		self
	}

	/// Enables session sign-in against the provided endpoint.
	pub fn with_sign_in_url(mut self, url: Url) -> Self {
		self.sign_in_url = Some(url);

		self
	}

	/// Resolves the token endpoint, falling back to the default path under `base_url`.
	pub fn token_endpoint(&self) -> Result<Url, ConfigError> {
		match &self.token_url {
			Some(url) => Ok(url.clone()),
			None => join_path(&self.base_url, DEFAULT_TOKEN_PATH.split('/')),
		}
	}
}

/// Retry policy applied by the token cache to network failures during acquisition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Extra attempts after the first failure; `0` disables retries.
	pub max_retries: u32,
	/// Base delay multiplied by the attempt number.
	pub backoff: StdDuration,
}
impl RetryPolicy {
	/// Policy that never retries.
	pub const NONE: Self = Self { max_retries: 0, backoff: StdDuration::from_secs(2) };

	/// Creates a policy retrying up to `max_retries` times with linear `backoff`.
	pub const fn new(max_retries: u32, backoff: StdDuration) -> Self {
		Self { max_retries, backoff }
	}

	/// Base delay before retry number `attempt` (1-based), without jitter.
	pub fn delay_for(&self, attempt: u32) -> StdDuration {
		self.backoff.saturating_mul(attempt)
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self::NONE
	}
}

/// Complete client configuration.
#[derive(Clone, Debug)]
pub struct ClientConfig {
	/// Client credentials and endpoints.
	pub credentials: Credentials,
	/// Timeout applied to every outbound request.
	pub timeout: StdDuration,
	/// Tokens are refreshed once they are this close to expiry.
	pub token_safety_margin: Duration,
	/// Token endpoint client authentication mode.
	pub client_auth_method: ClientAuthMethod,
	/// Retry policy for token acquisition.
	pub token_retry: RetryPolicy,
	/// Accepts plain-HTTP endpoints; only meant for local mock servers.
	pub allow_insecure_http: bool,
}
impl ClientConfig {
	/// Default per-request timeout.
	pub const DEFAULT_TIMEOUT: StdDuration = StdDuration::from_secs(10);
	/// Default token safety margin.
	pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::seconds(60);
	/// Largest accepted safety margin.
	pub const MAX_SAFETY_MARGIN: Duration = Duration::days(1);

	/// Creates a configuration with default knobs for the given credentials.
	pub fn new(credentials: Credentials) -> Self {
		Self {
			credentials,
			timeout: Self::DEFAULT_TIMEOUT,
			token_safety_margin: Self::DEFAULT_SAFETY_MARGIN,
			client_auth_method: ClientAuthMethod::default(),
			token_retry: RetryPolicy::default(),
			allow_insecure_http: false,
		}
	}

	/// Overrides the per-request timeout.
	pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Overrides the token safety margin (negative values clamp to zero).
	pub fn with_token_safety_margin(mut self, margin: Duration) -> Self {
		self.token_safety_margin = if margin.is_negative() { Duration::ZERO } else { margin };

		self
	}

	/// Overrides the token endpoint client authentication mode.
	pub fn with_client_auth_method(mut self, method: ClientAuthMethod) -> Self {
		self.client_auth_method = method;

		self
	}

	/// Overrides the token acquisition retry policy.
	pub fn with_token_retry(mut self, policy: RetryPolicy) -> Self {
		self.token_retry = policy;

		self
	}

	/// Allows or forbids plain-HTTP endpoints.
	pub fn allow_insecure_http(mut self, allow: bool) -> Self {
		self.allow_insecure_http = allow;

		self
	}

	/// Loads the configuration from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Loads the configuration through an arbitrary variable lookup.
	///
	/// Empty values count as missing. All missing required variables are reported at once.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
		let required = [ENV_CLIENT_ID, ENV_CLIENT_SECRET, ENV_BASE_URL];
		let missing = required
			.iter()
			.filter(|name| get(name).is_none())
			.map(|name| (*name).to_owned())
			.collect::<Vec<_>>();

		if !missing.is_empty() {
			return Err(ConfigError::MissingSettings { names: missing });
		}

		let raw = RawConfig {
			client_id: get(ENV_CLIENT_ID).unwrap_or_default(),
			client_secret: get(ENV_CLIENT_SECRET).unwrap_or_default(),
			base_url: get(ENV_BASE_URL).unwrap_or_default(),
			token_url: get(ENV_TOKEN_URL),
			sign_in_url: get(ENV_SIGN_IN_URL),
			timeout_seconds: get(ENV_TIMEOUT_SECONDS)
				.map(|value| parse_number(ENV_TIMEOUT_SECONDS, &value))
				.transpose()?,
			token_safety_margin_seconds: get(ENV_TOKEN_SAFETY_MARGIN_SECONDS)
				.map(|value| parse_number(ENV_TOKEN_SAFETY_MARGIN_SECONDS, &value))
				.transpose()?,
			token_retries: get(ENV_TOKEN_RETRIES)
				.map(|value| parse_number(ENV_TOKEN_RETRIES, &value))
				.transpose()?,
			client_auth_method: None,
			allow_insecure_http: false,
		};

		raw.into_config()
	}

	/// Parses a JSON configuration document.
	pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
		let deserializer = &mut serde_json::Deserializer::from_str(raw);
		let raw: RawConfig = serde_path_to_error::deserialize(deserializer)?;

		raw.into_config()
	}

	/// Reads and parses a JSON configuration file.
	pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let raw = std::fs::read_to_string(path)?;

		Self::from_json_str(&raw)
	}

	/// Checks credentials and endpoint security rules.
	pub fn validate(&self) -> Result<(), ConfigError> {
		let credentials = &self.credentials;

		if credentials.client_id.trim().is_empty() {
			return Err(ConfigError::invalid("client_id", "value must not be empty"));
		}
		if credentials.client_secret.is_empty() {
			return Err(ConfigError::invalid("client_secret", "value must not be empty"));
		}
		if self.timeout.is_zero() {
			return Err(ConfigError::invalid("timeout_seconds", "value must be positive"));
		}
		if self.token_safety_margin > Self::MAX_SAFETY_MARGIN {
			return Err(ConfigError::invalid(
				"token_safety_margin_seconds",
				"value must not exceed one day",
			));
		}

		self.check_endpoint("base", &credentials.base_url)?;
		self.check_endpoint("token", &credentials.token_endpoint()?)?;

		if let Some(url) = &credentials.sign_in_url {
			self.check_endpoint("sign-in", url)?;
		}

		Ok(())
	}

	fn check_endpoint(&self, endpoint: &'static str, url: &Url) -> Result<(), ConfigError> {
		match url.scheme() {
			"https" => Ok(()),
			"http" if self.allow_insecure_http => Ok(()),
			_ => Err(ConfigError::InsecureEndpoint { endpoint, url: url.to_string() }),
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
	client_id: String,
	client_secret: String,
	base_url: String,
	#[serde(default)]
	token_url: Option<String>,
	#[serde(default)]
	sign_in_url: Option<String>,
	#[serde(default)]
	timeout_seconds: Option<u64>,
	#[serde(default)]
	token_safety_margin_seconds: Option<u64>,
	#[serde(default)]
	token_retries: Option<u32>,
	#[serde(default)]
	client_auth_method: Option<ClientAuthMethod>,
	#[serde(default)]
	allow_insecure_http: bool,
}
impl RawConfig {
	fn into_config(self) -> Result<ClientConfig, ConfigError> {
		let base_url = parse_url("base_url", &self.base_url)?;
		let mut credentials = Credentials::new(self.client_id, self.client_secret, base_url);

		if let Some(raw) = &self.token_url {
			credentials = credentials.with_token_url(parse_url("token_url", raw)?);
		}
		if let Some(raw) = &self.sign_in_url {
			credentials = credentials.with_sign_in_url(parse_url("sign_in_url", raw)?);
		}

		let mut config =
			ClientConfig::new(credentials).allow_insecure_http(self.allow_insecure_http);

		if let Some(secs) = self.timeout_seconds {
			config = config.with_timeout(StdDuration::from_secs(secs));
		}
		if let Some(secs) = self.token_safety_margin_seconds {
			let secs = i64::try_from(secs).map_err(|_| {
				ConfigError::invalid("token_safety_margin_seconds", "value is out of range")
			})?;

			config = config.with_token_safety_margin(Duration::seconds(secs));
		}
		if let Some(retries) = self.token_retries {
			config = config
				.with_token_retry(RetryPolicy { max_retries: retries, ..RetryPolicy::default() });
		}
		if let Some(method) = self.client_auth_method {
			config = config.with_client_auth_method(method);
		}

		config.validate()?;

		Ok(config)
	}
}

/// Appends path segments to `base`, percent-encoding each one.
pub(crate) fn join_path<'a, I>(base: &Url, segments: I) -> Result<Url, ConfigError>
where
	I: IntoIterator<Item = &'a str>,
{
	let mut url = base.clone();

	url.path_segments_mut()
		.map_err(|_| ConfigError::invalid("base_url", "URL cannot carry a path"))?
		.pop_if_empty()
		.extend(segments);

	Ok(url)
}

fn parse_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
	Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidUrl { name, source })
}

fn parse_number<T>(name: &str, raw: &str) -> Result<T, ConfigError>
where
	T: std::str::FromStr,
	T::Err: Display,
{
	raw.trim().parse().map_err(|err| ConfigError::invalid(name, err))
}

#[cfg(test)]
mod tests {
	// std
	use std::collections::HashMap;
	// self
	use super::*;

	fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let vars = vars
			.iter()
			.map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
			.collect::<HashMap<_, _>>();

		move |name| vars.get(name).cloned()
	}

	#[test]
	fn env_lookup_applies_defaults() {
		let config = ClientConfig::from_lookup(lookup(&[
			(ENV_CLIENT_ID, "a"),
			(ENV_CLIENT_SECRET, "b"),
			(ENV_BASE_URL, "https://example.test/api"),
		]))
		.expect("Complete environment should load.");

		assert_eq!(config.credentials.client_id, "a");
		assert_eq!(config.credentials.client_secret.expose(), "b");
		assert_eq!(config.timeout, ClientConfig::DEFAULT_TIMEOUT);
		assert_eq!(config.token_safety_margin, Duration::seconds(60));
		assert_eq!(config.token_retry, RetryPolicy::NONE);
		assert_eq!(config.client_auth_method, ClientAuthMethod::ClientSecretPost);
		assert_eq!(
			config
				.credentials
				.token_endpoint()
				.expect("Default token endpoint should resolve.")
				.as_str(),
			"https://example.test/api/Auth/connect/token"
		);
	}

	#[test]
	fn oversized_safety_margin_is_rejected() {
		let err = ClientConfig::from_lookup(lookup(&[
			(ENV_CLIENT_ID, "a"),
			(ENV_CLIENT_SECRET, "b"),
			(ENV_BASE_URL, "https://example.test/api"),
			(ENV_TOKEN_SAFETY_MARGIN_SECONDS, "1000000000000"),
		]))
		.expect_err("Oversized margin should be rejected.");

		assert!(matches!(
			err,
			ConfigError::InvalidSetting { ref name, .. } if name == "token_safety_margin_seconds"
		));

		let config = ClientConfig::new(Credentials::new(
			"a",
			"b",
			Url::parse("https://example.test/api").expect("Base URL should parse."),
		));

		assert!(config.clone().with_token_safety_margin(Duration::days(1)).validate().is_ok());
		assert!(config.with_token_safety_margin(Duration::days(2)).validate().is_err());
	}

	#[test]
	fn env_lookup_reports_every_missing_variable() {
		let err = ClientConfig::from_lookup(lookup(&[(ENV_CLIENT_SECRET, "b"), (ENV_CLIENT_ID, " ")]))
			.expect_err("Missing variables should be rejected.");

		match err {
			ConfigError::MissingSettings { names } =>
				assert_eq!(names, vec![ENV_CLIENT_ID.to_owned(), ENV_BASE_URL.to_owned()]),
			other => panic!("Unexpected error: {other:?}."),
		}
	}

	#[test]
	fn env_lookup_parses_optional_knobs() {
		let config = ClientConfig::from_lookup(lookup(&[
			(ENV_CLIENT_ID, "a"),
			(ENV_CLIENT_SECRET, "b"),
			(ENV_BASE_URL, "https://example.test"),
			(ENV_TOKEN_URL, "https://idp.example.test/token"),
			(ENV_SIGN_IN_URL, "https://example.test/Auth/SignAppIn"),
			(ENV_TIMEOUT_SECONDS, "3"),
			(ENV_TOKEN_SAFETY_MARGIN_SECONDS, "120"),
			(ENV_TOKEN_RETRIES, "2"),
		]))
		.expect("Optional knobs should parse.");

		assert_eq!(config.timeout, StdDuration::from_secs(3));
		assert_eq!(config.token_safety_margin, Duration::seconds(120));
		assert_eq!(config.token_retry.max_retries, 2);
		assert_eq!(
			config.credentials.token_url.as_ref().map(Url::as_str),
			Some("https://idp.example.test/token")
		);
		assert!(config.credentials.sign_in_url.is_some());
	}

	#[test]
	fn env_lookup_rejects_bad_numbers() {
		let err = ClientConfig::from_lookup(lookup(&[
			(ENV_CLIENT_ID, "a"),
			(ENV_CLIENT_SECRET, "b"),
			(ENV_BASE_URL, "https://example.test"),
			(ENV_TIMEOUT_SECONDS, "ten"),
		]))
		.expect_err("Non-numeric timeout should be rejected.");

		assert!(matches!(err, ConfigError::InvalidSetting { ref name, .. } if name == ENV_TIMEOUT_SECONDS));
	}

	#[test]
	fn insecure_endpoints_require_opt_in() {
		let err = ClientConfig::from_json_str(
			r#"{"client_id":"a","client_secret":"b","base_url":"http://example.test"}"#,
		)
		.expect_err("Plain HTTP should be rejected by default.");

		assert!(matches!(err, ConfigError::InsecureEndpoint { endpoint: "base", .. }));

		ClientConfig::from_json_str(
			r#"{"client_id":"a","client_secret":"b","base_url":"http://127.0.0.1:8080","allow_insecure_http":true}"#,
		)
		.expect("Plain HTTP should be accepted after opting in.");
	}

	#[test]
	fn json_parse_errors_name_the_field() {
		let err = ClientConfig::from_json_str(
			r#"{"client_id":"a","client_secret":"b","base_url":"https://example.test","timeout_seconds":"slow"}"#,
		)
		.expect_err("String timeout should be rejected.");

		match err {
			ConfigError::Parse(inner) => assert_eq!(inner.path().to_string(), "timeout_seconds"),
			other => panic!("Unexpected error: {other:?}."),
		}
	}

	#[test]
	fn json_accepts_basic_auth_selection() {
		let config = ClientConfig::from_json_str(
			r#"{"client_id":"a","client_secret":"b","base_url":"https://example.test","client_auth_method":"client_secret_basic"}"#,
		)
		.expect("Client auth method should parse.");

		assert_eq!(config.client_auth_method, ClientAuthMethod::ClientSecretBasic);
	}

	#[test]
	fn join_path_keeps_base_segments_and_encodes() {
		let base = Url::parse("https://example.test/api/v3").expect("Base URL should parse.");
		let url = join_path(&base, ["Secrets", "a/b"]).expect("Segments should join.");

		assert_eq!(url.as_str(), "https://example.test/api/v3/Secrets/a%2Fb");

		let slashed = Url::parse("https://example.test/api/").expect("Base URL should parse.");
		let url = join_path(&slashed, ["Folders"]).expect("Segments should join.");

		assert_eq!(url.as_str(), "https://example.test/api/Folders");
	}

	#[test]
	fn retry_delay_scales_linearly() {
		let policy = RetryPolicy::new(3, StdDuration::from_millis(100));

		assert_eq!(policy.delay_for(1), StdDuration::from_millis(100));
		assert_eq!(policy.delay_for(3), StdDuration::from_millis(300));
	}
}
