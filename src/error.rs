//! Client-level error types shared by the token cache, authenticator, and secret client.

// self
use crate::_prelude::*;

/// Client-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical client error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, timeout); no response was received.
	#[error(transparent)]
	Network(#[from] TransportError),

	/// Token endpoint rejected the credentials or returned malformed data.
	#[error("Authentication failed{}: {message}.", fmt_status(*status))]
	Authentication {
		/// HTTP status code, when a response was received.
		status: Option<u16>,
		/// Remote error message or local parse failure summary.
		message: String,
	},
	/// Resource endpoint rejected the bearer token even after a forced refresh.
	#[error("Authorization failed{}: {message}.", fmt_status(*status))]
	Authorization {
		/// HTTP status code returned by the resource endpoint.
		status: Option<u16>,
		/// Response body or summary.
		message: String,
	},
	/// Resource endpoint returned a non-success status other than 401/403.
	#[error("API request failed with status {status}: {body}.")]
	Api {
		/// HTTP status code.
		status: u16,
		/// Response body (or decode failure summary).
		body: String,
	},
	/// Named resource does not exist on the remote service.
	#[error("{resource} was not found.")]
	NotFound {
		/// Human-readable resource label.
		resource: String,
	},
}
impl Error {
	/// Returns `true` for failures where no response was received.
	pub fn is_network(&self) -> bool {
		matches!(self, Self::Network(_))
	}

	/// Returns the HTTP status attached to the error, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Authentication { status, .. } | Self::Authorization { status, .. } => *status,
			Self::Api { status, .. } => Some(*status),
			_ => None,
		}
	}
}

/// Configuration and validation failures raised by the client.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// One or more required settings are absent.
	#[error("Missing required configuration: {}.", names.join(", "))]
	MissingSettings {
		/// Names of the missing settings.
		names: Vec<String>,
	},
	/// A setting holds a value that cannot be used.
	#[error("Configuration value for `{name}` is invalid: {reason}.")]
	InvalidSetting {
		/// Setting name.
		name: String,
		/// Why the value was rejected.
		reason: String,
	},
	/// A configured URL cannot be parsed.
	#[error("Configuration value for `{name}` is not a valid URL.")]
	InvalidUrl {
		/// Setting name.
		name: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// An endpoint does not use HTTPS and insecure HTTP was not allowed.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Configuration file could not be read.
	#[error("Configuration file could not be read.")]
	Read(#[from] std::io::Error),
	/// Configuration file contents could not be parsed.
	#[error("Configuration file is malformed.")]
	Parse(#[from] serde_path_to_error::Error<serde_json::Error>),
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// The client was closed and its connection pool released.
	#[error("Client has been closed.")]
	ClientClosed,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}

	pub(crate) fn invalid(name: impl Into<String>, reason: impl Display) -> Self {
		Self::InvalidSetting { name: name.into(), reason: reason.to_string() }
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {target}.")]
	Network {
		/// Endpoint label (token endpoint, resource endpoint).
		target: &'static str,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Request exceeded the configured timeout.
	#[error("Request to {target} timed out.")]
	Timeout {
		/// Endpoint label.
		target: &'static str,
		/// Transport-specific timeout error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred during transport.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { target: "remote endpoint", source: Box::new(src) }
	}

	/// Classifies a reqwest failure against the named endpoint.
	pub fn from_reqwest(target: &'static str, err: ReqwestError) -> Self {
		if err.is_timeout() {
			Self::Timeout { target, source: Box::new(err) }
		} else {
			Self::Network { target, source: Box::new(err) }
		}
	}
}

/// Maps a reqwest failure into a client error, keeping builder bugs out of the network bucket.
pub(crate) fn map_reqwest_error(target: &'static str, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::http_client_build(err).into();
	}

	TransportError::from_reqwest(target, err).into()
}

fn fmt_status(status: Option<u16>) -> String {
	status.map(|code| format!(" with status {code}")).unwrap_or_default()
}
