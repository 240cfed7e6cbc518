//! Bridge-level error types shared across the exchange, gateway, and realtime layers.

// self
use crate::_prelude::*;

/// Bridge-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical bridge error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Response body could not be decoded.
	#[error(transparent)]
	Decode(#[from] DecodeError),

	/// No identity session is available to exchange.
	#[error("No identity session is available.")]
	MissingSession,
	/// The identity provider could not rotate its credential.
	#[error("Identity session could not be refreshed: {reason}.")]
	SessionExpired {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// The exchange endpoint refused or could not be reached.
	#[error("Token exchange was rejected: {reason}.")]
	ExchangeRejected {
		/// Server- or bridge-supplied reason string.
		reason: String,
		/// HTTP status code, when a response was received.
		status: Option<u16>,
	},
	/// A downstream call was rejected with 401.
	#[error("Request was rejected as unauthorized.")]
	RequestUnauthorized,
	/// Refresh-and-retry could not recover the call; the session was force-logged-out.
	#[error("Authorization could not be recovered; sign-in is required.")]
	Unrecoverable,
	/// The application server reported a failure for a gateway call.
	#[error("Call to `{endpoint}` failed with status {status}: {message}.")]
	Api {
		/// Request path that failed.
		endpoint: String,
		/// HTTP status code of the response.
		status: u16,
		/// Server-supplied message, or the status reason.
		message: String,
	},
	/// A realtime payload could not be parsed.
	#[error("Realtime event on `{topic}` is malformed.")]
	MalformedEvent {
		/// Destination the payload arrived on.
		topic: String,
		/// Structured parsing failure.
		#[source]
		source: serde_json::Error,
	},
	/// The realtime connection was lost.
	#[error("Realtime transport dropped: {reason}.")]
	TransportDropped {
		/// Transport-supplied reason string.
		reason: String,
	},
}
impl Error {
	/// Returns `true` when the error means the caller must sign in again.
	pub fn requires_sign_in(&self) -> bool {
		matches!(self, Self::Unrecoverable | Self::MissingSession)
	}
}

/// Configuration and validation failures raised by the bridge.
#[derive(Debug, ThisError)]
pub enum ConfigError {
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
	/// JSON request body could not be encoded.
	#[error("Request body could not be encoded as JSON.")]
	RequestBody(#[source] serde_json::Error),
	/// Bearer token contains bytes that are not valid in a header.
	#[error("Bearer token cannot be used as an Authorization header value.")]
	InvalidBearer,
	/// A configured URL cannot be parsed or joined.
	#[error("Configured URL `{value}` is invalid.")]
	InvalidUrl {
		/// Offending input.
		value: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// The API base URL uses a scheme the bridge cannot derive a realtime endpoint from.
	#[error("Scheme `{scheme}` is not supported for the API base URL.")]
	UnsupportedScheme {
		/// Offending scheme.
		scheme: String,
	},
	/// A configured duration must be positive.
	#[error("The {field} duration must be positive.")]
	NonPositiveDuration {
		/// Name of the offending field.
		field: &'static str,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling `{endpoint}`.")]
	Network {
		/// Request path that failed.
		endpoint: String,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred during transport.")]
	Io(#[from] std::io::Error),
	/// Any other transport failure reported as a message.
	#[error("Transport failure: {message}.")]
	Other {
		/// Transport-supplied message.
		message: String,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(
		endpoint: impl Into<String>,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Network { endpoint: endpoint.into(), source: Box::new(src) }
	}
}

/// JSON decoding failures with the path of the offending field.
#[derive(Debug, ThisError)]
pub enum DecodeError {
	/// Response body is not the expected JSON shape.
	#[error("Response from `{endpoint}` is malformed (status {status}).")]
	Json {
		/// Request path that produced the body.
		endpoint: String,
		/// HTTP status code of the response.
		status: u16,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Envelope reported `success: true` but carried no payload.
	#[error("Response from `{endpoint}` is missing its data payload.")]
	MissingData {
		/// Request path that produced the body.
		endpoint: String,
	},
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn exchange_rejection_message_includes_reason() {
		let err =
			Error::ExchangeRejected { reason: "endpoint returned 503".into(), status: Some(503) };

		assert_eq!(err.to_string(), "Token exchange was rejected: endpoint returned 503.");
		assert!(!err.requires_sign_in());
		assert!(Error::Unrecoverable.requires_sign_in());
	}

	#[test]
	fn store_error_keeps_its_source() {
		let store_error = crate::store::StoreError::Backend { message: "disk full".into() };
		let err: Error = store_error.clone().into();
		let source = std::error::Error::source(&err)
			.expect("Bridge error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}
}
