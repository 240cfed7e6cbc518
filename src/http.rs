//! Transport primitives for calls against the application server.
//!
//! [`ApiHttpClient`] is the bridge's only dependency on an HTTP stack. Requests and responses
//! use the `http` types re-exported by `oauth2`, so custom transports (and test fakes) only
//! implement [`AsyncHttpClient`] for a cheap handle type.

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
use oauth2::{
	AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse,
	http::{HeaderValue, StatusCode, header::AUTHORIZATION},
};
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::{ConfigError, DecodeError, TransportError},
};

/// Abstraction over HTTP transports used by the exchange endpoint and the request gateway.
///
/// Implementations must be `Send + Sync + 'static` so one client can be shared between the
/// token bridge and every gateway. The handles they return must own whatever state is
/// required so their request futures remain `Send`.
pub trait ApiHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// [`AsyncHttpClient`] handle used for a single call.
	type Handle: for<'c> AsyncHttpClient<
			'c,
			Error = HttpClientError<Self::TransportError>,
			Future: 'c + Send,
		>
		+ 'static
		+ Send
		+ Sync;

	/// Builds a handle for the next call.
	fn handle(&self) -> Self::Handle;
}

/// Executes a request through `client`, mapping transport failures into bridge errors.
pub(crate) async fn execute<C>(client: &C, request: HttpRequest) -> Result<HttpResponse>
where
	C: ?Sized + ApiHttpClient,
{
	let endpoint = request.uri().path().to_owned();
	let handle = client.handle();

	handle.call(request).await.map_err(|err| map_client_error(&endpoint, err))
}

/// Copies method, URI, version, headers, and body so a request can be sent twice.
pub(crate) fn duplicate_request(request: &HttpRequest) -> HttpRequest {
	let mut copy = HttpRequest::new(request.body().clone());

	*copy.method_mut() = request.method().clone();
	*copy.uri_mut() = request.uri().clone();
	*copy.version_mut() = request.version();
	*copy.headers_mut() = request.headers().clone();

	copy
}

/// Replaces (or removes) the `Authorization` header from the provided secret.
pub(crate) fn apply_bearer(request: &mut HttpRequest, token: Option<&TokenSecret>) -> Result<()> {
	match token {
		Some(token) => {
			let value =
				HeaderValue::from_str(&token.bearer()).map_err(|_| ConfigError::InvalidBearer)?;

			request.headers_mut().insert(AUTHORIZATION, value);
		},
		None => {
			request.headers_mut().remove(AUTHORIZATION);
		},
	}

	Ok(())
}

/// Envelope wrapping every application server response.
#[derive(Clone, Debug, Deserialize)]
pub struct ApiEnvelope<T> {
	/// Whether the server considers the call successful.
	pub success: bool,
	/// Optional human-readable message.
	pub message: Option<String>,
	/// Payload, present on success.
	pub data: Option<T>,
	/// Validation errors, passed through untouched.
	pub errors: Option<serde_json::Value>,
}
impl<T> ApiEnvelope<T> {
	/// Returns the payload of a successful envelope.
	pub fn into_data(self, endpoint: &str) -> Result<T, DecodeError> {
		match (self.success, self.data) {
			(true, Some(data)) => Ok(data),
			_ => Err(DecodeError::MissingData { endpoint: endpoint.into() }),
		}
	}
}

/// Decodes a response body into an [`ApiEnvelope`], keeping the path of the failing field.
pub fn decode_envelope<T>(
	endpoint: &str,
	response: &HttpResponse,
) -> Result<ApiEnvelope<T>, DecodeError>
where
	T: DeserializeOwned,
{
	let mut de = serde_json::Deserializer::from_slice(response.body());

	serde_path_to_error::deserialize(&mut de).map_err(|source| DecodeError::Json {
		endpoint: endpoint.into(),
		status: response.status().as_u16(),
		source,
	})
}

/// Returns `true` when the response rejected the bearer token.
pub(crate) fn is_unauthorized(response: &HttpResponse) -> bool {
	response.status() == StatusCode::UNAUTHORIZED
}

fn map_client_error<E>(endpoint: &str, err: HttpClientError<E>) -> Error
where
	E: 'static + Send + Sync + StdError,
{
	match err {
		HttpClientError::Reqwest(inner) => TransportError::network(endpoint, *inner).into(),
		HttpClientError::Http(inner) => ConfigError::from(inner).into(),
		HttpClientError::Io(inner) => TransportError::Io(inner).into(),
		HttpClientError::Other(message) => TransportError::Other { message }.into(),
		other => TransportError::Other { message: format!("{other:?}") }.into(),
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl ApiHttpClient for ReqwestHttpClient {
	type Handle = ReqwestHandle;
	type TransportError = ReqwestError;

	fn handle(&self) -> Self::Handle {
		ReqwestHandle(self.0.clone())
	}
}

/// Per-call handle returned by [`ReqwestHttpClient`].
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestHandle(ReqwestClient);
#[cfg(feature = "reqwest")]
impl<'c> AsyncHttpClient<'c> for ReqwestHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let client = self.0.clone();

		Box::pin(async move {
			let response =
				client.execute(request.try_into().map_err(Box::new)?).await.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let mut converted =
				HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*converted.status_mut() = status;
			*converted.headers_mut() = headers;

			Ok(converted)
		})
	}
}
