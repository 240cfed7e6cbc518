//! Authorized request gateway with one refresh-and-retry on 401.
//!
//! Every call reads the bearer token from the durable slot. A 401 triggers the injected
//! [`RefreshStrategy`] once; on success the request is replayed exactly once with the token
//! that is in the slot at that moment. When refresh fails, or the replay is rejected again,
//! the injected [`LogoutStrategy`] runs once and the caller receives
//! [`CallOutcome::Unrecoverable`] together with the last 401 response.

// crates.io
use oauth2::{
	HttpRequest, HttpResponse,
	http::{
		Method, Request,
		header::{ACCEPT, CONTENT_TYPE},
	},
};
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	config::BridgeConfig,
	error::ConfigError,
	http::{self, ApiEnvelope, ApiHttpClient},
	obs::{FlowKind, FlowOutcome, FlowSpan, emit},
	store::TokenStore,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

/// Boxed future returned by [`RefreshStrategy::refresh`].
pub type RefreshFuture<'a> = Pin<Box<dyn Future<Output = bool> + 'a + Send>>;
/// Boxed future returned by [`LogoutStrategy::force_logout`].
pub type LogoutFuture<'a> = Pin<Box<dyn Future<Output = ()> + 'a + Send>>;

/// Obtains a fresh application token after `rejected` was refused.
pub trait RefreshStrategy
where
	Self: Send + Sync,
{
	/// Returns `true` once a replacement token is in the durable slot.
	fn refresh<'a>(&'a self, rejected: Option<&'a TokenSecret>) -> RefreshFuture<'a>;
}

/// Tears down the local session after an unrecoverable authorization failure.
pub trait LogoutStrategy
where
	Self: Send + Sync,
{
	/// Clears credentials and projections; must not fail.
	fn force_logout(&self) -> LogoutFuture<'_>;
}

/// Logout strategy that only clears the durable slot.
#[derive(Clone)]
pub struct ClearStoreLogout(pub Arc<dyn TokenStore>);
impl LogoutStrategy for ClearStoreLogout {
	fn force_logout(&self) -> LogoutFuture<'_> {
		Box::pin(async move {
			if let Err(err) = self.0.clear().await {
				emit!(error, error = %err, "durable slot could not be cleared");
			}
		})
	}
}
impl Debug for ClearStoreLogout {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("ClearStoreLogout(..)")
	}
}

/// How a gateway call ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallOutcome {
	/// The first attempt was not rejected.
	Completed,
	/// The first attempt was rejected; refresh and replay succeeded.
	Recovered,
	/// Authorization could not be recovered and the session was force-logged-out.
	Unrecoverable,
}

/// Response returned by [`RequestGateway::send`].
#[derive(Debug)]
pub struct GatewayResponse {
	/// Final response seen by the gateway.
	pub response: HttpResponse,
	/// How the call ended.
	pub outcome: CallOutcome,
}
impl GatewayResponse {
	/// Returns `true` when the caller must route the user to sign-in.
	pub fn requires_sign_in(&self) -> bool {
		self.outcome == CallOutcome::Unrecoverable
	}
}

/// Per-call progress through the refresh-and-retry sequence.
#[derive(Debug)]
enum CallPhase {
	Sending,
	Refreshing(HttpResponse),
	Retrying,
}

/// Wraps outgoing calls with bearer injection and 401 recovery.
#[derive(Clone)]
pub struct RequestGateway<C>
where
	C: ?Sized + ApiHttpClient,
{
	/// Transport shared with the token bridge.
	pub http_client: Arc<C>,
	/// Durable slot holding the bearer token.
	pub store: Arc<dyn TokenStore>,
	/// Endpoint configuration.
	pub config: BridgeConfig,
	refresher: Arc<dyn RefreshStrategy>,
	logout: Arc<dyn LogoutStrategy>,
}
impl<C> RequestGateway<C>
where
	C: ?Sized + ApiHttpClient,
{
	/// Creates a gateway from its collaborators.
	pub fn with_http_client(
		http_client: impl Into<Arc<C>>,
		store: Arc<dyn TokenStore>,
		config: BridgeConfig,
		refresher: Arc<dyn RefreshStrategy>,
		logout: Arc<dyn LogoutStrategy>,
	) -> Self {
		Self { http_client: http_client.into(), store, config, refresher, logout }
	}

	/// Builds a request for `path` under the API base, optionally with a JSON body.
	pub fn request<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<HttpRequest>
	where
		B: ?Sized + Serialize,
	{
		let url = self.config.api_url(path)?;
		let mut builder =
			Request::builder().method(method).uri(url.as_str()).header(ACCEPT, "application/json");
		let body = match body {
			Some(body) => {
				builder = builder.header(CONTENT_TYPE, "application/json");

				serde_json::to_vec(body).map_err(ConfigError::RequestBody)?
			},
			None => Vec::new(),
		};

		Ok(builder.body(body).map_err(ConfigError::from)?)
	}

	/// Sends `request` with the cached bearer token, recovering from one 401.
	///
	/// Transport failures are returned as errors; authorization failures never are.
	pub async fn send(&self, request: HttpRequest) -> Result<GatewayResponse> {
		let span = FlowSpan::start(FlowKind::Gateway, "send");
		let result = span.instrument(self.drive(request)).await;

		match &result {
			Ok(GatewayResponse { outcome: CallOutcome::Unrecoverable, .. }) | Err(_) =>
				span.finish(FlowOutcome::Failure),
			Ok(_) => span.finish(FlowOutcome::Success),
		}

		result
	}

	/// Sends `request` and decodes the `data` payload of the response envelope.
	///
	/// Returns [`Error::Unrecoverable`] after a forced logout and [`Error::Api`] for any other
	/// non-success response.
	pub async fn send_json<T>(&self, request: HttpRequest) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let (endpoint, envelope) = self.send_envelope::<T>(request).await?;

		Ok(envelope.into_data(&endpoint)?)
	}

	/// Like [`RequestGateway::send_json`] for calls whose envelope carries no payload.
	pub async fn send_ack(&self, request: HttpRequest) -> Result<()> {
		self.send_envelope::<serde_json::Value>(request).await.map(|_| ())
	}

	/// Convenience wrapper for `GET` calls decoded through [`RequestGateway::send_json`].
	pub async fn get_json<T>(&self, path: &str) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let request = self.request::<()>(Method::GET, path, None)?;

		self.send_json(request).await
	}

	async fn send_envelope<T>(&self, request: HttpRequest) -> Result<(String, ApiEnvelope<T>)>
	where
		T: DeserializeOwned,
	{
		let endpoint = request.uri().path().to_owned();
		let GatewayResponse { response, outcome } = self.send(request).await?;

		if outcome == CallOutcome::Unrecoverable {
			return Err(Error::Unrecoverable);
		}

		let status = response.status();

		if !status.is_success() {
			let message = http::decode_envelope::<serde_json::Value>(&endpoint, &response)
				.ok()
				.and_then(|envelope| envelope.message)
				.unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").into());

			return Err(Error::Api { endpoint, status: status.as_u16(), message });
		}

		let envelope = http::decode_envelope::<T>(&endpoint, &response)?;

		if !envelope.success {
			return Err(Error::Api {
				endpoint,
				status: status.as_u16(),
				message: envelope.message.unwrap_or_else(|| "server reported failure".into()),
			});
		}

		Ok((endpoint, envelope))
	}

	async fn drive(&self, request: HttpRequest) -> Result<GatewayResponse> {
		let mut current = self.current_token().await?;
		let mut phase = CallPhase::Sending;

		loop {
			phase = match phase {
				CallPhase::Sending => {
					let mut attempt = http::duplicate_request(&request);

					http::apply_bearer(&mut attempt, current.as_ref())?;

					let response = http::execute(self.http_client.as_ref(), attempt).await?;

					if !http::is_unauthorized(&response) {
						return Ok(GatewayResponse { response, outcome: CallOutcome::Completed });
					}

					emit!(
						debug,
						error = %Error::RequestUnauthorized,
						endpoint = request.uri().path(),
						"refreshing before one retry"
					);

					CallPhase::Refreshing(response)
				},
				CallPhase::Refreshing(rejected) => {
					if !self.refresher.refresh(current.as_ref()).await {
						self.logout.force_logout().await;

						return Ok(GatewayResponse {
							response: rejected,
							outcome: CallOutcome::Unrecoverable,
						});
					}

					current = self.current_token().await?;

					CallPhase::Retrying
				},
				CallPhase::Retrying => {
					let mut attempt = http::duplicate_request(&request);

					http::apply_bearer(&mut attempt, current.as_ref())?;

					let response = http::execute(self.http_client.as_ref(), attempt).await?;

					if http::is_unauthorized(&response) {
						emit!(warn, endpoint = request.uri().path(), "retry rejected; signing out");
						self.logout.force_logout().await;

						return Ok(GatewayResponse {
							response,
							outcome: CallOutcome::Unrecoverable,
						});
					}

					return Ok(GatewayResponse { response, outcome: CallOutcome::Recovered });
				},
			};
		}
	}

	async fn current_token(&self) -> Result<Option<TokenSecret>> {
		Ok(self.store.get().await?.map(|token| token.token))
	}
}
#[cfg(feature = "reqwest")]
impl RequestGateway<ReqwestHttpClient> {
	/// Creates a gateway with its own reqwest transport.
	pub fn new(
		store: Arc<dyn TokenStore>,
		config: BridgeConfig,
		refresher: Arc<dyn RefreshStrategy>,
		logout: Arc<dyn LogoutStrategy>,
	) -> Self {
		Self::with_http_client(ReqwestHttpClient::default(), store, config, refresher, logout)
	}
}
impl<C> Debug for RequestGateway<C>
where
	C: ?Sized + ApiHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestGateway").field("config", &self.config).finish()
	}
}
