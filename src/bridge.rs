//! Token bridge: converts identity-provider sessions into application tokens.
//!
//! Two entry points reach the exchange endpoint. [`TokenBridge::exchange_passive`] runs once
//! per session lifetime and is guarded by the readiness flag, so a sign-in immediately
//! followed by a credential rotation cannot start two exchanges. [`TokenBridge::refresh`] is
//! driven by the request gateway after a 401; it ignores readiness but coalesces concurrent
//! callers behind a singleflight guard, and a caller that finds a newer token in the slot
//! reuses it instead of exchanging again.

mod metrics;

pub use metrics::BridgeMetrics;

// crates.io
use oauth2::http::{
	Method, Request,
	header::{ACCEPT, CONTENT_TYPE},
};
// self
use crate::{
	_prelude::*,
	auth::{ApplicationToken, IdentityId, TokenSecret, UserProjection},
	config::BridgeConfig,
	error::ConfigError,
	gateway::{RefreshFuture, RefreshStrategy},
	http::{self, ApiHttpClient},
	obs::{self, FlowKind, FlowOutcome, FlowSpan, emit},
	session::{ExternalSession, IdentityProvider, SessionEvent},
	store::TokenStore,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

#[cfg(feature = "reqwest")]
/// Bridge specialized for the crate's default reqwest transport.
pub type ReqwestTokenBridge = TokenBridge<ReqwestHttpClient>;

/// Guard state for passive exchanges within one session lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Readiness {
	/// No passive exchange has run for the current session.
	Pending,
	/// A passive exchange is running.
	InFlight,
	/// The passive exchange finished, successfully or not.
	Ready,
}

/// Result of a passive exchange request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PassiveOutcome {
	/// A token was exchanged and persisted.
	Exchanged,
	/// The exchange failed; the slot was left untouched.
	Failed,
	/// Readiness was not pending, or the session changed mid-flight.
	Skipped,
}

/// What [`TokenBridge::apply`] did to the cached token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheDirective {
	/// The cached token was discarded and readiness reset.
	Invalidated,
	/// The cached token was kept.
	Kept,
}

/// Point-in-time view of the bridge guard state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeStatus {
	/// Passive exchange guard.
	pub readiness: Readiness,
	/// Whether a token has been confirmed for the current session.
	pub confirmed: bool,
	/// Identity the guard state belongs to.
	pub identity: Option<IdentityId>,
	epoch: u64,
}
impl Default for BridgeStatus {
	fn default() -> Self {
		Self { readiness: Readiness::Pending, confirmed: false, identity: None, epoch: 0 }
	}
}
impl BridgeStatus {
	fn reset(&mut self, identity: Option<IdentityId>) {
		self.readiness = Readiness::Pending;
		self.confirmed = false;
		self.identity = identity;
		self.epoch = self.epoch.wrapping_add(1);
	}
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeRequest<'a> {
	access_token: &'a str,
	email: &'a str,
	full_name: &'a str,
	phone: Option<&'a str>,
	role: &'a str,
}

#[derive(Deserialize)]
struct ExchangePayload {
	token: String,
	user: UserProjection,
}

/// Exchanges identity-provider credentials for application tokens.
#[derive(Clone)]
pub struct TokenBridge<C>
where
	C: ?Sized + ApiHttpClient,
{
	/// HTTP client used for the exchange endpoint.
	pub http_client: Arc<C>,
	/// Durable slot receiving exchanged tokens.
	pub store: Arc<dyn TokenStore>,
	/// Identity provider owning the external session.
	pub provider: Arc<dyn IdentityProvider>,
	/// Endpoint and timing configuration.
	pub config: BridgeConfig,
	/// Exchange and refresh counters.
	pub metrics: Arc<BridgeMetrics>,
	status: Arc<Mutex<BridgeStatus>>,
	refresh_guard: Arc<AsyncMutex<()>>,
}
impl<C> TokenBridge<C>
where
	C: ?Sized + ApiHttpClient,
{
	/// Creates a bridge that reuses the caller-provided transport.
	pub fn with_http_client(
		store: Arc<dyn TokenStore>,
		provider: Arc<dyn IdentityProvider>,
		config: BridgeConfig,
		http_client: impl Into<Arc<C>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			store,
			provider,
			config,
			metrics: Default::default(),
			status: Default::default(),
			refresh_guard: Default::default(),
		}
	}

	/// Returns the current guard state.
	pub fn status(&self) -> BridgeStatus {
		self.status.lock().clone()
	}

	/// Returns the passive exchange guard.
	pub fn readiness(&self) -> Readiness {
		self.status.lock().readiness
	}

	/// Returns `true` once a token has been confirmed for the current session.
	pub fn is_confirmed(&self) -> bool {
		self.status.lock().confirmed
	}

	/// Resets the guard so the next passive exchange runs, without touching the slot.
	pub fn mark_pending(&self, identity: Option<IdentityId>) {
		self.status.lock().reset(identity);
	}

	/// Applies a session lifecycle event to the cached token and the guard state.
	///
	/// A sign-in always discards the cached token. A rotation keeps it when it belongs to the
	/// same identity (taken from the guard state, or from the slot's user projection after a
	/// restart) and is otherwise treated as a sign-in. A sign-out discards the token.
	pub async fn apply(&self, event: &SessionEvent) -> Result<CacheDirective> {
		match event {
			SessionEvent::SignedIn(session) =>
				self.invalidate(Some(session.identity.clone())).await,
			SessionEvent::TokenRotated(session) => {
				let cached = self.store.get().await?;
				let known = self.status.lock().identity.clone().or_else(|| {
					cached.as_ref().and_then(|token| token.user.identity_id.clone())
				});

				if known.as_ref() != Some(&session.identity) {
					return self.invalidate(Some(session.identity.clone())).await;
				}

				// Readiness stays as is; a pending exchange still has to run.
				self.status.lock().identity = Some(session.identity.clone());

				Ok(CacheDirective::Kept)
			},
			SessionEvent::SignedOut => self.invalidate(None).await,
		}
	}

	/// Adopts a session restored at startup.
	///
	/// The cached token is kept when it belongs to the restored identity; readiness is reset so
	/// one passive exchange runs for the restored session.
	pub async fn restore(&self, session: &ExternalSession) -> Result<CacheDirective> {
		let cached = self.store.get().await?;
		let same_owner = cached
			.as_ref()
			.is_some_and(|token| token.user.identity_id.as_ref() == Some(&session.identity));

		if cached.is_some() && !same_owner {
			return self.invalidate(Some(session.identity.clone())).await;
		}

		self.mark_pending(Some(session.identity.clone()));

		Ok(CacheDirective::Kept)
	}

	/// Runs the exchange once per session lifetime.
	///
	/// Skips when readiness is not [`Readiness::Pending`]. Failures are logged and converted into
	/// [`PassiveOutcome::Failed`]; the bridge still becomes ready so a rejection-driven refresh
	/// can run. Extra attempts follow [`BridgeConfig::passive_retries`].
	pub async fn exchange_passive(&self) -> PassiveOutcome {
		const KIND: FlowKind = FlowKind::Exchange;

		let epoch = {
			let mut status = self.status.lock();

			if status.readiness != Readiness::Pending {
				drop(status);
				obs::record_flow_outcome(KIND, FlowOutcome::Skipped);

				return PassiveOutcome::Skipped;
			}

			status.readiness = Readiness::InFlight;

			status.epoch
		};
		let span = FlowSpan::start(KIND, "exchange_passive");
		let result: Result<ApplicationToken> = span
			.instrument(async move {
				let mut attempt = 0;

				loop {
					match self.exchange_at(epoch).await {
						Ok(token) => break Ok(token),
						Err(err)
							if attempt < self.config.passive_retries && self.is_epoch(epoch) =>
						{
							attempt += 1;

							emit!(warn, error = %err, attempt, "passive exchange failed, retrying");

							tokio::time::sleep(self.config.passive_retry_delay.unsigned_abs())
								.await;
						},
						Err(err) => break Err(err),
					}
				}
			})
			.await;
		let mut status = self.status.lock();

		if status.epoch != epoch {
			drop(status);
			span.finish(FlowOutcome::Skipped);

			return PassiveOutcome::Skipped;
		}

		status.readiness = Readiness::Ready;

		match result {
			Ok(_) => {
				status.confirmed = true;
				drop(status);
				span.finish(FlowOutcome::Success);

				PassiveOutcome::Exchanged
			},
			Err(err) => {
				drop(status);
				emit!(warn, error = %err, "passive exchange failed; session stays loading");
				span.finish(FlowOutcome::Failure);

				PassiveOutcome::Failed
			},
		}
	}

	/// Exchanges the current session credential and persists the result, ignoring readiness.
	pub async fn exchange(&self) -> Result<ApplicationToken> {
		let epoch = self.status.lock().epoch;
		let token = self.exchange_at(epoch).await?;

		self.confirm(epoch);

		Ok(token)
	}

	/// Re-exchanges after `rejected` was refused by the server.
	///
	/// Concurrent callers queue behind one guard. A caller whose rejected token has already
	/// been replaced in the slot receives the replacement without another exchange. A session
	/// change while the refresh runs fails it and leaves the slot as the change left it.
	pub async fn refresh(&self, rejected: Option<&TokenSecret>) -> Result<ApplicationToken> {
		let span = FlowSpan::start(FlowKind::Refresh, "refresh");

		self.metrics.record_refresh();

		let epoch = self.status.lock().epoch;
		let result: Result<ApplicationToken> = span
			.instrument(async move {
				let _singleflight = self.refresh_guard.lock().await;

				if let Some(rejected) = rejected
					&& let Some(current) = self.store.get().await?
					&& current.token != *rejected
				{
					self.metrics.record_coalesced();
					emit!(debug, "refresh satisfied by a token written while waiting");

					return Ok(current);
				}

				let token = self.exchange_at(epoch).await?;

				self.confirm(epoch);

				Ok(token)
			})
			.await;

		span.finish_with(&result);

		result
	}

	async fn invalidate(&self, identity: Option<IdentityId>) -> Result<CacheDirective> {
		self.status.lock().reset(identity);
		self.store.clear().await?;

		Ok(CacheDirective::Invalidated)
	}

	fn is_epoch(&self, epoch: u64) -> bool {
		self.status.lock().epoch == epoch
	}

	fn confirm(&self, epoch: u64) {
		let mut status = self.status.lock();

		if status.epoch == epoch {
			status.confirmed = true;

			if status.readiness == Readiness::Pending {
				status.readiness = Readiness::Ready;
			}
		}
	}

	async fn exchange_at(&self, epoch: u64) -> Result<ApplicationToken> {
		let current = self.provider.current_session().await?.ok_or(Error::MissingSession)?;
		let session = match self.provider.refresh_session().await {
			Ok(refreshed) => refreshed,
			Err(err) => {
				let err = Error::SessionExpired { reason: err.to_string() };

				emit!(warn, error = %err, "using the existing credential for the exchange");

				current
			},
		};

		if session.access_credential.is_empty() {
			return Err(Error::MissingSession);
		}

		emit!(
			debug,
			identity = %session.identity.fingerprint(),
			"exchanging identity credential"
		);
		self.metrics.record_exchange();

		let token = self.call_exchange_endpoint(&session).await.inspect_err(|_| {
			self.metrics.record_exchange_failure();
		})?;

		if !self.is_epoch(epoch) {
			return Err(superseded());
		}

		self.store.set(token.clone()).await?;

		// A sign-out may have cleared the slot while the write was pending.
		if !self.is_epoch(epoch) {
			if self.store.get().await?.is_some_and(|current| current.token == token.token) {
				self.store.clear().await?;
			}

			return Err(superseded());
		}

		Ok(token)
	}

	async fn call_exchange_endpoint(&self, session: &ExternalSession) -> Result<ApplicationToken> {
		let url = self.config.exchange_url()?;
		let endpoint = url.path().to_owned();
		let profile = session.user_projection();
		let body = serde_json::to_vec(&ExchangeRequest {
			access_token: session.access_credential.expose(),
			email: &profile.email,
			full_name: &profile.full_name,
			phone: profile.phone.as_deref(),
			role: profile.role.as_str(),
		})
		.map_err(ConfigError::RequestBody)?;
		let request = Request::builder()
			.method(Method::POST)
			.uri(url.as_str())
			.header(CONTENT_TYPE, "application/json")
			.header(ACCEPT, "application/json")
			.body(body)
			.map_err(ConfigError::from)?;
		let response = http::execute(self.http_client.as_ref(), request).await.map_err(|err| {
			Error::ExchangeRejected { reason: err.to_string(), status: None }
		})?;
		let status = response.status();

		if !status.is_success() {
			let message = http::decode_envelope::<serde_json::Value>(&endpoint, &response)
				.ok()
				.and_then(|envelope| envelope.message)
				.unwrap_or_else(|| format!("endpoint returned {status}"));

			return Err(Error::ExchangeRejected { reason: message, status: Some(status.as_u16()) });
		}

		let envelope = http::decode_envelope::<ExchangePayload>(&endpoint, &response)?;

		if !envelope.success {
			return Err(Error::ExchangeRejected {
				reason: envelope.message.unwrap_or_else(|| "server reported failure".into()),
				status: Some(status.as_u16()),
			});
		}

		let payload = envelope.into_data(&endpoint)?;

		if payload.token.trim().is_empty() {
			return Err(Error::ExchangeRejected {
				reason: "response carried an empty token".into(),
				status: Some(status.as_u16()),
			});
		}

		Ok(ApplicationToken::new(payload.token, payload.user))
	}
}
#[cfg(feature = "reqwest")]
impl TokenBridge<ReqwestHttpClient> {
	/// Creates a bridge with its own reqwest transport.
	pub fn new(
		store: Arc<dyn TokenStore>,
		provider: Arc<dyn IdentityProvider>,
		config: BridgeConfig,
	) -> Self {
		Self::with_http_client(store, provider, config, ReqwestHttpClient::default())
	}
}
impl<C> RefreshStrategy for TokenBridge<C>
where
	C: ?Sized + ApiHttpClient,
{
	fn refresh<'a>(&'a self, rejected: Option<&'a TokenSecret>) -> RefreshFuture<'a> {
		Box::pin(async move {
			match TokenBridge::refresh(self, rejected).await {
				Ok(_) => true,
				Err(err) => {
					emit!(warn, error = %err, "token refresh failed");

					false
				},
			}
		})
	}
}
impl<C> Debug for TokenBridge<C>
where
	C: ?Sized + ApiHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenBridge")
			.field("config", &self.config)
			.field("status", &*self.status.lock())
			.finish()
	}
}

fn superseded() -> Error {
	Error::ExchangeRejected {
		reason: "the session changed while the exchange was running".into(),
		status: None,
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::time::Duration as StdDuration;
	// self
	use super::*;
	use crate::{
		_preludet::*,
		store::{MemoryStore, StoreFuture, StoreOp},
	};

	#[derive(Debug, Default)]
	struct SlowWrites(MemoryStore);
	impl TokenStore for SlowWrites {
		fn get(&self) -> StoreFuture<'_, Option<ApplicationToken>> {
			self.0.get()
		}

		fn set(&self, token: ApplicationToken) -> StoreFuture<'_, ()> {
			Box::pin(async move {
				tokio::time::sleep(StdDuration::from_millis(50)).await;

				self.0.set(token).await
			})
		}

		fn clear(&self) -> StoreFuture<'_, ()> {
			self.0.clear()
		}
	}

	#[tokio::test]
	async fn sign_out_racing_the_slot_write_is_rolled_back() {
		let store = Arc::new(SlowWrites::default());
		let provider = Arc::new(StaticProvider::with_session(session_for("identity-a", "cred-1")));
		let client = FakeHttpClient::new(vec![canned(
			200,
			r#"{"success":true,"data":{"token":"app-late",
				"user":{"id":7,"fullName":"Dana Reyes","email":"dana@example.com"}}}"#,
		)]);
		let config = BridgeConfig::from_api_base("http://localhost:3001/api")
			.expect("Local API base should build.");
		let bridge = TokenBridge::with_http_client(store.clone(), provider, config, client);
		let (refreshed, signed_out) = tokio::join!(bridge.refresh(None), async {
			tokio::time::sleep(StdDuration::from_millis(20)).await;

			bridge.apply(&SessionEvent::SignedOut).await
		});

		assert!(matches!(refreshed, Err(Error::ExchangeRejected { status: None, .. })));
		assert_eq!(signed_out.expect("Sign-out should apply."), CacheDirective::Invalidated);
		assert!(store.0.snapshot().is_none());
		assert_eq!(
			store.0.journal(),
			vec![StoreOp::Clear, StoreOp::Set("app-late".into()), StoreOp::Clear]
		);
		assert!(!bridge.is_confirmed());
	}

	#[test]
	fn reset_bumps_the_epoch_and_clears_confirmation() {
		let mut status = BridgeStatus {
			readiness: Readiness::Ready,
			confirmed: true,
			identity: None,
			epoch: 3,
		};

		status.reset(Some(IdentityId::new("next-user").expect("Identity should be valid.")));

		assert_eq!(status.readiness, Readiness::Pending);
		assert!(!status.confirmed);
		assert_eq!(status.epoch, 4);
		assert_eq!(status.identity.as_deref(), Some("next-user"));
	}

	#[test]
	fn exchange_request_uses_camel_case_fields() {
		let body = serde_json::to_value(ExchangeRequest {
			access_token: "provider-access",
			email: "dana@example.com",
			full_name: "Dana Reyes",
			phone: None,
			role: "USER",
		})
		.expect("Exchange request should serialize.");

		assert_eq!(body["accessToken"], "provider-access");
		assert_eq!(body["fullName"], "Dana Reyes");
		assert!(body["phone"].is_null());
		assert_eq!(body["role"], "USER");
	}
}
