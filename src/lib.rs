//! Session bridge for booking clients: exchange identity-provider sessions for application
//! tokens, retry rejected calls once, and keep a reconnecting STOMP feed alive.
//!
//! The crate is organized around four collaborators:
//!
//! - [`bridge::TokenBridge`] exchanges the identity provider's credential for an application
//!   token, at most once per session lifetime, and re-exchanges on demand after a 401.
//! - [`gateway::RequestGateway`] attaches the bearer token to outgoing calls and recovers from
//!   one authorization failure per call.
//! - [`realtime::RealtimeChannel`] keeps STOMP subscriptions alive across reconnects.
//! - [`state::AuthState`] composes the above into an observable authentication view.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod bridge;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod obs;
pub mod realtime;
pub mod session;
pub mod state;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and fakes for tests; enabled via `cfg(test)` or the `test` crate
	//! feature.

	pub use crate::_prelude::*;

	// std
	use std::{
		collections::VecDeque,
		sync::atomic::{AtomicBool, AtomicUsize, Ordering},
		time::Duration as StdDuration,
	};
	// crates.io
	use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse, http::StatusCode};
	use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
	// self
	use crate::{
		auth::IdentityId,
		http::ApiHttpClient,
		realtime::{
			ConnectFuture, LinkFuture, RealtimeConnector, RealtimeLink,
			stomp::{Command, Frame},
		},
		session::{ExternalSession, IdentityProvider, ProviderFuture, SessionProfile},
	};
	#[cfg(feature = "reqwest")]
	use crate::{
		bridge::TokenBridge,
		config::BridgeConfig,
		http::ReqwestHttpClient,
		store::{MemoryStore, TokenStore},
	};

	/// Bridge type alias used by reqwest-backed integration tests.
	#[cfg(feature = "reqwest")]
	pub type ReqwestTestBridge = TokenBridge<ReqwestHttpClient>;

	/// Builds a session for `identity` with a complete provider profile.
	pub fn session_for(identity: &str, credential: &str) -> ExternalSession {
		let identity = IdentityId::new(identity).expect("Test identity should be valid.");

		ExternalSession::new(identity, credential).with_profile(SessionProfile {
			email: Some("dana@example.com".into()),
			full_name: Some("Dana Reyes".into()),
			phone: Some("+1 555 0100".into()),
			role: Some("USER".into()),
		})
	}

	/// Identity provider fake holding one mutable session.
	#[derive(Debug, Default)]
	pub struct StaticProvider {
		session: Mutex<Option<ExternalSession>>,
		fail_refresh: AtomicBool,
		refresh_delay: Mutex<Option<StdDuration>>,
		refresh_calls: AtomicUsize,
		sign_out_calls: AtomicUsize,
	}
	impl StaticProvider {
		/// Creates a provider that already holds `session`.
		pub fn with_session(session: ExternalSession) -> Self {
			let provider = Self::default();

			provider.set_session(Some(session));

			provider
		}

		/// Replaces the held session.
		pub fn set_session(&self, session: Option<ExternalSession>) {
			*self.session.lock() = session;
		}

		/// Makes credential rotation fail until reset.
		pub fn fail_refresh(&self, fail: bool) {
			self.fail_refresh.store(fail, Ordering::SeqCst);
		}

		/// Holds every rotation request for `delay` before answering.
		pub fn delay_refresh(&self, delay: StdDuration) {
			*self.refresh_delay.lock() = Some(delay);
		}

		/// Number of rotation requests seen.
		pub fn refresh_calls(&self) -> usize {
			self.refresh_calls.load(Ordering::SeqCst)
		}

		/// Number of sign-out requests seen.
		pub fn sign_out_calls(&self) -> usize {
			self.sign_out_calls.load(Ordering::SeqCst)
		}
	}
	impl IdentityProvider for StaticProvider {
		fn current_session(&self) -> ProviderFuture<'_, Option<ExternalSession>> {
			Box::pin(async move { Ok(self.session.lock().clone()) })
		}

		fn refresh_session(&self) -> ProviderFuture<'_, ExternalSession> {
			Box::pin(async move {
				self.refresh_calls.fetch_add(1, Ordering::SeqCst);

				let delay = *self.refresh_delay.lock();

				if let Some(delay) = delay {
					tokio::time::sleep(delay).await;
				}
				if self.fail_refresh.load(Ordering::SeqCst) {
					return Err(Error::SessionExpired { reason: "rotation disabled".into() });
				}

				self.session.lock().clone().ok_or(Error::MissingSession)
			})
		}

		fn sign_out(&self) -> ProviderFuture<'_, ()> {
			Box::pin(async move {
				self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
				self.set_session(None);

				Ok(())
			})
		}
	}

	/// Builds a canned response with `status` and a JSON `body`.
	pub fn canned(status: u16, body: &str) -> HttpResponse {
		let mut response = HttpResponse::new(body.as_bytes().to_vec());

		*response.status_mut() =
			StatusCode::from_u16(status).expect("Test status should be valid.");

		response
	}

	/// HTTP transport fake replaying canned responses in order and recording requests.
	#[derive(Clone, Debug, Default)]
	pub struct FakeHttpClient {
		responses: Arc<Mutex<VecDeque<HttpResponse>>>,
		requests: Arc<Mutex<Vec<HttpRequest>>>,
	}
	impl FakeHttpClient {
		/// Creates a fake that answers with `responses` in order.
		pub fn new(responses: Vec<HttpResponse>) -> Self {
			Self { responses: Arc::new(Mutex::new(responses.into())), requests: Default::default() }
		}

		/// Number of requests sent.
		pub fn calls(&self) -> usize {
			self.requests.lock().len()
		}

		/// `Authorization` header of every request, in order.
		pub fn seen_bearers(&self) -> Vec<Option<String>> {
			self.requests
				.lock()
				.iter()
				.map(|request| {
					request
						.headers()
						.get(oauth2::http::header::AUTHORIZATION)
						.and_then(|value| value.to_str().ok())
						.map(ToOwned::to_owned)
				})
				.collect()
		}
	}
	impl ApiHttpClient for FakeHttpClient {
		type Handle = FakeHttpClient;
		type TransportError = std::io::Error;

		fn handle(&self) -> Self::Handle {
			self.clone()
		}
	}
	impl<'c> AsyncHttpClient<'c> for FakeHttpClient {
		type Error = HttpClientError<std::io::Error>;
		type Future = Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send>>;

		fn call(&'c self, request: HttpRequest) -> Self::Future {
			Box::pin(async move {
				self.requests.lock().push(request);
				self.responses
					.lock()
					.pop_front()
					.ok_or_else(|| HttpClientError::Other("no canned response left".into()))
			})
		}
	}

	/// Realtime connector whose every attempt fails.
	#[derive(Clone, Copy, Debug, Default)]
	pub struct RefusingConnector;
	impl RealtimeConnector for RefusingConnector {
		fn connect<'a>(&'a self, _endpoint: &'a Url) -> ConnectFuture<'a> {
			Box::pin(async { Err(Error::TransportDropped { reason: "connection refused".into() }) })
		}
	}

	/// Server side of one scripted realtime connection.
	#[derive(Clone, Debug)]
	pub struct ServerPush(UnboundedSender<Option<String>>);
	impl ServerPush {
		/// Publishes a `MESSAGE` frame on `destination`.
		pub fn message(&self, destination: &str, body: &str) {
			let frame = Frame::new(Command::Message)
				.header("destination", destination)
				.header("subscription", "sub-0")
				.body(body);

			self.raw(frame.encode());
		}

		/// Sends raw text as one WebSocket message.
		pub fn raw(&self, text: impl Into<String>) {
			let _ = self.0.send(Some(text.into()));
		}

		/// Closes the connection from the server side.
		pub fn close(&self) {
			let _ = self.0.send(None);
		}
	}

	/// Realtime connector serving pre-registered in-memory connections in order.
	#[derive(Debug, Default)]
	pub struct ScriptedConnector {
		pending: Mutex<VecDeque<UnboundedReceiver<Option<String>>>>,
		sent: Arc<Mutex<Vec<Vec<String>>>>,
	}
	impl ScriptedConnector {
		/// Registers the next connection and returns its server side.
		pub fn expect_connection(&self) -> ServerPush {
			let (tx, rx) = mpsc::unbounded_channel();

			self.pending.lock().push_back(rx);

			ServerPush(tx)
		}

		/// Number of connections opened so far.
		pub fn connections(&self) -> usize {
			self.sent.lock().len()
		}

		/// Frames the client sent on connection `index`.
		pub fn sent(&self, index: usize) -> Vec<String> {
			self.sent.lock().get(index).cloned().unwrap_or_default()
		}
	}
	impl RealtimeConnector for ScriptedConnector {
		fn connect<'a>(&'a self, _endpoint: &'a Url) -> ConnectFuture<'a> {
			Box::pin(async move {
				let Some(inbox) = self.pending.lock().pop_front() else {
					return Err(Error::TransportDropped { reason: "no scripted connection".into() });
				};
				let index = {
					let mut sent = self.sent.lock();

					sent.push(Vec::new());

					sent.len() - 1
				};

				Ok(Box::new(ScriptedLink {
					inbox,
					sent: self.sent.clone(),
					index,
					handshake_pending: false,
				}) as Box<dyn RealtimeLink>)
			})
		}
	}

	struct ScriptedLink {
		inbox: UnboundedReceiver<Option<String>>,
		sent: Arc<Mutex<Vec<Vec<String>>>>,
		index: usize,
		handshake_pending: bool,
	}
	impl RealtimeLink for ScriptedLink {
		fn send(&mut self, text: String) -> LinkFuture<'_, ()> {
			Box::pin(async move {
				if text.starts_with("CONNECT\n") {
					self.handshake_pending = true;
				}

				self.sent.lock()[self.index].push(text);

				Ok(())
			})
		}

		fn next(&mut self) -> LinkFuture<'_, Option<String>> {
			Box::pin(async move {
				if std::mem::take(&mut self.handshake_pending) {
					let connected = Frame::new(Command::Connected).header("version", "1.2");

					return Ok(Some(connected.encode()));
				}

				Ok(self.inbox.recv().await.flatten())
			})
		}

		fn close(&mut self) -> LinkFuture<'_, ()> {
			Box::pin(async move {
				self.inbox.close();

				Ok(())
			})
		}
	}

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	#[cfg(feature = "reqwest")]
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Constructs a [`TokenBridge`] against `api_base`, backed by an in-memory store and the
	/// reqwest transport used across integration tests.
	#[cfg(feature = "reqwest")]
	pub fn build_reqwest_test_bridge(
		api_base: &str,
		provider: Arc<dyn IdentityProvider>,
	) -> (ReqwestTestBridge, Arc<MemoryStore>) {
		let store_backend = Arc::new(MemoryStore::default());
		let store: Arc<dyn TokenStore> = store_backend.clone();
		let config = BridgeConfig::from_api_base(api_base).expect("Test API base should build.");
		let bridge =
			TokenBridge::with_http_client(store, provider, config, test_reqwest_http_client());

		(bridge, store_backend)
	}
}

mod _prelude {
	pub use std::{
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize, de::DeserializeOwned};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
