//! Observable authentication state composed from the identity session and the token bridge.
//!
//! [`AuthState`] keeps the projections UI code reads (`is_authenticated`, `is_admin`,
//! `is_loading`, the current user) and republishes them through a `watch` channel whenever the
//! session or the bridge changes. It is also the refresh and logout strategy handed to the request
//! gateway, so an unrecoverable 401 tears the whole session down.

// crates.io
use tokio::sync::watch;
// self
use crate::{
	_prelude::*,
	auth::{TokenSecret, UserId, UserProjection},
	bridge::{PassiveOutcome, Readiness, TokenBridge},
	gateway::{LogoutFuture, LogoutStrategy, RefreshFuture, RefreshStrategy, RequestGateway},
	http::ApiHttpClient,
	obs::emit,
	session::{ExternalSession, IdentityProvider, SessionEvent},
};

/// Snapshot published to observers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthView {
	/// An identity session is present.
	pub is_authenticated: bool,
	/// The current user has the administrator role.
	pub is_admin: bool,
	/// Either the initial session read or the token exchange is still outstanding.
	pub is_loading: bool,
	/// Projection of the signed-in user.
	pub user: Option<UserProjection>,
}
impl Default for AuthView {
	fn default() -> Self {
		Self { is_authenticated: false, is_admin: false, is_loading: true, user: None }
	}
}

#[derive(Debug)]
struct Projections {
	session: Option<ExternalSession>,
	user: Option<UserProjection>,
	initial_loading: bool,
}

/// Authentication state shared by the UI layer, the gateway, and realtime scoping.
pub struct AuthState<C>
where
	C: ?Sized + ApiHttpClient,
{
	provider: Arc<dyn IdentityProvider>,
	bridge: Arc<TokenBridge<C>>,
	inner: Mutex<Projections>,
	view: watch::Sender<AuthView>,
}
impl<C> AuthState<C>
where
	C: ?Sized + ApiHttpClient,
{
	/// Creates the state in its initial loading phase.
	pub fn new(provider: Arc<dyn IdentityProvider>, bridge: Arc<TokenBridge<C>>) -> Self {
		let (view, _) = watch::channel(AuthView::default());

		Self {
			provider,
			bridge,
			inner: Mutex::new(Projections { session: None, user: None, initial_loading: true }),
			view,
		}
	}

	/// Token bridge backing this state.
	pub fn bridge(&self) -> &Arc<TokenBridge<C>> {
		&self.bridge
	}

	/// Builds a request gateway that refreshes and logs out through `self`.
	pub fn gateway(self: &Arc<Self>) -> RequestGateway<C> {
		RequestGateway::with_http_client(
			self.bridge.http_client.clone(),
			self.bridge.store.clone(),
			self.bridge.config.clone(),
			self.clone(),
			self.clone(),
		)
	}

	/// Current view.
	pub fn view(&self) -> AuthView {
		self.view.borrow().clone()
	}

	/// Receiver notified whenever the view changes.
	pub fn subscribe(&self) -> watch::Receiver<AuthView> {
		self.view.subscribe()
	}

	/// Reads the provider's current session and runs the passive exchange for it.
	///
	/// A provider failure is logged and treated as "no session".
	pub async fn initialize(&self) -> Result<AuthView> {
		let session = match self.provider.current_session().await {
			Ok(session) => session,
			Err(err) => {
				emit!(warn, error = %err, "current session could not be read");

				None
			},
		};

		if let Some(session) = &session {
			self.bridge.restore(session).await?;
		}

		{
			let mut inner = self.inner.lock();

			inner.user = session.as_ref().map(ExternalSession::user_projection);
			inner.session = session;
			inner.initial_loading = false;
		}

		self.publish();

		Ok(self.sync_bridge().await)
	}

	/// Applies a provider lifecycle event and runs the passive exchange when it is due.
	pub async fn handle_event(&self, event: SessionEvent) -> Result<AuthView> {
		emit!(debug, event = event.as_str(), "session event");

		{
			let mut inner = self.inner.lock();

			inner.user = event.session().map(ExternalSession::user_projection);
			inner.session = event.session().cloned();
		}

		self.bridge.apply(&event).await?;
		self.publish();

		if event.session().is_some() && self.bridge.readiness() == Readiness::Pending {
			return Ok(self.sync_bridge().await);
		}

		Ok(self.view())
	}

	/// Records an interactive sign-in before the provider event arrives.
	pub fn login(&self, user: UserProjection, session: ExternalSession) -> AuthView {
		self.bridge.mark_pending(Some(session.identity.clone()));

		{
			let mut inner = self.inner.lock();

			inner.user = Some(user);
			inner.session = Some(session);
		}

		self.publish()
	}

	/// Runs the passive exchange if it has not run for this session and publishes the result.
	pub async fn sync_bridge(&self) -> AuthView {
		let has_session = self.inner.lock().session.is_some();

		if has_session {
			let outcome = self.bridge.exchange_passive().await;

			if outcome == PassiveOutcome::Failed {
				emit!(warn, "token exchange failed; waiting for the next session event");
			}
		}

		self.publish()
	}

	/// Signs out of the provider, clears the projections and the durable slot.
	pub async fn logout(&self) -> Result<AuthView> {
		if let Err(err) = self.provider.sign_out().await {
			emit!(warn, error = %err, "provider sign-out failed; clearing local state anyway");
		}

		{
			let mut inner = self.inner.lock();

			inner.session = None;
			inner.user = None;
		}

		self.bridge.apply(&SessionEvent::SignedOut).await?;

		Ok(self.publish())
	}

	/// Numeric backend id of the signed-in user, from the cached projection or the token.
	pub async fn numeric_user_id(&self) -> Result<Option<UserId>> {
		if self.inner.lock().session.is_none() {
			return Ok(None);
		}

		Ok(self.bridge.store.get().await?.and_then(|token| token.numeric_user_id()))
	}

	fn publish(&self) -> AuthView {
		let confirmed = self.bridge.is_confirmed();
		let view = {
			let inner = self.inner.lock();
			let is_authenticated = inner.session.is_some();

			AuthView {
				is_authenticated,
				is_admin: inner.user.as_ref().is_some_and(UserProjection::is_admin),
				is_loading: if is_authenticated { !confirmed } else { inner.initial_loading },
				user: inner.user.clone(),
			}
		};

		self.view.send_replace(view.clone());

		view
	}
}
impl<C> RefreshStrategy for AuthState<C>
where
	C: ?Sized + ApiHttpClient,
{
	fn refresh<'a>(&'a self, rejected: Option<&'a TokenSecret>) -> RefreshFuture<'a> {
		Box::pin(async move {
			let refreshed = RefreshStrategy::refresh(self.bridge.as_ref(), rejected).await;

			self.publish();

			refreshed
		})
	}
}
impl<C> LogoutStrategy for AuthState<C>
where
	C: ?Sized + ApiHttpClient,
{
	fn force_logout(&self) -> LogoutFuture<'_> {
		Box::pin(async move {
			emit!(warn, "authorization could not be recovered; signing out");

			if let Err(err) = self.logout().await {
				emit!(error, error = %err, "forced logout could not clear local state");
			}
		})
	}
}
impl<C> Debug for AuthState<C>
where
	C: ?Sized + ApiHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthState").field("view", &*self.view.borrow()).finish()
	}
}
