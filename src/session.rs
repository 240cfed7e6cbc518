//! Identity-provider sessions and the lifecycle events they emit.
//!
//! The bridge never owns an [`ExternalSession`]; it reads whatever the [`IdentityProvider`]
//! hands out, asks it to rotate credentials before an exchange, and reacts to the
//! [`SessionEvent`] stream. Implementations wrap the hosted identity SDK the application uses.

// self
use crate::{
	_prelude::*,
	auth::{IdentityId, Role, TokenSecret, UserProjection},
};

/// Boxed future returned by [`IdentityProvider`] operations.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Contract for the identity provider that owns the external session.
pub trait IdentityProvider
where
	Self: Send + Sync,
{
	/// Returns the session currently held by the provider, if any.
	fn current_session(&self) -> ProviderFuture<'_, Option<ExternalSession>>;

	/// Asks the provider to rotate its access credential and returns the refreshed session.
	fn refresh_session(&self) -> ProviderFuture<'_, ExternalSession>;

	/// Ends the provider session.
	fn sign_out(&self) -> ProviderFuture<'_, ()>;
}

/// Profile metadata the identity provider keeps next to the session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProfile {
	/// Email address registered with the provider.
	pub email: Option<String>,
	/// Display name from the provider's user metadata.
	pub full_name: Option<String>,
	/// Phone number from the provider's user metadata.
	pub phone: Option<String>,
	/// Role label from the provider's user metadata.
	pub role: Option<String>,
}

/// Revocable identity session with a rotating access credential.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternalSession {
	/// Provider-issued access credential; rotated silently by the provider.
	pub access_credential: TokenSecret,
	/// Provider user identifier.
	pub identity: IdentityId,
	/// Expiry instant of the current credential, when the provider reports one.
	pub expires_at: Option<OffsetDateTime>,
	/// Provider-side profile metadata.
	pub profile: SessionProfile,
}
impl ExternalSession {
	const FALLBACK_NAME: &'static str = "User";

	/// Creates a session with an empty profile.
	pub fn new(identity: IdentityId, access_credential: impl Into<String>) -> Self {
		Self {
			access_credential: TokenSecret::new(access_credential),
			identity,
			expires_at: None,
			profile: SessionProfile::default(),
		}
	}

	/// Attaches profile metadata.
	pub fn with_profile(mut self, profile: SessionProfile) -> Self {
		self.profile = profile;

		self
	}

	/// Sets the credential expiry instant.
	pub fn with_expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Returns `true` if the credential expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		self.expires_at.is_some_and(|expires_at| instant >= expires_at)
	}

	/// Returns `true` when both sessions belong to the same provider user.
	pub fn same_identity(&self, other: &Self) -> bool {
		self.identity == other.identity
	}

	/// Maps provider metadata into the projection the application works with.
	///
	/// The display name falls back to the email local part and then to `"User"`; the role
	/// falls back to [`Role::User`].
	pub fn user_projection(&self) -> UserProjection {
		let email = self.profile.email.clone().unwrap_or_default();
		let full_name = self
			.profile
			.full_name
			.clone()
			.filter(|name| !name.trim().is_empty())
			.or_else(|| email.split('@').next().filter(|local| !local.is_empty()).map(Into::into))
			.unwrap_or_else(|| Self::FALLBACK_NAME.into());

		UserProjection {
			id: None,
			identity_id: Some(self.identity.clone()),
			full_name,
			email,
			phone: self.profile.phone.clone(),
			role: self.profile.role.clone().map(Role::from).unwrap_or_default(),
			created_at: None,
		}
	}
}

/// Lifecycle transitions emitted by the identity provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
	/// A brand-new sign-in; the identity may differ from the previous one.
	SignedIn(ExternalSession),
	/// The provider rotated the credential of the current session.
	TokenRotated(ExternalSession),
	/// The session ended.
	SignedOut,
}
impl SessionEvent {
	/// Returns the session carried by the event.
	pub fn session(&self) -> Option<&ExternalSession> {
		match self {
			Self::SignedIn(session) | Self::TokenRotated(session) => Some(session),
			Self::SignedOut => None,
		}
	}

	/// Returns a stable label suitable for span or log fields.
	pub const fn as_str(&self) -> &'static str {
		match self {
			Self::SignedIn(_) => "signed_in",
			Self::TokenRotated(_) => "token_rotated",
			Self::SignedOut => "signed_out",
		}
	}
}
