//! Application tokens issued by the exchange endpoint.

pub mod secret;

// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::{
	_prelude::*,
	auth::{TokenSecret, UserId, UserProjection},
};

/// Bearer token plus the user projection returned alongside it.
///
/// The bridge never tracks an expiry for this token; a 401 on use is the only signal that it
/// went stale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationToken {
	/// Bearer secret attached to authorized calls.
	pub token: TokenSecret,
	/// Denormalized user record issued with the token.
	pub user: UserProjection,
}
impl ApplicationToken {
	/// Pairs a bearer secret with its user projection.
	pub fn new(token: impl Into<String>, user: UserProjection) -> Self {
		Self { token: TokenSecret::new(token), user }
	}

	/// Resolves the backend numeric id, preferring the projection over the JWT `sub` claim.
	pub fn numeric_user_id(&self) -> Option<UserId> {
		self.user.id.or_else(|| subject_user_id(&self.token))
	}
}

/// Reads the numeric `sub` claim from an unverified JWT payload.
///
/// Returns `None` for opaque tokens, non-numeric subjects, or undecodable payloads.
pub fn subject_user_id(token: &TokenSecret) -> Option<UserId> {
	let payload = token.expose().split('.').nth(1)?;
	let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
	let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;

	match claims.get("sub")? {
		serde_json::Value::Number(n) => n.as_u64().filter(|v| *v > 0).map(UserId),
		serde_json::Value::String(s) => s.parse().ok(),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn jwt_with_claims(claims: &str) -> TokenSecret {
		TokenSecret::new(format!("e30.{}.signature", URL_SAFE_NO_PAD.encode(claims)))
	}

	#[test]
	fn subject_claim_resolves_numeric_ids() {
		assert_eq!(subject_user_id(&jwt_with_claims(r#"{"sub":"42"}"#)), Some(UserId(42)));
		assert_eq!(subject_user_id(&jwt_with_claims(r#"{"sub":17}"#)), Some(UserId(17)));
		assert_eq!(subject_user_id(&jwt_with_claims(r#"{"sub":"4f1c-uuid"}"#)), None);
		assert_eq!(subject_user_id(&TokenSecret::new("opaque")), None);
	}

	#[test]
	fn projection_id_wins_over_subject_claim() {
		let user = UserProjection { id: Some(UserId(5)), ..UserProjection::fixture() };
		let token = ApplicationToken { token: jwt_with_claims(r#"{"sub":"9"}"#), user };

		assert_eq!(token.numeric_user_id(), Some(UserId(5)));

		let token = ApplicationToken { user: UserProjection::fixture(), ..token };

		assert_eq!(token.numeric_user_id(), Some(UserId(9)));
	}
}
