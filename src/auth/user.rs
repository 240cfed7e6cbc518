//! User projections shared by the exchange endpoint, the durable slot, and the auth view.

// self
use crate::{
	_prelude::*,
	auth::{IdentityId, UserId},
};

/// Account role as reported by the application server.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
	/// Regular customer account.
	#[default]
	User,
	/// Back-office administrator.
	Admin,
	/// Any other role string the server may introduce.
	Other(String),
}
impl Role {
	/// Returns the wire label.
	pub fn as_str(&self) -> &str {
		match self {
			Self::User => "USER",
			Self::Admin => "ADMIN",
			Self::Other(label) => label,
		}
	}
}
impl From<String> for Role {
	fn from(value: String) -> Self {
		match value.to_ascii_uppercase().as_str() {
			"USER" | "" => Self::User,
			"ADMIN" => Self::Admin,
			_ => Self::Other(value),
		}
	}
}
impl From<Role> for String {
	fn from(value: Role) -> Self {
		value.as_str().to_owned()
	}
}
impl Display for Role {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Denormalized user record stored next to the bearer token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProjection {
	/// Backend numeric id; absent until the server has provisioned an account.
	#[serde(default)]
	pub id: Option<UserId>,
	/// Identity-provider user id linked to this account.
	#[serde(default, alias = "supabaseId")]
	pub identity_id: Option<IdentityId>,
	/// Display name.
	pub full_name: String,
	/// Contact email.
	pub email: String,
	/// Optional phone number.
	#[serde(default)]
	pub phone: Option<String>,
	/// Account role.
	#[serde(default)]
	pub role: Role,
	/// Server-side creation timestamp, passed through untouched.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub created_at: Option<String>,
}
impl UserProjection {
	/// Returns `true` for administrator accounts.
	pub fn is_admin(&self) -> bool {
		self.role == Role::Admin
	}

	#[cfg(test)]
	pub(crate) fn fixture() -> Self {
		Self {
			id: None,
			identity_id: None,
			full_name: "Dana Reyes".into(),
			email: "dana@example.com".into(),
			phone: None,
			role: Role::User,
			created_at: None,
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn role_parses_case_insensitively_and_keeps_unknown_labels() {
		assert_eq!(Role::from("admin".to_owned()), Role::Admin);
		assert_eq!(Role::from(String::new()), Role::User);
		assert_eq!(Role::from("MECHANIC".to_owned()), Role::Other("MECHANIC".into()));
		assert_eq!(String::from(Role::Other("MECHANIC".into())), "MECHANIC");
	}

	#[test]
	fn projection_reads_server_payloads() {
		let payload = r#"{
			"id": 12,
			"supabaseId": "4f1c9a2e-0000-4000-8000-000000000001",
			"fullName": "Dana Reyes",
			"email": "dana@example.com",
			"phone": null,
			"role": "ADMIN",
			"createdAt": "2026-03-01T10:15:00"
		}"#;
		let user: UserProjection =
			serde_json::from_str(payload).expect("Server user payload should deserialize.");

		assert_eq!(user.id, Some(UserId(12)));
		assert!(user.is_admin());
		assert_eq!(
			user.identity_id.as_deref(),
			Some("4f1c9a2e-0000-4000-8000-000000000001")
		);
		assert_eq!(user.created_at.as_deref(), Some("2026-03-01T10:15:00"));
	}
}
