//! Typed realtime payloads and topic names published by the booking server.

// self
use crate::{_prelude::*, auth::UserId};

/// STOMP destinations the server publishes to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Topic {
	/// Every appointment change; meant for administrators.
	Appointments,
	/// Appointment changes for one customer.
	UserAppointments(UserId),
	/// Notifications for one customer.
	UserNotifications(UserId),
	/// Any other destination.
	Custom(String),
}
impl Display for Topic {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Appointments => f.write_str("/topic/appointments"),
			Self::UserAppointments(id) => write!(f, "/topic/appointments/user/{id}"),
			Self::UserNotifications(id) => write!(f, "/topic/notifications/user/{id}"),
			Self::Custom(destination) => f.write_str(destination),
		}
	}
}
impl From<Topic> for String {
	fn from(value: Topic) -> Self {
		value.to_string()
	}
}

/// Kind of appointment change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentChange {
	/// A booking was created.
	Created,
	/// A booking was updated, including status changes.
	Updated,
	/// A booking was cancelled.
	Cancelled,
	/// A booking was removed.
	Deleted,
	/// A change kind this client does not know yet.
	#[serde(other)]
	Unknown,
}

/// Appointment change broadcast on the appointment topics.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentEvent {
	/// What happened.
	#[serde(rename = "type")]
	pub change: AppointmentChange,
	/// Affected appointment.
	pub appointment_id: u64,
	/// Owning customer; absent for accounts without a backend id.
	#[serde(default)]
	pub user_id: Option<UserId>,
	/// Booked service.
	#[serde(default)]
	pub service_type: Option<String>,
	/// Appointment status after the change.
	#[serde(default)]
	pub status: Option<String>,
	/// Scheduled date, passed through as sent.
	#[serde(default)]
	pub appointment_date: Option<String>,
}

/// Notification pushed to one customer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
	/// Notification id.
	pub id: u64,
	/// Recipient.
	#[serde(default)]
	pub user_id: Option<UserId>,
	/// Recipient display name.
	#[serde(default)]
	pub user_name: Option<String>,
	/// Short title.
	pub title: String,
	/// Body text.
	pub message: String,
	/// Category label such as `APPOINTMENT`, `PAYMENT` or `REMINDER`.
	#[serde(rename = "type", default)]
	pub kind: Option<String>,
	/// Whether the recipient has read it.
	#[serde(default)]
	pub is_read: bool,
	/// Server-side creation timestamp, passed through as sent.
	#[serde(default)]
	pub created_at: Option<String>,
}
