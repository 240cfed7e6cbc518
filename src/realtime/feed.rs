//! Newest-first notification list with an unread counter.

// crates.io
use oauth2::http::Method;
// self
use crate::{
	_prelude::*,
	auth::UserId,
	gateway::RequestGateway,
	http::ApiHttpClient,
	realtime::{ChannelHandle, NotificationEvent, RealtimeChannel, Topic},
};

#[derive(Debug, Default)]
struct FeedState {
	items: Vec<NotificationEvent>,
	unread: usize,
}

/// Shared notification list fed by REST loads and the realtime channel.
#[derive(Clone, Debug, Default)]
pub struct NotificationFeed {
	state: Arc<Mutex<FeedState>>,
}
impl NotificationFeed {
	/// Creates an empty feed.
	pub fn new() -> Self {
		Self::default()
	}

	/// Snapshot of the notifications, newest first.
	pub fn items(&self) -> Vec<NotificationEvent> {
		self.state.lock().items.clone()
	}

	/// Number of unread notifications.
	pub fn unread(&self) -> usize {
		self.state.lock().unread
	}

	/// Replaces the list and recounts unread entries.
	pub fn replace(&self, items: Vec<NotificationEvent>) {
		let mut state = self.state.lock();

		state.unread = items.iter().filter(|item| !item.is_read).count();
		state.items = items;
	}

	/// Prepends a pushed notification and counts it as unread.
	pub fn push(&self, item: NotificationEvent) {
		let mut state = self.state.lock();

		state.items.insert(0, item);
		state.unread += 1;
	}

	/// Marks one notification read locally; returns `false` when it is unknown.
	pub fn mark_read(&self, id: u64) -> bool {
		let mut state = self.state.lock();
		let Some(item) = state.items.iter_mut().find(|item| item.id == id) else {
			return false;
		};
		let was_unread = !item.is_read;

		item.is_read = true;

		if was_unread {
			state.unread = state.unread.saturating_sub(1);
		}

		true
	}

	/// Marks every notification read locally.
	pub fn mark_all_read(&self) {
		let mut state = self.state.lock();

		state.items.iter_mut().for_each(|item| item.is_read = true);
		state.unread = 0;
	}

	/// Subscribes to `user`'s notification topic; inert while the user is unknown.
	pub fn follow(&self, channel: &RealtimeChannel, user: Option<UserId>) -> ChannelHandle {
		let feed = self.clone();

		channel.connect_scoped(
			user,
			|user| [Topic::UserNotifications(user)],
			move |item: NotificationEvent| feed.push(item),
		)
	}

	/// Loads `user`'s notifications from the server.
	pub async fn load<C>(&self, gateway: &RequestGateway<C>, user: UserId) -> Result<()>
	where
		C: ?Sized + ApiHttpClient,
	{
		let items = gateway
			.get_json::<Vec<NotificationEvent>>(&format!("notifications/user/{user}"))
			.await?;

		self.replace(items);

		Ok(())
	}

	/// Marks one notification read on the server, then locally.
	pub async fn sync_read<C>(&self, gateway: &RequestGateway<C>, id: u64) -> Result<()>
	where
		C: ?Sized + ApiHttpClient,
	{
		let path = format!("notifications/{id}/read");
		let request = gateway.request::<()>(Method::PATCH, &path, None)?;

		gateway.send_ack(request).await?;
		self.mark_read(id);

		Ok(())
	}

	/// Marks every notification read on the server, then locally.
	pub async fn sync_all_read<C>(&self, gateway: &RequestGateway<C>, user: UserId) -> Result<()>
	where
		C: ?Sized + ApiHttpClient,
	{
		let path = format!("notifications/user/{user}/read-all");
		let request = gateway.request::<()>(Method::PATCH, &path, None)?;

		gateway.send_ack(request).await?;
		self.mark_all_read();

		Ok(())
	}
}
