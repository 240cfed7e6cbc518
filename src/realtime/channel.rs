//! Reconnecting STOMP subscription channel.

// crates.io
use tokio::sync::watch;
// self
use crate::{
	_prelude::*,
	auth::UserId,
	config::BridgeConfig,
	obs::{self, DropReason, FlowKind, FlowOutcome, FlowSpan, emit},
	realtime::{
		stomp::{Command, Frame, FrameDecoder},
		transport::{RealtimeConnector, RealtimeLink},
	},
};
#[cfg(feature = "tungstenite")] use crate::realtime::transport::TungsteniteConnector;

type Sink = Box<dyn FnMut(&str, &str) + Send>;

/// Connection state of a [`ChannelHandle`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelState {
	/// Not connected; a reconnect may be scheduled.
	Disconnected,
	/// Opening the socket or waiting for the STOMP handshake.
	Connecting,
	/// Handshake done and every topic subscribed.
	Connected,
	/// Torn down; terminal.
	Closed,
}
impl ChannelState {
	/// Returns `true` when moving from `self` to `next` is allowed.
	pub const fn can_transition_to(self, next: Self) -> bool {
		matches!(
			(self, next),
			(Self::Disconnected, Self::Connecting)
				| (Self::Connecting, Self::Connected)
				| (Self::Connecting, Self::Disconnected)
				| (Self::Connected, Self::Disconnected)
				| (Self::Disconnected | Self::Connecting | Self::Connected, Self::Closed)
		)
	}

	/// Returns a stable label suitable for span or log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Disconnected => "disconnected",
			Self::Connecting => "connecting",
			Self::Connected => "connected",
			Self::Closed => "closed",
		}
	}
}
impl Display for ChannelState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Factory for reconnecting STOMP subscriptions against one endpoint.
#[derive(Clone)]
pub struct RealtimeChannel {
	connector: Arc<dyn RealtimeConnector>,
	endpoint: Url,
	reconnect_delay: Duration,
	handshake_timeout: Duration,
}
impl RealtimeChannel {
	/// Creates a channel factory using `connector` and the realtime settings in `config`.
	pub fn new(config: &BridgeConfig, connector: Arc<dyn RealtimeConnector>) -> Self {
		Self {
			connector,
			endpoint: config.realtime_endpoint.clone(),
			reconnect_delay: config.reconnect_delay,
			handshake_timeout: config.handshake_timeout,
		}
	}

	/// Creates a channel factory backed by `tokio-tungstenite`.
	#[cfg(feature = "tungstenite")]
	pub fn tungstenite(config: &BridgeConfig) -> Self {
		Self::new(config, Arc::new(TungsteniteConnector))
	}

	/// Endpoint the channel connects to.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	/// Connects, subscribes to every topic, and calls `on_event` for each parsed message.
	///
	/// Message bodies that do not parse as `E` are logged and dropped. The connection is retried
	/// after the configured delay until the returned handle is disconnected or dropped. Must be
	/// called within a tokio runtime. `on_event` must not disconnect its own handle.
	pub fn connect<E, F, T>(&self, topics: T, mut on_event: F) -> ChannelHandle
	where
		E: 'static + DeserializeOwned,
		F: 'static + Send + FnMut(E),
		T: IntoIterator,
		T::Item: Into<String>,
	{
		let topics = topics.into_iter().map(Into::into).collect::<Vec<String>>();
		let sink: Sink = Box::new(move |destination: &str, body: &str| {
			match serde_json::from_str::<E>(body) {
				Ok(event) => on_event(event),
				Err(source) => {
					let err = Error::MalformedEvent { topic: destination.into(), source };

					emit!(warn, error = %err, "dropping malformed realtime event");
					obs::record_realtime_drop(DropReason::MalformedEvent);
				},
			}
		});
		let (state, state_rx) = watch::channel(ChannelState::Disconnected);
		let (shutdown, _) = watch::channel(false);
		let control = Arc::new(Control { sink: Mutex::new(Some(sink)), state, shutdown });

		tokio::spawn(run(control.clone(), self.clone(), topics));

		ChannelHandle { control: Some(control), state: state_rx }
	}

	/// Connects only when `user` is known; otherwise returns an inert handle.
	pub fn connect_scoped<E, F, T>(
		&self,
		user: Option<UserId>,
		topics: impl FnOnce(UserId) -> T,
		on_event: F,
	) -> ChannelHandle
	where
		E: 'static + DeserializeOwned,
		F: 'static + Send + FnMut(E),
		T: IntoIterator,
		T::Item: Into<String>,
	{
		match user {
			Some(user) => self.connect(topics(user), on_event),
			None => ChannelHandle::inert(),
		}
	}

	async fn session(&self, control: &Control, topics: &[String], span: &FlowSpan) -> Result<()> {
		let handshake = self.handshake_timeout.unsigned_abs();
		let mut link = tokio::time::timeout(handshake, self.connector.connect(&self.endpoint))
			.await
			.map_err(|_| Error::TransportDropped { reason: "connect timed out".into() })??;
		let result = self.pump(control, topics, link.as_mut(), handshake, span).await;
		let _ = link.close().await;

		result
	}

	async fn pump(
		&self,
		control: &Control,
		topics: &[String],
		link: &mut dyn RealtimeLink,
		handshake: std::time::Duration,
		span: &FlowSpan,
	) -> Result<()> {
		let mut decoder = FrameDecoder::default();
		let host = self.endpoint.host_str().unwrap_or_default();

		link.send(Frame::connect(host).encode()).await?;
		tokio::time::timeout(handshake, await_connected(link, &mut decoder))
			.await
			.map_err(|_| Error::TransportDropped { reason: "STOMP handshake timed out".into() })??;

		for (index, topic) in topics.iter().enumerate() {
			link.send(Frame::subscribe(format!("sub-{index}"), topic.as_str()).encode()).await?;
		}

		control.transition(ChannelState::Connected);
		span.finish(FlowOutcome::Success);
		emit!(info, endpoint = %self.endpoint, topics = topics.len(), "realtime channel connected");

		while let Some(text) = link.next().await? {
			for frame in decoder.push(&text) {
				match frame {
					Ok(frame) => handle_frame(control, frame),
					Err(err) => {
						emit!(warn, error = %err, "skipping undecodable STOMP frame");
						obs::record_realtime_drop(DropReason::UndecodableFrame);
					},
				}
			}
		}

		Ok(())
	}
}
impl Debug for RealtimeChannel {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RealtimeChannel")
			.field("endpoint", &self.endpoint.as_str())
			.field("reconnect_delay", &self.reconnect_delay)
			.finish()
	}
}

/// Owner of one live subscription set.
///
/// Dropping the handle disconnects it.
pub struct ChannelHandle {
	control: Option<Arc<Control>>,
	state: watch::Receiver<ChannelState>,
}
impl ChannelHandle {
	fn inert() -> Self {
		let (_, state) = watch::channel(ChannelState::Closed);

		Self { control: None, state }
	}

	/// Returns `true` for handles that never connect.
	pub fn is_inert(&self) -> bool {
		self.control.is_none()
	}

	/// Current connection state.
	pub fn state(&self) -> ChannelState {
		*self.state.borrow()
	}

	/// Receiver notified on every state change.
	pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
		self.state.clone()
	}

	/// Waits until the channel reaches `target`; returns `false` if it closed first.
	pub async fn wait_for(&self, target: ChannelState) -> bool {
		let mut state = self.state.clone();

		match state.wait_for(|state| *state == target || *state == ChannelState::Closed).await {
			Ok(state) => *state == target,
			Err(_) => self.state() == target,
		}
	}

	/// Stops delivery and tears the connection down. Idempotent.
	///
	/// Blocks while a delivery is in progress; once this returns the handler is never called
	/// again.
	pub fn disconnect(&self) {
		let Some(control) = &self.control else {
			return;
		};
		let sink = control.sink.lock().take();

		if sink.is_some() {
			control.shutdown.send_replace(true);
			emit!(debug, "realtime channel disconnected");
		}

		drop(sink);
	}
}
impl Drop for ChannelHandle {
	fn drop(&mut self) {
		self.disconnect();
	}
}
impl Debug for ChannelHandle {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ChannelHandle").field("state", &self.state()).finish()
	}
}

struct Control {
	sink: Mutex<Option<Sink>>,
	state: watch::Sender<ChannelState>,
	shutdown: watch::Sender<bool>,
}
impl Control {
	fn transition(&self, next: ChannelState) {
		self.state.send_if_modified(|state| {
			if state.can_transition_to(next) {
				*state = next;

				true
			} else {
				false
			}
		});
	}

	fn deliver(&self, destination: &str, body: &str) {
		if let Some(sink) = self.sink.lock().as_mut() {
			sink(destination, body);
		}
	}
}

async fn run(control: Arc<Control>, channel: RealtimeChannel, topics: Vec<String>) {
	let mut shutdown = control.shutdown.subscribe();
	let delay = channel.reconnect_delay.unsigned_abs();

	loop {
		if *shutdown.borrow_and_update() {
			break;
		}

		control.transition(ChannelState::Connecting);

		let span = FlowSpan::start(FlowKind::Realtime, "connect");
		let outcome = tokio::select! {
			_ = shutdown.changed() => break,
			outcome = span.instrument(channel.session(&control, &topics, &span)) => outcome,
		};

		match outcome {
			Ok(()) => emit!(info, "realtime connection closed by peer"),
			Err(err) => {
				span.finish(FlowOutcome::Failure);
				emit!(warn, error = %err, "realtime connection dropped");
			},
		}

		control.transition(ChannelState::Disconnected);

		tokio::select! {
			_ = shutdown.changed() => break,
			_ = tokio::time::sleep(delay) => {},
		}
	}

	control.transition(ChannelState::Closed);
}

async fn await_connected(link: &mut dyn RealtimeLink, decoder: &mut FrameDecoder) -> Result<()> {
	loop {
		let Some(text) = link.next().await? else {
			return Err(Error::TransportDropped { reason: "closed during handshake".into() });
		};

		for frame in decoder.push(&text) {
			match frame {
				Ok(frame) if frame.command == Command::Connected => return Ok(()),
				Ok(frame) if frame.command == Command::Error => {
					let reason = frame.get("message").unwrap_or("handshake refused").to_owned();

					return Err(Error::TransportDropped { reason });
				},
				Ok(_) => {},
				Err(err) => {
					emit!(warn, error = %err, "skipping undecodable STOMP frame");
					obs::record_realtime_drop(DropReason::UndecodableFrame);
				},
			}
		}
	}
}

fn handle_frame(control: &Control, frame: Frame) {
	match frame.command {
		Command::Message => match frame.destination() {
			Some(destination) => control.deliver(destination, &frame.body),
			None => emit!(debug, "ignoring MESSAGE without destination"),
		},
		Command::Error => {
			emit!(
				warn,
				message = frame.get("message").unwrap_or_default(),
				"STOMP error frame received"
			);
		},
		_ => {},
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn transition_table_matches_the_connection_lifecycle() {
		use ChannelState::*;

		assert!(Disconnected.can_transition_to(Connecting));
		assert!(Connecting.can_transition_to(Connected));
		assert!(Connecting.can_transition_to(Disconnected));
		assert!(Connected.can_transition_to(Disconnected));
		assert!(Connected.can_transition_to(Closed));
		assert!(!Disconnected.can_transition_to(Connected));
		assert!(!Connected.can_transition_to(Connecting));
		assert!(!Closed.can_transition_to(Connecting));
		assert!(!Closed.can_transition_to(Closed));
	}

	#[tokio::test]
	async fn scoped_connect_without_user_is_inert() {
		let config = BridgeConfig::from_api_base("http://localhost:3001/api")
			.expect("Local API base should build.");
		let channel = RealtimeChannel::new(&config, Arc::new(crate::_preludet::RefusingConnector));
		let handle = channel.connect_scoped(
			None,
			|user| [crate::realtime::Topic::UserNotifications(user)],
			|_: serde_json::Value| {},
		);

		assert!(handle.is_inert());
		assert_eq!(handle.state(), ChannelState::Closed);

		handle.disconnect();
		handle.disconnect();
	}
}
