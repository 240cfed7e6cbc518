//! Push channel for appointment and notification updates.
//!
//! The server speaks STOMP over a WebSocket endpoint derived from the API base URL. A
//! [`RealtimeChannel`] owns the reconnect loop: it opens a [`RealtimeLink`], completes the
//! STOMP handshake, subscribes every topic, and hands parsed message bodies to the caller's
//! handler. Nothing is replayed across reconnects.

pub mod channel;
pub mod event;
pub mod feed;
pub mod stomp;
pub mod transport;

pub use channel::{ChannelHandle, ChannelState, RealtimeChannel};
pub use event::{AppointmentChange, AppointmentEvent, NotificationEvent, Topic};
pub use feed::NotificationFeed;
#[cfg(feature = "tungstenite")] pub use transport::TungsteniteConnector;
pub use transport::{ConnectFuture, LinkFuture, RealtimeConnector, RealtimeLink};
