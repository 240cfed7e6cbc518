//! Text-message transport seam under the STOMP channel.

// self
use crate::_prelude::*;

/// Boxed future returned by [`RealtimeLink`] operations.
pub type LinkFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;
/// Boxed future returned by [`RealtimeConnector::connect`].
pub type ConnectFuture<'a> = LinkFuture<'a, Box<dyn RealtimeLink>>;

/// Opens text-message links to the realtime endpoint.
pub trait RealtimeConnector
where
	Self: Send + Sync,
{
	/// Opens a new link to `endpoint`.
	fn connect<'a>(&'a self, endpoint: &'a Url) -> ConnectFuture<'a>;
}

/// One open, bidirectional text-message link.
pub trait RealtimeLink
where
	Self: Send,
{
	/// Sends one text message.
	fn send(&mut self, text: String) -> LinkFuture<'_, ()>;

	/// Waits for the next text message; `None` means the peer closed the link.
	fn next(&mut self) -> LinkFuture<'_, Option<String>>;

	/// Closes the link; errors are ignored by callers.
	fn close(&mut self) -> LinkFuture<'_, ()>;
}

#[cfg(feature = "tungstenite")]
pub use tungstenite::TungsteniteConnector;
#[cfg(feature = "tungstenite")]
mod tungstenite {
	// crates.io
	use futures_util::{SinkExt, StreamExt};
	use tokio::net::TcpStream;
	use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};
	// self
	use super::*;
	use crate::obs::emit;

	/// Connector backed by `tokio-tungstenite`.
	#[derive(Clone, Copy, Debug, Default)]
	pub struct TungsteniteConnector;
	impl RealtimeConnector for TungsteniteConnector {
		fn connect<'a>(&'a self, endpoint: &'a Url) -> ConnectFuture<'a> {
			Box::pin(async move {
				let (stream, _) = tokio_tungstenite::connect_async(endpoint.as_str())
					.await
					.map_err(|err| Error::TransportDropped { reason: err.to_string() })?;

				Ok(Box::new(TungsteniteLink { stream }) as Box<dyn RealtimeLink>)
			})
		}
	}

	struct TungsteniteLink {
		stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
	}
	impl RealtimeLink for TungsteniteLink {
		fn send(&mut self, text: String) -> LinkFuture<'_, ()> {
			Box::pin(async move {
				self.stream
					.send(Message::Text(text))
					.await
					.map_err(|err| Error::TransportDropped { reason: err.to_string() })
			})
		}

		fn next(&mut self) -> LinkFuture<'_, Option<String>> {
			Box::pin(async move {
				loop {
					match self.stream.next().await {
						Some(Ok(Message::Text(text))) => return Ok(Some(text)),
						Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
							Ok(text) => return Ok(Some(text)),
							Err(_) => {
								emit!(debug, "ignoring non-UTF-8 binary message");
							},
						},
						Some(Ok(Message::Close(_))) | None => return Ok(None),
						Some(Ok(_)) => {},
						Some(Err(err)) =>
							return Err(Error::TransportDropped { reason: err.to_string() }),
					}
				}
			})
		}

		fn close(&mut self) -> LinkFuture<'_, ()> {
			Box::pin(async move {
				let _ = self.stream.close(None).await;

				Ok(())
			})
		}
	}
}
