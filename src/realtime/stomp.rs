//! Minimal STOMP 1.2 frame codec for text WebSocket transports.

// self
use crate::_prelude::*;

/// Largest frame the decoder buffers, headers and body included.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Failures raised while decoding inbound frames.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum FrameError {
	/// The command line is not a STOMP command.
	#[error("Unknown STOMP command `{0}`.")]
	UnknownCommand(String),
	/// A header line has no `:` separator.
	#[error("Malformed STOMP header line `{0}`.")]
	MalformedHeader(String),
	/// A header uses an escape sequence STOMP 1.2 does not define.
	#[error("Undefined escape sequence in STOMP header `{0}`.")]
	InvalidEscape(String),
	/// The `content-length` header is not a number.
	#[error("Invalid content-length `{0}`.")]
	InvalidContentLength(String),
	/// The byte after a sized body is not the NUL terminator.
	#[error("Frame body is not NUL-terminated.")]
	MissingTerminator,
	/// Frame text is not valid UTF-8.
	#[error("Frame is not valid UTF-8.")]
	InvalidUtf8,
	/// The frame exceeds [`MAX_FRAME_BYTES`], by declaration or by buffered size.
	#[error("Frame exceeds the 1 MiB size limit.")]
	FrameTooLarge,
}

/// STOMP commands understood by the channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
	/// Client handshake.
	Connect,
	/// Client handshake (STOMP 1.2 spelling).
	Stomp,
	/// Server handshake acknowledgement.
	Connected,
	/// Client publish.
	Send,
	/// Client subscription.
	Subscribe,
	/// Client unsubscription.
	Unsubscribe,
	/// Server-delivered message.
	Message,
	/// Server receipt.
	Receipt,
	/// Server-side protocol error.
	Error,
	/// Client graceful shutdown.
	Disconnect,
}
impl Command {
	/// Returns the wire spelling.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Connect => "CONNECT",
			Self::Stomp => "STOMP",
			Self::Connected => "CONNECTED",
			Self::Send => "SEND",
			Self::Subscribe => "SUBSCRIBE",
			Self::Unsubscribe => "UNSUBSCRIBE",
			Self::Message => "MESSAGE",
			Self::Receipt => "RECEIPT",
			Self::Error => "ERROR",
			Self::Disconnect => "DISCONNECT",
		}
	}

	// Header values in CONNECT and CONNECTED frames are never escaped.
	const fn escapes_headers(self) -> bool {
		!matches!(self, Self::Connect | Self::Stomp | Self::Connected)
	}
}
impl FromStr for Command {
	type Err = FrameError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(match s {
			"CONNECT" => Self::Connect,
			"STOMP" => Self::Stomp,
			"CONNECTED" => Self::Connected,
			"SEND" => Self::Send,
			"SUBSCRIBE" => Self::Subscribe,
			"UNSUBSCRIBE" => Self::Unsubscribe,
			"MESSAGE" => Self::Message,
			"RECEIPT" => Self::Receipt,
			"ERROR" => Self::Error,
			"DISCONNECT" => Self::Disconnect,
			other => return Err(FrameError::UnknownCommand(other.into())),
		})
	}
}
impl Display for Command {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// One STOMP frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
	/// Frame command.
	pub command: Command,
	/// Headers in wire order; repeated names keep every occurrence.
	pub headers: Vec<(String, String)>,
	/// Frame body.
	pub body: String,
}
impl Frame {
	/// Creates a frame without headers or body.
	pub fn new(command: Command) -> Self {
		Self { command, headers: Vec::new(), body: String::new() }
	}

	/// Appends a header.
	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Sets the body.
	pub fn body(mut self, body: impl Into<String>) -> Self {
		self.body = body.into();

		self
	}

	/// Client handshake for `host` with heart-beating disabled.
	pub fn connect(host: &str) -> Self {
		Self::new(Command::Connect)
			.header("accept-version", "1.2")
			.header("host", host)
			.header("heart-beat", "0,0")
	}

	/// Subscription to `destination` under `id`.
	pub fn subscribe(id: impl Into<String>, destination: impl Into<String>) -> Self {
		Self::new(Command::Subscribe)
			.header("id", id)
			.header("destination", destination)
			.header("ack", "auto")
	}

	/// Graceful disconnect.
	pub fn disconnect() -> Self {
		Self::new(Command::Disconnect)
	}

	/// Returns the first value of `name`; STOMP 1.2 ignores later repeats.
	pub fn get(&self, name: &str) -> Option<&str> {
		self.headers.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
	}

	/// Returns the `destination` header.
	pub fn destination(&self) -> Option<&str> {
		self.get("destination")
	}

	/// Encodes the frame, including the trailing NUL.
	pub fn encode(&self) -> String {
		let escape = self.command.escapes_headers();
		let mut out = String::with_capacity(self.body.len() + 64);

		out.push_str(self.command.as_str());
		out.push('\n');

		for (name, value) in &self.headers {
			if escape {
				escape_into(&mut out, name);
				out.push(':');
				escape_into(&mut out, value);
			} else {
				out.push_str(name);
				out.push(':');
				out.push_str(value);
			}

			out.push('\n');
		}

		if !self.body.is_empty() && self.get("content-length").is_none() {
			out.push_str("content-length:");
			out.push_str(&self.body.len().to_string());
			out.push('\n');
		}

		out.push('\n');
		out.push_str(&self.body);
		out.push('\0');

		out
	}
}

/// Incremental decoder that tolerates heart-beat EOLs and frames split across messages.
#[derive(Debug, Default)]
pub struct FrameDecoder {
	buffer: Vec<u8>,
}
impl FrameDecoder {
	/// Appends `chunk` and returns every complete frame it finished.
	///
	/// A malformed frame is consumed and reported; the decoder stays usable.
	pub fn push(&mut self, chunk: &str) -> Vec<Result<Frame, FrameError>> {
		self.buffer.extend_from_slice(chunk.as_bytes());

		let mut frames = Vec::new();

		loop {
			let skip = self.buffer.iter().take_while(|b| matches!(b, b'\n' | b'\r')).count();

			self.buffer.drain(..skip);

			if self.buffer.is_empty() {
				break;
			}

			match split_frame(&self.buffer) {
				Some(Ok((frame, consumed))) => {
					self.buffer.drain(..consumed);
					frames.push(Ok(frame));
				},
				Some(Err((err, consumed))) => {
					self.buffer.drain(..consumed);
					frames.push(Err(err));
				},
				None => break,
			}
		}

		if self.buffer.len() > MAX_FRAME_BYTES {
			self.buffer.clear();
			frames.push(Err(FrameError::FrameTooLarge));
		}

		frames
	}

	/// Drops any partial frame.
	pub fn reset(&mut self) {
		self.buffer.clear();
	}
}

/// Decodes every complete frame in `input`, ignoring a trailing partial frame.
pub fn decode_all(input: &str) -> Vec<Result<Frame, FrameError>> {
	FrameDecoder::default().push(input)
}

type Split = Result<(Frame, usize), (FrameError, usize)>;

fn split_frame(buf: &[u8]) -> Option<Split> {
	let nul = buf.iter().position(|b| *b == 0);
	let head_end = find(buf, b"\n\n")
		.map(|i| (i, i + 2))
		.into_iter()
		.chain(find(buf, b"\r\n\r\n").map(|i| (i, i + 4)))
		.min_by_key(|(i, _)| *i);
	let (head_len, body_start) = match (head_end, nul) {
		// Header-only frame terminated right after its last EOL.
		(Some((head_len, _)), Some(nul)) if nul < head_len => return Some(header_only(buf, nul)),
		(None, Some(nul)) => return Some(header_only(buf, nul)),
		(None, None) => return None,
		(Some(head_end), _) => head_end,
	};
	let head = &buf[..head_len];
	let content_length = match content_length(head) {
		Ok(len) => len,
		Err(err) => {
			let end = buf.iter().position(|b| *b == 0).map_or(buf.len(), |i| i + 1);

			return Some(Err((err, end)));
		},
	};
	let (body_end, consumed) = match content_length {
		Some(len) => {
			let Some(end) = body_start.checked_add(len).filter(|end| *end < MAX_FRAME_BYTES) else {
				// Skip to the next NUL once it has arrived; the buffer cap bounds the wait.
				let nul = body_start + buf[body_start..].iter().position(|b| *b == 0)?;

				return Some(Err((FrameError::FrameTooLarge, nul + 1)));
			};

			if buf.len() <= end {
				return None;
			}
			if buf[end] != 0 {
				let skip =
					buf[end..].iter().position(|b| *b == 0).map_or(buf.len(), |i| end + i + 1);

				return Some(Err((FrameError::MissingTerminator, skip)));
			}

			(end, end + 1)
		},
		None => {
			let nul = body_start + buf[body_start..].iter().position(|b| *b == 0)?;

			(nul, nul + 1)
		},
	};

	Some(
		parse(head, &buf[body_start..body_end])
			.map(|frame| (frame, consumed))
			.map_err(|err| (err, consumed)),
	)
}

fn header_only(buf: &[u8], nul: usize) -> Split {
	parse(&buf[..nul], &[]).map(|frame| (frame, nul + 1)).map_err(|err| (err, nul + 1))
}

fn parse(head: &[u8], body: &[u8]) -> Result<Frame, FrameError> {
	let head = std::str::from_utf8(head).map_err(|_| FrameError::InvalidUtf8)?;
	let body = std::str::from_utf8(body).map_err(|_| FrameError::InvalidUtf8)?;
	let mut lines = head.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line));
	let command: Command = lines.next().unwrap_or_default().parse()?;
	let escaped = command.escapes_headers();
	let mut headers = Vec::new();

	for line in lines.filter(|line| !line.is_empty()) {
		let (name, value) =
			line.split_once(':').ok_or_else(|| FrameError::MalformedHeader(line.into()))?;

		if escaped {
			headers.push((unescape(name)?, unescape(value)?));
		} else {
			headers.push((name.into(), value.into()));
		}
	}

	Ok(Frame { command, headers, body: body.into() })
}

fn content_length(head: &[u8]) -> Result<Option<usize>, FrameError> {
	let Ok(head) = std::str::from_utf8(head) else {
		return Err(FrameError::InvalidUtf8);
	};

	head.split('\n')
		.skip(1)
		.filter_map(|line| line.strip_suffix('\r').unwrap_or(line).split_once(':'))
		.find(|(name, _)| *name == "content-length")
		.map(|(_, value)| {
			value.trim().parse().map_err(|_| FrameError::InvalidContentLength(value.into()))
		})
		.transpose()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
	haystack.windows(needle.len()).position(|window| window == needle)
}

fn escape_into(out: &mut String, value: &str) {
	for c in value.chars() {
		match c {
			'\\' => out.push_str("\\\\"),
			'\n' => out.push_str("\\n"),
			'\r' => out.push_str("\\r"),
			':' => out.push_str("\\c"),
			c => out.push(c),
		}
	}
}

fn unescape(value: &str) -> Result<String, FrameError> {
	let mut out = String::with_capacity(value.len());
	let mut chars = value.chars();

	while let Some(c) = chars.next() {
		if c != '\\' {
			out.push(c);

			continue;
		}

		match chars.next() {
			Some('\\') => out.push('\\'),
			Some('n') => out.push('\n'),
			Some('r') => out.push('\r'),
			Some('c') => out.push(':'),
			_ => return Err(FrameError::InvalidEscape(value.into())),
		}
	}

	Ok(out)
}
