//! Endpoint and timing configuration shared by the bridge, gateway, and realtime channel.

// self
use crate::{_prelude::*, error::ConfigError};

/// Resolved configuration for one application server.
///
/// Deserialization goes through [`BridgeConfigBuilder::build`], so omitted fields take their
/// defaults and invalid timings are rejected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BridgeConfigBuilder")]
pub struct BridgeConfig {
	/// Base URL of the REST API; always ends with `/`.
	pub api_base: Url,
	/// Path of the token exchange endpoint, relative to [`BridgeConfig::api_base`].
	pub exchange_path: String,
	/// STOMP-over-WebSocket endpoint.
	pub realtime_endpoint: Url,
	/// Fixed delay between realtime reconnect attempts.
	pub reconnect_delay: Duration,
	/// Upper bound for the STOMP handshake after the socket opens.
	pub handshake_timeout: Duration,
	/// Extra passive exchange attempts after a failure; zero keeps the session loading.
	pub passive_retries: u32,
	/// Delay between passive exchange attempts.
	pub passive_retry_delay: Duration,
}
impl BridgeConfig {
	/// Default exchange endpoint path.
	pub const DEFAULT_EXCHANGE_PATH: &'static str = "auth/supabase-login";
	/// Default realtime reconnect delay.
	pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::seconds(5);
	/// Default STOMP handshake timeout.
	pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::seconds(10);
	/// Default delay between passive exchange attempts.
	pub const DEFAULT_PASSIVE_RETRY_DELAY: Duration = Duration::seconds(2);

	/// Starts a builder for the API rooted at `api_base`.
	pub fn builder(api_base: Url) -> BridgeConfigBuilder {
		BridgeConfigBuilder::new(api_base)
	}

	/// Parses `api_base` and builds a configuration with defaults.
	pub fn from_api_base(api_base: &str) -> Result<Self, ConfigError> {
		let url = Url::parse(api_base)
			.map_err(|source| ConfigError::InvalidUrl { value: api_base.into(), source })?;

		Self::builder(url).build()
	}

	/// Resolves an API path against the base URL.
	pub fn api_url(&self, path: &str) -> Result<Url, ConfigError> {
		let relative = path.trim_start_matches('/');

		self.api_base
			.join(relative)
			.map_err(|source| ConfigError::InvalidUrl { value: path.into(), source })
	}

	/// Absolute URL of the exchange endpoint.
	pub fn exchange_url(&self) -> Result<Url, ConfigError> {
		self.api_url(&self.exchange_path)
	}
}

/// Builder for [`BridgeConfig`] values.
#[derive(Debug, Deserialize)]
pub struct BridgeConfigBuilder {
	/// Base URL of the REST API.
	pub api_base: Url,
	/// Exchange endpoint path.
	#[serde(default = "default_exchange_path")]
	pub exchange_path: String,
	/// Explicit realtime endpoint; derived from the API base when absent.
	#[serde(default)]
	pub realtime_endpoint: Option<Url>,
	/// Realtime reconnect delay.
	#[serde(default = "default_reconnect_delay")]
	pub reconnect_delay: Duration,
	/// STOMP handshake timeout.
	#[serde(default = "default_handshake_timeout")]
	pub handshake_timeout: Duration,
	/// Extra passive exchange attempts.
	#[serde(default)]
	pub passive_retries: u32,
	/// Delay between passive exchange attempts.
	#[serde(default = "default_passive_retry_delay")]
	pub passive_retry_delay: Duration,
}
impl BridgeConfigBuilder {
	/// Creates a builder seeded with defaults.
	pub fn new(api_base: Url) -> Self {
		Self {
			api_base,
			exchange_path: default_exchange_path(),
			realtime_endpoint: None,
			reconnect_delay: default_reconnect_delay(),
			handshake_timeout: default_handshake_timeout(),
			passive_retries: 0,
			passive_retry_delay: default_passive_retry_delay(),
		}
	}

	/// Overrides the exchange endpoint path.
	pub fn exchange_path(mut self, path: impl Into<String>) -> Self {
		self.exchange_path = path.into();

		self
	}

	/// Overrides the realtime endpoint instead of deriving it.
	pub fn realtime_endpoint(mut self, url: Url) -> Self {
		self.realtime_endpoint = Some(url);

		self
	}

	/// Overrides the reconnect delay.
	pub fn reconnect_delay(mut self, delay: Duration) -> Self {
		self.reconnect_delay = delay;

		self
	}

	/// Overrides the STOMP handshake timeout.
	pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
		self.handshake_timeout = timeout;

		self
	}

	/// Enables bounded retries of a failed passive exchange.
	pub fn passive_retries(mut self, retries: u32, delay: Duration) -> Self {
		self.passive_retries = retries;
		self.passive_retry_delay = delay;

		self
	}

	/// Validates and builds the configuration.
	pub fn build(self) -> Result<BridgeConfig, ConfigError> {
		if !self.reconnect_delay.is_positive() {
			return Err(ConfigError::NonPositiveDuration { field: "reconnect_delay" });
		}
		if !self.handshake_timeout.is_positive() {
			return Err(ConfigError::NonPositiveDuration { field: "handshake_timeout" });
		}
		if self.passive_retries > 0 && !self.passive_retry_delay.is_positive() {
			return Err(ConfigError::NonPositiveDuration { field: "passive_retry_delay" });
		}

		let api_base = normalize_base(self.api_base)?;
		let realtime_endpoint = match self.realtime_endpoint {
			Some(url) => url,
			None => derive_realtime_endpoint(&api_base)?,
		};

		Ok(BridgeConfig {
			api_base,
			exchange_path: self.exchange_path,
			realtime_endpoint,
			reconnect_delay: self.reconnect_delay,
			handshake_timeout: self.handshake_timeout,
			passive_retries: self.passive_retries,
			passive_retry_delay: self.passive_retry_delay,
		})
	}
}

impl TryFrom<BridgeConfigBuilder> for BridgeConfig {
	type Error = ConfigError;

	fn try_from(builder: BridgeConfigBuilder) -> Result<Self, Self::Error> {
		builder.build()
	}
}

/// Derives the STOMP endpoint from the REST base: `http(s)` becomes `ws(s)`, a trailing `/api`
/// segment is dropped, and `/ws/websocket` is appended.
pub fn derive_realtime_endpoint(api_base: &Url) -> Result<Url, ConfigError> {
	let scheme = match api_base.scheme() {
		"http" | "ws" => "ws",
		"https" | "wss" => "wss",
		other => return Err(ConfigError::UnsupportedScheme { scheme: other.into() }),
	};
	let root = api_base.path().trim_end_matches('/');
	let root = root.strip_suffix("/api").unwrap_or(root);
	let raw = format!(
		"{scheme}://{host}{root}/ws/websocket",
		host = api_base[url::Position::BeforeHost..url::Position::AfterPort].to_owned(),
	);

	Url::parse(&raw).map_err(|source| ConfigError::InvalidUrl { value: raw, source })
}

fn default_exchange_path() -> String {
	BridgeConfig::DEFAULT_EXCHANGE_PATH.into()
}

fn default_reconnect_delay() -> Duration {
	BridgeConfig::DEFAULT_RECONNECT_DELAY
}

fn default_handshake_timeout() -> Duration {
	BridgeConfig::DEFAULT_HANDSHAKE_TIMEOUT
}

fn default_passive_retry_delay() -> Duration {
	BridgeConfig::DEFAULT_PASSIVE_RETRY_DELAY
}

fn normalize_base(mut url: Url) -> Result<Url, ConfigError> {
	match url.scheme() {
		"http" | "https" => {},
		other => return Err(ConfigError::UnsupportedScheme { scheme: other.into() }),
	}

	if !url.path().ends_with('/') {
		let path = format!("{}/", url.path());

		url.set_path(&path);
	}

	Ok(url)
}
