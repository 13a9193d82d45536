//! Gateway Configuration Settings
//!
//! Configuration types for the gateway, loaded from environment variables.
//! A `--port N` command-line argument overrides `SERVER_PORT`.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Upstream feed credentials.
#[derive(Clone)]
pub struct Credentials {
    app_key: String,
    app_secret: String,
    access_token: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(app_key: String, app_secret: String, access_token: String) -> Self {
        Self {
            app_key,
            app_secret,
            access_token,
        }
    }

    /// Get the application key.
    #[must_use]
    pub fn app_key(&self) -> &str {
        &self.app_key
    }

    /// Get the application secret.
    #[must_use]
    pub fn app_secret(&self) -> &str {
        &self.app_secret
    }

    /// Get the access token.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("app_key", &"[REDACTED]")
            .field("app_secret", &"[REDACTED]")
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// Upstream feed connection settings.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Feed bridge WebSocket URL.
    pub url: String,
    /// Time allowed for an upstream command reply.
    pub command_timeout: Duration,
    /// WebSocket ping interval.
    pub ping_interval: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:9100/feed".to_string(),
            command_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(30),
            reconnect_delay_initial: Duration::from_millis(500),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 0,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Allowed CORS origins; `*` allows any.
    pub cors_allow_origins: Vec<String>,
    /// Externally reachable base URL, reported by `/health`.
    pub public_base_url: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8765,
            cors_allow_origins: vec!["*".to_string()],
            public_base_url: None,
        }
    }
}

impl ServerSettings {
    /// `host:port` to bind.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Queue sizes for push dispatch and per-client delivery.
#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    /// Capacity of the upstream push queue.
    pub dispatch_capacity: usize,
    /// Capacity of each client's outgoing queue.
    pub client_queue_capacity: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            dispatch_capacity: 4096,
            client_queue_capacity: 1024,
        }
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Upstream credentials.
    pub credentials: Credentials,
    /// Upstream connection settings.
    pub feed: FeedSettings,
    /// HTTP server settings.
    pub server: ServerSettings,
    /// Queue sizes.
    pub dispatch: DispatchSettings,
    /// Watchlist JSON file.
    pub watchlist_path: PathBuf,
}

impl GatewayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a credential is missing or empty, or a value
    /// cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Same as [`GatewayConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let credentials = Credentials::new(
            env.required("QUOTE_FEED_APP_KEY")?,
            env.required("QUOTE_FEED_APP_SECRET")?,
            env.required("QUOTE_FEED_ACCESS_TOKEN")?,
        );

        let feed_defaults = FeedSettings::default();
        let feed = FeedSettings {
            url: env.get("QUOTE_FEED_URL").unwrap_or(feed_defaults.url),
            command_timeout: env.millis(
                "QUOTE_FEED_COMMAND_TIMEOUT_MS",
                feed_defaults.command_timeout,
            )?,
            ping_interval: env.secs(
                "QUOTE_FEED_PING_INTERVAL_SECS",
                feed_defaults.ping_interval,
            )?,
            reconnect_delay_initial: env.millis(
                "QUOTE_FEED_RECONNECT_DELAY_INITIAL_MS",
                feed_defaults.reconnect_delay_initial,
            )?,
            reconnect_delay_max: env.secs(
                "QUOTE_FEED_RECONNECT_DELAY_MAX_SECS",
                feed_defaults.reconnect_delay_max,
            )?,
            reconnect_delay_multiplier: env.parse(
                "QUOTE_FEED_RECONNECT_DELAY_MULTIPLIER",
                feed_defaults.reconnect_delay_multiplier,
            )?,
            max_reconnect_attempts: env.parse(
                "QUOTE_FEED_MAX_RECONNECT_ATTEMPTS",
                feed_defaults.max_reconnect_attempts,
            )?,
        };

        let server_defaults = ServerSettings::default();
        let server = ServerSettings {
            host: env.get("SERVER_HOST").unwrap_or(server_defaults.host),
            port: env.parse("SERVER_PORT", server_defaults.port)?,
            cors_allow_origins: env
                .get("CORS_ALLOW_ORIGINS")
                .map_or(server_defaults.cors_allow_origins, |v| split_list(&v)),
            public_base_url: env.get("PUBLIC_BASE_URL"),
        };

        let dispatch_defaults = DispatchSettings::default();
        let dispatch = DispatchSettings {
            dispatch_capacity: env.parse(
                "GATEWAY_DISPATCH_CAPACITY",
                dispatch_defaults.dispatch_capacity,
            )?,
            client_queue_capacity: env.parse(
                "GATEWAY_CLIENT_QUEUE_CAPACITY",
                dispatch_defaults.client_queue_capacity,
            )?,
        };

        let watchlist_path = env.get("WATCHLIST_PATH").map_or_else(
            || {
                env.get("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_default()
                    .join(".quote_gateway_watchlist.json")
            },
            PathBuf::from,
        );

        Ok(Self {
            credentials,
            feed,
            server,
            dispatch,
            watchlist_path,
        })
    }

    /// Apply command-line overrides (`--port N` or `--port=N`).
    ///
    /// # Errors
    ///
    /// Returns an error if the port is missing or not a valid port number.
    pub fn apply_args<I, S>(&mut self, args: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let arg = arg.as_ref();
            let value = if arg == "--port" {
                args.next().map(|v| v.as_ref().to_string())
            } else if let Some(v) = arg.strip_prefix("--port=") {
                Some(v.to_string())
            } else {
                continue;
            };

            let value = value.ok_or_else(|| ConfigError::InvalidValue {
                key: "--port".to_string(),
                value: String::new(),
            })?;
            self.server.port = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: "--port".to_string(),
                value,
            })?;
        }
        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Value could not be parsed.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Variable or argument name.
        key: String,
        /// Offending value.
        value: String,
    },
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        let value = (self.0)(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
        if value.trim().is_empty() {
            return Err(ConfigError::EmptyValue(key.to_string()));
        }
        Ok(value)
    }

    fn parse<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        self.get(key).map_or(Ok(default), |v| {
            v.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: v,
            })
        })
    }

    fn secs(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        self.get(key)
            .map_or(Ok(default), |_| self.parse(key, 0).map(Duration::from_secs))
    }

    fn millis(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        self.get(key)
            .map_or(Ok(default), |_| self.parse(key, 0).map(Duration::from_millis))
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
