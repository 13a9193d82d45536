//! Configuration Module
//!
//! Environment-driven configuration for the gateway.

mod settings;

pub use settings::{
    ConfigError, Credentials, DispatchSettings, FeedSettings, GatewayConfig, ServerSettings,
};
