//! Server configuration.
//!
//! [`ServerConfig`] holds the few knobs the router needs at runtime: the
//! address [`Router::serve_with_config`](crate::Router::serve_with_config)
//! binds to, and the maximum request body size read by
//! [`Context::form`](crate::Context::form) and
//! [`Context::decode_json`](crate::Context::decode_json). It can be built in
//! code with [`ServerConfig::builder`] or loaded from TOML.

// the config might be extended with non-Copy types in the future
#![allow(missing_copy_implementations)]

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default address the server binds to.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:8000";

/// Default maximum request body size, in bytes (2 MiB).
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// The configuration for a root [`Router`](crate::Router).
///
/// # Examples
///
/// ```
/// use weft::config::ServerConfig;
///
/// let config = ServerConfig::from_toml(
///     r#"
/// address = "0.0.0.0:3000"
/// body_limit = 1024
/// "#,
/// )?;
///
/// assert_eq!(config.address, "0.0.0.0:3000");
/// assert_eq!(config.body_limit, 1024);
/// # Ok::<(), weft::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(build_fn(skip, error = std::convert::Infallible))]
#[serde(default)]
pub struct ServerConfig {
    /// The `host:port` address to listen on.
    #[builder(setter(into))]
    pub address: String,
    /// The maximum number of request body bytes read into memory.
    ///
    /// Bodies larger than this fail with 400 Bad Request when decoded as
    /// JSON, and are treated as empty when parsed as a form.
    pub body_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig::builder().build()
    }
}

impl ServerConfig {
    /// Create a new [`ServerConfigBuilder`] to build a [`ServerConfig`].
    ///
    /// # Examples
    ///
    /// ```
    /// use weft::config::ServerConfig;
    ///
    /// let config = ServerConfig::builder().address("0.0.0.0:8080").build();
    /// assert_eq!(config.address, "0.0.0.0:8080");
    /// ```
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Parses the configuration from a TOML document.
    ///
    /// Missing keys take their default values.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid TOML or has values of
    /// the wrong type.
    pub fn from_toml(toml_content: &str) -> crate::Result<ServerConfig> {
        let config: ServerConfig = toml::from_str(toml_content).map_err(ConfigError)?;
        Ok(config)
    }
}

impl ServerConfigBuilder {
    /// Builds the server configuration.
    #[must_use]
    pub fn build(&self) -> ServerConfig {
        ServerConfig {
            address: self
                .address
                .clone()
                .unwrap_or_else(|| DEFAULT_ADDRESS.to_owned()),
            body_limit: self.body_limit.unwrap_or(DEFAULT_BODY_LIMIT),
        }
    }
}

#[derive(Debug, Error)]
#[error("could not parse the server configuration: {0}")]
struct ConfigError(toml::de::Error);
crate::error::impl_into_weft_error!(ConfigError);
