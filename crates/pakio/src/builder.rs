//! # Builder for ProxyConfig
//!
//! This module provides a builder pattern implementation for creating and customizing
//! ProxyConfig instances with a fluent API.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use pakio_engine::ProxyConfig;
//!
//! let config = ProxyConfig::builder()
//!     .with_cache_dir("/var/cache/pakio")
//!     .with_metadata_file("repomd.xml")
//!     .with_metadata_keep(Duration::from_secs(6 * 3600))
//!     .with_wait_timeout(Duration::from_secs(60))
//!     .build();
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::ProxyConfig;

/// Builder for creating ProxyConfig instances with a fluent API
#[derive(Debug, Clone)]
pub struct ProxyConfigBuilder {
    /// Internal config being built
    config: ProxyConfig,
}

impl ProxyConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: ProxyConfig::default(),
        }
    }

    /// Set the cache root directory
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = cache_dir.into();
        self
    }

    /// Add a file name to the metadata classification set
    pub fn with_metadata_file(mut self, name: impl Into<String>) -> Self {
        self.config.metadata_files.insert(name.into());
        self
    }

    /// Replace the metadata classification set
    pub fn with_metadata_files<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.metadata_files = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set how long cached metadata files stay fresh
    pub fn with_metadata_keep(mut self, keep: Duration) -> Self {
        self.config.metadata_keep = keep;
        self
    }

    /// Set the sleep between lock polls while waiting on another worker
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set the upper bound on waiting for another worker's download
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.config.wait_timeout = timeout;
        self
    }

    /// Set the overall timeout for upstream HTTP requests (zero = unlimited)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connection timeout (time to establish initial connection)
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set whether to follow redirects from the origin
    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.config.follow_redirects = follow;
        self
    }

    /// Set the user agent string sent with upstream requests
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Build the final ProxyConfig
    pub fn build(self) -> ProxyConfig {
        self.config
    }
}

impl Default for ProxyConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
