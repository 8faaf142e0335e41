use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_USER_AGENT: &str = "pakio/0.2";

/// Configurable options for the cache proxy
///
/// Built once at startup and shared read-only between all request workers.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Root directory all cached objects are stored under
    pub cache_dir: PathBuf,

    /// File names classified as repository metadata, subject to expiry
    pub metadata_files: HashSet<String>,

    /// How long a cached metadata file stays fresh
    pub metadata_keep: Duration,

    /// Sleep between lock polls while another worker downloads the same object
    pub poll_interval: Duration,

    /// Upper bound on the time a worker waits for another worker's download
    pub wait_timeout: Duration,

    /// Overall timeout for the entire upstream HTTP request (zero = unlimited)
    pub timeout: Duration,

    /// Connection timeout (time to establish initial connection)
    pub connect_timeout: Duration,

    /// Whether to follow redirects from the origin
    pub follow_redirects: bool,

    /// User agent string sent with upstream requests
    pub user_agent: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("/var/cache/pakio"),
            metadata_files: HashSet::from(["repomd.xml".to_owned()]),
            metadata_keep: Duration::from_secs(360 * 60),
            poll_interval: Duration::from_secs(1),
            wait_timeout: Duration::from_secs(60),
            timeout: Duration::ZERO,
            connect_timeout: Duration::from_secs(30),
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

impl ProxyConfig {
    pub fn builder() -> crate::builder::ProxyConfigBuilder {
        crate::builder::ProxyConfigBuilder::new()
    }
}
