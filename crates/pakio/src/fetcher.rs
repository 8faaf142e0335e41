//! # Fetcher
//!
//! Performs the actual upstream retrieval and materializes the object at its
//! storage path. The body is streamed to a sibling temporary file and renamed
//! into place, so a reader can never observe a partially-written object.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use reqwest::{Client, StatusCode};
use rustls::ClientConfig;
use rustls::crypto::aws_lc_rs;
use rustls_platform_verifier::BuilderVerifierExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::config::ProxyConfig;
use crate::error::ProxyError;

/// Create a reqwest Client with the provided configuration
pub fn create_client(config: &ProxyConfig) -> Result<Client, ProxyError> {
    // Create the crypto provider
    let provider = Arc::new(aws_lc_rs::default_provider());

    // Build platform default TLS configuration
    let tls_config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .expect("Failed to configure default TLS protocol versions")
        .with_platform_verifier()
        .expect("Failed to initialize platform certificate verifier")
        .with_no_client_auth();

    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(5)
        .user_agent(&config.user_agent)
        .use_preconfigured_tls(tls_config)
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.timeout.is_zero() {
        client_builder = client_builder.timeout(config.timeout);
    }

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    client_builder.build().map_err(ProxyError::from)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Downloads one object at a time to its mapped storage path.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Fetch `url` and materialize it at `dest`.
    ///
    /// With `refresh` false the destination is re-checked first: a follower
    /// that raced past the coordinator after a successful leader finds the
    /// object already present and skips the network entirely. A stale
    /// metadata refresh passes `refresh` true so the existing copy does not
    /// suppress its own re-download.
    ///
    /// A non-success origin status leaves `dest` untouched and is reported as
    /// [`ProxyError::FetchFailed`].
    pub async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        refresh: bool,
    ) -> Result<StatusCode, ProxyError> {
        if !refresh && fs::try_exists(dest).await? {
            debug!(url, dest = %dest.display(), "object already present, skipping download");
            return Ok(StatusCode::OK);
        }

        if let Some(parent) = dest.parent() {
            match fs::create_dir_all(parent).await {
                Ok(()) => {}
                // Another worker filling a sibling file may create it first.
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    warn!(dir = %parent.display(), "directory created concurrently");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(url, %status, "origin refused the download");
            return Err(ProxyError::FetchFailed(status));
        }

        let tmp = tmp_path(dest);
        let result = self.write_body(response, &tmp).await;
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }

        if let Err(e) = fs::rename(&tmp, dest).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(url, dest = %dest.display(), "stored object");
        Ok(status)
    }

    async fn write_body(&self, response: reqwest::Response, tmp: &Path) -> Result<(), ProxyError> {
        let mut file = fs::File::create(tmp).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }
}
