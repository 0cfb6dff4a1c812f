//! CLI configuration module
//!
//! Resolves fetch-command arguments into a validated configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use url::Url;

use crate::client::ClientConfig;
use crate::protocol::AUTHORIZATION_HEADER;

/// Configuration for one fetch invocation
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Source URL
    pub url: String,
    /// Destination file path
    pub output: PathBuf,
    /// Optional Authorization header value
    pub authorization: Option<String>,
    /// Number of concurrent transfer workers
    pub workers: usize,
    /// Quiet mode
    pub quiet: bool,
}

impl FetchConfig {
    /// Build a configuration from fetch-command arguments
    pub fn from_args(
        url: String,
        output: Option<PathBuf>,
        authorization: Option<String>,
        workers: usize,
        quiet: bool,
    ) -> Self {
        let output = output.unwrap_or_else(|| default_output_for(&url));
        Self {
            url,
            output,
            authorization,
            workers,
            quiet,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(anyhow::anyhow!("workers must be at least 1"));
        }
        if self.output.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("output path cannot be empty"));
        }
        Ok(())
    }

    /// Headers to send with the request
    pub fn headers(&self) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        if let Some(authorization) = &self.authorization {
            headers.insert(AUTHORIZATION_HEADER.to_string(), authorization.clone());
        }
        headers
    }

    /// Client configuration for this invocation
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::default().with_concurrent_limit(self.workers)
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }
}

/// Derive a destination path from the URL's final path segment
fn default_output_for(url: &str) -> PathBuf {
    let name = Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|segments| segments.last().map(|s| s.to_string()))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "download.bin".to_string());
    PathBuf::from("./downloads").join(name)
}
