//! Download source abstraction
//!
//! Workers open a source through the [`Downloader`] trait and stream bytes
//! from whatever is behind it: the local file server speaking the wire
//! protocol, or any HTTP(S) endpoint.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::TryStreamExt;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_util::io::StreamReader;
use tracing::{debug, warn};
use url::Url;

use crate::error::TransferError;
use crate::protocol::{read_response, write_request, FileRequest, ResponseStatus};

/// URL scheme addressing the local file server
pub const LOCAL_SCHEME: &str = "fetchlocal";

/// An opened source ready to stream
pub struct DownloadStream {
    /// Full size of the source including any skipped prefix; -1 if unknown
    pub total_bytes: i64,
    /// Offset the source actually honored. Less than the requested offset
    /// when the source ignored the range request; the worker truncates the
    /// destination back to this before writing.
    pub accepted_offset: u64,
    /// Byte stream starting at `accepted_offset`
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
}

impl std::fmt::Debug for DownloadStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadStream")
            .field("total_bytes", &self.total_bytes)
            .field("accepted_offset", &self.accepted_offset)
            .field("reader", &"<stream>")
            .finish()
    }
}

/// Opens a byte stream for a transfer request
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Open `url` for reading, resuming at `offset` when the source
    /// supports it
    async fn open(
        &self,
        url: &Url,
        headers: &BTreeMap<String, String>,
        offset: u64,
    ) -> Result<DownloadStream, TransferError>;
}

/// Downloader speaking the local file server's wire protocol
pub struct FileServerDownloader {
    connect_timeout: Duration,
    response_timeout: Duration,
}

impl FileServerDownloader {
    /// Create a downloader with the given timeouts
    pub fn new(connect_timeout: Duration, response_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            response_timeout,
        }
    }
}

impl Default for FileServerDownloader {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_secs(30))
    }
}

#[async_trait]
impl Downloader for FileServerDownloader {
    async fn open(
        &self,
        url: &Url,
        headers: &BTreeMap<String, String>,
        offset: u64,
    ) -> Result<DownloadStream, TransferError> {
        let host = url
            .host_str()
            .ok_or_else(|| TransferError::invalid_url_with_url("missing host", url.as_str()))?;
        let port = url
            .port()
            .ok_or_else(|| TransferError::invalid_url_with_url("missing port", url.as_str()))?;
        let name = url.path().trim_start_matches('/');
        if name.is_empty() {
            return Err(TransferError::invalid_url_with_url(
                "missing content name",
                url.as_str(),
            ));
        }

        let address = format!("{}:{}", host, port);
        debug!("Opening '{}' on file server {}", name, address);

        let mut stream = timeout(self.connect_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| {
                warn!("Connection timeout to file server {}", address);
                TransferError::network_error_with_address("connection timeout", &address)
            })?
            .map_err(|e| {
                TransferError::network_error_full("failed to connect", &address, e.to_string())
            })?;

        let mut request = FileRequest::new(name)
            .with_client(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")));
        request.headers = headers.clone();
        if offset > 0 {
            request = request.with_range(offset, None);
        }

        write_request(&mut stream, &request).await.map_err(|e| {
            TransferError::network_error_full("failed to send request", &address, e.to_string())
        })?;

        let response = timeout(self.response_timeout, read_response(&mut stream))
            .await
            .map_err(|_| {
                TransferError::network_error_with_address("response timeout", &address)
            })?
            .map_err(|e| {
                TransferError::network_error_full("failed to read response", &address, e.to_string())
            })?;

        match response.status {
            ResponseStatus::Ok => {
                debug!(
                    "File server session {} streaming {} bytes from offset {}",
                    response.session_id, response.content_length, offset
                );
                Ok(DownloadStream {
                    total_bytes: (offset + response.content_length) as i64,
                    accepted_offset: offset,
                    reader: Box::new(stream.take(response.content_length)),
                })
            }
            ResponseStatus::Unauthorized => Err(TransferError::unauthorized(
                "file server rejected the credential",
            )),
            ResponseStatus::NotFound => Err(TransferError::not_found_with_name(
                "file server has no such content",
                name,
            )),
            ResponseStatus::RangeNotSatisfiable => Err(TransferError::invalid_range_with_range(
                "file server rejected the range",
                format!("{}-", offset),
            )),
            ResponseStatus::BadRequest => Err(TransferError::network_error_with_address(
                "file server rejected the request frame",
                &address,
            )),
        }
    }
}

/// Downloader for plain HTTP(S) sources
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    /// Create a downloader with the given connect timeout
    pub fn new(connect_timeout: Duration) -> Result<Self, TransferError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| {
                TransferError::network_error_full(
                    "failed to build HTTP client",
                    "unknown".to_string(),
                    e.to_string(),
                )
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn open(
        &self,
        url: &Url,
        headers: &BTreeMap<String, String>,
        offset: u64,
    ) -> Result<DownloadStream, TransferError> {
        let mut builder = self.client.get(url.clone());
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if offset > 0 {
            builder = builder.header(reqwest::header::RANGE, format!("bytes={}-", offset));
        }

        let response = builder.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(TransferError::unauthorized(format!(
                "HTTP source returned {}",
                status
            )));
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(TransferError::not_found(format!(
                "HTTP source returned {}",
                status
            )));
        }
        if status == reqwest::StatusCode::RANGE_NOT_SATISFIABLE {
            return Err(TransferError::invalid_range_with_range(
                "HTTP source rejected the range",
                format!("{}-", offset),
            ));
        }
        if !status.is_success() {
            return Err(TransferError::network_error_with_address(
                format!("HTTP source returned {}", status),
                url.as_str(),
            ));
        }

        // A 200 against a range request means the source restarted from zero
        let accepted_offset = if status == reqwest::StatusCode::PARTIAL_CONTENT {
            offset
        } else {
            if offset > 0 {
                debug!("HTTP source ignored the range request; restarting from zero");
            }
            0
        };
        let total_bytes = response
            .content_length()
            .map(|len| (accepted_offset + len) as i64)
            .unwrap_or(-1);

        let stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        let reader = StreamReader::new(Box::pin(stream));

        Ok(DownloadStream {
            total_bytes,
            accepted_offset,
            reader: Box::new(reader),
        })
    }
}
