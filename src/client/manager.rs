//! Transfer client module
//!
//! The facade callers drive: enqueue requests, control them, subscribe to
//! events, and start/stop the worker pool. The client's lifecycle is its
//! own; it does not depend on any presentation layer being alive.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::client::downloader::{FileServerDownloader, HttpDownloader, LOCAL_SCHEME};
use crate::client::worker::{run_worker, WorkerContext};
use crate::error::TransferError;
use crate::notify::{EventNotifier, ListenerId, TransferListener};
use crate::queue::{TransferQueue, TransferRequest, TransferStatus};
use tracing::{debug, info};

/// Configuration for a [`TransferClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Number of concurrent transfer workers
    pub concurrent_limit: usize,
    /// Checkpoint cadence: how often progress is persisted and emitted, and
    /// the worst-case latency for observing pause/remove
    pub progress_interval: Duration,
    /// Timeout for establishing a connection to a source
    pub connect_timeout: Duration,
    /// Timeout for a source's response header
    pub response_timeout: Duration,
}

impl ClientConfig {
    /// Set the worker count
    pub fn with_concurrent_limit(mut self, limit: usize) -> Self {
        self.concurrent_limit = limit;
        self
    }

    /// Set the checkpoint cadence
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.concurrent_limit == 0 {
            return Err(anyhow::anyhow!("concurrent_limit must be at least 1"));
        }
        if self.progress_interval.is_zero() {
            return Err(anyhow::anyhow!("progress_interval must be non-zero"));
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            concurrent_limit: 4,
            progress_interval: Duration::from_millis(500),
            connect_timeout: Duration::from_secs(10),
            response_timeout: Duration::from_secs(30),
        }
    }
}

/// Resumable download client over the transfer queue and worker pool
pub struct TransferClient {
    queue: Arc<TransferQueue>,
    notifier: Arc<EventNotifier>,
    config: ClientConfig,
    file_server_downloader: Arc<FileServerDownloader>,
    http_downloader: Arc<HttpDownloader>,
    token: Mutex<Option<CancellationToken>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TransferClient {
    /// Create a client with the given configuration
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let http_downloader = Arc::new(HttpDownloader::new(config.connect_timeout)?);
        let file_server_downloader = Arc::new(FileServerDownloader::new(
            config.connect_timeout,
            config.response_timeout,
        ));
        Ok(Self {
            queue: Arc::new(TransferQueue::new()),
            notifier: Arc::new(EventNotifier::new()),
            config,
            file_server_downloader,
            http_downloader,
            token: Mutex::new(None),
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Create a client with the default configuration
    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// Start the worker pool. Idempotent.
    pub fn start(&self) {
        let mut token_slot = self.token.lock().unwrap();
        if token_slot.is_some() {
            return;
        }
        let token = CancellationToken::new();

        let ctx = WorkerContext {
            queue: self.queue.clone(),
            notifier: self.notifier.clone(),
            config: self.config.clone(),
            file_server_downloader: self.file_server_downloader.clone(),
            http_downloader: self.http_downloader.clone(),
        };

        let mut workers = self.workers.lock().unwrap();
        for index in 0..self.config.concurrent_limit {
            workers.push(tokio::spawn(run_worker(index, ctx.clone(), token.clone())));
        }
        *token_slot = Some(token);
        info!("Transfer client started ({} workers)", self.config.concurrent_limit);
    }

    /// Stop claiming new work and detach every listener.
    ///
    /// In-flight transfers keep running to completion; pausing them stays a
    /// caller decision. Idempotent.
    pub fn stop(&self) {
        let token = self.token.lock().unwrap().take();
        if let Some(token) = token {
            token.cancel();
        }
        self.workers.lock().unwrap().clear();
        self.notifier.clear();
        info!("Transfer client stopped");
    }

    /// Check whether the worker pool is running
    pub fn is_running(&self) -> bool {
        self.token.lock().unwrap().is_some()
    }

    /// Enqueue a download.
    ///
    /// Fails with `InvalidUrl` for unparsable URLs or unsupported schemes
    /// and with `DuplicateId` while the same (url, destination) pair is
    /// live. Returns the stable request id.
    pub async fn enqueue(
        &self,
        url: &str,
        destination: impl AsRef<Path>,
        headers: BTreeMap<String, String>,
    ) -> Result<u64> {
        let parsed = Url::parse(url)
            .map_err(|e| TransferError::invalid_url_with_url(e.to_string(), url))?;
        match parsed.scheme() {
            LOCAL_SCHEME | "http" | "https" => {}
            other => {
                return Err(TransferError::invalid_url_with_url(
                    format!("unsupported scheme '{}'", other),
                    url,
                )
                .into())
            }
        }

        let request = TransferRequest::new(url, destination.as_ref(), headers);
        let id = self.queue.enqueue(request).await?;
        if let Some(snapshot) = self.queue.get(id).await {
            self.notifier.emit_queued(&snapshot);
        }
        debug!("Enqueued {} as {:016x}", url, id);
        Ok(id)
    }

    /// Pause a request. Emits `on_paused` only when a transition happened.
    pub async fn pause(&self, id: u64) -> Result<bool> {
        let paused = self.queue.pause(id).await?;
        if paused {
            if let Some(snapshot) = self.queue.get(id).await {
                self.notifier.emit_paused(&snapshot);
            }
        }
        Ok(paused)
    }

    /// Resume a paused request. Emits `on_queued` when it re-enters the
    /// queue.
    pub async fn resume(&self, id: u64) -> Result<bool> {
        let resumed = self.queue.resume(id).await?;
        if resumed {
            if let Some(snapshot) = self.queue.get(id).await {
                self.notifier.emit_queued(&snapshot);
            }
        }
        Ok(resumed)
    }

    /// Cancel a request and discard its partial bytes.
    ///
    /// A request currently held by a worker is cleaned up at the worker's
    /// next checkpoint; otherwise the partial destination is deleted here.
    pub async fn remove(&self, id: u64) -> Result<bool> {
        let before = self.queue.status(id).await;
        let removed = self.queue.remove(id).await?;
        if removed {
            if before != Some(TransferStatus::Downloading) {
                if let Some(snapshot) = self.queue.get(id).await {
                    let _ = tokio::fs::remove_file(&snapshot.destination).await;
                }
            }
            if let Some(snapshot) = self.queue.get(id).await {
                self.notifier.emit_removed(&snapshot);
            }
        }
        Ok(removed)
    }

    /// Register a listener for transfer events
    pub fn add_listener(&self, listener: Arc<dyn TransferListener>) -> ListenerId {
        self.notifier.register(listener)
    }

    /// Remove a previously registered listener
    pub fn remove_listener(&self, id: ListenerId) {
        self.notifier.unregister(id);
    }

    /// Snapshot of a tracked request
    pub async fn get(&self, id: u64) -> Option<TransferRequest> {
        self.queue.get(id).await
    }

    /// Number of live (non-terminal) requests
    pub async fn active_count(&self) -> usize {
        self.queue.active_count().await
    }
}

impl Drop for TransferClient {
    fn drop(&mut self) {
        if let Some(token) = self.token.lock().unwrap().take() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::protocol::AUTHORIZATION_HEADER;
    use crate::server::{Authenticator, FileServer};
    use std::path::PathBuf;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::mpsc;

    /// Listener recording every event and signalling terminal ones
    struct ChannelListener {
        events: StdMutex<Vec<String>>,
        progress: StdMutex<Vec<u64>>,
        terminal: mpsc::UnboundedSender<TransferRequest>,
    }

    impl ChannelListener {
        fn new(terminal: mpsc::UnboundedSender<TransferRequest>) -> Self {
            Self {
                events: StdMutex::new(Vec::new()),
                progress: StdMutex::new(Vec::new()),
                terminal,
            }
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn progress_values(&self) -> Vec<u64> {
            self.progress.lock().unwrap().clone()
        }
    }

    impl TransferListener for ChannelListener {
        fn on_queued(&self, _request: &TransferRequest) {
            self.events.lock().unwrap().push("queued".to_string());
        }

        fn on_progress(&self, request: &TransferRequest, _eta_millis: i64, _bps: u64) {
            self.events.lock().unwrap().push("progress".to_string());
            self.progress.lock().unwrap().push(request.downloaded_bytes);
        }

        fn on_completed(&self, request: &TransferRequest) {
            self.events.lock().unwrap().push("completed".to_string());
            let _ = self.terminal.send(request.clone());
        }

        fn on_failed(&self, request: &TransferRequest, code: ErrorCode) {
            self.events.lock().unwrap().push(format!("failed:{}", code));
            let _ = self.terminal.send(request.clone());
        }

        fn on_paused(&self, _request: &TransferRequest) {
            self.events.lock().unwrap().push("paused".to_string());
        }

        fn on_removed(&self, _request: &TransferRequest) {
            self.events.lock().unwrap().push("removed".to_string());
        }
    }

    fn test_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join("transfer_client_tests").join(name)
    }

    async fn served_content(
        dir_name: &str,
        contents: &[u8],
    ) -> (FileServer, String, PathBuf) {
        let dir = test_dir(dir_name);
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let source = dir.join("source.bin");
        tokio::fs::write(&source, contents).await.unwrap();

        let server = FileServer::builder()
            .authenticator(Authenticator::equals("password"))
            .build();
        server.registry().register(&source, "test_file.db").await.unwrap();
        let addr = server.start().await.unwrap();
        let url = format!("{}://{}/test_file.db", LOCAL_SCHEME, addr);
        (server, url, dir)
    }

    fn password_headers() -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        headers.insert(AUTHORIZATION_HEADER.to_string(), "password".to_string());
        headers
    }

    fn fast_client() -> TransferClient {
        TransferClient::new(
            ClientConfig::default()
                .with_concurrent_limit(2)
                .with_progress_interval(Duration::from_millis(10)),
        )
        .unwrap()
    }

    async fn wait_terminal(
        rx: &mut mpsc::UnboundedReceiver<TransferRequest>,
    ) -> TransferRequest {
        tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("timed out waiting for a terminal event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn test_download_from_local_server() {
        let contents: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let (server, url, dir) = served_content("happy_path", &contents).await;
        let destination = dir.join("downloaded.bin");
        let _ = tokio::fs::remove_file(&destination).await;

        let client = fast_client();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener = Arc::new(ChannelListener::new(tx));
        client.add_listener(listener.clone());
        client.start();

        let id = client
            .enqueue(&url, &destination, password_headers())
            .await
            .unwrap();

        let terminal = wait_terminal(&mut rx).await;
        assert_eq!(terminal.id, id);
        assert_eq!(terminal.status, TransferStatus::Completed);
        assert_eq!(terminal.downloaded_bytes, 1000);
        assert_eq!(terminal.total_bytes, 1000);

        let downloaded = tokio::fs::read(&destination).await.unwrap();
        assert_eq!(downloaded, contents);

        let events = listener.events();
        assert_eq!(events.first().map(String::as_str), Some("queued"));
        assert_eq!(events.last().map(String::as_str), Some("completed"));

        client.stop();
        server.shut_down(false).await;
    }

    #[tokio::test]
    async fn test_wrong_credential_fails_with_zero_bytes() {
        let (server, url, dir) = served_content("wrong_credential", &[9u8; 1000]).await;
        let destination = dir.join("denied.bin");
        let _ = tokio::fs::remove_file(&destination).await;

        let mut headers = BTreeMap::new();
        headers.insert(AUTHORIZATION_HEADER.to_string(), "wrong".to_string());

        let client = fast_client();
        let (tx, mut rx) = mpsc::unbounded_channel();
        client.add_listener(Arc::new(ChannelListener::new(tx)));
        client.start();

        let id = client.enqueue(&url, &destination, headers).await.unwrap();

        let terminal = wait_terminal(&mut rx).await;
        assert_eq!(terminal.id, id);
        assert_eq!(terminal.status, TransferStatus::Failed);
        assert_eq!(terminal.error, Some(ErrorCode::Unauthorized));

        // No destination bytes were ever written
        assert!(!destination.exists());

        client.stop();
        server.shut_down(false).await;
    }

    #[tokio::test]
    async fn test_resume_transfers_only_the_remainder() {
        let contents: Vec<u8> = (0..4096u32).map(|i| (i % 241) as u8).collect();
        let (server, url, dir) = served_content("resume", &contents).await;
        let destination = dir.join("resumed.bin");

        // A prior attempt left the first 1500 bytes on disk
        tokio::fs::write(&destination, &contents[..1500]).await.unwrap();

        let client = fast_client();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener = Arc::new(ChannelListener::new(tx));
        client.add_listener(listener.clone());
        client.start();

        client
            .enqueue(&url, &destination, password_headers())
            .await
            .unwrap();

        let terminal = wait_terminal(&mut rx).await;
        assert_eq!(terminal.status, TransferStatus::Completed);

        // Byte-for-byte identical to the source, so exactly 2596 bytes moved
        let downloaded = tokio::fs::read(&destination).await.unwrap();
        assert_eq!(downloaded, contents);

        // Progress never went backwards
        let progress = listener.progress_values();
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));

        client.stop();
        server.shut_down(false).await;
    }

    #[tokio::test]
    async fn test_pause_is_idempotent_and_resume_requeues() {
        let (server, url, dir) = served_content("pause_resume", &[3u8; 2000]).await;
        let destination = dir.join("paused.bin");
        let _ = tokio::fs::remove_file(&destination).await;

        // Client not started: the request stays queued under our control
        let client = fast_client();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener = Arc::new(ChannelListener::new(tx));
        client.add_listener(listener.clone());

        let id = client
            .enqueue(&url, &destination, password_headers())
            .await
            .unwrap();

        assert!(client.pause(id).await.unwrap());
        assert!(!client.pause(id).await.unwrap());
        let pause_events = listener
            .events()
            .iter()
            .filter(|e| *e == "paused")
            .count();
        assert_eq!(pause_events, 1, "idempotent pause must not emit twice");

        assert!(client.resume(id).await.unwrap());
        assert_eq!(
            client.get(id).await.unwrap().status,
            TransferStatus::Queued
        );

        // Now let the pool drain it
        client.start();
        let terminal = wait_terminal(&mut rx).await;
        assert_eq!(terminal.status, TransferStatus::Completed);

        let downloaded = tokio::fs::read(&destination).await.unwrap();
        assert_eq!(downloaded.len(), 2000);

        client.stop();
        server.shut_down(false).await;
    }

    #[tokio::test]
    async fn test_remove_discards_partial_bytes() {
        let dir = test_dir("remove_partial");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let destination = dir.join("removed.bin");
        tokio::fs::write(&destination, b"stale partial bytes").await.unwrap();

        let client = fast_client();
        let (tx, _rx) = mpsc::unbounded_channel();
        let listener = Arc::new(ChannelListener::new(tx));
        client.add_listener(listener.clone());

        let id = client
            .enqueue("http://127.0.0.1:9/never-fetched.bin", &destination, BTreeMap::new())
            .await
            .unwrap();

        assert!(client.remove(id).await.unwrap());
        assert_eq!(
            client.get(id).await.unwrap().status,
            TransferStatus::Removed
        );
        assert!(!destination.exists());
        assert!(listener.events().contains(&"removed".to_string()));
    }

    #[tokio::test]
    async fn test_enqueue_rejects_bad_urls() {
        let client = fast_client();

        let err = client
            .enqueue("not a url", "/tmp/out.bin", BTreeMap::new())
            .await
            .unwrap_err();
        let err = err.downcast::<TransferError>().unwrap();
        assert_eq!(err.code(), ErrorCode::InvalidUrl);

        let err = client
            .enqueue("ftp://example.com/file", "/tmp/out.bin", BTreeMap::new())
            .await
            .unwrap_err();
        let err = err.downcast::<TransferError>().unwrap();
        assert_eq!(err.code(), ErrorCode::InvalidUrl);
    }

    #[tokio::test]
    async fn test_enqueue_rejects_live_duplicate() {
        let client = fast_client();

        client
            .enqueue("http://example.com/file", "/tmp/dup.bin", BTreeMap::new())
            .await
            .unwrap();
        let err = client
            .enqueue("http://example.com/file", "/tmp/dup.bin", BTreeMap::new())
            .await
            .unwrap_err();
        let err = err.downcast::<TransferError>().unwrap();
        assert_eq!(err.code(), ErrorCode::DuplicateId);
    }

    #[tokio::test]
    async fn test_stop_detaches_listeners() {
        let client = fast_client();
        let (tx, _rx) = mpsc::unbounded_channel();
        client.add_listener(Arc::new(ChannelListener::new(tx)));

        client.start();
        assert!(client.is_running());
        client.stop();
        assert!(!client.is_running());

        // Enqueue after stop is still accepted; the queue outlives the pool
        client
            .enqueue("http://example.com/later", "/tmp/later.bin", BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(client.active_count().await, 1);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = ClientConfig::default().with_concurrent_limit(0);
        assert!(TransferClient::new(config).is_err());
    }
}
