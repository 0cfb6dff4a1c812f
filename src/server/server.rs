//! File server module
//!
//! Binds a local address, accepts connections, and serves one registered
//! content span per connection over the wire protocol.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::protocol::{
    new_session_id, read_request, write_response, FileRequest, FileResponse, ResponseStatus,
};
use crate::server::{Authenticator, ContentRegistry};
use crate::error::TransferError;

/// Time allowed for a client to deliver its request frame
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Chunk size for streaming content to a connection
const STREAM_CHUNK_SIZE: usize = 8192;

/// Lifecycle state of a server instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting,
    Listening,
}

/// Builder for a [`FileServer`]
pub struct FileServerBuilder {
    bind_addr: SocketAddr,
    authenticator: Authenticator,
    registry: Option<Arc<ContentRegistry>>,
    clear_registry_on_shutdown: bool,
}

impl FileServerBuilder {
    /// Create a builder with defaults: loopback with an OS-assigned port and
    /// a deny-all authenticator
    pub fn new() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            authenticator: Authenticator::deny_all(),
            registry: None,
            clear_registry_on_shutdown: false,
        }
    }

    /// Set the address to bind. Port 0 asks the OS for a free port.
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the authorization predicate
    pub fn authenticator(mut self, authenticator: Authenticator) -> Self {
        self.authenticator = authenticator;
        self
    }

    /// Share an existing registry instead of creating a fresh one
    pub fn registry(mut self, registry: Arc<ContentRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Empty the registry when the server shuts down
    pub fn clear_registry_on_shutdown(mut self, clear: bool) -> Self {
        self.clear_registry_on_shutdown = clear;
        self
    }

    /// Build the server
    pub fn build(self) -> FileServer {
        FileServer {
            registry: self.registry.unwrap_or_default(),
            authenticator: self.authenticator,
            bind_addr: self.bind_addr,
            clear_registry_on_shutdown: self.clear_registry_on_shutdown,
            state: Mutex::new(ServerState::Stopped),
            local_addr: Mutex::new(None),
            token: Mutex::new(None),
            accept_handle: Mutex::new(None),
        }
    }
}

impl Default for FileServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Local file server serving registered content over the wire protocol
pub struct FileServer {
    registry: Arc<ContentRegistry>,
    authenticator: Authenticator,
    bind_addr: SocketAddr,
    clear_registry_on_shutdown: bool,
    state: Mutex<ServerState>,
    local_addr: Mutex<Option<SocketAddr>>,
    token: Mutex<Option<CancellationToken>>,
    accept_handle: Mutex<Option<JoinHandle<()>>>,
}

impl FileServer {
    /// Start building a server
    pub fn builder() -> FileServerBuilder {
        FileServerBuilder::new()
    }

    /// The registry this server resolves content names against
    pub fn registry(&self) -> Arc<ContentRegistry> {
        self.registry.clone()
    }

    /// Current lifecycle state
    pub fn state(&self) -> ServerState {
        *self.state.lock().unwrap()
    }

    /// Resolved listen address, available once the server is listening
    pub fn address(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap()
    }

    /// Bind the listen address and start accepting connections.
    ///
    /// Returns the resolved address (meaningful with port 0). Fails with
    /// `BindError` if the address is in use or the server already runs.
    pub async fn start(&self) -> Result<SocketAddr> {
        {
            let mut state = self.state.lock().unwrap();
            if *state != ServerState::Stopped {
                return Err(TransferError::bind_error("server is already running").into());
            }
            *state = ServerState::Starting;
        }

        let listener = match TcpListener::bind(self.bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                *self.state.lock().unwrap() = ServerState::Stopped;
                return Err(TransferError::bind_error_full(
                    "failed to bind listen address",
                    self.bind_addr.to_string(),
                    e.to_string(),
                )
                .into());
            }
        };
        let addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                *self.state.lock().unwrap() = ServerState::Stopped;
                return Err(TransferError::bind_error_full(
                    "failed to resolve bound address",
                    self.bind_addr.to_string(),
                    e.to_string(),
                )
                .into());
            }
        };

        let token = CancellationToken::new();
        let handle = tokio::spawn(accept_loop(
            listener,
            self.registry.clone(),
            self.authenticator.clone(),
            token.clone(),
        ));

        *self.local_addr.lock().unwrap() = Some(addr);
        *self.token.lock().unwrap() = Some(token);
        *self.accept_handle.lock().unwrap() = Some(handle);
        *self.state.lock().unwrap() = ServerState::Listening;

        info!("File server listening on {}", addr);
        Ok(addr)
    }

    /// Stop accepting connections and cancel the active ones.
    ///
    /// When `clear_registry` (or the builder's shutdown flag) is set, the
    /// content registry is emptied as well. Idempotent.
    pub async fn shut_down(&self, clear_registry: bool) {
        let token = self.token.lock().unwrap().take();
        if let Some(token) = token {
            token.cancel();
        }

        let handle = self.accept_handle.lock().unwrap().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Accept loop ended abnormally: {}", e);
            }
        }

        *self.local_addr.lock().unwrap() = None;
        *self.state.lock().unwrap() = ServerState::Stopped;

        if clear_registry || self.clear_registry_on_shutdown {
            self.registry.clear().await;
        }
        info!("File server stopped");
    }
}

/// Accept connections until cancelled. Connection failures never stop the
/// loop.
async fn accept_loop(
    listener: TcpListener,
    registry: Arc<ContentRegistry>,
    authenticator: Authenticator,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                debug!("Accept loop cancelled");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        debug!("Accepted connection from {}", peer);
                        let registry = registry.clone();
                        let authenticator = authenticator.clone();
                        let connection_token = token.child_token();
                        tokio::spawn(async move {
                            if let Err(e) =
                                handle_connection(stream, peer, registry, authenticator, connection_token).await
                            {
                                debug!("Connection from {} ended with error: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                    }
                }
            }
        }
    }
}

/// Serve a single request/response exchange on one connection
async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<ContentRegistry>,
    authenticator: Authenticator,
    token: CancellationToken,
) -> Result<()> {
    let session_id = new_session_id();

    let request = match timeout(REQUEST_TIMEOUT, read_request(&mut stream)).await {
        Ok(Ok(request)) => request,
        Ok(Err(e)) => {
            debug!("[{}] Bad request frame from {}: {}", session_id, peer, e);
            let response = FileResponse::failure(ResponseStatus::BadRequest, &session_id);
            let _ = write_response(&mut stream, &response).await;
            return Ok(());
        }
        Err(_) => {
            debug!("[{}] Request timed out from {}", session_id, peer);
            return Ok(());
        }
    };

    debug!(
        "[{}] Request from {} for '{}' (range {}-{:?})",
        session_id, peer, request.name, request.range_start, request.range_end
    );

    // Authorization gate. The credential value stays out of the logs.
    if !authenticator.authorize(request.authorization(), &request) {
        info!(
            "[{}] Rejected unauthorized request for '{}' from {}",
            session_id, request.name, peer
        );
        let response = FileResponse::failure(ResponseStatus::Unauthorized, &session_id);
        write_response(&mut stream, &response).await?;
        return Ok(());
    }

    let entry = match registry.resolve(&request.name).await {
        Ok(entry) => entry,
        Err(_) => {
            info!(
                "[{}] No content registered under '{}' for {}",
                session_id, request.name, peer
            );
            let response = FileResponse::failure(ResponseStatus::NotFound, &session_id);
            write_response(&mut stream, &response).await?;
            return Ok(());
        }
    };

    let (start, span) = match request.byte_span(entry.length) {
        Ok(span) => span,
        Err(e) => {
            info!("[{}] Invalid range from {}: {}", session_id, peer, e);
            let response = FileResponse::failure(ResponseStatus::RangeNotSatisfiable, &session_id);
            write_response(&mut stream, &response).await?;
            return Ok(());
        }
    };

    let response = FileResponse::ok(span, &session_id);
    write_response(&mut stream, &response).await?;

    stream_span(&mut stream, &request, &entry.source_path, start, span, &token).await?;

    info!(
        "[{}] Served '{}' bytes {}..{} to {}",
        session_id,
        request.name,
        start,
        start + span,
        peer
    );
    Ok(())
}

/// Stream `span` bytes starting at `start` to the connection.
///
/// Failure mid-stream aborts the connection without a trailing status; the
/// client detects the short body.
async fn stream_span(
    stream: &mut TcpStream,
    request: &FileRequest,
    path: &std::path::Path,
    start: u64,
    span: u64,
    token: &CancellationToken,
) -> Result<()> {
    let mut file = tokio::fs::File::open(path).await.map_err(|e| {
        error!("Content file '{}' became unreadable: {}", request.name, e);
        TransferError::io_error_full(
            "failed to open content file",
            path.display().to_string(),
            e.to_string(),
        )
    })?;
    file.seek(std::io::SeekFrom::Start(start)).await?;

    let mut remaining = span;
    let mut buffer = [0u8; STREAM_CHUNK_SIZE];
    while remaining > 0 {
        if token.is_cancelled() {
            debug!("Streaming of '{}' cancelled by shutdown", request.name);
            return Ok(());
        }

        let want = remaining.min(buffer.len() as u64) as usize;
        let read = file.read(&mut buffer[..want]).await?;
        if read == 0 {
            // Source shrank underneath us; abort so the client sees a short body
            return Err(TransferError::io_error_with_path(
                "content file ended before the requested span",
                path.display().to_string(),
            )
            .into());
        }
        stream.write_all(&buffer[..read]).await?;
        remaining -= read as u64;
    }
    stream.flush().await?;
    Ok(())
}
