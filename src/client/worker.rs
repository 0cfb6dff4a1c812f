//! Transfer worker module
//!
//! Each worker loops claiming queued requests and executing them: open the
//! source at the resume offset, stream to the destination, and surface
//! progress and terminal events. Pause and remove are observed cooperatively
//! at checkpoint boundaries.

use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::client::downloader::{
    DownloadStream, Downloader, FileServerDownloader, HttpDownloader, LOCAL_SCHEME,
};
use crate::client::manager::ClientConfig;
use crate::client::speed::SpeedEstimator;
use crate::error::TransferError;
use crate::notify::EventNotifier;
use crate::queue::{TransferQueue, TransferRequest, TransferStatus};

/// Read chunk size during streaming
const CHUNK_SIZE: usize = 8192;

/// Shared state handed to every worker task
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub queue: Arc<TransferQueue>,
    pub notifier: Arc<EventNotifier>,
    pub config: ClientConfig,
    pub file_server_downloader: Arc<FileServerDownloader>,
    pub http_downloader: Arc<HttpDownloader>,
}

/// How a transfer execution ended
enum Outcome {
    /// Every byte reached the destination
    Completed,
    /// The transfer aborted with an error
    Failed(TransferError),
    /// Pause or remove was observed at a checkpoint; `discard` says whether
    /// the partial destination must be deleted
    Stopped { discard: bool },
}

/// Worker loop: claim, execute, repeat until cancelled
pub(crate) async fn run_worker(index: usize, ctx: WorkerContext, token: CancellationToken) {
    debug!("Worker {} started", index);
    loop {
        if token.is_cancelled() {
            break;
        }
        match ctx.queue.claim_next().await {
            Some(request) => {
                debug!("Worker {} executing request {:016x}", index, request.id);
                execute_transfer(&ctx, request).await;
            }
            None => {
                tokio::select! {
                    _ = ctx.queue.wait_for_work() => {}
                    _ = token.cancelled() => break,
                }
            }
        }
    }
    debug!("Worker {} stopped", index);
}

/// Execute one claimed request to a terminal or stopped state
async fn execute_transfer(ctx: &WorkerContext, request: TransferRequest) {
    let id = request.id;

    let url = match Url::parse(&request.url) {
        Ok(url) => url,
        Err(e) => {
            fail(ctx, id, TransferError::invalid_url_with_url(e.to_string(), &request.url)).await;
            return;
        }
    };

    // Partial bytes from a prior attempt set the resume offset
    let offset = match tokio::fs::metadata(&request.destination).await {
        Ok(metadata) if metadata.is_file() => metadata.len(),
        _ => 0,
    };

    let open_result = match url.scheme() {
        LOCAL_SCHEME => {
            ctx.file_server_downloader
                .open(&url, &request.headers, offset)
                .await
        }
        "http" | "https" => ctx.http_downloader.open(&url, &request.headers, offset).await,
        other => Err(TransferError::invalid_url_with_url(
            format!("unsupported scheme '{}'", other),
            &request.url,
        )),
    };

    let stream = match open_result {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Request {:016x} failed to open source: {}", id, e);
            fail(ctx, id, e).await;
            return;
        }
    };

    match stream_to_destination(ctx, &request, stream, offset).await {
        Outcome::Completed => {
            if let Some(snapshot) = ctx.queue.mark_completed(id).await {
                info!(
                    "Request {:016x} completed ({} bytes)",
                    id, snapshot.downloaded_bytes
                );
                ctx.notifier.emit_completed(&snapshot);
            } else {
                // Lease was invalidated as the last bytes landed
                cleanup_if_removed(ctx, id, &request).await;
            }
        }
        Outcome::Failed(e) => {
            warn!("Request {:016x} failed: {}", id, e);
            fail(ctx, id, e).await;
        }
        Outcome::Stopped { discard } => {
            if discard {
                discard_destination(&request).await;
            }
            debug!(
                "Request {:016x} stopped at checkpoint (discard: {})",
                id, discard
            );
        }
    }
}

/// Stream the opened source into the destination file
async fn stream_to_destination(
    ctx: &WorkerContext,
    request: &TransferRequest,
    stream: DownloadStream,
    probed_offset: u64,
) -> Outcome {
    let id = request.id;
    let total = stream.total_bytes;
    let mut downloaded = stream.accepted_offset;
    let mut reader = stream.reader;

    let file = match tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .open(&request.destination)
        .await
    {
        Ok(file) => file,
        Err(e) => {
            return Outcome::Failed(TransferError::io_error_full(
                "failed to open destination",
                request.destination.display().to_string(),
                e.to_string(),
            ))
        }
    };

    // A source that ignored the range request restarts the file
    if stream.accepted_offset < probed_offset {
        if let Err(e) = file.set_len(stream.accepted_offset).await {
            return Outcome::Failed(TransferError::io_error_full(
                "failed to truncate destination",
                request.destination.display().to_string(),
                e.to_string(),
            ));
        }
    }

    let mut writer = BufWriter::new(file);
    if let Err(e) = writer
        .seek(std::io::SeekFrom::Start(downloaded))
        .await
    {
        return Outcome::Failed(TransferError::io_error_full(
            "failed to seek destination",
            request.destination.display().to_string(),
            e.to_string(),
        ));
    }

    ctx.queue.update_progress(id, downloaded, total).await;
    let mut estimator = SpeedEstimator::new();
    estimator.record(downloaded);

    let mut buffer = [0u8; CHUNK_SIZE];
    let mut last_checkpoint = Instant::now();

    let outcome = loop {
        let read = match reader.read(&mut buffer).await {
            Ok(read) => read,
            Err(e) => {
                break Outcome::Failed(TransferError::network_error_full(
                    "read from source failed",
                    request.url.clone(),
                    e.to_string(),
                ))
            }
        };

        if read == 0 {
            if total >= 0 && downloaded < total as u64 {
                // Short body: the source closed before the announced length
                break Outcome::Failed(TransferError::network_error_full(
                    "source closed before the transfer completed",
                    request.url.clone(),
                    format!("{} of {} bytes", downloaded, total),
                ));
            }
            break Outcome::Completed;
        }

        if let Err(e) = writer.write_all(&buffer[..read]).await {
            break Outcome::Failed(TransferError::io_error_full(
                "write to destination failed",
                request.destination.display().to_string(),
                e.to_string(),
            ));
        }
        downloaded += read as u64;

        // Checkpoint: persist progress, emit, and observe pause/remove
        if last_checkpoint.elapsed() >= ctx.config.progress_interval {
            last_checkpoint = Instant::now();
            if let Err(e) = writer.flush().await {
                break Outcome::Failed(TransferError::io_error_full(
                    "flush to destination failed",
                    request.destination.display().to_string(),
                    e.to_string(),
                ));
            }

            match ctx.queue.status(id).await {
                Some(TransferStatus::Downloading) => {
                    if let Some((effective, known_total)) =
                        ctx.queue.update_progress(id, downloaded, total).await
                    {
                        estimator.record(effective);
                        if let Some(snapshot) = ctx.queue.get(id).await {
                            ctx.notifier.emit_progress(
                                &snapshot,
                                estimator.eta_millis(effective, known_total),
                                estimator.bytes_per_second(),
                            );
                        }
                    }
                }
                Some(TransferStatus::Paused) => break Outcome::Stopped { discard: false },
                _ => break Outcome::Stopped { discard: true },
            }
        }
    };

    // Leave partial bytes in place on every path except remove; they are the
    // resume state
    if let Err(e) = writer.flush().await {
        error!(
            "Failed to flush destination '{}': {}",
            request.destination.display(),
            e
        );
    }

    if matches!(outcome, Outcome::Completed | Outcome::Failed(_)) {
        ctx.queue.update_progress(id, downloaded, total).await;
    }
    outcome
}

/// Mark a request failed and emit the failure event
async fn fail(ctx: &WorkerContext, id: u64, error: TransferError) {
    let code = error.code();
    if let Some(snapshot) = ctx.queue.mark_failed(id, code).await {
        ctx.notifier.emit_failed(&snapshot, code);
    } else {
        // Pause or remove won the race; no terminal event
        if let Some(request) = ctx.queue.get(id).await {
            cleanup_if_removed(ctx, id, &request).await;
        }
    }
}

/// Delete partial bytes when the request was removed underneath the worker
async fn cleanup_if_removed(ctx: &WorkerContext, id: u64, request: &TransferRequest) {
    if ctx.queue.status(id).await == Some(TransferStatus::Removed) {
        discard_destination(request).await;
    }
}

/// Best-effort deletion of the destination file
async fn discard_destination(request: &TransferRequest) {
    match tokio::fs::remove_file(&request.destination).await {
        Ok(()) => debug!(
            "Discarded partial destination '{}'",
            request.destination.display()
        ),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            "Failed to discard destination '{}': {}",
            request.destination.display(),
            e
        ),
    }
}
