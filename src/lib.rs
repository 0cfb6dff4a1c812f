//! rust-file-transfer
//!
//! A resumable file-transfer engine with a local file server, download
//! queue, and progress events.

pub mod cli;
pub mod client;
pub mod error;
pub mod notify;
pub mod protocol;
pub mod queue;
pub mod server;

pub use error::{ErrorCode, TransferError};

pub use protocol::{FileRequest, FileResponse, ResponseStatus, AUTHORIZATION_HEADER};
pub use server::{
    Authenticator, ContentEntry, ContentRegistry, FileServer, FileServerBuilder, ServerState,
};
pub use queue::{request_id, TransferQueue, TransferRequest, TransferStatus};
pub use notify::{EventNotifier, ListenerId, TransferListener};
pub use client::{
    ClientConfig, DownloadStream, Downloader, FileServerDownloader, HttpDownloader,
    SpeedEstimator, TransferClient, LOCAL_SCHEME,
};
pub use cli::{CliArgs, Command, FetchConfig, ProgressDisplay, TransferStats};
