//! Download client
//!
//! The worker pool that drains the transfer queue, the source abstraction it
//! downloads through, and the facade callers drive.

pub mod downloader;
pub mod manager;
pub mod speed;
pub mod worker;

pub use downloader::{DownloadStream, Downloader, FileServerDownloader, HttpDownloader, LOCAL_SCHEME};
pub use manager::{ClientConfig, TransferClient};
pub use speed::SpeedEstimator;
