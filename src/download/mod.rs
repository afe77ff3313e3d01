/// Package transfer for the depot updater
///
/// This module provides:
/// - Streamed HTTP downloads with progress reporting
/// - Delta transfer against a local baseline through an external tool
/// - Checksum verification before a file is made visible
/// - Cleanup of superseded package files and sidecars
mod client;
mod delta;
mod http_file_downloader;
mod manager;
mod options;
mod progress;

pub use client::{AttohttpcClient, DEFAULT_TIMEOUT, HttpClient, HttpResponse};
pub use delta::{DeltaIndexBuilder, DeltaProgress, DeltaTransfer, parse_progress};
pub use http_file_downloader::HttpFileDownloader;
pub use manager::{DownloadManager, FetchMethod};
pub use options::{DownloadOptions, MAX_DOWNLOAD_SIZE};
pub use progress::{IndicatifProgressReporter, ProgressReporter, ThroughputLogger, reporter_for};
