//! # ytfetch-rs
//!
//! This crate downloads YouTube and Dailymotion videos, audio tracks and
//! whole playlists. Resolving and transferring media is delegated to
//! [yt-dlp](https://github.com/yt-dlp/yt-dlp), and merging or converting to
//! ffmpeg when it is installed. What the crate adds on top is the batch
//! logic: playlists are fetched in fixed-size windows, every video yields
//! exactly one outcome, and progress is reported after each window.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::{path::PathBuf, sync::Arc};
//!
//! use ytfetch_rs::{
//!     batch::{self, CancelSignal},
//!     ffmpeg,
//!     fetch::MediaFetcher,
//!     job::{BatchPlan, FetchParams, MediaKind, Quality},
//!     request::{self, DownloadRequest},
//!     ytdlp::YtDlp,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     // Look for ffmpeg once, before any job is built
//!     let transcoder = ffmpeg::probe(&PathBuf::from("."));
//!     let fetcher = Arc::new(MediaFetcher::new(
//!         YtDlp::new("yt-dlp", transcoder.clone()),
//!         transcoder,
//!     ));
//!
//!     let request = DownloadRequest {
//!         url: "https://www.youtube.com/playlist?list=...".to_string(),
//!         params: FetchParams {
//!             target_dir: PathBuf::from("downloads"),
//!             kind: MediaKind::Video,
//!             quality: Quality::Height(720),
//!             container: "mp4".to_string(),
//!         },
//!     };
//!     let jobs = request::build_jobs(fetcher.extractor(), &request).await.unwrap();
//!
//!     // Three videos at a time
//!     let plan = BatchPlan::new(jobs, 3).unwrap();
//!     let report = batch::run(plan, fetcher, &CancelSignal::new(), |batch| {
//!         println!("{} of {} batches done", batch.window, batch.windows);
//!     })
//!     .await;
//!
//!     println!("{} saved, {} failed", report.tally.succeeded, report.tally.failed);
//! }
//! ```

#![forbid(unsafe_code)]
#[macro_use]
extern crate log;

pub mod batch;
pub mod extract;
pub mod fetch;
pub mod ffmpeg;
pub mod job;
pub mod naming;
pub mod outcome;
pub mod request;
pub mod select;
pub mod stats;
pub mod ytdlp;
