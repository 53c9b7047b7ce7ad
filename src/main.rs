use std::{path::PathBuf, process::ExitCode, sync::Arc};

use clap::Parser;
use log::{error, info, warn};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    sync::{mpsc, watch},
};
use tokio_stream::{wrappers::UnboundedReceiverStream, StreamExt};
use ytfetch_rs::{
    batch::{self, CancelSignal},
    fetch::MediaFetcher,
    ffmpeg,
    job::{BatchPlan, FetchParams, MediaKind, Quality},
    outcome::{BatchReport, FinalReport},
    request::{self, DownloadRequest},
    stats::{format_bytes, BatchStatistics},
    ytdlp::YtDlp,
};

/// Download YouTube and Dailymotion videos, audio and playlists.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Video or playlist URL. Prompts for URLs when omitted.
    url: Option<String>,

    /// Directory the files are saved to
    #[arg(short, long, env = "YTFETCH_OUTPUT", default_value = ".")]
    output: PathBuf,

    /// `video` or `audio`
    #[arg(short, long, env = "YTFETCH_KIND", default_value = "video")]
    kind: MediaKind,

    /// `best` or a maximum height such as 720
    #[arg(short, long, env = "YTFETCH_QUALITY", default_value = "best")]
    quality: Quality,

    /// Container (mp4, webm, mkv) or audio codec (mp3, m4a, opus)
    #[arg(short, long, env = "YTFETCH_FORMAT")]
    format: Option<String>,

    /// Videos downloaded at the same time
    #[arg(short = 'j', long, env = "YTFETCH_CONCURRENCY", default_value_t = 3)]
    concurrency: usize,

    /// yt-dlp executable
    #[arg(long, env = "YT_DLP", default_value = "yt-dlp")]
    yt_dlp: PathBuf,

    /// Directory searched for ffmpeg before PATH
    #[arg(long, env = "FFMPEG_DIR", default_value = ".")]
    ffmpeg_dir: PathBuf,

    /// Print the final report as JSON
    #[arg(long)]
    json: bool,
}

impl Args {
    fn params(&self) -> FetchParams {
        FetchParams {
            target_dir: self.output.clone(),
            kind: self.kind,
            quality: self.quality,
            container: self
                .format
                .clone()
                .unwrap_or_else(|| self.kind.default_container().to_string())
                .to_ascii_lowercase(),
        }
    }
}

type Fetcher = MediaFetcher<YtDlp>;

/// Cancel signal of the download in progress, if any.
type ActiveDownload = watch::Sender<Option<CancelSignal>>;

/// The first Ctrl-C during a download stops it after the current batch.
/// A second one, or one while nothing is downloading, exits right away.
fn handle_interrupts(active: watch::Receiver<Option<CancelSignal>>) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            let current = active.borrow().clone();
            match current {
                Some(cancel) if cancel.cancel_once() => {
                    warn!("Stopping after the current batch, press Ctrl-C again to quit now")
                }
                _ => {
                    println!();
                    warn!("Interrupted");
                    std::process::exit(130);
                }
            }
        }
    });
}

async fn print_reports(rx: mpsc::UnboundedReceiver<BatchReport>) {
    let mut reports = UnboundedReceiverStream::new(rx);
    let mut stats = BatchStatistics::new();

    while let Some(report) = reports.next().await {
        for outcome in &report.outcomes {
            println!("\x1b[2K\r{}", outcome.message());
        }
        stats.update(&report);
        stats.print();
    }
    println!();
}

async fn download(
    args: &Args,
    fetcher: &Arc<Fetcher>,
    active: &ActiveDownload,
    url: String,
) -> FinalReport {
    let request = DownloadRequest {
        url,
        params: args.params(),
    };

    let jobs = match request::build_jobs(fetcher.extractor(), &request).await {
        Ok(jobs) => jobs,
        Err(e) => {
            error!("{}", e);
            return FinalReport::aborted(e);
        }
    };
    let plan = match BatchPlan::new(jobs, args.concurrency) {
        Ok(plan) => plan,
        Err(e) => {
            error!("{}", e);
            return FinalReport::aborted(e);
        }
    };
    info!(
        "Downloading {} item(s) in {} batch(es)",
        plan.len(),
        plan.window_count()
    );

    let cancel = CancelSignal::new();
    active.send_replace(Some(cancel.clone()));

    let (tx, rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_reports(rx));
    let report = batch::run(plan, Arc::clone(fetcher), &cancel, move |r| {
        // tx drops with this closure, which ends the printer
        let _ = tx.send(r);
    })
    .await;

    active.send_replace(None);
    if let Err(e) = printer.await {
        warn!("Progress printer stopped: {}", e);
    }

    report
}

fn summarize(report: &FinalReport, json: bool) {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(s) => println!("{}", s),
            Err(e) => error!("Could not serialize report: {}", e),
        }
        return;
    }

    if let Some(e) = &report.error {
        println!("Nothing downloaded: {}", e);
        return;
    }

    println!(
        "Done: {} saved, {} failed, {} total",
        report.tally.succeeded,
        report.tally.failed,
        format_bytes(report.tally.bytes)
    );
    if report.cancelled {
        println!("Cancelled, {} item(s) not started", report.skipped.len());
    }
}

/// Prompts for URLs until `exit` or end of input.
async fn interactive(args: &Args, fetcher: &Arc<Fetcher>, active: &ActiveDownload) -> bool {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut clean = true;

    loop {
        let _ = stdout
            .write_all(b"Enter a video or playlist URL (or 'exit' to quit): ")
            .await;
        let _ = stdout.flush().await;

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Could not read input: {}", e);
                return false;
            }
        };
        let url = line.trim();
        if url.is_empty() {
            continue;
        }
        if url.eq_ignore_ascii_case("exit") {
            println!("Exiting.");
            break;
        }

        let report = download(args, fetcher, active, url.to_string()).await;
        summarize(&report, args.json);
        clean &= report.is_clean();
    }

    clean
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let transcoder = ffmpeg::probe(&args.ffmpeg_dir);
    match &transcoder {
        Some(t) => match t.version().await {
            Ok(version) => info!("Using {}", version),
            Err(e) => warn!("{} did not run: {}", t.path.display(), e),
        },
        None => warn!("ffmpeg not found, merging and audio conversion are disabled"),
    }

    let fetcher = Arc::new(MediaFetcher::new(
        YtDlp::new(&args.yt_dlp, transcoder.clone()),
        transcoder,
    ));

    let (active, watching) = watch::channel(None);
    handle_interrupts(watching);

    let clean = match args.url.clone() {
        Some(url) => {
            let report = download(&args, &fetcher, &active, url).await;
            summarize(&report, args.json);
            report.is_clean()
        }
        None => interactive(&args, &fetcher, &active).await,
    };

    if clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
