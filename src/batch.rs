use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use chrono::Utc;
use futures::{stream::FuturesOrdered, StreamExt};

use crate::{
    fetch::Fetch,
    job::{BatchPlan, FetchJob},
    outcome::{BatchReport, FetchError, FetchOutcome, FinalReport, Tally},
};

/// Cooperative stop flag. Checked before each window starts; a window that
/// is already running always drains.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Cancels and returns `true`, unless this signal was already cancelled.
    pub fn cancel_once(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs every job of `plan`, one window at a time.
///
/// Jobs inside a window run as separate tasks; the next window only starts
/// once all of them have finished. `on_batch_complete` is called on the
/// calling task after each window, in window order. A failed job never
/// stops its siblings or later windows, only `cancel` does.
///
/// Known limitation: this is a window barrier, not a sliding pool. One slow
/// job holds back the whole next window.
pub async fn run<F, C>(
    plan: BatchPlan,
    fetcher: Arc<F>,
    cancel: &CancelSignal,
    mut on_batch_complete: C,
) -> FinalReport
where
    F: Fetch + ?Sized + 'static,
    C: FnMut(BatchReport),
{
    let started_at = Utc::now();
    let windows = plan.window_count();
    let mut tally = Tally::default();
    let mut outcomes = Vec::with_capacity(plan.len());
    let mut skipped = Vec::new();
    let mut cancelled = false;

    for (idx, window) in plan.windows().enumerate() {
        if cancel.is_cancelled() {
            let remaining = &plan.jobs()[idx * plan.window_size()..];
            info!(
                "Cancelled before window {} of {}, skipping {} jobs",
                idx + 1,
                windows,
                remaining.len()
            );
            skipped.extend(
                remaining
                    .iter()
                    .map(|job| FetchOutcome::failed(job, FetchError::Cancelled)),
            );
            cancelled = true;
            break;
        }

        debug!("Starting window {} of {} ({} jobs)", idx + 1, windows, window.len());
        let batch = run_window(window, &fetcher).await;
        for outcome in &batch {
            tally.record(outcome);
        }
        outcomes.extend(batch.iter().cloned());

        on_batch_complete(BatchReport {
            window: idx + 1,
            windows,
            tally: tally.clone(),
            outcomes: batch,
        });
    }

    FinalReport {
        started_at,
        finished_at: Utc::now(),
        tally,
        outcomes,
        skipped,
        cancelled,
        error: None,
    }
}

async fn run_window<F>(window: &[FetchJob], fetcher: &Arc<F>) -> Vec<FetchOutcome>
where
    F: Fetch + ?Sized + 'static,
{
    // FuturesOrdered yields in push order, so results line up with `window`
    let tasks = window
        .iter()
        .map(|job| {
            let fetcher = Arc::clone(fetcher);
            let job = job.clone();
            tokio::spawn(async move { fetcher.fetch_one(&job).await })
        })
        .collect::<FuturesOrdered<_>>();
    let joined: Vec<_> = tasks.collect().await;

    window
        .iter()
        .zip(joined)
        .map(|(job, result)| match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Worker for {} did not finish: {}", job.id, e);
                FetchOutcome::failed(
                    job,
                    FetchError::TransferFailed(format!("worker task failed: {}", e)),
                )
            }
        })
        .collect()
}
