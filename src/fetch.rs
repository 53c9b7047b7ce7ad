use async_trait::async_trait;

use crate::{
    extract::{Extractor, TransferRequest},
    ffmpeg::Transcoder,
    job::FetchJob,
    naming,
    outcome::{FetchError, FetchOutcome, Notice},
    select,
};

/// Fetches a single job. Implementations must be safe to call concurrently
/// and must never fail: every error ends up in the returned outcome.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch_one(&self, job: &FetchJob) -> FetchOutcome;
}

/// `Fetch` implementation that resolves, selects and transfers through an
/// `Extractor`. The transcoder is probed once by the caller and shared by
/// every job.
pub struct MediaFetcher<E> {
    extractor: E,
    transcoder: Option<Transcoder>,
}

impl<E: Extractor> MediaFetcher<E> {
    pub fn new(extractor: E, transcoder: Option<Transcoder>) -> Self {
        Self {
            extractor,
            transcoder,
        }
    }

    pub fn extractor(&self) -> &E {
        &self.extractor
    }

    async fn try_fetch(&self, job: &FetchJob) -> Result<FetchOutcome, FetchError> {
        let info = self.extractor.resolve(&job.id).await?;
        debug!("Resolved {} to \"{}\"", job.id, info.title);

        let mut selection = select::choose(&info.formats, &job.params, self.transcoder.is_some())?;
        let stem = naming::output_stem(&info.title, job.position, job.position_width);
        tokio::fs::create_dir_all(&job.params.target_dir)
            .await
            .map_err(|e| {
                FetchError::TransferFailed(format!(
                    "could not create {}: {}",
                    job.params.target_dir.display(),
                    e
                ))
            })?;

        let mut request = TransferRequest {
            url: job.id.clone(),
            format: selection.format.clone(),
            output: job.params.target_dir.join(stem),
            post: selection.post.clone(),
        };

        let path = match self.extractor.transfer(&request).await {
            Ok(path) => path,
            Err(FetchError::TranscodeUnavailable(detail)) if request.post.needs_transcoder() => {
                warn!(
                    "Transcoding failed for {} ({}), retrying with a single-file format",
                    job.id, detail
                );
                selection = select::choose(&info.formats, &job.params, false)?;
                selection
                    .notices
                    .retain(|n| !matches!(n, Notice::TranscodeUnavailable { .. }));
                selection
                    .notices
                    .push(Notice::TranscodeUnavailable { detail });
                request.format = selection.format.clone();
                request.post = selection.post.clone();
                self.extractor.transfer(&request).await?
            }
            Err(e) => return Err(e),
        };

        let bytes = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!("{}: could not read size of {}: {}", job.id, path.display(), e);
                0
            }
        };

        for notice in &selection.notices {
            warn!("{}: {}", job.id, notice);
        }

        Ok(FetchOutcome::Succeeded {
            id: job.id.clone(),
            title: info.title,
            path,
            bytes,
            notices: selection.notices,
        })
    }
}

#[async_trait]
impl<E: Extractor> Fetch for MediaFetcher<E> {
    async fn fetch_one(&self, job: &FetchJob) -> FetchOutcome {
        debug!("Fetching {}", job.id);
        match self.try_fetch(job).await {
            Ok(outcome) => {
                info!("{}", outcome.message());
                outcome
            }
            Err(e) => {
                warn!("Could not fetch {}: {}", job.id, e);
                FetchOutcome::failed(job, e)
            }
        }
    }
}
