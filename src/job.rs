use std::{fmt, num::NonZeroUsize, path::PathBuf, slice::Chunks, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    /// Container used when the caller does not ask for one.
    pub fn default_container(&self) -> &'static str {
        match self {
            MediaKind::Video => "mp4",
            MediaKind::Audio => "mp3",
        }
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "video" | "v" => Ok(MediaKind::Video),
            "audio" | "a" => Ok(MediaKind::Audio),
            other => Err(format!("unknown media kind '{}', expected video or audio", other)),
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
        }
    }
}

/// Requested video quality. `Height` is an upper bound: the closest
/// available resolution at or below it is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Best,
    Height(u32),
}

impl Quality {
    pub fn limit(&self) -> u32 {
        match self {
            Quality::Best => u32::MAX,
            Quality::Height(h) => *h,
        }
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        if s == "best" || s == "highest" {
            return Ok(Quality::Best);
        }

        match s.trim_end_matches('p').parse::<u32>() {
            Ok(0) => Err("quality height must be greater than 0".to_string()),
            Ok(h) => Ok(Quality::Height(h)),
            Err(_) => Err(format!("invalid quality '{}', expected best or a height like 720", s)),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quality::Best => write!(f, "best"),
            Quality::Height(h) => write!(f, "{}p", h),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchParams {
    pub target_dir: PathBuf,
    pub kind: MediaKind,
    pub quality: Quality,
    /// Target container for video (`mp4`, `webm`, `mkv`) or codec for audio
    /// (`mp3`, `m4a`, `opus`).
    pub container: String,
}

/// One queued download. Jobs are never mutated after they are handed to a
/// `BatchPlan`; workers receive their own clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchJob {
    pub id: String,
    /// 1-based position in the playlist, `None` for a single video.
    pub position: Option<usize>,
    /// Number of digits the position is padded to in the filename.
    pub position_width: usize,
    pub params: FetchParams,
}

impl FetchJob {
    pub fn single(id: impl Into<String>, params: FetchParams) -> Self {
        Self {
            id: id.into(),
            position: None,
            position_width: 0,
            params,
        }
    }

    pub fn playlist_item(
        id: impl Into<String>,
        position: usize,
        total: usize,
        params: FetchParams,
    ) -> Self {
        Self {
            id: id.into(),
            position: Some(position),
            position_width: total.to_string().len().max(2),
            params,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,
}

/// Ordered jobs split into fixed-size windows. Windows run one after the
/// other; the jobs inside a window run concurrently.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    jobs: Vec<FetchJob>,
    window: NonZeroUsize,
}

impl BatchPlan {
    pub fn new(jobs: Vec<FetchJob>, concurrency: usize) -> Result<Self, PlanError> {
        let window = NonZeroUsize::new(concurrency).ok_or(PlanError::ZeroConcurrency)?;
        Ok(Self { jobs, window })
    }

    pub fn jobs(&self) -> &[FetchJob] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn window_size(&self) -> usize {
        self.window.get()
    }

    pub fn window_count(&self) -> usize {
        self.jobs.len().div_ceil(self.window.get())
    }

    pub fn windows(&self) -> Chunks<'_, FetchJob> {
        self.jobs.chunks(self.window.get())
    }
}
