use std::{fmt, path::PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::job::FetchJob;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FetchError {
    #[error("could not resolve video: {0}")]
    ResolutionFailed(String),
    #[error("no matching stream: {0}")]
    StreamUnavailable(String),
    #[error("transcoder unavailable: {0}")]
    TranscodeUnavailable(String),
    #[error("transfer failed: {0}")]
    TransferFailed(String),
    #[error("cancelled before start")]
    Cancelled,
}

/// Warning attached to a successful fetch when the request could not be
/// honoured exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    QualityFallback { requested: u32, selected: u32 },
    TranscodeUnavailable { detail: String },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::QualityFallback {
                requested,
                selected,
            } => write!(f, "{}p not available, saved {}p", requested, selected),
            Notice::TranscodeUnavailable { detail } => {
                write!(f, "ffmpeg unavailable, {}", detail)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchOutcome {
    Succeeded {
        id: String,
        title: String,
        path: PathBuf,
        bytes: u64,
        notices: Vec<Notice>,
    },
    Failed {
        id: String,
        error: FetchError,
    },
}

impl FetchOutcome {
    pub fn failed(job: &FetchJob, error: FetchError) -> Self {
        FetchOutcome::Failed {
            id: job.id.clone(),
            error,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            FetchOutcome::Succeeded { id, .. } | FetchOutcome::Failed { id, .. } => id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Succeeded { .. })
    }

    /// Human readable line for the presentation layer.
    pub fn message(&self) -> String {
        match self {
            FetchOutcome::Succeeded {
                title,
                path,
                notices,
                ..
            } => {
                let mut msg = format!("Saved \"{}\" to {}", title, path.display());
                if !notices.is_empty() {
                    let notes: Vec<_> = notices.iter().map(|n| n.to_string()).collect();
                    msg.push_str(&format!(" ({})", notes.join("; ")));
                }
                msg
            }
            FetchOutcome::Failed { id, error } => format!("Failed {}: {}", id, error),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub bytes: u64,
}

impl Tally {
    pub fn record(&mut self, outcome: &FetchOutcome) {
        self.attempted += 1;
        match outcome {
            FetchOutcome::Succeeded { bytes, .. } => {
                self.succeeded += 1;
                self.bytes += bytes;
            }
            FetchOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// Sent to the caller after every window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    /// 1-based index of the window that just finished.
    pub window: usize,
    pub windows: usize,
    /// Running totals including this window.
    pub tally: Tally,
    pub outcomes: Vec<FetchOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tally: Tally,
    /// Outcomes of every job that ran, in plan order.
    pub outcomes: Vec<FetchOutcome>,
    /// Jobs never started because of cancellation.
    pub skipped: Vec<FetchOutcome>,
    pub cancelled: bool,
    /// Set when the job list itself could not be built.
    pub error: Option<String>,
}

impl FinalReport {
    pub fn aborted(error: impl fmt::Display) -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            tally: Tally::default(),
            outcomes: Vec::new(),
            skipped: Vec::new(),
            cancelled: false,
            error: Some(error.to_string()),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.error.is_none() && !self.cancelled && self.tally.failed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn saved(bytes: u64, notices: Vec<Notice>) -> FetchOutcome {
        FetchOutcome::Succeeded {
            id: "https://youtu.be/a".to_string(),
            title: "A".to_string(),
            path: PathBuf::from("out/A.mp4"),
            bytes,
            notices,
        }
    }

    #[test]
    fn tally_counts() {
        let mut tally = Tally::default();
        tally.record(&saved(10, vec![]));
        tally.record(&FetchOutcome::Failed {
            id: "b".to_string(),
            error: FetchError::TransferFailed("reset".to_string()),
        });
        tally.record(&saved(5, vec![]));

        assert_eq!(
            tally,
            Tally {
                attempted: 3,
                succeeded: 2,
                failed: 1,
                bytes: 15
            }
        );
    }

    #[test]
    fn messages() {
        let outcome = saved(
            1,
            vec![Notice::QualityFallback {
                requested: 1080,
                selected: 720,
            }],
        );
        assert_eq!(
            outcome.message(),
            "Saved \"A\" to out/A.mp4 (1080p not available, saved 720p)"
        );

        let outcome = FetchOutcome::Failed {
            id: "b".to_string(),
            error: FetchError::ResolutionFailed("Private video".to_string()),
        };
        assert_eq!(outcome.message(), "Failed b: could not resolve video: Private video");
        assert!(!outcome.is_success());
        assert_eq!(outcome.id(), "b");
    }

    #[test]
    fn aborted_report() {
        let report = FinalReport::aborted("playlist listing failed");
        assert_eq!(report.tally.attempted, 0);
        assert!(report.outcomes.is_empty());
        assert_eq!(report.error.as_deref(), Some("playlist listing failed"));
        assert!(!report.is_clean());
    }

    #[test]
    fn serializes_error_kind() {
        let json = serde_json::to_value(FetchOutcome::Failed {
            id: "b".to_string(),
            error: FetchError::StreamUnavailable("no audio".to_string()),
        })
        .unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"]["kind"], "stream_unavailable");
        assert_eq!(json["error"]["detail"], "no audio");
    }
}
