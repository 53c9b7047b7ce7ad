use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use serde_aux::prelude::*;

use crate::outcome::FetchError;

/// What the extraction library knows about one video.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MediaInfo {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub formats: Vec<Format>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Format {
    pub format_id: String,
    pub ext: String,
    #[serde(default, deserialize_with = "deserialize_option_number_from_string")]
    pub height: Option<u32>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    /// Total bitrate in kbit/s.
    pub tbr: Option<f64>,
    /// Audio bitrate in kbit/s.
    pub abr: Option<f64>,
}

impl Format {
    pub fn has_video(&self) -> bool {
        match self.vcodec.as_deref() {
            Some("none") => false,
            Some(_) => true,
            None => self.height.is_some(),
        }
    }

    pub fn has_audio(&self) -> bool {
        !matches!(self.acodec.as_deref(), Some("none"))
    }

    pub fn is_audio_only(&self) -> bool {
        self.has_audio() && !self.has_video()
    }

    pub fn is_progressive(&self) -> bool {
        self.has_audio() && self.has_video()
    }
}

/// Post-processing step handed to the transcoder after the transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostProcess {
    None,
    /// Merge separate video and audio streams into this container.
    Merge(String),
    /// Rewrap a single-file stream into this container.
    Remux(String),
    /// Convert the audio stream to this codec.
    ExtractAudio(String),
}

impl PostProcess {
    pub fn needs_transcoder(&self) -> bool {
        !matches!(self, PostProcess::None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub url: String,
    /// Format selector, e.g. `137+140` or `22`.
    pub format: String,
    /// Output path without extension; the extractor appends the final one.
    pub output: PathBuf,
    pub post: PostProcess,
}

/// Seam to the external extraction library.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn resolve(&self, url: &str) -> Result<MediaInfo, FetchError>;

    /// Ordered video URLs of a playlist.
    async fn list_playlist(&self, url: &str) -> Result<Vec<String>, FetchError>;

    /// Downloads and post-processes one video, returning the saved path.
    async fn transfer(&self, request: &TransferRequest) -> Result<PathBuf, FetchError>;
}
