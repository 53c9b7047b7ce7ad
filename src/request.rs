use std::{sync::OnceLock, time::Duration};

use regex::Regex;
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    Retry,
};

use crate::{
    extract::Extractor,
    job::{FetchJob, FetchParams},
    outcome::FetchError,
};

/// What the user asked for: one URL plus the parameters every resulting job
/// shares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub params: FetchParams,
}

#[derive(thiserror::Error, Debug)]
pub enum RequestError {
    #[error("not a YouTube or Dailymotion URL: {0}")]
    Unsupported(String),
    #[error("could not list playlist {url}: {source}")]
    Listing {
        url: String,
        #[source]
        source: FetchError,
    },
}

fn supported_host() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^https?://([\w-]+\.)*(youtube\.com|youtu\.be|dailymotion\.com|dai\.ly)(/|$)")
            .expect("valid regex")
    })
}

fn playlist_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([?&]list=[\w-]+|dailymotion\.com/playlist/[\w-]+)").expect("valid regex")
    })
}

/// Trims the URL and adds `https://` when no scheme was typed, so
/// `www.youtube.com/watch?v=...` is accepted like the browser would.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.contains("://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

pub fn is_supported(url: &str) -> bool {
    supported_host().is_match(url)
}

pub fn is_playlist(url: &str) -> bool {
    playlist_marker().is_match(url)
}

fn listing_backoff() -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(2)
        .factor(100)
        .map(jitter)
        .take(2)
}

/// Turns a request into jobs. Playlist URLs are expanded into one job per
/// entry, numbered from 1; anything else becomes a single job. Failing to
/// list the playlist is a precondition failure: no job is built.
pub async fn build_jobs<E>(
    extractor: &E,
    request: &DownloadRequest,
) -> Result<Vec<FetchJob>, RequestError>
where
    E: Extractor + ?Sized,
{
    let url = normalize_url(&request.url);
    let url = url.as_str();
    if !is_supported(url) {
        return Err(RequestError::Unsupported(url.to_string()));
    }

    if !is_playlist(url) {
        return Ok(vec![FetchJob::single(url, request.params.clone())]);
    }

    info!("Listing playlist {}", url);
    let entries = Retry::spawn(listing_backoff(), || extractor.list_playlist(url))
        .await
        .map_err(|source| RequestError::Listing {
            url: url.to_string(),
            source,
        })?;
    info!("Playlist has {} entries", entries.len());

    let total = entries.len();
    Ok(entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| FetchJob::playlist_item(entry, i + 1, total, request.params.clone()))
        .collect())
}
