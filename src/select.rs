use std::cmp::Ordering;

use crate::{
    extract::{Format, PostProcess},
    job::{FetchParams, MediaKind, Quality},
    outcome::{FetchError, Notice},
};

const VIDEO_CONTAINERS: [&str; 3] = ["mp4", "webm", "mkv"];

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Format selector passed to the extractor.
    pub format: String,
    pub height: Option<u32>,
    pub post: PostProcess,
    pub notices: Vec<Notice>,
}

fn by_quality(a: &&Format, b: &&Format) -> Ordering {
    a.height
        .unwrap_or(0)
        .cmp(&b.height.unwrap_or(0))
        .then_with(|| a.tbr.unwrap_or(0.0).total_cmp(&b.tbr.unwrap_or(0.0)))
}

fn by_audio_bitrate(a: &&Format, b: &&Format) -> Ordering {
    let rate = |f: &Format| f.abr.or(f.tbr).unwrap_or(0.0);
    rate(*a).total_cmp(&rate(*b))
}

fn within(f: &Format, limit: u32) -> bool {
    f.height.map(|h| h <= limit).unwrap_or(true)
}

fn best_video(formats: &[Format], limit: u32) -> Option<&Format> {
    formats
        .iter()
        .filter(|f| f.has_video() && within(f, limit))
        .max_by(by_quality)
}

fn best_progressive(formats: &[Format], limit: u32) -> Option<&Format> {
    formats
        .iter()
        .filter(|f| f.is_progressive() && within(f, limit))
        .max_by(by_quality)
}

fn best_audio(formats: &[Format]) -> Option<&Format> {
    formats
        .iter()
        .filter(|f| f.is_audio_only())
        .max_by(by_audio_bitrate)
}

/// Picks the formats to download for `params`.
///
/// Video requests take the highest resolution at or below the requested
/// height. With a transcoder the best video stream is merged with the best
/// audio stream; without one only single-file formats qualify and a notice
/// records what was lost. Audio requests take the best audio-only stream and
/// convert it when the transcoder is present.
pub fn choose(
    formats: &[Format],
    params: &FetchParams,
    transcoder: bool,
) -> Result<Selection, FetchError> {
    match params.kind {
        MediaKind::Video => choose_video(formats, params, transcoder),
        MediaKind::Audio => choose_audio(formats, params, transcoder),
    }
}

fn choose_video(
    formats: &[Format],
    params: &FetchParams,
    transcoder: bool,
) -> Result<Selection, FetchError> {
    let limit = params.quality.limit();
    let container = if VIDEO_CONTAINERS.contains(&params.container.as_str()) {
        params.container.clone()
    } else {
        MediaKind::Video.default_container().to_string()
    };
    let mut notices = Vec::new();

    let video = best_video(formats, limit);
    let merged = match (transcoder, video) {
        (true, Some(v)) if !v.has_audio() => best_audio(formats).map(|a| Selection {
            format: format!("{}+{}", v.format_id, a.format_id),
            height: v.height,
            post: PostProcess::Merge(container.clone()),
            notices: Vec::new(),
        }),
        _ => None,
    };

    let mut selection = match merged {
        Some(selection) => selection,
        None => {
            let single = best_progressive(formats, limit).ok_or_else(|| {
                FetchError::StreamUnavailable(match params.quality {
                    Quality::Best => "no format with both video and audio".to_string(),
                    Quality::Height(h) => {
                        format!("no format with both video and audio at or below {}p", h)
                    }
                })
            })?;

            if !transcoder {
                if let (Some(best), Some(got)) = (video.and_then(|v| v.height), single.height) {
                    if best > got {
                        notices.push(Notice::TranscodeUnavailable {
                            detail: format!("saved {}p single-file instead of {}p", got, best),
                        });
                    }
                }
            }

            let post = if single.ext == container || !transcoder {
                PostProcess::None
            } else {
                PostProcess::Remux(container.clone())
            };

            Selection {
                format: single.format_id.clone(),
                height: single.height,
                post,
                notices: Vec::new(),
            }
        }
    };

    if let (Quality::Height(requested), Some(selected)) = (params.quality, selection.height) {
        if selected < requested {
            notices.insert(
                0,
                Notice::QualityFallback {
                    requested,
                    selected,
                },
            );
        }
    }
    selection.notices = notices;

    Ok(selection)
}

fn choose_audio(
    formats: &[Format],
    params: &FetchParams,
    transcoder: bool,
) -> Result<Selection, FetchError> {
    let source = best_audio(formats)
        .or_else(|| {
            formats
                .iter()
                .filter(|f| f.is_progressive())
                .min_by(by_quality)
        })
        .ok_or_else(|| FetchError::StreamUnavailable("no audio stream".to_string()))?;

    let mut notices = Vec::new();
    let post = if source.ext == params.container && source.is_audio_only() {
        PostProcess::None
    } else if transcoder {
        PostProcess::ExtractAudio(params.container.clone())
    } else {
        notices.push(Notice::TranscodeUnavailable {
            detail: format!("saved {} instead of {}", source.ext, params.container),
        });
        PostProcess::None
    };

    Ok(Selection {
        format: source.format_id.clone(),
        height: None,
        post,
        notices,
    })
}
