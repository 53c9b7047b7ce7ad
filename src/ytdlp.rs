use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Output,
};

use async_trait::async_trait;

use crate::{
    extract::{Extractor, MediaInfo, PostProcess, TransferRequest},
    ffmpeg::Transcoder,
    outcome::FetchError,
};

/// `Extractor` backed by the yt-dlp command line tool.
#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: PathBuf,
    transcoder: Option<Transcoder>,
}

pub fn parse_info(json: &str) -> Result<MediaInfo, serde_json::Error> {
    serde_json::from_str(json)
}

/// yt-dlp output template for `output`, with `%` escaped so titles cannot
/// inject template fields.
pub fn output_template(output: &Path) -> OsString {
    let escaped = output.to_string_lossy().replace('%', "%%");
    OsString::from(format!("{}.%(ext)s", escaped))
}

fn last_error_line(stderr: &str) -> String {
    let line = stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| l.starts_with("ERROR:"));

    match line {
        Some(l) => l.trim_start_matches("ERROR:").trim().to_string(),
        None => {
            let trimmed = stderr.trim();
            if trimmed.is_empty() {
                "unknown error".to_string()
            } else {
                trimmed.chars().take(300).collect()
            }
        }
    }
}

/// Maps yt-dlp's stderr to an error kind. `fallback` is used when nothing
/// more specific matches.
pub fn classify(stderr: &str, fallback: fn(String) -> FetchError) -> FetchError {
    let lower = stderr.to_lowercase();
    let detail = last_error_line(stderr);
    let detail_lower = detail.to_lowercase();

    if [
        "unsupported url",
        "is not a valid url",
        "video unavailable",
        "private video",
        "has been removed",
        "sign in to confirm",
        "http error 404",
    ]
    .iter()
    .any(|needle| lower.contains(needle))
    {
        FetchError::ResolutionFailed(detail)
    } else if lower.contains("requested format") && lower.contains("not available") {
        FetchError::StreamUnavailable(detail)
    } else if (detail_lower.contains("ffmpeg") || detail_lower.contains("ffprobe"))
        && (detail_lower.contains("not found") || detail_lower.contains("not installed"))
    {
        FetchError::TranscodeUnavailable(detail)
    } else {
        fallback(detail)
    }
}

fn describe(post: &PostProcess) -> String {
    match post {
        PostProcess::None => "no post-processing".to_string(),
        PostProcess::Merge(c) => format!("merging streams into {}", c),
        PostProcess::Remux(c) => format!("remuxing to {}", c),
        PostProcess::ExtractAudio(c) => format!("converting audio to {}", c),
    }
}

impl YtDlp {
    pub fn new(binary: impl Into<PathBuf>, transcoder: Option<Transcoder>) -> Self {
        Self {
            binary: binary.into(),
            transcoder,
        }
    }

    async fn exec(&self, args: &[OsString]) -> std::io::Result<Output> {
        debug!("Running {} {:?}", self.binary.display(), args);
        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.args(args).kill_on_drop(true);
        // Own process group, so a terminal Ctrl-C only reaches us and the
        // running window can drain
        #[cfg(unix)]
        cmd.process_group(0);

        cmd.output().await
    }

    pub fn transfer_args(&self, request: &TransferRequest) -> Result<Vec<OsString>, FetchError> {
        let mut args: Vec<OsString> = [
            "--no-playlist",
            "--no-warnings",
            "--no-progress",
            "--print",
            "after_move:filepath",
            "--no-simulate",
            "-f",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        args.push(OsString::from(&request.format));
        args.push(OsString::from("-o"));
        args.push(output_template(&request.output));

        match &request.post {
            PostProcess::None => (),
            PostProcess::Merge(c) => {
                args.extend([OsString::from("--merge-output-format"), OsString::from(c)])
            }
            PostProcess::Remux(c) => {
                args.extend([OsString::from("--remux-video"), OsString::from(c)])
            }
            PostProcess::ExtractAudio(c) => args.extend([
                OsString::from("-x"),
                OsString::from("--audio-format"),
                OsString::from(c),
            ]),
        }

        if request.post.needs_transcoder() {
            let transcoder = self.transcoder.as_ref().ok_or_else(|| {
                FetchError::TranscodeUnavailable(format!(
                    "{} needs ffmpeg",
                    describe(&request.post)
                ))
            })?;
            args.push(OsString::from("--ffmpeg-location"));
            args.push(transcoder.path.clone().into_os_string());
        }

        args.push(OsString::from("--"));
        args.push(OsString::from(&request.url));

        Ok(args)
    }
}

#[async_trait]
impl Extractor for YtDlp {
    async fn resolve(&self, url: &str) -> Result<MediaInfo, FetchError> {
        let args: Vec<OsString> = [
            "--dump-single-json",
            "--no-playlist",
            "--no-warnings",
            "--skip-download",
            "--",
            url,
        ]
        .into_iter()
        .map(OsString::from)
        .collect();

        let output = self.exec(&args).await.map_err(|e| {
            FetchError::ResolutionFailed(format!("could not run {}: {}", self.binary.display(), e))
        })?;
        if !output.status.success() {
            return Err(classify(
                &String::from_utf8_lossy(&output.stderr),
                FetchError::ResolutionFailed,
            ));
        }

        parse_info(&String::from_utf8_lossy(&output.stdout))
            .map_err(|e| FetchError::ResolutionFailed(format!("unreadable yt-dlp output: {}", e)))
    }

    async fn list_playlist(&self, url: &str) -> Result<Vec<String>, FetchError> {
        let args: Vec<OsString> = ["--flat-playlist", "--print", "url", "--no-warnings", "--", url]
            .into_iter()
            .map(OsString::from)
            .collect();

        let output = self.exec(&args).await.map_err(|e| {
            FetchError::ResolutionFailed(format!("could not run {}: {}", self.binary.display(), e))
        })?;
        if !output.status.success() {
            return Err(classify(
                &String::from_utf8_lossy(&output.stderr),
                FetchError::ResolutionFailed,
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    async fn transfer(&self, request: &TransferRequest) -> Result<PathBuf, FetchError> {
        let args = self.transfer_args(request)?;

        let output = self.exec(&args).await.map_err(|e| {
            FetchError::TransferFailed(format!("could not run {}: {}", self.binary.display(), e))
        })?;
        if !output.status.success() {
            return Err(classify(
                &String::from_utf8_lossy(&output.stderr),
                FetchError::TransferFailed,
            ));
        }

        String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
            .map(PathBuf::from)
            .ok_or_else(|| {
                FetchError::TransferFailed("yt-dlp did not report an output file".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        job::{FetchParams, MediaKind, Quality},
        select,
    };

    fn get_test_json(fname: &str) -> String {
        let mut d = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        d.push("resources/test/");
        d.push(fname);
        std::fs::read_to_string(d).expect(format!("Could not read {}", fname).as_str())
    }

    fn request(post: PostProcess) -> TransferRequest {
        TransferRequest {
            url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string(),
            format: "137+140".to_string(),
            output: PathBuf::from("out/01 - 100% Never Gonna"),
            post,
        }
    }

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn parse_video_info() {
        let info = parse_info(&get_test_json("video_info.json")).expect("Could not parse info");

        assert_eq!(info.id, "dQw4w9WgXcQ");
        assert_eq!(info.formats.len(), 10);
        assert_eq!(info.formats[4].height, Some(360));
        assert!(info.formats[4].is_progressive());
        assert!(!info.formats[0].has_audio() && !info.formats[0].has_video());

        let params = FetchParams {
            target_dir: PathBuf::from("out"),
            kind: MediaKind::Video,
            quality: Quality::Best,
            container: "mp4".to_string(),
        };
        let selection = select::choose(&info.formats, &params, true).unwrap();
        assert_eq!(selection.format, "137+251");
        assert_eq!(selection.height, Some(1080));
    }

    #[test]
    fn template_escapes_percent() {
        assert_eq!(
            output_template(Path::new("out/01 - 100% Never Gonna")),
            OsString::from("out/01 - 100%% Never Gonna.%(ext)s")
        );
    }

    #[test]
    fn merge_args() {
        let ytdlp = YtDlp::new(
            "yt-dlp",
            Some(Transcoder {
                path: PathBuf::from("/opt/ffmpeg"),
            }),
        );
        let args = strings(
            ytdlp
                .transfer_args(&request(PostProcess::Merge("mp4".to_string())))
                .unwrap(),
        );

        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[pos("-f") + 1], "137+140");
        assert_eq!(args[pos("--merge-output-format") + 1], "mp4");
        assert_eq!(args[pos("--ffmpeg-location") + 1], "/opt/ffmpeg");
        assert_eq!(args[pos("-o") + 1], "out/01 - 100%% Never Gonna.%(ext)s");
        assert_eq!(
            args.last().map(String::as_str),
            Some("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
        );
    }

    #[test]
    fn audio_args() {
        let ytdlp = YtDlp::new(
            "yt-dlp",
            Some(Transcoder {
                path: PathBuf::from("ffmpeg"),
            }),
        );
        let args = strings(
            ytdlp
                .transfer_args(&request(PostProcess::ExtractAudio("mp3".to_string())))
                .unwrap(),
        );
        assert!(args.contains(&"-x".to_string()));
        assert!(args.windows(2).any(|w| w == ["--audio-format", "mp3"]));
    }

    #[test]
    fn post_process_without_transcoder() {
        let ytdlp = YtDlp::new("yt-dlp", None);
        let err = ytdlp
            .transfer_args(&request(PostProcess::Merge("mp4".to_string())))
            .unwrap_err();
        assert!(matches!(err, FetchError::TranscodeUnavailable(_)));

        let args = strings(ytdlp.transfer_args(&request(PostProcess::None)).unwrap());
        assert!(!args.contains(&"--ffmpeg-location".to_string()));
    }

    #[test]
    fn classify_errors() {
        let stderr = "[youtube] abc: Downloading webpage\nERROR: [youtube] abc: Private video. Sign in if you've been granted access to this video\n";
        assert_eq!(
            classify(stderr, FetchError::TransferFailed),
            FetchError::ResolutionFailed(
                "[youtube] abc: Private video. Sign in if you've been granted access to this video"
                    .to_string()
            )
        );

        let stderr = "ERROR: [youtube] abc: Requested format is not available. Use --list-formats for a list of available formats";
        assert!(matches!(
            classify(stderr, FetchError::TransferFailed),
            FetchError::StreamUnavailable(_)
        ));

        let stderr = "ERROR: Postprocessing: ffprobe and ffmpeg not found. Please install or provide the path using --ffmpeg-location";
        assert!(matches!(
            classify(stderr, FetchError::TransferFailed),
            FetchError::TranscodeUnavailable(_)
        ));

        let stderr = "ERROR: unable to download video data: HTTP Error 403: Forbidden";
        assert_eq!(
            classify(stderr, FetchError::TransferFailed),
            FetchError::TransferFailed(
                "unable to download video data: HTTP Error 403: Forbidden".to_string()
            )
        );

        let stderr = "[info] abc: Downloading 1 format(s): 137+140\n[Merger] ffmpeg location /usr/bin/ffmpeg\nERROR: unable to download video data: HTTP Error 404: Not Found";
        assert!(matches!(
            classify(stderr, FetchError::TransferFailed),
            FetchError::ResolutionFailed(_)
        ));

        let stderr = "WARNING: ffmpeg not found, formats may be limited\nERROR: unable to download video data: HTTP Error 403: Forbidden";
        assert!(matches!(
            classify(stderr, FetchError::TransferFailed),
            FetchError::TransferFailed(_)
        ));

        assert_eq!(
            classify("", FetchError::ResolutionFailed),
            FetchError::ResolutionFailed("unknown error".to_string())
        );
    }

    /// Writes an executable yt-dlp stand-in that prints the process group
    /// it runs in.
    #[cfg(target_os = "linux")]
    fn pgrp_script(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("yt-dlp");
        std::fs::write(
            &path,
            "#!/bin/sh\nread -r _ _ _ _ pgrp _ < /proc/$$/stat\necho \"$pgrp\"\n",
        )
        .expect("Could not write script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("Could not chmod script");
        path
    }

    #[cfg(target_os = "linux")]
    fn own_pgrp() -> String {
        let stat = std::fs::read_to_string("/proc/self/stat").expect("Could not read stat");
        let (_, rest) = stat.rsplit_once(')').expect("Malformed stat");
        rest.split_whitespace().nth(2).expect("No pgrp").to_string()
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn transfers_run_outside_terminal_group() {
        let dir = tempfile::tempdir().unwrap();
        let ytdlp = YtDlp::new(pgrp_script(dir.path()), None);

        let child_pgrp = ytdlp
            .transfer(&request(PostProcess::None))
            .await
            .expect("Transfer should succeed");

        // A Ctrl-C aimed at our group must not reach the download
        assert_ne!(child_pgrp, PathBuf::from(own_pgrp()));
    }
}
