use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
};

#[derive(thiserror::Error, Debug)]
pub enum FfmpegError {
    #[error("I/O error")]
    IoError(#[from] std::io::Error),
    #[error("ffmpeg exited with {0}")]
    Status(std::process::ExitStatus),
}

/// A transcoder binary found by `probe`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcoder {
    pub path: PathBuf,
}

pub fn binary_name() -> &'static str {
    if cfg!(windows) {
        "ffmpeg.exe"
    } else {
        "ffmpeg"
    }
}

/// Looks for ffmpeg in `local_dir` first, then on `PATH`. Meant to run once
/// before any job is built.
pub fn probe(local_dir: &Path) -> Option<Transcoder> {
    let path = std::env::var_os("PATH");
    probe_with(local_dir, path.as_deref())
}

fn probe_with(local_dir: &Path, search_path: Option<&OsStr>) -> Option<Transcoder> {
    let local = local_dir.join(binary_name());
    if local.is_file() {
        debug!("Found local transcoder at {}", local.display());
        return Some(Transcoder { path: local });
    }

    let found = std::env::split_paths(search_path?)
        .map(|dir| dir.join(binary_name()))
        .find(|candidate| candidate.is_file())?;
    debug!("Found transcoder on PATH at {}", found.display());

    Some(Transcoder { path: found })
}

impl Transcoder {
    /// First line of `ffmpeg -version`.
    pub async fn version(&self) -> Result<String, FfmpegError> {
        let mut cmd = tokio::process::Command::new(&self.path);
        cmd.arg("-hide_banner").arg("-version");

        let output = cmd.output().await?;
        if !output.status.success() {
            return Err(FfmpegError::Status(output.status));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use super::*;

    fn touch(dir: &Path) -> PathBuf {
        let path = dir.join(binary_name());
        std::fs::write(&path, b"").expect("Could not create fake ffmpeg");
        path
    }

    #[test]
    fn local_dir_wins() {
        let local = tempfile::tempdir().unwrap();
        let on_path = tempfile::tempdir().unwrap();
        let expected = touch(local.path());
        touch(on_path.path());

        let search = std::env::join_paths([on_path.path()]).unwrap();
        let found = probe_with(local.path(), Some(search.as_os_str())).expect("Should find ffmpeg");
        assert_eq!(found.path, expected);
    }

    #[test]
    fn falls_back_to_path() {
        let local = tempfile::tempdir().unwrap();
        let empty = tempfile::tempdir().unwrap();
        let on_path = tempfile::tempdir().unwrap();
        let expected = touch(on_path.path());

        let search = std::env::join_paths([empty.path(), on_path.path()]).unwrap();
        let found = probe_with(local.path(), Some(search.as_os_str())).expect("Should find ffmpeg");
        assert_eq!(found.path, expected);
    }

    #[test]
    fn missing_everywhere() {
        let local = tempfile::tempdir().unwrap();
        let empty = tempfile::tempdir().unwrap();
        let search: OsString = std::env::join_paths([empty.path()]).unwrap();

        assert!(probe_with(local.path(), Some(search.as_os_str())).is_none());
        assert!(probe_with(local.path(), None).is_none());
    }

    #[test]
    fn directory_is_not_a_binary() {
        let local = tempfile::tempdir().unwrap();
        std::fs::create_dir(local.path().join(binary_name())).unwrap();
        assert!(probe_with(local.path(), None).is_none());
    }
}
