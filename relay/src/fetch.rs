//! Downloading videos with `yt-dlp`, optionally trimmed with `ffmpeg`.

use crate::VideoId;
use eyre::Context;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

/// A downloaded video waiting to be re-uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMediaFile {
    pub path: PathBuf,
    /// The file name without its extension, which yt-dlp derives from the video title.
    pub title: String,
}

impl LocalMediaFile {
    /// Describes the file at `path`, taking the title from its file name.
    pub fn from_path(path: PathBuf) -> Self {
        let title = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { path, title }
    }
}

/// Fetches the media of a video onto local disk.
pub trait MediaFetcher {
    fn download(&self, video_id: &VideoId) -> impl Future<Output = eyre::Result<LocalMediaFile>>;
}

/// Cut the first `offset` of every download with `ffmpeg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimStart {
    pub ffmpeg: PathBuf,
    pub offset: Duration,
}

/// [`MediaFetcher`] that shells out to `yt-dlp`, and optionally to `ffmpeg` afterwards.
#[derive(Debug, Clone)]
pub struct YtDlp {
    program: PathBuf,
    download_dir: PathBuf,
    timeout: Duration,
    trim: Option<TrimStart>,
}

impl YtDlp {
    /// `program` is the yt-dlp executable to run; downloads go into `download_dir`, which must
    /// exist.
    pub fn new(
        program: impl Into<PathBuf>,
        download_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            download_dir: download_dir.into(),
            timeout,
            trim: None,
        }
    }

    /// Trims the start of each video after it has been downloaded.
    pub fn trim_start(mut self, trim: TrimStart) -> Self {
        self.trim = Some(trim);
        self
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Runs `yt-dlp --version` to fail loudly at startup if it isn't installed.
    ///
    /// If trimming is enabled, `ffmpeg` is checked the same way.
    pub async fn ensure_available(&self) -> eyre::Result<String> {
        let version = version_of(&self.program, "--version").await?;
        if let Some(trim) = &self.trim {
            version_of(&trim.ffmpeg, "-version").await?;
        }
        Ok(version)
    }

    /// Replaces the file at `path` with a copy that starts `trim.offset` in.
    #[tracing::instrument(skip(self, trim), fields(offset = ?trim.offset))]
    async fn cut_start(&self, trim: &TrimStart, path: &Path) -> eyre::Result<()> {
        let partial = match path.extension() {
            Some(ext) => path.with_extension(format!("trimming.{}", ext.to_string_lossy())),
            None => path.with_extension("trimming"),
        };

        let mut command = tokio::process::Command::new(&trim.ffmpeg);
        command
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-y")
            .arg("-ss")
            .arg(format!("{:.3}", trim.offset.as_secs_f64()))
            .arg("-i")
            .arg(path)
            .arg("-c")
            .arg("copy")
            .arg(&partial)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!("trimming");
        let result = match tokio::time::timeout(self.timeout, command.output()).await {
            Err(_) => Err(eyre::eyre!("ffmpeg did not finish within {:?}", self.timeout)),
            Ok(Err(e)) => Err(e).with_context(|| format!("run {}", trim.ffmpeg.display())),
            Ok(Ok(output)) if !output.status.success() => Err(eyre::eyre!(
                "ffmpeg exited with status {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )),
            Ok(Ok(_)) => tokio::fs::rename(&partial, path)
                .await
                .with_context(|| format!("move trimmed file over {}", path.display())),
        };
        if result.is_err() {
            let _ = tokio::fs::remove_file(&partial).await;
        }
        result
    }
}

async fn version_of(program: &Path, flag: &str) -> eyre::Result<String> {
    let output = tokio::process::Command::new(program)
        .arg(flag)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("run {} {flag}", program.display()))?;
    if !output.status.success() {
        eyre::bail!(
            "{} {flag} exited with status {}",
            program.display(),
            output.status
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

impl MediaFetcher for YtDlp {
    #[tracing::instrument(skip(self), fields(program = %self.program.display()))]
    async fn download(&self, video_id: &VideoId) -> eyre::Result<LocalMediaFile> {
        let url = video_id.watch_url();
        let template = self.download_dir.join("%(title)s.%(ext)s");

        let mut command = tokio::process::Command::new(&self.program);
        command
            .arg("--no-playlist")
            .arg("--no-progress")
            // --print implies --simulate otherwise
            .arg("--no-simulate")
            .arg("--print")
            .arg("after_move:filepath")
            .arg("--output")
            .arg(&template)
            .arg(&url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::info!(%url, "downloading");
        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| eyre::eyre!("yt-dlp did not finish within {:?}", self.timeout))?
            .with_context(|| format!("run {}", self.program.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            eyre::bail!(
                "yt-dlp exited with status {} for {}: {}",
                output.status,
                url,
                stderr.trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let reported = stdout
            .lines()
            .map(str::trim)
            .rfind(|line| !line.is_empty())
            .ok_or_else(|| eyre::eyre!("yt-dlp did not report where it saved {}", url))?;
        let path = PathBuf::from(reported);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            eyre::bail!("yt-dlp reported {} but there is no such file", path.display());
        }

        if let Some(trim) = &self.trim {
            self.cut_start(trim, &path)
                .await
                .with_context(|| format!("trim start of {}", path.display()))?;
        }

        let file = LocalMediaFile::from_path(path);
        tracing::info!(path = %file.path.display(), "downloaded");
        Ok(file)
    }
}
