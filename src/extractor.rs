//! Wrapper around the external extraction tool (yt-dlp compatible).
//!
//! Two invocations are supported: a JSON metadata dump and a download. The
//! download's progress comes from the tool's human-readable output, which is
//! parsed line by line with [`parse_progress_line`]. That parser is a
//! best-effort heuristic over text that changes between tool versions; it is
//! not a stable wire format and unparseable lines are simply skipped.

use std::{
    io,
    path::{Path, PathBuf},
    process::Stdio,
    sync::LazyLock,
    time::Duration,
};

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Command,
    sync::mpsc,
    time::timeout,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::validate::MediaFormat;

const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";
const AUDIO_CODEC: &str = "mp3";

pub const AVAILABLE_FORMATS: &[&str] = &["video", "audio"];
pub const AVAILABLE_QUALITIES: &[&str] = &[
    "best", "1080p", "720p", "480p", "360p", "320", "256", "128",
];

static PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*%").expect("percent pattern compiles"));
static SPEED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?\s*[KMGT]?i?B/s)").expect("speed pattern compiles")
});
static ETA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ETA\s+(\d+(?::\d+)+)").expect("eta pattern compiles"));
static DESTINATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^\[(?:download|ExtractAudio)\] Destination: (.+)$|^\[Merger\] Merging formats into "(.+)"$"#,
    )
    .expect("destination pattern compiles")
});

#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error("failed to launch {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("I/O error while running the extractor: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to get video info. Exit code: {}", describe_code(*.0))]
    MetadataExit(Option<i32>),
    #[error("Download failed with exit code: {}", describe_code(*.0))]
    DownloadExit(Option<i32>),
    #[error("extractor timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("extractor returned invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("No file was downloaded")]
    NoOutput,
    #[error("Download cancelled")]
    Cancelled,
}

fn describe_code(code: Option<i32>) -> String {
    code.map(|code| code.to_string())
        .unwrap_or_else(|| "terminated by signal".to_string())
}

/// Flattened projection of the tool's JSON dump.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoInfo {
    pub video_id: String,
    pub title: String,
    pub description: String,
    pub thumbnail: String,
    pub duration: u64,
    pub uploader: String,
    pub url: String,
    pub available_formats: Vec<String>,
    pub available_qualities: Vec<String>,
}

impl VideoInfo {
    /// Missing or oddly typed fields become empty strings / zero instead of
    /// failing the whole lookup.
    pub fn from_json(json: &Value, url: &str) -> Self {
        let text = |key: &str| -> String {
            match json.get(key) {
                Some(Value::String(value)) => value.clone(),
                Some(Value::Number(value)) => value.to_string(),
                _ => String::new(),
            }
        };
        let duration = json
            .get("duration")
            .and_then(|value| {
                value
                    .as_u64()
                    .or_else(|| value.as_f64().filter(|secs| *secs >= 0.0).map(|secs| secs as u64))
            })
            .unwrap_or(0);

        Self {
            video_id: text("id"),
            title: text("title"),
            description: text("description"),
            thumbnail: text("thumbnail"),
            duration,
            uploader: text("uploader"),
            url: url.to_string(),
            available_formats: AVAILABLE_FORMATS.iter().map(|s| s.to_string()).collect(),
            available_qualities: AVAILABLE_QUALITIES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// What to fetch and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOptions {
    pub url: String,
    pub format: MediaFormat,
    pub quality: String,
}

/// One parsed progress line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    pub percent: u8,
    pub speed: Option<String>,
    pub eta: Option<String>,
}

/// Handle on the configured extractor binary.
#[derive(Debug, Clone)]
pub struct Extractor {
    command: PathBuf,
    timeout: Duration,
}

impl Extractor {
    pub fn new(command: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("PYTHONIOENCODING", "utf-8")
            .kill_on_drop(true);
        cmd
    }

    fn spawn_error(&self, source: io::Error) -> ExtractorError {
        ExtractorError::Spawn {
            command: self.command.display().to_string(),
            source,
        }
    }

    /// Runs the JSON dump for a single video (playlists are not expanded) and
    /// waits for the process, bounded by the configured timeout.
    pub async fn fetch_info(&self, url: &str) -> Result<VideoInfo, ExtractorError> {
        let child = self
            .command()
            .args(info_args(url))
            .spawn()
            .map_err(|err| self.spawn_error(err))?;

        // Dropping the pending future on timeout drops the child, which kills it.
        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ExtractorError::Timeout(self.timeout))??;

        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines().filter(|line| !line.trim().is_empty()) {
            debug!(target: "vidgrab::extractor", "{line}");
        }

        if !output.status.success() {
            warn!(
                "metadata lookup for {url} exited with {}: {}",
                output.status,
                stderr.trim()
            );
            return Err(ExtractorError::MetadataExit(output.status.code()));
        }

        let json = parse_json_output(&output.stdout)?;
        Ok(VideoInfo::from_json(&json, url))
    }

    /// Downloads into `job_dir` and returns the path of the produced file.
    ///
    /// stdout and stderr are merged and scanned line by line; every progress
    /// line found is handed to `on_progress`. When `cancel` fires the child is
    /// killed and [`ExtractorError::Cancelled`] is returned.
    pub async fn download<F>(
        &self,
        options: &DownloadOptions,
        job_dir: &Path,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<PathBuf, ExtractorError>
    where
        F: FnMut(ProgressUpdate) + Send,
    {
        let mut child = self
            .command()
            .args(download_args(options, job_dir))
            .spawn()
            .map_err(|err| self.spawn_error(err))?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, tx.clone()));
        }
        drop(tx);

        let mut announced: Option<PathBuf> = None;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    child.kill().await?;
                    return Err(ExtractorError::Cancelled);
                }
                line = rx.recv() => {
                    let Some(line) = line else { break };
                    debug!(target: "vidgrab::extractor", "{line}");
                    if let Some(path) = parse_destination_line(&line) {
                        announced = Some(path);
                    }
                    if let Some(update) = parse_progress_line(&line) {
                        on_progress(update);
                    }
                }
            }
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                child.kill().await?;
                return Err(ExtractorError::Cancelled);
            }
            status = child.wait() => status?,
        };
        if !status.success() {
            return Err(ExtractorError::DownloadExit(status.code()));
        }

        locate_output(job_dir, announced).await
    }
}

/// Splits raw output on `\n` and decodes lossily. The pipe is always read to
/// EOF: closing it early would kill the extractor with SIGPIPE.
async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                // A dropped receiver still leaves the pipe to drain.
                let _ = tx.send(line.to_string());
            }
            Err(err) => {
                debug!(target: "vidgrab::extractor", "output stream closed: {err}");
                break;
            }
        }
    }
}

pub fn info_args(url: &str) -> Vec<String> {
    vec![
        "--dump-json".to_string(),
        "--no-playlist".to_string(),
        url.to_string(),
    ]
}

pub fn download_args(options: &DownloadOptions, job_dir: &Path) -> Vec<String> {
    let mut args = vec![
        "--no-playlist".to_string(),
        "--newline".to_string(),
        "-o".to_string(),
        job_dir.join(OUTPUT_TEMPLATE).to_string_lossy().into_owned(),
    ];

    match options.format {
        MediaFormat::Audio => {
            args.extend([
                "-x".to_string(),
                "--audio-format".to_string(),
                AUDIO_CODEC.to_string(),
            ]);
            if let Some(kbps) = audio_bitrate(&options.quality) {
                args.push("--audio-quality".to_string());
                args.push(format!("{kbps}k"));
            }
        }
        MediaFormat::Video => {
            if let Some(height) = height_cap(&options.quality) {
                args.push("-f".to_string());
                args.push(format!("best[height<={height}]/best"));
            }
        }
    }

    args.push(options.url.clone());
    args
}

/// Maps a video quality label (`1080p`, `720`, `4k`) to a maximum height.
/// `best` and anything unrecognized leave the selection to the tool.
pub fn height_cap(quality: &str) -> Option<u32> {
    let quality = quality.trim().to_ascii_lowercase();
    match quality.as_str() {
        "" | "best" => None,
        "4k" => Some(2160),
        "8k" => Some(4320),
        other => other
            .strip_suffix('p')
            .unwrap_or(other)
            .parse::<u32>()
            .ok()
            .filter(|height| *height > 0),
    }
}

/// Maps an audio quality label (`320`, `128k`) to a bitrate in kbps.
pub fn audio_bitrate(quality: &str) -> Option<u32> {
    let quality = quality.trim().to_ascii_lowercase();
    if quality.is_empty() || quality == "best" {
        return None;
    }
    quality
        .strip_suffix('k')
        .unwrap_or(&quality)
        .parse::<u32>()
        .ok()
        .filter(|kbps| *kbps > 0)
}

/// Pulls a percentage (and speed/ETA when present) out of a progress line.
/// Only lines containing `%` are considered.
pub fn parse_progress_line(line: &str) -> Option<ProgressUpdate> {
    if !line.contains('%') {
        return None;
    }
    let percent = PERCENT
        .captures(line)
        .and_then(|captures| captures.get(1))
        .and_then(|value| value.as_str().parse::<f64>().ok())?;

    Some(ProgressUpdate {
        percent: percent.clamp(0.0, 100.0) as u8,
        speed: SPEED
            .captures(line)
            .and_then(|captures| captures.get(1))
            .map(|value| value.as_str().replace(' ', "")),
        eta: ETA
            .captures(line)
            .and_then(|captures| captures.get(1))
            .map(|value| value.as_str().to_string()),
    })
}

/// Recognizes the lines announcing where the tool writes its output.
pub fn parse_destination_line(line: &str) -> Option<PathBuf> {
    let captures = DESTINATION.captures(line.trim())?;
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .map(|value| PathBuf::from(value.as_str().trim()))
}

fn parse_json_output(stdout: &[u8]) -> Result<Value, ExtractorError> {
    match serde_json::from_slice::<Value>(stdout) {
        Ok(json) => Ok(json),
        Err(err) => {
            // Some builds print notices before the dump; take the first JSON object line.
            let text = String::from_utf8_lossy(stdout);
            text.lines()
                .map(str::trim)
                .filter(|line| line.starts_with('{'))
                .find_map(|line| serde_json::from_str::<Value>(line).ok())
                .ok_or(ExtractorError::InvalidJson(err))
        }
    }
}

fn is_partial_artifact(name: &str) -> bool {
    name.starts_with('.')
        || name.ends_with(".part")
        || name.ends_with(".ytdl")
        || name.ends_with(".temp")
        || name.contains(".part-Frag")
}

/// Prefers the file the tool announced; otherwise the newest finished file
/// in the job directory.
async fn locate_output(
    job_dir: &Path,
    announced: Option<PathBuf>,
) -> Result<PathBuf, ExtractorError> {
    if let Some(path) = announced
        && path.starts_with(job_dir)
        && tokio::fs::metadata(&path)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    {
        return Ok(path);
    }

    let mut entries = tokio::fs::read_dir(job_dir).await?;
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_partial_artifact(&name) {
            continue;
        }
        let meta = entry.metadata().await?;
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified().unwrap_or(std::time::UNIX_EPOCH);
        match &newest {
            Some((best, _)) if modified <= *best => {}
            _ => newest = Some((modified, entry.path())),
        }
    }

    newest.map(|(_, path)| path).ok_or(ExtractorError::NoOutput)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(format: MediaFormat, quality: &str) -> DownloadOptions {
        DownloadOptions {
            url: "https://www.youtube.com/watch?v=abc123".into(),
            format,
            quality: quality.into(),
        }
    }

    #[test]
    fn info_args_disable_playlists() {
        assert_eq!(
            info_args("https://youtu.be/abc"),
            vec!["--dump-json", "--no-playlist", "https://youtu.be/abc"]
        );
    }

    #[test]
    fn audio_download_args_extract_mp3() {
        let args = download_args(&options(MediaFormat::Audio, "best"), Path::new("/dl/job"));
        assert!(args.contains(&"-x".to_string()));
        assert!(args.windows(2).any(|pair| pair == ["--audio-format", "mp3"]));
        assert!(!args.contains(&"--audio-quality".to_string()));
        assert!(args.windows(2).any(|pair| pair[0] == "-o"
            && pair[1] == "/dl/job/%(title)s.%(ext)s"));
        assert_eq!(args.last().unwrap(), "https://www.youtube.com/watch?v=abc123");
    }

    #[test]
    fn audio_bitrate_is_passed_through() {
        let args = download_args(&options(MediaFormat::Audio, "256"), Path::new("/dl"));
        assert!(args.windows(2).any(|pair| pair == ["--audio-quality", "256k"]));
    }

    #[test]
    fn video_quality_caps_height() {
        let args = download_args(&options(MediaFormat::Video, "720p"), Path::new("/dl"));
        assert!(args.windows(2).any(|pair| pair == ["-f", "best[height<=720]/best"]));

        let best = download_args(&options(MediaFormat::Video, "best"), Path::new("/dl"));
        assert!(!best.contains(&"-f".to_string()));
    }

    #[test]
    fn quality_labels_map_to_limits() {
        assert_eq!(height_cap("1080p"), Some(1080));
        assert_eq!(height_cap("480"), Some(480));
        assert_eq!(height_cap("4K"), Some(2160));
        assert_eq!(height_cap("best"), None);
        assert_eq!(height_cap("ultra"), None);
        assert_eq!(audio_bitrate("128k"), Some(128));
        assert_eq!(audio_bitrate("320"), Some(320));
        assert_eq!(audio_bitrate("best"), None);
        assert_eq!(audio_bitrate("loud"), None);
    }

    #[test]
    fn progress_line_yields_percent_speed_and_eta() {
        let update =
            parse_progress_line("[download]  45.2% of 123.4MiB at  2.30MiB/s ETA 00:30").unwrap();
        assert_eq!(update.percent, 45);
        assert_eq!(update.speed.as_deref(), Some("2.30MiB/s"));
        assert_eq!(update.eta.as_deref(), Some("00:30"));
    }

    #[test]
    fn progress_is_clamped_and_noise_ignored() {
        assert_eq!(parse_progress_line("[download] 100.0% of 3MiB").unwrap().percent, 100);
        assert_eq!(parse_progress_line("weird 250% line").unwrap().percent, 100);
        assert!(parse_progress_line("[download] Destination: a.mp4").is_none());
        assert!(parse_progress_line("[info] 100 percent sure %").is_none());
    }

    #[test]
    fn destination_lines_are_recognized() {
        assert_eq!(
            parse_destination_line("[download] Destination: /dl/job/Song.webm"),
            Some(PathBuf::from("/dl/job/Song.webm"))
        );
        assert_eq!(
            parse_destination_line("[ExtractAudio] Destination: /dl/job/Song.mp3"),
            Some(PathBuf::from("/dl/job/Song.mp3"))
        );
        assert_eq!(
            parse_destination_line(r#"[Merger] Merging formats into "/dl/job/Clip.mp4""#),
            Some(PathBuf::from("/dl/job/Clip.mp4"))
        );
        assert_eq!(parse_destination_line("[youtube] abc123: Downloading"), None);
    }

    #[test]
    fn video_info_defaults_missing_fields() {
        let info = VideoInfo::from_json(&json!({"id": "abc", "duration": 12.7}), "u");
        assert_eq!(info.video_id, "abc");
        assert_eq!(info.title, "");
        assert_eq!(info.uploader, "");
        assert_eq!(info.duration, 12);
        assert_eq!(info.url, "u");
        assert_eq!(info.available_formats, vec!["video", "audio"]);
        assert_eq!(info.available_qualities.len(), 8);

        let odd = VideoInfo::from_json(&json!({"title": null, "duration": "long"}), "u");
        assert_eq!(odd.title, "");
        assert_eq!(odd.duration, 0);
    }

    #[test]
    fn json_output_tolerates_leading_notices() {
        let raw = b"WARNING: something\n{\"id\":\"x\"}\n";
        let json = parse_json_output(raw).unwrap();
        assert_eq!(json["id"], "x");
        assert!(matches!(
            parse_json_output(b"nothing here"),
            Err(ExtractorError::InvalidJson(_))
        ));
    }

    #[test]
    fn exit_errors_embed_the_code() {
        assert_eq!(
            ExtractorError::MetadataExit(Some(2)).to_string(),
            "Failed to get video info. Exit code: 2"
        );
        assert_eq!(
            ExtractorError::DownloadExit(Some(1)).to_string(),
            "Download failed with exit code: 1"
        );
    }

    #[tokio::test]
    async fn forward_lines_decodes_lossily_and_reads_to_the_end() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let raw: &[u8] = b"first\r\ncaf\xe9 title\n[download] 100% of 1MiB";
        forward_lines(raw, tx).await;

        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line);
        }
        assert_eq!(
            lines,
            vec!["first", "caf\u{FFFD} title", "[download] 100% of 1MiB"]
        );
    }

    #[tokio::test]
    async fn locate_output_skips_partial_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Clip.mp4.part"), "x").unwrap();
        std::fs::write(dir.path().join("Clip.mp4"), "x").unwrap();
        let found = locate_output(dir.path(), None).await.unwrap();
        assert_eq!(found, dir.path().join("Clip.mp4"));

        let empty = tempfile::tempdir().unwrap();
        assert!(matches!(
            locate_output(empty.path(), None).await,
            Err(ExtractorError::NoOutput)
        ));
    }

    #[tokio::test]
    async fn locate_output_ignores_announcements_outside_the_job() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Mine.mp3"), "x").unwrap();
        let found = locate_output(dir.path(), Some(PathBuf::from("/etc/hostname")))
            .await
            .unwrap();
        assert_eq!(found, dir.path().join("Mine.mp3"));
    }

    #[cfg(unix)]
    mod with_stub {
        use super::*;
        use crate::test_support::extractor_stub;
        use std::sync::{Arc, Mutex};

        fn extractor() -> Extractor {
            Extractor::new(extractor_stub(), Duration::from_secs(10))
        }

        #[tokio::test]
        async fn fetch_info_parses_stub_output() {
            let info = extractor()
                .fetch_info("https://www.youtube.com/watch?v=abc123")
                .await
                .unwrap();
            assert_eq!(info.video_id, "abc123");
            assert_eq!(info.title, "Test Title");
            assert_eq!(info.duration, 61);
            assert_eq!(info.uploader, "Uploader");
        }

        #[tokio::test]
        async fn fetch_info_reports_exit_code() {
            let err = extractor()
                .fetch_info("https://www.youtube.com/watch?v=fail1")
                .await
                .unwrap_err();
            assert_eq!(err.to_string(), "Failed to get video info. Exit code: 3");
        }

        #[tokio::test]
        async fn fetch_info_times_out() {
            let extractor = Extractor::new(extractor_stub(), Duration::from_millis(200));
            let err = extractor
                .fetch_info("https://www.youtube.com/watch?v=slow1")
                .await
                .unwrap_err();
            assert!(matches!(err, ExtractorError::Timeout(_)));
        }

        #[tokio::test]
        async fn fetch_info_missing_binary_is_a_spawn_error() {
            let extractor = Extractor::new("/nonexistent/yt-dlp", Duration::from_secs(1));
            let err = extractor.fetch_info("https://youtu.be/abc").await.unwrap_err();
            assert!(matches!(err, ExtractorError::Spawn { .. }));
        }

        #[tokio::test]
        async fn download_streams_progress_and_finds_file() {
            let dir = tempfile::tempdir().unwrap();
            let seen = Arc::new(Mutex::new(Vec::new()));
            let sink = seen.clone();
            let path = extractor()
                .download(
                    &options(MediaFormat::Audio, "best"),
                    dir.path(),
                    &CancellationToken::new(),
                    move |update| sink.lock().unwrap().push(update.percent),
                )
                .await
                .unwrap();
            assert_eq!(path, dir.path().join("Test Title.mp3"));
            let seen = seen.lock().unwrap();
            assert!(seen.contains(&10));
            assert_eq!(seen.last(), Some(&100));
        }

        #[tokio::test]
        async fn download_survives_non_utf8_output() {
            let dir = tempfile::tempdir().unwrap();
            let mut opts = options(MediaFormat::Video, "best");
            opts.url = "https://www.youtube.com/watch?v=latin1".into();
            let seen = Arc::new(Mutex::new(Vec::new()));
            let sink = seen.clone();
            let path = extractor()
                .download(&opts, dir.path(), &CancellationToken::new(), move |update| {
                    sink.lock().unwrap().push(update.percent)
                })
                .await
                .unwrap();
            assert_eq!(path, dir.path().join("Test Title.mp4"));
            assert_eq!(seen.lock().unwrap().last(), Some(&100));
        }

        #[tokio::test]
        async fn download_failure_reports_exit_code() {
            let dir = tempfile::tempdir().unwrap();
            let mut opts = options(MediaFormat::Video, "best");
            opts.url = "https://www.youtube.com/watch?v=fail2".into();
            let err = extractor()
                .download(&opts, dir.path(), &CancellationToken::new(), |_| {})
                .await
                .unwrap_err();
            assert_eq!(err.to_string(), "Download failed with exit code: 3");
        }

        #[tokio::test]
        async fn download_without_output_is_an_error() {
            let dir = tempfile::tempdir().unwrap();
            let mut opts = options(MediaFormat::Video, "best");
            opts.url = "https://www.youtube.com/watch?v=nofile1".into();
            let err = extractor()
                .download(&opts, dir.path(), &CancellationToken::new(), |_| {})
                .await
                .unwrap_err();
            assert!(matches!(err, ExtractorError::NoOutput));
        }

        #[tokio::test]
        async fn download_can_be_cancelled() {
            let dir = tempfile::tempdir().unwrap();
            let mut opts = options(MediaFormat::Video, "best");
            opts.url = "https://www.youtube.com/watch?v=slow2".into();
            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                trigger.cancel();
            });
            let err = tokio::time::timeout(
                Duration::from_secs(5),
                extractor().download(&opts, dir.path(), &cancel, |_| {}),
            )
            .await
            .expect("cancel must stop the download promptly")
            .unwrap_err();
            assert!(matches!(err, ExtractorError::Cancelled));
        }
    }
}
