//! yt-dlp backed extractor.
//!
//! Runs `yt-dlp --dump-single-json` as a child process and maps its JSON
//! document onto [`MediaInfo`]. The child is killed if the extraction times
//! out or the future is dropped.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::{ExtractorError, MediaExtractor, MediaInfo};

/// Configuration for [`YtDlpExtractor`]
#[derive(Debug, Clone)]
pub struct YtDlpConfig {
    /// yt-dlp executable
    pub binary: PathBuf,
    /// Passed through as `--ffmpeg-location`
    pub ffmpeg_location: Option<PathBuf>,
    /// Format selector used when the media is streamed
    pub stream_format: String,
    /// Format selector used when the media is going to be downloaded
    pub download_format: String,
    /// Treat non-URL input as a search query
    pub default_search: bool,
    /// Upper bound for a single extraction
    pub timeout: Duration,
    /// Extra arguments inserted before the URL
    pub extra_args: Vec<String>,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("yt-dlp"),
            ffmpeg_location: None,
            stream_format: "bestaudio/best".to_string(),
            // Single-file protocols only, fragmented formats can't be fetched in one request
            download_format: "bestaudio[protocol^=http]/best[protocol^=http]/bestaudio/best"
                .to_string(),
            default_search: true,
            timeout: Duration::from_secs(60),
            extra_args: Vec::new(),
        }
    }
}

impl YtDlpConfig {
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_ffmpeg_location(mut self, location: Option<PathBuf>) -> Self {
        self.ffmpeg_location = location;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_default_search(mut self, enabled: bool) -> Self {
        self.default_search = enabled;
        self
    }
}

pub struct YtDlpExtractor {
    config: YtDlpConfig,
}

impl YtDlpExtractor {
    pub fn new(config: YtDlpConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &YtDlpConfig {
        &self.config
    }

    /// Command line for one extraction, without the binary
    fn build_args(&self, url: &str, download: bool) -> Vec<String> {
        let format = if download {
            &self.config.download_format
        } else {
            &self.config.stream_format
        };

        let mut args = vec![
            "--dump-single-json".to_string(),
            "--no-playlist".to_string(),
            "--no-check-certificates".to_string(),
            "--no-warnings".to_string(),
            "--quiet".to_string(),
            "--format".to_string(),
            format.clone(),
        ];

        if self.config.default_search {
            args.push("--default-search".to_string());
            args.push("auto".to_string());
        }

        if let Some(ffmpeg) = &self.config.ffmpeg_location {
            args.push("--ffmpeg-location".to_string());
            args.push(ffmpeg.to_string_lossy().into_owned());
        }

        args.extend(self.config.extra_args.iter().cloned());
        args.push("--".to_string());
        args.push(url.to_string());
        args
    }
}

#[async_trait]
impl MediaExtractor for YtDlpExtractor {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    async fn extract_info(&self, url: &str, download: bool) -> Result<MediaInfo, ExtractorError> {
        if url.trim().is_empty() {
            return Err(ExtractorError::InvalidUrl(url.to_string()));
        }

        let args = self.build_args(url, download);
        debug!(binary = ?self.config.binary, ?args, "Running extractor");

        let child = Command::new(&self.config.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.config.timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(ExtractorError::Spawn {
                    binary: self.config.binary.display().to_string(),
                    source,
                });
            }
            Err(_) => {
                warn!(url, timeout = ?self.config.timeout, "Extraction timed out");
                return Err(ExtractorError::Timeout(self.config.timeout));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.contains("Unsupported URL") {
                return Err(ExtractorError::UnsupportedSource(url.to_string()));
            }
            return Err(ExtractorError::Process {
                status: output.status.to_string(),
                stderr,
            });
        }

        parse_info(&output.stdout)
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawInfo {
    #[serde(rename = "_type")]
    kind: Option<String>,
    id: Option<String>,
    title: Option<String>,
    extractor: Option<String>,
    webpage_url: Option<String>,
    url: Option<String>,
    ext: Option<String>,
    http_headers: FxHashMap<String, String>,
    duration: Option<f64>,
    requested_formats: Vec<RawFormat>,
    entries: Vec<Option<RawInfo>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawFormat {
    url: Option<String>,
    ext: Option<String>,
    acodec: Option<String>,
    http_headers: FxHashMap<String, String>,
}

/// Map a yt-dlp JSON document onto [`MediaInfo`]
pub fn parse_info(json: &[u8]) -> Result<MediaInfo, ExtractorError> {
    let raw: RawInfo = serde_json::from_slice(json)?;
    Ok(raw.into())
}

impl From<RawInfo> for MediaInfo {
    fn from(raw: RawInfo) -> Self {
        let is_playlist = matches!(raw.kind.as_deref(), Some("playlist" | "multi_video"));

        let mut direct_url = raw.url;
        let mut extension = raw.ext;
        let mut http_headers = raw.http_headers;

        // Merged video+audio selections have no top level url; use the audio part
        if direct_url.is_none() {
            if let Some(audio) = raw
                .requested_formats
                .into_iter()
                .find(|f| f.url.is_some() && f.acodec.as_deref().is_some_and(|c| c != "none"))
            {
                direct_url = audio.url;
                extension = audio.ext.or(extension);
                if !audio.http_headers.is_empty() {
                    http_headers = audio.http_headers;
                }
            }
        }

        let title = raw.title.unwrap_or_default();
        MediaInfo {
            id: raw.id.unwrap_or_default(),
            title,
            extractor: raw.extractor.unwrap_or_default(),
            webpage_url: raw.webpage_url,
            direct_url,
            extension,
            http_headers,
            local_path: None,
            duration: raw.duration,
            is_playlist,
            entries: raw.entries.into_iter().flatten().map(MediaInfo::from).collect(),
        }
    }
}
