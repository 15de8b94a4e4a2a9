use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_NAME: &str = "jukebox";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Prefix that marks a chat message as a command
    pub command_prefix: String,

    /// Keep downloaded media on disk for later plays
    pub cache_enabled: bool,

    /// Directory of the media cache
    pub cache_dir: PathBuf,

    /// Stream direct media URLs instead of downloading into the cache
    pub stream: bool,

    /// Resolve the next queue entry while the current one plays
    pub prefetch: bool,

    /// Leave the voice channel when the queue runs dry
    pub disconnect_when_idle: bool,

    /// Treat input that is not a URL as a search query
    pub allow_search: bool,

    /// yt-dlp executable
    pub ytdlp_path: PathBuf,

    /// ffmpeg executable, also handed to yt-dlp
    pub ffmpeg_path: Option<PathBuf>,

    /// Upper bound for a single extraction in seconds
    pub extraction_timeout: u64,

    /// Playback volume, 1.0 is unchanged
    pub volume: f32,

    /// Directory receiving decoded PCM, one file per voice channel
    pub frame_output_dir: Option<PathBuf>,

    /// Also write logs to this file
    pub log_file: Option<PathBuf>,

    /// Seconds allowed to open a connection to a media server
    pub connect_timeout: u64,

    /// Seconds without data before a media download is abandoned
    pub read_timeout: u64,

    /// User agent for media downloads
    pub user_agent: Option<String>,

    /// Enable colored output
    pub colored_output: bool,

    /// Chat platform credential, only ever read from the environment
    #[serde(skip)]
    pub discord_token: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            command_prefix: "!".to_string(),
            cache_enabled: true,
            cache_dir: PathBuf::from("cache"),
            stream: false,
            prefetch: true,
            disconnect_when_idle: true,
            allow_search: true,
            ytdlp_path: PathBuf::from("yt-dlp"),
            ffmpeg_path: None,
            extraction_timeout: 60,
            volume: 0.5,
            frame_output_dir: None,
            log_file: None,
            connect_timeout: 10,
            read_timeout: 30,
            user_agent: Some("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/136.0.0.0 Safari/537.36".to_string()),
            colored_output: true,
            discord_token: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config: Self = match config_path {
            Some(path) => {
                if path.exists() {
                    let content = std::fs::read_to_string(path)
                        .context("Failed to read configuration file")?;
                    toml::from_str(&content).context("Failed to parse configuration file")?
                } else {
                    Self::default()
                }
            }
            None => {
                // Use confy for default location
                confy::load(APP_NAME, None).context("Failed to load configuration")?
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply environment style overrides, `lookup` maps a variable name to its value
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(token) = var("DISCORD_TOKEN") {
            self.discord_token = Some(token);
        }
        if let Some(path) = var("FFMPEG_PATH") {
            self.ffmpeg_path = Some(PathBuf::from(path));
        }
        if let Some(path) = var("YTDLP_PATH") {
            self.ytdlp_path = PathBuf::from(path);
        }
        if let Some(dir) = var("JUKEBOX_CACHE_DIR") {
            self.cache_dir = PathBuf::from(dir);
        }
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.command_prefix.trim().is_empty(),
            "command_prefix must not be empty"
        );
        anyhow::ensure!(
            self.volume.is_finite() && (0.0..=2.0).contains(&self.volume),
            "volume must be between 0.0 and 2.0, got {}",
            self.volume
        );
        anyhow::ensure!(
            self.extraction_timeout > 0,
            "extraction_timeout must be positive"
        );
        anyhow::ensure!(
            self.connect_timeout > 0 && self.read_timeout > 0,
            "connect_timeout and read_timeout must be positive"
        );
        Ok(())
    }

    /// ffmpeg executable to run
    pub fn ffmpeg_binary(&self) -> PathBuf {
        self.ffmpeg_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("ffmpeg"))
    }

    /// Get default configuration file path
    pub fn default_config_path() -> Option<PathBuf> {
        confy::get_configuration_file_path(APP_NAME, None).ok()
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_string =
            toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(path, toml_string).context("Failed to write configuration file")?;

        Ok(())
    }

    /// Reset configuration to defaults and save
    pub fn reset(config_path: Option<&Path>) -> Result<()> {
        let path = config_path
            .map(|p| p.to_path_buf())
            .or_else(Self::default_config_path)
            .context("No configuration path available")?;

        let default_config = Self::default();
        default_config.save(&path)?;

        Ok(())
    }

    /// Show current configuration as a formatted string
    pub fn show(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration for display")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("DISCORD_TOKEN", "secret"),
            ("FFMPEG_PATH", "/opt/ffmpeg/bin/ffmpeg"),
            ("YTDLP_PATH", "/usr/local/bin/yt-dlp"),
            ("JUKEBOX_CACHE_DIR", "/var/cache/jukebox"),
        ]);
        let mut config = AppConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.discord_token.as_deref(), Some("secret"));
        assert_eq!(config.ffmpeg_binary(), PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(config.ytdlp_path, PathBuf::from("/usr/local/bin/yt-dlp"));
        assert_eq!(config.cache_dir, PathBuf::from("/var/cache/jukebox"));
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut config = AppConfig::default();
        config.apply_overrides(|_| Some("  ".to_string()));
        assert_eq!(config.discord_token, None);
        assert_eq!(config.ffmpeg_binary(), PathBuf::from("ffmpeg"));
        assert_eq!(config.cache_dir, PathBuf::from("cache"));
    }

    #[test]
    fn token_is_never_written() {
        let config = AppConfig {
            discord_token: Some("secret".to_string()),
            ..AppConfig::default()
        };
        let shown = config.show().unwrap();
        assert!(!shown.contains("secret"));
        assert!(shown.contains("command_prefix"));
    }

    #[test]
    fn save_and_reload_from_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("jukebox.toml");

        let config = AppConfig {
            command_prefix: "?".to_string(),
            stream: true,
            volume: 0.8,
            ..AppConfig::default()
        };
        config.save(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let loaded: AppConfig = toml::from_str(&content).unwrap();
        assert_eq!(loaded.command_prefix, "?");
        assert!(loaded.stream);
        assert_eq!(loaded.volume, 0.8);
    }

    #[test]
    fn partial_files_fall_back_to_defaults() {
        let loaded: AppConfig = toml::from_str("stream = true\n").unwrap();
        assert!(loaded.stream);
        assert_eq!(loaded.command_prefix, "!");
        assert!(loaded.prefetch);
    }

    #[test]
    fn rejects_bad_values() {
        let config = AppConfig {
            volume: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AppConfig {
            command_prefix: " ".to_string(),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AppConfig {
            read_timeout: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn network_timeouts_have_defaults() {
        let loaded: AppConfig = toml::from_str("read_timeout = 5\n").unwrap();
        assert_eq!(loaded.read_timeout, 5);
        assert_eq!(loaded.connect_timeout, 10);
        assert!(loaded.validate().is_ok());
    }
}
