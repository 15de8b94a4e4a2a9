#[cfg(feature = "colored-output")]
use colored::*;
use media_cache::CacheStats;
use playback::{PlaybackError, PlaybackEvent, SessionEvent, SessionStatus, TrackSummary};
use std::path::Path;
use std::time::Duration;

/// Renders notices, events and reports for the console
#[derive(Debug, Clone, Copy)]
pub struct OutputManager {
    colored: bool,
}

enum Color {
    Green,
    Yellow,
    Blue,
    Cyan,
    Red,
}

impl OutputManager {
    pub fn new(colored: bool) -> Self {
        Self { colored }
    }

    pub fn format_event(&self, event: &SessionEvent) -> String {
        let session = self.colorize(&format!("[{}]", event.session), &Color::Blue, false);
        let text = match &event.event {
            PlaybackEvent::Connected { channel } => format!("Connected to {channel}"),
            PlaybackEvent::Moved { channel } => format!("Moved to {channel}"),
            PlaybackEvent::Disconnected => "Disconnected".to_string(),
            PlaybackEvent::Queued { url, position } => format!(
                "Added to the queue (#{position}): {}",
                self.colorize(url, &Color::Cyan, false)
            ),
            PlaybackEvent::NowPlaying(track) => format!(
                "{} {}",
                self.colorize("Now playing:", &Color::Green, true),
                self.format_track(track)
            ),
            PlaybackEvent::Paused => "Paused".to_string(),
            PlaybackEvent::Resumed => "Resumed".to_string(),
            PlaybackEvent::Skipped { track } => format!("Skipped {}", track.title),
            PlaybackEvent::Stopped { cleared } => {
                format!("Stopped, {cleared} queued track(s) removed")
            }
            PlaybackEvent::ResolutionFailed { url, error } => format!(
                "{} {url}: {error}",
                self.colorize("Could not load", &Color::Red, true)
            ),
            PlaybackEvent::PlaybackFailed { url, error } => format!(
                "{} {url}: {error}",
                self.colorize("Playback failed for", &Color::Red, true)
            ),
            PlaybackEvent::NotConnected { pending } => format!(
                "{} ({pending} track(s) still queued)",
                self.colorize(
                    "The bot is no longer connected to a voice channel",
                    &Color::Yellow,
                    false
                )
            ),
            PlaybackEvent::QueueFinished => "Queue finished".to_string(),
        };
        format!("{session} {text}")
    }

    pub fn format_status(&self, status: &SessionStatus) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "{} {}\n",
            self.colorize("Session:", &Color::Green, true),
            status.session
        ));
        output.push_str(&format!(
            "  {}: {}\n",
            self.colorize("State", &Color::Yellow, false),
            self.colorize(&status.state.to_string(), &Color::Cyan, false)
        ));
        output.push_str(&format!(
            "  {}: {}\n",
            self.colorize("Channel", &Color::Yellow, false),
            status
                .channel
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "-".to_string())
        ));

        if let Some(track) = &status.now_playing {
            output.push_str(&format!(
                "  {}: {}\n",
                self.colorize("Now playing", &Color::Yellow, false),
                self.format_track(track)
            ));
        }

        if status.queue.is_empty() {
            output.push_str(&format!(
                "  {}: empty\n",
                self.colorize("Queue", &Color::Yellow, false)
            ));
        } else {
            output.push_str(&format!(
                "  {}:\n",
                self.colorize("Queue", &Color::Yellow, false)
            ));
            for (index, url) in status.queue.iter().enumerate() {
                let marker = if status.prefetching.as_deref() == Some(url.as_str()) {
                    " (loading)"
                } else {
                    ""
                };
                output.push_str(&format!("    {}. {url}{marker}\n", index + 1));
            }
        }

        output.trim_end().to_string()
    }

    pub fn format_notice(&self, error: &PlaybackError) -> String {
        if error.is_user_input() {
            self.colorize(&error.to_string(), &Color::Yellow, false)
        } else {
            format!("{} {error}", self.colorize("Error:", &Color::Red, true))
        }
    }

    pub fn format_cache_stats(&self, dir: &Path, stats: &CacheStats) -> String {
        format!(
            "{}\n  {}: {}\n  {}: {}\n  {}: {}",
            self.colorize("Media cache:", &Color::Green, true),
            self.colorize("Directory", &Color::Yellow, false),
            dir.display(),
            self.colorize("Tracks", &Color::Yellow, false),
            stats.entries,
            self.colorize("Size", &Color::Yellow, false),
            format_bytes(stats.total_bytes)
        )
    }

    fn format_track(&self, track: &TrackSummary) -> String {
        let mut text = self.colorize(&track.title, &Color::Cyan, false);
        if let Some(duration) = track.duration {
            text.push_str(&format!(" [{}]", format_duration(duration)));
        }
        if track.from_cache {
            text.push_str(" (cached)");
        }
        text
    }

    fn colorize(&self, text: &str, color: &Color, bold: bool) -> String {
        #[cfg(feature = "colored-output")]
        {
            if self.colored {
                let colored_text = match color {
                    Color::Green => text.green(),
                    Color::Yellow => text.yellow(),
                    Color::Blue => text.blue(),
                    Color::Cyan => text.cyan(),
                    Color::Red => text.red(),
                };
                if bold {
                    colored_text.bold().to_string()
                } else {
                    colored_text.to_string()
                }
            } else {
                text.to_string()
            }
        }

        #[cfg(not(feature = "colored-output"))]
        {
            let _ = (color, bold);
            text.to_string()
        }
    }
}

/// `m:ss`, or `h:mm:ss` from one hour on
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
