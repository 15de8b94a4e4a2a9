use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "jukebox",
    about = "Jukebox - queued voice channel playback with a local media cache",
    version,
    author
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "JUKEBOX_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read chat commands from the console (default)
    Run {
        /// Session (guild) the console talks to
        #[arg(short, long, default_value = "console")]
        session: String,

        /// Voice channel the console user is in
        #[arg(long)]
        channel: Option<String>,

        /// Name shown in notices
        #[arg(long, default_value = "console")]
        user: String,

        /// Stream media instead of downloading it into the cache
        #[arg(long)]
        stream: bool,
    },

    /// Play URLs (or search queries) in order, then exit
    Play {
        /// URLs to queue
        #[arg(required = true)]
        urls: Vec<String>,

        /// Voice channel to play into
        #[arg(long, default_value = "default")]
        channel: String,

        /// Stream media instead of downloading it into the cache
        #[arg(long)]
        stream: bool,
    },

    /// Inspect or empty the media cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Generate shell completions
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },

    /// Show configuration information
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,

        /// Reset configuration to defaults
        #[arg(long)]
        reset: bool,
    },
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    /// Number of cached tracks and their total size
    Stats,
    /// Remove every cached track
    Clear,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn run_is_optional() {
        let args = Args::try_parse_from(["jukebox", "-v"]).unwrap();
        assert!(args.command.is_none());
        assert!(args.verbose);
    }

    #[test]
    fn play_takes_several_urls() {
        let args = Args::try_parse_from([
            "jukebox",
            "play",
            "https://youtu.be/a",
            "https://youtu.be/b",
            "--channel",
            "music",
        ])
        .unwrap();
        match args.command {
            Some(Commands::Play {
                urls,
                channel,
                stream,
            }) => {
                assert_eq!(urls, vec!["https://youtu.be/a", "https://youtu.be/b"]);
                assert_eq!(channel, "music");
                assert!(!stream);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        assert!(Args::try_parse_from(["jukebox", "-v", "-q"]).is_err());
    }

    #[test]
    fn cache_requires_an_action() {
        assert!(Args::try_parse_from(["jukebox", "cache"]).is_err());
        let args = Args::try_parse_from(["jukebox", "cache", "clear"]).unwrap();
        assert!(matches!(
            args.command,
            Some(Commands::Cache {
                action: CacheAction::Clear
            })
        ));
    }
}
