use crate::{
    config::AppConfig,
    error::Result,
    output::OutputManager,
};
use media_cache::{CacheConfig, MediaCache};
use media_extract::{YtDlpConfig, YtDlpExtractor};
use playback::{
    ChannelId, FfmpegConfig, FfmpegTransport, MediaResolver, PlaybackConfig, PlaybackError,
    PlaybackEvent, PlayerState, SessionEvent, SessionId, SessionManager, TransportFactory,
    UserInputError, VoiceTransport,
};
use std::{sync::Arc, time::Duration};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

/// A chat command understood by the bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Join(Option<ChannelId>),
    Leave,
    Play(String),
    Pause,
    Resume,
    Skip,
    Stop,
    Queue,
    Help(Option<String>),
}

/// Name, argument and description of every command
const COMMANDS: &[(&str, &str, &str)] = &[
    ("join", "[channel]", "Make the bot join a voice channel"),
    ("leave", "", "Make the bot leave its voice channel"),
    ("play", "<url>", "Play music from a URL, or queue it if something is playing"),
    ("pause", "", "Pause the current track"),
    ("resume", "", "Resume the paused track"),
    ("skip", "", "Skip to the next track in the queue"),
    ("stop", "", "Stop playback and clear the queue"),
    ("queue", "", "Show the current track and the queue"),
    ("help", "[command]", "List the commands, or describe one"),
];

impl BotCommand {
    /// Parse a chat message. `None` when the message is not addressed to the bot.
    pub fn parse(message: &str, prefix: &str) -> Option<std::result::Result<Self, UserInputError>> {
        let body = message.trim().strip_prefix(prefix)?;
        let (name, rest) = match body.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (body, ""),
        };
        if name.is_empty() {
            return None;
        }
        let argument = (!rest.is_empty()).then(|| rest.to_string());

        let command = match name.to_lowercase().as_str() {
            "join" => Self::Join(argument.map(ChannelId::from)),
            "leave" => Self::Leave,
            "play" => match argument {
                Some(url) => Self::Play(url),
                None => return Some(Err(UserInputError::MissingArgument("url"))),
            },
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "skip" => Self::Skip,
            "stop" => Self::Stop,
            "queue" => Self::Queue,
            "help" => Self::Help(argument.map(|topic| topic.to_lowercase())),
            other => return Some(Err(UserInputError::UnknownCommand(other.to_string()))),
        };
        Some(Ok(command))
    }
}

pub fn help_text(prefix: &str, topic: Option<&str>) -> String {
    if let Some(topic) = topic {
        let topic = topic.trim_start_matches(prefix);
        return match COMMANDS.iter().find(|(name, _, _)| *name == topic) {
            Some((name, argument, description)) => {
                format!("{prefix}{name} {argument}\n  {description}")
                    .replace(" \n", "\n")
            }
            None => format!("No command named {topic}"),
        };
    }

    let mut text = String::from("Commands:");
    for (name, argument, description) in COMMANDS {
        let usage = format!("{prefix}{name} {argument}");
        text.push_str(&format!("\n  {:<18} {description}", usage.trim_end()));
    }
    text
}

/// Who sent a command, and from where
#[derive(Debug, Clone)]
pub struct Requester {
    pub name: String,
    pub session: SessionId,
    pub voice_channel: Option<ChannelId>,
}

impl Requester {
    fn channel(&self) -> std::result::Result<ChannelId, UserInputError> {
        self.voice_channel
            .clone()
            .ok_or_else(|| UserInputError::NotInVoiceChannel(self.name.clone()))
    }
}

pub struct CommandExecutor {
    manager: Arc<SessionManager>,
    cache: MediaCache,
    output: OutputManager,
    prefix: String,
}

impl CommandExecutor {
    pub fn new(
        manager: Arc<SessionManager>,
        cache: MediaCache,
        output: OutputManager,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            manager,
            cache,
            output,
            prefix: prefix.into(),
        }
    }

    /// Wire the cache, extractor, resolver and transports described by `config`
    pub fn from_config(config: &AppConfig, stream: bool) -> Result<Self> {
        let cache = MediaCache::new(
            CacheConfig::default()
                .with_cache_dir(config.cache_dir.clone())
                .with_enabled(config.cache_enabled),
        );

        let read_timeout = Duration::from_secs(config.read_timeout);
        let mut client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .read_timeout(read_timeout);
        if let Some(user_agent) = &config.user_agent {
            client = client.user_agent(user_agent.clone());
        }
        let client = client.build()?;

        let extractor = Arc::new(YtDlpExtractor::new(
            YtDlpConfig::default()
                .with_binary(config.ytdlp_path.clone())
                .with_ffmpeg_location(config.ffmpeg_path.clone())
                .with_timeout(Duration::from_secs(config.extraction_timeout))
                .with_default_search(config.allow_search),
        ));
        let resolver = Arc::new(
            MediaResolver::new(cache.clone(), extractor, client)
                .with_search(config.allow_search)
                .with_stall_timeout(read_timeout),
        );

        let ffmpeg = FfmpegConfig::default()
            .with_binary(config.ffmpeg_binary())
            .with_volume(config.volume)
            .with_output_dir(config.frame_output_dir.clone());
        let transports: Arc<dyn TransportFactory> =
            Arc::new(move |_: &SessionId| -> Arc<dyn VoiceTransport> {
                Arc::new(FfmpegTransport::new(ffmpeg.clone()))
            });

        let playback = PlaybackConfig::default()
            .with_streaming(stream || config.stream)
            .with_prefetch(config.prefetch)
            .with_disconnect_when_idle(config.disconnect_when_idle);

        info!(
            cache_dir = %config.cache_dir.display(),
            streaming = playback.streaming,
            prefetch = playback.prefetch,
            "Playback configured"
        );

        let manager = Arc::new(SessionManager::new(playback, resolver, transports));
        Ok(Self::new(
            manager,
            cache,
            OutputManager::new(config.colored_output),
            config.command_prefix.clone(),
        ))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn output(&self) -> &OutputManager {
        &self.output
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.manager.subscribe()
    }

    /// Run one command for `requester`. Returns a direct reply, progress is
    /// reported through session events.
    pub async fn execute(
        &self,
        requester: &Requester,
        command: BotCommand,
    ) -> std::result::Result<Option<String>, PlaybackError> {
        debug!(user = %requester.name, session = %requester.session, ?command, "Executing command");
        let session = self.manager.session(&requester.session);

        match command {
            BotCommand::Join(channel) => {
                let channel = match channel {
                    Some(channel) => channel,
                    None => requester.channel()?,
                };
                session.join(channel).await?;
            }
            BotCommand::Leave => session.leave().await?,
            BotCommand::Play(url) => {
                let channel = requester.channel()?;
                session.enqueue_and_maybe_start(url, channel).await?;
            }
            BotCommand::Pause => session.pause().await?,
            BotCommand::Resume => session.resume().await?,
            BotCommand::Skip => {
                session.skip().await?;
            }
            BotCommand::Stop => {
                session.stop().await?;
            }
            BotCommand::Queue => {
                let status = session.status().await?;
                return Ok(Some(self.output.format_status(&status)));
            }
            BotCommand::Help(topic) => {
                return Ok(Some(help_text(&self.prefix, topic.as_deref())));
            }
        }
        Ok(None)
    }

    /// Queue `urls` in `session` and print events until the queue runs dry
    pub async fn play_and_wait(
        &self,
        session: &SessionId,
        urls: &[String],
        channel: ChannelId,
    ) -> Result<()> {
        let mut events = self.subscribe();
        let handle = self.manager.session(session);
        handle
            .enqueue_all_and_maybe_start(urls.to_vec(), channel)
            .await?;

        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Ok(event) if &event.session == session => {
                        println!("{}", self.output.format_event(&event));
                        match event.event {
                            PlaybackEvent::QueueFinished => {
                                let status = handle.status().await?;
                                if status.state == PlayerState::Idle && status.queue.is_empty() {
                                    break;
                                }
                                debug!(state = %status.state, pending = status.queue.len(), "Queue refilled, still waiting");
                            }
                            PlaybackEvent::NotConnected { .. } => break,
                            _ => {}
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event receiver lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, stopping playback");
                    break;
                }
            }
        }

        self.manager.shutdown().await;
        Ok(())
    }

    pub async fn cache_stats(&self) -> Result<String> {
        let stats = self.cache.stats().await?;
        Ok(self.output.format_cache_stats(self.cache.cache_dir(), &stats))
    }

    pub async fn cache_clear(&self) -> Result<usize> {
        let removed = self.cache.clear().await?;
        info!(removed, "Media cache cleared");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use playback::{
        CompletionHandle, PlayableHandle, ResolveError, ResolvedTrack, TrackEnd, TrackResolver,
        TransportError,
    };
    use std::path::PathBuf;

    /// Fails `broken` after a short delay, resolves everything else to a local file
    struct SlowFailingResolver {
        broken: String,
    }

    #[async_trait]
    impl TrackResolver for SlowFailingResolver {
        async fn resolve(
            &self,
            url: &str,
            _streaming: bool,
        ) -> std::result::Result<ResolvedTrack, ResolveError> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if url == self.broken {
                return Err(ResolveError::InvalidUrl(url.to_string()));
            }
            Ok(ResolvedTrack {
                source_url: url.to_string(),
                title: url.to_string(),
                handle: PlayableHandle::LocalFile(PathBuf::from(format!("/media/{url}.opus"))),
                cache_path: None,
                from_cache: false,
                duration: None,
            })
        }
    }

    /// Finishes every track shortly after it starts
    #[derive(Default)]
    struct InstantTransport {
        channel: Mutex<Option<ChannelId>>,
        played: Mutex<Vec<PlayableHandle>>,
    }

    #[async_trait]
    impl VoiceTransport for InstantTransport {
        async fn connect(&self, channel: &ChannelId) -> std::result::Result<(), TransportError> {
            *self.channel.lock() = Some(channel.clone());
            Ok(())
        }

        async fn move_to(&self, channel: &ChannelId) -> std::result::Result<(), TransportError> {
            *self.channel.lock() = Some(channel.clone());
            Ok(())
        }

        async fn disconnect(&self) -> std::result::Result<(), TransportError> {
            *self.channel.lock() = None;
            Ok(())
        }

        async fn play(
            &self,
            handle: PlayableHandle,
            on_complete: CompletionHandle,
        ) -> std::result::Result<(), TransportError> {
            self.played.lock().push(handle);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                on_complete.notify(TrackEnd::Finished).await;
            });
            Ok(())
        }

        async fn pause(&self) -> std::result::Result<(), TransportError> {
            Ok(())
        }

        async fn resume(&self) -> std::result::Result<(), TransportError> {
            Ok(())
        }

        async fn stop(&self) -> std::result::Result<(), TransportError> {
            Ok(())
        }

        fn is_playing(&self) -> bool {
            false
        }

        fn is_paused(&self) -> bool {
            false
        }

        fn is_connected(&self) -> bool {
            self.channel.lock().is_some()
        }

        fn current_channel(&self) -> Option<ChannelId> {
            self.channel.lock().clone()
        }
    }

    fn parse(message: &str) -> Option<std::result::Result<BotCommand, UserInputError>> {
        BotCommand::parse(message, "!")
    }

    #[test]
    fn ignores_messages_without_prefix() {
        assert_eq!(parse("hello there"), None);
        assert_eq!(parse("!"), None);
        assert_eq!(parse("  "), None);
    }

    #[test]
    fn parses_commands_case_insensitively() {
        assert_eq!(parse("!SKIP"), Some(Ok(BotCommand::Skip)));
        assert_eq!(parse("  !pause  "), Some(Ok(BotCommand::Pause)));
        assert_eq!(parse("!queue"), Some(Ok(BotCommand::Queue)));
    }

    #[test]
    fn play_keeps_the_rest_of_the_line() {
        assert_eq!(
            parse("!play https://youtu.be/dQw4w9WgXcQ"),
            Some(Ok(BotCommand::Play("https://youtu.be/dQw4w9WgXcQ".into())))
        );
        assert_eq!(
            parse("!play never gonna give you up"),
            Some(Ok(BotCommand::Play("never gonna give you up".into())))
        );
    }

    #[test]
    fn play_requires_an_argument() {
        assert_eq!(
            parse("!play   "),
            Some(Err(UserInputError::MissingArgument("url")))
        );
    }

    #[test]
    fn join_accepts_an_explicit_channel() {
        assert_eq!(parse("!join"), Some(Ok(BotCommand::Join(None))));
        assert_eq!(
            parse("!join music"),
            Some(Ok(BotCommand::Join(Some(ChannelId::from("music")))))
        );
    }

    #[test]
    fn unknown_commands_are_reported() {
        assert_eq!(
            parse("!dance now"),
            Some(Err(UserInputError::UnknownCommand("dance".into())))
        );
    }

    #[test]
    fn custom_prefix() {
        assert_eq!(BotCommand::parse("?stop", "?"), Some(Ok(BotCommand::Stop)));
        assert_eq!(BotCommand::parse("!stop", "?"), None);
    }

    #[test]
    fn help_lists_every_command() {
        let text = help_text("!", None);
        for (name, _, _) in COMMANDS {
            assert!(text.contains(&format!("!{name}")), "missing {name}");
        }
        assert_eq!(
            help_text("!", Some("!skip")),
            "!skip\n  Skip to the next track in the queue"
        );
        assert_eq!(help_text("!", Some("dance")), "No command named dance");
    }

    #[test]
    fn requester_without_channel() {
        let requester = Requester {
            name: "alice".into(),
            session: SessionId::from("guild"),
            voice_channel: None,
        };
        assert_eq!(
            requester.channel(),
            Err(UserInputError::NotInVoiceChannel("alice".into()))
        );
    }

    #[tokio::test]
    async fn play_and_wait_plays_urls_after_a_failed_first_entry() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(InstantTransport::default());
        let shared = transport.clone();
        let manager = SessionManager::new(
            PlaybackConfig::default(),
            Arc::new(SlowFailingResolver {
                broken: "broken".into(),
            }),
            Arc::new(move |_: &SessionId| -> Arc<dyn VoiceTransport> { shared.clone() }),
        );
        let executor = CommandExecutor::new(
            Arc::new(manager),
            MediaCache::new(CacheConfig::default().with_cache_dir(dir.path().to_path_buf())),
            OutputManager::new(false),
            "!",
        );

        tokio::time::timeout(
            Duration::from_secs(5),
            executor.play_and_wait(
                &SessionId::from("cli"),
                &["broken".to_string(), "song".to_string()],
                ChannelId::from("default"),
            ),
        )
        .await
        .expect("play_and_wait did not return")
        .unwrap();

        assert_eq!(
            *transport.played.lock(),
            vec![PlayableHandle::LocalFile(PathBuf::from("/media/song.opus"))]
        );
    }
}
