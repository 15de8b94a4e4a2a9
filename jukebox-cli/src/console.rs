use crate::{
    commands::{BotCommand, CommandExecutor, Requester},
    error::Result,
};
use playback::{ChannelId, SessionId};
use std::sync::Arc;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::{debug, info, warn};

/// Console input that is not a chat message
#[derive(Debug, Clone, PartialEq, Eq)]
enum MetaCommand {
    Quit,
    /// Move the console user to a voice channel, `None` leaves it
    Channel(Option<ChannelId>),
    Session(SessionId),
    Invalid(&'static str),
}

fn parse_meta(line: &str) -> Option<MetaCommand> {
    let line = line.trim();
    let (name, rest) = match line.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (line, ""),
    };

    match name {
        "quit" | "exit" => Some(MetaCommand::Quit),
        "channel" => Some(MetaCommand::Channel(
            (!rest.is_empty()).then(|| ChannelId::from(rest)),
        )),
        "session" if rest.is_empty() => Some(MetaCommand::Invalid("usage: session <id>")),
        "session" => Some(MetaCommand::Session(SessionId::from(rest))),
        _ => None,
    }
}

/// Read chat commands from stdin until `quit`, end of input or ctrl-c
pub async fn run_console(
    executor: Arc<CommandExecutor>,
    session: SessionId,
    channel: Option<ChannelId>,
    user: String,
) -> Result<()> {
    let mut requester = Requester {
        name: user,
        session,
        voice_channel: channel,
    };

    let mut events = executor.subscribe();
    let output = *executor.output();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => println!("{}", output.format_event(&event)),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event printer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    println!(
        "Type {}help for the commands, `channel <id>` to enter a voice channel, `quit` to exit.",
        executor.prefix()
    );
    print_location(&requester);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                None
            }
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        match parse_meta(&line) {
            Some(MetaCommand::Quit) => break,
            Some(MetaCommand::Channel(channel)) => {
                requester.voice_channel = channel;
                print_location(&requester);
                continue;
            }
            Some(MetaCommand::Session(session)) => {
                requester.session = session;
                print_location(&requester);
                continue;
            }
            Some(MetaCommand::Invalid(usage)) => {
                println!("{usage}");
                continue;
            }
            None => {}
        }

        let command = match BotCommand::parse(&line, executor.prefix()) {
            Some(Ok(command)) => command,
            Some(Err(e)) => {
                println!("{}", executor.output().format_notice(&e.into()));
                continue;
            }
            None => {
                debug!(%line, "Ignoring message without command prefix");
                continue;
            }
        };

        match executor.execute(&requester, command).await {
            Ok(Some(reply)) => println!("{reply}"),
            Ok(None) => {}
            Err(e) => println!("{}", executor.output().format_notice(&e)),
        }
    }

    executor.manager().shutdown().await;
    // The manager still holds the sender, give the printer a moment to flush
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    printer.abort();
    Ok(())
}

fn print_location(requester: &Requester) {
    match &requester.voice_channel {
        Some(channel) => println!(
            "{} in session {}, voice channel {channel}",
            requester.name, requester.session
        ),
        None => println!(
            "{} in session {}, not in a voice channel",
            requester.name, requester.session
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quit_and_exit() {
        assert_eq!(parse_meta("quit"), Some(MetaCommand::Quit));
        assert_eq!(parse_meta("  exit "), Some(MetaCommand::Quit));
    }

    #[test]
    fn channel_switch() {
        assert_eq!(
            parse_meta("channel general"),
            Some(MetaCommand::Channel(Some(ChannelId::from("general"))))
        );
        assert_eq!(parse_meta("channel"), Some(MetaCommand::Channel(None)));
    }

    #[test]
    fn session_switch() {
        assert_eq!(
            parse_meta("session other-guild"),
            Some(MetaCommand::Session(SessionId::from("other-guild")))
        );
        assert!(matches!(parse_meta("session"), Some(MetaCommand::Invalid(_))));
    }

    #[test]
    fn chat_lines_are_not_meta() {
        assert_eq!(parse_meta("!play https://youtu.be/a"), None);
        assert_eq!(parse_meta("quitting time"), None);
    }
}
