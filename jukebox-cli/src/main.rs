mod cli;
mod commands;
mod config;
mod console;
mod error;
mod output;

use crate::{
    cli::{Args, CacheAction, Commands},
    commands::CommandExecutor,
    config::AppConfig,
    error::{AppError, Result},
};
use clap::Parser;
#[cfg(feature = "colored-output")]
use colored::*;
use playback::{ChannelId, SessionId};
use std::{path::Path, sync::Arc};
use tracing::{Level, error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

fn main() {
    if let Err(e) = bootstrap() {
        #[cfg(feature = "colored-output")]
        {
            eprintln!("{} {}", "Error:".red().bold(), e);
        }
        #[cfg(not(feature = "colored-output"))]
        {
            eprintln!("Error: {e}");
        }
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn bootstrap() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    let command = args.command.unwrap_or(Commands::Run {
        session: "console".to_string(),
        channel: None,
        user: "console".to_string(),
        stream: false,
    });

    match command {
        Commands::Completions { shell } => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Args::command();
            let bin_name = cmd.get_name().to_string();
            generate(shell, &mut cmd, bin_name, &mut std::io::stdout());
            return Ok(());
        }
        Commands::Config { show, reset } => {
            if reset {
                AppConfig::reset(args.config.as_deref())?;
                println!("✓ Configuration reset to defaults");
            } else if show {
                let config = AppConfig::load(args.config.as_deref())?;
                println!("{}", config.show()?);
            } else {
                println!(
                    "Use --show to display current configuration or --reset to reset to defaults"
                );
            }
            return Ok(());
        }
        _ => {}
    }

    let config = AppConfig::load(args.config.as_deref())?;
    let _guard = init_logging(args.verbose, args.quiet, config.log_file.as_deref())?;

    if !args.quiet {
        print_banner();
    }
    info!(
        prefix = %config.command_prefix,
        token_present = config.discord_token.is_some(),
        "Configuration loaded"
    );

    match command {
        Commands::Run {
            session,
            channel,
            user,
            stream,
        } => {
            let executor = Arc::new(CommandExecutor::from_config(&config, stream)?);
            console::run_console(
                executor,
                SessionId::from(session),
                channel.map(ChannelId::from),
                user,
            )
            .await?;
        }

        Commands::Play {
            urls,
            channel,
            stream,
        } => {
            let executor = CommandExecutor::from_config(&config, stream)?;
            executor
                .play_and_wait(&SessionId::from("cli"), &urls, ChannelId::from(channel))
                .await?;
        }

        Commands::Cache { action } => {
            let executor = CommandExecutor::from_config(&config, false)?;
            match action {
                CacheAction::Stats => println!("{}", executor.cache_stats().await?),
                CacheAction::Clear => {
                    let removed = executor.cache_clear().await?;
                    println!("✓ Removed {removed} cached track(s)");
                }
            }
        }

        Commands::Completions { .. } | Commands::Config { .. } => {}
    }

    Ok(())
}

fn print_banner() {
    println!("==================================================================");
    println!("     ██╗██╗   ██╗██╗  ██╗███████╗██████╗  ██████╗ ██╗  ██╗");
    println!("     ██║██║   ██║██║ ██╔╝██╔════╝██╔══██╗██╔═══██╗╚██╗██╔╝");
    println!("     ██║██║   ██║█████╔╝ █████╗  ██████╔╝██║   ██║ ╚███╔╝ ");
    println!("██   ██║██║   ██║██╔═██╗ ██╔══╝  ██╔══██╗██║   ██║ ██╔██╗ ");
    println!("╚█████╔╝╚██████╔╝██║  ██╗███████╗██████╔╝╚██████╔╝██╔╝ ██╗");
    println!(" ╚════╝  ╚═════╝ ╚═╝  ╚═╝╚══════╝╚═════╝  ╚═════╝ ╚═╝  ╚═╝");
    println!();
    println!("Jukebox - queued voice channel playback with a local media cache");
    println!("==================================================================");
    println!();
}

/// Console logs go to stderr, stdout belongs to the chat output
fn init_logging(verbose: bool, quiet: bool, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let directory = path.parent().filter(|p| !p.as_os_str().is_empty());
            let file_name = path.file_name().ok_or_else(|| {
                AppError::InvalidInput(format!("log file {} has no file name", path.display()))
            })?;
            let appender =
                tracing_appender::rolling::never(directory.unwrap_or(Path::new(".")), file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(verbose)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .try_init()
        .map_err(|e| AppError::Initialization(e.to_string()))?;

    Ok(guard)
}
