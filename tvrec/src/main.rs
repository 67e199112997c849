mod cli;

use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use chrono::{DateTime, Local, Utc};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cli::{Args, Commands};
use tvrec::capture::FfmpegLauncher;
use tvrec::catalog::{Channel, ChannelCatalog, PlaylistCatalog, TvheadendCatalog};
use tvrec::config::{AppConfig, SourceKind};
use tvrec::dvr::{DvrClient, DvrError, EntryCategory, TvheadendClient};
use tvrec::logging::{cleanup_old_logs, init_logging};
use tvrec::recording::{
    StartRequest, StatusRow, StopOutcome, Supervisor, SupervisorEvent, spawn_monitor,
};

const VERBOSE_LOG_FILTER: &str = "tvrec=debug,process_utils=debug";

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("Application error: {e:#}");
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    if args.verbose {
        config.logging.filter = VERBOSE_LOG_FILTER.to_string();
    }

    let _guard = init_logging(&config.logging)?;
    if let Some(dir) = &config.logging.log_dir
        && let Err(e) = cleanup_old_logs(dir, config.logging.retention_days).await
    {
        warn!(error = %e, "Failed to clean up old log files");
    }

    match args.command {
        Commands::Record {
            channel,
            id,
            uri,
            output,
            duration,
            profile,
        } => {
            let mut source = Channel::named(channel.clone());
            source.id = id;
            source.uri = uri;

            let output =
                output.unwrap_or_else(|| config.recording.output_path_for(&channel, Local::now()));
            let mut request = StartRequest::local(source, output);
            if let Some(profile) = profile.or_else(|| config.source.profile.clone()) {
                request = request.with_profile(profile);
            }
            record(&config, request, duration.map(Duration::from_secs)).await?;
        }

        Commands::Schedule {
            channel,
            id,
            minutes,
            title,
        } => {
            let supervisor = build_supervisor(&config, false).await?;
            let start = Utc::now().timestamp();
            let stop = start + i64::from(minutes) * 60;

            let mut request = StartRequest::remote(Channel::named(channel), id, start, stop)
                .with_subtitle(format!(
                    "Started at {}",
                    Local::now().format("%Y-%m-%d %H:%M:%S")
                ));
            if let Some(title) = title {
                request = request.with_title(title);
            }

            let entry = supervisor.request_start(request).await?;
            println!("Scheduled backend recording {entry} for {minutes} minutes");
        }

        Commands::Stop { id, channel } => {
            let outcome = match (id, channel) {
                (Some(id), _) => {
                    let client = build_dvr(&config)?;
                    let timeout = config.supervisor.to_supervisor_config().stop_timeout;
                    match client.stop_entry(&id, timeout).await {
                        Ok(()) => StopOutcome::Stopped,
                        Err(DvrError::NotFound(_)) => StopOutcome::AlreadyStopped,
                        Err(e) => return Err(e).context("stopping backend entry"),
                    }
                }
                (None, Some(channel)) => {
                    let supervisor = build_supervisor(&config, false).await?;
                    supervisor.stop_running_on_channel(&channel).await?
                }
                (None, None) => bail!("either --id or --channel is required"),
            };

            match outcome {
                StopOutcome::Stopped => println!("Recording stopped"),
                StopOutcome::AlreadyStopped => println!("Recording was already stopped"),
                StopOutcome::NoMatch => println!("No running recording found"),
            }
        }

        Commands::Entries => {
            let supervisor = build_supervisor(&config, false).await?;
            print_entries(&supervisor).await?;
        }

        Commands::Channels => {
            if config.source.kind != SourceKind::M3u {
                bail!("channel listing needs an M3U playlist source");
            }
            let playlist = config
                .source
                .playlist
                .as_deref()
                .context("[source] playlist is not set")?;
            let catalog = PlaylistCatalog::load(playlist, None).await?;
            for channel in catalog.channels() {
                match channel.number {
                    Some(number) => println!("{number:>4}  {}", channel.name),
                    None => println!("      {}", channel.name),
                }
            }
        }

        Commands::Config { show, reset } => {
            if reset {
                let path = AppConfig::reset(args.config.as_deref())?;
                println!("Configuration reset to defaults: {}", path.display());
            } else if show {
                println!("{}", config.show()?);
            } else {
                println!(
                    "Use --show to display current configuration or --reset to reset to defaults"
                );
            }
        }
    }

    Ok(())
}

/// Run one local capture until interrupted, timed out, or ended by itself.
async fn record(
    config: &AppConfig,
    request: StartRequest,
    duration: Option<Duration>,
) -> anyhow::Result<()> {
    let local_source = matches!(&request.channel.uri, Some(uri) if !uri.is_empty());
    let supervisor = build_supervisor(config, local_source).await?;
    let mut events = supervisor.subscribe();

    let job_id = supervisor.request_start(request).await?;

    let interval = supervisor.config().monitor_interval;
    let token = CancellationToken::new();
    let monitor = spawn_monitor(supervisor.clone(), interval, token.clone());

    let deadline = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut status_timer = tokio::time::interval(interval);
    let mut failure = None;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping recording");
                break;
            }
            _ = &mut deadline => {
                info!("Requested duration reached");
                break;
            }
            _ = status_timer.tick() => print_status(&supervisor.status()),
            event = events.recv() => match event {
                Ok(event) => {
                    println!("{}", event.description());
                    if event.job_id() != &job_id {
                        continue;
                    }
                    match event {
                        SupervisorEvent::JobCompleted { .. } => break,
                        SupervisorEvent::JobFailed { failure: reason, .. } => {
                            failure = Some(reason);
                            break;
                        }
                        _ => {}
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed supervisor events"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    supervisor.shutdown().await;
    token.cancel();
    if let Err(e) = monitor.await {
        warn!(error = %e, "Monitor task ended abnormally");
    }

    match failure {
        Some(reason) => bail!("recording failed: {reason}"),
        None => Ok(()),
    }
}

async fn build_supervisor(config: &AppConfig, direct_uri: bool) -> anyhow::Result<Arc<Supervisor>> {
    let launcher = FfmpegLauncher::new(config.recording.ffmpeg.clone());
    match launcher.detect_version() {
        Some(version) => info!(%version, "Using encoder"),
        None => warn!(
            binary = %launcher.config().binary_path,
            "ffmpeg could not be run; local recordings will fail"
        ),
    }

    let catalog = build_catalog(config, direct_uri).await?;
    let mut supervisor = Supervisor::new(
        config.supervisor.to_supervisor_config(),
        Arc::new(launcher),
        catalog,
    );
    if config.source.kind == SourceKind::Tvheadend {
        supervisor = supervisor.with_dvr(build_dvr(config)?);
    }

    Ok(Arc::new(supervisor))
}

async fn build_catalog(
    config: &AppConfig,
    direct_uri: bool,
) -> anyhow::Result<Arc<dyn ChannelCatalog>> {
    let credentials = config.source.credentials();
    if direct_uri {
        return Ok(Arc::new(PlaylistCatalog::new(Vec::new(), credentials)));
    }

    let catalog: Arc<dyn ChannelCatalog> = match config.source.kind {
        SourceKind::Tvheadend => Arc::new(TvheadendCatalog::new(&config.source.url, credentials)?),
        SourceKind::M3u => {
            let playlist = config
                .source
                .playlist
                .as_deref()
                .context("[source] playlist is required for m3u sources")?;
            Arc::new(PlaylistCatalog::load(playlist, credentials).await?)
        }
    };
    Ok(catalog)
}

fn build_dvr(config: &AppConfig) -> anyhow::Result<Arc<dyn DvrClient>> {
    let client = TvheadendClient::new(
        &config.source.url,
        config.source.credentials(),
        config.supervisor.to_supervisor_config().request_timeout,
    )?;
    Ok(Arc::new(client))
}

fn print_status(rows: &[StatusRow]) {
    for row in rows {
        println!(
            "{:<10} {:<20} {:<48} {:>10}  since {}",
            row.state.label(),
            row.channel,
            row.reference,
            row.size_label(),
            row.started_at.with_timezone(&Local).format("%H:%M:%S")
        );
    }
}

async fn print_entries(supervisor: &Supervisor) -> anyhow::Result<()> {
    let entries = supervisor.backend_entries().await?;

    let mut recording = Vec::new();
    let mut upcoming = Vec::new();
    let mut finished = Vec::new();
    let mut failed = Vec::new();
    for entry in &entries {
        match entry.category() {
            EntryCategory::Recording => recording.push((entry, None)),
            EntryCategory::Upcoming => upcoming.push((entry, None)),
            EntryCategory::Finished => finished.push((entry, None)),
            EntryCategory::Failed(message) => failed.push((entry, Some(message))),
            EntryCategory::Other => {}
        }
    }

    for (heading, group) in [
        ("Recording", recording),
        ("Upcoming", upcoming),
        ("Finished", finished),
        ("Failed", failed),
    ] {
        println!("{heading} ({})", group.len());
        for (entry, message) in group {
            let start = DateTime::from_timestamp(entry.start, 0)
                .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string());
            print!(
                "  {start}  {:<20} {} ({} min)",
                entry.channelname,
                entry.disp_title,
                entry.duration / 60
            );
            match message {
                Some(message) => println!("  [{message}]"),
                None => println!(),
            }
        }
    }

    Ok(())
}
