use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    config, ClientEvent, ClientSettings, CommandOutcome, NoticeLevel, SyncOutcome, ZoneController,
    ZoneError,
};
use shared::domain::ZoneId;
use tokio::{
    sync::broadcast::{self, error::RecvError},
    time::{Instant, MissedTickBehavior},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod render;

#[derive(Parser, Debug)]
#[command(name = "zonectl", about = "Irrigation zone control client")]
struct Cli {
    /// Settings file; `zones.toml` in the working directory when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides `api_base_url` from the settings file and environment.
    #[arg(long)]
    api_url: Option<String>,
    #[arg(long)]
    token: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch once and print every zone.
    List,
    /// Keep polling and redraw the countdown every second.
    Watch {
        /// Stop after this many seconds instead of waiting for Ctrl-C.
        #[arg(long)]
        seconds: Option<u64>,
    },
    Toggle {
        zone_id: i64,
    },
    Timer {
        zone_id: i64,
        #[arg(allow_hyphen_values = true)]
        minutes: String,
    },
    Stop {
        zone_id: i64,
    },
    Rename {
        zone_id: i64,
        name: String,
    },
    Presets,
}

fn resolve_settings(cli: &Cli) -> Result<ClientSettings> {
    let mut settings = match &cli.config {
        Some(path) => config::load_settings_from(path, |key| std::env::var(key).ok())?,
        None => config::load_settings()?,
    };
    if let Some(api_url) = &cli.api_url {
        settings.api_base_url = config::normalize_base_url(api_url)?;
    }
    if let Some(token) = &cli.token {
        settings.auth_token = Some(token.clone()).filter(|token| !token.trim().is_empty());
    }
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    if matches!(cli.command, Command::Presets) {
        println!("{}", render::presets_line());
        return Ok(());
    }

    let settings = resolve_settings(&cli)?;
    info!(api_base_url = %settings.api_base_url, "console: using zone api");
    let controller = ZoneController::from_settings(&settings)?;

    let result = run(&controller, cli.command).await;
    controller.shutdown().await;
    result
}

async fn run(controller: &Arc<ZoneController>, command: Command) -> Result<()> {
    match command {
        Command::Presets => println!("{}", render::presets_line()),
        Command::List => {
            load(controller).await?;
            print_table(controller).await;
        }
        Command::Watch { seconds } => watch(controller, seconds.map(Duration::from_secs)).await?,
        Command::Toggle { zone_id } => {
            let zone_id = ZoneId(zone_id);
            run_command(controller, zone_id, controller.toggle_pump(zone_id)).await?;
        }
        Command::Timer { zone_id, minutes } => {
            let zone_id = ZoneId(zone_id);
            run_command(
                controller,
                zone_id,
                controller.start_timer_input(zone_id, &minutes),
            )
            .await?;
        }
        Command::Stop { zone_id } => {
            let zone_id = ZoneId(zone_id);
            run_command(controller, zone_id, controller.stop_timer(zone_id)).await?;
        }
        Command::Rename { zone_id, name } => {
            let zone_id = ZoneId(zone_id);
            run_command(controller, zone_id, controller.rename(zone_id, &name)).await?;
        }
    }
    Ok(())
}

async fn load(controller: &ZoneController) -> Result<()> {
    match controller.refresh().await.context("failed to fetch zones")? {
        SyncOutcome::Applied { .. } => Ok(()),
        outcome => anyhow::bail!("zone fetch was not applied: {outcome:?}"),
    }
}

async fn print_table(controller: &ZoneController) {
    let snapshot = controller.snapshot().await;
    let views = controller.present(Instant::now()).await;
    for line in render::zone_table(&snapshot, &views) {
        println!("{line}");
    }
}

/// Commands need the zone in the local store, so every one-shot command
/// starts from a fresh fetch.
async fn run_command<F>(controller: &ZoneController, zone_id: ZoneId, command: F) -> Result<()>
where
    F: std::future::Future<Output = Result<CommandOutcome, ZoneError>>,
{
    load(controller).await?;
    let mut events = controller.subscribe_events();
    let outcome = command.await;
    print_notices(&mut events);

    match outcome.with_context(|| format!("command on zone {zone_id} failed"))? {
        CommandOutcome::Confirmed { .. } => {}
        CommandOutcome::NoChange => println!("zone {zone_id}: nothing to do"),
    }
    let snapshot = controller.snapshot().await;
    let views = controller.present(Instant::now()).await;
    if let Some(view) = views.iter().find(|view| view.id == zone_id) {
        let last_watered = snapshot.zone(zone_id).and_then(|zone| zone.last_watered);
        println!("{}", render::zone_row(view, last_watered));
    }
    Ok(())
}

fn print_notices(events: &mut broadcast::Receiver<ClientEvent>) {
    while let Ok(event) = events.try_recv() {
        if let ClientEvent::Notice(notice) = event {
            match notice.level {
                NoticeLevel::Success | NoticeLevel::Info => println!("{}", notice.message),
                NoticeLevel::Error => eprintln!("{}", notice.message),
            }
        }
    }
}

async fn watch(controller: &ZoneController, limit: Option<Duration>) -> Result<()> {
    let mut events = controller.subscribe_events();
    controller.start_polling().await;

    let deadline = limit.map(|limit| Instant::now() + limit);
    let mut redraw = tokio::time::interval(Duration::from_secs(1));
    redraw.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let until_deadline = async {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for ctrl-c")?;
                break;
            }
            _ = until_deadline => break,
            _ = redraw.tick() => {
                println!("--- {}", chrono::Local::now().format("%H:%M:%S"));
                print_table(controller).await;
            }
            event = events.recv() => match event {
                Ok(ClientEvent::SyncFailed { error, consecutive_failures }) => {
                    eprintln!("sync failed ({consecutive_failures} in a row): {error}");
                }
                Ok(ClientEvent::Notice(notice)) => println!("{}", notice.message),
                Ok(ClientEvent::PollerStopped) => break,
                Ok(ClientEvent::ZonesChanged(_)) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "console: dropped zone events");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    controller.stop_polling().await;
    Ok(())
}
