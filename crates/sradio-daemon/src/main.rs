mod amp;
mod core;
mod decoder;
mod dispatch;
mod display;
mod input;
mod keymap;
mod metadata;
mod player;
mod radio;
mod recorder;
mod system;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use sradio_proto::channels::ChannelCatalog;
use sradio_proto::config::Config;
use sradio_proto::state::StateStore;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::core::{CoreEvent, RadioCore};
use crate::display::{ConsoleDisplay, DisplayScheduler};
use crate::keymap::LircKeymap;
use crate::metadata::{ContentQueue, Layout};

/// How long the core may take to stop playback and save state.
const CORE_STOP_TIMEOUT: Duration = Duration::from_secs(10);
/// How long each worker task may take to finish after cancellation.
const TASK_JOIN_TIMEOUT: Duration = Duration::from_secs(3);

/// Internet radio appliance: streams, records and plays back radio channels.
#[derive(Parser, Debug)]
#[command(name = "simple-radio", version, about)]
struct Cli {
    /// Configuration file (default: ~/.config/simple-radio/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory recordings are written to and played from
    #[arg(short, long)]
    target_dir: Option<PathBuf>,

    /// Maximum length of a recording in minutes
    #[arg(short, long)]
    duration: Option<u64>,

    /// Verbose logging; system commands are only logged
    #[arg(long)]
    debug: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.target_dir {
            config.record.dir = dir.clone();
        }
        if let Some(minutes) = self.duration {
            config.record.duration_minutes = minutes;
        }
        if self.debug {
            config.general.debug = true;
        }
    }
}

fn init_logging(debug: bool) -> anyhow::Result<PathBuf> {
    let data_dir = sradio_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("simple-radio.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    let default_filter = if debug { "debug" } else { "info,simple_radio=info" };
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    Ok(log_path)
}

/// Resolve when a signal arrives or a system command asked us to exit.
async fn wait_for_quit(quit: &CancellationToken) -> anyhow::Result<()> {
    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            info!("received SIGINT");
        }
        _ = term.recv() => info!("received SIGTERM"),
        _ = quit.cancelled() => info!("exit requested by system command"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::config_path);
    let mut config = Config::load_from(&config_path)?;
    cli.apply(&mut config);

    let log_path = init_logging(config.general.debug)?;
    info!("Log file: {:?}", log_path);
    info!("Config loaded from: {:?}", config_path);

    // a missing channel file leaves the radio without channels, not dead
    let catalog = match ChannelCatalog::load(&config.general.channel_file) {
        Ok(catalog) => {
            info!("{} channels loaded", catalog.len());
            catalog
        }
        Err(e) => {
            error!("{}", e);
            ChannelCatalog::default()
        }
    };
    if let Err(e) = std::fs::create_dir_all(&config.record.dir) {
        warn!("recording directory {:?} unusable: {}", config.record.dir, e);
    }
    let store = StateStore::load(config.general.state_file.clone());

    let queue = ContentQueue::new();
    let quit = CancellationToken::new();
    let workers = CancellationToken::new();

    // Event channel; all inputs funnel into RadioCore
    let (event_tx, event_rx) = tokio::sync::mpsc::channel::<CoreEvent>(64);

    let core = RadioCore::new(&config, catalog, store, queue.clone(), quit.clone());
    let core_handle = tokio::spawn(core.run(event_rx));

    let mut tasks: Vec<(&str, JoinHandle<()>)> = Vec::new();

    let layout = Layout {
        rows: config.display.rows,
        cols: config.display.cols,
    };
    let sink = ConsoleDisplay::new(layout, config.display.clear_screen && !config.general.debug);
    let scheduler = DisplayScheduler::new(layout, queue);
    tasks.push((
        "display",
        tokio::spawn(scheduler.run(
            Box::new(sink),
            Duration::from_secs(config.display.scroll_secs.max(1)),
            event_tx.clone(),
            workers.clone(),
        )),
    ));

    if config.keypad.enabled {
        tasks.push((
            "keypad",
            tokio::spawn(input::run_keypad(
                config.keypad.fifo.clone(),
                event_tx.clone(),
                workers.clone(),
            )),
        ));
    }

    if config.lirc.enabled {
        let keymap = LircKeymap::from_config(&config.lirc.keys);
        if keymap.is_empty() {
            warn!("lirc enabled without key bindings");
        }
        tasks.push((
            "lirc",
            tokio::spawn(input::run_lirc(
                config.lirc.socket.clone(),
                keymap,
                event_tx.clone(),
                workers.clone(),
            )),
        ));
    }

    info!("simple-radio initialised, running event loop");
    if let Err(e) = wait_for_quit(&quit).await {
        error!("signal handling failed: {}", e);
    }

    // playback and recording stop before the workers go away
    let _ = event_tx.send(CoreEvent::Shutdown).await;
    drop(event_tx);
    match tokio::time::timeout(CORE_STOP_TIMEOUT, core_handle).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => error!("core: {}", e),
        Ok(Err(e)) => error!("core task failed: {}", e),
        Err(_) => warn!("core did not stop in time"),
    }

    workers.cancel();
    for (name, handle) in tasks {
        match tokio::time::timeout(TASK_JOIN_TIMEOUT, handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("{} task failed: {}", name, e),
            Err(_) => warn!("{} task did not stop in time", name),
        }
    }

    info!("simple-radio stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from([
            "simple-radio",
            "--target-dir",
            "/tmp/rec",
            "--duration",
            "30",
            "--debug",
        ]);
        let mut config = Config::default();
        cli.apply(&mut config);
        assert_eq!(config.record.dir, PathBuf::from("/tmp/rec"));
        assert_eq!(config.record.duration_minutes, 30);
        assert!(config.general.debug);
    }

    #[test]
    fn test_cli_defaults_leave_config_alone() {
        let cli = Cli::parse_from(["simple-radio"]);
        let mut config = Config::default();
        let before = config.record.dir.clone();
        cli.apply(&mut config);
        assert_eq!(config.record.dir, before);
        assert!(!config.general.debug);
        assert!(cli.config.is_none());
    }
}
