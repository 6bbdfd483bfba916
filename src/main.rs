use std::{path::PathBuf, process::exit, sync::Arc, time::Duration};

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::{
    checkpoint::{CheckpointError, CheckpointStore},
    config::Config,
    poller::{PollError, Poller},
    shutdown::Shutdown,
    sources::vk::VkClient,
    telegram::TelegramClient,
};

mod checkpoint;
mod config;
mod content;
mod delivery;
mod download;
mod extract;
mod filter;
mod poller;
mod repost;
mod scratch;
mod shutdown;
mod slug;
mod sources;
mod telegram;
mod text;
#[cfg(test)]
mod testing;

#[derive(Parser)]
#[clap(version, about)]
struct Args {
    /// Toml configuration. See README for more info.
    #[clap(short, long, value_parser, default_value = "vktgbot.toml")]
    config: PathBuf,

    /// Checkpoint file. Can be redefined in config.
    #[clap(short, long, value_parser, default_value = "vktgbot.state.json")]
    state: String,

    /// Ignores config state file and uses the command line argument.
    #[clap(long, value_parser, default_value_t = false)]
    ignore_config_state_file: bool,

    /// Runs a single cycle and exits.
    #[clap(long, value_parser, default_value_t = false)]
    single_start: bool,
}

fn init_tracing() {
    let json = std::env::var("LOG_FORMAT").map(|v| v.eq_ignore_ascii_case("json")).unwrap_or(false);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vktgbot=info"));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();
    let args = Args::parse();

    info!("Try reading config from {}...", args.config.display());

    let cfg = match Config::load(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{e}");
            exit(1);
        }
    };

    let state_filename = if args.ignore_config_state_file {
        args.state
    } else {
        cfg.state.clone().unwrap_or(args.state)
    };

    let scratch_root = PathBuf::from(&cfg.bot.temp_dir);
    if let Err(e) = scratch::prepare_root(&scratch_root) {
        error!(path = %scratch_root.display(), "Failed to prepare temp folder: {e}");
        exit(1);
    }

    let http = reqwest::Client::new();
    let single_start = args.single_start || cfg.bot.single_start;
    let time_to_sleep = Duration::from_secs(cfg.bot.time_to_sleep);

    let poller = Poller {
        feed: Arc::new(VkClient::new(http.clone(), cfg.vk.clone())),
        channel: Arc::new(TelegramClient::new(http.clone(), cfg.telegram.token, cfg.telegram.channel)),
        downloader: Arc::new(http),
        store: CheckpointStore::new(state_filename),
        settings: cfg.bot,
        scratch_root,
    };

    info!(state = %poller.store.path().display(), "Using checkpoint file");

    let shutdown = Arc::new(Shutdown::default());
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if shutdown.watch(tokio::signal::ctrl_c).await {
                exit(130);
            }
        }
    });

    info!("Script is started.");

    while !shutdown.is_requested() {
        match poller.run_cycle().await {
            Ok(report) => info!(
                fetched = report.fetched,
                delivered = report.delivered,
                skipped = report.skipped,
                abandoned = report.abandoned_parts,
                "Cycle finished"
            ),
            Err(PollError::Checkpoint(e @ CheckpointError::Corrupt { .. })) => {
                error!("{e}");
                exit(2);
            }
            Err(e) => error!("Cycle failed: {e}"),
        }

        if single_start {
            info!("Script has successfully completed its execution");
            break;
        }

        info!("Script went to sleep for {} seconds.", time_to_sleep.as_secs());
        tokio::select! {
            _ = tokio::time::sleep(time_to_sleep) => {}
            _ = shutdown.wait() => {}
        }
    }

    info!("Script is stopped.");
}
