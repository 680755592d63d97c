//! # jukeboxd
//!
//! Keeps MPD queues playing: random songs or albums are appended whenever a
//! partition's queue runs low, with recently played and already queued
//! material left out.
//!
//! ## Usage
//!
//! ```bash
//! # Serve in the foreground
//! jukeboxd run
//!
//! # Or in the background
//! jukeboxd daemon start
//!
//! # Add five albums right now
//! jukeboxd fill 5 --albums
//! ```
//!
//! Logging is controlled through `RUST_LOG`, e.g.
//! `RUST_LOG=jukeboxd::jukebox=debug jukeboxd run`.

use anyhow::{bail, Context as _, Result};
use clap::{CommandFactory, Parser};
use jukeboxd::cache::{CacheKind, CacheKinds};
use jukeboxd::cli::{self, DaemonAction};
use jukeboxd::completion;
use jukeboxd::config::{self, Config};
use jukeboxd::context::{Command, Context, Reply};
use jukeboxd::daemon::{self, Partition, PlayerService};
use jukeboxd::events::{JsonNotifier, LogNotifier, Notifier};
use jukeboxd::history::PlayHistory;
use jukeboxd::mpd_client::MpcClient;
use jukeboxd::mpd_config;
use jukeboxd::work_queue::Timeout;
use log::{debug, info, warn};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

const FILL_REQUEST_ID: u64 = 1;

fn main() -> Result<()> {
    env_logger::init();

    let args = cli::Args::parse();
    let config_path = match args.config {
        Some(path) => path,
        None => config::default_config_path()?,
    };

    match args.command {
        cli::Command::Run => {
            let config = load_config(&config_path)?;
            let pid_file = config::pid_file_path()?;
            if daemon::is_daemon_running(&pid_file)? {
                bail!("jukeboxd is already running (see {})", pid_file.display());
            }
            run_service(&config, &pid_file)?;
        }
        cli::Command::Daemon { action } => {
            let pid_file = config::pid_file_path()?;
            match action {
                DaemonAction::Start => {
                    if daemon::is_daemon_running(&pid_file)? {
                        eprintln!("Daemon is already running");
                        return Ok(());
                    }
                    let config = load_config(&config_path)?;

                    match unsafe { libc::fork() } {
                        0 => {
                            let result = run_service(&config, &pid_file);
                            if let Err(e) = &result {
                                log::error!("Daemon exited with error: {e:#}");
                            }
                            std::process::exit(i32::from(result.is_err()));
                        }
                        pid if pid > 0 => {
                            println!("Starting jukeboxd...");
                            std::thread::sleep(std::time::Duration::from_millis(500));

                            if daemon::is_daemon_running(&pid_file)? {
                                println!("Daemon started successfully (PID: {pid})");
                            } else {
                                eprintln!("Failed to start daemon");
                            }
                        }
                        _ => bail!("Failed to fork process"),
                    }
                }
                DaemonAction::Stop => {
                    if daemon::stop_daemon(&pid_file)? {
                        println!("Daemon stopped");
                    } else {
                        println!("Daemon is not running");
                    }
                }
                DaemonAction::Status => {
                    if daemon::is_daemon_running(&pid_file)? {
                        println!("Daemon is running");
                    } else {
                        println!("Daemon is not running");
                    }
                }
            }
        }
        cli::Command::Fill {
            count,
            albums,
            partition,
        } => {
            let config = load_config(&config_path)?;
            let mut service = build_service(&config)?;
            if albums {
                service
                    .rebuild_now(CacheKinds::only(CacheKind::Albums))
                    .context("Failed to build the album cache")?;
            }

            let ctx = Arc::clone(service.context());
            ctx.request(
                FILL_REQUEST_ID,
                Command::FillJukebox {
                    partition,
                    count,
                    albums,
                },
            );
            service.drain(Timeout::NoWait);

            match ctx.wait_reply(FILL_REQUEST_ID, Timeout::NoWait) {
                Some(Reply::Filled { partition, added }) => {
                    let what = if albums { "album(s)" } else { "song(s)" };
                    println!("Added {added} {what} to {partition}");
                }
                Some(Reply::Failed(message)) => bail!("Fill failed: {message}"),
                other => bail!("Unexpected reply to fill request: {other:?}"),
            }
        }
        cli::Command::RebuildCache => {
            let config = load_config(&config_path)?;
            let mut service = build_service(&config)?;
            service
                .rebuild_now(CacheKinds::ALL)
                .context("Cache rebuild failed")?;

            let caches = service.caches();
            if let Some(albums) = caches.albums() {
                println!(
                    "Albums:   {} ({} songs without album tags)",
                    albums.len(),
                    albums.skipped()
                );
            }
            if let Some(stickers) = caches.stickers() {
                println!("Stickers: {} songs", stickers.len());
            }
        }
        cli::Command::Completion { shell } => {
            let mut cmd = cli::Args::command();
            completion::generate_completions(completion::shell_to_completion_shell(&shell), &mut cmd);
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<Config> {
    Config::load(path).with_context(|| format!("Failed to load config from {}", path.display()))
}

/// One `mpc` client per configured partition, wired into a service
fn build_service(config: &Config) -> Result<PlayerService<MpcClient>> {
    if config.partitions.is_empty() {
        bail!("No partitions configured");
    }
    let data_dir = config::get_data_dir()?;

    let sticker_db = config
        .sticker_db
        .clone()
        .or_else(mpd_config::find_sticker_file);
    match &sticker_db {
        Some(path) => debug!("Using sticker database {}", path.display()),
        None if config.stickers_cache => {
            warn!("No MPD sticker database found; ratings and play counts are unavailable")
        }
        None => {}
    }

    let partitions: Vec<_> = config
        .partitions
        .iter()
        .map(|p| {
            Partition::new(
                &p.name,
                MpcClient::with_host(p.host.clone(), p.port),
                p.jukebox.clone(),
            )
        })
        .collect();

    let version = partitions[0]
        .player()
        .check()
        .context("Could not reach MPD through mpc. Is mpc installed and MPD running?")?;
    info!("Connected: {version}");

    let history = PlayHistory::with_limits(
        config.history_path(&data_dir),
        config.history_rotate_size,
        config.history_max_entries,
    );

    let notifier: Arc<dyn Notifier> = if config.json_events {
        Arc::new(JsonNotifier::new(io::stdout()))
    } else {
        Arc::new(LogNotifier)
    };

    Ok(PlayerService::new(
        Arc::new(Context::new()),
        partitions,
        history,
        notifier,
        config.service_options(sticker_db),
    ))
}

fn run_service(config: &Config, pid_file: &Path) -> Result<()> {
    let mut service = build_service(config)?;

    let ctx = Arc::clone(service.context());
    ctrlc::set_handler(move || {
        info!("Shutdown requested");
        ctx.shutdown();
    })
    .context("Failed to install the signal handler")?;

    daemon::write_pid_file(pid_file)?;
    let result = service.run();
    if let Err(e) = fs::remove_file(pid_file) {
        debug!("PID file not removed: {e}");
    }
    result.context("Player service failed")
}
