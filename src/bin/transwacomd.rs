//! `transwacomd`: the headless daemon entry point (spec §6, [NEW]).
//!
//! Loads the config and trust store, starts the Supervisor, and runs until
//! SIGINT/SIGTERM. Authorization prompts are printed to stdout; nothing
//! here calls `accept`/`decline`, so an unanswered prompt simply rides out
//! its own 30s deadline inside the Session Engine and gets refused with
//! "timeout" (spec §4.7). A real driver (tray app, web UI) is expected to
//! hold the `SupervisorHandle` this binary discards and call `accept`/
//! `decline` before that deadline.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use transwacom::config::ConfigStore;
use transwacom::{spawn_supervisor, SupervisorEvent};

fn config_path_override() -> Option<PathBuf> {
    let args: Vec<String> = std::env::args().collect();
    args.iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
}

fn verbose_requested() -> bool {
    std::env::args().any(|a| a == "--verbose" || a == "-v")
}

#[tokio::main]
async fn main() {
    if let Err(err) = transwacom::log::setup_logger(verbose_requested()) {
        eprintln!("failed to start logging: {err}");
        std::process::exit(1);
    }

    let config_path = match config_path_override() {
        Some(path) => path,
        None => match ConfigStore::default_path() {
            Ok(path) => path,
            Err(err) => {
                log::error!("{err}");
                std::process::exit(err.exit_code());
            }
        },
    };

    let (store, warning) = ConfigStore::load(&config_path);
    if let Some(err) = warning {
        log::warn!("config at {} fell back to defaults: {err}", config_path.display());
    }
    log::info!("using config at {}", config_path.display());

    let config = Arc::new(RwLock::new(store));
    // Persist so a freshly generated machine identity survives a restart.
    if let Err(err) = config.read().persist() {
        log::warn!("failed to persist config: {err}");
    }

    let (handle, mut events) = match spawn_supervisor(config.clone()).await {
        Ok(pair) => pair,
        Err(err) => {
            log::error!("failed to start supervisor: {err}");
            std::process::exit(err.exit_code());
        }
    };
    log::info!(
        "transwacomd running as \"{}\"",
        config.read().identity().machine_name
    );

    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
    {
        Ok(sig) => sig,
        Err(err) => {
            log::error!("failed to install SIGTERM handler: {err}");
            std::process::exit(1);
        }
    };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("received SIGINT, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                log::info!("received SIGTERM, shutting down");
                break;
            }
            event = events.recv() => {
                match event {
                    Some(event) => log_event(event),
                    None => {
                        log::warn!("supervisor event channel closed unexpectedly");
                        break;
                    }
                }
            }
        }
    }

    handle.shutdown().await;
    log::info!("transwacomd stopped");
}

fn log_event(event: SupervisorEvent) {
    match event {
        SupervisorEvent::SessionStateChanged { session_id, state } => {
            log::info!("session {session_id} -> {state:?}");
        }
        SupervisorEvent::AuthorizationPrompt { prompt_id, peer_name, kind } => {
            println!(
                "authorization requested by {peer_name} for a {kind} device (prompt {prompt_id}); \
                 no interactive driver is attached, this will time out and be refused in 30s"
            );
        }
        SupervisorEvent::DeviceArrived(path) => log::info!("device arrived: {path}"),
        SupervisorEvent::DeviceDeparted(path) => log::info!("device departed: {path}"),
        SupervisorEvent::Error(reason) => log::warn!("supervisor error: {reason}"),
    }
}
