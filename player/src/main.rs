mod boundary;
mod bus;
mod cli;
mod config;
mod endpoint;
mod error;
mod event;
mod instance;
mod lock;
mod logger;
mod paths;

use clap::Parser;

use crate::boundary::ErrorBoundary;
use crate::bus::SignalBus;
use crate::event::{AppEvent, LaunchRequest};
use crate::instance::{Coordinator, HandoffOutcome, InstanceKey, Startup, APP_NAME};

/// Exit status when startup fails before the application is built.
const STARTUP_FAILURE_EXIT_CODE: i32 = 2;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = cli::Cli::parse();

    // ── Logging ───────────────────────────────────────────────────────────────
    let log_files = logger::init(paths::log_dir());

    // ── Notification bus and error boundary ──────────────────────────────────
    let (bus, mut events) = SignalBus::new();
    let boundary = ErrorBoundary::new(bus.clone());

    // ── Single-instance coordination ─────────────────────────────────────────
    let argument = cli.launch_argument();
    let coordinator = Coordinator::new(InstanceKey::new(APP_NAME), cli.runtime_dir(), bus.clone())
        .with_timeout(cli.timeout());

    let primary = match coordinator.start(argument.clone()).await {
        Ok(Startup::Primary(primary)) => primary,
        Ok(Startup::Secondary(outcome)) => {
            match outcome {
                HandoffOutcome::Delivered => {
                    log::info!("Handed '{argument}' to the running instance; exiting")
                }
                HandoffOutcome::Failed(e) => {
                    log::warn!("Could not reach the running instance ({e}); exiting anyway")
                }
            }
            log_files.close_all();
            std::process::exit(instance::DUPLICATE_INSTANCE_EXIT_CODE);
        }
        Err(e) => {
            log::error!("Startup aborted: {e}");
            log_files.close_all();
            std::process::exit(STARTUP_FAILURE_EXIT_CODE);
        }
    };

    // ── Configuration ─────────────────────────────────────────────────────────
    // Loaded by the primary only: correcting it creates the download folder.
    let config_path = cli.config_path();
    let mut current_config = config::load_or_default(&config_path).unwrap_or_else(|e| {
        log::error!("[config] Error (using defaults): {e:#}");
        config::Config::default()
    });
    if !config_path.exists() {
        if let Err(e) = config::save(&config_path, &current_config) {
            log::warn!("[config] Could not write defaults: {e:#}");
        }
    }

    // ── Background tasks ──────────────────────────────────────────────────────
    boundary.spawn(
        "config watcher",
        config::watch_config(config_path.clone(), bus.clone()),
    );

    // Graceful shutdown on Ctrl+C.
    {
        let bus = bus.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                bus.publish(AppEvent::Shutdown).await;
            }
        });
    }

    log::info!(
        "groove-player v{} started as primary instance of {}",
        env!("CARGO_PKG_VERSION"),
        coordinator.key()
    );
    handle_launch_request(&LaunchRequest::parse(argument.as_str()));

    // ── Event loop ────────────────────────────────────────────────────────────
    while let Some(evt) = events.recv().await {
        match evt {
            AppEvent::AppMessage(message) => {
                log::info!("Message from another instance: '{message}'");
                handle_launch_request(&LaunchRequest::parse(&message));
            }

            AppEvent::ConfigReloaded(new_config) => {
                log::info!("[config] Reloaded {}", config_path.display());
                // This loop is the bus's only consumer; never wait for room here.
                if config::restart_required(&current_config, &new_config) {
                    bus.try_publish(AppEvent::AppRestart);
                }
                current_config = new_config;
            }

            AppEvent::AppRestart => {
                log::warn!("Some settings take effect after restarting the application");
            }

            AppEvent::AppError(report) => {
                log::error!("[{}] {}", report.context, report.message);
            }

            AppEvent::Shutdown => {
                log::info!("Shutting down");
                break;
            }
        }
    }

    drop(primary);
    log_files.close_all();
}

/// Acts on a launch argument the way the main window would.
fn handle_launch_request(request: &LaunchRequest) {
    match request {
        LaunchRequest::ShowWindow => log::info!("Raising main window"),
        LaunchRequest::Open(path) if path.exists() => {
            log::info!("Opening {}", path.display())
        }
        LaunchRequest::Open(path) => {
            log::warn!("Cannot open {}: file does not exist", path.display())
        }
    }
}
