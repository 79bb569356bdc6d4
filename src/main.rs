//! Kiln - scss/shtml/js static site builder with live reload.

mod build;
mod cli;
mod compiler;
mod config;
mod error;
mod logger;
mod reload;
mod serve;
mod utils;
mod watch;

use anyhow::{Context, Result, anyhow};
use build::BuildReport;
use clap::Parser;
use cli::{Cli, Mode};
use compiler::Compilers;
use config::SiteConfig;
use reload::LiveReload;
use serve::DevServer;
use std::sync::Arc;
use tokio::sync::Notify;
use watch::{Reconciler, WatchSession};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Arc::new(SiteConfig::load(&cli)?);

    // Cooperative single-threaded scheduling: every build and watch task
    // shares this one thread and yields at each filesystem or process call.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(run(config))
}

async fn run(config: Arc<SiteConfig>) -> Result<()> {
    log!("build"; "{} build of {}", config.mode.name(), config.source().display());
    if config.config_path.is_file() {
        log!("config"; "using {}", config.config_path.display());
    }

    let compilers = Compilers::from_config(Arc::clone(&config));
    let report = build::full_build(&compilers)
        .await
        .context("Build failed")?;

    match config.mode {
        Mode::Production => {
            finish_production(&config, report);
            Ok(())
        }
        Mode::Development => develop(compilers).await,
    }
}

/// Report and optionally reveal the output tree.
fn finish_production(config: &SiteConfig, report: BuildReport) {
    if !report.is_clean() {
        log!("build"; "{} files failed, see errors above", report.failed);
    }

    if config.build.open
        && let Err(err) = utils::exec::open_in_file_browser(config.output())
    {
        log!("build"; "could not open {}: {err}", config.output().display());
    }
}

/// Serve the output tree and reconcile source changes until Ctrl+C.
async fn develop(compilers: Compilers) -> Result<()> {
    let config = compilers.config();

    let server = DevServer::bind(&config.serve.interface, config.serve.port)?;
    let addr = server.addr();
    let reload = Arc::new(LiveReload::start(addr.ip(), addr.port().saturating_add(1))?);
    let session = WatchSession::start(compilers.mapping())?;

    // Set up Ctrl+C handler for graceful shutdown
    let shutdown = Arc::new(Notify::new());
    let stop_server = server.shutdown_handle();
    let notify = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        log!("serve"; "shutting down...");
        stop_server();
        notify.notify_one();
    })
    .context("Failed to set Ctrl+C handler")?;

    let stop_on_watch_end = server.shutdown_handle();
    let http = server.spawn(config.output().to_path_buf(), reload.port());
    let reconciler = Arc::new(Reconciler::new(compilers.clone(), reload));

    tokio::select! {
        () = session.run(reconciler) => {
            log!("watch"; "watcher stopped");
            stop_on_watch_end();
        }
        () = shutdown.notified() => {}
    }

    http.join().map_err(|_| anyhow!("server thread panicked"))
}
