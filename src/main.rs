use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info, warn};

use photo_indexer::index::ChangeMonitor;
use photo_indexer::{logging, Config, Library, PhotoIndex};

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = logging::init() {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "Photo indexer stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    // The catalog is opened here and handed to every component; nothing else owns it.
    let library = Arc::new(Library::open(&config.database_path)?);
    let interrupted = library.fail_interrupted_scan_jobs()?;
    if interrupted > 0 {
        warn!(interrupted, "Marked scans from a previous run as failed");
    }

    let stats = library.stats()?;
    info!(
        albums = stats.album_count,
        photos = stats.photo_count,
        roots = config.photo_roots.len(),
        "Photo indexer initialized"
    );

    let index = Arc::new(PhotoIndex::new(
        Arc::clone(&library),
        config.photo_roots.clone(),
        &config.scan,
    ));

    let monitor = if config.watch.enabled && !config.photo_roots.is_empty() {
        Some(ChangeMonitor::start(
            Arc::clone(index.reconciler()),
            &config.photo_roots,
            &config.watch,
        )?)
    } else {
        None
    };

    if config.initial_scan {
        match index.trigger_scan() {
            Ok(job_id) => info!(job_id = %job_id, "Initial scan started"),
            Err(err) => warn!(error = %err, "Initial scan not started"),
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    index.cancel_scans();
    if let Some(monitor) = monitor {
        monitor.shutdown().await;
    }
    Ok(())
}
