//! Supervision of a running `serve`: the worker pool, the API task and the
//! shutdown signal.

use crate::error::{Error, Result};
use crate::worker::ProcessorReport;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Worker tasks yield their index alongside the loop outcome.
pub type WorkerSet = JoinSet<(usize, Result<ProcessorReport>)>;

/// Cancel `shutdown` on Ctrl-C or SIGTERM.
///
/// A signal that cannot be installed is logged and ignored; the service keeps
/// running and can still be stopped through the other signal.
pub async fn wait_for_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl-C"),
            Err(e) => {
                error!(error = %e, "failed to install Ctrl-C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
                info!("received SIGTERM");
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
        () = shutdown.cancelled() => return,
    }
    info!("shutdown requested");
    shutdown.cancel();
}

/// Wait for the workers and the API task to finish.
///
/// A failed worker, or an API task that stops before shutdown was requested,
/// cancels `shutdown` so the rest of the service winds down too. Returns the
/// first failure seen.
pub async fn supervise(
    mut workers: WorkerSet,
    mut api: JoinHandle<Result<()>>,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut first_failure: Option<Error> = None;
    let mut api_done = false;

    loop {
        tokio::select! {
            joined = workers.join_next(), if !workers.is_empty() => {
                let Some(joined) = joined else { continue };
                if let Err(e) = worker_outcome(joined) {
                    shutdown.cancel();
                    first_failure.get_or_insert(e);
                }
            }
            joined = &mut api, if !api_done => {
                api_done = true;
                let outcome = match flatten(joined) {
                    Ok(()) if !shutdown.is_cancelled() => {
                        warn!("API server stopped before shutdown was requested");
                        Err(Error::Other("API server stopped unexpectedly".to_string()))
                    }
                    Err(e) => {
                        error!(error = %e, "API server failed");
                        Err(e)
                    }
                    ok => ok,
                };
                shutdown.cancel();
                if let Err(e) = outcome {
                    first_failure.get_or_insert(e);
                }
            }
            else => break,
        }
    }

    first_failure.map_or(Ok(()), Err)
}

fn worker_outcome(
    joined: std::result::Result<(usize, Result<ProcessorReport>), JoinError>,
) -> Result<()> {
    match joined {
        Ok((n, Ok(report))) => {
            info!(
                worker = n,
                processed = report.processed,
                consume_errors = report.consume_errors,
                "worker finished"
            );
            Ok(())
        }
        Ok((n, Err(e))) => {
            error!(worker = n, error = %e, "worker failed");
            Err(e)
        }
        Err(e) => {
            error!(error = %e, "worker task panicked");
            Err(Error::Other(format!("worker task panicked: {e}")))
        }
    }
}

fn flatten(joined: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    joined.map_err(|e| Error::Other(format!("API task panicked: {e}")))?
}
