use std::path::Path;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use foldersync_core::SyncConfig;
use foldersync_sync::{
    PassOutcome, StopSignal, SyncError, SyncObserver, Synchronizer, TracingObserver,
};

use crate::error::{io_err, DaemonError};
use crate::log_rotation::RotatingLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Idle,
    Syncing,
}

/// Pass counts for one run of the loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub passes: usize,
    pub reconciled: usize,
    pub unchanged: usize,
    pub with_failures: usize,
    pub failed: usize,
    pub panicked: usize,
    pub interrupted: usize,
}

impl LoopSummary {
    fn record(&mut self, outcome: &Result<PassOutcome, SyncError>) {
        self.passes += 1;
        match outcome {
            Ok(PassOutcome::NoActionNeeded) => self.unchanged += 1,
            Ok(PassOutcome::Reconciled(report)) => {
                self.reconciled += 1;
                if report.has_failures() {
                    self.with_failures += 1;
                }
                if report.interrupted {
                    self.interrupted += 1;
                }
            }
            Ok(PassOutcome::Interrupted) => self.interrupted += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Start the poll loop on a fresh multi-thread runtime and block until it
/// exits (ctrl-c).
pub fn start_blocking(config: SyncConfig) -> Result<LoopSummary, DaemonError> {
    init_tracing(config.log_file.as_deref(), config.json_logs)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    let (shutdown_tx, _) = broadcast::channel::<()>(4);
    runtime.block_on(run(config, shutdown_tx))
}

/// Run the poll loop with the stock tracing observer until ctrl-c or a
/// message on `shutdown`.
pub async fn run(
    config: SyncConfig,
    shutdown: broadcast::Sender<()>,
) -> Result<LoopSummary, DaemonError> {
    run_with_observer(config, Arc::new(TracingObserver), shutdown).await
}

/// Poll loop: `Syncing` runs one pass on a blocking worker, `Idle` waits out
/// the interval. The first pass starts immediately. Pass errors and panics
/// are logged and the loop carries on; only a shutdown ends it.
pub async fn run_with_observer(
    config: SyncConfig,
    observer: Arc<dyn SyncObserver>,
    shutdown: broadcast::Sender<()>,
) -> Result<LoopSummary, DaemonError> {
    let mut shutdown_rx = shutdown.subscribe();
    let signal_handle = spawn_signal_handler(shutdown.clone());

    let stop = StopSignal::new();
    let interval = config.interval();
    tracing::info!(
        source = %config.source.display(),
        replica = %config.replica.display(),
        interval_secs = config.interval_secs,
        "starting sync loop",
    );

    let mut synchronizer = Some(build_synchronizer(&config, &observer, &stop));
    let mut summary = LoopSummary::default();
    let mut state = LoopState::Syncing;

    loop {
        match state {
            LoopState::Syncing => {
                let sync = match synchronizer.take() {
                    Some(sync) => sync,
                    None => {
                        tracing::warn!("rebuilding synchronizer after a panicked pass");
                        build_synchronizer(&config, &observer, &stop)
                    }
                };
                let handle = tokio::task::spawn_blocking(move || {
                    let mut sync = sync;
                    let outcome = sync.run_pass();
                    (sync, outcome)
                });

                match wait_for_pass(handle, &mut shutdown_rx, &stop).await {
                    Ok((sync, outcome)) => {
                        // The observer has already logged the details.
                        summary.record(&outcome);
                        synchronizer = Some(sync);
                    }
                    Err(err) => {
                        summary.passes += 1;
                        summary.panicked += 1;
                        tracing::error!(error = %err, "sync pass panicked");
                    }
                }

                if stop.is_triggered() {
                    break;
                }
                state = LoopState::Idle;
            }
            LoopState::Idle => {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => state = LoopState::Syncing,
                    _ = shutdown_rx.recv() => {
                        stop.trigger();
                        break;
                    }
                }
            }
        }
    }

    // Wakes the signal handler if the stop came from elsewhere.
    let _ = shutdown.send(());
    handle_join("signal_handler", signal_handle.await)?;

    tracing::info!(
        passes = summary.passes,
        reconciled = summary.reconciled,
        failed = summary.failed,
        "shutting down",
    );
    Ok(summary)
}

fn build_synchronizer(
    config: &SyncConfig,
    observer: &Arc<dyn SyncObserver>,
    stop: &StopSignal,
) -> Synchronizer {
    Synchronizer::new(config.clone(), observer.clone()).with_stop_signal(stop.clone())
}

/// Await the pass; a shutdown arriving meanwhile trips the stop signal so the
/// pass returns at its next checkpoint.
async fn wait_for_pass<T>(
    mut handle: JoinHandle<T>,
    shutdown_rx: &mut broadcast::Receiver<()>,
    stop: &StopSignal,
) -> Result<T, tokio::task::JoinError> {
    tokio::select! {
        joined = &mut handle => joined,
        _ = shutdown_rx.recv() => {
            tracing::info!("stop requested, waiting for the current pass");
            stop.trigger();
            handle.await
        }
    }
}

fn spawn_signal_handler(shutdown: broadcast::Sender<()>) -> JoinHandle<Result<(), DaemonError>> {
    tokio::spawn(async move {
        let mut shutdown_rx = shutdown.subscribe();
        tokio::select! {
            _ = shutdown_rx.recv() => Ok(()),
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => {
                    tracing::info!("received ctrl-c, stopping sync loop");
                    let _ = shutdown.send(());
                    Ok(())
                }
                Err(err) => Err(DaemonError::Signal(err)),
            }
        }
    })
}

fn handle_join(
    task: &'static str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Join {
            task,
            message: err.to_string(),
        }),
    }
}

/// Install the global subscriber: stdout, plus a rotating file layer when
/// `log_file` is set. `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing(log_file: Option<&Path>, json: bool) -> Result<(), DaemonError> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};
    use tracing_subscriber::{EnvFilter, Layer, Registry};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    if json {
        layers.push(fmt::layer().json().with_target(false).boxed());
    } else {
        layers.push(fmt::layer().with_target(false).boxed());
    }

    if let Some(path) = log_file {
        let writer = RotatingLog::open(path).map_err(|e| io_err(path, e))?;
        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(writer);
        if json {
            layers.push(file_layer.json().boxed());
        } else {
            layers.push(file_layer.boxed());
        }
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| DaemonError::Tracing(e.to_string()))
}
