use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::BufReader;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::decoder::FeedDecoder;
use crate::error::{AppError, FeedError};
use crate::feed::FeedSource;
use crate::metrics::{MetricsRegistry, Outcome};
use crate::publisher::{PublishJob, PublishResult, PublisherPool};
use crate::sink::{ItemSink, KafkaSink, PrintSink};
use crate::{server, stream};

/// Resolves once the process is asked to stop. Only the periodic driver
/// consumes this: a signal means "no new passes, drain the one in
/// flight, then exit", never an immediate stop, because tearing a feed
/// down mid-publish would leave the downstream topics inconsistent.
async fn termination_signal() {
    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("failed to listen for SIGINT");
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to listen for SIGTERM");

    let received = tokio::select! {
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
    };
    info!(signal = received, "termination requested, draining before exit");
}

/// Run the service to completion with the configured sink.
pub async fn run(config: Config) -> Result<(), AppError> {
    if config.print_sink {
        run_with_sink(config, PrintSink, termination_signal()).await
    } else {
        let sink = KafkaSink::new(&config.kafka).map_err(AppError::SinkInit)?;
        run_with_sink(config, sink, termination_signal()).await
    }
}

/// Wire the pipeline around an arbitrary sink and drive it. `shutdown`
/// resolving requests a graceful stop of periodic mode: the in-flight
/// pass drains before anything is torn down, so a feed is never left
/// half-published. One-shot runs ignore it and always complete the pass.
pub async fn run_with_sink<S, F>(config: Config, sink: S, shutdown: F) -> Result<(), AppError>
where
    S: ItemSink + Clone + 'static,
    F: Future<Output = ()>,
{
    let token = CancellationToken::new();

    // The recorder must exist before any metric handle is created.
    let server_handle = if config.export_prometheus {
        let handle = server::setup_metrics_recorder();
        let router = server::setup_metrics_router(handle);
        let address = config.metrics_address;
        let server_token = token.clone();
        Some(tokio::spawn(async move {
            if let Err(err) = server::serve(router, address, server_token).await {
                error!("metrics endpoint failed: {err}");
            }
        }))
    } else {
        None
    };

    let feeds = config.feed_urls.0.clone();
    let registry = Arc::new(MetricsRegistry::new(&feeds));

    let workers = config.publisher_pool_size.max(1);
    let (job_tx, job_rx) = mpsc::channel(workers);
    let (result_tx, result_rx) = mpsc::channel(workers);
    let pool = PublisherPool::spawn(sink.clone(), workers, job_rx, result_tx, token.clone());
    let folder = tokio::spawn(fold_results(result_rx, registry.clone()));

    let outcome = match config.interval() {
        None => run_once_driver(&feeds, &job_tx, &registry).await,
        Some(interval) => {
            run_periodic_driver(&feeds, &job_tx, &registry, interval, shutdown).await
        }
    };

    // Ordered teardown. Every feed runner has exited, so dropping the job
    // sender closes the channel; workers drain the backlog and stop, then
    // the result channel closes and the fold finishes with every consumed
    // job accounted for. Only then do the HTTP endpoint and the producer
    // go away.
    drop(job_tx);
    pool.join().await;
    if let Err(err) = folder.await {
        error!("metrics fold panicked: {err}");
    }
    token.cancel();
    if let Some(handle) = server_handle {
        let _ = handle.await;
    }
    sink.close().await;

    outcome
}

/// Single pass over every configured feed, then done. One-shot mode does
/// not react to termination signals: the pass runs to completion and the
/// exit code reflects only its errors.
async fn run_once_driver(
    feeds: &[FeedSource],
    job_tx: &mpsc::Sender<PublishJob>,
    registry: &Arc<MetricsRegistry>,
) -> Result<(), AppError> {
    let errors = run_pass(feeds.to_vec(), job_tx.clone(), registry.clone()).await;
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::PassFailed(errors))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriverState {
    Idle,
    Running,
    Stopping,
}

/// Periodic driver. Runs a pass immediately, then one per tick, dropping
/// ticks that arrive while a pass is in flight so at most one pass ever
/// runs. A pass that completes with errors, or a termination signal,
/// moves the driver to Stopping; it terminates once the in-flight pass
/// has drained.
async fn run_periodic_driver<F>(
    feeds: &[FeedSource],
    job_tx: &mpsc::Sender<PublishJob>,
    registry: &Arc<MetricsRegistry>,
    interval: Duration,
    shutdown: F,
) -> Result<(), AppError>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut state = DriverState::Idle;
    let mut pass: Option<JoinHandle<Vec<FeedError>>> = None;
    // Mirrors pass.is_some(); the select guard must not borrow `pass`
    // while the join branch holds it mutably.
    let mut in_flight = false;
    let mut errors: Vec<FeedError> = Vec::new();

    loop {
        tokio::select! {
            joined = async { pass.as_mut().expect("no pass in flight").await }, if in_flight => {
                pass = None;
                in_flight = false;
                errors.extend(join_pass(joined));
                if state == DriverState::Running {
                    state = if errors.is_empty() {
                        DriverState::Idle
                    } else {
                        DriverState::Stopping
                    };
                }
            }
            _ = ticker.tick(), if state == DriverState::Idle => {
                state = DriverState::Running;
                pass = Some(tokio::spawn(run_pass(
                    feeds.to_vec(),
                    job_tx.clone(),
                    registry.clone(),
                )));
                in_flight = true;
            }
            _ = &mut shutdown, if state != DriverState::Stopping => {
                info!("received termination signal; draining the current pass");
                state = DriverState::Stopping;
            }
        }

        if !in_flight && state == DriverState::Stopping {
            if !errors.is_empty() {
                return Err(AppError::PassFailed(errors));
            }
            return Err(AppError::Terminated);
        }
    }
}

fn join_pass(joined: Result<Vec<FeedError>, tokio::task::JoinError>) -> Vec<FeedError> {
    match joined {
        Ok(errors) => errors,
        Err(err) => {
            error!("feed pass panicked: {err}");
            vec![FeedError::RunnerPanicked]
        }
    }
}

/// One traversal over all feeds: a runner task per feed, joined before
/// the pass counts as complete. Runner panics are recovered and reported
/// as feed errors.
async fn run_pass(
    feeds: Vec<FeedSource>,
    job_tx: mpsc::Sender<PublishJob>,
    registry: Arc<MetricsRegistry>,
) -> Vec<FeedError> {
    let mut runners = JoinSet::new();
    for feed in feeds {
        runners.spawn(run_feed(feed, job_tx.clone(), registry.clone()));
    }
    drop(job_tx);

    let mut errors = Vec::new();
    while let Some(joined) = runners.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!("{err}");
                errors.push(err);
            }
            Err(join_err) => {
                error!("feed runner panicked: {join_err}");
                errors.push(FeedError::RunnerPanicked);
            }
        }
    }
    errors
}

async fn run_feed(
    feed: FeedSource,
    jobs: mpsc::Sender<PublishJob>,
    registry: Arc<MetricsRegistry>,
) -> Result<(), FeedError> {
    let stream = stream::open_stream(&feed).await?;

    if let Err(err) = registry.mark_feed_start(feed.key()) {
        warn!("{err}");
    }
    let result = pump_feed(&feed, stream, &jobs).await;
    if let Err(err) = registry.mark_feed_end(feed.key()) {
        warn!("{err}");
    }
    result
}

/// Drive the decoder and forward every record to the publisher channel.
/// A full channel blocks the send, which is what slows decoding down to
/// the broker's pace. Item errors are logged and skipped; stream errors
/// end the feed.
async fn pump_feed(
    feed: &FeedSource,
    stream: stream::FeedStream,
    jobs: &mpsc::Sender<PublishJob>,
) -> Result<(), FeedError> {
    let mut decoder = FeedDecoder::new(BufReader::new(stream));
    loop {
        match decoder.next_item().await {
            Ok(Some(item)) => {
                let job = PublishJob::new(item, feed.key().to_string());
                if jobs.send(job).await.is_err() {
                    // The pool is gone; only reachable on the abort path.
                    return Ok(());
                }
            }
            Ok(None) => return Ok(()),
            Err(err) if err.is_item() => {
                warn!(feed = feed.key(), "skipping invalid item: {err}");
            }
            Err(source) => {
                return Err(FeedError::Decode {
                    url: feed.key().to_string(),
                    source,
                });
            }
        }
    }
}

/// Fold publish results into the per-feed counters. Runs until the
/// result channel closes; after it is joined, every consumed job has been
/// accounted for exactly once.
async fn fold_results(mut results: mpsc::Receiver<PublishResult>, registry: Arc<MetricsRegistry>) {
    while let Some(result) = results.recv().await {
        let outcome = match &result.error {
            Some(err) => {
                warn!(
                    feed = result.feed_key.as_str(),
                    item = result.item_id.as_str(),
                    "publish failed: {err}"
                );
                Outcome::Failed
            }
            None => Outcome::Succeeded,
        };
        if let Err(err) = registry.record(&result.feed_key, outcome) {
            warn!("failed to account publish result: {err}");
        }
    }
}
