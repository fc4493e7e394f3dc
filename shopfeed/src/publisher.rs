use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::item::ShopItem;
use crate::sink::{ItemSink, SinkError, TOPIC_SHOP_ITEMS, TOPIC_SHOP_ITEMS_BIDDING};

/// One record on its way to the broker, with its topic set computed once
/// at enqueue time.
#[derive(Debug, Clone)]
pub struct PublishJob {
    pub item: ShopItem,
    pub feed_key: String,
    pub topics: Vec<&'static str>,
}

impl PublishJob {
    pub fn new(item: ShopItem, feed_key: String) -> Self {
        let mut topics = vec![TOPIC_SHOP_ITEMS];
        if item.is_bidding() {
            topics.push(TOPIC_SHOP_ITEMS_BIDDING);
        }
        PublishJob {
            item,
            feed_key,
            topics,
        }
    }
}

/// The outcome of one consumed job. Exactly one result is emitted per
/// job; the metrics fold consumes each exactly once.
#[derive(Debug)]
pub struct PublishResult {
    pub feed_key: String,
    pub item_id: String,
    pub error: Option<SinkError>,
}

/// A fixed set of workers draining one shared job channel. Workers exit
/// when the channel closes (the graceful drain) or when the token fires
/// (the abort path); either way the pool is joined before the result
/// channel closes.
pub struct PublisherPool {
    workers: JoinSet<()>,
}

impl PublisherPool {
    pub fn spawn<S>(
        sink: S,
        workers: usize,
        job_rx: mpsc::Receiver<PublishJob>,
        result_tx: mpsc::Sender<PublishResult>,
        token: CancellationToken,
    ) -> Self
    where
        S: ItemSink + Clone + 'static,
    {
        let job_rx = Arc::new(Mutex::new(job_rx));
        let mut set = JoinSet::new();
        for _ in 0..workers {
            set.spawn(worker_loop(
                sink.clone(),
                job_rx.clone(),
                result_tx.clone(),
                token.clone(),
            ));
        }
        PublisherPool { workers: set }
    }

    /// Wait for every worker. Panics inside workers are logged, never
    /// propagated; the pool always joins.
    pub async fn join(mut self) {
        while let Some(res) = self.workers.join_next().await {
            if let Err(err) = res {
                if err.is_panic() {
                    error!("publisher worker panicked: {err}");
                }
            }
        }
    }
}

async fn worker_loop<S: ItemSink>(
    sink: S,
    job_rx: Arc<Mutex<mpsc::Receiver<PublishJob>>>,
    result_tx: mpsc::Sender<PublishResult>,
    token: CancellationToken,
) {
    loop {
        let job = {
            let mut rx = job_rx.lock().await;
            tokio::select! {
                job = rx.recv() => job,
                _ = token.cancelled() => return,
            }
        };
        let Some(job) = job else {
            // Channel closed: all feed runners are done and the backlog is
            // drained.
            return;
        };

        let error = process_job(&sink, &job).await.err();
        let result = PublishResult {
            feed_key: job.feed_key,
            item_id: job.item.id.to_string(),
            error,
        };
        if result_tx.send(result).await.is_err() {
            return;
        }
    }
}

/// Publish one job: serialize once, then hit each topic in order. The
/// first failing topic short-circuits the rest.
async fn process_job<S: ItemSink>(sink: &S, job: &PublishJob) -> Result<(), SinkError> {
    let payload =
        serde_json::to_string(&job.item).map_err(|err| SinkError::Serialization(err.to_string()))?;
    for topic in &job.topics {
        sink.send_to_topic(topic, &payload).await?;
    }
    Ok(())
}
