use std::collections::HashMap;

use metrics::{counter, describe_counter, describe_gauge, gauge, Counter, Gauge};
use thiserror::Error;

use crate::feed::FeedSource;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MetricsError {
    #[error("metrics for feed '{0}' are not configured")]
    NotConfigured(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Failed,
}

struct FeedMetrics {
    processing: Gauge,
    total: Counter,
    succeeded: Counter,
    failed: Counter,
}

/// Per-feed counter bundles, keyed by the feed locator string. Built once
/// at startup from the configured feed list; operations on unknown keys
/// fail instead of auto-creating, and every handle is an atomic owned by
/// the installed recorder, so updates never block.
pub struct MetricsRegistry {
    feeds: HashMap<String, FeedMetrics>,
}

impl MetricsRegistry {
    pub fn new(feeds: &[FeedSource]) -> Self {
        let mut bundles = HashMap::new();
        for feed in feeds {
            let key = feed.key().to_string();
            let host = feed.host_label();

            let processing = format!("feed_{host}");
            let total = format!("total_processed_{host}");
            let succeeded = format!("succeeded_{host}");
            let failed = format!("failed_{host}");
            describe_gauge!(
                processing.clone(),
                format!("1 while the feed is being processed, 0 otherwise, for url: {key}")
            );
            describe_counter!(
                total.clone(),
                format!("Number of items processed for url: {key}")
            );
            describe_counter!(
                succeeded.clone(),
                format!("Number of items succeeded for url: {key}")
            );
            describe_counter!(
                failed.clone(),
                format!("Number of items failed for url: {key}")
            );

            bundles.insert(
                key,
                FeedMetrics {
                    processing: gauge!(processing),
                    total: counter!(total),
                    succeeded: counter!(succeeded),
                    failed: counter!(failed),
                },
            );
        }
        MetricsRegistry { feeds: bundles }
    }

    pub fn mark_feed_start(&self, feed_key: &str) -> Result<(), MetricsError> {
        self.bundle(feed_key)?.processing.set(1.0);
        Ok(())
    }

    pub fn mark_feed_end(&self, feed_key: &str) -> Result<(), MetricsError> {
        self.bundle(feed_key)?.processing.set(0.0);
        Ok(())
    }

    /// Account one publish result: bumps `total` plus the outcome counter,
    /// keeping `succeeded + failed == total` by construction.
    pub fn record(&self, feed_key: &str, outcome: Outcome) -> Result<(), MetricsError> {
        let bundle = self.bundle(feed_key)?;
        bundle.total.increment(1);
        match outcome {
            Outcome::Succeeded => bundle.succeeded.increment(1),
            Outcome::Failed => bundle.failed.increment(1),
        }
        Ok(())
    }

    fn bundle(&self, feed_key: &str) -> Result<&FeedMetrics, MetricsError> {
        self.feeds
            .get(feed_key)
            .ok_or_else(|| MetricsError::NotConfigured(feed_key.to_string()))
    }
}
