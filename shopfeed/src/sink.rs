use std::time::Duration;

use async_trait::async_trait;
use metrics::gauge;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::KafkaConfig;

/// All items go to this topic.
pub const TOPIC_SHOP_ITEMS: &str = "shop_items";
/// Items with a positive cost-per-click additionally go here.
pub const TOPIC_SHOP_ITEMS_BIDDING: &str = "shop_items_bidding";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("failed to serialize item: {0}")]
    Serialization(String),
    #[error("send to topic '{topic}' failed: {reason}")]
    SendFailed { topic: String, reason: String },
    #[error("delivery to topic '{topic}' failed: {reason}")]
    DeliveryFailed { topic: String, reason: String },
    #[error("delivery acknowledgement for topic '{topic}' was dropped")]
    AckDropped { topic: String },
}

/// The broker primitive the publisher pool drains into: publish one
/// serialized record to one topic and wait for its acknowledgement.
#[async_trait]
pub trait ItemSink: Send + Sync {
    async fn send_to_topic(&self, topic: &str, payload: &str) -> Result<(), SinkError>;

    /// Flush anything still in flight; called once during shutdown.
    async fn close(&self) {}
}

struct KafkaContext;

impl rdkafka::ClientContext for KafkaContext {
    fn stats(&self, stats: rdkafka::Statistics) {
        gauge!("kafka_producer_queue_depth").set(stats.msg_cnt as f64);
        gauge!("kafka_callback_queue_depth").set(stats.replyq as f64);
    }
}

/// Publishes through one shared rdkafka `FutureProducer`. `send_result`
/// is the synchronous submit; the returned `DeliveryFuture` is the
/// per-submission acknowledgement channel, awaited with a bounded
/// timeout. Partition "any", no key, no headers.
#[derive(Clone)]
pub struct KafkaSink {
    producer: FutureProducer<KafkaContext>,
    delivery_timeout: Duration,
}

impl KafkaSink {
    pub fn new(config: &KafkaConfig) -> anyhow::Result<KafkaSink> {
        info!("connecting to Kafka brokers at {}...", config.kafka_hosts);

        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.kafka_hosts)
            .set("statistics.interval.ms", "10000")
            .set(
                "socket.timeout.ms",
                config.kafka_socket_timeout_ms.to_string(),
            )
            .set(
                "message.timeout.ms",
                config.kafka_message_timeout_ms.to_string(),
            )
            .set("socket.keepalive.enable", "true");

        if config.kafka_tls {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        };

        debug!("rdkafka configuration: {:?}", client_config);
        let producer: FutureProducer<KafkaContext> =
            client_config.create_with_context(KafkaContext)?;

        // Ping the cluster so a dead bootstrap address fails at startup
        // instead of on the first publish.
        producer
            .client()
            .fetch_metadata(None, Timeout::After(Duration::from_secs(10)))?;
        info!("connected to Kafka brokers");

        Ok(KafkaSink {
            producer,
            delivery_timeout: Duration::from_millis(config.kafka_delivery_timeout_ms),
        })
    }
}

#[async_trait]
impl ItemSink for KafkaSink {
    async fn send_to_topic(&self, topic: &str, payload: &str) -> Result<(), SinkError> {
        let ack = self
            .producer
            .send_result(FutureRecord {
                topic,
                payload: Some(payload),
                partition: None,
                key: None::<&str>,
                timestamp: None,
                headers: None,
            })
            .map_err(|(err, _)| SinkError::SendFailed {
                topic: topic.to_string(),
                reason: err.to_string(),
            })?;

        match tokio::time::timeout(self.delivery_timeout, ack).await {
            Err(_) => Err(SinkError::DeliveryFailed {
                topic: topic.to_string(),
                reason: "timed out waiting for the delivery acknowledgement".to_string(),
            }),
            Ok(Err(_)) => Err(SinkError::AckDropped {
                topic: topic.to_string(),
            }),
            Ok(Ok(Err((err, _)))) => Err(SinkError::DeliveryFailed {
                topic: topic.to_string(),
                reason: err.to_string(),
            }),
            Ok(Ok(Ok(_))) => Ok(()),
        }
    }

    async fn close(&self) {
        let producer = self.producer.clone();
        let flushed =
            tokio::task::spawn_blocking(move || producer.flush(Duration::from_secs(30))).await;
        match flushed {
            Ok(Ok(())) => debug!("kafka producer flushed"),
            Ok(Err(err)) => warn!("kafka producer flush failed: {err}"),
            Err(err) => error!("kafka producer flush panicked: {err}"),
        }
    }
}

/// Logs items instead of publishing them; local debugging only.
#[derive(Clone, Default)]
pub struct PrintSink;

#[async_trait]
impl ItemSink for PrintSink {
    async fn send_to_topic(&self, topic: &str, payload: &str) -> Result<(), SinkError> {
        info!(topic, payload, "item");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rdkafka::mocking::MockCluster;
    use rdkafka::producer::DefaultProducerContext;
    use rdkafka::types::{RDKafkaApiKey, RDKafkaRespErr};

    use super::*;

    fn mocked_sink() -> (MockCluster<'static, DefaultProducerContext>, KafkaSink) {
        let cluster = MockCluster::new(1).expect("failed to create mock brokers");
        let config = KafkaConfig {
            kafka_hosts: cluster.bootstrap_servers(),
            kafka_delivery_timeout_ms: 2000,
            kafka_message_timeout_ms: 500,
            kafka_socket_timeout_ms: 500,
            kafka_tls: false,
        };
        let sink = KafkaSink::new(&config).expect("failed to create sink");
        (cluster, sink)
    }

    #[tokio::test]
    async fn kafka_sink_error_handling() {
        // A mocked broker that allows injecting produce errors; cases share
        // one producer to amortize its startup cost.
        let (cluster, sink) = mocked_sink();
        let payload = r#"{"id":"abc123","priceWithVat":"10"}"#;

        // Wait out initial metadata propagation, then confirm the happy path.
        for _ in 0..20 {
            if sink.send_to_topic(TOPIC_SHOP_ITEMS, payload).await.is_ok() {
                break;
            }
        }
        sink.send_to_topic(TOPIC_SHOP_ITEMS, payload)
            .await
            .expect("failed to send initial message");

        // A sustained broker error exhausts message.timeout.ms and surfaces
        // as a delivery failure.
        let errs = [RDKafkaRespErr::RD_KAFKA_RESP_ERR_BROKER_NOT_AVAILABLE; 50];
        cluster.request_errors(RDKafkaApiKey::Produce, &errs);
        match sink.send_to_topic(TOPIC_SHOP_ITEMS, payload).await {
            Err(SinkError::DeliveryFailed { topic, .. }) => {
                assert_eq!(topic, TOPIC_SHOP_ITEMS);
            }
            other => panic!("expected delivery failure, got {other:?}"),
        }

        // Transient errors are retried within the timeout and succeed.
        cluster.clear_request_errors(RDKafkaApiKey::Produce);
        let errs = [RDKafkaRespErr::RD_KAFKA_RESP_ERR_BROKER_NOT_AVAILABLE; 2];
        cluster.request_errors(RDKafkaApiKey::Produce, &errs);
        sink.send_to_topic(TOPIC_SHOP_ITEMS, payload)
            .await
            .expect("failed to send after transient errors");
    }
}
