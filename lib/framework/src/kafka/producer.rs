use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::Utc;
use rdkafka::ClientConfig;
use rdkafka::message::Header;
use rdkafka::message::OwnedHeaders;
use rdkafka::producer::FutureProducer;
use rdkafka::producer::FutureRecord;
use rdkafka::producer::Producer as _;
use rdkafka::util::Timeout;
use tokio::task::spawn_blocking;
use tracing::Instrument;
use tracing::debug;
use tracing::debug_span;
use tracing::info;

use super::publisher::PublishRecord;
use super::publisher::Publisher;
use crate::exception::CoreRsResult;
use crate::log::current_action_id;

#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// upper bound for queueing plus delivery of one record
    pub message_timeout: Duration,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            message_timeout: Duration::from_secs(5),
        }
    }
}

pub struct Producer {
    producer: FutureProducer,
    client: String,
    message_timeout: Duration,
}

impl Producer {
    pub fn new(bootstrap_servers: &str, client: &str, config: ProducerConfig) -> CoreRsResult<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", bootstrap_servers)
            .set("message.timeout.ms", config.message_timeout.as_millis().to_string())
            .set("compression.codec", "zstd")
            .create()
            .map_err(|err| exception!(message = "failed to create kafka producer", source = err))?;
        Ok(Self {
            producer,
            client: client.to_owned(),
            message_timeout: config.message_timeout,
        })
    }

    /// Fetches cluster metadata once, fails if no broker answers within `timeout`.
    pub async fn check_connection(&self, timeout: Duration) -> CoreRsResult<()> {
        let producer = self.producer.clone();
        spawn_blocking(move || producer.client().fetch_metadata(None, Timeout::After(timeout)).map(|_| ()))
            .await?
            .map_err(|err| exception!(message = "kafka is not reachable", source = err))?;
        info!(client = self.client, "kafka producer connected");
        Ok(())
    }

    async fn send(&self, record: PublishRecord) -> CoreRsResult<()> {
        let span = debug_span!("kafka", topic = record.topic, key = record.key);
        async {
            debug!(kafka_write_entries = 1, kafka_write_bytes = record.payload.len(), "stats");

            let mut future_record = FutureRecord::<String, String>::to(record.topic)
                .timestamp(Utc::now().timestamp_millis())
                .payload(&record.payload);

            if let Some(ref key) = record.key {
                future_record = future_record.key(key);
            }

            let mut headers = insert_header(OwnedHeaders::new(), "client", &self.client);
            if let Some(ref ref_id) = current_action_id() {
                headers = insert_header(headers, "ref_id", ref_id);
            }
            future_record = future_record.headers(headers);

            debug!(topic = record.topic, key = record.key, payload = record.payload, "send");
            if let Err((err, _)) = self
                .producer
                .send(future_record, Timeout::After(self.message_timeout))
                .await
            {
                return Err(exception!(
                    message = format!("failed to publish, topic={}", record.topic),
                    source = err
                ));
            }
            Ok(())
        }
        .instrument(span)
        .await
    }
}

impl Publisher for Producer {
    fn publish(&self, record: PublishRecord) -> Pin<Box<dyn Future<Output = CoreRsResult<()>> + Send + '_>> {
        Box::pin(self.send(record))
    }
}

fn insert_header(headers: OwnedHeaders, key: &str, value: &str) -> OwnedHeaders {
    headers.insert(Header {
        key,
        value: Some(value.as_bytes()),
    })
}
