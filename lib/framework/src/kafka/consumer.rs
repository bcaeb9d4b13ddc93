use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use chrono::DateTime;
use futures::future::join_all;
use rdkafka::ClientConfig;
use rdkafka::Message as _;
use rdkafka::Timestamp;
use rdkafka::config::RDKafkaLogLevel;
use rdkafka::consumer::BaseConsumer;
use rdkafka::consumer::CommitMode;
use rdkafka::consumer::Consumer;
use rdkafka::error::KafkaError;
use rdkafka::message::BorrowedMessage;
use rdkafka::message::Headers;
use rdkafka::util::Timeout;
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio::task::spawn_blocking;
use tracing::error;
use tracing::info;

pub use super::message::Message;
use super::dispatch::handle_messages;
use super::message::RawMessage;
use super::message::TopicMessages;
use super::message::collect_batch;
use super::message::decode_text;
use super::topic::Topic;
use crate::exception::CoreRsResult;
use crate::exception::Exception;
use crate::task;

trait MessageHandler<S>: Send + Sync {
    fn handle(&self, state: S, messages: Vec<RawMessage>, workers: Arc<Semaphore>) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

impl<F, Fut, S> MessageHandler<S> for F
where
    F: Fn(S, Vec<RawMessage>, Arc<Semaphore>) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn handle(&self, state: S, messages: Vec<RawMessage>, workers: Arc<Semaphore>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(self(state, messages, workers))
    }
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub poll_max_wait_time: Duration,
    pub poll_max_records: usize,
    pub max_concurrent_handlers: usize,
    pub startup_timeout: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            poll_max_wait_time: Duration::from_secs(1),
            poll_max_records: 1000,
            max_concurrent_handlers: 16,
            startup_timeout: Duration::from_secs(10),
        }
    }
}

pub struct MessageConsumer<S> {
    group_id: String,
    client_config: ClientConfig,
    config: ConsumerConfig,
    handlers: HashMap<&'static str, Box<dyn MessageHandler<S>>>,
}

/// Running consumer loop, `stop` ends polling after the current batch is handled.
pub struct ConsumerHandle {
    group_id: String,
    stop_signal: broadcast::Sender<()>,
    handle: JoinHandle<CoreRsResult<()>>,
}

impl ConsumerHandle {
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub async fn stop(self) -> CoreRsResult<()> {
        if self.stop_signal.send(()).is_err() {
            info!(group = self.group_id, "kafka consumer already stopped");
        }
        self.handle.await?
    }
}

impl<S> MessageConsumer<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(bootstrap_servers: &str, group_id: &str, config: ConsumerConfig) -> Self {
        Self {
            group_id: group_id.to_owned(),
            client_config: ClientConfig::new()
                .set("group.id", group_id)
                .set("bootstrap.servers", bootstrap_servers)
                .set("enable.auto.commit", "false")
                .set_log_level(RDKafkaLogLevel::Info)
                .to_owned(),
            config,
            handlers: HashMap::new(),
        }
    }

    pub fn add_handler<H, Fut, M>(&mut self, topic: &Topic<M>, handler: H)
    where
        H: Fn(S, Message<M>) -> Fut + Copy + Send + Sync + 'static,
        Fut: Future<Output = CoreRsResult<()>> + Send + 'static,
        M: DeserializeOwned + Send + 'static,
    {
        let topic = topic.name;
        let handler = move |state: S, messages: Vec<RawMessage>, workers: Arc<Semaphore>| {
            let messages: Vec<Message<M>> = messages.into_iter().map(Message::from_raw).collect();
            handle_messages(topic, messages, handler, state, workers)
        };

        self.handlers.insert(topic, Box::new(handler));
    }

    /// Connects and polls until `shutdown_signal` fires.
    pub async fn start(self, state: S, shutdown_signal: broadcast::Receiver<()>) -> CoreRsResult<()> {
        let consumer = self.connect().await?;
        self.run(consumer, state, shutdown_signal).await
    }

    /// Connects in the caller, so an unreachable broker fails here, then polls in the background.
    pub async fn spawn(self, state: S) -> CoreRsResult<ConsumerHandle> {
        let consumer = self.connect().await?;
        let (stop_signal, receiver) = broadcast::channel(1);
        let group_id = self.group_id.clone();
        let handle = task::spawn_task(self.run(consumer, state, receiver));
        Ok(ConsumerHandle {
            group_id,
            stop_signal,
            handle,
        })
    }

    async fn connect(&self) -> CoreRsResult<Arc<BaseConsumer>> {
        if self.handlers.is_empty() {
            return Err(exception!(
                message = format!("no handler registered, group={}", self.group_id)
            ));
        }

        let consumer: BaseConsumer = self.client_config.create()?;
        let consumer = Arc::new(consumer);

        let client = Arc::clone(&consumer);
        let timeout = self.config.startup_timeout;
        spawn_blocking(move || client.fetch_metadata(None, Timeout::After(timeout)).map(|_| ()))
            .await?
            .map_err(|err| {
                exception!(
                    message = format!("kafka is not reachable, group={}", self.group_id),
                    source = err
                )
            })?;

        let topics: Vec<&str> = self.handlers.keys().copied().collect();
        consumer.subscribe(&topics)?;
        info!(group = self.group_id, "kafka consumer started, topics={:?}", topics);
        Ok(consumer)
    }

    async fn run(
        self,
        consumer: Arc<BaseConsumer>,
        state: S,
        mut shutdown_signal: broadcast::Receiver<()>,
    ) -> CoreRsResult<()> {
        let workers = Arc::new(Semaphore::new(self.config.max_concurrent_handlers.max(1)));

        while !stop_requested(&mut shutdown_signal) {
            let poller = Arc::clone(&consumer);
            let max_wait_time = self.config.poll_max_wait_time;
            let max_records = self.config.poll_max_records;
            let polled = spawn_blocking(move || poll_message_groups(&poller, max_wait_time, max_records)).await?;

            match polled {
                Ok(topic_messages) => {
                    if topic_messages.is_empty() {
                        continue;
                    }
                    let mut handles = Vec::with_capacity(topic_messages.len());
                    for (topic, messages) in topic_messages {
                        if let Some(handler) = self.handlers.get(topic.as_str()) {
                            let workers = Arc::clone(&workers);
                            handles.push(task::track(handler.handle(state.clone(), messages, workers)));
                        }
                    }
                    join_all(handles).await;
                    if let Err(e) = consumer.commit_consumer_state(CommitMode::Async) {
                        error!(group = self.group_id, error = ?e, "failed to commit messages");
                    }
                }
                Err(e) => {
                    error!(group = self.group_id, error = ?e, "failed to poll messages");
                    tokio::select! {
                        _ = shutdown_signal.recv() => break,
                        () = tokio::time::sleep(Duration::from_secs(5)) => {}
                    }
                }
            }
        }

        consumer.unsubscribe();
        info!(group = self.group_id, "kafka consumer stopped");
        Ok(())
    }
}

fn stop_requested(shutdown_signal: &mut broadcast::Receiver<()>) -> bool {
    !matches!(shutdown_signal.try_recv(), Err(TryRecvError::Empty))
}

fn poll_message_groups(consumer: &BaseConsumer, max_wait_time: Duration, max_records: usize) -> Result<TopicMessages, KafkaError> {
    let start_time = Instant::now();
    collect_batch(max_records, || {
        loop {
            let elapsed = start_time.elapsed();
            if elapsed >= max_wait_time {
                return None;
            }
            if let Some(result) = consumer.poll(Timeout::After(max_wait_time.saturating_sub(elapsed))) {
                return Some(result.map(|message| (message.topic().to_owned(), RawMessage::try_from(&message))));
            }
        }
    })
}

impl TryFrom<&BorrowedMessage<'_>> for RawMessage {
    type Error = Exception;

    fn try_from(message: &BorrowedMessage) -> CoreRsResult<RawMessage> {
        let key = message.key().map(|data| decode_text("key", data)).transpose()?;
        let payload = message
            .payload()
            .map(|data| decode_text("payload", data))
            .transpose()?
            .unwrap_or_default();

        let headers = message
            .headers()
            .map(|headers| {
                headers
                    .iter()
                    .map(|header| {
                        let value = header
                            .value
                            .map(|data| String::from_utf8_lossy(data).to_string())
                            .unwrap_or_default();
                        (header.key.to_owned(), value)
                    })
                    .collect()
            })
            .unwrap_or_default();

        let timestamp = match message.timestamp() {
            Timestamp::CreateTime(time) => DateTime::from_timestamp_millis(time),
            _ => None,
        };

        Ok(RawMessage {
            key,
            payload,
            headers,
            timestamp,
        })
    }
}
