use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use fleet::location::LocationRecord;
use fleet::topic::CHAT_TOPIC;
use fleet::topic::LOCATION_TOPIC;
use fleet::topic::TRUCK_LOCATION_TOPIC;
use framework::config;
use framework::exception::CoreRsResult;
use framework::kafka::consumer::ConsumerConfig;
use framework::kafka::consumer::MessageConsumer;
use framework::kafka::topic::Topic;
use framework::log;
use framework::shutdown::Shutdown;
use framework::task;
use framework::web::server::HttpServerConfig;
use framework::web::server::start_http_server;
use serde::Deserialize;
use tracing::info;

use crate::gateway::BroadcastGateway;
use crate::kafka::chat_message_handler::chat_message_handler;
use crate::kafka::location_handler::location_relay_handler;
use crate::kafka::location_handler::location_view_handler;
use crate::kafka::truck_location_handler::truck_location_handler;
use crate::view::LatestValues;

mod gateway;
mod kafka;
mod view;
mod web;

#[derive(Debug, Deserialize)]
struct AppConfig {
    kafka_uri: String,
    #[serde(default)]
    groups: ConsumerGroups,
    #[serde(default = "default_subscriber_buffer")]
    subscriber_buffer: usize,
    #[serde(default = "default_max_concurrent_handlers")]
    max_concurrent_handlers: usize,
    #[serde(default = "default_startup_timeout_ms")]
    startup_timeout_ms: u64,
    #[serde(default)]
    http: HttpServerConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ConsumerGroups {
    relay: String,
    view: String,
    trucks: String,
    chat: String,
}

impl Default for ConsumerGroups {
    fn default() -> Self {
        Self {
            relay: "gps-group".to_owned(),
            view: "gps-view-group".to_owned(),
            trucks: "truck-group".to_owned(),
            chat: "consumer_1_id".to_owned(),
        }
    }
}

fn default_subscriber_buffer() -> usize {
    16
}

fn default_max_concurrent_handlers() -> usize {
    16
}

fn default_startup_timeout_ms() -> u64 {
    10_000
}

pub struct AppState {
    locations: LatestValues<LocationRecord>,
    trucks: LatestValues<String>,
    chat: LatestValues<String>,
    gateway: BroadcastGateway,
}

impl AppState {
    fn new(subscriber_buffer: usize) -> Self {
        AppState {
            locations: LatestValues::new(),
            trucks: LatestValues::new(),
            chat: LatestValues::new(),
            gateway: BroadcastGateway::new(subscriber_buffer),
        }
    }
}

#[tokio::main]
async fn main() -> CoreRsResult<()> {
    log::init();

    let config: AppConfig = config::load("assets/conf.json")?;

    let shutdown = Shutdown::new();
    let http_signal = shutdown.subscribe();
    shutdown.listen();

    let state = Arc::new(AppState::new(config.subscriber_buffer));

    let consumer_config = ConsumerConfig {
        max_concurrent_handlers: config.max_concurrent_handlers,
        startup_timeout: Duration::from_millis(config.startup_timeout_ms),
        ..ConsumerConfig::default()
    };
    let location_topic: Topic<LocationRecord> = Topic::new(LOCATION_TOPIC);

    let mut view_consumer = MessageConsumer::new(&config.kafka_uri, &config.groups.view, consumer_config.clone());
    view_consumer.add_handler(&location_topic, location_view_handler);

    let mut relay_consumer = MessageConsumer::new(&config.kafka_uri, &config.groups.relay, consumer_config.clone());
    relay_consumer.add_handler(&location_topic, location_relay_handler);

    let mut truck_consumer = MessageConsumer::new(&config.kafka_uri, &config.groups.trucks, consumer_config.clone());
    truck_consumer.add_handler(&Topic::new(TRUCK_LOCATION_TOPIC), truck_location_handler);

    let mut chat_consumer = MessageConsumer::new(&config.kafka_uri, &config.groups.chat, consumer_config);
    chat_consumer.add_handler(&Topic::new(CHAT_TOPIC), chat_message_handler);

    let mut consumers = Vec::with_capacity(4);
    for consumer in [view_consumer, relay_consumer, truck_consumer, chat_consumer] {
        consumers.push(consumer.spawn(Arc::clone(&state)).await?);
    }

    let app = Router::new().merge(web::routes()).with_state(state);
    start_http_server(app, http_signal, config.http).await?;

    for consumer in consumers {
        info!(group = consumer.group_id(), "stop kafka consumer");
        consumer.stop().await?;
    }
    task::shutdown().await;

    Ok(())
}
