use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use fleet::location::LocationRecord;
use fleet::topic::LOCATION_TOPIC;
use fleet::topic::TRUCK_LOCATION_TOPIC;
use framework::config;
use framework::exception::CoreRsResult;
use framework::kafka::producer::Producer;
use framework::kafka::producer::ProducerConfig;
use framework::kafka::publisher::Publisher;
use framework::kafka::topic::Topic;
use framework::log;
use framework::schedule::Scheduler;
use framework::shutdown::Shutdown;
use framework::task;
use framework::validation_error;
use framework::web::server::HttpServerConfig;
use framework::web::server::start_http_server;
use serde::Deserialize;
use tracing::info;

use crate::generator::CoordinateGenerator;
use crate::generator::GeneratorMode;
use crate::job::publish_location_job;
use crate::job::publish_truck_locations_job;

mod generator;
mod job;

#[derive(Debug, Deserialize)]
struct AppConfig {
    kafka_uri: String,
    #[serde(default = "default_vehicle_id")]
    vehicle_id: String,
    #[serde(default = "default_interval_ms")]
    interval_ms: u64,
    #[serde(default)]
    generator: GeneratorMode,
    #[serde(default)]
    truck_ids: Vec<String>,
    #[serde(default = "default_truck_interval_ms")]
    truck_interval_ms: u64,
    #[serde(default = "default_timeout_ms")]
    publish_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    startup_timeout_ms: u64,
    #[serde(default = "default_http")]
    http: HttpServerConfig,
}

fn default_vehicle_id() -> String {
    "car-1".to_owned()
}

fn default_interval_ms() -> u64 {
    2000
}

fn default_truck_interval_ms() -> u64 {
    5000
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_http() -> HttpServerConfig {
    HttpServerConfig {
        bind_address: "0.0.0.0:8081".to_owned(),
    }
}

impl AppConfig {
    fn validate(&self) -> CoreRsResult<()> {
        if self.vehicle_id.is_empty() {
            return Err(validation_error!(message = "vehicle_id must not be empty"));
        }
        if self.interval_ms == 0 || self.truck_interval_ms == 0 {
            return Err(validation_error!(message = "publish interval must be positive"));
        }
        if self.truck_ids.iter().any(String::is_empty) {
            return Err(validation_error!(message = "truck_ids must not contain empty id"));
        }
        Ok(())
    }
}

struct Topics {
    location: Topic<LocationRecord>,
    truck_location: Topic<String>,
}

pub struct AppState {
    topics: Topics,
    publisher: Arc<dyn Publisher>,
    vehicle_id: String,
    generator: CoordinateGenerator,
    truck_ids: Vec<String>,
    truck_generator: CoordinateGenerator,
}

impl AppState {
    fn new(config: &AppConfig, publisher: Arc<dyn Publisher>) -> CoreRsResult<Self> {
        Ok(AppState {
            topics: Topics {
                location: Topic::new(LOCATION_TOPIC),
                truck_location: Topic::new(TRUCK_LOCATION_TOPIC),
            },
            publisher,
            vehicle_id: config.vehicle_id.clone(),
            generator: CoordinateGenerator::new(config.generator.clone())?,
            truck_ids: config.truck_ids.clone(),
            truck_generator: CoordinateGenerator::new(GeneratorMode::Uniform)?,
        })
    }
}

#[tokio::main]
async fn main() -> CoreRsResult<()> {
    log::init();

    let config: AppConfig = config::load("assets/conf.json")?;
    config.validate()?;

    let shutdown = Shutdown::new();
    let http_signal = shutdown.subscribe();
    let scheduler_signal = shutdown.subscribe();
    shutdown.listen();

    let producer = Producer::new(
        &config.kafka_uri,
        env!("CARGO_BIN_NAME"),
        ProducerConfig {
            message_timeout: Duration::from_millis(config.publish_timeout_ms),
        },
    )?;
    producer
        .check_connection(Duration::from_millis(config.startup_timeout_ms))
        .await?;

    let state = Arc::new(AppState::new(&config, Arc::new(producer))?);
    info!(vehicle_id = state.vehicle_id, trucks = state.truck_ids.len(), "gps producer started");

    let mut scheduler = Scheduler::new();
    scheduler.schedule_fixed_rate(
        "publish-location",
        publish_location_job,
        Duration::from_millis(config.interval_ms),
    );
    if !state.truck_ids.is_empty() {
        scheduler.schedule_fixed_rate(
            "publish-truck-locations",
            publish_truck_locations_job,
            Duration::from_millis(config.truck_interval_ms),
        );
    }
    let scheduler = task::spawn_task(scheduler.start(Arc::clone(&state), scheduler_signal));

    let app = Router::new().merge(job::routes()).with_state(state);
    start_http_server(app, http_signal, config.http).await?;

    scheduler.await??;
    task::shutdown().await;

    Ok(())
}
