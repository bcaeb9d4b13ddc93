use std::sync::Arc;

use axum::Router;
use axum::debug_handler;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use chrono::Utc;
use fleet::location::LocationRecord;
use framework::exception;
use framework::exception::CoreRsResult;
use framework::log;
use framework::schedule::JobContext;
use framework::web::error::HttpResult;
use tracing::debug;

use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/job/publish-location", post(run_publish_location_job))
}

#[debug_handler]
async fn run_publish_location_job(State(state): State<Arc<AppState>>) -> HttpResult<StatusCode> {
    publish_location_job(
        state,
        JobContext {
            name: "publish-location",
            scheduled_time: Utc::now(),
        },
    )
    .await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn publish_location_job(state: Arc<AppState>, context: JobContext) -> CoreRsResult<()> {
    let location = LocationRecord::new(
        state.vehicle_id.as_str(),
        state.generator.generate(),
        context.scheduled_time.timestamp_millis(),
    );
    location.validate()?;
    debug!(
        vehicle_id = location.vehicle_id,
        latitude = location.latitude,
        longitude = location.longitude,
        "context"
    );

    let record = state.topics.location.record(Some(location.vehicle_id.clone()), &location)?;
    state.publisher.publish(record).await
}

// one "lat:..,lon:.." text record per truck, keyed by truck id; a failed truck does not skip the rest
pub async fn publish_truck_locations_job(state: Arc<AppState>, _context: JobContext) -> CoreRsResult<()> {
    let mut failed_trucks = vec![];
    for truck_id in &state.truck_ids {
        let coordinate = state.truck_generator.generate();
        let record = state
            .topics
            .truck_location
            .text_record(Some(truck_id.clone()), coordinate.to_string());
        if let Err(e) = state.publisher.publish(record).await {
            log::log_exception(&e);
            failed_trucks.push(truck_id.as_str());
        }
    }
    if !failed_trucks.is_empty() {
        return Err(exception!(
            message = format!("failed to publish truck locations, trucks={failed_trucks:?}")
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use axum::http::StatusCode;
    use chrono::Utc;
    use fleet::location::LocationRecord;
    use fleet::topic::LOCATION_TOPIC;
    use fleet::topic::TRUCK_LOCATION_TOPIC;
    use framework::exception;
    use framework::exception::CoreRsResult;
    use framework::kafka::publisher::PublishRecord;
    use framework::kafka::publisher::Publisher;
    use framework::kafka::topic::Topic;
    use framework::schedule::JobContext;
    use framework::schedule::Scheduler;
    use tokio::sync::broadcast;
    use tokio::time;
    use tower::ServiceExt;

    use super::publish_location_job;
    use super::publish_truck_locations_job;
    use crate::AppState;
    use crate::Topics;
    use crate::generator::CoordinateGenerator;
    use crate::generator::GeneratorMode;

    #[derive(Default)]
    struct RecordingPublisher {
        records: Mutex<Vec<PublishRecord>>,
        unavailable: bool,
        failing_keys: Vec<&'static str>,
    }

    impl RecordingPublisher {
        fn records(&self) -> Vec<PublishRecord> {
            self.records.lock().unwrap().clone()
        }
    }

    impl Publisher for RecordingPublisher {
        fn publish(&self, record: PublishRecord) -> Pin<Box<dyn Future<Output = CoreRsResult<()>> + Send + '_>> {
            Box::pin(async move {
                if self.unavailable || self.failing_keys.iter().any(|key| record.key.as_deref() == Some(*key)) {
                    return Err(exception!(message = format!("broker unavailable, topic={}", record.topic)));
                }
                self.records.lock().unwrap().push(record);
                Ok(())
            })
        }
    }

    fn state(publisher: Arc<RecordingPublisher>, truck_ids: Vec<String>) -> Arc<AppState> {
        Arc::new(AppState {
            topics: Topics {
                location: Topic::new(LOCATION_TOPIC),
                truck_location: Topic::new(TRUCK_LOCATION_TOPIC),
            },
            publisher,
            vehicle_id: "car-1".to_owned(),
            generator: CoordinateGenerator::new(GeneratorMode::default()).unwrap(),
            truck_ids,
            truck_generator: CoordinateGenerator::new(GeneratorMode::Uniform).unwrap(),
        })
    }

    fn context() -> JobContext {
        JobContext {
            name: "publish-location",
            scheduled_time: Utc::now(),
        }
    }

    #[tokio::test]
    async fn publish_location() {
        let publisher = Arc::new(RecordingPublisher::default());
        let context = context();
        let timestamp = context.scheduled_time.timestamp_millis();

        publish_location_job(state(Arc::clone(&publisher), vec![]), context).await.unwrap();

        let records = publisher.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].topic, LOCATION_TOPIC);
        assert_eq!(records[0].key.as_deref(), Some("car-1"));
        let location: LocationRecord = serde_json::from_str(&records[0].payload).unwrap();
        assert_eq!(location.vehicle_id, "car-1");
        assert_eq!(location.timestamp, timestamp);
        assert!(location.validate().is_ok());
    }

    #[tokio::test]
    async fn publish_failure_is_reported() {
        let publisher = Arc::new(RecordingPublisher {
            unavailable: true,
            ..Default::default()
        });

        let result = publish_location_job(state(Arc::clone(&publisher), vec![]), context()).await;

        assert!(result.is_err());
        assert!(publisher.records().is_empty());
    }

    #[tokio::test]
    async fn publish_truck_locations() {
        let publisher = Arc::new(RecordingPublisher::default());
        let truck_ids = vec!["truck-1".to_owned(), "truck-2".to_owned()];

        publish_truck_locations_job(state(Arc::clone(&publisher), truck_ids), context()).await.unwrap();

        let records = publisher.records();
        let keys: Vec<Option<&str>> = records.iter().map(|r| r.key.as_deref()).collect();
        assert_eq!(keys, vec![Some("truck-1"), Some("truck-2")]);
        for record in &records {
            assert_eq!(record.topic, TRUCK_LOCATION_TOPIC);
            assert!(record.payload.starts_with("lat:"));
            assert!(record.payload.contains(",lon:"));
        }
    }

    #[tokio::test]
    async fn failed_truck_does_not_skip_others() {
        let publisher = Arc::new(RecordingPublisher {
            failing_keys: vec!["truck-1"],
            ..Default::default()
        });
        let truck_ids = vec!["truck-1".to_owned(), "truck-2".to_owned(), "truck-3".to_owned()];

        let result = publish_truck_locations_job(state(Arc::clone(&publisher), truck_ids), context()).await;

        let error = result.unwrap_err();
        assert!(error.message.contains("truck-1"));
        assert!(!error.message.contains("truck-2"));
        let keys: Vec<Option<String>> = publisher.records().into_iter().map(|r| r.key).collect();
        assert_eq!(keys, vec![Some("truck-2".to_owned()), Some("truck-3".to_owned())]);
    }

    #[tokio::test(start_paused = true)]
    async fn publish_every_interval() {
        let publisher = Arc::new(RecordingPublisher::default());
        let (shutdown, _) = broadcast::channel(1);
        let mut scheduler: Scheduler<Arc<AppState>> = Scheduler::new().with_initial_delay(Duration::ZERO);
        scheduler.schedule_fixed_rate("publish-location", publish_location_job, Duration::from_millis(2000));
        let handle = tokio::spawn(scheduler.start(state(Arc::clone(&publisher), vec![]), shutdown.subscribe()));

        time::sleep(Duration::from_millis(6500)).await;
        shutdown.send(()).unwrap();
        handle.await.unwrap().unwrap();

        let records = publisher.records();
        assert_eq!(records.len(), 3);
        let locations: Vec<LocationRecord> = records
            .iter()
            .map(|record| serde_json::from_str(&record.payload).unwrap())
            .collect();
        assert!(locations.windows(2).all(|pair| pair[0].timestamp < pair[1].timestamp));
    }

    #[tokio::test]
    async fn trigger_over_http() {
        let publisher = Arc::new(RecordingPublisher::default());
        let app = super::routes().with_state(state(Arc::clone(&publisher), vec![]));

        let response = app
            .oneshot(
                Request::post("/job/publish-location")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(publisher.records().len(), 1);
    }
}
