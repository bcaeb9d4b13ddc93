use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Router;
use axum::debug_handler;
use axum::extract::Path;
use axum::extract::State;
use axum::extract::WebSocketUpgrade;
use axum::response::Response;
use axum::routing::get;
use fleet::location::LocationRecord;
use framework::exception;
use framework::exception::Severity;
use framework::exception::error_code;
use framework::log;
use framework::web::body::Json;
use framework::web::error::HttpResult;

use crate::AppState;
use crate::gateway::run_session;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws/locations", get(ws_locations))
        .route("/locations", get(list_locations))
        .route("/locations/{vehicle_id}", get(get_location))
        .route("/trucks", get(list_trucks))
        .route("/chat", get(list_chat))
}

#[debug_handler]
async fn ws_locations(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| async move {
        // subscribe before the snapshot, a location arriving in between is sent twice rather than lost
        let subscription = state.gateway.subscribe();
        let snapshot = state.locations.snapshot().into_values().collect();
        log::start_action("websocket", None, run_session(&state.gateway, subscription, snapshot, socket)).await;
    })
}

#[debug_handler]
async fn list_locations(State(state): State<Arc<AppState>>) -> Json<Vec<LocationRecord>> {
    Json(state.locations.snapshot().into_values().collect())
}

#[debug_handler]
async fn get_location(
    State(state): State<Arc<AppState>>,
    Path(vehicle_id): Path<String>,
) -> HttpResult<Json<LocationRecord>> {
    let location = state.locations.get(&vehicle_id).ok_or_else(|| {
        exception!(
            severity = Severity::Warn,
            code = error_code::NOT_FOUND,
            message = format!("location not found, vehicle_id={vehicle_id}")
        )
    })?;
    Ok(Json(location))
}

#[debug_handler]
async fn list_trucks(State(state): State<Arc<AppState>>) -> Json<BTreeMap<String, String>> {
    Json(state.trucks.snapshot())
}

#[debug_handler]
async fn list_chat(State(state): State<Arc<AppState>>) -> Json<BTreeMap<String, String>> {
    Json(state.chat.snapshot())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::body::to_bytes;
    use axum::http::Request;
    use axum::http::StatusCode;
    use axum::response::Response;
    use fleet::location::Coordinate;
    use fleet::location::LocationRecord;
    use futures::StreamExt;
    use serde_json::Value;
    use tokio::net::TcpListener;
    use tokio::net::TcpStream;
    use tokio_tungstenite::MaybeTlsStream;
    use tokio_tungstenite::WebSocketStream;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite;
    use tower::ServiceExt;

    use crate::AppState;

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    fn location(vehicle_id: &str, timestamp: i64) -> LocationRecord {
        LocationRecord::new(
            vehicle_id,
            Coordinate {
                latitude: 37.7731,
                longitude: -3.7881,
            },
            timestamp,
        )
    }

    fn state(subscriber_buffer: usize) -> Arc<AppState> {
        let state = AppState::new(subscriber_buffer);
        for (vehicle_id, timestamp) in [("car-2", 2000), ("car-1", 1000)] {
            state.locations.upsert(vehicle_id.to_owned(), location(vehicle_id, timestamp));
        }
        state.trucks.upsert("truck-1".to_owned(), "lat:1.5,lon:2.5".to_owned());
        Arc::new(state)
    }

    async fn get(uri: &str) -> Response {
        super::routes()
            .with_state(state(16))
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn json(response: Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn list_locations() {
        let response = get("/locations").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json(response).await;
        let ids: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|location| location["vehicleId"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["car-1", "car-2"]);
    }

    #[tokio::test]
    async fn get_location() {
        let response = get("/locations/car-2").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["timeStamp"], 2000);
        assert_eq!(body["latitude"], 37.7731);
    }

    #[tokio::test]
    async fn location_not_found() {
        let response = get("/locations/car-9").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json(response).await;
        assert_eq!(body["error_code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn list_trucks_and_chat() {
        let body = json(get("/trucks").await).await;
        assert_eq!(body["truck-1"], "lat:1.5,lon:2.5");

        let body = json(get("/chat").await).await;
        assert_eq!(body, serde_json::json!({}));
    }

    async fn connect(state: &Arc<AppState>) -> Client {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let app = super::routes().with_state(Arc::clone(state));
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let (client, _) = connect_async(format!("ws://{address}/ws/locations")).await.unwrap();
        client
    }

    async fn next_location(client: &mut Client) -> LocationRecord {
        match client.next().await {
            Some(Ok(tungstenite::Message::Text(text))) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("expected location frame, got {other:?}"),
        }
    }

    async fn wait_for_subscribers(state: &AppState, count: usize) {
        for _ in 0..200 {
            if state.gateway.subscriber_count() == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("subscriber count never reached {count}");
    }

    #[tokio::test]
    async fn websocket_sends_snapshot_before_live_locations() {
        let state = state(16);
        let mut client = connect(&state).await;
        wait_for_subscribers(&state, 1).await;

        let report = state.gateway.broadcast(&location("car-3", 3000)).unwrap();
        assert_eq!(report.delivered, 1);

        let vehicle_ids = [
            next_location(&mut client).await.vehicle_id,
            next_location(&mut client).await.vehicle_id,
            next_location(&mut client).await.vehicle_id,
        ];
        assert_eq!(vehicle_ids, ["car-1", "car-2", "car-3"]);

        client.close(None).await.unwrap();
        wait_for_subscribers(&state, 0).await;
    }

    #[tokio::test]
    async fn websocket_closed_after_eviction() {
        let state = state(1);
        let mut client = connect(&state).await;
        next_location(&mut client).await;
        next_location(&mut client).await;
        assert_eq!(state.gateway.subscriber_count(), 1);

        // no await in between, the session cannot drain its buffer
        let first = state.gateway.broadcast(&location("car-3", 3000)).unwrap();
        let second = state.gateway.broadcast(&location("car-3", 4000)).unwrap();
        assert_eq!((first.delivered, second.evicted), (1, 1));
        assert_eq!(state.gateway.subscriber_count(), 0);

        assert_eq!(next_location(&mut client).await.timestamp, 3000);
        assert!(matches!(
            client.next().await,
            Some(Ok(tungstenite::Message::Close(_))) | None
        ));
    }
}
