use std::sync::Arc;

use fleet::location::LocationRecord;
use framework::exception::CoreRsResult;
use framework::kafka::consumer::Message;
use tracing::debug;

use crate::AppState;

/// Keeps the latest location per vehicle.
pub async fn location_view_handler(state: Arc<AppState>, message: Message<LocationRecord>) -> CoreRsResult<()> {
    let location = message.payload()?;
    location.validate()?;
    debug!(vehicle_id = location.vehicle_id, "context");

    let timestamp = location.timestamp;
    if let Some(previous) = state.locations.upsert(location.vehicle_id.clone(), location)
        && previous.timestamp > timestamp
    {
        // arrival order wins
        debug!(
            vehicle_id = previous.vehicle_id,
            previous_timestamp = previous.timestamp,
            timestamp,
            "older location replaced a newer one"
        );
    }
    Ok(())
}

/// Forwards each location to websocket subscribers, nothing is stored.
pub async fn location_relay_handler(state: Arc<AppState>, message: Message<LocationRecord>) -> CoreRsResult<()> {
    let location = message.payload()?;
    location.validate()?;

    let report = state.gateway.broadcast(&location)?;
    debug!(
        vehicle_id = location.vehicle_id,
        delivered = report.delivered,
        evicted = report.evicted,
        "context"
    );
    Ok(())
}
