use std::sync::Arc;

use framework::exception::CoreRsResult;
use framework::kafka::consumer::Message;
use framework::validation_error;
use tracing::info;

use crate::AppState;

// value is plain text "lat:..,lon:.." keyed by truck id
pub async fn truck_location_handler(state: Arc<AppState>, message: Message<String>) -> CoreRsResult<()> {
    let Some(truck_id) = message.key.filter(|key| !key.is_empty()) else {
        return Err(validation_error!(message = "truck location must have truck id as key"));
    };
    state.trucks.upsert(truck_id, message.payload);
    info!(trucks = state.trucks.len(), "trucks={:?}", state.trucks.snapshot());
    Ok(())
}
