use std::sync::Arc;

use framework::exception::CoreRsResult;
use framework::kafka::consumer::Message;
use framework::validation_error;
use tracing::info;

use crate::AppState;

pub async fn chat_message_handler(state: Arc<AppState>, message: Message<String>) -> CoreRsResult<()> {
    let Some(sender) = message.key.filter(|key| !key.is_empty()) else {
        return Err(validation_error!(message = "chat message must have sender as key"));
    };
    state.chat.upsert(sender, message.payload);
    info!(senders = state.chat.len(), "chat={:?}", state.chat.snapshot());
    Ok(())
}
