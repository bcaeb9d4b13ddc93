pub mod chat_message_handler;
pub mod location_handler;
pub mod truck_location_handler;
