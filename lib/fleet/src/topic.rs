// topic names shared with the java fleet services, do not rename
pub const LOCATION_TOPIC: &str = "dakar-locations-v2";
pub const TRUCK_LOCATION_TOPIC: &str = "truck-locations";
pub const CHAT_TOPIC: &str = "SpainMood";
