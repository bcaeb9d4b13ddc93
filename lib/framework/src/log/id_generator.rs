use uuid::Uuid;

// time ordered, so action ids sort by start time in log storage
pub fn random_id() -> String {
    Uuid::now_v7().simple().to_string()
}
