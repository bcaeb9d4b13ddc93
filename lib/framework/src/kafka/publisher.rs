use std::future::Future;
use std::pin::Pin;

use crate::exception::CoreRsResult;

#[derive(Debug, Clone, PartialEq)]
pub struct PublishRecord {
    pub topic: &'static str,
    pub key: Option<String>,
    pub payload: String,
}

/// Fire-and-forget publish seam between jobs and the broker client.
pub trait Publisher: Send + Sync {
    fn publish(&self, record: PublishRecord) -> Pin<Box<dyn Future<Output = CoreRsResult<()>> + Send + '_>>;
}
