#[cfg(feature = "kafka")]
pub mod consumer;
#[cfg_attr(not(feature = "kafka"), allow(dead_code))]
mod dispatch;
pub mod message;
#[cfg(feature = "kafka")]
pub mod producer;
pub mod publisher;
pub mod topic;
