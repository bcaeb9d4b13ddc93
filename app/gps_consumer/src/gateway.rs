use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use axum::extract::ws::Message;
use axum::extract::ws::Utf8Bytes;
use axum::extract::ws::WebSocket;
use dashmap::DashMap;
use fleet::location::LocationRecord;
use framework::exception::CoreRsResult;
use framework::json::to_json;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;
use tracing::info;
use tracing::warn;

pub struct Subscription {
    pub id: u64,
    pub receiver: mpsc::Receiver<Utf8Bytes>,
}

#[derive(Debug, Default, PartialEq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub evicted: usize,
}

/// Fan-out of relayed locations to connected websocket clients.
/// Each subscriber owns a bounded outbound buffer, a full or closed buffer evicts it.
pub struct BroadcastGateway {
    subscribers: DashMap<u64, mpsc::Sender<Utf8Bytes>>,
    next_id: AtomicU64,
    subscriber_buffer: usize,
}

impl BroadcastGateway {
    pub fn new(subscriber_buffer: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
            subscriber_buffer: subscriber_buffer.max(1),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.subscriber_buffer);
        self.subscribers.insert(id, sender);
        debug!(subscriber = id, subscribers = self.subscribers.len(), "subscribed");
        Subscription { id, receiver }
    }

    pub fn unsubscribe(&self, id: u64) {
        if self.subscribers.remove(&id).is_some() {
            debug!(subscriber = id, subscribers = self.subscribers.len(), "unsubscribed");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn broadcast(&self, record: &LocationRecord) -> CoreRsResult<BroadcastReport> {
        let frame = Utf8Bytes::from(to_json(record)?);
        let mut report = BroadcastReport::default();
        self.subscribers.retain(|id, sender| match sender.try_send(frame.clone()) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(subscriber = id, "subscriber buffer is full, evict");
                report.evicted += 1;
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(subscriber = id, "subscriber is gone, evict");
                report.evicted += 1;
                false
            }
        });
        debug!(delivered = report.delivered, evicted = report.evicted, "stats");
        Ok(report)
    }
}

/// Writes `snapshot` then every broadcast frame to the socket, until the client closes or the gateway evicts it.
pub async fn run_session(
    gateway: &BroadcastGateway,
    subscription: Subscription,
    snapshot: Vec<LocationRecord>,
    mut socket: WebSocket,
) -> CoreRsResult<()> {
    let Subscription { id, mut receiver } = subscription;
    info!(subscriber = id, snapshot = snapshot.len(), "websocket session started");

    let result: CoreRsResult<()> = async {
        for record in &snapshot {
            socket.send(Message::Text(Utf8Bytes::from(to_json(record)?))).await?;
        }
        loop {
            tokio::select! {
                frame = receiver.recv() => {
                    let Some(frame) = frame else {
                        // evicted
                        socket.send(Message::Close(None)).await?;
                        break;
                    };
                    socket.send(Message::Text(frame)).await?;
                }
                message = socket.recv() => {
                    match message {
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(err)) => return Err(err.into()),
                    }
                }
            }
        }
        Ok(())
    }
    .await;

    gateway.unsubscribe(id);
    info!(subscriber = id, "websocket session closed");
    result
}
