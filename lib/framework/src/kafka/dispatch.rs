use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::SecondsFormat;
use chrono::Utc;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::debug;
use tracing::error;

use super::message::Message;
use crate::exception::CoreRsResult;
use crate::log;
use crate::task;

/// Handles one polled batch of a topic. Messages sharing a key run sequentially in
/// arrival order, each key chain takes one worker permit, keyless messages run alone.
pub(super) async fn handle_messages<H, S, M, Fut>(
    topic: &'static str,
    messages: Vec<Message<M>>,
    handler: H,
    state: S,
    workers: Arc<Semaphore>,
) where
    S: Clone + Send + Sync + 'static,
    H: Fn(S, Message<M>) -> Fut + Copy + Send + Sync + 'static,
    Fut: Future<Output = CoreRsResult<()>> + Send + 'static,
    M: Send + 'static,
{
    let chains = key_chains(messages);
    let mut handles = Vec::with_capacity(chains.len());
    for chain in chains {
        let Ok(permit) = Arc::clone(&workers).acquire_owned().await else {
            error!(topic, "worker pool closed, skip remaining messages");
            break;
        };
        let state = state.clone();
        handles.push(task::track(async move {
            for message in chain {
                handle_message(topic, message, handler, state.clone()).await;
            }
            drop(permit);
        }));
    }

    for result in join_all(handles).await {
        if let Err(e) = result {
            error!(topic, error = ?e, "message handler panicked");
        }
    }
}

fn key_chains<M>(messages: Vec<Message<M>>) -> Vec<Vec<Message<M>>> {
    let mut chains: Vec<Vec<Message<M>>> = Vec::new();
    let mut chain_index: HashMap<String, usize> = HashMap::new();
    for message in messages {
        if let Some(ref key) = message.key {
            if let Some(&index) = chain_index.get(key) {
                chains[index].push(message);
                continue;
            }
            chain_index.insert(key.clone(), chains.len());
        }
        chains.push(vec![message]);
    }
    chains
}

async fn handle_message<H, S, M, Fut>(topic: &'static str, message: Message<M>, handler: H, state: S)
where
    H: Fn(S, Message<M>) -> Fut,
    Fut: Future<Output = CoreRsResult<()>>,
{
    log::start_action("message", message.ref_id(), async {
        debug!(topic, key = ?message.key, "[message]");
        debug!(
            timestamp = message
                .timestamp
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
            "[message]"
        );
        debug!(payload = message.payload, "[message]");
        for (key, value) in &message.headers {
            debug!("[header] {key}={value}");
        }
        debug!(topic, key = message.key, "context");
        debug!(message_count = 1, "stats");
        if let Some(timestamp) = message.timestamp {
            let lag = Utc::now() - timestamp;
            debug!("lag={lag}");
        }
        handler(state, message).await
    })
    .await;
}
