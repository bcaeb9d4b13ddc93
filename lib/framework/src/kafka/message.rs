use std::collections::HashMap;
use std::marker::PhantomData;

use chrono::DateTime;
use chrono::Utc;
use serde::de::DeserializeOwned;
use tracing::error;
use tracing::warn;

use crate::exception::CoreRsResult;
use crate::json::from_json;

// untyped message as polled, before the topic's payload type is attached
#[cfg_attr(not(feature = "kafka"), allow(dead_code))]
pub(crate) struct RawMessage {
    pub(crate) key: Option<String>,
    pub(crate) payload: String,
    pub(crate) headers: HashMap<String, String>,
    pub(crate) timestamp: Option<DateTime<Utc>>,
}

pub(crate) type TopicMessages = HashMap<String, Vec<RawMessage>>;

/// Drains `poll` into per-topic groups until it returns `None` or `max_records` are taken.
/// Undecodable messages are logged and skipped. A poll error ends the batch and is only
/// returned when nothing was collected, so messages already taken are still handled.
#[cfg_attr(not(feature = "kafka"), allow(dead_code))]
pub(crate) fn collect_batch<P, E>(max_records: usize, mut poll: P) -> Result<TopicMessages, E>
where
    P: FnMut() -> Option<Result<(String, CoreRsResult<RawMessage>), E>>,
    E: std::fmt::Debug,
{
    let mut messages = TopicMessages::new();
    let mut count = 0;
    while count < max_records {
        match poll() {
            None => break,
            Some(Ok((topic, Ok(message)))) => {
                messages.entry(topic).or_default().push(message);
                count += 1;
            }
            Some(Ok((topic, Err(e)))) => {
                error!(topic, error = ?e, "discard undecodable message");
                count += 1;
            }
            Some(Err(e)) if messages.is_empty() => return Err(e),
            Some(Err(e)) => {
                warn!(error = ?e, "poll failed, handle collected messages first");
                break;
            }
        }
    }
    Ok(messages)
}

#[cfg_attr(not(feature = "kafka"), allow(dead_code))]
pub(crate) fn decode_text(field: &str, data: &[u8]) -> CoreRsResult<String> {
    String::from_utf8(data.to_vec())
        .map_err(|err| exception!(message = format!("message {field} is not valid utf-8"), source = err))
}

pub struct Message<T> {
    pub key: Option<String>,
    pub payload: String,
    pub headers: HashMap<String, String>,
    pub timestamp: Option<DateTime<Utc>>,
    _marker: PhantomData<T>,
}

impl<T> Message<T> {
    pub fn new(key: Option<String>, payload: impl Into<String>) -> Self {
        Message {
            key,
            payload: payload.into(),
            headers: HashMap::new(),
            timestamp: None,
            _marker: PhantomData,
        }
    }

    #[cfg_attr(not(feature = "kafka"), allow(dead_code))]
    pub(crate) fn from_raw(message: RawMessage) -> Self {
        Message {
            key: message.key,
            payload: message.payload,
            headers: message.headers,
            timestamp: message.timestamp,
            _marker: PhantomData,
        }
    }

    pub fn ref_id(&self) -> Option<String> {
        self.headers.get("ref_id").cloned()
    }
}

impl<T> Message<T>
where
    T: DeserializeOwned,
{
    pub fn payload(&self) -> CoreRsResult<T> {
        from_json(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::RawMessage;
    use super::collect_batch;
    use super::decode_text;
    use crate::exception::CoreRsResult;

    fn raw(key: &str) -> CoreRsResult<RawMessage> {
        Ok(RawMessage {
            key: Some(key.to_owned()),
            payload: "{}".to_owned(),
            headers: HashMap::new(),
            timestamp: None,
        })
    }

    fn keys(messages: &[RawMessage]) -> Vec<&str> {
        messages.iter().filter_map(|message| message.key.as_deref()).collect()
    }

    #[test]
    fn poll_error_keeps_collected_messages() {
        let mut polled = vec![
            Ok(("location".to_owned(), raw("car-1"))),
            Ok(("location".to_owned(), raw("car-2"))),
            Err("broker transport failure"),
        ]
        .into_iter();

        let batch = collect_batch(100, || polled.next()).unwrap();

        assert_eq!(keys(&batch["location"]), vec!["car-1", "car-2"]);
    }

    #[test]
    fn poll_error_without_messages() {
        let mut polled = vec![Err("broker transport failure"), Ok(("location".to_owned(), raw("car-1")))].into_iter();

        assert!(matches!(collect_batch(100, || polled.next()), Err("broker transport failure")));
    }

    #[test]
    fn stop_at_max_records() {
        let mut polled = vec![
            Ok(("location".to_owned(), raw("car-1"))),
            Ok(("truck_location".to_owned(), raw("truck-1"))),
            Ok(("location".to_owned(), raw("car-2"))),
        ]
        .into_iter();

        let batch: HashMap<String, Vec<RawMessage>> = collect_batch::<_, &str>(2, || polled.next()).unwrap();

        assert_eq!(keys(&batch["location"]), vec!["car-1"]);
        assert_eq!(keys(&batch["truck_location"]), vec!["truck-1"]);
        assert_eq!(polled.len(), 1);
    }

    #[test]
    fn skip_undecodable_message() {
        let mut polled = vec![
            Ok(("location".to_owned(), decode_text("key", &[0x63, 0xff]).and_then(|key| raw(&key)))),
            Ok(("location".to_owned(), raw("car-2"))),
        ]
        .into_iter();

        let batch = collect_batch::<_, &str>(100, || polled.next()).unwrap();

        assert_eq!(keys(&batch["location"]), vec!["car-2"]);
    }

    #[test]
    fn decode_utf8() {
        assert_eq!(decode_text("payload", "lat:1.5,lon:2.5".as_bytes()).unwrap(), "lat:1.5,lon:2.5");
        assert!(decode_text("payload", &[0x6c, 0x61, 0x74, 0xc3]).is_err());
    }
}
