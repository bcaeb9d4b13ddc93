use std::fmt::Debug;
use std::marker::PhantomData;

use serde::Serialize;

use super::publisher::PublishRecord;
use crate::exception::CoreRsResult;
use crate::json::to_json;

pub struct Topic<T> {
    pub name: &'static str,
    _marker: PhantomData<T>,
}

impl<T> Topic<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }
}

impl<T> Topic<T>
where
    T: Serialize + Debug,
{
    pub fn record(&self, key: Option<String>, message: &T) -> CoreRsResult<PublishRecord> {
        Ok(PublishRecord {
            topic: self.name,
            key,
            payload: to_json(message)?,
        })
    }
}

// plain text topics carry the value as is, not as a json string literal
impl Topic<String> {
    pub fn text_record(&self, key: Option<String>, text: String) -> PublishRecord {
        PublishRecord {
            topic: self.name,
            key,
            payload: text,
        }
    }
}
