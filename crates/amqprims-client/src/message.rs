use amqprims_frame::{BasicProperties, Content, Method, XDeath};
use bytes::Bytes;

use crate::error::ClientError;

/// How a message reached the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageSource {
    /// Pushed to a consumer by basic.deliver.
    Delivered { consumer_tag: String },
    /// Fetched by basic.get; `message_count` is what remained in the queue.
    Fetched { message_count: u32 },
    /// Sent back by basic.return because it could not be routed.
    Returned { reply_code: u16, reply_text: String },
}

/// A message received from the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub channel: u16,
    pub body: Bytes,
    pub exchange: String,
    pub routing_key: String,
    pub properties: BasicProperties,
    /// Zero for returned messages, which cannot be acknowledged.
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub source: MessageSource,
}

impl Message {
    pub fn consumer_tag(&self) -> Option<&str> {
        match &self.source {
            MessageSource::Delivered { consumer_tag } => Some(consumer_tag),
            _ => None,
        }
    }

    /// Body as UTF-8, if it is valid.
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Dead-letter history from the `x-death` header.
    pub fn x_death(&self) -> Vec<XDeath> {
        self.properties
            .headers
            .as_ref()
            .map(XDeath::from_headers)
            .unwrap_or_default()
    }
}

impl TryFrom<Content> for Message {
    type Error = ClientError;

    fn try_from(content: Content) -> Result<Self, Self::Error> {
        let Content {
            channel,
            method,
            properties,
            body,
        } = content;

        let (exchange, routing_key, delivery_tag, redelivered, source) = match method {
            Method::BasicDeliver {
                consumer_tag,
                delivery_tag,
                redelivered,
                exchange,
                routing_key,
            } => (
                exchange,
                routing_key,
                delivery_tag,
                redelivered,
                MessageSource::Delivered { consumer_tag },
            ),
            Method::BasicGetOk {
                delivery_tag,
                redelivered,
                exchange,
                routing_key,
                message_count,
            } => (
                exchange,
                routing_key,
                delivery_tag,
                redelivered,
                MessageSource::Fetched { message_count },
            ),
            Method::BasicReturn {
                reply_code,
                reply_text,
                exchange,
                routing_key,
            } => (
                exchange,
                routing_key,
                0,
                false,
                MessageSource::Returned {
                    reply_code,
                    reply_text,
                },
            ),
            other => {
                return Err(ClientError::UnexpectedFrame {
                    channel,
                    found: other.name(),
                })
            }
        };

        Ok(Message {
            channel,
            body,
            exchange,
            routing_key,
            properties,
            delivery_tag,
            redelivered,
            source,
        })
    }
}
