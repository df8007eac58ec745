//! Content header frames and basic-class message properties.

use bytes::{BufMut, BytesMut};

use crate::buffer::{put_short_str, WireCursor};
use crate::constants::CLASS_BASIC;
use crate::error::{FrameError, Result};
use crate::value::FieldTable;

const CONTENT_TYPE: u16 = 1 << 15;
const CONTENT_ENCODING: u16 = 1 << 14;
const HEADERS: u16 = 1 << 13;
const DELIVERY_MODE: u16 = 1 << 12;
const PRIORITY: u16 = 1 << 11;
const CORRELATION_ID: u16 = 1 << 10;
const REPLY_TO: u16 = 1 << 9;
const EXPIRATION: u16 = 1 << 8;
const MESSAGE_ID: u16 = 1 << 7;
const TIMESTAMP: u16 = 1 << 6;
const TYPE: u16 = 1 << 5;
const USER_ID: u16 = 1 << 4;
const APP_ID: u16 = 1 << 3;
const CLUSTER_ID: u16 = 1 << 2;
const CONTINUATION: u16 = 1;

/// Delivery mode for messages that survive a broker restart.
pub const PERSISTENT: u8 = 2;

/// Properties of a basic-class message. Absent fields are not sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BasicProperties {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub headers: Option<FieldTable>,
    /// 1 = transient, 2 = persistent.
    pub delivery_mode: Option<u8>,
    pub priority: Option<u8>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub expiration: Option<String>,
    pub message_id: Option<String>,
    /// Seconds since the Unix epoch.
    pub timestamp: Option<u64>,
    /// The `type` property.
    pub kind: Option<String>,
    pub user_id: Option<String>,
    pub app_id: Option<String>,
    pub cluster_id: Option<String>,
}

impl BasicProperties {
    /// Property flag word announcing which fields follow.
    pub fn flags(&self) -> u16 {
        let mut flags = 0;
        let mut set = |present: bool, bit: u16| {
            if present {
                flags |= bit;
            }
        };
        set(self.content_type.is_some(), CONTENT_TYPE);
        set(self.content_encoding.is_some(), CONTENT_ENCODING);
        set(self.headers.is_some(), HEADERS);
        set(self.delivery_mode.is_some(), DELIVERY_MODE);
        set(self.priority.is_some(), PRIORITY);
        set(self.correlation_id.is_some(), CORRELATION_ID);
        set(self.reply_to.is_some(), REPLY_TO);
        set(self.expiration.is_some(), EXPIRATION);
        set(self.message_id.is_some(), MESSAGE_ID);
        set(self.timestamp.is_some(), TIMESTAMP);
        set(self.kind.is_some(), TYPE);
        set(self.user_id.is_some(), USER_ID);
        set(self.app_id.is_some(), APP_ID);
        set(self.cluster_id.is_some(), CLUSTER_ID);
        flags
    }

    pub fn is_persistent(&self) -> bool {
        self.delivery_mode == Some(PERSISTENT)
    }

    pub(crate) fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u16(self.flags());

        let short = |dst: &mut BytesMut, value: &Option<String>| match value {
            Some(value) => put_short_str(dst, value),
            None => Ok(()),
        };

        short(dst, &self.content_type)?;
        short(dst, &self.content_encoding)?;
        if let Some(headers) = &self.headers {
            headers.encode(dst)?;
        }
        if let Some(mode) = self.delivery_mode {
            dst.put_u8(mode);
        }
        if let Some(priority) = self.priority {
            dst.put_u8(priority);
        }
        short(dst, &self.correlation_id)?;
        short(dst, &self.reply_to)?;
        short(dst, &self.expiration)?;
        short(dst, &self.message_id)?;
        if let Some(ts) = self.timestamp {
            dst.put_u64(ts);
        }
        short(dst, &self.kind)?;
        short(dst, &self.user_id)?;
        short(dst, &self.app_id)?;
        short(dst, &self.cluster_id)?;
        Ok(())
    }

    pub(crate) fn decode(cursor: &mut WireCursor<'_>) -> Result<Self> {
        const WHAT: &str = "content properties";
        let flags = cursor.u16(WHAT)?;

        // Basic defines fewer than 15 properties; extra flag words carry nothing.
        let mut more = flags & CONTINUATION != 0;
        while more {
            more = cursor.u16(WHAT)? & CONTINUATION != 0;
        }

        let content_type = optional_short(cursor, flags & CONTENT_TYPE != 0, "content-type")?;
        let content_encoding = optional_short(cursor, flags & CONTENT_ENCODING != 0, "content-encoding")?;
        let headers = if flags & HEADERS != 0 {
            Some(FieldTable::decode(cursor)?)
        } else {
            None
        };
        let delivery_mode = if flags & DELIVERY_MODE != 0 {
            Some(cursor.u8("delivery-mode")?)
        } else {
            None
        };
        let priority = if flags & PRIORITY != 0 {
            Some(cursor.u8("priority")?)
        } else {
            None
        };
        let correlation_id = optional_short(cursor, flags & CORRELATION_ID != 0, "correlation-id")?;
        let reply_to = optional_short(cursor, flags & REPLY_TO != 0, "reply-to")?;
        let expiration = optional_short(cursor, flags & EXPIRATION != 0, "expiration")?;
        let message_id = optional_short(cursor, flags & MESSAGE_ID != 0, "message-id")?;
        let timestamp = if flags & TIMESTAMP != 0 {
            Some(cursor.u64("timestamp")?)
        } else {
            None
        };
        let kind = optional_short(cursor, flags & TYPE != 0, "type")?;
        let user_id = optional_short(cursor, flags & USER_ID != 0, "user-id")?;
        let app_id = optional_short(cursor, flags & APP_ID != 0, "app-id")?;
        let cluster_id = optional_short(cursor, flags & CLUSTER_ID != 0, "cluster-id")?;

        Ok(Self {
            content_type,
            content_encoding,
            headers,
            delivery_mode,
            priority,
            correlation_id,
            reply_to,
            expiration,
            message_id,
            timestamp,
            kind,
            user_id,
            app_id,
            cluster_id,
        })
    }
}

fn optional_short(
    cursor: &mut WireCursor<'_>,
    present: bool,
    what: &'static str,
) -> Result<Option<String>> {
    if present {
        cursor.short_str(what).map(Some)
    } else {
        Ok(None)
    }
}

/// Payload of a content header frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentHeader {
    pub class_id: u16,
    /// Total size of the body frames that follow.
    pub body_size: u64,
    pub properties: BasicProperties,
}

impl ContentHeader {
    /// Header for a basic-class message.
    pub fn basic(body_size: u64, properties: BasicProperties) -> Self {
        Self {
            class_id: CLASS_BASIC,
            body_size,
            properties,
        }
    }

    pub(crate) fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u16(self.class_id);
        dst.put_u16(0); // weight
        dst.put_u64(self.body_size);
        self.properties.encode(dst)
    }

    pub(crate) fn decode(payload: &[u8]) -> Result<Self> {
        let mut cursor = WireCursor::new(payload);
        let class_id = cursor.u16("content header")?;
        if class_id != CLASS_BASIC {
            return Err(FrameError::Malformed("content header class"));
        }
        let _weight = cursor.u16("content header")?;
        let body_size = cursor.u64("content header")?;
        let properties = BasicProperties::decode(&mut cursor)?;
        cursor.expect_end("content header")?;
        Ok(Self {
            class_id,
            body_size,
            properties,
        })
    }
}
