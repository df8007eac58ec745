//! Per-call options. Every struct implements `Default`, so callers set
//! only what differs: `QueueDeclareOptions { durable: true, ..Default::default() }`.

use amqprims_frame::FieldTable;

#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeDeclareOptions {
    pub exchange_type: String,
    pub passive: bool,
    pub durable: bool,
    pub auto_delete: bool,
    pub internal: bool,
    pub no_wait: bool,
    pub arguments: FieldTable,
}

impl Default for ExchangeDeclareOptions {
    fn default() -> Self {
        Self {
            exchange_type: "direct".to_string(),
            passive: false,
            durable: false,
            auto_delete: false,
            internal: false,
            no_wait: false,
            arguments: FieldTable::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeDeleteOptions {
    pub if_unused: bool,
    pub no_wait: bool,
}

impl Default for ExchangeDeleteOptions {
    fn default() -> Self {
        Self {
            if_unused: true,
            no_wait: false,
        }
    }
}

/// Options for exchange-to-exchange and queue bindings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindOptions {
    pub no_wait: bool,
    pub arguments: FieldTable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueDeclareOptions {
    pub passive: bool,
    pub durable: bool,
    pub exclusive: bool,
    pub auto_delete: bool,
    pub no_wait: bool,
    pub arguments: FieldTable,
}

impl Default for QueueDeclareOptions {
    fn default() -> Self {
        Self {
            passive: false,
            durable: false,
            exclusive: false,
            auto_delete: true,
            no_wait: false,
            arguments: FieldTable::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueDeleteOptions {
    pub if_unused: bool,
    pub if_empty: bool,
    pub no_wait: bool,
}

impl Default for QueueDeleteOptions {
    fn default() -> Self {
        Self {
            if_unused: true,
            if_empty: true,
            no_wait: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueuePurgeOptions {
    pub no_wait: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOptions {
    pub exchange: String,
    /// Ask the broker to return the message if no queue is bound.
    pub mandatory: bool,
    pub immediate: bool,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            exchange: "amq.direct".to_string(),
            mandatory: false,
            immediate: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsumeOptions {
    /// Empty lets the broker generate a tag.
    pub consumer_tag: String,
    pub no_local: bool,
    pub no_ack: bool,
    pub exclusive: bool,
    pub no_wait: bool,
    pub arguments: FieldTable,
}

impl Default for ConsumeOptions {
    fn default() -> Self {
        Self {
            consumer_tag: String::new(),
            no_local: false,
            no_ack: true,
            exclusive: false,
            no_wait: false,
            arguments: FieldTable::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetOptions {
    pub no_ack: bool,
}

impl Default for GetOptions {
    fn default() -> Self {
        Self { no_ack: true }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QosOptions {
    pub prefetch_size: u32,
    pub prefetch_count: u16,
    /// Apply to the whole connection instead of the channel.
    pub global: bool,
}
