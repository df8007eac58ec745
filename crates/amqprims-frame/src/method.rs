//! The AMQP 0.9.1 method table.
//!
//! Every (class, method) pair the client sends or receives is a variant of
//! [`Method`]. Deprecated reserved arguments (`ticket`, `insist`,
//! `known-hosts`, ...) are written as zero values and dropped on decode.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::buffer::{put_bits, put_long_bytes, put_short_str, WireCursor};
use crate::constants::{
    CLASS_BASIC, CLASS_CHANNEL, CLASS_CONFIRM, CLASS_CONNECTION, CLASS_EXCHANGE, CLASS_QUEUE,
    CLASS_TX,
};
use crate::error::{FrameError, Result};
use crate::value::FieldTable;

/// Wire identity of a method: class ID and method ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodId {
    pub class_id: u16,
    pub method_id: u16,
}

impl MethodId {
    pub const fn new(class_id: u16, method_id: u16) -> Self {
        Self {
            class_id,
            method_id,
        }
    }

    pub const CONNECTION_START: Self = Self::new(CLASS_CONNECTION, 10);
    pub const CONNECTION_START_OK: Self = Self::new(CLASS_CONNECTION, 11);
    pub const CONNECTION_SECURE: Self = Self::new(CLASS_CONNECTION, 20);
    pub const CONNECTION_SECURE_OK: Self = Self::new(CLASS_CONNECTION, 21);
    pub const CONNECTION_TUNE: Self = Self::new(CLASS_CONNECTION, 30);
    pub const CONNECTION_TUNE_OK: Self = Self::new(CLASS_CONNECTION, 31);
    pub const CONNECTION_OPEN: Self = Self::new(CLASS_CONNECTION, 40);
    pub const CONNECTION_OPEN_OK: Self = Self::new(CLASS_CONNECTION, 41);
    pub const CONNECTION_CLOSE: Self = Self::new(CLASS_CONNECTION, 50);
    pub const CONNECTION_CLOSE_OK: Self = Self::new(CLASS_CONNECTION, 51);
    pub const CONNECTION_BLOCKED: Self = Self::new(CLASS_CONNECTION, 60);
    pub const CONNECTION_UNBLOCKED: Self = Self::new(CLASS_CONNECTION, 61);

    pub const CHANNEL_OPEN: Self = Self::new(CLASS_CHANNEL, 10);
    pub const CHANNEL_OPEN_OK: Self = Self::new(CLASS_CHANNEL, 11);
    pub const CHANNEL_FLOW: Self = Self::new(CLASS_CHANNEL, 20);
    pub const CHANNEL_FLOW_OK: Self = Self::new(CLASS_CHANNEL, 21);
    pub const CHANNEL_CLOSE: Self = Self::new(CLASS_CHANNEL, 40);
    pub const CHANNEL_CLOSE_OK: Self = Self::new(CLASS_CHANNEL, 41);

    pub const EXCHANGE_DECLARE: Self = Self::new(CLASS_EXCHANGE, 10);
    pub const EXCHANGE_DECLARE_OK: Self = Self::new(CLASS_EXCHANGE, 11);
    pub const EXCHANGE_DELETE: Self = Self::new(CLASS_EXCHANGE, 20);
    pub const EXCHANGE_DELETE_OK: Self = Self::new(CLASS_EXCHANGE, 21);
    pub const EXCHANGE_BIND: Self = Self::new(CLASS_EXCHANGE, 30);
    pub const EXCHANGE_BIND_OK: Self = Self::new(CLASS_EXCHANGE, 31);
    pub const EXCHANGE_UNBIND: Self = Self::new(CLASS_EXCHANGE, 40);
    pub const EXCHANGE_UNBIND_OK: Self = Self::new(CLASS_EXCHANGE, 51);

    pub const QUEUE_DECLARE: Self = Self::new(CLASS_QUEUE, 10);
    pub const QUEUE_DECLARE_OK: Self = Self::new(CLASS_QUEUE, 11);
    pub const QUEUE_BIND: Self = Self::new(CLASS_QUEUE, 20);
    pub const QUEUE_BIND_OK: Self = Self::new(CLASS_QUEUE, 21);
    pub const QUEUE_PURGE: Self = Self::new(CLASS_QUEUE, 30);
    pub const QUEUE_PURGE_OK: Self = Self::new(CLASS_QUEUE, 31);
    pub const QUEUE_DELETE: Self = Self::new(CLASS_QUEUE, 40);
    pub const QUEUE_DELETE_OK: Self = Self::new(CLASS_QUEUE, 41);
    pub const QUEUE_UNBIND: Self = Self::new(CLASS_QUEUE, 50);
    pub const QUEUE_UNBIND_OK: Self = Self::new(CLASS_QUEUE, 51);

    pub const BASIC_QOS: Self = Self::new(CLASS_BASIC, 10);
    pub const BASIC_QOS_OK: Self = Self::new(CLASS_BASIC, 11);
    pub const BASIC_CONSUME: Self = Self::new(CLASS_BASIC, 20);
    pub const BASIC_CONSUME_OK: Self = Self::new(CLASS_BASIC, 21);
    pub const BASIC_CANCEL: Self = Self::new(CLASS_BASIC, 30);
    pub const BASIC_CANCEL_OK: Self = Self::new(CLASS_BASIC, 31);
    pub const BASIC_PUBLISH: Self = Self::new(CLASS_BASIC, 40);
    pub const BASIC_RETURN: Self = Self::new(CLASS_BASIC, 50);
    pub const BASIC_DELIVER: Self = Self::new(CLASS_BASIC, 60);
    pub const BASIC_GET: Self = Self::new(CLASS_BASIC, 70);
    pub const BASIC_GET_OK: Self = Self::new(CLASS_BASIC, 71);
    pub const BASIC_GET_EMPTY: Self = Self::new(CLASS_BASIC, 72);
    pub const BASIC_ACK: Self = Self::new(CLASS_BASIC, 80);
    pub const BASIC_REJECT: Self = Self::new(CLASS_BASIC, 90);
    pub const BASIC_RECOVER_ASYNC: Self = Self::new(CLASS_BASIC, 100);
    pub const BASIC_RECOVER: Self = Self::new(CLASS_BASIC, 110);
    pub const BASIC_RECOVER_OK: Self = Self::new(CLASS_BASIC, 111);
    pub const BASIC_NACK: Self = Self::new(CLASS_BASIC, 120);

    pub const CONFIRM_SELECT: Self = Self::new(CLASS_CONFIRM, 10);
    pub const CONFIRM_SELECT_OK: Self = Self::new(CLASS_CONFIRM, 11);

    pub const TX_SELECT: Self = Self::new(CLASS_TX, 10);
    pub const TX_SELECT_OK: Self = Self::new(CLASS_TX, 11);
    pub const TX_COMMIT: Self = Self::new(CLASS_TX, 20);
    pub const TX_COMMIT_OK: Self = Self::new(CLASS_TX, 21);
    pub const TX_ROLLBACK: Self = Self::new(CLASS_TX, 30);
    pub const TX_ROLLBACK_OK: Self = Self::new(CLASS_TX, 31);

    /// Dotted method name, e.g. `queue.declare-ok`. `None` if unknown.
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::CONNECTION_START => "connection.start",
            Self::CONNECTION_START_OK => "connection.start-ok",
            Self::CONNECTION_SECURE => "connection.secure",
            Self::CONNECTION_SECURE_OK => "connection.secure-ok",
            Self::CONNECTION_TUNE => "connection.tune",
            Self::CONNECTION_TUNE_OK => "connection.tune-ok",
            Self::CONNECTION_OPEN => "connection.open",
            Self::CONNECTION_OPEN_OK => "connection.open-ok",
            Self::CONNECTION_CLOSE => "connection.close",
            Self::CONNECTION_CLOSE_OK => "connection.close-ok",
            Self::CONNECTION_BLOCKED => "connection.blocked",
            Self::CONNECTION_UNBLOCKED => "connection.unblocked",
            Self::CHANNEL_OPEN => "channel.open",
            Self::CHANNEL_OPEN_OK => "channel.open-ok",
            Self::CHANNEL_FLOW => "channel.flow",
            Self::CHANNEL_FLOW_OK => "channel.flow-ok",
            Self::CHANNEL_CLOSE => "channel.close",
            Self::CHANNEL_CLOSE_OK => "channel.close-ok",
            Self::EXCHANGE_DECLARE => "exchange.declare",
            Self::EXCHANGE_DECLARE_OK => "exchange.declare-ok",
            Self::EXCHANGE_DELETE => "exchange.delete",
            Self::EXCHANGE_DELETE_OK => "exchange.delete-ok",
            Self::EXCHANGE_BIND => "exchange.bind",
            Self::EXCHANGE_BIND_OK => "exchange.bind-ok",
            Self::EXCHANGE_UNBIND => "exchange.unbind",
            Self::EXCHANGE_UNBIND_OK => "exchange.unbind-ok",
            Self::QUEUE_DECLARE => "queue.declare",
            Self::QUEUE_DECLARE_OK => "queue.declare-ok",
            Self::QUEUE_BIND => "queue.bind",
            Self::QUEUE_BIND_OK => "queue.bind-ok",
            Self::QUEUE_PURGE => "queue.purge",
            Self::QUEUE_PURGE_OK => "queue.purge-ok",
            Self::QUEUE_DELETE => "queue.delete",
            Self::QUEUE_DELETE_OK => "queue.delete-ok",
            Self::QUEUE_UNBIND => "queue.unbind",
            Self::QUEUE_UNBIND_OK => "queue.unbind-ok",
            Self::BASIC_QOS => "basic.qos",
            Self::BASIC_QOS_OK => "basic.qos-ok",
            Self::BASIC_CONSUME => "basic.consume",
            Self::BASIC_CONSUME_OK => "basic.consume-ok",
            Self::BASIC_CANCEL => "basic.cancel",
            Self::BASIC_CANCEL_OK => "basic.cancel-ok",
            Self::BASIC_PUBLISH => "basic.publish",
            Self::BASIC_RETURN => "basic.return",
            Self::BASIC_DELIVER => "basic.deliver",
            Self::BASIC_GET => "basic.get",
            Self::BASIC_GET_OK => "basic.get-ok",
            Self::BASIC_GET_EMPTY => "basic.get-empty",
            Self::BASIC_ACK => "basic.ack",
            Self::BASIC_REJECT => "basic.reject",
            Self::BASIC_RECOVER_ASYNC => "basic.recover-async",
            Self::BASIC_RECOVER => "basic.recover",
            Self::BASIC_RECOVER_OK => "basic.recover-ok",
            Self::BASIC_NACK => "basic.nack",
            Self::CONFIRM_SELECT => "confirm.select",
            Self::CONFIRM_SELECT_OK => "confirm.select-ok",
            Self::TX_SELECT => "tx.select",
            Self::TX_SELECT_OK => "tx.select-ok",
            Self::TX_COMMIT => "tx.commit",
            Self::TX_COMMIT_OK => "tx.commit-ok",
            Self::TX_ROLLBACK => "tx.rollback",
            Self::TX_ROLLBACK_OK => "tx.rollback-ok",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{}.{}", self.class_id, self.method_id),
        }
    }
}

/// A decoded method frame payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Method {
    ConnectionStart {
        version_major: u8,
        version_minor: u8,
        server_properties: FieldTable,
        mechanisms: String,
        locales: String,
    },
    ConnectionStartOk {
        client_properties: FieldTable,
        mechanism: String,
        response: Bytes,
        locale: String,
    },
    ConnectionSecure {
        challenge: Bytes,
    },
    ConnectionSecureOk {
        response: Bytes,
    },
    ConnectionTune {
        channel_max: u16,
        frame_max: u32,
        heartbeat: u16,
    },
    ConnectionTuneOk {
        channel_max: u16,
        frame_max: u32,
        heartbeat: u16,
    },
    ConnectionOpen {
        virtual_host: String,
    },
    ConnectionOpenOk,
    ConnectionClose {
        reply_code: u16,
        reply_text: String,
        class_id: u16,
        method_id: u16,
    },
    ConnectionCloseOk,
    ConnectionBlocked {
        reason: String,
    },
    ConnectionUnblocked,

    ChannelOpen,
    ChannelOpenOk,
    ChannelFlow {
        active: bool,
    },
    ChannelFlowOk {
        active: bool,
    },
    ChannelClose {
        reply_code: u16,
        reply_text: String,
        class_id: u16,
        method_id: u16,
    },
    ChannelCloseOk,

    ExchangeDeclare {
        exchange: String,
        kind: String,
        passive: bool,
        durable: bool,
        auto_delete: bool,
        internal: bool,
        no_wait: bool,
        arguments: FieldTable,
    },
    ExchangeDeclareOk,
    ExchangeDelete {
        exchange: String,
        if_unused: bool,
        no_wait: bool,
    },
    ExchangeDeleteOk,
    ExchangeBind {
        destination: String,
        source: String,
        routing_key: String,
        no_wait: bool,
        arguments: FieldTable,
    },
    ExchangeBindOk,
    ExchangeUnbind {
        destination: String,
        source: String,
        routing_key: String,
        no_wait: bool,
        arguments: FieldTable,
    },
    ExchangeUnbindOk,

    QueueDeclare {
        queue: String,
        passive: bool,
        durable: bool,
        exclusive: bool,
        auto_delete: bool,
        no_wait: bool,
        arguments: FieldTable,
    },
    QueueDeclareOk {
        queue: String,
        message_count: u32,
        consumer_count: u32,
    },
    QueueBind {
        queue: String,
        exchange: String,
        routing_key: String,
        no_wait: bool,
        arguments: FieldTable,
    },
    QueueBindOk,
    QueuePurge {
        queue: String,
        no_wait: bool,
    },
    QueuePurgeOk {
        message_count: u32,
    },
    QueueDelete {
        queue: String,
        if_unused: bool,
        if_empty: bool,
        no_wait: bool,
    },
    QueueDeleteOk {
        message_count: u32,
    },
    QueueUnbind {
        queue: String,
        exchange: String,
        routing_key: String,
        arguments: FieldTable,
    },
    QueueUnbindOk,

    BasicQos {
        prefetch_size: u32,
        prefetch_count: u16,
        global: bool,
    },
    BasicQosOk,
    BasicConsume {
        queue: String,
        consumer_tag: String,
        no_local: bool,
        no_ack: bool,
        exclusive: bool,
        no_wait: bool,
        arguments: FieldTable,
    },
    BasicConsumeOk {
        consumer_tag: String,
    },
    BasicCancel {
        consumer_tag: String,
        no_wait: bool,
    },
    BasicCancelOk {
        consumer_tag: String,
    },
    BasicPublish {
        exchange: String,
        routing_key: String,
        mandatory: bool,
        immediate: bool,
    },
    BasicReturn {
        reply_code: u16,
        reply_text: String,
        exchange: String,
        routing_key: String,
    },
    BasicDeliver {
        consumer_tag: String,
        delivery_tag: u64,
        redelivered: bool,
        exchange: String,
        routing_key: String,
    },
    BasicGet {
        queue: String,
        no_ack: bool,
    },
    BasicGetOk {
        delivery_tag: u64,
        redelivered: bool,
        exchange: String,
        routing_key: String,
        message_count: u32,
    },
    BasicGetEmpty,
    BasicAck {
        delivery_tag: u64,
        multiple: bool,
    },
    BasicReject {
        delivery_tag: u64,
        requeue: bool,
    },
    BasicRecoverAsync {
        requeue: bool,
    },
    BasicRecover {
        requeue: bool,
    },
    BasicRecoverOk,
    BasicNack {
        delivery_tag: u64,
        multiple: bool,
        requeue: bool,
    },

    ConfirmSelect {
        no_wait: bool,
    },
    ConfirmSelectOk,

    TxSelect,
    TxSelectOk,
    TxCommit,
    TxCommitOk,
    TxRollback,
    TxRollbackOk,
}

impl Method {
    /// Wire identity of this method.
    pub fn id(&self) -> MethodId {
        match self {
            Method::ConnectionStart { .. } => MethodId::CONNECTION_START,
            Method::ConnectionStartOk { .. } => MethodId::CONNECTION_START_OK,
            Method::ConnectionSecure { .. } => MethodId::CONNECTION_SECURE,
            Method::ConnectionSecureOk { .. } => MethodId::CONNECTION_SECURE_OK,
            Method::ConnectionTune { .. } => MethodId::CONNECTION_TUNE,
            Method::ConnectionTuneOk { .. } => MethodId::CONNECTION_TUNE_OK,
            Method::ConnectionOpen { .. } => MethodId::CONNECTION_OPEN,
            Method::ConnectionOpenOk => MethodId::CONNECTION_OPEN_OK,
            Method::ConnectionClose { .. } => MethodId::CONNECTION_CLOSE,
            Method::ConnectionCloseOk => MethodId::CONNECTION_CLOSE_OK,
            Method::ConnectionBlocked { .. } => MethodId::CONNECTION_BLOCKED,
            Method::ConnectionUnblocked => MethodId::CONNECTION_UNBLOCKED,
            Method::ChannelOpen => MethodId::CHANNEL_OPEN,
            Method::ChannelOpenOk => MethodId::CHANNEL_OPEN_OK,
            Method::ChannelFlow { .. } => MethodId::CHANNEL_FLOW,
            Method::ChannelFlowOk { .. } => MethodId::CHANNEL_FLOW_OK,
            Method::ChannelClose { .. } => MethodId::CHANNEL_CLOSE,
            Method::ChannelCloseOk => MethodId::CHANNEL_CLOSE_OK,
            Method::ExchangeDeclare { .. } => MethodId::EXCHANGE_DECLARE,
            Method::ExchangeDeclareOk => MethodId::EXCHANGE_DECLARE_OK,
            Method::ExchangeDelete { .. } => MethodId::EXCHANGE_DELETE,
            Method::ExchangeDeleteOk => MethodId::EXCHANGE_DELETE_OK,
            Method::ExchangeBind { .. } => MethodId::EXCHANGE_BIND,
            Method::ExchangeBindOk => MethodId::EXCHANGE_BIND_OK,
            Method::ExchangeUnbind { .. } => MethodId::EXCHANGE_UNBIND,
            Method::ExchangeUnbindOk => MethodId::EXCHANGE_UNBIND_OK,
            Method::QueueDeclare { .. } => MethodId::QUEUE_DECLARE,
            Method::QueueDeclareOk { .. } => MethodId::QUEUE_DECLARE_OK,
            Method::QueueBind { .. } => MethodId::QUEUE_BIND,
            Method::QueueBindOk => MethodId::QUEUE_BIND_OK,
            Method::QueuePurge { .. } => MethodId::QUEUE_PURGE,
            Method::QueuePurgeOk { .. } => MethodId::QUEUE_PURGE_OK,
            Method::QueueDelete { .. } => MethodId::QUEUE_DELETE,
            Method::QueueDeleteOk { .. } => MethodId::QUEUE_DELETE_OK,
            Method::QueueUnbind { .. } => MethodId::QUEUE_UNBIND,
            Method::QueueUnbindOk => MethodId::QUEUE_UNBIND_OK,
            Method::BasicQos { .. } => MethodId::BASIC_QOS,
            Method::BasicQosOk => MethodId::BASIC_QOS_OK,
            Method::BasicConsume { .. } => MethodId::BASIC_CONSUME,
            Method::BasicConsumeOk { .. } => MethodId::BASIC_CONSUME_OK,
            Method::BasicCancel { .. } => MethodId::BASIC_CANCEL,
            Method::BasicCancelOk { .. } => MethodId::BASIC_CANCEL_OK,
            Method::BasicPublish { .. } => MethodId::BASIC_PUBLISH,
            Method::BasicReturn { .. } => MethodId::BASIC_RETURN,
            Method::BasicDeliver { .. } => MethodId::BASIC_DELIVER,
            Method::BasicGet { .. } => MethodId::BASIC_GET,
            Method::BasicGetOk { .. } => MethodId::BASIC_GET_OK,
            Method::BasicGetEmpty => MethodId::BASIC_GET_EMPTY,
            Method::BasicAck { .. } => MethodId::BASIC_ACK,
            Method::BasicReject { .. } => MethodId::BASIC_REJECT,
            Method::BasicRecoverAsync { .. } => MethodId::BASIC_RECOVER_ASYNC,
            Method::BasicRecover { .. } => MethodId::BASIC_RECOVER,
            Method::BasicRecoverOk => MethodId::BASIC_RECOVER_OK,
            Method::BasicNack { .. } => MethodId::BASIC_NACK,
            Method::ConfirmSelect { .. } => MethodId::CONFIRM_SELECT,
            Method::ConfirmSelectOk => MethodId::CONFIRM_SELECT_OK,
            Method::TxSelect => MethodId::TX_SELECT,
            Method::TxSelectOk => MethodId::TX_SELECT_OK,
            Method::TxCommit => MethodId::TX_COMMIT,
            Method::TxCommitOk => MethodId::TX_COMMIT_OK,
            Method::TxRollback => MethodId::TX_ROLLBACK,
            Method::TxRollbackOk => MethodId::TX_ROLLBACK_OK,
        }
    }

    /// Dotted method name for logs and errors.
    pub fn name(&self) -> &'static str {
        self.id().name().unwrap_or("unknown")
    }

    /// Replies the broker answers this request with.
    ///
    /// Empty for asynchronous methods and for requests sent with `no_wait`.
    pub fn expected_replies(&self) -> &'static [MethodId] {
        match self {
            Method::ConnectionStartOk { .. } | Method::ConnectionSecureOk { .. } => {
                &[MethodId::CONNECTION_TUNE, MethodId::CONNECTION_SECURE]
            }
            Method::ConnectionOpen { .. } => &[MethodId::CONNECTION_OPEN_OK],
            Method::ConnectionClose { .. } => &[MethodId::CONNECTION_CLOSE_OK],
            Method::ChannelOpen => &[MethodId::CHANNEL_OPEN_OK],
            Method::ChannelFlow { .. } => &[MethodId::CHANNEL_FLOW_OK],
            Method::ChannelClose { .. } => &[MethodId::CHANNEL_CLOSE_OK],
            Method::ExchangeDeclare { no_wait: false, .. } => &[MethodId::EXCHANGE_DECLARE_OK],
            Method::ExchangeDelete { no_wait: false, .. } => &[MethodId::EXCHANGE_DELETE_OK],
            Method::ExchangeBind { no_wait: false, .. } => &[MethodId::EXCHANGE_BIND_OK],
            Method::ExchangeUnbind { no_wait: false, .. } => &[MethodId::EXCHANGE_UNBIND_OK],
            Method::QueueDeclare { no_wait: false, .. } => &[MethodId::QUEUE_DECLARE_OK],
            Method::QueueBind { no_wait: false, .. } => &[MethodId::QUEUE_BIND_OK],
            Method::QueuePurge { no_wait: false, .. } => &[MethodId::QUEUE_PURGE_OK],
            Method::QueueDelete { no_wait: false, .. } => &[MethodId::QUEUE_DELETE_OK],
            Method::QueueUnbind { .. } => &[MethodId::QUEUE_UNBIND_OK],
            Method::BasicQos { .. } => &[MethodId::BASIC_QOS_OK],
            Method::BasicConsume { no_wait: false, .. } => &[MethodId::BASIC_CONSUME_OK],
            Method::BasicCancel { no_wait: false, .. } => &[MethodId::BASIC_CANCEL_OK],
            Method::BasicGet { .. } => &[MethodId::BASIC_GET_OK, MethodId::BASIC_GET_EMPTY],
            Method::BasicRecover { .. } => &[MethodId::BASIC_RECOVER_OK],
            Method::ConfirmSelect { no_wait: false } => &[MethodId::CONFIRM_SELECT_OK],
            Method::TxSelect => &[MethodId::TX_SELECT_OK],
            Method::TxCommit => &[MethodId::TX_COMMIT_OK],
            Method::TxRollback => &[MethodId::TX_ROLLBACK_OK],
            _ => &[],
        }
    }

    /// True for methods followed by a content header and body frames.
    pub fn carries_content(&self) -> bool {
        matches!(
            self,
            Method::BasicPublish { .. }
                | Method::BasicDeliver { .. }
                | Method::BasicGetOk { .. }
                | Method::BasicReturn { .. }
        )
    }

    /// Encode class ID, method ID and arguments.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let id = self.id();
        dst.put_u16(id.class_id);
        dst.put_u16(id.method_id);

        match self {
            Method::ConnectionStart {
                version_major,
                version_minor,
                server_properties,
                mechanisms,
                locales,
            } => {
                dst.put_u8(*version_major);
                dst.put_u8(*version_minor);
                server_properties.encode(dst)?;
                put_long_bytes(dst, mechanisms.as_bytes())?;
                put_long_bytes(dst, locales.as_bytes())?;
            }
            Method::ConnectionStartOk {
                client_properties,
                mechanism,
                response,
                locale,
            } => {
                client_properties.encode(dst)?;
                put_short_str(dst, mechanism)?;
                put_long_bytes(dst, response)?;
                put_short_str(dst, locale)?;
            }
            Method::ConnectionSecure { challenge } => put_long_bytes(dst, challenge)?,
            Method::ConnectionSecureOk { response } => put_long_bytes(dst, response)?,
            Method::ConnectionTune {
                channel_max,
                frame_max,
                heartbeat,
            }
            | Method::ConnectionTuneOk {
                channel_max,
                frame_max,
                heartbeat,
            } => {
                dst.put_u16(*channel_max);
                dst.put_u32(*frame_max);
                dst.put_u16(*heartbeat);
            }
            Method::ConnectionOpen { virtual_host } => {
                put_short_str(dst, virtual_host)?;
                put_short_str(dst, "")?; // capabilities
                put_bits(dst, &[false]); // insist
            }
            Method::ConnectionOpenOk => put_short_str(dst, "")?, // known-hosts
            Method::ConnectionClose {
                reply_code,
                reply_text,
                class_id,
                method_id,
            }
            | Method::ChannelClose {
                reply_code,
                reply_text,
                class_id,
                method_id,
            } => {
                dst.put_u16(*reply_code);
                put_short_str(dst, reply_text)?;
                dst.put_u16(*class_id);
                dst.put_u16(*method_id);
            }
            Method::ConnectionBlocked { reason } => put_short_str(dst, reason)?,
            Method::ChannelOpen => put_short_str(dst, "")?, // out-of-band
            Method::ChannelOpenOk => put_long_bytes(dst, b"")?, // channel-id
            Method::ChannelFlow { active } | Method::ChannelFlowOk { active } => {
                put_bits(dst, &[*active]);
            }
            Method::ExchangeDeclare {
                exchange,
                kind,
                passive,
                durable,
                auto_delete,
                internal,
                no_wait,
                arguments,
            } => {
                dst.put_u16(0); // ticket
                put_short_str(dst, exchange)?;
                put_short_str(dst, kind)?;
                put_bits(dst, &[*passive, *durable, *auto_delete, *internal, *no_wait]);
                arguments.encode(dst)?;
            }
            Method::ExchangeDelete {
                exchange,
                if_unused,
                no_wait,
            } => {
                dst.put_u16(0);
                put_short_str(dst, exchange)?;
                put_bits(dst, &[*if_unused, *no_wait]);
            }
            Method::ExchangeBind {
                destination,
                source,
                routing_key,
                no_wait,
                arguments,
            }
            | Method::ExchangeUnbind {
                destination,
                source,
                routing_key,
                no_wait,
                arguments,
            } => {
                dst.put_u16(0);
                put_short_str(dst, destination)?;
                put_short_str(dst, source)?;
                put_short_str(dst, routing_key)?;
                put_bits(dst, &[*no_wait]);
                arguments.encode(dst)?;
            }
            Method::QueueDeclare {
                queue,
                passive,
                durable,
                exclusive,
                auto_delete,
                no_wait,
                arguments,
            } => {
                dst.put_u16(0);
                put_short_str(dst, queue)?;
                put_bits(dst, &[*passive, *durable, *exclusive, *auto_delete, *no_wait]);
                arguments.encode(dst)?;
            }
            Method::QueueDeclareOk {
                queue,
                message_count,
                consumer_count,
            } => {
                put_short_str(dst, queue)?;
                dst.put_u32(*message_count);
                dst.put_u32(*consumer_count);
            }
            Method::QueueBind {
                queue,
                exchange,
                routing_key,
                no_wait,
                arguments,
            } => {
                dst.put_u16(0);
                put_short_str(dst, queue)?;
                put_short_str(dst, exchange)?;
                put_short_str(dst, routing_key)?;
                put_bits(dst, &[*no_wait]);
                arguments.encode(dst)?;
            }
            Method::QueuePurge { queue, no_wait } => {
                dst.put_u16(0);
                put_short_str(dst, queue)?;
                put_bits(dst, &[*no_wait]);
            }
            Method::QueuePurgeOk { message_count } | Method::QueueDeleteOk { message_count } => {
                dst.put_u32(*message_count);
            }
            Method::QueueDelete {
                queue,
                if_unused,
                if_empty,
                no_wait,
            } => {
                dst.put_u16(0);
                put_short_str(dst, queue)?;
                put_bits(dst, &[*if_unused, *if_empty, *no_wait]);
            }
            Method::QueueUnbind {
                queue,
                exchange,
                routing_key,
                arguments,
            } => {
                dst.put_u16(0);
                put_short_str(dst, queue)?;
                put_short_str(dst, exchange)?;
                put_short_str(dst, routing_key)?;
                arguments.encode(dst)?;
            }
            Method::BasicQos {
                prefetch_size,
                prefetch_count,
                global,
            } => {
                dst.put_u32(*prefetch_size);
                dst.put_u16(*prefetch_count);
                put_bits(dst, &[*global]);
            }
            Method::BasicConsume {
                queue,
                consumer_tag,
                no_local,
                no_ack,
                exclusive,
                no_wait,
                arguments,
            } => {
                dst.put_u16(0);
                put_short_str(dst, queue)?;
                put_short_str(dst, consumer_tag)?;
                put_bits(dst, &[*no_local, *no_ack, *exclusive, *no_wait]);
                arguments.encode(dst)?;
            }
            Method::BasicConsumeOk { consumer_tag } | Method::BasicCancelOk { consumer_tag } => {
                put_short_str(dst, consumer_tag)?;
            }
            Method::BasicCancel {
                consumer_tag,
                no_wait,
            } => {
                put_short_str(dst, consumer_tag)?;
                put_bits(dst, &[*no_wait]);
            }
            Method::BasicPublish {
                exchange,
                routing_key,
                mandatory,
                immediate,
            } => {
                dst.put_u16(0);
                put_short_str(dst, exchange)?;
                put_short_str(dst, routing_key)?;
                put_bits(dst, &[*mandatory, *immediate]);
            }
            Method::BasicReturn {
                reply_code,
                reply_text,
                exchange,
                routing_key,
            } => {
                dst.put_u16(*reply_code);
                put_short_str(dst, reply_text)?;
                put_short_str(dst, exchange)?;
                put_short_str(dst, routing_key)?;
            }
            Method::BasicDeliver {
                consumer_tag,
                delivery_tag,
                redelivered,
                exchange,
                routing_key,
            } => {
                put_short_str(dst, consumer_tag)?;
                dst.put_u64(*delivery_tag);
                put_bits(dst, &[*redelivered]);
                put_short_str(dst, exchange)?;
                put_short_str(dst, routing_key)?;
            }
            Method::BasicGet { queue, no_ack } => {
                dst.put_u16(0);
                put_short_str(dst, queue)?;
                put_bits(dst, &[*no_ack]);
            }
            Method::BasicGetOk {
                delivery_tag,
                redelivered,
                exchange,
                routing_key,
                message_count,
            } => {
                dst.put_u64(*delivery_tag);
                put_bits(dst, &[*redelivered]);
                put_short_str(dst, exchange)?;
                put_short_str(dst, routing_key)?;
                dst.put_u32(*message_count);
            }
            Method::BasicGetEmpty => put_short_str(dst, "")?, // cluster-id
            Method::BasicAck {
                delivery_tag,
                multiple,
            } => {
                dst.put_u64(*delivery_tag);
                put_bits(dst, &[*multiple]);
            }
            Method::BasicReject {
                delivery_tag,
                requeue,
            } => {
                dst.put_u64(*delivery_tag);
                put_bits(dst, &[*requeue]);
            }
            Method::BasicRecoverAsync { requeue } | Method::BasicRecover { requeue } => {
                put_bits(dst, &[*requeue]);
            }
            Method::BasicNack {
                delivery_tag,
                multiple,
                requeue,
            } => {
                dst.put_u64(*delivery_tag);
                put_bits(dst, &[*multiple, *requeue]);
            }
            Method::ConfirmSelect { no_wait } => put_bits(dst, &[*no_wait]),
            Method::ConnectionCloseOk
            | Method::ConnectionUnblocked
            | Method::ChannelCloseOk
            | Method::ExchangeDeclareOk
            | Method::ExchangeDeleteOk
            | Method::ExchangeBindOk
            | Method::ExchangeUnbindOk
            | Method::QueueBindOk
            | Method::QueueUnbindOk
            | Method::BasicQosOk
            | Method::BasicRecoverOk
            | Method::ConfirmSelectOk
            | Method::TxSelect
            | Method::TxSelectOk
            | Method::TxCommit
            | Method::TxCommitOk
            | Method::TxRollback
            | Method::TxRollbackOk => {}
        }
        Ok(())
    }

    /// Decode a method frame payload.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut c = WireCursor::new(payload);
        let id = MethodId::new(c.u16("class id")?, c.u16("method id")?);

        let method = match id {
            MethodId::CONNECTION_START => Method::ConnectionStart {
                version_major: c.u8("version-major")?,
                version_minor: c.u8("version-minor")?,
                server_properties: FieldTable::decode(&mut c)?,
                mechanisms: c.long_str("mechanisms")?,
                locales: c.long_str("locales")?,
            },
            MethodId::CONNECTION_START_OK => Method::ConnectionStartOk {
                client_properties: FieldTable::decode(&mut c)?,
                mechanism: c.short_str("mechanism")?,
                response: Bytes::copy_from_slice(c.long_bytes("response")?),
                locale: c.short_str("locale")?,
            },
            MethodId::CONNECTION_SECURE => Method::ConnectionSecure {
                challenge: Bytes::copy_from_slice(c.long_bytes("challenge")?),
            },
            MethodId::CONNECTION_SECURE_OK => Method::ConnectionSecureOk {
                response: Bytes::copy_from_slice(c.long_bytes("response")?),
            },
            MethodId::CONNECTION_TUNE => Method::ConnectionTune {
                channel_max: c.u16("channel-max")?,
                frame_max: c.u32("frame-max")?,
                heartbeat: c.u16("heartbeat")?,
            },
            MethodId::CONNECTION_TUNE_OK => Method::ConnectionTuneOk {
                channel_max: c.u16("channel-max")?,
                frame_max: c.u32("frame-max")?,
                heartbeat: c.u16("heartbeat")?,
            },
            MethodId::CONNECTION_OPEN => {
                let virtual_host = c.short_str("virtual-host")?;
                c.short_str("capabilities")?;
                c.bits::<1>("insist")?;
                Method::ConnectionOpen { virtual_host }
            }
            MethodId::CONNECTION_OPEN_OK => {
                c.short_str("known-hosts")?;
                Method::ConnectionOpenOk
            }
            MethodId::CONNECTION_CLOSE => Method::ConnectionClose {
                reply_code: c.u16("reply-code")?,
                reply_text: c.short_str("reply-text")?,
                class_id: c.u16("class-id")?,
                method_id: c.u16("method-id")?,
            },
            MethodId::CONNECTION_CLOSE_OK => Method::ConnectionCloseOk,
            MethodId::CONNECTION_BLOCKED => Method::ConnectionBlocked {
                reason: c.short_str("reason")?,
            },
            MethodId::CONNECTION_UNBLOCKED => Method::ConnectionUnblocked,

            MethodId::CHANNEL_OPEN => {
                c.short_str("out-of-band")?;
                Method::ChannelOpen
            }
            MethodId::CHANNEL_OPEN_OK => {
                c.long_bytes("channel-id")?;
                Method::ChannelOpenOk
            }
            MethodId::CHANNEL_FLOW => Method::ChannelFlow {
                active: c.bits::<1>("active")?[0],
            },
            MethodId::CHANNEL_FLOW_OK => Method::ChannelFlowOk {
                active: c.bits::<1>("active")?[0],
            },
            MethodId::CHANNEL_CLOSE => Method::ChannelClose {
                reply_code: c.u16("reply-code")?,
                reply_text: c.short_str("reply-text")?,
                class_id: c.u16("class-id")?,
                method_id: c.u16("method-id")?,
            },
            MethodId::CHANNEL_CLOSE_OK => Method::ChannelCloseOk,

            MethodId::EXCHANGE_DECLARE => {
                c.u16("ticket")?;
                let exchange = c.short_str("exchange")?;
                let kind = c.short_str("type")?;
                let [passive, durable, auto_delete, internal, no_wait] = c.bits("flags")?;
                Method::ExchangeDeclare {
                    exchange,
                    kind,
                    passive,
                    durable,
                    auto_delete,
                    internal,
                    no_wait,
                    arguments: FieldTable::decode(&mut c)?,
                }
            }
            MethodId::EXCHANGE_DECLARE_OK => Method::ExchangeDeclareOk,
            MethodId::EXCHANGE_DELETE => {
                c.u16("ticket")?;
                let exchange = c.short_str("exchange")?;
                let [if_unused, no_wait] = c.bits("flags")?;
                Method::ExchangeDelete {
                    exchange,
                    if_unused,
                    no_wait,
                }
            }
            MethodId::EXCHANGE_DELETE_OK => Method::ExchangeDeleteOk,
            MethodId::EXCHANGE_BIND | MethodId::EXCHANGE_UNBIND => {
                c.u16("ticket")?;
                let destination = c.short_str("destination")?;
                let source = c.short_str("source")?;
                let routing_key = c.short_str("routing-key")?;
                let [no_wait] = c.bits("no-wait")?;
                let arguments = FieldTable::decode(&mut c)?;
                if id == MethodId::EXCHANGE_BIND {
                    Method::ExchangeBind {
                        destination,
                        source,
                        routing_key,
                        no_wait,
                        arguments,
                    }
                } else {
                    Method::ExchangeUnbind {
                        destination,
                        source,
                        routing_key,
                        no_wait,
                        arguments,
                    }
                }
            }
            MethodId::EXCHANGE_BIND_OK => Method::ExchangeBindOk,
            MethodId::EXCHANGE_UNBIND_OK => Method::ExchangeUnbindOk,

            MethodId::QUEUE_DECLARE => {
                c.u16("ticket")?;
                let queue = c.short_str("queue")?;
                let [passive, durable, exclusive, auto_delete, no_wait] = c.bits("flags")?;
                Method::QueueDeclare {
                    queue,
                    passive,
                    durable,
                    exclusive,
                    auto_delete,
                    no_wait,
                    arguments: FieldTable::decode(&mut c)?,
                }
            }
            MethodId::QUEUE_DECLARE_OK => Method::QueueDeclareOk {
                queue: c.short_str("queue")?,
                message_count: c.u32("message-count")?,
                consumer_count: c.u32("consumer-count")?,
            },
            MethodId::QUEUE_BIND => {
                c.u16("ticket")?;
                let queue = c.short_str("queue")?;
                let exchange = c.short_str("exchange")?;
                let routing_key = c.short_str("routing-key")?;
                let [no_wait] = c.bits("no-wait")?;
                Method::QueueBind {
                    queue,
                    exchange,
                    routing_key,
                    no_wait,
                    arguments: FieldTable::decode(&mut c)?,
                }
            }
            MethodId::QUEUE_BIND_OK => Method::QueueBindOk,
            MethodId::QUEUE_PURGE => {
                c.u16("ticket")?;
                let queue = c.short_str("queue")?;
                let [no_wait] = c.bits("no-wait")?;
                Method::QueuePurge { queue, no_wait }
            }
            MethodId::QUEUE_PURGE_OK => Method::QueuePurgeOk {
                message_count: c.u32("message-count")?,
            },
            MethodId::QUEUE_DELETE => {
                c.u16("ticket")?;
                let queue = c.short_str("queue")?;
                let [if_unused, if_empty, no_wait] = c.bits("flags")?;
                Method::QueueDelete {
                    queue,
                    if_unused,
                    if_empty,
                    no_wait,
                }
            }
            MethodId::QUEUE_DELETE_OK => Method::QueueDeleteOk {
                message_count: c.u32("message-count")?,
            },
            MethodId::QUEUE_UNBIND => {
                c.u16("ticket")?;
                Method::QueueUnbind {
                    queue: c.short_str("queue")?,
                    exchange: c.short_str("exchange")?,
                    routing_key: c.short_str("routing-key")?,
                    arguments: FieldTable::decode(&mut c)?,
                }
            }
            MethodId::QUEUE_UNBIND_OK => Method::QueueUnbindOk,

            MethodId::BASIC_QOS => Method::BasicQos {
                prefetch_size: c.u32("prefetch-size")?,
                prefetch_count: c.u16("prefetch-count")?,
                global: c.bits::<1>("global")?[0],
            },
            MethodId::BASIC_QOS_OK => Method::BasicQosOk,
            MethodId::BASIC_CONSUME => {
                c.u16("ticket")?;
                let queue = c.short_str("queue")?;
                let consumer_tag = c.short_str("consumer-tag")?;
                let [no_local, no_ack, exclusive, no_wait] = c.bits("flags")?;
                Method::BasicConsume {
                    queue,
                    consumer_tag,
                    no_local,
                    no_ack,
                    exclusive,
                    no_wait,
                    arguments: FieldTable::decode(&mut c)?,
                }
            }
            MethodId::BASIC_CONSUME_OK => Method::BasicConsumeOk {
                consumer_tag: c.short_str("consumer-tag")?,
            },
            MethodId::BASIC_CANCEL => Method::BasicCancel {
                consumer_tag: c.short_str("consumer-tag")?,
                no_wait: c.bits::<1>("no-wait")?[0],
            },
            MethodId::BASIC_CANCEL_OK => Method::BasicCancelOk {
                consumer_tag: c.short_str("consumer-tag")?,
            },
            MethodId::BASIC_PUBLISH => {
                c.u16("ticket")?;
                let exchange = c.short_str("exchange")?;
                let routing_key = c.short_str("routing-key")?;
                let [mandatory, immediate] = c.bits("flags")?;
                Method::BasicPublish {
                    exchange,
                    routing_key,
                    mandatory,
                    immediate,
                }
            }
            MethodId::BASIC_RETURN => Method::BasicReturn {
                reply_code: c.u16("reply-code")?,
                reply_text: c.short_str("reply-text")?,
                exchange: c.short_str("exchange")?,
                routing_key: c.short_str("routing-key")?,
            },
            MethodId::BASIC_DELIVER => Method::BasicDeliver {
                consumer_tag: c.short_str("consumer-tag")?,
                delivery_tag: c.u64("delivery-tag")?,
                redelivered: c.bits::<1>("redelivered")?[0],
                exchange: c.short_str("exchange")?,
                routing_key: c.short_str("routing-key")?,
            },
            MethodId::BASIC_GET => {
                c.u16("ticket")?;
                Method::BasicGet {
                    queue: c.short_str("queue")?,
                    no_ack: c.bits::<1>("no-ack")?[0],
                }
            }
            MethodId::BASIC_GET_OK => Method::BasicGetOk {
                delivery_tag: c.u64("delivery-tag")?,
                redelivered: c.bits::<1>("redelivered")?[0],
                exchange: c.short_str("exchange")?,
                routing_key: c.short_str("routing-key")?,
                message_count: c.u32("message-count")?,
            },
            MethodId::BASIC_GET_EMPTY => {
                c.short_str("cluster-id")?;
                Method::BasicGetEmpty
            }
            MethodId::BASIC_ACK => Method::BasicAck {
                delivery_tag: c.u64("delivery-tag")?,
                multiple: c.bits::<1>("multiple")?[0],
            },
            MethodId::BASIC_REJECT => Method::BasicReject {
                delivery_tag: c.u64("delivery-tag")?,
                requeue: c.bits::<1>("requeue")?[0],
            },
            MethodId::BASIC_RECOVER_ASYNC => Method::BasicRecoverAsync {
                requeue: c.bits::<1>("requeue")?[0],
            },
            MethodId::BASIC_RECOVER => Method::BasicRecover {
                requeue: c.bits::<1>("requeue")?[0],
            },
            MethodId::BASIC_RECOVER_OK => Method::BasicRecoverOk,
            MethodId::BASIC_NACK => {
                let delivery_tag = c.u64("delivery-tag")?;
                let [multiple, requeue] = c.bits("flags")?;
                Method::BasicNack {
                    delivery_tag,
                    multiple,
                    requeue,
                }
            }

            MethodId::CONFIRM_SELECT => Method::ConfirmSelect {
                no_wait: c.bits::<1>("no-wait")?[0],
            },
            MethodId::CONFIRM_SELECT_OK => Method::ConfirmSelectOk,

            MethodId::TX_SELECT => Method::TxSelect,
            MethodId::TX_SELECT_OK => Method::TxSelectOk,
            MethodId::TX_COMMIT => Method::TxCommit,
            MethodId::TX_COMMIT_OK => Method::TxCommitOk,
            MethodId::TX_ROLLBACK => Method::TxRollback,
            MethodId::TX_ROLLBACK_OK => Method::TxRollbackOk,

            MethodId {
                class_id,
                method_id,
            } => {
                return Err(FrameError::UnknownMethod {
                    class_id,
                    method_id,
                })
            }
        };

        c.expect_end("method arguments")?;
        Ok(method)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
