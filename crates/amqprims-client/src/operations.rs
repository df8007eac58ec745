//! Channel, exchange, queue and basic-class operations.

use std::time::{Duration, Instant};

use amqprims_frame::constants::REPLY_SUCCESS;
use amqprims_frame::{content_frames, BasicProperties, Method};
use amqprims_transport::Transport;
use bytes::Bytes;
use tracing::{debug, warn};

use crate::channel::{ChannelState, ConfirmTracker, ConsumerRegistration, Reply};
use crate::connection::{Connection, Wait};
use crate::error::{ClientError, Result};
use crate::message::Message;
use crate::options::{
    BindOptions, ConsumeOptions, ExchangeDeclareOptions, ExchangeDeleteOptions, GetOptions,
    PublishOptions, QosOptions, QueueDeclareOptions, QueueDeleteOptions, QueuePurgeOptions,
};

/// Reply to queue.declare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDeclareOk {
    /// The queue name, generated by the broker if the request left it empty.
    pub queue: String,
    pub message_count: u32,
    pub consumer_count: u32,
}

fn unexpected_reply(channel: u16, method: &Method) -> ClientError {
    ClientError::UnexpectedFrame {
        channel,
        found: method.name(),
    }
}

impl<T: Transport> Connection<T> {
    /// Open `channel`. Ids run from 1 to [`channel_max`](Self::channel_max).
    pub fn channel_open(&mut self, channel: u16) -> Result<()> {
        self.ensure_open()?;
        let channel_max = self.channel_max();
        self.channels.begin_open(channel, channel_max)?;

        let result = self.call(channel, Method::ChannelOpen);
        let mark_open = match &result {
            Ok(_) => true,
            // a late open-ok is dropped as stale; the channel is usable
            Err(ClientError::Timeout(_)) => true,
            Err(_) => false,
        };
        if mark_open {
            if let Some(slot) = self.channels.get_mut(channel) {
                slot.state = ChannelState::Open;
            }
        }
        result?;
        debug!(channel, "channel opened");
        Ok(())
    }

    /// Close `channel` and wait for close-ok.
    ///
    /// Frames that arrive for the channel meanwhile are discarded. On timeout
    /// the channel stays Closing until close-ok arrives.
    pub fn channel_close(&mut self, channel: u16) -> Result<()> {
        self.ensure_open()?;
        let slot = self.channels.usable(channel)?;
        slot.state = ChannelState::Closing;
        slot.pending = None;

        self.send_method(
            channel,
            Method::ChannelClose {
                reply_code: REPLY_SUCCESS,
                reply_text: "Goodbye".to_string(),
                class_id: 0,
                method_id: 0,
            },
        )?;

        let timeout = self.rpc_timeout;
        let closed = self.pump(Wait::within(timeout), |conn| {
            conn.channel_state(channel) == ChannelState::Closed
        })?;
        if !closed {
            return Err(ClientError::Timeout(timeout.unwrap_or_default()));
        }
        Ok(())
    }

    pub fn exchange_declare(
        &mut self,
        channel: u16,
        exchange: &str,
        options: &ExchangeDeclareOptions,
    ) -> Result<()> {
        self.rpc(
            channel,
            Method::ExchangeDeclare {
                exchange: exchange.to_string(),
                kind: options.exchange_type.clone(),
                passive: options.passive,
                durable: options.durable,
                auto_delete: options.auto_delete,
                internal: options.internal,
                no_wait: options.no_wait,
                arguments: options.arguments.clone(),
            },
        )?;
        Ok(())
    }

    pub fn exchange_delete(
        &mut self,
        channel: u16,
        exchange: &str,
        options: &ExchangeDeleteOptions,
    ) -> Result<()> {
        self.rpc(
            channel,
            Method::ExchangeDelete {
                exchange: exchange.to_string(),
                if_unused: options.if_unused,
                no_wait: options.no_wait,
            },
        )?;
        Ok(())
    }

    /// Route messages from `source` to `destination` exchange.
    pub fn exchange_bind(
        &mut self,
        channel: u16,
        destination: &str,
        source: &str,
        routing_key: &str,
        options: &BindOptions,
    ) -> Result<()> {
        self.rpc(
            channel,
            Method::ExchangeBind {
                destination: destination.to_string(),
                source: source.to_string(),
                routing_key: routing_key.to_string(),
                no_wait: options.no_wait,
                arguments: options.arguments.clone(),
            },
        )?;
        Ok(())
    }

    pub fn exchange_unbind(
        &mut self,
        channel: u16,
        destination: &str,
        source: &str,
        routing_key: &str,
        options: &BindOptions,
    ) -> Result<()> {
        self.rpc(
            channel,
            Method::ExchangeUnbind {
                destination: destination.to_string(),
                source: source.to_string(),
                routing_key: routing_key.to_string(),
                no_wait: options.no_wait,
                arguments: options.arguments.clone(),
            },
        )?;
        Ok(())
    }

    /// Declare `queue`; an empty name asks the broker to generate one.
    ///
    /// With `no_wait` nothing comes back, so the returned counts are zero
    /// and the name is the one requested.
    pub fn queue_declare(
        &mut self,
        channel: u16,
        queue: &str,
        options: &QueueDeclareOptions,
    ) -> Result<QueueDeclareOk> {
        let reply = self.rpc(
            channel,
            Method::QueueDeclare {
                queue: queue.to_string(),
                passive: options.passive,
                durable: options.durable,
                exclusive: options.exclusive,
                auto_delete: options.auto_delete,
                no_wait: options.no_wait,
                arguments: options.arguments.clone(),
            },
        )?;
        match reply {
            None => Ok(QueueDeclareOk {
                queue: queue.to_string(),
                message_count: 0,
                consumer_count: 0,
            }),
            Some(Method::QueueDeclareOk {
                queue,
                message_count,
                consumer_count,
            }) => Ok(QueueDeclareOk {
                queue,
                message_count,
                consumer_count,
            }),
            Some(other) => Err(self.fail(unexpected_reply(channel, &other))),
        }
    }

    pub fn queue_bind(
        &mut self,
        channel: u16,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        options: &BindOptions,
    ) -> Result<()> {
        self.rpc(
            channel,
            Method::QueueBind {
                queue: queue.to_string(),
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                no_wait: options.no_wait,
                arguments: options.arguments.clone(),
            },
        )?;
        Ok(())
    }

    /// Remove a binding. queue.unbind has no `no_wait` flag, so the call
    /// always waits for unbind-ok and `options.no_wait` is ignored.
    pub fn queue_unbind(
        &mut self,
        channel: u16,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        options: &BindOptions,
    ) -> Result<()> {
        self.rpc(
            channel,
            Method::QueueUnbind {
                queue: queue.to_string(),
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                arguments: options.arguments.clone(),
            },
        )?;
        Ok(())
    }

    /// Delete `queue`, returning how many messages it held.
    pub fn queue_delete(
        &mut self,
        channel: u16,
        queue: &str,
        options: &QueueDeleteOptions,
    ) -> Result<u32> {
        let reply = self.rpc(
            channel,
            Method::QueueDelete {
                queue: queue.to_string(),
                if_unused: options.if_unused,
                if_empty: options.if_empty,
                no_wait: options.no_wait,
            },
        )?;
        match reply {
            None => Ok(0),
            Some(Method::QueueDeleteOk { message_count }) => Ok(message_count),
            Some(other) => Err(self.fail(unexpected_reply(channel, &other))),
        }
    }

    /// Drop all ready messages from `queue`, returning how many were removed.
    pub fn queue_purge(
        &mut self,
        channel: u16,
        queue: &str,
        options: &QueuePurgeOptions,
    ) -> Result<u32> {
        let reply = self.rpc(
            channel,
            Method::QueuePurge {
                queue: queue.to_string(),
                no_wait: options.no_wait,
            },
        )?;
        match reply {
            None => Ok(0),
            Some(Method::QueuePurgeOk { message_count }) => Ok(message_count),
            Some(other) => Err(self.fail(unexpected_reply(channel, &other))),
        }
    }

    /// Publish a message. Fire-and-forget: the method, header and body
    /// frames go out in one write and nothing is awaited.
    ///
    /// Unroutable mandatory messages come back through
    /// [`take_returned`](Self::take_returned).
    pub fn publish(
        &mut self,
        channel: u16,
        routing_key: &str,
        body: impl Into<Bytes>,
        properties: BasicProperties,
        options: &PublishOptions,
    ) -> Result<()> {
        self.ensure_open()?;
        let slot = self.channels.usable(channel)?;
        if !slot.flow_active {
            warn!(channel, "publishing while the broker has paused the channel");
        }
        if let Some(reason) = self.blocked() {
            debug!(channel, %reason, "publishing while the connection is blocked");
        }

        let frames = content_frames(
            channel,
            Method::BasicPublish {
                exchange: options.exchange.clone(),
                routing_key: routing_key.to_string(),
                mandatory: options.mandatory,
                immediate: options.immediate,
            },
            properties,
            body.into(),
            self.tuning.frame_max as usize,
        );
        self.send_frames(&frames)?;

        if let Some(tracker) = self
            .channels
            .get_mut(channel)
            .and_then(|slot| slot.confirms.as_mut())
        {
            tracker.published();
        }
        Ok(())
    }

    /// Start a consumer on `queue` and return its tag.
    pub fn consume(&mut self, channel: u16, queue: &str, options: &ConsumeOptions) -> Result<String> {
        if options.no_wait && options.consumer_tag.is_empty() {
            return Err(ClientError::InvalidArgument(
                "no_wait consume needs an explicit consumer tag".to_string(),
            ));
        }

        let reply = self.rpc(
            channel,
            Method::BasicConsume {
                queue: queue.to_string(),
                consumer_tag: options.consumer_tag.clone(),
                no_local: options.no_local,
                no_ack: options.no_ack,
                exclusive: options.exclusive,
                no_wait: options.no_wait,
                arguments: options.arguments.clone(),
            },
        )?;
        let consumer_tag = match reply {
            None => options.consumer_tag.clone(),
            Some(Method::BasicConsumeOk { consumer_tag }) => consumer_tag,
            Some(other) => return Err(self.fail(unexpected_reply(channel, &other))),
        };

        if let Some(slot) = self.channels.get_mut(channel) {
            slot.consumers.insert(
                consumer_tag.clone(),
                ConsumerRegistration {
                    channel,
                    queue: queue.to_string(),
                    consumer_tag: consumer_tag.clone(),
                    no_ack: options.no_ack,
                },
            );
        }
        debug!(channel, %consumer_tag, queue, "consumer started");
        Ok(consumer_tag)
    }

    /// Cancel a consumer. Returns false if no such consumer is registered
    /// on `channel`, in which case nothing is sent.
    pub fn cancel(&mut self, channel: u16, consumer_tag: &str) -> Result<bool> {
        self.ensure_open()?;
        let slot = self.channels.usable(channel)?;
        if !slot.consumers.contains_key(consumer_tag) {
            return Ok(false);
        }

        self.rpc(
            channel,
            Method::BasicCancel {
                consumer_tag: consumer_tag.to_string(),
                no_wait: false,
            },
        )?;
        if let Some(slot) = self.channels.get_mut(channel) {
            slot.consumers.remove(consumer_tag);
        }
        debug!(channel, consumer_tag, "consumer cancelled");
        Ok(true)
    }

    /// Fetch one message from `queue`; `None` if it is empty.
    pub fn get(&mut self, channel: u16, queue: &str, options: &GetOptions) -> Result<Option<Message>> {
        let reply = self.call(
            channel,
            Method::BasicGet {
                queue: queue.to_string(),
                no_ack: options.no_ack,
            },
        )?;
        match reply {
            Some(Reply::Content(content)) => Message::try_from(content)
                .map(Some)
                .map_err(|err| self.fail(err)),
            Some(Reply::Method(Method::BasicGetEmpty)) => Ok(None),
            Some(Reply::Method(other)) => Err(self.fail(unexpected_reply(channel, &other))),
            None => Ok(None),
        }
    }

    /// Next delivery for any consumer on this connection.
    ///
    /// `timeout_ms` of 0 blocks until one arrives. A negative value returns
    /// only what is already decoded or sitting complete in the read buffer
    /// and never reads the transport. A positive value waits up to that many
    /// milliseconds. `Ok(None)` means nothing arrived in time.
    pub fn recv(&mut self, timeout_ms: i64) -> Result<Option<Message>> {
        if let Some(message) = self.deliveries.pop_front() {
            return Ok(Some(message));
        }
        self.ensure_open()?;

        let wait = match timeout_ms {
            0 => Wait::Forever,
            ms if ms < 0 => Wait::BufferedOnly,
            ms => Wait::Until(Instant::now() + Duration::from_millis(ms.unsigned_abs())),
        };
        self.pump(wait, |conn| !conn.deliveries.is_empty())?;
        Ok(self.deliveries.pop_front())
    }

    pub fn ack(&mut self, channel: u16, delivery_tag: u64, multiple: bool) -> Result<()> {
        self.call(
            channel,
            Method::BasicAck {
                delivery_tag,
                multiple,
            },
        )?;
        Ok(())
    }

    pub fn reject(&mut self, channel: u16, delivery_tag: u64, requeue: bool) -> Result<()> {
        self.call(
            channel,
            Method::BasicReject {
                delivery_tag,
                requeue,
            },
        )?;
        Ok(())
    }

    /// Reject one or, with `multiple`, all deliveries up to `delivery_tag`.
    pub fn nack(
        &mut self,
        channel: u16,
        delivery_tag: u64,
        multiple: bool,
        requeue: bool,
    ) -> Result<()> {
        self.call(
            channel,
            Method::BasicNack {
                delivery_tag,
                multiple,
                requeue,
            },
        )?;
        Ok(())
    }

    pub fn basic_qos(&mut self, channel: u16, options: &QosOptions) -> Result<()> {
        self.rpc(
            channel,
            Method::BasicQos {
                prefetch_size: options.prefetch_size,
                prefetch_count: options.prefetch_count,
                global: options.global,
            },
        )?;
        Ok(())
    }

    /// Ask the broker to redeliver unacknowledged messages on `channel`.
    pub fn basic_recover(&mut self, channel: u16, requeue: bool) -> Result<()> {
        self.rpc(channel, Method::BasicRecover { requeue })?;
        Ok(())
    }

    pub fn tx_select(&mut self, channel: u16) -> Result<()> {
        if self
            .channels
            .get(channel)
            .is_some_and(|slot| slot.confirms.is_some())
        {
            return Err(ClientError::channel(
                channel,
                "channel is in confirm mode, transactions are not allowed",
            ));
        }
        self.rpc(channel, Method::TxSelect)?;
        if let Some(slot) = self.channels.get_mut(channel) {
            slot.transactional = true;
        }
        Ok(())
    }

    pub fn tx_commit(&mut self, channel: u16) -> Result<()> {
        self.require_transactional(channel)?;
        self.rpc(channel, Method::TxCommit)?;
        Ok(())
    }

    pub fn tx_rollback(&mut self, channel: u16) -> Result<()> {
        self.require_transactional(channel)?;
        self.rpc(channel, Method::TxRollback)?;
        Ok(())
    }

    fn require_transactional(&mut self, channel: u16) -> Result<()> {
        self.ensure_open()?;
        let slot = self.channels.usable(channel)?;
        if slot.transactional {
            Ok(())
        } else {
            Err(ClientError::channel(
                channel,
                "tx.select has not been issued on this channel",
            ))
        }
    }

    /// Put `channel` into publisher-confirm mode.
    pub fn confirm_select(&mut self, channel: u16) -> Result<()> {
        if self
            .channels
            .get(channel)
            .is_some_and(|slot| slot.transactional)
        {
            return Err(ClientError::channel(
                channel,
                "channel is transactional, confirm mode is not allowed",
            ));
        }
        self.rpc(channel, Method::ConfirmSelect { no_wait: false })?;
        if let Some(slot) = self.channels.get_mut(channel) {
            if slot.confirms.is_none() {
                slot.confirms = Some(ConfirmTracker::default());
            }
        }
        Ok(())
    }

    /// Wait until the broker has confirmed every publish on `channel`.
    ///
    /// Returns true if all of them were acked since the previous call, false
    /// if any was nacked. `None` waits without limit.
    pub fn wait_for_confirms(&mut self, channel: u16, timeout: Option<Duration>) -> Result<bool> {
        self.ensure_open()?;
        let slot = self.channels.usable(channel)?;
        if slot.confirms.is_none() {
            return Err(ClientError::channel(channel, "confirm mode is not enabled"));
        }

        let settled = self.pump(Wait::within(timeout), |conn| {
            conn.channels.get(channel).is_none_or(|slot| {
                slot.state == ChannelState::Closed
                    || slot
                        .confirms
                        .as_ref()
                        .is_none_or(|tracker| tracker.unconfirmed() == 0)
            })
        })?;

        let slot = self.channels.usable(channel)?;
        if !settled {
            return Err(ClientError::Timeout(timeout.unwrap_or_default()));
        }
        Ok(slot
            .confirms
            .as_mut()
            .is_none_or(ConfirmTracker::take_all_acked))
    }

    /// Next message the broker returned as unroutable on `channel`.
    pub fn take_returned(&mut self, channel: u16) -> Option<Message> {
        self.channels
            .get_mut(channel)
            .and_then(|slot| slot.returned.pop_front())
    }
}
