use std::collections::VecDeque;
use std::io::ErrorKind;
use std::time::{Duration, Instant};

use amqprims_frame::constants::REPLY_SUCCESS;
use amqprims_frame::{
    Content, ContentCollector, FieldTable, FieldValue, Frame, FrameConfig, FrameError,
    FramePayload, FrameReader, FrameWriter, Method, MethodId,
};
use amqprims_transport::Transport;
use tracing::{debug, info, trace, warn};

use crate::channel::{
    ChannelSlot, ChannelState, ChannelTable, CloseReason, ConsumerRegistration, PendingCall, Reply,
};
use crate::config::{ConnectOptions, Tuning};
use crate::error::{ClientError, Result};
use crate::handshake::{handshake_client, HandshakeConfig};
use crate::liveness::Liveness;
use crate::message::Message;

/// Shortest read timeout handed to the transport; zero would mean "block".
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Handshaking,
    Open,
    /// connection.close sent, waiting for close-ok.
    Closing,
    Closed,
}

/// How long [`Connection::pump`] may wait for the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wait {
    Forever,
    Until(Instant),
    /// Only frames already in the read buffer; never touch the transport.
    BufferedOnly,
}

impl Wait {
    pub(crate) fn within(timeout: Option<Duration>) -> Self {
        match timeout {
            Some(timeout) => Wait::Until(Instant::now() + timeout),
            None => Wait::Forever,
        }
    }
}

/// An open AMQP connection and all of its channels.
///
/// All I/O happens inside the call that needs it: a synchronous request
/// reads and dispatches frames for every channel until its own reply
/// arrives, so deliveries and broker notifications for other channels are
/// buffered along the way.
pub struct Connection<T: Transport> {
    pub(crate) reader: FrameReader<T>,
    pub(crate) state: ConnectionState,
    pub(crate) tuning: Tuning,
    server_properties: FieldTable,
    client_properties: FieldTable,
    pub(crate) channels: ChannelTable,
    pub(crate) deliveries: VecDeque<Message>,
    collector: Option<ContentCollector>,
    liveness: Liveness,
    pub(crate) rpc_timeout: Option<Duration>,
    close_timeout: Duration,
    blocked: Option<String>,
    close_reason: Option<CloseReason>,
    utf8_header_strings: bool,
}

impl<T: Transport> Connection<T> {
    /// Run the handshake over a connected stream.
    ///
    /// On failure the stream is shut down and dropped.
    pub fn open(stream: T, options: &ConnectOptions) -> Result<Self> {
        let frame_config = FrameConfig {
            frame_max: options.frame_max as usize,
            read_timeout: options.timeout,
            write_timeout: options.timeout,
        };
        let reader = FrameReader::with_transport(stream, frame_config)?;
        reader.get_ref().set_write_timeout(options.timeout)?;

        let mut conn = Self {
            reader,
            state: ConnectionState::Disconnected,
            tuning: Tuning {
                channel_max: options.channel_max,
                frame_max: options.frame_max,
                heartbeat: options.heartbeat,
            },
            server_properties: FieldTable::new(),
            client_properties: FieldTable::new(),
            channels: ChannelTable::default(),
            deliveries: VecDeque::new(),
            collector: None,
            liveness: Liveness::new(0),
            rpc_timeout: options.rpc_timeout,
            close_timeout: options.close_timeout,
            blocked: None,
            close_reason: None,
            utf8_header_strings: options.utf8_header_strings,
        };

        conn.state = ConnectionState::Handshaking;
        let handshake = match handshake_client(&mut conn.reader, &HandshakeConfig::from(options)) {
            Ok(handshake) => handshake,
            Err(err) => {
                conn.teardown();
                return Err(err);
            }
        };

        conn.tuning = handshake.tuning;
        conn.reader.set_frame_max(handshake.tuning.frame_max as usize);
        conn.liveness = Liveness::new(handshake.tuning.heartbeat);
        conn.server_properties = handshake.server_properties;
        conn.client_properties = handshake.client_properties;
        conn.state = ConnectionState::Open;

        info!(
            transport = conn.reader.get_ref().transport_name(),
            vhost = %options.vhost,
            channel_max = conn.tuning.channel_max,
            frame_max = conn.tuning.frame_max,
            heartbeat = conn.tuning.heartbeat,
            "connection established"
        );
        Ok(conn)
    }

    /// Close the connection politely.
    ///
    /// Sends connection.close, waits up to the close timeout for close-ok,
    /// then shuts the transport down regardless. Calling it again is a no-op.
    pub fn disconnect(&mut self) -> Result<()> {
        if self.state != ConnectionState::Open {
            if self.state != ConnectionState::Closed {
                self.teardown();
            }
            return Ok(());
        }

        self.state = ConnectionState::Closing;
        let close = Method::ConnectionClose {
            reply_code: REPLY_SUCCESS,
            reply_text: "Goodbye".to_string(),
            class_id: 0,
            method_id: 0,
        };
        if self.send_method(0, close).is_ok() {
            let deadline = Instant::now() + self.close_timeout;
            match self.pump(Wait::Until(deadline), |conn| {
                conn.state == ConnectionState::Closed
            }) {
                Ok(true) => debug!("connection.close-ok received"),
                Ok(false) => debug!(timeout = ?self.close_timeout, "no close-ok before timeout"),
                Err(err) => debug!(error = %err, "error while waiting for close-ok"),
            }
        }

        self.teardown();
        info!("connection closed");
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn server_properties(&self) -> &FieldTable {
        &self.server_properties
    }

    /// Properties sent in connection.start-ok, defaults included.
    pub fn client_properties(&self) -> &FieldTable {
        &self.client_properties
    }

    pub fn tuning(&self) -> Tuning {
        self.tuning
    }

    /// Highest channel id that may be opened.
    pub fn channel_max(&self) -> u16 {
        self.tuning.effective_channel_max()
    }

    /// Negotiated frame size limit; 0 means unlimited.
    pub fn frame_max(&self) -> u32 {
        self.tuning.frame_max
    }

    /// Negotiated heartbeat interval in seconds; 0 means disabled.
    pub fn heartbeat_interval(&self) -> u16 {
        self.tuning.heartbeat
    }

    pub fn rpc_timeout(&self) -> Option<Duration> {
        self.rpc_timeout
    }

    /// Deadline for synchronous channel calls. `None` blocks.
    pub fn set_rpc_timeout(&mut self, timeout: Option<Duration>) {
        self.rpc_timeout = timeout;
    }

    pub fn channel_state(&self, channel: u16) -> ChannelState {
        self.channels
            .get(channel)
            .map_or(ChannelState::Closed, |slot| slot.state)
    }

    /// Why the broker closed `channel`, if it did.
    pub fn channel_close_reason(&self, channel: u16) -> Option<&CloseReason> {
        self.channels
            .get(channel)
            .and_then(|slot| slot.close_reason.as_ref())
    }

    /// True if a synchronous call on `channel` timed out and its reply is
    /// still outstanding.
    pub fn is_desynced(&self, channel: u16) -> bool {
        self.channels
            .get(channel)
            .is_some_and(ChannelSlot::is_desynced)
    }

    /// Reason given by connection.blocked, until connection.unblocked.
    pub fn blocked(&self) -> Option<&str> {
        self.blocked.as_deref()
    }

    /// Why the broker closed the connection, if it did.
    pub fn close_reason(&self) -> Option<&CloseReason> {
        self.close_reason.as_ref()
    }

    pub fn consumers(&self) -> impl Iterator<Item = &ConsumerRegistration> {
        self.channels.consumers()
    }

    /// Number of deliveries decoded but not yet returned by `recv`.
    pub fn pending_deliveries(&self) -> usize {
        self.deliveries.len()
    }

    /// A string header value tagged per the `utf8_header_strings` option.
    pub fn header_value(&self, key: &str, value: impl Into<String>) -> FieldValue {
        FieldValue::string(key, value, self.utf8_header_strings)
    }

    pub fn transport(&self) -> &T {
        self.reader.get_ref()
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.state == ConnectionState::Open {
            Ok(())
        } else {
            Err(ClientError::NotConnected)
        }
    }

    /// Tear the connection down if `err` is connection-fatal.
    pub(crate) fn fail(&mut self, err: ClientError) -> ClientError {
        if err.is_fatal() && self.state != ConnectionState::Closed {
            warn!(error = %err, "connection lost");
            self.teardown();
        }
        err
    }

    fn teardown(&mut self) {
        self.state = ConnectionState::Closed;
        if let Err(err) = self.reader.get_mut().shutdown() {
            debug!(error = %err, "transport shutdown failed");
        }
        self.channels.clear();
        self.collector = None;
        self.deliveries.clear();
    }

    /// Write frames in one transport write.
    pub(crate) fn send_frames(&mut self, frames: &[Frame]) -> Result<()> {
        let config = self.reader.config().clone();
        match FrameWriter::with_config(self.reader.get_mut(), config).write_frames(frames) {
            Ok(()) => {
                self.liveness.record_send();
                Ok(())
            }
            Err(err) => Err(self.fail(ClientError::from_encode(err))),
        }
    }

    pub(crate) fn send_method(&mut self, channel: u16, method: Method) -> Result<()> {
        self.send_frames(&[Frame::method(channel, method)])
    }

    /// Send a heartbeat frame on channel 0.
    pub fn heartbeat(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.send_frames(&[Frame::heartbeat()])
    }

    /// Send `method` on `channel` and wait for its reply.
    ///
    /// Returns `None` for methods that expect no reply (asynchronous ones or
    /// `no_wait` requests).
    pub(crate) fn call(&mut self, channel: u16, method: Method) -> Result<Option<Reply>> {
        self.ensure_open()?;
        let expects = method.expected_replies();
        let slot = self.channels.usable(channel)?;
        if expects.is_empty() {
            return self.send_method(channel, method).map(|()| None);
        }
        if slot.pending.is_some() {
            return Err(ClientError::channel(
                channel,
                "a synchronous call is already pending",
            ));
        }
        slot.pending = Some(PendingCall::new(expects));

        trace!(channel, method = method.name(), "synchronous call");
        if let Err(err) = self.send_method(channel, method) {
            if let Some(slot) = self.channels.get_mut(channel) {
                slot.pending = None;
            }
            return Err(err);
        }
        self.await_reply(channel).map(Some)
    }

    /// Like [`call`](Self::call) for requests whose reply is a plain method.
    pub(crate) fn rpc(&mut self, channel: u16, method: Method) -> Result<Option<Method>> {
        match self.call(channel, method)? {
            None => Ok(None),
            Some(Reply::Method(method)) => Ok(Some(method)),
            Some(Reply::Content(content)) => Err(self.fail(ClientError::UnexpectedFrame {
                channel,
                found: content.method.name(),
            })),
        }
    }

    fn await_reply(&mut self, channel: u16) -> Result<Reply> {
        let timeout = self.rpc_timeout;
        self.pump(Wait::within(timeout), |conn| {
            conn.channels
                .get(channel)
                .is_none_or(ChannelSlot::call_settled)
        })?;

        let slot = self
            .channels
            .get_mut(channel)
            .ok_or(ClientError::NotConnected)?;
        if slot.state == ChannelState::Closed {
            return Err(slot.unusable_error(channel));
        }
        if let Some(reply) = slot.take_reply() {
            return Ok(reply);
        }

        slot.abandon_call();
        let timeout = timeout.unwrap_or_default();
        warn!(channel, ?timeout, "synchronous call timed out, channel may be out of sync");
        Err(ClientError::Timeout(timeout))
    }

    /// Read and dispatch frames until `done` holds or `wait` runs out.
    ///
    /// Returns whether `done` was satisfied. Every frame is routed to its
    /// own channel, whatever the caller is waiting for.
    pub(crate) fn pump<F>(&mut self, wait: Wait, mut done: F) -> Result<bool>
    where
        F: FnMut(&Self) -> bool,
    {
        loop {
            if done(self) {
                return Ok(true);
            }
            let frame = match self.next_frame(wait) {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(false),
                Err(err) => return Err(self.fail(err)),
            };
            if let Err(err) = self.dispatch(frame) {
                return Err(self.fail(err));
            }
        }
    }

    fn next_frame(&mut self, wait: Wait) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = self
                .reader
                .buffered_frame()
                .map_err(ClientError::from_frame)?
            {
                self.liveness.record_recv();
                return Ok(Some(frame));
            }

            let now = Instant::now();
            if self.liveness.is_dead(now) {
                return Err(ClientError::MissedHeartbeat(
                    self.liveness.grace().unwrap_or_default(),
                ));
            }

            let limit = match wait {
                Wait::BufferedOnly => return Ok(None),
                Wait::Forever => None,
                Wait::Until(deadline) if now >= deadline => return Ok(None),
                Wait::Until(deadline) => Some(deadline - now),
            };

            if self.liveness.send_due(now) {
                trace!("sending heartbeat");
                self.send_frames(&[Frame::heartbeat()])?;
            }

            let until = |deadline: Option<Instant>| deadline.map(|d| d.saturating_duration_since(now));
            let timeout = [
                limit,
                until(self.liveness.recv_deadline()),
                until(self.liveness.send_deadline()),
            ]
            .into_iter()
            .flatten()
            .min()
            .map(|t| t.max(MIN_READ_TIMEOUT));
            self.reader.get_ref().set_read_timeout(timeout)?;

            match self.reader.read_frame() {
                Ok(frame) => {
                    self.liveness.record_recv();
                    return Ok(Some(frame));
                }
                Err(FrameError::Io(err))
                    if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(err) => return Err(ClientError::from_frame(err)),
            }
        }
    }

    fn dispatch(&mut self, frame: Frame) -> Result<()> {
        if let Some(collector) = self.collector.as_mut() {
            if let Some(content) = collector.push(frame).map_err(ClientError::from_frame)? {
                self.collector = None;
                self.dispatch_content(content)?;
            }
            return Ok(());
        }

        let channel = frame.channel;
        let kind = frame.kind();
        match frame.payload {
            FramePayload::Heartbeat => {
                trace!("heartbeat received");
                Ok(())
            }
            FramePayload::Method(method) if channel == 0 => self.dispatch_connection(method),
            FramePayload::Method(method) if self.state == ConnectionState::Closing => {
                trace!(channel, method = method.name(), "discarding frame while closing");
                Ok(())
            }
            FramePayload::Method(method) => self.dispatch_channel(channel, method),
            FramePayload::Header(_) | FramePayload::Body(_) => {
                let closing = self.state == ConnectionState::Closing
                    || self.channel_state(channel) == ChannelState::Closing;
                if closing {
                    trace!(channel, kind, "discarding content frame while closing");
                    Ok(())
                } else {
                    Err(ClientError::UnexpectedFrame {
                        channel,
                        found: kind,
                    })
                }
            }
        }
    }

    fn dispatch_connection(&mut self, method: Method) -> Result<()> {
        match method {
            Method::ConnectionClose {
                reply_code,
                reply_text,
                class_id,
                method_id,
            } => {
                if let Err(err) = self.send_method(0, Method::ConnectionCloseOk) {
                    debug!(error = %err, "failed to acknowledge connection.close");
                }
                if self.state == ConnectionState::Closing {
                    self.state = ConnectionState::Closed;
                    return Ok(());
                }
                warn!(reply_code, %reply_text, class_id, method_id, "broker closed connection");
                let reason = CloseReason {
                    reply_code,
                    reply_text,
                    class_id,
                    method_id,
                };
                let err = reason.connection_error();
                self.close_reason = Some(reason);
                Err(err)
            }
            Method::ConnectionCloseOk if self.state == ConnectionState::Closing => {
                self.state = ConnectionState::Closed;
                Ok(())
            }
            Method::ConnectionBlocked { reason } => {
                warn!(%reason, "connection blocked by broker");
                self.blocked = Some(reason);
                Ok(())
            }
            Method::ConnectionUnblocked => {
                info!("connection unblocked");
                self.blocked = None;
                Ok(())
            }
            other if self.state == ConnectionState::Closing => {
                trace!(method = other.name(), "discarding frame while closing");
                Ok(())
            }
            other => Err(ClientError::UnexpectedFrame {
                channel: 0,
                found: other.name(),
            }),
        }
    }

    fn dispatch_channel(&mut self, channel: u16, method: Method) -> Result<()> {
        let Some(slot) = self.channels.get_mut(channel) else {
            return Err(ClientError::UnexpectedFrame {
                channel,
                found: method.name(),
            });
        };

        match slot.state {
            ChannelState::Closed => {
                return Err(ClientError::UnexpectedFrame {
                    channel,
                    found: method.name(),
                })
            }
            ChannelState::Closing => {
                match method {
                    Method::ChannelCloseOk => {
                        slot.mark_closed(None);
                        debug!(channel, "channel closed");
                    }
                    Method::ChannelClose { .. } => {
                        self.send_method(channel, Method::ChannelCloseOk)?;
                    }
                    other => {
                        trace!(channel, method = other.name(), "discarding frame on closing channel");
                    }
                }
                return Ok(());
            }
            ChannelState::Opening | ChannelState::Open => {}
        }

        match method {
            Method::ChannelClose {
                reply_code,
                reply_text,
                class_id,
                method_id,
            } => {
                warn!(channel, reply_code, %reply_text, class_id, method_id, "broker closed channel");
                slot.mark_closed(Some(CloseReason {
                    reply_code,
                    reply_text,
                    class_id,
                    method_id,
                }));
                self.send_method(channel, Method::ChannelCloseOk)
            }
            Method::ChannelFlow { active } => {
                info!(channel, active, "channel flow changed by broker");
                slot.flow_active = active;
                self.send_method(channel, Method::ChannelFlowOk { active })
            }
            Method::BasicCancel {
                consumer_tag,
                no_wait,
            } => {
                warn!(channel, %consumer_tag, "consumer cancelled by broker");
                slot.consumers.remove(&consumer_tag);
                if no_wait {
                    Ok(())
                } else {
                    self.send_method(channel, Method::BasicCancelOk { consumer_tag })
                }
            }
            Method::BasicAck {
                delivery_tag,
                multiple,
            } => {
                match slot.confirms.as_mut() {
                    Some(tracker) => tracker.ack(delivery_tag, multiple),
                    None => warn!(channel, delivery_tag, "basic.ack without confirm mode"),
                }
                Ok(())
            }
            Method::BasicNack {
                delivery_tag,
                multiple,
                ..
            } => {
                match slot.confirms.as_mut() {
                    Some(tracker) => tracker.nack(delivery_tag, multiple),
                    None => warn!(channel, delivery_tag, "basic.nack without confirm mode"),
                }
                Ok(())
            }
            Method::BasicPublish { .. } => Err(ClientError::UnexpectedFrame {
                channel,
                found: method.name(),
            }),
            method if method.carries_content() => {
                self.collector = Some(ContentCollector::new(channel, method));
                Ok(())
            }
            other => {
                let id = other.id();
                if !slot.offer_reply(id, Reply::Method(other)) {
                    warn!(channel, method = %id, "dropping unexpected method");
                }
                Ok(())
            }
        }
    }

    fn dispatch_content(&mut self, content: Content) -> Result<()> {
        let channel = content.channel;
        let Some(slot) = self.channels.get_mut(channel) else {
            return Ok(());
        };

        match content.method.id() {
            MethodId::BASIC_GET_OK => {
                if !slot.offer_reply(MethodId::BASIC_GET_OK, Reply::Content(content)) {
                    warn!(channel, "dropping unexpected basic.get-ok");
                }
            }
            MethodId::BASIC_RETURN => {
                let message = Message::try_from(content)?;
                debug!(
                    channel,
                    routing_key = %message.routing_key,
                    source = ?message.source,
                    "message returned by broker"
                );
                slot.returned.push_back(message);
            }
            _ if slot.state == ChannelState::Open => {
                self.deliveries.push_back(Message::try_from(content)?);
            }
            _ => trace!(channel, "dropping delivery for channel that is not open"),
        }
        Ok(())
    }
}

impl<T: Transport> Drop for Connection<T> {
    fn drop(&mut self) {
        if self.state == ConnectionState::Open {
            if let Err(err) = self.disconnect() {
                debug!(error = %err, "disconnect on drop failed");
            }
        } else if self.state != ConnectionState::Closed {
            self.teardown();
        }
    }
}

impl<T: Transport> std::fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("transport", &self.reader.get_ref().transport_name())
            .field("state", &self.state)
            .field("tuning", &self.tuning)
            .field("open_channels", &self.channels.open_ids().collect::<Vec<_>>())
            .field("pending_deliveries", &self.deliveries.len())
            .finish()
    }
}
