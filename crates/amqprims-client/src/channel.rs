//! Per-channel state owned by the connection.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use amqprims_frame::{Content, Method, MethodId};

use crate::error::ClientError;
use crate::message::Message;

/// Lifecycle of a channel as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Closed,
    /// channel.open sent, waiting for open-ok.
    Opening,
    Open,
    /// channel.close sent, waiting for close-ok. Other frames are discarded.
    Closing,
}

/// The broker's reason for closing a channel or connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub reply_code: u16,
    pub reply_text: String,
    pub class_id: u16,
    pub method_id: u16,
}

impl CloseReason {
    pub(crate) fn channel_error(&self, channel: u16) -> ClientError {
        ClientError::ChannelClosed {
            channel,
            reply_code: self.reply_code,
            reply_text: self.reply_text.clone(),
            class_id: self.class_id,
            method_id: self.method_id,
        }
    }

    pub(crate) fn connection_error(&self) -> ClientError {
        ClientError::ConnectionClosed {
            reply_code: self.reply_code,
            reply_text: self.reply_text.clone(),
            class_id: self.class_id,
            method_id: self.method_id,
        }
    }
}

/// A synchronous reply: a plain method, or get-ok with its content.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Reply {
    Method(Method),
    Content(Content),
}

/// The one synchronous request a channel may have outstanding.
#[derive(Debug)]
pub(crate) struct PendingCall {
    expects: &'static [MethodId],
    reply: Option<Reply>,
}

impl PendingCall {
    pub(crate) fn new(expects: &'static [MethodId]) -> Self {
        Self {
            expects,
            reply: None,
        }
    }

    pub(crate) fn accepts(&self, id: MethodId) -> bool {
        self.reply.is_none() && self.expects.contains(&id)
    }
}

/// A consumer started with basic.consume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerRegistration {
    pub channel: u16,
    pub queue: String,
    pub consumer_tag: String,
    pub no_ack: bool,
}

/// Publisher-confirm bookkeeping for one channel.
///
/// Sequence numbers start at 1 after confirm.select and count every
/// publish on the channel.
#[derive(Debug, Clone)]
pub struct ConfirmTracker {
    next_seq: u64,
    unconfirmed: BTreeSet<u64>,
    nacked: bool,
}

impl Default for ConfirmTracker {
    fn default() -> Self {
        Self {
            next_seq: 1,
            unconfirmed: BTreeSet::new(),
            nacked: false,
        }
    }
}

impl ConfirmTracker {
    /// Record a publish and return its sequence number.
    pub fn published(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.unconfirmed.insert(seq);
        seq
    }

    pub fn ack(&mut self, tag: u64, multiple: bool) {
        self.settle(tag, multiple);
    }

    pub fn nack(&mut self, tag: u64, multiple: bool) {
        self.nacked = true;
        self.settle(tag, multiple);
    }

    fn settle(&mut self, tag: u64, multiple: bool) {
        if multiple {
            self.unconfirmed = self.unconfirmed.split_off(&tag.saturating_add(1));
        } else {
            self.unconfirmed.remove(&tag);
        }
    }

    pub fn unconfirmed(&self) -> usize {
        self.unconfirmed.len()
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// True if every publish since the last call was acked; resets the flag.
    pub fn take_all_acked(&mut self) -> bool {
        !std::mem::take(&mut self.nacked)
    }
}

#[derive(Debug)]
pub(crate) struct ChannelSlot {
    pub(crate) state: ChannelState,
    pub(crate) pending: Option<PendingCall>,
    /// Replies still owed to calls that timed out, oldest first. Each
    /// matching reply settles one entry and is dropped.
    pub(crate) stale: VecDeque<&'static [MethodId]>,
    pub(crate) consumers: BTreeMap<String, ConsumerRegistration>,
    pub(crate) returned: VecDeque<Message>,
    pub(crate) close_reason: Option<CloseReason>,
    pub(crate) flow_active: bool,
    pub(crate) transactional: bool,
    pub(crate) confirms: Option<ConfirmTracker>,
}

impl ChannelSlot {
    fn new(state: ChannelState) -> Self {
        Self {
            state,
            pending: None,
            stale: VecDeque::new(),
            consumers: BTreeMap::new(),
            returned: VecDeque::new(),
            close_reason: None,
            flow_active: true,
            transactional: false,
            confirms: None,
        }
    }

    pub(crate) fn is_usable(&self) -> bool {
        matches!(self.state, ChannelState::Opening | ChannelState::Open)
    }

    /// Record a reply for the pending call, or drop a late one.
    ///
    /// Returns false if nobody was waiting for `reply`.
    pub(crate) fn offer_reply(&mut self, id: MethodId, reply: Reply) -> bool {
        if let Some(pos) = self.stale.iter().position(|expects| expects.contains(&id)) {
            self.stale.remove(pos);
            return false;
        }
        match &mut self.pending {
            Some(call) if call.accepts(id) => {
                call.reply = Some(reply);
                true
            }
            _ => false,
        }
    }

    /// True once the pending call has a reply or can no longer get one.
    pub(crate) fn call_settled(&self) -> bool {
        self.state == ChannelState::Closed
            || self.pending.as_ref().is_none_or(|call| call.reply.is_some())
    }

    pub(crate) fn take_reply(&mut self) -> Option<Reply> {
        if self.pending.as_ref().is_some_and(|call| call.reply.is_some()) {
            self.pending.take().and_then(|call| call.reply)
        } else {
            None
        }
    }

    /// Give up on the pending call; its reply, if it ever comes, is dropped.
    pub(crate) fn abandon_call(&mut self) {
        if let Some(call) = self.pending.take() {
            self.stale.push_back(call.expects);
        }
    }

    pub(crate) fn is_desynced(&self) -> bool {
        !self.stale.is_empty()
    }

    /// Move to Closed, dropping consumers and any pending call.
    pub(crate) fn mark_closed(&mut self, reason: Option<CloseReason>) {
        self.state = ChannelState::Closed;
        self.pending = None;
        self.stale.clear();
        self.consumers.clear();
        self.confirms = None;
        self.transactional = false;
        self.close_reason = reason;
    }

    /// Error for an operation attempted on this channel when it is not usable.
    pub(crate) fn unusable_error(&self, channel: u16) -> ClientError {
        match (&self.state, &self.close_reason) {
            (ChannelState::Closed, Some(reason)) => reason.channel_error(channel),
            (ChannelState::Closing, _) => ClientError::channel(channel, "channel is closing"),
            _ => ClientError::channel(channel, "channel is not open"),
        }
    }
}

/// All channels of one connection, keyed by id.
///
/// Closed channels keep their slot so a broker close reason can be
/// reported on the next use.
#[derive(Debug, Default)]
pub(crate) struct ChannelTable {
    slots: BTreeMap<u16, ChannelSlot>,
}

impl ChannelTable {
    pub(crate) fn get(&self, channel: u16) -> Option<&ChannelSlot> {
        self.slots.get(&channel)
    }

    pub(crate) fn get_mut(&mut self, channel: u16) -> Option<&mut ChannelSlot> {
        self.slots.get_mut(&channel)
    }

    /// Reset `channel` to Opening, checking the id against `channel_max`.
    pub(crate) fn begin_open(&mut self, channel: u16, channel_max: u16) -> Result<(), ClientError> {
        if channel == 0 {
            return Err(ClientError::channel(
                channel,
                "channel 0 is reserved for the connection",
            ));
        }
        if channel > channel_max {
            return Err(ClientError::channel(
                channel,
                format!("channel id exceeds negotiated channel_max {channel_max}"),
            ));
        }
        match self.slots.get(&channel).map(|slot| slot.state) {
            None | Some(ChannelState::Closed) => {}
            Some(ChannelState::Closing) => {
                return Err(ClientError::channel(
                    channel,
                    "channel is closing, waiting for close-ok",
                ));
            }
            Some(ChannelState::Opening | ChannelState::Open) => {
                return Err(ClientError::channel(channel, "channel is already open"));
            }
        }
        self.slots
            .insert(channel, ChannelSlot::new(ChannelState::Opening));
        Ok(())
    }

    /// The slot for `channel` if it can take a new request.
    pub(crate) fn usable(&mut self, channel: u16) -> Result<&mut ChannelSlot, ClientError> {
        match self.slots.get_mut(&channel) {
            Some(slot) if slot.is_usable() => Ok(slot),
            Some(slot) => Err(slot.unusable_error(channel)),
            None => Err(ClientError::channel(channel, "channel is not open")),
        }
    }

    pub(crate) fn consumers(&self) -> impl Iterator<Item = &ConsumerRegistration> {
        self.slots.values().flat_map(|slot| slot.consumers.values())
    }

    pub(crate) fn open_ids(&self) -> impl Iterator<Item = u16> + '_ {
        self.slots
            .iter()
            .filter(|(_, slot)| slot.is_usable())
            .map(|(id, _)| *id)
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_table(channel: u16) -> ChannelTable {
        let mut table = ChannelTable::default();
        table.begin_open(channel, 10).unwrap();
        table.get_mut(channel).unwrap().state = ChannelState::Open;
        table
    }

    #[test]
    fn channel_ids_are_bounded() {
        let mut table = ChannelTable::default();
        assert!(table.begin_open(0, 10).is_err());
        assert!(table.begin_open(11, 10).is_err());
        table.begin_open(10, 10).unwrap();
        let err = table.begin_open(10, 10).unwrap_err();
        assert!(err.to_string().contains("already open"));
    }

    #[test]
    fn closing_channel_cannot_reopen_yet() {
        let mut table = open_table(1);
        table.get_mut(1).unwrap().state = ChannelState::Closing;
        let err = table.begin_open(1, 10).unwrap_err();
        assert!(err.to_string().contains("closing"), "{err}");

        table.get_mut(1).unwrap().mark_closed(None);
        table.begin_open(1, 10).unwrap();
    }

    #[test]
    fn reopen_after_close() {
        let mut table = open_table(1);
        table.get_mut(1).unwrap().mark_closed(None);
        table.begin_open(1, 10).unwrap();
        assert_eq!(table.get(1).unwrap().state, ChannelState::Opening);
    }

    #[test]
    fn closed_channel_reports_broker_reason() {
        let mut table = open_table(2);
        table.get_mut(2).unwrap().mark_closed(Some(CloseReason {
            reply_code: 404,
            reply_text: "NOT_FOUND - no queue 'q'".into(),
            class_id: 50,
            method_id: 10,
        }));

        let err = table.usable(2).unwrap_err();
        assert_eq!(err.reply_code(), Some(404));
        assert!(matches!(table.usable(3), Err(ClientError::Channel { channel: 3, .. })));
    }

    #[test]
    fn pending_call_takes_matching_reply_once() {
        let mut table = open_table(1);
        let slot = table.get_mut(1).unwrap();
        slot.pending = Some(PendingCall::new(Method::TxSelect.expected_replies()));
        assert!(!slot.call_settled());

        assert!(!slot.offer_reply(MethodId::BASIC_QOS_OK, Reply::Method(Method::BasicQosOk)));
        assert!(slot.offer_reply(MethodId::TX_SELECT_OK, Reply::Method(Method::TxSelectOk)));
        assert!(!slot.offer_reply(MethodId::TX_SELECT_OK, Reply::Method(Method::TxSelectOk)));
        assert!(slot.call_settled());

        assert_eq!(slot.take_reply(), Some(Reply::Method(Method::TxSelectOk)));
        assert!(slot.pending.is_none());
    }

    #[test]
    fn late_reply_after_abandon_is_dropped() {
        let mut table = open_table(1);
        let slot = table.get_mut(1).unwrap();
        slot.pending = Some(PendingCall::new(Method::TxSelect.expected_replies()));
        slot.abandon_call();
        assert!(slot.is_desynced());

        slot.pending = Some(PendingCall::new(Method::TxSelect.expected_replies()));
        assert!(!slot.offer_reply(MethodId::TX_SELECT_OK, Reply::Method(Method::TxSelectOk)));
        assert!(!slot.is_desynced());
        assert!(slot.offer_reply(MethodId::TX_SELECT_OK, Reply::Method(Method::TxSelectOk)));
    }

    #[test]
    fn every_abandoned_call_swallows_its_own_reply() {
        let mut table = open_table(1);
        let slot = table.get_mut(1).unwrap();
        for _ in 0..2 {
            slot.pending = Some(PendingCall::new(Method::TxSelect.expected_replies()));
            slot.abandon_call();
        }
        assert_eq!(slot.stale.len(), 2);

        slot.pending = Some(PendingCall::new(Method::TxSelect.expected_replies()));
        assert!(!slot.offer_reply(MethodId::TX_SELECT_OK, Reply::Method(Method::TxSelectOk)));
        assert!(slot.is_desynced());
        assert!(!slot.offer_reply(MethodId::TX_SELECT_OK, Reply::Method(Method::TxSelectOk)));
        assert!(!slot.is_desynced());
        assert!(slot.offer_reply(MethodId::TX_SELECT_OK, Reply::Method(Method::TxSelectOk)));
    }

    #[test]
    fn confirm_tracker_settles_single_and_multiple() {
        let mut tracker = ConfirmTracker::default();
        for _ in 0..5 {
            tracker.published();
        }
        assert_eq!(tracker.next_seq(), 6);

        tracker.ack(2, false);
        assert_eq!(tracker.unconfirmed(), 4);
        tracker.ack(3, true);
        assert_eq!(tracker.unconfirmed(), 2);
        tracker.nack(5, false);
        tracker.ack(4, false);
        assert_eq!(tracker.unconfirmed(), 0);
        assert!(!tracker.take_all_acked());
        assert!(tracker.take_all_acked());
    }
}
