//! Heartbeat bookkeeping.
//!
//! Nothing runs in the background: the connection records traffic as it
//! reads and writes, and checks the inbound deadline before each read.

use std::time::{Duration, Instant};

/// Inbound silence allowed, in heartbeat intervals, before the peer is dead.
pub const MISSED_INTERVALS: u32 = 2;

#[derive(Debug, Clone)]
pub struct Liveness {
    interval: Option<Duration>,
    last_recv: Instant,
    last_send: Instant,
}

impl Liveness {
    /// Monitor for a negotiated heartbeat in seconds; 0 disables it.
    pub fn new(heartbeat_secs: u16) -> Self {
        let now = Instant::now();
        Self {
            interval: (heartbeat_secs > 0)
                .then(|| Duration::from_secs(u64::from(heartbeat_secs))),
            last_recv: now,
            last_send: now,
        }
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Any inbound frame counts, not only heartbeats.
    pub fn record_recv(&mut self) {
        self.last_recv = Instant::now();
    }

    pub fn record_send(&mut self) {
        self.last_send = Instant::now();
    }

    /// Silence allowed before the peer is presumed dead.
    pub fn grace(&self) -> Option<Duration> {
        self.interval.map(|i| i * MISSED_INTERVALS)
    }

    /// Instant by which something must arrive.
    pub fn recv_deadline(&self) -> Option<Instant> {
        self.grace().map(|g| self.last_recv + g)
    }

    pub fn is_dead(&self, now: Instant) -> bool {
        self.recv_deadline().is_some_and(|deadline| now >= deadline)
    }

    /// Instant by which the client should send something.
    pub fn send_deadline(&self) -> Option<Instant> {
        self.interval.map(|i| self.last_send + i)
    }

    /// True once a full interval has passed since anything was sent.
    pub fn send_due(&self, now: Instant) -> bool {
        self.send_deadline().is_some_and(|deadline| now >= deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_never_expires() {
        let live = Liveness::new(0);
        let later = Instant::now() + Duration::from_secs(3600);
        assert_eq!(live.interval(), None);
        assert_eq!(live.recv_deadline(), None);
        assert!(!live.is_dead(later));
        assert!(!live.send_due(later));
    }

    #[test]
    fn dead_after_two_intervals() {
        let live = Liveness::new(1);
        let now = Instant::now();
        assert!(!live.is_dead(now));
        assert!(!live.is_dead(now + Duration::from_millis(1500)));
        assert!(live.is_dead(now + Duration::from_millis(2100)));
        assert_eq!(live.grace(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn traffic_resets_deadlines() {
        let mut live = Liveness::new(1);
        let before = live.recv_deadline().unwrap();
        std::thread::sleep(Duration::from_millis(5));
        live.record_recv();
        assert!(live.recv_deadline().unwrap() > before);

        let now = Instant::now();
        assert!(live.send_due(now + Duration::from_millis(1100)));
        live.record_send();
        assert!(!live.send_due(Instant::now()));
    }
}
