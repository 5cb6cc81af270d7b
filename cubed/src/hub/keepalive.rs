//! Ping/pong keep-alive bookkeeping for a single channel

use std::time::Duration;

use tokio::time::Instant;

/// What a channel should do when its keep-alive deadline passes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveAction {
    /// Send a ping and start waiting for the pong
    SendPing,
    /// Pong did not arrive in time; close the channel
    Expired,
    /// Deadline moved; nothing to do yet
    Wait,
}

/// Tracks when to ping and how long to wait for the answer
#[derive(Debug, Clone)]
pub struct KeepAlive {
    interval: Duration,
    timeout: Duration,
    next_ping: Instant,
    awaiting_since: Option<Instant>,
}

impl KeepAlive {
    pub fn new(interval: Duration, timeout: Duration, now: Instant) -> Self {
        Self {
            interval,
            timeout,
            next_ping: now + interval,
            awaiting_since: None,
        }
    }

    /// Next instant at which `on_deadline` should be called
    pub fn deadline(&self) -> Instant {
        match self.awaiting_since {
            Some(sent) => sent + self.timeout,
            None => self.next_ping,
        }
    }

    pub fn on_deadline(&mut self, now: Instant) -> KeepAliveAction {
        match self.awaiting_since {
            Some(sent) if now >= sent + self.timeout => KeepAliveAction::Expired,
            Some(_) => KeepAliveAction::Wait,
            None if now >= self.next_ping => {
                self.awaiting_since = Some(now);
                self.next_ping = now + self.interval;
                KeepAliveAction::SendPing
            }
            None => KeepAliveAction::Wait,
        }
    }

    pub fn on_pong(&mut self) {
        self.awaiting_since = None;
    }

    pub fn is_awaiting_pong(&self) -> bool {
        self.awaiting_since.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(30);
    const TIMEOUT: Duration = Duration::from_secs(10);

    #[test]
    fn test_ping_then_pong_resets() {
        let start = Instant::now();
        let mut keepalive = KeepAlive::new(INTERVAL, TIMEOUT, start);
        assert_eq!(keepalive.deadline(), start + INTERVAL);
        assert_eq!(keepalive.on_deadline(start + Duration::from_secs(1)), KeepAliveAction::Wait);

        let ping_at = start + INTERVAL;
        assert_eq!(keepalive.on_deadline(ping_at), KeepAliveAction::SendPing);
        assert!(keepalive.is_awaiting_pong());
        assert_eq!(keepalive.deadline(), ping_at + TIMEOUT);

        keepalive.on_pong();
        assert!(!keepalive.is_awaiting_pong());
        assert_eq!(keepalive.deadline(), ping_at + INTERVAL);
    }

    #[test]
    fn test_missing_pong_expires() {
        let start = Instant::now();
        let mut keepalive = KeepAlive::new(INTERVAL, TIMEOUT, start);
        let ping_at = start + INTERVAL;
        assert_eq!(keepalive.on_deadline(ping_at), KeepAliveAction::SendPing);
        assert_eq!(
            keepalive.on_deadline(ping_at + Duration::from_secs(5)),
            KeepAliveAction::Wait
        );
        assert_eq!(keepalive.on_deadline(ping_at + TIMEOUT), KeepAliveAction::Expired);
    }
}
