//! Tracks the offset between local wall-clock time and Steam's server time,
//! since Steam's TOTP variant is checked against the server's clock, not the
//! device's.
//!
//! Per-instance cooldown state (a field, not a process-wide static): each
//! `TimeSync` owns its own cooldown so independent enrollments, and tests,
//! don't share failure state.

use crate::clock::Clock;
use crate::config;
use crate::error::Error;
use crate::steamapi;
use crate::transport::{CookieJar, HttpTransport};

#[derive(Debug)]
pub struct TimeSync {
    diff_ms: i64,
    cooldown_until_ms: Option<i64>,
}

impl TimeSync {
    pub fn new() -> Self {
        Self {
            diff_ms: 0,
            cooldown_until_ms: None,
        }
    }

    /// The current estimate of Steam's server time, in milliseconds.
    pub fn server_time_ms(&self, clock: &dyn Clock) -> i64 {
        clock.now_ms() + self.diff_ms
    }

    pub fn diff_ms(&self) -> i64 {
        self.diff_ms
    }

    /// Authoritatively sets the drift from a fresh `QueryTime` response.
    pub(crate) fn set_diff_ms(&mut self, diff_ms: i64) {
        self.diff_ms = diff_ms;
        self.cooldown_until_ms = None;
    }

    /// Nudges the drift estimate by `delta_ms` without touching the cooldown,
    /// used by the finalize retry loop to walk the clock forward/back a fixed
    /// step per attempt.
    pub(crate) fn nudge(&mut self, delta_ms: i64) {
        self.diff_ms += delta_ms;
    }

    /// Forces a time sync against Steam, subject to the 5-minute cooldown
    /// armed by a previous failure. Never returns an error: a failed sync
    /// resets the drift to zero and arms the cooldown instead of propagating.
    pub fn sync(&mut self, transport: &dyn HttpTransport, clock: &dyn Clock) {
        let now = clock.now_ms();
        if let Some(until) = self.cooldown_until_ms {
            if now < until {
                log::trace!("time sync on cooldown for another {}ms", until - now);
                return;
            }
        }

        let cookies = CookieJar::new();
        match steamapi::query_time(transport, &cookies) {
            Ok(server_time_secs) => {
                self.set_diff_ms(server_time_secs as i64 * 1000 - now);
                log::debug!("synced server time, diff_ms={}", self.diff_ms);
            }
            Err(err) => {
                self.diff_ms = 0;
                self.cooldown_until_ms = Some(now + config::SYNC_COOLDOWN_MS);
                log::warn!("time sync failed, entering cooldown: {err}");
            }
        }
    }
}

impl Default for TimeSync {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Method;
    use std::cell::RefCell;
    use std::sync::atomic::{AtomicI64, Ordering};

    struct FixedClock(AtomicI64);
    impl Clock for FixedClock {
        fn now_ms(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[derive(Debug)]
    struct FailingTransport {
        calls: RefCell<u32>,
    }

    impl HttpTransport for FailingTransport {
        fn request(
            &self,
            _method: Method,
            _url: &str,
            _form: &[(&str, &str)],
            _cookies: &CookieJar,
        ) -> Result<String, Error> {
            *self.calls.borrow_mut() += 1;
            Err(Error::invalid_response("simulated network failure"))
        }
    }

    #[test]
    fn two_syncs_after_a_failure_only_hit_the_network_once() {
        let transport = FailingTransport { calls: RefCell::new(0) };
        let clock = FixedClock(AtomicI64::new(1_700_000_000_000));
        let mut sync = TimeSync::new();

        sync.sync(&transport, &clock);
        sync.sync(&transport, &clock);

        assert_eq!(*transport.calls.borrow(), 1);
        assert_eq!(sync.diff_ms(), 0);
    }

    #[test]
    fn cooldown_expires_after_five_minutes() {
        let transport = FailingTransport { calls: RefCell::new(0) };
        let clock = FixedClock(AtomicI64::new(1_700_000_000_000));
        let mut sync = TimeSync::new();

        sync.sync(&transport, &clock);
        clock.0.fetch_add(config::SYNC_COOLDOWN_MS + 1, Ordering::SeqCst);
        sync.sync(&transport, &clock);

        assert_eq!(*transport.calls.borrow(), 2);
    }
}
