use std::time::{SystemTime, UNIX_EPOCH};

/// A source of wall-clock time, injected so the time synchronizer and the
/// enrollment driver's finalize loop can be driven deterministically in
/// tests instead of reading `SystemTime::now()` directly.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// The production clock, backed by the OS wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before the Unix epoch")
            .as_millis() as i64
    }
}
