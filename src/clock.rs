//! Time sources for the control loop
//!
//! The limiter works on a monotonic millisecond counter (like an uptime
//! counter) and only needs wall-clock time to schedule the daily inverter
//! restart. Wall-clock time is optional: until it is known to be valid the
//! clock reports `None` and the restart schedule is retried later.

use chrono::{Datelike, NaiveDateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Source of monotonic and local time
pub trait Clock: Send + Sync {
    /// Milliseconds since an arbitrary fixed origin, never decreasing
    fn millis(&self) -> u64;

    /// Local wall-clock time, `None` while it is not synchronized
    fn local_time(&self) -> Option<NaiveDateTime>;
}

/// Process clock backed by `Instant` and the system time
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self {
            origin: Instant::now(),
            tz,
        }
    }
}

impl Clock for SystemClock {
    fn millis(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn local_time(&self) -> Option<NaiveDateTime> {
        let now = Utc::now().with_timezone(&self.tz);
        // A board without RTC boots in 1970 until NTP catches up
        if now.year() < 2020 {
            return None;
        }
        Some(now.naive_local())
    }
}

#[derive(Debug, Default)]
struct ManualState {
    millis: u64,
    local: Option<(NaiveDateTime, u64)>,
}

/// Settable clock shared between a test (or simulator) and the limiter
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        let clock = Self::default();
        clock.set_millis(start_millis);
        clock
    }

    pub fn set_millis(&self, millis: u64) {
        if let Ok(mut state) = self.state.lock() {
            state.millis = millis;
        }
    }

    pub fn advance(&self, delta_ms: u64) {
        if let Ok(mut state) = self.state.lock() {
            state.millis = state.millis.saturating_add(delta_ms);
        }
    }

    /// Synchronize wall-clock time; it advances together with `millis` afterwards
    pub fn set_local_time(&self, local: NaiveDateTime) {
        if let Ok(mut state) = self.state.lock() {
            let anchor = state.millis;
            state.local = Some((local, anchor));
        }
    }

    pub fn clear_local_time(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.local = None;
        }
    }
}

impl Clock for ManualClock {
    fn millis(&self) -> u64 {
        self.state.lock().map(|s| s.millis).unwrap_or_default()
    }

    fn local_time(&self) -> Option<NaiveDateTime> {
        let state = self.state.lock().ok()?;
        let (base, anchor) = state.local?;
        let elapsed = i64::try_from(state.millis.saturating_sub(anchor)).ok()?;
        base.checked_add_signed(TimeDelta::milliseconds(elapsed))
    }
}
