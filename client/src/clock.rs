//! Offset between the local wall clock and the round server's clock.

use chrono::Utc;
use tracing::debug;

/// Local wall-clock time in milliseconds since the Unix epoch
pub fn local_now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Single-sample clock offset.
///
/// The offset is taken once per `round_start` and never resampled; there is
/// no drift or latency correction. Without a sample the offset is zero and
/// server time equals local time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClockSync {
    offset_ms: i64,
}

impl ClockSync {
    pub fn from_offset(offset_ms: i64) -> Self {
        Self { offset_ms }
    }

    pub fn calibrate(&mut self, server_time_ms: i64, local_now_ms: i64) {
        self.offset_ms = server_time_ms - local_now_ms;
        debug!("Clock offset to server: {}ms", self.offset_ms);
    }

    pub fn offset_ms(&self) -> i64 {
        self.offset_ms
    }

    pub fn server_time_at(&self, local_ms: i64) -> i64 {
        local_ms + self.offset_ms
    }
}
