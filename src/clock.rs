//! Monotonic nanosecond clock, written atomically and read lock-free.
//!
//! A wall-clock-derived counter is adequate here: the guarantee the
//! transaction guard needs is "later calls observe a larger number than
//! earlier ones on this process", not calendar accuracy, and `Instant`
//! can't be serialized into the `i64` the atomics already store.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static LAST: AtomicI64 = AtomicI64::new(0);

/// The current time in nanoseconds since `UNIX_EPOCH`, guaranteed
/// non-decreasing across calls from this process even if the system clock
/// itself ever steps backward.
pub fn now_ns() -> i64 {
    let wall = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0);
    LAST.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |last| {
        Some(wall.max(last + 1))
    })
    .unwrap_or(wall)
}
