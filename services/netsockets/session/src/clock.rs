//! Monotonic local clock.
//!
//! Timestamps are microseconds since the first call in this process. They
//! only compare meaningfully with other timestamps from the same process.

use once_cell::sync::Lazy;
use std::time::Instant;

static START: Lazy<Instant> = Lazy::new(Instant::now);

/// Current local time in microseconds
pub fn local_timestamp() -> i64 {
    START.elapsed().as_micros() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_monotonic() {
        let a = local_timestamp();
        std::thread::sleep(Duration::from_millis(2));
        let b = local_timestamp();
        assert!(b > a);
        assert!(b - a >= 2_000);
    }
}
