//! Windowed frame rate counter

use std::time::Duration;
use tokio::time::Instant;

/// Counts successful ticks and reports a rate once per window
#[derive(Debug, Clone)]
pub struct FpsCounter {
    window: Duration,
    frames: u32,
    window_start: Instant,
}

impl FpsCounter {
    pub fn new(window: Duration, now: Instant) -> Self {
        Self {
            window,
            frames: 0,
            window_start: now,
        }
    }

    /// Count one frame. Returns the new rate when the window has elapsed.
    pub fn record(&mut self, now: Instant) -> Option<u32> {
        self.frames += 1;

        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.window {
            return None;
        }

        let elapsed_ms = elapsed.as_millis().max(1) as f64;
        let fps = (f64::from(self.frames) * 1000.0 / elapsed_ms).round() as u32;
        self.frames = 0;
        self.window_start = now;
        Some(fps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thirty_ticks_per_second() {
        let start = Instant::now();
        let mut counter = FpsCounter::new(Duration::from_millis(1000), start);

        let mut reported = None;
        for i in 1..=30u64 {
            // Last tick lands exactly on the window boundary
            let now = start + Duration::from_millis(i * 1000 / 30);
            reported = counter.record(now);
            if i < 30 {
                assert_eq!(reported, None);
            }
        }
        assert_eq!(reported, Some(30));
    }

    #[test]
    fn test_window_resets() {
        let start = Instant::now();
        let mut counter = FpsCounter::new(Duration::from_millis(1000), start);

        assert_eq!(counter.record(start + Duration::from_millis(1000)), Some(1));
        assert_eq!(counter.record(start + Duration::from_millis(1500)), None);
        assert_eq!(counter.record(start + Duration::from_millis(2000)), Some(2));
    }

    #[test]
    fn test_rounding() {
        let start = Instant::now();
        let mut counter = FpsCounter::new(Duration::from_millis(1000), start);

        for _ in 0..59 {
            counter.record(start + Duration::from_millis(500));
        }
        // 60 frames over 1010 ms
        assert_eq!(counter.record(start + Duration::from_millis(1010)), Some(59));
    }
}
