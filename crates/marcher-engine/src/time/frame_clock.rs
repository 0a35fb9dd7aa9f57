use std::time::{Duration, Instant};

/// Timing of one display iteration.
#[derive(Debug, Copy, Clone)]
pub struct FrameTime {
    /// Seconds since the previous tick, clamped.
    pub dt: f32,
    pub now: Instant,
    pub frame_index: u64,
}

/// Produces a clamped delta time once per `Display::update`.
///
/// The camera integrates velocity over `dt`, so a debugger pause or a
/// minimised window must not turn into one huge step.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Instant,
    frame_index: u64,
    dt_min: Duration,
    dt_max: Duration,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::with_clamps(Duration::from_micros(100), Duration::from_millis(250))
    }

    pub fn with_clamps(dt_min: Duration, dt_max: Duration) -> Self {
        debug_assert!(dt_min <= dt_max);
        Self {
            last: Instant::now(),
            frame_index: 0,
            dt_min,
            dt_max,
        }
    }

    /// Restarts timing from now, e.g. after the window was restored.
    pub fn reset(&mut self) {
        self.last = Instant::now();
    }

    pub fn tick(&mut self) -> FrameTime {
        self.tick_at(Instant::now())
    }

    /// Advances the clock to `now`.
    pub fn tick_at(&mut self, now: Instant) -> FrameTime {
        let dt = now
            .saturating_duration_since(self.last)
            .clamp(self.dt_min, self.dt_max);
        self.last = now;

        let time = FrameTime {
            dt: dt.as_secs_f32(),
            now,
            frame_index: self.frame_index,
        };
        self.frame_index = self.frame_index.wrapping_add(1);
        time
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_stalls_are_clamped() {
        let mut clock = FrameClock::new();
        let start = Instant::now();
        clock.tick_at(start);

        let time = clock.tick_at(start + Duration::from_secs(5));
        assert!((time.dt - 0.25).abs() < 1e-6);
        assert_eq!(time.frame_index, 1);
    }

    #[test]
    fn tiny_steps_are_raised_to_the_minimum() {
        let mut clock = FrameClock::with_clamps(Duration::from_millis(1), Duration::from_secs(1));
        let start = Instant::now();
        clock.tick_at(start);

        let time = clock.tick_at(start);
        assert!((time.dt - 0.001).abs() < 1e-6);
    }
}
