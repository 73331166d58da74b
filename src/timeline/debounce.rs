/// Scroll debouncing
///
/// Scroll notifications arrive at whatever rate the view layer produces them.
/// The debouncer turns a burst of them into a single "settled" signal once
/// nothing has arrived for the quiet period. Time is passed in by the caller
/// so the UI tick drives it.
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Debouncer {
    quiet: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            deadline: None,
        }
    }

    /// Record a trigger; pushes the deadline out by the quiet period
    pub fn poke(&mut self, now: Instant) {
        self.deadline = Some(now + self.quiet);
    }

    /// True exactly once per burst, on the first poll at or after the deadline
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_once_after_quiet_period() {
        let start = Instant::now();
        let mut debounce = Debouncer::new(Duration::from_millis(150));

        debounce.poke(start);
        assert!(!debounce.poll(start + Duration::from_millis(100)));
        assert!(debounce.poll(start + Duration::from_millis(150)));
        assert!(!debounce.poll(start + Duration::from_millis(400)));
        assert!(!debounce.is_armed());
    }

    #[test]
    fn test_burst_extends_deadline() {
        let start = Instant::now();
        let mut debounce = Debouncer::new(Duration::from_millis(150));

        for step in 0..10 {
            debounce.poke(start + Duration::from_millis(step * 50));
        }
        // last poke at 450ms
        assert!(!debounce.poll(start + Duration::from_millis(500)));
        assert!(debounce.poll(start + Duration::from_millis(600)));
    }
}
