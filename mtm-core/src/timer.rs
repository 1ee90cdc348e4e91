//! Revert timer
//!
//! Single-shot deadline covering the whole outstanding override set. Arming
//! an already-armed timer restarts the countdown; the deadline fires at most
//! once per arm cycle. The timer only tracks state - the host loop sleeps on
//! the deadline and invokes the engine's batch restore when it is due.

use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct RevertTimer {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl RevertTimer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    /// (Re)start the countdown from the full duration.
    pub fn arm(&mut self) {
        self.deadline = Some(Instant::now() + self.timeout);
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Consume the deadline if it has passed. Returns true at most once per
    /// arm cycle.
    pub fn take_expired(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disarmed() {
        let mut timer = RevertTimer::new(Duration::from_secs(60));
        assert!(!timer.is_armed());
        assert!(!timer.take_expired(Instant::now()));
    }

    #[test]
    fn fires_once_per_arm_cycle() {
        let mut timer = RevertTimer::new(Duration::ZERO);
        timer.arm();
        assert!(timer.is_armed());
        let now = Instant::now();
        assert!(timer.take_expired(now));
        // Consumed - does not fire again without a re-arm
        assert!(!timer.take_expired(now));
        assert!(!timer.is_armed());
    }

    #[test]
    fn rearm_restarts_the_countdown() {
        let mut timer = RevertTimer::new(Duration::from_secs(60));
        timer.arm();
        let first = timer.deadline().unwrap();
        timer.arm();
        let second = timer.deadline().unwrap();
        assert!(second >= first);
        assert!(!timer.take_expired(Instant::now()));
    }

    #[test]
    fn disarm_clears_the_deadline() {
        let mut timer = RevertTimer::new(Duration::ZERO);
        timer.arm();
        timer.disarm();
        assert!(!timer.take_expired(Instant::now()));
    }
}
