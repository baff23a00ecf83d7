//! Session countdown

/// Session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// In the lobby, waiting for ready consensus
    #[default]
    Idle,
    /// Countdown running, targets live
    Running,
    /// Countdown hit zero
    Ended,
}

/// Whole-second countdown driving a session
#[derive(Debug, Clone, Default)]
pub struct SessionClock {
    phase: SessionPhase,
    remaining_secs: u32,
}

impl SessionClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    pub fn is_running(&self) -> bool {
        self.phase == SessionPhase::Running
    }

    /// Start counting down from `secs`; only valid from `Idle`
    pub fn start(&mut self, secs: u32) -> bool {
        if self.phase != SessionPhase::Idle {
            return false;
        }

        if secs == 0 {
            self.phase = SessionPhase::Ended;
        } else {
            self.phase = SessionPhase::Running;
            self.remaining_secs = secs;
        }
        true
    }

    /// Advance one second; returns true on the tick that ends the session
    pub fn tick(&mut self) -> bool {
        if self.phase != SessionPhase::Running {
            return false;
        }

        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        if self.remaining_secs == 0 {
            self.phase = SessionPhase::Ended;
            return true;
        }
        false
    }

    /// Back to `Idle` for another round
    pub fn reset(&mut self) {
        self.phase = SessionPhase::Idle;
        self.remaining_secs = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_down_to_ended() {
        let mut clock = SessionClock::new();
        assert!(clock.start(3));
        assert_eq!(clock.phase(), SessionPhase::Running);

        assert!(!clock.tick());
        assert!(!clock.tick());
        assert_eq!(clock.remaining_secs(), 1);
        assert!(clock.tick());
        assert_eq!(clock.phase(), SessionPhase::Ended);

        // Terminal
        assert!(!clock.tick());
        assert_eq!(clock.remaining_secs(), 0);
    }

    #[test]
    fn start_only_from_idle() {
        let mut clock = SessionClock::new();
        assert!(clock.start(30));
        clock.tick();
        assert!(!clock.start(30));
        assert_eq!(clock.remaining_secs(), 29);
    }

    #[test]
    fn ticks_ignored_while_idle() {
        let mut clock = SessionClock::new();
        assert!(!clock.tick());
        assert_eq!(clock.phase(), SessionPhase::Idle);
    }

    #[test]
    fn reset_allows_another_round() {
        let mut clock = SessionClock::new();
        clock.start(1);
        clock.tick();
        clock.reset();
        assert!(clock.start(5));
        assert_eq!(clock.remaining_secs(), 5);
    }
}
