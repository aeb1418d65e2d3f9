use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ClockState {
    Idle,
    Running,
    Expired,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClockEvent {
    Tick { remaining_seconds: u32 },
    Expired,
}

/// Countdown for one session.
///
/// The clock does not read time itself: its owner calls [`SessionClock::advance`]
/// once per elapsed second. Expired and Cancelled are terminal, and only one of
/// them is ever reached.
#[derive(Debug, Clone)]
pub(crate) struct SessionClock {
    state: ClockState,
    duration_seconds: u32,
    remaining_seconds: u32,
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionClock {
    pub(crate) fn new() -> Self {
        Self { state: ClockState::Idle, duration_seconds: 0, remaining_seconds: 0 }
    }

    /// Idle -> Running. Returns false (and changes nothing) from any other state.
    pub(crate) fn start(&mut self, duration_seconds: u32) -> bool {
        if self.state != ClockState::Idle {
            return false;
        }
        self.state = ClockState::Running;
        self.duration_seconds = duration_seconds;
        self.remaining_seconds = duration_seconds;
        true
    }

    /// Accounts for one elapsed second.
    pub(crate) fn advance(&mut self) -> Option<ClockEvent> {
        if self.state != ClockState::Running {
            return None;
        }

        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        if self.remaining_seconds == 0 {
            self.state = ClockState::Expired;
            return Some(ClockEvent::Expired);
        }

        Some(ClockEvent::Tick { remaining_seconds: self.remaining_seconds })
    }

    /// Running -> Cancelled. Returns true only for the call that cancelled.
    pub(crate) fn cancel(&mut self) -> bool {
        if self.state != ClockState::Running {
            return false;
        }
        self.state = ClockState::Cancelled;
        true
    }

    pub(crate) fn state(&self) -> ClockState {
        self.state
    }

    pub(crate) fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    pub(crate) fn elapsed_seconds(&self) -> u32 {
        self.duration_seconds - self.remaining_seconds
    }
}
