use std::sync::Arc;

use time::{OffsetDateTime, PrimitiveDateTime};

pub(crate) fn primitive_now_utc() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

/// Wall-clock source for the epoch timestamps stamped on sessions and results.
///
/// Countdown progress never reads this; the session clock counts its own
/// elapsed seconds. Only `startedAt`/`submittedAt` style fields come from here,
/// so tests can pin them without touching the system clock.
pub(crate) trait EpochClock: Send + Sync {
    fn now_epoch_seconds(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SystemEpochClock;

impl EpochClock for SystemEpochClock {
    fn now_epoch_seconds(&self) -> i64 {
        OffsetDateTime::now_utc().unix_timestamp()
    }
}

pub(crate) fn system_epoch_clock() -> Arc<dyn EpochClock> {
    Arc::new(SystemEpochClock)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_tracks_offset_now() {
        let before = OffsetDateTime::now_utc().unix_timestamp();
        let observed = SystemEpochClock.now_epoch_seconds();
        let after = OffsetDateTime::now_utc().unix_timestamp();
        assert!(before <= observed && observed <= after);
    }

    #[test]
    fn primitive_now_is_utc() {
        let primitive = primitive_now_utc();
        let offset = OffsetDateTime::now_utc();
        let delta = offset.unix_timestamp() - primitive.assume_utc().unix_timestamp();
        assert!((0..=1).contains(&delta));
    }
}
