//! crates/study_tracker_core/src/streak.rs
//!
//! Consecutive-day streak arithmetic. This is the only place streak values are
//! derived; the day engine persists whatever it returns.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Streak {
    pub current: u32,
    pub best: u32,
}

/// Computes the streak after a day closes.
///
/// `yesterday_completed` is `None` when no summary exists for yesterday.
/// A productive day extends a productive yesterday, otherwise restarts at 1.
/// A day with nothing completed resets to 0.
pub fn advance(yesterday_completed: Option<u32>, today_completed: u32, prior: Streak) -> Streak {
    let current = if today_completed == 0 {
        0
    } else {
        match yesterday_completed {
            Some(n) if n > 0 => prior.current.saturating_add(1),
            _ => 1,
        }
    };

    Streak {
        current,
        best: current.max(prior.best),
    }
}
