//! Progress normalization.
//!
//! Progress reaches a session from heterogeneous sources: explicit values
//! on the push stream, explicit values in poll payloads, and wall-clock
//! interpolation for monitors that report none. All of them funnel
//! through [`clamp_progress`] / [`derive_time_progress`] and then a
//! [`ProgressRatchet`], so the value a session exposes never decreases
//! while the session is non-terminal, no matter how the two channels
//! interleave.

use piiwatch_core::types::Timestamp;

/// Clamp an optional raw progress value to [0, 100].
///
/// Absent or non-finite input normalizes to 0.
pub fn clamp_progress(raw: Option<f64>) -> f64 {
    match raw {
        Some(v) if v.is_finite() => v.clamp(0.0, 100.0),
        _ => 0.0,
    }
}

/// Derive progress from elapsed wall-clock time.
///
/// Returns `None` unless `ends_at > started_at`; the caller must skip the
/// reading in that case rather than regress a previously higher value.
pub fn derive_time_progress(
    started_at: Timestamp,
    ends_at: Timestamp,
    now: Timestamp,
) -> Option<f64> {
    if ends_at <= started_at {
        return None;
    }
    let total = (ends_at - started_at).num_milliseconds() as f64;
    let elapsed = (now - started_at).num_milliseconds() as f64;
    Some((elapsed / total * 100.0).clamp(0.0, 100.0))
}

/// Monotonic progress ratchet.
///
/// A later, lower reading from one channel must not overwrite a higher
/// reading already recorded from the other.
#[derive(Debug, Default)]
pub struct ProgressRatchet {
    current: f64,
}

impl ProgressRatchet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in a normalized candidate value; returns the ratcheted value.
    pub fn observe(&mut self, candidate: f64) -> f64 {
        if candidate > self.current {
            self.current = candidate;
        }
        self.current
    }

    /// Terminal transition: progress is forced to 100 regardless of the
    /// last observed value.
    pub fn force_complete(&mut self) -> f64 {
        self.current = 100.0;
        self.current
    }

    pub fn value(&self) -> f64 {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn clamp_bounds_and_defaults() {
        assert_eq!(clamp_progress(Some(42.0)), 42.0);
        assert_eq!(clamp_progress(Some(-5.0)), 0.0);
        assert_eq!(clamp_progress(Some(250.0)), 100.0);
        assert_eq!(clamp_progress(Some(f64::NAN)), 0.0);
        assert_eq!(clamp_progress(None), 0.0);
    }

    #[test]
    fn halfway_through_a_window_is_fifty_percent() {
        let start = Utc::now();
        let end = start + Duration::seconds(3600);
        let now = start + Duration::seconds(1800);
        let derived = derive_time_progress(start, end, now).unwrap();
        assert!((derived - 50.0).abs() < 0.01, "derived = {derived}");
    }

    #[test]
    fn time_derivation_clamps_past_the_end() {
        let start = Utc::now();
        let end = start + Duration::seconds(60);
        let now = end + Duration::seconds(600);
        assert_eq!(derive_time_progress(start, end, now), Some(100.0));
    }

    #[test]
    fn time_derivation_rejects_degenerate_windows() {
        let start = Utc::now();
        assert_eq!(derive_time_progress(start, start, start), None);
        let earlier = start - Duration::seconds(10);
        assert_eq!(derive_time_progress(start, earlier, start), None);
    }

    #[test]
    fn ratchet_never_decreases() {
        let mut ratchet = ProgressRatchet::new();
        assert_eq!(ratchet.observe(30.0), 30.0);
        assert_eq!(ratchet.observe(80.0), 80.0);
        // A stale lower reading from the other channel.
        assert_eq!(ratchet.observe(45.0), 80.0);
        assert_eq!(ratchet.value(), 80.0);
    }

    #[test]
    fn force_complete_overrides_any_value() {
        let mut ratchet = ProgressRatchet::new();
        ratchet.observe(12.5);
        assert_eq!(ratchet.force_complete(), 100.0);
        assert_eq!(ratchet.value(), 100.0);
    }
}
