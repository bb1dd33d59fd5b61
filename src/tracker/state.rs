use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use serde::Serialize;

/// Shared job counters. Every field is updated atomically so event handlers
/// can run concurrently without a lock.
///
/// # Invariants
///
/// - `processed <= target` at all times
/// - `failure_observed` never goes back to false
/// - `stop_initiated` goes false -> true exactly once
#[derive(Debug)]
pub struct JobState {
    target: u32,
    granted: AtomicU32,
    processed: AtomicU32,
    failed: AtomicU32,
    failure_observed: AtomicBool,
    forced_stop: AtomicBool,
    stop_initiated: AtomicBool,
}

/// Result of folding a completion batch into the processed count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessedUpdate {
    pub processed: u32,
    /// Outcomes beyond the target, ignored
    pub surplus: u32,
    /// This batch moved `processed` onto `target`
    pub reached_target: bool,
}

/// Point-in-time copy of [`JobState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobSnapshot {
    pub target: u32,
    pub granted: u32,
    pub processed: u32,
    pub failed: u32,
    pub failure_observed: bool,
    pub forced_stop: bool,
    pub stop_initiated: bool,
}

impl JobState {
    pub fn new(target: u32) -> Self {
        Self {
            target,
            granted: AtomicU32::new(0),
            processed: AtomicU32::new(0),
            failed: AtomicU32::new(0),
            failure_observed: AtomicBool::new(false),
            forced_stop: AtomicBool::new(false),
            stop_initiated: AtomicBool::new(false),
        }
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    /// Returns the new granted total.
    pub fn record_granted(&self, count: u32) -> u32 {
        self.granted
            .fetch_add(count, Ordering::SeqCst)
            .saturating_add(count)
    }

    pub fn granted(&self) -> u32 {
        self.granted.load(Ordering::SeqCst)
    }

    /// Add a completion batch, clamped at the target.
    pub fn record_processed(&self, count: u32) -> ProcessedUpdate {
        let target = self.target;
        // fetch_update retries on contention; the closure never returns None
        let previous = match self
            .processed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_add(count).min(target))
            }) {
            Ok(previous) | Err(previous) => previous,
        };

        let processed = previous.saturating_add(count).min(target);
        ProcessedUpdate {
            processed,
            surplus: count - (processed - previous),
            reached_target: previous < target && processed == target,
        }
    }

    pub fn processed(&self) -> u32 {
        self.processed.load(Ordering::SeqCst)
    }

    pub fn is_complete(&self) -> bool {
        self.processed() == self.target
    }

    /// Record one failed work unit. The failure flag is sticky.
    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
        self.failure_observed.store(true, Ordering::SeqCst);
    }

    /// Flag the job failed without a work-unit failure (local fatal error).
    pub fn mark_failure(&self) {
        self.failure_observed.store(true, Ordering::SeqCst);
    }

    pub fn failed(&self) -> u32 {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn failure_observed(&self) -> bool {
        self.failure_observed.load(Ordering::SeqCst)
    }

    pub fn mark_forced_stop(&self) {
        self.forced_stop.store(true, Ordering::SeqCst);
    }

    pub fn forced_stop(&self) -> bool {
        self.forced_stop.load(Ordering::SeqCst)
    }

    /// Claim the stop sequence. Only the first caller gets `true`.
    pub fn try_begin_stop(&self) -> bool {
        self.stop_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn stop_initiated(&self) -> bool {
        self.stop_initiated.load(Ordering::SeqCst)
    }

    /// Fraction of work units processed, in `[0, 1]`.
    pub fn progress(&self) -> f32 {
        if self.target == 0 {
            return 1.0;
        }
        self.processed() as f32 / self.target as f32
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            target: self.target,
            granted: self.granted(),
            processed: self.processed(),
            failed: self.failed(),
            failure_observed: self.failure_observed(),
            forced_stop: self.forced_stop(),
            stop_initiated: self.stop_initiated(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn processed_reaches_target_once() {
        let state = JobState::new(5);

        let first = state.record_processed(1);
        assert_eq!(first.processed, 1);
        assert!(!first.reached_target);

        let second = state.record_processed(1);
        assert!(!second.reached_target);

        let third = state.record_processed(3);
        assert_eq!(third.processed, 5);
        assert_eq!(third.surplus, 0);
        assert!(third.reached_target);
        assert!(state.is_complete());
    }

    #[test]
    fn processed_is_clamped_at_target() {
        let state = JobState::new(3);
        state.record_processed(2);

        let update = state.record_processed(4);
        assert_eq!(update.processed, 3);
        assert_eq!(update.surplus, 3);
        assert!(update.reached_target);

        let late = state.record_processed(1);
        assert_eq!(late.processed, 3);
        assert_eq!(late.surplus, 1);
        assert!(!late.reached_target);
        assert_eq!(state.processed(), 3);
    }

    #[test]
    fn empty_batch_does_not_trigger() {
        let state = JobState::new(2);
        let update = state.record_processed(0);
        assert_eq!(update.processed, 0);
        assert!(!update.reached_target);
    }

    #[test]
    fn zero_target_is_complete_immediately() {
        let state = JobState::new(0);
        assert!(state.is_complete());
        assert_eq!(state.progress(), 1.0);
    }

    #[test]
    fn failure_flag_is_sticky() {
        let state = JobState::new(2);
        assert!(!state.failure_observed());
        state.record_failure();
        assert!(state.failure_observed());
        state.record_processed(2);
        assert!(state.failure_observed());
        assert_eq!(state.failed(), 1);
    }

    #[test]
    fn mark_failure_does_not_count_a_unit() {
        let state = JobState::new(2);
        state.mark_failure();
        assert!(state.failure_observed());
        assert_eq!(state.failed(), 0);
    }

    #[test]
    fn stop_can_be_claimed_once() {
        let state = JobState::new(1);
        assert!(state.try_begin_stop());
        assert!(!state.try_begin_stop());
        assert!(state.stop_initiated());
    }

    #[test]
    fn concurrent_stop_claims_have_one_winner() {
        let state = Arc::new(JobState::new(1));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let state = state.clone();
                std::thread::spawn(move || state.try_begin_stop())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn concurrent_batches_trigger_exactly_once() {
        let state = Arc::new(JobState::new(100));
        let handles: Vec<_> = (0..100)
            .map(|_| {
                let state = state.clone();
                std::thread::spawn(move || state.record_processed(1).reached_target)
            })
            .collect();

        let triggers = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|hit| *hit)
            .count();
        assert_eq!(triggers, 1);
        assert_eq!(state.processed(), 100);
    }

    #[test]
    fn progress_tracks_processed_fraction() {
        let state = JobState::new(4);
        state.record_processed(1);
        assert_eq!(state.progress(), 0.25);
    }
}
