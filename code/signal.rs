use std::sync::{Arc, atomic::{AtomicBool, Ordering}};
use std::time::{Duration, Instant};

// Used when `now + duration` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Shared "keep injecting" flag. The dispatcher holds this writable side;
/// workers only ever see a [`LivenessProbe`].
#[derive(Debug, Clone, Default)]
pub struct LivenessSignal {
    alive: Arc<AtomicBool>,
}

impl LivenessSignal {
    /// Starts out disarmed.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&self) {
        self.alive.store(true, Ordering::SeqCst);
    }

    /// Returns whether the signal was armed before this call.
    pub fn disarm(&self) -> bool {
        self.alive.swap(false, Ordering::SeqCst)
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn probe(&self) -> LivenessProbe {
        LivenessProbe { alive: self.alive.clone() }
    }
}

/// Read-only view of a [`LivenessSignal`].
#[derive(Debug, Clone)]
pub struct LivenessProbe {
    alive: Arc<AtomicBool>,
}

impl LivenessProbe {
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

/// Absolute point in time after which a worker stops on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn after(duration: Duration) -> Self {
        let now = Instant::now();
        let at = now
            .checked_add(duration)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now);
        Self(at)
    }

    #[inline]
    pub fn has_passed(&self) -> bool {
        Instant::now() >= self.0
    }

    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }
}

/// True while a worker bound to `deadline` should keep going.
#[inline]
pub fn should_continue(liveness: &LivenessProbe, deadline: &Deadline) -> bool {
    liveness.is_alive() && !deadline.has_passed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_signal_is_disarmed() {
        let signal = LivenessSignal::new();
        assert!(!signal.is_alive());
        assert!(!signal.probe().is_alive());
    }

    #[test]
    fn probe_observes_arm_and_disarm() {
        let signal = LivenessSignal::new();
        let probe = signal.probe();

        signal.arm();
        assert!(probe.is_alive());

        assert!(signal.disarm());
        assert!(!probe.is_alive());
    }

    #[test]
    fn disarming_idle_signal_is_harmless() {
        let signal = LivenessSignal::new();
        assert!(!signal.disarm());
        assert!(!signal.disarm());
        assert!(!signal.is_alive());
    }

    #[test]
    fn clones_share_one_flag() {
        let signal = LivenessSignal::new();
        let other = signal.clone();
        other.arm();
        assert!(signal.is_alive());
    }

    #[test]
    fn zero_deadline_has_already_passed() {
        let deadline = Deadline::after(Duration::ZERO);
        assert!(deadline.has_passed());
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }

    #[test]
    fn future_deadline_reports_remaining_time() {
        let deadline = Deadline::after(Duration::from_secs(60));
        assert!(!deadline.has_passed());
        assert!(deadline.remaining() > Duration::from_secs(59));
    }

    #[test]
    fn huge_duration_does_not_overflow() {
        let deadline = Deadline::after(Duration::from_secs(u64::MAX));
        assert!(!deadline.has_passed());
    }

    #[test]
    fn continue_requires_signal_and_time() {
        let signal = LivenessSignal::new();
        let probe = signal.probe();
        let open = Deadline::after(Duration::from_secs(60));
        let closed = Deadline::after(Duration::ZERO);

        assert!(!should_continue(&probe, &open));
        signal.arm();
        assert!(should_continue(&probe, &open));
        assert!(!should_continue(&probe, &closed));
    }
}
