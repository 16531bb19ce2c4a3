//! Poller phase state machine.
//!
//! `Idle -> Fetching -> Idle` in a loop, with `Cancelled` terminal and
//! reachable from both. Every transition happens under one mutex, which is
//! also what `cancel()` takes, so a cancel racing the scheduling decision is
//! ordered before or after it, never in between.

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Phase of a per-channel poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    /// Waiting for the next cycle.
    Idle,
    /// A fetch is outstanding.
    Fetching,
    /// Terminal. No further fetch will start.
    Cancelled,
}

impl PollPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollPhase::Idle => "idle",
            PollPhase::Fetching => "fetching",
            PollPhase::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for PollPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared between a poller task and its handle.
#[derive(Debug)]
pub struct PollControl {
    phase: Mutex<PollPhase>,
    token: CancellationToken,
}

impl PollControl {
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            phase: Mutex::new(PollPhase::Idle),
            token: parent.child_token(),
        }
    }

    pub fn phase(&self) -> PollPhase {
        *self.phase.lock()
    }

    /// Token used to wake the poller loop out of its timer wait.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// `Idle -> Fetching`. Returns false if the poller has been cancelled,
    /// either directly or through its parent token.
    pub fn begin_fetch(&self) -> bool {
        let mut phase = self.phase.lock();
        if self.token.is_cancelled() {
            *phase = PollPhase::Cancelled;
        }
        match *phase {
            PollPhase::Idle => {
                *phase = PollPhase::Fetching;
                true
            }
            PollPhase::Fetching | PollPhase::Cancelled => false,
        }
    }

    /// `Fetching -> Idle`, running `commit` inside the transition.
    ///
    /// Returns `None` without calling `commit` if the poller was cancelled
    /// while the fetch was in flight. `commit` must not take the phase lock.
    pub fn finish_fetch<R>(&self, commit: impl FnOnce() -> R) -> Option<R> {
        let mut phase = self.phase.lock();
        if *phase == PollPhase::Cancelled || self.token.is_cancelled() {
            *phase = PollPhase::Cancelled;
            return None;
        }
        let result = commit();
        *phase = PollPhase::Idle;
        Some(result)
    }

    /// Move to `Cancelled`. Once this returns, `begin_fetch` always fails.
    pub fn cancel(&self) {
        *self.phase.lock() = PollPhase::Cancelled;
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.phase() == PollPhase::Cancelled || self.token.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_fetch_cycle() {
        let control = PollControl::new(&CancellationToken::new());
        assert_eq!(control.phase(), PollPhase::Idle);

        assert!(control.begin_fetch());
        assert_eq!(control.phase(), PollPhase::Fetching);
        // Only one fetch at a time
        assert!(!control.begin_fetch());

        assert_eq!(control.finish_fetch(|| 7), Some(7));
        assert_eq!(control.phase(), PollPhase::Idle);
    }

    #[test]
    fn test_cancel_during_fetch_discards_commit() {
        let control = PollControl::new(&CancellationToken::new());
        assert!(control.begin_fetch());

        control.cancel();

        let mut committed = false;
        assert!(control.finish_fetch(|| committed = true).is_none());
        assert!(!committed);
        assert_eq!(control.phase(), PollPhase::Cancelled);
        assert!(!control.begin_fetch());
    }

    #[test]
    fn test_parent_cancellation_propagates() {
        let parent = CancellationToken::new();
        let control = PollControl::new(&parent);

        parent.cancel();

        assert!(control.is_cancelled());
        assert!(!control.begin_fetch());
        assert_eq!(control.phase(), PollPhase::Cancelled);
    }

    #[test]
    fn test_no_fetch_starts_after_cancel_returns() {
        for _ in 0..200 {
            let control = Arc::new(PollControl::new(&CancellationToken::new()));
            let started_after_cancel = Arc::new(AtomicUsize::new(0));

            let cancelled = Arc::new(std::sync::atomic::AtomicBool::new(false));
            let worker = {
                let control = control.clone();
                let cancelled = cancelled.clone();
                let started_after_cancel = started_after_cancel.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let cancel_returned = cancelled.load(Ordering::SeqCst);
                        if control.begin_fetch() {
                            if cancel_returned {
                                started_after_cancel.fetch_add(1, Ordering::SeqCst);
                            }
                            control.finish_fetch(|| ());
                        }
                    }
                })
            };

            control.cancel();
            cancelled.store(true, Ordering::SeqCst);
            worker.join().unwrap();

            assert_eq!(started_after_cancel.load(Ordering::SeqCst), 0);
            assert_eq!(control.phase(), PollPhase::Cancelled);
        }
    }
}
