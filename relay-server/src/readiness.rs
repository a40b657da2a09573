//! Process-wide assistant readiness.

use std::sync::OnceLock;

use relay_common::ReadinessState;

/// One-shot readiness cell: `Loading` until the engine reports in, then
/// `Ready` or `Failed` for the rest of the process lifetime.
#[derive(Debug, Default)]
pub struct Readiness {
    outcome: OnceLock<ReadinessState>,
}

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state. Never blocks.
    pub fn query(&self) -> ReadinessState {
        self.outcome.get().copied().unwrap_or(ReadinessState::Loading)
    }

    /// Record the engine loading outcome.
    ///
    /// # Panics
    ///
    /// Panics if called twice or with `Loading`. Readiness is announced by a
    /// single loader task; a second announcement is a bug.
    pub fn announce(&self, outcome: ReadinessState) {
        assert!(
            outcome.is_terminal(),
            "readiness can only be announced as ready or failed"
        );
        if let Err(rejected) = self.outcome.set(outcome) {
            panic!(
                "readiness announced twice (already {:?}, got {:?})",
                self.query(),
                rejected
            );
        }
        tracing::info!("Assistant readiness is now {:?}", outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_loading() {
        assert_eq!(Readiness::new().query(), ReadinessState::Loading);
    }

    #[test]
    fn test_announce_ready() {
        let readiness = Readiness::new();
        readiness.announce(ReadinessState::Ready);
        assert_eq!(readiness.query(), ReadinessState::Ready);
    }

    #[test]
    fn test_announce_failed_is_terminal() {
        let readiness = Readiness::new();
        readiness.announce(ReadinessState::Failed);
        assert_eq!(readiness.query(), ReadinessState::Failed);
        assert!(!readiness.query().is_ready());
    }

    #[test]
    #[should_panic(expected = "announced twice")]
    fn test_double_announce_panics() {
        let readiness = Readiness::new();
        readiness.announce(ReadinessState::Ready);
        readiness.announce(ReadinessState::Failed);
    }

    #[test]
    #[should_panic(expected = "ready or failed")]
    fn test_announce_loading_panics() {
        Readiness::new().announce(ReadinessState::Loading);
    }

    #[test]
    fn test_concurrent_readers_see_non_decreasing_state() {
        let readiness = std::sync::Arc::new(Readiness::new());
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let readiness = readiness.clone();
                std::thread::spawn(move || {
                    let mut seen_ready = false;
                    for _ in 0..10_000 {
                        match readiness.query() {
                            ReadinessState::Ready => seen_ready = true,
                            ReadinessState::Loading => assert!(!seen_ready),
                            ReadinessState::Failed => unreachable!(),
                        }
                    }
                })
            })
            .collect();

        readiness.announce(ReadinessState::Ready);
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(readiness.query(), ReadinessState::Ready);
    }
}
