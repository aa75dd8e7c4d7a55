//! Cancellation and debounce primitives (spec §5 "Concurrency & Resource
//! Model"). The consumer is the authority on both: it mints `AsyncToken`s
//! for its own pipelines and is the one racing video/audio readers into a
//! live-edge recovery. What this crate owns is the shared state those two
//! disciplines need to coordinate against — a single generation counter per
//! `HlsInput`/`SegmentSource` pair, and a single debounce gate per segment
//! source, since both readers share that one source.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Issues monotonically increasing `async_id` tokens (spec §5.1). Cloning an
/// `AsyncTokenSource` shares the same counter, mirroring how one `HlsInput`
/// backs every pipeline a consumer starts against it.
#[derive(Clone)]
pub struct AsyncTokenSource {
    current: Arc<AtomicU64>,
}

impl AsyncTokenSource {
    pub fn new() -> Self {
        Self {
            current: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Starts a new pipeline (play, seek, load): bumps the generation and
    /// hands back a token that is current only until the next `begin()`.
    pub fn begin(&self) -> AsyncToken {
        let id = self.current.fetch_add(1, Ordering::Relaxed) + 1;
        AsyncToken {
            id,
            current: self.current.clone(),
        }
    }
}

impl Default for AsyncTokenSource {
    fn default() -> Self {
        Self::new()
    }
}

/// A single pipeline's cancellation handle. Long-running coroutines capture
/// one at entry and call `is_current()` after every await point; on mismatch
/// they return without side effects rather than committing stale state.
#[derive(Clone)]
pub struct AsyncToken {
    id: u64,
    current: Arc<AtomicU64>,
}

impl AsyncToken {
    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::Relaxed) == self.id
    }

    pub fn is_cancelled(&self) -> bool {
        !self.is_current()
    }
}

/// Serializes live-edge recovery across the multiple iterators (video,
/// audio) that share one segment source (spec §5.2). The first caller to
/// observe a `LiveEdgeError` wins the right to seek; later concurrent
/// callers are told to stand down until the debounce window clears.
pub struct LiveEdgeDebouncer {
    handling: AtomicBool,
    debounce: Duration,
}

impl LiveEdgeDebouncer {
    pub fn new(debounce: Duration) -> Self {
        Self {
            handling: AtomicBool::new(false),
            debounce,
        }
    }

    /// Attempts to claim the recovery seek. Returns `true` exactly once per
    /// debounce window; all other concurrent callers get `false` and should
    /// drop their `LiveEdgeError` rather than also seeking.
    pub fn try_begin_recovery(&self) -> bool {
        self.handling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Releases the gate `debounce` after the recovery seek completes,
    /// spawning the clear so the caller doesn't have to hold the gate open
    /// itself across the seek.
    pub fn finish_recovery(self: &Arc<Self>) {
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(this.debounce).await;
            this.handling.store(false, Ordering::Release);
        });
    }

    pub fn is_handling(&self) -> bool {
        self.handling.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn async_token_is_superseded_by_a_later_begin() {
        let source = AsyncTokenSource::new();
        let first = source.begin();
        assert!(first.is_current());
        let second = source.begin();
        assert!(!first.is_current());
        assert!(second.is_current());
    }

    #[test]
    fn cloned_token_source_shares_generation() {
        let source = AsyncTokenSource::new();
        let token = source.begin();
        let clone = source.clone();
        assert!(token.is_current());
        let _ = clone.begin();
        assert!(token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn live_edge_debounce_blocks_concurrent_callers_until_released() {
        let debouncer = Arc::new(LiveEdgeDebouncer::new(Duration::from_millis(500)));
        assert!(debouncer.try_begin_recovery());
        assert!(!debouncer.try_begin_recovery());
        assert!(!debouncer.try_begin_recovery());

        debouncer.finish_recovery();
        tokio::time::advance(Duration::from_millis(501)).await;
        tokio::task::yield_now().await;

        assert!(!debouncer.is_handling());
        assert!(debouncer.try_begin_recovery());
    }
}
