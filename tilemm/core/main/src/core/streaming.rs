//! Streaming compute sessions for the outer-product tile kernels.
//!
//! A tile kernel keeps a full `TILE x TILE` accumulator resident for the
//! whole reduction loop. That state belongs to one OS thread: a session is
//! entered once per kernel call, cannot be sent to another thread, cannot
//! nest, and is released on every exit path by `Drop`.

use std::cell::Cell;
use std::marker::PhantomData;

thread_local! {
    static ACTIVE: Cell<bool> = const { Cell::new(false) };
    static ENTRIES: Cell<u64> = const { Cell::new(0) };
}

/// RAII guard for an exclusive streaming-mode region on the current thread.
#[derive(Debug)]
pub struct StreamingSession {
    // *const () makes the guard !Send + !Sync: it is pinned to the entering thread.
    _pinned: PhantomData<*const ()>,
}

impl StreamingSession {
    /// Enter streaming mode on this thread.
    ///
    /// Panics if a session is already active here.
    pub fn enter() -> Self {
        ACTIVE.with(|active| {
            assert!(
                !active.get(),
                "streaming session already active on this thread"
            );
            active.set(true);
        });
        ENTRIES.with(|n| n.set(n.get() + 1));
        StreamingSession {
            _pinned: PhantomData,
        }
    }

    /// Whether the current thread is inside a session.
    pub fn is_active() -> bool {
        ACTIVE.with(|active| active.get())
    }

    /// Number of sessions entered on the current thread so far.
    pub fn entries_on_this_thread() -> u64 {
        ENTRIES.with(|n| n.get())
    }
}

impl Drop for StreamingSession {
    fn drop(&mut self) {
        ACTIVE.with(|active| active.set(false));
    }
}
