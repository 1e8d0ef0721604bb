//! Generation-counter reader/writer synchronization.
//!
//! Readers never block: they take a [`ReadStamp`], do their work, and ask
//! [`SeqLock::release_read`] whether a writer ran in the meantime. Writers
//! exclude each other with a mutex and bump the generation on entry (making it
//! odd) and on exit (making it even again). A stamp taken while the generation
//! is odd never validates, so a reader can't accept a result computed during
//! a write.

use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{fence, AtomicU64, Ordering};

/// Generation observed by a reader when it started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadStamp(u64);

impl ReadStamp {
    #[must_use]
    pub fn generation(self) -> u64 {
        self.0
    }

    /// True if a writer was inside its critical section when this was taken
    #[must_use]
    pub fn is_writing(self) -> bool {
        self.0 & 1 == 1
    }
}

/// Seqlock over no data of its own; it guards whatever the writers mutate
#[derive(Debug, Default)]
pub struct SeqLock {
    generation: AtomicU64,
    writer: Mutex<()>,
}

impl SeqLock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current generation
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Start an optimistic read; never blocks
    #[must_use]
    pub fn acquire_read(&self) -> ReadStamp {
        ReadStamp(self.generation.load(Ordering::Acquire))
    }

    /// Finish an optimistic read
    ///
    /// True if no writer entered or was inside its critical section since
    /// `stamp` was taken; the reader's result is then consistent.
    #[must_use]
    pub fn release_read(&self, stamp: ReadStamp) -> bool {
        fence(Ordering::Acquire);
        !stamp.is_writing() && self.generation.load(Ordering::Relaxed) == stamp.0
    }

    /// Enter the writer critical section
    ///
    /// Blocks only on other writers. Dropping the guard is `releaseWrite`.
    pub fn acquire_write(&self) -> SeqWriteGuard<'_> {
        let guard = self.writer.lock();
        self.generation.fetch_add(1, Ordering::AcqRel);
        SeqWriteGuard {
            lock: self,
            _writer: guard,
        }
    }

    /// Exclude writers without invalidating readers
    ///
    /// Used by readers that exhausted their optimistic retries.
    pub fn read_exclusive(&self) -> MutexGuard<'_, ()> {
        self.writer.lock()
    }
}

/// Writer critical section; bumps the generation back to even on drop
pub struct SeqWriteGuard<'a> {
    lock: &'a SeqLock,
    _writer: MutexGuard<'a, ()>,
}

impl Drop for SeqWriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.generation.fetch_add(1, Ordering::Release);
    }
}
