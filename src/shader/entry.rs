//! Cached bytecode entries.
//!
//! An entry moves through `Uninitialized → Pending → Compiled`, or ends in
//! `Failed` when the backend rejects its source. The `initialized` flag is the
//! single-dispatch gate; the bytecode slot is written at most once.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// Compiled bytecode plus its one-shot lifecycle flags.
///
/// Shared as `Arc<ByteCodeEntry>` between the stage cache, the per-context
/// active slots and in-flight compile jobs. Once published, the bytecode is
/// immutable and can be read without locking.
#[derive(Debug, Default)]
pub struct ByteCodeEntry {
    bytecode: OnceLock<Box<[u8]>>,
    initialized: AtomicBool,
    failed: AtomicBool,
    // Only filled while shader debugging is enabled.
    source: OnceLock<String>,
}

/// Coarse view of where an entry is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Uninitialized,
    Pending,
    Compiled,
    /// Compilation failed; the entry never compiles this session.
    Failed,
}

impl ByteCodeEntry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An entry that is already compiled and initialized.
    ///
    /// Used for records replayed from disk and for the passthrough sentinel.
    #[must_use]
    pub fn compiled(bytecode: impl Into<Box<[u8]>>) -> Self {
        let entry = Self::new();
        entry.initialized.store(true, Ordering::Release);
        let _ = entry.bytecode.set(bytecode.into());
        entry
    }

    /// Atomically sets the one-shot flag and returns its previous value.
    ///
    /// Exactly one caller ever observes `false`; that caller owns the compile
    /// dispatch for this entry.
    #[inline]
    pub fn test_and_mark_initialized(&self) -> bool {
        self.initialized.swap(true, Ordering::AcqRel)
    }

    #[inline]
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    #[inline]
    #[must_use]
    pub fn is_compiled(&self) -> bool {
        self.bytecode.get().is_some()
    }

    #[must_use]
    pub fn state(&self) -> EntryState {
        if self.is_compiled() {
            EntryState::Compiled
        } else if self.is_failed() {
            EntryState::Failed
        } else if self.is_initialized() {
            EntryState::Pending
        } else {
            EntryState::Uninitialized
        }
    }

    /// Published bytecode, or an empty slice while not compiled.
    #[inline]
    #[must_use]
    pub fn bytecode(&self) -> &[u8] {
        self.bytecode.get().map(|b| &**b).unwrap_or(&[])
    }

    /// Stores compiled bytecode. Returns `false` if the entry was already published.
    pub fn publish(&self, bytecode: impl Into<Box<[u8]>>) -> bool {
        self.bytecode.set(bytecode.into()).is_ok()
    }

    /// Marks a pending entry as permanently uncompiled. No retry follows.
    pub fn mark_failed(&self) {
        self.failed.store(true, Ordering::Release);
    }

    #[inline]
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Attaches the generated source for debugging.
    pub fn set_debug_source(&self, source: String) {
        let _ = self.source.set(source);
    }

    #[must_use]
    pub fn debug_source(&self) -> Option<&str> {
        self.source.get().map(String::as_str)
    }
}
