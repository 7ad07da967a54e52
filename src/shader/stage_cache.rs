//! Per-stage UID → bytecode map.
//!
//! Lookups of existing entries take the read side of the lock; only an insert
//! of a previously unseen UID takes the write side. Entries are handed out as
//! `Arc`s so they stay valid across later inserts and lock releases.

use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use rustc_hash::FxHashMap;
use std::sync::Arc;

use super::entry::ByteCodeEntry;
use super::uid::ShaderUid;

pub struct StageCache<U: ShaderUid> {
    entries: RwLock<FxHashMap<U, Arc<ByteCodeEntry>>>,
}

impl<U: ShaderUid> Default for StageCache<U> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U: ShaderUid> StageCache<U> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
        }
    }

    /// Returns the entry for `uid`, inserting a fresh one if absent.
    ///
    /// The returned handle is shared by every caller asking for the same UID.
    pub fn find_or_create(&self, uid: &U) -> Arc<ByteCodeEntry> {
        if let Some(entry) = self.entries.read().get(uid) {
            return Arc::clone(entry);
        }

        let guard = self.entries.upgradable_read();
        if let Some(entry) = guard.get(uid) {
            return Arc::clone(entry);
        }
        let mut guard = RwLockUpgradableReadGuard::upgrade(guard);
        Arc::clone(guard.entry(*uid).or_default())
    }

    /// Inserts `uid` as already compiled, e.g. when replaying the disk cache.
    ///
    /// An existing uncompiled entry is published in place so outstanding
    /// handles observe the bytecode. Returns the entry.
    pub fn insert_compiled(&self, uid: &U, bytecode: impl Into<Box<[u8]>>) -> Arc<ByteCodeEntry> {
        let entry = self.find_or_create(uid);
        entry.test_and_mark_initialized();
        entry.publish(bytecode);
        entry
    }

    #[must_use]
    pub fn get(&self, uid: &U) -> Option<Arc<ByteCodeEntry>> {
        self.entries.read().get(uid).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn compiled_count(&self) -> usize {
        self.entries
            .read()
            .values()
            .filter(|e| e.is_compiled())
            .count()
    }

    /// Drops every entry. Outstanding `Arc`s keep their entries alive.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
