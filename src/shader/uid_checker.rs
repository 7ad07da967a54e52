//! Debug validation of UID derivation.
//!
//! A UID is supposed to capture *exactly* the state that affects generated
//! source. [`UidChecker`] remembers, per stage, which source each UID produced
//! and which UID each source came from (keyed by the xxh3-128 of the source).
//! Any disagreement means the upstream UID derivation is hashing too little
//! (one UID, two sources) or too much (two UIDs, one source).

use rustc_hash::FxHashMap;
use xxhash_rust::xxh3::xxh3_128;

use super::uid::{ShaderStage, ShaderUid};
use crate::errors::{Result, ShaderCacheError};

pub struct UidChecker<U: ShaderUid> {
    stage: ShaderStage,
    source_by_uid: FxHashMap<U, u128>,
    uid_by_source: FxHashMap<u128, U>,
    violations: usize,
}

impl<U: ShaderUid> UidChecker<U> {
    #[must_use]
    pub fn new(stage: ShaderStage) -> Self {
        Self {
            stage,
            source_by_uid: FxHashMap::default(),
            uid_by_source: FxHashMap::default(),
            violations: 0,
        }
    }

    /// Records `(uid, source)` and checks it against everything seen so far.
    ///
    /// Violations are logged and counted; the indices keep their first mapping.
    pub fn add_to_index_and_check(&mut self, uid: &U, source: &str) -> Result<()> {
        let source_hash = xxh3_128(source.as_bytes());

        let known_source = *self.source_by_uid.entry(*uid).or_insert(source_hash);
        let known_uid = *self.uid_by_source.entry(source_hash).or_insert(*uid);

        let detail = if known_source != source_hash {
            format!("UID {uid:?} generated two different sources")
        } else if known_uid != *uid {
            format!("UIDs {known_uid:?} and {uid:?} generated identical source")
        } else {
            return Ok(());
        };

        self.violations += 1;
        let err = ShaderCacheError::UidCollision {
            stage: self.stage,
            detail,
        };
        log::error!("{err}");
        Err(err)
    }

    #[must_use]
    pub fn violations(&self) -> usize {
        self.violations
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.source_by_uid.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.source_by_uid.is_empty()
    }

    /// Forgets every recorded mapping.
    pub fn invalidate(&mut self) {
        self.source_by_uid.clear();
        self.uid_by_source.clear();
    }
}
