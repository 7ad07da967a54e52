//! Shader cache statistics.
//!
//! Counters are updated lock-free from whichever thread does the work and
//! read as a [`ShaderCacheStats`] snapshot.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::shader::ShaderStage;

/// Snapshot of one stage's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageStats {
    /// Entries currently held by the stage cache.
    pub alive: usize,
    /// Successful compiles this session.
    pub created: usize,
    /// Records replayed from the disk cache.
    pub loaded_from_disk: usize,
    /// Compile requests submitted.
    pub dispatched: usize,
    /// Compiles rejected by the backend.
    pub failed: usize,
}

/// Snapshot of all stages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShaderCacheStats {
    pub geometry: StageStats,
    pub pixel: StageStats,
    pub vertex: StageStats,
}

impl ShaderCacheStats {
    #[must_use]
    pub fn stage(&self, stage: ShaderStage) -> &StageStats {
        match stage {
            ShaderStage::Geometry => &self.geometry,
            ShaderStage::Pixel => &self.pixel,
            ShaderStage::Vertex => &self.vertex,
        }
    }

    /// Compile requests submitted across all stages.
    #[must_use]
    pub fn total_dispatched(&self) -> usize {
        self.geometry.dispatched + self.pixel.dispatched + self.vertex.dispatched
    }
}

#[derive(Debug, Default)]
pub(crate) struct StageCounters {
    created: AtomicUsize,
    loaded_from_disk: AtomicUsize,
    dispatched: AtomicUsize,
    failed: AtomicUsize,
}

impl StageCounters {
    pub(crate) fn inc_created(&self) {
        self.created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_loaded_from_disk(&self, count: usize) {
        self.loaded_from_disk.store(count, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, alive: usize) -> StageStats {
        StageStats {
            alive,
            created: self.created.load(Ordering::Relaxed),
            loaded_from_disk: self.loaded_from_disk.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}
