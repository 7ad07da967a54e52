//! Shader Cache Settings & Readiness Policy
//!
//! This module defines the configuration consumed once by
//! [`ShaderCache::init`](crate::ShaderCache::init).
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use myth_shader_cache::{ReadinessPolicy, ShaderCacheSettings};
//!
//! // Default: block draws until their shaders are compiled
//! let settings = ShaderCacheSettings::new("./cache/shaders", "GALE01");
//!
//! // Never stall the frame; the renderer skips draws whose shaders are pending
//! let settings = ShaderCacheSettings {
//!     readiness: ReadinessPolicy::FullyAsync,
//!     ..ShaderCacheSettings::new("./cache/shaders", "GALE01")
//! };
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::shader::ShaderStage;

// ---------------------------------------------------------------------------
// ReadinessPolicy
// ---------------------------------------------------------------------------

/// How [`ShaderCache::is_ready`](crate::ShaderCache::is_ready) behaves when the
/// active shaders are still compiling.
///
/// | Policy       | Behaviour                                        |
/// |--------------|--------------------------------------------------|
/// | `Wait`       | Spin (draining completions) until all compiled   |
/// | `FullyAsync` | Drain once and report; may return `false`        |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessPolicy {
    /// Stall the submission context until the active shaders are compiled.
    #[default]
    Wait,
    /// Report readiness without waiting. The renderer decides whether to skip
    /// the draw or use stale state.
    FullyAsync,
}

impl ReadinessPolicy {
    #[inline]
    #[must_use]
    pub fn waits(self) -> bool {
        matches!(self, Self::Wait)
    }
}

// ---------------------------------------------------------------------------
// ShaderProfiles
// ---------------------------------------------------------------------------

/// Target compilation profile per stage, as understood by the compiler backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderProfiles {
    pub geometry: String,
    pub pixel: String,
    pub vertex: String,
}

impl Default for ShaderProfiles {
    fn default() -> Self {
        Self {
            geometry: "gs_5_0".to_owned(),
            pixel: "ps_5_0".to_owned(),
            vertex: "vs_5_0".to_owned(),
        }
    }
}

impl ShaderProfiles {
    #[must_use]
    pub fn for_stage(&self, stage: ShaderStage) -> &str {
        match stage {
            ShaderStage::Geometry => &self.geometry,
            ShaderStage::Pixel => &self.pixel,
            ShaderStage::Vertex => &self.vertex,
        }
    }
}

// ---------------------------------------------------------------------------
// ShaderCacheSettings
// ---------------------------------------------------------------------------

/// Configuration for shader cache initialization.
///
/// # Fields
///
/// | Field                     | Description                                   | Default             |
/// |---------------------------|-----------------------------------------------|---------------------|
/// | `cache_dir`               | Directory holding the per-stage cache files   | `shader_cache`      |
/// | `dump_dir`                | Directory for failed-compile dumps            | `dump`              |
/// | `unique_id`               | Per-content identifier scoping cache files    | `default`           |
/// | `cache_version`           | Version tag; a mismatch discards cache files  | crate version       |
/// | `enable_shader_debugging` | Discard disk caches, keep source on entries   | `false`             |
/// | `validate_uids`           | Check UID ⇔ source consistency                | debug builds only   |
/// | `readiness`               | `is_ready` policy                             | `Wait`              |
/// | `compiler_threads`        | Worker count, `0` = derive from the machine   | `0`                 |
/// | `profiles`                | Target profile per stage                      | `*_5_0`             |
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderCacheSettings {
    // === Locations ===
    pub cache_dir: PathBuf,
    pub dump_dir: PathBuf,
    /// Identifier of the running content; two titles never share cache files.
    pub unique_id: String,
    /// Hashed into every cache file header. Bump it whenever generated
    /// bytecode would change for an unchanged UID.
    pub cache_version: String,

    // === Debugging ===
    /// Forces full recompilation each session and keeps the generated source
    /// on every entry.
    pub enable_shader_debugging: bool,
    pub validate_uids: bool,

    // === Scheduling ===
    pub readiness: ReadinessPolicy,
    pub compiler_threads: usize,

    pub profiles: ShaderProfiles,
}

impl Default for ShaderCacheSettings {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("shader_cache"),
            dump_dir: PathBuf::from("dump"),
            unique_id: "default".to_owned(),
            cache_version: env!("CARGO_PKG_VERSION").to_owned(),
            enable_shader_debugging: false,
            validate_uids: cfg!(debug_assertions),
            readiness: ReadinessPolicy::default(),
            compiler_threads: 0,
            profiles: ShaderProfiles::default(),
        }
    }
}

impl ShaderCacheSettings {
    /// Settings rooted at `cache_dir`, with dumps going to `cache_dir/dump`.
    #[must_use]
    pub fn new(cache_dir: impl Into<PathBuf>, unique_id: impl Into<String>) -> Self {
        let cache_dir = cache_dir.into();
        Self {
            dump_dir: cache_dir.join("dump"),
            cache_dir,
            unique_id: unique_id.into(),
            ..Default::default()
        }
    }

    /// Path of the append-only cache file for `stage`.
    ///
    /// The `IDX11` prefix keeps files interchangeable with the D3D11 backend,
    /// which generates identical bytecode.
    #[must_use]
    pub fn cache_file(&self, stage: ShaderStage) -> PathBuf {
        self.cache_dir.join(format!(
            "IDX11-{}-{}.cache",
            self.unique_id,
            stage.short_name()
        ))
    }

    #[must_use]
    pub fn dump_dir(&self) -> &Path {
        &self.dump_dir
    }

    /// Number of compiler worker threads to spawn. Always at least one.
    #[must_use]
    pub fn effective_compiler_threads(&self) -> usize {
        if self.compiler_threads > 0 {
            return self.compiler_threads;
        }
        std::thread::available_parallelism()
            .map_or(1, |n| n.get().saturating_sub(1))
            .max(1)
    }
}
