//! Shader UIDs and stage identifiers.
//!
//! A UID is a plain-old-data snapshot of exactly the graphics state that
//! influences the generated source of one stage. Equal UIDs must produce
//! identical source; [`UidChecker`](super::uid_checker::UidChecker) can verify
//! this in debug sessions.
//!
//! UIDs are persisted verbatim: the disk cache stores [`bytemuck::bytes_of`]
//! of the UID as the record key, so a UID type must not contain padding or
//! pointers (enforced by the `Pod` bound).

use std::fmt::Debug;
use std::hash::Hash;

/// State key for one shader stage.
///
/// Implemented by the UID types of the embedding renderer. The only behaviour
/// the cache asks of a UID beyond identity is [`is_passthrough`](Self::is_passthrough),
/// which geometry-stage UIDs use to signal that no geometry shader is needed.
pub trait ShaderUid: bytemuck::Pod + Eq + Ord + Hash + Debug + Send + Sync + 'static {
    /// Returns `true` when this configuration needs no processing at this stage.
    #[inline]
    fn is_passthrough(&self) -> bool {
        false
    }

    /// Raw key bytes as written to the disk cache.
    #[inline]
    fn key_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Rebuilds a UID from persisted key bytes. Returns `None` on size mismatch.
    #[inline]
    fn from_key_bytes(bytes: &[u8]) -> Option<Self> {
        bytemuck::try_pod_read_unaligned(bytes).ok()
    }
}

/// Programmable pipeline position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Geometry,
    Pixel,
    Vertex,
}

impl ShaderStage {
    pub const ALL: [ShaderStage; 3] = [Self::Geometry, Self::Pixel, Self::Vertex];

    /// Short tag used in cache file names and failure dumps (`gs`, `ps`, `vs`).
    #[inline]
    #[must_use]
    pub fn short_name(self) -> &'static str {
        match self {
            Self::Geometry => "gs",
            Self::Pixel => "ps",
            Self::Vertex => "vs",
        }
    }

    /// Human readable name used in alerts and log lines.
    #[inline]
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Geometry => "geometry",
            Self::Pixel => "pixel",
            Self::Vertex => "vertex",
        }
    }

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Which caller is driving [`ShaderCache::prepare_shaders`](super::ShaderCache::prepare_shaders).
///
/// Each context keeps its own last-seen UIDs, so speculative warm-up on an
/// auxiliary thread never masks a state change on the submission thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionContext {
    /// The thread that owns live draw submission.
    Submission,
    /// Any other caller doing precomputation.
    Auxiliary,
}

impl ExecutionContext {
    #[inline]
    #[must_use]
    pub fn is_submission(self) -> bool {
        matches!(self, Self::Submission)
    }
}

/// Primitive class rasterised by the current draw.
///
/// Always `Triangle` unless a geometry shader expands lines or points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    #[default]
    Triangle,
    Line,
    Point,
}
