//! Error Types
//!
//! This module defines the error types used throughout the shader cache.
//!
//! # Overview
//!
//! None of these errors ever reach the renderer from the per-frame path.
//! [`ShaderCache::prepare_shaders`](crate::ShaderCache::prepare_shaders) and
//! [`ShaderCache::is_ready`](crate::ShaderCache::is_ready) contain every
//! failure; the renderer only observes "not compiled yet". The error type is
//! surfaced by the lower-level building blocks ([`LinearDiskCache`],
//! [`UidChecker`]) and in log output.
//!
//! [`LinearDiskCache`]: crate::shader::disk_cache::LinearDiskCache
//! [`UidChecker`]: crate::shader::uid_checker::UidChecker

use std::path::PathBuf;

use thiserror::Error;

use crate::shader::ShaderStage;

/// The main error type for the shader cache.
#[derive(Error, Debug)]
pub enum ShaderCacheError {
    // ========================================================================
    // I/O Errors
    // ========================================================================
    /// File I/O error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    // ========================================================================
    // Disk Cache Errors
    // ========================================================================
    /// The cache file could not be opened or read. The stage starts empty.
    #[error("Disk cache unavailable at {path}: {source}")]
    DiskCacheUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The cache file was written by an incompatible build and was discarded.
    #[error("Disk cache header mismatch in {path}")]
    DiskCacheHeaderMismatch { path: PathBuf },

    /// A record could not be decoded. Replay stops at `offset`.
    #[error("Corrupt disk cache record at offset {offset}")]
    CorruptRecord { offset: u64 },

    // ========================================================================
    // Compilation Errors
    // ========================================================================
    /// The compiler backend rejected the generated source.
    #[error("Failed to compile {stage} shader: {diagnostics}")]
    CompileFailure {
        stage: ShaderStage,
        diagnostics: String,
    },

    // ========================================================================
    // Debug Validation Errors
    // ========================================================================
    /// Equal UIDs produced different source, or different UIDs the same source.
    #[error("{stage} shader UID collision: {detail}")]
    UidCollision { stage: ShaderStage, detail: String },
}

/// Alias for `Result<T, ShaderCacheError>`.
pub type Result<T> = std::result::Result<T, ShaderCacheError>;
