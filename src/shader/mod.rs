//! Shader Cache Subsystem
//!
//! Maps stage UIDs to compiled bytecode, compiling misses on background
//! workers and persisting results across sessions.
//!
//! - [`cache`]: the [`ShaderCache`] facade driven once per draw
//! - [`stage_cache`]: per-stage UID → entry maps
//! - [`entry`]: single-dispatch, publish-once bytecode entries
//! - [`disk_cache`]: append-only on-disk key/value store
//! - [`compiler`]: worker pool and completion queue
//! - [`tracker`] / [`uid_checker`]: change detection and debug validation
//! - [`diagnostics`]: failure dumps and user alerts

pub mod cache;
pub mod compiler;
pub mod diagnostics;
pub mod disk_cache;
pub mod entry;
pub mod generator;
pub mod stage_cache;
pub mod tracker;
pub mod uid;
pub mod uid_checker;

pub use cache::ShaderCache;
pub use compiler::{AsyncCompiler, CompileFlags, CompileWorkUnit, CompletedUnit, ShaderCompiler};
pub use diagnostics::{AlertHandler, FailureDumper, LogAlertHandler};
pub use disk_cache::LinearDiskCache;
pub use entry::{ByteCodeEntry, EntryState};
pub use generator::ShaderGenerator;
pub use stage_cache::StageCache;
pub use tracker::UidChangeTracker;
pub use uid::{ExecutionContext, PrimitiveTopology, ShaderStage, ShaderUid};
pub use uid_checker::UidChecker;
