#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod errors;
pub mod settings;
pub mod shader;
pub mod stats;

pub use errors::{Result, ShaderCacheError};
pub use settings::{ReadinessPolicy, ShaderCacheSettings, ShaderProfiles};
pub use shader::{
    ByteCodeEntry, CompileWorkUnit, EntryState, ExecutionContext, PrimitiveTopology, ShaderCache,
    ShaderCompiler, ShaderGenerator, ShaderStage, ShaderUid,
};
pub use stats::{ShaderCacheStats, StageStats};
