//! Compile-failure artifacts and user alerts.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use super::uid::ShaderStage;
use crate::errors::Result;

/// Sink for non-fatal, user-visible warnings.
pub trait AlertHandler: Send + Sync + 'static {
    fn alert(&self, message: &str);
}

/// Default sink: forwards alerts to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertHandler;

impl AlertHandler for LogAlertHandler {
    fn alert(&self, message: &str) {
        log::warn!("{message}");
    }
}

impl<F> AlertHandler for F
where
    F: Fn(&str) + Send + Sync + 'static,
{
    fn alert(&self, message: &str) {
        self(message);
    }
}

/// Writes failing source plus diagnostics to `bad_{gs,ps,vs}_NNNN.txt`.
///
/// Numbering is per stage and per session, starting at zero.
#[derive(Debug)]
pub struct FailureDumper {
    dir: PathBuf,
    counters: [AtomicU32; 3],
}

impl FailureDumper {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            counters: Default::default(),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes one artifact and returns its path.
    pub fn dump(&self, stage: ShaderStage, source: &str, diagnostics: &str) -> Result<PathBuf> {
        let index = self.counters[stage.index()].fetch_add(1, Ordering::Relaxed);
        let path = self
            .dir
            .join(format!("bad_{}_{index:04}.txt", stage.short_name()));

        fs::create_dir_all(&self.dir)?;
        let mut file = fs::File::create(&path)?;
        file.write_all(source.as_bytes())?;
        if !source.ends_with('\n') {
            file.write_all(b"\n")?;
        }
        file.write_all(diagnostics.as_bytes())?;
        Ok(path)
    }
}

/// Alert text shown when a stage fails to compile.
#[must_use]
pub fn compile_failure_message(
    stage: ShaderStage,
    profile: &str,
    dump: Option<&Path>,
    diagnostics: &str,
) -> String {
    let dump = dump.map_or_else(
        || "(failed to write shader dump)".to_owned(),
        |p| p.display().to_string(),
    );
    format!(
        "Failed to compile {stage} shader!\n\
         This usually means the GPU or driver does not support the required shader profile.\n\
         The generated source and compiler output were saved to {dump}.\n\n\
         Debug info ({profile}):\n{diagnostics}"
    )
}
