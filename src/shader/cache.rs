//! Shader Cache Facade
//!
//! Ties the per-stage caches, the disk caches and the async compiler into the
//! per-draw protocol used by the renderer.
//!
//! # Per-draw protocol
//!
//! 1. The renderer calls [`ShaderCache::prepare_shaders`] with the current
//!    graphics state. On the submission context, finished compiles are
//!    drained first so their bytecode is visible to this draw.
//! 2. The three stage UIDs are compared against the calling context's memo.
//!    If none changed, the call returns without touching any cache.
//! 3. Each changed stage is looked up (or inserted); the first caller to see a
//!    fresh entry generates its source and submits the compile.
//! 4. Before drawing, the renderer asks [`ShaderCache::is_ready`], which
//!    either waits for the active shaders or reports immediately, depending on
//!    the [`ReadinessPolicy`].
//!
//! # Two-Context Memo
//!
//! | Context      | Drains completions | Sets pipeline dirty | Active shaders used by renderer |
//! |--------------|--------------------|---------------------|---------------------------------|
//! | `Submission` | ✅                 | ✅                  | ✅                              |
//! | `Auxiliary`  | ❌                 | ❌                  | ❌                              |
//!
//! Both contexts share the stage caches, so auxiliary warm-up still saves the
//! submission context a compile.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use parking_lot::Mutex;

use super::compiler::{AsyncCompiler, CompileFlags, CompileWorkUnit, CompletedUnit, ShaderCompiler};
use super::diagnostics::{AlertHandler, FailureDumper, LogAlertHandler, compile_failure_message};
use super::disk_cache::LinearDiskCache;
use super::entry::ByteCodeEntry;
use super::generator::ShaderGenerator;
use super::stage_cache::StageCache;
use super::tracker::UidChangeTracker;
use super::uid::{ExecutionContext, PrimitiveTopology, ShaderStage, ShaderUid};
use super::uid_checker::UidChecker;
use crate::errors::{Result, ShaderCacheError};
use crate::settings::{ReadinessPolicy, ShaderCacheSettings};
use crate::stats::{ShaderCacheStats, StageCounters};

// ─── Per-stage state ─────────────────────────────────────────────────────────

struct StageState<U: ShaderUid> {
    stage: ShaderStage,
    cache: StageCache<U>,
    // Touched only by init, shutdown and the completion path.
    disk: Mutex<Option<LinearDiskCache<U>>>,
    checker: Mutex<UidChecker<U>>,
    counters: StageCounters,
}

impl<U: ShaderUid> StageState<U> {
    fn open(stage: ShaderStage, settings: &ShaderCacheSettings) -> Self {
        let state = Self {
            stage,
            cache: StageCache::new(),
            disk: Mutex::new(None),
            checker: Mutex::new(UidChecker::new(stage)),
            counters: StageCounters::default(),
        };

        let path = settings.cache_file(stage);
        let version = &settings.cache_version;
        let opened = if settings.enable_shader_debugging {
            // Stale bytecode would hide changes to the generated source.
            LinearDiskCache::create_truncated(&path, version)
        } else {
            LinearDiskCache::open_and_load(&path, version, |uid, bytecode| {
                state.cache.insert_compiled(&uid, bytecode);
            })
        };

        match opened {
            Ok(disk) => {
                state.counters.set_loaded_from_disk(disk.num_entries());
                log::info!(
                    "Loaded {} {stage} shaders from {}",
                    disk.num_entries(),
                    path.display()
                );
                *state.disk.lock() = Some(disk);
            }
            Err(err) => {
                log::warn!("{err}; {stage} shaders will not be persisted this session");
            }
        }
        state
    }

    fn close(&self) {
        if let Some(mut disk) = self.disk.lock().take()
            && let Err(err) = disk.close()
        {
            log::warn!("Failed to close {} shader cache: {err}", self.stage);
        }
        self.checker.lock().invalidate();
    }
}

// ─── Per-context state ───────────────────────────────────────────────────────

struct StageSlot<U> {
    tracker: UidChangeTracker<U>,
    active: Option<Arc<ByteCodeEntry>>,
}

impl<U> Default for StageSlot<U> {
    fn default() -> Self {
        Self {
            tracker: UidChangeTracker::default(),
            active: None,
        }
    }
}

struct ContextState<G: ShaderGenerator> {
    geometry: StageSlot<G::GeometryUid>,
    pixel: StageSlot<G::PixelUid>,
    vertex: StageSlot<G::VertexUid>,
}

impl<G: ShaderGenerator> Default for ContextState<G> {
    fn default() -> Self {
        Self {
            geometry: StageSlot::default(),
            pixel: StageSlot::default(),
            vertex: StageSlot::default(),
        }
    }
}

/// Completion tag: which entry a finished compile belongs to.
enum PendingCompile<G: ShaderGenerator> {
    Geometry(G::GeometryUid, Arc<ByteCodeEntry>),
    Pixel(G::PixelUid, Arc<ByteCodeEntry>),
    Vertex(G::VertexUid, Arc<ByteCodeEntry>),
}

// ─── ShaderCache ─────────────────────────────────────────────────────────────

/// Asynchronous bytecode cache for the geometry, pixel and vertex stages.
///
/// One instance per process, shared by reference between the submission
/// thread and any auxiliary threads. See the [module docs](self).
pub struct ShaderCache<G: ShaderGenerator> {
    settings: ShaderCacheSettings,
    generator: G,
    compiler: AsyncCompiler<PendingCompile<G>>,
    alerts: Arc<dyn AlertHandler>,
    dumper: FailureDumper,

    geometry: StageState<G::GeometryUid>,
    pixel: StageState<G::PixelUid>,
    vertex: StageState<G::VertexUid>,
    passthrough: Arc<ByteCodeEntry>,

    submission: Mutex<ContextState<G>>,
    auxiliary: Mutex<ContextState<G>>,

    pipeline_dirty: AtomicBool,
    topology: AtomicU8,
    shut_down: bool,
}

impl<G: ShaderGenerator> ShaderCache<G> {
    /// Opens the disk caches and starts the compiler workers.
    ///
    /// Unusable cache files are logged and leave the stage with an empty,
    /// non-persistent cache; only failing to spawn worker threads is an error.
    pub fn init(
        settings: ShaderCacheSettings,
        generator: G,
        compiler: Arc<dyn ShaderCompiler>,
    ) -> Result<Self> {
        Self::init_with_alerts(settings, generator, compiler, Arc::new(LogAlertHandler))
    }

    /// Like [`init`](Self::init), routing user-visible warnings to `alerts`.
    pub fn init_with_alerts(
        settings: ShaderCacheSettings,
        generator: G,
        compiler: Arc<dyn ShaderCompiler>,
        alerts: Arc<dyn AlertHandler>,
    ) -> Result<Self> {
        if let Err(err) = std::fs::create_dir_all(&settings.cache_dir) {
            log::warn!(
                "Could not create shader cache directory {}: {err}",
                settings.cache_dir.display()
            );
        }

        let geometry = StageState::open(ShaderStage::Geometry, &settings);
        let pixel = StageState::open(ShaderStage::Pixel, &settings);
        let vertex = StageState::open(ShaderStage::Vertex, &settings);

        let compiler = AsyncCompiler::new(compiler, settings.effective_compiler_threads())?;
        let dumper = FailureDumper::new(settings.dump_dir());

        Ok(Self {
            settings,
            generator,
            compiler,
            alerts,
            dumper,
            geometry,
            pixel,
            vertex,
            passthrough: Arc::new(ByteCodeEntry::compiled(Vec::new())),
            submission: Mutex::new(ContextState::default()),
            auxiliary: Mutex::new(ContextState::default()),
            pipeline_dirty: AtomicBool::new(false),
            topology: AtomicU8::new(topology_to_bits(PrimitiveTopology::Triangle)),
            shut_down: false,
        })
    }

    // ── Per-draw protocol ────────────────────────────────────────────────────

    /// Makes sure bytecode for `state` exists or is being compiled.
    ///
    /// Never blocks on compilation. On the submission context this also
    /// publishes finished compiles, updates the active shaders and marks the
    /// pipeline dirty when any stage changed.
    ///
    /// When no stage UID changed, the only lock taken is the calling
    /// context's memo mutex. It is uncontended for the submission context,
    /// which has a single caller. Stage caches and disk caches are not touched.
    pub fn prepare_shaders(&self, state: &G::State, context: ExecutionContext) {
        let gs_uid = self.generator.geometry_uid(state);
        let ps_uid = self.generator.pixel_uid(state);
        let vs_uid = self.generator.vertex_uid(state);

        let submission = context.is_submission();
        let mut slots = if submission {
            self.drain_completed();
            self.topology.store(
                topology_to_bits(self.generator.primitive_topology(state)),
                Ordering::Relaxed,
            );
            self.submission.lock()
        } else {
            self.auxiliary.lock()
        };

        let gs_changed = slots.geometry.tracker.update(gs_uid);
        let ps_changed = slots.pixel.tracker.update(ps_uid);
        let vs_changed = slots.vertex.tracker.update(vs_uid);
        if !gs_changed && !ps_changed && !vs_changed {
            return;
        }

        if submission {
            // Consumed by the renderer's next pipeline-state application.
            self.pipeline_dirty.store(true, Ordering::Release);
            if self.settings.validate_uids {
                self.validate_uids(state, [gs_changed, ps_changed, vs_changed], &gs_uid, &ps_uid, &vs_uid);
            }
        }

        if gs_changed {
            if gs_uid.is_passthrough() {
                slots.geometry.active = Some(Arc::clone(&self.passthrough));
            } else {
                self.handle_change(
                    &self.geometry,
                    &mut slots.geometry,
                    gs_uid,
                    || self.generator.generate_geometry_source(state),
                    PendingCompile::Geometry,
                );
            }
        }
        if ps_changed {
            self.handle_change(
                &self.pixel,
                &mut slots.pixel,
                ps_uid,
                || self.generator.generate_pixel_source(state),
                PendingCompile::Pixel,
            );
        }
        if vs_changed {
            self.handle_change(
                &self.vertex,
                &mut slots.vertex,
                vs_uid,
                || self.generator.generate_vertex_source(state),
                PendingCompile::Vertex,
            );
        }
    }

    /// Whether the submission context's active shaders are all compiled,
    /// using the configured [`ReadinessPolicy`].
    pub fn is_ready(&self) -> bool {
        self.is_ready_with(self.settings.readiness)
    }

    /// Like [`is_ready`](Self::is_ready) with an explicit policy.
    ///
    /// With [`ReadinessPolicy::Wait`] this spins until the shaders compile.
    /// It gives up early, returning `false`, if one of them failed to compile.
    pub fn is_ready_with(&self, policy: ReadinessPolicy) -> bool {
        let active = {
            let slots = self.submission.lock();
            (
                slots.geometry.active.clone(),
                slots.pixel.active.clone(),
                slots.vertex.active.clone(),
            )
        };
        let (Some(gs), Some(ps), Some(vs)) = active else {
            return false;
        };
        let entries = [gs, ps, vs];
        let all_compiled = || entries.iter().all(|e| e.is_compiled());

        let mut spins = 0u32;
        while !all_compiled() {
            self.drain_completed();
            if !policy.waits() || entries.iter().any(|e| e.is_failed()) {
                break;
            }
            backoff(spins);
            spins = spins.saturating_add(1);
        }
        all_compiled()
    }

    /// Publishes every compile finished since the last call.
    ///
    /// Submission context only. Called implicitly by
    /// [`prepare_shaders`](Self::prepare_shaders) and [`is_ready`](Self::is_ready);
    /// renderers that skip draws should still call it once per frame.
    pub fn drain_completed(&self) -> usize {
        self.compiler.drain_completed(|done| {
            let CompletedUnit { unit, tag, result } = done;
            match tag {
                PendingCompile::Geometry(uid, entry) => {
                    self.finish_compile(&self.geometry, &uid, &entry, unit, result);
                }
                PendingCompile::Pixel(uid, entry) => {
                    self.finish_compile(&self.pixel, &uid, &entry, unit, result);
                }
                PendingCompile::Vertex(uid, entry) => {
                    self.finish_compile(&self.vertex, &uid, &entry, unit, result);
                }
            }
        })
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    /// Entry bound as active for `stage` on the submission context.
    #[must_use]
    pub fn active_entry(&self, stage: ShaderStage) -> Option<Arc<ByteCodeEntry>> {
        let slots = self.submission.lock();
        match stage {
            ShaderStage::Geometry => slots.geometry.active.clone(),
            ShaderStage::Pixel => slots.pixel.active.clone(),
            ShaderStage::Vertex => slots.vertex.active.clone(),
        }
    }

    /// Copy of the active bytecode for `stage`; empty while not compiled.
    #[must_use]
    pub fn active_bytecode(&self, stage: ShaderStage) -> Vec<u8> {
        self.active_entry(stage)
            .map(|e| e.bytecode().to_vec())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn active_geometry_uid(&self) -> Option<G::GeometryUid> {
        self.submission.lock().geometry.tracker.last().copied()
    }

    #[must_use]
    pub fn active_pixel_uid(&self) -> Option<G::PixelUid> {
        self.submission.lock().pixel.tracker.last().copied()
    }

    #[must_use]
    pub fn active_vertex_uid(&self) -> Option<G::VertexUid> {
        self.submission.lock().vertex.tracker.last().copied()
    }

    #[must_use]
    pub fn geometry_entry(&self, uid: &G::GeometryUid) -> Option<Arc<ByteCodeEntry>> {
        if uid.is_passthrough() {
            return Some(Arc::clone(&self.passthrough));
        }
        self.geometry.cache.get(uid)
    }

    #[must_use]
    pub fn pixel_entry(&self, uid: &G::PixelUid) -> Option<Arc<ByteCodeEntry>> {
        self.pixel.cache.get(uid)
    }

    #[must_use]
    pub fn vertex_entry(&self, uid: &G::VertexUid) -> Option<Arc<ByteCodeEntry>> {
        self.vertex.cache.get(uid)
    }

    /// Returns and clears the "pipeline needs rebuild" flag.
    pub fn take_pipeline_dirty(&self) -> bool {
        self.pipeline_dirty.swap(false, Ordering::AcqRel)
    }

    #[must_use]
    pub fn is_pipeline_dirty(&self) -> bool {
        self.pipeline_dirty.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn current_primitive_topology(&self) -> PrimitiveTopology {
        topology_from_bits(self.topology.load(Ordering::Relaxed))
    }

    #[must_use]
    pub fn stats(&self) -> ShaderCacheStats {
        ShaderCacheStats {
            geometry: self.geometry.counters.snapshot(self.geometry.cache.len()),
            pixel: self.pixel.counters.snapshot(self.pixel.cache.len()),
            vertex: self.vertex.counters.snapshot(self.vertex.cache.len()),
        }
    }

    /// UID consistency violations found by debug validation so far.
    #[must_use]
    pub fn uid_violations(&self) -> usize {
        self.geometry.checker.lock().violations()
            + self.pixel.checker.lock().violations()
            + self.vertex.checker.lock().violations()
    }

    /// Compiles queued or running on the workers.
    #[must_use]
    pub fn compiles_in_flight(&self) -> usize {
        self.compiler.in_flight()
    }

    #[must_use]
    pub fn settings(&self) -> &ShaderCacheSettings {
        &self.settings
    }

    #[must_use]
    pub fn generator(&self) -> &G {
        &self.generator
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Drops every in-memory entry and both contexts' memos.
    ///
    /// Disk caches are left untouched. Compiles still in flight publish into
    /// their orphaned entries and are still persisted.
    pub fn clear(&self) {
        self.geometry.cache.clear();
        self.pixel.cache.clear();
        self.vertex.cache.clear();
        *self.submission.lock() = ContextState::default();
        *self.auxiliary.lock() = ContextState::default();
    }

    /// Waits out in-flight compiles, persists their results and closes the
    /// disk caches. Idempotent; also runs on drop.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        self.compiler.wait_for_all();
        self.drain_completed();
        self.compiler.shutdown();

        self.clear();
        self.geometry.close();
        self.pixel.close();
        self.vertex.close();
        log::debug!("Shader cache shut down");
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn handle_change<U: ShaderUid>(
        &self,
        stage: &StageState<U>,
        slot: &mut StageSlot<U>,
        uid: U,
        generate_source: impl FnOnce() -> String,
        tag: impl FnOnce(U, Arc<ByteCodeEntry>) -> PendingCompile<G>,
    ) {
        let entry = stage.cache.find_or_create(&uid);
        slot.active = Some(Arc::clone(&entry));

        if entry.test_and_mark_initialized() {
            return;
        }

        let mut unit = CompileWorkUnit::new(
            stage.stage,
            generate_source(),
            self.settings.profiles.for_stage(stage.stage),
        );
        if self.settings.enable_shader_debugging {
            unit.flags |= CompileFlags::DEBUG;
        }

        log::debug!("Compiling {} shader {uid:?}", stage.stage);
        stage.counters.inc_dispatched();
        if !self.compiler.submit(unit, tag(uid, Arc::clone(&entry))) {
            // Nobody will ever publish this entry.
            entry.mark_failed();
            stage.counters.inc_failed();
        }
    }

    fn finish_compile<U: ShaderUid>(
        &self,
        stage: &StageState<U>,
        uid: &U,
        entry: &ByteCodeEntry,
        unit: CompileWorkUnit,
        result: std::result::Result<Vec<u8>, String>,
    ) {
        match result {
            Ok(bytecode) => {
                if !entry.publish(bytecode) {
                    log::debug!("{} shader {uid:?} was already published", stage.stage);
                    return;
                }
                if self.settings.enable_shader_debugging {
                    entry.set_debug_source(unit.source);
                }
                stage.counters.inc_created();

                if let Some(disk) = stage.disk.lock().as_mut()
                    && let Err(err) = disk.append(uid, entry.bytecode())
                {
                    log::warn!("Failed to persist {} shader {uid:?}: {err}", stage.stage);
                }
            }
            Err(diagnostics) => {
                entry.mark_failed();
                stage.counters.inc_failed();
                log::warn!(
                    "{}",
                    ShaderCacheError::CompileFailure {
                        stage: stage.stage,
                        diagnostics: diagnostics.clone(),
                    }
                );

                let dump = self
                    .dumper
                    .dump(stage.stage, &unit.source, &diagnostics)
                    .inspect_err(|err| log::warn!("Failed to write shader dump: {err}"))
                    .ok();
                self.alerts.alert(&compile_failure_message(
                    stage.stage,
                    &unit.target,
                    dump.as_deref(),
                    &diagnostics,
                ));
            }
        }
    }

    fn validate_uids(
        &self,
        state: &G::State,
        changed: [bool; 3],
        gs_uid: &G::GeometryUid,
        ps_uid: &G::PixelUid,
        vs_uid: &G::VertexUid,
    ) {
        // Failures are logged by the checker; cache state is unaffected.
        if changed[0] && !gs_uid.is_passthrough() {
            let source = self.generator.generate_geometry_source(state);
            let _ = self.geometry.checker.lock().add_to_index_and_check(gs_uid, &source);
        }
        if changed[1] {
            let source = self.generator.generate_pixel_source(state);
            let _ = self.pixel.checker.lock().add_to_index_and_check(ps_uid, &source);
        }
        if changed[2] {
            let source = self.generator.generate_vertex_source(state);
            let _ = self.vertex.checker.lock().add_to_index_and_check(vs_uid, &source);
        }
    }
}

impl<G: ShaderGenerator> Drop for ShaderCache<G> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn topology_to_bits(topology: PrimitiveTopology) -> u8 {
    match topology {
        PrimitiveTopology::Triangle => 0,
        PrimitiveTopology::Line => 1,
        PrimitiveTopology::Point => 2,
    }
}

fn topology_from_bits(bits: u8) -> PrimitiveTopology {
    match bits {
        1 => PrimitiveTopology::Line,
        2 => PrimitiveTopology::Point,
        _ => PrimitiveTopology::Triangle,
    }
}

/// Spin, then yield, then sleep, as the wait gets longer.
fn backoff(spins: u32) {
    if spins < 16 {
        std::hint::spin_loop();
    } else if spins < 64 {
        std::thread::yield_now();
    } else {
        std::thread::sleep(std::time::Duration::from_millis(1));
    }
}
