//! Background shader compilation.
//!
//! [`AsyncCompiler`] owns a small pool of worker threads fed through a
//! `flume` channel. Finished units are pushed onto a completion queue and
//! stay there until the submission context calls
//! [`drain_completed`](AsyncCompiler::drain_completed); nothing is published
//! from a worker thread.
//!
//! Each unit carries an opaque tag chosen by the submitter (the facade uses
//! the originating UID and entry handle), so completion handling needs no
//! captured closures.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::JoinHandle;

use bitflags::bitflags;
use parking_lot::{Condvar, Mutex};

use super::uid::ShaderStage;
use crate::errors::Result;

bitflags! {
    /// Flags forwarded to the compiler backend.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CompileFlags: u32 {
        const DEBUG = 1 << 0;
        const SKIP_VALIDATION = 1 << 1;
        const OPTIMIZATION_LEVEL3 = 1 << 15;
        const ENABLE_BACKWARDS_COMPATIBILITY = 1 << 12;
    }
}

/// A single compile request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileWorkUnit {
    pub stage: ShaderStage,
    pub source: String,
    pub entry_point: String,
    /// Target profile, e.g. `ps_5_0`.
    pub target: String,
    pub flags: CompileFlags,
}

impl CompileWorkUnit {
    /// A unit with the default entry point (`main`) and flags for `stage`.
    #[must_use]
    pub fn new(stage: ShaderStage, source: String, target: impl Into<String>) -> Self {
        let mut flags = CompileFlags::SKIP_VALIDATION | CompileFlags::OPTIMIZATION_LEVEL3;
        if stage == ShaderStage::Vertex {
            flags |= CompileFlags::ENABLE_BACKWARDS_COMPATIBILITY;
        }
        Self {
            stage,
            source,
            entry_point: "main".to_owned(),
            target: target.into(),
            flags,
        }
    }
}

/// Compiler backend turning source into bytecode.
///
/// Called concurrently from worker threads. On failure return the
/// backend's diagnostic text.
pub trait ShaderCompiler: Send + Sync + 'static {
    fn compile(&self, unit: &CompileWorkUnit) -> std::result::Result<Vec<u8>, String>;
}

impl<F> ShaderCompiler for F
where
    F: Fn(&CompileWorkUnit) -> std::result::Result<Vec<u8>, String> + Send + Sync + 'static,
{
    fn compile(&self, unit: &CompileWorkUnit) -> std::result::Result<Vec<u8>, String> {
        self(unit)
    }
}

/// A finished unit waiting to be drained.
#[derive(Debug)]
pub struct CompletedUnit<T> {
    pub unit: CompileWorkUnit,
    pub tag: T,
    pub result: std::result::Result<Vec<u8>, String>,
}

struct Job<T> {
    unit: CompileWorkUnit,
    tag: T,
}

#[derive(Default)]
struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    fn begin(&self) {
        *self.count.lock() += 1;
    }

    fn finish(&self) {
        let mut count = self.count.lock();
        *count -= 1;
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

pub struct AsyncCompiler<T> {
    jobs: Option<flume::Sender<Job<T>>>,
    completed: flume::Receiver<CompletedUnit<T>>,
    in_flight: Arc<InFlight>,
    workers: Vec<JoinHandle<()>>,
}

impl<T: Send + 'static> AsyncCompiler<T> {
    /// Spawns `threads` workers (at least one) compiling with `backend`.
    pub fn new(backend: Arc<dyn ShaderCompiler>, threads: usize) -> Result<Self> {
        let (job_tx, job_rx) = flume::unbounded::<Job<T>>();
        let (done_tx, done_rx) = flume::unbounded();
        let in_flight = Arc::new(InFlight::default());

        let threads = threads.max(1);
        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let job_rx = job_rx.clone();
            let done_tx = done_tx.clone();
            let backend = Arc::clone(&backend);
            let in_flight = Arc::clone(&in_flight);
            let handle = std::thread::Builder::new()
                .name(format!("shader-compiler-{index}"))
                .spawn(move || worker_loop(&*backend, &job_rx, &done_tx, &in_flight))?;
            workers.push(handle);
        }
        log::debug!("Started {threads} shader compiler worker(s)");

        Ok(Self {
            jobs: Some(job_tx),
            completed: done_rx,
            in_flight,
            workers,
        })
    }

    /// Queues `unit` for compilation. Returns `false` once shut down.
    pub fn submit(&self, unit: CompileWorkUnit, tag: T) -> bool {
        let Some(jobs) = self.jobs.as_ref() else {
            log::warn!("Dropping {} shader compile: compiler is shut down", unit.stage);
            return false;
        };
        self.in_flight.begin();
        if jobs.send(Job { unit, tag }).is_err() {
            self.in_flight.finish();
            return false;
        }
        true
    }

    /// Hands every unit finished since the last drain to `handler`.
    ///
    /// Must only be called from the submission context. Returns the number of
    /// units handled.
    pub fn drain_completed(&self, mut handler: impl FnMut(CompletedUnit<T>)) -> usize {
        let mut handled = 0;
        for done in self.completed.try_iter() {
            handler(done);
            handled += 1;
        }
        handled
    }

    /// Blocks until no unit is queued or compiling. Finished units are left
    /// on the completion queue.
    pub fn wait_for_all(&self) {
        let mut count = self.in_flight.count.lock();
        while *count > 0 {
            self.in_flight.idle.wait(&mut count);
        }
    }

    /// Units queued or compiling.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        *self.in_flight.count.lock()
    }

    /// Units finished but not yet drained.
    #[must_use]
    pub fn completed_len(&self) -> usize {
        self.completed.len()
    }

    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Lets queued work finish, then stops and joins the workers.
    pub fn shutdown(&mut self) {
        self.jobs = None;
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("Shader compiler worker panicked");
            }
        }
    }
}

impl<T> Drop for AsyncCompiler<T> {
    fn drop(&mut self) {
        self.jobs = None;
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop<T>(
    backend: &dyn ShaderCompiler,
    jobs: &flume::Receiver<Job<T>>,
    completed: &flume::Sender<CompletedUnit<T>>,
    in_flight: &InFlight,
) {
    while let Ok(Job { unit, tag }) = jobs.recv() {
        let result = catch_unwind(AssertUnwindSafe(|| backend.compile(&unit)))
            .unwrap_or_else(|_| Err("shader compiler backend panicked".to_owned()));
        // Queue the result before releasing the in-flight count so that
        // `wait_for_all` followed by a drain observes it.
        let _ = completed.send(CompletedUnit { unit, tag, result });
        in_flight.finish();
    }
}
