//! Tasks: atomic executable units of the dataflow graph.
//!
//! A task is described once with a [`TaskBuilder`] (sockets, codelet, sub-phase
//! timers) and is immutable in shape afterwards. Between executions its input
//! sockets can be rebound freely. [`Task::exec`] stages inputs, runs the
//! codelet, and updates statistics and debug traces.
//!
//! # Zero-copy chaining
//!
//! With `autoalloc` disabled, an input-only socket whose source task is the
//! task that completed immediately before on the same thread (see
//! [`chain`](crate::chain)) is handed to the codelet as the producer's own
//! buffer. Every other input is first copied into the socket's staging buffer.
//! In-out sockets are always staged: their buffer is the one downstream tasks
//! bind to.
//!
//! ```rust
//! use aster_core::{DataType, Module};
//!
//! let module = Module::new("demo");
//! let mut builder = module.task_builder("ramp");
//! let out = builder.create_socket_out("out", 4, DataType::I32)?;
//! builder.create_codelet(move |_, io| {
//!     for (i, x) in io.output::<i32>(out)?.iter_mut().enumerate() {
//!         *x = i as i32;
//!     }
//!     Ok(0)
//! })?;
//! let mut ramp = builder.build();
//! assert_eq!(ramp.exec()?, 0);
//! # Ok::<(), aster_core::TaskError>(())
//! ```

use std::fmt;
use std::ops::Index;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::buffer::{DataType, SharedBuffer};
use crate::chain;
use crate::debug::{DebugOptions, DebugTracer, ExecHook};
use crate::error::TaskError;
use crate::io::{self, TaskIo};
use crate::module::ModuleRef;
use crate::socket::{Socket, SocketKind, SocketOrigin};
use crate::stats::{PhaseTimer, Timing};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(0);

/// Unique identifier of a task within the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// The computation a task runs.
///
/// Receives the owning module and the task's socket view, and returns a status
/// code that is passed through to the caller of [`Task::exec`] untouched.
///
/// A codelet is shared with every [`Task::duplicate`] of its task; state it
/// captures lives behind `Arc`, atomics, or locks.
pub type Codelet = Arc<dyn Fn(&ModuleRef, &TaskIo<'_>) -> Result<i32, TaskError> + Send + Sync>;

/// Runtime flags of a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskOptions {
    /// Allocate input staging buffers up front and always copy inputs.
    pub autoalloc: bool,
    /// Collect timing statistics.
    pub stats: bool,
    /// Skip readiness validation and debug tracing.
    pub fast: bool,
    /// Trace socket contents around each call.
    pub debug: bool,
    /// Bounds and formatting of the trace.
    pub debug_options: DebugOptions,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            autoalloc: true,
            stats: false,
            fast: false,
            debug: false,
            debug_options: DebugOptions::default(),
        }
    }
}

/// Schema-building phase of a task.
///
/// Sockets, the codelet, and sub-phase timers can only be declared here.
pub struct TaskBuilder {
    id: TaskId,
    module: ModuleRef,
    name: String,
    n_frames: usize,
    sockets: Vec<Socket>,
    codelet: Option<Codelet>,
    timers: Vec<PhaseTimer>,
    options: TaskOptions,
}

impl TaskBuilder {
    /// Declares an input socket and returns its index.
    pub fn create_socket_in(
        &mut self,
        name: impl Into<String>,
        n_elmts: usize,
        data_type: DataType,
    ) -> Result<usize, TaskError> {
        self.create_socket(name.into(), SocketKind::In, n_elmts, data_type)
    }

    /// Declares an in-place input/output socket and returns its index.
    pub fn create_socket_in_out(
        &mut self,
        name: impl Into<String>,
        n_elmts: usize,
        data_type: DataType,
    ) -> Result<usize, TaskError> {
        self.create_socket(name.into(), SocketKind::InOut, n_elmts, data_type)
    }

    /// Declares an output socket and returns its index.
    pub fn create_socket_out(
        &mut self,
        name: impl Into<String>,
        n_elmts: usize,
        data_type: DataType,
    ) -> Result<usize, TaskError> {
        self.create_socket(name.into(), SocketKind::Out, n_elmts, data_type)
    }

    fn create_socket(
        &mut self,
        name: String,
        kind: SocketKind,
        n_elmts: usize,
        data_type: DataType,
    ) -> Result<usize, TaskError> {
        if self.sockets.iter().any(|s| s.name() == name) {
            return Err(TaskError::configuration(
                &self.name,
                format!("socket '{name}' already exists"),
            ));
        }
        if n_elmts % self.n_frames != 0 {
            return Err(TaskError::configuration(
                &self.name,
                format!(
                    "socket '{name}' has {n_elmts} elements, not a multiple of {} frames",
                    self.n_frames
                ),
            ));
        }
        let index = self.sockets.len();
        let origin = SocketOrigin {
            task: self.id,
            index,
        };
        self.sockets
            .push(Socket::new(name, kind, data_type, n_elmts, origin));
        Ok(index)
    }

    /// Attaches the codelet. A task has exactly one.
    pub fn create_codelet<F>(&mut self, codelet: F) -> Result<(), TaskError>
    where
        F: Fn(&ModuleRef, &TaskIo<'_>) -> Result<i32, TaskError> + Send + Sync + 'static,
    {
        if self.codelet.is_some() {
            return Err(TaskError::configuration(
                &self.name,
                "a codelet is already attached",
            ));
        }
        self.codelet = Some(Arc::new(codelet));
        Ok(())
    }

    /// Declares a named sub-phase timer and returns its id.
    pub fn register_timer(&mut self, name: impl Into<String>) -> Result<usize, TaskError> {
        let name = name.into();
        if self.timers.iter().any(|t| t.name() == name) {
            return Err(TaskError::configuration(
                &self.name,
                format!("timer '{name}' already registered"),
            ));
        }
        self.timers.push(PhaseTimer::new(name));
        Ok(self.timers.len() - 1)
    }

    /// Overrides the module's frame count for this task. Zero is raised to one.
    ///
    /// # Errors
    ///
    /// [`TaskError::Configuration`] if a socket already declared cannot be
    /// split into that many frames of equal length.
    pub fn set_n_frames(&mut self, n_frames: usize) -> Result<&mut Self, TaskError> {
        let n_frames = n_frames.max(1);
        if let Some(s) = self.sockets.iter().find(|s| s.len() % n_frames != 0) {
            return Err(TaskError::configuration(
                &self.name,
                format!(
                    "socket '{}' has {} elements, not a multiple of {n_frames} frames",
                    s.name(),
                    s.len()
                ),
            ));
        }
        self.n_frames = n_frames;
        Ok(self)
    }

    /// Sets the initial runtime flags.
    pub fn set_options(&mut self, options: TaskOptions) -> &mut Self {
        self.options = options;
        self
    }

    /// Finishes the schema and allocates output buffers.
    pub fn build(self) -> Task {
        let socket_count = self.sockets.len();
        let mut task = Task {
            id: self.id,
            module: self.module,
            name: self.name,
            n_frames: self.n_frames,
            sockets: self.sockets,
            codelet: self.codelet,
            timers: self.timers,
            timing: Timing::default(),
            status: None,
            options: TaskOptions::default(),
            hook: None,
            last_input_socket: None,
            resolved: vec![None; socket_count],
        };
        for socket in &mut task.sockets {
            if socket.kind().is_output() {
                socket.ensure_owned();
            }
        }
        task.apply_options(&self.options);
        #[cfg(feature = "tracing")]
        tracing::debug!(
            "task_build: {}::{} ({} sockets, {} timers)",
            task.module.name(),
            task.name,
            task.sockets.len(),
            task.timers.len()
        );
        task
    }
}

/// An executable unit: sockets, a codelet, statistics, and debug tracing.
pub struct Task {
    id: TaskId,
    module: ModuleRef,
    name: String,
    n_frames: usize,
    sockets: Vec<Socket>,
    codelet: Option<Codelet>,
    timers: Vec<PhaseTimer>,
    timing: Timing,
    status: Option<i32>,
    options: TaskOptions,
    hook: Option<Box<dyn ExecHook>>,
    last_input_socket: Option<usize>,
    /// Per-socket buffers handed to the codelet; only populated during exec.
    resolved: Vec<Option<SharedBuffer>>,
}

impl Task {
    /// Starts the schema of a task owned by `module`.
    pub fn builder(module: &ModuleRef, name: impl Into<String>) -> TaskBuilder {
        TaskBuilder {
            id: TaskId::next(),
            module: module.clone(),
            name: name.into(),
            n_frames: module.n_frames(),
            sockets: Vec::new(),
            codelet: None,
            timers: Vec::new(),
            options: TaskOptions::default(),
        }
    }

    /// Returns a new task with the same schema, codelet, and flags.
    ///
    /// The copy has its own id, freshly zeroed buffers, no bindings, empty
    /// statistics (timer names are kept), and no custom exec hook. Duplicates
    /// are meant to run the same stage on parallel workers.
    pub fn duplicate(&self) -> Task {
        let id = TaskId::next();
        let sockets = self
            .sockets
            .iter()
            .enumerate()
            .map(|(index, s)| s.duplicate(SocketOrigin { task: id, index }))
            .collect();
        let timers = self
            .timers
            .iter()
            .map(|t| PhaseTimer::new(t.name().to_string()))
            .collect();
        let builder = TaskBuilder {
            id,
            module: self.module.clone(),
            name: self.name.clone(),
            n_frames: self.n_frames,
            sockets,
            codelet: self.codelet.clone(),
            timers,
            options: self.options,
        };
        #[cfg(feature = "tracing")]
        tracing::debug!("task_duplicate: {}::{} {} -> {id}", self.module.name(), self.name, self.id);
        builder.build()
    }

    // --- Identity ---

    /// Returns the task identifier.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the task name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the owning module handle.
    pub fn module(&self) -> &ModuleRef {
        &self.module
    }

    /// Returns the number of frames packed in each socket buffer.
    pub fn n_frames(&self) -> usize {
        self.n_frames
    }

    /// Returns true if a codelet is attached.
    pub fn has_codelet(&self) -> bool {
        self.codelet.is_some()
    }

    // --- Sockets ---

    /// Returns the sockets in declaration order.
    pub fn sockets(&self) -> &[Socket] {
        &self.sockets
    }

    /// Returns the socket at `idx`.
    pub fn socket(&self, idx: usize) -> Option<&Socket> {
        self.sockets.get(idx)
    }

    /// Looks a socket up by name.
    pub fn socket_by_name(&self, name: &str) -> Option<&Socket> {
        self.sockets.iter().find(|s| s.name() == name)
    }

    /// Returns the direction of the socket at `idx`.
    pub fn socket_kind(&self, idx: usize) -> Option<SocketKind> {
        self.sockets.get(idx).map(Socket::kind)
    }

    /// Binds input `socket` to the output-capable socket `source` of another task.
    ///
    /// # Errors
    ///
    /// - [`TaskError::Configuration`] if `socket` is out of range.
    /// - [`TaskError::Direction`] if `socket` is output-only or `source` is input-only.
    /// - [`TaskError::TypeMismatch`] if element type or count differ.
    ///
    /// On error the previous binding is unchanged.
    pub fn bind(&mut self, socket: usize, source: &Socket) -> Result<(), TaskError> {
        self.socket_mut(socket)?.bind(source)?;
        self.last_input_socket = Some(socket);
        #[cfg(feature = "tracing")]
        tracing::debug!(
            "task_bind: {}::{}[{}] <- {}[{}]",
            self.module.name(),
            self.name,
            self.sockets[socket].name(),
            source.origin().task,
            source.name()
        );
        Ok(())
    }

    /// Binds input `socket` to a buffer owned by the caller.
    ///
    /// The task only keeps a weak reference; the caller must keep `buffer` alive.
    pub fn bind_buffer(&mut self, socket: usize, buffer: &SharedBuffer) -> Result<(), TaskError> {
        self.socket_mut(socket)?.bind_buffer(buffer)?;
        self.last_input_socket = Some(socket);
        Ok(())
    }

    /// Removes the binding of input `socket`.
    pub fn unbind(&mut self, socket: usize) -> Result<(), TaskError> {
        self.socket_mut(socket)?.unbind();
        if self.last_input_socket == Some(socket) {
            self.last_input_socket = None;
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(
            "task_unbind: {}::{}[{}]",
            self.module.name(),
            self.name,
            self.sockets[socket].name()
        );
        Ok(())
    }

    /// Returns the input socket bound most recently.
    pub fn last_bound_input(&self) -> Option<usize> {
        self.last_input_socket
    }

    /// Returns true if input-only `socket` is bound to the task that completed
    /// immediately before on this thread, i.e. it may be read without copying.
    pub fn is_last_input_socket(&self, socket: usize) -> bool {
        self.sockets.get(socket).is_some_and(|s| {
            s.kind() == SocketKind::In && chained(s.source(), chain::last_executed())
        })
    }

    /// Returns true if every input socket has a live source.
    pub fn can_exec(&self) -> bool {
        self.sockets
            .iter()
            .all(|s| !s.kind().is_input() || s.is_bound())
    }

    fn socket_mut(&mut self, idx: usize) -> Result<&mut Socket, TaskError> {
        let count = self.sockets.len();
        self.sockets.get_mut(idx).ok_or_else(|| {
            TaskError::configuration(
                &self.name,
                format!("no socket at index {idx} ({count} sockets)"),
            )
        })
    }

    // --- Flags ---

    /// Applies every runtime flag at once.
    pub fn apply_options(&mut self, options: &TaskOptions) {
        self.set_autoalloc(options.autoalloc);
        self.set_stats(options.stats);
        self.set_fast(options.fast);
        self.set_debug(options.debug);
        self.options.debug_options = options.debug_options;
    }

    /// Returns the current runtime flags.
    pub fn options(&self) -> &TaskOptions {
        &self.options
    }

    /// Switches input staging policy.
    ///
    /// Enabling allocates a staging buffer for every input-only socket;
    /// disabling releases them (they are reallocated lazily when a copy is needed).
    pub fn set_autoalloc(&mut self, autoalloc: bool) {
        for socket in &mut self.sockets {
            if socket.kind() == SocketKind::In {
                if autoalloc {
                    socket.ensure_owned();
                } else {
                    socket.release_owned();
                }
            }
        }
        self.options.autoalloc = autoalloc;
        #[cfg(feature = "tracing")]
        tracing::debug!("task_autoalloc: {}::{} = {autoalloc}", self.module.name(), self.name);
    }

    /// Enables or disables timing statistics.
    pub fn set_stats(&mut self, stats: bool) {
        self.options.stats = stats;
    }

    /// Enables or disables fast mode.
    pub fn set_fast(&mut self, fast: bool) {
        self.options.fast = fast;
    }

    /// Enables or disables debug tracing, installing a stdout tracer if no hook is set.
    pub fn set_debug(&mut self, debug: bool) {
        if debug && self.hook.is_none() {
            self.hook = Some(Box::new(DebugTracer::stdout()));
        }
        self.options.debug = debug;
    }

    /// Prints traced values in hexadecimal.
    pub fn set_debug_hex(&mut self, hex: bool) {
        self.options.debug_options.hex = hex;
    }

    /// Limits traced elements per frame; `None` removes the limit.
    pub fn set_debug_limit(&mut self, limit: Option<usize>) {
        self.options.debug_options.limit = limit;
    }

    /// Sets the number of decimals of traced floats.
    pub fn set_debug_precision(&mut self, precision: usize) {
        self.options.debug_options.precision = precision;
    }

    /// Limits traced frames per socket; `None` removes the limit.
    pub fn set_debug_frame_max(&mut self, frame_max: Option<usize>) {
        self.options.debug_options.frame_max = frame_max;
    }

    /// Replaces the hook invoked around the codelet when debug is enabled.
    pub fn set_exec_hook(&mut self, hook: Box<dyn ExecHook>) {
        self.hook = Some(hook);
    }

    /// Returns true if input staging buffers are allocated up front.
    pub fn is_autoalloc(&self) -> bool {
        self.options.autoalloc
    }

    /// Returns true if statistics are collected.
    pub fn is_stats(&self) -> bool {
        self.options.stats
    }

    /// Returns true if fast mode is on.
    pub fn is_fast(&self) -> bool {
        self.options.fast
    }

    /// Returns true if debug tracing is on.
    pub fn is_debug(&self) -> bool {
        self.options.debug
    }

    /// Returns true if traces are printed in hexadecimal.
    pub fn is_debug_hex(&self) -> bool {
        self.options.debug_options.hex
    }

    // --- Statistics ---

    /// Returns whole-call timing.
    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// Returns the number of timed calls.
    pub fn n_calls(&self) -> u32 {
        self.timing.n_calls()
    }

    /// Returns the cumulative duration of timed calls.
    pub fn duration_total(&self) -> Duration {
        self.timing.total()
    }

    /// Returns the mean duration of timed calls.
    pub fn duration_avg(&self) -> Duration {
        self.timing.avg()
    }

    /// Returns the shortest timed call.
    pub fn duration_min(&self) -> Duration {
        self.timing.min()
    }

    /// Returns the longest timed call.
    pub fn duration_max(&self) -> Duration {
        self.timing.max()
    }

    /// Returns the sub-phase timers in registration order.
    pub fn timers(&self) -> &[PhaseTimer] {
        &self.timers
    }

    /// Returns the status of the last successful exec.
    pub fn status(&self) -> Option<i32> {
        self.status
    }

    /// Clears statistics and the last status. Timer names stay registered.
    pub fn reset(&mut self) {
        self.timing.reset();
        for timer in &mut self.timers {
            timer.reset();
        }
        self.status = None;
    }

    // --- Execution ---

    /// Runs the codelet once and returns its status.
    ///
    /// # Errors
    ///
    /// - [`TaskError::Configuration`] if no codelet is attached.
    /// - [`TaskError::NotReady`] if an input has no live source.
    /// - Anything the codelet itself propagates.
    ///
    /// A non-zero status is not an error.
    pub fn exec(&mut self) -> Result<i32, TaskError> {
        let codelet = self
            .codelet
            .clone()
            .ok_or_else(|| TaskError::configuration(&self.name, "no codelet attached"))?;
        self.exec_with(|module, io| codelet(module, io))
    }

    /// Runs `body` in place of the codelet, with the full exec pipeline around it.
    pub(crate) fn exec_with<F>(&mut self, body: F) -> Result<i32, TaskError>
    where
        F: FnOnce(&ModuleRef, &TaskIo<'_>) -> Result<i32, TaskError>,
    {
        let fast = self.options.fast;
        if !fast
            && let Some(s) = self
                .sockets
                .iter()
                .find(|s| s.kind().is_input() && !s.is_bound())
        {
            return Err(not_ready(&self.name, s));
        }

        let start = self.options.stats.then(Instant::now);
        let outcome = self.resolve_buffers().and_then(|()| {
            let io = TaskIo::new(
                &self.module,
                &self.name,
                self.n_frames,
                &self.sockets,
                &self.resolved,
                &mut self.timers,
                self.options.stats,
            );
            let debug_options = &self.options.debug_options;
            let mut hook = if self.options.debug && !fast {
                self.hook.as_mut()
            } else {
                None
            };
            if let Some(h) = hook.as_mut() {
                h.before_exec(&io, debug_options);
            }
            let outcome = body(&self.module, &io);
            if let (Some(h), Ok(status)) = (hook, &outcome) {
                h.after_exec(&io, debug_options, *status);
            }
            outcome
        });
        // Never keep a strong handle on a producer's buffer between calls.
        self.resolved.iter_mut().for_each(|r| *r = None);
        let status = outcome?;

        if let Some(start) = start {
            self.timing.record(start.elapsed());
        }
        self.status = Some(status);
        chain::mark_executed(self.id);
        Ok(status)
    }

    /// Fills `resolved` with the buffer the codelet must see for each socket.
    fn resolve_buffers(&mut self) -> Result<(), TaskError> {
        let last = chain::last_executed();
        let autoalloc = self.options.autoalloc;
        for (idx, socket) in self.sockets.iter_mut().enumerate() {
            let buffer = match socket.kind() {
                SocketKind::Out => socket.ensure_owned().clone(),
                kind => {
                    let (origin, source) = match socket.binding() {
                        Some(b) => (b.origin, b.buffer.upgrade()),
                        None => (None, None),
                    };
                    let source = source.ok_or_else(|| not_ready(&self.name, socket))?;
                    if kind == SocketKind::In && !autoalloc && chained(origin, last) {
                        source
                    } else {
                        stage(socket, &source)?
                    }
                }
            };
            self.resolved[idx] = Some(buffer);
        }
        Ok(())
    }
}

/// Copies `source` into the staging buffer of `socket` and returns the staging buffer.
///
/// Never blocks: a buffer locked elsewhere is [`TaskError::Busy`].
fn stage(socket: &mut Socket, source: &SharedBuffer) -> Result<SharedBuffer, TaskError> {
    let shape = socket.shape();
    let name = socket.name().to_string();
    let staging = socket.ensure_owned().clone();
    let src = io::try_read(source, &name)?;
    let mut dst = io::try_write(&staging, &name)?;
    if !dst.copy_from(&src) {
        return Err(TaskError::TypeMismatch {
            socket: name,
            expected: shape,
            found: crate::error::Shape {
                data_type: src.data_type(),
                len: src.len(),
            },
        });
    }
    drop(dst);
    drop(src);
    Ok(staging)
}

fn chained(origin: Option<SocketOrigin>, last: Option<TaskId>) -> bool {
    matches!((origin, last), (Some(o), Some(l)) if o.task == l)
}

fn not_ready(task: &str, socket: &Socket) -> TaskError {
    TaskError::NotReady {
        task: task.to_string(),
        socket: socket.name().to_string(),
    }
}

impl Index<usize> for Task {
    type Output = Socket;

    /// # Panics
    ///
    /// Panics if `idx` is out of range.
    fn index(&self, idx: usize) -> &Socket {
        &self.sockets[idx]
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("module", &self.module.name())
            .field("name", &self.name)
            .field("sockets", &self.sockets)
            .field("options", &self.options)
            .field("timing", &self.timing)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Module;
    use std::sync::{Arc, Mutex};

    fn producer(module: &Module, values: Vec<i32>) -> Task {
        let mut b = module.task_builder("produce");
        let out = b
            .create_socket_out("out", values.len(), DataType::I32)
            .unwrap();
        b.create_codelet(move |_, io| {
            io.output::<i32>(out)?.copy_from_slice(&values);
            Ok(0)
        })
        .unwrap();
        b.build()
    }

    fn summer(module: &Module, len: usize, total: Arc<Mutex<i32>>) -> Task {
        let mut b = module.task_builder("sum");
        let input = b.create_socket_in("in", len, DataType::I32).unwrap();
        b.create_codelet(move |_, io| {
            *total.lock().unwrap() = io.input::<i32>(input)?.iter().sum();
            Ok(0)
        })
        .unwrap();
        b.build()
    }

    #[test]
    fn duplicate_socket_name_rejected() {
        let m = Module::new("m");
        let mut b = m.task_builder("t");
        b.create_socket_in("x", 1, DataType::F32).unwrap();
        assert!(matches!(
            b.create_socket_out("x", 1, DataType::F32),
            Err(TaskError::Configuration { .. })
        ));
    }

    #[test]
    fn second_codelet_rejected() {
        let m = Module::new("m");
        let mut b = m.task_builder("t");
        b.create_codelet(|_, _| Ok(0)).unwrap();
        assert!(b.create_codelet(|_, _| Ok(1)).is_err());
    }

    #[test]
    fn duplicate_timer_rejected() {
        let m = Module::new("m");
        let mut b = m.task_builder("t");
        assert_eq!(b.register_timer("load").unwrap(), 0);
        assert_eq!(b.register_timer("store").unwrap(), 1);
        assert!(b.register_timer("load").is_err());
    }

    #[test]
    fn exec_without_codelet_is_configuration_error() {
        let m = Module::new("m");
        let mut t = m.task_builder("t").build();
        assert!(matches!(t.exec(), Err(TaskError::Configuration { .. })));
    }

    #[test]
    fn not_ready_then_bind_and_retry() {
        let m = Module::new("m");
        let total = Arc::new(Mutex::new(0));
        let mut p = producer(&m, vec![1, 2, 3]);
        let mut c = summer(&m, 3, total.clone());

        assert!(!c.can_exec());
        assert!(matches!(c.exec(), Err(TaskError::NotReady { .. })));

        c.bind(0, &p[0]).unwrap();
        assert!(c.can_exec());
        p.exec().unwrap();
        assert_eq!(c.exec().unwrap(), 0);
        assert_eq!(*total.lock().unwrap(), 6);
    }

    #[test]
    fn codelet_status_is_returned_not_raised() {
        let m = Module::new("m");
        let mut b = m.task_builder("converged");
        b.create_codelet(|_, _| Ok(3)).unwrap();
        let mut t = b.build();
        assert_eq!(t.exec().unwrap(), 3);
        assert_eq!(t.status(), Some(3));
    }

    #[test]
    fn copy_mode_isolates_consumer_from_later_writes() {
        let m = Module::new("m");
        let mut p = producer(&m, vec![1, 1]);
        let mut b = m.task_builder("peek");
        let input = b.create_socket_in("in", 2, DataType::I32).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in = seen.clone();
        b.create_codelet(move |_, io| {
            *seen_in.lock().unwrap() = io.input::<i32>(input)?.to_vec();
            Ok(0)
        })
        .unwrap();
        let mut c = b.build();
        assert!(c.is_autoalloc());
        c.bind(0, &p[0]).unwrap();

        p.exec().unwrap();
        assert!(c.is_last_input_socket(0));
        c.exec().unwrap();
        p[0].with_data_mut::<i32, _>(|d| d.fill(9)).unwrap();

        let staging = c.sockets()[0].owned().unwrap().read().unwrap().clone();
        assert_eq!(staging.as_slice::<i32>(), Some(&[1, 1][..]));
        assert_eq!(*seen.lock().unwrap(), vec![1, 1]);
    }

    #[test]
    fn stats_disabled_records_nothing() {
        let m = Module::new("m");
        let mut p = producer(&m, vec![0; 4]);
        p.exec().unwrap();
        assert_eq!(p.n_calls(), 0);
        p.set_stats(true);
        p.exec().unwrap();
        p.exec().unwrap();
        assert_eq!(p.n_calls(), 2);
        p.reset();
        assert_eq!(p.n_calls(), 0);
        assert_eq!(p.status(), None);
    }

    #[test]
    fn unknown_timer_is_configuration_error() {
        let m = Module::new("m");
        let mut b = m.task_builder("t");
        b.create_codelet(|_, io| {
            io.update_timer(0, Duration::from_micros(1))?;
            Ok(0)
        })
        .unwrap();
        let mut t = b.build();
        assert!(matches!(t.exec(), Err(TaskError::Configuration { .. })));
    }

    #[test]
    fn sub_phase_timers_accumulate() {
        let m = Module::new("m");
        let mut b = m.task_builder("t");
        let load = b.register_timer("load").unwrap();
        let store = b.register_timer("store").unwrap();
        b.create_codelet(move |_, io| {
            io.update_timer(load, Duration::from_micros(5))?;
            io.update_timer(load, Duration::from_micros(7))?;
            io.timed(store, || ())?;
            Ok(0)
        })
        .unwrap();
        let mut t = b.build();
        t.set_stats(true);
        t.exec().unwrap();

        let load_t = t.timers()[load].timing();
        assert_eq!(load_t.n_calls(), 2);
        assert_eq!(load_t.total(), Duration::from_micros(12));
        assert_eq!(load_t.min(), Duration::from_micros(5));
        assert_eq!(load_t.max(), Duration::from_micros(7));
        assert_eq!(t.timers()[store].timing().n_calls(), 1);
    }

    #[test]
    fn fast_mode_still_reports_unbound_input() {
        let m = Module::new("m");
        let mut c = summer(&m, 2, Arc::new(Mutex::new(0)));
        c.set_fast(true);
        assert!(matches!(c.exec(), Err(TaskError::NotReady { .. })));
    }

    #[test]
    fn wrong_accessor_type_propagates() {
        let m = Module::new("m");
        let mut b = m.task_builder("t");
        let out = b.create_socket_out("out", 2, DataType::F32).unwrap();
        b.create_codelet(move |_, io| {
            io.output::<i32>(out)?;
            Ok(0)
        })
        .unwrap();
        let mut t = b.build();
        assert!(matches!(t.exec(), Err(TaskError::TypeMismatch { .. })));
    }

    #[test]
    fn autoalloc_toggle_manages_staging() {
        let m = Module::new("m");
        let mut c = summer(&m, 2, Arc::new(Mutex::new(0)));
        assert!(c.sockets()[0].owned().is_some());
        c.set_autoalloc(false);
        assert!(c.sockets()[0].owned().is_none());
        c.set_autoalloc(true);
        assert!(c.sockets()[0].owned().is_some());
    }

    #[test]
    fn unbind_clears_binding() {
        let m = Module::new("m");
        let p = producer(&m, vec![1, 2]);
        let mut c = summer(&m, 2, Arc::new(Mutex::new(0)));
        c.bind(0, &p[0]).unwrap();
        assert_eq!(c.last_bound_input(), Some(0));
        c.unbind(0).unwrap();
        assert!(!c.can_exec());
        assert_eq!(c.last_bound_input(), None);
        assert!(c.unbind(4).is_err());
    }

    #[test]
    fn resolved_handles_are_released_after_exec() {
        let m = Module::new("m");
        let mut p = producer(&m, vec![1, 2]);
        let mut c = summer(&m, 2, Arc::new(Mutex::new(0)));
        c.set_autoalloc(false);
        c.bind(0, &p[0]).unwrap();
        p.exec().unwrap();
        c.exec().unwrap();
        drop(p);
        assert!(!c.can_exec());
    }

    #[test]
    fn socket_length_must_split_into_frames() {
        let m = Module::with_frames("m", 2);
        let mut b = m.task_builder("t");
        assert!(matches!(
            b.create_socket_in("odd", 5, DataType::I32),
            Err(TaskError::Configuration { .. })
        ));
        b.create_socket_in("even", 6, DataType::I32).unwrap();
        assert!(matches!(b.set_n_frames(4), Err(TaskError::Configuration { .. })));
        b.set_n_frames(3).unwrap();
        assert!(b.create_socket_out("out", 4, DataType::I32).is_err());
        assert_eq!(b.build().n_frames(), 3);
    }

    #[test]
    fn in_out_cannot_be_bound_to_itself() {
        let m = Module::new("m");
        let mut b = m.task_builder("inplace");
        let io = b.create_socket_in_out("io", 2, DataType::I32).unwrap();
        b.create_codelet(|_, _| Ok(0)).unwrap();
        let mut t = b.build();
        let own = t[io].data().unwrap();
        assert!(matches!(
            t.bind_buffer(io, &own),
            Err(TaskError::Configuration { .. })
        ));
        assert!(matches!(t.exec(), Err(TaskError::NotReady { .. })));
    }

    #[test]
    fn locked_source_is_busy_instead_of_blocking() {
        let m = Module::new("m");
        let external: SharedBuffer =
            Arc::new(std::sync::RwLock::new(crate::Buffer::from_slice(&[1i32, 2])));
        let mut c = summer(&m, 2, Arc::new(Mutex::new(0)));
        c.bind_buffer(0, &external).unwrap();

        let guard = external.write().unwrap();
        assert!(matches!(c.exec(), Err(TaskError::Busy { .. })));
        drop(guard);
        assert_eq!(c.exec().unwrap(), 0);
    }

    #[test]
    fn duplicate_has_own_buffers_and_state() {
        let m = Module::new("m");
        let total = Arc::new(Mutex::new(0));
        let mut p = producer(&m, vec![1, 2, 3]);
        let mut c = summer(&m, 3, total.clone());
        c.set_stats(true);
        c.bind(0, &p[0]).unwrap();
        p.exec().unwrap();
        c.exec().unwrap();

        let p2 = p.duplicate();
        let mut c2 = c.duplicate();
        assert_ne!(p2.id(), p.id());
        assert_eq!(p2.name(), "produce");
        assert!(!Arc::ptr_eq(&p2[0].data().unwrap(), &p[0].data().unwrap()));
        assert_eq!(p2[0].with_data::<i32, _>(<[i32]>::to_vec).unwrap(), vec![0, 0, 0]);
        assert!(c2.is_stats());
        assert_eq!(c2.n_calls(), 0);
        assert!(!c2.can_exec());

        c2.bind(0, &p2[0]).unwrap();
        p2[0].with_data_mut::<i32, _>(|d| d.fill(10)).unwrap();
        c2.exec().unwrap();
        assert_eq!(*total.lock().unwrap(), 30);
        assert_eq!(p[0].with_data::<i32, _>(<[i32]>::to_vec).unwrap(), vec![1, 2, 3]);
        assert_eq!(c.n_calls(), 1);
    }

    #[test]
    fn duplicates_run_on_other_threads() {
        let m = Module::new("m");
        let p = producer(&m, vec![4, 5]);
        let workers: Vec<_> = (0..3)
            .map(|_| {
                let mut p = p.duplicate();
                let total = Arc::new(Mutex::new(0));
                let mut c = summer(&m, 2, total.clone());
                c.bind(0, &p[0]).unwrap();
                std::thread::spawn(move || {
                    p.exec().unwrap();
                    c.exec().unwrap();
                    let sum = *total.lock().unwrap();
                    sum
                })
            })
            .collect();
        for worker in workers {
            assert_eq!(worker.join().unwrap(), 9);
        }
    }
}
