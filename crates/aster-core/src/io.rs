//! The view a codelet gets of its task during `exec`.
//!
//! [`TaskIo`] resolves every socket to the buffer the codelet must use (a
//! zero-copy source, a staged copy, or an owned output) and hands out typed
//! guards over them. Guards lock buffers individually, so a codelet can hold
//! an input and an output at the same time.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::{PoisonError, RwLockReadGuard, RwLockWriteGuard, TryLockError};
use std::time::{Duration, Instant};

use crate::buffer::{Buffer, Element, SharedBuffer};
use crate::error::TaskError;
use crate::module::ModuleRef;
use crate::socket::{Socket, SocketKind};
use crate::stats::PhaseTimer;

/// Socket access and sub-phase timing for one `exec` call.
pub struct TaskIo<'a> {
    module: &'a ModuleRef,
    task: &'a str,
    n_frames: usize,
    sockets: &'a [Socket],
    buffers: &'a [Option<SharedBuffer>],
    timers: RefCell<&'a mut [PhaseTimer]>,
    stats: bool,
}

impl<'a> TaskIo<'a> {
    pub(crate) fn new(
        module: &'a ModuleRef,
        task: &'a str,
        n_frames: usize,
        sockets: &'a [Socket],
        buffers: &'a [Option<SharedBuffer>],
        timers: &'a mut [PhaseTimer],
        stats: bool,
    ) -> Self {
        Self {
            module,
            task,
            n_frames,
            sockets,
            buffers,
            timers: RefCell::new(timers),
            stats,
        }
    }

    /// Returns the owning module.
    pub fn module(&self) -> &ModuleRef {
        self.module
    }

    /// Returns the running task's name.
    pub fn task_name(&self) -> &str {
        self.task
    }

    /// Returns the number of frames packed in each socket buffer.
    pub fn n_frames(&self) -> usize {
        self.n_frames
    }

    /// Returns the task's sockets in declaration order.
    pub fn sockets(&self) -> &[Socket] {
        self.sockets
    }

    /// Returns the index of the socket called `name`.
    pub fn socket_id(&self, name: &str) -> Result<usize, TaskError> {
        self.sockets
            .iter()
            .position(|s| s.name() == name)
            .ok_or_else(|| TaskError::configuration(self.task, format!("no socket '{name}'")))
    }

    /// Borrows an input (or in-out) socket as `&[T]`.
    pub fn input<T: Element>(&self, socket: usize) -> Result<InputRef<'_, T>, TaskError> {
        let s = self.checked::<T>(socket, SocketKind::is_input)?;
        let guard = self.read(socket, s)?;
        Ok(InputRef {
            guard,
            _marker: PhantomData,
        })
    }

    /// Borrows an output (or in-out) socket as `&mut [T]`.
    pub fn output<T: Element>(&self, socket: usize) -> Result<OutputMut<'_, T>, TaskError> {
        let s = self.checked::<T>(socket, SocketKind::is_output)?;
        let guard = self.write(socket, s)?;
        Ok(OutputMut {
            guard,
            _marker: PhantomData,
        })
    }

    /// Borrows any socket's buffer without a type check.
    pub fn buffer(&self, socket: usize) -> Result<RwLockReadGuard<'_, Buffer>, TaskError> {
        let s = self.socket(socket)?;
        self.read(socket, s)
    }

    /// Borrows an output-capable socket's buffer mutably without a type check.
    pub fn buffer_mut(&self, socket: usize) -> Result<RwLockWriteGuard<'_, Buffer>, TaskError> {
        let s = self.socket(socket)?;
        if !s.kind().is_output() {
            return Err(TaskError::Direction {
                socket: s.name().to_string(),
                direction: s.kind(),
            });
        }
        self.write(socket, s)
    }

    /// Accumulates `elapsed` into sub-phase timer `timer`.
    ///
    /// Nothing is recorded while the task's statistics are disabled, but the
    /// timer id is still checked.
    ///
    /// # Errors
    ///
    /// [`TaskError::Configuration`] if no timer was registered under that id.
    pub fn update_timer(&self, timer: usize, elapsed: Duration) -> Result<(), TaskError> {
        let mut timers = self.timers.borrow_mut();
        let count = timers.len();
        let t = timers.get_mut(timer).ok_or_else(|| {
            TaskError::configuration(
                self.task,
                format!("timer {timer} is not registered ({count} timers)"),
            )
        })?;
        if self.stats {
            t.record(elapsed);
        }
        Ok(())
    }

    /// Runs `f` and accounts its wall-clock time into timer `timer`.
    pub fn timed<R>(&self, timer: usize, f: impl FnOnce() -> R) -> Result<R, TaskError> {
        let start = Instant::now();
        let result = f();
        self.update_timer(timer, start.elapsed())?;
        Ok(result)
    }

    fn socket(&self, socket: usize) -> Result<&'a Socket, TaskError> {
        self.sockets.get(socket).ok_or_else(|| {
            TaskError::configuration(self.task, format!("no socket at index {socket}"))
        })
    }

    fn checked<T: Element>(
        &self,
        socket: usize,
        direction_ok: fn(SocketKind) -> bool,
    ) -> Result<&'a Socket, TaskError> {
        let s = self.socket(socket)?;
        if !direction_ok(s.kind()) {
            return Err(TaskError::Direction {
                socket: s.name().to_string(),
                direction: s.kind(),
            });
        }
        if s.data_type() != T::DATA_TYPE {
            return Err(s.element_mismatch::<T>());
        }
        Ok(s)
    }

    fn resolved(&self, socket: usize, s: &Socket) -> Result<&SharedBuffer, TaskError> {
        self.buffers
            .get(socket)
            .and_then(Option::as_ref)
            .ok_or_else(|| TaskError::NotReady {
                task: self.task.to_string(),
                socket: s.name().to_string(),
            })
    }

    fn read(&self, socket: usize, s: &Socket) -> Result<RwLockReadGuard<'_, Buffer>, TaskError> {
        try_read(self.resolved(socket, s)?, s.name())
    }

    fn write(&self, socket: usize, s: &Socket) -> Result<RwLockWriteGuard<'_, Buffer>, TaskError> {
        try_write(self.resolved(socket, s)?, s.name())
    }
}

/// Read-locks `buffer` without blocking; a held write lock is [`TaskError::Busy`].
pub(crate) fn try_read<'b>(
    buffer: &'b SharedBuffer,
    socket: &str,
) -> Result<RwLockReadGuard<'b, Buffer>, TaskError> {
    match buffer.try_read() {
        Ok(guard) => Ok(guard),
        Err(TryLockError::Poisoned(e)) => Ok(e.into_inner()),
        Err(TryLockError::WouldBlock) => Err(TaskError::Busy {
            socket: socket.to_string(),
        }),
    }
}

/// Write-locks `buffer` without blocking; any held lock is [`TaskError::Busy`].
pub(crate) fn try_write<'b>(
    buffer: &'b SharedBuffer,
    socket: &str,
) -> Result<RwLockWriteGuard<'b, Buffer>, TaskError> {
    match buffer.try_write() {
        Ok(guard) => Ok(guard),
        Err(TryLockError::Poisoned(e)) => Ok(PoisonError::into_inner(e)),
        Err(TryLockError::WouldBlock) => Err(TaskError::Busy {
            socket: socket.to_string(),
        }),
    }
}

/// Read guard over a typed input buffer.
pub struct InputRef<'a, T: Element> {
    guard: RwLockReadGuard<'a, Buffer>,
    _marker: PhantomData<T>,
}

impl<T: Element> Deref for InputRef<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        // The element type was checked when the guard was created.
        T::slice(&self.guard).unwrap_or_default()
    }
}

/// Write guard over a typed output buffer.
pub struct OutputMut<'a, T: Element> {
    guard: RwLockWriteGuard<'a, Buffer>,
    _marker: PhantomData<T>,
}

impl<T: Element> Deref for OutputMut<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        T::slice(&self.guard).unwrap_or_default()
    }
}

impl<T: Element> DerefMut for OutputMut<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        T::slice_mut(&mut self.guard).unwrap_or_default()
    }
}
