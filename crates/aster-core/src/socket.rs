//! Sockets: named, typed binding points on a task.
//!
//! An output-capable socket owns its buffer. An input socket references the
//! buffer of whatever it is bound to through a [`Weak`] handle, so rebinding
//! never moves or copies ownership, and a consumer can never keep a producer's
//! buffer alive on its own. An input may additionally own a private staging
//! buffer that receives a copy of the source when zero-copy chaining does not
//! apply.

use std::fmt;
use std::sync::{Arc, RwLock, Weak};

use crate::buffer::{Buffer, DataType, Element, SharedBuffer};
use crate::error::{Shape, TaskError};
use crate::task::TaskId;

/// Direction of a socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SocketKind {
    /// Read-only input.
    In,
    /// Input updated in place and republished as an output.
    InOut,
    /// Output produced by the task.
    Out,
}

impl SocketKind {
    /// Returns true if the socket reads from a bound source.
    pub fn is_input(self) -> bool {
        matches!(self, Self::In | Self::InOut)
    }

    /// Returns true if other sockets may bind to this one.
    pub fn is_output(self) -> bool {
        matches!(self, Self::Out | Self::InOut)
    }

    /// Returns the tag used in debug traces.
    pub fn tag(self) -> &'static str {
        match self {
            Self::In => "IN",
            Self::InOut => "IN_OUT",
            Self::Out => "OUT",
        }
    }
}

impl fmt::Display for SocketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::In => "input-only",
            Self::InOut => "input-output",
            Self::Out => "output-only",
        })
    }
}

/// Identifies a socket by its task and its index within that task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SocketOrigin {
    /// Task that declared the socket.
    pub task: TaskId,
    /// Declaration index of the socket.
    pub index: usize,
}

/// Where a bound input reads from.
#[derive(Debug)]
pub(crate) struct Binding {
    /// Producing socket, or `None` for an externally supplied buffer.
    pub origin: Option<SocketOrigin>,
    pub buffer: Weak<RwLock<Buffer>>,
}

/// A named, typed, directional binding point attached to exactly one task.
#[derive(Debug)]
pub struct Socket {
    name: String,
    kind: SocketKind,
    data_type: DataType,
    len: usize,
    origin: SocketOrigin,
    /// Output buffer, or the staging copy of an input.
    owned: Option<SharedBuffer>,
    source: Option<Binding>,
}

impl Socket {
    pub(crate) fn new(
        name: String,
        kind: SocketKind,
        data_type: DataType,
        len: usize,
        origin: SocketOrigin,
    ) -> Self {
        Self {
            name,
            kind,
            data_type,
            len,
            origin,
            owned: None,
            source: None,
        }
    }

    /// Returns the socket name, unique within its task.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the socket direction.
    pub fn kind(&self) -> SocketKind {
        self.kind
    }

    /// Returns the element type tag.
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Returns the element count.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the socket holds zero elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the element type and count.
    pub fn shape(&self) -> Shape {
        Shape {
            data_type: self.data_type,
            len: self.len,
        }
    }

    /// Returns the owning task and this socket's index in it.
    pub fn origin(&self) -> SocketOrigin {
        self.origin
    }

    /// Returns true if this is an input whose source buffer is still alive.
    ///
    /// Output-only sockets never need a source and always return false.
    pub fn is_bound(&self) -> bool {
        self.source
            .as_ref()
            .is_some_and(|b| b.buffer.strong_count() > 0)
    }

    /// Returns the producing socket this input is bound to, if any.
    pub fn source(&self) -> Option<SocketOrigin> {
        self.source.as_ref().and_then(|b| b.origin)
    }

    /// Returns the socket's current backing buffer.
    ///
    /// For an output this is the buffer it owns. For a bound input it is the
    /// source's buffer. Returns `None` for an unbound input or if the source
    /// has been dropped.
    pub fn data(&self) -> Option<SharedBuffer> {
        match self.kind {
            SocketKind::Out | SocketKind::InOut => self.owned.clone(),
            SocketKind::In => self.source.as_ref().and_then(|b| b.buffer.upgrade()),
        }
    }

    /// Runs `f` over a read-only typed view of [`data()`](Self::data).
    pub fn with_data<T: Element, R>(&self, f: impl FnOnce(&[T]) -> R) -> Result<R, TaskError> {
        let buffer = self.data().ok_or_else(|| self.unbound_error())?;
        let guard = buffer.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        let slice = T::slice(&guard).ok_or_else(|| self.element_mismatch::<T>())?;
        Ok(f(slice))
    }

    /// Runs `f` over a mutable typed view of [`data()`](Self::data).
    ///
    /// Writing through an input socket writes the producer's buffer.
    pub fn with_data_mut<T: Element, R>(
        &self,
        f: impl FnOnce(&mut [T]) -> R,
    ) -> Result<R, TaskError> {
        let buffer = self.data().ok_or_else(|| self.unbound_error())?;
        let mut guard = buffer
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let slice = T::slice_mut(&mut guard).ok_or_else(|| self.element_mismatch::<T>())?;
        Ok(f(slice))
    }

    /// Validates and installs a binding to `other`.
    ///
    /// On error the previous binding is left untouched.
    pub(crate) fn bind(&mut self, other: &Socket) -> Result<(), TaskError> {
        if !self.kind.is_input() {
            return Err(TaskError::Direction {
                socket: self.name.clone(),
                direction: self.kind,
            });
        }
        if !other.kind.is_output() {
            return Err(TaskError::Direction {
                socket: other.name.clone(),
                direction: other.kind,
            });
        }
        if other.shape() != self.shape() {
            return Err(TaskError::TypeMismatch {
                socket: self.name.clone(),
                expected: self.shape(),
                found: other.shape(),
            });
        }
        let buffer = other
            .owned
            .as_ref()
            .ok_or_else(|| other.unbound_error())?;
        self.source = Some(Binding {
            origin: Some(other.origin),
            buffer: Arc::downgrade(buffer),
        });
        Ok(())
    }

    /// Binds an input to a buffer owned outside any task.
    pub(crate) fn bind_buffer(&mut self, buffer: &SharedBuffer) -> Result<(), TaskError> {
        if !self.kind.is_input() {
            return Err(TaskError::Direction {
                socket: self.name.clone(),
                direction: self.kind,
            });
        }
        if self.owned.as_ref().is_some_and(|own| Arc::ptr_eq(own, buffer)) {
            return Err(TaskError::configuration(
                self.origin.task.to_string(),
                format!("socket '{}' cannot be bound to its own buffer", self.name),
            ));
        }
        let found = {
            let guard = buffer.read().unwrap_or_else(std::sync::PoisonError::into_inner);
            Shape {
                data_type: guard.data_type(),
                len: guard.len(),
            }
        };
        if found != self.shape() {
            return Err(TaskError::TypeMismatch {
                socket: self.name.clone(),
                expected: self.shape(),
                found,
            });
        }
        self.source = Some(Binding {
            origin: None,
            buffer: Arc::downgrade(buffer),
        });
        Ok(())
    }

    /// Returns an unbound socket with the same schema, declared by `origin`.
    pub(crate) fn duplicate(&self, origin: SocketOrigin) -> Self {
        Self::new(self.name.clone(), self.kind, self.data_type, self.len, origin)
    }

    pub(crate) fn unbind(&mut self) {
        self.source = None;
    }

    pub(crate) fn binding(&self) -> Option<&Binding> {
        self.source.as_ref()
    }

    pub(crate) fn owned(&self) -> Option<&SharedBuffer> {
        self.owned.as_ref()
    }

    /// Returns the owned buffer, allocating a zeroed one on first use.
    pub(crate) fn ensure_owned(&mut self) -> &SharedBuffer {
        let (data_type, len) = (self.data_type, self.len);
        self.owned
            .get_or_insert_with(|| Arc::new(RwLock::new(Buffer::zeroed(data_type, len))))
    }

    pub(crate) fn release_owned(&mut self) {
        self.owned = None;
    }

    fn unbound_error(&self) -> TaskError {
        TaskError::NotReady {
            task: self.origin.task.to_string(),
            socket: self.name.clone(),
        }
    }

    pub(crate) fn element_mismatch<T: Element>(&self) -> TaskError {
        TaskError::TypeMismatch {
            socket: self.name.clone(),
            expected: self.shape(),
            found: Shape {
                data_type: T::DATA_TYPE,
                len: self.len,
            },
        }
    }
}
