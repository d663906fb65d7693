//! Error types for task construction, binding, and execution.

use thiserror::Error;

use crate::buffer::DataType;
use crate::socket::SocketKind;

/// Errors raised by tasks, sockets, and routers.
///
/// Codelet status codes are not errors: they are returned as data from
/// [`Task::exec`](crate::Task::exec).
#[derive(Debug, Error)]
pub enum TaskError {
    /// Schema misuse: duplicate socket name, second codelet, unknown timer or socket.
    #[error("configuration error on task '{task}': {reason}")]
    Configuration {
        /// Task being configured.
        task: String,
        /// What was wrong.
        reason: String,
    },

    /// `exec` was called while an input socket has no live source.
    #[error("task '{task}' is not ready: input socket '{socket}' is not bound")]
    NotReady {
        /// Task that could not run.
        task: String,
        /// First unbound input socket.
        socket: String,
    },

    /// Element type or count differ between two sockets, or a typed accessor used the wrong type.
    #[error("type mismatch on socket '{socket}': expected {expected}, found {found}")]
    TypeMismatch {
        /// Socket being bound or accessed.
        socket: String,
        /// Shape required by the socket.
        expected: Shape,
        /// Shape offered.
        found: Shape,
    },

    /// A socket was used against its direction.
    #[error("socket '{socket}' is {direction} and cannot be used this way")]
    Direction {
        /// Offending socket.
        socket: String,
        /// Its declared direction.
        direction: SocketKind,
    },

    /// A router predicate could not produce a verdict.
    #[error("router '{router}' failed to evaluate its predicate: {source}")]
    Evaluation {
        /// Router task name.
        router: String,
        /// Predicate failure.
        #[source]
        source: EvaluationError,
    },

    /// The socket buffer is already locked, by the running codelet or by another holder.
    #[error("buffer of socket '{socket}' is already borrowed")]
    Busy {
        /// Socket whose buffer is locked.
        socket: String,
    },
}

impl TaskError {
    /// Create a configuration error.
    pub fn configuration(task: impl Into<String>, reason: impl Into<String>) -> Self {
        TaskError::Configuration {
            task: task.into(),
            reason: reason.into(),
        }
    }
}

/// Element type and count of a socket, used in mismatch reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Shape {
    /// Element type.
    pub data_type: DataType,
    /// Element count.
    pub len: usize,
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.data_type, self.len)
    }
}

/// Failure reported by a [`Predicate`](crate::Predicate).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct EvaluationError {
    /// Why the predicate could not decide.
    pub reason: String,
}

impl EvaluationError {
    /// Create an evaluation error with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn configuration_display() {
        let err = TaskError::configuration("decode", "socket 'Y_N' already exists");
        assert_eq!(
            err.to_string(),
            "configuration error on task 'decode': socket 'Y_N' already exists"
        );
    }

    #[test]
    fn type_mismatch_display() {
        let err = TaskError::TypeMismatch {
            socket: "in".to_string(),
            expected: Shape {
                data_type: DataType::F32,
                len: 8,
            },
            found: Shape {
                data_type: DataType::I32,
                len: 4,
            },
        };
        assert_eq!(
            err.to_string(),
            "type mismatch on socket 'in': expected float[8], found int32[4]"
        );
    }

    #[test]
    fn direction_display() {
        let err = TaskError::Direction {
            socket: "out".to_string(),
            direction: SocketKind::Out,
        };
        assert_eq!(
            err.to_string(),
            "socket 'out' is output-only and cannot be used this way"
        );
    }

    #[test]
    fn evaluation_exposes_source() {
        let err = TaskError::Evaluation {
            router: "route".to_string(),
            source: EvaluationError::new("expected 4 elements, got 3"),
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("expected 4 elements, got 3"));
    }

    #[test]
    fn not_ready_has_no_source() {
        let err = TaskError::NotReady {
            task: "sum".to_string(),
            socket: "in".to_string(),
        };
        assert!(err.source().is_none());
    }
}
