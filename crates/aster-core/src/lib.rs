//! Aster Core - execution core of a dataflow signal-processing pipeline
//!
//! Computations are packaged as [`Task`]s that exchange typed buffers through
//! bound [`Socket`]s. An external orchestrator wires sockets together and calls
//! [`Task::exec`] in topological order; a [`Router`] lets the graph branch per
//! data item by evaluating a [`Predicate`] and reporting the chosen route.
//!
//! # Core Abstractions
//!
//! ## Graph
//!
//! - [`Module`] - Named owner of tasks, handed to codelets as a [`ModuleRef`]
//! - [`Task`] / [`TaskBuilder`] - Socket schema, codelet, statistics, tracing
//! - [`Socket`] - Typed, directional binding point
//! - [`Buffer`] - Tagged union of typed vectors, read through [`Element`]
//! - [`Task::duplicate`] / [`Router::duplicate`] - Fresh copies of a stage for parallel workers
//!
//! ## Branching
//!
//! - [`Router`] - One input, N routes, exactly one route taken per call
//! - [`ConditionPredicate`], [`IterationLimit`], [`FnPredicate`] - Built-in predicates
//!
//! ## Instrumentation
//!
//! - [`Timing`] / [`PhaseTimer`] - Whole-call and sub-phase durations
//! - [`Report`] - Aligned statistics table
//! - [`DebugTracer`] - Socket dumps around each call through [`ExecHook`]
//!
//! # Example
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use aster_core::{DataType, Module};
//!
//! let module = Module::new("demo");
//!
//! let mut b = module.task_builder("ramp");
//! let out = b.create_socket_out("out", 8, DataType::I32)?;
//! b.create_codelet(move |_, io| {
//!     for (i, x) in io.output::<i32>(out)?.iter_mut().enumerate() {
//!         *x = i as i32 + 1;
//!     }
//!     Ok(0)
//! })?;
//! let mut ramp = b.build();
//!
//! let total = Arc::new(Mutex::new(0));
//! let sink = total.clone();
//! let mut b = module.task_builder("sum");
//! let input = b.create_socket_in("in", 8, DataType::I32)?;
//! b.create_codelet(move |_, io| {
//!     *sink.lock().unwrap() = io.input::<i32>(input)?.iter().sum();
//!     Ok(0)
//! })?;
//! let mut sum = b.build();
//!
//! sum.bind(input, &ramp[out])?;
//! ramp.exec()?;
//! sum.exec()?;
//! assert_eq!(*total.lock().unwrap(), 36);
//! # Ok::<(), aster_core::TaskError>(())
//! ```
//!
//! # Features
//!
//! - `tracing` - emit `tracing::debug!` events for builds, bindings, and routing decisions

pub mod buffer;
pub mod chain;
pub mod debug;
pub mod error;
pub mod io;
pub mod module;
pub mod predicate;
pub mod router;
pub mod socket;
pub mod stats;
pub mod task;

pub use buffer::{Buffer, DataType, Element, SharedBuffer};
pub use debug::{DebugOptions, DebugTracer, ExecHook, format_frames};
pub use error::{EvaluationError, Shape, TaskError};
pub use io::{InputRef, OutputMut, TaskIo};
pub use module::{Module, ModuleId, ModuleRef};
pub use predicate::{
    Condition, ConditionPredicate, FnPredicate, IterationLimit, Predicate, RouteSet, Verdict,
    predicate_fn,
};
pub use router::{Router, RouterState};
pub use socket::{Socket, SocketKind, SocketOrigin};
pub use stats::{PhaseTimer, Report, ReportRow, Timing};
pub use task::{Codelet, Task, TaskBuilder, TaskId, TaskOptions};
