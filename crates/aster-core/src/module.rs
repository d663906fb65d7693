//! Modules: named owners of tasks.
//!
//! A [`Module`] is what an external graph assembler instantiates. It owns plain
//! tasks and [`Router`]s side by side; names are unique across both. Tasks
//! refer back to their module through a [`ModuleRef`], a cheap handle carrying
//! the module's identity, never a pointer to the module itself.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::TaskError;
use crate::router::Router;
use crate::socket::Socket;
use crate::task::{Task, TaskBuilder};

static NEXT_MODULE_ID: AtomicU32 = AtomicU32::new(0);

/// Unique identifier of a module within the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(u32);

impl ModuleId {
    fn next() -> Self {
        Self(NEXT_MODULE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleId({})", self.0)
    }
}

/// Non-owning handle to a module, stored by each task and passed to its codelet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleRef {
    id: ModuleId,
    name: Arc<str>,
    n_frames: usize,
}

impl ModuleRef {
    /// Returns the module identifier.
    pub fn id(&self) -> ModuleId {
        self.id
    }

    /// Returns the module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the default frame count of the module's tasks.
    pub fn n_frames(&self) -> usize {
        self.n_frames
    }
}

/// A named owner of tasks and routers.
///
/// Dropping a module drops its tasks and with them every buffer they own;
/// inputs elsewhere that were bound to those buffers become unbound.
#[derive(Debug)]
pub struct Module {
    handle: ModuleRef,
    tasks: Vec<Task>,
    routers: Vec<Router>,
}

impl Module {
    /// Creates a module whose tasks process one frame per call.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_frames(name, 1)
    }

    /// Creates a module whose tasks process `n_frames` frames per call.
    ///
    /// A frame count of zero is raised to one.
    pub fn with_frames(name: impl Into<String>, n_frames: usize) -> Self {
        let name: String = name.into();
        Self {
            handle: ModuleRef {
                id: ModuleId::next(),
                name: name.into(),
                n_frames: n_frames.max(1),
            },
            tasks: Vec::new(),
            routers: Vec::new(),
        }
    }

    /// Returns the handle tasks use to refer to this module.
    pub fn handle(&self) -> &ModuleRef {
        &self.handle
    }

    /// Returns the module name.
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    /// Returns the module identifier.
    pub fn id(&self) -> ModuleId {
        self.handle.id()
    }

    /// Starts the schema of a new task owned by this module.
    pub fn task_builder(&self, name: impl Into<String>) -> TaskBuilder {
        Task::builder(&self.handle, name)
    }

    /// Adopts a built task and returns its index.
    ///
    /// # Errors
    ///
    /// [`TaskError::Configuration`] if the task was built for another module or
    /// a task with the same name already exists.
    pub fn push_task(&mut self, task: Task) -> Result<usize, TaskError> {
        self.check_adoptable(&task)?;
        #[cfg(feature = "tracing")]
        tracing::debug!("module_push_task: {}::{}", self.name(), task.name());
        self.tasks.push(task);
        Ok(self.tasks.len() - 1)
    }

    /// Adopts a built router and returns its index among the module's routers.
    ///
    /// # Errors
    ///
    /// Same as [`Module::push_task`]; router and task names share one namespace.
    pub fn push_router(&mut self, router: Router) -> Result<usize, TaskError> {
        self.check_adoptable(router.task())?;
        #[cfg(feature = "tracing")]
        tracing::debug!("module_push_router: {}::{}", self.name(), router.task().name());
        self.routers.push(router);
        Ok(self.routers.len() - 1)
    }

    fn check_adoptable(&self, task: &Task) -> Result<(), TaskError> {
        if task.module().id() != self.id() {
            return Err(TaskError::configuration(
                task.name(),
                format!("task belongs to module '{}'", task.module().name()),
            ));
        }
        if self.task_by_name(task.name()).is_some() || self.router_by_name(task.name()).is_some() {
            return Err(TaskError::configuration(
                task.name(),
                format!("module '{}' already has a task with this name", self.name()),
            ));
        }
        Ok(())
    }

    /// Returns the task at `idx`.
    pub fn task(&self, idx: usize) -> Option<&Task> {
        self.tasks.get(idx)
    }

    /// Returns the task at `idx` mutably.
    pub fn task_mut(&mut self, idx: usize) -> Option<&mut Task> {
        self.tasks.get_mut(idx)
    }

    /// Looks a task up by name.
    pub fn task_by_name(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name() == name)
    }

    /// Looks a task up by name, mutably.
    pub fn task_by_name_mut(&mut self, name: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.name() == name)
    }

    /// Returns all tasks in insertion order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Returns all tasks mutably.
    pub fn tasks_mut(&mut self) -> &mut [Task] {
        &mut self.tasks
    }

    /// Returns the router at `idx`.
    pub fn router(&self, idx: usize) -> Option<&Router> {
        self.routers.get(idx)
    }

    /// Returns the router at `idx` mutably.
    pub fn router_mut(&mut self, idx: usize) -> Option<&mut Router> {
        self.routers.get_mut(idx)
    }

    /// Looks a router up by name.
    pub fn router_by_name(&self, name: &str) -> Option<&Router> {
        self.routers.iter().find(|r| r.task().name() == name)
    }

    /// Returns all routers in insertion order.
    pub fn routers(&self) -> &[Router] {
        &self.routers
    }

    /// Returns all routers mutably.
    pub fn routers_mut(&mut self) -> &mut [Router] {
        &mut self.routers
    }

    /// Binds input `socket` of task `consumer` to output `source` of task `producer`,
    /// both owned by this module.
    ///
    /// # Errors
    ///
    /// [`TaskError::Configuration`] for unknown indexes or `consumer == producer`,
    /// otherwise whatever [`Task::bind`] reports.
    pub fn bind(
        &mut self,
        consumer: usize,
        socket: usize,
        producer: usize,
        source: usize,
    ) -> Result<(), TaskError> {
        let count = self.tasks.len();
        if consumer >= count || producer >= count || consumer == producer {
            return Err(TaskError::configuration(
                self.name(),
                format!("cannot bind task {consumer} to task {producer} ({count} tasks)"),
            ));
        }
        let (consumer_task, producer_task) = if consumer < producer {
            let (lo, hi) = self.tasks.split_at_mut(producer);
            (&mut lo[consumer], &hi[0])
        } else {
            let (lo, hi) = self.tasks.split_at_mut(consumer);
            (&mut hi[0], &lo[producer])
        };
        let source_socket: &Socket = producer_task.socket(source).ok_or_else(|| {
            TaskError::configuration(
                producer_task.name(),
                format!("no socket at index {source}"),
            )
        })?;
        consumer_task.bind(socket, source_socket)
    }

    /// Binds the input of router `router` to output `source` of task `producer`.
    pub fn bind_router(
        &mut self,
        router: usize,
        producer: usize,
        source: usize,
    ) -> Result<(), TaskError> {
        let source_socket = self
            .tasks
            .get(producer)
            .and_then(|t| t.socket(source))
            .ok_or_else(|| {
                TaskError::configuration(
                    self.handle.name(),
                    format!("no socket {source} on task {producer}"),
                )
            })?;
        let target = self.routers.get_mut(router).ok_or_else(|| {
            TaskError::configuration(self.handle.name(), format!("no router at index {router}"))
        })?;
        target.bind(source_socket)
    }

    /// Binds input `socket` of task `consumer` to route `route` of router `router`.
    pub fn bind_route(
        &mut self,
        consumer: usize,
        socket: usize,
        router: usize,
        route: usize,
    ) -> Result<(), TaskError> {
        let output = self
            .routers
            .get(router)
            .and_then(|r| r.route_socket(route))
            .ok_or_else(|| {
                TaskError::configuration(
                    self.handle.name(),
                    format!("no route {route} on router {router}"),
                )
            })?;
        let target = self.tasks.get_mut(consumer).ok_or_else(|| {
            TaskError::configuration(self.handle.name(), format!("no task at index {consumer}"))
        })?;
        target.bind(socket, output)
    }

    /// Tasks and router tasks, mutably.
    fn all_tasks_mut(&mut self) -> impl Iterator<Item = &mut Task> {
        self.tasks
            .iter_mut()
            .chain(self.routers.iter_mut().map(Router::task_mut))
    }

    /// Enables or disables statistics on every task and router.
    pub fn set_stats(&mut self, stats: bool) {
        self.all_tasks_mut().for_each(|t| t.set_stats(stats));
    }

    /// Enables or disables fast mode on every task and router.
    pub fn set_fast(&mut self, fast: bool) {
        self.all_tasks_mut().for_each(|t| t.set_fast(fast));
    }

    /// Enables or disables debug tracing on every task and router.
    pub fn set_debug(&mut self, debug: bool) {
        self.all_tasks_mut().for_each(|t| t.set_debug(debug));
    }

    /// Resets the statistics of every task, and the statistics and route
    /// counters of every router.
    pub fn reset(&mut self) {
        self.tasks.iter_mut().for_each(Task::reset);
        self.routers.iter_mut().for_each(Router::reset);
    }
}
