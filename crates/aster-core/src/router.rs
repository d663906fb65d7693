//! Routers: tasks that forward their input to exactly one of several routes.
//!
//! A [`Router`] has one input socket (`in`, index [`Router::INPUT`]) and one
//! output socket per route (`out0`, `out1`, ...). Each [`exec`](Router::exec)
//! evaluates the shared [`Predicate`] on the input, commits to one route,
//! copies the input into that route's output, and returns the route index so
//! the orchestrator can decide which subgraph runs next.
//!
//! Route selection is a pure function of the input and the predicate; the
//! router itself only remembers per-route counters.

use std::sync::Arc;

use crate::buffer::{Buffer, DataType};
use crate::error::{EvaluationError, Shape, TaskError};
use crate::module::ModuleRef;
use crate::predicate::{Predicate, RouteSet, Verdict};
use crate::socket::Socket;
use crate::task::Task;

/// Whether a route has been committed for the current input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouterState {
    /// No route chosen (before the first call, or after a failed evaluation).
    Idle,
    /// The last call forwarded its input to this route.
    Routed(usize),
}

/// A predicate-driven branch.
pub struct Router {
    task: Task,
    predicate: Arc<dyn Predicate>,
    n_routes: usize,
    state: RouterState,
    history: Vec<u64>,
}

impl Router {
    /// Index of the input socket.
    pub const INPUT: usize = 0;

    /// Highest supported number of routes.
    pub const MAX_ROUTES: usize = RouteSet::CAPACITY;

    /// Creates a router named `name` with `n_routes` outputs of `n_elmts` elements.
    ///
    /// # Errors
    ///
    /// [`TaskError::Configuration`] if `n_routes` is zero or above [`Router::MAX_ROUTES`].
    pub fn new(
        module: &ModuleRef,
        name: impl Into<String>,
        data_type: DataType,
        n_elmts: usize,
        n_routes: usize,
        predicate: Arc<dyn Predicate>,
    ) -> Result<Self, TaskError> {
        let name = name.into();
        if n_routes == 0 || n_routes > Self::MAX_ROUTES {
            return Err(TaskError::configuration(
                name,
                format!(
                    "a router needs between 1 and {} routes, got {n_routes}",
                    Self::MAX_ROUTES
                ),
            ));
        }
        let mut builder = Task::builder(module, name);
        builder.create_socket_in("in", n_elmts, data_type)?;
        for route in 0..n_routes {
            builder.create_socket_out(format!("out{route}"), n_elmts, data_type)?;
        }
        Ok(Self {
            task: builder.build(),
            predicate,
            n_routes,
            state: RouterState::Idle,
            history: vec![0; n_routes],
        })
    }

    /// Returns a router with the same schema, flags, and predicate.
    ///
    /// The copy owns fresh buffers, has no binding and no history. The
    /// predicate is shared unless [`Predicate::duplicate`] provides an
    /// independent one.
    pub fn duplicate(&self) -> Self {
        Self {
            task: self.task.duplicate(),
            predicate: self
                .predicate
                .duplicate()
                .unwrap_or_else(|| Arc::clone(&self.predicate)),
            n_routes: self.n_routes,
            state: RouterState::Idle,
            history: vec![0; self.n_routes],
        }
    }

    /// Returns the socket index carrying route `route`.
    #[inline]
    pub fn output_socket(route: usize) -> usize {
        route + 1
    }

    /// Returns the underlying task (sockets, statistics).
    pub fn task(&self) -> &Task {
        &self.task
    }

    /// Returns the underlying task mutably, to change its flags.
    ///
    /// The task has no codelet of its own; run it through [`Router::exec`].
    pub fn task_mut(&mut self) -> &mut Task {
        &mut self.task
    }

    /// Binds the router input to `source`.
    pub fn bind(&mut self, source: &Socket) -> Result<(), TaskError> {
        self.task.bind(Self::INPUT, source)
    }

    /// Returns the output socket of route `route`.
    pub fn route_socket(&self, route: usize) -> Option<&Socket> {
        if route < self.n_routes {
            self.task.socket(Self::output_socket(route))
        } else {
            None
        }
    }

    /// Returns the shared predicate.
    pub fn predicate(&self) -> &Arc<dyn Predicate> {
        &self.predicate
    }

    /// Returns the number of routes.
    pub fn n_routes(&self) -> usize {
        self.n_routes
    }

    /// Returns the element type and count the input must have.
    pub fn input_shape(&self) -> Shape {
        self.task[Self::INPUT].shape()
    }

    /// Returns the outcome of the last call.
    pub fn state(&self) -> RouterState {
        self.state
    }

    /// Returns how many times each route was taken since the last reset.
    pub fn route_counts(&self) -> &[u64] {
        &self.history
    }

    /// Evaluates the predicate on `input` and returns the selected route.
    ///
    /// Has no side effect on the router.
    ///
    /// # Errors
    ///
    /// [`TaskError::Evaluation`] if `input` does not match
    /// [`input_shape`](Self::input_shape) or the predicate cannot decide.
    pub fn route(&self, input: &Buffer) -> Result<usize, TaskError> {
        let expected = self.input_shape();
        decide(self.predicate.as_ref(), self.n_routes, expected, input).map_err(|source| {
            TaskError::Evaluation {
                router: self.task.name().to_string(),
                source,
            }
        })
    }

    /// Resolves two simultaneously plausible routes to one.
    ///
    /// The predicate's preference wins when it names one of the two;
    /// otherwise the lower index wins.
    pub fn select_route_inter(&self, a: usize, b: usize) -> usize {
        tie_break(self.predicate.as_ref(), a, b)
    }

    /// Routes the current input and returns the chosen route.
    ///
    /// # Errors
    ///
    /// [`TaskError::Evaluation`] if the predicate cannot decide, in which case
    /// no output is written and the state stays [`RouterState::Idle`]; any
    /// other [`Task::exec`] error.
    pub fn exec(&mut self) -> Result<usize, TaskError> {
        self.state = RouterState::Idle;
        let predicate = self.predicate.as_ref();
        let n_routes = self.n_routes;
        let expected = self.input_shape();
        let status = self.task.exec_with(|_, io| {
            let input = io.buffer(Self::INPUT)?;
            let route = decide(predicate, n_routes, expected, &input).map_err(|source| {
                TaskError::Evaluation {
                    router: io.task_name().to_string(),
                    source,
                }
            })?;
            io.buffer_mut(Self::output_socket(route))?
                .copy_from(&input);
            Ok(route as i32)
        })?;

        let route = status as usize;
        self.state = RouterState::Routed(route);
        self.history[route] += 1;
        #[cfg(feature = "tracing")]
        tracing::debug!("router_exec: {} -> route {route}", self.task.name());
        Ok(route)
    }

    /// Clears route counters and statistics, keeping the predicate.
    pub fn reset(&mut self) {
        self.history.fill(0);
        self.state = RouterState::Idle;
        self.task.reset();
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("task", &self.task)
            .field("n_routes", &self.n_routes)
            .field("state", &self.state)
            .field("history", &self.history)
            .finish_non_exhaustive()
    }
}

fn tie_break(predicate: &dyn Predicate, a: usize, b: usize) -> usize {
    match predicate.prefer(a, b) {
        Some(p) if p == a || p == b => p,
        _ => a.min(b),
    }
}

fn decide(
    predicate: &dyn Predicate,
    n_routes: usize,
    expected: Shape,
    input: &Buffer,
) -> Result<usize, EvaluationError> {
    let found = Shape {
        data_type: input.data_type(),
        len: input.len(),
    };
    if found != expected {
        return Err(EvaluationError::new(format!(
            "expected an input of {expected}, got {found}"
        )));
    }
    let in_range = |route: usize| {
        if route < n_routes {
            Ok(route)
        } else {
            Err(EvaluationError::new(format!(
                "route {route} out of range ({n_routes} routes)"
            )))
        }
    };
    match predicate.evaluate(input)? {
        Verdict::Bool(true) => in_range(0),
        Verdict::Bool(false) => in_range(1),
        Verdict::Route(route) => in_range(route),
        Verdict::Candidates(set) => {
            let mut routes = set.iter();
            let first = routes
                .next()
                .ok_or_else(|| EvaluationError::new("predicate returned no candidate route"))?;
            routes.try_fold(in_range(first)?, |chosen, next| {
                in_range(next).map(|next| tie_break(predicate, chosen, next))
            })
        }
    }
}
