//! Predicates: the decision logic a [`Router`](crate::Router) dispatches on.
//!
//! A predicate looks at the router's current input and returns a [`Verdict`].
//! Composite predicates may return several plausible routes at once as a
//! [`RouteSet`]; the router then commits to exactly one of them.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::buffer::Buffer;
use crate::error::EvaluationError;

/// A set of route indexes below [`RouteSet::CAPACITY`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RouteSet(u64);

impl RouteSet {
    /// Highest number of routes a set can describe.
    pub const CAPACITY: usize = 64;

    /// Creates an empty set.
    pub fn new() -> Self {
        Self(0)
    }

    /// Adds `route`. Returns false if it is out of capacity.
    pub fn insert(&mut self, route: usize) -> bool {
        if route >= Self::CAPACITY {
            return false;
        }
        self.0 |= 1 << route;
        true
    }

    /// Returns true if `route` is in the set.
    pub fn contains(&self, route: usize) -> bool {
        route < Self::CAPACITY && self.0 & (1 << route) != 0
    }

    /// Returns true if no route is in the set.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Returns the number of routes in the set.
    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterates routes in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..Self::CAPACITY).filter(|&r| self.contains(r))
    }
}

impl FromIterator<usize> for RouteSet {
    /// Builds a set, silently skipping routes beyond capacity.
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = Self::new();
        for route in iter {
            set.insert(route);
        }
        set
    }
}

/// Outcome of evaluating a predicate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// `true` selects route 0, `false` selects route 1.
    Bool(bool),
    /// A single route.
    Route(usize),
    /// Several simultaneously satisfied routes.
    Candidates(RouteSet),
}

/// Decision capability shared by a router.
///
/// Predicates are evaluated through `&self`; a stateful predicate keeps its
/// state behind interior mutability (see [`IterationLimit`]).
pub trait Predicate: Send + Sync {
    /// Evaluates the predicate over the router's input.
    fn evaluate(&self, input: &Buffer) -> Result<Verdict, EvaluationError>;

    /// Picks between two candidate routes, or `None` to use ascending order.
    fn prefer(&self, a: usize, b: usize) -> Option<usize> {
        let _ = (a, b);
        None
    }

    /// Returns an independent copy for a duplicated router, or `None` if the
    /// predicate keeps no state and can be shared.
    fn duplicate(&self) -> Option<Arc<dyn Predicate>> {
        None
    }
}

/// Adapts a closure into a [`Predicate`].
pub struct FnPredicate<F>(F);

/// Wraps `f` as a predicate.
pub fn predicate_fn<F>(f: F) -> FnPredicate<F>
where
    F: Fn(&Buffer) -> Result<Verdict, EvaluationError> + Send + Sync,
{
    FnPredicate(f)
}

impl<F> Predicate for FnPredicate<F>
where
    F: Fn(&Buffer) -> Result<Verdict, EvaluationError> + Send + Sync,
{
    fn evaluate(&self, input: &Buffer) -> Result<Verdict, EvaluationError> {
        (self.0)(input)
    }
}

/// A test over every element of a buffer, regardless of element type.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Condition {
    /// Every element is strictly greater than the threshold.
    AllAbove(f64),
    /// Every element is strictly lower than the threshold.
    AllBelow(f64),
    /// At least one element is strictly greater than the threshold.
    AnyAbove(f64),
    /// At least one element is strictly lower than the threshold.
    AnyBelow(f64),
    /// The arithmetic mean is strictly greater than the threshold.
    MeanAbove(f64),
    /// Always holds.
    Always,
}

impl Condition {
    /// Returns true if the condition holds on `input`.
    ///
    /// Empty inputs satisfy `All*` and `Always` only.
    pub fn holds(&self, input: &Buffer) -> bool {
        let mut values = (0..input.len()).filter_map(|i| input.value_f64(i));
        match *self {
            Self::AllAbove(t) => values.all(|v| v > t),
            Self::AllBelow(t) => values.all(|v| v < t),
            Self::AnyAbove(t) => values.any(|v| v > t),
            Self::AnyBelow(t) => values.any(|v| v < t),
            Self::MeanAbove(t) => {
                let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
                n > 0 && sum / n as f64 > t
            }
            Self::Always => true,
        }
    }
}

/// One [`Condition`] per route; every route whose condition holds is a candidate.
#[derive(Clone, Debug, PartialEq)]
pub struct ConditionPredicate {
    conditions: Vec<Condition>,
    expected_len: Option<usize>,
}

impl ConditionPredicate {
    /// Creates a predicate where route `i` is plausible when `conditions[i]` holds.
    pub fn new(conditions: Vec<Condition>) -> Self {
        Self {
            conditions,
            expected_len: None,
        }
    }

    /// Rejects inputs that do not have exactly `len` elements.
    pub fn with_expected_len(mut self, len: usize) -> Self {
        self.expected_len = Some(len);
        self
    }

    /// Returns the per-route conditions.
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }
}

impl Predicate for ConditionPredicate {
    fn evaluate(&self, input: &Buffer) -> Result<Verdict, EvaluationError> {
        if let Some(len) = self.expected_len
            && input.len() != len
        {
            return Err(EvaluationError::new(format!(
                "expected {len} elements, got {}",
                input.len()
            )));
        }
        let candidates: RouteSet = self
            .conditions
            .iter()
            .enumerate()
            .filter(|(_, c)| c.holds(input))
            .map(|(i, _)| i)
            .collect();
        if candidates.is_empty() {
            return Err(EvaluationError::new("no route condition holds"));
        }
        Ok(Verdict::Candidates(candidates))
    }
}

/// Counts evaluations and turns true once `limit` is reached.
///
/// This is the early-termination test of iterative algorithms: route 0 leaves
/// the loop, route 1 runs another iteration. The count is external state and
/// survives [`Router::reset`](crate::Router::reset); call
/// [`IterationLimit::reset`] to start over.
#[derive(Debug)]
pub struct IterationLimit {
    limit: usize,
    count: AtomicUsize,
}

impl IterationLimit {
    /// Creates a predicate that is true on the `limit`-th evaluation and after.
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            count: AtomicUsize::new(0),
        }
    }

    /// Returns the number of evaluations so far.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    /// Returns the configured limit.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Restarts counting from zero.
    pub fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
    }
}

impl Predicate for IterationLimit {
    fn evaluate(&self, _input: &Buffer) -> Result<Verdict, EvaluationError> {
        let n = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(Verdict::Bool(n >= self.limit))
    }

    /// The copy has the same limit and counts from zero.
    fn duplicate(&self) -> Option<Arc<dyn Predicate>> {
        Some(Arc::new(Self::new(self.limit)))
    }
}
