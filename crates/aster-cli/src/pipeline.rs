//! The demonstration graph: a signal source, a threshold router, and one sink per route.
//!
//! ```text
//! source ──> route ─┬─ out0 ──> sink0   (mean above threshold)
//!                   └─ out1 ──> sink1   (everything else)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use aster_config::PipelineConfig;
use aster_core::{
    Condition, ConditionPredicate, DataType, Module, Report, Router, Task, TaskError, chain,
};
use serde::Serialize;

/// Number of router outputs, one sink each.
pub const ROUTES: usize = 2;

/// Per-route totals accumulated by the sinks.
#[derive(Debug, Default, Clone, Copy)]
struct SinkTotals {
    sum: f64,
    values: u64,
}

/// An assembled, runnable pipeline.
pub struct Pipeline {
    module: Module,
    router: usize,
    source: usize,
    sinks: [usize; ROUTES],
    totals: Arc<Mutex<[SinkTotals; ROUTES]>>,
    passes: usize,
}

impl Pipeline {
    /// Builds and wires every task described by `config`.
    pub fn new(config: &PipelineConfig) -> Result<Self, TaskError> {
        let mut module = Module::with_frames(&config.name, config.frames);
        let elements = config.elements;

        let source = source_task(&module, elements, config)?;
        let source = module.push_task(source)?;

        let predicate = ConditionPredicate::new(vec![
            Condition::MeanAbove(config.threshold),
            Condition::Always,
        ])
        .with_expected_len(elements);
        let mut router = Router::new(
            module.handle(),
            "route",
            DataType::F32,
            elements,
            ROUTES,
            Arc::new(predicate),
        )?;
        router.task_mut().apply_options(&config.task_options("route"));
        let router = module.push_router(router)?;
        module.bind_router(router, source, 0)?;

        let totals = Arc::new(Mutex::new([SinkTotals::default(); ROUTES]));
        let mut sinks = [0; ROUTES];
        for (route, slot) in sinks.iter_mut().enumerate() {
            let sink = sink_task(&module, route, elements, config, totals.clone())?;
            *slot = module.push_task(sink)?;
            module.bind_route(*slot, 0, router, route)?;
        }

        tracing::info!(
            module = module.name(),
            elements,
            frames = config.frames,
            threshold = config.threshold,
            "pipeline assembled"
        );
        Ok(Self {
            module,
            router,
            source,
            sinks,
            totals,
            passes: 0,
        })
    }

    /// Runs source, router, and the selected sink once. Returns the route taken.
    pub fn run_pass(&mut self) -> Result<usize, TaskError> {
        // Each pass is its own control-flow step.
        chain::break_chain();
        task_mut(&mut self.module, self.source)?.exec()?;
        let route = router_mut(&mut self.module, self.router)?.exec()?;
        task_mut(&mut self.module, self.sinks[route])?.exec()?;
        self.passes += 1;
        Ok(route)
    }

    /// Returns how many passes took each route.
    pub fn route_counts(&self) -> &[u64] {
        self.module
            .router(self.router)
            .map(Router::route_counts)
            .unwrap_or_default()
    }

    /// Returns the timing report in graph order.
    pub fn report(&self) -> Report {
        let mut tasks: Vec<&Task> = Vec::with_capacity(ROUTES + 2);
        tasks.extend(self.module.task(self.source));
        tasks.extend(self.module.router(self.router).map(Router::task));
        tasks.extend(self.sinks.iter().filter_map(|&i| self.module.task(i)));
        Report::new(tasks)
    }

    /// Summarizes the run so far.
    pub fn summary(&self, config: &PipelineConfig) -> RunSummary {
        let totals = *self.totals.lock().unwrap_or_else(PoisonError::into_inner);
        let routes = self
            .route_counts()
            .iter()
            .zip(totals)
            .enumerate()
            .map(|(route, (&count, t))| RouteSummary {
                route,
                count,
                mean: (t.values > 0).then(|| t.sum / t.values as f64),
            })
            .collect();
        let tasks = self
            .report()
            .rows()
            .iter()
            .map(|row| TaskSummary {
                module: row.module.clone(),
                name: row.name.clone(),
                phase: row.is_phase,
                calls: row.timing.n_calls(),
                total_us: micros(row.timing.total()),
                avg_us: micros(row.timing.avg()),
                min_us: micros(row.timing.min()),
                max_us: micros(row.timing.max()),
                percent: row.percent,
            })
            .collect();
        RunSummary {
            name: config.name.clone(),
            passes: self.passes,
            elements: config.elements,
            frames: config.frames,
            threshold: config.threshold,
            routes,
            tasks,
        }
    }
}

/// Machine-readable result of `aster run --json`.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    /// Module name.
    pub name: String,
    /// Passes completed.
    pub passes: usize,
    /// Elements per buffer.
    pub elements: usize,
    /// Frames per buffer.
    pub frames: usize,
    /// Router threshold.
    pub threshold: f64,
    /// Per-route outcome.
    pub routes: Vec<RouteSummary>,
    /// Timing rows.
    pub tasks: Vec<TaskSummary>,
}

/// How often a route was taken and the mean of the values it received.
#[derive(Debug, Serialize)]
pub struct RouteSummary {
    /// Route index.
    pub route: usize,
    /// Passes routed here.
    pub count: u64,
    /// Mean of every value delivered to this route's sink.
    pub mean: Option<f64>,
}

/// One timing row.
#[derive(Debug, Serialize)]
pub struct TaskSummary {
    /// Module name.
    pub module: String,
    /// Task or `task/timer` name.
    pub name: String,
    /// True for sub-phase rows.
    pub phase: bool,
    /// Timed calls.
    pub calls: u32,
    /// Total time in microseconds.
    pub total_us: f64,
    /// Mean time in microseconds.
    pub avg_us: f64,
    /// Shortest call in microseconds.
    pub min_us: f64,
    /// Longest call in microseconds.
    pub max_us: f64,
    /// Share of the total time of all tasks.
    pub percent: f64,
}

fn micros(d: std::time::Duration) -> f64 {
    d.as_secs_f64() * 1e6
}

fn router_mut(module: &mut Module, idx: usize) -> Result<&mut Router, TaskError> {
    let name = module.name().to_string();
    module
        .router_mut(idx)
        .ok_or_else(|| TaskError::configuration(name, format!("no router at index {idx}")))
}

fn task_mut(module: &mut Module, idx: usize) -> Result<&mut Task, TaskError> {
    let name = module.name().to_string();
    module
        .task_mut(idx)
        .ok_or_else(|| TaskError::configuration(name, format!("no task at index {idx}")))
}

/// A slowly drifting sine, shifted per frame, so both routes get traffic.
fn source_task(module: &Module, elements: usize, config: &PipelineConfig) -> Result<Task, TaskError> {
    let mut b = module.task_builder("source");
    let out = b.create_socket_out("out", elements, DataType::F32)?;
    let generate = b.register_timer("generate")?;
    let frame_len = config.frame_len();
    let pass = AtomicU64::new(0);
    b.create_codelet(move |_, io| {
        let mut data = io.output::<f32>(out)?;
        let n = pass.fetch_add(1, Ordering::Relaxed);
        io.timed(generate, || {
            let phase = n as f32 * 0.37;
            for (i, x) in data.iter_mut().enumerate() {
                let frame = (i / frame_len) as f32;
                *x = (phase + frame * 0.5 + i as f32 * 0.11).sin();
            }
        })?;
        Ok(0)
    })?;
    b.set_options(config.task_options("source"));
    Ok(b.build())
}

fn sink_task(
    module: &Module,
    route: usize,
    elements: usize,
    config: &PipelineConfig,
    totals: Arc<Mutex<[SinkTotals; ROUTES]>>,
) -> Result<Task, TaskError> {
    let name = format!("sink{route}");
    let mut b = module.task_builder(name.as_str());
    let input = b.create_socket_in("in", elements, DataType::F32)?;
    let accumulate = b.register_timer("accumulate")?;
    b.create_codelet(move |_, io| {
        let data = io.input::<f32>(input)?;
        let sum = io.timed(accumulate, || data.iter().map(|&x| f64::from(x)).sum::<f64>())?;
        let mut totals = totals.lock().unwrap_or_else(PoisonError::into_inner);
        totals[route].sum += sum;
        totals[route].values += data.len() as u64;
        Ok(0)
    })?;
    b.set_options(config.task_options(&name));
    Ok(b.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(passes: usize) -> PipelineConfig {
        let mut config = PipelineConfig {
            passes,
            ..PipelineConfig::default()
        };
        config.defaults.stats = true;
        config
    }

    #[test]
    fn every_pass_takes_exactly_one_route() {
        let config = config(50);
        let mut p = Pipeline::new(&config).unwrap();
        for _ in 0..config.passes {
            let route = p.run_pass().unwrap();
            assert!(route < ROUTES);
        }
        assert_eq!(p.route_counts().iter().sum::<u64>(), 50);
        assert!(p.route_counts().iter().all(|&c| c > 0), "{:?}", p.route_counts());
    }

    #[test]
    fn route_zero_only_receives_high_means() {
        let config = config(40);
        let mut p = Pipeline::new(&config).unwrap();
        for _ in 0..config.passes {
            p.run_pass().unwrap();
        }
        let summary = p.summary(&config);
        let high = summary.routes[0].mean.unwrap();
        let low = summary.routes[1].mean.unwrap();
        assert!(high > config.threshold);
        assert!(low <= config.threshold);
    }

    #[test]
    fn report_lists_tasks_in_graph_order() {
        let config = config(5);
        let mut p = Pipeline::new(&config).unwrap();
        for _ in 0..config.passes {
            p.run_pass().unwrap();
        }
        let report = p.report();
        let names: Vec<&str> = report
            .rows()
            .iter()
            .filter(|r| !r.is_phase)
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names[0], "source");
        assert_eq!(names[1], "route");
        assert_eq!(p.summary(&config).passes, 5);
    }

    #[test]
    fn zero_copy_router_matches_copying_router() {
        let copying = config(30);
        let mut zero_copy = config(30);
        zero_copy.tasks.insert(
            "route".to_string(),
            aster_config::TaskConfig {
                autoalloc: false,
                ..aster_config::TaskConfig::default()
            },
        );
        let mut a = Pipeline::new(&copying).unwrap();
        let mut b = Pipeline::new(&zero_copy).unwrap();
        for _ in 0..30 {
            assert_eq!(a.run_pass().unwrap(), b.run_pass().unwrap());
        }
    }

    #[test]
    fn module_flags_reach_the_router() {
        let mut p = Pipeline::new(&PipelineConfig::default()).unwrap();
        p.module.set_stats(true);
        for _ in 0..3 {
            p.run_pass().unwrap();
        }
        let router = p.module.router_by_name("route").unwrap();
        assert_eq!(router.task().n_calls(), 3);
    }

    #[test]
    fn multi_frame_pipeline_runs() {
        let mut config = config(10);
        config.elements = 12;
        config.frames = 3;
        let mut p = Pipeline::new(&config).unwrap();
        for _ in 0..10 {
            p.run_pass().unwrap();
        }
        assert_eq!(p.route_counts().iter().sum::<u64>(), 10);
    }
}
