//! Execution statistics: per-task timing, sub-phase timers, and a printable report.
//!
//! Every task keeps one [`Timing`] for whole `exec` calls and one per
//! registered sub-phase timer. A [`Report`] gathers them from many tasks and
//! renders an aligned table.

use std::fmt;
use std::time::Duration;

use crate::task::Task;

/// Call counter with cumulative, minimum, and maximum duration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Timing {
    n_calls: u32,
    total: Duration,
    min: Option<Duration>,
    max: Duration,
}

impl Timing {
    /// Accounts one call of length `elapsed`.
    #[inline]
    pub fn record(&mut self, elapsed: Duration) {
        self.n_calls = self.n_calls.saturating_add(1);
        self.total += elapsed;
        self.min = Some(self.min.map_or(elapsed, |m| m.min(elapsed)));
        self.max = self.max.max(elapsed);
    }

    /// Returns the number of recorded calls.
    pub fn n_calls(&self) -> u32 {
        self.n_calls
    }

    /// Returns the sum of all recorded durations.
    pub fn total(&self) -> Duration {
        self.total
    }

    /// Returns the shortest recorded call, or zero if nothing was recorded.
    pub fn min(&self) -> Duration {
        self.min.unwrap_or_default()
    }

    /// Returns the longest recorded call.
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Returns the mean call duration, or zero if nothing was recorded.
    pub fn avg(&self) -> Duration {
        if self.n_calls == 0 {
            Duration::ZERO
        } else {
            self.total / self.n_calls
        }
    }

    /// Clears every counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// A named sub-phase timer (`load`, `compute`, `store`, ...).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhaseTimer {
    name: String,
    timing: Timing,
}

impl PhaseTimer {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            timing: Timing::default(),
        }
    }

    /// Returns the timer name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the accumulated timing.
    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub(crate) fn record(&mut self, elapsed: Duration) {
        self.timing.record(elapsed);
    }

    pub(crate) fn reset(&mut self) {
        self.timing.reset();
    }
}

/// One line of a [`Report`].
#[derive(Clone, Debug, PartialEq)]
pub struct ReportRow {
    /// Owning module name.
    pub module: String,
    /// Task name, or `task/timer` for sub-phase rows.
    pub name: String,
    /// Sub-phase rows are indented under their task.
    pub is_phase: bool,
    /// Recorded timing.
    pub timing: Timing,
    /// Share of the total time of all tasks in the report, in percent.
    pub percent: f64,
}

/// Statistics table over a set of tasks.
///
/// Tasks with no recorded call are skipped.
#[derive(Clone, Debug, Default)]
pub struct Report {
    rows: Vec<ReportRow>,
    total: Duration,
}

impl Report {
    /// Builds a report from the statistics of `tasks`.
    pub fn new<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        let tasks: Vec<&Task> = tasks
            .into_iter()
            .filter(|t| t.timing().n_calls() > 0)
            .collect();
        let total: Duration = tasks.iter().map(|t| t.timing().total()).sum();
        let share = |d: Duration| {
            if total.is_zero() {
                0.0
            } else {
                d.as_secs_f64() * 100.0 / total.as_secs_f64()
            }
        };

        let mut rows = Vec::new();
        for task in tasks {
            rows.push(ReportRow {
                module: task.module().name().to_string(),
                name: task.name().to_string(),
                is_phase: false,
                timing: *task.timing(),
                percent: share(task.timing().total()),
            });
            for timer in task.timers() {
                rows.push(ReportRow {
                    module: task.module().name().to_string(),
                    name: format!("{}/{}", task.name(), timer.name()),
                    is_phase: true,
                    timing: *timer.timing(),
                    percent: share(timer.timing().total()),
                });
            }
        }
        Self { rows, total }
    }

    /// Returns every row in task order, sub-phases after their task.
    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    /// Returns the summed total time of the reported tasks.
    pub fn total(&self) -> Duration {
        self.total
    }
}

fn micros(d: Duration) -> f64 {
    d.as_secs_f64() * 1e6
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .rows
            .iter()
            .map(|r| r.module.len() + r.name.len() + 4)
            .max()
            .unwrap_or(0)
            .max(16);

        writeln!(
            f,
            "{:<width$} {:>10} {:>12} {:>7} {:>10} {:>10} {:>10}",
            "# task", "calls", "total (us)", "%", "avg (us)", "min (us)", "max (us)"
        )?;
        for row in &self.rows {
            let label = if row.is_phase {
                format!("#   {}", row.name)
            } else {
                format!("# {}::{}", row.module, row.name)
            };
            writeln!(
                f,
                "{:<width$} {:>10} {:>12.2} {:>7.2} {:>10.2} {:>10.2} {:>10.2}",
                label,
                row.timing.n_calls(),
                micros(row.timing.total()),
                row.percent,
                micros(row.timing.avg()),
                micros(row.timing.min()),
                micros(row.timing.max()),
            )?;
        }
        write!(f, "# total: {:.2} us", micros(self.total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timing_tracks_bounds_and_sum() {
        let mut t = Timing::default();
        for us in [30, 10, 20] {
            t.record(Duration::from_micros(us));
        }
        assert_eq!(t.n_calls(), 3);
        assert_eq!(t.total(), Duration::from_micros(60));
        assert_eq!(t.min(), Duration::from_micros(10));
        assert_eq!(t.max(), Duration::from_micros(30));
        assert_eq!(t.avg(), Duration::from_micros(20));
    }

    #[test]
    fn empty_timing_is_zero() {
        let t = Timing::default();
        assert_eq!(t.min(), Duration::ZERO);
        assert_eq!(t.avg(), Duration::ZERO);
    }

    #[test]
    fn reset_clears() {
        let mut t = Timing::default();
        t.record(Duration::from_millis(1));
        t.reset();
        assert_eq!(t, Timing::default());
    }

    #[test]
    fn phase_timer_keeps_name_on_reset() {
        let mut p = PhaseTimer::new("load".to_string());
        p.record(Duration::from_micros(5));
        p.reset();
        assert_eq!(p.name(), "load");
        assert_eq!(p.timing().n_calls(), 0);
    }
}
