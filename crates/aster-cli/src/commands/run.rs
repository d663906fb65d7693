//! Run the demonstration pipeline and print route counts and timing.

use std::path::PathBuf;

use anyhow::Context;
use aster_config::{PipelineConfig, TaskConfig};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};

use crate::pipeline::Pipeline;

#[derive(Args)]
pub struct RunArgs {
    /// Pipeline configuration file (TOML); built-in defaults otherwise
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of passes
    #[arg(long)]
    passes: Option<usize>,

    /// Elements per buffer, all frames included
    #[arg(long)]
    elements: Option<usize>,

    /// Frames per buffer
    #[arg(long)]
    frames: Option<usize>,

    /// Router threshold on the buffer mean
    #[arg(long, allow_hyphen_values = true)]
    threshold: Option<f64>,

    /// Skip validation and tracing on every task
    #[arg(long)]
    fast: bool,

    /// Trace socket contents of every task to stdout
    #[arg(long)]
    debug: bool,

    /// Trace values in hexadecimal (implies --debug)
    #[arg(long)]
    hex: bool,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

pub fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = resolve_config(&args)?;
    let mut pipeline = Pipeline::new(&config).context("failed to assemble pipeline")?;

    // Traces and JSON own stdout; the bar would interleave with them.
    let pb = if args.json || args.debug || args.hex {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(config.passes as u64)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} passes ({eta})")?
            .progress_chars("##-"),
    );

    for pass in 0..config.passes {
        pipeline
            .run_pass()
            .with_context(|| format!("pass {pass} failed"))?;
        pb.inc(1);
    }
    pb.finish_and_clear();
    tracing::info!(passes = config.passes, "run complete");

    if args.json {
        println!("{}", serde_json::to_string_pretty(&pipeline.summary(&config))?);
        return Ok(());
    }

    println!("Pipeline '{}': {} passes", config.name, config.passes);
    for (route, count) in pipeline.route_counts().iter().enumerate() {
        let share = *count as f64 * 100.0 / config.passes as f64;
        println!("  route {route}: {count:>8} ({share:5.1}%)");
    }
    let report = pipeline.report();
    if report.rows().is_empty() {
        println!("(statistics disabled)");
    } else {
        println!();
        print!("{report}");
    }
    Ok(())
}

/// Loads the configuration and applies command-line overrides.
fn resolve_config(args: &RunArgs) -> anyhow::Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => {
            let mut config = PipelineConfig::default();
            config.defaults.stats = true;
            config
        }
    };
    if let Some(passes) = args.passes {
        config.passes = passes;
    }
    if let Some(elements) = args.elements {
        config.elements = elements;
    }
    if let Some(frames) = args.frames {
        config.frames = frames;
    }
    if let Some(threshold) = args.threshold {
        config.threshold = threshold;
    }
    for_each_task(&mut config, |task| {
        task.fast |= args.fast;
        task.debug |= args.debug || args.hex;
        task.debug_hex |= args.hex;
    });
    config.validate()?;
    Ok(config)
}

fn for_each_task(config: &mut PipelineConfig, f: impl Fn(&mut TaskConfig)) {
    f(&mut config.defaults);
    config.tasks.values_mut().for_each(f);
}
