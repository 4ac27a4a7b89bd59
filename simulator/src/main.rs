use anyhow::Context;
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use workflow::config::WorkflowConfig;
use workflow::runner::Runner;

mod generator;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Synthetic-data driver for ISR vector velocity resolution")]
struct Args {
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    /// Write the full JSON report here
    #[arg(long)]
    output: Option<PathBuf>,
    /// Minimum integration window in seconds
    #[arg(long)]
    integration_time: Option<f64>,
    #[arg(long)]
    min_num_points: Option<usize>,
    /// Noise generator seed
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let workflow_config = if let Some(path) = &args.workflow {
        WorkflowConfig::load(path)?.with_overrides(
            args.integration_time,
            args.min_num_points,
            args.seed,
        )
    } else {
        WorkflowConfig::from_args(args.integration_time, args.min_num_points, args.seed)
    };

    let runner = Runner::new(workflow_config);
    let data = runner.generate()?;
    let result = runner.execute(&data)?;
    println!("{}", result.summary());

    if let Some(path) = args.output {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating report directory {}", parent.display()))?;
        }
        let report = serde_json::to_string_pretty(&result).context("serializing report")?;
        fs::write(&path, report)
            .with_context(|| format!("writing report {}", path.display()))?;
        log::info!("report written to {}", path.display());
    }

    Ok(())
}
