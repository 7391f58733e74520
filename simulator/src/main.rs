use anyhow::Context;
use clap::Parser;
use scenario::config::ScenarioConfig;
use std::fs;
use std::path::PathBuf;
use workflow::runner::Runner;

mod scenario;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Dual-connectivity spectrum allocation driver")]
struct Args {
    /// Load a scenario from YAML instead of the built-in defaults
    #[arg(long)]
    scenario: Option<PathBuf>,
    /// UE population size
    #[arg(long, default_value_t = 30)]
    ues: usize,
    /// Deployment seed; the same seed reproduces the same run
    #[arg(long, default_value_t = 7)]
    seed: u64,
    /// Allocation strategy: dc-ra, intuitive, frsa or msema
    #[arg(long, default_value = "dc-ra")]
    strategy: String,
    /// Write the JSON run report to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = if let Some(path) = args.scenario {
        ScenarioConfig::load(path)?
    } else {
        ScenarioConfig::from_args(args.ues, args.seed, args.strategy)
    };

    let runner = Runner::new(config);
    let result = runner.execute()?;

    println!(
        "Run -> strategy {}, allocated {}, unallocated {}, {:.0} bits/frame",
        result.report.strategy,
        result.report.allocated.len(),
        result.report.unallocated.len(),
        result.report.system_throughput
    );

    if let Some(path) = args.report {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating report directory {}", parent.display()))?;
        }
        let contents =
            serde_json::to_string_pretty(&result).context("serializing the run report")?;
        fs::write(&path, contents)
            .with_context(|| format!("writing run report {}", path.display()))?;
        println!("Report written to {}", path.display());
    }

    Ok(())
}
