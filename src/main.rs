use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use listing_stats::config::{RunPlan, builtin_plan};
use listing_stats::pipeline::run_plan;

#[derive(Parser)]
#[command(name = "listing-stats", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the analyses of a plan and write charts and summary workbooks.
    Run {
        /// JSON run plan; the built-in listing plan when omitted
        #[arg(long)]
        plan: Option<PathBuf>,
        /// Directory the plan's input files are resolved against
        #[arg(long, default_value = ".")]
        data_dir: PathBuf,
        /// Overrides the plan's output directory
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Run only the named analyses (repeatable)
        #[arg(long = "only", value_name = "NAME")]
        only: Vec<String>,
    },
    /// Print the built-in plan as JSON.
    Plan,
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run {
            plan,
            data_dir,
            out_dir,
            only,
        } => {
            let mut plan = match plan {
                Some(path) => RunPlan::from_json_file(&path)?,
                None => builtin_plan(),
            };
            if let Some(dir) = out_dir {
                plan.output_dir = dir;
            }
            plan.select(&only)?;
            let written = run_plan(&plan, &data_dir)?;
            for path in written {
                println!("{}", path.display());
            }
        }
        Commands::Plan => {
            println!("{}", serde_json::to_string_pretty(&builtin_plan())?);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
