use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use piegy_core::config::SimConfig;
use piegy_core::experiment::Experiment;
use piegy_core::storage;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "piegy")]
#[command(about = "Spatial payoff-driven population simulation CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run repeated simulations from a config file
    Run {
        /// Path to config file (JSON)
        #[arg(long)]
        config: PathBuf,

        /// Output directory for data.json.gz (optional)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Override the number of repeats
        #[arg(long)]
        runs: Option<usize>,

        /// Override the base seed
        #[arg(long)]
        seed: Option<u64>,

        /// Run repeats on a thread pool
        #[arg(long)]
        parallel: bool,
    },
    /// Dump the default configuration to stdout
    DumpDefaultConfig,
    /// Print per-patch time averages of a saved result
    Inspect {
        /// Directory holding data.json.gz
        #[arg(long)]
        dir: PathBuf,

        /// Average every N snapshots and print the grid totals
        #[arg(long)]
        compress: Option<usize>,
    },
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(path: &Path) -> Result<SimConfig> {
    let file = File::open(path).context("failed to open config file")?;
    let config: SimConfig =
        serde_json::from_reader(BufReader::new(file)).context("failed to parse config")?;
    Ok(config)
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::DumpDefaultConfig => {
            let config = SimConfig::default();
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Run {
            config,
            out,
            runs,
            seed,
            parallel,
        } => {
            let mut sim_config = load_config(&config)?;
            if let Some(runs) = runs {
                sim_config.runs = runs;
            }
            if seed.is_some() {
                sim_config.seed = seed;
            }
            sim_config.parallel |= parallel;
            sim_config.validate().context("Config validation error")?;

            println!("Loaded config from {:?}", config);
            println!(
                "Simulating {}x{} grid to t={} ({} runs)...",
                sim_config.rows, sim_config.cols, sim_config.max_time, sim_config.runs
            );

            let experiment =
                Experiment::new(sim_config.clone()).context("failed to build grid")?;
            let summary = experiment.run();

            for failed in &summary.failures {
                warn!(
                    run = failed.run_index,
                    code = failed.failure.code(),
                    "run failed: {}",
                    failed.failure
                );
            }
            println!(
                "Completed {}/{} runs, {} events, seed {}",
                summary.completed_runs, summary.runs, summary.total_events, summary.seed
            );
            if let Some(out_dir) = out {
                // Keep the seed actually used so the result can be reproduced.
                let saved_config = SimConfig {
                    seed: Some(experiment.seed()),
                    ..sim_config
                };
                let path = storage::save(&out_dir, &saved_config, &summary)
                    .context("failed to save results")?;
                println!("Results saved to {:?}", path);
            }
            if summary.completed_runs == 0 {
                bail!("every run failed");
            }
        }
        Commands::Inspect { dir, compress } => {
            let (config, mut summary) =
                storage::load(&dir).with_context(|| format!("failed to load {:?}", dir))?;
            if let Some(itv) = compress {
                summary = summary.compress(itv).with_context(|| {
                    format!("cannot compress {} snapshots by {itv}", summary.max_record)
                })?;
            }
            println!(
                "{}x{} grid, {:?} boundary, {} snapshots every {}",
                config.rows, config.cols, config.boundary, summary.max_record, summary.record_interval
            );
            println!(
                "{}/{} runs completed",
                summary.completed_runs, summary.runs
            );
            for i in 0..summary.rows {
                for j in 0..summary.cols {
                    println!(
                        "  patch ({i}, {j}): mean U {:.3}, mean V {:.3}",
                        summary.patch_mean_u(i, j),
                        summary.patch_mean_v(i, j)
                    );
                }
            }
            if compress.is_some() {
                let totals = summary
                    .total_u_series()
                    .into_iter()
                    .zip(summary.total_v_series())
                    .zip(summary.total_u_pi_series())
                    .zip(summary.total_v_pi_series());
                for (t, (((u, v), u_pi), v_pi)) in totals.enumerate() {
                    println!(
                        "  t={:.3}: U {u:.3}, V {v:.3}, U_pi {u_pi:.3}, V_pi {v_pi:.3}",
                        summary.time(t)
                    );
                }
            }
        }
    }
    Ok(())
}
