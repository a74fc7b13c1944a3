use std::path::PathBuf;

use clap::Parser;

use axidraw_pipettor::run_plan::RunConfig;

/// Prints a run plan as JSON, ready to be edited and passed back to `pipettor --config`.
#[derive(Parser, Debug)]
#[clap(name = "plan_generator")]
struct Opts {
  /// Print the plan from this config instead of the built-in one.
  #[clap(short, long)]
  config: Option<PathBuf>,

  /// Print the whole config (options and settle times too), not just the plan.
  #[clap(long)]
  full: bool,
}

fn main() -> anyhow::Result<()> {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
  let opts: Opts = Opts::parse();

  let config = match &opts.config {
    Some(path) => RunConfig::load(path)?,
    None => RunConfig::default(),
  };

  let json = if opts.full {
    serde_json::to_string_pretty(&config)?
  } else {
    serde_json::to_string_pretty(&config.plan)?
  };
  println!("{json}");
  Ok(())
}
