//! Runs the liquid handling routine:
//!
//! 1. Ask for the origin well and the grid spacing
//! 2. Connect to the AxiDraw (or give up right away)
//! 3. Seat the pipette over the origin
//! 4. Run every transfer / tip change in the plan
//! 5. Return to the origin and disconnect
//!
//! Start with the carriage parked in the home corner.

use std::io;
use std::path::PathBuf;

use clap::Parser;
use log::{error, info};

use axidraw_pipettor::pipettor::Pipettor;
use axidraw_pipettor::plotter_hal_factory::PlotterHalFactory;
use axidraw_pipettor::run_plan::RunConfig;
use axidraw_pipettor::well_layout::{PartialLayout, WellLayout};

#[derive(Parser, Debug)]
#[clap(name = "pipettor")]
struct Opts {
    /// Log to the console instead of moving real hardware.
    #[clap(long)]
    fake_hw: bool,

    /// Serial port of the AxiDraw; found automatically when omitted.
    #[clap(long)]
    port: Option<String>,

    /// JSON run config with plotter options, settle times and the plan.
    #[clap(short, long)]
    config: Option<PathBuf>,

    #[clap(long)]
    origin_x: Option<f64>,

    #[clap(long)]
    origin_y: Option<f64>,

    #[clap(long)]
    unit_x: Option<f64>,

    #[clap(long)]
    unit_y: Option<f64>,

    /// Release the motors when done so the carriage can be pushed home by hand.
    #[clap(long)]
    disable_motors: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let opts: Opts = Opts::parse();

    let config = match &opts.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };

    let known = PartialLayout {
        origin_x: opts.origin_x,
        origin_y: opts.origin_y,
        unit_x: opts.unit_x,
        unit_y: opts.unit_y,
    };
    let layout = WellLayout::prompt(known, &mut io::stdin().lock(), &mut io::stdout())?;
    info!("Using {layout:?}");

    let mut hal = PlotterHalFactory::new_maybe_mock(opts.fake_hw).create_hal();
    if opts.port.is_some() {
        hal.options_mut().port = opts.port.clone();
    }

    let mut pipettor = match Pipettor::connect(hal, layout, config.settle) {
        Ok(pipettor) => pipettor,
        Err(e) => {
            error!("{e:#}");
            std::process::exit(1);
        }
    };

    pipettor.configure(config.options)?;
    pipettor.seat()?;
    println!("Running {} steps...", config.plan.steps.len());
    pipettor.run_plan(&config.plan)?;
    pipettor.finish(opts.disable_motors)?;
    println!("Success!");
    Ok(())
}
