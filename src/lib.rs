pub mod pipettor;
pub mod plotter_hal;
pub mod plotter_hal_factory;
pub mod plotter_hal_mock;
pub mod plotter_options;
pub mod run_plan;
pub mod well_layout;

mod ebb;
