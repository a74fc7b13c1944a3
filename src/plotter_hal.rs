use std::time::Duration;

use thiserror::Error;

use crate::plotter_options::PlotterOptions;

#[derive(Error, Debug)]
pub enum HalError {
    #[error("not connected to plotter")]
    NotConnected,
    #[error("no plotter found: {0}")]
    NoDevice(String),
    #[error("invalid option: {0}")]
    InvalidOption(String),
    #[error("unexpected response to {command:?}: {response:?}")]
    Protocol { command: String, response: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type HalResult<T> = Result<T, HalError>;

/// The interactive-mode surface of an AxiDraw style plotter.
///
/// Options can be changed at any time through [`PlotterHal::options_mut`] but only take effect
/// on the device after [`PlotterHal::update`] (or [`PlotterHal::connect`]).  All coordinates are
/// in the currently configured units.
pub trait PlotterHal {
    fn options(&self) -> &PlotterOptions;
    fn options_mut(&mut self) -> &mut PlotterOptions;
    fn connect(&mut self) -> HalResult<()>;
    fn update(&mut self) -> HalResult<()>;
    fn disconnect(&mut self) -> HalResult<()>;
    fn goto(&mut self, x: f64, y: f64) -> HalResult<()>;
    fn pen_up(&mut self) -> HalResult<()>;
    fn pen_down(&mut self) -> HalResult<()>;

    /// Sends `command` verbatim to the firmware and returns whatever it answered.
    fn usb_command(&mut self, command: &str) -> HalResult<String>;

    /// De-energizes the XY motors so the carriage can be pushed by hand.
    fn disable(&mut self) -> HalResult<()>;
    fn current_position(&self) -> (f64, f64);

    /// Blocks for a physical settling period.
    fn settle(&mut self, duration: Duration);
}
