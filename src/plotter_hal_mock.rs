use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use log::debug;

use crate::plotter_hal::{HalError, HalResult, PlotterHal};
use crate::plotter_options::PlotterOptions;

#[derive(Debug, PartialEq, Clone)]
pub enum PlotterCommand {
    Connect,
    Update,
    Disconnect,
    Goto { x: f64, y: f64 },
    PenUp,
    PenDown,
    Usb(String),
    Disable,
    Settle(Duration),
}

pub type CommandLog = Rc<RefCell<Vec<PlotterCommand>>>;

/// Stands in for the plotter when no hardware is attached.  Every accepted command is appended
/// to a [`CommandLog`] that callers can keep a handle to after boxing the mock.
#[derive(Debug, Default)]
pub struct PlotterHalMock {
    options: PlotterOptions,
    log: CommandLog,
    connected: bool,
    fail_connect: bool,
    position: (f64, f64),
}

impl PlotterHalMock {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn failing_connect() -> Self {
        Self { fail_connect: true, ..Default::default() }
    }

    pub fn log(&self) -> CommandLog {
        self.log.clone()
    }

    fn record(&self, command: PlotterCommand) {
        debug!("mock: {command:?}");
        self.log.borrow_mut().push(command);
    }

    fn ensure_connected(&self) -> HalResult<()> {
        if self.connected { Ok(()) } else { Err(HalError::NotConnected) }
    }
}

impl PlotterHal for PlotterHalMock {
    fn options(&self) -> &PlotterOptions {
        &self.options
    }

    fn options_mut(&mut self) -> &mut PlotterOptions {
        &mut self.options
    }

    fn connect(&mut self) -> HalResult<()> {
        self.record(PlotterCommand::Connect);
        if self.fail_connect {
            return Err(HalError::NoDevice("mock configured to fail".to_owned()));
        }
        self.options.validate()?;
        self.connected = true;
        Ok(())
    }

    fn update(&mut self) -> HalResult<()> {
        self.ensure_connected()?;
        self.options.validate()?;
        self.record(PlotterCommand::Update);
        Ok(())
    }

    fn disconnect(&mut self) -> HalResult<()> {
        self.record(PlotterCommand::Disconnect);
        self.connected = false;
        Ok(())
    }

    fn goto(&mut self, x: f64, y: f64) -> HalResult<()> {
        self.ensure_connected()?;
        self.record(PlotterCommand::Goto { x, y });
        self.position = (x, y);
        Ok(())
    }

    fn pen_up(&mut self) -> HalResult<()> {
        self.ensure_connected()?;
        self.record(PlotterCommand::PenUp);
        Ok(())
    }

    fn pen_down(&mut self) -> HalResult<()> {
        self.ensure_connected()?;
        self.record(PlotterCommand::PenDown);
        Ok(())
    }

    fn usb_command(&mut self, command: &str) -> HalResult<String> {
        self.ensure_connected()?;
        self.record(PlotterCommand::Usb(command.to_owned()));
        Ok("OK".to_owned())
    }

    fn disable(&mut self) -> HalResult<()> {
        self.ensure_connected()?;
        self.record(PlotterCommand::Disable);
        Ok(())
    }

    fn current_position(&self) -> (f64, f64) {
        self.position
    }

    fn settle(&mut self, duration: Duration) {
        self.record(PlotterCommand::Settle(duration));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_requires_connect() {
        let mut hal = PlotterHalMock::new();
        let log = hal.log();
        assert!(matches!(hal.update(), Err(HalError::NotConnected)));
        assert!(log.borrow().is_empty());

        hal.connect().unwrap();
        hal.update().unwrap();
        hal.disconnect().unwrap();
        assert!(matches!(hal.update(), Err(HalError::NotConnected)));
        assert_eq!(*log.borrow(), vec![
            PlotterCommand::Connect,
            PlotterCommand::Update,
            PlotterCommand::Disconnect,
        ]);
    }
}
