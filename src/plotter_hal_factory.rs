use crate::ebb::plotter_hal_ebb::PlotterHalEbb;
use crate::plotter_hal::PlotterHal;
use crate::plotter_hal_mock::PlotterHalMock;

#[derive(Default)]
pub struct PlotterHalFactory {
    force_mock: bool,
}

impl PlotterHalFactory {
    pub fn new_maybe_mock(force_mock: bool) -> Self {
        Self { force_mock }
    }

    /// Nothing is opened here; the EBB backend looks for its serial port on `connect()`.
    pub fn create_hal(&self) -> Box<dyn PlotterHal> {
        if self.force_mock {
            Box::new(PlotterHalMock::new())
        } else {
            Box::new(PlotterHalEbb::new())
        }
    }
}
