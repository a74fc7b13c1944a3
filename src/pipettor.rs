use anyhow::Context;
use log::{info, warn};

use crate::plotter_hal::PlotterHal;
use crate::plotter_options::PlotterOptions;
use crate::run_plan::{GridPoint, PlanStep, RunPlan, SettleTimes, Transfer};
use crate::well_layout::WellLayout;

/// Where used tips are knocked off, in plotter units.
pub const TIP_DISPOSAL: (f64, f64) = (7.0, 7.0);

/// Tip box column, in grid units, and the small X nudge needed to line up with it.
const TIP_BOX_COLUMN: f64 = 17.0;
const TIP_BOX_NUDGE: f64 = 0.1;

/// Plunger servo positions.  The trailing blank command is what the firmware has always been sent.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum ServoState {
    Press,
    Release,
    Neutral,
}

impl ServoState {
    pub fn command(self) -> &'static str {
        match self {
            ServoState::Press => "S2,11650,6\r\r",
            ServoState::Release => "S2,21000,6\r\r",
            ServoState::Neutral => "S2,19000,6\r\r",
        }
    }
}

/// Pipettes parked in the tool rack, by selector 1, 2 and 3.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum PipetteSize {
    Small,
    Medium,
    Large,
}

impl PipetteSize {
    pub const DEFAULT_SELECTOR: u32 = 1;

    pub fn from_selector(selector: u32) -> Option<Self> {
        match selector {
            1 => Some(PipetteSize::Small),
            2 => Some(PipetteSize::Medium),
            3 => Some(PipetteSize::Large),
            _ => None,
        }
    }

    /// Rack slot in plotter units.
    pub fn rack_position(self) -> (f64, f64) {
        match self {
            PipetteSize::Small => (10.0, 1.0),
            PipetteSize::Medium => (10.0, 3.0),
            PipetteSize::Large => (10.0, 5.0),
        }
    }
}

/// Drives the liquid handling routine on top of a [`PlotterHal`], where "pen down" lowers the
/// pipette into a well and the auxiliary servo works the plunger.
pub struct Pipettor {
    hal: Box<dyn PlotterHal>,
    layout: WellLayout,
    settle: SettleTimes,
}

impl Pipettor {
    /// Nothing else is sent to the plotter if this fails.  Settle times are checked before the
    /// plotter is touched at all.
    pub fn connect(
        mut hal: Box<dyn PlotterHal>,
        layout: WellLayout,
        settle: SettleTimes,
    ) -> anyhow::Result<Self> {
        settle.validate()?;
        hal.connect().context("Failed to connect to plotter")?;
        Ok(Self { hal, layout, settle })
    }

    /// Replaces the plotter options (keeping the port selection made before connecting) and
    /// pushes them to the device.
    pub fn configure(&mut self, options: PlotterOptions) -> anyhow::Result<()> {
        let current = self.hal.options();
        let options = PlotterOptions {
            port: current.port.clone(),
            port_config: current.port_config,
            ..options
        };
        *self.hal.options_mut() = options;
        self.hal.update().context("Failed to apply plotter options")
    }

    /// Parks over the origin and lowers the pipette, ready for the first transfer.
    pub fn seat(&mut self) -> anyhow::Result<()> {
        self.origin()?;
        self.hal.pen_down()?;
        Ok(())
    }

    pub fn set_servo(&mut self, state: ServoState) -> anyhow::Result<()> {
        self.hal.usb_command(state.command())
            .with_context(|| format!("Servo command {state:?} failed"))?;
        Ok(())
    }

    pub fn press(&mut self) -> anyhow::Result<()> {
        self.set_servo(ServoState::Press)
    }

    pub fn release(&mut self) -> anyhow::Result<()> {
        self.set_servo(ServoState::Release)
    }

    pub fn neutral(&mut self) -> anyhow::Result<()> {
        self.set_servo(ServoState::Neutral)
    }

    pub fn origin(&mut self) -> anyhow::Result<()> {
        self.origin_offset(0.0, 0.0)
    }

    /// Returns to `a`,`b` short of the origin, lifts and relaxes the plunger.
    pub fn origin_offset(&mut self, a: f64, b: f64) -> anyhow::Result<()> {
        self.hal.goto(self.layout.origin_x - a, self.layout.origin_y - b)?;
        self.hal.pen_up()?;
        self.neutral()
    }

    /// Unknown selectors fall back to [`PipetteSize::DEFAULT_SELECTOR`].
    pub fn change_pipette_to(&mut self, selector: u32) -> anyhow::Result<()> {
        let size = match PipetteSize::from_selector(selector) {
            Some(size) => size,
            None => {
                warn!("No pipette {selector}, using {} instead", PipetteSize::DEFAULT_SELECTOR);
                return self.change_pipette_to(PipetteSize::DEFAULT_SELECTOR);
            }
        };
        info!("Changing to pipette {selector} ({size:?})");
        let (x, y) = size.rack_position();
        self.hal.pen_up()?;
        self.hal.goto(x, y)?;
        self.hal.pen_down()?;
        Ok(())
    }

    /// Draws from `src`, dispenses into `dst` and returns to the origin.
    pub fn pipette(&mut self, transfer: &Transfer) -> anyhow::Result<()> {
        info!("Transfer {:?} -> {:?}", transfer.src, transfer.dst);

        let (x, y) = self.scaled(transfer.src);
        self.hal.goto(x, y)?;
        self.hal.pen_down()?;
        self.press()?;
        self.hold();
        self.neutral()?;
        self.hold();
        self.hal.pen_up()?;

        let (x, y) = self.scaled(transfer.dst);
        self.hal.goto(x, y)?;
        self.hold();
        self.hal.pen_down()?;
        self.press()?;
        self.hold();
        self.hal.pen_up()?;
        self.origin()
    }

    /// Ejects the current tip at [`TIP_DISPOSAL`] and picks up a fresh one from the tip box
    /// on the origin row.
    pub fn change_tip(&mut self) -> anyhow::Result<()> {
        info!("Changing tip");

        self.press()?;
        self.hold();
        self.hal.goto(TIP_DISPOSAL.0, TIP_DISPOSAL.1)?;
        self.release()?;
        self.hal.settle(self.settle.tip_release());
        self.hal.goto(0.0, 0.0)?;
        self.neutral()?;
        self.hold();
        self.hal.goto(TIP_BOX_COLUMN * self.layout.unit_x + TIP_BOX_NUDGE, self.layout.origin_y)?;
        self.hal.pen_down()?;
        self.hold();
        self.hal.pen_up()?;
        Ok(())
    }

    pub fn run_step(&mut self, step: &PlanStep) -> anyhow::Result<()> {
        match step {
            PlanStep::Transfer(transfer) => self.pipette(transfer),
            PlanStep::ChangeTip => self.change_tip(),
            PlanStep::ChangePipette { selector } => self.change_pipette_to(*selector),
            PlanStep::ReturnToOrigin => self.origin(),
        }
    }

    pub fn run_plan(&mut self, plan: &RunPlan) -> anyhow::Result<()> {
        let total = plan.steps.len();
        for (index, step) in plan.steps.iter().enumerate() {
            info!("Step {}/{total}: {step:?}", index + 1);
            self.run_step(step).with_context(|| format!("Step {} ({step:?}) failed", index + 1))?;
        }
        Ok(())
    }

    /// Waits one settle step for the liquid and the plunger to catch up.
    pub fn hold(&mut self) {
        self.hal.settle(self.settle.step());
    }

    /// Returns to the origin, optionally releases the motors and closes the connection.
    pub fn finish(mut self, disable_motors: bool) -> anyhow::Result<()> {
        self.origin()?;
        if disable_motors {
            self.hal.disable()?;
        }
        self.disconnect()
    }

    pub fn disconnect(mut self) -> anyhow::Result<()> {
        self.hal.disconnect().context("Failed to disconnect")
    }

    fn scaled(&self, point: GridPoint) -> (f64, f64) {
        (point.x * self.layout.unit_x, point.y * self.layout.unit_y)
    }
}
