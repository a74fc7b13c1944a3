use std::thread;
use std::time::{Duration, Instant};

use conv::{ConvUtil, RoundToNearest};
use log::{debug, info, warn};

use crate::ebb::ebb_connection::EbbConnection;
use crate::ebb::motion_planner::{self, MotionLimits};
use crate::ebb::port_discovery;
use crate::plotter_hal::{HalError, HalResult, PlotterHal};
use crate::plotter_options::PlotterOptions;

/// AxiDraw over the EiBotBoard serial protocol.
///
/// Assumes the carriage was parked in the home corner when `connect()` was called; position is
/// tracked from there in native XY steps so rounding never accumulates.
pub struct PlotterHalEbb {
    options: PlotterOptions,
    connection: Option<EbbConnection>,
    position_steps: (i32, i32),
    pen_is_up: Option<bool>,
}

impl PlotterHalEbb {
    /// At 16x microstepping.
    const STEPS_PER_INCH: f64 = 2032.0;
    const MAX_SPEED_INCHES_PER_SEC: f64 = 8.6979;
    const MAX_ACCEL_INCHES_PER_SEC2: f64 = 40.0;

    /// Pen servo pulse widths, in units of 1/12 us, for 0% and 100% pen height.
    const SERVO_MIN: u32 = 7500;
    const SERVO_MAX: u32 = 28000;
    /// Servo position change per 24ms tick at 100% pen rate.
    const SERVO_RATE_FULL: u32 = 2050;
    const SERVO_TICK_MS: u32 = 24;

    const MOTION_POLL_INTERVAL: Duration = Duration::from_millis(10);
    const MOTION_GRACE: Duration = Duration::from_secs(5);

    pub fn new() -> Self {
        Self {
            options: PlotterOptions::default(),
            connection: None,
            position_steps: (0, 0),
            pen_is_up: None,
        }
    }

    /// Takes over an already opened link, then enables the motors and pushes the options.
    pub fn connect_with(&mut self, mut connection: EbbConnection) -> HalResult<()> {
        let version = connection.query_version()?;
        info!("Connected to {version}");
        connection.command("EM,1,1")?;
        self.connection = Some(connection);
        self.position_steps = (0, 0);
        self.pen_is_up = None;
        self.update()
    }

    fn connection(&mut self) -> HalResult<&mut EbbConnection> {
        self.connection.as_mut().ok_or(HalError::NotConnected)
    }

    fn servo_position(percent: u32) -> u32 {
        Self::SERVO_MIN + (Self::SERVO_MAX - Self::SERVO_MIN) * percent / 100
    }

    fn servo_rate(percent: u32) -> u32 {
        (Self::SERVO_RATE_FULL * percent / 100).max(1)
    }

    fn pen_travel_ms(&self, rate_percent: u32) -> u32 {
        let travel = Self::servo_position(self.options.pen_pos_up)
            .abs_diff(Self::servo_position(self.options.pen_pos_down));
        travel * Self::SERVO_TICK_MS / Self::servo_rate(rate_percent)
    }

    fn move_pen(&mut self, up: bool) -> HalResult<()> {
        if self.pen_is_up == Some(up) {
            return Ok(());
        }
        let (state, rate, delay) = if up {
            (1, self.options.pen_rate_raise, self.options.pen_delay_up)
        } else {
            (0, self.options.pen_rate_lower, self.options.pen_delay_down)
        };
        let travel_ms = i64::from(self.pen_travel_ms(rate));
        let total_ms = (travel_ms + i64::from(delay)).max(0);
        self.connection()?.command(&format!("SP,{state},{total_ms}"))?;
        self.pen_is_up = Some(up);
        self.wait_for_motion(Duration::from_millis(total_ms as u64))
    }

    /// Polls `QM` until the motion queue drains so that host-side timing lines up with the
    /// carriage physically arriving.
    fn wait_for_motion(&mut self, expected: Duration) -> HalResult<()> {
        let deadline = Instant::now() + expected + Self::MOTION_GRACE;
        loop {
            let status = self.connection()?.query("QM")?;
            let mut fields = status.split(',');
            let busy = match (fields.next(), fields.next()) {
                (Some("QM"), Some(command_status)) => command_status != "0",
                _ => {
                    return Err(HalError::Protocol {
                        command: "QM".to_owned(),
                        response: status.clone(),
                    })
                }
            };
            if !busy {
                return Ok(());
            }
            if Instant::now() > deadline {
                return Err(HalError::Protocol {
                    command: "QM".to_owned(),
                    response: format!("still moving after {expected:?}: {status}"),
                });
            }
            thread::sleep(Self::MOTION_POLL_INTERVAL);
        }
    }

    fn to_steps(inches: f64) -> HalResult<i32> {
        (inches * Self::STEPS_PER_INCH)
            .approx_as_by::<i32, RoundToNearest>()
            .map_err(|_| HalError::InvalidOption(format!("position {inches}in out of range")))
    }

    fn motion_limits(&self) -> MotionLimits {
        let speed_percent = if self.pen_is_up == Some(false) {
            self.options.speed_pendown
        } else {
            self.options.speed_penup
        };
        MotionLimits {
            speed: Self::MAX_SPEED_INCHES_PER_SEC * f64::from(speed_percent) / 100.0
                * Self::STEPS_PER_INCH,
            accel: Self::MAX_ACCEL_INCHES_PER_SEC2 * f64::from(self.options.accel) / 100.0
                * Self::STEPS_PER_INCH,
            const_speed: self.options.const_speed,
        }
    }
}

impl Default for PlotterHalEbb {
    fn default() -> Self {
        Self::new()
    }
}

impl PlotterHal for PlotterHalEbb {
    fn options(&self) -> &PlotterOptions {
        &self.options
    }

    fn options_mut(&mut self) -> &mut PlotterOptions {
        &mut self.options
    }

    fn connect(&mut self) -> HalResult<()> {
        self.options.validate()?;
        let port = port_discovery::resolve_port(&self.options)?;
        info!("Opening {}...", port.display());
        let connection = EbbConnection::open(&port)?;
        self.connect_with(connection)
    }

    fn update(&mut self) -> HalResult<()> {
        self.options.validate()?;
        let commands = [
            format!("SC,4,{}", Self::servo_position(self.options.pen_pos_up)),
            format!("SC,5,{}", Self::servo_position(self.options.pen_pos_down)),
            format!("SC,11,{}", Self::servo_rate(self.options.pen_rate_raise)),
            format!("SC,12,{}", Self::servo_rate(self.options.pen_rate_lower)),
        ];
        let connection = self.connection()?;
        for command in &commands {
            connection.command(command)?;
        }
        // New servo limits only apply on the next SP, so don't trust the cached pen state.
        self.pen_is_up = None;
        Ok(())
    }

    fn disconnect(&mut self) -> HalResult<()> {
        if self.connection.take().is_some() {
            info!("Disconnected");
        }
        Ok(())
    }

    fn goto(&mut self, x: f64, y: f64) -> HalResult<()> {
        self.connection()?;
        let units = self.options.units;
        let (max_x, max_y) = self.options.model.travel_inches();
        let (x_in, y_in) = (units.to_inches(x), units.to_inches(y));
        let clamped = (x_in.clamp(0.0, max_x), y_in.clamp(0.0, max_y));
        if clamped != (x_in, y_in) {
            warn!("goto({x}, {y}) is outside the safe travel range, clamping");
        }

        let target = (Self::to_steps(clamped.0)?, Self::to_steps(clamped.1)?);
        let (dx, dy) = (target.0 - self.position_steps.0, target.1 - self.position_steps.1);
        let segments = motion_planner::plan_move(dx, dy, &self.motion_limits());
        debug!("goto({x}, {y}): {dx},{dy} steps in {} segments", segments.len());
        if segments.is_empty() {
            return Ok(());
        }

        let connection = self.connection()?;
        for segment in &segments {
            connection.command(&segment.to_command())?;
        }
        self.position_steps = target;
        let expected = motion_planner::total_duration_ms(&segments);
        self.wait_for_motion(Duration::from_millis(expected))
    }

    fn pen_up(&mut self) -> HalResult<()> {
        self.move_pen(true)
    }

    fn pen_down(&mut self) -> HalResult<()> {
        self.move_pen(false)
    }

    fn usb_command(&mut self, command: &str) -> HalResult<String> {
        self.connection()?.raw(command)
    }

    fn disable(&mut self) -> HalResult<()> {
        self.connection()?.command("EM,0,0")
    }

    fn current_position(&self) -> (f64, f64) {
        let units = self.options.units;
        (
            units.from_inches(f64::from(self.position_steps.0) / Self::STEPS_PER_INCH),
            units.from_inches(f64::from(self.position_steps.1) / Self::STEPS_PER_INCH),
        )
    }

    fn settle(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use crate::ebb::ebb_connection::tests::{scripted_connection, SharedBuffer};
    use crate::plotter_options::Units;

    use super::*;

    const VERSION: &str = "EBBv13_and_above EB Firmware Version 2.8.1\r\n";
    const OK: &str = "OK\r\n";
    const IDLE: &str = "QM,0,0,0,0\r\n";

    fn connected_hal(extra_responses: &str) -> (PlotterHalEbb, SharedBuffer) {
        // EM,1,1 plus the four SC commands from update().
        let responses = format!("{VERSION}{}{extra_responses}", OK.repeat(5));
        let (connection, sent) = scripted_connection(&responses);
        let mut hal = PlotterHalEbb::new();
        hal.options_mut().const_speed = true;
        hal.connect_with(connection).unwrap();
        (hal, sent)
    }

    fn sent_commands(sent: &SharedBuffer) -> Vec<String> {
        sent.contents().split('\r').filter(|c| !c.is_empty()).map(str::to_owned).collect()
    }

    #[test]
    fn test_connect_pushes_servo_config() {
        let (_hal, sent) = connected_hal("");
        assert_eq!(
            sent_commands(&sent),
            vec!["V", "EM,1,1", "SC,4,19800", "SC,5,13650", "SC,11,1537", "SC,12,1025"]);
    }

    #[test]
    fn test_commands_require_connection() {
        let mut hal = PlotterHalEbb::new();
        assert!(matches!(hal.goto(1.0, 1.0), Err(HalError::NotConnected)));
        assert!(matches!(hal.usb_command("S2,1,6\r"), Err(HalError::NotConnected)));
        assert!(matches!(hal.update(), Err(HalError::NotConnected)));
    }

    #[test]
    fn test_goto_sends_mixed_axis_moves() {
        let (mut hal, sent) = connected_hal(&format!("{OK}{IDLE}{OK}{IDLE}"));
        hal.goto(1.0, 0.0).unwrap();
        hal.goto(1.0, 0.5).unwrap();
        assert_eq!(hal.current_position(), (1.0, 0.5));

        let commands = sent_commands(&sent);
        assert_eq!(commands[6], "SM,154,2032,2032");
        assert_eq!(commands[7], "QM");
        assert_eq!(commands[8], "SM,77,1016,-1016");
    }

    #[test]
    fn test_goto_clamps_to_travel() {
        let (mut hal, _sent) = connected_hal(&format!("{OK}{IDLE}"));
        hal.goto(-3.0, 100.0).unwrap();
        let (x, y) = hal.current_position();
        assert_eq!(x, 0.0);
        assert!((y - 8.58).abs() < 0.001);
    }

    #[test]
    fn test_goto_in_centimeters() {
        let (mut hal, sent) = connected_hal(&format!("{OK}{IDLE}"));
        hal.options_mut().units = Units::Centimeters;
        hal.goto(2.54, 0.0).unwrap();
        assert!(sent_commands(&sent)[6].ends_with(",2032,2032"));
    }

    #[test]
    fn test_redundant_pen_moves_are_skipped() {
        let (mut hal, sent) = connected_hal(&format!("{OK}{IDLE}{OK}{IDLE}"));
        hal.pen_up().unwrap();
        hal.pen_up().unwrap();
        hal.pen_down().unwrap();

        let commands = sent_commands(&sent);
        assert_eq!(&commands[6..], &["SP,1,96", "QM", "SP,0,144", "QM"]);
    }

    #[test]
    fn test_usb_command_is_verbatim() {
        let (mut hal, sent) = connected_hal(OK);
        assert_eq!(hal.usb_command("S2,11650,6\r\r").unwrap(), "OK");
        assert!(sent.contents().ends_with("S2,11650,6\r\r"));
    }

    #[test]
    fn test_update_validates_first() {
        let (mut hal, sent) = connected_hal("");
        hal.options_mut().pen_pos_up = 101;
        assert!(matches!(hal.update(), Err(HalError::InvalidOption(_))));
        assert_eq!(sent_commands(&sent).len(), 6);
    }

    #[test]
    fn test_disconnect_drops_link() {
        let (mut hal, _sent) = connected_hal("");
        hal.disconnect().unwrap();
        assert!(matches!(hal.disable(), Err(HalError::NotConnected)));
    }
}
