use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::plotter_hal::{HalError, HalResult};

const SPEED_RANGE: RangeInclusive<u32> = 1..=110;
const PERCENT_RANGE: RangeInclusive<u32> = 0..=100;
const RATE_RANGE: RangeInclusive<u32> = 1..=100;
const PEN_DELAY_RANGE: RangeInclusive<i32> = -500..=500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotterOptions {
    pub speed_pendown: u32,
    pub speed_penup: u32,
    pub accel: u32,
    pub pen_pos_down: u32,
    pub pen_pos_up: u32,
    pub pen_rate_lower: u32,
    pub pen_rate_raise: u32,
    pub pen_delay_down: i32,
    pub pen_delay_up: i32,
    pub const_speed: bool,
    pub units: Units,
    pub model: Model,
    pub port: Option<String>,
    pub port_config: PortConfig,
}

impl Default for PlotterOptions {
    fn default() -> Self {
        Self {
            speed_pendown: 25,
            speed_penup: 75,
            accel: 75,
            pen_pos_down: 30,
            pen_pos_up: 60,
            pen_rate_lower: 50,
            pen_rate_raise: 75,
            pen_delay_down: 0,
            pen_delay_up: 0,
            const_speed: false,
            units: Units::Inches,
            model: Model::V2V3,
            port: None,
            port_config: PortConfig::FirstFound,
        }
    }
}

impl PlotterOptions {
    /// Options tuned for driving a pipette instead of a pen: full servo travel, metric units and
    /// a long pause after lowering so the tip can seat.
    pub fn pipetting() -> Self {
        let mut options = Self::default();
        options.apply_pipetting_profile();
        options
    }

    pub fn apply_pipetting_profile(&mut self) {
        self.pen_pos_down = 0;
        self.pen_pos_up = 100;
        self.units = Units::Centimeters;
        self.pen_rate_lower = 60;
        self.pen_rate_raise = 100;
        self.pen_delay_down = 500;
    }

    pub fn validate(&self) -> HalResult<()> {
        check_range("speed_pendown", self.speed_pendown, &SPEED_RANGE)?;
        check_range("speed_penup", self.speed_penup, &SPEED_RANGE)?;
        check_range("accel", self.accel, &RATE_RANGE)?;
        check_range("pen_pos_down", self.pen_pos_down, &PERCENT_RANGE)?;
        check_range("pen_pos_up", self.pen_pos_up, &PERCENT_RANGE)?;
        check_range("pen_rate_lower", self.pen_rate_lower, &RATE_RANGE)?;
        check_range("pen_rate_raise", self.pen_rate_raise, &RATE_RANGE)?;
        check_range("pen_delay_down", self.pen_delay_down, &PEN_DELAY_RANGE)?;
        check_range("pen_delay_up", self.pen_delay_up, &PEN_DELAY_RANGE)?;
        if self.port_config == PortConfig::UsePort && self.port.is_none() {
            return Err(HalError::InvalidOption(
                "port_config is use_port but no port was given".to_owned()));
        }
        Ok(())
    }
}

fn check_range<T>(name: &str, value: T, range: &RangeInclusive<T>) -> HalResult<()>
where
    T: PartialOrd + std::fmt::Display,
{
    if range.contains(&value) {
        Ok(())
    } else {
        Err(HalError::InvalidOption(format!(
            "{name}={value} outside {}..={}", range.start(), range.end())))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Units {
    Inches,
    #[serde(alias = "cm")]
    Centimeters,
}

impl Units {
    pub fn to_inches(self, value: f64) -> f64 {
        match self {
            Units::Inches => value,
            Units::Centimeters => value / 2.54,
        }
    }

    pub fn from_inches(self, value: f64) -> f64 {
        match self {
            Units::Inches => value,
            Units::Centimeters => value * 2.54,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Model {
    /// AxiDraw V2, V3 and SE/A4.
    V2V3,
    V3A3,
    V3XLX,
}

impl Model {
    /// Safe XY travel in inches.
    pub fn travel_inches(self) -> (f64, f64) {
        match self {
            Model::V2V3 => (11.81, 8.58),
            Model::V3A3 => (16.93, 11.69),
            Model::V3XLX => (23.42, 8.58),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortConfig {
    /// Use `port` if given, otherwise the first plotter found.
    FirstFound,
    /// Only ever use `port`.
    UsePort,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        PlotterOptions::default().validate().unwrap();
        PlotterOptions::pipetting().validate().unwrap();
    }

    #[test]
    fn test_pipetting_profile() {
        let options = PlotterOptions::pipetting();
        assert_eq!(options.pen_pos_down, 0);
        assert_eq!(options.pen_pos_up, 100);
        assert_eq!(options.units, Units::Centimeters);
        assert_eq!(options.pen_rate_lower, 60);
        assert_eq!(options.pen_rate_raise, 100);
        assert_eq!(options.pen_delay_down, 500);
        assert_eq!(options.speed_penup, PlotterOptions::default().speed_penup);
    }

    #[test]
    fn test_rejects_out_of_range() {
        let mut options = PlotterOptions::default();
        options.speed_pendown = 111;
        assert!(matches!(options.validate(), Err(HalError::InvalidOption(_))));

        let mut options = PlotterOptions::default();
        options.pen_delay_up = -501;
        assert!(matches!(options.validate(), Err(HalError::InvalidOption(_))));

        let mut options = PlotterOptions::default();
        options.pen_rate_raise = 0;
        assert!(matches!(options.validate(), Err(HalError::InvalidOption(_))));
    }

    #[test]
    fn test_use_port_requires_port() {
        let mut options = PlotterOptions::default();
        options.port_config = PortConfig::UsePort;
        assert!(options.validate().is_err());
        options.port = Some("/dev/ttyACM0".to_owned());
        options.validate().unwrap();
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let options: PlotterOptions =
            serde_json::from_str(r#"{ "units": "cm", "speed_penup": 110 }"#).unwrap();
        assert_eq!(options.units, Units::Centimeters);
        assert_eq!(options.speed_penup, 110);
        assert_eq!(options.accel, 75);
    }

    #[test]
    fn test_unit_conversion() {
        assert_eq!(Units::Centimeters.to_inches(2.54), 1.0);
        assert_eq!(Units::Centimeters.from_inches(1.0), 2.54);
        assert_eq!(Units::Inches.to_inches(3.0), 3.0);
    }
}
