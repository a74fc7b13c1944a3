use std::io::{BufRead, Write};

use anyhow::Context;
use derive_new::new;
use serde::{Deserialize, Serialize};

/// Where the first well sits and how far apart wells are, in plotter units.
#[derive(new, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WellLayout {
    pub origin_x: f64,
    pub origin_y: f64,
    pub unit_x: f64,
    pub unit_y: f64,
}

impl Default for WellLayout {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.8, 0.825)
    }
}

/// Values already known (e.g. from the command line); anything left `None` is asked for.
#[derive(Debug, Default, Clone, Copy)]
pub struct PartialLayout {
    pub origin_x: Option<f64>,
    pub origin_y: Option<f64>,
    pub unit_x: Option<f64>,
    pub unit_y: Option<f64>,
}

impl WellLayout {
    /// Asks for each missing value in turn.  An empty answer keeps the default, anything that
    /// isn't a number is an error.
    pub fn prompt<R: BufRead, W: Write>(
        known: PartialLayout,
        input: &mut R,
        output: &mut W,
    ) -> anyhow::Result<Self> {
        let defaults = WellLayout::default();
        Ok(Self {
            origin_x: prompt_value("Starting X", known.origin_x, defaults.origin_x, input, output)?,
            origin_y: prompt_value("Starting Y", known.origin_y, defaults.origin_y, input, output)?,
            unit_x: prompt_value("X unit", known.unit_x, defaults.unit_x, input, output)?,
            unit_y: prompt_value("Y unit", known.unit_y, defaults.unit_y, input, output)?,
        })
    }
}

fn prompt_value<R: BufRead, W: Write>(
    label: &str,
    known: Option<f64>,
    default: f64,
    input: &mut R,
    output: &mut W,
) -> anyhow::Result<f64> {
    if let Some(value) = known {
        return Ok(value);
    }
    write!(output, "{label} [{default}]: ")?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    let answer = line.trim();
    if answer.is_empty() {
        return Ok(default);
    }
    answer.parse::<f64>().with_context(|| format!("{label}: {answer:?} is not a number"))
}
