use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::plotter_options::PlotterOptions;

/// A position on the well grid, in grid units (scaled by the layout's unit factors).
#[derive(new, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
  pub x: f64,
  pub y: f64,
}

#[derive(new, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
  pub src: GridPoint,
  pub dst: GridPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum PlanStep {
  Transfer(Transfer),
  ChangeTip,
  ChangePipette { selector: u32 },
  ReturnToOrigin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunPlan {
  pub steps: Vec<PlanStep>,
}

impl Default for RunPlan {
  /// Columns 0..=5 of row 0 each dispensed into well (0, 3) with a fresh tip after every
  /// transfer, then column 6 repeated with the second and third pipette.
  fn default() -> Self {
    let column_transfer = |column: u32| PlanStep::Transfer(Transfer::new(
      GridPoint::new(f64::from(column), 0.0),
      GridPoint::new(0.0, 3.0)));

    let mut steps = Vec::new();
    for column in 0..6 {
      steps.push(column_transfer(column));
      steps.push(PlanStep::ChangeTip);
    }
    for selector in [2, 3] {
      steps.push(PlanStep::ChangePipette { selector });
      steps.push(column_transfer(6));
      steps.push(PlanStep::ChangeTip);
    }
    RunPlan { steps }
  }
}

/// Physical settling pauses, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettleTimes {
  pub step_secs: f64,
  pub tip_release_secs: f64,
}

impl Default for SettleTimes {
  fn default() -> Self {
    Self { step_secs: 1.0, tip_release_secs: 3.25 }
  }
}

impl SettleTimes {
  /// Rejects negative, NaN, infinite or absurdly large pauses, which would otherwise panic once
  /// converted to a [`Duration`] mid-run.
  pub fn validate(&self) -> anyhow::Result<()> {
    Duration::try_from_secs_f64(self.step_secs)
        .with_context(|| format!("Invalid step settle time {}", self.step_secs))?;
    Duration::try_from_secs_f64(self.tip_release_secs)
        .with_context(|| format!("Invalid tip release settle time {}", self.tip_release_secs))?;
    Ok(())
  }

  /// Must only be called on validated settle times.
  pub fn step(&self) -> Duration {
    Duration::from_secs_f64(self.step_secs)
  }

  pub fn tip_release(&self) -> Duration {
    Duration::from_secs_f64(self.tip_release_secs)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
  pub options: PlotterOptions,
  pub settle: SettleTimes,
  pub plan: RunPlan,
}

impl Default for RunConfig {
  fn default() -> Self {
    Self {
      options: PlotterOptions::pipetting(),
      settle: SettleTimes::default(),
      plan: RunPlan::default(),
    }
  }
}

impl RunConfig {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let config: RunConfig = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    config.settle.validate()
        .with_context(|| format!("Bad settle section in {}", path.display()))?;
    Ok(config)
  }
}
