//! Parameter metadata for the correlation analyzer
//!
//! This module describes the analyzer's tunable parameters, enabling:
//! - Threshold grids for the score sweep
//! - Validation of externally supplied parameter maps
//! - Parameter documentation
//!
//! # Example
//!
//! ```rust
//! use surgescan::params::{ThresholdGrid, ANALYZER_PARAMS};
//!
//! let grid = ThresholdGrid::new(40.0, 120.0, 20.0).unwrap();
//! assert_eq!(grid.values(), vec![40.0, 60.0, 80.0, 100.0, 120.0]);
//!
//! for param in ANALYZER_PARAMS {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{PipelineError, Result};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Sample-size style value (positive integer)
  Count,
  /// Percent gain (may exceed 100)
  Percent,
}

/// Metadata for a single analyzer parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name (e.g., "min_sample")
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: f64,
  /// Accepted range: (min, max, step)
  pub range: (f64, f64, f64),
  pub description: &'static str,
}

impl ParamMeta {
  pub const fn count(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Count, default, range, description }
  }

  pub const fn percent(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Percent, default, range, description }
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max, _) = self.range;
    if !value.is_finite() || value < min || value > max {
      return Err(PipelineError::InvalidArgument(format!(
        "{} = {} out of range [{}, {}]",
        self.name, value, min, max
      )));
    }
    if self.param_type == ParamType::Count && value.fract() != 0.0 {
      return Err(PipelineError::InvalidArgument(format!("{} must be an integer", self.name)));
    }
    Ok(())
  }

  /// Value from `params`, falling back to the default, validated
  pub fn resolve(&self, params: &HashMap<&str, f64>) -> Result<f64> {
    let value = params.get(self.name).copied().unwrap_or(self.default);
    self.validate(value)?;
    Ok(value)
  }
}

/// Minimum stocks above a threshold before it can be reported as optimal
pub const MIN_SAMPLE: ParamMeta = ParamMeta::count(
  "min_sample",
  10.0,
  (1.0, 10_000.0, 1.0),
  "Minimum stocks above a threshold for it to qualify as the best threshold",
);

/// Forward gain that makes a stock a true positive
pub const TRUE_POSITIVE_GAIN: ParamMeta = ParamMeta::percent(
  "true_positive_gain",
  500.0,
  (0.0, 100_000.0, 50.0),
  "Forward gain in percent at or above which a stock counts as a true positive",
);

pub const ANALYZER_PARAMS: &[ParamMeta] = &[MIN_SAMPLE, TRUE_POSITIVE_GAIN];

// ============================================================
// THRESHOLD GRID
// ============================================================

/// Evenly spaced score thresholds, `min..=max` by `step`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdGrid {
  pub min: f64,
  pub max: f64,
  pub step: f64,
}

impl Default for ThresholdGrid {
  fn default() -> Self {
    Self { min: 40.0, max: 120.0, step: 10.0 }
  }
}

impl ThresholdGrid {
  pub fn new(min: f64, max: f64, step: f64) -> Result<Self> {
    let grid = Self { min, max, step };
    grid.validate()?;
    Ok(grid)
  }

  pub fn validate(&self) -> Result<()> {
    if !(self.min.is_finite() && self.max.is_finite() && self.step.is_finite()) {
      return Err(PipelineError::InvalidArgument("threshold grid must be finite".into()));
    }
    if self.step <= 0.0 {
      return Err(PipelineError::InvalidArgument("threshold step must be > 0".into()));
    }
    if self.min > self.max {
      return Err(PipelineError::InvalidArgument("threshold min exceeds max".into()));
    }
    Ok(())
  }

  /// All grid values, computed from the index so steps never drift
  pub fn values(&self) -> Vec<f64> {
    let steps = ((self.max - self.min) / self.step + 1e-9).floor() as usize;
    (0..=steps).map(|i| self.min + i as f64 * self.step).collect()
  }
}

// ============================================================
// TESTS
// ============================================================
