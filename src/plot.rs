//! The plot adaptor: a pure transform from a reconstructed histogram to the
//! minimal shape a chart library needs. No rendering policy lives here.

use crate::binning::reconstruct_for_plotting;
use crate::errors::{UxError, UxResult};
use crate::value::DistributionalValue;

/// Render-ready data for a distributional value: a finite-support histogram
/// plus the three special-value bars (NaN, −∞, +∞) a chart overlays
/// alongside it.
///
/// `positions` has one more entry than `masses`/`widths` for any value with
/// two or more finite deltas (boundary positions around `2m` bins); for a
/// value with exactly one finite delta it holds a single point and
/// `widths` is empty (plotted as a Dirac arrow, not a rectangle).
#[derive(Clone, Debug)]
pub struct PlotData {
  pub positions: Vec<f64>,
  pub masses: Vec<f64>,
  pub widths: Vec<f64>,
  pub max_value: f64,
  pub total_range: f64,
  pub min_range: f64,
  pub max_range: f64,
  pub nan_mass: f64,
  pub neg_inf_mass: f64,
  pub pos_inf_mass: f64,
}

impl PlotData {
  /// Builds plot data for `value` at an optional requested resolution (see
  /// [`reconstruct_for_plotting`]).
  ///
  /// Fails with [`crate::errors::ErrorKind::ValidationFailure`] if `value`
  /// has `UR_order == 0` (no mean to plot around), or if the requested
  /// resolution is not a power of two. A value whose finite deltas are all
  /// dropped during normalization is not an error: it returns empty plot
  /// data with a warning already logged by the reconstruction step.
  pub fn new(value: &mut DistributionalValue, resolution: Option<usize>) -> UxResult<PlotData> {
    if value.ur_order() == 0 {
      return Err(UxError::validation_failure(
        "cannot build plot data for a value with UR_order == 0",
      ));
    }

    let reconstruction = reconstruct_for_plotting(value, resolution)?;

    let nan_mass = special_mass(value, f64::NAN);
    let neg_inf_mass = special_mass(value, f64::NEG_INFINITY);
    let pos_inf_mass = special_mass(value, f64::INFINITY);

    if reconstruction.positions.is_empty() {
      return Ok(PlotData {
        positions: vec![],
        masses: vec![],
        widths: vec![],
        max_value: 0.0,
        total_range: 0.0,
        min_range: 0.0,
        max_range: 0.0,
        nan_mass,
        neg_inf_mass,
        pos_inf_mass,
      });
    }

    // Single finite delta: plotted as a Dirac arrow, not a rectangle.
    if reconstruction.widths.is_empty() {
      let p = reconstruction.positions[0];
      return Ok(PlotData {
        max_value: reconstruction.masses[0],
        total_range: 1.0,
        min_range: p - 0.5,
        max_range: p + 0.5,
        positions: reconstruction.positions,
        masses: reconstruction.masses,
        widths: reconstruction.widths,
        nan_mass,
        neg_inf_mass,
        pos_inf_mass,
      });
    }

    let min_range = *reconstruction.positions.first().unwrap();
    let max_range = *reconstruction.positions.last().unwrap();
    let max_value = reconstruction
      .masses
      .iter()
      .cloned()
      .fold(f64::NEG_INFINITY, f64::max);

    Ok(PlotData {
      total_range: max_range - min_range,
      min_range,
      max_range,
      max_value,
      positions: reconstruction.positions,
      masses: reconstruction.masses,
      widths: reconstruction.widths,
      nan_mass,
      neg_inf_mass,
      pos_inf_mass,
    })
  }

  /// `{x0, x1, height, area}` rectangles for the finite-support bins.
  pub fn rectangles(&self) -> Vec<Rectangle> {
    self
      .widths
      .iter()
      .enumerate()
      .map(|(i, &w)| {
        let x0 = self.positions[i];
        let x1 = self.positions[i + 1];
        let height = self.masses[i];
        Rectangle {
          x0,
          x1,
          height,
          area: height * w,
        }
      })
      .collect()
  }

  /// The three scalar bars for the special-value masses, in NaN, −∞, +∞
  /// order.
  pub fn special_bars(&self) -> [f64; 3] {
    [self.nan_mass, self.neg_inf_mass, self.pos_inf_mass]
  }
}

/// A single finite-support plot rectangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rectangle {
  pub x0: f64,
  pub x1: f64,
  pub height: f64,
  pub area: f64,
}

fn special_mass(value: &DistributionalValue, target: f64) -> f64 {
  value
    .deltas()
    .iter()
    .filter(|d| {
      if target.is_nan() {
        d.position().is_nan()
      } else {
        d.position() == target
      }
    })
    .map(|d| d.mass())
    .sum()
}
