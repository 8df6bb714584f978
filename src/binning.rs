//! The TTR binning engine: reconstructs a piecewise-constant histogram from
//! a set of weighted points such that the histogram's k-th-order TTR
//! reproduces those points, and the inverse (`bin_pdf_to_ttr`).

use tracing::warn;

use crate::delta::DiracDelta;
use crate::errors::{UxError, UxResult};
use crate::value::DistributionalValue;

/// A piecewise-constant PDF over a finite support: `boundary_positions` has
/// one more entry than `bin_widths`/`bin_heights`, which describe the
/// `2m` bins straddling `m` input deltas.
#[derive(Clone, Debug)]
pub struct Histogram {
  pub boundary_positions: Vec<f64>,
  pub bin_widths: Vec<f64>,
  pub bin_heights: Vec<f64>,
}

/// Splits `mass` between two adjacent bins of widths `w_a`, `w_b` such
/// that their *average* height equals `mass / (w_a + w_b)`, putting the
/// pair's center of mass at the shared delta position with total
/// probability `mass` (§4.5, "Internal bin widths and heights").
fn split_bin_pair(mass: f64, w_a: f64, w_b: f64) -> (f64, f64) {
  let avg_h = mass / (w_a + w_b);
  (avg_h * w_b / w_a, avg_h * w_a / w_b)
}

/// Fills the boundary slot at `i-step`/`i+step`-averaged positions for
/// internal boundaries, in either TTR mode (iterative coalescence) or
/// non-TTR mode (mass-weighted mean of the two neighboring deltas), with
/// TTR results repaired by falling back to the non-TTR formula whenever a
/// slot is NaN or not strictly between its neighbors.
fn determine_boundary_positions(
  deltas: &[DiracDelta],
  use_ttr_binning: bool,
  exponent: usize,
) -> (Vec<f64>, Vec<f64>) {
  let m = deltas.len();
  let mut bp = vec![f64::NAN; 2 * m + 1];
  let mut bm = vec![0.0; 2 * m + 1];
  for (i, d) in deltas.iter().enumerate() {
    bp[2 * i + 1] = d.position();
    bm[2 * i + 1] = d.mass();
  }

  if use_ttr_binning {
    let k = exponent;
    for n in 0..k {
      let step = 1usize << n;
      let mut i = 1usize << (n + 1);
      while i < 2 * m {
        let lo = i - step;
        let hi = i + step;
        let total = bm[lo] + bm[hi];
        bp[i] = (bp[lo] * bm[lo] + bp[hi] * bm[hi]) / total;
        bm[i] = total;
        i += 1usize << (n + 2);
      }
    }
  }

  // Repair (and, in non-TTR mode, define) every internal boundary: a slot
  // not strictly between its neighboring delta positions falls back to
  // their mass-weighted mean. In non-TTR mode this formula is the
  // definition, so every slot is left untouched by the sweep above and
  // gets filled here.
  for i in (2..2 * m).step_by(2) {
    let lo = bp[i - 1];
    let hi = bp[i + 1];
    let ok = bp[i].is_finite() && bp[i] > lo && bp[i] < hi;
    if !ok {
      bp[i] = (lo * bm[i - 1] + hi * bm[i + 1]) / (bm[i - 1] + bm[i + 1]);
      bm[i] = bm[i - 1] + bm[i + 1];
    }
  }

  (bp, bm)
}

/// Attempts the zero-second-derivative boundary condition for an extremal
/// bin: solves `a*w0^2 + b*w0 + c = 0` for the extremal bin width `w0` and
/// returns the chosen positive root, or `None` if no positive root exists
/// (including when the discriminant is not a finite, non-negative number —
/// the corrected form of the original condition, which as literally
/// written ("det is finite or NaN") fires on almost every input).
fn quadratic_extremal_width(p0: f64, w1: f64, w2: f64, d2: f64) -> Option<f64> {
  let a = d2 * w1 - p0;
  if a == 0.0 {
    return None;
  }
  let b = a * w1 - p0 * w2;
  let c = p0 * w1 * (w1 + w2);
  let det = b * b - 4.0 * a * c;
  if !det.is_finite() || det < 0.0 {
    return None;
  }
  let sqrt_det = det.sqrt();
  let r1 = (-b + sqrt_det) / (2.0 * a);
  let r2 = (-b - sqrt_det) / (2.0 * a);
  let mut positive_roots: Vec<f64> = [r1, r2].into_iter().filter(|r| *r > 0.0).collect();
  if positive_roots.is_empty() {
    return None;
  }
  positive_roots.sort_by(|a, b| a.partial_cmp(b).unwrap());
  Some(positive_roots[0])
}

/// Builds the `2m`-bin histogram for a finite, sorted delta list of length
/// `m >= 2`, given its already-determined internal boundaries and the
/// heights of its two internal-most bins (index 2 from the left, index
/// `2m-3` from the right) when available.
fn handle_extremal_bins(bp: &mut [f64], deltas: &[DiracDelta], internal_heights: &[f64]) {
  let m = deltas.len();
  let n = 2 * m;

  let left_w0 = if m >= 6 {
    let w1 = bp[2] - bp[1];
    let w2 = bp[3] - bp[2];
    let d2 = internal_heights[2];
    let p0 = deltas[0].mass();
    quadratic_extremal_width(p0, w1, w2, d2)
  } else {
    None
  };
  let w0 = left_w0.unwrap_or(bp[2] - bp[1]);
  bp[0] = bp[1] - w0;

  let right_wn = if m >= 6 {
    let w1 = bp[n - 1] - bp[n - 2];
    let w2 = bp[n - 2] - bp[n - 3];
    let d2 = internal_heights[n - 3];
    let p0 = deltas[m - 1].mass();
    quadratic_extremal_width(p0, w1, w2, d2)
  } else {
    None
  };
  let wn = right_wn.unwrap_or(bp[n - 1] - bp[n - 2]);
  bp[n] = bp[n - 1] + wn;
}

/// Core binning construction for a finite, sorted delta list of length
/// `m >= 2`. `exponent` is only meaningful when `use_ttr_binning` is true.
fn get_binning(deltas: &[DiracDelta], exponent: usize, use_ttr_binning: bool) -> Histogram {
  let m = deltas.len();
  let (mut bp, _bm) = determine_boundary_positions(deltas, use_ttr_binning, exponent);

  // Internal bin heights, for every delta strictly between the two ends.
  let mut heights = vec![0.0; 2 * m];
  for i in 1..=m.saturating_sub(2) {
    let w_a = bp[2 * i + 1] - bp[2 * i];
    let w_b = bp[2 * i + 2] - bp[2 * i + 1];
    let (h_a, h_b) = split_bin_pair(deltas[i].mass(), w_a, w_b);
    heights[2 * i] = h_a;
    heights[2 * i + 1] = h_b;
  }

  handle_extremal_bins(&mut bp, deltas, &heights);

  let w0 = bp[1] - bp[0];
  let w1 = bp[2] - bp[1];
  let (h0, h1) = split_bin_pair(deltas[0].mass(), w0, w1);
  heights[0] = h0;
  heights[1] = h1;

  let n = 2 * m;
  let w_last = bp[n] - bp[n - 1];
  let w_prev = bp[n - 1] - bp[n - 2];
  let (h_prev, h_last) = split_bin_pair(deltas[m - 1].mass(), w_prev, w_last);
  heights[n - 2] = h_prev;
  heights[n - 1] = h_last;

  let widths: Vec<f64> = bp.windows(2).map(|w| w[1] - w[0]).collect();

  Histogram {
    boundary_positions: bp,
    bin_widths: widths,
    bin_heights: heights,
  }
}

/// Public entry point: builds the `2m`-bin histogram whose k-th-order TTR
/// reproduces `deltas` (when `use_ttr_binning` and `deltas.len() ==
/// 2^exponent`), or a non-TTR interpolated histogram otherwise.
pub fn create_binning(deltas: &[DiracDelta], exponent: usize, use_ttr_binning: bool) -> Histogram {
  assert!(
    deltas.len() >= 2,
    "create_binning requires at least 2 deltas; a single delta plots as a Dirac arrow instead"
  );
  get_binning(deltas, exponent, use_ttr_binning)
}

fn bin_pdf_to_ttr_inner(boundaries: &[f64], heights: &[f64], order: usize) -> Vec<DiracDelta> {
  let mut weighted_sum = 0.0;
  let mut total_mass = 0.0;
  for (i, &h) in heights.iter().enumerate() {
    let w = boundaries[i + 1] - boundaries[i];
    let mass = w * h;
    let mid = (boundaries[i] + boundaries[i + 1]) / 2.0;
    weighted_sum += mid * mass;
    total_mass += mass;
  }
  let position = weighted_sum / total_mass;

  if order == 0 {
    return vec![DiracDelta::from_mass(position, total_mass)];
  }

  let (new_boundaries, new_heights, split_idx) =
    match boundaries.iter().position(|&b| b == position) {
      Some(i) => (boundaries.to_vec(), heights.to_vec(), i),
      None => {
        let i = boundaries
          .iter()
          .position(|&b| b > position)
          .expect("expected delta position within histogram support");
        let mut nb = Vec::with_capacity(boundaries.len() + 1);
        nb.extend_from_slice(&boundaries[..i]);
        nb.push(position);
        nb.extend_from_slice(&boundaries[i..]);

        let mut nh = Vec::with_capacity(heights.len() + 1);
        nh.extend_from_slice(&heights[..i - 1]);
        nh.push(heights[i - 1]);
        nh.push(heights[i - 1]);
        nh.extend_from_slice(&heights[i..]);

        (nb, nh, i)
      }
    };

  let left_b = &new_boundaries[..=split_idx];
  let left_h = &new_heights[..split_idx];
  let right_b = &new_boundaries[split_idx..];
  let right_h = &new_heights[split_idx..];

  let mut left = bin_pdf_to_ttr_inner(left_b, left_h, order - 1);
  let right = bin_pdf_to_ttr_inner(right_b, right_h, order - 1);
  left.extend(right);
  left
}

/// Computes the TTR of a bin PDF: the `2^order` Dirac deltas obtained by
/// recursively locating the expected-value point, splitting the histogram
/// there, and recursing on both halves.
pub fn bin_pdf_to_ttr(histogram: &Histogram, order: usize) -> Vec<DiracDelta> {
  bin_pdf_to_ttr_inner(&histogram.boundary_positions, &histogram.bin_heights, order)
}

/// The positions/masses/widths a plot needs, produced by the top-level
/// reconstruction pipeline of §4.5: normalize, seed a non-TTR histogram,
/// take its TTR at the plotting resolution, then rebuild with TTR binning
/// at that resolution.
pub struct Reconstruction {
  pub positions: Vec<f64>,
  pub masses: Vec<f64>,
  pub widths: Vec<f64>,
}

fn floor_log2(x: usize) -> u32 {
  (usize::BITS - 1) - x.leading_zeros()
}

/// Runs the full reconstruction pipeline against `value`, which is
/// normalized in place (drop-zero-mass, then cure at default thresholds).
///
/// Returns a validation error if the effective plotting resolution is not
/// a power of two. Returns an empty reconstruction (with a warning, not an
/// error) if no finite deltas remain after normalization.
pub fn reconstruct_for_plotting(
  value: &mut DistributionalValue,
  resolution: Option<usize>,
) -> UxResult<Reconstruction> {
  value.drop_zero_mass();
  value.combine_dirac_deltas(
    crate::value::DEFAULT_RELATIVE_MEAN_THRESHOLD,
    crate::value::DEFAULT_RELATIVE_RANGE_THRESHOLD,
  );

  let finite: Vec<DiracDelta> = value.finite_deltas().into_iter().copied().collect();
  if finite.is_empty() {
    warn!("normalization left zero finite deltas; returning empty plot data");
    return Ok(Reconstruction {
      positions: vec![],
      masses: vec![],
      widths: vec![],
    });
  }
  if finite.len() == 1 {
    return Ok(Reconstruction {
      positions: vec![finite[0].position()],
      masses: vec![finite[0].mass()],
      widths: vec![],
    });
  }

  let ur_order = value.ur_order();
  let machine_representation = 1usize << floor_log2(ur_order);
  let default_resolution = 2 * machine_representation;
  let requested_resolution = resolution
    .map(|r| r.min(default_resolution))
    .unwrap_or(default_resolution);
  if !requested_resolution.is_power_of_two() {
    return Err(UxError::validation_failure(format!(
      "plotting resolution {} is not a power of two",
      requested_resolution
    )));
  }
  let plotting_ttr_order = (requested_resolution.trailing_zeros() as i64 - 1).max(0) as usize;

  let seed = create_binning(&finite, 0, false);
  let ttr_deltas = bin_pdf_to_ttr(&seed, plotting_ttr_order);
  let final_histogram = create_binning(&ttr_deltas, plotting_ttr_order, true);

  Ok(Reconstruction {
    positions: final_histogram.boundary_positions,
    masses: final_histogram.bin_heights,
    widths: final_histogram.bin_widths,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::value::ttr_coalescence_strictly_increasing;

  fn deltas(points: &[(f64, f64)]) -> Vec<DiracDelta> {
    points
      .iter()
      .map(|&(p, m)| DiracDelta::from_mass(p, m))
      .collect()
  }

  #[test]
  fn test_non_ttr_binning_strictly_ascending_and_mass_conserving() {
    let d = deltas(&[(0.0, 0.5), (1.0, 0.25), (3.0, 0.25)]);
    let hist = create_binning(&d, 0, false);
    assert_eq!(hist.boundary_positions.len(), 7);
    assert!(hist
      .boundary_positions
      .windows(2)
      .all(|w| w[0] < w[1]));
    let total: f64 = hist
      .bin_widths
      .iter()
      .zip(&hist.bin_heights)
      .map(|(w, h)| w * h)
      .sum();
    assert!((total - 1.0).abs() < 1e-9);

    // the two inner boundaries are the mass-weighted means of adjacent deltas
    let expected_inner = (0.0 * 0.5 + 1.0 * 0.25) / 0.75;
    assert!((hist.boundary_positions[2] - expected_inner).abs() < 1e-9);
  }

  #[test]
  fn test_ttr_round_trip_four_points() {
    let d = deltas(&[(-1.0, 0.25), (0.0, 0.25), (1.0, 0.25), (2.0, 0.25)]);
    assert!(ttr_coalescence_strictly_increasing(&d));
    let hist = create_binning(&d, 2, true);
    assert_eq!(hist.bin_heights.len(), 8);
    assert!(hist
      .boundary_positions
      .windows(2)
      .all(|w| w[0] < w[1]));

    let recovered = bin_pdf_to_ttr(&hist, 2);
    assert_eq!(recovered.len(), 4);
    for (orig, got) in d.iter().zip(&recovered) {
      assert!((orig.position() - got.position()).abs() < 1e-9);
      assert!((orig.mass() - got.mass()).abs() < 1e-9);
    }
  }

  #[test]
  fn test_resolution_clamping() {
    let mut value = DistributionalValue::new(
      None,
      0,
      deltas(&[
        (0.0, 0.125),
        (1.0, 0.125),
        (2.0, 0.125),
        (3.0, 0.125),
        (4.0, 0.125),
        (5.0, 0.125),
        (6.0, 0.125),
        (7.0, 0.125),
      ]),
      true,
    );
    let reconstruction = reconstruct_for_plotting(&mut value, Some(64)).unwrap();
    // 16 bins => 17 boundaries, matching plotting_ttr_order = 3
    assert_eq!(reconstruction.positions.len(), 17);
    assert_eq!(reconstruction.widths.len(), 16);
  }

  #[test]
  fn test_non_power_of_two_resolution_is_validation_error() {
    let mut value = DistributionalValue::new(
      None,
      0,
      deltas(&[(0.0, 0.5), (1.0, 0.25), (2.0, 0.25)]),
      true,
    );
    assert!(reconstruct_for_plotting(&mut value, Some(5)).is_err());
  }

  #[test]
  fn test_single_finite_delta_is_a_dirac_arrow() {
    let mut value = DistributionalValue::new(None, 0, deltas(&[(3.0, 1.0)]), true);
    let reconstruction = reconstruct_for_plotting(&mut value, None).unwrap();
    assert_eq!(reconstruction.positions, vec![3.0]);
    assert_eq!(reconstruction.masses, vec![1.0]);
  }
}
