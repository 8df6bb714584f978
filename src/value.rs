//! The distributional value model: a container of Dirac deltas plus
//! metadata, its normalization pipeline, and its TTR validity check.

use crate::delta::{cmp_by_position, DiracDelta};

/// Default thresholds used by [`DistributionalValue::combine_dirac_deltas`]
/// when invoked as part of top-level normalization (see §4.5's
/// "Normalize the input value" step).
pub const DEFAULT_RELATIVE_MEAN_THRESHOLD: f64 = 1e-14;
pub const DEFAULT_RELATIVE_RANGE_THRESHOLD: f64 = 1e-12;

/// A discrete probability measure: a sequence of weighted points plus the
/// metadata a Ux wire value carries alongside them.
///
/// `deltas` holds finite-position deltas first (ascending, once sorted),
/// followed by the reserved special-value deltas (NaN, -inf, +inf, in that
/// order) whenever one of them has positive mass — see [`Self::sort`].
#[derive(Clone, Debug)]
pub struct DistributionalValue {
  pub particle_value: Option<f64>,
  pub ur_type: u8,
  pub double_precision: bool,
  deltas: Vec<DiracDelta>,

  mean_cache: Option<Option<f64>>,
  variance_cache: Option<Option<f64>>,
  has_no_zero_mass: Option<bool>,
  is_sorted: Option<bool>,
  is_cured: Option<bool>,
  is_finite_cache: Option<bool>,
  is_full_valid_ttr: Option<bool>,
}

impl DistributionalValue {
  pub fn new(
    particle_value: Option<f64>,
    ur_type: u8,
    deltas: Vec<DiracDelta>,
    double_precision: bool,
  ) -> Self {
    DistributionalValue {
      particle_value,
      ur_type,
      double_precision,
      deltas,
      mean_cache: None,
      variance_cache: None,
      has_no_zero_mass: None,
      is_sorted: None,
      is_cured: None,
      is_finite_cache: None,
      is_full_valid_ttr: None,
    }
  }

  fn invalidate_all(&mut self) {
    self.mean_cache = None;
    self.variance_cache = None;
    self.is_finite_cache = None;
    self.is_full_valid_ttr = None;
  }

  /// Total number of deltas after normalization (invariant 5 of the
  /// distributional value model).
  pub fn ur_order(&self) -> usize {
    self.deltas.len()
  }

  pub fn deltas(&self) -> &[DiracDelta] {
    &self.deltas
  }

  pub fn has_special_values(&self) -> bool {
    self.deltas.iter().any(|d| !d.position().is_finite())
  }

  /// Whether every delta sits at a finite position. Cached; invalidated by
  /// any mutator that can change the delta set.
  pub fn is_finite(&mut self) -> bool {
    if self.is_finite_cache.is_none() {
      self.is_finite_cache = Some(!self.has_special_values());
    }
    self.is_finite_cache.unwrap()
  }

  /// Deltas at finite positions, in current order.
  pub fn finite_deltas(&self) -> Vec<&DiracDelta> {
    self
      .deltas
      .iter()
      .filter(|d| d.position().is_finite())
      .collect()
  }

  pub fn positions(&self) -> Vec<f64> {
    self.deltas.iter().map(|d| d.position()).collect()
  }

  pub fn masses(&self) -> Vec<f64> {
    self.deltas.iter().map(|d| d.mass()).collect()
  }

  /// Removes every delta with zero mass. Sets `has_no_zero_mass = true`.
  pub fn drop_zero_mass(&mut self) {
    self.invalidate_all();
    self.is_sorted = None;
    self.is_cured = None;
    self.deltas.retain(|d| d.mass() != 0.0);
    self.has_no_zero_mass = Some(true);
  }

  /// Partitions deltas into {finite, NaN, -inf, +inf}, sorts finite deltas
  /// ascending by position, and appends the special reservoirs (in order
  /// NaN, -inf, +inf) to the tail whenever their summed mass is positive.
  ///
  /// Note: a Dirac delta's finiteness is determined by testing its
  /// `position`, never the delta value itself — an earlier implementation
  /// of this check reportedly tested finiteness of the delta object rather
  /// than its position, which always evaluates false. This implementation
  /// always tests `delta.position()`.
  pub fn sort(&mut self) {
    self.invalidate_all();
    self.has_no_zero_mass = None;
    self.is_cured = None;

    let mut finite = Vec::with_capacity(self.deltas.len());
    let mut nan_raw = 0u64;
    let mut neg_inf_raw = 0u64;
    let mut pos_inf_raw = 0u64;
    for d in self.deltas.drain(..) {
      let p = d.position();
      if p.is_nan() {
        nan_raw += d.raw_mass();
      } else if p == f64::NEG_INFINITY {
        neg_inf_raw += d.raw_mass();
      } else if p == f64::INFINITY {
        pos_inf_raw += d.raw_mass();
      } else {
        finite.push(d);
      }
    }
    finite.sort_by(cmp_by_position);

    self.deltas = finite;
    if nan_raw > 0 {
      self.deltas.push(DiracDelta::new(f64::NAN, nan_raw));
    }
    if neg_inf_raw > 0 {
      self
        .deltas
        .push(DiracDelta::new(f64::NEG_INFINITY, neg_inf_raw));
    }
    if pos_inf_raw > 0 {
      self
        .deltas
        .push(DiracDelta::new(f64::INFINITY, pos_inf_raw));
    }
    self.is_sorted = Some(true);
  }

  /// Exact-position de-duplication: `combine_dirac_deltas(0.0, 0.0)`.
  pub fn cure(&mut self) {
    self.combine_dirac_deltas(0.0, 0.0);
  }

  /// Merges adjacent finite deltas whose positions are within
  /// `threshold = max(|finite_mean| * relative_mean_threshold, (max -
  /// min) * relative_range_threshold)` of each other, via [`DiracDelta::combine`].
  ///
  /// Ensures the value is sorted first — `sort` and `combine_dirac_deltas`
  /// commute for this reason: whichever is called first sorts, and the
  /// second is then a no-op on ordering.
  pub fn combine_dirac_deltas(&mut self, relative_mean_threshold: f64, relative_range_threshold: f64) {
    if self.is_sorted != Some(true) {
      self.sort();
    }
    self.invalidate_all();

    let finite_count = self
      .deltas
      .iter()
      .take_while(|d| d.position().is_finite())
      .count();
    let finite: Vec<DiracDelta> = self.deltas.drain(0..finite_count).collect();
    let specials: Vec<DiracDelta> = std::mem::take(&mut self.deltas);

    let merged = if finite.is_empty() {
      finite
    } else {
      let finite_mean = weighted_mean(&finite);
      let min_pos = finite.first().unwrap().position();
      let max_pos = finite.last().unwrap().position();
      let threshold = (finite_mean.abs() * relative_mean_threshold)
        .max((max_pos - min_pos) * relative_range_threshold);

      let mut merged = Vec::with_capacity(finite.len());
      let mut iter = finite.into_iter();
      let mut current = iter.next().unwrap();
      for next in iter {
        if (next.position() - current.position()).abs() <= threshold {
          current = current.combine(&next);
        } else {
          merged.push(current);
          current = next;
        }
      }
      merged.push(current);
      merged
    };

    self.deltas = merged;
    self.deltas.extend(specials);
    self.is_cured = Some(true);
  }

  fn compute_mean(&self) -> Option<f64> {
    if self.deltas.is_empty() {
      return None;
    }
    let mut nan_mass = 0.0;
    let mut neg_mass = 0.0;
    let mut pos_mass = 0.0;
    let mut weighted_sum = 0.0;
    let mut finite_mass = 0.0;
    for d in &self.deltas {
      let p = d.position();
      if p.is_nan() {
        nan_mass += d.mass();
      } else if p == f64::NEG_INFINITY {
        neg_mass += d.mass();
      } else if p == f64::INFINITY {
        pos_mass += d.mass();
      } else {
        weighted_sum += p * d.mass();
        finite_mass += d.mass();
      }
    }

    if nan_mass > 0.0 {
      Some(f64::NAN)
    } else if neg_mass > 0.0 && pos_mass > 0.0 {
      Some(f64::NAN)
    } else if neg_mass > 0.0 {
      Some(f64::NEG_INFINITY)
    } else if pos_mass > 0.0 {
      Some(f64::INFINITY)
    } else {
      Some(weighted_sum / finite_mass)
    }
  }

  /// `None` when `UR_order == 0`. Otherwise NaN if any NaN-position delta
  /// has positive mass, NaN if both infinities have positive mass, the
  /// signed infinity if only one does, and the mass-weighted mean of
  /// finite deltas otherwise.
  pub fn mean(&mut self) -> Option<f64> {
    if self.mean_cache.is_none() {
      self.mean_cache = Some(self.compute_mean());
    }
    self.mean_cache.unwrap()
  }

  fn compute_variance(&self) -> Option<f64> {
    let mean = self.compute_mean()?;
    if !mean.is_finite() {
      return None;
    }
    let mut weighted_sq_sum = 0.0;
    let mut finite_mass = 0.0;
    for d in &self.deltas {
      if d.position().is_finite() {
        let diff = d.position() - mean;
        weighted_sq_sum += d.mass() * diff * diff;
        finite_mass += d.mass();
      }
    }
    if finite_mass == 0.0 {
      None
    } else {
      Some(weighted_sq_sum / finite_mass)
    }
  }

  /// `None` when the mean is not finite (including `UR_order == 0`).
  /// Otherwise the mass-weighted second central moment of finite deltas.
  pub fn variance(&mut self) -> Option<f64> {
    if self.variance_cache.is_none() {
      self.variance_cache = Some(self.compute_variance());
    }
    self.variance_cache.unwrap()
  }

  /// Whether, after `drop_zero_mass` + `cure`, this value's deltas are the
  /// unique k-th-order Telescoping Torques Representation of some bin PDF:
  /// all finite, `UR_order` a power of two, and the coalescence below
  /// strictly increasing.
  pub fn check_is_full_valid_ttr(&mut self) -> bool {
    self.drop_zero_mass();
    self.cure();

    if !self.is_finite() {
      self.is_full_valid_ttr = Some(false);
      return false;
    }

    let m = self.deltas.len();
    if m == 0 || !m.is_power_of_two() {
      self.is_full_valid_ttr = Some(false);
      return false;
    }

    let valid = ttr_coalescence_strictly_increasing(&self.deltas);
    self.is_full_valid_ttr = Some(valid);
    valid
  }
}

fn weighted_mean(deltas: &[DiracDelta]) -> f64 {
  let mut sum = 0.0;
  let mut mass = 0.0;
  for d in deltas {
    sum += d.position() * d.mass();
    mass += d.mass();
  }
  sum / mass
}

/// Runs the TTR coalescence recurrence (§4.3) over `deltas` (assumed
/// finite, sorted, length a power of two) and reports whether the
/// resulting boundary-position array is strictly increasing.
pub(crate) fn ttr_coalescence_strictly_increasing(deltas: &[DiracDelta]) -> bool {
  let m = deltas.len();
  let k = m.trailing_zeros() as usize;
  let n_boundaries = 2 * m - 1;
  let mut bp = vec![0.0; n_boundaries];
  let mut bm = vec![0.0; n_boundaries];
  for (j, d) in deltas.iter().enumerate() {
    bp[2 * j] = d.position();
    bm[2 * j] = d.mass();
  }

  for n in 0..k {
    let step = 1usize << n;
    let mut i = (1usize << (n + 1)) - 1;
    while i < n_boundaries {
      let lo = i - step;
      let hi = i + step;
      let total = bm[lo] + bm[hi];
      bp[i] = (bp[lo] * bm[lo] + bp[hi] * bm[hi]) / total;
      bm[i] = total;
      i += 1usize << (n + 2);
    }
  }

  bp.windows(2).all(|w| w[0] < w[1])
}

#[cfg(test)]
mod tests {
  use super::*;

  fn value_from(points: &[(f64, f64)]) -> DistributionalValue {
    let deltas = points
      .iter()
      .map(|&(p, m)| DiracDelta::from_mass(p, m))
      .collect();
    DistributionalValue::new(None, 0, deltas, true)
  }

  #[test]
  fn test_sort_partitions_specials_to_tail_in_order() {
    let mut v = value_from(&[(0.0, 0.5), (f64::NAN, 0.5)]);
    v.sort();
    assert_eq!(v.ur_order(), 2);
    assert_eq!(v.deltas()[0].position(), 0.0);
    assert!(v.deltas()[1].position().is_nan());
    assert!(v.mean().unwrap().is_nan());
  }

  #[test]
  fn test_both_infinite_masses_give_nan_mean() {
    let mut v = value_from(&[(f64::NEG_INFINITY, 0.5), (f64::INFINITY, 0.5)]);
    v.sort();
    assert!(v.mean().unwrap().is_nan());
  }

  #[test]
  fn test_single_sided_infinite_mean() {
    let mut v = value_from(&[(0.0, 0.5), (f64::NEG_INFINITY, 0.5)]);
    v.sort();
    assert_eq!(v.mean(), Some(f64::NEG_INFINITY));
  }

  #[test]
  fn test_ur_order_zero_has_no_mean_or_variance() {
    let mut v = value_from(&[]);
    assert_eq!(v.mean(), None);
    assert_eq!(v.variance(), None);
  }

  #[test]
  fn test_cure_merges_near_duplicates() {
    let mut v = value_from(&[(1.0, 1.0), (1.0 + 1e-15, 1.0), (5.0, 1.0)]);
    v.combine_dirac_deltas(1e-14, 1e-12);
    assert_eq!(v.ur_order(), 2);
    assert_eq!(v.deltas()[0].mass(), 2.0);
    assert_eq!(v.deltas()[1].position(), 5.0);
  }

  #[test]
  fn test_cure_then_sort_equals_sort_then_cure() {
    let points = [(3.0, 1.0), (1.0, 1.0), (1.0, 1.0)];
    let mut a = value_from(&points);
    a.cure();
    a.sort();
    let mut b = value_from(&points);
    b.sort();
    b.cure();
    assert_eq!(a.positions(), b.positions());
    assert_eq!(a.masses(), b.masses());
  }

  #[test]
  fn test_idempotence() {
    let mut v = value_from(&[(1.0, 0.0), (2.0, 1.0), (2.0, 1.0)]);
    v.drop_zero_mass();
    let after_one = v.masses();
    v.drop_zero_mass();
    assert_eq!(v.masses(), after_one);

    v.sort();
    let after_sort = v.positions();
    v.sort();
    assert_eq!(v.positions(), after_sort);

    v.cure();
    let after_cure = v.masses();
    v.cure();
    assert_eq!(v.masses(), after_cure);
  }

  #[test]
  fn test_full_valid_ttr_four_points() {
    let mut v = value_from(&[
      (-1.0, 0.25),
      (0.0, 0.25),
      (1.0, 0.25),
      (2.0, 0.25),
    ]);
    assert!(v.check_is_full_valid_ttr());
  }

  #[test]
  fn test_non_power_of_two_is_not_full_valid_ttr() {
    let mut v = value_from(&[(0.0, 0.5), (1.0, 0.25), (3.0, 0.25)]);
    assert!(!v.check_is_full_valid_ttr());
  }

  #[test]
  fn test_is_finite_reflects_special_values() {
    let mut v = value_from(&[(0.0, 0.5), (1.0, 0.5)]);
    assert!(v.is_finite());

    let mut with_special = value_from(&[(0.0, 0.5), (f64::NAN, 0.5)]);
    assert!(!with_special.is_finite());
  }
}
