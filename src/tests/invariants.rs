//! Universal invariants from the testable-properties list: normalization
//! commutativity and idempotence, mass conservation, and boundary
//! strictness, exercised against a handful of representative values rather
//! than an exhaustive grid.

use crate::{create_binning, DiracDelta, DistributionalValue};

fn value_from(points: &[(f64, f64)]) -> DistributionalValue {
  let deltas = points
    .iter()
    .map(|&(p, m)| DiracDelta::from_mass(p, m))
    .collect();
  DistributionalValue::new(None, 0, deltas, true)
}

#[test]
fn cure_then_sort_equals_sort_then_cure() {
  let points = [(3.0, 1.0), (1.0, 1.0), (1.0, 1.0), (f64::NAN, 0.5)];
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
fn sort_cure_and_drop_zero_mass_are_idempotent() {
  let mut v = value_from(&[(1.0, 0.0), (2.0, 1.0), (2.0, 1.0), (f64::INFINITY, 0.5)]);

  v.drop_zero_mass();
  let after_one_drop = v.masses();
  v.drop_zero_mass();
  assert_eq!(v.masses(), after_one_drop);

  v.sort();
  let after_one_sort = v.positions();
  v.sort();
  assert_eq!(v.positions(), after_one_sort);

  v.cure();
  let after_one_cure = v.masses();
  v.cure();
  assert_eq!(v.masses(), after_one_cure);
}

#[test]
fn normalized_deltas_obey_the_invariants() {
  let mut v = value_from(&[
    (3.0, 0.0),
    (1.0, 0.5),
    (f64::NAN, 0.2),
    (1.0 + 1e-16, 0.3),
  ]);
  v.drop_zero_mass();
  v.combine_dirac_deltas(1e-14, 1e-12);

  // finite deltas come first, ascending, followed by any special reservoirs
  let finite = v.finite_deltas();
  assert!(finite.windows(2).all(|w| w[0].position() < w[1].position()));
  assert!(v.deltas().iter().skip(finite.len()).all(|d| !d.position().is_finite()));

  let total_mass: f64 = v.masses().iter().sum();
  assert!((total_mass - 1.0).abs() < 1e-12);
}

#[test]
fn mass_is_conserved_through_binning() {
  let deltas = vec![
    DiracDelta::from_mass(0.0, 0.1),
    DiracDelta::from_mass(1.0, 0.2),
    DiracDelta::from_mass(2.5, 0.3),
    DiracDelta::from_mass(6.0, 0.4),
  ];
  let finite_mass: f64 = deltas.iter().map(|d| d.mass()).sum();

  let histogram = create_binning(&deltas, 2, true);
  let binned_mass: f64 = histogram
    .bin_widths
    .iter()
    .zip(&histogram.bin_heights)
    .map(|(w, h)| w * h)
    .sum();

  assert!((binned_mass - finite_mass).abs() < 1e-9);
}

#[test]
fn boundary_positions_are_strictly_ascending() {
  let deltas = vec![
    DiracDelta::from_mass(-5.0, 0.05),
    DiracDelta::from_mass(-1.0, 0.15),
    DiracDelta::from_mass(0.0, 0.3),
    DiracDelta::from_mass(0.5, 0.2),
    DiracDelta::from_mass(10.0, 0.2),
    DiracDelta::from_mass(10.5, 0.1),
  ];
  let histogram = create_binning(&deltas, 0, false);
  assert!(histogram
    .boundary_positions
    .windows(2)
    .all(|w| w[0] < w[1]));
}
