#![doc = include_str!("../README.md")]

#![deny(clippy::unused_unit)]
#![deny(dead_code)]

#[doc = include_str!("../README.md")]
#[cfg(doctest)]
struct ReadmeDoctest;

pub use binning::{bin_pdf_to_ttr, create_binning, reconstruct_for_plotting, Histogram, Reconstruction};
pub use codec::{decode, encode, UxInput, UxOutput, MAX_UR_ORDER};
pub use delta::{cmp_by_position, DiracDelta, FIXED_POINT_ONE};
pub use errors::{ErrorKind, UxError, UxResult};
pub use plot::{PlotData, Rectangle};
pub use value::{DistributionalValue, DEFAULT_RELATIVE_MEAN_THRESHOLD, DEFAULT_RELATIVE_RANGE_THRESHOLD};

mod binning;
mod codec;
mod delta;
mod errors;
mod packer;
mod plot;
mod value;

#[cfg(test)]
mod tests;
