//! Bijective encode/decode between [`DistributionalValue`] and the two Ux
//! wire formats.
//!
//! The field layout is shared between Ux-bytes and Ux-string, but byte
//! order is not: Ux-bytes is little-endian throughout, Ux-string is
//! big-endian throughout. This asymmetry is a wire-format requirement, not
//! an oversight — preserve it exactly.

use tracing::warn;

use crate::delta::DiracDelta;
use crate::errors::UxError;
use crate::packer::{self, PackValue};
use crate::value::DistributionalValue;

/// Maximum `UR_order` accepted anywhere a value is decoded off the wire.
pub const MAX_UR_ORDER: u64 = 10_000;

/// Header fields beyond the particle: `UR_type` (1B) + `sample_count`
/// reserved (8B) + `mean` (8B) + `UR_order` (4B).
const HEADER_LEN_AFTER_PARTICLE: usize = 1 + 8 + 8 + 4;

/// Selects which wire format a call operates on.
pub enum UxInput<'a> {
  Bytes(&'a [u8]),
  Text(&'a str),
}

/// The result of [`encode`].
pub enum UxOutput {
  Bytes(Vec<u8>),
  Text(String),
}

impl UxOutput {
  pub fn into_bytes(self) -> Option<Vec<u8>> {
    match self {
      UxOutput::Bytes(b) => Some(b),
      UxOutput::Text(_) => None,
    }
  }

  pub fn into_text(self) -> Option<String> {
    match self {
      UxOutput::Text(t) => Some(t),
      UxOutput::Bytes(_) => None,
    }
  }
}

fn position_format(double_precision: bool) -> &'static str {
  if double_precision {
    "d"
  } else {
    "f"
  }
}

fn position_size(double_precision: bool) -> usize {
  if double_precision {
    8
  } else {
    4
  }
}

/// Decodes either wire format into a [`DistributionalValue`].
///
/// Returns `None` and logs a warning on any validation failure: malformed
/// Ux-string header, `UR_order` out of `0..=10000`, or a buffer shorter
/// than the header or delta body call for.
pub fn decode(input: UxInput, double_precision: bool) -> Option<DistributionalValue> {
  match input {
    UxInput::Bytes(bytes) => decode_bytes(bytes, double_precision),
    UxInput::Text(text) => decode_text(text, double_precision),
  }
}

fn decode_bytes(bytes: &[u8], double_precision: bool) -> Option<DistributionalValue> {
  if bytes.len() < 8 {
    let err = UxError::buffer_underflow(format!(
      "ux-bytes buffer of {} bytes is shorter than the 8-byte particle field",
      bytes.len()
    ));
    warn!(len = bytes.len(), %err, "ux-bytes buffer shorter than the particle field");
    return None;
  }
  let particle = packer::unpack("<d", &bytes[..8])?[0].as_f64();
  let rest = &bytes[8..];
  decode_header_and_body(rest, particle, double_precision, Endian::Little)
}

/// Matches spec.md §4.4's particle grammar `[-+]?\d*\.?\d+|nan|[-+]?inf`
/// (case-insensitive on `nan`/`inf` only). Rejects forms `f64::from_str`
/// would otherwise accept but the grammar doesn't, notably exponents
/// (`"1e5"`) and the bare `"infinity"` spelling.
fn particle_matches_grammar(s: &str) -> bool {
  let lower = s.to_ascii_lowercase();
  if lower == "nan" || lower == "inf" || lower == "-inf" || lower == "+inf" {
    return true;
  }

  let mut rest = s;
  if let Some(stripped) = rest.strip_prefix(['+', '-']) {
    rest = stripped;
  }
  if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_digit() || c == '.') {
    return false;
  }

  match rest.split_once('.') {
    None => rest.chars().all(|c| c.is_ascii_digit()) && !rest.is_empty(),
    Some((before, after)) => {
      before.chars().all(|c| c.is_ascii_digit())
        && !after.is_empty()
        && after.chars().all(|c| c.is_ascii_digit())
    }
  }
}

fn decode_text(text: &str, double_precision: bool) -> Option<DistributionalValue> {
  let idx = match text.find("Ux") {
    Some(idx) => idx,
    None => {
      let err = UxError::malformed_header("ux-string is missing the \"Ux\" marker");
      warn!(text, %err, "ux-string missing the \"Ux\" marker");
      return None;
    }
  };
  let particle_str = &text[..idx];
  let hex = &text[idx + 2..];

  let particle = if particle_str.is_empty() {
    None
  } else if !particle_matches_grammar(particle_str) {
    let err = UxError::malformed_header(format!(
      "particle \"{particle_str}\" does not match the Ux-string particle grammar"
    ));
    warn!(particle_str, %err, "ux-string particle does not match the particle grammar");
    return None;
  } else {
    match particle_str.parse::<f64>() {
      Ok(x) => Some(x),
      Err(_) => {
        let err = UxError::malformed_header(format!(
          "particle \"{particle_str}\" matched the grammar but failed to parse"
        ));
        warn!(particle_str, %err, "ux-string particle is not a valid number");
        return None;
      }
    }
  };

  if hex.is_empty() || hex.len() % 2 != 0 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
    let err = UxError::malformed_header("ux-string hex body is malformed");
    warn!(hex, %err, "ux-string hex body is malformed");
    return None;
  }
  let bytes = match hex_decode(hex) {
    Some(b) => b,
    None => {
      let err = UxError::malformed_header("ux-string hex body failed to decode");
      warn!(hex, %err, "ux-string hex body failed to decode");
      return None;
    }
  };

  decode_header_and_body(&bytes, particle, double_precision, Endian::Big)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Endian {
  Little,
  Big,
}

impl Endian {
  fn marker(self) -> &'static str {
    match self {
      Endian::Little => "<",
      Endian::Big => ">",
    }
  }
}

fn decode_header_and_body(
  rest: &[u8],
  particle: Option<f64>,
  double_precision: bool,
  endian: Endian,
) -> Option<DistributionalValue> {
  if rest.len() < HEADER_LEN_AFTER_PARTICLE {
    let err = UxError::buffer_underflow(format!(
      "ux header of {} bytes is shorter than the required {HEADER_LEN_AFTER_PARTICLE}",
      rest.len()
    ));
    warn!(len = rest.len(), required = HEADER_LEN_AFTER_PARTICLE, %err, "ux header shorter than required");
    return None;
  }

  let header_format = format!("{}BQdI", endian.marker());
  let header = packer::unpack(&header_format, &rest[..HEADER_LEN_AFTER_PARTICLE])?;
  let ur_type = header[0].as_u64() as u8;
  // header[1] is the reserved sample_count field; header[2] is the
  // producer-supplied mean, both unused — mean is recomputed from deltas.
  let ur_order_raw = header[3].as_u64();
  if ur_order_raw > MAX_UR_ORDER {
    let err = UxError::out_of_range(format!(
      "UR_order {ur_order_raw} exceeds the maximum of {MAX_UR_ORDER}"
    ));
    warn!(ur_order = ur_order_raw, %err, "UR_order exceeds 10000");
    return None;
  }
  let ur_order = ur_order_raw as usize;

  let body = &rest[HEADER_LEN_AFTER_PARTICLE..];
  let pos_size = position_size(double_precision);
  let pair_size = pos_size + 8;
  let required = ur_order * pair_size;
  if body.len() < required {
    let err = UxError::buffer_underflow(format!(
      "delta body requires {required} bytes but only {} are available",
      body.len()
    ));
    warn!(required, available = body.len(), %err, "ux buffer underflow for delta body");
    return None;
  }

  let pair_format = format!("{}{}Q", endian.marker(), position_format(double_precision));
  let mut deltas = Vec::with_capacity(ur_order);
  let mut offset = 0;
  for _ in 0..ur_order {
    let pair = packer::unpack(&pair_format, &body[offset..offset + pair_size])?;
    offset += pair_size;
    deltas.push(DiracDelta::new(pair[0].as_f64(), pair[1].as_u64()));
  }

  Some(DistributionalValue::new(
    particle,
    ur_type,
    deltas,
    double_precision,
  ))
}

/// Encodes `value` to either wire format. Lossless on normalized input:
/// `encode(decode(w)) == w` for well-formed `w` (modulo hex letter case,
/// which encode always emits as uppercase).
pub fn encode(value: &mut DistributionalValue, as_string: bool) -> UxOutput {
  if as_string {
    UxOutput::Text(encode_text(value))
  } else {
    UxOutput::Bytes(encode_bytes(value))
  }
}

fn encode_bytes(value: &mut DistributionalValue) -> Vec<u8> {
  let mut out = Vec::new();
  let particle = value.particle_value.unwrap_or(f64::NAN);
  out.extend(packer::pack("<d", &[PackValue::Float(particle)]).unwrap());
  out.extend(encode_header_and_body(value, Endian::Little));
  out
}

fn format_particle(p: f64) -> String {
  if p.is_nan() {
    "nan".to_string()
  } else if p == f64::INFINITY {
    "inf".to_string()
  } else if p == f64::NEG_INFINITY {
    "-inf".to_string()
  } else {
    format!("{}", p)
  }
}

fn encode_text(value: &mut DistributionalValue) -> String {
  let particle_str = value.particle_value.map(format_particle).unwrap_or_default();
  let body = encode_header_and_body(value, Endian::Big);
  format!("{}Ux{}", particle_str, hex_encode(&body))
}

fn encode_header_and_body(value: &mut DistributionalValue, endian: Endian) -> Vec<u8> {
  let ur_order = value.ur_order();
  let mean = value.mean().unwrap_or(f64::NAN);

  let header_format = format!("{}BQdI", endian.marker());
  let mut out = packer::pack(
    &header_format,
    &[
      PackValue::UInt(value.ur_type as u64),
      PackValue::UInt(ur_order as u64),
      PackValue::Float(mean),
      PackValue::UInt(ur_order as u64),
    ],
  )
  .unwrap();

  let pair_format = format!(
    "{}{}Q",
    endian.marker(),
    position_format(value.double_precision)
  );
  for delta in value.deltas() {
    out.extend(
      packer::pack(
        &pair_format,
        &[
          PackValue::Float(delta.position()),
          PackValue::UInt(delta.raw_mass()),
        ],
      )
      .unwrap(),
    );
  }
  out
}

fn hex_encode(bytes: &[u8]) -> String {
  bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

fn hex_decode(hex: &str) -> Option<Vec<u8>> {
  if hex.len() % 2 != 0 {
    return None;
  }
  let mut out = Vec::with_capacity(hex.len() / 2);
  let chars: Vec<char> = hex.chars().collect();
  for pair in chars.chunks(2) {
    let byte_str: String = pair.iter().collect();
    out.push(u8::from_str_radix(&byte_str, 16).ok()?);
  }
  Some(out)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_round_trip_string_two_finite_deltas() {
    let deltas = vec![
      DiracDelta::new(1.0, 1u64 << 62),
      DiracDelta::new(2.0, 1u64 << 62),
    ];
    let mut value = DistributionalValue::new(Some(1.5), 0, deltas, true);
    let encoded = encode(&mut value, true).into_text().unwrap();
    assert!(encoded.starts_with("1.5Ux00"));

    let mut decoded = decode(UxInput::Text(&encoded), true).unwrap();
    assert_eq!(decoded.ur_order(), 2);
    assert_eq!(decoded.deltas()[0].position(), 1.0);
    assert_eq!(decoded.deltas()[0].raw_mass(), 1u64 << 62);
    assert_eq!(decoded.deltas()[1].position(), 2.0);
    assert_eq!(decoded.deltas()[1].raw_mass(), 1u64 << 62);
    let _ = decoded.mean();
  }

  #[test]
  fn test_round_trip_bytes_with_special_values() {
    let deltas = vec![
      DiracDelta::new(0.0, 1u64 << 62),
      DiracDelta::new(f64::NAN, 1u64 << 62),
    ];
    let mut value = DistributionalValue::new(None, 0, deltas, true);
    value.sort();
    assert_eq!(value.mean().unwrap().is_nan(), true);

    let encoded = encode(&mut value, false).into_bytes().unwrap();
    assert_eq!(encoded.len(), 8 + 1 + 8 + 8 + 4 + 2 * (8 + 8));

    let decoded = decode(UxInput::Bytes(&encoded), true).unwrap();
    assert_eq!(decoded.ur_order(), 2);
  }

  #[test]
  fn test_decode_rejects_ur_order_over_limit() {
    // header with UR_order = 10001
    let mut bytes = vec![0u8; 8]; // particle
    bytes.push(0); // UR_type
    bytes.extend_from_slice(&0u64.to_le_bytes()); // sample_count
    bytes.extend_from_slice(&0f64.to_le_bytes()); // mean
    bytes.extend_from_slice(&10_001u32.to_le_bytes()); // UR_order
    assert!(decode(UxInput::Bytes(&bytes), true).is_none());
  }

  #[test]
  fn test_decode_text_rejects_malformed_header() {
    assert!(decode(UxInput::Text("not a ux string"), true).is_none());
  }

  #[test]
  fn test_particle_grammar_rejects_exponent_form() {
    assert!(!particle_matches_grammar("1e5"));
    assert!(!particle_matches_grammar("1E5"));
    assert!(!particle_matches_grammar("infinity"));
    assert!(particle_matches_grammar("1.5"));
    assert!(particle_matches_grammar("-.5"));
    assert!(!particle_matches_grammar("5.")); // \d+ requires a digit after the dot
    assert!(particle_matches_grammar("nan"));
    assert!(particle_matches_grammar("NaN"));
    assert!(particle_matches_grammar("-inf"));
  }

  #[test]
  fn test_decode_text_rejects_exponent_particle() {
    assert!(decode(UxInput::Text("1e5Ux00"), true).is_none());
  }

  #[test]
  fn test_hex_round_trip() {
    let bytes = vec![0xDE, 0xAD, 0xBE, 0xEF];
    let hex = hex_encode(&bytes);
    assert_eq!(hex, "DEADBEEF");
    assert_eq!(hex_decode(&hex).unwrap(), bytes);
    assert_eq!(hex_decode("deadbeef").unwrap(), bytes);
  }
}
