//! A small binary packer/unpacker driven by a compact format-string grammar,
//! in the spirit of Python's `struct` module.
//!
//! Format strings are zero or more groups of `[endian]?[count]?type`,
//! matched globally: an optional one-character endian marker, an optional
//! decimal repeat count (default 1), then one type character.
//!
//! Two quirks in the legacy grammar are preserved bit-for-bit because wire
//! producers depend on them; see the notes on [`Endian`] and [`TypeCode`].

use tracing::warn;

use crate::errors::UxError;

/// Byte order for a single packed group.
///
/// Only `<` means little-endian here. `@`, `=`, `>`, `!`, and the absence of
/// any marker all mean big-endian. Conventionally `@` and `=` would mean
/// "native" byte order, but producers of the Ux wire formats emit this
/// legacy mapping unconditionally, so we preserve it rather than "fixing"
/// it to match struct-module convention.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endian {
  Big,
  Little,
}

impl Endian {
  fn from_marker(c: char) -> Option<Self> {
    match c {
      '@' | '=' | '>' | '!' => Some(Endian::Big),
      '<' => Some(Endian::Little),
      _ => None,
    }
  }
}

/// A primitive type a packer group can encode/decode.
///
/// `h`/`H` are documented as 2-byte short ints in most binary-packing
/// conventions, but this grammar's legacy size table gives them 1 byte
/// each. This is an intentional deviation, not a bug: implementations MUST
/// preserve it to interoperate with existing wire producers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeCode {
  Char,
  I8,
  U8,
  ShortI8,
  ShortU8,
  I32,
  U32,
  L32,
  UL32,
  I64,
  U64,
  F32,
  F64,
}

impl TypeCode {
  fn from_char(c: char) -> Option<Self> {
    use TypeCode::*;
    Some(match c {
      'c' => Char,
      'b' => I8,
      'B' => U8,
      'h' => ShortI8,
      'H' => ShortU8,
      'i' => I32,
      'I' => U32,
      'l' => L32,
      'L' => UL32,
      'q' => I64,
      'Q' => U64,
      'f' => F32,
      'd' => F64,
      _ => return None,
    })
  }

  pub fn size(&self) -> usize {
    use TypeCode::*;
    match self {
      Char | I8 | U8 | ShortI8 | ShortU8 => 1,
      I32 | U32 | L32 | UL32 | F32 => 4,
      I64 | U64 | F64 => 8,
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Group {
  endian: Endian,
  count: usize,
  ty: TypeCode,
}

/// A single packed/unpacked scalar.
///
/// `Null` packs as numeric zero of the declared type; unpacking never
/// produces `Null`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PackValue {
  Int(i64),
  UInt(u64),
  Float(f64),
  Null,
}

impl PackValue {
  pub fn as_i64(&self) -> i64 {
    match self {
      PackValue::Int(x) => *x,
      PackValue::UInt(x) => *x as i64,
      PackValue::Float(x) => *x as i64,
      PackValue::Null => 0,
    }
  }

  pub fn as_u64(&self) -> u64 {
    match self {
      PackValue::Int(x) => *x as u64,
      PackValue::UInt(x) => *x,
      PackValue::Float(x) => *x as u64,
      PackValue::Null => 0,
    }
  }

  pub fn as_f64(&self) -> f64 {
    match self {
      PackValue::Int(x) => *x as f64,
      PackValue::UInt(x) => *x as f64,
      PackValue::Float(x) => *x,
      PackValue::Null => 0.0,
    }
  }
}

fn parse_groups(format: &str) -> Vec<Group> {
  let chars: Vec<char> = format.chars().collect();
  let mut groups = Vec::new();
  let mut i = 0;
  while i < chars.len() {
    let mut endian = Endian::Big;
    if let Some(e) = Endian::from_marker(chars[i]) {
      endian = e;
      i += 1;
    }

    let digits_start = i;
    while i < chars.len() && chars[i].is_ascii_digit() {
      i += 1;
    }
    let count = if i > digits_start {
      chars[digits_start..i]
        .iter()
        .collect::<String>()
        .parse()
        .unwrap_or(1)
    } else {
      1
    };

    if i >= chars.len() {
      break;
    }
    match TypeCode::from_char(chars[i]) {
      Some(ty) => {
        groups.push(Group { endian, count, ty });
        i += 1;
      }
      // not a recognized type char; this position didn't yield a group,
      // so move on and keep scanning for the next one.
      None => i += 1,
    }
  }
  groups
}

fn write_group(out: &mut Vec<u8>, group: &Group, value: PackValue) {
  let big = group.endian == Endian::Big;
  match group.ty {
    TypeCode::Char | TypeCode::U8 | TypeCode::ShortU8 => out.push(value.as_u64() as u8),
    TypeCode::I8 | TypeCode::ShortI8 => out.push(value.as_i64() as u8),
    TypeCode::I32 | TypeCode::L32 => {
      let x = value.as_i64() as i32;
      out.extend_from_slice(&if big { x.to_be_bytes() } else { x.to_le_bytes() });
    }
    TypeCode::U32 | TypeCode::UL32 => {
      let x = value.as_u64() as u32;
      out.extend_from_slice(&if big { x.to_be_bytes() } else { x.to_le_bytes() });
    }
    TypeCode::I64 => {
      let x = value.as_i64();
      out.extend_from_slice(&if big { x.to_be_bytes() } else { x.to_le_bytes() });
    }
    TypeCode::U64 => {
      let x = value.as_u64();
      out.extend_from_slice(&if big { x.to_be_bytes() } else { x.to_le_bytes() });
    }
    TypeCode::F32 => {
      let x = value.as_f64() as f32;
      out.extend_from_slice(&if big { x.to_be_bytes() } else { x.to_le_bytes() });
    }
    TypeCode::F64 => {
      let x = value.as_f64();
      out.extend_from_slice(&if big { x.to_be_bytes() } else { x.to_le_bytes() });
    }
  }
}

fn read_group(bytes: &[u8], group: &Group) -> PackValue {
  let big = group.endian == Endian::Big;
  match group.ty {
    TypeCode::Char | TypeCode::U8 | TypeCode::ShortU8 => PackValue::UInt(bytes[0] as u64),
    TypeCode::I8 | TypeCode::ShortI8 => PackValue::Int(bytes[0] as i8 as i64),
    TypeCode::I32 | TypeCode::L32 => {
      let arr: [u8; 4] = bytes[..4].try_into().unwrap();
      let x = if big { i32::from_be_bytes(arr) } else { i32::from_le_bytes(arr) };
      PackValue::Int(x as i64)
    }
    TypeCode::U32 | TypeCode::UL32 => {
      let arr: [u8; 4] = bytes[..4].try_into().unwrap();
      let x = if big { u32::from_be_bytes(arr) } else { u32::from_le_bytes(arr) };
      PackValue::UInt(x as u64)
    }
    TypeCode::I64 => {
      let arr: [u8; 8] = bytes[..8].try_into().unwrap();
      let x = if big { i64::from_be_bytes(arr) } else { i64::from_le_bytes(arr) };
      PackValue::Int(x)
    }
    TypeCode::U64 => {
      let arr: [u8; 8] = bytes[..8].try_into().unwrap();
      let x = if big { u64::from_be_bytes(arr) } else { u64::from_le_bytes(arr) };
      PackValue::UInt(x)
    }
    TypeCode::F32 => {
      let arr: [u8; 4] = bytes[..4].try_into().unwrap();
      let x = if big { f32::from_be_bytes(arr) } else { f32::from_le_bytes(arr) };
      PackValue::Float(x as f64)
    }
    TypeCode::F64 => {
      let arr: [u8; 8] = bytes[..8].try_into().unwrap();
      let x = if big { f64::from_be_bytes(arr) } else { f64::from_le_bytes(arr) };
      PackValue::Float(x)
    }
  }
}

/// Encodes `values` according to `format`, one value per group occurrence
/// (a group with a repeat count consumes that many values in order).
///
/// Returns `None` and logs a warning if `format` parses to zero groups. A
/// missing value at any slot (i.e. `values` runs out before the groups do)
/// is treated as [`PackValue::Null`] and encodes as numeric zero.
pub fn pack(format: &str, values: &[PackValue]) -> Option<Vec<u8>> {
  let groups = parse_groups(format);
  if groups.is_empty() {
    let err = UxError::malformed_format(format!("format \"{format}\" parsed to zero groups"));
    warn!(format, %err, "packer format parsed to zero groups");
    return None;
  }

  let mut out = Vec::new();
  let mut vi = 0;
  for group in &groups {
    for _ in 0..group.count {
      let value = values.get(vi).copied().unwrap_or(PackValue::Null);
      vi += 1;
      write_group(&mut out, group, value);
    }
  }
  Some(out)
}

/// Decodes `bytes` according to `format`.
///
/// Returns `None` and logs a warning if the total bytes required by the
/// format exceeds `bytes.len()`, or if any bytes remain after the last
/// group is consumed.
pub fn unpack(format: &str, bytes: &[u8]) -> Option<Vec<PackValue>> {
  let groups = parse_groups(format);
  if groups.is_empty() {
    let err = UxError::malformed_format(format!("format \"{format}\" parsed to zero groups"));
    warn!(format, %err, "packer format parsed to zero groups");
    return None;
  }

  let required: usize = groups.iter().map(|g| g.ty.size() * g.count).sum();
  if required > bytes.len() {
    let err = UxError::buffer_underflow(format!(
      "unpack requires {required} bytes but only {} are available",
      bytes.len()
    ));
    warn!(required, available = bytes.len(), %err, "packer buffer underflow");
    return None;
  }
  if required < bytes.len() {
    let err = UxError::buffer_overflow(format!(
      "unpack consumed {required} bytes but {} were provided",
      bytes.len()
    ));
    warn!(required, available = bytes.len(), %err, "packer buffer has trailing bytes beyond the last group");
    return None;
  }

  let mut out = Vec::with_capacity(groups.iter().map(|g| g.count).sum());
  let mut offset = 0;
  for group in &groups {
    for _ in 0..group.count {
      out.push(read_group(&bytes[offset..], group));
      offset += group.ty.size();
    }
  }
  Some(out)
}
