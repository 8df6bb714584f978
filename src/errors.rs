use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fmt;

/// The different kinds of errors this library can return.
///
/// Every decode/unpack failure constructs one of these to carry its
/// diagnostic message, even the ones that are logged and discarded rather
/// than raised as a `Result` — see the propagation policy in spec.md §7:
/// only [`ErrorKind::ValidationFailure`] is ever returned to a caller as an
/// `Err`, the rest are built solely to format the one warning line a
/// low-level decode failure emits before returning `None`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
  /// A packer format string parsed to zero groups.
  MalformedFormat,
  /// An unpack or Ux decode found fewer bytes than the format/header
  /// requires.
  BufferUnderflow,
  /// An unpack left trailing bytes unconsumed after the last group.
  BufferOverflow,
  /// A Ux-string input didn't match the `[particle]Ux[hex]` grammar.
  MalformedHeader,
  /// `UR_order` was negative, null, or greater than 10000.
  OutOfRange,
  /// The requested plotting resolution was not a power of two, or
  /// construction was attempted on a value with `UR_order == 0`.
  ValidationFailure,
}

/// The error type used in results for all `uxval` functionality that can
/// fail in a way the caller must handle (as opposed to the null-returning,
/// warn-and-continue failures of decoding).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UxError {
  pub kind: ErrorKind,
  pub message: String,
}

impl UxError {
  pub(crate) fn new<S: AsRef<str>>(kind: ErrorKind, message: S) -> Self {
    UxError {
      kind,
      message: message.as_ref().to_string(),
    }
  }

  pub(crate) fn malformed_format<S: AsRef<str>>(message: S) -> Self {
    Self::new(ErrorKind::MalformedFormat, message)
  }

  pub(crate) fn buffer_underflow<S: AsRef<str>>(message: S) -> Self {
    Self::new(ErrorKind::BufferUnderflow, message)
  }

  pub(crate) fn buffer_overflow<S: AsRef<str>>(message: S) -> Self {
    Self::new(ErrorKind::BufferOverflow, message)
  }

  pub(crate) fn malformed_header<S: AsRef<str>>(message: S) -> Self {
    Self::new(ErrorKind::MalformedHeader, message)
  }

  pub(crate) fn out_of_range<S: AsRef<str>>(message: S) -> Self {
    Self::new(ErrorKind::OutOfRange, message)
  }

  pub(crate) fn validation_failure<S: AsRef<str>>(message: S) -> Self {
    Self::new(ErrorKind::ValidationFailure, message)
  }
}

impl Display for UxError {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "uxval {:?} error: {}", self.kind, &self.message)
  }
}

impl Error for UxError {}

pub type UxResult<T> = Result<T, UxError>;
