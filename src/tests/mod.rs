//! Cross-cutting integration tests, one file per concern, mirroring the
//! module-level `#[cfg(test)]` suites but exercising the public surface
//! end to end.

mod invariants;
