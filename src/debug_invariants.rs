//! Structural self-validation, active in debug builds and under the
//! `check-invariants` feature.

use crate::grid_error::GridError;

/// Structural checks too expensive for release hot paths.
///
/// `validate_invariants` always runs when called and returns the first
/// violation; `debug_assert_invariants` runs it only in validated builds and
/// treats a violation as fatal, since continuing would corrupt exchange state.
pub trait DebugInvariants {
    fn validate_invariants(&self) -> Result<(), GridError>;

    #[inline]
    fn debug_assert_invariants(&self) {
        #[cfg(any(debug_assertions, feature = "check-invariants"))]
        if let Err(err) = self.validate_invariants() {
            panic!("invariant violation: {err}");
        }
    }
}
