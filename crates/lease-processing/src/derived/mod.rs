//! Derived columns computed from the raw lease values.

mod payback;

pub use payback::{PaybackCalculator, PaybackOutcome};
