//! Stream pacing utilities.

mod paced;

pub use paced::{Paced, PacedExt};
