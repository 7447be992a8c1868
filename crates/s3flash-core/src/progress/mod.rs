//! Progress tracking over the flash tool's output.

pub mod rules;
pub mod tracker;

pub use rules::{LineKind, classify};
pub use tracker::{Feed, ProgressLayout, ProgressTracker};
