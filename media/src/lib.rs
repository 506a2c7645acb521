//! Participating Media

#[macro_use]
extern crate log;

mod henyey_greenstein;
mod homogeneous;

// Re-export
pub use henyey_greenstein::*;
pub use homogeneous::*;
