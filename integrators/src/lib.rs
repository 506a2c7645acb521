//! Integrators

#[macro_use]
extern crate log;

mod branched;
mod context;
mod path;
mod shadow;

// Re-export.
pub use branched::*;
pub use context::*;
pub use shadow::*;
