//! Kernel
//!
//! Shared foundation for the branched path tracer: geometry, spectra,
//! random sequences, path state, volume stack, shading data, radiance
//! accumulation and the collaborator interfaces the integrators drive.

#[macro_use]
extern crate hexf;

#[macro_use]
extern crate log;

pub mod common;
pub mod geometry;
pub mod intersection;
pub mod light;
pub mod parallel;
pub mod paramset;
pub mod path_state;
pub mod radiance;
pub mod rng;
pub mod sampling;
pub mod settings;
pub mod shading;
pub mod shadow_map;
pub mod spectrum;
pub mod volume;
