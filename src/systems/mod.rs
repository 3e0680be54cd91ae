//! Application systems
//!
//! Frame-level systems that sit between the application and the engine crates.

mod simulation;

pub use simulation::SimulationSystem;
