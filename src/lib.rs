//! gyre - scene-graph physics synchronization
//!
//! Application layer over [`gyre_core`] and [`gyre_physics`]: layered
//! configuration, scene construction and the frame driver.

pub mod config;
pub mod scene;
pub mod systems;

pub use gyre_core;
pub use gyre_physics;
