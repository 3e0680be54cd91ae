//! Simulation frame driver
//!
//! Manages the frame loop around the physics layer:
//! - Delta time calculation and clamping
//! - Driving [`PhysicsSystem::update`]
//! - Frame bookkeeping

use std::time::Instant;

use gyre_core::World;
use gyre_physics::{FrameStats, PhysicsError, PhysicsSystem};

use crate::config::SimulationConfig;

/// Drives physics once per frame
pub struct SimulationSystem {
    last_frame: Instant,
    max_frame_time: f32,
    frames: u64,
    elapsed: f32,
}

impl SimulationSystem {
    /// Create a new simulation system
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            last_frame: Instant::now(),
            max_frame_time: config.max_frame_time,
            frames: 0,
            elapsed: 0.0,
        }
    }

    /// Run one frame with an explicit delta time
    ///
    /// `dt` is clamped to `[0, max_frame_time]` before it reaches the
    /// physics accumulator.
    pub fn update(
        &mut self,
        physics: &mut PhysicsSystem,
        world: &mut World,
        dt: f32,
    ) -> Result<FrameStats, PhysicsError> {
        let dt = self.clamp(dt);
        let stats = physics.update(world, dt)?;
        self.frames += 1;
        self.elapsed += dt;
        self.last_frame = Instant::now();
        Ok(stats)
    }

    /// Run one frame using the wall-clock time since the previous frame
    pub fn tick(
        &mut self,
        physics: &mut PhysicsSystem,
        world: &mut World,
    ) -> Result<FrameStats, PhysicsError> {
        let raw_dt = self.last_frame.elapsed().as_secs_f32();
        self.update(physics, world, raw_dt)
    }

    /// Frames run so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Simulated seconds so far
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    fn clamp(&self, dt: f32) -> f32 {
        if !dt.is_finite() || dt < 0.0 {
            log::warn!("Ignoring invalid frame time {}", dt);
            return 0.0;
        }
        // Cap dt to prevent a spiral of death after a stall
        dt.min(self.max_frame_time)
    }
}

impl Default for SimulationSystem {
    fn default() -> Self {
        Self::new(&SimulationConfig::default())
    }
}
