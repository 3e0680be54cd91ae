//! Application configuration
//!
//! Configuration is loaded from multiple sources with the following priority (lowest to highest):
//! 1. `config/default.toml` (version controlled)
//! 2. `config/user.toml` (gitignored, user overrides)
//! 3. Environment variables (`GYRE_SECTION__KEY`)

use figment::{Figment, providers::{Format, Toml, Env}};
use gyre_physics::PhysicsConfig;
use nalgebra::Vector3;
use serde::{Serialize, Deserialize};
use std::path::Path;
use thiserror::Error;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Physics world configuration
    #[serde(default)]
    pub physics: PhysicsSection,
    /// Frame driver configuration
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Scene configuration
    #[serde(default)]
    pub scene: SceneConfig,
    /// Debug configuration
    #[serde(default)]
    pub debug: DebugConfig,
}

impl AppConfig {
    /// Load configuration from default locations
    ///
    /// Priority (lowest to highest):
    /// 1. `config/default.toml`
    /// 2. `config/user.toml`
    /// 3. Environment variables (`GYRE_*`)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific config directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let default_path = config_dir.join("default.toml");
        let user_path = config_dir.join("user.toml");

        let mut figment = Figment::new();

        if default_path.exists() {
            figment = figment.merge(Toml::file(&default_path));
        }

        if user_path.exists() {
            figment = figment.merge(Toml::file(&user_path));
        }

        // GYRE_SIMULATION__FRAMES=10 -> simulation.frames = 10
        figment = figment.merge(Env::prefixed("GYRE_").split("__"));

        Ok(figment.extract()?)
    }
}

/// Physics world configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsSection {
    /// Gravity vector [x, y, z]
    pub gravity: [f32; 3],
    /// Length of one simulation sub-step in seconds
    pub fixed_time_step: f32,
    /// Upper bound on sub-steps per frame
    pub max_sub_steps: u32,
}

impl Default for PhysicsSection {
    fn default() -> Self {
        let physics = PhysicsConfig::default();
        let g = physics.gravity;
        Self {
            gravity: [g.x, g.y, g.z],
            fixed_time_step: physics.fixed_time_step,
            max_sub_steps: physics.max_sub_steps,
        }
    }
}

impl PhysicsSection {
    /// Convert to the physics crate's config
    pub fn to_physics_config(&self) -> PhysicsConfig {
        PhysicsConfig::new(Vector3::from(self.gravity))
            .with_fixed_time_step(self.fixed_time_step)
            .with_max_sub_steps(self.max_sub_steps)
    }
}

/// Frame driver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Simulated seconds per frame
    pub frame_time: f32,
    /// Number of frames the headless driver runs
    pub frames: u32,
    /// Frame times above this are clamped
    pub max_frame_time: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            frame_time: 1.0 / 60.0,
            frames: 240,
            max_frame_time: 0.25,
        }
    }
}

/// Scene configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// RON scene to load; the built-in demo scene is used when unset
    pub path: Option<String>,
}

/// Debug configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Configuration error
#[derive(Debug, Error)]
#[error("Configuration error: {0}")]
pub struct ConfigError(#[from] figment::Error);
