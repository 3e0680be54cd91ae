//! gyre - headless physics demo
//!
//! Builds (or loads) a scene, keeps it in sync with a rapier world for a
//! fixed number of frames and reports where things ended up.

use std::cell::RefCell;
use std::error::Error;
use std::rc::Rc;

use gyre::config::AppConfig;
use gyre::scene::SceneBuilder;
use gyre::systems::SimulationSystem;
use gyre_core::{Point3, Scene, Vector3, World};
use gyre_physics::{PhysicsConfig, PhysicsSystem, PhysicsWorld, SharedBackend};

fn demo_scene(physics: PhysicsConfig) -> SceneBuilder {
    SceneBuilder::new("demo")
        .with_physics(physics)
        .add_floor(0.0, 20.0)
        .add_box("crate", Vector3::new(0.0, 4.0, 0.0), Vector3::repeat(1.0), 2.0)
        .add_box("small_crate", Vector3::new(0.2, 6.0, 0.1), Vector3::repeat(0.5), 0.5)
        .add_sphere("ball", Vector3::new(3.0, 2.0, 0.0), 0.5, 1.0)
}

fn report(world: &World) {
    for name in ["crate", "small_crate", "ball"] {
        if let Some(position) = world.find_by_name(name).and_then(|key| world.world_position(key)) {
            log::info!(
                "{:>12}: ({:.3}, {:.3}, {:.3})",
                name,
                position.x,
                position.y,
                position.z
            );
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let config = AppConfig::load();
    let log_level = config
        .as_ref()
        .map(|c| c.debug.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let config = config.unwrap_or_else(|e| {
        log::warn!("Failed to load config: {}. Using defaults.", e);
        AppConfig::default()
    });

    let physics_config = config.physics.to_physics_config();
    let builder = match &config.scene.path {
        Some(path) => {
            log::info!("Loading scene from {}", path);
            SceneBuilder::from_scene(Scene::load(path)?, physics_config)
        }
        None => demo_scene(physics_config),
    };
    let (mut world, physics_config) = builder.build()?;

    let backend: SharedBackend = Rc::new(RefCell::new(PhysicsWorld::with_config(&physics_config)));
    let mut physics = PhysicsSystem::new(physics_config);
    physics.attach(&world, backend)?;
    let registered = physics.register_all(&world)?;
    log::info!("Registered {} rigid bodies", registered);

    let mut simulation = SimulationSystem::new(&config.simulation);
    let kick_frame = config.simulation.frames / 2;
    for frame in 0..config.simulation.frames {
        if frame == kick_frame {
            if let Some(ball) = world.find_by_name("ball") {
                physics.apply_impulse(ball, Vector3::new(-2.0, 3.0, 0.0))?;
            }
        }

        let stats = simulation.update(&mut physics, &mut world, config.simulation.frame_time)?;
        if stats.reconciled > 0 {
            log::debug!("Frame {}: {:?}", frame, stats);
        }
    }

    log::info!(
        "Simulated {} frames ({:.2}s)",
        simulation.frames(),
        simulation.elapsed()
    );
    report(&world);

    let probe = physics.raycast(&Point3::new(0.0, 10.0, 0.0), &Point3::new(0.0, -10.0, 0.0))?;
    if probe.is_hit() {
        let name = probe
            .rigid_body
            .and_then(|key| world.entity(key))
            .and_then(|entity| entity.name())
            .unwrap_or("<unnamed>");
        log::info!(
            "Probe ray hit '{}' at ({:.3}, {:.3}, {:.3})",
            name,
            probe.point.x,
            probe.point.y,
            probe.point.z
        );
    } else {
        log::info!("Probe ray hit nothing");
    }

    physics.shutdown();
    Ok(())
}
