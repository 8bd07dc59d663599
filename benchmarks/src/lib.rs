//! Shared setup helpers for rein-physics benchmarks.
//!
//! ## Running
//!
//!   cargo bench --manifest-path benchmarks/Cargo.toml --bench physics
//!
//! Filter by group:
//!   cargo bench --manifest-path benchmarks/Cargo.toml --bench physics -- narrowphase

use glam::{Quat, Vec3};
use rein_physics::ecs::prelude::*;
use rein_physics::physics::contact::Collision;
use rein_physics::{PhysicsConfig, PhysicsWorld};

/// Deterministic pseudo-random generator so every run builds the same scene.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    /// Uniform value in `[0, 1)`.
    pub fn next_f32(&mut self) -> f32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.0 >> 40) as f32) / ((1u64 << 24) as f32)
    }

    pub fn range(&mut self, min: f32, max: f32) -> f32 {
        min + (max - min) * self.next_f32()
    }
}

/// Spawn and register a body with a single collider.
pub fn spawn_body(
    world: &mut hecs::World,
    physics: &mut PhysicsWorld,
    rb: RigidBody,
    transform: Transform,
    shape: ColliderShape,
) -> anyhow::Result<hecs::Entity> {
    let entity = world.spawn((transform, rb));
    physics.attach_collider(world, entity, shape, Transform::identity())?;
    physics.register_body(world, entity)?;
    Ok(entity)
}

fn new_physics() -> PhysicsWorld {
    PhysicsWorld::new(PhysicsConfig::default()).expect("default config is valid")
}

/// `n` unit spheres packed in a cube, dense enough for frequent overlaps.
pub fn setup_sphere_world(n: usize) -> (hecs::World, PhysicsWorld) {
    let mut world = hecs::World::new();
    let mut physics = new_physics();
    let side = (n as f32).cbrt().ceil() as usize;
    let mut rng = Lcg::new(7);
    for i in 0..n {
        let (x, y, z) = (i % side, (i / side) % side, i / (side * side));
        let jitter = Vec3::new(rng.range(-0.3, 0.3), rng.range(-0.3, 0.3), rng.range(-0.3, 0.3));
        let position = Vec3::new(x as f32, y as f32, z as f32) * 1.8 + jitter;
        spawn_body(
            &mut world,
            &mut physics,
            RigidBody::new_dynamic(1.0),
            Transform::from_position(position),
            ColliderShape::Sphere { radius: 1.0 },
        )
        .expect("sphere body");
    }
    (world, physics)
}

/// Same packing as [`setup_sphere_world`] with every supported convex shape.
pub fn setup_mixed_world(n: usize) -> (hecs::World, PhysicsWorld) {
    let mut world = hecs::World::new();
    let mut physics = new_physics();
    let side = (n as f32).cbrt().ceil() as usize;
    let mut rng = Lcg::new(11);
    for i in 0..n {
        let (x, y, z) = (i % side, (i / side) % side, i / (side * side));
        let position = Vec3::new(x as f32, y as f32, z as f32) * 1.8;
        let rotation = Quat::from_euler(
            glam::EulerRot::XYZ,
            rng.range(0.0, 3.0),
            rng.range(0.0, 3.0),
            rng.range(0.0, 3.0),
        );
        let shape = match i % 5 {
            0 => ColliderShape::Sphere { radius: 1.0 },
            1 => ColliderShape::Box {
                half_extents: Vec3::splat(0.8),
            },
            2 => ColliderShape::Capsule {
                radius: 0.5,
                half_height: 0.5,
            },
            3 => ColliderShape::Cylinder {
                radius: 0.7,
                half_height: 0.6,
            },
            _ => ColliderShape::ConvexHull {
                points: vec![
                    Vec3::new(1.0, 0.0, 0.0),
                    Vec3::new(-1.0, 0.0, 0.0),
                    Vec3::new(0.0, 1.0, 0.0),
                    Vec3::new(0.0, -1.0, 0.0),
                    Vec3::new(0.0, 0.0, 1.0),
                    Vec3::new(0.0, 0.0, -1.0),
                ],
            },
        };
        spawn_body(
            &mut world,
            &mut physics,
            RigidBody::new_dynamic(1.0),
            Transform::from_position(position).with_rotation(rotation),
            shape,
        )
        .expect("mixed body");
    }
    (world, physics)
}

/// `n` small spheres spread over a large volume; almost no AABBs overlap.
pub fn setup_sparse_world(n: usize) -> (hecs::World, PhysicsWorld) {
    let mut world = hecs::World::new();
    let mut physics = new_physics();
    let mut rng = Lcg::new(13);
    let extent = (n as f32).sqrt() * 10.0;
    for _ in 0..n {
        let position = Vec3::new(
            rng.range(-extent, extent),
            rng.range(-extent, extent),
            rng.range(-extent, extent),
        );
        spawn_body(
            &mut world,
            &mut physics,
            RigidBody::new_dynamic(1.0),
            Transform::from_position(position),
            ColliderShape::Sphere { radius: 0.25 },
        )
        .expect("sparse body");
    }
    (world, physics)
}

/// A static ground plane with `n` boxes and spheres stacked above it.
pub fn setup_scene(n: usize) -> (hecs::World, PhysicsWorld) {
    let mut world = hecs::World::new();
    let mut physics = new_physics();
    spawn_body(
        &mut world,
        &mut physics,
        RigidBody::new_static(),
        Transform::identity(),
        ColliderShape::Plane { normal: Vec3::Y },
    )
    .expect("ground");

    let side = (n as f32).sqrt().ceil() as usize;
    for i in 0..n {
        let (x, z) = ((i % side) as f32, (i / side) as f32);
        let position = Vec3::new(x * 1.1, 0.5 + (i % 3) as f32 * 1.05, z * 1.1);
        let shape = if i % 2 == 0 {
            ColliderShape::Box {
                half_extents: Vec3::splat(0.5),
            }
        } else {
            ColliderShape::Sphere { radius: 0.5 }
        };
        spawn_body(
            &mut world,
            &mut physics,
            RigidBody::new_dynamic(1.0),
            Transform::from_position(position),
            shape,
        )
        .expect("scene body");
    }
    (world, physics)
}

/// `n` overlapping sphere pairs and the collisions one tick finds for them.
pub fn setup_collisions(n: usize) -> (hecs::World, Vec<Collision>) {
    let mut world = hecs::World::new();
    let mut physics = PhysicsWorld::new(PhysicsConfig {
        gravity: Vec3::ZERO,
        ..Default::default()
    })
    .expect("zero gravity config is valid");
    for i in 0..n {
        let x = i as f32 * 5.0;
        for (offset, velocity) in [(0.0, 1.0), (1.5, -1.0)] {
            let mut rb = RigidBody::new_dynamic(1.0);
            rb.linear_velocity = Vec3::new(velocity, 0.0, 0.0);
            spawn_body(
                &mut world,
                &mut physics,
                rb,
                Transform::from_position(Vec3::new(x + offset, 0.0, 0.0)),
                ColliderShape::Sphere { radius: 1.0 },
            )
            .expect("contact body");
        }
    }
    physics.step(&mut world, 1.0 / 60.0);
    let collisions = physics.collisions().to_vec();
    (world, collisions)
}

/// Spawn `spawn_per_frame` bodies above the ground each frame for `frames` frames.
pub fn run_spawn_loop(
    world: &mut hecs::World,
    physics: &mut PhysicsWorld,
    frames: usize,
    spawn_per_frame: usize,
) {
    let mut rng = Lcg::new(17);
    for _ in 0..frames {
        for _ in 0..spawn_per_frame {
            let position = Vec3::new(rng.range(-5.0, 5.0), rng.range(8.0, 12.0), rng.range(-5.0, 5.0));
            spawn_body(
                world,
                physics,
                RigidBody::new_dynamic(1.0),
                Transform::from_position(position),
                ColliderShape::Sphere { radius: 0.4 },
            )
            .expect("spawned body");
        }
        physics.update(world, 1.0 / 60.0);
    }
}
