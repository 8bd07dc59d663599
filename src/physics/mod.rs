//! CPU-based physics engine with rigid body simulation and collision detection.
//!
//! # Architecture
//!
//! The physics pipeline runs in a fixed timestep loop:
//!
//! 1. Apply forces (gravity)
//! 2. Integrate velocities and positions
//! 3. Synchronize transforms and refresh collider bounds
//! 4. Broadphase collision detection (AABB overlap)
//! 5. Narrowphase collision detection (analytic tests, SAT, GJK/EPA)
//! 6. Run the registered solvers (impulse, then position)
//! 7. Synchronize transforms

pub mod broadphase;
pub mod collider;
pub mod contact;
pub mod epa;
pub mod error;
pub mod gjk;
pub mod heap;
pub mod narrowphase;
pub mod rigid_body;
pub mod sat;
pub mod shape;
pub mod solver;

use glam::Vec3;
use tracing::{debug, trace, warn};

use crate::ecs::components::physics::{Collider, ColliderShape, RigidBody};
use crate::ecs::components::transform::{GlobalTransform, Transform};

use self::broadphase::Broadphase;
use self::contact::Collision;
use self::epa::EPA_MAX_ITERATIONS;
use self::gjk::GJK_MAX_ITERATIONS;
use self::narrowphase::Narrowphase;
use self::solver::{ImpulseSolver, PositionSolver, Solver};

pub use self::error::{PhysicsError, PhysicsResult};

/// Configuration for the physics simulation.
#[derive(Debug, Clone)]
pub struct PhysicsConfig {
    /// Gravity vector. Default: (0, -9.81, 0).
    pub gravity: Vec3,
    /// Fixed timestep for physics updates in seconds. Default: 1/60.
    pub fixed_timestep: f64,
    /// Maximum number of sub-steps per frame. Default: 4.
    pub max_substeps: u32,
    /// GJK iteration cap. Default: 64.
    pub gjk_max_iterations: usize,
    /// EPA iteration cap. Default: 64.
    pub epa_max_iterations: usize,
    /// Apply the per-body damping factors during integration. Default: false.
    pub apply_damping: bool,
    /// Fraction of penetration removed by the position solver. Default: 0.8.
    pub position_correction: f32,
    /// Penetration the position solver leaves alone. Default: 0.005.
    pub penetration_slop: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            fixed_timestep: 1.0 / 60.0,
            max_substeps: 4,
            gjk_max_iterations: GJK_MAX_ITERATIONS,
            epa_max_iterations: EPA_MAX_ITERATIONS,
            apply_damping: false,
            position_correction: 0.8,
            penetration_slop: 0.005,
        }
    }
}

impl PhysicsConfig {
    pub fn validate(&self) -> PhysicsResult<()> {
        let invalid = |message: String| Err(PhysicsError::InvalidConfiguration(message));
        if !self.gravity.is_finite() {
            return invalid(format!("gravity must be finite, got {}", self.gravity));
        }
        if !(self.fixed_timestep > 0.0 && self.fixed_timestep.is_finite()) {
            return invalid(format!(
                "fixed timestep must be positive, got {}",
                self.fixed_timestep
            ));
        }
        if self.max_substeps == 0 {
            return invalid("max_substeps must be at least 1".to_string());
        }
        if self.gjk_max_iterations == 0 || self.epa_max_iterations == 0 {
            return invalid("GJK and EPA iteration caps must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.position_correction) {
            return invalid(format!(
                "position correction must be within [0, 1], got {}",
                self.position_correction
            ));
        }
        if self.penetration_slop < 0.0 {
            return invalid(format!(
                "penetration slop must be non-negative, got {}",
                self.penetration_slop
            ));
        }
        Ok(())
    }
}

/// The main physics world managing simulation state.
///
/// The host owns the `hecs::World`; this context owns the registered body
/// list, the solver list and the configuration.
pub struct PhysicsWorld {
    config: PhysicsConfig,
    accumulator: f64,
    bodies: Vec<hecs::Entity>,
    solvers: Vec<Box<dyn Solver>>,
    broadphase: Broadphase,
    narrowphase: Narrowphase,
    collisions: Vec<Collision>,
}

impl PhysicsWorld {
    /// Create a new physics world with the given configuration and the
    /// default solvers.
    pub fn new(config: PhysicsConfig) -> PhysicsResult<Self> {
        config.validate()?;
        let solvers: Vec<Box<dyn Solver>> = vec![
            Box::new(ImpulseSolver::new()),
            Box::new(PositionSolver::new(
                config.position_correction,
                config.penetration_slop,
            )),
        ];
        Ok(Self {
            narrowphase: Narrowphase::new(config.gjk_max_iterations, config.epa_max_iterations),
            config,
            accumulator: 0.0,
            bodies: Vec::new(),
            solvers,
            broadphase: Broadphase::new(),
            collisions: Vec::new(),
        })
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    /// Registered bodies in registration order.
    pub fn bodies(&self) -> &[hecs::Entity] {
        &self.bodies
    }

    /// Collisions found by the last tick.
    pub fn collisions(&self) -> &[Collision] {
        &self.collisions
    }

    /// Names of the registered solvers in run order.
    pub fn solver_names(&self) -> Vec<&'static str> {
        self.solvers.iter().map(|s| s.name()).collect()
    }

    /// Append a solver; it runs after the ones already registered.
    pub fn add_solver(&mut self, solver: Box<dyn Solver>) {
        self.solvers.push(solver);
    }

    /// Remove the first solver called `name`.
    pub fn remove_solver(&mut self, name: &str) -> Option<Box<dyn Solver>> {
        let index = self.solvers.iter().position(|s| s.name() == name)?;
        Some(self.solvers.remove(index))
    }

    /// Add a body to the simulation.
    ///
    /// The entity must carry `RigidBody` and `Transform`; a missing
    /// `GlobalTransform` is inserted. Registering twice is a no-op.
    pub fn register_body(
        &mut self,
        world: &mut hecs::World,
        entity: hecs::Entity,
    ) -> PhysicsResult<()> {
        let transform = *world
            .get::<&Transform>(entity)
            .map_err(|_| PhysicsError::MissingComponent {
                entity,
                component: "Transform",
            })?;
        {
            let rb = world
                .get::<&RigidBody>(entity)
                .map_err(|_| PhysicsError::MissingComponent {
                    entity,
                    component: "RigidBody",
                })?;
            if rb.is_dynamic() && rb.mass <= 0.0 {
                return Err(PhysicsError::InvalidConfiguration(format!(
                    "dynamic body {entity:?} needs a positive mass, got {}",
                    rb.mass
                )));
            }
            if rb.is_dynamic() {
                for &collider in &rb.colliders {
                    if let Ok(c) = world.get::<&Collider>(collider) {
                        if matches!(c.shape, ColliderShape::Plane { .. }) {
                            return Err(PhysicsError::InvalidConfiguration(format!(
                                "dynamic body {entity:?} cannot carry a plane collider"
                            )));
                        }
                    }
                }
            }
        }

        if world.get::<&GlobalTransform>(entity).is_err() {
            let global = GlobalTransform::from(&transform);
            world
                .insert_one(entity, global)
                .map_err(|_| PhysicsError::MissingComponent {
                    entity,
                    component: "GlobalTransform",
                })?;
        }

        rigid_body::update_mass_properties(world, entity)?;
        rigid_body::update_colliders(world, &[entity]);

        if !self.bodies.contains(&entity) {
            self.bodies.push(entity);
            debug!(?entity, bodies = self.bodies.len(), "registered rigid body");
        }
        Ok(())
    }

    /// Remove a body from the simulation. Its components stay in the world.
    pub fn unregister_body(&mut self, entity: hecs::Entity) -> bool {
        let Some(index) = self.bodies.iter().position(|&e| e == entity) else {
            return false;
        };
        self.bodies.remove(index);
        self.collisions
            .retain(|c| c.body_a != entity && c.body_b != entity);
        debug!(?entity, bodies = self.bodies.len(), "unregistered rigid body");
        true
    }

    /// Spawn a collider entity for `body` and recompute the body's mass
    /// properties.
    pub fn attach_collider(
        &mut self,
        world: &mut hecs::World,
        body: hecs::Entity,
        shape: ColliderShape,
        local: Transform,
    ) -> PhysicsResult<hecs::Entity> {
        shape.validate()?;
        let parent = {
            let rb = world
                .get::<&RigidBody>(body)
                .map_err(|_| PhysicsError::MissingComponent {
                    entity: body,
                    component: "RigidBody",
                })?;
            if rb.is_dynamic() && matches!(shape, ColliderShape::Plane { .. }) {
                return Err(PhysicsError::InvalidConfiguration(format!(
                    "dynamic body {body:?} cannot carry a plane collider"
                )));
            }
            world
                .get::<&GlobalTransform>(body)
                .map(|g| g.0)
                .or_else(|_| world.get::<&Transform>(body).map(|t| t.to_matrix()))
                .ok()
        };

        let mut collider = Collider::with_local(shape, local, body);
        collider.update_transform_matrix(parent);
        let entity = world.spawn((collider,));

        if let Ok(mut rb) = world.get::<&mut RigidBody>(body) {
            rb.colliders.push(entity);
        }
        rigid_body::update_mass_properties(world, body)?;
        trace!(?body, collider = ?entity, "attached collider");
        Ok(entity)
    }

    /// Despawn a collider entity and recompute its body's mass properties.
    pub fn detach_collider(
        &mut self,
        world: &mut hecs::World,
        collider: hecs::Entity,
    ) -> PhysicsResult<()> {
        let body = world
            .get::<&Collider>(collider)
            .map(|c| c.body)
            .map_err(|_| PhysicsError::MissingComponent {
                entity: collider,
                component: "Collider",
            })?;
        if let Ok(mut rb) = world.get::<&mut RigidBody>(body) {
            rb.colliders.retain(|&c| c != collider);
        }
        // Just checked that the entity exists
        let _ = world.despawn(collider);
        if world.get::<&RigidBody>(body).is_ok() {
            rigid_body::update_mass_properties(world, body)?;
        }
        Ok(())
    }

    /// Advance by `frame_time` seconds using the fixed timestep accumulator.
    ///
    /// Returns the number of ticks run.
    pub fn update(&mut self, world: &mut hecs::World, frame_time: f64) -> u32 {
        self.accumulator += frame_time;

        let mut substeps = 0u32;
        while self.accumulator >= self.config.fixed_timestep && substeps < self.config.max_substeps
        {
            self.step(world, self.config.fixed_timestep as f32);
            self.accumulator -= self.config.fixed_timestep;
            substeps += 1;
        }

        // Clamp accumulator to avoid spiral of death
        if self.accumulator > self.config.fixed_timestep * self.config.max_substeps as f64 {
            self.accumulator = 0.0;
        }
        substeps
    }

    /// Run exactly one tick of `dt` seconds.
    pub fn step(&mut self, world: &mut hecs::World, dt: f32) {
        // 1. Apply forces (gravity)
        rigid_body::apply_gravity(world, &self.bodies, self.config.gravity);

        // 2. Integrate
        rigid_body::integrate(world, &self.bodies, dt, self.config.apply_damping);

        // 3. Synchronize transforms so the broadphase sees current positions
        rigid_body::sync_transforms(world, &self.bodies);
        rigid_body::update_colliders(world, &self.bodies);

        // 4. Broadphase collision detection
        let pairs = self.broadphase.find_pairs(world, &self.bodies);

        // 5. Narrowphase collision detection
        self.collisions.clear();
        for pair in &pairs {
            let result = {
                let (Ok(ca), Ok(cb)) = (
                    world.get::<&Collider>(pair.collider_a),
                    world.get::<&Collider>(pair.collider_b),
                ) else {
                    continue;
                };
                self.narrowphase.test_collision(&ca, &cb)
            };

            match result {
                Ok(Some(manifold)) => self.collisions.push(Collision::new(*pair, manifold)),
                Ok(None) => {}
                Err(err) => warn!(
                    %err,
                    body_a = ?pair.body_a,
                    body_b = ?pair.body_b,
                    "skipping collider pair"
                ),
            }
        }
        trace!(
            pairs = pairs.len(),
            collisions = self.collisions.len(),
            "narrowphase done"
        );

        // 6. Solve contacts
        if !self.collisions.is_empty() {
            for solver in self.solvers.iter_mut() {
                solver.solve(&self.collisions, world, dt);
            }
        }

        // 7. Synchronize transforms
        rigid_body::sync_transforms(world, &self.bodies);
        rigid_body::update_colliders(world, &self.bodies);
    }
}
