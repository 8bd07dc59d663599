//! Contact resolution: sequential impulses and positional correction.
//!
//! Solvers run in order over the collisions of one step. Each solver reads
//! body state into a local snapshot, works on the snapshot, then writes the
//! result back, so no two component borrows of the same body ever overlap.

use glam::{Mat3, Vec3};

use crate::ecs::components::physics::RigidBody;
use crate::ecs::components::transform::Transform;

use super::contact::Collision;

/// A pass over the collisions of a single step.
pub trait Solver: Send + Sync {
    fn name(&self) -> &'static str;

    fn solve(&mut self, collisions: &[Collision], world: &mut hecs::World, dt: f32);
}

/// Velocity-level contact response with restitution and Coulomb friction.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImpulseSolver;

impl ImpulseSolver {
    pub fn new() -> Self {
        Self
    }
}

impl Solver for ImpulseSolver {
    fn name(&self) -> &'static str {
        "impulse"
    }

    fn solve(&mut self, collisions: &[Collision], world: &mut hecs::World, _dt: f32) {
        for collision in collisions {
            solve_collision(collision, world);
        }
    }
}

/// Snapshot of the rigid body data the impulse solver needs.
#[derive(Debug, Clone, Copy)]
struct RbData {
    inv_mass: f32,
    inv_inertia: Mat3,
    linear_velocity: Vec3,
    angular_velocity: Vec3,
    position: Vec3,
    restitution: f32,
    static_friction: f32,
    dynamic_friction: f32,
}

impl RbData {
    fn read(world: &hecs::World, entity: hecs::Entity) -> Option<Self> {
        let rb = world.get::<&RigidBody>(entity).ok()?;
        let transform = world.get::<&Transform>(entity).ok()?;
        Some(Self {
            inv_mass: rb.inverse_mass(),
            inv_inertia: rb.world_inverse_inertia(transform.rotation_matrix()),
            linear_velocity: rb.linear_velocity,
            angular_velocity: rb.angular_velocity,
            position: transform.position,
            restitution: rb.restitution,
            static_friction: rb.static_friction,
            dynamic_friction: rb.dynamic_friction,
        })
    }

    #[inline]
    fn velocity_at(&self, r: Vec3) -> Vec3 {
        self.linear_velocity + self.angular_velocity.cross(r)
    }

    /// Apply `impulse` at offset `r` from the center of mass.
    #[inline]
    fn apply(&mut self, impulse: Vec3, r: Vec3) {
        self.linear_velocity += impulse * self.inv_mass;
        self.angular_velocity += self.inv_inertia * r.cross(impulse);
    }

    fn write(&self, world: &mut hecs::World, entity: hecs::Entity) {
        if let Ok(mut rb) = world.get::<&mut RigidBody>(entity) {
            if rb.is_dynamic() {
                rb.linear_velocity = self.linear_velocity;
                rb.angular_velocity = self.angular_velocity;
            }
        }
    }
}

/// Effective inverse mass along `direction` at offsets `r_a` and `r_b`.
#[inline]
fn effective_inverse_mass(a: &RbData, b: &RbData, r_a: Vec3, r_b: Vec3, direction: Vec3) -> f32 {
    let r_a_cross = r_a.cross(direction);
    let r_b_cross = r_b.cross(direction);
    a.inv_mass
        + b.inv_mass
        + (a.inv_inertia * r_a_cross).dot(r_a_cross)
        + (b.inv_inertia * r_b_cross).dot(r_b_cross)
}

fn solve_collision(collision: &Collision, world: &mut hecs::World) {
    let (Some(mut a), Some(mut b)) = (
        RbData::read(world, collision.body_a),
        RbData::read(world, collision.body_b),
    ) else {
        return;
    };

    // Skip if both are static/kinematic
    if a.inv_mass == 0.0 && b.inv_mass == 0.0 {
        return;
    }

    let normal = collision.manifold.normal;
    let restitution = a.restitution.min(b.restitution);
    let mu_static = (a.static_friction * b.static_friction).sqrt();
    let mu_dynamic = (a.dynamic_friction * b.dynamic_friction).sqrt();

    for contact in &collision.manifold.points {
        let point = contact.midpoint();
        let r_a = point - a.position;
        let r_b = point - b.position;

        let relative_velocity = b.velocity_at(r_b) - a.velocity_at(r_a);
        let contact_velocity = relative_velocity.dot(normal);

        // Already separating
        if contact_velocity > 0.0 {
            continue;
        }

        let inv_mass_sum = effective_inverse_mass(&a, &b, r_a, r_b, normal);
        if inv_mass_sum <= 0.0 {
            continue;
        }

        let j_normal = -(1.0 + restitution) * contact_velocity / inv_mass_sum;
        let impulse = normal * j_normal;
        a.apply(-impulse, r_a);
        b.apply(impulse, r_b);

        // Friction from the post-impulse relative velocity
        let relative_velocity = b.velocity_at(r_b) - a.velocity_at(r_a);
        let tangent_vel = relative_velocity - normal * relative_velocity.dot(normal);
        let tangent_len = tangent_vel.length();
        if tangent_len <= 1e-6 {
            continue;
        }
        let tangent = tangent_vel / tangent_len;

        let inv_mass_t = effective_inverse_mass(&a, &b, r_a, r_b, tangent);
        if inv_mass_t <= 0.0 {
            continue;
        }

        let j_tangent = -relative_velocity.dot(tangent) / inv_mass_t;

        // Coulomb: stick inside the static cone, otherwise slide
        let friction_impulse = if j_tangent.abs() <= j_normal * mu_static {
            tangent * j_tangent
        } else {
            tangent * (-j_normal * mu_dynamic)
        };
        a.apply(-friction_impulse, r_a);
        b.apply(friction_impulse, r_b);
    }

    a.write(world, collision.body_a);
    b.write(world, collision.body_b);
}

/// Pushes penetrating bodies apart along the contact normal.
#[derive(Debug, Clone, Copy)]
pub struct PositionSolver {
    /// Fraction of the penetration corrected per step.
    pub percent: f32,
    /// Penetration left uncorrected.
    pub slop: f32,
}

impl Default for PositionSolver {
    fn default() -> Self {
        Self {
            percent: 0.8,
            slop: 0.005,
        }
    }
}

impl PositionSolver {
    pub fn new(percent: f32, slop: f32) -> Self {
        Self { percent, slop }
    }
}

impl Solver for PositionSolver {
    fn name(&self) -> &'static str {
        "position"
    }

    fn solve(&mut self, collisions: &[Collision], world: &mut hecs::World, _dt: f32) {
        for collision in collisions {
            let correction = (collision.manifold.depth() - self.slop).max(0.0) * self.percent;
            if correction <= 0.0 {
                continue;
            }

            let is_dynamic = |entity| {
                world
                    .get::<&RigidBody>(entity)
                    .map(|rb| rb.is_dynamic())
                    .unwrap_or(false)
            };
            let dynamic_a = is_dynamic(collision.body_a);
            let dynamic_b = is_dynamic(collision.body_b);

            let push = collision.manifold.normal * correction;
            let (push_a, push_b) = match (dynamic_a, dynamic_b) {
                (true, true) => (-push * 0.5, push * 0.5),
                (true, false) => (-push, Vec3::ZERO),
                (false, true) => (Vec3::ZERO, push),
                (false, false) => continue,
            };

            if dynamic_a {
                if let Ok(mut transform) = world.get::<&mut Transform>(collision.body_a) {
                    transform.position += push_a;
                }
            }
            if dynamic_b {
                if let Ok(mut transform) = world.get::<&mut Transform>(collision.body_b) {
                    transform.position += push_b;
                }
            }
        }
    }
}
