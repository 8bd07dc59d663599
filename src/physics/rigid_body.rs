//! Rigid body integration, transform sync and mass properties.
//!
//! All functions walk the explicit list of registered bodies rather than
//! querying the whole world, so entities that carry physics components but
//! were never registered are left alone.

use glam::{Mat3, Quat, Vec3};
use tracing::debug;

use crate::ecs::components::physics::{Collider, ColliderShape, RigidBody, RigidBodyType};
use crate::ecs::components::transform::{GlobalTransform, Transform};

use super::error::{PhysicsError, PhysicsResult};

/// Apply gravity force to all dynamic rigid bodies.
pub fn apply_gravity(world: &mut hecs::World, bodies: &[hecs::Entity], gravity: Vec3) {
    for &entity in bodies {
        let Ok(mut rb) = world.get::<&mut RigidBody>(entity) else {
            continue;
        };
        if rb.is_dynamic() && rb.mass > 0.0 {
            let force = gravity * rb.mass * rb.gravity_scale;
            rb.apply_force(force);
        }
    }
}

/// Semi-implicit Euler: velocities from accumulated forces first, then
/// positions from the new velocities. Accumulators are cleared afterwards.
///
/// Kinematic bodies move with their velocities but ignore forces. Static
/// bodies never move.
pub fn integrate(world: &mut hecs::World, bodies: &[hecs::Entity], dt: f32, apply_damping: bool) {
    for &entity in bodies {
        let Ok((rb, transform)) = world.query_one_mut::<(&mut RigidBody, &mut Transform)>(entity)
        else {
            continue;
        };

        match rb.body_type {
            RigidBodyType::Dynamic if rb.mass > 0.0 => {
                // Linear velocity: v += (F/m) * dt
                rb.linear_velocity += rb.force_accumulator * rb.inverse_mass() * dt;

                // Angular velocity: omega += I_world^-1 * tau * dt
                let inv_inertia = rb.world_inverse_inertia(transform.rotation_matrix());
                rb.angular_velocity += inv_inertia * rb.torque_accumulator * dt;

                if apply_damping {
                    rb.linear_velocity *= (1.0 - rb.linear_damping).max(0.0);
                    rb.angular_velocity *= (1.0 - rb.angular_damping).max(0.0);
                }

                integrate_pose(transform, rb.linear_velocity, rb.angular_velocity, dt);
            }
            RigidBodyType::Kinematic => {
                integrate_pose(transform, rb.linear_velocity, rb.angular_velocity, dt);
            }
            _ => {}
        }

        rb.force_accumulator = Vec3::ZERO;
        rb.torque_accumulator = Vec3::ZERO;
    }
}

/// p += v * dt, q += 0.5 * omega * q * dt.
fn integrate_pose(transform: &mut Transform, linear: Vec3, angular: Vec3, dt: f32) {
    transform.position += linear * dt;

    if angular.length_squared() > 1e-10 {
        let omega_quat = Quat::from_xyzw(angular.x, angular.y, angular.z, 0.0);
        let q_dot = omega_quat * transform.rotation * 0.5;
        transform.rotation = Quat::from_xyzw(
            transform.rotation.x + q_dot.x * dt,
            transform.rotation.y + q_dot.y * dt,
            transform.rotation.z + q_dot.z * dt,
            transform.rotation.w + q_dot.w * dt,
        )
        .normalize();
    }
}

/// Copy each body's Transform into its GlobalTransform.
pub fn sync_transforms(world: &mut hecs::World, bodies: &[hecs::Entity]) {
    for &entity in bodies {
        if let Ok((transform, global)) =
            world.query_one_mut::<(&Transform, &mut GlobalTransform)>(entity)
        {
            *global = GlobalTransform::from(&*transform);
        }
    }
}

/// Refresh every attached collider's world matrix and AABB from its body.
pub fn update_colliders(world: &mut hecs::World, bodies: &[hecs::Entity]) {
    for &entity in bodies {
        let (matrix, colliders) = {
            let Ok(rb) = world.get::<&RigidBody>(entity) else {
                continue;
            };
            let Ok(global) = world.get::<&GlobalTransform>(entity) else {
                continue;
            };
            (global.0, rb.colliders.clone())
        };
        for collider in colliders {
            if let Ok(mut c) = world.get::<&mut Collider>(collider) {
                c.update_transform_matrix(Some(matrix));
            }
        }
    }
}

/// Body-space inertia tensor of a single shape of mass `mass` about its own
/// origin. Planes have none.
pub fn shape_inertia(shape: &ColliderShape, mass: f32) -> Mat3 {
    let diagonal = match shape {
        ColliderShape::Sphere { radius } => Vec3::splat(0.4 * mass * radius * radius),
        ColliderShape::Box { half_extents } => {
            let h2 = *half_extents * *half_extents;
            Vec3::new(h2.y + h2.z, h2.x + h2.z, h2.x + h2.y) * (mass / 3.0)
        }
        ColliderShape::Cylinder {
            radius,
            half_height,
        } => {
            let h = 2.0 * half_height;
            let lateral = mass * (3.0 * radius * radius + h * h) / 12.0;
            Vec3::new(lateral, 0.5 * mass * radius * radius, lateral)
        }
        ColliderShape::Capsule {
            radius,
            half_height,
        } => {
            // Cylinder plus two hemispheres, mass split by volume
            let (r, h) = (*radius, 2.0 * half_height);
            let cylinder_volume = std::f32::consts::PI * r * r * h;
            let sphere_volume = 4.0 / 3.0 * std::f32::consts::PI * r * r * r;
            let total = cylinder_volume + sphere_volume;
            if total <= 0.0 {
                return Mat3::ZERO;
            }
            let m_cyl = mass * cylinder_volume / total;
            let m_caps = mass - m_cyl;
            let axial = 0.5 * m_cyl * r * r + 0.4 * m_caps * r * r;
            let lateral = m_cyl * (h * h / 12.0 + r * r / 4.0)
                + m_caps * (0.4 * r * r + h * h / 4.0 + 3.0 * h * r / 8.0);
            Vec3::new(lateral, axial, lateral)
        }
        ColliderShape::ConvexHull { points } => {
            // Bounding sphere around the vertex centroid
            if points.is_empty() {
                return Mat3::ZERO;
            }
            let centroid = points.iter().copied().sum::<Vec3>() / points.len() as f32;
            let radius = points
                .iter()
                .map(|p| p.distance(centroid))
                .fold(0.0_f32, f32::max);
            Vec3::splat(0.4 * mass * radius * radius)
        }
        ColliderShape::Plane { .. } => return Mat3::ZERO,
    };
    Mat3::from_diagonal(diagonal)
}

/// Move a shape inertia into body space: rotate by the collider's local
/// rotation, then shift by its offset (parallel axis theorem).
fn offset_inertia(inertia: Mat3, mass: f32, local: &Transform) -> Mat3 {
    let rotation = Mat3::from_quat(local.rotation);
    let rotated = rotation * inertia * rotation.transpose();
    let r = local.position;
    let outer = Mat3::from_cols(r * r.x, r * r.y, r * r.z);
    rotated + (Mat3::IDENTITY * r.length_squared() - outer) * mass
}

/// Recompute a body's inertia tensor from its attached colliders.
///
/// The body mass is split evenly across colliders. When nothing contributes
/// (no colliders, or only planes) the tensor falls back to `mass * I`.
/// Non-dynamic bodies get zero tensors.
pub fn update_mass_properties(world: &mut hecs::World, body: hecs::Entity) -> PhysicsResult<()> {
    let (body_type, mass, colliders) = {
        let rb = world
            .get::<&RigidBody>(body)
            .map_err(|_| PhysicsError::MissingComponent {
                entity: body,
                component: "RigidBody",
            })?;
        (rb.body_type, rb.mass, rb.colliders.clone())
    };

    let (inertia, inverse) = if body_type == RigidBodyType::Dynamic && mass > 0.0 {
        let shapes: Vec<(ColliderShape, Transform)> = colliders
            .iter()
            .filter_map(|&c| {
                let collider = world.get::<&Collider>(c).ok()?;
                Some((collider.shape.clone(), collider.local))
            })
            .collect();

        let mut inertia = Mat3::ZERO;
        if !shapes.is_empty() {
            let share = mass / shapes.len() as f32;
            for (shape, local) in &shapes {
                if matches!(shape, ColliderShape::Plane { .. }) {
                    continue;
                }
                inertia += offset_inertia(shape_inertia(shape, share), share, local);
            }
        }
        if inertia.determinant().abs() < 1e-12 {
            debug!(?body, "no collider contributes inertia, using mass * identity");
            inertia = Mat3::from_diagonal(Vec3::splat(mass));
        }
        (inertia, inertia.inverse())
    } else {
        (Mat3::ZERO, Mat3::ZERO)
    };

    if let Ok(mut rb) = world.get::<&mut RigidBody>(body) {
        rb.inertia_tensor = inertia;
        rb.inverse_inertia_tensor = inverse;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn(world: &mut hecs::World, rb: RigidBody, position: Vec3) -> hecs::Entity {
        let transform = Transform::from_position(position);
        world.spawn((transform, GlobalTransform::from(&transform), rb))
    }

    #[test]
    fn test_free_fall_matches_semi_implicit_euler() {
        let mut world = hecs::World::new();
        let body = spawn(&mut world, RigidBody::new_dynamic(2.0), Vec3::ZERO);
        let bodies = [body];
        let gravity = Vec3::new(0.0, -9.81, 0.0);
        let dt = 1.0 / 60.0;
        let steps = 30;

        for _ in 0..steps {
            apply_gravity(&mut world, &bodies, gravity);
            integrate(&mut world, &bodies, dt, false);
        }

        let n = steps as f32;
        let rb = world.get::<&RigidBody>(body).unwrap();
        let transform = world.get::<&Transform>(body).unwrap();
        assert!((rb.linear_velocity.y - gravity.y * n * dt).abs() < 1e-4);
        let expected_y = gravity.y * n * (n + 1.0) / 2.0 * dt * dt;
        assert!((transform.position.y - expected_y).abs() < 1e-4);
        assert_eq!(rb.force_accumulator, Vec3::ZERO);
    }

    #[test]
    fn test_static_body_does_not_move() {
        let mut world = hecs::World::new();
        let body = spawn(&mut world, RigidBody::new_static(), Vec3::ONE);
        world.get::<&mut RigidBody>(body).unwrap().linear_velocity = Vec3::X;
        apply_gravity(&mut world, &[body], Vec3::new(0.0, -9.81, 0.0));
        integrate(&mut world, &[body], 0.1, false);
        assert_eq!(world.get::<&Transform>(body).unwrap().position, Vec3::ONE);
    }

    #[test]
    fn test_kinematic_body_follows_velocity_only() {
        let mut world = hecs::World::new();
        let body = spawn(&mut world, RigidBody::new_kinematic(), Vec3::ZERO);
        {
            let mut rb = world.get::<&mut RigidBody>(body).unwrap();
            rb.linear_velocity = Vec3::new(1.0, 0.0, 0.0);
            rb.apply_force(Vec3::new(0.0, 100.0, 0.0));
        }
        integrate(&mut world, &[body], 0.5, false);
        let transform = world.get::<&Transform>(body).unwrap();
        assert!((transform.position - Vec3::new(0.5, 0.0, 0.0)).length() < 1e-6);
        assert_eq!(world.get::<&RigidBody>(body).unwrap().linear_velocity, Vec3::X);
    }

    #[test]
    fn test_damping_only_when_enabled() {
        let mut world = hecs::World::new();
        let body = spawn(&mut world, RigidBody::new_dynamic(1.0), Vec3::ZERO);
        world.get::<&mut RigidBody>(body).unwrap().linear_velocity = Vec3::X;

        integrate(&mut world, &[body], 0.1, false);
        assert_eq!(world.get::<&RigidBody>(body).unwrap().linear_velocity, Vec3::X);

        integrate(&mut world, &[body], 0.1, true);
        let v = world.get::<&RigidBody>(body).unwrap().linear_velocity;
        assert!((v.x - 0.99).abs() < 1e-6);
    }

    #[test]
    fn test_torque_spins_body() {
        let mut world = hecs::World::new();
        let body = spawn(&mut world, RigidBody::new_dynamic(1.0), Vec3::ZERO);
        world
            .get::<&mut RigidBody>(body)
            .unwrap()
            .apply_torque(Vec3::new(0.0, 1.0, 0.0));
        integrate(&mut world, &[body], 0.1, false);
        let rb = world.get::<&RigidBody>(body).unwrap();
        assert!((rb.angular_velocity.y - 0.1).abs() < 1e-6);
        let rotation = world.get::<&Transform>(body).unwrap().rotation;
        assert!(rotation.is_normalized());
        assert!(rotation.to_axis_angle().1 > 0.0);
    }

    #[test]
    fn test_sync_and_update_colliders() {
        let mut world = hecs::World::new();
        let body = spawn(&mut world, RigidBody::new_dynamic(1.0), Vec3::ZERO);
        let collider = world.spawn((Collider::new(ColliderShape::Sphere { radius: 1.0 }, body),));
        world.get::<&mut RigidBody>(body).unwrap().colliders.push(collider);

        world.get::<&mut Transform>(body).unwrap().position = Vec3::new(0.0, 3.0, 0.0);
        sync_transforms(&mut world, &[body]);
        update_colliders(&mut world, &[body]);

        let global = world.get::<&GlobalTransform>(body).unwrap();
        assert!((global.translation() - Vec3::new(0.0, 3.0, 0.0)).length() < 1e-6);
        let c = world.get::<&Collider>(collider).unwrap();
        assert!((c.aabb.min.y - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_shape_inertia() {
        let sphere = shape_inertia(&ColliderShape::Sphere { radius: 1.0 }, 5.0);
        assert!((sphere.x_axis.x - 2.0).abs() < 1e-6);

        let cube = shape_inertia(
            &ColliderShape::Box {
                half_extents: Vec3::splat(0.5),
            },
            6.0,
        );
        assert!((cube.y_axis.y - 1.0).abs() < 1e-6);

        let plane = shape_inertia(&ColliderShape::Plane { normal: Vec3::Y }, 1.0);
        assert_eq!(plane, Mat3::ZERO);

        let capsule = shape_inertia(
            &ColliderShape::Capsule {
                radius: 0.5,
                half_height: 1.0,
            },
            1.0,
        );
        assert!(capsule.x_axis.x > capsule.y_axis.y);
    }

    #[test]
    fn test_mass_properties_split_across_colliders() {
        let mut world = hecs::World::new();
        let body = spawn(&mut world, RigidBody::new_dynamic(2.0), Vec3::ZERO);
        let first = world.spawn((Collider::new(ColliderShape::Sphere { radius: 1.0 }, body),));
        let second = world.spawn((Collider::new(ColliderShape::Sphere { radius: 1.0 }, body),));
        world
            .get::<&mut RigidBody>(body)
            .unwrap()
            .colliders
            .extend([first, second]);

        update_mass_properties(&mut world, body).unwrap();
        let rb = world.get::<&RigidBody>(body).unwrap();
        // Two unit spheres of mass 1 each: 2 * 0.4
        assert!((rb.inertia_tensor.x_axis.x - 0.8).abs() < 1e-6);
        assert!((rb.inverse_inertia_tensor.x_axis.x - 1.25).abs() < 1e-5);
    }

    #[test]
    fn test_mass_properties_fallback_and_offset() {
        let mut world = hecs::World::new();
        let body = spawn(&mut world, RigidBody::new_dynamic(3.0), Vec3::ZERO);
        let plane = world.spawn((Collider::new(ColliderShape::Plane { normal: Vec3::Y }, body),));
        world.get::<&mut RigidBody>(body).unwrap().colliders.push(plane);
        update_mass_properties(&mut world, body).unwrap();
        assert_eq!(
            world.get::<&RigidBody>(body).unwrap().inertia_tensor,
            Mat3::from_diagonal(Vec3::splat(3.0))
        );

        let offset = world.spawn((Collider::with_local(
            ColliderShape::Sphere { radius: 1.0 },
            Transform::from_position(Vec3::new(2.0, 0.0, 0.0)),
            body,
        ),));
        {
            let mut rb = world.get::<&mut RigidBody>(body).unwrap();
            rb.colliders.clear();
            rb.colliders.push(offset);
        }
        update_mass_properties(&mut world, body).unwrap();
        let rb = world.get::<&RigidBody>(body).unwrap();
        // 0.4 * 3 about every axis, plus 3 * 2^2 about y and z
        assert!((rb.inertia_tensor.x_axis.x - 1.2).abs() < 1e-5);
        assert!((rb.inertia_tensor.y_axis.y - 13.2).abs() < 1e-5);
    }

    #[test]
    fn test_mass_properties_missing_body() {
        let mut world = hecs::World::new();
        let entity = world.spawn((Transform::identity(),));
        let err = update_mass_properties(&mut world, entity).unwrap_err();
        assert!(matches!(err, PhysicsError::MissingComponent { .. }));
    }
}
