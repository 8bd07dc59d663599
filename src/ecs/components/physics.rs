//! Physics components for ECS entities.
//!
//! A body is an entity carrying [`Transform`](super::transform::Transform),
//! [`GlobalTransform`](super::transform::GlobalTransform) and [`RigidBody`].
//! Each of its colliders is a separate entity carrying a [`Collider`] whose
//! `body` field points back at the owner. Neither side owns the other; both
//! links are plain entity handles.

use glam::{Mat3, Mat4, Vec3};

use super::transform::Transform;
use crate::physics::collider::PhysicsAabb;

/// Rigid body type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RigidBodyType {
    /// Affected by forces and collisions.
    Dynamic,
    /// Immovable.
    Static,
    /// Position controlled by user, but affects dynamic bodies.
    Kinematic,
}

/// Rigid body component.
#[derive(Debug, Clone)]
pub struct RigidBody {
    pub body_type: RigidBodyType,
    pub mass: f32,
    /// Body-space inertia tensor, summed from the attached colliders.
    pub inertia_tensor: Mat3,
    /// Inverse of `inertia_tensor`; zero for non-dynamic bodies.
    pub inverse_inertia_tensor: Mat3,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub force_accumulator: Vec3,
    pub torque_accumulator: Vec3,
    /// Linear damping factor. Only applied when `PhysicsConfig::apply_damping` is set.
    pub linear_damping: f32,
    /// Angular damping factor. Only applied when `PhysicsConfig::apply_damping` is set.
    pub angular_damping: f32,
    /// Coefficient of restitution (0.0 - 1.0).
    pub restitution: f32,
    pub static_friction: f32,
    pub dynamic_friction: f32,
    /// Gravity scale (default: 1.0).
    pub gravity_scale: f32,
    /// Collider entities attached to this body.
    pub colliders: Vec<hecs::Entity>,
}

impl RigidBody {
    /// Create a new dynamic rigid body with the given mass.
    pub fn new_dynamic(mass: f32) -> Self {
        // Unit sphere approximation until colliders are attached
        let inertia = Mat3::from_diagonal(Vec3::splat(mass));
        let inverse = if mass > 0.0 {
            inertia.inverse()
        } else {
            Mat3::ZERO
        };
        Self {
            body_type: RigidBodyType::Dynamic,
            mass,
            inertia_tensor: inertia,
            inverse_inertia_tensor: inverse,
            linear_damping: 0.01,
            angular_damping: 0.01,
            gravity_scale: 1.0,
            ..Self::immovable(RigidBodyType::Dynamic)
        }
    }

    /// Create a new static rigid body.
    pub fn new_static() -> Self {
        Self::immovable(RigidBodyType::Static)
    }

    /// Create a new kinematic rigid body.
    pub fn new_kinematic() -> Self {
        Self::immovable(RigidBodyType::Kinematic)
    }

    fn immovable(body_type: RigidBodyType) -> Self {
        Self {
            body_type,
            mass: 0.0,
            inertia_tensor: Mat3::ZERO,
            inverse_inertia_tensor: Mat3::ZERO,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            force_accumulator: Vec3::ZERO,
            torque_accumulator: Vec3::ZERO,
            linear_damping: 0.0,
            angular_damping: 0.0,
            restitution: 0.5,
            static_friction: 0.5,
            dynamic_friction: 0.3,
            gravity_scale: 0.0,
            colliders: Vec::new(),
        }
    }

    /// Builder-style restitution setter.
    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }

    /// Builder-style friction setter.
    pub fn with_friction(mut self, static_friction: f32, dynamic_friction: f32) -> Self {
        self.static_friction = static_friction;
        self.dynamic_friction = dynamic_friction;
        self
    }

    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.body_type == RigidBodyType::Dynamic
    }

    /// Inverse mass; exactly zero unless the body is dynamic.
    #[inline]
    pub fn inverse_mass(&self) -> f32 {
        if self.is_dynamic() && self.mass > 0.0 {
            1.0 / self.mass
        } else {
            0.0
        }
    }

    /// World-space inverse inertia tensor `R * I^-1 * R^T`.
    #[inline]
    pub fn world_inverse_inertia(&self, rotation: Mat3) -> Mat3 {
        if !self.is_dynamic() {
            return Mat3::ZERO;
        }
        rotation * self.inverse_inertia_tensor * rotation.transpose()
    }

    pub fn apply_force(&mut self, force: Vec3) {
        self.force_accumulator += force;
    }

    pub fn apply_torque(&mut self, torque: Vec3) {
        self.torque_accumulator += torque;
    }

    /// Apply a force at a world-space point, given the body's center of mass.
    pub fn apply_force_at_point(&mut self, force: Vec3, point: Vec3, center: Vec3) {
        self.force_accumulator += force;
        self.torque_accumulator += (point - center).cross(force);
    }

    /// Apply a linear impulse through the center of mass.
    pub fn apply_impulse(&mut self, impulse: Vec3) {
        self.linear_velocity += impulse * self.inverse_mass();
    }

    /// Apply an angular impulse using a world-space inverse inertia tensor.
    pub fn apply_angular_impulse(&mut self, angular_impulse: Vec3, world_inverse_inertia: Mat3) {
        if self.is_dynamic() {
            self.angular_velocity += world_inverse_inertia * angular_impulse;
        }
    }
}

/// Collider shape, described in the collider's local space.
#[derive(Debug, Clone, PartialEq)]
pub enum ColliderShape {
    Sphere { radius: f32 },
    Box { half_extents: Vec3 },
    /// Half-space whose boundary passes through the collider origin.
    Plane { normal: Vec3 },
    /// Capsule along the local Y axis.
    Capsule { radius: f32, half_height: f32 },
    /// Cylinder along the local Y axis.
    Cylinder { radius: f32, half_height: f32 },
    ConvexHull { points: Vec<Vec3> },
}

impl ColliderShape {
    /// Short name used in logs and errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ColliderShape::Sphere { .. } => "sphere",
            ColliderShape::Box { .. } => "box",
            ColliderShape::Plane { .. } => "plane",
            ColliderShape::Capsule { .. } => "capsule",
            ColliderShape::Cylinder { .. } => "cylinder",
            ColliderShape::ConvexHull { .. } => "convex hull",
        }
    }
}

/// Collision detection component, attached to its own entity.
#[derive(Debug, Clone)]
pub struct Collider {
    pub shape: ColliderShape,
    /// Offset from the owning body's transform.
    pub local: Transform,
    /// Owning body entity.
    pub body: hecs::Entity,
    /// Cached world matrix, refreshed by `update_transform_matrix`.
    pub world_matrix: Mat4,
    /// Cached world-space bounds, refreshed by `update_transform_matrix`.
    pub aabb: PhysicsAabb,
}

impl Collider {
    /// Create a collider for `body` with no local offset.
    ///
    /// The cached world data is valid only after the first
    /// `update_transform_matrix` call.
    pub fn new(shape: ColliderShape, body: hecs::Entity) -> Self {
        Self::with_local(shape, Transform::identity(), body)
    }

    pub fn with_local(shape: ColliderShape, local: Transform, body: hecs::Entity) -> Self {
        let mut collider = Self {
            shape,
            local,
            body,
            world_matrix: Mat4::IDENTITY,
            aabb: PhysicsAabb {
                min: Vec3::ZERO,
                max: Vec3::ZERO,
            },
        };
        collider.update_transform_matrix(None);
        collider
    }
}
