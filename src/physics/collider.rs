//! Collider world-space caching: transform matrices, bounds and shapes.

use glam::{Mat3, Mat4, Vec3};

use crate::ecs::components::physics::{Collider, ColliderShape};

use super::contact::ContactManifold;
use super::error::{PhysicsError, PhysicsResult};
use super::narrowphase::Narrowphase;
use super::shape::{
    max_scale, BoxShape, CapsuleShape, ConvexHullShape, CylinderShape, Shape, SphereShape,
};

/// Axis-aligned bounding box for broadphase collision detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicsAabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl PhysicsAabb {
    /// Bounds covering all of space.
    pub const EVERYTHING: PhysicsAabb = PhysicsAabb {
        min: Vec3::splat(f32::MIN),
        max: Vec3::splat(f32::MAX),
    };

    /// Test whether two AABBs overlap.
    #[inline]
    pub fn overlaps(&self, other: &PhysicsAabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        for p in points {
            min = min.min(p);
            max = max.max(p);
        }
        PhysicsAabb { min, max }
    }

    /// Bounds of the solid half-space `dot(x - point, normal) <= 0`.
    ///
    /// Only a plane whose normal is a world axis gives a finite side;
    /// any other plane is unbounded in every direction.
    pub fn half_space(point: Vec3, normal: Vec3) -> Self {
        let mut aabb = Self::EVERYTHING;
        for axis in 0..3 {
            let component = normal[axis];
            if component.abs() < 1.0 - 1e-6 {
                continue;
            }
            if component > 0.0 {
                aabb.max[axis] = point[axis];
            } else {
                aabb.min[axis] = point[axis];
            }
        }
        aabb
    }
}

/// World-space view of a collider for the narrowphase.
#[derive(Debug, Clone)]
pub enum WorldShape {
    /// Half-space below the plane through `point` with unit `normal`.
    Plane { point: Vec3, normal: Vec3 },
    Convex(Shape),
}

impl ColliderShape {
    /// Reject malformed shape parameters.
    pub fn validate(&self) -> PhysicsResult<()> {
        let invalid = |message: String| Err(PhysicsError::InvalidConfiguration(message));
        match self {
            ColliderShape::Sphere { radius } if *radius <= 0.0 => {
                invalid(format!("sphere radius must be positive, got {radius}"))
            }
            ColliderShape::Box { half_extents } if half_extents.min_element() <= 0.0 => {
                invalid(format!("box half extents must be positive, got {half_extents}"))
            }
            ColliderShape::Capsule {
                radius,
                half_height,
            }
            | ColliderShape::Cylinder {
                radius,
                half_height,
            } if *radius <= 0.0 || *half_height < 0.0 => invalid(format!(
                "{} needs a positive radius and non-negative half height, got {radius} and {half_height}",
                self.kind_name()
            )),
            ColliderShape::Plane { normal } if normal.length_squared() < 1e-12 => {
                invalid("plane normal must be non-zero".to_string())
            }
            ColliderShape::ConvexHull { points } if points.len() < 3 => invalid(format!(
                "convex hull needs at least 3 vertices, got {}",
                points.len()
            )),
            _ => Ok(()),
        }
    }

    /// Compute the world-space AABB for this shape.
    pub fn compute_aabb(&self, mat: Mat4) -> PhysicsAabb {
        match self {
            ColliderShape::Sphere { radius } => {
                let center = mat.transform_point3(Vec3::ZERO);
                let world_radius = *radius * max_scale(&mat);
                PhysicsAabb {
                    min: center - Vec3::splat(world_radius),
                    max: center + Vec3::splat(world_radius),
                }
            }
            ColliderShape::Box { half_extents } => aabb_from_extents(*half_extents, mat),
            ColliderShape::Capsule {
                radius,
                half_height,
            } => {
                let extents = Vec3::new(*radius, *half_height + *radius, *radius);
                aabb_from_extents(extents, mat)
            }
            ColliderShape::Cylinder {
                radius,
                half_height,
            } => {
                let extents = Vec3::new(*radius, *half_height, *radius);
                aabb_from_extents(extents, mat)
            }
            ColliderShape::ConvexHull { points } => {
                if points.is_empty() {
                    let center = mat.transform_point3(Vec3::ZERO);
                    return PhysicsAabb {
                        min: center,
                        max: center,
                    };
                }
                PhysicsAabb::from_points(points.iter().map(|p| mat.transform_point3(*p)))
            }
            ColliderShape::Plane { normal } => {
                let (point, normal) = plane_in_world(*normal, mat);
                PhysicsAabb::half_space(point, normal)
            }
        }
    }

    /// Build the world-space shape under `mat`.
    pub fn to_world(&self, mat: Mat4) -> PhysicsResult<WorldShape> {
        let center = mat.transform_point3(Vec3::ZERO);
        let up = mat.transform_vector3(Vec3::Y);
        let axis_scale = up.length();
        let axis = if axis_scale > 1e-6 { up / axis_scale } else { Vec3::Y };
        let radial_scale = mat
            .transform_vector3(Vec3::X)
            .length()
            .max(mat.transform_vector3(Vec3::Z).length());

        let shape = match self {
            ColliderShape::Plane { normal } => {
                let (point, normal) = plane_in_world(*normal, mat);
                return Ok(WorldShape::Plane { point, normal });
            }
            ColliderShape::Sphere { radius } => Shape::Sphere(SphereShape {
                center,
                radius: *radius * max_scale(&mat),
            }),
            ColliderShape::Box { half_extents } => Shape::Box(BoxShape::new(mat, *half_extents)),
            ColliderShape::Capsule {
                radius,
                half_height,
            } => Shape::Capsule(CapsuleShape {
                center,
                axis,
                half_height: *half_height * axis_scale,
                radius: *radius * radial_scale,
            }),
            ColliderShape::Cylinder {
                radius,
                half_height,
            } => Shape::Cylinder(CylinderShape {
                center,
                axis,
                half_height: *half_height * axis_scale,
                radius: *radius * radial_scale,
            }),
            ColliderShape::ConvexHull { points } => Shape::ConvexHull(ConvexHullShape::new(
                points.iter().map(|p| mat.transform_point3(*p)).collect(),
            )?),
        };
        Ok(WorldShape::Convex(shape))
    }
}

/// World-space point and unit normal of a plane given in local space.
fn plane_in_world(local_normal: Vec3, mat: Mat4) -> (Vec3, Vec3) {
    let normal_matrix = Mat3::from_mat4(mat).inverse().transpose();
    let normal = (normal_matrix * local_normal).normalize_or_zero();
    (mat.transform_point3(Vec3::ZERO), normal)
}

/// Compute world-space AABB from local half-extents and a transform matrix.
#[inline]
fn aabb_from_extents(half_extents: Vec3, mat: Mat4) -> PhysicsAabb {
    let center = mat.transform_point3(Vec3::ZERO);

    // For each world axis, compute the extent by projecting the local box axes
    let abs_col0 = mat.x_axis.truncate().abs();
    let abs_col1 = mat.y_axis.truncate().abs();
    let abs_col2 = mat.z_axis.truncate().abs();

    let extent = abs_col0 * half_extents.x + abs_col1 * half_extents.y + abs_col2 * half_extents.z;

    PhysicsAabb {
        min: center - extent,
        max: center + extent,
    }
}

impl Collider {
    /// Recompute the cached world matrix and bounds from the owning body's
    /// matrix. `None` places the collider relative to the world origin.
    pub fn update_transform_matrix(&mut self, parent: Option<Mat4>) {
        let parent = parent.unwrap_or(Mat4::IDENTITY);
        self.world_matrix = parent * self.local.to_matrix();
        self.aabb = self.shape.compute_aabb(self.world_matrix);
    }

    /// World-space origin of the collider.
    #[inline]
    pub fn world_center(&self) -> Vec3 {
        self.world_matrix.w_axis.truncate()
    }

    /// World-space shape under the cached matrix.
    pub fn world_shape(&self) -> PhysicsResult<WorldShape> {
        self.shape.to_world(self.world_matrix)
    }

    /// Test against `other` at both cached world transforms, with the
    /// default iteration caps. The manifold normal points from `self`
    /// towards `other`.
    pub fn test_collision(&self, other: &Collider) -> PhysicsResult<Option<ContactManifold>> {
        Narrowphase::default().test_collision(self, other)
    }
}
