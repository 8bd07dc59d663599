//! Narrowphase collision detection: analytic tests, SAT and GJK/EPA.
//!
//! Every test returns a [`ContactManifold`] whose normal points from the
//! first collider to the second. Swapped argument orders reuse the same
//! handler and flip the result.

use glam::Vec3;

use crate::ecs::components::physics::Collider;

use super::collider::WorldShape;
use super::contact::ContactManifold;
use super::epa::{epa_penetration_with_limit, EPA_MAX_ITERATIONS};
use super::error::{PhysicsError, PhysicsResult};
use super::gjk::{gjk_intersection_with_limit, GJK_MAX_ITERATIONS};
use super::sat::{is_axis_aligned, sat_box_box};
use super::shape::{BoxShape, Shape, SphereShape, SupportMap};

/// Pairwise collision dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Narrowphase {
    pub gjk_max_iterations: usize,
    pub epa_max_iterations: usize,
}

impl Default for Narrowphase {
    fn default() -> Self {
        Self {
            gjk_max_iterations: GJK_MAX_ITERATIONS,
            epa_max_iterations: EPA_MAX_ITERATIONS,
        }
    }
}

impl Narrowphase {
    pub fn new(gjk_max_iterations: usize, epa_max_iterations: usize) -> Self {
        Self {
            gjk_max_iterations,
            epa_max_iterations,
        }
    }

    /// Test two colliders at their cached world transforms.
    pub fn test_collision(
        &self,
        a: &Collider,
        b: &Collider,
    ) -> PhysicsResult<Option<ContactManifold>> {
        let shape_a = a.world_shape()?;
        let shape_b = b.world_shape()?;
        self.collide_shapes(&shape_a, &shape_b)
    }

    /// Dispatch on the shape pair. Only plane-plane is unsupported.
    pub fn collide_shapes(
        &self,
        a: &WorldShape,
        b: &WorldShape,
    ) -> PhysicsResult<Option<ContactManifold>> {
        let manifold = match (a, b) {
            (WorldShape::Plane { .. }, WorldShape::Plane { .. }) => {
                return Err(PhysicsError::UnsupportedColliderPair {
                    a: "plane",
                    b: "plane",
                });
            }
            (WorldShape::Convex(shape), WorldShape::Plane { point, normal }) => {
                convex_plane(shape, *point, *normal)
            }
            (WorldShape::Plane { point, normal }, WorldShape::Convex(shape)) => {
                convex_plane(shape, *point, *normal).map(ContactManifold::flipped)
            }
            (WorldShape::Convex(shape_a), WorldShape::Convex(shape_b)) => {
                self.convex_convex(shape_a, shape_b)
            }
        };
        Ok(manifold)
    }

    fn convex_convex(&self, a: &Shape, b: &Shape) -> Option<ContactManifold> {
        match (a, b) {
            (Shape::Sphere(sa), Shape::Sphere(sb)) => sphere_sphere(sa, sb),
            (Shape::Box(bx), Shape::Sphere(s)) => box_sphere(bx, s),
            (Shape::Sphere(s), Shape::Box(bx)) => box_sphere(bx, s).map(ContactManifold::flipped),
            (Shape::Box(ba), Shape::Box(bb)) if is_axis_aligned(ba, bb) => sat_box_box(ba, bb),
            _ => self.gjk_epa(a, b),
        }
    }

    /// General convex pair through GJK and EPA.
    pub fn gjk_epa<A, B>(&self, a: &A, b: &B) -> Option<ContactManifold>
    where
        A: SupportMap + ?Sized,
        B: SupportMap + ?Sized,
    {
        let simplex = gjk_intersection_with_limit(a, b, self.gjk_max_iterations)?;
        let points = epa_penetration_with_limit(&simplex, a, b, self.epa_max_iterations);
        points.has_collision.then(|| ContactManifold::from(points))
    }
}

/// Test two colliders with the default iteration caps.
pub fn test_collision(a: &Collider, b: &Collider) -> PhysicsResult<Option<ContactManifold>> {
    Narrowphase::default().test_collision(a, b)
}

/// Specialized sphere-sphere intersection test.
pub fn sphere_sphere(a: &SphereShape, b: &SphereShape) -> Option<ContactManifold> {
    let diff = b.center - a.center;
    let dist_sq = diff.length_squared();
    let min_dist = a.radius + b.radius;

    if dist_sq >= min_dist * min_dist {
        return None;
    }

    let dist = dist_sq.sqrt();
    let normal = if dist > 1e-6 { diff / dist } else { Vec3::Y };

    let mut manifold = ContactManifold::new(normal);
    manifold.add_point(
        a.center + normal * a.radius,
        b.center - normal * b.radius,
        min_dist - dist,
    );
    Some(manifold)
}

/// Box against sphere, normal from the box to the sphere.
pub fn box_sphere(shape: &BoxShape, sphere: &SphereShape) -> Option<ContactManifold> {
    let box_center = shape.center();
    let box_axes = shape.axes();
    let scaled_half = shape.extents();

    // Project sphere center into box's local space
    let diff = sphere.center - box_center;
    let local = Vec3::new(
        diff.dot(box_axes[0]),
        diff.dot(box_axes[1]),
        diff.dot(box_axes[2]),
    );

    // Clamp to box extents to find closest point on box
    let clamped = local.clamp(-scaled_half, scaled_half);
    let closest_world =
        box_center + box_axes[0] * clamped.x + box_axes[1] * clamped.y + box_axes[2] * clamped.z;

    let to_sphere = sphere.center - closest_world;
    let dist_sq = to_sphere.length_squared();
    if dist_sq >= sphere.radius * sphere.radius {
        return None;
    }

    let dist = dist_sq.sqrt();

    // Sphere center inside the box: push out through the nearest face
    if dist < 1e-6 {
        let mut min_pen = f32::MAX;
        let mut normal = Vec3::Y;
        for i in 0..3 {
            let pen_pos = scaled_half[i] - local[i];
            let pen_neg = scaled_half[i] + local[i];
            if pen_pos < min_pen {
                min_pen = pen_pos;
                normal = box_axes[i];
            }
            if pen_neg < min_pen {
                min_pen = pen_neg;
                normal = -box_axes[i];
            }
        }
        let mut manifold = ContactManifold::new(normal);
        manifold.add_point(
            sphere.center + normal * min_pen,
            sphere.center - normal * sphere.radius,
            min_pen + sphere.radius,
        );
        return Some(manifold);
    }

    let normal = to_sphere / dist;
    let mut manifold = ContactManifold::new(normal);
    manifold.add_point(
        closest_world,
        sphere.center - normal * sphere.radius,
        sphere.radius - dist,
    );
    Some(manifold)
}

/// Convex shape against the half-space below a plane. The manifold normal
/// points from the shape into the plane, i.e. against the plane normal.
pub fn convex_plane(shape: &Shape, point: Vec3, normal: Vec3) -> Option<ContactManifold> {
    let mut manifold = ContactManifold::new(-normal);
    match shape {
        Shape::Box(bx) => {
            let mut below: Vec<(Vec3, f32)> = bx
                .corners()
                .into_iter()
                .map(|corner| (corner, normal.dot(corner - point)))
                .filter(|(_, distance)| *distance < 0.0)
                .collect();
            below.sort_by(|x, y| x.1.total_cmp(&y.1));
            for (corner, distance) in below {
                manifold.add_point(corner, corner - normal * distance, -distance);
            }
        }
        Shape::Sphere(sphere) => {
            let distance = normal.dot(sphere.center - point);
            if distance < sphere.radius {
                manifold.add_point(
                    sphere.center - normal * sphere.radius,
                    sphere.center - normal * distance,
                    sphere.radius - distance,
                );
            }
        }
        _ => {
            let deepest = shape.support(-normal);
            let distance = normal.dot(deepest - point);
            if distance < 0.0 {
                manifold.add_point(deepest, deepest - normal * distance, -distance);
            }
        }
    }
    manifold.has_collision().then_some(manifold)
}
