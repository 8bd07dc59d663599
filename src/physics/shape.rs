//! World-space convex shapes and their support functions.
//!
//! A [`Shape`] is rebuilt from a collider's cached world matrix every time the
//! narrowphase needs it, so it is immutable for the duration of a test.

use glam::{Mat3, Mat4, Vec3};

use super::error::{PhysicsError, PhysicsResult};

/// A convex set queried through its support function.
pub trait SupportMap {
    /// Point of the shape maximizing `dot(point, direction)`, in world space.
    fn support(&self, direction: Vec3) -> Vec3;

    /// Approximate center, used to seed GJK and orient normals.
    fn center(&self) -> Vec3;

    /// Radius bounding every point of the shape around `center()`.
    fn radius(&self) -> f32;
}

/// A Minkowski-difference vertex together with the direction that produced it.
///
/// EPA re-queries the original shapes along `direction` to rebuild the
/// contact points on A and B.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupportPoint {
    pub point: Vec3,
    pub direction: Vec3,
}

/// `a.support(d) - b.support(-d)`.
#[inline]
pub fn minkowski_support<A, B>(a: &A, b: &B, direction: Vec3) -> Vec3
where
    A: SupportMap + ?Sized,
    B: SupportMap + ?Sized,
{
    a.support(direction) - b.support(-direction)
}

#[inline]
pub fn minkowski_support_point<A, B>(a: &A, b: &B, direction: Vec3) -> SupportPoint
where
    A: SupportMap + ?Sized,
    B: SupportMap + ?Sized,
{
    SupportPoint {
        point: minkowski_support(a, b, direction),
        direction,
    }
}

/// `+1`, `-1` or `0`. Unlike `f32::signum`, zero maps to zero.
#[inline]
fn sign(value: f32) -> f32 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Largest column length of the linear part, i.e. the largest axis scale.
#[inline]
pub(crate) fn max_scale(mat: &Mat4) -> f32 {
    mat.x_axis
        .truncate()
        .length_squared()
        .max(mat.y_axis.truncate().length_squared())
        .max(mat.z_axis.truncate().length_squared())
        .sqrt()
}

/// Oriented box given by a world matrix and local half extents.
#[derive(Debug, Clone, Copy)]
pub struct BoxShape {
    matrix: Mat4,
    inverse_linear: Mat3,
    half_extents: Vec3,
}

impl BoxShape {
    pub fn new(matrix: Mat4, half_extents: Vec3) -> Self {
        Self {
            matrix,
            // Rotation + scale only: translation would corrupt directions far from the origin
            inverse_linear: Mat3::from_mat4(matrix).inverse(),
            half_extents,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        self.matrix
    }

    /// Normalized world-space face axes.
    pub fn axes(&self) -> [Vec3; 3] {
        [
            self.matrix.x_axis.truncate().normalize_or_zero(),
            self.matrix.y_axis.truncate().normalize_or_zero(),
            self.matrix.z_axis.truncate().normalize_or_zero(),
        ]
    }

    /// World-space half extents along `axes()`.
    pub fn extents(&self) -> Vec3 {
        self.half_extents
            * Vec3::new(
                self.matrix.x_axis.truncate().length(),
                self.matrix.y_axis.truncate().length(),
                self.matrix.z_axis.truncate().length(),
            )
    }

    /// The eight world-space corners.
    pub fn corners(&self) -> [Vec3; 8] {
        let h = self.half_extents;
        let mut corners = [Vec3::ZERO; 8];
        for (i, corner) in corners.iter_mut().enumerate() {
            let local = Vec3::new(
                if i & 1 == 0 { -h.x } else { h.x },
                if i & 2 == 0 { -h.y } else { h.y },
                if i & 4 == 0 { -h.z } else { h.z },
            );
            *corner = self.matrix.transform_point3(local);
        }
        corners
    }
}

impl SupportMap for BoxShape {
    fn support(&self, direction: Vec3) -> Vec3 {
        let local_dir = self.inverse_linear * direction;
        // `>=` keeps zero components on a vertex rather than a face center
        let local_point = Vec3::new(
            if local_dir.x >= 0.0 {
                self.half_extents.x
            } else {
                -self.half_extents.x
            },
            if local_dir.y >= 0.0 {
                self.half_extents.y
            } else {
                -self.half_extents.y
            },
            if local_dir.z >= 0.0 {
                self.half_extents.z
            } else {
                -self.half_extents.z
            },
        );
        self.matrix.transform_point3(local_point)
    }

    fn center(&self) -> Vec3 {
        self.matrix.w_axis.truncate()
    }

    fn radius(&self) -> f32 {
        self.extents().length()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SphereShape {
    pub center: Vec3,
    pub radius: f32,
}

impl SupportMap for SphereShape {
    fn support(&self, direction: Vec3) -> Vec3 {
        self.center + direction.normalize_or_zero() * self.radius
    }

    fn center(&self) -> Vec3 {
        self.center
    }

    fn radius(&self) -> f32 {
        self.radius
    }
}

/// Segment of length `2 * half_height` along `axis`, swept by a sphere.
#[derive(Debug, Clone, Copy)]
pub struct CapsuleShape {
    pub center: Vec3,
    /// Unit axis.
    pub axis: Vec3,
    pub half_height: f32,
    pub radius: f32,
}

impl SupportMap for CapsuleShape {
    fn support(&self, direction: Vec3) -> Vec3 {
        let cap = self.center + self.axis * (sign(direction.dot(self.axis)) * self.half_height);
        cap + direction.normalize_or_zero() * self.radius
    }

    fn center(&self) -> Vec3 {
        self.center
    }

    fn radius(&self) -> f32 {
        self.radius + self.half_height
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CylinderShape {
    pub center: Vec3,
    /// Unit axis.
    pub axis: Vec3,
    pub half_height: f32,
    pub radius: f32,
}

impl SupportMap for CylinderShape {
    fn support(&self, direction: Vec3) -> Vec3 {
        let along = direction.dot(self.axis);
        let radial = direction - self.axis * along;
        let mut point = self.center + self.axis * (sign(along) * self.half_height);
        let radial_len = radial.length();
        if radial_len > 1e-6 {
            point += radial * (self.radius / radial_len);
        }
        point
    }

    fn center(&self) -> Vec3 {
        self.center
    }

    fn radius(&self) -> f32 {
        self.radius.hypot(self.half_height)
    }
}

/// Convex hull over a world-space vertex cloud.
#[derive(Debug, Clone)]
pub struct ConvexHullShape {
    vertices: Vec<Vec3>,
    center: Vec3,
    radius: f32,
}

impl ConvexHullShape {
    /// Fails with `InvalidConfiguration` for fewer than three vertices.
    pub fn new(vertices: Vec<Vec3>) -> PhysicsResult<Self> {
        if vertices.len() < 3 {
            return Err(PhysicsError::InvalidConfiguration(format!(
                "convex hull needs at least 3 vertices, got {}",
                vertices.len()
            )));
        }
        let center = vertices.iter().copied().sum::<Vec3>() / vertices.len() as f32;
        let radius = vertices
            .iter()
            .map(|v| v.distance(center))
            .fold(0.0_f32, f32::max);
        Ok(Self {
            vertices,
            center,
            radius,
        })
    }

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }
}

impl SupportMap for ConvexHullShape {
    fn support(&self, direction: Vec3) -> Vec3 {
        let mut best = self.vertices[0];
        let mut best_dot = best.dot(direction);
        for v in &self.vertices[1..] {
            let d = v.dot(direction);
            if d > best_dot {
                best_dot = d;
                best = *v;
            }
        }
        best
    }

    fn center(&self) -> Vec3 {
        self.center
    }

    fn radius(&self) -> f32 {
        self.radius
    }
}

/// Every bounded convex shape the narrowphase can hand to GJK/EPA.
#[derive(Debug, Clone)]
pub enum Shape {
    Box(BoxShape),
    Sphere(SphereShape),
    Capsule(CapsuleShape),
    Cylinder(CylinderShape),
    ConvexHull(ConvexHullShape),
}

impl SupportMap for Shape {
    #[inline]
    fn support(&self, direction: Vec3) -> Vec3 {
        match self {
            Shape::Box(s) => s.support(direction),
            Shape::Sphere(s) => s.support(direction),
            Shape::Capsule(s) => s.support(direction),
            Shape::Cylinder(s) => s.support(direction),
            Shape::ConvexHull(s) => s.support(direction),
        }
    }

    fn center(&self) -> Vec3 {
        match self {
            Shape::Box(s) => s.center(),
            Shape::Sphere(s) => s.center(),
            Shape::Capsule(s) => s.center(),
            Shape::Cylinder(s) => s.center(),
            Shape::ConvexHull(s) => s.center(),
        }
    }

    fn radius(&self) -> f32 {
        match self {
            Shape::Box(s) => s.radius(),
            Shape::Sphere(s) => s.radius(),
            Shape::Capsule(s) => s.radius(),
            Shape::Cylinder(s) => s.radius(),
            Shape::ConvexHull(s) => s.radius(),
        }
    }
}
