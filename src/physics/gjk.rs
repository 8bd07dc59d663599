//! GJK intersection test on the Minkowski difference of two convex shapes.

use glam::Vec3;
use tracing::warn;

use super::shape::{minkowski_support_point, SupportMap, SupportPoint};

/// Default iteration cap. Hitting it counts as "no intersection".
pub const GJK_MAX_ITERATIONS: usize = 64;

/// Two support points closer than this are the same vertex.
const DUPLICATE_EPSILON: f32 = 1e-6;
const DEGENERATE_EPSILON: f32 = 1e-12;
/// Relative slack for the origin lying on a tetrahedron face or edge.
const BOUNDARY_EPSILON: f32 = 1e-5;

/// A simplex used by the GJK algorithm (up to 4 vertices in 3D).
///
/// The most recently added vertex is always last.
#[derive(Debug, Clone, Default)]
pub struct Simplex {
    pub points: Vec<SupportPoint>,
}

impl Simplex {
    fn new() -> Self {
        Self {
            points: Vec::with_capacity(4),
        }
    }

    fn push(&mut self, point: SupportPoint) {
        self.points.push(point);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// GJK intersection test. Returns the enclosing tetrahedron if the shapes
/// intersect, `None` otherwise.
pub fn gjk_intersection<A, B>(shape_a: &A, shape_b: &B) -> Option<Simplex>
where
    A: SupportMap + ?Sized,
    B: SupportMap + ?Sized,
{
    gjk_intersection_with_limit(shape_a, shape_b, GJK_MAX_ITERATIONS)
}

pub fn gjk_intersection_with_limit<A, B>(
    shape_a: &A,
    shape_b: &B,
    max_iterations: usize,
) -> Option<Simplex>
where
    A: SupportMap + ?Sized,
    B: SupportMap + ?Sized,
{
    let mut direction = shape_b.center() - shape_a.center();
    if direction.length() < 1e-6 {
        direction = Vec3::X;
    } else {
        direction = direction.normalize();
    }

    let mut simplex = Simplex::new();
    let first = minkowski_support_point(shape_a, shape_b, direction);
    simplex.push(first);
    direction = -first.point;

    for _ in 0..max_iterations {
        if direction.length_squared() < DEGENERATE_EPSILON {
            // Origin sits on the current simplex: the shapes only touch
            return None;
        }

        let new_point = minkowski_support_point(shape_a, shape_b, direction);
        if simplex
            .points
            .iter()
            .any(|p| p.point.distance(new_point.point) < DUPLICATE_EPSILON)
        {
            return None;
        }
        // No progress past the origin along the search direction
        if new_point.point.dot(direction) <= 0.0 {
            return None;
        }
        simplex.push(new_point);

        if simplex.len() == 4 {
            // Enclosed, or no face through the newest vertex sees the origin
            if contains_origin(&simplex) || !reduce_tetrahedron(&mut simplex, &mut direction) {
                return Some(simplex);
            }
        } else {
            do_simplex(&mut simplex, &mut direction);
        }
    }

    warn!(
        max_iterations,
        "GJK: iteration cap reached, treating pair as separated"
    );
    None
}

/// Triple cross product: (a x b) x c
#[inline]
fn triple_cross_product(a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    a.cross(b).cross(c)
}

/// Six times the signed volume of tetrahedron (p, q, r, s).
#[inline]
fn signed_volume(p: Vec3, q: Vec3, r: Vec3, s: Vec3) -> f32 {
    (q - p).dot((r - p).cross(s - p))
}

/// Substitute the origin for each vertex in turn; the origin is enclosed when
/// all four sub-volumes agree in sign. Sub-volumes within a small fraction of
/// the total count as zero, so an origin on a face or edge is enclosed.
fn contains_origin(simplex: &Simplex) -> bool {
    let [a, b, c, d] = [
        simplex.points[0].point,
        simplex.points[1].point,
        simplex.points[2].point,
        simplex.points[3].point,
    ];
    let total = signed_volume(a, b, c, d);
    if total.abs() < DEGENERATE_EPSILON {
        return false;
    }

    let o = Vec3::ZERO;
    let volumes = [
        signed_volume(o, b, c, d),
        signed_volume(a, o, c, d),
        signed_volume(a, b, o, d),
        signed_volume(a, b, c, o),
    ];
    let slack = BOUNDARY_EPSILON * total.abs();
    if total > 0.0 {
        volumes.iter().all(|v| *v >= -slack)
    } else {
        volumes.iter().all(|v| *v <= slack)
    }
}

/// Process a line or triangle simplex and update the search direction.
fn do_simplex(simplex: &mut Simplex, direction: &mut Vec3) {
    match simplex.len() {
        2 => do_simplex_line(simplex, direction),
        3 => do_simplex_triangle(simplex, direction),
        _ => {}
    }
}

fn do_simplex_line(simplex: &mut Simplex, direction: &mut Vec3) {
    let a = simplex.points[1]; // Most recently added
    let b = simplex.points[0];
    let ab = b.point - a.point;
    let ao = -a.point;

    if ab.dot(ao) > 0.0 {
        *direction = triple_cross_product(ab, ao, ab);
        if direction.length_squared() < DEGENERATE_EPSILON {
            // Origin lies on the segment; any perpendicular makes progress
            *direction = ab.normalize_or_zero().any_orthonormal_vector();
        }
    } else {
        simplex.points = vec![a];
        *direction = ao;
    }
}

fn do_simplex_triangle(simplex: &mut Simplex, direction: &mut Vec3) {
    let a = simplex.points[2]; // Most recently added
    let b = simplex.points[1];
    let c = simplex.points[0];
    let ab = b.point - a.point;
    let ac = c.point - a.point;
    let ao = -a.point;
    let abc = ab.cross(ac);

    if abc.length_squared() < DEGENERATE_EPSILON {
        // Collinear: fall back to the newest edge
        simplex.points = vec![b, a];
        do_simplex_line(simplex, direction);
        return;
    }

    if abc.cross(ac).dot(ao) > 0.0 {
        if ac.dot(ao) > 0.0 {
            simplex.points = vec![c, a];
            *direction = triple_cross_product(ac, ao, ac);
            if direction.length_squared() < DEGENERATE_EPSILON {
                *direction = ac.normalize_or_zero().any_orthonormal_vector();
            }
        } else {
            simplex.points = vec![b, a];
            do_simplex_line(simplex, direction);
        }
    } else if ab.cross(abc).dot(ao) > 0.0 {
        simplex.points = vec![b, a];
        do_simplex_line(simplex, direction);
    } else if abc.dot(ao) > 0.0 {
        *direction = abc;
    } else {
        // Origin is below the triangle: flip the winding
        simplex.points = vec![b, c, a];
        *direction = -abc;
    }
}

/// Keep the face containing the newest vertex that the origin lies furthest
/// outside of and continue from it.
///
/// Returns false when no such face sees the origin by more than a small
/// scale-relative margin. The face opposite the newest vertex already faces
/// the origin, so the origin is then inside the tetrahedron or on its
/// boundary.
fn reduce_tetrahedron(simplex: &mut Simplex, direction: &mut Vec3) -> bool {
    let d = simplex.points[0];
    let c = simplex.points[1];
    let b = simplex.points[2];
    let a = simplex.points[3]; // Most recently added

    let scale = simplex
        .points
        .iter()
        .map(|p| p.point.length())
        .fold(1.0_f32, f32::max);
    let margin = BOUNDARY_EPSILON * scale;

    // Each candidate face with the vertex opposite to it
    let faces = [([c, b, a], d), ([d, c, a], b), ([b, d, a], c)];

    let mut best: Option<([SupportPoint; 3], f32)> = None;
    for (face, opposite) in faces {
        let mut normal = (face[1].point - face[0].point).cross(face[2].point - face[0].point);
        let len = normal.length();
        if len < 1e-10 {
            continue;
        }
        normal /= len;
        if normal.dot(opposite.point - face[0].point) > 0.0 {
            normal = -normal;
        }
        let outside = -face[0].point.dot(normal);
        if outside > margin && best.map_or(true, |(_, dist)| outside > dist) {
            best = Some((face, outside));
        }
    }

    match best {
        Some((face, _)) => {
            simplex.points = face.to_vec();
            do_simplex_triangle(simplex, direction);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::epa::epa_penetration;
    use crate::physics::shape::{
        BoxShape, CapsuleShape, ConvexHullShape, CylinderShape, SphereShape,
    };
    use glam::{Mat4, Quat};

    fn sphere(center: Vec3, radius: f32) -> SphereShape {
        SphereShape { center, radius }
    }

    /// Axis directions plus a golden-angle spiral over the unit sphere.
    fn sweep_directions() -> Vec<Vec3> {
        let mut directions = vec![
            Vec3::X,
            Vec3::Y,
            Vec3::Z,
            -Vec3::X,
            -Vec3::Y,
            Vec3::new(1.0, 1.0, 0.0).normalize(),
            Vec3::new(1.0, -2.0, 3.0).normalize(),
        ];
        let count = 24;
        let golden = std::f32::consts::PI * (3.0 - 5.0_f32.sqrt());
        for i in 0..count {
            let y = 1.0 - 2.0 * (i as f32 + 0.5) / count as f32;
            let ring = (1.0 - y * y).sqrt();
            let theta = golden * i as f32;
            directions.push(Vec3::new(ring * theta.cos(), y, ring * theta.sin()));
        }
        directions
    }

    /// Check GJK's verdict and EPA's depth against an analytic penetration
    /// depth (negative when separated). Near-touching cases are skipped.
    fn check_pair<A: SupportMap, B: SupportMap>(a: &A, b: &B, expected: f32, tolerance: f32) {
        if expected.abs() < 0.02 {
            return;
        }
        let result = gjk_intersection(a, b);
        assert_eq!(
            result.is_some(),
            expected > 0.0,
            "expected depth {expected}, centers {:?} {:?}",
            a.center(),
            b.center()
        );
        if let Some(simplex) = result {
            let points = epa_penetration(&simplex, a, b);
            assert!(
                (points.depth - expected).abs() < tolerance,
                "EPA depth {} vs {expected}, centers {:?} {:?}",
                points.depth,
                a.center(),
                b.center()
            );
        }
    }

    #[test]
    fn test_gjk_spheres_intersecting() {
        let a = sphere(Vec3::ZERO, 1.0);
        let b = sphere(Vec3::new(1.0, 0.0, 0.0), 1.0);
        let simplex = gjk_intersection(&a, &b).expect("spheres overlap");
        assert_eq!(simplex.len(), 4);
    }

    #[test]
    fn test_gjk_spheres_not_intersecting() {
        let a = sphere(Vec3::ZERO, 1.0);
        let b = sphere(Vec3::new(5.0, 0.0, 0.0), 1.0);
        assert!(gjk_intersection(&a, &b).is_none());
    }

    #[test]
    fn test_gjk_aligned_boxes_overlapping() {
        let a = BoxShape::new(Mat4::IDENTITY, Vec3::ONE);
        let b = BoxShape::new(Mat4::from_translation(Vec3::new(1.5, 0.0, 0.0)), Vec3::ONE);
        assert!(gjk_intersection(&a, &b).is_some());
    }

    #[test]
    fn test_gjk_rotated_boxes() {
        let a = BoxShape::new(Mat4::IDENTITY, Vec3::splat(0.5));
        let rotated = Mat4::from_rotation_translation(
            Quat::from_rotation_z(0.785) * Quat::from_rotation_x(0.4),
            Vec3::new(0.9, 0.3, 0.0),
        );
        let b = BoxShape::new(rotated, Vec3::splat(0.5));
        assert!(gjk_intersection(&a, &b).is_some());

        let far = Mat4::from_rotation_translation(
            Quat::from_rotation_z(0.785),
            Vec3::new(2.0, 0.3, 0.0),
        );
        let c = BoxShape::new(far, Vec3::splat(0.5));
        assert!(gjk_intersection(&a, &c).is_none());
    }

    #[test]
    fn test_gjk_separated_pairs_report_no_intersection() {
        let capsule = CapsuleShape {
            center: Vec3::new(0.0, 3.0, 0.0),
            axis: Vec3::Y,
            half_height: 1.0,
            radius: 0.5,
        };
        let ball = sphere(Vec3::ZERO, 1.0);
        assert!(gjk_intersection(&ball, &capsule).is_none());

        let hull = ConvexHullShape::new(vec![
            Vec3::new(3.0, 0.0, 0.0),
            Vec3::new(4.0, 0.0, 0.0),
            Vec3::new(3.5, 1.0, 0.0),
            Vec3::new(3.5, 0.5, 1.0),
        ])
        .unwrap();
        assert!(gjk_intersection(&ball, &hull).is_none());
        assert!(gjk_intersection(&hull, &capsule).is_none());
    }

    #[test]
    fn test_gjk_coincident_centers() {
        let a = sphere(Vec3::ZERO, 1.0);
        let b = BoxShape::new(Mat4::IDENTITY, Vec3::splat(0.5));
        assert!(gjk_intersection(&a, &b).is_some());
    }

    #[test]
    fn test_gjk_spheres_on_center_axis() {
        // Every support point lies in the plane through both centers, which
        // leaves the origin on a tetrahedron face
        let a = sphere(Vec3::ZERO, 0.7075);
        let b = sphere(Vec3::new(1.792, 0.0, 0.0), 1.713);
        assert!(gjk_intersection(&a, &b).is_some());

        let c = sphere(Vec3::new(0.0, 0.0, 1.792), 1.713);
        assert!(gjk_intersection(&a, &c).is_some());
    }

    #[test]
    fn test_gjk_sphere_sweep() {
        let radii = [(1.0, 1.0), (0.7075, 1.713), (0.25, 2.0)];
        let factors = [0.1, 0.3, 0.6, 0.9, 1.1, 1.5];
        for direction in sweep_directions() {
            for &(r1, r2) in &radii {
                for &factor in &factors {
                    let distance = (r1 + r2) * factor;
                    let origin = Vec3::new(0.3, -0.2, 0.5);
                    let a = sphere(origin, r1);
                    let b = sphere(origin + direction * distance, r2);
                    check_pair(&a, &b, r1 + r2 - distance, 1e-3);
                }
            }
        }
    }

    #[test]
    fn test_gjk_capsule_sphere_sweep() {
        let capsule = CapsuleShape {
            center: Vec3::ZERO,
            axis: Vec3::Y,
            half_height: 0.6,
            radius: 0.4,
        };
        let radius = 0.5;
        for direction in sweep_directions() {
            for i in 1..12 {
                let center = direction * (0.2 * i as f32);
                let on_segment = Vec3::Y * center.y.clamp(-0.6, 0.6);
                let expected = capsule.radius + radius - center.distance(on_segment);
                check_pair(&capsule, &sphere(center, radius), expected, 1e-3);
            }
        }
    }

    #[test]
    fn test_gjk_cylinder_sphere_sweep() {
        let cylinder = CylinderShape {
            center: Vec3::ZERO,
            axis: Vec3::Y,
            half_height: 0.6,
            radius: 0.5,
        };
        let radius = 0.4;
        for i in 0..12 {
            // Around the equator the nearest exit is radial
            let angle = i as f32 * std::f32::consts::TAU / 12.0 + 0.05;
            let direction = Vec3::new(angle.cos(), 0.0, angle.sin());
            for &distance in &[0.2, 0.45, 0.7, 0.8, 1.0, 1.3] {
                let ball = sphere(direction * distance, radius);
                check_pair(&cylinder, &ball, 0.9 - distance, 5e-3);
            }
        }
        for sign in [1.0, -1.0] {
            // Along the axis the nearest exit is through a cap or the side
            for &distance in &[0.3, 0.7, 0.9, 1.1, 1.4] {
                let ball = sphere(Vec3::Y * (sign * distance), radius);
                let expected = if distance <= 0.6 {
                    (1.0 - distance).min(0.9)
                } else {
                    1.0 - distance
                };
                check_pair(&cylinder, &ball, expected, 5e-3);
            }
        }
    }

    #[test]
    fn test_gjk_iteration_cap_reports_no_intersection() {
        let a = sphere(Vec3::ZERO, 1.0);
        let b = sphere(Vec3::new(1.0, 0.3, 0.0), 1.0);
        // A tetrahedron needs at least three iterations
        assert!(gjk_intersection_with_limit(&a, &b, 1).is_none());
        assert!(gjk_intersection_with_limit(&a, &b, 2).is_none());
        assert!(gjk_intersection_with_limit(&a, &b, GJK_MAX_ITERATIONS).is_some());
    }

    #[test]
    fn test_contains_origin_on_face() {
        let simplex = Simplex {
            points: [
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(-1.0, 1.0, 0.0),
                Vec3::new(-1.0, -1.0, 0.0),
                Vec3::new(0.0, 0.0, 1.0),
            ]
            .into_iter()
            .map(|p| SupportPoint {
                // Base face passes a hair above the origin
                point: p + Vec3::new(0.0, 0.0, 1e-8),
                direction: Vec3::X,
            })
            .collect(),
        };
        assert!(contains_origin(&simplex));

        let mut reduced = simplex.clone();
        let mut direction = Vec3::ZERO;
        assert!(!reduce_tetrahedron(&mut reduced, &mut direction));
        assert_eq!(reduced.len(), 4);
    }

    #[test]
    fn test_contains_origin() {
        let tetra = |offset: Vec3| Simplex {
            points: [
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(-1.0, 1.0, 0.0),
                Vec3::new(-1.0, -1.0, 1.0),
                Vec3::new(-1.0, -1.0, -1.0),
            ]
            .into_iter()
            .map(|p| SupportPoint {
                point: p + offset,
                direction: Vec3::X,
            })
            .collect(),
        };
        assert!(contains_origin(&tetra(Vec3::ZERO)));
        assert!(!contains_origin(&tetra(Vec3::new(5.0, 0.0, 0.0))));
    }
}
