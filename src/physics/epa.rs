//! Expanding Polytope Algorithm: penetration normal, depth and contact points
//! from a GJK tetrahedron.
//!
//! The polytope is an arena of faces with per-edge adjacency. Expansion
//! flood-fills the faces visible from the new support point, removes them,
//! and stitches a fan of new faces onto the silhouette. Live faces are kept in
//! a [`MinHeap`] keyed by distance to the origin.

use glam::Vec3;
use tracing::{debug, warn};

use super::contact::CollisionPoints;
use super::gjk::Simplex;
use super::heap::MinHeap;
use super::shape::{minkowski_support, minkowski_support_point, SupportMap, SupportPoint};

/// Default iteration cap.
pub const EPA_MAX_ITERATIONS: usize = 64;

/// Normal refinement: first rotation tried, in radians.
const REFINE_INITIAL_STEP: f32 = 0.05;
const REFINE_MAX_STEP: f32 = 0.4;
const REFINE_MIN_STEP: f32 = 1e-5;
const REFINE_MAX_ROUNDS: usize = 96;

/// Depth reported when EPA has nothing usable to work with.
const FALLBACK_DEPTH: f32 = 0.1;

#[derive(Debug, Clone, Copy)]
struct Face {
    vertices: [usize; 3],
    /// Unit outward normal, zero for degenerate faces.
    normal: Vec3,
    /// Distance from the origin along `normal`.
    distance: f32,
    /// Neighbour across edge `i`, which runs from `vertices[i]` to `vertices[(i + 1) % 3]`.
    adjacent: [Option<usize>; 3],
    alive: bool,
}

impl Face {
    #[inline]
    fn is_degenerate(&self) -> bool {
        self.normal == Vec3::ZERO
    }
}

/// Silhouette edge: `from -> to` as seen by the removed face, plus the
/// surviving neighbour and its index for the same edge.
#[derive(Debug, Clone, Copy)]
struct HorizonEdge {
    from: usize,
    to: usize,
    neighbour: Option<(usize, usize)>,
}

struct Polytope {
    vertices: Vec<SupportPoint>,
    faces: Vec<Face>,
}

impl Polytope {
    /// Build the initial four faces, wound so that every normal points away
    /// from the interior.
    fn from_tetrahedron(simplex: &Simplex) -> Option<Self> {
        if simplex.len() != 4 {
            return None;
        }
        let mut vertices = simplex.points.clone();
        let (v0, v1, v2, v3) = (
            vertices[0].point,
            vertices[1].point,
            vertices[2].point,
            vertices[3].point,
        );
        let volume = (v1 - v0).dot((v2 - v0).cross(v3 - v0));
        if volume.abs() < 1e-12 {
            return None;
        }
        if volume > 0.0 {
            vertices.swap(1, 2);
        }

        let mut polytope = Self {
            vertices,
            faces: Vec::with_capacity(32),
        };
        for indices in [[0, 1, 2], [0, 3, 1], [0, 2, 3], [1, 3, 2]] {
            let face = polytope.make_face(indices);
            polytope.faces.push(face);
        }

        // Every edge of a face appears reversed in exactly one other face
        for f in 0..4 {
            for e in 0..3 {
                let from = polytope.faces[f].vertices[e];
                let to = polytope.faces[f].vertices[(e + 1) % 3];
                for g in 0..4 {
                    if g == f {
                        continue;
                    }
                    if polytope.edge_index(g, to, from).is_some() {
                        polytope.faces[f].adjacent[e] = Some(g);
                    }
                }
            }
        }
        Some(polytope)
    }

    fn make_face(&self, vertices: [usize; 3]) -> Face {
        let a = self.vertices[vertices[0]].point;
        let b = self.vertices[vertices[1]].point;
        let c = self.vertices[vertices[2]].point;
        let normal = (b - a).cross(c - a).normalize_or_zero();
        Face {
            vertices,
            normal,
            distance: normal.dot(a),
            adjacent: [None; 3],
            alive: true,
        }
    }

    /// Index of the edge `from -> to` in `face`, if it has one.
    fn edge_index(&self, face: usize, from: usize, to: usize) -> Option<usize> {
        let v = self.faces[face].vertices;
        (0..3).find(|&e| v[e] == from && v[(e + 1) % 3] == to)
    }

    #[inline]
    fn sees(&self, face: usize, point: Vec3) -> bool {
        let f = &self.faces[face];
        f.normal.dot(point - self.vertices[f.vertices[0]].point) > 0.0
    }

    /// Faces reachable from `start` through visible neighbours.
    fn visible_from(&self, start: usize, point: Vec3) -> Vec<bool> {
        let mut visible = vec![false; self.faces.len()];
        let mut stack = vec![start];
        while let Some(f) = stack.pop() {
            if visible[f] || !self.faces[f].alive || !self.sees(f, point) {
                continue;
            }
            visible[f] = true;
            stack.extend(self.faces[f].adjacent.iter().flatten().copied());
        }
        visible
    }

    fn horizon(&self, visible: &[bool]) -> Vec<HorizonEdge> {
        let mut edges = Vec::new();
        for (f, face) in self.faces.iter().enumerate() {
            if !visible[f] {
                continue;
            }
            for e in 0..3 {
                let neighbour = face.adjacent[e];
                if neighbour.is_some_and(|n| visible[n]) {
                    continue;
                }
                let from = face.vertices[e];
                let to = face.vertices[(e + 1) % 3];
                edges.push(HorizonEdge {
                    from,
                    to,
                    neighbour: neighbour
                        .and_then(|n| self.edge_index(n, to, from).map(|ne| (n, ne))),
                });
            }
        }
        edges
    }

    /// Replace the visible region with a fan of faces around `apex`.
    /// Returns the ids of the new faces.
    fn stitch(&mut self, horizon: &[HorizonEdge], apex: usize) -> Vec<usize> {
        let first = self.faces.len();
        for (i, edge) in horizon.iter().enumerate() {
            let mut face = self.make_face([edge.from, edge.to, apex]);
            let id = first + i;
            if let Some((n, ne)) = edge.neighbour {
                face.adjacent[0] = Some(n);
                self.faces[n].adjacent[ne] = Some(id);
            }
            self.faces.push(face);
        }
        // Edge 1 (to -> apex) meets edge 2 (apex -> from) of the face starting at `to`
        for (i, edge) in horizon.iter().enumerate() {
            if let Some(j) = horizon.iter().position(|other| other.from == edge.to) {
                self.faces[first + i].adjacent[1] = Some(first + j);
                self.faces[first + j].adjacent[2] = Some(first + i);
            }
        }
        (first..self.faces.len()).collect()
    }
}

/// Dynamic convergence tolerance scaled to the smaller shape.
#[inline]
fn tolerance(a: f32, b: f32) -> f32 {
    (a.min(b) * 1e-4).clamp(1e-4, 1e-3)
}

/// EPA with the default iteration cap.
pub fn epa_penetration<A, B>(simplex: &Simplex, shape_a: &A, shape_b: &B) -> CollisionPoints
where
    A: SupportMap + ?Sized,
    B: SupportMap + ?Sized,
{
    epa_penetration_with_limit(simplex, shape_a, shape_b, EPA_MAX_ITERATIONS)
}

/// Expand the GJK tetrahedron until the closest face stops moving. Always
/// returns a result: the closest face found when the cap is hit, or a
/// center-to-center guess when the polytope is unusable.
pub fn epa_penetration_with_limit<A, B>(
    simplex: &Simplex,
    shape_a: &A,
    shape_b: &B,
    max_iterations: usize,
) -> CollisionPoints
where
    A: SupportMap + ?Sized,
    B: SupportMap + ?Sized,
{
    let Some(mut polytope) = Polytope::from_tetrahedron(simplex) else {
        warn!(
            points = simplex.len(),
            "EPA: degenerate starting simplex, using fallback contact"
        );
        return fallback_contact(shape_a, shape_b);
    };
    let eps = tolerance(shape_a.radius(), shape_b.radius());

    let mut heap = MinHeap::with_capacity(64);
    for (id, face) in polytope.faces.iter().enumerate() {
        if !face.is_degenerate() {
            heap.push(id, face.distance.max(0.0));
        }
    }

    for _ in 0..max_iterations {
        let Some((closest, _)) = heap.pop() else {
            break;
        };
        let face = polytope.faces[closest];
        let support = minkowski_support_point(shape_a, shape_b, face.normal);

        let converged = (support.point.dot(face.normal) - face.distance).abs() < eps;
        let duplicate = polytope
            .vertices
            .iter()
            .any(|v| v.point.distance(support.point) < eps);
        if converged || duplicate {
            return contact_from_face(&polytope, &face, shape_a, shape_b);
        }

        let apex = polytope.vertices.len();
        polytope.vertices.push(support);

        let visible = polytope.visible_from(closest, support.point);
        let horizon = polytope.horizon(&visible);
        for (id, seen) in visible.iter().enumerate() {
            if *seen {
                polytope.faces[id].alive = false;
                heap.remove(&id);
            }
        }

        let mut pushed = 0;
        for id in polytope.stitch(&horizon, apex) {
            let new_face = &polytope.faces[id];
            if !new_face.is_degenerate() {
                heap.push(id, new_face.distance.max(0.0));
                pushed += 1;
            }
        }
        if pushed == 0 {
            debug!("EPA: expansion produced no usable faces");
            return contact_from_face(&polytope, &face, shape_a, shape_b);
        }
    }

    match heap.pop() {
        Some((best, _)) => {
            warn!(max_iterations, "EPA: iteration cap reached, using closest face");
            let face = polytope.faces[best];
            contact_from_face(&polytope, &face, shape_a, shape_b)
        }
        None => {
            warn!("EPA: polytope has no usable faces, using fallback contact");
            fallback_contact(shape_a, shape_b)
        }
    }
}

/// Barycentric coordinates of `p` with respect to triangle (a, b, c).
fn barycentric(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Option<[f32; 3]> {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let d00 = v0.dot(v0);
    let d01 = v0.dot(v1);
    let d11 = v1.dot(v1);
    let d20 = v2.dot(v0);
    let d21 = v2.dot(v1);
    let denom = d00 * d11 - d01 * d01;
    if denom.abs() < 1e-12 {
        return None;
    }
    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    Some([1.0 - v - w, v, w])
}

fn contact_from_face<A, B>(polytope: &Polytope, face: &Face, shape_a: &A, shape_b: &B) -> CollisionPoints
where
    A: SupportMap + ?Sized,
    B: SupportMap + ?Sized,
{
    let corners = face.vertices.map(|i| polytope.vertices[i]);
    let origin_projection = face.normal * face.distance.max(0.0);
    let weights = barycentric(
        origin_projection,
        corners[0].point,
        corners[1].point,
        corners[2].point,
    )
    .unwrap_or([1.0 / 3.0; 3]);

    let mut point_a = Vec3::ZERO;
    let mut point_b = Vec3::ZERO;
    for (weight, corner) in weights.iter().zip(corners.iter()) {
        point_a += *weight * shape_a.support(corner.direction);
        point_b += *weight * shape_b.support(-corner.direction);
    }

    let (mut normal, depth) = refine_normal(shape_a, shape_b, face.normal);
    let depth = depth.max(0.0);
    if normal.dot(shape_b.center() - shape_a.center()) < 0.0 {
        normal = -normal;
    }
    CollisionPoints::new(point_a, point_b, normal, depth)
}

/// Descend the Minkowski support function `h(n) = support(n) . n` over unit
/// normals, starting at a polytope face normal.
///
/// The face distance bounds the depth from below and `h` bounds it from above;
/// the two meet at the penetration normal. On curved shapes the polytope
/// converges slowly, so the final depth is `h` at the refined normal.
fn refine_normal<A, B>(shape_a: &A, shape_b: &B, normal: Vec3) -> (Vec3, f32)
where
    A: SupportMap + ?Sized,
    B: SupportMap + ?Sized,
{
    let height = |n: Vec3| minkowski_support(shape_a, shape_b, n).dot(n);

    let mut best = normal;
    let mut best_height = height(normal);
    let mut step = REFINE_INITIAL_STEP;
    for _ in 0..REFINE_MAX_ROUNDS {
        if step < REFINE_MIN_STEP {
            break;
        }
        // Tangential part of the support point is the gradient of h
        let support = minkowski_support(shape_a, shape_b, best);
        let gradient = support - best * support.dot(best);
        let len = gradient.length();
        if len < 1e-9 {
            break;
        }
        let downhill = -gradient / len;
        let across = best.cross(downhill);

        let offset = step.tan();
        let improved = [downhill, across, -across].into_iter().find_map(|direction| {
            let candidate = (best + direction * offset).normalize();
            let h = height(candidate);
            (h < best_height).then_some((candidate, h))
        });
        match improved {
            Some((candidate, h)) => {
                best = candidate;
                best_height = h;
                step = (step * 2.0).min(REFINE_MAX_STEP);
            }
            None => step *= 0.5,
        }
    }
    (best, best_height)
}

fn fallback_contact<A, B>(shape_a: &A, shape_b: &B) -> CollisionPoints
where
    A: SupportMap + ?Sized,
    B: SupportMap + ?Sized,
{
    let offset = shape_b.center() - shape_a.center();
    let normal = if offset.length() > 1e-6 {
        offset.normalize()
    } else {
        Vec3::Y
    };
    CollisionPoints::new(shape_a.center(), shape_b.center(), normal, FALLBACK_DEPTH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::gjk::gjk_intersection;
    use crate::physics::shape::{BoxShape, CapsuleShape, SphereShape};
    use glam::{Mat4, Quat};

    fn penetration<A: SupportMap, B: SupportMap>(a: &A, b: &B) -> CollisionPoints {
        let simplex = gjk_intersection(a, b).expect("shapes should intersect");
        epa_penetration(&simplex, a, b)
    }

    #[test]
    fn test_epa_sphere_depth() {
        let a = SphereShape {
            center: Vec3::ZERO,
            radius: 1.0,
        };
        let b = SphereShape {
            center: Vec3::new(1.5, 0.0, 0.0),
            radius: 1.0,
        };
        let result = penetration(&a, &b);
        assert!(result.has_collision);
        assert!(
            (result.depth - 0.5).abs() < 1e-3,
            "depth was {}",
            result.depth
        );
        assert!(result.normal.dot(Vec3::X) > 0.99);
    }

    #[test]
    fn test_epa_box_depth() {
        let a = BoxShape::new(Mat4::IDENTITY, Vec3::ONE);
        let b = BoxShape::new(Mat4::from_translation(Vec3::new(0.0, 1.8, 0.0)), Vec3::ONE);
        let result = penetration(&a, &b);
        assert!((result.depth - 0.2).abs() < 1e-3, "depth was {}", result.depth);
        assert!(result.normal.dot(Vec3::Y) > 0.99);
    }

    #[test]
    fn test_epa_normal_points_from_a_to_b() {
        let a = BoxShape::new(
            Mat4::from_rotation_translation(Quat::from_rotation_y(0.3), Vec3::ZERO),
            Vec3::splat(0.5),
        );
        let b = CapsuleShape {
            center: Vec3::new(-0.8, 0.0, 0.1),
            axis: Vec3::Y,
            half_height: 0.5,
            radius: 0.4,
        };
        let result = penetration(&a, &b);
        assert!(result.normal.dot(b.center - Vec3::ZERO) > 0.0);
        assert!(result.depth > 0.0);
        assert!((result.normal.length() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_epa_repeatable() {
        let a = BoxShape::new(
            Mat4::from_rotation_translation(Quat::from_rotation_z(0.5), Vec3::ZERO),
            Vec3::splat(0.5),
        );
        let b = SphereShape {
            center: Vec3::new(0.6, 0.4, 0.0),
            radius: 0.5,
        };
        let simplex = gjk_intersection(&a, &b).unwrap();
        let first = epa_penetration(&simplex, &a, &b);
        let second = epa_penetration(&simplex, &a, &b);
        assert_eq!(first, second);
    }

    #[test]
    fn test_epa_iteration_cap_uses_closest_face() {
        let a = SphereShape {
            center: Vec3::ZERO,
            radius: 1.0,
        };
        let b = SphereShape {
            center: Vec3::new(1.5, 0.2, 0.0),
            radius: 1.0,
        };
        let expected = 2.0 - b.center.length();
        let simplex = gjk_intersection(&a, &b).unwrap();

        let capped = epa_penetration_with_limit(&simplex, &a, &b, 1);
        assert!(capped.has_collision);
        assert!(capped.depth.is_finite());
        // Support height along any normal bounds the depth from above
        assert!(capped.depth >= expected - 1e-4, "depth was {}", capped.depth);
        assert!(capped.normal.dot(b.center) > 0.0);

        let full = epa_penetration(&simplex, &a, &b);
        assert!((full.depth - expected).abs() < 1e-3, "depth was {}", full.depth);
    }

    #[test]
    fn test_refine_normal_on_curved_shapes() {
        let a = SphereShape {
            center: Vec3::ZERO,
            radius: 0.7075,
        };
        let b = SphereShape {
            center: Vec3::new(0.3, 0.4, -0.2),
            radius: 1.713,
        };
        // Support height of A - B is smallest along the centre offset
        let exact = (b.center - a.center).normalize();
        let start = (exact + Vec3::new(0.15, -0.1, 0.05)).normalize();
        let (normal, depth) = refine_normal(&a, &b, start);
        let expected = a.radius + b.radius - b.center.length();
        assert!((depth - expected).abs() < 1e-4, "depth {depth} vs {expected}");
        assert!(normal.dot(exact) > 0.999);

        let capsule = CapsuleShape {
            center: Vec3::ZERO,
            axis: Vec3::Y,
            half_height: 0.6,
            radius: 0.4,
        };
        let ball = SphereShape {
            center: Vec3::new(0.5, 0.2, 0.0),
            radius: 0.5,
        };
        let (_, depth) = refine_normal(&capsule, &ball, Vec3::new(1.0, 0.1, 0.1).normalize());
        assert!((depth - 0.4).abs() < 1e-3, "depth was {depth}");
    }

    #[test]
    fn test_epa_fallback_on_degenerate_simplex() {
        let a = SphereShape {
            center: Vec3::ZERO,
            radius: 1.0,
        };
        let b = SphereShape {
            center: Vec3::ZERO,
            radius: 1.0,
        };
        let result = epa_penetration(&Simplex::default(), &a, &b);
        assert_eq!(result.normal, Vec3::Y);
        assert!((result.depth - FALLBACK_DEPTH).abs() < 1e-6);
    }

    #[test]
    fn test_tolerance_bounds() {
        assert_eq!(tolerance(0.01, 5.0), 1e-4);
        assert_eq!(tolerance(100.0, 100.0), 1e-3);
        assert!((tolerance(5.0, 8.0) - 5e-4).abs() < 1e-9);
    }

    #[test]
    fn test_initial_polytope_faces_point_outward() {
        let simplex = Simplex {
            points: [
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(-1.0, 1.0, 0.0),
                Vec3::new(-1.0, -1.0, 1.0),
                Vec3::new(-1.0, -1.0, -1.0),
            ]
            .into_iter()
            .map(|point| SupportPoint {
                point,
                direction: point,
            })
            .collect(),
        };
        let polytope = Polytope::from_tetrahedron(&simplex).unwrap();
        let centroid = polytope.vertices.iter().map(|v| v.point).sum::<Vec3>() / 4.0;
        for face in &polytope.faces {
            let on_face = polytope.vertices[face.vertices[0]].point;
            assert!(face.normal.dot(centroid - on_face) < 0.0);
            assert!(face.adjacent.iter().all(Option::is_some));
        }
    }
}
