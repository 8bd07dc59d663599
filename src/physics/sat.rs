//! Separating Axis Theorem for oriented box pairs, with face clipping for a
//! multi-point manifold.
//!
//! Used by the narrowphase only when both boxes are roughly aligned with the
//! world axes. Rotated pairs go through GJK/EPA instead.

use glam::Vec3;

use super::contact::ContactManifold;
use super::shape::{BoxShape, SupportMap};

/// Minimum world-axis component for an axis to count as aligned.
const ALIGNMENT_THRESHOLD: f32 = 0.95;

/// True when every face axis and every non-degenerate edge cross axis of the
/// pair lies close to a world axis.
pub fn is_axis_aligned(a: &BoxShape, b: &BoxShape) -> bool {
    let axes_a = a.axes();
    let axes_b = b.axes();
    let aligned = |axis: Vec3| axis.abs().max_element() >= ALIGNMENT_THRESHOLD;

    if !axes_a.iter().chain(axes_b.iter()).copied().all(aligned) {
        return false;
    }
    for u in &axes_a {
        for v in &axes_b {
            let cross = u.cross(*v);
            if cross.length() < 1e-6 {
                continue;
            }
            if !aligned(cross.normalize()) {
                return false;
            }
        }
    }
    true
}

/// Box-box SAT over the 15 candidate axes.
///
/// Returns `None` when a separating axis exists. Otherwise the manifold normal
/// is the minimum-overlap axis oriented from A to B and no contact is deeper
/// than that overlap. A face axis yields up to four clipped contacts; an edge
/// cross axis yields a single contact. Clipping is exact for pairs that pass
/// [`is_axis_aligned`]; for rotated pairs the contact set is approximate.
pub fn sat_box_box(a: &BoxShape, b: &BoxShape) -> Option<ContactManifold> {
    let axes_a = a.axes();
    let axes_b = b.axes();
    let extents_a = a.extents();
    let extents_b = b.extents();
    let offset = b.center() - a.center();

    let mut candidates = Vec::with_capacity(15);
    candidates.extend_from_slice(&axes_a);
    candidates.extend_from_slice(&axes_b);
    for u in &axes_a {
        for v in &axes_b {
            candidates.push(u.cross(*v));
        }
    }

    let mut best_overlap = f32::MAX;
    let mut best_axis = Vec3::ZERO;
    let mut best_is_face = true;
    for (index, candidate) in candidates.into_iter().enumerate() {
        let len = candidate.length();
        if len < 1e-6 {
            continue;
        }
        let axis = candidate / len;
        let projected_a = project_extent(&axes_a, extents_a, axis);
        let projected_b = project_extent(&axes_b, extents_b, axis);
        let distance = offset.dot(axis);
        let overlap = projected_a + projected_b - distance.abs();
        if overlap <= 0.0 {
            return None;
        }
        if overlap < best_overlap {
            best_overlap = overlap;
            best_axis = if distance < 0.0 { -axis } else { axis };
            // First six candidates are the face normals
            best_is_face = index < 6;
        }
    }

    let mut manifold = ContactManifold::new(best_axis);
    if best_is_face {
        clip_contacts(a, b, best_axis, &mut manifold);
        for contact in &mut manifold.points {
            contact.depth = contact.depth.min(best_overlap);
        }
    }
    if !manifold.has_collision() {
        let mid = (a.center() + b.center()) * 0.5;
        let half = best_axis * (best_overlap * 0.5);
        manifold.add_point(mid + half, mid - half, best_overlap);
    }
    Some(manifold)
}

/// Half-length of a box's projection onto `axis`.
#[inline]
fn project_extent(axes: &[Vec3; 3], extents: Vec3, axis: Vec3) -> f32 {
    extents.x * axes[0].dot(axis).abs()
        + extents.y * axes[1].dot(axis).abs()
        + extents.z * axes[2].dot(axis).abs()
}

/// A box face as a center, outward normal and two tangent half-axes.
#[derive(Debug, Clone, Copy)]
struct BoxFace {
    center: Vec3,
    normal: Vec3,
    tangents: [Vec3; 2],
    half_sizes: [f32; 2],
}

impl BoxFace {
    /// The face of `shape` whose outward normal is most aligned with `direction`.
    fn most_aligned(shape: &BoxShape, direction: Vec3) -> (Self, f32) {
        let axes = shape.axes();
        let extents = shape.extents().to_array();
        let mut best_index = 0;
        let mut best_dot = f32::MIN;
        for (i, axis) in axes.iter().enumerate() {
            let d = axis.dot(direction).abs();
            if d > best_dot {
                best_dot = d;
                best_index = i;
            }
        }
        let sign = if axes[best_index].dot(direction) >= 0.0 {
            1.0
        } else {
            -1.0
        };
        let normal = axes[best_index] * sign;
        let (u, v) = ((best_index + 1) % 3, (best_index + 2) % 3);
        let face = Self {
            center: shape.center() + normal * extents[best_index],
            normal,
            tangents: [axes[u], axes[v]],
            half_sizes: [extents[u], extents[v]],
        };
        (face, best_dot)
    }

    fn polygon(&self) -> Vec<Vec3> {
        let [t0, t1] = self.tangents;
        let u = t0 * self.half_sizes[0];
        let v = t1 * self.half_sizes[1];
        vec![
            self.center + u + v,
            self.center - u + v,
            self.center - u - v,
            self.center + u - v,
        ]
    }
}

/// Sutherland-Hodgman step keeping the part of `polygon` with
/// `dot(p, normal) <= limit`.
fn clip_polygon(polygon: &[Vec3], normal: Vec3, limit: f32) -> Vec<Vec3> {
    let mut out = Vec::with_capacity(polygon.len() + 2);
    for (i, &current) in polygon.iter().enumerate() {
        let next = polygon[(i + 1) % polygon.len()];
        let dc = current.dot(normal) - limit;
        let dn = next.dot(normal) - limit;
        if dc <= 0.0 {
            out.push(current);
        }
        if (dc <= 0.0) != (dn <= 0.0) {
            let t = dc / (dc - dn);
            out.push(current + (next - current) * t);
        }
    }
    out
}

/// Clip the incident face against the reference face side planes and keep
/// the points below the reference face.
fn clip_contacts(a: &BoxShape, b: &BoxShape, normal: Vec3, manifold: &mut ContactManifold) {
    let (face_a, align_a) = BoxFace::most_aligned(a, normal);
    let (face_b, align_b) = BoxFace::most_aligned(b, -normal);
    let reference_is_a = align_a >= align_b;
    let (reference, incident_box) = if reference_is_a { (face_a, b) } else { (face_b, a) };
    let (incident, _) = BoxFace::most_aligned(incident_box, -reference.normal);

    let mut polygon = incident.polygon();
    for (tangent, half) in reference.tangents.iter().zip(reference.half_sizes) {
        let center = reference.center.dot(*tangent);
        polygon = clip_polygon(&polygon, *tangent, center + half);
        polygon = clip_polygon(&polygon, -*tangent, -center + half);
        if polygon.is_empty() {
            return;
        }
    }

    let mut contacts: Vec<(Vec3, Vec3, f32)> = polygon
        .into_iter()
        .filter_map(|p| {
            let separation = reference.normal.dot(p - reference.center);
            if separation > 0.0 {
                return None;
            }
            let on_reference = p - reference.normal * separation;
            Some((p, on_reference, -separation))
        })
        .collect();
    contacts.sort_by(|x, y| y.2.total_cmp(&x.2));

    for (incident_point, reference_point, depth) in contacts {
        if reference_is_a {
            manifold.add_point(reference_point, incident_point, depth);
        } else {
            manifold.add_point(incident_point, reference_point, depth);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, Quat};

    fn unit_box(position: Vec3) -> BoxShape {
        BoxShape::new(Mat4::from_translation(position), Vec3::ONE)
    }

    #[test]
    fn test_sat_offset_boxes() {
        let a = unit_box(Vec3::ZERO);
        let b = unit_box(Vec3::new(1.5, 0.0, 0.0));
        let manifold = sat_box_box(&a, &b).expect("boxes overlap");
        assert!((manifold.depth() - 0.5).abs() < 1e-5);
        assert!((manifold.normal - Vec3::X).length() < 1e-5);
        assert_eq!(manifold.points.len(), 4);

        let flipped = sat_box_box(&b, &a).unwrap();
        assert!((flipped.normal + Vec3::X).length() < 1e-5);
        assert!((flipped.depth() - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_sat_separated() {
        let a = unit_box(Vec3::ZERO);
        let b = unit_box(Vec3::new(0.0, 2.5, 0.0));
        assert!(sat_box_box(&a, &b).is_none());
    }

    #[test]
    fn test_sat_contact_points_lie_on_faces() {
        let a = BoxShape::new(Mat4::IDENTITY, Vec3::new(5.0, 0.5, 5.0));
        let b = unit_box(Vec3::new(0.3, 1.4, -0.2));
        let manifold = sat_box_box(&a, &b).unwrap();
        assert!((manifold.normal - Vec3::Y).length() < 1e-5);
        assert_eq!(manifold.points.len(), 4);
        for contact in &manifold.points {
            assert!((contact.point_a.y - 0.5).abs() < 1e-5);
            assert!((contact.point_b.y - 0.4).abs() < 1e-5);
            assert!((contact.depth - 0.1).abs() < 1e-5);
        }
    }

    #[test]
    fn test_sat_rotated_box_resting_on_face() {
        let a = BoxShape::new(Mat4::IDENTITY, Vec3::new(3.0, 1.0, 3.0));
        let rotation = Quat::from_euler(glam::EulerRot::XYZ, 0.3, 0.7, 0.2);
        let unplaced = BoxShape::new(Mat4::from_quat(rotation), Vec3::ONE);
        let lowest = unplaced
            .corners()
            .iter()
            .map(|c| c.y)
            .fold(f32::MAX, f32::min);
        // Sink the lowest corner 0.2 below the top face of A
        let b = BoxShape::new(
            Mat4::from_rotation_translation(rotation, Vec3::new(0.0, 1.0 - lowest - 0.2, 0.0)),
            Vec3::ONE,
        );

        let manifold = sat_box_box(&a, &b).expect("boxes overlap");
        assert!((manifold.normal - Vec3::Y).length() < 1e-5);
        assert!((manifold.depth() - 0.2).abs() < 1e-4, "depth was {}", manifold.depth());
        assert!(manifold.points.iter().all(|c| c.depth <= 0.2 + 1e-4));
    }

    #[test]
    fn test_sat_crossed_edges_single_contact() {
        let a = BoxShape::new(
            Mat4::from_rotation_x(std::f32::consts::FRAC_PI_4),
            Vec3::ONE,
        );
        let b = BoxShape::new(
            Mat4::from_rotation_translation(
                Quat::from_rotation_z(std::f32::consts::FRAC_PI_4),
                Vec3::new(0.0, 2.0 * std::f32::consts::SQRT_2 - 0.1, 0.0),
            ),
            Vec3::ONE,
        );

        let manifold = sat_box_box(&a, &b).expect("edges cross");
        assert!((manifold.normal - Vec3::Y).length() < 1e-4);
        assert_eq!(manifold.points.len(), 1);
        assert!((manifold.depth() - 0.1).abs() < 1e-4, "depth was {}", manifold.depth());
    }

    #[test]
    fn test_axis_alignment() {
        let a = unit_box(Vec3::ZERO);
        let b = unit_box(Vec3::X);
        assert!(is_axis_aligned(&a, &b));

        let tilted = BoxShape::new(
            Mat4::from_rotation_translation(Quat::from_rotation_z(0.5), Vec3::X),
            Vec3::ONE,
        );
        assert!(!is_axis_aligned(&a, &tilted));

        let quarter_turn = BoxShape::new(
            Mat4::from_rotation_translation(Quat::from_rotation_y(std::f32::consts::FRAC_PI_2), Vec3::X),
            Vec3::ONE,
        );
        assert!(is_axis_aligned(&a, &quarter_turn));
    }

    #[test]
    fn test_clip_polygon_half_plane() {
        let square = vec![
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(-1.0, 1.0, 0.0),
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
        ];
        let clipped = clip_polygon(&square, Vec3::X, 0.0);
        assert_eq!(clipped.len(), 4);
        assert!(clipped.iter().all(|p| p.x <= 1e-6));
    }
}
