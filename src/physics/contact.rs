//! Contact data structures for collision response.

use glam::Vec3;

/// Upper bound on contact points kept per manifold.
pub const MAX_MANIFOLD_POINTS: usize = 4;

/// Single-contact result of a pairwise test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionPoints {
    /// Deepest point of A inside B.
    pub a: Vec3,
    /// Deepest point of B inside A.
    pub b: Vec3,
    /// Unit contact normal (from A to B).
    pub normal: Vec3,
    /// Penetration depth.
    pub depth: f32,
    pub has_collision: bool,
}

impl CollisionPoints {
    pub fn new(a: Vec3, b: Vec3, normal: Vec3, depth: f32) -> Self {
        Self {
            a,
            b,
            normal,
            depth,
            has_collision: depth >= 0.0,
        }
    }

    /// Same contact seen from B's side.
    pub fn flipped(&self) -> Self {
        Self::new(self.b, self.a, -self.normal, self.depth)
    }
}

/// A single contact point of a manifold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactPoint {
    /// Contact point on A, in world space.
    pub point_a: Vec3,
    /// Contact point on B, in world space.
    pub point_b: Vec3,
    /// Penetration depth (positive = penetrating).
    pub depth: f32,
}

impl ContactPoint {
    #[inline]
    pub fn midpoint(&self) -> Vec3 {
        (self.point_a + self.point_b) * 0.5
    }
}

/// Up to [`MAX_MANIFOLD_POINTS`] contacts sharing one normal.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactManifold {
    /// Contact normal (from A to B).
    pub normal: Vec3,
    pub points: Vec<ContactPoint>,
}

impl ContactManifold {
    pub fn new(normal: Vec3) -> Self {
        Self {
            normal,
            points: Vec::with_capacity(MAX_MANIFOLD_POINTS),
        }
    }

    /// Add a contact. When full, the new point replaces the shallowest one if
    /// it is deeper.
    pub fn add_point(&mut self, point_a: Vec3, point_b: Vec3, depth: f32) {
        let contact = ContactPoint {
            point_a,
            point_b,
            depth,
        };
        if self.points.len() < MAX_MANIFOLD_POINTS {
            self.points.push(contact);
            return;
        }
        if let Some(shallowest) = self
            .points
            .iter_mut()
            .min_by(|x, y| x.depth.total_cmp(&y.depth))
        {
            if shallowest.depth < depth {
                *shallowest = contact;
            }
        }
    }

    #[inline]
    pub fn has_collision(&self) -> bool {
        !self.points.is_empty()
    }

    pub fn deepest(&self) -> Option<&ContactPoint> {
        self.points.iter().max_by(|x, y| x.depth.total_cmp(&y.depth))
    }

    /// Maximum penetration depth, or zero for an empty manifold.
    pub fn depth(&self) -> f32 {
        self.deepest().map_or(0.0, |c| c.depth)
    }

    /// Reduce to the deepest contact.
    pub fn to_collision_points(&self) -> Option<CollisionPoints> {
        self.deepest()
            .map(|c| CollisionPoints::new(c.point_a, c.point_b, self.normal, c.depth))
    }

    /// Same manifold seen from B's side.
    pub fn flipped(mut self) -> Self {
        self.normal = -self.normal;
        for c in &mut self.points {
            std::mem::swap(&mut c.point_a, &mut c.point_b);
        }
        self
    }
}

impl From<CollisionPoints> for ContactManifold {
    fn from(points: CollisionPoints) -> Self {
        let mut manifold = ContactManifold::new(points.normal);
        manifold.add_point(points.a, points.b, points.depth);
        manifold
    }
}

/// Broadphase candidate: two bodies and the overlapping colliders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollisionPair {
    pub body_a: hecs::Entity,
    pub body_b: hecs::Entity,
    pub collider_a: hecs::Entity,
    pub collider_b: hecs::Entity,
}

/// A confirmed contact between two bodies, handed to the solvers.
#[derive(Debug, Clone)]
pub struct Collision {
    pub body_a: hecs::Entity,
    pub body_b: hecs::Entity,
    pub collider_a: hecs::Entity,
    pub collider_b: hecs::Entity,
    pub manifold: ContactManifold,
}

impl Collision {
    pub fn new(pair: CollisionPair, manifold: ContactManifold) -> Self {
        Self {
            body_a: pair.body_a,
            body_b: pair.body_b,
            collider_a: pair.collider_a,
            collider_b: pair.collider_b,
            manifold,
        }
    }

    /// Single-contact view of the manifold.
    pub fn points(&self) -> Option<CollisionPoints> {
        self.manifold.to_collision_points()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collision_points_has_collision() {
        assert!(CollisionPoints::new(Vec3::ZERO, Vec3::ZERO, Vec3::X, 0.0).has_collision);
        assert!(!CollisionPoints::new(Vec3::ZERO, Vec3::ZERO, Vec3::X, -0.1).has_collision);
    }

    #[test]
    fn test_manifold_keeps_deepest_four() {
        let mut manifold = ContactManifold::new(Vec3::Y);
        for depth in [0.1, 0.5, 0.2, 0.3, 0.4] {
            manifold.add_point(Vec3::ZERO, Vec3::ZERO, depth);
        }
        assert_eq!(manifold.points.len(), MAX_MANIFOLD_POINTS);
        assert!(manifold.points.iter().all(|c| c.depth > 0.15));
        assert!((manifold.depth() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_manifold_flip() {
        let mut manifold = ContactManifold::new(Vec3::X);
        manifold.add_point(Vec3::ONE, Vec3::ZERO, 0.25);
        let flipped = manifold.flipped();
        assert_eq!(flipped.normal, -Vec3::X);
        assert_eq!(flipped.points[0].point_a, Vec3::ZERO);
        assert_eq!(flipped.points[0].point_b, Vec3::ONE);
    }

    #[test]
    fn test_reduce_to_collision_points() {
        let mut manifold = ContactManifold::new(Vec3::Z);
        assert!(manifold.to_collision_points().is_none());
        manifold.add_point(Vec3::ZERO, Vec3::Z, 0.1);
        manifold.add_point(Vec3::X, Vec3::X + Vec3::Z, 0.3);
        let points = manifold.to_collision_points().unwrap();
        assert_eq!(points.a, Vec3::X);
        assert!((points.depth - 0.3).abs() < 1e-6);
        assert!(points.has_collision);
    }
}
