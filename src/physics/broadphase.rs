//! Broadphase collision detection using AABB overlap tests.

use crate::ecs::components::physics::{Collider, RigidBody};

use super::contact::CollisionPair;

/// Brute-force broadphase over every pair of registered bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct Broadphase;

impl Broadphase {
    pub fn new() -> Self {
        Self
    }

    /// Find all collider pairs whose cached AABBs overlap.
    ///
    /// Bodies are visited in registration order and each unordered pair once.
    /// Pairs where neither body is dynamic are skipped, as are pairs of
    /// colliders on the same body.
    pub fn find_pairs(&self, world: &hecs::World, bodies: &[hecs::Entity]) -> Vec<CollisionPair> {
        // Snapshot each body's type and collider list
        let entries: Vec<(hecs::Entity, bool, Vec<hecs::Entity>)> = bodies
            .iter()
            .filter_map(|&entity| {
                let rb = world.get::<&RigidBody>(entity).ok()?;
                Some((entity, rb.is_dynamic(), rb.colliders.clone()))
            })
            .collect();

        let mut pairs = Vec::new();

        // O(n^2) brute force - sufficient for small numbers of bodies
        for i in 0..entries.len() {
            for j in (i + 1)..entries.len() {
                let (body_a, dynamic_a, colliders_a) = &entries[i];
                let (body_b, dynamic_b, colliders_b) = &entries[j];

                if !dynamic_a && !dynamic_b {
                    continue;
                }

                for &collider_a in colliders_a {
                    let Ok(ca) = world.get::<&Collider>(collider_a) else {
                        continue;
                    };
                    for &collider_b in colliders_b {
                        let Ok(cb) = world.get::<&Collider>(collider_b) else {
                            continue;
                        };
                        if ca.aabb.overlaps(&cb.aabb) {
                            pairs.push(CollisionPair {
                                body_a: *body_a,
                                body_b: *body_b,
                                collider_a,
                                collider_b,
                            });
                        }
                    }
                }
            }
        }

        pairs
    }
}
