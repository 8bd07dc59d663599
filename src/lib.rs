//! Rein rigid body physics
//!
//! Collision detection and contact resolution for convex rigid bodies stored
//! in a `hecs` world.
//!
//! # Architecture
//!
//! The library is organized into two layers:
//!
//! 1. **ecs** - Components attached to entities (transforms, rigid bodies, colliders)
//! 2. **physics** - Shapes, GJK/EPA, SAT, broadphase, narrowphase, solvers and the
//!    fixed-step `PhysicsWorld`

pub mod ecs;
pub mod physics;

// Re-export commonly used types
pub use physics::{PhysicsConfig, PhysicsError, PhysicsResult, PhysicsWorld};

// Re-export dependencies
pub use glam;
pub use hecs;
