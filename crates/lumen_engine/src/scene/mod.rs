//! Scene graph, cameras, lights and raycasting

pub mod camera;
pub mod light;
pub mod node;
pub mod raycast;

pub use camera::{Camera, Projection};
pub use light::{Light, LightType};
pub use node::{Node, NodeRef, Renderable};
pub use raycast::{raycast, Ray, RaycastOptions, RaycastResult};
