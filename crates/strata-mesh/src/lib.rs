//! Surface extraction: greedy meshing of voxel volumes into flat geometry
//! buffers ready for encoding.

pub mod face_direction;
pub mod geometry;
pub mod greedy;
pub mod surface;

pub use face_direction::FaceDirection;
pub use geometry::GeometryBuffer;
pub use greedy::{MaskFace, extract_surface};
pub use surface::{QuadInfo, SurfaceMesh};
