//! Mesh produced by surface extraction, with per-quad metadata.

use crate::face_direction::FaceDirection;
use crate::geometry::GeometryBuffer;

/// Metadata for a single merged quad, used for analysis and debugging.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuadInfo {
    /// Which face direction this quad belongs to.
    pub direction: FaceDirection,
    /// Material id of the merged faces.
    pub material: u8,
    /// Extent along the sweep u axis.
    pub width: usize,
    /// Extent along the sweep v axis.
    pub height: usize,
}

/// Geometry of an extracted surface plus one [`QuadInfo`] per emitted quad.
#[derive(Clone, Debug, Default)]
pub struct SurfaceMesh {
    pub geometry: GeometryBuffer,
    pub quads: Vec<QuadInfo>,
}

impl SurfaceMesh {
    /// Creates an empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes one merged quad.
    ///
    /// `layer`, `u`, `v` are voxel coordinates along the direction's sweep
    /// axes; `w` and `h` the quad extent along u and v. Four fresh vertices are
    /// added at `x`, `x + du`, `x + dv`, `x + du + dv`, offset by `translation`.
    #[allow(clippy::too_many_arguments)]
    pub fn push_quad(
        &mut self,
        direction: FaceDirection,
        layer: usize,
        u: usize,
        v: usize,
        w: usize,
        h: usize,
        material: u8,
        translation: [f32; 3],
    ) {
        let (layer_axis, u_axis, v_axis) = direction.sweep_axes();

        // Positive faces sit on the far side of the voxel.
        let layer_pos = if direction.is_positive() {
            layer as f32 + 1.0
        } else {
            layer as f32
        };

        let (u0, v0) = (u as f32, v as f32);
        let (u1, v1) = ((u + w) as f32, (v + h) as f32);
        let corners = [(u0, v0), (u1, v0), (u0, v1), (u1, v1)];
        let uvs = [[0.0, 0.0], [w as f32, 0.0], [0.0, h as f32], [w as f32, h as f32]];

        let geom = &mut self.geometry;
        let base = geom.vertex_count() as u32;

        for (&(cu, cv), uv) in corners.iter().zip(uvs) {
            let mut pos = [0.0_f32; 3];
            pos[layer_axis] = layer_pos;
            pos[u_axis] = cu;
            pos[v_axis] = cv;
            for axis in 0..3 {
                geom.positions.push(pos[axis] + translation[axis]);
            }
            geom.texcoords.extend_from_slice(&uv);
            geom.materials.push(material as u16);
        }

        // u × v points along +layer, so (0, 1, 2) faces the positive side.
        let order: [u32; 6] = if direction.is_positive() {
            [0, 1, 2, 1, 3, 2]
        } else {
            [0, 2, 1, 1, 2, 3]
        };
        geom.indices.extend(order.iter().map(|i| base + i));

        self.quads.push(QuadInfo {
            direction,
            material,
            width: w,
            height: h,
        });
    }

    /// Counts the number of quads emitted for a specific face direction.
    pub fn count_quads_for_direction(&self, direction: FaceDirection) -> usize {
        self.quads
            .iter()
            .filter(|q| q.direction == direction)
            .count()
    }

    /// Returns the total number of quads in the mesh.
    pub fn quad_count(&self) -> usize {
        self.quads.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_mesh() {
        let mesh = SurfaceMesh::new();
        assert!(mesh.geometry.is_empty());
        assert_eq!(mesh.quad_count(), 0);
    }

    #[test]
    fn test_push_single_quad() {
        let mut mesh = SurfaceMesh::new();
        mesh.push_quad(FaceDirection::PosY, 0, 0, 0, 3, 2, 1, [0.0; 3]);
        let geom = &mesh.geometry;
        assert_eq!(geom.vertex_count(), 4);
        assert_eq!(geom.indices.len(), 6);
        assert_eq!(geom.materials, vec![1; 4]);
        assert_eq!(&geom.texcoords[6..8], &[3.0, 2.0]);
        assert_eq!(mesh.quads[0].width, 3);
    }

    #[test]
    fn test_winding_follows_direction() {
        for dir in FaceDirection::ALL {
            let mut mesh = SurfaceMesh::new();
            mesh.push_quad(dir, 1, 0, 0, 2, 3, 1, [0.0; 3]);
            let expected = glam::Vec3::from_array(dir.normal());
            for t in 0..2 {
                let n = mesh.geometry.face_normal(t).normalize();
                assert!(
                    n.dot(expected) > 0.99,
                    "{dir:?} triangle {t} faces {n}, expected {expected}"
                );
            }
        }
    }

    #[test]
    fn test_translation_offsets_positions() {
        let mut mesh = SurfaceMesh::new();
        mesh.push_quad(FaceDirection::NegZ, 0, 0, 0, 1, 1, 1, [10.0, 20.0, 30.0]);
        assert_eq!(mesh.geometry.position(0), glam::Vec3::new(10.0, 20.0, 30.0));
        assert_eq!(mesh.geometry.position(3), glam::Vec3::new(11.0, 21.0, 30.0));
    }

    #[test]
    fn test_count_quads_by_direction() {
        let mut mesh = SurfaceMesh::new();
        mesh.push_quad(FaceDirection::PosY, 0, 0, 0, 1, 1, 1, [0.0; 3]);
        mesh.push_quad(FaceDirection::PosY, 0, 1, 0, 1, 1, 1, [0.0; 3]);
        mesh.push_quad(FaceDirection::NegY, 0, 0, 0, 1, 1, 1, [0.0; 3]);
        assert_eq!(mesh.count_quads_for_direction(FaceDirection::PosY), 2);
        assert_eq!(mesh.count_quads_for_direction(FaceDirection::NegY), 1);
        assert_eq!(mesh.count_quads_for_direction(FaceDirection::PosX), 0);
    }
}
