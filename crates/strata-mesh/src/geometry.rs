//! Flat, renderer-agnostic geometry arrays.

use glam::Vec3;

/// Parallel vertex arrays plus a triangle index list.
///
/// Positions and normals hold 3 floats per vertex, texcoords 2. `materials`
/// holds one id per vertex or is empty when the producer did not attach
/// materials. Indices address whole vertices, 3 per triangle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeometryBuffer {
    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
    pub texcoords: Vec<f32>,
    pub materials: Vec<u16>,
    pub indices: Vec<u32>,
}

impl GeometryBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    /// Number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Whether the buffer holds no triangles.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Position of vertex `i`.
    pub fn position(&self, i: usize) -> Vec3 {
        Vec3::from_slice(&self.positions[i * 3..i * 3 + 3])
    }

    /// Normal of vertex `i`.
    pub fn normal(&self, i: usize) -> Vec3 {
        Vec3::from_slice(&self.normals[i * 3..i * 3 + 3])
    }

    /// Unnormalized face normal of triangle `t` from its winding.
    pub fn face_normal(&self, t: usize) -> Vec3 {
        let tri = &self.indices[t * 3..t * 3 + 3];
        let a = self.position(tri[0] as usize);
        let b = self.position(tri[1] as usize);
        let c = self.position(tri[2] as usize);
        (b - a).cross(c - a)
    }

    /// Recompute vertex normals: each triangle's cross-product normal is
    /// accumulated into its three vertices, then every vertex normal is
    /// normalized.
    pub fn compute_normals(&mut self) {
        let mut acc = vec![Vec3::ZERO; self.vertex_count()];
        for t in 0..self.triangle_count() {
            let n = self.face_normal(t);
            for &i in &self.indices[t * 3..t * 3 + 3] {
                acc[i as usize] += n;
            }
        }
        self.normals.clear();
        self.normals.reserve(acc.len() * 3);
        for n in acc {
            self.normals
                .extend_from_slice(&n.normalize_or_zero().to_array());
        }
    }

    /// Multiply every position by `factor`.
    pub fn scale(&mut self, factor: f32) {
        if factor == 1.0 {
            return;
        }
        for p in &mut self.positions {
            *p *= factor;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_quad() -> GeometryBuffer {
        GeometryBuffer {
            positions: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0],
            normals: Vec::new(),
            texcoords: vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0],
            materials: Vec::new(),
            indices: vec![0, 1, 2, 1, 3, 2],
        }
    }

    #[test]
    fn test_compute_normals_unit_length() {
        let mut geom = unit_quad();
        geom.compute_normals();
        assert_eq!(geom.normals.len(), 12);
        for i in 0..geom.vertex_count() {
            let n = geom.normal(i);
            assert!((n.length() - 1.0).abs() < 1e-6, "vertex {i} normal {n}");
            assert!(n.z > 0.99, "quad in the XY plane faces +Z, got {n}");
        }
    }

    #[test]
    fn test_empty_buffer_has_no_normals() {
        let mut geom = GeometryBuffer::new();
        geom.compute_normals();
        assert!(geom.is_empty());
        assert!(geom.normals.is_empty());
        assert_eq!(geom.vertex_count(), 0);
    }

    #[test]
    fn test_scale_positions_only() {
        let mut geom = unit_quad();
        geom.scale(2.5);
        assert_eq!(geom.position(3), Vec3::new(2.5, 2.5, 0.0));
        assert_eq!(geom.texcoords[6], 1.0);
    }
}
