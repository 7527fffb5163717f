//! Greedy meshing: merges coplanar, same-material exposed faces into maximal
//! rectangles, one sweep plane at a time.

use strata_terrain::{EMPTY, VoxelVolume};

use crate::face_direction::FaceDirection;
use crate::surface::SurfaceMesh;

/// An exposed face recorded in the sweep mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MaskFace {
    /// Material of the voxel owning the face.
    pub material: u8,
}

/// Converts sweep-axis coordinates back to `[x, y, z]`.
fn axes_to_xyz(axes: (usize, usize, usize), layer: usize, u: usize, v: usize) -> [usize; 3] {
    let (layer_axis, u_axis, v_axis) = axes;
    let mut coords = [0usize; 3];
    coords[layer_axis] = layer;
    coords[u_axis] = u;
    coords[v_axis] = v;
    coords
}

/// The face of voxel `pos` pointing along `direction`, if it is exposed.
///
/// A face is exposed when the voxel is solid and the cell across the face is
/// outside the volume, empty, or a different material.
fn exposed_face(volume: &VoxelVolume, pos: [usize; 3], direction: FaceDirection) -> Option<MaskFace> {
    let material = volume.get(pos[0], pos[1], pos[2]);
    if material == EMPTY {
        return None;
    }
    let step = direction.step();
    let neighbor = volume.get_or_empty([
        pos[0] as i64 + step[0],
        pos[1] as i64 + step[1],
        pos[2] as i64 + step[2],
    ]);
    (neighbor != material).then_some(MaskFace { material })
}

/// Extracts the visible surface of `volume` as merged quads.
///
/// Every exposed face is covered by exactly one quad; quads never span a
/// material boundary. Faces on the volume boundary are always emitted, so the
/// result is a closed shell. Vertex positions are offset by `translation` and
/// vertex normals are filled in once all quads are placed.
pub fn extract_surface(volume: &VoxelVolume, translation: [f32; 3]) -> SurfaceMesh {
    let mut mesh = SurfaceMesh::new();
    let dims = volume.dims();
    let mut mask: Vec<Option<MaskFace>> = Vec::new();

    for direction in FaceDirection::ALL {
        let axes = direction.sweep_axes();
        let (layer_axis, u_axis, v_axis) = axes;
        let (u_len, v_len) = (dims[u_axis], dims[v_axis]);

        for layer in 0..dims[layer_axis] {
            mask.clear();
            for v in 0..v_len {
                for u in 0..u_len {
                    let pos = axes_to_xyz(axes, layer, u, v);
                    mask.push(exposed_face(volume, pos, direction));
                }
            }

            for v in 0..v_len {
                let mut u = 0;
                while u < u_len {
                    let Some(face) = mask[v * u_len + u] else {
                        u += 1;
                        continue;
                    };

                    // Extend width along u.
                    let mut w = 1;
                    while u + w < u_len && mask[v * u_len + u + w] == Some(face) {
                        w += 1;
                    }

                    // Extend height along v while the whole row matches.
                    let mut h = 1;
                    'outer: while v + h < v_len {
                        let row = (v + h) * u_len;
                        for du in 0..w {
                            if mask[row + u + du] != Some(face) {
                                break 'outer;
                            }
                        }
                        h += 1;
                    }

                    // Consume the merged region.
                    for dv in 0..h {
                        let row = (v + dv) * u_len;
                        mask[row + u..row + u + w].fill(None);
                    }

                    mesh.push_quad(direction, layer, u, v, w, h, face.material, translation);
                    u += w;
                }
            }
        }
    }

    mesh.geometry.compute_normals();
    mesh
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;

    fn solid(n: usize, material: u8) -> VoxelVolume {
        VoxelVolume::filled([n, n, n], material).unwrap()
    }

    /// Sample the volume at a continuous point, `EMPTY` outside.
    fn sample(volume: &VoxelVolume, p: Vec3) -> u8 {
        let f = p.floor();
        volume.get_or_empty([f.x as i64, f.y as i64, f.z as i64])
    }

    #[test]
    fn test_empty_volume_produces_nothing() {
        let volume = VoxelVolume::empty([5, 5, 5]).unwrap();
        let mesh = extract_surface(&volume, [0.0; 3]);
        assert_eq!(mesh.quad_count(), 0);
        assert!(mesh.geometry.positions.is_empty());
        assert!(mesh.geometry.indices.is_empty());
        assert!(mesh.geometry.normals.is_empty());
    }

    #[test]
    fn test_solid_cube_produces_six_quads() {
        for n in [1, 2, 5, 16] {
            let mesh = extract_surface(&solid(n, 1), [0.0; 3]);
            assert_eq!(mesh.quad_count(), 6, "solid {n}^3 cube");
            for dir in FaceDirection::ALL {
                assert_eq!(mesh.count_quads_for_direction(dir), 1, "{dir:?} for n={n}");
            }
            assert!(mesh.quads.iter().all(|q| q.width == n && q.height == n));
            assert_eq!(mesh.geometry.vertex_count(), 24);
            assert_eq!(mesh.geometry.indices.len(), 36);
        }
    }

    #[test]
    fn test_face_normals_point_away_from_solid() {
        // A staircase with two materials gives faces in every direction.
        let n = 6;
        let mut volume = VoxelVolume::empty([n, n, n]).unwrap();
        for x in 1..5 {
            for z in 1..5 {
                for y in 0..=x {
                    volume.set(x, y, z, if y < 2 { 1 } else { 2 });
                }
            }
        }
        let mesh = extract_surface(&volume, [0.0; 3]);
        let geom = &mesh.geometry;
        assert!(mesh.quad_count() > 6);

        for (q, quad) in mesh.quads.iter().enumerate() {
            for t in [q * 2, q * 2 + 1] {
                let normal = geom.face_normal(t);
                let expected = Vec3::from_array(quad.direction.normal());
                assert!(
                    normal.dot(expected) > 0.0,
                    "triangle {t} of {:?} quad faces {normal}",
                    quad.direction
                );

                let tri = &geom.indices[t * 3..t * 3 + 3];
                let centroid = tri
                    .iter()
                    .map(|&i| geom.position(i as usize))
                    .sum::<Vec3>()
                    / 3.0;
                let unit = normal.normalize();
                let inside = sample(&volume, centroid - unit * 0.5);
                let outside = sample(&volume, centroid + unit * 0.5);
                assert_eq!(inside, quad.material, "behind triangle {t}");
                assert_ne!(outside, quad.material, "in front of triangle {t}");
            }
        }
    }

    #[test]
    fn test_vertex_normals_are_unit_and_flat() {
        let mesh = extract_surface(&solid(3, 4), [0.0; 3]);
        let geom = &mesh.geometry;
        assert_eq!(geom.normals.len(), geom.positions.len());
        for (q, quad) in mesh.quads.iter().enumerate() {
            let expected = Vec3::from_array(quad.direction.normal());
            for i in q * 4..q * 4 + 4 {
                let n = geom.normal(i);
                assert!((n - expected).length() < 1e-5, "vertex {i} normal {n}");
            }
        }
    }

    #[test]
    fn test_different_materials_not_merged() {
        let mut volume = VoxelVolume::empty([4, 1, 1]).unwrap();
        volume.set(0, 0, 0, 1);
        volume.set(1, 0, 0, 1);
        volume.set(2, 0, 0, 2);
        volume.set(3, 0, 0, 2);
        let mesh = extract_surface(&volume, [0.0; 3]);

        assert_eq!(mesh.count_quads_for_direction(FaceDirection::PosY), 2);
        // The shared boundary exposes one face on each side.
        assert_eq!(mesh.count_quads_for_direction(FaceDirection::PosX), 2);
        assert_eq!(mesh.count_quads_for_direction(FaceDirection::NegX), 2);
        let materials: Vec<u8> = mesh
            .quads
            .iter()
            .filter(|q| q.direction == FaceDirection::PosY)
            .map(|q| q.material)
            .collect();
        assert!(materials.contains(&1) && materials.contains(&2));
    }

    #[test]
    fn test_flat_floor_merges_to_one_top_quad() {
        let n = 8;
        let mut volume = VoxelVolume::empty([n, n, n]).unwrap();
        for z in 0..n {
            for x in 0..n {
                volume.set(x, 0, z, 3);
            }
        }
        let mesh = extract_surface(&volume, [0.0; 3]);
        assert_eq!(mesh.count_quads_for_direction(FaceDirection::PosY), 1);
        assert_eq!(mesh.quad_count(), 6);
    }

    #[test]
    fn test_l_shape_needs_two_top_quads() {
        let mut volume = VoxelVolume::empty([8, 1, 8]).unwrap();
        for x in 0..8 {
            volume.set(x, 0, 0, 1);
        }
        for z in 1..8 {
            volume.set(0, 0, z, 1);
        }
        let mesh = extract_surface(&volume, [0.0; 3]);
        assert_eq!(mesh.count_quads_for_direction(FaceDirection::PosY), 2);
    }

    #[test]
    fn test_checkerboard_does_not_merge() {
        let n = 4;
        let mut volume = VoxelVolume::empty([n, 1, n]).unwrap();
        for z in 0..n {
            for x in 0..n {
                volume.set(x, 0, z, if (x + z) % 2 == 0 { 1 } else { 2 });
            }
        }
        let mesh = extract_surface(&volume, [0.0; 3]);
        assert_eq!(mesh.count_quads_for_direction(FaceDirection::PosY), n * n);
    }

    #[test]
    fn test_translation_applied() {
        let mesh = extract_surface(&solid(2, 1), [32.0, 0.0, -16.0]);
        let geom = &mesh.geometry;
        let (mut lo, mut hi) = (Vec3::splat(f32::MAX), Vec3::splat(f32::MIN));
        for i in 0..geom.vertex_count() {
            lo = lo.min(geom.position(i));
            hi = hi.max(geom.position(i));
        }
        assert_eq!(lo, Vec3::new(32.0, 0.0, -16.0));
        assert_eq!(hi, Vec3::new(34.0, 2.0, -14.0));
    }
}
