//! Where decoded tile meshes go.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use strata_mesh::GeometryBuffer;

use crate::tile::TileKey;

/// Receives mesh lifecycle events from a [`TileWorld`](crate::TileWorld).
///
/// Calls are made with the world lock held, so implementations must not call
/// back into the world.
pub trait MeshSink: Send + Sync {
    /// A tile finished generating and has a non-empty mesh.
    fn add_mesh(&self, key: TileKey, geometry: GeometryBuffer, material: usize);
    /// A tile left the view and its mesh should be dropped.
    fn remove_mesh(&self, key: TileKey);
    /// Switch an existing mesh to another material variant.
    fn apply_material(&self, key: TileKey, material: usize);
}

#[derive(Debug, Clone, Copy)]
struct MeshEntry {
    triangles: usize,
    material: usize,
}

/// Keeps per-tile mesh statistics and logs every event. Used when no renderer
/// is attached.
#[derive(Default)]
pub struct LoggingSink {
    meshes: Mutex<FxHashMap<TileKey, MeshEntry>>,
}

impl LoggingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.lock().len()
    }

    pub fn triangle_count(&self) -> usize {
        self.meshes.lock().values().map(|entry| entry.triangles).sum()
    }

    /// Material variant currently applied to `key`, if it has a mesh.
    pub fn material(&self, key: TileKey) -> Option<usize> {
        self.meshes.lock().get(&key).map(|entry| entry.material)
    }
}

impl MeshSink for LoggingSink {
    fn add_mesh(&self, key: TileKey, geometry: GeometryBuffer, material: usize) {
        let triangles = geometry.triangle_count();
        tracing::debug!(tile = %key, triangles, material, "mesh added");
        self.meshes.lock().insert(
            key,
            MeshEntry {
                triangles,
                material,
            },
        );
    }

    fn remove_mesh(&self, key: TileKey) {
        if self.meshes.lock().remove(&key).is_some() {
            tracing::debug!(tile = %key, "mesh removed");
        }
    }

    fn apply_material(&self, key: TileKey, material: usize) {
        if let Some(entry) = self.meshes.lock().get_mut(&key) {
            entry.material = material;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> GeometryBuffer {
        GeometryBuffer {
            positions: vec![0.0; 12],
            normals: vec![0.0; 12],
            texcoords: vec![0.0; 8],
            materials: vec![1; 4],
            indices: vec![0, 1, 2, 1, 3, 2],
        }
    }

    #[test]
    fn test_logging_sink_tracks_meshes() {
        let sink = LoggingSink::new();
        let key = TileKey::new(0, 0, 0);
        sink.add_mesh(key, quad(), 0);
        sink.add_mesh(TileKey::new(1, 0, 0), quad(), 0);
        assert_eq!(sink.mesh_count(), 2);
        assert_eq!(sink.triangle_count(), 4);

        sink.apply_material(key, 1);
        assert_eq!(sink.material(key), Some(1));

        sink.remove_mesh(key);
        assert_eq!(sink.mesh_count(), 1);
        assert_eq!(sink.material(key), None);
    }

    #[test]
    fn test_apply_material_ignores_unknown_tiles() {
        let sink = LoggingSink::new();
        sink.apply_material(TileKey::new(5, 0, 5), 3);
        assert_eq!(sink.mesh_count(), 0);
    }
}
