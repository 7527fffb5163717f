//! Heightmap-driven density fields.
//!
//! A 2-D simplex heightmap is sampled over a tile footprint and extruded into
//! an `N * N * N` voxel volume whose solid cells are banded by altitude into
//! material ids.

use noise::{NoiseFn, Simplex};

use crate::volume::{EMPTY, VoxelVolume};

/// Parameters of one density-field request.
#[derive(Clone, Debug, PartialEq)]
pub struct DensityParams {
    /// World-space x of the tile origin.
    pub x: i32,
    /// World-space y of the tile origin. `None` generates a ground slab at
    /// altitude zero and skips bounding-box rejection.
    pub y: Option<i32>,
    /// World-space z of the tile origin.
    pub z: i32,
    /// Edge length of the cube in voxels.
    pub size: usize,
    /// Horizontal noise downscale. Larger values give smoother terrain.
    pub downscale: f64,
    /// Height of a column where the noise reaches its maximum.
    pub height_scale: f64,
    /// Number of altitude bands mapped to materials `1..=material_count`.
    pub material_count: u8,
}

impl Default for DensityParams {
    fn default() -> Self {
        Self {
            x: 0,
            y: None,
            z: 0,
            size: 16,
            downscale: 1000.0,
            height_scale: 50.0,
            material_count: 7,
        }
    }
}

/// The result of sampling one tile.
#[derive(Clone, Debug)]
pub struct DensityField {
    /// The voxel grid, absent when the tile was rejected by its bounding box.
    pub volume: Option<VoxelVolume>,
    /// Number of solid voxels.
    pub block_count: u64,
    /// Highest column height over the footprint.
    pub max_height: f64,
    /// Lowest column height over the footprint.
    pub min_height: f64,
}

impl DensityField {
    /// Whether the tile contains no solid voxels.
    pub fn is_empty(&self) -> bool {
        self.block_count == 0
    }
}

/// Samples density fields from a seeded simplex noise source.
///
/// The generator owns its noise function, so two generators built with the
/// same seed produce identical fields.
pub struct DensityFieldGenerator {
    noise: Simplex,
    seed: u32,
}

impl DensityFieldGenerator {
    /// Create a generator with the given noise seed.
    pub fn new(seed: u32) -> Self {
        Self {
            noise: Simplex::new(seed),
            seed,
        }
    }

    /// The noise seed.
    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Column heights over the footprint, indexed `i + k * size`.
    ///
    /// Each height is the noise value clamped to `[-1, 1]`, remapped to
    /// `[0, 1]` and scaled by `height_scale`.
    pub fn column_heights(&self, params: &DensityParams) -> Vec<f64> {
        let size = params.size;
        let mut heights = Vec::with_capacity(size * size);
        for k in 0..size {
            let nz = (k as f64 + params.z as f64) / params.downscale;
            for i in 0..size {
                let nx = (i as f64 + params.x as f64) / params.downscale;
                let n = self.noise.get([nx, nz]).clamp(-1.0, 1.0);
                heights.push((n + 1.0) / 2.0 * params.height_scale);
            }
        }
        heights
    }

    /// Build the density field for one tile.
    pub fn generate(&self, params: &DensityParams) -> DensityField {
        let size = params.size;
        let heights = self.column_heights(params);

        let (min_height, max_height) = heights
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &h| {
                (lo.min(h), hi.max(h))
            });

        let base = params.y.unwrap_or(0);
        if let Some(y) = params.y {
            let top = y as f64 + size as f64;
            if max_height < y as f64 || min_height > top {
                return DensityField {
                    volume: None,
                    block_count: 0,
                    max_height,
                    min_height,
                };
            }
        }

        let bands = params.material_count.max(1);
        let band_height = params.height_scale / bands as f64;

        let mut data = vec![EMPTY; size * size * size];
        let mut block_count = 0u64;
        for k in 0..size {
            for j in 0..size {
                let altitude = (j as i64 + base as i64) as f64;
                let material = material_for_altitude(altitude, band_height, bands);
                for i in 0..size {
                    if altitude <= heights[i + k * size] {
                        data[i + j * size + k * size * size] = material;
                        block_count += 1;
                    }
                }
            }
        }

        // Dimensions and data length are consistent by construction.
        let volume = VoxelVolume::from_raw([size, size, size], data).ok();

        DensityField {
            volume,
            block_count,
            max_height,
            min_height,
        }
    }
}

/// Material id for a solid cell at `altitude`: band index plus one, with the
/// top band absorbing everything at or above the height scale.
fn material_for_altitude(altitude: f64, band_height: f64, bands: u8) -> u8 {
    let band = if band_height > 0.0 {
        (altitude / band_height).floor().clamp(0.0, (bands - 1) as f64) as u8
    } else {
        bands - 1
    };
    band + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_params() -> DensityParams {
        DensityParams {
            x: 0,
            y: None,
            z: 0,
            size: 4,
            downscale: 1000.0,
            height_scale: 50.0,
            material_count: 7,
        }
    }

    fn variance(values: &[f64]) -> f64 {
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
    }

    #[test]
    fn test_block_count_matches_column_heights() {
        let generator = DensityFieldGenerator::new(0);
        let params = reference_params();
        let heights = generator.column_heights(&params);
        assert_eq!(heights.len(), 16);

        let expected: u64 = heights
            .iter()
            .map(|h| (h.floor() as i64 + 1).clamp(0, params.size as i64) as u64)
            .sum();
        let field = generator.generate(&params);
        assert_eq!(field.block_count, expected);
        let volume = field.volume.expect("2-D request always builds a volume");
        assert_eq!(volume.solid_count() as u64, expected);
    }

    #[test]
    fn test_heights_stay_within_scale() {
        let generator = DensityFieldGenerator::new(7);
        let params = DensityParams {
            x: -300,
            z: 1200,
            size: 16,
            downscale: 3.0,
            ..reference_params()
        };
        for h in generator.column_heights(&params) {
            assert!((0.0..=50.0).contains(&h), "height out of range: {h}");
        }
    }

    #[test]
    fn test_larger_downscale_reduces_variance() {
        let generator = DensityFieldGenerator::new(0);
        for (x, z) in [(0, 0), (37, -91)] {
            let near = DensityParams {
                x,
                z,
                ..reference_params()
            };
            let far = DensityParams {
                downscale: near.downscale * 2.0,
                ..near.clone()
            };
            let v_near = variance(&generator.column_heights(&near));
            let v_far = variance(&generator.column_heights(&far));
            assert!(
                v_far < v_near,
                "doubling downscale should smooth ({x}, {z}): {v_far} vs {v_near}"
            );
        }
    }

    #[test]
    fn test_determinism_same_seed() {
        let a = DensityFieldGenerator::new(42);
        let b = DensityFieldGenerator::new(42);
        let params = DensityParams {
            x: 64,
            z: -32,
            downscale: 20.0,
            ..reference_params()
        };
        assert_eq!(a.column_heights(&params), b.column_heights(&params));
        assert_eq!(a.generate(&params).volume, b.generate(&params).volume);
    }

    #[test]
    fn test_slab_above_terrain_is_rejected() {
        let generator = DensityFieldGenerator::new(0);
        let params = DensityParams {
            y: Some(64),
            ..reference_params()
        };
        let field = generator.generate(&params);
        assert!(field.is_empty());
        assert!(field.volume.is_none());
        assert!(field.max_height < 64.0, "max height {}", field.max_height);
    }

    #[test]
    fn test_buried_slab_is_rejected() {
        let generator = DensityFieldGenerator::new(0);
        let params = DensityParams {
            y: Some(0),
            size: 4,
            height_scale: 400.0,
            ..reference_params()
        };
        let field = generator.generate(&params);
        if field.min_height > 4.0 {
            assert!(field.volume.is_none());
            assert_eq!(field.block_count, 0);
        } else {
            assert!(field.volume.is_some());
        }
    }

    #[test]
    fn test_materials_banded_by_altitude() {
        let generator = DensityFieldGenerator::new(3);
        let params = DensityParams {
            size: 8,
            height_scale: 8.0,
            material_count: 4,
            downscale: 1.0e9,
            ..reference_params()
        };
        let field = generator.generate(&params);
        let volume = field.volume.unwrap();
        // Band height is 2, so altitude 0..2 -> 1, 2..4 -> 2, 4..6 -> 3, 6.. -> 4.
        for j in 0..8 {
            let m = volume.get(0, j, 0);
            if m != EMPTY {
                assert_eq!(m as usize, (j / 2).min(3) + 1, "altitude {j}");
            }
        }
    }

    #[test]
    fn test_material_for_altitude_clamps_top_band() {
        assert_eq!(material_for_altitude(0.0, 10.0, 5), 1);
        assert_eq!(material_for_altitude(49.0, 10.0, 5), 5);
        assert_eq!(material_for_altitude(500.0, 10.0, 5), 5);
        assert_eq!(material_for_altitude(-3.0, 10.0, 5), 1);
    }
}
