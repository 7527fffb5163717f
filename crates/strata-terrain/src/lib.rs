//! Procedural terrain density fields: simplex heightmaps sampled into dense
//! voxel volumes with height-banded materials.

mod density;
mod volume;

pub use density::{DensityField, DensityFieldGenerator, DensityParams};
pub use volume::{EMPTY, VolumeError, VoxelVolume};
