//! Dense voxel volume storing one material id per cell.

/// Material id of an empty cell.
pub const EMPTY: u8 = 0;

/// Errors raised when building a [`VoxelVolume`] from raw parts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VolumeError {
    /// One of the dimensions is zero.
    #[error("volume dimensions must be non-zero, got {0:?}")]
    ZeroDimension([usize; 3]),
    /// The data length does not match `X * Y * Z`.
    #[error("volume data has {actual} cells, dimensions {dims:?} require {expected}")]
    LengthMismatch {
        dims: [usize; 3],
        expected: usize,
        actual: usize,
    },
}

/// A dense `X * Y * Z` grid of material ids where `y` is the vertical axis.
///
/// Cell `(x, y, z)` lives at index `x + y * X + z * X * Y`. Id [`EMPTY`] marks
/// air; any other value is a solid material.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoxelVolume {
    dims: [usize; 3],
    data: Vec<u8>,
}

impl VoxelVolume {
    /// An all-empty volume.
    pub fn empty(dims: [usize; 3]) -> Result<Self, VolumeError> {
        Self::from_raw(dims, vec![EMPTY; dims.iter().product()])
    }

    /// A volume with every cell set to `material`.
    pub fn filled(dims: [usize; 3], material: u8) -> Result<Self, VolumeError> {
        Self::from_raw(dims, vec![material; dims.iter().product()])
    }

    /// Wrap raw cell data, checking it against the dimensions.
    pub fn from_raw(dims: [usize; 3], data: Vec<u8>) -> Result<Self, VolumeError> {
        if dims.contains(&0) {
            return Err(VolumeError::ZeroDimension(dims));
        }
        let expected = dims.iter().product();
        if data.len() != expected {
            return Err(VolumeError::LengthMismatch {
                dims,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { dims, data })
    }

    /// Dimensions as `[X, Y, Z]`.
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Flat index of `(x, y, z)`.
    #[inline]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        x + y * self.dims[0] + z * self.dims[0] * self.dims[1]
    }

    /// Material at `(x, y, z)`. Panics if out of bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> u8 {
        self.data[self.index(x, y, z)]
    }

    /// Material at a signed position, or [`EMPTY`] outside the volume.
    pub fn get_or_empty(&self, pos: [i64; 3]) -> u8 {
        let in_bounds = pos
            .iter()
            .zip(self.dims.iter())
            .all(|(&p, &d)| p >= 0 && (p as usize) < d);
        if in_bounds {
            self.get(pos[0] as usize, pos[1] as usize, pos[2] as usize)
        } else {
            EMPTY
        }
    }

    /// Set the material at `(x, y, z)`. Panics if out of bounds.
    pub fn set(&mut self, x: usize, y: usize, z: usize, material: u8) {
        let idx = self.index(x, y, z);
        self.data[idx] = material;
    }

    /// Raw cell data in index order.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Number of non-empty cells.
    pub fn solid_count(&self) -> usize {
        self.data.iter().filter(|&&m| m != EMPTY).count()
    }
}
