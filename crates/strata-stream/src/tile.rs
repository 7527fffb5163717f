//! Tile identity and lifecycle state.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Integer grid coordinate of a tile. `y` is the vertical layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileKey {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl TileKey {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Whether the tile lies within `radius` tiles of `(x, z)` on both
    /// horizontal axes.
    pub fn in_bounds(&self, radius: i32, x: i32, z: i32) -> bool {
        (self.x - x).abs() <= radius && (self.z - z).abs() <= radius
    }

    /// World-space origin of the tile for an edge length of `size` voxels.
    pub fn world_origin(&self, size: u32) -> [i32; 3] {
        let size = size as i32;
        [self.x * size, self.y * size, self.z * size]
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.x, self.y, self.z)
    }
}

/// A tile known to the world.
///
/// `generating` and `generated` are never both set. `stale` marks an
/// in-flight tile whose result must be discarded.
#[derive(Clone, Debug, PartialEq)]
pub struct Tile {
    pub key: TileKey,
    pub generating: bool,
    pub generated: bool,
    pub stale: bool,
    /// Whether the sink currently holds a mesh for this tile.
    pub has_mesh: bool,
    pub num_blocks: u64,
    pub gen_started: Option<Instant>,
    pub gen_time: Option<Duration>,
}

impl Tile {
    pub fn new(key: TileKey) -> Self {
        Self {
            key,
            generating: false,
            generated: false,
            stale: false,
            has_mesh: false,
            num_blocks: 0,
            gen_started: None,
            gen_time: None,
        }
    }

    /// Neither generated nor in flight.
    pub fn needs_generation(&self) -> bool {
        !self.generated && !self.generating
    }
}
