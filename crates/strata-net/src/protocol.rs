//! Generation request/response protocol.
//!
//! Requests travel as URL query strings (`size`, `xPos`, `yPos`, `zPos`,
//! `downscale`, `heightFactor`, `numTex`). Responses carry the encoded tile as
//! the body and the generation metadata as `X-Gen-Data-*` headers.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use strata_terrain::DensityParams;

/// Path suffix the generation endpoint answers on.
pub const GENERATE_PATH: &str = "/generate";

/// Largest accepted tile edge length.
pub const MAX_TILE_SIZE: u32 = 256;

/// Response header names.
pub mod header {
    pub const BLOCK_COUNT: &str = "X-Gen-Data-Blockcount";
    pub const MAX_HEIGHT: &str = "X-Gen-Data-Max-Height";
    pub const PAYLOAD_BYTES: &str = "X-Gen-Data-Payload-Bytes";
    pub const TIME_RUNNING_MS: &str = "X-Gen-Data-Time-Running-MS";

    /// All metadata headers, for `Access-Control-Expose-Headers`.
    pub const ALL: [&str; 4] = [BLOCK_COUNT, MAX_HEIGHT, PAYLOAD_BYTES, TIME_RUNNING_MS];
}

/// Reasons a generation request is rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RequestError {
    /// A required parameter is absent.
    #[error("missing parameter `{0}`")]
    Missing(&'static str),

    /// A parameter is not a valid number.
    #[error("parameter `{name}` is not a valid number: {value:?}")]
    Invalid {
        /// Parameter name.
        name: &'static str,
        /// The raw value.
        value: String,
    },

    /// A parameter parsed but lies outside its accepted range.
    #[error("parameter `{name}` = {value} out of range: {expected}")]
    OutOfRange {
        /// Parameter name.
        name: &'static str,
        /// The parsed value.
        value: String,
        /// Human-readable accepted range.
        expected: &'static str,
    },

    /// The position has neither 2 nor 3 components.
    #[error("position must have 2 or 3 components, got {0}")]
    PositionArity(usize),
}

/// A validated generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Tile edge length in voxels.
    pub size: u32,
    /// World-space origin, `[x, z]` or `[x, y, z]`.
    pub position: Vec<i32>,
    /// Horizontal noise downscale.
    pub downscale: f64,
    /// Height of the tallest possible column.
    pub height_factor: u32,
    /// Number of material bands.
    pub material_count: u8,
}

fn parse_param<T: std::str::FromStr>(name: &'static str, raw: &str) -> Result<T, RequestError> {
    raw.trim().parse().map_err(|_| RequestError::Invalid {
        name,
        value: raw.to_string(),
    })
}

impl GenerationRequest {
    /// Build and validate a request from its parts.
    pub fn new(
        size: u32,
        position: Vec<i32>,
        downscale: f64,
        height_factor: u32,
        material_count: u8,
    ) -> Result<Self, RequestError> {
        let request = Self {
            size,
            position,
            downscale,
            height_factor,
            material_count,
        };
        request.validate()?;
        Ok(request)
    }

    /// Check every field against its accepted range.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.size == 0 || self.size > MAX_TILE_SIZE {
            return Err(RequestError::OutOfRange {
                name: "size",
                value: self.size.to_string(),
                expected: "1..=256",
            });
        }
        if !(self.downscale.is_finite() && self.downscale > 0.0) {
            return Err(RequestError::OutOfRange {
                name: "downscale",
                value: self.downscale.to_string(),
                expected: "a finite number > 0",
            });
        }
        if self.height_factor == 0 {
            return Err(RequestError::OutOfRange {
                name: "heightFactor",
                value: "0".to_string(),
                expected: "> 0",
            });
        }
        if self.material_count == 0 {
            return Err(RequestError::OutOfRange {
                name: "numTex",
                value: "0".to_string(),
                expected: "1..=255",
            });
        }
        if !matches!(self.position.len(), 2 | 3) {
            return Err(RequestError::PositionArity(self.position.len()));
        }
        Ok(())
    }

    /// Parse a query string such as `size=16&xPos=0&zPos=32&downscale=80&heightFactor=48&numTex=7`.
    ///
    /// `yPos` is optional; without it the request is two-dimensional.
    pub fn from_query(query: &str) -> Result<Self, RequestError> {
        let query = query.strip_prefix('?').unwrap_or(query);
        let lookup = |name: &str| {
            query
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value)
        };
        let required = |name: &'static str| lookup(name).ok_or(RequestError::Missing(name));

        let size = parse_param("size", required("size")?)?;
        let x = parse_param("xPos", required("xPos")?)?;
        let z = parse_param("zPos", required("zPos")?)?;
        let position = match lookup("yPos") {
            Some(raw) => vec![x, parse_param("yPos", raw)?, z],
            None => vec![x, z],
        };
        let downscale = parse_param("downscale", required("downscale")?)?;
        let height_factor = parse_param("heightFactor", required("heightFactor")?)?;
        let material_count = parse_param("numTex", required("numTex")?)?;

        Self::new(size, position, downscale, height_factor, material_count)
    }

    /// Render the request as a query string accepted by [`Self::from_query`].
    pub fn to_query(&self) -> String {
        let mut query = format!("size={}&xPos={}", self.size, self.x());
        if let Some(y) = self.y() {
            let _ = write!(query, "&yPos={y}");
        }
        let _ = write!(
            query,
            "&zPos={}&downscale={}&heightFactor={}&numTex={}",
            self.z(),
            self.downscale,
            self.height_factor,
            self.material_count
        );
        query
    }

    /// Origin x.
    pub fn x(&self) -> i32 {
        self.position.first().copied().unwrap_or(0)
    }

    /// Origin y, present only for three-dimensional requests.
    pub fn y(&self) -> Option<i32> {
        (self.position.len() == 3).then(|| self.position[1])
    }

    /// Origin z.
    pub fn z(&self) -> i32 {
        self.position.last().copied().unwrap_or(0)
    }

    /// Density parameters for this request.
    pub fn density_params(&self) -> DensityParams {
        DensityParams {
            x: self.x(),
            y: self.y(),
            z: self.z(),
            size: self.size as usize,
            downscale: self.downscale,
            height_scale: self.height_factor as f64,
            material_count: self.material_count,
        }
    }
}

/// Metadata attached to every generation response.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationMeta {
    /// Number of solid voxels in the tile.
    pub block_count: u64,
    /// Highest column height over the footprint.
    pub max_height: f64,
    /// Length of the encoded payload in bytes.
    pub payload_bytes: usize,
    /// Wall-clock generation time in milliseconds.
    pub gen_time_ms: f64,
}

/// A metadata header that is missing or malformed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MetaError {
    /// The header is absent.
    #[error("missing response header `{0}`")]
    Missing(&'static str),
    /// The header value does not parse.
    #[error("response header `{name}` has invalid value {value:?}")]
    Invalid {
        /// Header name.
        name: &'static str,
        /// The raw value.
        value: String,
    },
}

impl GenerationMeta {
    /// Header name/value pairs in wire order.
    pub fn to_headers(&self) -> [(&'static str, String); 4] {
        [
            (header::BLOCK_COUNT, self.block_count.to_string()),
            (header::MAX_HEIGHT, self.max_height.to_string()),
            (header::PAYLOAD_BYTES, self.payload_bytes.to_string()),
            (header::TIME_RUNNING_MS, self.gen_time_ms.to_string()),
        ]
    }

    /// Rebuild metadata from response headers via `get(name)`.
    pub fn from_headers(get: impl Fn(&str) -> Option<String>) -> Result<Self, MetaError> {
        fn field<T: std::str::FromStr>(
            get: &impl Fn(&str) -> Option<String>,
            name: &'static str,
        ) -> Result<T, MetaError> {
            let raw = get(name).ok_or(MetaError::Missing(name))?;
            raw.trim()
                .parse()
                .map_err(|_| MetaError::Invalid { name, value: raw })
        }

        Ok(Self {
            block_count: field(&get, header::BLOCK_COUNT)?,
            max_height: field(&get, header::MAX_HEIGHT)?,
            payload_bytes: field(&get, header::PAYLOAD_BYTES)?,
            gen_time_ms: field(&get, header::TIME_RUNNING_MS)?,
        })
    }
}

/// A completed generation: metadata plus the encoded tile.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResponse {
    pub meta: GenerationMeta,
    pub payload: Vec<u8>,
}
