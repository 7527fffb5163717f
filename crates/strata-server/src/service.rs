//! Stateless generation pipeline: density field, surface extraction, encoding.

use std::time::Instant;

use strata_mesh::{GeometryBuffer, extract_surface};
use strata_net::{CodecError, GenerationMeta, GenerationRequest, GenerationResponse, RequestError, codec};
use strata_terrain::DensityFieldGenerator;

/// Errors a generation can fail with.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The request did not validate.
    #[error("invalid request: {0}")]
    Request(#[from] RequestError),
    /// The mesh could not be encoded.
    #[error("failed to encode tile: {0}")]
    Codec(#[from] CodecError),
}

/// Generates tiles on demand. Holds only its immutable noise source, so one
/// instance can serve any number of threads.
pub struct GenerationService {
    generator: DensityFieldGenerator,
}

impl GenerationService {
    /// Create a service whose terrain is seeded with `seed`.
    pub fn new(seed: u32) -> Self {
        Self {
            generator: DensityFieldGenerator::new(seed),
        }
    }

    /// The terrain seed.
    pub fn seed(&self) -> u32 {
        self.generator.seed()
    }

    /// Parse a query string and generate the tile it describes.
    pub fn handle_query(&self, query: &str) -> Result<GenerationResponse, ServiceError> {
        let request = GenerationRequest::from_query(query)?;
        self.generate(&request)
    }

    /// Generate one tile.
    ///
    /// Tiles without solid voxels skip meshing and return an encoded empty
    /// geometry buffer.
    pub fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, ServiceError> {
        request.validate()?;
        let start = Instant::now();

        let params = request.density_params();
        let field = self.generator.generate(&params);

        let geometry = match &field.volume {
            Some(volume) if !field.is_empty() => {
                let translation = [
                    params.x as f32,
                    params.y.unwrap_or(0) as f32,
                    params.z as f32,
                ];
                extract_surface(volume, translation).geometry
            }
            _ => GeometryBuffer::new(),
        };
        let payload = codec::encode(&geometry)?;

        let meta = GenerationMeta {
            block_count: field.block_count,
            max_height: field.max_height,
            payload_bytes: payload.len(),
            gen_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        };
        tracing::debug!(
            position = ?request.position,
            blocks = meta.block_count,
            bytes = meta.payload_bytes,
            ms = meta.gen_time_ms,
            "generated tile"
        );

        Ok(GenerationResponse { meta, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(position: Vec<i32>) -> GenerationRequest {
        GenerationRequest::new(8, position, 40.0, 24, 5).unwrap()
    }

    #[test]
    fn test_generate_ground_tile() {
        let service = GenerationService::new(0);
        let response = service.generate(&request(vec![0, 0])).unwrap();
        assert!(response.meta.block_count > 0);
        assert_eq!(response.meta.payload_bytes, response.payload.len());

        let geometry = codec::decode(&response.payload).unwrap();
        assert!(!geometry.is_empty());
        assert_eq!(geometry.indices.len() % 6, 0);
        assert_eq!(geometry.vertex_count() * 2, geometry.texcoords.len());
        assert_eq!(geometry.materials.len(), geometry.vertex_count());
        assert!(geometry.materials.iter().all(|&m| (1..=5).contains(&m)));
    }

    #[test]
    fn test_tile_above_terrain_is_empty() {
        let service = GenerationService::new(0);
        let response = service.generate(&request(vec![0, 64, 0])).unwrap();
        assert_eq!(response.meta.block_count, 0);
        let geometry = codec::decode(&response.payload).unwrap();
        assert!(geometry.is_empty());
        assert!(geometry.positions.is_empty());
    }

    #[test]
    fn test_geometry_translated_to_world_position() {
        let service = GenerationService::new(0);
        let response = service.generate(&request(vec![64, -32])).unwrap();
        let geometry = codec::decode(&response.payload).unwrap();
        for i in 0..geometry.vertex_count() {
            let p = geometry.position(i);
            assert!((64.0..=72.0).contains(&p.x), "x out of tile: {p}");
            assert!((-32.0..=-24.0).contains(&p.z), "z out of tile: {p}");
        }
    }

    #[test]
    fn test_same_seed_same_payload() {
        let a = GenerationService::new(9);
        let b = GenerationService::new(9);
        let req = request(vec![16, 0, 16]);
        assert_eq!(
            a.generate(&req).unwrap().payload,
            b.generate(&req).unwrap().payload
        );
    }

    #[test]
    fn test_position_beyond_16_bits_is_codec_error() {
        let service = GenerationService::new(0);
        let err = service.generate(&request(vec![40000, 0])).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Codec(CodecError::ValueOutOfRange { array: "vertices", .. })
        ));
    }

    #[test]
    fn test_invalid_query_is_request_error() {
        let service = GenerationService::new(0);
        let err = service
            .handle_query("size=4&xPos=a&zPos=0&downscale=1&heightFactor=1&numTex=1")
            .unwrap_err();
        assert!(matches!(err, ServiceError::Request(RequestError::Invalid { name: "xPos", .. })));
    }
}
