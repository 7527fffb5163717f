//! Messages exchanged with pool workers.

use serde::{Deserialize, Serialize};
use strata_net::GenerationMeta;

use crate::tile::TileKey;

/// Everything a worker needs to fetch one tile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationJob {
    pub tile: TileKey,
    pub size: u32,
    pub downscale: f64,
    pub height_factor: u32,
    pub retry_bound: u32,
    pub material_count: u8,
    /// World-space origin sent to the service.
    pub position: Vec<i32>,
    pub endpoint: String,
}

/// Result of one job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum JobOutcome {
    Success {
        meta: GenerationMeta,
        payload: Vec<u8>,
    },
    Failure {
        error: String,
    },
}

/// The message a worker hands to the completion handler.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobCompletion {
    pub tile: TileKey,
    pub position: Vec<i32>,
    pub outcome: JobOutcome,
}

impl JobCompletion {
    pub fn success(job: &GenerationJob, meta: GenerationMeta, payload: Vec<u8>) -> Self {
        Self {
            tile: job.tile,
            position: job.position.clone(),
            outcome: JobOutcome::Success { meta, payload },
        }
    }

    pub fn failure(job: &GenerationJob, error: impl ToString) -> Self {
        Self {
            tile: job.tile,
            position: job.position.clone(),
            outcome: JobOutcome::Failure {
                error: error.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, JobOutcome::Success { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> GenerationJob {
        GenerationJob {
            tile: TileKey::new(1, 0, -1),
            size: 16,
            downscale: 80.0,
            height_factor: 48,
            retry_bound: 5,
            material_count: 7,
            position: vec![16, 0, -16],
            endpoint: "http://127.0.0.1:8080".to_string(),
        }
    }

    #[test]
    fn test_job_json_roundtrip() {
        let job = job();
        let json = serde_json::to_string(&job).unwrap();
        let back: GenerationJob = serde_json::from_str(&json).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn test_failure_carries_tile_and_position() {
        let completion = JobCompletion::failure(&job(), "connection refused");
        assert!(!completion.is_success());
        assert_eq!(completion.tile, TileKey::new(1, 0, -1));
        assert_eq!(completion.position, vec![16, 0, -16]);
        assert_eq!(
            completion.outcome,
            JobOutcome::Failure {
                error: "connection refused".to_string()
            }
        );
    }
}
