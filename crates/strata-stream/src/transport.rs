//! How generation requests reach a [`GenerationService`].

use std::io::Read;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use strata_net::{GENERATE_PATH, GenerationMeta, GenerationRequest, GenerationResponse, MetaError};
use strata_server::{GenerationService, ServiceError};

use crate::job::{GenerationJob, JobCompletion};

/// Errors raised while fetching a tile.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The endpoint answered with a non-success status.
    #[error("endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },
    /// The request never completed (connection refused, timeout, ...).
    #[error("request failed: {0}")]
    Http(String),
    /// Reading the response body failed.
    #[error("failed to read response body: {0}")]
    Io(#[from] std::io::Error),
    /// Metadata headers are missing or malformed.
    #[error(transparent)]
    Meta(#[from] MetaError),
    /// The in-process service rejected or failed the request.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl TransportError {
    /// Whether another attempt could succeed. Rejected requests are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => !(400..500).contains(status),
            Self::Service(ServiceError::Request(_)) => false,
            _ => true,
        }
    }
}

/// Sends one generation request to an endpoint.
pub trait TileTransport: Send + Sync {
    fn fetch(
        &self,
        endpoint: &str,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, TransportError>;
}

/// Fetches tiles from remote generation servers over HTTP.
pub struct HttpTransport {
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl TileTransport for HttpTransport {
    fn fetch(
        &self,
        endpoint: &str,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, TransportError> {
        let url = format!(
            "{}{}?{}",
            endpoint.trim_end_matches('/'),
            GENERATE_PATH,
            request.to_query()
        );
        let response = match self.agent.get(&url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                return Err(TransportError::Status {
                    status,
                    body: response.into_string().unwrap_or_default(),
                });
            }
            Err(e) => return Err(TransportError::Http(e.to_string())),
        };

        let meta = GenerationMeta::from_headers(|name| response.header(name).map(str::to_string))?;
        let mut payload = Vec::with_capacity(meta.payload_bytes);
        response.into_reader().read_to_end(&mut payload)?;
        Ok(GenerationResponse { meta, payload })
    }
}

/// Generates tiles in-process, for running without a server.
pub struct LocalTransport {
    service: Arc<GenerationService>,
}

impl LocalTransport {
    pub fn new(service: Arc<GenerationService>) -> Self {
        Self { service }
    }
}

impl TileTransport for LocalTransport {
    fn fetch(
        &self,
        _endpoint: &str,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, TransportError> {
        Ok(self.service.generate(request)?)
    }
}

/// Run `job` against `transport`, retrying transient failures up to the job's
/// retry bound with a fixed `delay` between attempts.
pub fn fetch_with_retry(
    transport: &dyn TileTransport,
    job: &GenerationJob,
    delay: Duration,
) -> JobCompletion {
    let request = match GenerationRequest::new(
        job.size,
        job.position.clone(),
        job.downscale,
        job.height_factor,
        job.material_count,
    ) {
        Ok(request) => request,
        Err(e) => return JobCompletion::failure(job, e),
    };

    let attempts = job.retry_bound.max(1);
    let mut attempt = 1;
    loop {
        match transport.fetch(&job.endpoint, &request) {
            Ok(response) => return JobCompletion::success(job, response.meta, response.payload),
            Err(e) if !e.is_retryable() || attempt >= attempts => {
                tracing::warn!(tile = %job.tile, attempt, "giving up on tile: {e}");
                return JobCompletion::failure(job, e);
            }
            Err(e) => {
                tracing::debug!(tile = %job.tile, attempt, "retrying tile after error: {e}");
                attempt += 1;
                thread::sleep(delay);
            }
        }
    }
}
