//! HTTP front for the generation service.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;
use strata_net::{GENERATE_PATH, header};
use tiny_http::{Header, Method, Request, Response, Server};

use crate::service::{GenerationService, ServiceError};

/// How long a handler thread waits for a request before rechecking shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

type HttpResponse = Response<Cursor<Vec<u8>>>;
type BoxError = Box<dyn std::error::Error + Send + Sync>;

const ALLOW_HEADERS: &str = "Origin, X-Requested-With, Content-Type, Accept";

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind to {address}: {error}")]
    BindError { address: String, error: String },
    #[error("failed to spawn handler thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("invalid response header {0}")]
    InvalidHeader(String),
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    seed: u32,
    uptime_seconds: f64,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Serves `GET <prefix>/generate?<query>` on a fixed set of handler threads.
///
/// The listener is shut down when the server is stopped or dropped.
pub struct GenerationServer {
    address: String,
    port: u16,
    actual_port: Option<u16>,
    handles: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl GenerationServer {
    /// A server that will bind `address:port` once started. Port 0 lets the
    /// OS pick a free port; see [`Self::actual_port`].
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
            actual_port: None,
            handles: Vec::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Bind the listener and start `threads` handler threads.
    pub fn start(
        &mut self,
        service: Arc<GenerationService>,
        threads: usize,
    ) -> Result<(), ServerError> {
        let address = format!("{}:{}", self.address, self.port);
        let server = Server::http(&address).map_err(|e| ServerError::BindError {
            address: address.clone(),
            error: e.to_string(),
        })?;

        let actual_port = server
            .server_addr()
            .to_ip()
            .map(|addr| addr.port())
            .unwrap_or(self.port);
        self.actual_port = Some(actual_port);

        let server = Arc::new(server);
        let started = Instant::now();
        for i in 0..threads.max(1) {
            let server = Arc::clone(&server);
            let service = Arc::clone(&service);
            let shutdown = Arc::clone(&self.shutdown);
            let handle = thread::Builder::new()
                .name(format!("gen-http-{i}"))
                .spawn(move || Self::run_server(&server, &service, &shutdown, started))
                .map_err(ServerError::Spawn)?;
            self.handles.push(handle);
        }

        tracing::info!(
            "Generation server listening on {}:{} with {} handler threads",
            self.address,
            actual_port,
            self.handles.len()
        );
        Ok(())
    }

    /// Stop accepting requests and join the handler threads.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        self.join_handlers();
    }

    /// Block the calling thread until the handler threads exit. Returns the
    /// number of threads that panicked.
    pub fn wait(&mut self) -> usize {
        self.join_handlers()
    }

    fn join_handlers(&mut self) -> usize {
        let mut panicked = 0;
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::error!("generation handler thread panicked");
                panicked += 1;
            }
        }
        panicked
    }

    /// The port the listener is bound to.
    pub fn actual_port(&self) -> u16 {
        self.actual_port.unwrap_or(self.port)
    }

    fn run_server(
        server: &Server,
        service: &GenerationService,
        shutdown: &AtomicBool,
        started: Instant,
    ) {
        while !shutdown.load(Ordering::Acquire) {
            match server.recv_timeout(POLL_INTERVAL) {
                Ok(Some(request)) => {
                    if let Err(e) = Self::handle_request(request, service, started) {
                        tracing::error!("generation server error: {e}");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("failed to receive request: {e}");
                }
            }
        }
    }

    fn handle_request(
        request: Request,
        service: &GenerationService,
        started: Instant,
    ) -> Result<(), BoxError> {
        let url = request.url().to_string();
        let (path, query) = url.split_once('?').unwrap_or((url.as_str(), ""));
        tracing::debug!(method = %request.method(), path, "request");

        let response = match request.method() {
            Method::Options => Response::from_data(Vec::new()).with_status_code(204),
            Method::Get if path.ends_with(GENERATE_PATH) => match service.handle_query(query) {
                Ok(generated) => {
                    let mut response = Response::from_data(generated.payload).with_header(
                        make_header("Content-Type", "application/octet-stream")?,
                    );
                    for (name, value) in generated.meta.to_headers() {
                        response.add_header(make_header(name, &value)?);
                    }
                    response
                }
                Err(err @ ServiceError::Request(_)) => {
                    tracing::warn!("rejected generation request {query:?}: {err}");
                    json_response(&ErrorResponse { error: err.to_string() })?
                        .with_status_code(400)
                }
                Err(err) => {
                    tracing::error!("generation failed for {query:?}: {err}");
                    json_response(&ErrorResponse { error: err.to_string() })?
                        .with_status_code(500)
                }
            },
            Method::Get if path == "/health" => json_response(&HealthResponse {
                status: "ok",
                seed: service.seed(),
                uptime_seconds: started.elapsed().as_secs_f64(),
            })?,
            _ => Response::from_data(b"Not Found".to_vec()).with_status_code(404),
        };

        request.respond(with_cors(response)?)?;
        Ok(())
    }
}

impl Drop for GenerationServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn make_header(name: &str, value: &str) -> Result<Header, ServerError> {
    Header::from_bytes(name.as_bytes(), value.as_bytes())
        .map_err(|()| ServerError::InvalidHeader(format!("{name}: {value}")))
}

fn json_response<T: Serialize>(body: &T) -> Result<HttpResponse, BoxError> {
    let json = serde_json::to_vec(body)?;
    Ok(Response::from_data(json).with_header(make_header("Content-Type", "application/json")?))
}

/// Permissive cross-origin headers so browser clients can read the metadata.
fn with_cors(mut response: HttpResponse) -> Result<HttpResponse, ServerError> {
    response.add_header(make_header("Access-Control-Allow-Origin", "*")?);
    response.add_header(make_header("Access-Control-Allow-Headers", ALLOW_HEADERS)?);
    response.add_header(make_header(
        "Access-Control-Expose-Headers",
        &header::ALL.join(","),
    )?);
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_reports_panicked_handlers() {
        let mut server = GenerationServer::new("127.0.0.1", 0);
        let failing: JoinHandle<()> = thread::spawn(|| panic!("handler failed"));
        server.handles.push(failing);
        server.handles.push(thread::spawn(|| {}));
        assert_eq!(server.wait(), 1);
        assert!(server.handles.is_empty());
        assert_eq!(server.wait(), 0);
    }
}
