//! Client-side tile streaming.
//!
//! [`TileWorld`] keeps the tiles around a moving viewpoint generated: it
//! decides what to load and unload, fans generation requests out over a
//! bounded [`WorkerPool`] and round-robin endpoints, and hands decoded meshes
//! to a [`MeshSink`].

pub mod endpoint;
pub mod job;
pub mod pool;
pub mod sink;
pub mod tile;
pub mod transport;
pub mod world;

pub use endpoint::EndpointRing;
pub use job::{GenerationJob, JobCompletion, JobOutcome};
pub use pool::{PoolError, WorkerHandle, WorkerPool};
pub use sink::{LoggingSink, MeshSink};
pub use tile::{Tile, TileKey};
pub use transport::{HttpTransport, LocalTransport, TileTransport, TransportError, fetch_with_retry};
pub use world::{TileWorld, WorldSettings, WorldStats};
