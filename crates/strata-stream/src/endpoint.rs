//! Round-robin selection over load-balanced generation endpoints.

use std::sync::atomic::{AtomicU64, Ordering};

/// Cycles through `max_endpoints` endpoints sharing one root name.
///
/// Index 0 is the bare root; index `n > 0` is the root with `n - 1` appended,
/// so three endpoints named `gen` are `gen`, `gen0`, `gen1`.
#[derive(Debug)]
pub struct EndpointRing {
    root: String,
    max_endpoints: u64,
    counter: AtomicU64,
}

impl EndpointRing {
    pub fn new(root: impl Into<String>, max_endpoints: u32) -> Self {
        Self {
            root: root.into(),
            max_endpoints: u64::from(max_endpoints.max(1)),
            counter: AtomicU64::new(0),
        }
    }

    /// The endpoint name for slot `index`.
    pub fn endpoint(&self, index: u64) -> String {
        match index % self.max_endpoints {
            0 => self.root.clone(),
            n => format!("{}{}", self.root, n - 1),
        }
    }

    /// The next endpoint in rotation.
    pub fn next_endpoint(&self) -> String {
        self.endpoint(self.counter.fetch_add(1, Ordering::Relaxed))
    }

    pub fn root(&self) -> &str {
        &self.root
    }
}
