//! Integration harness for the instrument-control frontend
//!
//! Provides the deterministic loopback backend plus helpers shared by the
//! scenario tests under `tests/`.

pub mod loopback;

use std::sync::Arc;

use instrctl::rm::ResourceManager;

pub use loopback::LoopbackBackend;

/// Install a compact tracing subscriber for test output. Safe to call from
/// every test; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

/// A resource manager over a fresh loopback park with the given resources.
pub fn park(resources: &[&str]) -> (ResourceManager, Arc<LoopbackBackend>) {
    init_tracing();
    let backend = LoopbackBackend::new(resources);
    let rm = ResourceManager::with_backend(backend.clone()).expect("loopback RM opens");
    (rm, backend)
}
