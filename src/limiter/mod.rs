//! Admission control subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → middleware.rs (key by source IP, consult registry)
//!     → registry.rs (token bucket per client, one mutex)
//!
//! Background:
//!     janitor task sweeps the registry and evicts idle clients
//! ```

pub mod middleware;
pub mod registry;

pub use middleware::{admission_middleware, AdmissionState};
pub use registry::ClientRegistry;
