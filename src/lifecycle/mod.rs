//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     Load config → Validate → Initialize stores → Spawn janitor → Serve
//!
//! Shutdown:
//!     Signal received → Stop accepting → Drain background tasks → Exit
//! ```
//!
//! # Design Decisions
//! - Background work is tracked, never fire-and-forget
//! - A panic in a background task is logged and contained
//! - Shutdown waits for the janitor and in-flight mail dispatch

pub mod background;
pub mod shutdown;

pub use background::Background;
pub use shutdown::Shutdown;
