//! Request-gatekeeping and mutation-safety core for a multi-tenant HTTP
//! resource service.
//!
//! For every inbound request the gateway decides whether it may proceed
//! (admission), who is making it (identity), what it may do (authorization),
//! and, for state-changing operations, whether the change can commit without
//! clobbering a concurrent edit (consistency).
//!
//! ```text
//!                ┌────────────────────────────────────────────────────────┐
//!                │                       GATEWARD                         │
//!                │                                                        │
//!  Request ──────┼─▶ admission ──▶ identity ──▶ authz ──▶ handler         │
//!                │   (limiter)     (bearer      (require   │              │
//!                │      │           lookup)      gates)    ▼              │
//!                │      │                             occ::commit         │
//!                │   registry                              │              │
//!                │   + janitor                     conditional write      │
//!                │                                  (store contract)      │
//!                │                                                        │
//!                │  ┌──────────────────────────────────────────────────┐  │
//!                │  │ cross-cutting: config · errors · lifecycle ·     │  │
//!                │  │ validate · mailer dispatch (tracked background)  │  │
//!                │  └──────────────────────────────────────────────────┘  │
//!                └────────────────────────────────────────────────────────┘
//! ```
//!
//! Storage, mail delivery, and templating are external collaborators behind
//! the traits in [`store`] and [`mailer`]; [`store::memory`] ships the
//! in-memory reference used by the demo binary and the test suites.

// Gate subsystems
pub mod authz;
pub mod identity;
pub mod limiter;
pub mod occ;

// Domain model
pub mod account;
pub mod principal;
pub mod token;

// Collaborator contracts
pub mod mailer;
pub mod store;

// Composition
pub mod api;
pub mod pipeline;
pub mod server;

// Cross-cutting concerns
pub mod config;
pub mod errors;
pub mod lifecycle;
pub mod validate;

pub use config::GateConfig;
pub use errors::GateError;
pub use lifecycle::{Background, Shutdown};
pub use server::{Collaborators, GatewayServer};
