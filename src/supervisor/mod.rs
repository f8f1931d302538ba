//! Lifecycle supervision for an external multi-port test server.
//!
//! The supervisor starts a server family (or attaches to one that is already
//! running), confirms it is healthy on every configured port, records its
//! identity on disk so later invocations can reuse or clean it up, and tears
//! it down deterministically. The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
