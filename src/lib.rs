//! Harbourmaster: lifecycle supervision for multi-port test servers.
//!
//! This crate starts an external server process that listens on several
//! ports, confirms it is healthy, records what it started so that later
//! invocations can reuse or clean it up, and stops it deterministically.
//!
//! # Architecture
//!
//! Harbourmaster follows hexagonal architecture principles:
//!
//! - **Domain**: Pure value types and persisted-state parsing
//! - **Ports**: Abstract trait interfaces for the filesystem, process table,
//!   and port probing
//! - **Adapters**: Concrete implementations of ports (cap-std, tokio, nix,
//!   and in-memory doubles)
//!
//! # Modules
//!
//! - [`supervisor`]: Server family supervision

pub mod supervisor;
