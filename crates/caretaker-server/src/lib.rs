//! caretaker HTTP control plane.
//!
//! Wires the core and runtime crates into a single long-running supervisor:
//! session-authenticated routing, per-user tenant warmup, reverse proxying
//! with activity tracking, the idle reaper, and the admin/ingest surface.

pub mod config;
pub mod cookies;
pub mod error;
pub mod proxy;
pub mod reaper;
pub mod routes;
pub mod state;
