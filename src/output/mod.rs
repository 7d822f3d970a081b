//! Output module
//!
//! Pushes session snapshots to consumers:
//! - Server-Sent Events (HTTP)

pub mod sse;
