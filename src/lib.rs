//! Arpguard - Hardened ARP Engine
//!
//! A deterministic ARP/RARP processor with poisoning-resistant caching,
//! per-target flood control, and IPv4 address conflict detection (RFC 5227).
//! Packet processing is a pure function of (state, frame, clock): time enters
//! as an explicit millisecond parameter and randomness as a seeded stream, so
//! identical inputs always produce byte-identical outputs. All I/O lives at
//! the edges (`capture`, the CLI).

pub mod capture;
pub mod config;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod telemetry;

pub use error::{Error, Result};
