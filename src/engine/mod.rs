//! ARP engine
//!
//! The stateful core: resolution caches, flood control, conflict
//! detection, and the dispatcher that ties them together. Everything in
//! this module is deterministic; time and randomness are injected.

mod acd;
mod cache;
mod flood;
mod interface;
mod merge;
mod negative;
mod pending;
mod processor;
mod rarp;
mod rng;
mod validate;

pub use acd::{Acd, AcdEvent, AcdPhase, AcdTick};
pub use cache::{ArpCache, CacheEntry, CacheInsert, EntryKind};
pub use flood::FloodControl;
pub use interface::InterfaceState;
pub use merge::{merge_packet, MergeOutcome, MergeStatus};
pub use negative::NegativeCache;
pub use pending::{PendingQueue, PendingRequest};
pub use processor::{Engine, EngineSettings, Resolution};
pub use rarp::process_rarp;
pub use rng::SplitMix64;
pub use validate::{validate_inbound, DropReason};
