//! # dialtrack Common Library
//!
//! Call attribution and analytics telemetry for a marketing site:
//! - Visit attribution capture and merge ([`attribution`])
//! - Tracking-number resolution and session binding ([`tracking`])
//! - Phone-number synchronization over a document tree ([`dom`])
//! - Event emission, scroll/FAQ/exposure dedup ([`analytics`])
//! - Deterministic A/B bucketing ([`experiments`])
//! - Page-level orchestration ([`tracker`])
//!
//! Every browser-facing entry point is best effort: failures are logged
//! through `tracing` and never interrupt rendering or navigation.

pub mod analytics;
pub mod attribution;
pub mod config;
pub mod dom;
pub mod error;
pub mod experiments;
pub mod identity;
pub mod storage;
pub mod time;
pub mod tracker;
pub mod tracking;
pub mod uuid_utils;

pub use error::{Error, Result};
pub use tracker::{CallTracker, PageOutcome, TrackerBuilder};
