//! Scheduled probes that poll a remote system, compare the result with what
//! they saw last time and report to a Discord webhook.
//!
//! See [`pipeline`] for the shape of a single run.

pub mod aggregate;
pub mod config;
pub mod discord;
pub mod fingerprint;
pub mod history;
pub mod pipeline;
pub mod reconcile;
pub mod render;
pub mod sources;
pub mod storage;
pub mod util;
