//! Velostash core library: versioned local persistence for cycling aero analysis.
//!
//! Two collections live in one SQLite database behind [`store::LocalStore`]:
//! per-recording analysis parameters keyed by a [`fingerprint`], and fitted
//! results keyed by (source, laps, notes). Opening a collection checks its
//! persisted schema version and migrates old documents in place.

pub mod artifact;
pub mod config;
pub mod error;
pub mod export;
pub mod fingerprint;
pub mod geo;
pub mod retention;
pub mod store;
pub mod types;
