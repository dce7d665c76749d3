//! App version gating
//!
//! Decides, per client platform, whether a client is current, may update, must
//! update, or should show a maintenance notice.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Ingest    │────▶│   Catalog   │◀────│   Checker   │
//! │ (validate)  │     │  (storage)  │     │ (snapshot)  │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                                                │
//!                                                ▼
//!                     ┌─────────────┐     ┌─────────────┐
//!                     │   Semver    │◀────│    Gate     │
//!                     │(version cmp)│     │  (decide)   │
//!                     └─────────────┘     └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`catalog`]: SQLite-backed store of version records and admin commands
//! - [`checker`]: Reads a catalog snapshot and runs the gate
//! - [`error`]: Error types for parsing, gating, ingestion and storage
//! - [`gate`]: Pure decision engine
//! - [`ingest`]: Validation of administrator-supplied drafts
//! - [`semver`]: Dotted version parsing and ordering
//! - [`types`]: Records, queries and decisions

pub mod catalog;
pub mod checker;
pub mod error;
pub mod gate;
pub mod ingest;
pub mod semver;
pub mod types;
