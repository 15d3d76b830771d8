//! kpl-sync library - catalog refresh and playlist reconciliation
//!
//! Keeps three weakly consistent stores converging without cross-store
//! transactions: the SQLite catalog, the JSON document store, and the
//! command bus to the external queue executor.
//!
//! - [`catalog`]: connectors, the transactional generation rebuild, and the
//!   refresh pipeline that publishes `current` / `snapshots/{id}`
//! - [`coordinator`]: marker-driven, idempotent refresh triggering
//! - [`reconcile`]: playlist-to-live-queue command planning and dispatch
//! - [`admin`]: marker and playlist writes made by surrounding tooling

pub mod admin;
pub mod catalog;
pub mod coordinator;
pub mod db;
pub mod reconcile;

pub use coordinator::{process_refresh_marker, run_refresh_watcher, CatalogRefreshWatchState};
pub use reconcile::{QueueMode, Reconciler, ReconciliationResult};
