//! Per-project issue tracking: record store, service, and HTTP API.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────┐
//! │  Client  │ ───────> │  server.rs  (axum Router, start_server)      │
//! │          │ <─────── │    └─ api.rs  (handlers, Payload, ApiError)  │
//! └──────────┘          │         │                                    │
//!                       │         v                                    │
//!                       │  service.rs  (validation, response shaping)  │
//!                       │         │                                    │
//!                       │         v                                    │
//!                       │  store.rs  (IssueStore trait)                │
//!                       │    ├─ memory.rs  (per-project RwLock)        │
//!                       │    └─ db.rs      (SQLite via DbHandle)       │
//!                       └──────────────────────────────────────────────┘
//! ```
//!
//! `models` holds the `Issue` record, filters, patches and the request and
//! response payloads shared by every layer.
//!
//! ## Request Flow (update)
//!
//! 1. `PUT /api/issues/{project}` → `api::update_issue()` decodes the JSON
//!    or form body into `UpdateIssueRequest`.
//! 2. `IssueService::update()` rejects a missing `_id` or an empty patch
//!    without touching the store.
//! 3. `IssueStore::update_by_id()` applies the patch under the project's
//!    write lock (memory) or the database mutex (SQLite).
//! 4. The outcome becomes `{result, _id}` or `{error, _id}`; client errors
//!    answer HTTP 200 unless `api.legacy_status_codes` is off.

pub mod api;
pub mod db;
pub mod memory;
pub mod models;
pub mod server;
pub mod service;
pub mod store;
