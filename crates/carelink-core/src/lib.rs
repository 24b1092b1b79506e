//! carelink-core - Core library for CareLink
//!
//! Offline-first pieces of the telehealth portal client: the durable sync
//! queue and local entity cache, the sync engine that drains the queue to
//! Supabase, and live transcription over provider WebSockets. Shared by the
//! CLI and any embedding application.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod sync;
pub mod tasks;
pub mod transcription;
pub mod util;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use models::{SyncOperation, SyncQueueItem};
pub use services::LocalStore;
pub use sync::{SyncContext, SyncEvent, SyncEventBus, SyncSummary};
pub use tasks::{BackgroundTask, TaskStatus};
