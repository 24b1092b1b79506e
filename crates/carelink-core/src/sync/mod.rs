//! Offline sync: draining queued mutations to the remote database.

mod context;
mod engine;
mod events;
mod id_map;
mod remote;
mod scheduler;

pub use context::SyncContext;
pub use engine::{SyncEngine, SyncSettings, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY};
pub use events::{SyncEvent, SyncEventBus, SyncEventKind, SyncSummary, Subscription};
pub use id_map::IdMapper;
pub use remote::{
    classify_http_status, RemoteDatabase, RemoteError, RemoteResult, RetryClass,
    SupabaseRestClient,
};
pub use scheduler::SyncScheduler;
