//! Sync lifecycle notifications.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use serde::{Deserialize, Serialize};

/// Outcome counts of one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub success: usize,
    pub failed: usize,
}

/// Notification emitted while the queue drains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    SyncStarted {
        total: usize,
    },
    SyncProgress {
        current: usize,
        total: usize,
        success: usize,
        failed: usize,
    },
    SyncCompleted {
        success: usize,
        failed: usize,
    },
    SyncFailed {
        success: usize,
        failed: usize,
    },
    QueueUpdated {
        count: usize,
    },
}

impl SyncEvent {
    pub const fn kind(&self) -> SyncEventKind {
        match self {
            Self::SyncStarted { .. } => SyncEventKind::SyncStarted,
            Self::SyncProgress { .. } => SyncEventKind::SyncProgress,
            Self::SyncCompleted { .. } => SyncEventKind::SyncCompleted,
            Self::SyncFailed { .. } => SyncEventKind::SyncFailed,
            Self::QueueUpdated { .. } => SyncEventKind::QueueUpdated,
        }
    }

    pub(crate) const fn finished(summary: SyncSummary) -> Self {
        let SyncSummary { success, failed } = summary;
        if failed == 0 {
            Self::SyncCompleted { success, failed }
        } else {
            Self::SyncFailed { success, failed }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEventKind {
    SyncStarted,
    SyncProgress,
    SyncCompleted,
    SyncFailed,
    QueueUpdated,
}

impl SyncEventKind {
    pub const ALL: [Self; 5] = [
        Self::SyncStarted,
        Self::SyncProgress,
        Self::SyncCompleted,
        Self::SyncFailed,
        Self::QueueUpdated,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SyncStarted => "sync_started",
            Self::SyncProgress => "sync_progress",
            Self::SyncCompleted => "sync_completed",
            Self::SyncFailed => "sync_failed",
            Self::QueueUpdated => "queue_updated",
        }
    }
}

impl fmt::Display for SyncEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Listener = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: HashMap<SyncEventKind, Vec<(u64, Listener)>>,
}

/// Fan-out of sync events to registered listeners.
///
/// Listeners run synchronously on the emitting task, in registration order.
/// A panicking listener is logged and skipped; the others still run.
#[derive(Clone, Default)]
pub struct SyncEventBus {
    registry: Arc<Mutex<Registry>>,
}

impl SyncEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for events of `kind`.
    pub fn on<F>(&self, kind: SyncEventKind, callback: F) -> Subscription
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        let mut registry = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        registry.next_id += 1;
        let id = registry.next_id;
        registry
            .listeners
            .entry(kind)
            .or_default()
            .push((id, Arc::new(callback)));

        Subscription {
            registry: Arc::downgrade(&self.registry),
            kind,
            id,
        }
    }

    pub fn emit(&self, event: &SyncEvent) {
        // Snapshot so listeners may subscribe or unsubscribe while running.
        let listeners = {
            let registry = self
                .registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            registry
                .listeners
                .get(&event.kind())
                .map(|entries| {
                    entries
                        .iter()
                        .map(|(_, listener)| Arc::clone(listener))
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default()
        };

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::error!("Listener for {} panicked", event.kind());
            }
        }
    }

    pub fn listener_count(&self, kind: SyncEventKind) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .get(&kind)
            .map_or(0, Vec::len)
    }
}

/// Handle returned by [`SyncEventBus::on`].
#[derive(Debug)]
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    kind: SyncEventKind,
    id: u64,
}

impl Subscription {
    /// Stop delivering events to this listener. Safe to call more than once.
    pub fn unsubscribe(&self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entries) = registry.listeners.get_mut(&self.kind) {
            entries.retain(|(id, _)| *id != self.id);
        }
    }
}
