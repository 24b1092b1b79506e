//! Periodic and on-demand sync passes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;

use super::context::SyncContext;

struct RunningLoop {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Runs sync passes in the background on an interval and on request.
///
/// A zero interval disables the timer; passes then only run on [`trigger`].
/// A pass that has started always runs to the end, including across
/// [`stop`].
///
/// [`trigger`]: SyncScheduler::trigger
/// [`stop`]: SyncScheduler::stop
pub struct SyncScheduler {
    context: SyncContext,
    interval: Duration,
    wake: Arc<Notify>,
    background_task: Mutex<Option<RunningLoop>>,
}

impl SyncScheduler {
    pub fn new(context: SyncContext, interval: Duration) -> Self {
        Self {
            context,
            interval,
            wake: Arc::new(Notify::new()),
            background_task: Mutex::new(None),
        }
    }

    /// Start the loop unless it is already running.
    pub async fn start(&self) {
        let mut guard = self.background_task.lock().await;
        if let Some(running) = guard.as_ref() {
            if !running.handle.is_finished() {
                return;
            }
            guard.take();
        }

        let context = self.context.clone();
        let wake = Arc::clone(&self.wake);
        let interval = self.interval;
        let (shutdown, mut stop_requested) = watch::channel(false);
        tracing::info!("Starting sync scheduler (interval {:?})", interval);

        let handle = tokio::spawn(async move {
            loop {
                if *stop_requested.borrow() {
                    break;
                }

                match context.process_sync().await {
                    Ok(summary) if summary.success + summary.failed > 0 => tracing::debug!(
                        "Scheduled pass: {} synced, {} failed",
                        summary.success,
                        summary.failed
                    ),
                    Ok(_) => {}
                    Err(error) => tracing::warn!("Scheduled sync pass failed: {}", error),
                }

                let timer = async {
                    if interval.is_zero() {
                        std::future::pending::<()>().await;
                    } else {
                        tokio::time::sleep(interval).await;
                    }
                };
                tokio::select! {
                    biased;
                    _ = stop_requested.changed() => break,
                    () = wake.notified() => {}
                    () = timer => {}
                }
            }
        });
        *guard = Some(RunningLoop { shutdown, handle });
    }

    /// Stop the loop, letting a pass in flight finish first. Does nothing
    /// when it is not running.
    pub async fn stop(&self) {
        let running = self.background_task.lock().await.take();
        let Some(running) = running else {
            return;
        };

        running.shutdown.send_replace(true);
        if let Err(error) = running.handle.await {
            tracing::warn!("Sync scheduler ended abnormally: {}", error);
        }
        tracing::info!("Stopped sync scheduler");
    }

    /// Request a pass now, e.g. when connectivity returns.
    ///
    /// A trigger that arrives during a pass schedules one more pass after it.
    pub fn trigger(&self) {
        self.wake.notify_one();
    }

    pub async fn is_running(&self) -> bool {
        self.background_task
            .lock()
            .await
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        if let Some(running) = self.background_task.get_mut().take() {
            running.handle.abort();
        }
    }
}
