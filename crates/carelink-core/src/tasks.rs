//! Observable background work.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus<T> {
    Running,
    Succeeded(T),
    Failed(String),
}

impl<T> TaskStatus<T> {
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

/// A spawned future whose outcome can be observed or awaited.
#[derive(Debug)]
pub struct BackgroundTask<T> {
    name: &'static str,
    status: watch::Receiver<TaskStatus<T>>,
    handle: JoinHandle<()>,
}

impl<T> BackgroundTask<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn spawn<F>(name: &'static str, future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let (sender, status) = watch::channel(TaskStatus::Running);
        let handle = tokio::spawn(async move {
            let outcome = match AssertUnwindSafe(future).catch_unwind().await {
                Ok(Ok(value)) => TaskStatus::Succeeded(value),
                Ok(Err(error)) => {
                    tracing::warn!("{} failed: {}", name, error);
                    TaskStatus::Failed(error.to_string())
                }
                Err(_) => {
                    tracing::error!("{} panicked", name);
                    TaskStatus::Failed(format!("{name} panicked"))
                }
            };
            sender.send_replace(outcome);
        });

        Self {
            name,
            status,
            handle,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub fn status(&self) -> TaskStatus<T> {
        self.status.borrow().clone()
    }

    /// Receiver notified when the task finishes.
    pub fn subscribe(&self) -> watch::Receiver<TaskStatus<T>> {
        self.status.clone()
    }

    pub fn is_finished(&self) -> bool {
        !self.status.borrow().is_running()
    }

    pub async fn wait(mut self) -> Result<T> {
        let status = self
            .status
            .wait_for(|status| !status.is_running())
            .await
            .map(|status| status.clone())
            .map_err(|_| Error::Task(format!("{} ended without a result", self.name)))?;

        match status {
            TaskStatus::Succeeded(value) => Ok(value),
            TaskStatus::Failed(message) => Err(Error::Task(message)),
            TaskStatus::Running => Err(Error::Task(format!("{} still running", self.name))),
        }
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test(flavor = "multi_thread")]
    async fn wait_returns_value() {
        let task = BackgroundTask::spawn("answer", async { Ok(42_u32) });
        assert_eq!(task.wait().await.unwrap(), 42);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failures_are_observable() {
        let task = BackgroundTask::<u32>::spawn("broken", async {
            Err(Error::InvalidInput("no".to_string()))
        });
        let mut status = task.subscribe();
        status.wait_for(|status| !status.is_running()).await.unwrap();

        assert!(task.is_finished());
        assert_eq!(
            task.status(),
            TaskStatus::Failed("Invalid input: no".to_string())
        );
        assert!(matches!(task.wait().await, Err(Error::Task(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn panics_become_failures() {
        let task = BackgroundTask::<u32>::spawn("panicky", async {
            let values: Vec<u32> = Vec::new();
            Ok(values[0])
        });
        let error = task.wait().await.unwrap_err();
        assert_eq!(error.to_string(), "Background task failed: panicky panicked");
    }
}
