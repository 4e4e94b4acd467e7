//! Tracks tokio tasks spawned by the application so that shutdown can abort
//! or join all of them in one place.

use std::sync::Mutex;

use tokio::task::JoinHandle;

/// Collects the `JoinHandle`s of every long-lived task an application spawns.
///
/// Subsystems receive an `Arc<TaskManager>` and register their tasks through
/// [`TaskManager::spawn`]. On graceful shutdown the orchestrator calls
/// [`TaskManager::join_all`]; if the grace period expires it calls
/// [`TaskManager::abort_all`] first.
#[derive(Debug, Default)]
pub struct TaskManager {
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawns `future` on the tokio runtime and records its handle.
    pub fn spawn<F>(&self, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.tasks.lock().unwrap().push(handle);
    }

    /// Number of tracked tasks (finished handles included until joined).
    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().unwrap().is_empty()
    }

    /// Aborts every tracked task. Safe to call more than once.
    pub async fn abort_all(&self) {
        let tasks = self.tasks.lock().unwrap();
        for task in tasks.iter() {
            task.abort();
        }
    }

    /// Waits for every tracked task to finish, draining the registry.
    ///
    /// Cancelled tasks resolve with a `JoinError`, which is ignored here;
    /// this only cares that nothing is left running.
    pub async fn join_all(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock().unwrap();
            tasks.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    #[tokio::test]
    async fn join_all_waits_for_completion() {
        let manager = TaskManager::new();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = counter.clone();
            manager.spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(manager.len(), 3);
        manager.join_all().await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn abort_all_cancels_pending_tasks() {
        let manager = TaskManager::new();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let counter = counter.clone();
            manager.spawn(async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        manager.abort_all().await;
        manager.join_all().await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
