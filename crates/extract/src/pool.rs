use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinError;

pub const DEFAULT_WIDTH: usize = 4;

/// Bounded pool shared by every stage. Each unit is its own task, so a
/// failing or panicking unit never cancels the others.
#[derive(Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    width: usize,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH)
    }
}

impl WorkerPool {
    pub fn new(width: usize) -> Self {
        let width = width.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(width)),
            width,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Run `work` on every item with at most `width` units in flight.
    /// Results come back in input order.
    pub async fn run<I, T, F, Fut>(&self, items: Vec<I>, work: F) -> Vec<Result<T, JoinError>>
    where
        I: Send + 'static,
        T: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let work = Arc::new(work);
        let mut tasks = Vec::with_capacity(items.len());

        for item in items {
            let semaphore = Arc::clone(&self.semaphore);
            let work = Arc::clone(&work);

            tasks.push(tokio::spawn(async move {
                // the semaphore is never closed, so the permit is always granted
                let _permit = semaphore.acquire_owned().await;
                work(item).await
            }));
        }

        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            results.push(task.await);
        }
        results
    }
}
