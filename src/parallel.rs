//! Ordered parallel execution
//!
//! Runs independent async tasks concurrently, at most `limit` at a time, and
//! returns their results in input order regardless of completion order.

use crate::error::{NlqError, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

pub struct OrderedParallelExecutor {
    limit: usize,
}

impl OrderedParallelExecutor {
    pub fn new(limit: usize) -> Self {
        Self { limit: limit.max(1) }
    }

    /// Map every item through `task` concurrently.
    ///
    /// Results land in a slot per input index, so output `i` always belongs
    /// to input `i`. The first error (by input order) is returned.
    pub async fn map<I, T, R, F, Fut>(&self, items: I, task: F) -> Result<Vec<R>>
    where
        I: IntoIterator<Item = T>,
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(usize, T) -> Fut,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.limit));

        let handles: Vec<_> = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                let semaphore = Arc::clone(&semaphore);
                let fut = task(index, item);
                tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| NlqError::Task(format!("Task scheduling failed: {}", e)))?;
                    fut.await
                })
            })
            .collect();

        // Handles are awaited in spawn order, which fixes the output order
        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(match handle.await {
                Ok(result) => result,
                Err(e) => Err(NlqError::Task(format!("Task execution failed: {}", e))),
            });
        }

        results.into_iter().collect()
    }
}
