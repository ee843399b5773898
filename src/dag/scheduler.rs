// src/dag/scheduler.rs

use std::future::Future;
use std::sync::Arc;

use anyhow::anyhow;
use tracing::{debug, warn};

use crate::errors::{DepdagError, Result};
use crate::types::BoxFuture;

/// A single unit of work handed out by the provider.
pub type Work = BoxFuture<'static, Result<()>>;

/// Box an async block into a [`Work`] item.
pub fn work<F>(fut: F) -> Work
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    Box::pin(fut)
}

/// Number of workers used when a concurrency of zero is requested.
pub fn available_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Bounded worker pool pulling work from a shared provider.
///
/// Each of the `concurrency` workers loops:
/// - ask the provider for the next unit of work,
/// - stop with the provider's error if it fails,
/// - stop normally once the provider returns `None`,
/// - otherwise run the work and stop on its error.
///
/// Workers are never cancelled by a failing sibling. [`Scheduler::run`]
/// waits for every worker and then reports the first error in worker order.
/// The provider is shared by all workers and must serialise its own state.
pub struct Scheduler<F> {
    concurrency: usize,
    next: Arc<F>,
}

impl<F, Fut> Scheduler<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Work>>> + Send + 'static,
{
    pub fn new(concurrency: usize, next: F) -> Self {
        let concurrency = if concurrency == 0 {
            available_concurrency()
        } else {
            concurrency
        };

        Self {
            concurrency,
            next: Arc::new(next),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub async fn run(self) -> Result<()> {
        debug!(concurrency = self.concurrency, "scheduler: starting workers");

        let handles: Vec<_> = (0..self.concurrency)
            .map(|worker| {
                let next = Arc::clone(&self.next);
                tokio::spawn(worker_loop(worker, next))
            })
            .collect();

        let mut first_err: Option<DepdagError> = None;
        for (worker, handle) in handles.into_iter().enumerate() {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(join_err) => Err(DepdagError::Other(anyhow!(
                    "scheduler worker {worker} terminated abnormally: {join_err}"
                ))),
            };

            if let Err(err) = outcome {
                warn!(worker, error = %err, "scheduler: worker stopped with error");
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

async fn worker_loop<F, Fut>(worker: usize, next: Arc<F>) -> Result<()>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<Work>>> + Send,
{
    loop {
        let Some(unit) = next().await? else {
            break;
        };
        unit.await?;
    }

    debug!(worker, "scheduler: worker out of work");
    Ok(())
}
