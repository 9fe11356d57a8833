//! Worker pool that runs reconciliations off the caller's task.
//!
//! Jobs go through an `async-channel` queue to `num_workers` worker tasks.
//! Each reconciliation is CPU-bound and runs in `spawn_blocking`; the result
//! comes back on the job's oneshot channel.

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::CoreError;
use crate::matching::Thresholds;
use crate::reconcile::{Reconciliation, reconcile};
use crate::record::PublicationRecord;

/// A reconciliation job submitted to the pool.
struct ReconcileJob {
    local: Vec<PublicationRecord>,
    crawled: Vec<PublicationRecord>,
    thresholds: Thresholds,
    result_tx: oneshot::Sender<Reconciliation>,
}

pub struct ReconcilePool {
    job_tx: async_channel::Sender<ReconcileJob>,
    pool_handle: JoinHandle<()>,
}

impl ReconcilePool {
    pub fn new(num_workers: usize, cancel: CancellationToken) -> Self {
        let (job_tx, job_rx) = async_channel::unbounded::<ReconcileJob>();

        let pool_handle = tokio::spawn(async move {
            let mut handles = Vec::with_capacity(num_workers.max(1));
            for worker in 0..num_workers.max(1) {
                handles.push(tokio::spawn(worker_loop(
                    worker,
                    job_rx.clone(),
                    cancel.clone(),
                )));
            }
            drop(job_rx);
            for h in handles {
                let _ = h.await;
            }
        });

        Self {
            job_tx,
            pool_handle,
        }
    }

    /// Queue a reconciliation and return the receiver for its result.
    ///
    /// The receiver errors if the pool is cancelled before the job runs.
    pub async fn submit(
        &self,
        local: Vec<PublicationRecord>,
        crawled: Vec<PublicationRecord>,
        thresholds: Thresholds,
    ) -> Result<oneshot::Receiver<Reconciliation>, CoreError> {
        let (result_tx, result_rx) = oneshot::channel();
        let job = ReconcileJob {
            local,
            crawled,
            thresholds,
            result_tx,
        };
        self.job_tx
            .send(job)
            .await
            .map_err(|_| CoreError::PoolClosed)?;
        Ok(result_rx)
    }

    /// Close the queue and wait for workers to finish the remaining jobs.
    pub async fn shutdown(self) {
        self.job_tx.close();
        let _ = self.pool_handle.await;
    }
}

async fn worker_loop(
    worker: usize,
    job_rx: async_channel::Receiver<ReconcileJob>,
    cancel: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            job = job_rx.recv() => match job {
                Ok(job) => job,
                Err(_) => break,
            },
        };

        let ReconcileJob {
            local,
            crawled,
            thresholds,
            result_tx,
        } = job;

        tracing::debug!(
            worker,
            local = local.len(),
            crawled = crawled.len(),
            "reconciling"
        );
        match tokio::task::spawn_blocking(move || reconcile(&local, &crawled, &thresholds)).await {
            Ok(result) => {
                let _ = result_tx.send(result);
            }
            Err(e) => tracing::warn!(worker, error = %e, "reconcile task failed"),
        }
    }
    tracing::debug!(worker, "reconcile worker exiting");
}
