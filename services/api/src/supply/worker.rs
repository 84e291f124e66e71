//! services/api/src/supply/worker.rs
//!
//! Bounded pool of background generation workers.
//!
//! Each worker owns a bounded [`mpsc::Receiver`] and runs jobs one at a time
//! through the [`GenerationGateway`]. Jobs are handed out round-robin. When the
//! chosen queue is full the job is dropped: a job only asks for "more questions"
//! and the next player action will ask again.

use crate::supply::gateway::{GenerationGateway, GenerationReport};
use quiz_supply_core::domain::Tier;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A request for `count` more questions of `tier` in one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationJob {
    pub session_id: Uuid,
    pub tier: Tier,
    pub count: u32,
}

pub struct WorkerPool {
    workers: Vec<mpsc::Sender<GenerationJob>>,
    next_worker: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
    shutdown_token: CancellationToken,
}

impl WorkerPool {
    /// Spawns `worker_count` workers, each with a queue of `queue_depth` jobs.
    pub fn spawn(
        gateway: GenerationGateway,
        worker_count: usize,
        queue_depth: usize,
        shutdown_token: CancellationToken,
    ) -> Self {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let workers = (0..worker_count.max(1))
            .map(|worker_id| {
                let (tx, rx) = mpsc::channel(queue_depth.max(1));
                tokio::spawn(worker_loop(
                    worker_id,
                    rx,
                    gateway.clone(),
                    in_flight.clone(),
                    shutdown_token.clone(),
                ));
                tx
            })
            .collect();
        Self {
            workers,
            next_worker: AtomicUsize::new(0),
            in_flight,
            shutdown_token,
        }
    }

    /// Returns the index of the next worker to receive work (round-robin).
    pub fn next_worker_index(&self) -> usize {
        self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len()
    }

    /// Queues a job without waiting. Returns `false` when it was dropped.
    pub fn dispatch(&self, job: GenerationJob) -> bool {
        if job.count == 0 {
            return true;
        }
        if self.shutdown_token.is_cancelled() {
            tracing::debug!(session_id = %job.session_id, "Worker pool is shut down, dropping job");
            return false;
        }

        let worker_idx = self.next_worker_index();
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        match self.workers[worker_idx].try_send(job) {
            Ok(()) => {
                tracing::debug!(
                    session_id = %job.session_id,
                    tier = %job.tier,
                    count = job.count,
                    worker = worker_idx,
                    "Queued background generation"
                );
                true
            }
            Err(TrySendError::Full(job)) => {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                tracing::warn!(
                    session_id = %job.session_id,
                    tier = %job.tier,
                    worker = worker_idx,
                    "Worker queue full, dropping generation job"
                );
                false
            }
            Err(TrySendError::Closed(job)) => {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                tracing::error!(session_id = %job.session_id, worker = worker_idx, "Worker channel closed");
                false
            }
        }
    }

    /// Jobs queued or running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Waits until every queued job has finished. Returns `false` on timeout.
    pub async fn wait_idle(&self, limit: Duration) -> bool {
        timeout(limit, async {
            while self.in_flight() > 0 {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .is_ok()
    }

    /// Stops every worker. Running jobs are abandoned at their next await point.
    pub fn shutdown(&self) {
        tracing::info!(pending = self.in_flight(), "Shutting down generation workers");
        self.shutdown_token.cancel();
    }
}

async fn worker_loop(
    worker_id: usize,
    mut rx: mpsc::Receiver<GenerationJob>,
    gateway: GenerationGateway,
    in_flight: Arc<AtomicUsize>,
    shutdown_token: CancellationToken,
) {
    tracing::trace!("Worker {worker_id} started");

    loop {
        let job = tokio::select! {
            biased;
            _ = shutdown_token.cancelled() => break,
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let result: Option<GenerationReport> = tokio::select! {
            biased;
            _ = shutdown_token.cancelled() => None,
            report = gateway.fill(job.session_id, job.tier, job.count) => Some(report),
        };
        in_flight.fetch_sub(1, Ordering::SeqCst);

        match result {
            Some(report) if report.accepted < job.count => tracing::debug!(
                session_id = %job.session_id,
                worker = worker_id,
                wanted = job.count,
                accepted = report.accepted,
                "Background job came up short"
            ),
            Some(_) => {}
            None => break,
        }
    }

    tracing::trace!("Worker {worker_id} stopped");
}
