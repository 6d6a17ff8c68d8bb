//! Single-consumer job queue with status tracking.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use super::{Job, JobEvent, JobRecord, JobStatus, Worker};
use crate::error::{AppError, Result};

/// Finished job records kept for status queries; older ones are dropped.
pub const MAX_FINISHED_RECORDS: usize = 256;

/// Drop the oldest terminal records beyond `keep`. Queued and running
/// records are never removed.
fn prune_finished(records: &mut HashMap<Uuid, JobRecord>, keep: usize) {
    let mut finished: Vec<_> = records
        .values()
        .filter(|r| r.status.is_terminal())
        .map(|r| (r.finished_at, r.id))
        .collect();
    if finished.len() <= keep {
        return;
    }
    finished.sort();
    let excess = finished.len() - keep;
    for (_, id) in finished.into_iter().take(excess) {
        records.remove(&id);
    }
}

pub struct JobQueue {
    sender: mpsc::UnboundedSender<Job>,
    records: RwLock<HashMap<Uuid, JobRecord>>,
    events: broadcast::Sender<JobEvent>,
}

impl JobQueue {
    /// Create the queue and spawn its consumer on the current runtime.
    pub fn start(worker: Worker) -> Arc<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(128);
        let queue = Arc::new(Self {
            sender,
            records: RwLock::new(HashMap::new()),
            events,
        });
        tokio::spawn(Arc::clone(&queue).drain(receiver, worker));
        queue
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Record the job as queued and hand it to the consumer.
    pub fn submit(&self, job: Job) -> Result<JobRecord> {
        let record = JobRecord {
            id: job.id,
            kind: job.kind.clone(),
            status: JobStatus::Queued,
            submitted_at: job.submitted_at,
            started_at: None,
            finished_at: None,
        };
        self.records
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job.id, record.clone());

        if self.sender.send(job).is_err() {
            self.records
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&record.id);
            return Err(AppError::other("Job worker is not running"));
        }

        log::info!("Queued job {} ({:?})", record.id, record.kind);
        Ok(record)
    }

    pub fn get(&self, id: Uuid) -> Result<JobRecord> {
        self.records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::job_not_found(&id.to_string()))
    }

    /// Resolve once the job reaches a terminal status.
    pub async fn wait(&self, id: Uuid) -> Result<JobRecord> {
        let mut events = self.subscribe();
        loop {
            let record = self.get(id)?;
            if record.status.is_terminal() {
                return Ok(record);
            }
            match events.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(AppError::other("Job worker stopped"));
                }
            }
        }
    }

    fn set_status(&self, id: Uuid, status: JobStatus) {
        {
            let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
            let Some(record) = records.get_mut(&id) else {
                return;
            };
            let now = Utc::now();
            match status {
                JobStatus::Running => record.started_at = Some(now),
                JobStatus::Succeeded { .. } | JobStatus::Failed { .. } => {
                    record.finished_at = Some(now);
                }
                JobStatus::Queued => {}
            }
            record.status = status.clone();
            if status.is_terminal() {
                prune_finished(&mut records, MAX_FINISHED_RECORDS);
            }
        }

        let _ = self.events.send(JobEvent { id, status });
    }

    async fn drain(self: Arc<Self>, mut receiver: mpsc::UnboundedReceiver<Job>, worker: Worker) {
        while let Some(job) = receiver.recv().await {
            let id = job.id;
            self.set_status(id, JobStatus::Running);
            log::info!("Job {} started", id);

            let status = worker.run(job).await;
            match &status {
                JobStatus::Failed { error } => {
                    log::warn!("Job {} failed: {}", id, error.message);
                }
                JobStatus::Succeeded {
                    warning: Some(warning),
                } => log::warn!("Job {} finished with warning: {}", id, warning),
                _ => log::info!("Job {} finished", id),
            }
            self.set_status(id, status);
        }
    }
}
