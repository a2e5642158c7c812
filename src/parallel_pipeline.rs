// THEORY:
// The `parallel_pipeline` processes many trials at once. Trials are independent
// and the `GazePipeline` is read-only once built, so a single instance is shared
// by every worker behind an `Arc`.
//
// Work is distributed by a dispatcher task that hands each incoming trial to the
// next worker in round-robin order. Each trial carries a oneshot channel for its
// report, so callers await exactly their own result. Classification is CPU-bound
// and runs on the blocking thread pool, keeping the async workers responsive.

use crate::error::{GazeError, GazeResult};
use crate::pipeline::{GazePipeline, PipelineConfig, Trial, TrialReport};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

pub struct TrialTask {
    pub trial: Trial,
    pub result_sender: oneshot::Sender<GazeResult<TrialReport>>,
}

pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<TrialTask>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns the dispatcher and `worker_count` workers. Must be called inside a tokio runtime.
    pub fn new(pipeline: Arc<GazePipeline>, worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<TrialTask>();
        let mut workers = Vec::with_capacity(worker_count);

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..worker_count)
            .map(|_| mpsc::unbounded_channel::<TrialTask>())
            .unzip();

        // Spawn dispatcher
        tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                let _ = worker_senders[worker_idx].send(task);
                worker_idx = (worker_idx + 1) % worker_count;
            }
        });

        // Spawn workers
        for (worker_id, mut worker_receiver) in worker_receivers.into_iter().enumerate() {
            let worker_pipeline = Arc::clone(&pipeline);

            let worker = tokio::spawn(async move {
                while let Some(task) = worker_receiver.recv().await {
                    let trial_id = task.trial.id;
                    debug!(worker_id, trial_id, "processing trial");
                    let report = Self::process_trial_worker(Arc::clone(&worker_pipeline), task.trial).await;
                    let _ = task.result_sender.send(report);
                }
            });

            workers.push(worker);
        }

        Self { task_sender, workers }
    }

    async fn process_trial_worker(pipeline: Arc<GazePipeline>, trial: Trial) -> GazeResult<TrialReport> {
        let trial_id = trial.id;
        tokio::task::spawn_blocking(move || pipeline.process_trial(&trial))
            .await
            .map_err(|e| GazeError::computation(format!("worker for trial {trial_id} stopped: {e}")))?
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub async fn process_trial(&self, trial: Trial) -> GazeResult<TrialReport> {
        let (result_sender, result_receiver) = oneshot::channel();

        let task = TrialTask { trial, result_sender };

        self.task_sender
            .send(task)
            .map_err(|_| GazeError::computation("failed to send trial to worker pool"))?;

        result_receiver
            .await
            .map_err(|_| GazeError::computation("failed to receive result from worker"))?
    }
}

pub struct ParallelPipeline {
    worker_pool: WorkerPool,
}

impl ParallelPipeline {
    /// One worker per CPU core.
    pub fn new(config: PipelineConfig) -> GazeResult<Self> {
        Self::with_workers(config, num_cpus::get())
    }

    pub fn with_workers(config: PipelineConfig, worker_count: usize) -> GazeResult<Self> {
        let pipeline = Arc::new(GazePipeline::new(config)?);
        Ok(Self {
            worker_pool: WorkerPool::new(pipeline, worker_count),
        })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_pool.worker_count()
    }

    pub async fn process_trial(&self, trial: Trial) -> GazeResult<TrialReport> {
        self.worker_pool.process_trial(trial).await
    }

    /// Processes every trial concurrently. Results keep the order of `trials`,
    /// and a failing trial only fills its own slot with an error.
    pub async fn process_batch(&self, trials: Vec<Trial>) -> Vec<GazeResult<TrialReport>> {
        join_all(trials.into_iter().map(|trial| self.process_trial(trial))).await
    }
}
