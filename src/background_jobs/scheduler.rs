//! Interval-based background job scheduler.
//!
//! Each registered job gets its own task ticking at the job's interval. A
//! shared running set keeps a slow run from overlapping with the next tick.

use super::context::JobContext;
use super::job::{BackgroundJob, JobError, JobSchedule};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct JobScheduler {
    jobs: Vec<Arc<dyn BackgroundJob>>,
    context: JobContext,
    shutdown_token: CancellationToken,
    running: Arc<Mutex<HashSet<&'static str>>>,
}

impl JobScheduler {
    pub fn new(context: JobContext, shutdown_token: CancellationToken) -> Self {
        JobScheduler {
            jobs: Vec::new(),
            context,
            shutdown_token,
            running: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn register_job(&mut self, job: Arc<dyn BackgroundJob>) {
        info!("Registering job: {} - {}", job.id(), job.description());
        self.jobs.push(job);
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Spawn one task per registered job. Tasks stop at shutdown and the
    /// returned handles can be awaited for a clean exit.
    pub fn start(self) -> Vec<JoinHandle<()>> {
        info!("Starting job scheduler with {} registered jobs", self.jobs.len());
        self.jobs
            .iter()
            .map(|job| {
                let job = job.clone();
                let context = self.context.clone();
                let shutdown_token = self.shutdown_token.clone();
                let running = self.running.clone();
                tokio::spawn(async move {
                    let JobSchedule::Interval(interval) = job.schedule();
                    let mut ticker = tokio::time::interval(interval);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    if !job.run_on_startup() {
                        // Consume the immediate first tick
                        ticker.tick().await;
                    }
                    loop {
                        tokio::select! {
                            _ = shutdown_token.cancelled() => {
                                info!("Job {} stopping on shutdown", job.id());
                                break;
                            }
                            _ = ticker.tick() => {
                                run_job(&job, &context, &running).await;
                            }
                        }
                    }
                })
            })
            .collect()
    }
}

async fn run_job(
    job: &Arc<dyn BackgroundJob>,
    context: &JobContext,
    running: &Arc<Mutex<HashSet<&'static str>>>,
) {
    {
        let mut running = running.lock().unwrap();
        if !running.insert(job.id()) {
            warn!("Job {} still running at next tick, skipping", job.id());
            return;
        }
    }

    info!("Starting job: {}", job.id());
    let start_time = Instant::now();
    let result = job.execute(context).await;
    let elapsed = start_time.elapsed();

    match result {
        Ok(()) => info!("Job {} completed in {:?}", job.id(), elapsed),
        Err(JobError::Cancelled) => info!("Job {} was cancelled after {:?}", job.id(), elapsed),
        Err(err) => error!("Job {} failed after {:?}: {}", job.id(), elapsed, err),
    }

    running.lock().unwrap().remove(job.id());
}
