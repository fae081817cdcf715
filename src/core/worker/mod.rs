mod extend;
mod generate;

use anyhow::Result;
use serde::Serialize;
use tracing::{error, info, warn};

use super::generator::ContentGenerator;
use super::store::JobStore;
use super::store::types::{JobRecord, JobType};

pub const WORKER_BATCH_SIZE: usize = 10;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    pub job_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub will_retry: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct CycleReport {
    pub processed: usize,
    pub results: Vec<JobOutcome>,
}

/// One worker invocation: claim up to `WORKER_BATCH_SIZE` eligible jobs FIFO
/// and run each to an outcome. The core never schedules this itself; a cron
/// entry, an HTTP trigger or a test calls it.
///
/// One job's failure never aborts the batch, and a lost claim race just
/// skips that job. Zero eligible jobs is a no-op.
pub async fn run_worker_cycle(
    store: &JobStore,
    generator: &dyn ContentGenerator,
) -> Result<CycleReport> {
    let jobs = store.fetch_eligible_jobs(WORKER_BATCH_SIZE).await?;
    if jobs.is_empty() {
        return Ok(CycleReport {
            processed: 0,
            results: Vec::new(),
        });
    }

    info!("Processing {} pending jobs", jobs.len());
    let mut results = Vec::new();

    for job in jobs {
        let claimed = match store.claim_job(&job.id).await {
            Ok(Some(claimed)) => claimed,
            Ok(None) => {
                // Another worker got there first; leave it alone.
                info!("Job {} already claimed elsewhere, skipping", job.id);
                continue;
            }
            Err(e) => {
                // Store trouble on the claim: leave the job for the next
                // cycle instead of inventing a failure.
                warn!("Could not claim job {}: {e}", job.id);
                continue;
            }
        };

        results.push(process_claimed_job(store, generator, claimed).await);
    }

    Ok(CycleReport {
        processed: results.len(),
        results,
    })
}

async fn process_claimed_job(
    store: &JobStore,
    generator: &dyn ContentGenerator,
    job: JobRecord,
) -> JobOutcome {
    info!("Processing job {} ({})", job.id, job.job_type.as_str());

    let handled = match job.job_type {
        JobType::GeneratePath => generate::process(store, generator, &job).await,
        JobType::ExtendPath => extend::process(store, generator, &job).await,
    };

    match handled {
        Ok(result) => {
            if let Err(e) = store.complete_job(&job.id, &result).await {
                error!("Failed to mark job {} completed: {e}", job.id);
                return JobOutcome {
                    job_id: job.id,
                    status: "processing".to_string(),
                    error: Some(e.to_string()),
                    will_retry: None,
                };
            }
            info!("Job {} completed successfully", job.id);
            JobOutcome {
                job_id: job.id,
                status: "completed".to_string(),
                error: None,
                will_retry: None,
            }
        }
        Err(e) => {
            let message = e.to_string();
            let will_retry = job.attempts < job.max_attempts;
            if will_retry {
                warn!(
                    "Job {} failed (attempt {}/{}), will retry: {message}",
                    job.id, job.attempts, job.max_attempts
                );
            } else {
                error!(
                    "Job {} failed terminally after {} attempts: {message}",
                    job.id, job.attempts
                );
            }
            if let Err(update_err) = store.record_failure(&job.id, &message, will_retry).await {
                error!("Failed to record failure for job {}: {update_err}", job.id);
            }
            JobOutcome {
                job_id: job.id,
                status: if will_retry { "pending" } else { "failed" }.to_string(),
                error: Some(message),
                will_retry: Some(will_retry),
            }
        }
    }
}
