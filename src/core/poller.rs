use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::store::JobStore;
use super::store::types::{JobRecord, JobStatus};

pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Background watcher for a single job. Checks the store every
/// `POLL_INTERVAL` until the job reaches a terminal status, then fires
/// exactly one of the two callbacks and exits.
///
/// Polling stops when `stop` is called or the poller is dropped; a stopped
/// poller fires no callback.
pub struct JobPoller {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl JobPoller {
    pub fn spawn<C, E>(store: JobStore, job_id: String, on_complete: C, on_error: E) -> Self
    where
        C: FnOnce(JobRecord) + Send + 'static,
        E: FnOnce(String) + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(POLL_INTERVAL);
            // The immediate first tick gives a fast answer for jobs that
            // were already terminal when polling started.
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Polling for job {job_id} cancelled");
                        return;
                    }
                    _ = interval.tick() => {}
                }
                let job = match store.get_job(&job_id).await {
                    Ok(Some(job)) => job,
                    Ok(None) => {
                        on_error(format!("job {job_id} not found"));
                        return;
                    }
                    Err(e) => {
                        warn!("Status poll for job {job_id} failed: {e}");
                        on_error(e.to_string());
                        return;
                    }
                };
                match job.status {
                    JobStatus::Completed => {
                        on_complete(job);
                        return;
                    }
                    JobStatus::Failed | JobStatus::Cancelled => {
                        on_error(
                            job.error_message
                                .unwrap_or_else(|| "Job failed".to_string()),
                        );
                        return;
                    }
                    JobStatus::Pending | JobStatus::Processing => {
                        debug!("Job {job_id} still {}", job.status.as_str());
                    }
                }
            }
        });
        Self { cancel, handle }
    }

    /// Cancel polling and wait for the task to wind down.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        let _ = (&mut self.handle).await;
    }
}

impl Drop for JobPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::super::store::test_store;
    use super::super::store::types::JobType;
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    async fn pending_job(store: &JobStore) -> JobRecord {
        store
            .create_job(
                "user-1",
                JobType::GeneratePath,
                &json!({"prompt": "Learn Rust ownership", "difficulty": "beginner"}),
                "poll-key",
                &json!({}),
            )
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn reports_completion_with_the_final_record() {
        let store = test_store().await;
        let job = pending_job(&store).await;
        store.claim_job(&job.id).await.unwrap();
        store
            .complete_job(&job.id, &json!({"learningPathId": "lp-1"}))
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let errors = tx.clone();
        let _poller = JobPoller::spawn(
            store.clone(),
            job.id.clone(),
            move |job| {
                tx.send(Ok(job)).unwrap();
            },
            move |msg| {
                errors.send(Err(msg)).unwrap();
            },
        );

        let got = rx.recv().await.unwrap().unwrap();
        assert_eq!(got.id, job.id);
        assert_eq!(got.result_data, Some(json!({"learningPathId": "lp-1"})));
        // Terminal means done: the channel closes without a second event.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn reports_failure_message_once_job_goes_terminal() {
        let store = test_store().await;
        let job = pending_job(&store).await;

        let (tx, mut rx) = mpsc::unbounded_channel::<Result<JobRecord, String>>();
        let errors = tx.clone();
        let _poller = JobPoller::spawn(
            store.clone(),
            job.id.clone(),
            move |job| {
                tx.send(Ok(job)).unwrap();
            },
            move |msg| {
                errors.send(Err(msg)).unwrap();
            },
        );

        // Let a couple of polls observe the non-terminal job first.
        tokio::time::sleep(POLL_INTERVAL * 2).await;
        store.claim_job(&job.id).await.unwrap();
        store
            .record_failure(&job.id, "AI gateway error: 503", false)
            .await
            .unwrap();

        let got = rx.recv().await.unwrap();
        assert_eq!(got.unwrap_err(), "AI gateway error: 503");
    }

    #[tokio::test(start_paused = true)]
    async fn missing_job_surfaces_as_an_error() {
        let store = test_store().await;
        let (tx, mut rx) = mpsc::unbounded_channel::<Result<JobRecord, String>>();
        let errors = tx.clone();
        let _poller = JobPoller::spawn(
            store,
            "no-such-job".to_string(),
            move |job| {
                tx.send(Ok(job)).unwrap();
            },
            move |msg| {
                errors.send(Err(msg)).unwrap();
            },
        );
        let got = rx.recv().await.unwrap();
        assert!(got.unwrap_err().contains("not found"));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_without_firing_callbacks() {
        let store = test_store().await;
        let job = pending_job(&store).await;

        let (tx, mut rx) = mpsc::unbounded_channel::<Result<JobRecord, String>>();
        let errors = tx.clone();
        let poller = JobPoller::spawn(
            store.clone(),
            job.id.clone(),
            move |job| {
                tx.send(Ok(job)).unwrap();
            },
            move |msg| {
                errors.send(Err(msg)).unwrap();
            },
        );

        tokio::time::sleep(POLL_INTERVAL * 3).await;
        poller.stop().await;

        // Even if the job finishes afterwards, nobody is listening.
        store.claim_job(&job.id).await.unwrap();
        store.complete_job(&job.id, &json!({})).await.unwrap();
        tokio::time::sleep(POLL_INTERVAL * 3).await;
        assert!(rx.recv().await.is_none());
    }
}
