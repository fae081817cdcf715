use anyhow::Result;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use super::store::types::{ExtendPathInput, GeneratePathInput, JobRecord, JobType, RateDecision};
use super::store::{JobStore, unix_now_millis};

pub const MAX_PATHS_PER_HOUR: i64 = 5;
pub const MAX_EXTENSIONS_PER_HOUR: i64 = 10;

const MIN_PROMPT_CHARS: usize = 10;
const MAX_PROMPT_CHARS: usize = 1000;
const MAX_FILE_CHARS: usize = 5_000_000;
const DIFFICULTIES: &[&str] = &["beginner", "intermediate", "advanced"];

/// Synchronous submission failures. All of these leave the store unchanged;
/// a job row exists only when submission returns `Ok`.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("{0}")]
    Validation(String),
    #[error("Learning path not found or access denied")]
    NotFound,
    #[error("Learning path is already complete")]
    AlreadyComplete { current: i64, total: i64 },
    #[error("Extension already in progress for this path")]
    Conflict { job_id: String },
    #[error("{0}")]
    RateLimited(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Validate, rate-limit and enqueue a `generate_path` job. Returns the
/// pending job immediately; generation happens in the worker.
pub async fn submit_generate_path(
    store: &JobStore,
    user_id: &str,
    mut input: GeneratePathInput,
) -> Result<JobRecord, SubmitError> {
    input.prompt = input.prompt.trim().to_string();
    if input.prompt.chars().count() < MIN_PROMPT_CHARS {
        return Err(SubmitError::Validation(format!(
            "prompt must be at least {MIN_PROMPT_CHARS} characters"
        )));
    }
    if input.prompt.chars().count() > MAX_PROMPT_CHARS {
        return Err(SubmitError::Validation(format!(
            "prompt must be less than {MAX_PROMPT_CHARS} characters"
        )));
    }
    if !DIFFICULTIES.contains(&input.difficulty.as_str()) {
        return Err(SubmitError::Validation(
            "difficulty must be beginner, intermediate, or advanced".to_string(),
        ));
    }
    if let Some(file) = &input.file_contents
        && file.chars().count() > MAX_FILE_CHARS
    {
        return Err(SubmitError::Validation(
            "fileContents too large (max 5MB)".to_string(),
        ));
    }

    check_rate_limit(store, user_id, "create_path", MAX_PATHS_PER_HOUR).await?;

    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    let idempotency_key = format!("create_path_{user_id}_{}_{suffix}", unix_now_millis());

    let job = store
        .create_job(
            user_id,
            JobType::GeneratePath,
            &serde_json::to_value(&input).map_err(anyhow::Error::from)?,
            &idempotency_key,
            &json!({ "created_from": "generate-path-submission" }),
        )
        .await?;
    info!("Job created: {} for user {}", job.id, user_id);
    Ok(job)
}

/// Validate ownership, completeness, conflicts and rate limits, then enqueue
/// an `extend_path` job. A duplicate in-flight extension surfaces the
/// existing job id so the caller can poll it instead.
pub async fn submit_extend_path(
    store: &JobStore,
    user_id: &str,
    path_id: &str,
) -> Result<JobRecord, SubmitError> {
    let path_id = path_id.trim();
    if path_id.is_empty() {
        return Err(SubmitError::Validation("pathId is required".to_string()));
    }

    let path = store
        .get_learning_path_for_user(path_id, user_id)
        .await?
        .ok_or(SubmitError::NotFound)?;

    let lesson_count = store.lesson_count(path_id).await?;
    if lesson_count >= path.total_lessons {
        return Err(SubmitError::AlreadyComplete {
            current: lesson_count,
            total: path.total_lessons,
        });
    }

    if let Some(existing) = store.find_active_extension_job(user_id, path_id).await? {
        return Err(SubmitError::Conflict {
            job_id: existing.id,
        });
    }

    check_rate_limit(store, user_id, "extend_path", MAX_EXTENSIONS_PER_HOUR).await?;

    let input = ExtendPathInput {
        path_id: path_id.to_string(),
    };
    let idempotency_key = format!("extend_path_{path_id}_{}", unix_now_millis());
    let job = store
        .create_job(
            user_id,
            JobType::ExtendPath,
            &serde_json::to_value(&input).map_err(anyhow::Error::from)?,
            &idempotency_key,
            &json!({
                "created_from": "extend-path-submission",
                "current_lesson_count": lesson_count,
                "total_lessons": path.total_lessons,
            }),
        )
        .await?;
    info!("Extension job created: {} for path {}", job.id, path_id);
    Ok(job)
}

/// Quota gate. Fails open when the check itself errors: product availability
/// wins over strict enforcement, but the exception is logged so it stays
/// observable.
async fn check_rate_limit(
    store: &JobStore,
    user_id: &str,
    action: &str,
    ceiling: i64,
) -> Result<(), SubmitError> {
    match store.check_and_increment(user_id, action, ceiling).await {
        Ok(RateDecision::Allowed) => Ok(()),
        Ok(RateDecision::Denied { minutes_remaining }) => Err(SubmitError::RateLimited(format!(
            "Rate limit exceeded. You can perform {ceiling} {action} requests per hour. \
             Try again in {minutes_remaining} minutes."
        ))),
        Err(e) => {
            warn!("Rate limit check failed for user {user_id} ({action}), failing open: {e}");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::store::test_store;
    use super::super::store::types::JobStatus;
    use super::*;

    fn generate_input(prompt: &str) -> GeneratePathInput {
        GeneratePathInput {
            prompt: prompt.to_string(),
            file_contents: None,
            difficulty: "beginner".to_string(),
            file_name: None,
            file_size: None,
            mime_type: None,
        }
    }

    fn sample_topics() -> serde_json::Value {
        json!([{"title": "Basics", "subtopics": ["Syntax", "Types"]}])
    }

    #[tokio::test]
    async fn valid_submission_creates_pending_job() {
        let store = test_store().await;
        let job = submit_generate_path(&store, "user-1", generate_input("Learn Python basics"))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.input_data["prompt"], "Learn Python basics");
        assert_eq!(store.count_jobs().await, 1);
    }

    #[tokio::test]
    async fn short_prompt_is_rejected_without_side_effects() {
        let store = test_store().await;
        let err = submit_generate_path(&store, "user-1", generate_input("too short"))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Validation(_)));
        assert_eq!(store.count_jobs().await, 0);
    }

    #[tokio::test]
    async fn overlong_prompt_is_rejected() {
        let store = test_store().await;
        let err = submit_generate_path(&store, "user-1", generate_input(&"x".repeat(1001)))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Validation(_)));
    }

    #[tokio::test]
    async fn unknown_difficulty_is_rejected() {
        let store = test_store().await;
        let mut input = generate_input("Learn Python basics");
        input.difficulty = "expert".to_string();
        let err = submit_generate_path(&store, "user-1", input)
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Validation(_)));
        assert_eq!(store.count_jobs().await, 0);
    }

    #[tokio::test]
    async fn oversized_file_contents_are_rejected() {
        let store = test_store().await;
        let mut input = generate_input("Learn Python basics");
        input.file_contents = Some("x".repeat(5_000_001));
        let err = submit_generate_path(&store, "user-1", input)
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Validation(_)));
        assert_eq!(store.count_jobs().await, 0);
    }

    #[tokio::test]
    async fn file_contents_at_the_cap_are_accepted() {
        let store = test_store().await;
        let mut input = generate_input("Learn Python basics");
        input.file_contents = Some("x".repeat(5_000_000));
        submit_generate_path(&store, "user-1", input).await.unwrap();
        assert_eq!(store.count_jobs().await, 1);
    }

    #[tokio::test]
    async fn rate_limit_store_trouble_fails_open() {
        let store = test_store().await;
        store.drop_rate_limits_table().await;
        // The quota cannot be checked; the submission still goes through.
        let job = submit_generate_path(&store, "user-1", generate_input("Learn Python basics"))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(store.count_jobs().await, 1);
    }

    #[tokio::test]
    async fn prompt_is_trimmed_before_validation() {
        let store = test_store().await;
        let job = submit_generate_path(&store, "user-1", generate_input("   Learn Rust well   "))
            .await
            .unwrap();
        assert_eq!(job.input_data["prompt"], "Learn Rust well");
    }

    #[tokio::test]
    async fn sixth_generate_within_the_hour_is_rate_limited() {
        let store = test_store().await;
        for i in 0..MAX_PATHS_PER_HOUR {
            submit_generate_path(
                &store,
                "user-1",
                generate_input(&format!("Learn subject number {i}")),
            )
            .await
            .unwrap();
        }
        let err = submit_generate_path(&store, "user-1", generate_input("One request too many"))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::RateLimited(_)));
        assert_eq!(store.count_jobs().await, MAX_PATHS_PER_HOUR);

        // After the window elapses the user may submit again.
        store.rewind_rate_window("user-1", "create_path").await;
        submit_generate_path(&store, "user-1", generate_input("Allowed once more"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn extend_unknown_path_is_not_found() {
        let store = test_store().await;
        let err = submit_extend_path(&store, "user-1", "no-such-path")
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::NotFound));
    }

    #[tokio::test]
    async fn extend_foreign_path_is_not_found() {
        let store = test_store().await;
        let path = store
            .insert_learning_path("owner", "T", "", "beginner", &sample_topics(), 10)
            .await
            .unwrap();
        let err = submit_extend_path(&store, "someone-else", &path.id)
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::NotFound));
        assert_eq!(store.count_jobs().await, 0);
    }

    #[tokio::test]
    async fn extend_complete_path_is_rejected() {
        let store = test_store().await;
        let path = store
            .insert_learning_path("user-1", "T", "", "beginner", &sample_topics(), 2)
            .await
            .unwrap();
        for n in 1..=2 {
            store
                .insert_lesson(&path.id, n, "L", "Syntax", &json!([]), &json!([]))
                .await
                .unwrap();
        }
        let err = submit_extend_path(&store, "user-1", &path.id)
            .await
            .unwrap_err();
        match err {
            SubmitError::AlreadyComplete { current, total } => {
                assert_eq!(current, 2);
                assert_eq!(total, 2);
            }
            other => panic!("expected AlreadyComplete, got {other:?}"),
        }
        assert_eq!(store.count_jobs().await, 0);
    }

    #[tokio::test]
    async fn duplicate_extend_returns_existing_job_id() {
        let store = test_store().await;
        let path = store
            .insert_learning_path("user-1", "T", "", "beginner", &sample_topics(), 10)
            .await
            .unwrap();
        let first = submit_extend_path(&store, "user-1", &path.id).await.unwrap();
        let err = submit_extend_path(&store, "user-1", &path.id)
            .await
            .unwrap_err();
        match err {
            SubmitError::Conflict { job_id } => assert_eq!(job_id, first.id),
            other => panic!("expected Conflict, got {other:?}"),
        }
        assert_eq!(store.count_jobs().await, 1);
    }
}
