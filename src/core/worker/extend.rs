use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use tracing::info;

use super::super::generator::ContentGenerator;
use super::super::store::JobStore;
use super::super::store::types::{ExtendPathInput, JobRecord};
use super::generate::{INITIAL_LESSON_BATCH, parse_topics, write_lessons};

/// Handle a claimed `extend_path` job: append the next batch of lessons to
/// an existing path, continuing the round-robin topic walk where it left off.
pub async fn process(
    store: &JobStore,
    generator: &dyn ContentGenerator,
    job: &JobRecord,
) -> Result<Value> {
    let input: ExtendPathInput = serde_json::from_value(job.input_data.clone())
        .context("job input is not a valid extend_path payload")?;

    let path = store
        .get_learning_path(&input.path_id)
        .await?
        .ok_or_else(|| anyhow!("learning path {} not found", input.path_id))?;
    let topics = parse_topics(&path.topics)?;

    let existing = store.lesson_count(&path.id).await?;
    let remaining = path.total_lessons - existing;
    if remaining <= 0 {
        // Submission guards against this; a job can still race past it.
        return Err(anyhow!(
            "learning path {} is already at maximum lessons",
            path.id
        ));
    }

    let batch = INITIAL_LESSON_BATCH.min(remaining);
    let range = (existing + 1)..=(existing + batch);
    let written = write_lessons(
        store,
        generator,
        &path.id,
        &path.title,
        &path.difficulty,
        &topics,
        range,
    )
    .await;
    info!("Extended path {} with {written}/{batch} lessons", path.id);

    Ok(json!({ "success": true }))
}
