use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use tracing::{info, warn};

use super::super::generator::{
    ChatMessage, ContentGenerator, Topic, parse_lesson, parse_path_skeleton, select_topic,
};
use super::super::store::JobStore;
use super::super::store::types::{GeneratePathInput, JobRecord};

/// Lessons materialized up front; the rest are produced by extension jobs.
pub const INITIAL_LESSON_BATCH: i64 = 3;

/// Only a prefix of an uploaded file fits in the prompt.
const FILE_EXCERPT_CHARS: usize = 3000;

/// Handle a claimed `generate_path` job: ask the generator for a path
/// skeleton, persist it, then materialize the first lessons.
///
/// The skeleton is load-bearing and any failure there fails the job. A
/// single lesson failing is logged and skipped; the path stays usable and
/// the gap can be filled by a later extension.
pub async fn process(
    store: &JobStore,
    generator: &dyn ContentGenerator,
    job: &JobRecord,
) -> Result<Value> {
    let input: GeneratePathInput = serde_json::from_value(job.input_data.clone())
        .context("job input is not a valid generate_path payload")?;

    let raw = generator
        .generate(&[ChatMessage::user(skeleton_prompt(&input))])
        .await?;
    let skeleton = parse_path_skeleton(&raw)?;

    let path = store
        .insert_learning_path(
            &job.user_id,
            &skeleton.title,
            &skeleton.description,
            &input.difficulty,
            &serde_json::to_value(&skeleton.topics)?,
            skeleton.total_lessons,
        )
        .await?;
    info!(
        "Created learning path {} ({} lessons planned)",
        path.id, skeleton.total_lessons
    );

    let initial = INITIAL_LESSON_BATCH.min(skeleton.total_lessons);
    let written = write_lessons(
        store,
        generator,
        &path.id,
        &skeleton.title,
        &input.difficulty,
        &skeleton.topics,
        1..=initial,
    )
    .await;
    info!("Wrote {written}/{initial} initial lessons for path {}", path.id);

    Ok(json!({ "learningPathId": path.id }))
}

/// Generate and insert lessons for each ordinal in `range`. Returns how many
/// were written. Failures and already-present ordinals are skipped; once the
/// path row exists, no lesson-level trouble may fail the job, so this never
/// returns an error.
pub(super) async fn write_lessons(
    store: &JobStore,
    generator: &dyn ContentGenerator,
    path_id: &str,
    path_title: &str,
    difficulty: &str,
    topics: &[Topic],
    range: std::ops::RangeInclusive<i64>,
) -> usize {
    let mut written = 0;
    for ordinal in range {
        // Another worker may have produced this ordinal already.
        match store.lesson_exists(path_id, ordinal).await {
            Ok(true) => {
                info!("Lesson {ordinal} for path {path_id} already exists, skipping");
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                warn!("Could not check lesson {ordinal} of path {path_id}, skipping: {e}");
                continue;
            }
        }
        let Some((topic, subtopic)) = select_topic(topics, ordinal) else {
            warn!("No topic available for lesson {ordinal} of path {path_id}, skipping");
            continue;
        };
        let prompt = lesson_prompt(path_title, difficulty, &topic.title, subtopic);
        let lesson = match generator.generate(&[ChatMessage::user(prompt)]).await {
            Ok(raw) => match parse_lesson(&raw) {
                Ok(lesson) => lesson,
                Err(e) => {
                    warn!("Skipping lesson {ordinal} of path {path_id}: {e}");
                    continue;
                }
            },
            Err(e) => {
                warn!("Skipping lesson {ordinal} of path {path_id}: {e}");
                continue;
            }
        };
        let (explanations, quizzes) = match (
            serde_json::to_value(&lesson.explanations),
            serde_json::to_value(&lesson.quizzes),
        ) {
            (Ok(e), Ok(q)) => (e, q),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Could not encode lesson {ordinal} of path {path_id}, skipping: {e}");
                continue;
            }
        };
        let title = format!("{}: {subtopic}", topic.title);
        if let Err(e) = store
            .insert_lesson(path_id, ordinal, &title, subtopic, &explanations, &quizzes)
            .await
        {
            warn!("Could not store lesson {ordinal} of path {path_id}: {e}");
            continue;
        }
        written += 1;
    }
    written
}

fn skeleton_prompt(input: &GeneratePathInput) -> String {
    let mut prompt = format!(
        "Create a structured learning path for the following request.\n\n\
         Request: {}\nDifficulty: {}\n",
        input.prompt, input.difficulty
    );
    if let Some(file) = &input.file_contents {
        let excerpt: String = file.chars().take(FILE_EXCERPT_CHARS).collect();
        prompt.push_str(&format!(
            "\nThe learner attached reference material. Use it to shape the path:\n{excerpt}\n"
        ));
    }
    prompt.push_str(
        "\nRespond with JSON only, no prose, in this shape:\n\
         {\"title\": string, \"description\": string, \
         \"topics\": [{\"title\": string, \"subtopics\": [string]}], \
         \"total_lessons\": number}\n\
         Give 3-6 topics with 2-4 subtopics each and a total_lessons between 10 and 30.",
    );
    prompt
}

fn lesson_prompt(path_title: &str, difficulty: &str, topic: &str, subtopic: &str) -> String {
    format!(
        "Write one lesson for the learning path \"{path_title}\" ({difficulty} level).\n\
         Topic: {topic}\nSubtopic: {subtopic}\n\n\
         Respond with JSON only, no prose, in this shape:\n\
         {{\"explanations\": [{{\"title\": string, \"content\": string}}], \
         \"quizzes\": [{{\"question\": string, \"options\": [string], \"correctAnswer\": string}}]}}\n\
         Give 2-3 explanations and 2-3 quizzes. Each quiz needs at least 2 options \
         and correctAnswer must match one of them exactly."
    )
}

pub(super) fn parse_topics(topics: &Value) -> Result<Vec<Topic>> {
    serde_json::from_value(topics.clone())
        .map_err(|e| anyhow!("learning path has malformed topics: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input_with_file(file: String) -> GeneratePathInput {
        GeneratePathInput {
            prompt: "Learn Python basics".to_string(),
            file_contents: Some(file),
            difficulty: "beginner".to_string(),
            file_name: None,
            file_size: None,
            mime_type: None,
        }
    }

    #[test]
    fn skeleton_prompt_truncates_attached_files() {
        let file = format!("{}OVERFLOW", "x".repeat(FILE_EXCERPT_CHARS));
        let prompt = skeleton_prompt(&input_with_file(file));
        assert!(!prompt.contains("OVERFLOW"));
        assert!(prompt.contains(&"x".repeat(FILE_EXCERPT_CHARS)));
    }

    #[test]
    fn skeleton_prompt_keeps_short_files_whole() {
        let prompt = skeleton_prompt(&input_with_file("fn main() {}".to_string()));
        assert!(prompt.contains("fn main() {}"));
        assert!(prompt.contains("Learn Python basics"));
        assert!(prompt.contains("beginner"));
    }
}
