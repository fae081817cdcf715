mod gateway;

pub use gateway::GatewayGenerator;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// The external content generator. Handlers only see raw text back; parsing
/// and validation happen on this side of the boundary.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Structured path skeleton expected from the generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSkeleton {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub topics: Vec<Topic>,
    pub total_lessons: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub title: String,
    pub subtopics: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonContent {
    pub explanations: Vec<Explanation>,
    pub quizzes: Vec<Quiz>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explanation {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: String,
}

/// Models wrap JSON answers in fenced code blocks more often than not.
/// Remove the markers so the remainder parses as plain JSON.
pub fn strip_code_fences(content: &str) -> String {
    let fence = Regex::new(r"```(?:json)?\n?").expect("static fence pattern");
    fence.replace_all(content, "").trim().to_string()
}

pub fn parse_path_skeleton(raw: &str) -> Result<PathSkeleton> {
    let cleaned = strip_code_fences(raw);
    let skeleton: PathSkeleton = serde_json::from_str(&cleaned)
        .map_err(|e| anyhow!("generator returned malformed path structure: {e}"))?;
    if skeleton.title.trim().is_empty() {
        bail!("generator returned a path without a title");
    }
    if skeleton.topics.is_empty() {
        bail!("generator returned a path without topics");
    }
    if skeleton.total_lessons < 1 {
        bail!("generator returned a path without lessons");
    }
    Ok(skeleton)
}

pub fn parse_lesson(raw: &str) -> Result<LessonContent> {
    let cleaned = strip_code_fences(raw);
    let lesson: LessonContent = serde_json::from_str(&cleaned)
        .map_err(|e| anyhow!("generator returned malformed lesson content: {e}"))?;
    validate_lesson(&lesson)?;
    Ok(lesson)
}

fn validate_lesson(lesson: &LessonContent) -> Result<()> {
    if lesson.explanations.is_empty() {
        bail!("lesson has no explanations");
    }
    for exp in &lesson.explanations {
        if exp.title.trim().is_empty() || exp.content.trim().is_empty() {
            bail!("each explanation must have a title and content");
        }
    }
    if lesson.quizzes.is_empty() {
        bail!("lesson has no quizzes");
    }
    for quiz in &lesson.quizzes {
        if quiz.question.trim().is_empty() {
            bail!("each quiz must have a question");
        }
        if quiz.options.len() < 2 {
            bail!("each quiz needs at least 2 options");
        }
        if !quiz.options.contains(&quiz.correct_answer) {
            bail!("quiz correct answer must be one of its options");
        }
    }
    Ok(())
}

/// Round-robin (topic, subtopic) selection for the 1-based lesson `ordinal`.
///
/// Walks topics first, then advances through each topic's subtopics on every
/// full pass, so the first `topics.len() * subtopics.len()` lessons never
/// repeat a pair.
pub fn select_topic(topics: &[Topic], ordinal: i64) -> Option<(&Topic, &str)> {
    if topics.is_empty() || ordinal < 1 {
        return None;
    }
    let i = (ordinal - 1) as usize;
    let topic = &topics[i % topics.len()];
    if topic.subtopics.is_empty() {
        return None;
    }
    let subtopic = &topic.subtopics[(i / topics.len()) % topic.subtopics.len()];
    Some((topic, subtopic.as_str()))
}
