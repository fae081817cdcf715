use serde::{Deserialize, Serialize};

/// Lifecycle states of an asynchronous generation job.
///
/// Transitions are monotonic: `Pending -> Processing -> {Completed | Failed}`,
/// with `Processing -> Pending` when a failed attempt still has retries left.
/// `Completed` and `Cancelled` rows are never mutated again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    GeneratePath,
    ExtendPath,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::GeneratePath => "generate_path",
            JobType::ExtendPath => "extend_path",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "generate_path" => Some(JobType::GeneratePath),
            "extend_path" => Some(JobType::ExtendPath),
            _ => None,
        }
    }
}

/// A durable job row. `input_data` is opaque here and decoded into the
/// type matching `job_type` at the handler boundary.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: String,
    pub user_id: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub input_data: serde_json::Value,
    pub result_data: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub idempotency_key: String,
    pub attempts: i64,
    pub max_attempts: i64,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub metadata: serde_json::Value,
}

/// Payload for a `generate_path` job, stored verbatim in `input_data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratePathInput {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_contents: Option<String>,
    pub difficulty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Payload for an `extend_path` job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendPathInput {
    pub path_id: String,
}

#[derive(Debug, Clone)]
pub struct LearningPathRecord {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub difficulty: String,
    pub topics: serde_json::Value,
    pub total_lessons: i64,
    pub current_lesson: i64,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct LessonRecord {
    pub id: String,
    pub learning_path_id: String,
    pub lesson_number: i64,
    pub title: String,
    pub topic: String,
    pub explanations: serde_json::Value,
    pub quizzes: serde_json::Value,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct ApiTokenRecord {
    pub id: String,
    pub user_id: String,
    pub name: String,
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Denied { minutes_remaining: i64 },
}
