use anyhow::Result;
use rusqlite::params;

use super::JobStore;
use super::types::{LearningPathRecord, LessonRecord};

const PATH_COLUMNS: &str =
    "id, user_id, title, description, difficulty, topics, total_lessons, current_lesson, created_at";

fn read_path(row: &rusqlite::Row) -> rusqlite::Result<(LearningPathRecord, String)> {
    let topics_json: String = row.get(5)?;
    Ok((
        LearningPathRecord {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            difficulty: row.get(4)?,
            topics: serde_json::Value::Null,
            total_lessons: row.get(6)?,
            current_lesson: row.get(7)?,
            created_at: row.get(8)?,
        },
        topics_json,
    ))
}

fn finish_path((mut rec, topics_json): (LearningPathRecord, String)) -> Result<LearningPathRecord> {
    rec.topics = serde_json::from_str(&topics_json)?;
    Ok(rec)
}

impl JobStore {
    pub async fn insert_learning_path(
        &self,
        user_id: &str,
        title: &str,
        description: &str,
        difficulty: &str,
        topics: &serde_json::Value,
        total_lessons: i64,
    ) -> Result<LearningPathRecord> {
        let id = uuid::Uuid::new_v4().to_string();
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO learning_paths (id, user_id, title, description, difficulty, topics, total_lessons, current_lesson)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1)",
            params![
                id,
                user_id,
                title,
                description,
                difficulty,
                serde_json::to_string(topics)?,
                total_lessons,
            ],
        )?;
        let raw = db.query_row(
            &format!("SELECT {PATH_COLUMNS} FROM learning_paths WHERE id = ?1"),
            params![id],
            read_path,
        )?;
        finish_path(raw)
    }

    pub async fn get_learning_path(&self, id: &str) -> Result<Option<LearningPathRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {PATH_COLUMNS} FROM learning_paths WHERE id = ?1 LIMIT 1"
        ))?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(finish_path(read_path(row)?)?)),
            None => Ok(None),
        }
    }

    /// Ownership-scoped fetch used at the submission boundary.
    pub async fn get_learning_path_for_user(
        &self,
        id: &str,
        user_id: &str,
    ) -> Result<Option<LearningPathRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {PATH_COLUMNS} FROM learning_paths WHERE id = ?1 AND user_id = ?2 LIMIT 1"
        ))?;
        let mut rows = stmt.query(params![id, user_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(finish_path(read_path(row)?)?)),
            None => Ok(None),
        }
    }

    pub async fn lesson_count(&self, path_id: &str) -> Result<i64> {
        let db = self.db.lock().await;
        let count = db.query_row(
            "SELECT COUNT(*) FROM lessons WHERE learning_path_id = ?1",
            params![path_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Duplicate-execution guard: handlers re-check each ordinal before
    /// inserting since an overlapping worker may have written it already.
    pub async fn lesson_exists(&self, path_id: &str, lesson_number: i64) -> Result<bool> {
        let db = self.db.lock().await;
        let count: i64 = db.query_row(
            "SELECT COUNT(*) FROM lessons WHERE learning_path_id = ?1 AND lesson_number = ?2",
            params![path_id, lesson_number],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub async fn insert_lesson(
        &self,
        path_id: &str,
        lesson_number: i64,
        title: &str,
        topic: &str,
        explanations: &serde_json::Value,
        quizzes: &serde_json::Value,
    ) -> Result<()> {
        let id = uuid::Uuid::new_v4().to_string();
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO lessons (id, learning_path_id, lesson_number, title, topic, explanations, quizzes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                path_id,
                lesson_number,
                title,
                topic,
                serde_json::to_string(explanations)?,
                serde_json::to_string(quizzes)?,
            ],
        )?;
        Ok(())
    }

    /// Make every lesson query and insert fail. Test-only knob for
    /// simulating store trouble after path creation.
    #[cfg(test)]
    pub(crate) async fn drop_lessons_table(&self) {
        let db = self.db.lock().await;
        db.execute("DROP TABLE lessons", []).unwrap();
    }

    pub async fn list_lessons(&self, path_id: &str) -> Result<Vec<LessonRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT id, learning_path_id, lesson_number, title, topic, explanations, quizzes, created_at
             FROM lessons WHERE learning_path_id = ?1 ORDER BY lesson_number ASC",
        )?;
        let rows = stmt.query_map(params![path_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, learning_path_id, lesson_number, title, topic, explanations, quizzes, created_at) =
                row?;
            out.push(LessonRecord {
                id,
                learning_path_id,
                lesson_number,
                title,
                topic,
                explanations: serde_json::from_str(&explanations)?,
                quizzes: serde_json::from_str(&quizzes)?,
                created_at,
            });
        }
        Ok(out)
    }
}
