use anyhow::Result;
use rusqlite::params;
use sha2::{Digest, Sha256};

use super::JobStore;
use super::types::ApiTokenRecord;

fn hash_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

impl JobStore {
    /// Mint a bearer token for `user_id`. Only the SHA-256 hash is stored;
    /// the raw token is returned once and cannot be recovered later.
    pub async fn create_api_token(
        &self,
        user_id: &str,
        name: &str,
    ) -> Result<(String, ApiTokenRecord)> {
        let id = uuid::Uuid::new_v4().to_string();
        let raw = format!("pfk_{}", uuid::Uuid::new_v4().simple());
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO api_tokens (id, user_id, name, token_hash) VALUES (?1, ?2, ?3, ?4)",
            params![id, user_id, name, hash_token(&raw)],
        )?;
        Ok((
            raw,
            ApiTokenRecord {
                id,
                user_id: user_id.to_string(),
                name: name.to_string(),
            },
        ))
    }

    /// Resolve a raw bearer token to its owning user, if valid.
    pub async fn resolve_api_token(&self, raw: &str) -> Result<Option<String>> {
        let db = self.db.lock().await;
        let mut stmt =
            db.prepare("SELECT user_id FROM api_tokens WHERE token_hash = ?1 LIMIT 1")?;
        let mut rows = stmt.query(params![hash_token(raw)])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }
}
