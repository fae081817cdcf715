use anyhow::Result;
use rusqlite::params;

use super::types::RateDecision;
use super::{JobStore, unix_now};

pub const RATE_WINDOW_SECS: i64 = 3600;

impl JobStore {
    /// Sliding-window quota check: at most `ceiling` requests per
    /// (user, action) within the hour that started at first use.
    ///
    /// A fresh window is created lazily when none is active; an expired
    /// window is simply superseded by the next insert. The count is only
    /// incremented on an allowed request, so denials never extend the window.
    pub async fn check_and_increment(
        &self,
        user_id: &str,
        action_type: &str,
        ceiling: i64,
    ) -> Result<RateDecision> {
        let now = unix_now();
        let db = self.db.lock().await;

        let active: Option<(String, i64, i64)> = {
            let mut stmt = db.prepare(
                "SELECT id, count, window_end FROM rate_limits
                 WHERE user_id = ?1 AND action_type = ?2 AND window_end > ?3
                 ORDER BY window_end DESC LIMIT 1",
            )?;
            let mut rows = stmt.query(params![user_id, action_type, now])?;
            match rows.next()? {
                Some(row) => Some((row.get(0)?, row.get(1)?, row.get(2)?)),
                None => None,
            }
        };

        match active {
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                db.execute(
                    "INSERT INTO rate_limits (id, user_id, action_type, count, window_start, window_end)
                     VALUES (?1, ?2, ?3, 1, ?4, ?5)",
                    params![id, user_id, action_type, now, now + RATE_WINDOW_SECS],
                )?;
                Ok(RateDecision::Allowed)
            }
            Some((id, count, _)) if count < ceiling => {
                db.execute(
                    "UPDATE rate_limits SET count = count + 1 WHERE id = ?1",
                    params![id],
                )?;
                Ok(RateDecision::Allowed)
            }
            Some((_, _, window_end)) => {
                let minutes_remaining = ((window_end - now) + 59) / 60;
                Ok(RateDecision::Denied { minutes_remaining })
            }
        }
    }

    /// Make every rate-limit check fail. Test-only knob for exercising the
    /// fail-open path at the submission boundary.
    #[cfg(test)]
    pub(crate) async fn drop_rate_limits_table(&self) {
        let db = self.db.lock().await;
        db.execute("DROP TABLE rate_limits", []).unwrap();
    }

    /// Shift the active window into the past. Test-only knob for simulating
    /// window expiry without waiting an hour.
    #[cfg(test)]
    pub(crate) async fn rewind_rate_window(&self, user_id: &str, action_type: &str) {
        let db = self.db.lock().await;
        db.execute(
            "UPDATE rate_limits SET window_end = window_start - 1
             WHERE user_id = ?1 AND action_type = ?2",
            params![user_id, action_type],
        )
        .unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_store;
    use super::*;

    #[tokio::test]
    async fn requests_under_ceiling_are_allowed() {
        let store = test_store().await;
        for _ in 0..5 {
            let decision = store
                .check_and_increment("user-1", "create_path", 5)
                .await
                .unwrap();
            assert_eq!(decision, RateDecision::Allowed);
        }
    }

    #[tokio::test]
    async fn request_at_ceiling_is_denied_with_retry_after() {
        let store = test_store().await;
        for _ in 0..5 {
            store
                .check_and_increment("user-1", "create_path", 5)
                .await
                .unwrap();
        }
        match store
            .check_and_increment("user-1", "create_path", 5)
            .await
            .unwrap()
        {
            RateDecision::Denied { minutes_remaining } => {
                assert!(minutes_remaining > 0 && minutes_remaining <= 60);
            }
            RateDecision::Allowed => panic!("sixth request should be denied"),
        }
    }

    #[tokio::test]
    async fn expired_window_resets_the_quota() {
        let store = test_store().await;
        for _ in 0..5 {
            store
                .check_and_increment("user-1", "create_path", 5)
                .await
                .unwrap();
        }
        store.rewind_rate_window("user-1", "create_path").await;
        let decision = store
            .check_and_increment("user-1", "create_path", 5)
            .await
            .unwrap();
        assert_eq!(decision, RateDecision::Allowed);
    }

    #[tokio::test]
    async fn actions_and_users_have_independent_windows() {
        let store = test_store().await;
        for _ in 0..5 {
            store
                .check_and_increment("user-1", "create_path", 5)
                .await
                .unwrap();
        }
        // Same user, different action.
        assert_eq!(
            store
                .check_and_increment("user-1", "extend_path", 10)
                .await
                .unwrap(),
            RateDecision::Allowed
        );
        // Different user, same action.
        assert_eq!(
            store
                .check_and_increment("user-2", "create_path", 5)
                .await
                .unwrap(),
            RateDecision::Allowed
        );
    }

    #[tokio::test]
    async fn denied_requests_do_not_inflate_the_count() {
        let store = test_store().await;
        for _ in 0..3 {
            store
                .check_and_increment("user-1", "create_path", 2)
                .await
                .unwrap();
        }
        store.rewind_rate_window("user-1", "create_path").await;
        // A fresh window starts at 1, so two more requests fit.
        for _ in 0..2 {
            assert_eq!(
                store
                    .check_and_increment("user-1", "create_path", 2)
                    .await
                    .unwrap(),
                RateDecision::Allowed
            );
        }
    }
}
