//! Current refresh token storage.
//!
//! Each user row holds at most one refresh token. Writing a new one revokes
//! the previous value; there is no blacklist, a stale token simply stops
//! matching.

use sqlx::sqlite::SqlitePool;

/// Store for the single live refresh token on each user.
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Overwrite the stored refresh token unconditionally.
    /// Returns false if the user does not exist.
    pub async fn set_current_refresh_token(
        &self,
        user_id: i64,
        token: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET refresh_token = ? WHERE id = ?")
            .bind(token)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove the stored refresh token. Clearing an already empty slot is a no-op.
    pub async fn clear_current_refresh_token(&self, user_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET refresh_token = NULL WHERE id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Exact comparison against the stored value. False when nothing is stored.
    pub async fn compare_current_refresh_token(
        &self,
        user_id: i64,
        presented: &str,
    ) -> Result<bool, sqlx::Error> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT refresh_token FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(matches!(row, Some((Some(stored),)) if stored == presented))
    }

    /// Replace `expected` with `replacement` in a single statement.
    ///
    /// Returns false when the stored value no longer equals `expected`, i.e.
    /// another rotation or a logout got there first.
    pub async fn rotate_refresh_token(
        &self,
        user_id: i64,
        expected: &str,
        replacement: &str,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE users SET refresh_token = ? WHERE id = ? AND refresh_token = ?")
                .bind(replacement)
                .bind(user_id)
                .bind(expected)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }
}
