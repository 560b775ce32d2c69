//! Database queries for the Lockwatch server.

use lockwatch_core::db::{DatabaseError, unix_timestamp};

use super::db::ServerDatabase;
use super::models::{BlockPeriod, Device, Token, User};

impl ServerDatabase {
    // =========================================================================
    // User queries
    // =========================================================================

    /// Create a new user.
    pub async fn create_user(
        &self,
        id: &str,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_user(id).await
    }

    /// Get a user by ID.
    pub async fn get_user(&self, id: &str) -> Result<User, DatabaseError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("User {id}")))
    }

    /// Get a user by username.
    pub async fn get_user_by_username(&self, username: &str) -> Result<User, DatabaseError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("User with username {username}")))
    }

    // =========================================================================
    // Token queries
    // =========================================================================

    /// Store a refresh token.
    pub async fn create_token(
        &self,
        id: &str,
        user_id: &str,
        token_hash: &str,
        expires_at: i64,
    ) -> Result<Token, DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            "INSERT INTO tokens (id, user_id, token_hash, expires_at, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_token(id).await
    }

    /// Get a token by ID.
    pub async fn get_token(&self, id: &str) -> Result<Token, DatabaseError> {
        sqlx::query_as::<_, Token>("SELECT * FROM tokens WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Token {id}")))
    }

    /// Find a valid (non-revoked, non-expired) token by hash.
    pub async fn get_token_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Token>, DatabaseError> {
        let now = unix_timestamp();

        let token = sqlx::query_as::<_, Token>(
            "SELECT * FROM tokens WHERE token_hash = ? AND revoked = 0 AND expires_at > ?",
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(self.pool())
        .await?;

        Ok(token)
    }

    /// Revoke a token by ID.
    pub async fn revoke_token(&self, id: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("UPDATE tokens SET revoked = 1 WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Device queries
    // =========================================================================

    /// Insert or update a device identity row.
    ///
    /// `last_seen` is always overwritten. `name`, `ip`, and `owner_id`
    /// follow the coalesce policy: a new value wins, an absent (or empty,
    /// for `name`) one never clears what is stored. The name is the merge
    /// key for identity reconciliation and must survive a bare re-announce.
    pub async fn upsert_device(
        &self,
        id: &str,
        name: Option<&str>,
        owner_id: Option<&str>,
        ip: Option<&str>,
        last_seen: i64,
    ) -> Result<Device, DatabaseError> {
        sqlx::query(
            "INSERT INTO devices (id, name, owner_id, ip, last_seen) VALUES (?, COALESCE(?, ''), ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               name = COALESCE(NULLIF(excluded.name, ''), devices.name),
               last_seen = excluded.last_seen,
               ip = COALESCE(excluded.ip, devices.ip),
               owner_id = COALESCE(excluded.owner_id, devices.owner_id)",
        )
        .bind(id)
        .bind(name)
        .bind(owner_id)
        .bind(ip)
        .bind(last_seen)
        .execute(self.pool())
        .await?;

        self.get_device(id).await
    }

    /// Get a device by ID.
    pub async fn get_device(&self, id: &str) -> Result<Device, DatabaseError> {
        sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Device {id}")))
    }

    /// Find the most-recently-seen device with the given display name.
    ///
    /// Names are not unique; the highest `last_seen` row wins the tie.
    pub async fn find_device_by_name(&self, name: &str) -> Result<Option<Device>, DatabaseError> {
        let device = sqlx::query_as::<_, Device>(
            "SELECT * FROM devices WHERE name = ? ORDER BY last_seen DESC LIMIT 1",
        )
        .bind(name)
        .fetch_optional(self.pool())
        .await?;

        Ok(device)
    }

    /// Upsert a device's last reported status. Creates the row if a status
    /// report raced ahead of the announce for a never-seen device.
    pub async fn upsert_device_status(
        &self,
        id: &str,
        status: &str,
        at: i64,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO devices (id, last_status, last_status_at, last_seen) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               last_status = excluded.last_status,
               last_status_at = excluded.last_status_at",
        )
        .bind(id)
        .bind(status)
        .bind(at)
        .bind(at)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Update a device's `last_seen` timestamp.
    pub async fn update_last_seen(&self, id: &str, at: i64) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE devices SET last_seen = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    /// List devices for an owner, most recently seen first.
    pub async fn list_devices_by_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<Device>, DatabaseError> {
        let devices = sqlx::query_as::<_, Device>(
            "SELECT * FROM devices WHERE owner_id = ? ORDER BY last_seen DESC",
        )
        .bind(owner_id)
        .fetch_all(self.pool())
        .await?;

        Ok(devices)
    }

    /// List every persisted device.
    pub async fn list_all_devices(&self) -> Result<Vec<Device>, DatabaseError> {
        let devices =
            sqlx::query_as::<_, Device>("SELECT * FROM devices ORDER BY last_seen DESC")
                .fetch_all(self.pool())
                .await?;

        Ok(devices)
    }

    // =========================================================================
    // Block period queries
    // =========================================================================

    /// Create a block period for an owner.
    pub async fn create_block_period(
        &self,
        id: &str,
        owner_id: &str,
        from_time: &str,
        to_time: &str,
        days: &str,
    ) -> Result<BlockPeriod, DatabaseError> {
        sqlx::query(
            "INSERT INTO block_periods (id, owner_id, from_time, to_time, days) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(owner_id)
        .bind(from_time)
        .bind(to_time)
        .bind(days)
        .execute(self.pool())
        .await?;

        self.get_block_period(id).await
    }

    /// Get a block period by ID.
    pub async fn get_block_period(&self, id: &str) -> Result<BlockPeriod, DatabaseError> {
        sqlx::query_as::<_, BlockPeriod>("SELECT * FROM block_periods WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Block period {id}")))
    }

    /// List block periods for an owner.
    pub async fn list_block_periods(
        &self,
        owner_id: &str,
    ) -> Result<Vec<BlockPeriod>, DatabaseError> {
        let periods = sqlx::query_as::<_, BlockPeriod>(
            "SELECT * FROM block_periods WHERE owner_id = ? ORDER BY from_time",
        )
        .bind(owner_id)
        .fetch_all(self.pool())
        .await?;

        Ok(periods)
    }

    /// Update a block period, scoped to its owner.
    pub async fn update_block_period(
        &self,
        id: &str,
        owner_id: &str,
        from_time: &str,
        to_time: &str,
        days: &str,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE block_periods SET from_time = ?, to_time = ?, days = ? WHERE id = ? AND owner_id = ?",
        )
        .bind(from_time)
        .bind(to_time)
        .bind(days)
        .bind(id)
        .bind(owner_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a block period, scoped to its owner.
    pub async fn delete_block_period(
        &self,
        id: &str,
        owner_id: &str,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM block_periods WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
