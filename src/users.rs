//! User accounts.
//!
//! Users own files. Deleting a user removes every file it owns and the
//! tags of those files, in one transaction.
//!
//! Credentials are stored as `sha256$<salt>$<hex digest>`; see
//! [`hash_credential`].

use sha2::{Digest, Sha256};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::error::{is_unique_violation_on, ErrorKind, StoreError, StoreResult};
use crate::models::{from_millis, now_millis, NewUser, User};
use crate::store::MetadataStore;

const DEFAULT_ROLE: &str = "user";
const HASH_SCHEME: &str = "sha256";

impl MetadataStore {
    pub async fn create_user(&self, new: &NewUser) -> StoreResult<User> {
        let username = new.username.trim();
        if username.is_empty() {
            return Err(StoreError::invalid_input("username must not be empty"));
        }
        let role = new
            .role
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_ROLE);
        let now = now_millis();

        let inserted = sqlx::query(
            "INSERT INTO users (username, credential_hash, role, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(username)
        .bind(&new.credential_hash)
        .bind(role)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await;

        let id = match inserted {
            Ok(done) => done.last_insert_rowid(),
            Err(e) if is_unique_violation_on(&e, "users", "username") => {
                return Err(StoreError::conflict(format!(
                    "User '{}' already exists",
                    username
                )));
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(user_id = id, username, role, "created user");
        self.get_user(id).await
    }

    pub async fn get_user(&self, user_id: i64) -> StoreResult<User> {
        let row = sqlx::query(
            "SELECT id, username, credential_hash, role, created_at, updated_at FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref()
            .map(user_from_row)
            .ok_or_else(|| StoreError::not_found(format!("No user with ID: {}", user_id)))
    }

    pub async fn find_user(&self, username: &str) -> StoreResult<User> {
        let row = sqlx::query(
            "SELECT id, username, credential_hash, role, created_at, updated_at FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref()
            .map(user_from_row)
            .ok_or_else(|| StoreError::not_found(format!("No user named '{}'", username)))
    }

    /// The user named `username` if `secret` matches its stored credential.
    ///
    /// An unknown username and a wrong secret both give `Ok(None)`.
    pub async fn authenticate(&self, username: &str, secret: &str) -> StoreResult<Option<User>> {
        let user = match self.find_user(username).await {
            Ok(user) => user,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };
        if verify_credential(secret, &user.credential_hash) {
            Ok(Some(user))
        } else {
            tracing::debug!(username, "credential mismatch");
            Ok(None)
        }
    }

    pub async fn list_users(&self) -> StoreResult<Vec<User>> {
        let rows = sqlx::query(
            "SELECT id, username, credential_hash, role, created_at, updated_at FROM users ORDER BY id",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows.iter().map(user_from_row).collect())
    }

    /// Delete a user with every file it owns. Returns the number of files
    /// removed.
    pub async fn delete_user(&self, user_id: i64) -> StoreResult<u64> {
        let mut tx = self.pool().begin().await?;

        let result = async {
            sqlx::query("DELETE FROM tags WHERE file_id IN (SELECT id FROM files WHERE owner_id = ?)")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            let files = sqlx::query("DELETE FROM files WHERE owner_id = ?")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            let users = sqlx::query("DELETE FROM users WHERE id = ?")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            if users.rows_affected() == 0 {
                return Err(StoreError::not_found(format!("No user with ID: {}", user_id)));
            }
            Ok::<u64, StoreError>(files.rows_affected())
        }
        .await;

        match result {
            Ok(files_removed) => {
                tx.commit().await?;
                tracing::info!(user_id, files_removed, "deleted user");
                Ok(files_removed)
            }
            Err(err) => {
                if let Err(e) = tx.rollback().await {
                    tracing::warn!(error = %e, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

fn user_from_row(row: &SqliteRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        credential_hash: row.get("credential_hash"),
        role: row.get("role"),
        created_at: from_millis(row.get("created_at")),
        updated_at: from_millis(row.get("updated_at")),
    }
}

/// Salted SHA-256 of `secret`, as `sha256$<salt>$<hex>`.
pub fn hash_credential(secret: &str) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    format!("{}${}${}", HASH_SCHEME, salt, digest(&salt, secret))
}

/// Check `secret` against a value produced by [`hash_credential`].
pub(crate) fn verify_credential(secret: &str, stored: &str) -> bool {
    let mut parts = stored.splitn(3, '$');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(HASH_SCHEME), Some(salt), Some(expected)) => digest(salt, secret) == expected,
        _ => false,
    }
}

fn digest(salt: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let stored = hash_credential("hunter2");
        assert!(stored.starts_with("sha256$"));
        assert!(verify_credential("hunter2", &stored));
        assert!(!verify_credential("hunter3", &stored));
    }

    #[test]
    fn test_hash_is_salted() {
        assert_ne!(hash_credential("same"), hash_credential("same"));
    }

    #[test]
    fn test_verify_rejects_malformed() {
        assert!(!verify_credential("x", "plaintext"));
        assert!(!verify_credential("x", "md5$salt$abcd"));
    }
}
