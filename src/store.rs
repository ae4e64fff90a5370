//! The metadata store.
//!
//! [`MetadataStore`] owns a SQLite pool and a [`PathInspector`], and
//! implements the five file operations: create, get, list/search, update,
//! and delete. Each call opens its own transaction and commits or rolls it
//! back before returning, so no partial tag set is ever visible.
//!
//! Tags belong to exactly one file. They are loaded with their file,
//! written only through [`MetadataStore::create`] and
//! [`MetadataStore::update`], and removed in the same transaction that
//! removes their file.
//!
//! # Write ordering
//!
//! Mutating operations issue a write as their first statement (the file
//! insert, the `updated_at` touch, or the tag delete). SQLite then takes the
//! write lock before any read in the transaction, so checks performed later
//! in the same transaction see the latest committed state.

use sqlx::sqlite::{Sqlite, SqliteConnection, SqliteRow};
use sqlx::{QueryBuilder, Row, SqlitePool, Transaction};
use std::collections::HashMap;
use std::sync::Arc;

use crate::codec;
use crate::config::Config;
use crate::db;
use crate::error::{is_unique_violation_on, StoreError, StoreResult};
use crate::inspect::{filename_of, LocalInspector, PathInspector};
use crate::migrate;
use crate::models::{from_millis, now_millis, File, FileUpdate, Identity, NewFile, Tag, TagMap};
use crate::search;

/// Column list used by every query that materializes a [`File`].
pub(crate) const FILE_COLUMNS: &str =
    "f.id, f.filename, f.filepath, f.owner_id, f.created_by, f.created_at, f.updated_at, f.inferred_tags";

/// Max file ids per `IN (...)` list when loading tags.
const TAG_FETCH_BATCH: usize = 500;

pub struct MetadataStore {
    pool: SqlitePool,
    inspector: Arc<dyn PathInspector>,
    default_created_by: String,
}

impl MetadataStore {
    pub fn new(pool: SqlitePool, inspector: Arc<dyn PathInspector>) -> Self {
        Self {
            pool,
            inspector,
            default_created_by: "system".to_string(),
        }
    }

    /// Identity recorded as `created_by` when a create carries none.
    pub fn with_default_created_by(mut self, name: impl Into<String>) -> Self {
        self.default_created_by = name.into();
        self
    }

    /// Connect to the configured database, ensure the schema exists, and
    /// inspect the local filesystem.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        migrate::create_schema(&pool).await?;
        Ok(Self::new(pool, Arc::new(LocalInspector))
            .with_default_created_by(config.store.default_created_by.clone()))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Record metadata for an existing path.
    ///
    /// Fails with `NotFound` if the path does not exist and with `Conflict`
    /// (naming the existing id) if the path is already tracked, including
    /// when a concurrent create wins the race for the same path.
    pub async fn create(&self, new: &NewFile, identity: &Identity) -> StoreResult<File> {
        let filepath = new.filepath.as_str();
        if filepath.trim().is_empty() {
            return Err(StoreError::invalid_input("filepath must not be empty"));
        }
        validate_keys(new.custom_tags.keys())?;

        if !self.inspector.exists(filepath) {
            return Err(StoreError::not_found(format!(
                "File not found at: {}",
                filepath
            )));
        }

        let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM files WHERE filepath = ?")
            .bind(filepath)
            .fetch_optional(&self.pool)
            .await?;
        if let Some(id) = existing {
            return Err(already_exists(filepath, Some(id)));
        }

        let inferred = serde_json::to_string(&self.inspector.infer(filepath))?;
        let created_by = identity
            .created_by
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.default_created_by);

        let row = FileInsert {
            filename: filename_of(filepath),
            filepath,
            owner_id: identity.owner_id,
            created_by,
            inferred_tags: inferred,
            now: now_millis(),
        };

        let mut tx = self.pool.begin().await?;
        let result = create_in(&mut tx, &row, &new.custom_tags).await;
        let file = match result {
            Ok(file) => file,
            Err(err) => {
                rollback(tx).await;
                return Err(err);
            }
        };

        if let Err(err) = tx.commit().await {
            if is_unique_violation_on(&err, "files", "filepath") {
                let winner = find_id_by_path(&self.pool, filepath).await.ok().flatten();
                return Err(already_exists(filepath, winner));
            }
            return Err(err.into());
        }

        tracing::info!(
            file_id = file.id,
            filepath = %file.filepath,
            owner_id = ?file.owner,
            tags = file.tags.len(),
            "created file metadata"
        );
        Ok(file)
    }

    /// Fetch one file with its tags.
    pub async fn get(&self, file_id: i64) -> StoreResult<File> {
        let mut tx = self.pool.begin().await?;
        let result = match load_file(&mut tx, file_id).await {
            Ok(Some(file)) => Ok(file),
            Ok(None) => Err(not_found_id(file_id)),
            Err(e) => Err(e),
        };
        finish(tx, result).await
    }

    /// All files, optionally restricted to one owner, ordered by id.
    pub async fn list(&self, owner_id: Option<i64>) -> StoreResult<Vec<File>> {
        let mut tx = self.pool.begin().await?;
        let result = list_in(&mut tx, owner_id).await;
        finish(tx, result).await
    }

    /// Files matching any keyword in any field (see [`crate::search`]).
    ///
    /// With no usable keywords, returns the owner's files when an owner is
    /// given and nothing otherwise.
    pub async fn search<S: AsRef<str>>(
        &self,
        keywords: &[S],
        owner_id: Option<i64>,
    ) -> StoreResult<Vec<File>> {
        let keywords = search::normalize_keywords(keywords);
        if keywords.is_empty() {
            return match owner_id {
                Some(_) => self.list(owner_id).await,
                None => Ok(Vec::new()),
            };
        }

        let mut tx = self.pool.begin().await?;
        let result = search_in(&mut tx, &keywords, owner_id).await;
        let files = finish(tx, result).await?;
        tracing::debug!(keywords = ?keywords, owner_id = ?owner_id, hits = files.len(), "search");
        Ok(files)
    }

    /// Change a file's path and/or tags.
    ///
    /// `updated_at` is bumped even when the update carries no changes.
    pub async fn update(&self, file_id: i64, update: &FileUpdate) -> StoreResult<File> {
        if let Some(tags) = &update.tags_to_add_modify {
            validate_keys(tags.keys())?;
        }

        let mut tx = self.pool.begin().await?;
        let result = self.update_in(&mut tx, file_id, update).await;
        let file = finish(tx, result).await?;

        tracing::info!(
            file_id,
            filepath = %file.filepath,
            overwrite = update.overwrite_existing,
            tags = file.tags.len(),
            "updated file metadata"
        );
        Ok(file)
    }

    /// Remove a file and all of its tags.
    pub async fn delete(&self, file_id: i64) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let result = delete_in(&mut tx, file_id).await;
        let tags_removed = finish(tx, result).await?;
        tracing::info!(file_id, tags_removed, "deleted file metadata");
        Ok(())
    }

    async fn update_in(
        &self,
        conn: &mut SqliteConnection,
        file_id: i64,
        update: &FileUpdate,
    ) -> StoreResult<File> {
        let touched = sqlx::query("UPDATE files SET updated_at = ? WHERE id = ?")
            .bind(now_millis())
            .bind(file_id)
            .execute(&mut *conn)
            .await?;
        if touched.rows_affected() == 0 {
            return Err(not_found_id(file_id));
        }

        if let Some(new_path) = update.new_filepath.as_deref() {
            self.move_in(conn, file_id, new_path).await?;
        }

        if update.overwrite_existing {
            sqlx::query("DELETE FROM tags WHERE file_id = ?")
                .bind(file_id)
                .execute(&mut *conn)
                .await?;
        } else if let Some(keys) = update.tags_to_remove.as_ref().filter(|k| !k.is_empty()) {
            let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM tags WHERE file_id = ");
            qb.push_bind(file_id);
            qb.push(" AND key IN (");
            let mut separated = qb.separated(", ");
            for key in keys {
                separated.push_bind(key.clone());
            }
            separated.push_unseparated(")");
            qb.build().execute(&mut *conn).await?;
        }

        if let Some(tags) = &update.tags_to_add_modify {
            for (key, value) in tags {
                upsert_tag(conn, file_id, key, value).await?;
            }
        }

        load_file(conn, file_id)
            .await?
            .ok_or_else(|| not_found_id(file_id))
    }

    async fn move_in(
        &self,
        conn: &mut SqliteConnection,
        file_id: i64,
        new_path: &str,
    ) -> StoreResult<()> {
        if new_path.trim().is_empty() {
            return Err(StoreError::invalid_input("new_filepath must not be empty"));
        }
        if !self.inspector.exists(new_path) {
            return Err(StoreError::invalid_input(format!(
                "New file path '{}' does not exist on the filesystem. Cannot update path.",
                new_path
            )));
        }

        let other: Option<i64> =
            sqlx::query_scalar("SELECT id FROM files WHERE filepath = ? AND id != ?")
                .bind(new_path)
                .bind(file_id)
                .fetch_optional(&mut *conn)
                .await?;
        if let Some(other) = other {
            return Err(StoreError::conflict(format!(
                "File metadata for '{}' already exists (ID: {}). Cannot update path due to conflict.",
                new_path, other
            )));
        }

        let current = sqlx::query("SELECT created_by, inferred_tags FROM files WHERE id = ?")
            .bind(file_id)
            .fetch_one(&mut *conn)
            .await?;
        let created_by: String = current.get("created_by");
        let inferred_tags: String = current.get("inferred_tags");
        let filename = filename_of(new_path);
        let search_text =
            search::file_search_text(&filename, new_path, &created_by, &inferred_tags);

        let moved =
            sqlx::query("UPDATE files SET filepath = ?, filename = ?, search_text = ? WHERE id = ?")
                .bind(new_path)
                .bind(&filename)
                .bind(&search_text)
                .bind(file_id)
                .execute(&mut *conn)
                .await;
        match moved {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation_on(&e, "files", "filepath") => {
                Err(already_exists(new_path, None))
            }
            Err(e) => Err(e.into()),
        }
    }
}

struct FileInsert<'a> {
    filename: String,
    filepath: &'a str,
    owner_id: Option<i64>,
    created_by: &'a str,
    inferred_tags: String,
    now: i64,
}

async fn create_in(
    conn: &mut SqliteConnection,
    row: &FileInsert<'_>,
    tags: &TagMap,
) -> StoreResult<File> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO files (filename, filepath, owner_id, created_by, created_at, updated_at, inferred_tags, search_text)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&row.filename)
    .bind(row.filepath)
    .bind(row.owner_id)
    .bind(row.created_by)
    .bind(row.now)
    .bind(row.now)
    .bind(&row.inferred_tags)
    .bind(search::file_search_text(
        &row.filename,
        row.filepath,
        row.created_by,
        &row.inferred_tags,
    ))
    .execute(&mut *conn)
    .await;

    let file_id = match inserted {
        Ok(done) => done.last_insert_rowid(),
        Err(e) if is_unique_violation_on(&e, "files", "filepath") => {
            let existing = find_id_by_path(&mut *conn, row.filepath).await?;
            return Err(already_exists(row.filepath, existing));
        }
        Err(e) => return Err(e.into()),
    };

    for (key, value) in tags {
        let (text, value_type) = codec::encode(value);
        sqlx::query(
            "INSERT INTO tags (file_id, key, value, value_type, search_text) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(file_id)
        .bind(key)
        .bind(&text)
        .bind(value_type.as_str())
        .bind(search::tag_search_text(key, &text))
        .execute(&mut *conn)
        .await?;
    }

    load_file(conn, file_id)
        .await?
        .ok_or_else(|| not_found_id(file_id))
}

/// Insert a tag, or overwrite value and type in place if the key exists.
async fn upsert_tag(
    conn: &mut SqliteConnection,
    file_id: i64,
    key: &str,
    value: &serde_json::Value,
) -> StoreResult<()> {
    let (text, value_type) = codec::encode(value);
    sqlx::query(
        r#"
        INSERT INTO tags (file_id, key, value, value_type, search_text) VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(file_id, key) DO UPDATE SET
            value = excluded.value,
            value_type = excluded.value_type,
            search_text = excluded.search_text
        "#,
    )
    .bind(file_id)
    .bind(key)
    .bind(&text)
    .bind(value_type.as_str())
    .bind(search::tag_search_text(key, &text))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn delete_in(conn: &mut SqliteConnection, file_id: i64) -> StoreResult<u64> {
    let tags = sqlx::query("DELETE FROM tags WHERE file_id = ?")
        .bind(file_id)
        .execute(&mut *conn)
        .await?;

    let files = sqlx::query("DELETE FROM files WHERE id = ?")
        .bind(file_id)
        .execute(&mut *conn)
        .await?;
    if files.rows_affected() == 0 {
        return Err(not_found_id(file_id));
    }

    Ok(tags.rows_affected())
}

async fn list_in(conn: &mut SqliteConnection, owner_id: Option<i64>) -> StoreResult<Vec<File>> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM files f", FILE_COLUMNS));
    if let Some(owner) = owner_id {
        qb.push(" WHERE f.owner_id = ");
        qb.push_bind(owner);
    }
    qb.push(" ORDER BY f.id");

    let rows = qb.build().fetch_all(&mut *conn).await?;
    attach_tags(conn, rows).await
}

async fn search_in(
    conn: &mut SqliteConnection,
    keywords: &[String],
    owner_id: Option<i64>,
) -> StoreResult<Vec<File>> {
    let mut qb = search::keyword_query(keywords, owner_id);
    let rows = qb.build().fetch_all(&mut *conn).await?;
    attach_tags(conn, rows).await
}

pub(crate) async fn load_file(
    conn: &mut SqliteConnection,
    file_id: i64,
) -> StoreResult<Option<File>> {
    let row = sqlx::query(&format!("SELECT {} FROM files f WHERE f.id = ?", FILE_COLUMNS))
        .bind(file_id)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => Ok(attach_tags(conn, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

/// Materialize file rows and load their tags, ordered by tag id.
async fn attach_tags(conn: &mut SqliteConnection, rows: Vec<SqliteRow>) -> StoreResult<Vec<File>> {
    let mut files: Vec<File> = rows.iter().map(file_from_row).collect();
    if files.is_empty() {
        return Ok(files);
    }

    let ids: Vec<i64> = files.iter().map(|f| f.id).collect();
    let mut by_file: HashMap<i64, Vec<Tag>> = HashMap::new();

    for batch in ids.chunks(TAG_FETCH_BATCH) {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT id, file_id, key, value, value_type FROM tags WHERE file_id IN (",
        );
        let mut separated = qb.separated(", ");
        for id in batch {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY id");

        for row in qb.build().fetch_all(&mut *conn).await? {
            let file_id: i64 = row.get("file_id");
            by_file.entry(file_id).or_default().push(Tag::from_stored(
                row.get("id"),
                row.get("key"),
                row.get("value"),
                row.get("value_type"),
            ));
        }
    }

    for file in &mut files {
        file.tags = by_file.remove(&file.id).unwrap_or_default();
    }
    Ok(files)
}

fn file_from_row(row: &SqliteRow) -> File {
    let id: i64 = row.get("id");
    let inferred_text: String = row.get("inferred_tags");
    let inferred_tags = serde_json::from_str(&inferred_text).unwrap_or_else(|e| {
        tracing::warn!(file_id = id, error = %e, "unreadable inferred_tags, returning empty");
        serde_json::Map::new()
    });

    File {
        id,
        filename: row.get("filename"),
        filepath: row.get("filepath"),
        owner: row.get("owner_id"),
        created_by: row.get("created_by"),
        created_at: from_millis(row.get("created_at")),
        updated_at: from_millis(row.get("updated_at")),
        inferred_tags,
        tags: Vec::new(),
    }
}

async fn find_id_by_path<'e, E>(executor: E, filepath: &str) -> StoreResult<Option<i64>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let id: Option<i64> = sqlx::query_scalar("SELECT id FROM files WHERE filepath = ?")
        .bind(filepath)
        .fetch_optional(executor)
        .await?;
    Ok(id)
}

fn validate_keys<'a>(mut keys: impl Iterator<Item = &'a String>) -> StoreResult<()> {
    if keys.any(|k| k.trim().is_empty()) {
        return Err(StoreError::invalid_input("tag keys must not be empty"));
    }
    Ok(())
}

fn not_found_id(file_id: i64) -> StoreError {
    StoreError::not_found(format!("No metadata found for file ID: {}", file_id))
}

fn already_exists(filepath: &str, existing: Option<i64>) -> StoreError {
    let id = existing
        .map(|id| format!(" (ID: {})", id))
        .unwrap_or_default();
    StoreError::conflict(format!(
        "Metadata for file '{}' already exists{}. Use update to modify.",
        filepath, id
    ))
}

/// Commit on success, roll back on failure.
async fn finish<T>(tx: Transaction<'_, Sqlite>, result: StoreResult<T>) -> StoreResult<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            rollback(tx).await;
            Err(err)
        }
    }
}

async fn rollback(tx: Transaction<'_, Sqlite>) {
    if let Err(e) = tx.rollback().await {
        tracing::warn!(error = %e, "rollback failed");
    }
}
