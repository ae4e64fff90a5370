//! Keyword search.
//!
//! Every keyword expands into the same group of case-insensitive substring
//! conditions:
//!
//! - `filename`, `filepath`, `created_by`
//! - the JSON text of `inferred_tags`
//! - the key or the value of any tag on the file
//!
//! A file matches when any condition of any keyword holds. Keywords are not
//! required to match together and no field ranks above another. The owner
//! filter, when present, is a numeric equality on `owner_id` applied on top
//! of the disjunction.
//!
//! SQLite's `lower()` and `LIKE` only fold ASCII, so case folding happens
//! here instead. Files and tags carry a `search_text` column holding their
//! searchable fields lowercased with [`fold`] and joined by
//! [`FIELD_SEPARATOR`]; keywords go through the same [`fold`] and are
//! located with `instr`, which treats every character literally.
//!
//! Matching on the serialized `inferred_tags` is plain text matching, so a
//! keyword such as `"1"` can hit a numeric attribute like `size_bytes`.

use sqlx::{QueryBuilder, Sqlite};

use crate::store::FILE_COLUMNS;

/// Joins fields inside `search_text`. Stripped from keywords so no match
/// can span two fields.
pub(crate) const FIELD_SEPARATOR: char = '\u{1f}';

/// Case folding shared by stored `search_text` and keywords.
pub fn fold(text: &str) -> String {
    text.to_lowercase()
}

/// `search_text` for a file row.
pub(crate) fn file_search_text(
    filename: &str,
    filepath: &str,
    created_by: &str,
    inferred_tags: &str,
) -> String {
    join_folded(&[filename, filepath, created_by, inferred_tags])
}

/// `search_text` for a tag row.
pub(crate) fn tag_search_text(key: &str, value: &str) -> String {
    join_folded(&[key, value])
}

fn join_folded(fields: &[&str]) -> String {
    fields
        .iter()
        .map(|f| fold(f))
        .collect::<Vec<_>>()
        .join(&FIELD_SEPARATOR.to_string())
}

/// Trim and fold keywords, dropping blank ones.
pub fn normalize_keywords<S: AsRef<str>>(keywords: &[S]) -> Vec<String> {
    keywords
        .iter()
        .map(|k| fold(k.as_ref().replace(FIELD_SEPARATOR, "").trim()))
        .filter(|k| !k.is_empty())
        .collect()
}

/// Split a comma-separated keyword list (`"report, finance"`).
pub fn split_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
}

/// Build the file query for already-normalized, non-empty `keywords`.
///
/// Rows come back once per file (the tag condition is an `EXISTS`
/// subquery, not a join), ordered by id.
pub(crate) fn keyword_query(keywords: &[String], owner_id: Option<i64>) -> QueryBuilder<'static, Sqlite> {
    let mut qb = QueryBuilder::new(format!("SELECT {} FROM files f WHERE (", FILE_COLUMNS));

    for (i, keyword) in keywords.iter().enumerate() {
        if i > 0 {
            qb.push(" OR ");
        }
        qb.push("instr(f.search_text, ");
        qb.push_bind(keyword.clone());
        qb.push(") > 0 OR EXISTS (SELECT 1 FROM tags t WHERE t.file_id = f.id AND instr(t.search_text, ");
        qb.push_bind(keyword.clone());
        qb.push(") > 0)");
    }
    qb.push(")");

    if let Some(owner) = owner_id {
        qb.push(" AND f.owner_id = ");
        qb.push_bind(owner);
    }
    qb.push(" ORDER BY f.id");
    qb
}
