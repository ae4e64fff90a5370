//! CLI command implementations.
//!
//! Each `run_*` function backs one `fmeta` subcommand: it opens the store,
//! performs a single operation, and prints the outcome to stdout.

use anyhow::{bail, Context, Result};
use serde_json::Value;

use crate::codec::TagValue;
use crate::config::Config;
use crate::migrate;
use crate::models::{File, FileUpdate, Identity, NewFile, NewUser, TagMap};
use crate::search::split_keywords;
use crate::store::MetadataStore;
use crate::users::hash_credential;

/// Output format for file records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    Text,
    Json,
}

pub async fn run_init(config: &Config) -> Result<()> {
    migrate::run_migrations(config).await?;
    println!("Database initialized successfully.");
    Ok(())
}

pub async fn run_add(
    config: &Config,
    filepath: &str,
    tags: Vec<(String, String)>,
    identity: Identity,
    output: Output,
) -> Result<()> {
    let store = MetadataStore::open(config).await?;
    let new = NewFile {
        filepath: filepath.to_string(),
        custom_tags: tags_from_pairs(tags),
    };
    let file = store.create(&new, &identity).await;
    store.close().await;
    print_file(&file?, output)
}

pub async fn run_get(config: &Config, id: i64, output: Output) -> Result<()> {
    let store = MetadataStore::open(config).await?;
    let file = store.get(id).await;
    store.close().await;
    print_file(&file?, output)
}

pub async fn run_list(config: &Config, owner_id: Option<i64>, output: Output) -> Result<()> {
    let store = MetadataStore::open(config).await?;
    let files = store.list(owner_id).await;
    store.close().await;
    print_files(&files?, output)
}

pub async fn run_search(
    config: &Config,
    keywords: &[String],
    owner_id: Option<i64>,
    output: Output,
) -> Result<()> {
    let keywords: Vec<String> = keywords.iter().flat_map(|k| split_keywords(k)).collect();
    let store = MetadataStore::open(config).await?;
    let files = store.search(&keywords, owner_id).await;
    store.close().await;
    print_files(&files?, output)
}

pub async fn run_update(
    config: &Config,
    id: i64,
    set: Vec<(String, String)>,
    remove: Vec<String>,
    new_filepath: Option<String>,
    overwrite: bool,
    output: Output,
) -> Result<()> {
    let update = FileUpdate {
        tags_to_add_modify: (!set.is_empty()).then(|| tags_from_pairs(set)),
        tags_to_remove: (!remove.is_empty()).then_some(remove),
        new_filepath,
        overwrite_existing: overwrite,
    };
    let store = MetadataStore::open(config).await?;
    let file = store.update(id, &update).await;
    store.close().await;
    print_file(&file?, output)
}

pub async fn run_delete(config: &Config, id: i64) -> Result<()> {
    let store = MetadataStore::open(config).await?;
    let deleted = store.delete(id).await;
    store.close().await;
    deleted?;
    println!("Deleted metadata for file ID {}.", id);
    Ok(())
}

pub async fn run_user_add(
    config: &Config,
    username: &str,
    password: Option<String>,
    role: Option<String>,
) -> Result<()> {
    let secret = password_from(password)?;
    let store = MetadataStore::open(config).await?;
    let user = store
        .create_user(&NewUser {
            username: username.to_string(),
            credential_hash: hash_credential(&secret),
            role,
        })
        .await;
    store.close().await;
    let user = user?;
    println!("Created user {} (ID: {}, role: {}).", user.username, user.id, user.role);
    Ok(())
}

pub async fn run_user_verify(
    config: &Config,
    username: &str,
    password: Option<String>,
) -> Result<()> {
    let secret = password_from(password)?;
    let store = MetadataStore::open(config).await?;
    let user = store.authenticate(username, &secret).await;
    store.close().await;
    match user? {
        Some(user) => {
            println!("Credentials valid for {} (ID: {}).", user.username, user.id);
            Ok(())
        }
        None => bail!("invalid username or password"),
    }
}

fn password_from(flag: Option<String>) -> Result<String> {
    match flag {
        Some(p) => Ok(p),
        None => match std::env::var("FMETA_PASSWORD") {
            Ok(p) => Ok(p),
            Err(_) => bail!("a password is required: pass --password or set FMETA_PASSWORD"),
        },
    }
}

pub async fn run_user_list(config: &Config) -> Result<()> {
    let store = MetadataStore::open(config).await?;
    let users = store.list_users().await;
    store.close().await;
    let users = users?;
    if users.is_empty() {
        println!("No users.");
        return Ok(());
    }
    for user in users {
        println!("{:>5}  {:<24} {}", user.id, user.username, user.role);
    }
    Ok(())
}

pub async fn run_user_delete(config: &Config, id: i64) -> Result<()> {
    let store = MetadataStore::open(config).await?;
    let removed = store.delete_user(id).await;
    store.close().await;
    println!("Deleted user {} and {} owned file(s).", id, removed?);
    Ok(())
}

/// Typed tag map from `key=value` pairs, guessing each value's type.
pub fn tags_from_pairs(pairs: Vec<(String, String)>) -> TagMap {
    pairs
        .into_iter()
        .map(|(k, v)| (k, TagValue::infer_from_text(&v).to_json()))
        .collect()
}

fn print_file(file: &File, output: Output) -> Result<()> {
    match output {
        Output::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(file).context("Failed to render file as JSON")?
            );
        }
        Output::Text => {
            println!("--- File ---");
            println!("id:           {}", file.id);
            println!("filename:     {}", file.filename);
            println!("filepath:     {}", file.filepath);
            match file.owner {
                Some(owner) => println!("owner:        {}", owner),
                None => println!("owner:        (none)"),
            }
            println!("created_by:   {}", file.created_by);
            println!("created_at:   {}", file.created_at.to_rfc3339());
            println!("updated_at:   {}", file.updated_at.to_rfc3339());
            println!("inferred:     {}", Value::Object(file.inferred_tags.clone()));
            println!();
            println!("--- Tags ({}) ---", file.tags.len());
            for tag in &file.tags {
                println!("{} = {} ({})", tag.key, tag.value, tag.value_type);
            }
        }
    }
    Ok(())
}

fn print_files(files: &[File], output: Output) -> Result<()> {
    if output == Output::Json {
        println!(
            "{}",
            serde_json::to_string_pretty(files).context("Failed to render files as JSON")?
        );
        return Ok(());
    }

    if files.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for file in files {
        let tags: Vec<String> = file
            .tags
            .iter()
            .map(|t| format!("{}={}", t.key, t.value))
            .collect();
        println!("{:>5}  {}", file.id, file.filepath);
        if !tags.is_empty() {
            println!("       tags: {}", tags.join(", "));
        }
    }
    println!();
    println!("{} file(s).", files.len());
    Ok(())
}
