//! # fmeta
//!
//! Command-line interface to filemeta: record typed tags for files on disk,
//! search them, and serve the same operations over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! fmeta --config ./config/fmeta.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fmeta init` | Create the SQLite database and schema |
//! | `fmeta add <path> --tag k=v` | Record metadata for an existing path |
//! | `fmeta get <id>` | Show one file with its tags |
//! | `fmeta list` | List tracked files |
//! | `fmeta search <keywords>...` | Files matching any keyword |
//! | `fmeta update <id>` | Change tags and/or path |
//! | `fmeta delete <id>` | Remove a file record and its tags |
//! | `fmeta user add/verify/list/delete` | Manage file owners |
//! | `fmeta serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! fmeta add /srv/reports/q3.csv --tag dept=finance --tag year=2024
//! fmeta search finance q3
//! fmeta update 1 --set status=final --remove draft
//! fmeta update 1 --set dept=ops --overwrite
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use filemeta::commands::{self, Output};
use filemeta::config;
use filemeta::models::Identity;
use filemeta::server;

/// fmeta: typed tag metadata for files on disk.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(name = "fmeta", version, about = "Typed tag metadata for files on disk")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/fmeta.toml")]
    config: PathBuf,

    /// Print file records as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Record metadata for a path that exists on disk.
    Add {
        /// Path of the file to track.
        path: String,

        /// Tag as `key=value`; the value type (integer, float, boolean, string) is inferred.
        #[arg(long = "tag", value_parser = parse_key_val)]
        tags: Vec<(String, String)>,

        /// Owning user id.
        #[arg(long)]
        owner_id: Option<i64>,

        /// Identity recorded as `created_by`.
        #[arg(long)]
        created_by: Option<String>,
    },

    /// Show one file record with its tags.
    Get {
        id: i64,
    },

    /// List file records.
    List {
        /// Only files owned by this user id.
        #[arg(long)]
        owner_id: Option<i64>,
    },

    /// Find files matching any keyword in name, path, creator, inferred
    /// attributes, or tags.
    ///
    /// Keywords may also be comma-separated: `fmeta search report,finance`.
    Search {
        keywords: Vec<String>,

        /// Only files owned by this user id.
        #[arg(long)]
        owner_id: Option<i64>,
    },

    /// Change a file's tags and/or path.
    ///
    /// With `--overwrite`, every existing tag is removed first and
    /// `--remove` is ignored. `--set` is applied last.
    Update {
        id: i64,

        /// Add or modify a tag as `key=value`.
        #[arg(long = "set", value_parser = parse_key_val)]
        set: Vec<(String, String)>,

        /// Remove the tag with this key.
        #[arg(long = "remove")]
        remove: Vec<String>,

        /// New path for the file (must exist on disk).
        #[arg(long = "path")]
        new_path: Option<String>,

        /// Replace the whole tag set.
        #[arg(long)]
        overwrite: bool,
    },

    /// Delete a file record and its tags.
    Delete {
        id: i64,
    },

    /// Manage users.
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a user.
    Add {
        username: String,

        /// Password; read from FMETA_PASSWORD when omitted.
        #[arg(long)]
        password: Option<String>,

        /// Role (defaults to `user`).
        #[arg(long)]
        role: Option<String>,
    },
    /// Check a user's password. Exits non-zero on mismatch.
    Verify {
        username: String,

        /// Password; read from FMETA_PASSWORD when omitted.
        #[arg(long)]
        password: Option<String>,
    },
    /// List users.
    List,
    /// Delete a user and every file it owns.
    Delete { id: i64 },
}

/// Parse a `key=value` pair.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn init_logging(verbose: bool, serving: bool) {
    let default = if verbose {
        "filemeta=debug"
    } else if serving {
        "filemeta=info"
    } else {
        "filemeta=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, matches!(cli.command, Commands::Serve));

    let cfg = config::load_config(&cli.config)?;
    let output = if cli.json { Output::Json } else { Output::Text };

    match cli.command {
        Commands::Init => commands::run_init(&cfg).await?,
        Commands::Add {
            path,
            tags,
            owner_id,
            created_by,
        } => {
            let identity = Identity {
                owner_id,
                created_by,
            };
            commands::run_add(&cfg, &path, tags, identity, output).await?;
        }
        Commands::Get { id } => commands::run_get(&cfg, id, output).await?,
        Commands::List { owner_id } => commands::run_list(&cfg, owner_id, output).await?,
        Commands::Search { keywords, owner_id } => {
            commands::run_search(&cfg, &keywords, owner_id, output).await?;
        }
        Commands::Update {
            id,
            set,
            remove,
            new_path,
            overwrite,
        } => {
            commands::run_update(&cfg, id, set, remove, new_path, overwrite, output).await?;
        }
        Commands::Delete { id } => commands::run_delete(&cfg, id).await?,
        Commands::User { action } => match action {
            UserAction::Add {
                username,
                password,
                role,
            } => commands::run_user_add(&cfg, &username, password, role).await?,
            UserAction::Verify { username, password } => {
                commands::run_user_verify(&cfg, &username, password).await?
            }
            UserAction::List => commands::run_user_list(&cfg).await?,
            UserAction::Delete { id } => commands::run_user_delete(&cfg, id).await?,
        },
        Commands::Serve => server::run_server(&cfg).await?,
    }

    Ok(())
}
