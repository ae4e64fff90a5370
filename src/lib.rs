//! # filemeta
//!
//! Typed tag metadata for files on disk.
//!
//! filemeta tracks a record per filesystem path (filename, path, owner,
//! inferred attributes) plus an open-ended set of typed key/value tags, and
//! supports retrieval, keyword search, and atomic tag updates. Records live
//! in SQLite; file contents are never read.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐
//! │   CLI    │   │   HTTP   │
//! │ (fmeta)  │   │  (axum)  │
//! └────┬─────┘   └────┬─────┘
//!      └──────┬───────┘
//!             ▼
//!     ┌───────────────┐   ┌───────────────┐
//!     │ MetadataStore │──▶│ PathInspector │
//!     │ search, codec │   │ exists, infer │
//!     └───────┬───────┘   └───────────────┘
//!             ▼
//!     ┌───────────────┐
//!     │    SQLite     │
//!     │ users/files/  │
//!     │     tags      │
//!     └───────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`codec`] | Typed tag value encoding |
//! | [`models`] | File, Tag, User and request types |
//! | [`store`] | Create, get, list, search, update, delete |
//! | [`search`] | Keyword query construction |
//! | [`users`] | User accounts and ownership cascade |
//! | [`inspect`] | Path existence and attribute inference |
//! | [`error`] | Typed store errors |
//! | [`server`] | HTTP API |
//! | [`config`] | TOML configuration |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |

pub mod codec;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod inspect;
pub mod migrate;
pub mod models;
pub mod search;
pub mod server;
pub mod store;
pub mod users;

pub use error::{ErrorKind, StoreError, StoreResult};
pub use store::MetadataStore;
