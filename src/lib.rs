//! Signify keystrokes - keystroke provenance storage sidecar
//!
//! Authors write documents while the editor captures their keystrokes. This
//! crate stores those keystrokes, keeps the derived statistics of their
//! owners consistent, and replays them as a public "keystroke timeline"
//! once a document is published.
//!
//! ## Components
//!
//! | Module | Role |
//! |--------|------|
//! | `db::keystroke_events` | Append-only event store, one owner per event |
//! | `sequencer` | Batch validation, ordering and uniqueness |
//! | `aggregator` | Word count, reading time, keystroke count, paste status |
//! | `services::replay_service` | Ordered, paginated replay |
//! | `http` | JSON API over the services |
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/signify-keystrokes/
//! ├── keystrokes.db      # SQLite database (WAL mode)
//! └── config.toml        # Configuration
//! ```

pub mod aggregator;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod sequencer;
pub mod services;
pub mod views;

pub use config::Config;
pub use db::KeystrokeDb;
pub use error::StorageError;
pub use http::HttpServer;
pub use services::{ServiceLimits, Services};
