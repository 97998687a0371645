//! # Stockroom
//!
//! A product catalog engine that keeps a relational catalog consistent
//! with an externally-hosted image asset store, and bulk-loads tabular
//! exports into that catalog under a uniqueness constraint.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐    ┌──────────────┐    ┌────────────┐
//! │  CLI / web │───▶│ Coordinator  │───▶│  SQLite    │
//! │   tier     │    │  (saga)      │    │  catalog   │
//! └────────────┘    └──────┬───────┘    └────────────┘
//!                          │
//!        ┌─────────────────┤
//!        ▼                 ▼
//! ┌────────────┐    ┌──────────────┐
//! │  Import    │    │ Asset Store  │
//! │  pipeline  │    │ (S3 SigV4)   │
//! └────────────┘    └──────────────┘
//! ```
//!
//! No transaction spans the catalog and the asset store. Mutations that
//! touch both walk an explicit saga: upload before commit, compensate on
//! catalog failure, clean up replaced assets only after the commit.
//! The catalog's unique index on `code` is the sole serialization point.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Typed error taxonomy |
//! | [`catalog`] | Catalog Store access layer (SQLite) |
//! | [`assets`] | Asset Store access layer (S3 + in-memory) |
//! | [`saga`] | Saga state machine for cross-store mutations |
//! | [`coordinator`] | Consistency Coordinator |
//! | [`import`] | Bulk ingestion pipeline |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod assets;
pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod import;
pub mod migrate;
pub mod models;
pub mod saga;
