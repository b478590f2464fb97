//! Random-access viewer/transformer engine for large CSV and JSON Lines
//! files: a row indexer, windowed reader, display cache, incremental schema
//! scanner, lazy column-transform stack, and background filter row indexer,
//! wired together by [`coordinator::Coordinator`].

pub mod actions;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod filter_index;
pub mod format;
pub mod indexer;
pub mod reader;
pub mod recipe;
pub mod scanner;
pub mod schema;
pub mod schema_scanner;
pub mod table;
pub mod transformer;

pub use actions::{FilterSpec, MorphAction, Operator};
pub use config::EngineConfig;
pub use coordinator::Coordinator;
pub use error::{DataMorphError, DataMorphResult};
pub use format::{ColumnType, SourceFormat};
pub use recipe::Recipe;
pub use schema::{ColumnSchema, TableSchema};
pub use transformer::{RawRowSource, TableSource};
