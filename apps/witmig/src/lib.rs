//! # witmig
//!
//! Library half of the `witmig` binary: configuration, JSON stores, the
//! built-in field maps and stages, and engine assembly. The CLI in
//! `main.rs` is a thin layer over these modules.

pub mod assemble;
pub mod config;
pub mod rules;
pub mod stages;
pub mod store;

pub use assemble::{Assembly, assemble, assemble_with};
pub use config::MigrationConfig;
pub use stages::builtin_stages;
pub use store::JsonFileStore;
