//! HablaDB 公共模块
//!
//! Shared building blocks for the connection and ai services:
//! - data models (connections, metadata snapshots, generation requests)
//! - the error taxonomy and its HTTP mapping
//! - configuration loading
//! - the on-disk metadata store

pub mod config;
pub mod errors;
pub mod metadata_store;
pub mod middleware;
pub mod models;
pub mod response;
pub mod utils;

pub use errors::{AppError, AppResult};
pub use metadata_store::MetadataStore;
