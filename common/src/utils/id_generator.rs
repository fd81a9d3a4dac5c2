//! Unique ID generator.
//!
//! Provides utilities for generating unique identifiers.

use uuid::Uuid;

/// Generates unique identifiers for various entities.
pub struct IdGenerator;

impl IdGenerator {
    /// Generates a unique request ID.
    pub fn request_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Generates a metadata store generation ID.
    ///
    /// Simple (hyphen-free) form so it can be used as a directory name.
    pub fn generation_id() -> String {
        Uuid::new_v4().simple().to_string()
    }
}
