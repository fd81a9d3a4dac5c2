//! Shared data models for all microservices.

pub mod connection;
pub mod generation;
pub mod metadata;

// Re-export commonly used types
pub use connection::{
    Connection, ConnectionItem, CreateConnectionRequest, EngineKind, ProbeError, ProbeFailure,
    ValidateConnectionRequest, ValidationStatus,
};
pub use generation::{GenerateRequest, GenerateResponse, Provider, ProviderModels};
pub use metadata::{
    ColumnDescriptor, HarvestSummary, MetadataSnapshot, MetadataStatus, SchemaDescriptor,
    TableDescriptor, TypeFamily,
};
