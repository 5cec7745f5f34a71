//! One-directional schema registry migration.
//!
//! The pipeline reads a full snapshot of the source registry, diffs it
//! against the destination, and replays the missing versions in order,
//! optionally preserving numeric schema ids via IMPORT mode. Subject modes
//! and compatibility settings that had to be changed along the way are
//! restored afterwards, and a validation pass confirms the destination
//! covers the source.

pub mod client;
pub mod diff;
pub mod engine;
pub mod error;
pub mod memory;
pub mod mode;
pub mod outcome;
pub mod retry;
pub mod snapshot;
pub mod types;
pub mod validate;

pub use client::{HttpRegistryClient, SchemaRegistry};
pub use diff::{compare, ComparisonResult, IdCollision, MissingIn, VersionDifference};
pub use engine::{
    apply_post_migration_mode, cleanup_destination, MigrationEngine, MigrationOptions,
};
pub use error::{RegistryError, Result};
pub use memory::MemoryRegistry;
pub use outcome::{Failed, MigrationOutcome, Skipped, Successful};
pub use retry::RetryOrchestrator;
pub use snapshot::read_all;
pub use types::{
    CompatibilityLevel, RegistryMode, RegistrySnapshot, SchemaType, SchemaVersion,
    SubjectCompatibility,
};
pub use validate::{find_gaps, validate, ValidationGap};
