//! Subject mode and compatibility elevation with guaranteed restoration.
//!
//! Mutations here are save/change pairs; the matching restore functions log
//! failures instead of propagating them so a failed restore can never mask
//! the migration outcome it follows.

use crate::client::SchemaRegistry;
use crate::error::Result;
use crate::types::{CompatibilityLevel, RegistryMode, SubjectCompatibility};
use tracing::{debug, warn};

/// Outcome of trying to put a subject into IMPORT mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportElevation {
    /// Mode changed; `original` is what to restore afterwards.
    Elevated { original: RegistryMode },
    /// Already in IMPORT mode, nothing to restore.
    AlreadyImport,
    /// Registry refused (422, subject not empty). Caller falls back to
    /// registry-assigned ids.
    Refused,
}

/// Make the subject writable for ordinary registration. Returns the prior
/// mode when a change was made, `None` when the subject was already writable.
pub async fn elevate_to_read_write(
    registry: &dyn SchemaRegistry,
    subject: &str,
) -> Result<Option<RegistryMode>> {
    let current = registry.get_subject_mode(subject).await?;
    match current {
        RegistryMode::Readwrite | RegistryMode::ReadwriteOverride | RegistryMode::Import => {
            Ok(None)
        }
        RegistryMode::Readonly => {
            debug!(subject, from = %current, "elevating subject to READWRITE");
            registry
                .set_subject_mode(subject, RegistryMode::Readwrite)
                .await?;
            Ok(Some(current))
        }
    }
}

/// Put the subject into IMPORT mode so explicit ids are accepted. The
/// registry only allows this on empty subjects; a 422 becomes
/// [`ImportElevation::Refused`] rather than an error.
pub async fn elevate_to_import(
    registry: &dyn SchemaRegistry,
    subject: &str,
) -> Result<ImportElevation> {
    let current = registry.get_subject_mode(subject).await?;
    if current == RegistryMode::Import {
        return Ok(ImportElevation::AlreadyImport);
    }
    match registry.set_subject_mode(subject, RegistryMode::Import).await {
        Ok(()) => {
            debug!(subject, from = %current, "elevated subject to IMPORT");
            Ok(ImportElevation::Elevated { original: current })
        }
        Err(e) if e.is_unprocessable() => {
            debug!(subject, "IMPORT mode refused, subject not empty");
            Ok(ImportElevation::Refused)
        }
        Err(e) => Err(e),
    }
}

/// Restore a previously saved subject mode. Never fails the caller.
pub async fn restore_mode(registry: &dyn SchemaRegistry, subject: &str, original: RegistryMode) {
    if let Err(e) = registry.set_subject_mode(subject, original).await {
        warn!(subject, mode = %original, error = %e, "failed to restore subject mode");
    }
}

/// Turn compatibility checking off for a subject, returning the prior
/// configuration so [`restore_compatibility`] can undo it exactly.
pub async fn disable_compatibility(
    registry: &dyn SchemaRegistry,
    subject: &str,
) -> Result<SubjectCompatibility> {
    let original = registry.get_subject_compatibility(subject).await?;
    debug!(subject, "disabling compatibility checks");
    registry
        .set_subject_compatibility(subject, CompatibilityLevel::None)
        .await?;
    Ok(original)
}

/// Undo [`disable_compatibility`]. An inherited configuration is restored by
/// deleting the override so the subject follows the global level again.
/// Never fails the caller.
pub async fn restore_compatibility(
    registry: &dyn SchemaRegistry,
    subject: &str,
    original: SubjectCompatibility,
) {
    let outcome = match original {
        SubjectCompatibility::Explicit(level) => {
            registry.set_subject_compatibility(subject, level).await
        }
        SubjectCompatibility::Inherited => registry.delete_subject_compatibility(subject).await,
    };
    if let Err(e) = outcome {
        warn!(subject, error = %e, "failed to restore subject compatibility");
    }
}
