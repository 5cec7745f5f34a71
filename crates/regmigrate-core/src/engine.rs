//! Replays source schema versions into the destination registry.
//!
//! Versions are written per subject in ascending version order so the
//! destination rebuilds the same history. Subjects are isolated: a failure in
//! one never stops the others. Transport-level errors abort the run; the
//! destination's answer can no longer be trusted.

use crate::client::SchemaRegistry;
use crate::error::Result;
use crate::mode::{
    disable_compatibility, elevate_to_import, elevate_to_read_write, restore_compatibility,
    restore_mode, ImportElevation,
};
use crate::outcome::{Failed, MigrationOutcome, Skipped, Successful};
use crate::types::{RegistryMode, RegistrySnapshot, SchemaVersion};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct MigrationOptions {
    /// Report what would happen without writing anything.
    pub dry_run: bool,
    /// Carry source schema ids into the destination via IMPORT mode.
    pub preserve_ids: bool,
    /// On a compatibility rejection (409), disable the subject's
    /// compatibility checks, replay, and restore.
    pub auto_handle_compatibility: bool,
}

/// What the subject's mode looked like before we touched it.
enum ModeHold {
    Unchanged,
    Elevated { original: RegistryMode },
}

pub struct MigrationEngine {
    options: MigrationOptions,
}

impl MigrationEngine {
    pub fn new(options: MigrationOptions) -> Self {
        Self { options }
    }

    /// Migrate everything in `source` that `dest` is missing. The snapshots
    /// drive the plan; `dest_client` takes the writes.
    pub async fn migrate(
        &self,
        source: &RegistrySnapshot,
        dest: &RegistrySnapshot,
        dest_client: &dyn SchemaRegistry,
    ) -> Result<MigrationOutcome> {
        let mut outcome = MigrationOutcome::default();
        // Subjects whose writes hit a compatibility rejection, replayed at
        // the end with checks disabled.
        let mut compat_retry: BTreeMap<String, Vec<SchemaVersion>> = BTreeMap::new();

        for (subject, versions) in source.subjects() {
            let mut pending = Vec::new();
            for sv in versions {
                if dest.contains_payload(subject, &sv.schema) {
                    debug!(subject = %subject, version = sv.version, "already in destination");
                    outcome.skipped.push(Skipped {
                        subject: subject.clone(),
                        version: sv.version,
                        reason: "identical schema already in destination".to_string(),
                    });
                } else {
                    pending.push(sv.clone());
                }
            }
            if pending.is_empty() {
                continue;
            }

            if self.options.dry_run {
                self.evaluate_subject(dest_client, subject, &pending, &mut outcome)
                    .await?;
            } else {
                self.migrate_subject(
                    dest_client,
                    subject,
                    pending,
                    &mut outcome,
                    &mut compat_retry,
                )
                .await?;
            }
        }

        if !compat_retry.is_empty() {
            self.replay_with_compatibility_disabled(dest_client, compat_retry, &mut outcome)
                .await?;
        }

        info!(
            successful = outcome.successful.len(),
            failed = outcome.failed.len(),
            skipped = outcome.skipped.len(),
            dry_run = self.options.dry_run,
            "migration pass complete"
        );
        Ok(outcome)
    }

    /// Dry-run path: probe compatibility against the destination's latest
    /// version without registering anything.
    async fn evaluate_subject(
        &self,
        dest_client: &dyn SchemaRegistry,
        subject: &str,
        pending: &[SchemaVersion],
        outcome: &mut MigrationOutcome,
    ) -> Result<()> {
        for sv in pending {
            let compatible = dest_client
                .check_compatibility(subject, &sv.schema, sv.schema_type, "latest")
                .await?;
            if compatible {
                outcome.successful.push(Successful {
                    subject: subject.to_string(),
                    version: sv.version,
                    original_id: sv.id,
                    new_id: None,
                    note: Some("compatible in dry run".to_string()),
                });
            } else {
                outcome.failed.push(Failed {
                    subject: subject.to_string(),
                    version: sv.version,
                    reason: "incompatible with destination latest version".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Elevate the subject's mode as needed, register the pending versions,
    /// then restore the mode no matter how registration went.
    async fn migrate_subject(
        &self,
        dest_client: &dyn SchemaRegistry,
        subject: &str,
        pending: Vec<SchemaVersion>,
        outcome: &mut MigrationOutcome,
        compat_retry: &mut BTreeMap<String, Vec<SchemaVersion>>,
    ) -> Result<()> {
        let mut preserving = self.options.preserve_ids;
        let mut subject_note = None;

        let hold = if preserving {
            match elevate_to_import(dest_client, subject).await? {
                ImportElevation::Elevated { original } => ModeHold::Elevated { original },
                ImportElevation::AlreadyImport => ModeHold::Unchanged,
                ImportElevation::Refused => {
                    preserving = false;
                    subject_note = Some(
                        "id preservation skipped: IMPORT mode unavailable for this subject"
                            .to_string(),
                    );
                    match elevate_to_read_write(dest_client, subject).await? {
                        Some(original) => ModeHold::Elevated { original },
                        None => ModeHold::Unchanged,
                    }
                }
            }
        } else {
            match elevate_to_read_write(dest_client, subject).await? {
                Some(original) => ModeHold::Elevated { original },
                None => ModeHold::Unchanged,
            }
        };

        let result = self
            .register_versions(
                dest_client,
                subject,
                &pending,
                preserving,
                subject_note.as_deref(),
                outcome,
                compat_retry,
            )
            .await;

        if let ModeHold::Elevated { original } = hold {
            restore_mode(dest_client, subject, original).await;
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn register_versions(
        &self,
        dest_client: &dyn SchemaRegistry,
        subject: &str,
        pending: &[SchemaVersion],
        preserving: bool,
        subject_note: Option<&str>,
        outcome: &mut MigrationOutcome,
        compat_retry: &mut BTreeMap<String, Vec<SchemaVersion>>,
    ) -> Result<()> {
        for sv in pending {
            // The snapshot may be stale by now; a live probe tells an
            // idempotent re-send apart from a real write.
            if let Some(existing) = dest_client
                .check_schema_exists(subject, &sv.schema, sv.schema_type)
                .await?
            {
                outcome.skipped.push(Skipped {
                    subject: subject.to_string(),
                    version: sv.version,
                    reason: format!("already registered in destination as id {}", existing.id),
                });
                continue;
            }

            let wanted_id = preserving.then_some(sv.id);
            match dest_client
                .register_schema(subject, &sv.schema, sv.schema_type, wanted_id)
                .await
            {
                Ok(reg) => {
                    let note = if wanted_id.is_some() && !reg.id_preserved {
                        Some("id preservation skipped: registry assigned a new id".to_string())
                    } else {
                        subject_note.map(str::to_string)
                    };
                    debug!(subject, version = sv.version, new_id = reg.id, "registered");
                    outcome.successful.push(Successful {
                        subject: subject.to_string(),
                        version: sv.version,
                        original_id: sv.id,
                        new_id: Some(reg.id),
                        note,
                    });
                }
                Err(e) if e.is_conflict() && self.options.auto_handle_compatibility => {
                    debug!(subject, version = sv.version, "conflict, queued for compatibility retry");
                    compat_retry
                        .entry(subject.to_string())
                        .or_default()
                        .push(sv.clone());
                }
                Err(e) if e.is_conflict() => {
                    let mut reason = e.to_string();
                    if let Ok(Some(latest)) = dest_client.get_latest_version(subject).await {
                        reason = format!("{reason} (destination latest version: {latest})");
                    }
                    warn!(subject, version = sv.version, %reason, "registration rejected");
                    outcome.failed.push(Failed {
                        subject: subject.to_string(),
                        version: sv.version,
                        reason,
                    });
                }
                Err(e) if e.is_transport() => return Err(e),
                Err(e) => {
                    warn!(subject, version = sv.version, error = %e, "registration failed");
                    outcome.failed.push(Failed {
                        subject: subject.to_string(),
                        version: sv.version,
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Second pass for subjects whose writes were rejected as incompatible:
    /// turn compatibility off, replay without explicit ids, turn it back on.
    async fn replay_with_compatibility_disabled(
        &self,
        dest_client: &dyn SchemaRegistry,
        compat_retry: BTreeMap<String, Vec<SchemaVersion>>,
        outcome: &mut MigrationOutcome,
    ) -> Result<()> {
        for (subject, versions) in compat_retry {
            info!(subject = %subject, versions = versions.len(), "replaying with compatibility disabled");
            let saved = disable_compatibility(dest_client, &subject).await?;
            // From here on the override exists; put it back even when the
            // mode change itself errors out.
            let saved_mode = match elevate_to_read_write(dest_client, &subject).await {
                Ok(saved_mode) => saved_mode,
                Err(e) => {
                    restore_compatibility(dest_client, &subject, saved).await;
                    return Err(e);
                }
            };
            let result = self
                .replay_subject(dest_client, &subject, &versions, outcome)
                .await;
            if let Some(original) = saved_mode {
                restore_mode(dest_client, &subject, original).await;
            }
            restore_compatibility(dest_client, &subject, saved).await;
            result?;
        }
        Ok(())
    }

    async fn replay_subject(
        &self,
        dest_client: &dyn SchemaRegistry,
        subject: &str,
        versions: &[SchemaVersion],
        outcome: &mut MigrationOutcome,
    ) -> Result<()> {
        for sv in versions {
            match dest_client
                .register_schema(subject, &sv.schema, sv.schema_type, None)
                .await
            {
                Ok(reg) => outcome.successful.push(Successful {
                    subject: subject.to_string(),
                    version: sv.version,
                    original_id: sv.id,
                    new_id: Some(reg.id),
                    note: Some("registered with compatibility disabled".to_string()),
                }),
                Err(e) if e.is_transport() => return Err(e),
                Err(e) => outcome.failed.push(Failed {
                    subject: subject.to_string(),
                    version: sv.version,
                    reason: e.to_string(),
                }),
            }
        }
        Ok(())
    }
}

/// Delete every subject in the destination. With `permanent` the soft delete
/// is followed by a hard delete so ids and versions can be reused.
pub async fn cleanup_destination(client: &dyn SchemaRegistry, permanent: bool) -> Result<usize> {
    let subjects = client.list_subjects().await?;
    info!(subjects = subjects.len(), permanent, "cleaning destination registry");
    for subject in &subjects {
        elevate_to_read_write(client, subject).await?;
        client.delete_subject(subject, false).await?;
        if permanent {
            client.delete_subject(subject, true).await?;
        }
        debug!(subject = %subject, "deleted");
    }
    Ok(subjects.len())
}

/// Set the destination's global mode after a migration run.
pub async fn apply_post_migration_mode(
    client: &dyn SchemaRegistry,
    mode: RegistryMode,
) -> Result<()> {
    let current = client.get_global_mode().await?;
    if current == mode {
        debug!(mode = %mode, "global mode already set");
        return Ok(());
    }
    info!(from = %current, to = %mode, "setting destination global mode");
    client.set_global_mode(mode).await
}
