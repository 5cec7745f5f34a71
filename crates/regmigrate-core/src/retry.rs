//! Targeted re-run of previously failed versions.
//!
//! Works from fresh registry state rather than a stale snapshot: each failed
//! version is re-fetched from the source and probed against the destination
//! before the write. Compatibility checks are disabled for the duration since
//! these versions already failed the normal path once.

use crate::client::SchemaRegistry;
use crate::error::Result;
use crate::mode::{
    disable_compatibility, elevate_to_import, elevate_to_read_write, restore_compatibility,
    restore_mode, ImportElevation,
};
use crate::outcome::{Failed, MigrationOutcome, Skipped, Successful};
use std::collections::BTreeMap;
use tracing::info;

pub struct RetryOrchestrator {
    preserve_ids: bool,
}

impl RetryOrchestrator {
    pub fn new(preserve_ids: bool) -> Self {
        Self { preserve_ids }
    }

    /// Retry each failed `(subject, version)`. Versions that vanished from
    /// the source fail again with a reason saying so; versions the
    /// destination has meanwhile acquired are skipped.
    pub async fn retry(
        &self,
        source: &dyn SchemaRegistry,
        dest: &dyn SchemaRegistry,
        failed: &[Failed],
    ) -> Result<MigrationOutcome> {
        let mut by_subject: BTreeMap<String, Vec<i32>> = BTreeMap::new();
        for f in failed {
            by_subject.entry(f.subject.clone()).or_default().push(f.version);
        }
        for versions in by_subject.values_mut() {
            versions.sort_unstable();
            versions.dedup();
        }

        let mut outcome = MigrationOutcome::default();
        for (subject, versions) in by_subject {
            info!(subject = %subject, versions = versions.len(), "retrying failed versions");
            let saved_compat = disable_compatibility(dest, &subject).await?;
            // From here on the override exists; put it back even when the
            // mode change itself errors out.
            let elevation = if self.preserve_ids {
                match elevate_to_import(dest, &subject).await {
                    Ok(ImportElevation::Elevated { original }) => Ok((Some(original), true)),
                    Ok(ImportElevation::AlreadyImport) => Ok((None, true)),
                    Ok(ImportElevation::Refused) => {
                        elevate_to_read_write(dest, &subject).await.map(|m| (m, false))
                    }
                    Err(e) => Err(e),
                }
            } else {
                elevate_to_read_write(dest, &subject).await.map(|m| (m, false))
            };
            let (saved_mode, preserving) = match elevation {
                Ok(pair) => pair,
                Err(e) => {
                    restore_compatibility(dest, &subject, saved_compat).await;
                    return Err(e);
                }
            };

            let result = self
                .retry_subject(source, dest, &subject, &versions, preserving, &mut outcome)
                .await;

            if let Some(original) = saved_mode {
                restore_mode(dest, &subject, original).await;
            }
            restore_compatibility(dest, &subject, saved_compat).await;
            result?;
        }
        Ok(outcome)
    }

    async fn retry_subject(
        &self,
        source: &dyn SchemaRegistry,
        dest: &dyn SchemaRegistry,
        subject: &str,
        versions: &[i32],
        preserving: bool,
        outcome: &mut MigrationOutcome,
    ) -> Result<()> {
        for &version in versions {
            let sv = match source.get_schema(subject, version).await {
                Ok(sv) => sv,
                Err(e) if e.is_not_found() => {
                    outcome.failed.push(Failed {
                        subject: subject.to_string(),
                        version,
                        reason: "version no longer exists in source registry".to_string(),
                    });
                    continue;
                }
                Err(e) => return Err(e),
            };

            if let Some(existing) = dest
                .check_schema_exists(subject, &sv.schema, sv.schema_type)
                .await?
            {
                outcome.skipped.push(Skipped {
                    subject: subject.to_string(),
                    version,
                    reason: format!("already registered in destination as id {}", existing.id),
                });
                continue;
            }

            let wanted_id = preserving.then_some(sv.id);
            match dest
                .register_schema(subject, &sv.schema, sv.schema_type, wanted_id)
                .await
            {
                Ok(reg) => outcome.successful.push(Successful {
                    subject: subject.to_string(),
                    version,
                    original_id: sv.id,
                    new_id: Some(reg.id),
                    note: Some("registered on retry with compatibility disabled".to_string()),
                }),
                Err(e) if e.is_transport() => return Err(e),
                Err(e) => outcome.failed.push(Failed {
                    subject: subject.to_string(),
                    version,
                    reason: e.to_string(),
                }),
            }
        }
        Ok(())
    }
}
