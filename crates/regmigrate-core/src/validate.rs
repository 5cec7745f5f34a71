//! Post-migration verification: re-read both registries and confirm every
//! source payload landed in the destination.

use crate::client::SchemaRegistry;
use crate::error::Result;
use crate::snapshot::read_all;
use crate::types::RegistrySnapshot;
use tracing::{info, warn};

/// Something the destination is missing or got wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationGap {
    pub subject: String,
    /// `None` when the whole subject is absent.
    pub version: Option<i32>,
    pub reason: String,
}

/// Pure check between two snapshots. With `expect_preserved_ids`, matching
/// payloads must also carry the same numeric id.
pub fn find_gaps(
    source: &RegistrySnapshot,
    dest: &RegistrySnapshot,
    expect_preserved_ids: bool,
) -> Vec<ValidationGap> {
    let mut gaps = Vec::new();
    for (subject, versions) in source.subjects() {
        if !dest.contains_subject(subject) {
            gaps.push(ValidationGap {
                subject: subject.clone(),
                version: None,
                reason: "subject missing from destination".to_string(),
            });
            continue;
        }
        for sv in versions {
            let dest_versions = dest.get(subject).unwrap_or_default();
            let Some(dv) = dest_versions.iter().find(|dv| dv.schema == sv.schema) else {
                gaps.push(ValidationGap {
                    subject: subject.clone(),
                    version: Some(sv.version),
                    reason: "schema payload missing from destination".to_string(),
                });
                continue;
            };
            if expect_preserved_ids && dv.id != sv.id {
                gaps.push(ValidationGap {
                    subject: subject.clone(),
                    version: Some(sv.version),
                    reason: format!("id not preserved: source {} dest {}", sv.id, dv.id),
                });
            }
        }
    }
    gaps
}

/// Re-read both registries and report what the destination is still missing.
pub async fn validate(
    source: &dyn SchemaRegistry,
    dest: &dyn SchemaRegistry,
    expect_preserved_ids: bool,
) -> Result<Vec<ValidationGap>> {
    let source_snap = read_all(source, "source").await?;
    let dest_snap = read_all(dest, "dest").await?;
    let gaps = find_gaps(&source_snap, &dest_snap, expect_preserved_ids);
    if gaps.is_empty() {
        info!("validation passed: destination covers the source");
    } else {
        warn!(gaps = gaps.len(), "validation found missing content");
    }
    Ok(gaps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SchemaType, SchemaVersion};

    fn snap(entries: &[(&str, i32, i32, &str)]) -> RegistrySnapshot {
        let mut snapshot = RegistrySnapshot::new();
        for (subject, version, id, payload) in entries {
            snapshot.insert(SchemaVersion {
                subject: subject.to_string(),
                version: *version,
                id: *id,
                schema_type: SchemaType::Avro,
                schema: payload.to_string(),
            });
        }
        snapshot
    }

    #[test]
    fn test_no_gaps_when_destination_covers_source() {
        let source = snap(&[("orders", 1, 1, "s1")]);
        let dest = snap(&[("orders", 1, 9, "s1"), ("extra", 1, 2, "x")]);
        assert!(find_gaps(&source, &dest, false).is_empty());
    }

    #[test]
    fn test_missing_subject_reported_once() {
        let source = snap(&[("orders", 1, 1, "s1"), ("orders", 2, 2, "s2")]);
        let dest = snap(&[]);
        let gaps = find_gaps(&source, &dest, false);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].version, None);
    }

    #[test]
    fn test_missing_payload_reported_per_version() {
        let source = snap(&[("orders", 1, 1, "s1"), ("orders", 2, 2, "s2")]);
        let dest = snap(&[("orders", 1, 1, "s1")]);
        let gaps = find_gaps(&source, &dest, false);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].version, Some(2));
        assert!(gaps[0].reason.contains("missing"));
    }

    #[test]
    fn test_id_mismatch_only_flagged_when_preservation_expected() {
        let source = snap(&[("orders", 1, 1, "s1")]);
        let dest = snap(&[("orders", 1, 9, "s1")]);
        assert!(find_gaps(&source, &dest, false).is_empty());

        let gaps = find_gaps(&source, &dest, true);
        assert_eq!(gaps.len(), 1);
        assert!(gaps[0].reason.contains("id not preserved"));
    }

    #[test]
    fn test_payload_match_at_different_version_counts() {
        // Destination renumbered versions after a cleanup; payload coverage
        // is what matters.
        let source = snap(&[("orders", 3, 3, "s3")]);
        let dest = snap(&[("orders", 1, 3, "s3")]);
        assert!(find_gaps(&source, &dest, true).is_empty());
    }
}
