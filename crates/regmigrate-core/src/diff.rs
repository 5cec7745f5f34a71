//! Snapshot comparison: what the destination is missing, where the two
//! registries disagree, and which numeric ids cannot be preserved.

use crate::types::{RegistrySnapshot, SchemaVersion};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingIn {
    Source,
    Dest,
}

/// A version present in only one registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionDifference {
    pub subject: String,
    pub version: i32,
    pub missing_in: MissingIn,
}

/// Same `(subject, version)` on both sides, different payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDifference {
    pub subject: String,
    pub version: i32,
    pub source_id: i32,
    pub dest_id: i32,
}

/// Same `(subject, version)` and payload, but different numeric ids. Harmless
/// for correctness, fatal for id preservation on that version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdDifference {
    pub subject: String,
    pub version: i32,
    pub source_id: i32,
    pub dest_id: i32,
}

/// A source id already taken in the destination by a textually different
/// schema. Preserving ids would corrupt the destination, so collisions block
/// id-preserving migration entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdCollision {
    pub id: i32,
    pub subject: String,
    pub version: i32,
    pub conflicting_subject: String,
    pub conflicting_version: i32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComparisonResult {
    /// Subjects with at least one version only in the source.
    pub source_only_subjects: Vec<String>,
    /// Subjects that exist only in the destination.
    pub dest_only_subjects: Vec<String>,
    /// Subjects present on both sides.
    pub common_subjects: Vec<String>,
    pub version_differences: Vec<VersionDifference>,
    pub schema_differences: Vec<SchemaDifference>,
    pub id_differences: Vec<IdDifference>,
    pub collisions: Vec<IdCollision>,
}

impl ComparisonResult {
    pub fn has_collisions(&self) -> bool {
        !self.collisions.is_empty()
    }

    /// True when the destination already holds everything the source does.
    pub fn is_synchronized(&self) -> bool {
        self.source_only_subjects.is_empty()
            && self
                .version_differences
                .iter()
                .all(|d| d.missing_in == MissingIn::Source)
            && self.schema_differences.is_empty()
    }
}

/// Compare two snapshots subject by subject, version by version.
///
/// Ids are only compared between payload-identical versions; a shared id is a
/// collision only when the payloads differ. Identical schemas carrying the
/// same id on both sides are already migrated and produce no entry at all.
pub fn compare(source: &RegistrySnapshot, dest: &RegistrySnapshot) -> ComparisonResult {
    let mut result = ComparisonResult::default();

    for (subject, source_versions) in source.subjects() {
        if !dest.contains_subject(subject) {
            result.source_only_subjects.push(subject.clone());
            for v in source_versions {
                result.version_differences.push(VersionDifference {
                    subject: subject.clone(),
                    version: v.version,
                    missing_in: MissingIn::Dest,
                });
            }
            continue;
        }
        result.common_subjects.push(subject.clone());

        let dest_versions = dest.get(subject).unwrap_or_default();
        for sv in source_versions {
            match dest_versions.iter().find(|dv| dv.version == sv.version) {
                None => result.version_differences.push(VersionDifference {
                    subject: subject.clone(),
                    version: sv.version,
                    missing_in: MissingIn::Dest,
                }),
                Some(dv) if dv.schema != sv.schema => {
                    result.schema_differences.push(SchemaDifference {
                        subject: subject.clone(),
                        version: sv.version,
                        source_id: sv.id,
                        dest_id: dv.id,
                    })
                }
                Some(dv) if dv.id != sv.id => result.id_differences.push(IdDifference {
                    subject: subject.clone(),
                    version: sv.version,
                    source_id: sv.id,
                    dest_id: dv.id,
                }),
                Some(_) => {}
            }
        }
        for dv in dest_versions {
            if !source_versions.iter().any(|sv| sv.version == dv.version) {
                result.version_differences.push(VersionDifference {
                    subject: subject.clone(),
                    version: dv.version,
                    missing_in: MissingIn::Source,
                });
            }
        }
    }

    for (subject, _) in dest.subjects() {
        if !source.contains_subject(subject) {
            result.dest_only_subjects.push(subject.clone());
        }
    }

    result.collisions = find_collisions(source, dest);
    result
}

/// Every destination version indexed by numeric id, then each source version
/// checked against that index. Same id, different payload text: collision.
fn find_collisions(source: &RegistrySnapshot, dest: &RegistrySnapshot) -> Vec<IdCollision> {
    let mut dest_by_id: HashMap<i32, Vec<&SchemaVersion>> = HashMap::new();
    for (_, versions) in dest.subjects() {
        for v in versions {
            dest_by_id.entry(v.id).or_default().push(v);
        }
    }

    let mut collisions = Vec::new();
    for (_, versions) in source.subjects() {
        for sv in versions {
            let Some(holders) = dest_by_id.get(&sv.id) else {
                continue;
            };
            for dv in holders {
                if dv.schema != sv.schema {
                    collisions.push(IdCollision {
                        id: sv.id,
                        subject: sv.subject.clone(),
                        version: sv.version,
                        conflicting_subject: dv.subject.clone(),
                        conflicting_version: dv.version,
                    });
                }
            }
        }
    }
    collisions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SchemaType;

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
    fn test_identical_snapshots_are_synchronized() {
        let entries = [("orders", 1, 1, "s1"), ("orders", 2, 2, "s2")];
        let result = compare(&snap(&entries), &snap(&entries));
        assert!(result.is_synchronized());
        assert!(!result.has_collisions());
        assert_eq!(result.common_subjects, vec!["orders"]);
        assert!(result.version_differences.is_empty());
        assert!(result.id_differences.is_empty());
    }

    #[test]
    fn test_source_only_subject_lists_all_versions() {
        let source = snap(&[("orders", 1, 1, "s1"), ("orders", 2, 2, "s2")]);
        let dest = snap(&[]);
        let result = compare(&source, &dest);
        assert_eq!(result.source_only_subjects, vec!["orders"]);
        assert_eq!(result.version_differences.len(), 2);
        assert!(result
            .version_differences
            .iter()
            .all(|d| d.missing_in == MissingIn::Dest));
        assert!(!result.is_synchronized());
    }

    #[test]
    fn test_dest_only_subject_does_not_block_sync() {
        let source = snap(&[("orders", 1, 1, "s1")]);
        let dest = snap(&[("orders", 1, 1, "s1"), ("legacy", 1, 50, "old")]);
        let result = compare(&source, &dest);
        assert_eq!(result.dest_only_subjects, vec!["legacy"]);
        assert!(result.is_synchronized());
    }

    #[test]
    fn test_missing_dest_version_detected() {
        let source = snap(&[("orders", 1, 1, "s1"), ("orders", 2, 2, "s2")]);
        let dest = snap(&[("orders", 1, 1, "s1")]);
        let result = compare(&source, &dest);
        assert_eq!(
            result.version_differences,
            vec![VersionDifference {
                subject: "orders".to_string(),
                version: 2,
                missing_in: MissingIn::Dest,
            }]
        );
    }

    #[test]
    fn test_schema_difference_beats_id_difference() {
        let source = snap(&[("orders", 1, 1, "s1")]);
        let dest = snap(&[("orders", 1, 9, "different")]);
        let result = compare(&source, &dest);
        assert_eq!(result.schema_differences.len(), 1);
        assert!(result.id_differences.is_empty());
        assert_eq!(result.schema_differences[0].dest_id, 9);
    }

    #[test]
    fn test_id_difference_on_identical_payload() {
        let source = snap(&[("orders", 1, 1, "s1")]);
        let dest = snap(&[("orders", 1, 7, "s1")]);
        let result = compare(&source, &dest);
        assert!(result.schema_differences.is_empty());
        assert_eq!(
            result.id_differences,
            vec![IdDifference {
                subject: "orders".to_string(),
                version: 1,
                source_id: 1,
                dest_id: 7,
            }]
        );
    }

    #[test]
    fn test_shared_id_different_payload_is_collision() {
        let source = snap(&[("orders", 1, 5, "s1")]);
        let dest = snap(&[("payments", 3, 5, "unrelated")]);
        let result = compare(&source, &dest);
        assert!(result.has_collisions());
        let c = &result.collisions[0];
        assert_eq!(c.id, 5);
        assert_eq!(c.subject, "orders");
        assert_eq!(c.conflicting_subject, "payments");
        assert_eq!(c.conflicting_version, 3);
    }

    #[test]
    fn test_shared_id_identical_payload_is_not_collision() {
        let source = snap(&[("orders", 1, 5, "s1")]);
        let dest = snap(&[("orders", 1, 5, "s1")]);
        let result = compare(&source, &dest);
        assert!(!result.has_collisions());
    }

    #[test]
    fn test_collision_across_subjects_with_same_payload_elsewhere() {
        // id 5 appears twice in dest; one holder matches, one does not.
        let source = snap(&[("orders", 1, 5, "s1")]);
        let dest = snap(&[("orders", 1, 5, "s1"), ("payments", 1, 5, "other")]);
        let result = compare(&source, &dest);
        assert_eq!(result.collisions.len(), 1);
        assert_eq!(result.collisions[0].conflicting_subject, "payments");
    }

    #[test]
    fn test_source_missing_version_present_in_dest() {
        let source = snap(&[("orders", 2, 2, "s2")]);
        let dest = snap(&[("orders", 1, 1, "s1"), ("orders", 2, 2, "s2")]);
        let result = compare(&source, &dest);
        assert_eq!(
            result.version_differences,
            vec![VersionDifference {
                subject: "orders".to_string(),
                version: 1,
                missing_in: MissingIn::Source,
            }]
        );
        assert!(result.is_synchronized());
    }
}
